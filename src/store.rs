// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Account store.
//!
//! Accounts live in a [`DashMap`] keyed by id, with a second map indexing
//! them by lower-cased email. Handles are `Arc<Account>` so callers never hold
//! a map shard while they wait on an account lock.

use crate::account::{Account, AccountFlag, NewAccount, lock_pair};
use crate::base::{AccountId, SubAccount};
use crate::error::BankError;
use crate::money::Money;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct AccountStore {
    accounts: DashMap<AccountId, Arc<Account>>,
    /// Lower-cased email to account id.
    emails: DashMap<String, AccountId>,
}

impl AccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new account.
    ///
    /// # Errors
    ///
    /// [`BankError::DuplicateEmail`] if the email is already registered.
    pub fn create(&self, profile: NewAccount) -> Result<Arc<Account>, BankError> {
        let id = AccountId::new();
        let account = Arc::new(Account::new(id, profile));

        // Entry API reserves the email atomically.
        match self.emails.entry(account.email().to_string()) {
            Entry::Occupied(_) => Err(BankError::DuplicateEmail),
            Entry::Vacant(entry) => {
                self.accounts.insert(id, Arc::clone(&account));
                entry.insert(id);
                info!(account = %id, role = ?account.role(), "account created");
                Ok(account)
            }
        }
    }

    pub fn get(&self, id: &AccountId) -> Result<Arc<Account>, BankError> {
        self.accounts
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(BankError::NotFound)
    }

    pub fn get_by_email(&self, email: &str) -> Result<Arc<Account>, BankError> {
        let id = self
            .emails
            .get(&email.trim().to_lowercase())
            .map(|entry| *entry.value())
            .ok_or(BankError::NotFound)?;
        self.get(&id)
    }

    pub fn contains(&self, id: &AccountId) -> bool {
        self.accounts.contains_key(id)
    }

    /// Applies a signed delta to one sub-account under the account lock.
    ///
    /// # Errors
    ///
    /// - [`BankError::NotFound`] - no such account.
    /// - [`BankError::InsufficientFunds`] - the balance would go negative.
    pub fn apply_delta(
        &self,
        id: &AccountId,
        sub_account: SubAccount,
        delta: Money,
    ) -> Result<Money, BankError> {
        let account = self.get(id)?;
        let balance = account.apply_delta(sub_account, delta)?;
        debug!(account = %id, %sub_account, %delta, %balance, "balance updated");
        Ok(balance)
    }

    /// Moves `amount` between two sub-accounts, possibly of the same account.
    ///
    /// Both legs are validated before either is written, under the locks of
    /// every account involved.
    ///
    /// # Errors
    ///
    /// - [`BankError::NotFound`] - the source account does not exist.
    /// - [`BankError::InvalidDestination`] - the destination account does not
    ///   exist, or source and destination are the same sub-account.
    /// - [`BankError::InsufficientFunds`] - the source balance is too low.
    pub fn transfer(
        &self,
        from: &AccountId,
        from_sub: SubAccount,
        to: &AccountId,
        to_sub: SubAccount,
        amount: Money,
    ) -> Result<(), BankError> {
        if !amount.is_positive() {
            return Err(BankError::InvalidAmount);
        }
        let source = self.get(from)?;

        if from == to {
            if from_sub == to_sub {
                return Err(BankError::InvalidDestination);
            }
            let mut data = source.inner.lock();
            data.preview_delta(from_sub, -amount)?;
            data.preview_delta(to_sub, amount)?;
            data.apply_delta(from_sub, -amount)?;
            data.apply_delta(to_sub, amount)?;
            return Ok(());
        }

        let destination = self
            .get(to)
            .map_err(|_| BankError::InvalidDestination)?;
        let (mut src, mut dst) = lock_pair(&source, &destination);
        src.preview_delta(from_sub, -amount)?;
        dst.preview_delta(to_sub, amount)
            .map_err(|err| match err {
                BankError::NotFound => BankError::InvalidDestination,
                other => other,
            })?;
        src.apply_delta(from_sub, -amount)?;
        dst.apply_delta(to_sub, amount)?;
        Ok(())
    }

    pub fn set_flag(&self, id: &AccountId, flag: AccountFlag, value: bool) -> Result<(), BankError> {
        let account = self.get(id)?;
        let mut data = account.inner.lock();
        data.ensure_present()?;
        data.set_flag(flag, value);
        info!(account = %id, ?flag, value, "account flag updated");
        Ok(())
    }

    /// Deletes an account that has not been approved yet (declined signup).
    ///
    /// # Errors
    ///
    /// - [`BankError::NotFound`] - no such account.
    /// - [`BankError::AlreadyDecided`] - the account is already approved.
    pub fn remove_unapproved(&self, id: &AccountId) -> Result<(), BankError> {
        let account = self.get(id)?;
        {
            let mut data = account.inner.lock();
            data.ensure_present()?;
            if data.approved() {
                return Err(BankError::AlreadyDecided);
            }
            // Flag first: anyone still holding the Arc sees the removal.
            data.mark_removed();
        }
        self.accounts.remove(id);
        self.emails.remove(account.email());
        info!(account = %id, "pending signup removed");
        Ok(())
    }

    pub fn accounts(&self) -> Vec<Arc<Account>> {
        let mut accounts: Vec<_> = self
            .accounts
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        accounts.sort_by_key(|account| account.created_at());
        accounts
    }

    pub fn pending_signups(&self) -> Vec<Arc<Account>> {
        self.accounts()
            .into_iter()
            .filter(|account| !account.is_approved())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
