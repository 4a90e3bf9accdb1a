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

//! Account management.
//!
//! Every account carries two balances (see [`SubAccount`]) behind a single
//! mutex, so any read-then-write of a balance is serialized per account.
//!
//! # Example
//!
//! ```
//! use custodial_ledger::{Account, AccountId, Money, NewAccount, SubAccount};
//!
//! let account = Account::new(AccountId::new(), NewAccount::customer("ada@example.com", "Ada", "hash"));
//! assert_eq!(account.balance(SubAccount::Checking), Money::ZERO);
//! ```

use crate::base::{AccountId, Role, SubAccount, timestamp_now};
use crate::error::BankError;
use crate::money::Money;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde::{Deserialize, Serialize as SerializeDerive};

/// Profile handed to the store when an account is opened.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub role: Role,
    pub approved: bool,
}

impl NewAccount {
    /// A customer awaiting onboarding approval.
    pub fn customer(
        email: impl Into<String>,
        full_name: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            full_name: full_name.into(),
            password_hash: password_hash.into(),
            role: Role::Customer,
            approved: false,
        }
    }

    /// A pre-approved administrator.
    pub fn admin(
        email: impl Into<String>,
        full_name: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Admin,
            approved: true,
            ..Self::customer(email, full_name, password_hash)
        }
    }
}

/// Redacted snapshot of an account, safe to hand back to clients.
#[derive(Debug, Clone, PartialEq, Eq, SerializeDerive, Deserialize)]
pub struct AccountProfile {
    pub id: AccountId,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub checking_balance: Money,
    pub savings_balance: Money,
}

/// Boolean account flags toggled by an administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountFlag {
    Approved,
    Frozen,
}

#[derive(Debug)]
pub(crate) struct AccountData {
    full_name: String,
    role: Role,
    password_hash: String,
    checking: Money,
    savings: Money,
    approved: bool,
    frozen: bool,
    force_logout_at: Option<DateTime<Utc>>,
    /// Set when a pending signup is declined; the row is gone from the store.
    removed: bool,
}

impl AccountData {
    fn new(profile: NewAccount) -> Self {
        Self {
            full_name: profile.full_name,
            role: profile.role,
            password_hash: profile.password_hash,
            checking: Money::ZERO,
            savings: Money::ZERO,
            approved: profile.approved,
            frozen: false,
            force_logout_at: None,
            removed: false,
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            !self.checking.is_negative(),
            "Invariant violated: checking balance went negative: {}",
            self.checking
        );
        debug_assert!(
            !self.savings.is_negative(),
            "Invariant violated: savings balance went negative: {}",
            self.savings
        );
    }

    pub(crate) fn balance(&self, sub_account: SubAccount) -> Money {
        match sub_account {
            SubAccount::Checking => self.checking,
            SubAccount::Savings => self.savings,
        }
    }

    fn balance_mut(&mut self, sub_account: SubAccount) -> &mut Money {
        match sub_account {
            SubAccount::Checking => &mut self.checking,
            SubAccount::Savings => &mut self.savings,
        }
    }

    pub(crate) fn ensure_present(&self) -> Result<(), BankError> {
        if self.removed {
            return Err(BankError::NotFound);
        }
        Ok(())
    }

    /// Computes the balance a delta would leave without writing it.
    pub(crate) fn preview_delta(
        &self,
        sub_account: SubAccount,
        delta: Money,
    ) -> Result<Money, BankError> {
        self.ensure_present()?;
        let updated = self
            .balance(sub_account)
            .checked_add(delta)
            .ok_or(BankError::InvalidAmount)?;
        if updated.is_negative() {
            return Err(BankError::InsufficientFunds);
        }
        Ok(updated)
    }

    /// Applies a signed delta, rejecting it before any write if the balance
    /// would go negative.
    pub(crate) fn apply_delta(
        &mut self,
        sub_account: SubAccount,
        delta: Money,
    ) -> Result<Money, BankError> {
        let updated = self.preview_delta(sub_account, delta)?;
        *self.balance_mut(sub_account) = updated;
        self.assert_invariants();
        Ok(updated)
    }

    pub(crate) fn set_flag(&mut self, flag: AccountFlag, value: bool) {
        match flag {
            AccountFlag::Approved => self.approved = value,
            AccountFlag::Frozen => self.frozen = value,
        }
    }

    pub(crate) fn approved(&self) -> bool {
        self.approved
    }

    pub(crate) fn mark_removed(&mut self) {
        self.removed = true;
    }

    pub(crate) fn advance_logout_watermark(&mut self, at: DateTime<Utc>) {
        // Never move the watermark backwards.
        if self.force_logout_at.is_none_or(|current| current < at) {
            self.force_logout_at = Some(at);
        }
    }
}

/// A customer or administrator account.
#[derive(Debug)]
pub struct Account {
    id: AccountId,
    email: String,
    created_at: DateTime<Utc>,
    pub(crate) inner: Mutex<AccountData>,
}

impl Account {
    pub fn new(id: AccountId, profile: NewAccount) -> Self {
        Self {
            id,
            email: profile.email.trim().to_lowercase(),
            created_at: timestamp_now(),
            inner: Mutex::new(AccountData::new(profile)),
        }
    }

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn balance(&self, sub_account: SubAccount) -> Money {
        self.inner.lock().balance(sub_account)
    }

    pub fn role(&self) -> Role {
        self.inner.lock().role
    }

    pub fn is_approved(&self) -> bool {
        self.inner.lock().approved
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.lock().frozen
    }

    /// Tokens issued before this instant are no longer honoured.
    pub fn force_logout_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().force_logout_at
    }

    pub(crate) fn advance_logout_watermark(&self, at: DateTime<Utc>) {
        self.inner.lock().advance_logout_watermark(at);
    }

    pub(crate) fn password_hash(&self) -> String {
        self.inner.lock().password_hash.clone()
    }

    pub fn profile(&self) -> AccountProfile {
        let data = self.inner.lock();
        AccountProfile {
            id: self.id,
            email: self.email.clone(),
            full_name: data.full_name.clone(),
            role: data.role,
            checking_balance: data.checking,
            savings_balance: data.savings,
        }
    }

    /// Applies a signed delta to one balance and returns the new balance.
    ///
    /// # Errors
    ///
    /// - [`BankError::InsufficientFunds`] - the balance would go negative.
    /// - [`BankError::NotFound`] - the account was removed concurrently.
    pub fn apply_delta(&self, sub_account: SubAccount, delta: Money) -> Result<Money, BankError> {
        self.inner.lock().apply_delta(sub_account, delta)
    }
}

/// Locks two distinct accounts in id order so that concurrent two-leg moves
/// can never wait on each other in a cycle.
///
/// The guards are returned in argument order.
pub(crate) fn lock_pair<'a>(
    first: &'a Account,
    second: &'a Account,
) -> (MutexGuard<'a, AccountData>, MutexGuard<'a, AccountData>) {
    debug_assert_ne!(first.id, second.id, "lock_pair needs two distinct accounts");
    if first.id < second.id {
        let a = first.inner.lock();
        let b = second.inner.lock();
        (a, b)
    } else {
        let b = second.inner.lock();
        let a = first.inner.lock();
        (a, b)
    }
}

impl Serialize for Account {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let data = self.inner.lock();
        let mut state = serializer.serialize_struct("Account", 10)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("email", &self.email)?;
        state.serialize_field("full_name", &data.full_name)?;
        state.serialize_field("role", &data.role)?;
        state.serialize_field("checking_balance", &data.checking)?;
        state.serialize_field("savings_balance", &data.savings)?;
        state.serialize_field("is_approved", &data.approved)?;
        state.serialize_field("account_frozen", &data.frozen)?;
        state.serialize_field("force_logout_at", &data.force_logout_at)?;
        state.serialize_field("created_at", &self.created_at)?;
        state.end()
    }
}
