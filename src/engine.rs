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

//! Transaction approval engine.
//!
//! The [`Engine`] creates customer transfer requests as `pending` records and
//! settles them when an administrator approves. It also records administrator
//! credits and debits, which are applied immediately.
//!
//! # Settlement
//!
//! | Kind | Debit | Credit |
//! |------|-------|--------|
//! | internal | source sub-account | destination's checking |
//! | self | source sub-account | same account, other sub-account |
//! | domestic / international | source sub-account | none, funds leave the system |
//! | credit / debit | applied at creation | applied at creation |
//!
//! # Thread Safety
//!
//! A decision holds the ledger record's lock for its whole duration, then the
//! locks of the accounts it touches. The funds check is made under the same
//! account lock as the debit, so concurrent decisions on one record, or
//! concurrent debits of one account, cannot both succeed on a stale view.

use crate::base::{AccountId, SubAccount, TransactionId, timestamp_now};
use crate::error::BankError;
use crate::ledger::Ledger;
use crate::store::AccountStore;
use crate::transaction::{
    AdjustmentKind, Decision, ManualAdjustment, Transaction, TransactionKind, TransactionStatus,
    TransferRequest,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Approval engine over a shared account store.
///
/// # Invariants
///
/// - Status moves only `pending -> approved` or `pending -> declined`.
/// - Balances move at most once per transaction, when it becomes `approved`.
/// - A failed approval leaves the record `pending` and every balance untouched.
#[derive(Debug)]
pub struct Engine {
    accounts: Arc<AccountStore>,
    ledger: Ledger,
}

impl Engine {
    pub fn new(accounts: Arc<AccountStore>) -> Self {
        Engine {
            accounts,
            ledger: Ledger::new(),
        }
    }

    pub fn accounts(&self) -> &Arc<AccountStore> {
        &self.accounts
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Records a customer transfer request as `pending`.
    ///
    /// Balances are not touched. The source balance is checked as a courtesy
    /// so obviously unfunded requests never reach the approval queue; the
    /// binding check happens again at approval.
    ///
    /// # Errors
    ///
    /// - [`BankError::InvalidTransactionType`] - unknown kind, or credit/debit.
    /// - [`BankError::InvalidAccountType`] - source is not checking/savings.
    /// - [`BankError::InvalidAmount`] - amount is not positive.
    /// - [`BankError::InvalidDestination`] - bad self-transfer target, or an
    ///   internal transfer to an unknown account or to the sender.
    /// - [`BankError::NotApproved`] / [`BankError::AccountFrozen`] - the sender
    ///   may not move money.
    /// - [`BankError::InsufficientFunds`] - source balance below the amount.
    pub fn create_transaction(
        &self,
        source: &AccountId,
        request: TransferRequest,
    ) -> Result<Transaction, BankError> {
        let kind: TransactionKind = request.transaction_type.parse()?;
        if kind.is_admin_adjustment() {
            return Err(BankError::InvalidTransactionType);
        }
        let source_sub_account: SubAccount = request.from_account_type.parse()?;
        if !request.amount.is_positive() {
            return Err(BankError::InvalidAmount);
        }

        let account = self.accounts.get(source)?;
        if !account.is_approved() {
            return Err(BankError::NotApproved);
        }
        if account.is_frozen() {
            return Err(BankError::AccountFrozen);
        }

        let destination = match kind {
            TransactionKind::Internal => {
                let to = request.to_user_id.ok_or(BankError::InvalidDestination)?;
                if to == *source || !self.accounts.contains(&to) {
                    return Err(BankError::InvalidDestination);
                }
                Some(to)
            }
            _ => None,
        };

        let transaction = Transaction {
            id: TransactionId::new(),
            source: *source,
            source_sub_account,
            destination,
            destination_info: request.to_account_info,
            amount: request.amount,
            kind,
            description: request.description,
            status: TransactionStatus::Pending,
            created_at: timestamp_now(),
            approved_at: None,
            admin_notes: None,
        };
        if kind == TransactionKind::SelfTransfer {
            transaction.self_destination()?;
        }

        if account.balance(source_sub_account) < transaction.amount {
            debug!(account = %source, sub_account = %source_sub_account, "transfer request exceeds balance");
            return Err(BankError::InsufficientFunds);
        }

        self.ledger.insert(transaction.clone())?;
        info!(
            transaction = %transaction.id,
            account = %source,
            kind = %kind,
            amount = %transaction.amount,
            "transfer requested"
        );
        Ok(transaction)
    }

    /// Approves or declines a pending transaction.
    ///
    /// `notes`, when given, replace the record's admin notes as part of the
    /// same transition.
    ///
    /// # Errors
    ///
    /// - [`BankError::NotFound`] - no such transaction, or the source account
    ///   no longer exists.
    /// - [`BankError::AlreadyDecided`] - the transaction is not pending.
    /// - [`BankError::InsufficientFunds`] - the source cannot cover the amount;
    ///   the transaction stays pending and may be approved later.
    /// - [`BankError::InvalidDestination`] - the internal transfer's recipient
    ///   is gone; the transaction stays pending.
    pub fn decide(
        &self,
        id: &TransactionId,
        decision: Decision,
        notes: Option<String>,
    ) -> Result<Transaction, BankError> {
        let entry = self.ledger.entry(id)?;
        let mut transaction = entry.lock();

        if transaction.status.is_terminal() {
            return Err(BankError::AlreadyDecided);
        }

        let status = match decision {
            Decision::Decline => TransactionStatus::Declined,
            Decision::Approve => {
                if let Err(err) = self.settle(&transaction) {
                    warn!(transaction = %id, error = %err, "approval rejected");
                    return Err(err);
                }
                TransactionStatus::Approved
            }
        };

        transaction.status = status;
        transaction.approved_at = Some(timestamp_now());
        if notes.is_some() {
            transaction.admin_notes = notes;
        }
        info!(transaction = %id, status = ?status, amount = %transaction.amount, "transaction decided");
        Ok(transaction.clone())
    }

    /// Moves the balances of an approved transaction.
    ///
    /// Called with the record locked; either every leg is written or none.
    fn settle(&self, transaction: &Transaction) -> Result<(), BankError> {
        match transaction.kind {
            TransactionKind::Internal => {
                let to = transaction
                    .destination
                    .ok_or(BankError::InvalidDestination)?;
                self.accounts.transfer(
                    &transaction.source,
                    transaction.source_sub_account,
                    &to,
                    SubAccount::Checking,
                    transaction.amount,
                )
            }
            TransactionKind::SelfTransfer => {
                let to_sub_account = transaction.self_destination()?;
                self.accounts.transfer(
                    &transaction.source,
                    transaction.source_sub_account,
                    &transaction.source,
                    to_sub_account,
                    transaction.amount,
                )
            }
            TransactionKind::Domestic | TransactionKind::International => self
                .accounts
                .apply_delta(
                    &transaction.source,
                    transaction.source_sub_account,
                    -transaction.amount,
                )
                .map(|_| ()),
            // Adjustments are recorded already approved and never pending.
            TransactionKind::Credit | TransactionKind::Debit => Err(BankError::AlreadyDecided),
        }
    }

    /// Applies an administrator credit or debit and records it as approved.
    ///
    /// The recorded `created_at`/`approved_at` come from `custom_date` when it
    /// parses, and fall back to now otherwise.
    ///
    /// # Errors
    ///
    /// - [`BankError::InvalidAccountType`] - `account_type` is not a sub-account.
    /// - [`BankError::InvalidAmount`] - amount is not positive.
    /// - [`BankError::NotFound`] - no such account.
    /// - [`BankError::InsufficientFunds`] - a debit exceeds the balance.
    pub fn manual_adjust(&self, adjustment: ManualAdjustment) -> Result<Transaction, BankError> {
        let sub_account: SubAccount = adjustment.account_type.parse()?;
        if !adjustment.amount.is_positive() {
            return Err(BankError::InvalidAmount);
        }
        let at = parse_timestamp(adjustment.custom_date.as_deref(), timestamp_now());

        let (kind, delta, default_description) = match adjustment.action {
            AdjustmentKind::Credit => (TransactionKind::Credit, adjustment.amount, "Manual credit"),
            AdjustmentKind::Debit => (TransactionKind::Debit, -adjustment.amount, "Manual debit"),
        };

        let balance = self
            .accounts
            .apply_delta(&adjustment.user_id, sub_account, delta)?;

        let transaction = Transaction {
            id: TransactionId::new(),
            source: adjustment.user_id,
            source_sub_account: sub_account,
            destination: None,
            destination_info: None,
            amount: adjustment.amount,
            kind,
            description: adjustment
                .description
                .filter(|text| !text.trim().is_empty())
                .unwrap_or_else(|| default_description.to_string()),
            status: TransactionStatus::Approved,
            created_at: at,
            approved_at: Some(at),
            admin_notes: None,
        };
        self.ledger.insert(transaction.clone())?;
        info!(
            transaction = %transaction.id,
            account = %adjustment.user_id,
            kind = %kind,
            amount = %adjustment.amount,
            %balance,
            "manual adjustment applied"
        );
        Ok(transaction)
    }

    /// Replaces the admin notes of any transaction, whatever its status.
    pub fn annotate(&self, id: &TransactionId, notes: Option<String>) -> Result<Transaction, BankError> {
        let entry = self.ledger.entry(id)?;
        let mut transaction = entry.lock();
        transaction.admin_notes = notes;
        Ok(transaction.clone())
    }

    pub fn transaction(&self, id: &TransactionId) -> Result<Transaction, BankError> {
        self.ledger.get(id)
    }

    pub fn transactions_for(&self, account: &AccountId) -> Vec<Transaction> {
        self.ledger.list_for(account)
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.ledger.list_pending()
    }
}

/// Parses an administrator-supplied ISO-8601 timestamp.
///
/// Accepts RFC 3339 (with `Z` or an offset), naive date-times read as UTC, and
/// bare dates at midnight UTC. Anything else yields `fallback`.
pub fn parse_timestamp(raw: Option<&str>, fallback: DateTime<Utc>) -> DateTime<Utc> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return fallback;
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(&Utc);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return naive.and_utc();
        }
    }
    if let Some(midnight) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return midnight.and_utc();
    }
    debug!(raw, "unparseable timestamp override, using now");
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fallback() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn parse_timestamp_accepts_zulu() {
        let parsed = parse_timestamp(Some("2024-01-15T10:30:00Z"), fallback());
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap());
    }

    #[test]
    fn parse_timestamp_converts_offsets_to_utc() {
        let parsed = parse_timestamp(Some("2024-01-15T12:30:00+02:00"), fallback());
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap());
    }

    #[test]
    fn parse_timestamp_reads_naive_as_utc() {
        let parsed = parse_timestamp(Some("2024-01-15T10:30:00.250"), fallback());
        assert_eq!(
            parsed,
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()
                + chrono::Duration::milliseconds(250)
        );
        let minutes_only = parse_timestamp(Some("2024-01-15T10:30"), fallback());
        assert_eq!(minutes_only, Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap());
    }

    #[test]
    fn parse_timestamp_accepts_bare_date() {
        let parsed = parse_timestamp(Some("2023-12-31"), fallback());
        assert_eq!(parsed, Utc.with_ymd_and_hms(2023, 12, 31, 0, 0, 0).unwrap());
    }

    #[test]
    fn parse_timestamp_falls_back_silently() {
        assert_eq!(parse_timestamp(Some("last tuesday"), fallback()), fallback());
        assert_eq!(parse_timestamp(Some("2024-13-45T99:00:00"), fallback()), fallback());
        assert_eq!(parse_timestamp(Some("   "), fallback()), fallback());
        assert_eq!(parse_timestamp(None, fallback()), fallback());
    }
}
