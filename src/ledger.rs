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

//! Thread-safe transaction ledger.
//!
//! Each record sits behind its own mutex so that status transitions are
//! serialized per transaction id while unrelated transactions proceed in
//! parallel.

use crate::base::{AccountId, TransactionId};
use crate::error::BankError;
use crate::transaction::{Transaction, TransactionStatus};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// A single ledger record.
#[derive(Debug)]
pub struct LedgerEntry {
    inner: Mutex<Transaction>,
}

impl LedgerEntry {
    fn new(transaction: Transaction) -> Self {
        Self {
            inner: Mutex::new(transaction),
        }
    }

    /// Locks the record for a status transition.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Transaction> {
        self.inner.lock()
    }

    pub fn snapshot(&self) -> Transaction {
        self.inner.lock().clone()
    }
}

/// All transactions, indexed by id.
#[derive(Debug, Default)]
pub struct Ledger {
    transactions: DashMap<TransactionId, Arc<LedgerEntry>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`BankError::Internal`] if the id is already taken.
    pub fn insert(&self, transaction: Transaction) -> Result<(), BankError> {
        // Use entry API for atomic check-and-insert to prevent race conditions
        match self.transactions.entry(transaction.id) {
            Entry::Occupied(_) => Err(BankError::Internal(format!(
                "duplicate transaction id {}",
                transaction.id
            ))),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(LedgerEntry::new(transaction)));
                Ok(())
            }
        }
    }

    /// Returns a handle to a record without holding any map shard.
    pub fn entry(&self, id: &TransactionId) -> Result<Arc<LedgerEntry>, BankError> {
        self.transactions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(BankError::NotFound)
    }

    pub fn get(&self, id: &TransactionId) -> Result<Transaction, BankError> {
        Ok(self.entry(id)?.snapshot())
    }

    /// Transactions sent or received by an account, newest first.
    pub fn list_for(&self, account: &AccountId) -> Vec<Transaction> {
        self.collect(|tx| tx.involves(account))
    }

    /// Transactions awaiting an administrator decision, newest first.
    pub fn list_pending(&self) -> Vec<Transaction> {
        self.collect(|tx| tx.status == TransactionStatus::Pending)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    fn collect(&self, keep: impl Fn(&Transaction) -> bool) -> Vec<Transaction> {
        // Snapshot handles first so no shard guard is held while locking records.
        let entries: Vec<Arc<LedgerEntry>> = self
            .transactions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut transactions: Vec<Transaction> = entries
            .iter()
            .map(|entry| entry.snapshot())
            .filter(|tx| keep(tx))
            .collect();
        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        transactions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::SubAccount;
    use crate::money::Money;
    use crate::transaction::TransactionKind;
    use chrono::{Duration, Utc};

    fn pending(source: AccountId, minutes_ago: i64) -> Transaction {
        Transaction {
            id: TransactionId::new(),
            source,
            source_sub_account: SubAccount::Checking,
            destination: None,
            destination_info: Some("external".into()),
            amount: Money::from_cents(100),
            kind: TransactionKind::Domestic,
            description: "rent".into(),
            status: TransactionStatus::Pending,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
            approved_at: None,
            admin_notes: None,
        }
    }

    #[test]
    fn insert_rejects_duplicate_ids() {
        let ledger = Ledger::new();
        let tx = pending(AccountId::new(), 0);
        ledger.insert(tx.clone()).unwrap();
        assert!(matches!(ledger.insert(tx), Err(BankError::Internal(_))));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn get_unknown_is_not_found() {
        let ledger = Ledger::new();
        assert_eq!(ledger.get(&TransactionId::new()), Err(BankError::NotFound));
    }

    #[test]
    fn list_for_is_newest_first_and_filtered() {
        let ledger = Ledger::new();
        let owner = AccountId::new();
        let old = pending(owner, 10);
        let new = pending(owner, 1);
        ledger.insert(old.clone()).unwrap();
        ledger.insert(new.clone()).unwrap();
        ledger.insert(pending(AccountId::new(), 5)).unwrap();

        let ids: Vec<_> = ledger.list_for(&owner).iter().map(|tx| tx.id).collect();
        assert_eq!(ids, vec![new.id, old.id]);
    }

    #[test]
    fn list_pending_skips_decided() {
        let ledger = Ledger::new();
        let mut decided = pending(AccountId::new(), 0);
        decided.status = TransactionStatus::Declined;
        let open = pending(AccountId::new(), 0);
        ledger.insert(decided).unwrap();
        ledger.insert(open.clone()).unwrap();

        let pending: Vec<_> = ledger.list_pending().iter().map(|tx| tx.id).collect();
        assert_eq!(pending, vec![open.id]);
    }
}
