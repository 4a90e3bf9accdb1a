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

//! Transaction records.
//!
//! Transactions follow a state machine:
//! - [`Pending`] → [`Approved`] (admin approval, balances move once)
//! - [`Pending`] → [`Declined`] (admin decline, no balance effect)
//!
//! Administrator credits and debits are recorded directly as [`Approved`].
//!
//! [`Pending`]: TransactionStatus::Pending
//! [`Approved`]: TransactionStatus::Approved
//! [`Declined`]: TransactionStatus::Declined

use crate::base::{AccountId, SubAccount, TransactionId};
use crate::error::BankError;
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// To another customer's checking balance.
    Internal,
    /// Between the caller's own checking and savings.
    #[serde(rename = "self")]
    SelfTransfer,
    /// Leaves the system; settlement happens elsewhere.
    Domestic,
    /// Leaves the system; settlement happens elsewhere.
    International,
    Credit,
    Debit,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::SelfTransfer => "self",
            Self::Domestic => "domestic",
            Self::International => "international",
            Self::Credit => "credit",
            Self::Debit => "debit",
        }
    }

    /// Credits and debits are only created by administrators, already approved.
    pub fn is_admin_adjustment(&self) -> bool {
        matches!(self, Self::Credit | Self::Debit)
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = BankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "internal" => Ok(Self::Internal),
            "self" => Ok(Self::SelfTransfer),
            "domestic" => Ok(Self::Domestic),
            "international" => Ok(Self::International),
            "credit" => Ok(Self::Credit),
            "debit" => Ok(Self::Debit),
            _ => Err(BankError::InvalidTransactionType),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Declined,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Administrator verdict on a pending transaction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Decline,
}

/// A customer's request to move money, as received from the client.
///
/// Names are kept as strings here and validated by the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    #[serde(default = "default_sub_account")]
    pub from_account_type: String,
    #[serde(default)]
    pub to_user_id: Option<AccountId>,
    #[serde(default)]
    pub to_account_info: Option<String>,
    pub amount: Money,
    pub transaction_type: String,
    #[serde(default)]
    pub description: String,
}

fn default_sub_account() -> String {
    SubAccount::Checking.as_str().to_string()
}

/// Direction of an administrator balance adjustment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentKind {
    Credit,
    Debit,
}

/// Administrator credit or debit, applied immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualAdjustment {
    pub user_id: AccountId,
    pub action: AdjustmentKind,
    pub amount: Money,
    pub account_type: String,
    #[serde(default)]
    pub description: Option<String>,
    /// ISO-8601 override for the recorded timestamps; unparseable means now.
    #[serde(default)]
    pub custom_date: Option<String>,
}

/// A ledger transaction.
///
/// Serialized with the same field names clients use in a [`TransferRequest`].
/// `source` is the account whose `source_sub_account` balance moves: the
/// payer for transfers and debits, the payee for credits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub id: TransactionId,
    #[serde(rename = "from_user_id")]
    pub source: AccountId,
    #[serde(rename = "from_account_type")]
    pub source_sub_account: SubAccount,
    #[serde(rename = "to_user_id")]
    pub destination: Option<AccountId>,
    #[serde(rename = "to_account_info")]
    pub destination_info: Option<String>,
    pub amount: Money,
    #[serde(rename = "transaction_type")]
    pub kind: TransactionKind,
    pub description: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub admin_notes: Option<String>,
}

impl Transaction {
    /// Whether the account sent or receives this transaction.
    pub fn involves(&self, account: &AccountId) -> bool {
        self.source == *account || self.destination.as_ref() == Some(account)
    }

    /// Destination sub-account of a self transfer.
    pub fn self_destination(&self) -> Result<SubAccount, BankError> {
        let name = self
            .destination_info
            .as_deref()
            .ok_or(BankError::InvalidDestination)?;
        let sub_account =
            SubAccount::from_str(name).map_err(|_| BankError::InvalidDestination)?;
        if sub_account == self.source_sub_account {
            return Err(BankError::InvalidDestination);
        }
        Ok(sub_account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_transfer(info: Option<&str>) -> Transaction {
        Transaction {
            id: TransactionId::new(),
            source: AccountId::new(),
            source_sub_account: SubAccount::Checking,
            destination: None,
            destination_info: info.map(str::to_string),
            amount: Money::from_cents(100),
            kind: TransactionKind::SelfTransfer,
            description: String::new(),
            status: TransactionStatus::Pending,
            created_at: Utc::now(),
            approved_at: None,
            admin_notes: None,
        }
    }

    #[test]
    fn kind_parses_wire_names() {
        assert_eq!("self".parse::<TransactionKind>(), Ok(TransactionKind::SelfTransfer));
        assert_eq!(
            "international".parse::<TransactionKind>(),
            Ok(TransactionKind::International)
        );
        assert_eq!(
            "wire".parse::<TransactionKind>(),
            Err(BankError::InvalidTransactionType)
        );
    }

    #[test]
    fn kind_serializes_self_as_self() {
        let json = serde_json::to_string(&TransactionKind::SelfTransfer).unwrap();
        assert_eq!(json, "\"self\"");
    }

    #[test]
    fn serializes_with_request_field_names() {
        let json = serde_json::to_value(self_transfer(Some("savings"))).unwrap();
        let object = json.as_object().unwrap();
        for key in [
            "from_user_id",
            "from_account_type",
            "to_user_id",
            "to_account_info",
            "transaction_type",
        ] {
            assert!(object.contains_key(key), "missing {key}");
        }
        assert_eq!(json["transaction_type"], "self");
        assert_eq!(json["from_account_type"], "checking");
        assert!(!object.contains_key("kind"));
    }

    #[test]
    fn transfer_request_reads_string_amounts() {
        let request: TransferRequest = serde_json::from_str(
            r#"{"amount": "25.50", "transaction_type": "self", "to_account_info": "savings"}"#,
        )
        .unwrap();
        assert_eq!(request.amount, Money::from_cents(2550));
        assert_eq!(request.from_account_type, "checking");
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Approved.is_terminal());
        assert!(TransactionStatus::Declined.is_terminal());
    }

    #[test]
    fn self_destination_requires_other_sub_account() {
        assert_eq!(
            self_transfer(Some("savings")).self_destination(),
            Ok(SubAccount::Savings)
        );
        assert_eq!(
            self_transfer(Some("checking")).self_destination(),
            Err(BankError::InvalidDestination)
        );
        assert_eq!(
            self_transfer(Some("brokerage")).self_destination(),
            Err(BankError::InvalidDestination)
        );
        assert_eq!(
            self_transfer(None).self_destination(),
            Err(BankError::InvalidDestination)
        );
    }

    #[test]
    fn transfer_request_defaults_to_checking() {
        let request: TransferRequest = serde_json::from_str(
            r#"{"amount": "10.00", "transaction_type": "domestic", "to_account_info": "IBAN"}"#,
        )
        .unwrap();
        assert_eq!(request.from_account_type, "checking");
        assert_eq!(request.amount, Money::from_cents(1_000));
        assert!(request.description.is_empty());
    }

    #[test]
    fn involves_matches_both_ends() {
        let mut tx = self_transfer(Some("savings"));
        let other = AccountId::new();
        tx.destination = Some(other);
        assert!(tx.involves(&tx.source.clone()));
        assert!(tx.involves(&other));
        assert!(!tx.involves(&AccountId::new()));
    }
}
