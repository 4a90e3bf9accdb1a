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

//! Error types for the ledger, approval engine and session layer.

use thiserror::Error;

/// Errors surfaced by every ledger and session operation.
///
/// None of these are retried by the crate itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BankError {
    /// Referenced account, transaction or approval does not exist
    #[error("not found")]
    NotFound,

    /// Transaction or approval request already reached a terminal status
    #[error("already decided")]
    AlreadyDecided,

    /// Debit would drive a balance negative
    #[error("insufficient funds")]
    InsufficientFunds,

    /// Sub-account name is not `checking` or `savings`
    #[error("invalid account type")]
    InvalidAccountType,

    /// Self transfer to the same sub-account, or unusable destination
    #[error("invalid destination")]
    InvalidDestination,

    /// Transaction kind is unknown or not allowed here
    #[error("invalid transaction type")]
    InvalidTransactionType,

    /// Amount is zero, negative, too precise or out of range
    #[error("invalid amount (must be positive with at most two decimal places)")]
    InvalidAmount,

    /// Bearer token is malformed, expired or badly signed
    #[error("invalid token")]
    InvalidToken,

    /// Session terminated by an administrator
    #[error("session terminated by administrator")]
    Revoked,

    #[error("account is frozen")]
    AccountFrozen,

    #[error("account not approved yet")]
    NotApproved,

    #[error("invalid credentials")]
    InvalidCredentials,

    /// Login approval has not been granted (yet)
    #[error("login not yet approved")]
    NotReady,

    #[error("email already registered")]
    DuplicateEmail,

    /// Caller lacks the administrator role
    #[error("admin access required")]
    Forbidden,

    /// Hashing or token encoding failed
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::BankError;

    #[test]
    fn error_display_messages() {
        assert_eq!(BankError::NotFound.to_string(), "not found");
        assert_eq!(BankError::AlreadyDecided.to_string(), "already decided");
        assert_eq!(BankError::InsufficientFunds.to_string(), "insufficient funds");
        assert_eq!(
            BankError::InvalidAmount.to_string(),
            "invalid amount (must be positive with at most two decimal places)"
        );
        assert_eq!(
            BankError::Revoked.to_string(),
            "session terminated by administrator"
        );
        assert_eq!(BankError::NotReady.to_string(), "login not yet approved");
        assert_eq!(
            BankError::Internal("boom".into()).to_string(),
            "internal error: boom"
        );
    }

    #[test]
    fn errors_are_cloneable() {
        let error = BankError::InsufficientFunds;
        let cloned = error.clone();
        assert_eq!(error, cloned);
    }
}
