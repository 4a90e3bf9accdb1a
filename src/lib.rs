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

//! # Custodial Ledger
//!
//! A small custodial bank: customers request balance movements, an
//! administrator approves or declines them, and approved requests mutate
//! balances exactly once. Administrators can also terminate any live session
//! immediately.
//!
//! ## Core Components
//!
//! - [`Engine`]: pending transfer requests and their settlement
//! - [`AccountStore`]: accounts with checking and savings balances
//! - [`Authenticator`]: login, token validation and revocation
//! - [`LoginApprovals`]: optional admin approval of customer logins
//! - [`Bank`]: the facade the HTTP layer talks to
//! - [`BankError`]: every failure the above can report
//!
//! ## Example
//!
//! ```
//! use custodial_ledger::{AccountStore, Engine, ManualAdjustment, AdjustmentKind, Money, NewAccount};
//! use custodial_ledger::{Decision, SubAccount, TransferRequest};
//! use rust_decimal_macros::dec;
//! use std::sync::Arc;
//!
//! let accounts = Arc::new(AccountStore::new());
//! let ana = accounts
//!     .create(NewAccount { approved: true, ..NewAccount::customer("ana@example.com", "Ana", "hash") })
//!     .unwrap();
//! let engine = Engine::new(accounts.clone());
//!
//! engine
//!     .manual_adjust(ManualAdjustment {
//!         user_id: ana.id(),
//!         action: AdjustmentKind::Credit,
//!         amount: Money::from_decimal(dec!(500.00)).unwrap(),
//!         account_type: "checking".into(),
//!         description: None,
//!         custom_date: None,
//!     })
//!     .unwrap();
//!
//! let request = TransferRequest {
//!     from_account_type: "checking".into(),
//!     to_user_id: None,
//!     to_account_info: Some("savings".into()),
//!     amount: Money::from_decimal(dec!(200.00)).unwrap(),
//!     transaction_type: "self".into(),
//!     description: String::new(),
//! };
//! let pending = engine.create_transaction(&ana.id(), request).unwrap();
//! engine.decide(&pending.id, Decision::Approve, None).unwrap();
//!
//! assert_eq!(ana.balance(SubAccount::Checking).to_string(), "300.00");
//! assert_eq!(ana.balance(SubAccount::Savings).to_string(), "200.00");
//! ```
//!
//! ## Thread Safety
//!
//! Every account and every ledger record has its own lock. Decisions on
//! different transactions run in parallel; decisions on the same transaction
//! are serialized and only the first one takes effect.

pub mod account;
pub mod auth;
pub mod bank;
mod base;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod http;
pub mod ledger;
pub mod login_approval;
mod logging;
pub mod money;
pub mod revocation;
pub mod session;
pub mod store;
pub mod token;
pub mod transaction;

pub use account::{Account, AccountFlag, AccountProfile, NewAccount};
pub use auth::{AuthenticatedSession, Authenticator, ForcedLogout, Principal, SessionPolicy};
pub use bank::{
    AccountOverview, ApprovedLogin, Bank, Dashboard, LoginOutcome, LoginStatus, SignupRequest,
};
pub use base::{AccountId, ApprovalId, Role, SubAccount, TransactionId};
pub use config::{BankConfig, ConfigError};
pub use credentials::{Argon2Credentials, Credentials};
pub use engine::{Engine, parse_timestamp};
pub use error::BankError;
pub use ledger::Ledger;
pub use login_approval::{LoginApproval, LoginApprovalStatus, LoginApprovals, LoginDecision};
pub use logging::init_logging;
pub use money::Money;
pub use revocation::{InMemoryRevocationStore, RevocationStore};
pub use session::{InMemorySessionStore, Session, SessionStore};
pub use store::AccountStore;
pub use token::{Claims, IssuedToken, TokenIssuer};
pub use transaction::{
    AdjustmentKind, Decision, ManualAdjustment, Transaction, TransactionKind, TransactionStatus,
    TransferRequest,
};
