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

//! The [`Bank`] ties the account store, approval engine, authenticator and
//! login approvals together behind one API.
//!
//! Every administrator operation takes the caller's [`Principal`] and fails
//! with [`BankError::Forbidden`] for customers, before touching any state.

use crate::account::{Account, AccountFlag, AccountProfile, NewAccount};
use crate::auth::{AuthenticatedSession, Authenticator, ForcedLogout, Principal};
use crate::base::{AccountId, ApprovalId, Role, TransactionId};
use crate::config::BankConfig;
use crate::credentials::{Argon2Credentials, Credentials};
use crate::engine::Engine;
use crate::error::BankError;
use crate::login_approval::{LoginApproval, LoginApprovalStatus, LoginApprovals, LoginDecision};
use crate::revocation::{InMemoryRevocationStore, RevocationStore};
use crate::session::{InMemorySessionStore, SessionStore};
use crate::store::AccountStore;
use crate::token::TokenIssuer;
use crate::transaction::{Decision, ManualAdjustment, Transaction, TransferRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Number of transactions shown on the dashboard.
const RECENT_TRANSACTIONS: usize = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

/// Outcome of a password login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoginOutcome {
    Authenticated(AuthenticatedSession),
    PendingApproval { approval_id: ApprovalId },
}

/// Token handed out once a parked login was approved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovedLogin {
    pub access_token: String,
    pub token_type: &'static str,
    pub user: AccountProfile,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub user: AccountProfile,
    pub recent_transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoginStatus {
    LoggedIn,
    LoggedOut,
}

/// An account as the admin console lists it, with its live session state.
#[derive(Debug, Clone, Serialize)]
pub struct AccountOverview {
    #[serde(flatten)]
    pub account: Arc<Account>,
    pub login_status: LoginStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
}

pub struct Bank {
    config: BankConfig,
    accounts: Arc<AccountStore>,
    engine: Engine,
    auth: Authenticator,
    approvals: LoginApprovals,
}

impl Bank {
    /// A bank over in-memory stores and argon2 with the configured costs.
    pub fn new(config: BankConfig) -> Result<Self, BankError> {
        let credentials = Argon2Credentials::with_params(
            config.argon2.memory_kib,
            config.argon2.iterations,
            config.argon2.parallelism,
        )?;
        Ok(Self::with_stores(
            config,
            Arc::new(InMemorySessionStore::new()),
            Arc::new(InMemoryRevocationStore::new()),
            Arc::new(credentials),
        ))
    }

    pub fn with_stores(
        config: BankConfig,
        sessions: Arc<dyn SessionStore>,
        revocations: Arc<dyn RevocationStore>,
        credentials: Arc<dyn Credentials>,
    ) -> Self {
        let accounts = Arc::new(AccountStore::new());
        let auth = Authenticator::new(
            accounts.clone(),
            sessions,
            revocations,
            credentials,
            TokenIssuer::new(config.jwt_secret.as_bytes()),
            config.session_policy(),
        );
        Self {
            engine: Engine::new(accounts.clone()),
            accounts,
            auth,
            approvals: LoginApprovals::new(),
            config,
        }
    }

    pub fn config(&self) -> &BankConfig {
        &self.config
    }

    pub fn accounts(&self) -> &Arc<AccountStore> {
        &self.accounts
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn auth(&self) -> &Authenticator {
        &self.auth
    }

    // -- public ---------------------------------------------------------------

    /// Opens a customer account awaiting onboarding approval.
    pub fn signup(&self, request: SignupRequest) -> Result<AccountProfile, BankError> {
        if request.email.trim().is_empty() || request.password.is_empty() {
            return Err(BankError::InvalidCredentials);
        }
        let hash = self.auth.credentials().hash(&request.password)?;
        let account = self.accounts.create(NewAccount::customer(
            request.email,
            request.full_name,
            hash,
        ))?;
        Ok(account.profile())
    }

    /// Creates an administrator unless the email is already taken.
    ///
    /// Returns `None` when an account with that email exists.
    pub fn seed_admin(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<Option<AccountId>, BankError> {
        if self.accounts.get_by_email(email).is_ok() {
            return Ok(None);
        }
        let hash = self.auth.credentials().hash(password)?;
        match self.accounts.create(NewAccount::admin(email, full_name, hash)) {
            Ok(account) => Ok(Some(account.id())),
            Err(BankError::DuplicateEmail) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Password login. With login approval switched on, customers get an
    /// approval id to poll instead of a token.
    pub fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, BankError> {
        let account = self.auth.check_credentials(email, password)?;
        if self.config.require_login_approval && account.role() != Role::Admin {
            let approval_id = self.approvals.request(account.id(), account.email());
            return Ok(LoginOutcome::PendingApproval { approval_id });
        }
        self.auth
            .open_session(&account)
            .map(LoginOutcome::Authenticated)
    }

    pub fn validate(&self, token: &str) -> Result<Principal, BankError> {
        self.auth.validate(token)
    }

    pub fn logout(&self, principal: &Principal) {
        self.auth.logout(principal)
    }

    pub fn check_forced_logout(&self, token: &str) -> Result<ForcedLogout, BankError> {
        self.auth.check_forced_logout(token)
    }

    pub fn login_approval_status(&self, id: &ApprovalId) -> Result<LoginApprovalStatus, BankError> {
        self.approvals.poll(id)
    }

    pub fn fetch_login_token(&self, id: &ApprovalId) -> Result<ApprovedLogin, BankError> {
        let (access_token, user) = self.approvals.fetch_token(id)?;
        Ok(ApprovedLogin {
            access_token,
            token_type: "bearer",
            user,
        })
    }

    // -- customer -------------------------------------------------------------

    pub fn dashboard(&self, principal: &Principal) -> Result<Dashboard, BankError> {
        let user = self.accounts.get(&principal.account_id)?.profile();
        let mut recent_transactions = self.engine.transactions_for(&principal.account_id);
        recent_transactions.truncate(RECENT_TRANSACTIONS);
        Ok(Dashboard {
            user,
            recent_transactions,
        })
    }

    pub fn transactions(&self, principal: &Principal) -> Vec<Transaction> {
        self.engine.transactions_for(&principal.account_id)
    }

    pub fn create_transaction(
        &self,
        principal: &Principal,
        request: TransferRequest,
    ) -> Result<Transaction, BankError> {
        self.engine.create_transaction(&principal.account_id, request)
    }

    // -- admin ----------------------------------------------------------------

    pub fn approve_signup(&self, admin: &Principal, account: &AccountId) -> Result<(), BankError> {
        admin.require_admin()?;
        self.accounts.set_flag(account, AccountFlag::Approved, true)
    }

    /// Declines a pending signup; the account is removed.
    pub fn decline_signup(&self, admin: &Principal, account: &AccountId) -> Result<(), BankError> {
        admin.require_admin()?;
        self.accounts.remove_unapproved(account)
    }

    pub fn set_frozen(
        &self,
        admin: &Principal,
        account: &AccountId,
        frozen: bool,
    ) -> Result<(), BankError> {
        admin.require_admin()?;
        self.accounts.set_flag(account, AccountFlag::Frozen, frozen)
    }

    pub fn decide_transaction(
        &self,
        admin: &Principal,
        id: &TransactionId,
        decision: Decision,
        notes: Option<String>,
    ) -> Result<Transaction, BankError> {
        admin.require_admin()?;
        self.engine.decide(id, decision, notes)
    }

    pub fn manual_adjust(
        &self,
        admin: &Principal,
        adjustment: ManualAdjustment,
    ) -> Result<Transaction, BankError> {
        admin.require_admin()?;
        self.engine.manual_adjust(adjustment)
    }

    pub fn annotate(
        &self,
        admin: &Principal,
        id: &TransactionId,
        notes: Option<String>,
    ) -> Result<Transaction, BankError> {
        admin.require_admin()?;
        self.engine.annotate(id, notes)
    }

    /// Immediately terminates every session of `account`.
    pub fn revoke(&self, admin: &Principal, account: &AccountId) -> Result<DateTime<Utc>, BankError> {
        admin.require_admin()?;
        let at = self.auth.revoke(account)?;
        info!(admin = %admin.account_id, account = %account, "forced logout");
        Ok(at)
    }

    pub fn pending_transactions(&self, admin: &Principal) -> Result<Vec<Transaction>, BankError> {
        admin.require_admin()?;
        Ok(self.engine.pending_transactions())
    }

    pub fn pending_signups(&self, admin: &Principal) -> Result<Vec<Arc<Account>>, BankError> {
        admin.require_admin()?;
        Ok(self.accounts.pending_signups())
    }

    /// Decides a parked login. Approval issues a session token for the
    /// account, subject to the same gates as a direct login.
    pub fn decide_login(
        &self,
        admin: &Principal,
        id: &ApprovalId,
        decision: LoginDecision,
    ) -> Result<LoginApproval, BankError> {
        admin.require_admin()?;
        self.approvals.decide(id, decision, |account_id| {
            let account = self.accounts.get(account_id)?;
            if !account.is_approved() {
                return Err(BankError::NotApproved);
            }
            if account.is_frozen() {
                return Err(BankError::AccountFrozen);
            }
            let session = self.auth.open_session(&account)?;
            Ok((session.access_token, session.user))
        })
    }

    pub fn pending_login_approvals(&self, admin: &Principal) -> Result<Vec<LoginApproval>, BankError> {
        admin.require_admin()?;
        Ok(self.approvals.pending())
    }

    /// Every account with its login status; idle sessions count as logged
    /// out and are pruned.
    pub fn accounts_overview(&self, admin: &Principal) -> Result<Vec<AccountOverview>, BankError> {
        admin.require_admin()?;
        let sessions: HashMap<_, _> = self
            .auth
            .active_sessions()
            .into_iter()
            .map(|session| (session.account_id, session))
            .collect();

        Ok(self
            .accounts
            .accounts()
            .into_iter()
            .map(|account| match sessions.get(&account.id()) {
                Some(session) => AccountOverview {
                    login_status: LoginStatus::LoggedIn,
                    login_time: Some(session.login_time),
                    last_activity: Some(session.last_activity),
                    account,
                },
                None => AccountOverview {
                    login_status: LoginStatus::LoggedOut,
                    login_time: None,
                    last_activity: None,
                    account,
                },
            })
            .collect())
    }

    /// Drops blacklist entries whose tokens have expired, and login approval
    /// requests decided longer ago than a session lasts.
    pub fn purge_expired(&self) -> usize {
        let cutoff = Utc::now() - self.auth.policy().session_ttl;
        self.auth.purge_expired() + self.approvals.purge_decided(cutoff)
    }
}
