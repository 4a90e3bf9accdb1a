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

//! Authentication, token validation and administrator revocation.
//!
//! A token is honoured only if all of the following hold, checked in order:
//!
//! 1. it is not blacklisted;
//! 2. its signature and expiry are valid;
//! 3. its account still exists;
//! 4. it was issued no earlier than the account's logout watermark.
//!
//! Revoking an account blacklists its registered token, advances the
//! watermark (which also catches tokens whose session row was replaced by a
//! later login) and arms a one-shot notification the client can poll for.

use crate::account::{Account, AccountProfile};
use crate::base::{AccountId, Role, timestamp_now};
use crate::credentials::Credentials;
use crate::error::BankError;
use crate::revocation::RevocationStore;
use crate::session::{Session, SessionStore};
use crate::store::AccountStore;
use crate::token::{IssuedToken, TokenIssuer};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Token lifetimes and session idle limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Lifetime of tokens issued by a login.
    pub session_ttl: Duration,
    /// Lifetime of tokens issued without an explicit one.
    pub default_token_ttl: Duration,
    /// Sessions idle this long no longer count as logged in.
    pub idle_timeout: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            session_ttl: Duration::hours(24),
            default_token_ttl: Duration::minutes(15),
            idle_timeout: Duration::hours(24),
        }
    }
}

/// The caller behind a validated token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub account_id: AccountId,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// # Errors
    ///
    /// [`BankError::Forbidden`] unless the caller is an administrator.
    pub fn require_admin(&self) -> Result<(), BankError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(BankError::Forbidden)
        }
    }
}

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedSession {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
    pub user: AccountProfile,
}

/// Answer to a client's force-logout poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ForcedLogout {
    pub force_logout: bool,
    pub logout_time: Option<DateTime<Utc>>,
}

pub struct Authenticator {
    accounts: Arc<AccountStore>,
    sessions: Arc<dyn SessionStore>,
    revocations: Arc<dyn RevocationStore>,
    credentials: Arc<dyn Credentials>,
    tokens: TokenIssuer,
    policy: SessionPolicy,
}

impl Authenticator {
    pub fn new(
        accounts: Arc<AccountStore>,
        sessions: Arc<dyn SessionStore>,
        revocations: Arc<dyn RevocationStore>,
        credentials: Arc<dyn Credentials>,
        tokens: TokenIssuer,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            accounts,
            sessions,
            revocations,
            credentials,
            tokens,
            policy,
        }
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    pub fn credentials(&self) -> &Arc<dyn Credentials> {
        &self.credentials
    }

    /// Checks a password and the account gates, without issuing anything.
    ///
    /// # Errors
    ///
    /// - [`BankError::InvalidCredentials`] - unknown email or wrong password.
    /// - [`BankError::NotApproved`] - onboarding not approved yet.
    /// - [`BankError::AccountFrozen`] - the account is frozen.
    pub fn check_credentials(&self, email: &str, password: &str) -> Result<Arc<Account>, BankError> {
        let account = self
            .accounts
            .get_by_email(email)
            .map_err(|_| BankError::InvalidCredentials)?;
        if !self.credentials.verify(password, &account.password_hash()) {
            debug!(account = %account.id(), "password mismatch");
            return Err(BankError::InvalidCredentials);
        }
        if !account.is_approved() {
            return Err(BankError::NotApproved);
        }
        if account.is_frozen() {
            return Err(BankError::AccountFrozen);
        }
        Ok(account)
    }

    /// Verifies credentials and opens a session.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<AuthenticatedSession, BankError> {
        let account = self.check_credentials(email, password)?;
        self.open_session(&account)
    }

    /// Issues a session token for an account and registers it, replacing any
    /// existing session row for that account.
    pub fn open_session(&self, account: &Account) -> Result<AuthenticatedSession, BankError> {
        let issued = self.issue_token(&account.id(), Some(self.policy.session_ttl))?;
        let replaced = self.sessions.register(Session {
            account_id: account.id(),
            token: issued.token.clone(),
            token_expires_at: issued.expires_at,
            login_time: issued.issued_at,
            last_activity: issued.issued_at,
        });
        info!(
            account = %account.id(),
            replaced_session = replaced.is_some(),
            "session opened"
        );
        Ok(AuthenticatedSession {
            access_token: issued.token,
            token_type: "bearer",
            expires_at: issued.expires_at,
            user: account.profile(),
        })
    }

    /// Mints a token without registering a session; `None` means the default
    /// short lifetime.
    pub fn issue_token(&self, account: &AccountId, ttl: Option<Duration>) -> Result<IssuedToken, BankError> {
        self.tokens.issue(
            *account,
            timestamp_now(),
            ttl.unwrap_or(self.policy.default_token_ttl),
        )
    }

    /// Resolves a bearer token to its account and refreshes the session.
    ///
    /// # Errors
    ///
    /// - [`BankError::Revoked`] - blacklisted, or issued before the account's
    ///   logout watermark.
    /// - [`BankError::InvalidToken`] - malformed, expired, badly signed, or
    ///   the account is gone.
    pub fn validate(&self, token: &str) -> Result<Principal, BankError> {
        if self.revocations.is_blacklisted(token) {
            return Err(BankError::Revoked);
        }
        let claims = self.tokens.decode(token)?;
        let account_id = claims.account_id()?;
        let issued_at = claims.issued_at()?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0).ok_or(BankError::InvalidToken)?;
        let account = self
            .accounts
            .get(&account_id)
            .map_err(|_| BankError::InvalidToken)?;

        if let Some(watermark) = account.force_logout_at() {
            if issued_at < watermark {
                self.sessions.remove_if_token(&account_id, token);
                debug!(account = %account_id, "token predates forced logout");
                return Err(BankError::Revoked);
            }
        }

        self.sessions.touch_if_token(&account_id, token, Utc::now());
        Ok(Principal {
            account_id,
            email: account.email().to_string(),
            role: account.role(),
            token: token.to_string(),
            issued_at,
            expires_at,
        })
    }

    /// Terminates every session of an account issued up to now.
    ///
    /// Returns the new logout watermark.
    ///
    /// # Errors
    ///
    /// [`BankError::NotFound`] if the account does not exist.
    pub fn revoke(&self, account_id: &AccountId) -> Result<DateTime<Utc>, BankError> {
        let account = self.accounts.get(account_id)?;
        let at = timestamp_now();

        // Watermark first: from here on every older token fails validation,
        // including ones a concurrent login is about to register.
        account.advance_logout_watermark(at);
        if let Some(session) = self.sessions.remove(account_id) {
            self.revocations
                .blacklist(&session.token, session.token_expires_at);
        }
        self.revocations.arm_forced_logout(*account_id, at);

        info!(account = %account_id, watermark = %at, "sessions revoked");
        Ok(at)
    }

    /// Consumes the account's force-logout notification.
    ///
    /// A session row opened before the logout is dropped; a row opened after
    /// it (a fresh login) is left alone.
    pub fn poll_forced_logout(&self, account_id: &AccountId) -> Option<DateTime<Utc>> {
        let at = self.revocations.take_forced_logout(account_id)?;
        if let Some(session) = self.sessions.get(account_id) {
            if session.login_time < at {
                self.sessions.remove_if_token(account_id, &session.token);
            }
        }
        Some(at)
    }

    /// Force-logout poll on behalf of a client holding `token`.
    ///
    /// The token only needs a valid signature and expiry: a client whose
    /// token was just revoked still learns why. A notification is reported
    /// only to tokens issued before it, and consumed either way.
    ///
    /// # Errors
    ///
    /// - [`BankError::InvalidToken`] - token malformed, expired or forged.
    /// - [`BankError::Revoked`] - nothing pending, but the token is revoked.
    pub fn check_forced_logout(&self, token: &str) -> Result<ForcedLogout, BankError> {
        let claims = self.tokens.decode(token)?;
        let account_id = claims.account_id()?;
        let issued_at = claims.issued_at()?;

        match self.poll_forced_logout(&account_id) {
            Some(at) if issued_at < at => Ok(ForcedLogout {
                force_logout: true,
                logout_time: Some(at),
            }),
            _ => {
                self.validate(token)?;
                Ok(ForcedLogout {
                    force_logout: false,
                    logout_time: None,
                })
            }
        }
    }

    /// Ends the caller's own session and blacklists its token.
    pub fn logout(&self, principal: &Principal) {
        self.revocations
            .blacklist(&principal.token, principal.expires_at);
        self.sessions
            .remove_if_token(&principal.account_id, &principal.token);
        info!(account = %principal.account_id, "logged out");
    }

    pub fn session(&self, account_id: &AccountId) -> Option<Session> {
        self.sessions.get(account_id)
    }

    /// Sessions active within the idle timeout; stale rows are dropped.
    pub fn active_sessions(&self) -> Vec<Session> {
        let now = Utc::now();
        let mut active = Vec::new();
        for session in self.sessions.sessions() {
            if now - session.last_activity < self.policy.idle_timeout {
                active.push(session);
            } else {
                self.sessions
                    .remove_if_token(&session.account_id, &session.token);
            }
        }
        active
    }

    /// Drops blacklist entries for tokens past their expiry.
    pub fn purge_expired(&self) -> usize {
        self.revocations.purge_expired(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::NewAccount;
    use crate::credentials::Argon2Credentials;
    use crate::revocation::InMemoryRevocationStore;
    use crate::session::InMemorySessionStore;

    fn authenticator() -> (Authenticator, Arc<AccountStore>) {
        let accounts = Arc::new(AccountStore::new());
        let auth = Authenticator::new(
            accounts.clone(),
            Arc::new(InMemorySessionStore::new()),
            Arc::new(InMemoryRevocationStore::new()),
            Arc::new(Argon2Credentials::with_params(8, 1, 1).unwrap()),
            TokenIssuer::new(b"unit-test-secret"),
            SessionPolicy::default(),
        );
        (auth, accounts)
    }

    fn approved_customer(auth: &Authenticator, accounts: &AccountStore, email: &str) -> AccountId {
        let hash = auth.credentials().hash("pw").unwrap();
        let profile = NewAccount {
            approved: true,
            ..NewAccount::customer(email, "Test User", hash)
        };
        accounts.create(profile).unwrap().id()
    }

    #[test]
    fn login_registers_session_and_validates() {
        let (auth, accounts) = authenticator();
        let id = approved_customer(&auth, &accounts, "a@x.io");

        let session = auth.authenticate("a@x.io", "pw").unwrap();
        assert_eq!(session.token_type, "bearer");
        assert_eq!(session.user.id, id);
        assert!(auth.session(&id).is_some());

        let principal = auth.validate(&session.access_token).unwrap();
        assert_eq!(principal.account_id, id);
        assert!(!principal.is_admin());
        assert_eq!(principal.require_admin(), Err(BankError::Forbidden));
    }

    #[test]
    fn login_gates_are_checked_in_order() {
        let (auth, accounts) = authenticator();
        let hash = auth.credentials().hash("pw").unwrap();
        let pending = accounts
            .create(NewAccount::customer("p@x.io", "Pending", hash))
            .unwrap();

        assert_eq!(
            auth.authenticate("nobody@x.io", "pw").unwrap_err(),
            BankError::InvalidCredentials
        );
        assert_eq!(
            auth.authenticate("p@x.io", "wrong").unwrap_err(),
            BankError::InvalidCredentials
        );
        assert_eq!(
            auth.authenticate("p@x.io", "pw").unwrap_err(),
            BankError::NotApproved
        );

        accounts
            .set_flag(&pending.id(), crate::account::AccountFlag::Approved, true)
            .unwrap();
        accounts
            .set_flag(&pending.id(), crate::account::AccountFlag::Frozen, true)
            .unwrap();
        assert_eq!(
            auth.authenticate("p@x.io", "pw").unwrap_err(),
            BankError::AccountFrozen
        );
    }

    #[test]
    fn replaced_token_does_not_refresh_current_session() {
        let (auth, accounts) = authenticator();
        let id = approved_customer(&auth, &accounts, "s@x.io");

        let first = auth.authenticate("s@x.io", "pw").unwrap();
        let second = auth.authenticate("s@x.io", "pw").unwrap();
        let registered = auth.session(&id).unwrap().last_activity;

        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(auth.validate(&first.access_token).is_ok());
        assert_eq!(auth.session(&id).unwrap().last_activity, registered);

        assert!(auth.validate(&second.access_token).is_ok());
        assert!(auth.session(&id).unwrap().last_activity > registered);
    }

    #[test]
    fn revoke_kills_replaced_tokens_too() {
        let (auth, accounts) = authenticator();
        let id = approved_customer(&auth, &accounts, "b@x.io");

        let first = auth.authenticate("b@x.io", "pw").unwrap();
        let second = auth.authenticate("b@x.io", "pw").unwrap();
        assert!(auth.validate(&first.access_token).is_ok());

        auth.revoke(&id).unwrap();
        assert_eq!(auth.validate(&first.access_token), Err(BankError::Revoked));
        assert_eq!(auth.validate(&second.access_token), Err(BankError::Revoked));
        assert!(auth.session(&id).is_none());

        let fresh = auth.authenticate("b@x.io", "pw").unwrap();
        assert!(auth.validate(&fresh.access_token).is_ok());
    }

    #[test]
    fn forced_logout_is_reported_once() {
        let (auth, accounts) = authenticator();
        let id = approved_customer(&auth, &accounts, "c@x.io");
        let session = auth.authenticate("c@x.io", "pw").unwrap();

        let at = auth.revoke(&id).unwrap();
        let status = auth.check_forced_logout(&session.access_token).unwrap();
        assert!(status.force_logout);
        assert_eq!(status.logout_time, Some(at));

        assert_eq!(
            auth.check_forced_logout(&session.access_token),
            Err(BankError::Revoked)
        );
    }

    #[test]
    fn fresh_login_after_revoke_sees_no_notification() {
        let (auth, accounts) = authenticator();
        let id = approved_customer(&auth, &accounts, "d@x.io");
        auth.revoke(&id).unwrap();

        let fresh = auth.authenticate("d@x.io", "pw").unwrap();
        let status = auth.check_forced_logout(&fresh.access_token).unwrap();
        assert!(!status.force_logout);
        assert!(auth.session(&id).is_some());
    }

    #[test]
    fn logout_blacklists_own_token() {
        let (auth, accounts) = authenticator();
        let id = approved_customer(&auth, &accounts, "e@x.io");
        let session = auth.authenticate("e@x.io", "pw").unwrap();
        let principal = auth.validate(&session.access_token).unwrap();

        auth.logout(&principal);
        assert_eq!(auth.validate(&session.access_token), Err(BankError::Revoked));
        assert!(auth.session(&id).is_none());
    }

    #[test]
    fn revoking_unknown_account_fails() {
        let (auth, _) = authenticator();
        assert_eq!(auth.revoke(&AccountId::new()), Err(BankError::NotFound));
    }

    #[test]
    fn idle_sessions_drop_out_of_active_list() {
        let accounts = Arc::new(AccountStore::new());
        let auth = Authenticator::new(
            accounts.clone(),
            Arc::new(InMemorySessionStore::new()),
            Arc::new(InMemoryRevocationStore::new()),
            Arc::new(Argon2Credentials::with_params(8, 1, 1).unwrap()),
            TokenIssuer::new(b"unit-test-secret"),
            SessionPolicy {
                idle_timeout: Duration::zero(),
                ..SessionPolicy::default()
            },
        );
        let id = approved_customer(&auth, &accounts, "f@x.io");
        auth.authenticate("f@x.io", "pw").unwrap();

        assert!(auth.active_sessions().is_empty());
        assert!(auth.session(&id).is_none());
    }
}
