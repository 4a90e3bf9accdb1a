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

//! Token blacklist and force-logout notifications.
//!
//! The per-account logout watermark lives on the account itself; this store
//! keeps the state that only exists for the lifetime of the process.

use crate::base::AccountId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

pub trait RevocationStore: Send + Sync {
    /// Blacklists a token until its natural expiry.
    fn blacklist(&self, token: &str, expires_at: DateTime<Utc>);

    fn is_blacklisted(&self, token: &str) -> bool;

    /// Drops entries for tokens that have expired anyway; returns how many.
    ///
    /// A token stays valid through its whole `exp` second, so its entry is
    /// kept until that second has passed.
    fn purge_expired(&self, now: DateTime<Utc>) -> usize;

    /// Arms the one-shot notification for an account.
    fn arm_forced_logout(&self, account: AccountId, at: DateTime<Utc>);

    /// Consumes the notification, if armed.
    fn take_forced_logout(&self, account: &AccountId) -> Option<DateTime<Utc>>;
}

#[derive(Debug, Default)]
pub struct InMemoryRevocationStore {
    /// Revoked token to its expiry.
    blacklist: DashMap<String, DateTime<Utc>>,
    forced_logouts: DashMap<AccountId, DateTime<Utc>>,
}

impl InMemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RevocationStore for InMemoryRevocationStore {
    fn blacklist(&self, token: &str, expires_at: DateTime<Utc>) {
        self.blacklist.insert(token.to_string(), expires_at);
    }

    fn is_blacklisted(&self, token: &str) -> bool {
        self.blacklist.contains_key(token)
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.blacklist.len();
        let now_secs = now.timestamp();
        self.blacklist
            .retain(|_, expires_at| expires_at.timestamp() >= now_secs);
        before.saturating_sub(self.blacklist.len())
    }

    fn arm_forced_logout(&self, account: AccountId, at: DateTime<Utc>) {
        self.forced_logouts.insert(account, at);
    }

    fn take_forced_logout(&self, account: &AccountId) -> Option<DateTime<Utc>> {
        self.forced_logouts.remove(account).map(|(_, at)| at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn blacklisted_tokens_are_reported() {
        let store = InMemoryRevocationStore::new();
        store.blacklist("abc", Utc::now() + Duration::hours(1));
        assert!(store.is_blacklisted("abc"));
        assert!(!store.is_blacklisted("abd"));
    }

    #[test]
    fn purge_drops_only_expired_entries() {
        let store = InMemoryRevocationStore::new();
        let now = Utc::now();
        store.blacklist("stale", now - Duration::seconds(1));
        store.blacklist("live", now + Duration::hours(1));

        assert_eq!(store.purge_expired(now), 1);
        assert!(!store.is_blacklisted("stale"));
        assert!(store.is_blacklisted("live"));
    }

    #[test]
    fn purge_keeps_entries_through_their_expiry_second() {
        let store = InMemoryRevocationStore::new();
        let exp = DateTime::from_timestamp(Utc::now().timestamp() + 60, 0).unwrap();
        store.blacklist("edge", exp);

        assert_eq!(store.purge_expired(exp + Duration::milliseconds(999)), 0);
        assert!(store.is_blacklisted("edge"));
        assert_eq!(store.purge_expired(exp + Duration::seconds(1)), 1);
        assert!(!store.is_blacklisted("edge"));
    }

    #[test]
    fn forced_logout_is_one_shot() {
        let store = InMemoryRevocationStore::new();
        let account = AccountId::new();
        let at = Utc::now();
        store.arm_forced_logout(account, at);

        assert_eq!(store.take_forced_logout(&account), Some(at));
        assert_eq!(store.take_forced_logout(&account), None);
    }

    #[test]
    fn rearming_keeps_latest_time() {
        let store = InMemoryRevocationStore::new();
        let account = AccountId::new();
        let first = Utc::now();
        store.arm_forced_logout(account, first);
        store.arm_forced_logout(account, first + Duration::seconds(5));
        assert_eq!(
            store.take_forced_logout(&account),
            Some(first + Duration::seconds(5))
        );
    }
}
