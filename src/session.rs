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

//! Session registry.
//!
//! One row per account. A second login replaces the row; the token it held is
//! not revoked and stays valid until it expires or the account is force-logged
//! out. The in-memory store forgets everything on restart, which logs every
//! user out.

use crate::base::AccountId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub account_id: AccountId,
    #[serde(skip_serializing)]
    pub token: String,
    pub token_expires_at: DateTime<Utc>,
    pub login_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Backing store for the session registry.
pub trait SessionStore: Send + Sync {
    /// Registers a session, returning the row it replaced.
    fn register(&self, session: Session) -> Option<Session>;

    fn get(&self, account: &AccountId) -> Option<Session>;

    /// Refreshes last activity while the row still holds `token`; `false`
    /// when there is no such row.
    fn touch_if_token(&self, account: &AccountId, token: &str, at: DateTime<Utc>) -> bool;

    fn remove(&self, account: &AccountId) -> Option<Session>;

    /// Removes the row only while it still holds `token`.
    fn remove_if_token(&self, account: &AccountId, token: &str) -> Option<Session>;

    fn sessions(&self) -> Vec<Session>;
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<AccountId, Session>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn register(&self, session: Session) -> Option<Session> {
        self.sessions.insert(session.account_id, session)
    }

    fn get(&self, account: &AccountId) -> Option<Session> {
        self.sessions.get(account).map(|entry| entry.value().clone())
    }

    fn touch_if_token(&self, account: &AccountId, token: &str, at: DateTime<Utc>) -> bool {
        match self.sessions.get_mut(account) {
            Some(mut entry) if entry.token == token => {
                if entry.last_activity < at {
                    entry.last_activity = at;
                }
                true
            }
            _ => false,
        }
    }

    fn remove(&self, account: &AccountId) -> Option<Session> {
        self.sessions.remove(account).map(|(_, session)| session)
    }

    fn remove_if_token(&self, account: &AccountId, token: &str) -> Option<Session> {
        match self.sessions.entry(*account) {
            Entry::Occupied(entry) if entry.get().token == token => Some(entry.remove()),
            _ => None,
        }
    }

    fn sessions(&self) -> Vec<Session> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}
