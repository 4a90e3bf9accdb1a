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

//! Two-step login: a customer's login is parked until an administrator
//! approves it, after which the client fetches its token.

use crate::account::AccountProfile;
use crate::base::{AccountId, ApprovalId, timestamp_now};
use crate::error::BankError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoginApprovalStatus {
    Pending,
    Approved,
    Denied,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoginDecision {
    Approve,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginApproval {
    pub id: ApprovalId,
    pub account_id: AccountId,
    pub email: String,
    pub status: LoginApprovalStatus,
    pub requested_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    #[serde(skip_serializing)]
    pub profile: Option<AccountProfile>,
}

/// Table of login approval requests.
#[derive(Debug, Default)]
pub struct LoginApprovals {
    requests: DashMap<ApprovalId, Arc<Mutex<LoginApproval>>>,
}

impl LoginApprovals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks a login and returns the id the client polls with.
    pub fn request(&self, account_id: AccountId, email: &str) -> ApprovalId {
        let id = ApprovalId::new();
        let approval = LoginApproval {
            id,
            account_id,
            email: email.to_string(),
            status: LoginApprovalStatus::Pending,
            requested_at: timestamp_now(),
            decided_at: None,
            token: None,
            profile: None,
        };
        self.requests.insert(id, Arc::new(Mutex::new(approval)));
        info!(approval = %id, account = %account_id, "login approval requested");
        id
    }

    /// Decides a pending request.
    ///
    /// On approval `issue` mints the token and profile snapshot for the
    /// account; it runs under the request's lock, so a request is issued at
    /// most one token. If `issue` fails the request stays pending.
    ///
    /// # Errors
    ///
    /// - [`BankError::NotFound`] - unknown approval id.
    /// - [`BankError::AlreadyDecided`] - the request is no longer pending.
    /// - whatever `issue` returns.
    pub fn decide<F>(
        &self,
        id: &ApprovalId,
        decision: LoginDecision,
        issue: F,
    ) -> Result<LoginApproval, BankError>
    where
        F: FnOnce(&AccountId) -> Result<(String, AccountProfile), BankError>,
    {
        let entry = self.entry(id)?;
        let mut approval = entry.lock();
        if approval.status != LoginApprovalStatus::Pending {
            return Err(BankError::AlreadyDecided);
        }

        match decision {
            LoginDecision::Approve => {
                let (token, profile) = issue(&approval.account_id)?;
                approval.token = Some(token);
                approval.profile = Some(profile);
                approval.status = LoginApprovalStatus::Approved;
            }
            LoginDecision::Deny => approval.status = LoginApprovalStatus::Denied,
        }
        approval.decided_at = Some(timestamp_now());

        info!(approval = %id, status = ?approval.status, "login approval decided");
        Ok(approval.clone())
    }

    pub fn poll(&self, id: &ApprovalId) -> Result<LoginApprovalStatus, BankError> {
        Ok(self.entry(id)?.lock().status)
    }

    /// Token and profile of an approved request.
    ///
    /// # Errors
    ///
    /// [`BankError::NotReady`] while pending or after a denial.
    pub fn fetch_token(&self, id: &ApprovalId) -> Result<(String, AccountProfile), BankError> {
        let entry = self.entry(id)?;
        let approval = entry.lock();
        match (&approval.status, &approval.token, &approval.profile) {
            (LoginApprovalStatus::Approved, Some(token), Some(profile)) => {
                Ok((token.clone(), profile.clone()))
            }
            _ => Err(BankError::NotReady),
        }
    }

    /// Undecided requests, oldest first.
    pub fn pending(&self) -> Vec<LoginApproval> {
        let entries: Vec<_> = self
            .requests
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        let mut pending: Vec<_> = entries
            .iter()
            .map(|entry| entry.lock().clone())
            .filter(|approval| approval.status == LoginApprovalStatus::Pending)
            .collect();
        pending.sort_by_key(|approval| approval.requested_at);
        pending
    }

    /// Drops requests decided before `cutoff`; pending ones are kept.
    pub fn purge_decided(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.requests.len();
        self.requests.retain(|_, entry| {
            entry
                .lock()
                .decided_at
                .is_none_or(|decided_at| decided_at >= cutoff)
        });
        before.saturating_sub(self.requests.len())
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    fn entry(&self, id: &ApprovalId) -> Result<Arc<Mutex<LoginApproval>>, BankError> {
        self.requests
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or(BankError::NotFound)
    }
}
