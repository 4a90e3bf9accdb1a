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

//! Signed bearer tokens (HS256 JWT).
//!
//! Besides the registered `sub`/`iat`/`exp` claims every token carries a
//! random `jti`, so two tokens minted in the same instant never collide in the
//! blacklist, and `iat_us`, the issue time in microseconds, which is what
//! logout watermarks are compared against.

use crate::base::AccountId;
use crate::error::BankError;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Account id.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub iat_us: i64,
    pub jti: String,
}

impl Claims {
    pub fn account_id(&self) -> Result<AccountId, BankError> {
        self.sub.parse().map_err(|_| BankError::InvalidToken)
    }

    pub fn issued_at(&self) -> Result<DateTime<Utc>, BankError> {
        DateTime::from_timestamp_micros(self.iat_us).ok_or(BankError::InvalidToken)
    }
}

/// A freshly minted token and its validity window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenIssuer {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is exact; no grace period.
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn issue(
        &self,
        account: AccountId,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<IssuedToken, BankError> {
        let expires_at = issued_at
            .checked_add_signed(ttl)
            .ok_or_else(|| BankError::Internal("token expiry out of range".into()))?;
        let claims = Claims {
            sub: account.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            iat_us: issued_at.timestamp_micros(),
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| BankError::Internal(format!("failed to sign token: {e}")))?;
        Ok(IssuedToken {
            token,
            issued_at,
            expires_at,
        })
    }

    /// Checks signature and expiry and returns the claims.
    pub fn decode(&self, token: &str) -> Result<Claims, BankError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "token rejected");
                BankError::InvalidToken
            })
    }
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer").finish_non_exhaustive()
    }
}
