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

//! Password hashing.

use crate::error::BankError;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

/// Hashes and verifies passwords on behalf of the session layer.
pub trait Credentials: Send + Sync {
    fn hash(&self, plain: &str) -> Result<String, BankError>;

    /// Returns `false` for a wrong password and for an unreadable stored hash.
    fn verify(&self, plain: &str, stored: &str) -> bool;
}

/// Argon2id in PHC string format.
#[derive(Clone, Default)]
pub struct Argon2Credentials {
    argon2: Argon2<'static>,
}

impl Argon2Credentials {
    /// Argon2id with explicit costs (memory in KiB).
    ///
    /// Verification always uses the parameters embedded in the stored hash,
    /// so changing costs does not invalidate existing passwords.
    pub fn with_params(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self, BankError> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| BankError::Internal(format!("argon2 params: {e}")))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl Credentials for Argon2Credentials {
    fn hash(&self, plain: &str) -> Result<String, BankError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(plain.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| BankError::Internal(format!("hashing failed: {e}")))
    }

    fn verify(&self, plain: &str, stored: &str) -> bool {
        PasswordHash::new(stored)
            .map(|parsed| self.argon2.verify_password(plain.as_bytes(), &parsed).is_ok())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> Argon2Credentials {
        Argon2Credentials::with_params(8, 1, 1).unwrap()
    }

    #[test]
    fn hash_then_verify() {
        let credentials = cheap();
        let stored = credentials.hash("hunter2").unwrap();
        assert!(stored.starts_with("$argon2id$"));
        assert!(credentials.verify("hunter2", &stored));
        assert!(!credentials.verify("hunter3", &stored));
    }

    #[test]
    fn hashes_are_salted() {
        let credentials = cheap();
        assert_ne!(
            credentials.hash("same").unwrap(),
            credentials.hash("same").unwrap()
        );
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!cheap().verify("anything", "not-a-phc-string"));
    }

    #[test]
    fn invalid_params_are_reported() {
        let result = Argon2Credentials::with_params(0, 0, 0);
        assert!(matches!(result, Err(BankError::Internal(_))));
    }
}
