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

//! YAML configuration.

use crate::auth::SessionPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable that overrides [`BankConfig::jwt_secret`].
pub const JWT_SECRET_ENV: &str = "BANK_JWT_SECRET";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BankConfig {
    /// Address the HTTP server binds to.
    pub bind: String,
    pub jwt_secret: String,
    pub session_ttl_secs: i64,
    pub default_token_ttl_secs: i64,
    pub idle_timeout_secs: i64,
    /// Park customer logins until an administrator approves them.
    pub require_login_approval: bool,
    pub argon2: Argon2Config,
    pub log_level: String,
    pub use_json: bool,
    /// Administrator created at startup if no account holds the email.
    pub admin: Option<AdminSeed>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Argon2Config {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
    #[serde(default = "AdminSeed::default_name")]
    pub full_name: String,
}

impl AdminSeed {
    fn default_name() -> String {
        "Administrator".to_string()
    }
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8001".to_string(),
            jwt_secret: "change-me".to_string(),
            session_ttl_secs: 24 * 60 * 60,
            default_token_ttl_secs: 15 * 60,
            idle_timeout_secs: 24 * 60 * 60,
            require_login_approval: false,
            argon2: Argon2Config::default(),
            log_level: "info".to_string(),
            use_json: false,
            admin: None,
        }
    }
}

impl Default for Argon2Config {
    // argon2 crate defaults: 19 MiB, 2 passes, 1 lane.
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl BankConfig {
    /// Reads a YAML file, then applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_env();
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn apply_env(&mut self) {
        if let Ok(secret) = std::env::var(JWT_SECRET_ENV) {
            if !secret.is_empty() {
                self.jwt_secret = secret;
            }
        }
    }

    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            session_ttl: chrono::Duration::seconds(self.session_ttl_secs),
            default_token_ttl: chrono::Duration::seconds(self.default_token_ttl_secs),
            idle_timeout: chrono::Duration::seconds(self.idle_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_yields_defaults() {
        let config = BankConfig::from_yaml("{}").unwrap();
        assert_eq!(config, BankConfig::default());
        assert_eq!(config.session_policy(), SessionPolicy::default());
    }

    #[test]
    fn partial_yaml_overrides_fields() {
        let config = BankConfig::from_yaml(
            r#"
bind: "0.0.0.0:9000"
require_login_approval: true
argon2:
  memory_kib: 64
admin:
  email: root@bank.local
  password: hunter2
"#,
        )
        .unwrap();
        assert_eq!(config.bind, "0.0.0.0:9000");
        assert!(config.require_login_approval);
        assert_eq!(config.argon2.memory_kib, 64);
        assert_eq!(config.argon2.iterations, 2);
        let admin = config.admin.unwrap();
        assert_eq!(admin.full_name, "Administrator");
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        assert!(matches!(
            BankConfig::from_yaml("bind: [unterminated"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            BankConfig::load("/definitely/not/here.yaml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
