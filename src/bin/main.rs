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

use clap::Parser;
use custodial_ledger::{Bank, BankConfig, http, init_logging};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// How often expired entries are swept from the blacklist and approval table.
const PURGE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Custodial ledger server
///
/// Serves the banking API: signups, transfer requests awaiting admin
/// approval, and revocable bearer sessions.
#[derive(Parser, Debug)]
#[command(name = "custodial-ledger")]
#[command(about = "A custodial ledger with admin-approved transfers", long_about = None)]
struct Args {
    /// Path to a YAML configuration file
    ///
    /// Without it the built-in defaults apply (plus `BANK_JWT_SECRET`).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the configuration
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match BankConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading configuration: {}", e);
                process::exit(1);
            }
        },
        None => {
            let mut config = BankConfig::default();
            config.apply_env();
            config
        }
    };
    if let Some(bind) = args.bind {
        config.bind = bind;
    }

    init_logging(&config);
    if config.jwt_secret == BankConfig::default().jwt_secret {
        warn!("using the built-in JWT secret; set BANK_JWT_SECRET in production");
    }

    let bank = match Bank::new(config.clone()) {
        Ok(bank) => Arc::new(bank),
        Err(e) => {
            error!(error = %e, "failed to build bank");
            process::exit(1);
        }
    };

    if let Some(seed) = &config.admin {
        match bank.seed_admin(&seed.email, &seed.password, &seed.full_name) {
            Ok(Some(id)) => info!(account = %id, email = %seed.email, "administrator created"),
            Ok(None) => info!(email = %seed.email, "administrator already present"),
            Err(e) => {
                error!(error = %e, "failed to seed administrator");
                process::exit(1);
            }
        }
    }

    let purger = Arc::clone(&bank);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            let purged = purger.purge_expired();
            if purged > 0 {
                info!(purged, "expired blacklist and login approval entries dropped");
            }
        }
    });

    let listener = match TcpListener::bind(&config.bind).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(bind = %config.bind, error = %e, "failed to bind");
            process::exit(1);
        }
    };

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("could not install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
        info!("shutting down");
    };

    if let Err(e) = http::serve(listener, bank, shutdown).await {
        error!(error = %e, "server error");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_flag_is_optional() {
        let args = Args::try_parse_from(["custodial-ledger"]).unwrap();
        assert!(args.config.is_none());
        assert!(args.bind.is_none());
    }

    #[test]
    fn parses_config_and_bind() {
        let args = Args::try_parse_from([
            "custodial-ledger",
            "--config",
            "config/default.yaml",
            "--bind",
            "0.0.0.0:9000",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("config/default.yaml")));
        assert_eq!(args.bind.as_deref(), Some("0.0.0.0:9000"));
    }
}
