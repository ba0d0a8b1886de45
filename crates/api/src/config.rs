// SPDX-FileCopyrightText: 2025 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable {0} must be set")]
    Missing(&'static str),
    #[error("Invalid value '{value}' for {var}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub signing_key_file: PathBuf,
    pub access_token_ttl: Duration,
    /// Register the first user of an empty database as a global admin.
    pub first_user_admin: bool,
    pub log_level: tracing::Level,
}

impl Config {
    /// Reads the process environment, after loading `.env` if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                eprintln!("Failed to load .env file: {e}");
            }
        }
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            listen_addr: parse_or(&lookup, "LISTEN_ADDR", "[::]:8080")?,
            signing_key_file: PathBuf::from(
                lookup("SIGNING_KEY_FILE").unwrap_or_else(|| "key.json".to_string()),
            ),
            access_token_ttl: Duration::from_secs(parse_or(&lookup, "ACCESS_TOKEN_TTL_SECS", "3600")?),
            first_user_admin: parse_or(&lookup, "FLASHPACK_FIRST_USER_ADMIN", "false")?,
            log_level: parse_or(&lookup, "LOG_LEVEL", "info")?,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: &str,
) -> Result<T, ConfigError> {
    let value = lookup(var).unwrap_or_else(|| default.to_string());
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { var, value })
}
