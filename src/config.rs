// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names, default values and the
//! [`AppConfig`] loaded from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding the embedded relational store | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `REDIS_URL` | Shared cache store for sessions and locks | in-process cache |
//! | `ENCLAVE_HOST` | Secure enclave host | mock enclave |
//! | `ENCLAVE_PORT` | Secure enclave port | `9443` |
//! | `ENCLAVE_TIMEOUT_MS` | Deadline applied to every enclave call | `10000` |
//! | `ENCLAVE_MOCK_SEED` | Hex seed for the mock enclave entropy stream | random |
//! | `DEFAULT_QUORUM_THRESHOLD` | Root quorum threshold of new organizations | `1` |
//! | `SESSION_TTL_SECS` | Session lifetime | `3600` |
//! | `BOOTSTRAP_LOCK_TTL_SECS` | Organization bootstrap lock TTL | `30` |
//! | `ADDRESS_COLLISION_POLICY` | `reject` or `regenerate` | `reject` |
//! | `LEDGER_SIGNING_KEY` | Hex secp256k1 key signing activity proofs | random |
//! | `CACHE_CAPACITY` | Entries kept by the in-process cache | `10000` |
//! | `IDENTITY_ASSERTION_SECRET` | HS256 secret of sign-in assertions, at least 32 bytes | sign-in disabled |
//! | `IDENTITY_ASSERTION_ISSUER` | Expected `iss` of sign-in assertions | `quorum-custody-identity` |

use std::{env, path::PathBuf, time::Duration};

use crate::logging::LogFormat;

/// Environment variable name for the data directory path.
///
/// The relational store (`custody.redb`) is created inside this directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
pub const REDIS_URL_ENV: &str = "REDIS_URL";
pub const ENCLAVE_HOST_ENV: &str = "ENCLAVE_HOST";
pub const ENCLAVE_PORT_ENV: &str = "ENCLAVE_PORT";
pub const ENCLAVE_TIMEOUT_MS_ENV: &str = "ENCLAVE_TIMEOUT_MS";
pub const ENCLAVE_MOCK_SEED_ENV: &str = "ENCLAVE_MOCK_SEED";
pub const DEFAULT_QUORUM_THRESHOLD_ENV: &str = "DEFAULT_QUORUM_THRESHOLD";
pub const SESSION_TTL_SECS_ENV: &str = "SESSION_TTL_SECS";
pub const BOOTSTRAP_LOCK_TTL_SECS_ENV: &str = "BOOTSTRAP_LOCK_TTL_SECS";
pub const ADDRESS_COLLISION_POLICY_ENV: &str = "ADDRESS_COLLISION_POLICY";
pub const LEDGER_SIGNING_KEY_ENV: &str = "LEDGER_SIGNING_KEY";
pub const CACHE_CAPACITY_ENV: &str = "CACHE_CAPACITY";
pub const IDENTITY_ASSERTION_SECRET_ENV: &str = "IDENTITY_ASSERTION_SECRET";
pub const IDENTITY_ASSERTION_ISSUER_ENV: &str = "IDENTITY_ASSERTION_ISSUER";

/// Default data directory.
pub const DEFAULT_DATA_DIR: &str = "/data";
/// File name of the relational store inside `DATA_DIR`.
pub const DATABASE_FILE: &str = "custody.redb";
pub const DEFAULT_ENCLAVE_PORT: u16 = 9443;
pub const DEFAULT_ENCLAVE_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_BOOTSTRAP_LOCK_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;
pub const DEFAULT_IDENTITY_ASSERTION_ISSUER: &str = "quorum-custody-identity";
/// Shortest accepted HS256 secret for sign-in assertions.
pub const MIN_ASSERTION_SECRET_LEN: usize = 32;

/// Configuration errors raised while reading the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            name,
            reason: reason.into(),
        }
    }
}

/// What to do when a freshly derived address already belongs to another wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressCollisionPolicy {
    /// Fail the wallet creation with a conflict.
    #[default]
    Reject,
    /// Draw fresh entropy from the enclave and derive again.
    Regenerate,
}

impl std::str::FromStr for AddressCollisionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "regenerate" => Ok(Self::Regenerate),
            other => Err(format!("unknown collision policy '{other}'")),
        }
    }
}

/// Where the enclave client connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnclaveMode {
    /// Remote secure-compute service.
    Remote { host: String, port: u16 },
    /// Deterministic in-process mock, seeded from `ENCLAVE_MOCK_SEED` when set.
    Mock { seed: Option<[u8; 32]> },
}

/// Complete runtime configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub log_format: LogFormat,
    pub redis_url: Option<String>,
    pub enclave: EnclaveMode,
    pub enclave_timeout: Duration,
    pub default_quorum_threshold: u32,
    pub session_ttl: Duration,
    pub bootstrap_lock_ttl: Duration,
    pub address_collision_policy: AddressCollisionPolicy,
    pub ledger_signing_key: Option<[u8; 32]>,
    pub cache_capacity: usize,
    pub identity_assertion_secret: Option<Vec<u8>>,
    pub identity_assertion_issuer: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_format: LogFormat::Pretty,
            redis_url: None,
            enclave: EnclaveMode::Mock { seed: None },
            enclave_timeout: DEFAULT_ENCLAVE_TIMEOUT,
            default_quorum_threshold: 1,
            session_ttl: DEFAULT_SESSION_TTL,
            bootstrap_lock_ttl: DEFAULT_BOOTSTRAP_LOCK_TTL,
            address_collision_policy: AddressCollisionPolicy::Reject,
            ledger_signing_key: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            identity_assertion_secret: None,
            identity_assertion_issuer: DEFAULT_IDENTITY_ASSERTION_ISSUER.to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = parse_or(var(PORT_ENV), PORT_ENV, defaults.port)?;

        let log_format = match var(LOG_FORMAT_ENV) {
            Some(v) => v
                .parse::<LogFormat>()
                .map_err(|e| ConfigError::invalid(LOG_FORMAT_ENV, e))?,
            None => defaults.log_format,
        };

        let enclave = match var(ENCLAVE_HOST_ENV) {
            Some(host) => EnclaveMode::Remote {
                host,
                port: parse_or(var(ENCLAVE_PORT_ENV), ENCLAVE_PORT_ENV, DEFAULT_ENCLAVE_PORT)?,
            },
            None => EnclaveMode::Mock {
                seed: var(ENCLAVE_MOCK_SEED_ENV)
                    .map(|v| parse_key(&v, ENCLAVE_MOCK_SEED_ENV))
                    .transpose()?,
            },
        };

        let enclave_timeout_ms: u64 = parse_or(
            var(ENCLAVE_TIMEOUT_MS_ENV),
            ENCLAVE_TIMEOUT_MS_ENV,
            DEFAULT_ENCLAVE_TIMEOUT.as_millis() as u64,
        )?;
        if enclave_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                ENCLAVE_TIMEOUT_MS_ENV,
                "enclave calls require a non-zero deadline",
            ));
        }

        let default_quorum_threshold: u32 = parse_or(
            var(DEFAULT_QUORUM_THRESHOLD_ENV),
            DEFAULT_QUORUM_THRESHOLD_ENV,
            defaults.default_quorum_threshold,
        )?;
        if default_quorum_threshold == 0 {
            return Err(ConfigError::invalid(
                DEFAULT_QUORUM_THRESHOLD_ENV,
                "threshold must be at least 1",
            ));
        }

        let session_ttl_secs: u64 = parse_or(
            var(SESSION_TTL_SECS_ENV),
            SESSION_TTL_SECS_ENV,
            DEFAULT_SESSION_TTL.as_secs(),
        )?;
        let bootstrap_lock_ttl_secs: u64 = parse_or(
            var(BOOTSTRAP_LOCK_TTL_SECS_ENV),
            BOOTSTRAP_LOCK_TTL_SECS_ENV,
            DEFAULT_BOOTSTRAP_LOCK_TTL.as_secs(),
        )?;
        if session_ttl_secs == 0 || bootstrap_lock_ttl_secs == 0 {
            return Err(ConfigError::invalid(
                SESSION_TTL_SECS_ENV,
                "session and lock TTLs must be positive",
            ));
        }

        let address_collision_policy = match var(ADDRESS_COLLISION_POLICY_ENV) {
            Some(v) => v
                .parse()
                .map_err(|e: String| ConfigError::invalid(ADDRESS_COLLISION_POLICY_ENV, e))?,
            None => defaults.address_collision_policy,
        };

        let identity_assertion_secret = match var(IDENTITY_ASSERTION_SECRET_ENV) {
            Some(secret) if secret.len() < MIN_ASSERTION_SECRET_LEN => {
                return Err(ConfigError::invalid(
                    IDENTITY_ASSERTION_SECRET_ENV,
                    format!("expected at least {MIN_ASSERTION_SECRET_LEN} bytes"),
                ));
            }
            secret => secret.map(String::into_bytes),
        };

        Ok(Self {
            data_dir: var(DATA_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            host: var(HOST_ENV).unwrap_or(defaults.host),
            port,
            log_format,
            redis_url: var(REDIS_URL_ENV),
            enclave,
            enclave_timeout: Duration::from_millis(enclave_timeout_ms),
            default_quorum_threshold,
            session_ttl: Duration::from_secs(session_ttl_secs),
            bootstrap_lock_ttl: Duration::from_secs(bootstrap_lock_ttl_secs),
            address_collision_policy,
            ledger_signing_key: var(LEDGER_SIGNING_KEY_ENV)
                .map(|v| parse_key(&v, LEDGER_SIGNING_KEY_ENV))
                .transpose()?,
            cache_capacity: parse_or(var(CACHE_CAPACITY_ENV), CACHE_CAPACITY_ENV, defaults.cache_capacity)?,
            identity_assertion_secret,
            identity_assertion_issuer: var(IDENTITY_ASSERTION_ISSUER_ENV)
                .unwrap_or(defaults.identity_assertion_issuer),
        })
    }

    /// Path of the relational store file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

fn parse_or<T>(value: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(name, e.to_string())),
        None => Ok(default),
    }
}

fn parse_key(value: &str, name: &'static str) -> Result<[u8; 32], ConfigError> {
    let bytes = alloy::hex::decode(value.trim().trim_start_matches("0x"))
        .map_err(|e| ConfigError::invalid(name, e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| ConfigError::invalid(name, "expected 32 bytes of hex"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.default_quorum_threshold, 1);
        assert_eq!(config.enclave, EnclaveMode::Mock { seed: None });
        assert_eq!(config.address_collision_policy, AddressCollisionPolicy::Reject);
        assert_eq!(config.database_path(), PathBuf::from("/data/custody.redb"));
        assert!(config.identity_assertion_secret.is_none());
        assert_eq!(config.identity_assertion_issuer, DEFAULT_IDENTITY_ASSERTION_ISSUER);
    }

    #[test]
    fn assertion_secret_must_be_long_enough() {
        assert!(AppConfig::from_lookup(lookup(&[(IDENTITY_ASSERTION_SECRET_ENV, "short")])).is_err());

        let secret = "s".repeat(MIN_ASSERTION_SECRET_LEN);
        let config = AppConfig::from_lookup(lookup(&[
            (IDENTITY_ASSERTION_SECRET_ENV, secret.as_str()),
            (IDENTITY_ASSERTION_ISSUER_ENV, "oauth.acme.com"),
        ]))
        .unwrap();
        assert_eq!(config.identity_assertion_secret, Some(secret.into_bytes()));
        assert_eq!(config.identity_assertion_issuer, "oauth.acme.com");
    }

    #[test]
    fn remote_enclave_and_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            (ENCLAVE_HOST_ENV, "enclave.internal"),
            (ENCLAVE_PORT_ENV, "7000"),
            (ENCLAVE_TIMEOUT_MS_ENV, "2500"),
            (ADDRESS_COLLISION_POLICY_ENV, "Regenerate"),
            (LOG_FORMAT_ENV, "json"),
        ]))
        .unwrap();

        assert_eq!(
            config.enclave,
            EnclaveMode::Remote {
                host: "enclave.internal".into(),
                port: 7000
            }
        );
        assert_eq!(config.enclave_timeout, Duration::from_millis(2500));
        assert_eq!(config.address_collision_policy, AddressCollisionPolicy::Regenerate);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn rejects_zero_threshold_and_bad_keys() {
        assert!(AppConfig::from_lookup(lookup(&[(DEFAULT_QUORUM_THRESHOLD_ENV, "0")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[(LEDGER_SIGNING_KEY_ENV, "abcd")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[(ENCLAVE_TIMEOUT_MS_ENV, "0")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[(PORT_ENV, "not-a-port")])).is_err());
    }

    #[test]
    fn parses_hex_keys() {
        let key = "11".repeat(32);
        let config =
            AppConfig::from_lookup(lookup(&[(LEDGER_SIGNING_KEY_ENV, key.as_str())])).unwrap();
        assert_eq!(config.ledger_signing_key, Some([0x11; 32]));
    }
}
