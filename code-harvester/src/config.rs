//! Process configuration loaded from the environment.
//!
//! Values are read once at startup (after `dotenvy` has populated the
//! environment from a `.env` file, if any). Everything that is not an
//! operator concern lives in the typed per-component configs
//! ([`HarvestConfig`](crate::harvester::HarvestConfig),
//! [`SchedulerConfig`](crate::scheduler::SchedulerConfig), ...).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::login::DuplicateLoginPolicy;
use crate::{Error, Result};

/// Default SQLite database URL.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:code-harvester.db?mode=rwc";

/// Default messaging gateway endpoint.
pub const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:8081";

/// Well-known account id that delivers login codes.
pub const DEFAULT_OFFICIAL_SENDER_ID: i64 = 777_000;

const DEFAULT_API_ID: i32 = 2040;
const DEFAULT_API_HASH: &str = "b18441a1ff607e10a989891a5462e627";
const DEFAULT_SCHEDULER_INTERVAL_SECS: u64 = 300;
const DEFAULT_CLIENT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LOGIN_TTL_SECS: u64 = 600;
const DEFAULT_MAX_PENDING_LOGINS: usize = 256;

/// Upstream application credentials.
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub api_id: i32,
    pub api_hash: String,
}

/// Process configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub session_dir: PathBuf,
    pub log_dir: PathBuf,
    pub api: ApiCredentials,
    pub gateway_url: String,
    /// Harvest cycle interval.
    pub scheduler_interval: Duration,
    pub official_sender_id: i64,
    /// Upper bound for every upstream call.
    pub client_timeout: Duration,
    /// Idle time after which a pending login is abandoned.
    pub login_ttl: Duration,
    pub max_pending_logins: usize,
    pub duplicate_login_policy: DuplicateLoginPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            session_dir: PathBuf::from("./sessions"),
            log_dir: PathBuf::from("./logs"),
            api: ApiCredentials {
                api_id: DEFAULT_API_ID,
                api_hash: DEFAULT_API_HASH.to_string(),
            },
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            scheduler_interval: Duration::from_secs(DEFAULT_SCHEDULER_INTERVAL_SECS),
            official_sender_id: DEFAULT_OFFICIAL_SENDER_ID,
            client_timeout: Duration::from_secs(DEFAULT_CLIENT_TIMEOUT_SECS),
            login_ttl: Duration::from_secs(DEFAULT_LOGIN_TTL_SECS),
            max_pending_logins: DEFAULT_MAX_PENDING_LOGINS,
            duplicate_login_policy: DuplicateLoginPolicy::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let secs = |key: &str, default: Duration| -> Result<Duration> {
            Ok(parse_var::<u64>(&lookup, key)?
                .map(Duration::from_secs)
                .unwrap_or(default))
        };

        let scheduler_interval = secs("SCHEDULER_INTERVAL", defaults.scheduler_interval)?;
        if scheduler_interval.is_zero() {
            return Err(Error::config("SCHEDULER_INTERVAL must be greater than zero"));
        }

        let duplicate_login_policy = match lookup("DUPLICATE_LOGIN_POLICY") {
            Some(value) => value.parse()?,
            None => defaults.duplicate_login_policy,
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            session_dir: lookup("SESSION_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.session_dir),
            log_dir: lookup("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),
            api: ApiCredentials {
                api_id: parse_var(&lookup, "API_ID")?.unwrap_or(defaults.api.api_id),
                api_hash: lookup("API_HASH").unwrap_or(defaults.api.api_hash),
            },
            gateway_url: lookup("GATEWAY_URL").unwrap_or(defaults.gateway_url),
            scheduler_interval,
            official_sender_id: parse_var(&lookup, "OFFICIAL_SENDER_ID")?
                .unwrap_or(defaults.official_sender_id),
            client_timeout: secs("CLIENT_TIMEOUT_SECS", defaults.client_timeout)?,
            login_ttl: secs("LOGIN_TTL_SECS", defaults.login_ttl)?,
            max_pending_logins: parse_var(&lookup, "MAX_PENDING_LOGINS")?
                .unwrap_or(defaults.max_pending_logins),
            duplicate_login_policy,
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::config(format!("invalid value for {key} ({raw:?}): {e}"))),
        None => Ok(None),
    }
}
