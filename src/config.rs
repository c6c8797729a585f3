//! Configuration types.
//!
//! All runtime configuration is read once at startup via [`Config::from_env`]
//! and passed to each component at construction. There are no process-wide
//! configuration singletons.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::activity::{DedupPolicy, TerminationPolicy};
use crate::error::ConfigError;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token.
    pub bot_token: SecretString,
    /// API key sent in the `X-API-KEY` header of activity requests.
    pub api_key: String,
    /// Shared secret for HMAC request signing.
    pub api_secret: SecretString,
    /// Base URL of the account-activity API.
    pub api_base_url: String,
    /// Path of the local database file.
    pub db_path: PathBuf,
    /// Minimum balance required to confirm payment.
    pub payment_threshold: f64,
    /// Page size for paginated activity fetches.
    pub page_size: u32,
    /// Mandatory delay between page requests.
    pub page_delay: Duration,
    /// Pagination termination policy.
    pub termination: TerminationPolicy,
    /// Policy for records already present in the store.
    pub dedup: DedupPolicy,
    /// Maximum updates fetched per inbound batch.
    pub inbound_batch_limit: u32,
    /// Long-poll timeout passed to the update source, in seconds.
    pub inbound_poll_timeout_secs: u32,
    /// Throttle between inbound batches.
    pub inbound_idle_delay: Duration,
    /// Sleep after a transient inbound fetch failure.
    pub inbound_error_delay: Duration,
    /// Sleep between reconciliation cycles.
    pub reconcile_interval: Duration,
    /// Instruction image sent after the capital band is chosen.
    pub uid_image_path: PathBuf,
}

impl Config {
    /// Build the configuration from environment variables.
    ///
    /// `BOT_TOKEN`, `API_KEY`, `SECRET_KEY` and `BASE_URL` are required;
    /// everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_token = require_env("BOT_TOKEN")?;
        let api_key = require_env("API_KEY")?;
        let api_secret = require_env("SECRET_KEY")?;
        let api_base_url = require_env("BASE_URL")?;

        let db_path = std::env::var("VIP_ONBOARD_DB_PATH")
            .unwrap_or_else(|_| "./data/vip-onboard.db".to_string());

        let payment_threshold = parse_env("PAYMENT_THRESHOLD", 20.0)?;
        let page_size = parse_env("ACTIVITY_PAGE_SIZE", 100u32)?;
        let reconcile_secs = parse_env("RECONCILE_INTERVAL_SECS", 10u64)?;

        let termination = match std::env::var("ACTIVITY_STOP_POLICY").ok() {
            Some(raw) => TerminationPolicy::parse(&raw).ok_or_else(|| {
                ConfigError::InvalidValue {
                    key: "ACTIVITY_STOP_POLICY".into(),
                    message: format!(
                        "'{raw}' is not 'consecutive:<n>', 'sentinel:<id>' or 'total'"
                    ),
                }
            })?,
            None => TerminationPolicy::default(),
        };

        let dedup = match std::env::var("ACTIVITY_DEDUP_POLICY").ok() {
            Some(raw) => DedupPolicy::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "ACTIVITY_DEDUP_POLICY".into(),
                message: format!("'{raw}' is not 'refresh' or 'drop'"),
            })?,
            None => DedupPolicy::default(),
        };

        let uid_image_path = std::env::var("UID_IMAGE_PATH")
            .unwrap_or_else(|_| "./uid.jpg".to_string());

        Ok(Self {
            bot_token: SecretString::from(bot_token),
            api_key,
            api_secret: SecretString::from(api_secret),
            api_base_url,
            db_path: PathBuf::from(db_path),
            payment_threshold,
            page_size,
            page_delay: Duration::from_millis(300),
            termination,
            dedup,
            inbound_batch_limit: 10,
            inbound_poll_timeout_secs: 10,
            inbound_idle_delay: Duration::from_millis(100),
            inbound_error_delay: Duration::from_secs(5),
            reconcile_interval: Duration::from_secs(reconcile_secs),
            uid_image_path: PathBuf::from(uid_image_path),
        })
    }
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingEnvVar(key.to_string())),
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{e}"),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_var_is_fatal() {
        // BOT_TOKEN etc. are unset in the test environment.
        unsafe { std::env::remove_var("BOT_TOKEN") };
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));
    }

    #[test]
    fn parse_env_uses_default_when_unset() {
        let v: f64 = parse_env("VIP_ONBOARD_TEST_UNSET", 20.0).unwrap();
        assert_eq!(v, 20.0);
    }
}
