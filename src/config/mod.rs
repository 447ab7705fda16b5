//! Configuration module for the Taskforge backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::errors::AppError;

/// Errors raised while reading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

/// How a failed ownership check is reported to the caller.
///
/// Lookups and authorization are separate steps; this is the single place
/// that decides whether "exists but not yours" looks like a 404 or a 403.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipPolicy {
    /// Report as not found, hiding that the entity exists.
    Conceal,
    /// Report as forbidden.
    Reveal,
}

impl OwnershipPolicy {
    /// Build the error for an entity the caller may not act on.
    pub fn deny(self, entity: &str, id: &str) -> AppError {
        match self {
            OwnershipPolicy::Conceal => AppError::NotFound(format!("{} {} not found", entity, id)),
            OwnershipPolicy::Reveal => AppError::Forbidden(format!(
                "You do not have permission to modify {} {}",
                entity.to_lowercase(),
                id
            )),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
    /// HMAC secret for access tokens; a random one is generated when unset
    pub jwt_secret: Option<String>,
    pub token_ttl_hours: i64,
    /// Lifetime of an email verification code
    pub verification_ttl_minutes: i64,
    /// Sender address for outbound mail
    pub mail_from: String,
    pub ownership_policy: OwnershipPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/app.sqlite"),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            jwt_secret: None,
            token_ttl_hours: 24,
            verification_ttl_minutes: 10,
            mail_from: "no-reply@localhost".to_string(),
            ownership_policy: OwnershipPolicy::Conceal,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let db_path = env::var("PM_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let bind_addr = match env::var("PM_BIND_ADDR") {
            Ok(value) => value.parse().map_err(|_| ConfigError::Invalid {
                key: "PM_BIND_ADDR",
                value,
            })?,
            Err(_) => defaults.bind_addr,
        };

        let log_level = env::var("PM_LOG_LEVEL").unwrap_or(defaults.log_level);

        let log_format = match env::var("PM_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("pretty") | Err(_) => LogFormat::Pretty,
            Ok(other) => {
                return Err(ConfigError::Invalid {
                    key: "PM_LOG_FORMAT",
                    value: other.to_string(),
                })
            }
        };

        let jwt_secret = env::var("PM_JWT_SECRET").ok().filter(|s| !s.is_empty());
        let token_ttl_hours = parse_positive("PM_TOKEN_TTL_HOURS", defaults.token_ttl_hours)?;
        let verification_ttl_minutes = parse_positive(
            "PM_VERIFICATION_TTL_MINUTES",
            defaults.verification_ttl_minutes,
        )?;
        let mail_from = env::var("PM_MAIL_FROM").unwrap_or(defaults.mail_from);

        let ownership_policy = match env::var("PM_CONCEAL_FORBIDDEN").as_deref() {
            Ok("true") | Ok("1") | Err(_) => OwnershipPolicy::Conceal,
            Ok("false") | Ok("0") => OwnershipPolicy::Reveal,
            Ok(other) => {
                return Err(ConfigError::Invalid {
                    key: "PM_CONCEAL_FORBIDDEN",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            db_path,
            bind_addr,
            log_level,
            log_format,
            jwt_secret,
            token_ttl_hours,
            verification_ttl_minutes,
            mail_from,
            ownership_policy,
        })
    }
}

fn parse_positive(key: &'static str, default: i64) -> Result<i64, ConfigError> {
    match env::var(key) {
        Ok(value) => match value.parse::<i64>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ConfigError::Invalid { key, value }),
        },
        Err(_) => Ok(default),
    }
}
