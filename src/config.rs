//! Startup configuration, read from the environment (and `.env` outside tests).
//!
//! | variable               | default | meaning                                  |
//! |------------------------|---------|------------------------------------------|
//! | `CLASSBOOKD_LOG`       | `info`  | tracing filter directive, logs on stderr |
//! | `CLASSBOOKD_WORKSPACE` | unset   | workspace to open before the first line  |
//! | `CLASSBOOKD_TODAY`     | unset   | fixed "today" (`YYYY-MM-DD`)             |

use chrono::NaiveDate;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const ENV_LOG: &str = "CLASSBOOKD_LOG";
pub const ENV_WORKSPACE: &str = "CLASSBOOKD_WORKSPACE";
pub const ENV_TODAY: &str = "CLASSBOOKD_TODAY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Clone, Debug)]
pub struct Config {
    pub log_filter: String,
    pub workspace: Option<PathBuf>,
    pub today: Option<NaiveDate>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let log_filter = lookup(ENV_LOG)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "info".to_string());
        EnvFilter::try_new(&log_filter)
            .map_err(|e| ConfigError::InvalidValue(ENV_LOG.to_string(), e.to_string()))?;

        let workspace = lookup(ENV_WORKSPACE)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let today = match lookup(ENV_TODAY).map(|s| s.trim().to_string()) {
            Some(raw) if !raw.is_empty() => Some(
                NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| {
                    ConfigError::InvalidValue(
                        ENV_TODAY.to_string(),
                        format!("'{}' is not a YYYY-MM-DD date", raw),
                    )
                })?,
            ),
            _ => None,
        };

        Ok(Self {
            log_filter,
            workspace,
            today,
        })
    }
}

/// Installs the global subscriber. Stdout carries the IPC protocol, so every
/// log line goes to stderr.
pub fn init_logging(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}
