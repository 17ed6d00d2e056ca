//! Client configuration.
//!
//! # Responsibility
//! - Declare tunables for apply policy, feed resubscription and logging.
//! - Parse JSON configuration and validate it before use.
//!
//! # Invariants
//! - Every field has a default; an empty JSON object is a valid config.
//! - A validated config has non-zero, ordered backoff bounds.

use crate::logging::{default_log_level, normalize_level};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_INITIAL_BACKOFF_MS: u64 = 100;
const DEFAULT_MAX_BACKOFF_MS: u64 = 5_000;

/// How confirmed mutation results reach the collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyPolicy {
    /// Apply the gateway result locally as soon as the request succeeds.
    /// The feed echo is then suppressed as a duplicate.
    #[default]
    Immediate,
    /// Leave the collection untouched and wait for the feed echo.
    AwaitEcho,
}

/// Retry schedule for feeds that fail or terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ResubscribePolicy {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Consecutive failed attempts before a feed gives up. `None` retries
    /// forever.
    pub max_attempts: Option<u32>,
}

impl Default for ResubscribePolicy {
    fn default() -> Self {
        Self {
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            max_attempts: None,
        }
    }
}

impl ResubscribePolicy {
    /// Delay before retry number `attempt` (1-based), doubling up to the cap.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self
            .initial_backoff_ms
            .saturating_mul(1_u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }

    /// Returns whether another attempt is allowed after `failures` in a row.
    pub fn allows_attempt(&self, failures: u32) -> bool {
        self.max_attempts.map_or(true, |max| failures < max)
    }
}

/// Logging options consumed by `init_logging`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `trace|debug|info|warn|error`.
    pub level: String,
    /// Absolute directory for rolling log files. `None` disables file logs.
    pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level().to_string(),
            dir: None,
        }
    }
}

/// Top-level client configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub apply_policy: ApplyPolicy,
    pub resubscribe: ResubscribePolicy,
    pub log: LogConfig,
}

impl ClientConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let policy = &self.resubscribe;
        if policy.initial_backoff_ms == 0 {
            return Err(ConfigError::ZeroBackoff);
        }
        if policy.max_backoff_ms < policy.initial_backoff_ms {
            return Err(ConfigError::BackoffOrder {
                initial_ms: policy.initial_backoff_ms,
                max_ms: policy.max_backoff_ms,
            });
        }
        if policy.max_attempts == Some(0) {
            return Err(ConfigError::ZeroAttempts);
        }
        normalize_level(self.log.level.as_str())
            .map_err(|_| ConfigError::InvalidLogLevel(self.log.level.clone()))?;
        if let Some(dir) = &self.log.dir {
            if !dir.is_absolute() {
                return Err(ConfigError::RelativeLogDir(dir.clone()));
            }
        }
        Ok(())
    }
}

/// Configuration parse/validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Parse(String),
    ZeroBackoff,
    BackoffOrder { initial_ms: u64, max_ms: u64 },
    ZeroAttempts,
    InvalidLogLevel(String),
    RelativeLogDir(PathBuf),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(details) => write!(f, "invalid config document: {details}"),
            Self::ZeroBackoff => write!(f, "resubscribe.initial_backoff_ms must be > 0"),
            Self::BackoffOrder { initial_ms, max_ms } => write!(
                f,
                "resubscribe.max_backoff_ms ({max_ms}) must be >= initial_backoff_ms ({initial_ms})"
            ),
            Self::ZeroAttempts => write!(f, "resubscribe.max_attempts must be > 0 when set"),
            Self::InvalidLogLevel(level) => write!(f, "unsupported log level `{level}`"),
            Self::RelativeLogDir(dir) => {
                write!(f, "log.dir must be an absolute path, got `{}`", dir.display())
            }
        }
    }
}

impl Error for ConfigError {}
