//! Transaction configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Mode;
use crate::error::{Error, Result};

/// Settings for a [`TransactionEngine`](super::TransactionEngine).
///
/// Deserializable from any serde format; missing fields take their defaults.
///
/// ```
/// use ferricommit::{Mode, TransactionConfig};
/// use std::time::Duration;
///
/// let config = TransactionConfig::default()
///     .with_mode(Mode::Classic)
///     .with_retention_count(2)
///     .with_command_timeout(Duration::from_secs(10));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Device capability profile.
    pub mode: Mode,

    /// How many engine-created checkpoints to keep on the device after cleanup.
    pub retention_count: usize,

    /// Upper bound on each caller command's round trip, in seconds when serialized.
    #[serde(with = "duration_secs")]
    pub command_timeout: Duration,

    /// Prefix of every checkpoint name this engine generates.
    pub checkpoint_prefix: String,

    /// Token naming this engine among others sharing the prefix. Retention
    /// only ever deletes checkpoints carrying both. A random token is drawn
    /// per engine when unset.
    pub instance_id: Option<String>,

    /// Save a checkpoint of the committed configuration after a change.
    pub save_on_commit: bool,

    /// Prompt prefix that marks unsaved changes (light mode).
    pub change_indicator: String,

    /// How many names to try when a generated checkpoint name is taken.
    pub max_name_attempts: u32,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Classic,
            retention_count: 1,
            command_timeout: Duration::from_secs(30),
            checkpoint_prefix: "ferricommit".to_string(),
            instance_id: None,
            save_on_commit: true,
            change_indicator: crate::platform::nokia_sros::CHANGE_INDICATOR.to_string(),
            max_name_attempts: 3,
        }
    }
}

impl TransactionConfig {
    /// Set the capability mode.
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the checkpoint retention count.
    pub fn with_retention_count(mut self, count: usize) -> Self {
        self.retention_count = count;
        self
    }

    /// Set the per-command timeout.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set the checkpoint name prefix.
    pub fn with_checkpoint_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.checkpoint_prefix = prefix.into();
        self
    }

    /// Pin the checkpoint instance token.
    pub fn with_instance_id(mut self, id: impl Into<String>) -> Self {
        self.instance_id = Some(id.into());
        self
    }

    /// Enable or disable the post-commit checkpoint.
    pub fn with_save_on_commit(mut self, save: bool) -> Self {
        self.save_on_commit = save;
        self
    }

    /// Check that the settings are usable.
    pub fn validate(&self) -> Result<()> {
        if self.command_timeout.is_zero() {
            return Err(invalid("command_timeout must be greater than zero"));
        }
        if self.checkpoint_prefix.is_empty()
            || !self
                .checkpoint_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(invalid(
                "checkpoint_prefix must be non-empty and contain only [A-Za-z0-9_-]",
            ));
        }
        if let Some(id) = &self.instance_id {
            if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(invalid(
                    "instance_id must be non-empty and contain only [A-Za-z0-9]",
                ));
            }
        }
        if self.change_indicator.is_empty() {
            return Err(invalid("change_indicator must not be empty"));
        }
        if self.max_name_attempts == 0 {
            return Err(invalid("max_name_attempts must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> Error {
    Error::InvalidConfig {
        message: message.to_string(),
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
