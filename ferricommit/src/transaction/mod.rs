//! Checkpoint-guarded configuration transactions.
//!
//! A [`TransactionEngine`] pushes an ordered list of CLI commands to one
//! device and makes the rollout all-or-nothing where the device allows it:
//!
//! - **Classic mode** ([`Capability::Checkpoint`]): a safety checkpoint is
//!   saved first, any failure reverts to it, dry-runs apply and then revert,
//!   and the device's own compare primitive produces the diff.
//! - **Light mode** ([`Capability::Absent`]): commands are applied as-is and
//!   the only change signal is the prompt's unsaved-changes marker. Dry-run
//!   and diff requests are refused with `UnsupportedInMode`.
//!
//! # Example
//!
//! ```rust,no_run
//! use ferricommit::{SessionBuilder, TransactionConfig, TransactionEngine, TransactionRequest};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = SessionBuilder::new("192.0.2.1")
//!     .username("admin")
//!     .password("admin")
//!     .open()
//!     .await?;
//!
//! let mut engine = TransactionEngine::from_config(&mut session, TransactionConfig::default())?;
//! let request = TransactionRequest::new([
//!     "configure system name \"edge-1\"",
//!     "configure system location \"rack 4\"",
//! ])
//! .with_diff(true);
//!
//! let report = engine.execute(&request).await?;
//! println!("changed: {}", report.changed());
//! # Ok(())
//! # }
//! ```

mod config;
mod detect;
mod engine;
mod report;

pub use config::TransactionConfig;
pub use detect::PromptTracker;
pub use engine::TransactionEngine;
pub use report::{ChangeResult, TransactionReport};
pub use tokio_util::sync::CancellationToken;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::checkpoint::SrosCheckpoints;
use crate::error::TransactionError;

/// Result of [`TransactionEngine::execute`].
pub type TransactionResult = std::result::Result<TransactionReport, TransactionError>;

/// Device capability profile, as configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Checkpoint-capable: rollback, dry-run, and diff are available.
    #[default]
    Classic,
    /// Checkpoint-absent: change detection via the prompt marker only.
    Light,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Classic => f.write_str("classic"),
            Mode::Light => f.write_str("light"),
        }
    }
}

/// What the device offers the engine, selected once per session.
#[derive(Debug, Clone)]
pub enum Capability<S = SrosCheckpoints> {
    /// The device can save, revert, delete, and compare checkpoints.
    Checkpoint(S),
    /// No checkpoint mechanism.
    Absent,
}

impl<S> Capability<S> {
    /// Mode this capability corresponds to.
    pub fn mode(&self) -> Mode {
        match self {
            Capability::Checkpoint(_) => Mode::Classic,
            Capability::Absent => Mode::Light,
        }
    }
}

/// One rollout request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionRequest {
    /// Commands to apply, strictly in this order.
    pub commands: Vec<String>,

    /// Return the device patch in the report.
    pub want_diff: bool,

    /// Apply, measure, then revert.
    pub want_dry_run: bool,
}

impl TransactionRequest {
    /// Create a request that commits `commands` without a diff.
    pub fn new<I, T>(commands: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
            want_diff: false,
            want_dry_run: false,
        }
    }

    /// Request the device patch.
    pub fn with_diff(mut self, want: bool) -> Self {
        self.want_diff = want;
        self
    }

    /// Request a dry-run.
    pub fn with_dry_run(mut self, want: bool) -> Self {
        self.want_dry_run = want;
        self
    }
}

/// Engine state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    CheckpointCreated,
    Applying,
    Applied,
    RollingBack,
    RolledBackOnError,
    RolledBackDryRun,
    Committed,
    Cleanup,
    Failed,
}

/// How a transaction ended.
///
/// A transaction in progress has no outcome yet; the engine only produces
/// one when `execute` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Commands applied and kept.
    Committed,
    /// A command failed and the device was reverted to the safety checkpoint.
    RolledBackOnError,
    /// Commands applied, measured, and reverted on request.
    RolledBackDryRun,
    /// The transaction could not be carried out or recovered.
    Failed,
}
