//! Caller-facing transaction results.

use super::{Outcome, State};
use crate::channel::Response;
use crate::checkpoint::Checkpoint;

/// Whether a transaction changed the device, and how.
///
/// Produced once per transaction and immutable afterwards. For a dry-run,
/// `changed` means "would have changed".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeResult {
    changed: bool,
    diff: Option<String>,
}

impl ChangeResult {
    /// Create a result.
    pub fn new(changed: bool, diff: Option<String>) -> Self {
        Self { changed, diff }
    }

    /// A result for a transaction that touched nothing.
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// Build a result from a device patch; the patch is kept if `keep_diff`.
    pub fn from_patch(patch: String, keep_diff: bool) -> Self {
        let changed = !patch.trim().is_empty();
        Self {
            changed,
            diff: (keep_diff && changed).then_some(patch),
        }
    }

    /// Whether the device state differs (or would differ) from before.
    pub fn changed(&self) -> bool {
        self.changed
    }

    /// Device patch text, if requested and available.
    pub fn diff(&self) -> Option<&str> {
        self.diff.as_deref()
    }
}

/// Everything a caller learns from a completed transaction.
#[derive(Debug, Clone)]
pub struct TransactionReport {
    /// Terminal outcome.
    pub outcome: Outcome,

    /// Change flag and optional diff.
    pub change: ChangeResult,

    /// Safety checkpoint the transaction ran under. `None` in light mode
    /// and for restores.
    pub checkpoint: Option<Checkpoint>,

    /// Device responses to the caller's commands, in order.
    pub responses: Vec<Response>,

    /// States the engine passed through.
    pub states: Vec<State>,

    /// Cleanup problems that did not affect the outcome.
    pub warnings: Vec<String>,
}

impl TransactionReport {
    /// Whether the device state differs (or would differ) from before.
    pub fn changed(&self) -> bool {
        self.change.changed()
    }

    /// Device patch text, if requested and available.
    pub fn diff(&self) -> Option<&str> {
        self.change.diff()
    }
}
