//! Change detection.
//!
//! Classic mode asks the device to compare the safety checkpoint with the
//! active configuration and surfaces the patch verbatim. Light mode has no
//! checkpoint and can only watch the prompt's unsaved-changes indicator.

use super::report::ChangeResult;
use crate::channel::CommandChannel;
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::error::Result;

/// Compare the active configuration against `checkpoint`.
///
/// The patch is kept in the result only when `want_diff` is set; `changed`
/// is derived from it either way.
pub async fn checkpoint_delta<C, S>(
    store: &S,
    channel: &mut C,
    checkpoint: &Checkpoint,
    want_diff: bool,
) -> Result<ChangeResult>
where
    C: CommandChannel,
    S: CheckpointStore,
{
    let patch = store.diff(channel, &checkpoint.name).await?;
    Ok(ChangeResult::from_patch(patch, want_diff))
}

/// Tracks the prompt change indicator across a light-mode transaction.
///
/// `changed` becomes true as soon as any prompt observed after the
/// transaction started carries the indicator. Unsaved changes that predate
/// the transaction therefore also count; [`modified_before`](Self::modified_before)
/// lets the caller warn about that.
#[derive(Debug, Clone)]
pub struct PromptTracker {
    indicator: String,
    modified_before: bool,
    seen_modified: bool,
}

impl PromptTracker {
    /// Create a tracker for prompts prefixed with `indicator` when modified.
    pub fn new(indicator: impl Into<String>) -> Self {
        Self {
            indicator: indicator.into(),
            modified_before: false,
            seen_modified: false,
        }
    }

    /// Check a single prompt for the indicator.
    pub fn is_modified(&self, prompt: &str) -> bool {
        prompt.trim_start().starts_with(self.indicator.as_str())
    }

    /// Record the prompt read before the first command.
    pub fn record_before(&mut self, prompt: &str) {
        self.modified_before = self.is_modified(prompt);
    }

    /// Record a prompt seen after a command.
    pub fn observe(&mut self, prompt: &str) {
        if self.is_modified(prompt) {
            self.seen_modified = true;
        }
    }

    /// Whether the device already had unsaved changes before the transaction.
    pub fn modified_before(&self) -> bool {
        self.modified_before
    }

    /// Whether the indicator was seen after the transaction started.
    pub fn changed(&self) -> bool {
        self.seen_modified
    }
}
