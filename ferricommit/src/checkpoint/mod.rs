//! Device checkpoints: named snapshots used for rollback and diffing.
//!
//! A [`CheckpointStore`] translates checkpoint lifecycle intents into device
//! commands sent over a [`CommandChannel`]. The store is stateless; every
//! operation takes the channel explicitly, so one store value can serve any
//! number of sessions.
//!
//! Checkpoint storage on a device is shared with other tooling. Stores never
//! assume exclusive ownership, [`CheckpointNamer`] produces names that will
//! not clash with foreign entries in practice, and [`expired`] only ever
//! selects entries produced by the caller's own namer instance.

mod sros;

pub use sros::SrosCheckpoints;

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::channel::CommandChannel;
use crate::error::Result;

/// Translate checkpoint intents into device commands.
pub trait CheckpointStore: Send + Sync {
    /// Save the current configuration as a checkpoint called `name`.
    ///
    /// Fails with [`CheckpointError::NameCollision`](crate::error::CheckpointError::NameCollision)
    /// if a checkpoint with that name is already listed.
    fn create<C: CommandChannel>(
        &self,
        channel: &mut C,
        name: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Restore the configuration saved in checkpoint `name`.
    fn rollback<C: CommandChannel>(
        &self,
        channel: &mut C,
        name: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Remove checkpoint `name` from the device.
    fn delete<C: CommandChannel>(
        &self,
        channel: &mut C,
        name: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Compare checkpoint `name` with the active configuration.
    ///
    /// Returns the device's patch text, empty when nothing differs.
    fn diff<C: CommandChannel>(
        &self,
        channel: &mut C,
        name: &str,
    ) -> impl Future<Output = Result<String>> + Send;

    /// List checkpoints on the device, oldest first.
    ///
    /// A best-effort snapshot: other tools may add or remove entries at any time.
    fn list<C: CommandChannel>(
        &self,
        channel: &mut C,
    ) -> impl Future<Output = Result<Vec<CheckpointEntry>>> + Send;
}

/// A checkpoint as listed by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointEntry {
    /// Device-side identifier used in commands (e.g. `latest-rb`, `3`).
    pub id: String,

    /// Checkpoint name (the comment it was saved with). May be empty for
    /// checkpoints saved by other tools.
    pub name: String,
}

/// A checkpoint this engine created during a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// Engine-generated name.
    pub name: String,

    /// When the checkpoint was saved, as seen by this host.
    pub created_at: SystemTime,
}

impl Checkpoint {
    /// Record a checkpoint saved now.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: SystemTime::now(),
        }
    }

    /// Time since the checkpoint was saved. Zero if the clock went backwards.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed().unwrap_or_default()
    }
}

/// Generates unique, time-ordered checkpoint names.
///
/// Names look like `<prefix>-<unix millis>-<instance>-<sequence>`. The
/// instance token tells apart engines sharing a prefix (several workers, or
/// a restarted process), so retention only ever reclaims what this namer
/// produced. Millis and sequence are zero-padded so that, within one
/// instance, lexical order matches creation order.
#[derive(Debug, Clone)]
pub struct CheckpointNamer {
    prefix: String,
    instance: String,
    sequence: u32,
    clock: fn() -> u64,
}

impl CheckpointNamer {
    /// Create a namer with a random instance token and the system clock.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_instance(prefix, random_instance())
    }

    /// Create a namer with a fixed instance token.
    ///
    /// A stable token lets a restarted process reclaim checkpoints left by
    /// its previous run.
    pub fn with_instance(prefix: impl Into<String>, instance: impl Into<String>) -> Self {
        Self::with_clock(prefix, instance, unix_millis)
    }

    /// Create a namer with a fixed instance token and a custom millisecond clock.
    pub fn with_clock(
        prefix: impl Into<String>,
        instance: impl Into<String>,
        clock: fn() -> u64,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            instance: instance.into(),
            sequence: 0,
            clock,
        }
    }

    /// Get the name prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Get the instance token.
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Produce the next name.
    pub fn next_name(&mut self) -> String {
        self.sequence = (self.sequence + 1) % 10_000;
        format!(
            "{}-{:013}-{}-{:04}",
            self.prefix,
            (self.clock)(),
            self.instance,
            self.sequence
        )
    }

    /// Check whether `name` carries this namer's prefix, whichever instance
    /// produced it.
    pub fn shares_prefix(&self, name: &str) -> bool {
        name.strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| rest.starts_with('-'))
    }

    /// Check whether `name` was produced by this namer's instance.
    pub fn owns(&self, name: &str) -> bool {
        let Some(rest) = name
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('-'))
        else {
            return false;
        };

        let mut parts = rest.splitn(3, '-');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(millis), Some(instance), Some(sequence)) => {
                is_digits(millis) && instance == self.instance && is_digits(sequence)
            }
            _ => false,
        }
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Eight hex digits from a v4 UUID.
fn random_instance() -> String {
    format!("{:08x}", Uuid::new_v4().as_fields().0)
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Select checkpoints to delete so that at most `keep` entries owned by
/// `namer` remain.
///
/// `entries` must be in creation order (as returned by [`CheckpointStore::list`]);
/// the oldest owned entries are returned first. Foreign entries are never
/// selected, including ones from other instances with the same prefix.
pub fn expired<'e>(
    entries: &'e [CheckpointEntry],
    namer: &CheckpointNamer,
    keep: usize,
) -> Vec<&'e CheckpointEntry> {
    let owned: Vec<&CheckpointEntry> = entries.iter().filter(|e| namer.owns(&e.name)).collect();
    let excess = owned.len().saturating_sub(keep);
    owned.into_iter().take(excess).collect()
}
