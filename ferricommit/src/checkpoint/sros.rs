//! Nokia SR OS Classic rollback checkpoints.
//!
//! Maps checkpoint intents onto the `admin rollback` command family:
//!
//! | Intent | Command |
//! |---|---|
//! | create | `admin rollback save comment "<name>"` |
//! | list | `show system rollback` |
//! | rollback | `admin rollback revert <id>` |
//! | delete | `admin rollback delete <id>` |
//! | diff | `admin rollback compare <id> to active-cfg` |
//!
//! SR OS identifies rollback files by position (`latest-rb`, `1`, `2`, ...),
//! and every save shifts the positions. The checkpoint name is stored as the
//! file comment and resolved to its current position right before each
//! command.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use super::{CheckpointEntry, CheckpointStore};
use crate::channel::{CommandChannel, Response};
use crate::error::{CheckpointError, Result};

/// Resets the Classic CLI context to the root.
const EXIT_ALL: &str = "exit all";

/// Device-side id of the newest rollback file.
const LATEST: &str = "latest-rb";

/// The compare patch sits between two dashed separator lines.
static PATCH_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\r?\n-+\r?\n(.*)\r?\n-+\r?\n").expect("static pattern")
});

/// Checkpoint store for SR OS Classic CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct SrosCheckpoints;

impl SrosCheckpoints {
    /// Send a command, turning a device-reported failure into an error.
    async fn run<C: CommandChannel>(&self, channel: &mut C, command: &str) -> Result<Response> {
        let response = channel.send(command).await?;
        match response.failure_message {
            Some(message) => Err(CheckpointError::Rejected {
                command: command.to_string(),
                message,
            }
            .into()),
            None => Ok(response),
        }
    }

    /// Find the current device id of checkpoint `name`.
    ///
    /// If other tooling reused the name, the newest entry wins.
    async fn resolve<C: CommandChannel>(&self, channel: &mut C, name: &str) -> Result<String> {
        self.list(channel)
            .await?
            .into_iter()
            .rev()
            .find(|entry| entry.name == name)
            .map(|entry| entry.id)
            .ok_or_else(|| {
                CheckpointError::NotFound {
                    name: name.to_string(),
                }
                .into()
            })
    }
}

impl CheckpointStore for SrosCheckpoints {
    async fn create<C: CommandChannel>(&self, channel: &mut C, name: &str) -> Result<()> {
        if self.list(channel).await?.iter().any(|e| e.name == name) {
            return Err(CheckpointError::NameCollision {
                name: name.to_string(),
            }
            .into());
        }

        let command = format!("admin rollback save comment \"{}\"", name);
        self.run(channel, &command).await?;

        // A save can be refused silently (e.g. rollback location full)
        if !self.list(channel).await?.iter().any(|e| e.name == name) {
            return Err(CheckpointError::Rejected {
                command,
                message: "checkpoint not listed after save".to_string(),
            }
            .into());
        }

        debug!("saved checkpoint {:?}", name);
        Ok(())
    }

    async fn rollback<C: CommandChannel>(&self, channel: &mut C, name: &str) -> Result<()> {
        let id = self.resolve(channel, name).await?;
        debug!("reverting to checkpoint {:?} ({})", name, id);
        self.run(channel, &format!("admin rollback revert {}", id))
            .await?;
        Ok(())
    }

    async fn delete<C: CommandChannel>(&self, channel: &mut C, name: &str) -> Result<()> {
        let id = self.resolve(channel, name).await?;
        debug!("deleting checkpoint {:?} ({})", name, id);
        self.run(channel, &format!("admin rollback delete {}", id))
            .await?;
        Ok(())
    }

    async fn diff<C: CommandChannel>(&self, channel: &mut C, name: &str) -> Result<String> {
        let id = self.resolve(channel, name).await?;
        let response = self
            .run(channel, &format!("admin rollback compare {} to active-cfg", id))
            .await?;
        Ok(extract_patch(&response.raw_result))
    }

    async fn list<C: CommandChannel>(&self, channel: &mut C) -> Result<Vec<CheckpointEntry>> {
        self.run(channel, EXIT_ALL).await?;
        let response = self.run(channel, "show system rollback").await?;
        let mut entries = parse_listing(&response.result);
        // Device lists newest first
        entries.reverse();
        Ok(entries)
    }
}

/// Parse the rollback file table of `show system rollback`.
///
/// ```text
/// Idx    Suffix     Comment
///        Date       Time
/// -------------------------------------------------------------------------------
/// latest .rb        fc-1700000000000-0a1b2c3d-0002
///        2024/01/05 10:11:12 UTC
/// 1      .rb.1      fc-1700000000000-0a1b2c3d-0001
///        2024/01/05 10:10:00 UTC
/// ```
fn parse_listing(output: &str) -> Vec<CheckpointEntry> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let index = fields.next()?;
            if !fields.next()?.starts_with(".rb") {
                return None;
            }

            let id = if index == "latest" {
                LATEST.to_string()
            } else if index.bytes().all(|b| b.is_ascii_digit()) {
                index.to_string()
            } else {
                return None;
            };

            let name = fields.collect::<Vec<_>>().join(" ");
            Some(CheckpointEntry { id, name })
        })
        .collect()
}

/// Pull the patch block out of `admin rollback compare` output.
fn extract_patch(raw: &str) -> String {
    PATCH_BLOCK
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|block| {
            block
                .as_str()
                .lines()
                .map(str::trim_end)
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}
