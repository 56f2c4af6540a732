//! In-memory SR OS Classic router for tests.
//!
//! Understands enough of the Classic CLI to exercise checkpoint stores and
//! the transaction engine: `set K=V` configuration commands, the
//! `admin rollback` family, `show system rollback`, and the `*` prompt
//! marker for unsaved changes. Failures, hangs, and disconnects can be
//! injected per command prefix.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::channel::{CommandChannel, Response};
use crate::error::{ChannelError, Result};
use crate::platform::{nokia_sros, DeviceProfile};

const SEPARATOR: &str =
    "-------------------------------------------------------------------------------";
const RULE: &str =
    "===============================================================================";

/// Maximum rollback files kept by the simulated device.
const MAX_ROLLBACK_FILES: usize = 10;

struct RollbackFile {
    comment: String,
    config: BTreeMap<String, String>,
}

pub(crate) struct SimulatedRouter {
    profile: DeviceProfile,
    running: BTreeMap<String, String>,
    unsaved: bool,
    /// Newest first, like the device listing.
    rollbacks: Vec<RollbackFile>,
    sent: Vec<String>,
    prompt_reads: usize,
    failures: Vec<String>,
    hangs: Vec<String>,
    disconnects: Vec<String>,
    closed: bool,
}

impl SimulatedRouter {
    pub(crate) fn new() -> Self {
        Self {
            profile: nokia_sros::classic().expect("classic profile"),
            running: BTreeMap::new(),
            unsaved: false,
            rollbacks: Vec::new(),
            sent: Vec::new(),
            prompt_reads: 0,
            failures: Vec::new(),
            hangs: Vec::new(),
            disconnects: Vec::new(),
            closed: false,
        }
    }

    pub(crate) fn with_config(mut self, pairs: &[(&str, &str)]) -> Self {
        for (key, value) in pairs {
            self.running.insert(key.to_string(), value.to_string());
        }
        self
    }

    /// Pretend another tool saved a checkpoint with this comment.
    pub(crate) fn with_checkpoint(mut self, comment: &str) -> Self {
        self.save(comment);
        self
    }

    pub(crate) fn with_unsaved_changes(mut self) -> Self {
        self.unsaved = true;
        self
    }

    /// Reject commands starting with `prefix` with a `MINOR:` error.
    pub(crate) fn fail_on(mut self, prefix: &str) -> Self {
        self.failures.push(prefix.to_string());
        self
    }

    /// Never answer commands starting with `prefix`.
    pub(crate) fn hang_on(mut self, prefix: &str) -> Self {
        self.hangs.push(prefix.to_string());
        self
    }

    /// Drop the connection when a command starts with `prefix`.
    pub(crate) fn disconnect_on(mut self, prefix: &str) -> Self {
        self.disconnects.push(prefix.to_string());
        self
    }

    pub(crate) fn clear_failures(&mut self) {
        self.failures.clear();
    }

    pub(crate) fn config(&self) -> &BTreeMap<String, String> {
        &self.running
    }

    pub(crate) fn value(&self, key: &str) -> Option<&str> {
        self.running.get(key).map(String::as_str)
    }

    /// Checkpoint comments, oldest first.
    pub(crate) fn checkpoint_names(&self) -> Vec<String> {
        self.rollbacks
            .iter()
            .rev()
            .map(|file| file.comment.clone())
            .collect()
    }

    pub(crate) fn sent(&self) -> &[String] {
        &self.sent
    }

    pub(crate) fn sent_matching(&self, prefix: &str) -> usize {
        self.sent.iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub(crate) fn prompt_reads(&self) -> usize {
        self.prompt_reads
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    fn prompt(&self) -> String {
        format!("{}A:router#", if self.unsaved { "*" } else { "" })
    }

    fn save(&mut self, comment: &str) {
        self.rollbacks.insert(
            0,
            RollbackFile {
                comment: comment.to_string(),
                config: self.running.clone(),
            },
        );
        self.rollbacks.truncate(MAX_ROLLBACK_FILES);
    }

    fn position(&self, id: &str) -> Option<usize> {
        let index = if id == "latest-rb" {
            0
        } else {
            id.parse().ok()?
        };
        (index < self.rollbacks.len()).then_some(index)
    }

    fn execute(&mut self, command: &str) -> String {
        if self.failures.iter().any(|p| command.starts_with(p.as_str())) {
            return format!("MINOR: CLI Simulated failure for \"{}\".", command);
        }

        let words: Vec<&str> = command.split_whitespace().collect();
        match words.as_slice() {
            [] | ["exit", "all"] | ["environment", "no", "more"] => String::new(),
            ["set", assignment] => match assignment.split_once('=') {
                Some((key, value)) => {
                    self.running.insert(key.to_string(), value.to_string());
                    self.unsaved = true;
                    String::new()
                }
                None => bad_command(command),
            },
            ["show", "system", "rollback"] => self.listing(),
            ["admin", "rollback", "save", rest @ ..] => {
                let comment = match rest {
                    ["comment", ..] => command
                        .split_once("comment")
                        .map(|(_, c)| c.trim().trim_matches('"').to_string())
                        .unwrap_or_default(),
                    _ => String::new(),
                };
                self.save(&comment);
                "Saving rollback configuration to cf3:/rollbacks/config.rb ... OK".to_string()
            }
            ["admin", "rollback", "revert", id] => match self.position(id) {
                Some(index) => {
                    self.running = self.rollbacks[index].config.clone();
                    self.unsaved = true;
                    "Processing current config... OK\r\nFinished in 0.1s".to_string()
                }
                None => missing_checkpoint(),
            },
            ["admin", "rollback", "delete", id] => match self.position(id) {
                Some(index) => {
                    self.rollbacks.remove(index);
                    String::new()
                }
                None => missing_checkpoint(),
            },
            ["admin", "rollback", "compare", id, "to", "active-cfg"] => match self.position(id) {
                Some(index) => self.compare(index, id),
                None => missing_checkpoint(),
            },
            _ => bad_command(command),
        }
    }

    fn listing(&self) -> String {
        let mut lines = vec![
            RULE.to_string(),
            "Rollback Files".to_string(),
            RULE.to_string(),
            "Idx    Suffix     Comment".to_string(),
            "       Date       Time".to_string(),
            SEPARATOR.to_string(),
        ];
        if self.rollbacks.is_empty() {
            lines.push("No Rollback Files".to_string());
        }
        for (index, file) in self.rollbacks.iter().enumerate() {
            let (idx, suffix) = if index == 0 {
                ("latest".to_string(), ".rb".to_string())
            } else {
                (index.to_string(), format!(".rb.{}", index))
            };
            lines.push(format!("{:<6} {:<10} {}", idx, suffix, file.comment));
            lines.push("       2024/01/05 10:11:12 UTC".to_string());
        }
        lines.push(RULE.to_string());
        lines.join("\r\n")
    }

    fn compare(&self, index: usize, id: &str) -> String {
        let before = &self.rollbacks[index].config;
        let mut keys: Vec<&String> = before.keys().chain(self.running.keys()).collect();
        keys.sort();
        keys.dedup();

        let mut patch = Vec::new();
        for key in keys {
            match (before.get(key), self.running.get(key)) {
                (None, Some(new)) => patch.push(format!("+   {}={}", key, new)),
                (Some(old), None) => patch.push(format!("-   {}={}", key, old)),
                (Some(old), Some(new)) if old != new => {
                    patch.push(format!("-   {}={}", key, old));
                    patch.push(format!("+   {}={}", key, new));
                }
                _ => {}
            }
        }

        if patch.is_empty() {
            return "No differences found".to_string();
        }
        format!(
            "Comparing {} to active-cfg\r\n{}\r\n{}\r\n{}",
            id,
            SEPARATOR,
            patch.join("\r\n"),
            SEPARATOR
        )
    }
}

fn bad_command(command: &str) -> String {
    format!("Error: Bad Command:  \"{}\"", command)
}

fn missing_checkpoint() -> String {
    "MINOR: CLI Rollback checkpoint does not exist.".to_string()
}

impl CommandChannel for SimulatedRouter {
    async fn send(&mut self, command: &str) -> Result<Response> {
        if self.closed {
            return Err(ChannelError::NotOpen.into());
        }
        self.sent.push(command.to_string());

        if self.disconnects.iter().any(|p| command.starts_with(p.as_str())) {
            self.closed = true;
            return Err(ChannelError::Closed.into());
        }
        if self.hangs.iter().any(|p| command.starts_with(p.as_str())) {
            std::future::pending::<()>().await;
        }

        let output = self.execute(command);
        let prompt = self.prompt();
        let raw = format!("{}\r\n{}\r\n{} ", command, output, prompt);
        let response = Response::new(command, output, raw, prompt, Duration::ZERO);

        Ok(match self.profile.detect_failure(&response.result) {
            Some(message) => response.with_failure(message),
            None => response,
        })
    }

    async fn read_prompt(&mut self) -> Result<String> {
        if self.closed {
            return Err(ChannelError::NotOpen.into());
        }
        self.prompt_reads += 1;
        Ok(self.prompt())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
