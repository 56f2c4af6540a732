//! Device profiles: what a prompt looks like and how a device reports errors.
//!
//! A [`DeviceProfile`] is everything [`CliSession`](crate::channel::CliSession)
//! needs to pair a command with its output: the prompt regex that ends each
//! response, the substrings that mark a command as rejected, and the commands
//! that prepare the terminal after login.

pub mod nokia_sros;

use std::fmt;

use regex::bytes::Regex;

use crate::error::{ChannelError, Result};

/// Prompt and error conventions of one device CLI.
#[derive(Clone)]
pub struct DeviceProfile {
    /// Profile name (e.g., "nokia_sros_classic").
    pub name: String,

    /// Pattern that matches the prompt at the end of every response.
    pub prompt_pattern: Regex,

    /// Line prefixes that indicate the device rejected a command. Leading
    /// whitespace on the output line is ignored.
    pub failure_line_prefixes: Vec<String>,

    /// Commands to run right after the shell opens (failures ignored).
    pub on_open_commands: Vec<String>,

    /// Terminal width for PTY.
    pub terminal_width: u32,

    /// Terminal height for PTY.
    pub terminal_height: u32,
}

impl DeviceProfile {
    /// Create a profile from a prompt pattern.
    pub fn new(name: impl Into<String>, prompt_pattern: &str) -> Result<Self> {
        let prompt_pattern = Regex::new(prompt_pattern).map_err(ChannelError::InvalidPattern)?;
        Ok(Self {
            name: name.into(),
            prompt_pattern,
            failure_line_prefixes: vec![],
            on_open_commands: vec![],
            terminal_width: 511,
            terminal_height: 24,
        })
    }

    /// Add a failure line prefix.
    pub fn with_failure_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.failure_line_prefixes.push(pattern.into());
        self
    }

    /// Add an on_open command.
    pub fn with_on_open_command(mut self, command: impl Into<String>) -> Self {
        self.on_open_commands.push(command.into());
        self
    }

    /// Set terminal dimensions.
    pub fn with_terminal_size(mut self, width: u32, height: u32) -> Self {
        self.terminal_width = width;
        self.terminal_height = height;
        self
    }

    /// Return the first output line that starts with a failure pattern.
    ///
    /// Patterns further into a line (log entries, config descriptions echoed
    /// by `show` commands) are not failures.
    pub fn detect_failure(&self, output: &str) -> Option<String> {
        output
            .lines()
            .map(str::trim)
            .find(|line| {
                self.failure_line_prefixes
                    .iter()
                    .any(|pattern| line.starts_with(pattern.as_str()))
            })
            .map(str::to_string)
    }
}

impl fmt::Debug for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceProfile")
            .field("name", &self.name)
            .field("prompt_pattern", &self.prompt_pattern.as_str())
            .field("failure_line_prefixes", &self.failure_line_prefixes)
            .field("on_open_commands", &self.on_open_commands)
            .field("terminal_width", &self.terminal_width)
            .field("terminal_height", &self.terminal_height)
            .finish()
    }
}
