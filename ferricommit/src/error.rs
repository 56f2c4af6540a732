//! Error types for ferricommit.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::transaction::Outcome;

/// Main error type for ferricommit operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Command channel errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Checkpoint store errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// A configuration transaction did not complete
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    /// Invalid configuration in a builder or config struct
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// Transport layer errors (SSH connection, authentication).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// Host is not present in known_hosts (strict verification)
    #[error("Host key for {host}:{port} is unknown")]
    HostKeyUnknown { host: String, port: u16 },

    /// Host key differs from the one recorded in known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Command channel errors (prompt matching, PTY operations).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Session has not been opened or was already closed
    #[error("Channel not open")]
    NotOpen,

    /// Prompt was not seen within the read timeout
    #[error("Prompt not found within {0:?}")]
    PatternTimeout(Duration),

    /// Channel closed by the device
    #[error("Channel closed")]
    Closed,

    /// SSH protocol error on the channel
    #[error("Channel SSH error: {0}")]
    Ssh(russh::Error),

    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Checkpoint store errors.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// A checkpoint with this name already exists on the device
    #[error("Checkpoint '{name}' already exists")]
    NameCollision { name: String },

    /// No checkpoint with this name is listed on the device
    #[error("Checkpoint '{name}' not found")]
    NotFound { name: String },

    /// The device rejected a checkpoint command
    #[error("Device rejected '{command}': {message}")]
    Rejected { command: String, message: String },
}

/// Classification of a failed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The safety checkpoint could not be created; nothing was sent.
    CheckpointCreationFailed,
    /// A command failed, timed out, or was cancelled while applying.
    ConfigurationApplyFailed,
    /// Restoring the safety checkpoint failed; device state is indeterminate.
    RollbackFailed,
    /// Dry-run or diff was requested in a mode that cannot provide it.
    UnsupportedInMode,
    /// A checkpoint named by the caller does not exist.
    CheckpointMissing,
}

/// How a caller should treat a failed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// The device is in a known state; the request may be corrected and resubmitted.
    Recoverable,
    /// The device is in a known but partially modified state.
    Degraded,
    /// The device state is unknown relative to the caller's expectations.
    Fatal,
}

impl ErrorKind {
    /// Severity of this kind of failure.
    pub fn severity(self) -> Severity {
        match self {
            ErrorKind::RollbackFailed => Severity::Fatal,
            _ => Severity::Recoverable,
        }
    }

    /// Stable identifier for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::CheckpointCreationFailed => "CheckpointCreationFailed",
            ErrorKind::ConfigurationApplyFailed => "ConfigurationApplyFailed",
            ErrorKind::RollbackFailed => "RollbackFailed",
            ErrorKind::UnsupportedInMode => "UnsupportedInMode",
            ErrorKind::CheckpointMissing => "CheckpointMissing",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configuration transaction that ended without committing.
///
/// Carries the outcome the engine reached, whether the device changed along
/// the way, and any cleanup warnings. A warning never replaces the primary
/// failure.
#[derive(Error, Debug, Clone)]
#[error("{kind}: {detail}")]
pub struct TransactionError {
    /// What went wrong.
    pub kind: ErrorKind,

    /// Human-readable context (phase, device message, rollback outcome).
    pub detail: String,

    /// The caller command that failed, if a command was at fault.
    pub offending_command: Option<String>,

    /// Terminal outcome of the transaction.
    pub outcome: Outcome,

    /// Whether the device-persisted state differs from before the transaction.
    pub changed: bool,

    /// Secondary problems (cleanup, retention) encountered after the outcome was settled.
    pub warnings: Vec<String>,
}

impl TransactionError {
    /// Create an error that left the device untouched.
    pub fn new(kind: ErrorKind, detail: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            kind,
            detail: detail.into(),
            offending_command: None,
            outcome,
            changed: false,
            warnings: Vec::new(),
        }
    }

    /// Attach the command that caused the failure.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.offending_command = Some(command.into());
        self
    }

    /// Record whether the device was left modified.
    pub fn with_changed(mut self, changed: bool) -> Self {
        self.changed = changed;
        self
    }

    /// Attach cleanup warnings.
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Severity of the underlying failure kind.
    pub fn severity(&self) -> Severity {
        if self.kind == ErrorKind::ConfigurationApplyFailed && self.changed {
            return Severity::Degraded;
        }
        self.kind.severity()
    }
}

/// Result type alias using ferricommit's Error.
pub type Result<T> = std::result::Result<T, Error>;
