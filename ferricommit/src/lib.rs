//! # Ferricommit
//!
//! Checkpoint-guarded configuration transactions for network devices driven
//! over an interactive SSH CLI.
//!
//! Device CLIs apply each command the moment it is entered. Ferricommit
//! wraps a list of commands in a transaction: on devices that can save
//! rollback checkpoints the rollout is all-or-nothing, can be previewed as a
//! dry-run, and reports the device's own diff. On devices without
//! checkpoints it falls back to a prompt-marker change flag.
//!
//! ## Features
//!
//! - Async SSH sessions via russh with scrapli-style prompt matching
//! - Rollback on the first failed, timed-out, or cancelled command
//! - Dry-run (apply, diff, revert) and post-commit diffs
//! - Bounded checkpoint retention that never touches other tools' checkpoints
//! - Nokia SR OS Classic CLI support (`admin rollback`)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ferricommit::{
//!     CommandChannel, SessionBuilder, TransactionConfig, TransactionEngine, TransactionRequest,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = SessionBuilder::new("192.0.2.1")
//!         .username("admin")
//!         .password("admin")
//!         .open()
//!         .await?;
//!
//!     let report = {
//!         let mut engine =
//!             TransactionEngine::from_config(&mut session, TransactionConfig::default())?;
//!         let request = TransactionRequest::new(["configure system name \"edge-1\""])
//!             .with_dry_run(true)
//!             .with_diff(true);
//!         engine.execute(&request).await?
//!     };
//!
//!     println!("would change: {}", report.changed());
//!     if let Some(diff) = report.diff() {
//!         println!("{}", diff);
//!     }
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod channel;
pub mod checkpoint;
pub mod error;
pub mod platform;
pub mod transaction;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use builder::SessionBuilder;
pub use channel::{CliSession, CommandChannel, Response};
pub use checkpoint::{CheckpointStore, SrosCheckpoints};
pub use error::{Error, ErrorKind, Severity, TransactionError};
pub use platform::DeviceProfile;
pub use transaction::{
    CancellationToken, Capability, ChangeResult, Mode, Outcome, TransactionConfig,
    TransactionEngine, TransactionReport, TransactionRequest,
};
pub use transport::{AuthMethod, SshConfig};
