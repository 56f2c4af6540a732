//! Command channel: the strict request/response link to one device.
//!
//! The transaction engine only needs three things from a device session:
//! send a command and get its output, read the current prompt, and close.
//! [`CommandChannel`] captures exactly that, so the engine can run against
//! an SSH shell ([`CliSession`]) or anything else that pairs commands with
//! prompts.

mod buffer;
mod response;
mod session;

pub use buffer::PatternBuffer;
pub use response::Response;
pub use session::CliSession;

use std::future::Future;

use crate::error::Result;

/// A duplex, line-oriented channel bound to exactly one device.
///
/// Operations are strictly paired: each call completes (the device prompt
/// has returned) before the next one starts. A device-reported error is a
/// successful call whose [`Response`] carries a `failure_message`; `Err` is
/// reserved for I/O problems (timeout, disconnect).
pub trait CommandChannel: Send {
    /// Send a command and wait for the prompt.
    fn send(&mut self, command: &str) -> impl Future<Output = Result<Response>> + Send;

    /// Read the device's current prompt.
    fn read_prompt(&mut self) -> impl Future<Output = Result<String>> + Send;

    /// Close the channel.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}
