//! SSH transport layer wrapping russh.
//!
//! Connection setup, authentication, host key checks, and opening the
//! interactive shell that [`CliSession`](crate::channel::CliSession) drives.

pub mod config;
mod ssh;

pub use config::{
    AuthMethod, Credentials, DeviceAddress, HostKeyPolicy, HostKeyVerification, SshConfig,
};
pub use ssh::SshTransport;
