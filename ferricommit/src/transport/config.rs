//! Where a device's SSH service lives and how to log in to it.
//!
//! Terminal geometry is not a connection setting here. It comes from the
//! [`DeviceProfile`](crate::platform::DeviceProfile) when the shell is opened.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

/// Network address of a device's SSH service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAddress {
    /// Hostname or IP address.
    pub host: String,

    /// TCP port.
    pub port: u16,
}

impl DeviceAddress {
    /// Standard SSH port.
    pub const DEFAULT_PORT: u16 = 22;

    /// Address `host` on the standard SSH port.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: Self::DEFAULT_PORT,
        }
    }

    /// Use `port` instead of the standard one.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

impl fmt::Display for DeviceAddress {
    /// `host:port`, with IPv6 literals in brackets.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Who to log in as, and with what.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub auth: AuthMethod,
}

impl Credentials {
    /// Name of the SSH authentication method, for log messages.
    pub fn method_name(&self) -> &'static str {
        match self.auth {
            AuthMethod::None => "none",
            AuthMethod::Password(_) => "password",
            AuthMethod::PrivateKey { .. } => "publickey",
        }
    }
}

/// Authentication method for SSH connections.
#[derive(Debug, Clone)]
pub enum AuthMethod {
    /// No authentication (for testing only).
    None,

    /// Password authentication.
    Password(SecretString),

    /// Private key authentication.
    PrivateKey {
        /// Path to the private key file.
        path: PathBuf,
        /// Optional passphrase for encrypted keys.
        passphrase: Option<SecretString>,
    },
}

/// Host key verification mode, analogous to OpenSSH's `StrictHostKeyChecking`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostKeyVerification {
    /// Reject unknown and changed keys.
    Strict,

    /// Accept and learn unknown keys, reject changed keys.
    #[default]
    AcceptNew,

    /// Accept all keys without checking. For lab use only.
    Disabled,
}

/// How server host keys are checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostKeyPolicy {
    pub verification: HostKeyVerification,

    /// known_hosts file to check and learn into. `None` uses `~/.ssh/known_hosts`.
    pub known_hosts_path: Option<PathBuf>,
}

impl HostKeyPolicy {
    /// Accept any host key.
    pub fn disabled() -> Self {
        Self {
            verification: HostKeyVerification::Disabled,
            known_hosts_path: None,
        }
    }

    /// Whether the known_hosts file is consulted at all.
    pub fn checks_known_hosts(&self) -> bool {
        self.verification != HostKeyVerification::Disabled
    }
}

/// Everything needed to reach and log in to one device.
#[derive(Debug, Clone)]
pub struct SshConfig {
    pub address: DeviceAddress,
    pub credentials: Credentials,

    /// Bound on TCP connect plus SSH handshake. Sessions also start with it
    /// as their prompt read timeout.
    pub connect_timeout: Duration,

    pub host_keys: HostKeyPolicy,
}
