//! Builder for opening device sessions.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::channel::CliSession;
use crate::error::{Error, Result};
use crate::platform::{self, DeviceProfile};
use crate::transport::config::{
    AuthMethod, Credentials, DeviceAddress, HostKeyPolicy, HostKeyVerification, SshConfig,
};

/// Builder for a connected [`CliSession`].
///
/// # Example
///
/// ```rust,no_run
/// use ferricommit::SessionBuilder;
///
/// # async fn example() -> Result<(), ferricommit::Error> {
/// let session = SessionBuilder::new("192.168.1.1")
///     .username("admin")
///     .password("secret")
///     .open()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct SessionBuilder {
    address: DeviceAddress,
    username: Option<String>,
    auth: AuthMethod,
    profile: Option<DeviceProfile>,
    timeout: Duration,
    host_keys: HostKeyPolicy,
}

impl SessionBuilder {
    /// Create a new session builder for the specified host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            address: DeviceAddress::new(host),
            username: None,
            auth: AuthMethod::None,
            profile: None,
            timeout: Duration::from_secs(30),
            host_keys: HostKeyPolicy::default(),
        }
    }

    /// Set the SSH port (default: 22).
    pub fn port(mut self, port: u16) -> Self {
        self.address = self.address.with_port(port);
        self
    }

    /// Set the username for authentication.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set password authentication.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.auth = AuthMethod::Password(SecretString::from(password.into()));
        self
    }

    /// Set private key authentication.
    pub fn private_key(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.auth = AuthMethod::PrivateKey {
            path: key_path.into(),
            passphrase: None,
        };
        self
    }

    /// Set private key authentication with passphrase.
    pub fn private_key_with_passphrase(
        mut self,
        key_path: impl Into<PathBuf>,
        passphrase: impl Into<String>,
    ) -> Self {
        self.auth = AuthMethod::PrivateKey {
            path: key_path.into(),
            passphrase: Some(SecretString::from(passphrase.into())),
        };
        self
    }

    /// Use a custom device profile (default: Nokia SR OS Classic).
    pub fn profile(mut self, profile: DeviceProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Set the connect and per-read prompt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set host key verification mode.
    pub fn host_key_verification(mut self, mode: HostKeyVerification) -> Self {
        self.host_keys.verification = mode;
        self
    }

    /// Use a specific known_hosts file.
    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.host_keys.known_hosts_path = Some(path.into());
        self
    }

    /// Disable host key verification entirely. For lab use only.
    pub fn danger_disable_host_key_verification(mut self) -> Self {
        self.host_keys = HostKeyPolicy::disabled();
        self
    }

    /// Validate settings and produce the SSH configuration and profile.
    pub fn build(self) -> Result<(SshConfig, DeviceProfile)> {
        let username = self.username.ok_or_else(|| Error::InvalidConfig {
            message: "Username is required".to_string(),
        })?;

        if self.address.host.is_empty() {
            return Err(Error::InvalidConfig {
                message: "Host is required".to_string(),
            });
        }

        if self.timeout.is_zero() {
            return Err(Error::InvalidConfig {
                message: "Timeout must be greater than zero".to_string(),
            });
        }

        let profile = match self.profile {
            Some(profile) => profile,
            None => platform::nokia_sros::classic()?,
        };

        let ssh_config = SshConfig {
            address: self.address,
            credentials: Credentials {
                username,
                auth: self.auth,
            },
            connect_timeout: self.timeout,
            host_keys: self.host_keys,
        };

        Ok((ssh_config, profile))
    }

    /// Connect and open the session.
    pub async fn open(self) -> Result<CliSession> {
        let (ssh_config, profile) = self.build()?;
        CliSession::open(ssh_config, profile).await
    }
}
