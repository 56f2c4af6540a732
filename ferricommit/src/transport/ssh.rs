//! SSH transport implementation using russh.

use std::sync::{Arc, Mutex};

use log::{debug, warn};
use russh::Channel;
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use secrecy::ExposeSecret;

use super::config::{
    AuthMethod, Credentials, DeviceAddress, HostKeyPolicy, HostKeyVerification, SshConfig,
};
use crate::error::{Result, TransportError};

/// An authenticated SSH connection to one device.
pub struct SshTransport {
    /// The russh session handle.
    session: Handle<SshHandler>,

    /// Where this connection goes.
    address: DeviceAddress,
}

impl SshTransport {
    /// Connect to the SSH server and authenticate.
    pub async fn connect(config: SshConfig) -> Result<Self> {
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: None,
            ..Default::default()
        });

        let host_key_error: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));

        let SshConfig {
            address,
            credentials,
            connect_timeout,
            host_keys,
        } = config;

        let handler = SshHandler {
            address: address.clone(),
            host_keys,
            host_key_error: host_key_error.clone(),
        };

        debug!(
            "connecting to {} as {} ({})",
            address,
            credentials.username,
            credentials.method_name()
        );

        let mut session = tokio::time::timeout(
            connect_timeout,
            client::connect(ssh_config, (address.host.as_str(), address.port), handler),
        )
        .await
        .map_err(|_| TransportError::Timeout(connect_timeout))?
        .map_err(|e| {
            // Prefer the detailed host key error over russh's generic UnknownKey
            let detailed = host_key_error.lock().ok().and_then(|mut slot| slot.take());
            match (detailed, e) {
                (Some(hk_err), _) => hk_err,
                (None, russh::Error::IO(source)) => TransportError::ConnectionFailed {
                    host: address.host.clone(),
                    port: address.port,
                    source,
                },
                (None, other) => TransportError::Ssh(other),
            }
        })?;

        Self::authenticate(&mut session, &credentials).await?;

        Ok(Self { session, address })
    }

    /// Open a session channel with a `width` x `height` PTY and an
    /// interactive shell.
    pub async fn open_shell(&self, width: u32, height: u32) -> Result<Channel<Msg>> {
        let channel = self
            .session
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_pty(true, "xterm", width, height, 0, 0, &[])
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_shell(true)
            .await
            .map_err(TransportError::Ssh)?;

        Ok(channel)
    }

    /// Check if the underlying session task is still running.
    pub fn is_alive(&self) -> bool {
        !self.session.is_closed()
    }

    /// Get the device address.
    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    async fn authenticate(
        session: &mut Handle<SshHandler>,
        credentials: &Credentials,
    ) -> Result<()> {
        let username = credentials.username.as_str();
        let success = match &credentials.auth {
            AuthMethod::None => session
                .authenticate_none(username)
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            AuthMethod::Password(password) => session
                .authenticate_password(username, password.expose_secret())
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            AuthMethod::PrivateKey { path, passphrase } => {
                let key = load_secret_key(
                    path,
                    passphrase.as_ref().map(|p| p.expose_secret()),
                )
                .map_err(|e| TransportError::Key(e.to_string()))?;

                let hash_alg = session
                    .best_supported_rsa_hash()
                    .await
                    .map_err(TransportError::Ssh)?
                    .flatten();

                session
                    .authenticate_publickey(
                        username,
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                    )
                    .await
                    .map_err(TransportError::Ssh)?
                    .success()
            }
        };

        if !success {
            return Err(TransportError::AuthenticationFailed {
                user: username.to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Disconnect the SSH session.
    pub async fn close(self) -> Result<()> {
        self.session
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }
}

/// SSH client handler for russh.
struct SshHandler {
    address: DeviceAddress,
    host_keys: HostKeyPolicy,
    /// Detailed host-key error surfaced by `connect()`.
    host_key_error: Arc<Mutex<Option<TransportError>>>,
}

impl SshHandler {
    /// Returns `Ok(true)` if matched, `Ok(false)` if host not found.
    fn check_known_hosts(&self, pubkey: &PublicKey) -> std::result::Result<bool, TransportError> {
        let DeviceAddress { host, port } = &self.address;
        let result = match &self.host_keys.known_hosts_path {
            Some(path) => russh::keys::check_known_hosts_path(host, *port, pubkey, path),
            None => russh::keys::check_known_hosts(host, *port, pubkey),
        };

        match result {
            Ok(matched) => Ok(matched),
            Err(russh::keys::Error::KeyChanged { line }) => Err(TransportError::HostKeyChanged {
                host: host.clone(),
                port: *port,
                line,
            }),
            Err(e) => Err(TransportError::KnownHosts(e.to_string())),
        }
    }

    fn learn_host_key(&self, pubkey: &PublicKey) -> std::result::Result<(), TransportError> {
        let DeviceAddress { host, port } = &self.address;
        let result = match &self.host_keys.known_hosts_path {
            Some(path) => {
                russh::keys::known_hosts::learn_known_hosts_path(host, *port, pubkey, path)
            }
            None => russh::keys::known_hosts::learn_known_hosts(host, *port, pubkey),
        };

        result.map_err(|e| TransportError::KnownHosts(e.to_string()))
    }

    fn reject(&self, error: TransportError) -> bool {
        if let Ok(mut slot) = self.host_key_error.lock() {
            *slot = Some(error);
        }
        false
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let accepted = match self.host_keys.verification {
            HostKeyVerification::Disabled => true,
            HostKeyVerification::AcceptNew => match self.check_known_hosts(server_public_key) {
                Ok(true) => true,
                Ok(false) => {
                    if let Err(e) = self.learn_host_key(server_public_key) {
                        warn!("Failed to save host key: {}", e);
                    }
                    true
                }
                Err(e) => self.reject(e),
            },
            HostKeyVerification::Strict => match self.check_known_hosts(server_public_key) {
                Ok(true) => true,
                Ok(false) => self.reject(TransportError::HostKeyUnknown {
                    host: self.address.host.clone(),
                    port: self.address.port,
                }),
                Err(e) => self.reject(e),
            },
        };
        Ok(accepted)
    }
}
