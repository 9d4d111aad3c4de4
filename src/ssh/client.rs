//! SSH client implementation using russh
//!
//! The session-manager half that establishes an authenticated transport
//! session for one [`RemoteTarget`]. Connecting registers the target in
//! the running-sync set; any failure unregisters it again and notifies,
//! leaving no half-open transport behind.

use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;

use russh::client;
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::PublicKey;
use tracing::{debug, info};

use super::known_hosts::ensure_known_hosts;
use super::session::SshSession;
use crate::config::{AuthMethod, RemoteTarget};
use crate::error::SyncError;
use crate::notify::Notifier;
use crate::status::SyncStatus;

/// Connects and authenticates a session for one remote target.
pub struct SshClient {
    target: Arc<RemoteTarget>,
}

impl SshClient {
    pub fn new(target: Arc<RemoteTarget>) -> Self {
        Self { target }
    }

    /// Connect to the SSH server and return an authenticated session.
    ///
    /// The target is registered as running before dialing; on any failure
    /// it is unregistered again and `connect_failed` is notified.
    pub async fn connect(
        self,
        status: &SyncStatus,
        notifier: &dyn Notifier,
    ) -> Result<SshSession, SyncError> {
        status.add_running_sync(&self.target.name);
        notifier.running_set_changed();

        match self.dial().await {
            Ok(session) => Ok(session),
            Err(e) => {
                status.remove_running_sync(&self.target.name);
                notifier.running_set_changed();
                notifier.connect_failed(&self.target.name, &e.to_string());
                Err(e)
            }
        }
    }

    async fn dial(&self) -> Result<SshSession, SyncError> {
        let target = &self.target;
        let addr = format!("{}:{}", target.host, target.port);

        info!("Connecting to {} at {}", target.name, addr);

        // Resolve address
        let socket_addr = addr
            .to_socket_addrs()
            .map_err(|e| SyncError::ConnectionFailed(format!("Failed to resolve address: {}", e)))?
            .next()
            .ok_or_else(|| SyncError::ConnectionFailed(format!("No address found for {}", addr)))?;

        // Configure SSH client with keepalive
        let ssh_config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            ..Default::default()
        };

        let handler = ClientHandler::new(target.host.clone(), target.port);

        // Connect with timeout
        let mut handle = tokio::time::timeout(
            Duration::from_secs(target.timeout_secs),
            client::connect(Arc::new(ssh_config), socket_addr, handler),
        )
        .await
        .map_err(|_| SyncError::ConnectionFailed(format!("Connection to {} timed out", addr)))?
        .map_err(|e| SyncError::ConnectionFailed(e.to_string()))?;

        debug!("SSH handshake completed for {}", target.name);

        // Authenticate
        let authenticated = match &target.auth {
            AuthMethod::Password { password } => handle
                .authenticate_password(&target.username, password)
                .await
                .map_err(|e| SyncError::AuthenticationFailed(e.to_string()))?,
            AuthMethod::Key {
                key_path,
                passphrase,
            } => {
                // Matches a stock OpenSSH identity setup
                ensure_known_hosts().await?;

                let key = russh::keys::load_secret_key(key_path, passphrase.as_deref())
                    .map_err(|e| SyncError::KeyError(e.to_string()))?;
                let key_with_hash = PrivateKeyWithHashAlg::new(Arc::new(key), None);

                handle
                    .authenticate_publickey(&target.username, key_with_hash)
                    .await
                    .map_err(|e| SyncError::AuthenticationFailed(e.to_string()))?
            }
        };

        if !authenticated.success() {
            return Err(SyncError::AuthenticationFailed(
                "Authentication rejected by server".to_string(),
            ));
        }

        info!("SSH authentication successful for {}", target.name);

        Ok(SshSession::new(handle))
    }
}

/// Client handler for russh callbacks.
///
/// Host key checking is disabled: every server key is accepted, the
/// equivalent of `StrictHostKeyChecking no`.
pub struct ClientHandler {
    host: String,
    port: u16,
}

impl ClientHandler {
    pub fn new(host: String, port: u16) -> Self {
        Self { host, port }
    }
}

impl client::Handler for ClientHandler {
    type Error = SyncError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(
            "Accepting host key {} for {}:{} (strict host key checking disabled)",
            server_public_key.algorithm(),
            self.host,
            self.port
        );
        Ok(true)
    }
}
