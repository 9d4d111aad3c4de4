//! SSH session management
//!
//! [`SshSession`] wraps an authenticated russh handle and hands out the
//! two channel flavors the drivers need: an exec channel streaming the
//! remote `scp -t` sink, and an SFTP subsystem channel. One session
//! serves many sequential file transfers; channels live for one file.

use russh::client;
use russh::ChannelStream;
use russh_sftp::client::SftpSession as RusshSftpSession;
use tracing::{debug, info};

use super::client::ClientHandler;
use crate::error::SyncError;

/// A live authenticated transport session to one remote target.
pub struct SshSession {
    handle: client::Handle<ClientHandler>,
}

impl SshSession {
    pub(crate) fn new(handle: client::Handle<ClientHandler>) -> Self {
        Self { handle }
    }

    /// Open an exec channel running `command` and return its byte stream.
    pub async fn open_exec(&self, command: &str) -> Result<ChannelStream<client::Msg>, SyncError> {
        debug!("Opening exec channel: {}", command);

        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SyncError::ChannelError(format!("Failed to open exec channel: {}", e)))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| SyncError::ChannelError(format!("Exec request failed: {}", e)))?;

        Ok(channel.into_stream())
    }

    /// Open an SFTP subsystem channel.
    pub async fn open_sftp(&self) -> Result<RusshSftpSession, SyncError> {
        debug!("Opening SFTP subsystem channel");

        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SyncError::ChannelError(format!("Failed to open SFTP channel: {}", e)))?;

        channel.request_subsystem(true, "sftp").await.map_err(|e| {
            SyncError::ChannelError(format!("Failed to request SFTP subsystem: {}", e))
        })?;

        RusshSftpSession::new(channel.into_stream())
            .await
            .map_err(|e| SyncError::ChannelError(e.to_string()))
    }

    /// Close the transport session.
    pub async fn disconnect(self) {
        info!("Disconnecting SSH session");
        let _ = self
            .handle
            .disconnect(russh::Disconnect::ByApplication, "", "English")
            .await;
    }
}
