//! Sync error types

use thiserror::Error;

/// Classification of a non-zero scp acknowledgement byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    /// Byte 1: recoverable server-side error for the current file.
    Error,
    /// Byte 2: fatal server-side error.
    Fatal,
}

impl std::fmt::Display for AckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AckKind::Error => write!(f, "error"),
            AckKind::Fatal => write!(f, "fatal error"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Key error: {0}")]
    KeyError(String),

    #[error("scp remote {kind}: {message}")]
    Ack { kind: AckKind, message: String },

    #[error("Remote state error: {0}")]
    RemoteState(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("Session is not connected")]
    NotConnected,

    #[error("SSH protocol error: {0}")]
    Protocol(String),
}

impl From<russh::Error> for SyncError {
    fn from(err: russh::Error) -> Self {
        SyncError::Protocol(err.to_string())
    }
}

impl From<russh::keys::Error> for SyncError {
    fn from(err: russh::keys::Error) -> Self {
        SyncError::KeyError(err.to_string())
    }
}

impl From<russh_sftp::client::error::Error> for SyncError {
    fn from(err: russh_sftp::client::error::Error) -> Self {
        SyncError::RemoteState(err.to_string())
    }
}
