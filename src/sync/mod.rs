//! File synchronization
//!
//! A [`Synchronizer`] owns one SSH session to a remote target and pushes
//! files through it, one transfer at a time, over SCP or SFTP depending
//! on the target's configured protocol. The [`UploadScheduler`] fans a
//! batch of tasks out over a bounded pool of synchronizers.

mod scheduler;
pub mod scp;
pub mod sftp;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::{RemoteTarget, SyncProtocol};
use crate::error::SyncError;
use crate::notify::Notifier;
use crate::path_map::{map_remote_dir, relative_dir};
use crate::progress::{ProgressReporter, TransferControl};
use crate::ssh::{SshClient, SshSession};
use crate::status::{SyncStats, SyncStatus};

pub use scheduler::{SyncBatch, UploadScheduler};
pub use scp::{scp_sink_command, ScpUploader};
pub use sftp::{RemoteAttrs, RemoteFs, SftpChannel, SftpUploader};

/// One file to push to the remote.
#[derive(Debug, Clone)]
pub struct UploadTask {
    /// Local file to read.
    pub local_path: PathBuf,
    /// Destination path relative to the target's workspace root,
    /// including the file name.
    pub remote_relative_path: String,
}

impl UploadTask {
    pub fn new(local_path: impl Into<PathBuf>, remote_relative_path: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            remote_relative_path: remote_relative_path.into(),
        }
    }

    /// File name used for exclusion matching and progress text.
    pub fn file_name(&self) -> String {
        self.local_path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.remote_relative_path.clone())
    }
}

/// Terminal state of one task inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferStatus {
    Ok,
    SkippedExcluded,
    Failed(String),
}

/// A task together with how it ended.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub task: UploadTask,
    pub status: TransferStatus,
}

/// One pooled transfer capability.
///
/// The scheduler only needs connect/transfer/disconnect; tests drive it
/// with a mock instead of a live SSH session.
#[async_trait]
pub trait SyncWorker: Send {
    /// Establish the session. Calling this on a connected worker is a
    /// no-op.
    async fn connect(&mut self) -> Result<(), SyncError>;

    /// Tear the session down and unregister the target.
    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Push one file. Requires a prior successful [`connect`].
    ///
    /// [`connect`]: SyncWorker::connect
    async fn transfer(
        &mut self,
        task: &UploadTask,
        progress: &ProgressReporter,
        control: &TransferControl,
    ) -> Result<(), SyncError>;
}

enum SessionState {
    Disconnected,
    Connected(SshSession),
}

/// Connection plus per-file transfer logic for one remote target.
pub struct Synchronizer {
    target: Arc<RemoteTarget>,
    status: Arc<SyncStatus>,
    stats: Arc<SyncStats>,
    notifier: Arc<dyn Notifier>,
    state: SessionState,
}

impl Synchronizer {
    pub fn new(
        target: Arc<RemoteTarget>,
        status: Arc<SyncStatus>,
        stats: Arc<SyncStats>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            target,
            status,
            stats,
            notifier,
            state: SessionState::Disconnected,
        }
    }

    async fn transfer_inner(
        session: &SshSession,
        target: &RemoteTarget,
        task: &UploadTask,
        progress: &ProgressReporter,
        control: &TransferControl,
    ) -> Result<(), SyncError> {
        let remote_dir = map_remote_dir(&target.workspace_root, &task.remote_relative_path)?;

        match target.protocol {
            SyncProtocol::Scp => {
                let command = scp_sink_command(&remote_dir, target.preserve_timestamps);
                debug!("exec: {}", command);
                let stream = session.open_exec(&command).await?;
                ScpUploader::new(stream)
                    .upload(&task.local_path, target.preserve_timestamps, progress, control)
                    .await
            }
            SyncProtocol::Sftp => {
                let sftp = session.open_sftp().await?;
                let mut uploader = SftpUploader::new(SftpChannel::new(sftp));
                let result = uploader
                    .upload(
                        &task.local_path,
                        &target.workspace_root,
                        &relative_dir(&task.remote_relative_path)?,
                        target.preserve_timestamps,
                        progress,
                        control,
                    )
                    .await;
                uploader.into_fs().close().await;
                result
            }
        }
    }
}

#[async_trait]
impl SyncWorker for Synchronizer {
    async fn connect(&mut self) -> Result<(), SyncError> {
        if matches!(self.state, SessionState::Connected(_)) {
            return Ok(());
        }
        let session = SshClient::new(self.target.clone())
            .connect(&self.status, &*self.notifier)
            .await?;
        self.state = SessionState::Connected(session);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let SessionState::Connected(session) =
            std::mem::replace(&mut self.state, SessionState::Disconnected)
        {
            session.disconnect().await;
            if self.status.remove_running_sync(&self.target.name) {
                self.notifier.running_set_changed();
            }
            info!("Disconnected from {}", self.target.name);
        }
    }

    fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Connected(_))
    }

    async fn transfer(
        &mut self,
        task: &UploadTask,
        progress: &ProgressReporter,
        control: &TransferControl,
    ) -> Result<(), SyncError> {
        let session = match &self.state {
            SessionState::Connected(session) => session,
            SessionState::Disconnected => return Err(SyncError::NotConnected),
        };

        match Self::transfer_inner(session, &self.target, task, progress, control).await {
            Ok(()) => {
                self.stats.register_successful_upload();
                self.notifier
                    .upload_succeeded(&self.target.name, &task.file_name());
                Ok(())
            }
            Err(e) => {
                if self.status.remove_running_sync(&self.target.name) {
                    self.notifier.running_set_changed();
                }
                self.notifier
                    .transfer_failed(&self.target.name, &task.file_name(), &e.to_string());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthMethod;
    use crate::notify::LogNotifier;

    fn target(protocol: SyncProtocol) -> Arc<RemoteTarget> {
        Arc::new(RemoteTarget {
            name: "staging".into(),
            protocol,
            host: "staging.example.com".into(),
            port: 22,
            username: "deploy".into(),
            auth: AuthMethod::password("secret"),
            workspace_root: "/srv/app".into(),
            excluded_files: String::new(),
            preserve_timestamps: false,
            max_concurrency: 2,
            timeout_secs: 30,
        })
    }

    #[tokio::test]
    async fn test_transfer_without_connect_is_contract_violation() {
        let mut sync = Synchronizer::new(
            target(SyncProtocol::Scp),
            Arc::new(SyncStatus::new()),
            Arc::new(SyncStats::new()),
            Arc::new(LogNotifier),
        );
        let err = sync
            .transfer(
                &UploadTask::new("/tmp/a.txt", "a.txt"),
                &ProgressReporter::disabled(),
                &TransferControl::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotConnected));
    }

    #[tokio::test]
    async fn test_disconnect_when_never_connected_is_noop() {
        let status = Arc::new(SyncStatus::new());
        let mut sync = Synchronizer::new(
            target(SyncProtocol::Sftp),
            status.clone(),
            Arc::new(SyncStats::new()),
            Arc::new(LogNotifier),
        );
        sync.disconnect().await;
        assert!(!sync.is_connected());
        assert!(!status.is_any_running());
    }

    #[test]
    fn test_file_name_prefers_local_path() {
        let task = UploadTask::new("/work/src/lib.rs", "src/lib.rs");
        assert_eq!(task.file_name(), "lib.rs");
    }
}
