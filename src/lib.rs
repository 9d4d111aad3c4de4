//! SourceSync: push local file changes to remote servers over SSH.
//!
//! The crate maps workspace-relative paths onto a remote workspace root,
//! uploads files over SCP (exec channel) or SFTP (subsystem channel),
//! and fans batches out over a bounded pool of SSH sessions. See
//! [`sync::UploadScheduler`] for the batch entry point and
//! [`config::RemoteTarget`] for per-server configuration.

pub mod config;
pub mod credentials;
pub mod error;
pub mod notify;
pub mod path_map;
pub mod progress;
pub mod ssh;
pub mod status;
pub mod sync;

pub use config::{AuthMethod, RemoteTarget, SyncProtocol};
pub use error::{AckKind, SyncError};
pub use notify::{LogNotifier, Notifier};
pub use progress::{ProgressEvent, ProgressReporter, TransferControl};
pub use status::{SyncStats, SyncStatus};
pub use sync::{
    SyncBatch, SyncWorker, Synchronizer, TransferOutcome, TransferStatus, UploadScheduler,
    UploadTask,
};
