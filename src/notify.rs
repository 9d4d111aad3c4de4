//! Notification sink
//!
//! User-visible failure/success reporting is delegated to a [`Notifier`]
//! collaborator so the engine never renders UI itself. Every failure path
//! surfaces a human-readable reason; silent failure is not acceptable.

use tracing::{debug, info, warn};

/// Receives engine-level events for user-facing reporting.
pub trait Notifier: Send + Sync {
    /// A session could not be established for `target`.
    fn connect_failed(&self, target: &str, reason: &str);

    /// A single file transfer to `target` failed.
    fn transfer_failed(&self, target: &str, file_name: &str, reason: &str);

    /// One file finished uploading successfully.
    fn upload_succeeded(&self, target: &str, file_name: &str);

    /// The set of currently-syncing targets changed.
    fn running_set_changed(&self);
}

/// Notifier that reports through tracing only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn connect_failed(&self, target: &str, reason: &str) {
        warn!("Connect to {} failed: {}", target, reason);
    }

    fn transfer_failed(&self, target: &str, file_name: &str, reason: &str) {
        warn!("Upload of {} to {} failed: {}", file_name, target, reason);
    }

    fn upload_succeeded(&self, target: &str, file_name: &str) {
        info!("Uploaded {} to {}", file_name, target);
    }

    fn running_set_changed(&self) {
        debug!("Running sync set changed");
    }
}
