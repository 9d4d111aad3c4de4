//! Transfer progress and cancellation
//!
//! Progress flows one way: drivers push [`ProgressEvent`]s through a
//! per-task [`ProgressReporter`] and the caller consumes them from a
//! channel, so no mutable indicator object is shared across workers.
//! Cancellation travels the other way through [`TransferControl`].

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

/// One progress update for a single task.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Human-readable status line, e.g. `Uploading...[main.rs]`
    Text { task_id: String, text: String },
    /// Switch between indeterminate and determinate display
    Indeterminate { task_id: String, indeterminate: bool },
    /// Fraction of the current file uploaded, 0.0..=1.0
    Fraction { task_id: String, fraction: f64 },
}

/// Sender half handed to a driver for one task.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    task_id: String,
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressReporter {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            tx: Some(tx),
        }
    }

    /// Reporter that drops every event. For callers without a progress UI.
    pub fn disabled() -> Self {
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            tx: None,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn set_text(&self, text: impl Into<String>) {
        self.send(ProgressEvent::Text {
            task_id: self.task_id.clone(),
            text: text.into(),
        });
    }

    pub fn set_indeterminate(&self, indeterminate: bool) {
        self.send(ProgressEvent::Indeterminate {
            task_id: self.task_id.clone(),
            indeterminate,
        });
    }

    pub fn set_fraction(&self, fraction: f64) {
        self.send(ProgressEvent::Fraction {
            task_id: self.task_id.clone(),
            fraction,
        });
    }

    fn send(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            // A gone consumer must not abort the transfer
            let _ = tx.send(event);
        }
    }
}

/// Cancellation signal shared by every task of a batch.
#[derive(Debug, Clone)]
pub struct TransferControl {
    inner: Arc<ControlInner>,
}

#[derive(Debug)]
struct ControlInner {
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
}

impl TransferControl {
    pub fn new() -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            inner: Arc::new(ControlInner {
                cancel_tx,
                cancel_rx,
            }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancel_rx.borrow()
    }

    pub fn cancel(&self) {
        let _ = self.inner.cancel_tx.send(true);
    }

    /// Receiver for waiting on cancellation
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.cancel_rx.clone()
    }
}

impl Default for TransferControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reporter_emits_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = ProgressReporter::new(tx);
        let id = reporter.task_id().to_string();

        reporter.set_indeterminate(false);
        reporter.set_text("Uploading...[a.txt]");
        reporter.set_fraction(0.5);

        assert_eq!(
            rx.recv().await.unwrap(),
            ProgressEvent::Indeterminate {
                task_id: id.clone(),
                indeterminate: false
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            ProgressEvent::Text {
                task_id: id.clone(),
                text: "Uploading...[a.txt]".to_string()
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            ProgressEvent::Fraction {
                task_id: id,
                fraction: 0.5
            }
        );
    }

    #[test]
    fn test_disabled_reporter_is_silent() {
        let reporter = ProgressReporter::disabled();
        reporter.set_text("ignored");
        reporter.set_fraction(1.0);
    }

    #[test]
    fn test_cancel_visible_to_clones() {
        let control = TransferControl::new();
        let clone = control.clone();
        assert!(!clone.is_cancelled());
        control.cancel();
        assert!(clone.is_cancelled());
    }
}
