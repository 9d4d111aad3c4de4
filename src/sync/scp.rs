//! SCP upload driver
//!
//! Drives one file upload through the classic scp sink protocol over an
//! exec channel running `scp -t`. Every client write is gated by a
//! single-byte acknowledgement from the remote: 0 continues, 1 and 2
//! carry a server message terminated by `\n`, anything else (or EOF) is a
//! connection-level failure.
//!
//! The driver is generic over the byte stream so tests can run it against
//! an in-memory duplex pipe instead of a live channel.

use std::path::Path;
use std::time::UNIX_EPOCH;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{AckKind, SyncError};
use crate::progress::{ProgressReporter, TransferControl};

/// Chunk size for streaming file content.
const SCP_CHUNK: usize = 1024;

/// Remote sink command for one upload.
///
/// `-p` is present iff timestamps are preserved, `-C` enables compression.
pub fn scp_sink_command(remote_dir: &str, preserve_timestamps: bool) -> String {
    format!(
        "scp {}-t -C {}",
        if preserve_timestamps { "-p " } else { "" },
        remote_dir
    )
}

/// One-shot scp protocol driver over an exec-channel stream.
pub struct ScpUploader<S> {
    stream: S,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> ScpUploader<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Upload `local` through the sink, consuming the channel stream.
    ///
    /// Protocol gates, each followed by an acknowledgement read:
    /// 1. sink ready, 2. optional `T` timestamp line, 3. `C0644` header,
    /// 4. file content in 1024-byte chunks plus a `\0` terminator.
    pub async fn upload(
        mut self,
        local: &Path,
        preserve_timestamps: bool,
        progress: &ProgressReporter,
        control: &TransferControl,
    ) -> Result<(), SyncError> {
        // The sink speaks first
        self.read_ack().await?;

        let metadata = tokio::fs::metadata(local).await?;
        let file_size = metadata.len();
        let file_name = local
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                SyncError::InvalidPath(format!("{} has no usable file name", local.display()))
            })?;

        progress.set_indeterminate(false);
        progress.set_text(format!("Uploading...[{}]", file_name));

        if preserve_timestamps {
            // Access time is not portably readable, reuse the mtime
            let mtime = metadata
                .modified()?
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            self.stream
                .write_all(format!("T {} 0 {} 0\n", mtime, mtime).as_bytes())
                .await?;
            self.stream.flush().await?;
            self.read_ack().await?;
        }

        // "C0644 filesize filename", where filename must not contain '/'
        self.stream
            .write_all(format!("C0644 {} {}\n", file_size, file_name).as_bytes())
            .await?;
        self.stream.flush().await?;
        self.read_ack().await?;

        let mut file = File::open(local).await?;
        let mut buf = [0u8; SCP_CHUNK];
        let mut uploaded: u64 = 0;
        loop {
            if control.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            self.stream.write_all(&buf[..n]).await?;
            uploaded += n as u64;
            if file_size > 0 {
                progress.set_fraction(uploaded as f64 / file_size as f64);
            }
        }

        // Content terminator
        self.stream.write_all(&[0]).await?;
        self.stream.flush().await?;
        self.read_ack().await?;

        debug!("scp upload of {} complete ({} bytes)", file_name, uploaded);
        progress.set_fraction(1.0);

        let _ = self.stream.shutdown().await;
        Ok(())
    }

    /// Read the server acknowledgement for the previous client write.
    async fn read_ack(&mut self) -> Result<(), SyncError> {
        let mut byte = [0u8; 1];
        let n = self.stream.read(&mut byte).await?;
        if n == 0 {
            return Err(SyncError::ChannelError(
                "scp channel closed before acknowledgement".to_string(),
            ));
        }
        match byte[0] {
            0 => Ok(()),
            code @ (1 | 2) => {
                let message = self.read_server_message().await?;
                Err(SyncError::Ack {
                    kind: if code == 1 {
                        AckKind::Error
                    } else {
                        AckKind::Fatal
                    },
                    message,
                })
            }
            other => Err(SyncError::ChannelError(format!(
                "unexpected scp acknowledgement byte {}",
                other
            ))),
        }
    }

    /// Server message following a non-zero acknowledgement, up to `\n`.
    async fn read_server_message(&mut self) -> Result<String, SyncError> {
        let mut message = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = self.stream.read(&mut byte).await?;
            if n == 0 || byte[0] == b'\n' {
                break;
            }
            message.push(byte[0]);
        }
        Ok(String::from_utf8_lossy(&message).trim_end().to_string())
    }
}
