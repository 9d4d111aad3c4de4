//! SFTP upload driver
//!
//! Materializes the remote upload directory and streams one file through
//! the SFTP subsystem. Remote access goes through the [`RemoteFs`] seam so
//! tests can substitute an in-memory remote; the production implementation
//! is [`SftpChannel`] over `russh_sftp`.
//!
//! The driver tracks its working directory client-side and walks the
//! task's relative directory component by component, creating missing
//! components one `mkdir` at a time. The workspace root itself is never
//! auto-created.

use std::path::Path;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use russh_sftp::client::SftpSession as RusshSftpSession;
use russh_sftp::protocol::{FileAttributes, OpenFlags};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::progress::{ProgressReporter, TransferControl};

/// Chunk size for streaming file content.
const SFTP_CHUNK: usize = 32 * 1024;

/// Attributes of a remote file system entry.
#[derive(Debug, Clone, Default)]
pub struct RemoteAttrs {
    pub is_dir: bool,
    pub size: Option<u64>,
    pub atime: Option<u32>,
    pub mtime: Option<u32>,
}

/// Remote file system operations needed by the SFTP driver.
#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// Stat following symlinks. Missing paths are an `Err`.
    async fn stat(&self, path: &str) -> Result<RemoteAttrs, SyncError>;

    /// Stat without following symlinks.
    async fn lstat(&self, path: &str) -> Result<RemoteAttrs, SyncError>;

    async fn mkdir(&self, path: &str) -> Result<(), SyncError>;

    /// Open a remote file for writing, truncating any existing content.
    async fn open_for_write(
        &self,
        path: &str,
    ) -> Result<Box<dyn AsyncWrite + Send + Unpin>, SyncError>;

    /// Set access and modification time, both in seconds since the epoch.
    async fn set_times(&self, path: &str, atime: u32, mtime: u32) -> Result<(), SyncError>;
}

/// Join remote path components with `/` (SFTP paths are always unix-style).
fn join_remote(base: &str, component: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, component)
    } else {
        format!("{}/{}", base, component)
    }
}

fn components(relative_dir: &str) -> impl Iterator<Item = &str> {
    relative_dir
        .split(['/', '\\'])
        .filter(|c| !c.is_empty() && *c != ".")
}

/// Drives single-file uploads against a [`RemoteFs`].
pub struct SftpUploader<F> {
    fs: F,
    cwd: String,
}

impl<F: RemoteFs> SftpUploader<F> {
    pub fn new(fs: F) -> Self {
        Self {
            fs,
            cwd: String::new(),
        }
    }

    pub fn into_fs(self) -> F {
        self.fs
    }

    /// Upload `local` into `relative_dir` under `workspace_root`.
    ///
    /// The workspace root must already exist as a directory; only the
    /// relative directory below it is created on demand.
    pub async fn upload(
        &mut self,
        local: &Path,
        workspace_root: &str,
        relative_dir: &str,
        preserve_timestamps: bool,
        progress: &ProgressReporter,
        control: &TransferControl,
    ) -> Result<(), SyncError> {
        match self.fs.stat(workspace_root).await {
            Ok(attrs) if attrs.is_dir => {}
            _ => {
                return Err(SyncError::RemoteState(format!(
                    "remote workspace root {} does not exist or is not a directory",
                    workspace_root
                )))
            }
        }
        self.cwd = workspace_root.to_string();

        if !self.dir_exists_under_cwd(relative_dir).await {
            info!(
                "Upload path {} does not exist or is not a directory. Going to create it.",
                relative_dir
            );
            self.make_dirs_under_cwd(relative_dir).await?;
        }
        self.cd_under_cwd(relative_dir).await?;

        self.put_file(local, progress, control).await?;

        if preserve_timestamps {
            self.fixup_timestamps(local).await?;
        }

        Ok(())
    }

    /// Whether `relative_dir` fully exists below the working directory.
    /// The working directory is left unchanged.
    async fn dir_exists_under_cwd(&self, relative_dir: &str) -> bool {
        let mut probe = self.cwd.clone();
        for component in components(relative_dir) {
            let candidate = join_remote(&probe, component);
            match self.fs.stat(&candidate).await {
                Ok(attrs) if attrs.is_dir => probe = candidate,
                _ => return false,
            }
        }
        true
    }

    /// Create the missing components of `relative_dir`, one mkdir each.
    /// The working directory is left unchanged.
    async fn make_dirs_under_cwd(&self, relative_dir: &str) -> Result<(), SyncError> {
        let mut probe = self.cwd.clone();
        for component in components(relative_dir) {
            let candidate = join_remote(&probe, component);
            match self.fs.stat(&candidate).await {
                Ok(attrs) if attrs.is_dir => {}
                _ => {
                    if let Err(e) = self.fs.mkdir(&candidate).await {
                        // A concurrent worker may have won the race
                        match self.fs.stat(&candidate).await {
                            Ok(attrs) if attrs.is_dir => {}
                            _ => {
                                return Err(SyncError::RemoteState(format!(
                                    "upload path {} could not be created: {}",
                                    relative_dir, e
                                )))
                            }
                        }
                    }
                }
            }
            probe = candidate;
        }
        Ok(())
    }

    /// Re-walk `relative_dir` and move the working directory into it.
    async fn cd_under_cwd(&mut self, relative_dir: &str) -> Result<(), SyncError> {
        if !self.dir_exists_under_cwd(relative_dir).await {
            return Err(SyncError::RemoteState(format!(
                "could not change directory to {}",
                relative_dir
            )));
        }
        for component in components(relative_dir) {
            self.cwd = join_remote(&self.cwd, component);
        }
        Ok(())
    }

    async fn put_file(
        &self,
        local: &Path,
        progress: &ProgressReporter,
        control: &TransferControl,
    ) -> Result<(), SyncError> {
        let file_name = local
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                SyncError::InvalidPath(format!("{} has no usable file name", local.display()))
            })?;
        let metadata = tokio::fs::metadata(local).await?;
        let total = metadata.len();

        progress.set_text(format!("Uploading...[{}]", file_name));
        progress.set_indeterminate(false);

        let remote_file = join_remote(&self.cwd, file_name);
        let mut writer = self.fs.open_for_write(&remote_file).await?;

        let mut file = File::open(local).await?;
        let mut buf = vec![0u8; SFTP_CHUNK];
        let mut uploaded: u64 = 0;
        loop {
            if control.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n]).await?;
            uploaded += n as u64;
            if total > 0 {
                progress.set_fraction(uploaded as f64 / total as f64);
            }
        }
        writer.flush().await?;
        writer.shutdown().await?;

        progress.set_fraction(1.0);
        debug!("sftp put of {} complete ({} bytes)", remote_file, uploaded);
        Ok(())
    }

    /// Reapply the local modification time to the uploaded file, keeping
    /// the remote access time.
    ///
    /// The SFTP v3 attribute field is 32-bit seconds; modification times
    /// past the epoch + 2^31 seconds truncate. Known boundary of the
    /// protocol, preserved as-is.
    async fn fixup_timestamps(&self, local: &Path) -> Result<(), SyncError> {
        let file_name = local.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
            SyncError::InvalidPath(format!("{} has no usable file name", local.display()))
        })?;
        let remote_file = join_remote(&self.cwd, file_name);

        let attrs = self.fs.lstat(&remote_file).await?;
        let atime = attrs.atime.unwrap_or(0);

        let mtime_secs = tokio::fs::metadata(local)
            .await?
            .modified()?
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        if mtime_secs > u32::MAX as u64 {
            warn!(
                "mtime of {} does not fit the 32-bit SFTP attribute field, truncating",
                local.display()
            );
        }

        self.fs
            .set_times(&remote_file, atime, mtime_secs as u32)
            .await
    }
}

/// Production [`RemoteFs`] over a russh SFTP subsystem channel.
///
/// Channel lifetime is one file transfer; the owning SSH session stays
/// open for reuse.
pub struct SftpChannel {
    sftp: RusshSftpSession,
}

impl SftpChannel {
    pub fn new(sftp: RusshSftpSession) -> Self {
        Self { sftp }
    }

    /// Close the SFTP channel (channel-level only).
    pub async fn close(self) {
        let _ = self.sftp.close().await;
    }
}

fn to_remote_attrs(attrs: FileAttributes) -> RemoteAttrs {
    RemoteAttrs {
        is_dir: attrs.is_dir(),
        size: attrs.size,
        atime: attrs.atime,
        mtime: attrs.mtime,
    }
}

#[async_trait]
impl RemoteFs for SftpChannel {
    async fn stat(&self, path: &str) -> Result<RemoteAttrs, SyncError> {
        let attrs = self
            .sftp
            .metadata(path)
            .await
            .map_err(|e| SyncError::RemoteState(format!("stat {} failed: {}", path, e)))?;
        Ok(to_remote_attrs(attrs))
    }

    async fn lstat(&self, path: &str) -> Result<RemoteAttrs, SyncError> {
        let attrs = self
            .sftp
            .symlink_metadata(path)
            .await
            .map_err(|e| SyncError::RemoteState(format!("lstat {} failed: {}", path, e)))?;
        Ok(to_remote_attrs(attrs))
    }

    async fn mkdir(&self, path: &str) -> Result<(), SyncError> {
        self.sftp
            .create_dir(path)
            .await
            .map_err(|e| SyncError::RemoteState(format!("mkdir {} failed: {}", path, e)))
    }

    async fn open_for_write(
        &self,
        path: &str,
    ) -> Result<Box<dyn AsyncWrite + Send + Unpin>, SyncError> {
        let file = self
            .sftp
            .open_with_flags(
                path,
                OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
            )
            .await
            .map_err(|e| SyncError::RemoteState(format!("open {} failed: {}", path, e)))?;
        Ok(Box::new(file))
    }

    async fn set_times(&self, path: &str, atime: u32, mtime: u32) -> Result<(), SyncError> {
        let attrs = FileAttributes {
            atime: Some(atime),
            mtime: Some(mtime),
            ..Default::default()
        };
        self.sftp
            .set_metadata(path, attrs)
            .await
            .map_err(|e| SyncError::RemoteState(format!("set times on {} failed: {}", path, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::io::Write as _;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};

    use parking_lot::Mutex;

    #[derive(Default)]
    struct MockState {
        dirs: HashSet<String>,
        files: HashMap<String, Vec<u8>>,
        times: HashMap<String, (u32, u32)>,
        mkdir_calls: Vec<String>,
    }

    #[derive(Clone, Default)]
    struct MockRemote {
        state: Arc<Mutex<MockState>>,
    }

    impl MockRemote {
        fn with_dirs(dirs: &[&str]) -> Self {
            let remote = Self::default();
            {
                let mut state = remote.state.lock();
                for dir in dirs {
                    state.dirs.insert(dir.to_string());
                }
            }
            remote
        }
    }

    struct MockWriter {
        path: String,
        buf: Vec<u8>,
        state: Arc<Mutex<MockState>>,
    }

    impl AsyncWrite for MockWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            self.get_mut().buf.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            let this = self.get_mut();
            let content = std::mem::take(&mut this.buf);
            this.state.lock().files.insert(this.path.clone(), content);
            Poll::Ready(Ok(()))
        }
    }

    #[async_trait]
    impl RemoteFs for MockRemote {
        async fn stat(&self, path: &str) -> Result<RemoteAttrs, SyncError> {
            let state = self.state.lock();
            if state.dirs.contains(path) {
                Ok(RemoteAttrs {
                    is_dir: true,
                    ..Default::default()
                })
            } else if let Some(content) = state.files.get(path) {
                let times = state.times.get(path).copied();
                Ok(RemoteAttrs {
                    is_dir: false,
                    size: Some(content.len() as u64),
                    atime: times.map(|t| t.0).or(Some(1_000)),
                    mtime: times.map(|t| t.1),
                })
            } else {
                Err(SyncError::RemoteState(format!("no such file: {}", path)))
            }
        }

        async fn lstat(&self, path: &str) -> Result<RemoteAttrs, SyncError> {
            self.stat(path).await
        }

        async fn mkdir(&self, path: &str) -> Result<(), SyncError> {
            let mut state = self.state.lock();
            state.mkdir_calls.push(path.to_string());
            if path.contains("forbidden") {
                return Err(SyncError::RemoteState(format!("permission denied: {}", path)));
            }
            state.dirs.insert(path.to_string());
            Ok(())
        }

        async fn open_for_write(
            &self,
            path: &str,
        ) -> Result<Box<dyn AsyncWrite + Send + Unpin>, SyncError> {
            Ok(Box::new(MockWriter {
                path: path.to_string(),
                buf: Vec::new(),
                state: self.state.clone(),
            }))
        }

        async fn set_times(&self, path: &str, atime: u32, mtime: u32) -> Result<(), SyncError> {
            self.state
                .lock()
                .times
                .insert(path.to_string(), (atime, mtime));
            Ok(())
        }
    }

    fn temp_file(content: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    async fn upload(
        remote: &MockRemote,
        local: &Path,
        root: &str,
        relative_dir: &str,
        preserve: bool,
    ) -> Result<(), SyncError> {
        SftpUploader::new(remote.clone())
            .upload(
                local,
                root,
                relative_dir,
                preserve,
                &ProgressReporter::disabled(),
                &TransferControl::new(),
            )
            .await
    }

    #[tokio::test]
    async fn test_missing_root_fails_without_mkdir() {
        let remote = MockRemote::default();
        let local = temp_file(b"data");

        let err = upload(&remote, local.path(), "/home/u", "sub", false)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::RemoteState(_)));
        assert!(remote.state.lock().mkdir_calls.is_empty());
    }

    #[tokio::test]
    async fn test_missing_subdirs_created_component_by_component() {
        let remote = MockRemote::with_dirs(&["/home/u"]);
        let content = b"nested upload";
        let local = temp_file(content);
        let name = local.path().file_name().unwrap().to_str().unwrap().to_string();

        upload(&remote, local.path(), "/home/u", "a/b/c", false)
            .await
            .unwrap();

        let state = remote.state.lock();
        assert_eq!(
            state.mkdir_calls,
            vec!["/home/u/a", "/home/u/a/b", "/home/u/a/b/c"]
        );
        assert_eq!(
            state.files.get(&format!("/home/u/a/b/c/{}", name)).unwrap(),
            content
        );
    }

    #[tokio::test]
    async fn test_existing_subdir_is_not_recreated() {
        let remote = MockRemote::with_dirs(&["/home/u", "/home/u/sub"]);
        let local = temp_file(b"data");

        upload(&remote, local.path(), "/home/u", "sub", false)
            .await
            .unwrap();
        assert!(remote.state.lock().mkdir_calls.is_empty());
    }

    #[tokio::test]
    async fn test_mkdir_failure_is_remote_state_error() {
        let remote = MockRemote::with_dirs(&["/home/u"]);
        let local = temp_file(b"data");

        let err = upload(&remote, local.path(), "/home/u", "forbidden/sub", false)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::RemoteState(_)));
        assert!(remote.state.lock().files.is_empty());
    }

    #[tokio::test]
    async fn test_upload_into_root_overwrites() {
        let remote = MockRemote::with_dirs(&["/home/u"]);
        let local = temp_file(b"fresh content");
        let name = local.path().file_name().unwrap().to_str().unwrap().to_string();
        remote
            .state
            .lock()
            .files
            .insert(format!("/home/u/{}", name), b"stale".to_vec());

        upload(&remote, local.path(), "/home/u", "", false)
            .await
            .unwrap();
        assert_eq!(
            remote.state.lock().files.get(&format!("/home/u/{}", name)).unwrap(),
            b"fresh content"
        );
    }

    #[tokio::test]
    async fn test_preserve_timestamps_keeps_remote_atime() {
        let remote = MockRemote::with_dirs(&["/home/u"]);
        let local = temp_file(b"stamped");
        let name = local.path().file_name().unwrap().to_str().unwrap().to_string();

        upload(&remote, local.path(), "/home/u", "", true)
            .await
            .unwrap();

        let local_mtime = std::fs::metadata(local.path())
            .unwrap()
            .modified()
            .unwrap()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as u32;

        let state = remote.state.lock();
        let (atime, mtime) = state.times.get(&format!("/home/u/{}", name)).unwrap();
        assert_eq!(*atime, 1_000, "remote atime not kept");
        assert_eq!(*mtime, local_mtime);
    }

    #[tokio::test]
    async fn test_end_to_end_two_files_one_mkdir() {
        // target{workspace_root="/home/u"}, tasks into missing sub/
        let remote = MockRemote::with_dirs(&["/home/u"]);
        let a = temp_file(b"contents of a");
        let b = temp_file(b"contents of b");

        upload(&remote, a.path(), "/home/u", "sub", false)
            .await
            .unwrap();
        upload(&remote, b.path(), "/home/u", "sub", false)
            .await
            .unwrap();

        let state = remote.state.lock();
        assert_eq!(state.mkdir_calls, vec!["/home/u/sub"]);
        assert_eq!(state.files.len(), 2);
    }

    #[tokio::test]
    async fn test_cancellation_skips_remaining_content() {
        let remote = MockRemote::with_dirs(&["/home/u"]);
        let local = temp_file(b"data");
        let control = TransferControl::new();
        control.cancel();

        let err = SftpUploader::new(remote.clone())
            .upload(
                local.path(),
                "/home/u",
                "",
                false,
                &ProgressReporter::disabled(),
                &control,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Cancelled));
        assert!(remote.state.lock().files.is_empty());
    }
}
