//! Remote path mapping
//!
//! Computes the remote destination directory for an upload task: the
//! target's workspace root joined with the directory part of the task's
//! relative path. The joined path adopts the separator style of the
//! workspace root (`/` vs `\`, auto-detected); file names are never
//! altered. Paths that would resolve outside the workspace root are
//! rejected before any network I/O happens.

use crate::error::SyncError;

const UNIX_SEPARATOR: char = '/';
const WIN_SEPARATOR: char = '\\';

/// Compute the remote upload directory for a relative path.
///
/// `remote_relative_path` includes the file name (`sub/dir/a.txt`); only
/// its directory part is joined onto `workspace_root`.
pub fn map_remote_dir(
    workspace_root: &str,
    remote_relative_path: &str,
) -> Result<String, SyncError> {
    if is_absolute(remote_relative_path) {
        return Err(SyncError::InvalidPath(format!(
            "upload path {} must be relative to the workspace root",
            remote_relative_path
        )));
    }

    let components = checked_components(remote_relative_path)?;
    let dir_components = &components[..components.len() - 1];

    let base = workspace_root.trim_end_matches([UNIX_SEPARATOR, WIN_SEPARATOR]);
    let mut joined = if base.is_empty() {
        // Root like "/" trims to nothing; keep it
        workspace_root.to_string()
    } else {
        base.to_string()
    };
    for component in dir_components {
        if !joined.ends_with([UNIX_SEPARATOR, WIN_SEPARATOR]) {
            joined.push(UNIX_SEPARATOR);
        }
        joined.push_str(component);
    }

    Ok(path_string_like(&joined, workspace_root))
}

/// Directory part of a relative upload path with `/` separators, for the
/// SFTP component walk. Empty string when the file sits in the root.
pub fn relative_dir(remote_relative_path: &str) -> Result<String, SyncError> {
    let components = checked_components(remote_relative_path)?;
    Ok(components[..components.len() - 1].join("/"))
}

/// Normalized path components, rejecting any traversal above the root.
fn checked_components(path: &str) -> Result<Vec<&str>, SyncError> {
    let mut out = Vec::new();
    for component in path.split([UNIX_SEPARATOR, WIN_SEPARATOR]) {
        match component {
            "" | "." => {}
            ".." => {
                if out.pop().is_none() {
                    return Err(SyncError::InvalidPath(format!(
                        "upload path {} escapes the workspace root",
                        path
                    )));
                }
            }
            other => out.push(other),
        }
    }
    if out.is_empty() {
        return Err(SyncError::InvalidPath(format!(
            "upload path {} has no file name",
            path
        )));
    }
    Ok(out)
}

fn is_absolute(path: &str) -> bool {
    if path.starts_with(UNIX_SEPARATOR) || path.starts_with(WIN_SEPARATOR) {
        return true;
    }
    // Windows drive letter: C:\ or C:/
    let bytes = path.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

/// Rewrite `path` with the separator style of `other`.
///
/// `other` should contain only one kind of separator; if it contains both
/// or neither, `path` is returned unchanged.
pub fn path_string_like(path: &str, other: &str) -> String {
    if is_unix_style(other) {
        path.replace(WIN_SEPARATOR, "/")
    } else if is_windows_style(other) {
        path.replace(UNIX_SEPARATOR, "\\")
    } else {
        path.to_string()
    }
}

fn is_unix_style(path: &str) -> bool {
    path.contains(UNIX_SEPARATOR) && !path.contains(WIN_SEPARATOR)
}

fn is_windows_style(path: &str) -> bool {
    path.contains(WIN_SEPARATOR) && !path.contains(UNIX_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_unix_root() {
        assert_eq!(
            map_remote_dir("/home/deploy", "sub/dir/a.txt").unwrap(),
            "/home/deploy/sub/dir"
        );
        assert_eq!(map_remote_dir("/home/deploy", "a.txt").unwrap(), "/home/deploy");
        assert_eq!(map_remote_dir("/home/deploy/", "sub/a.txt").unwrap(), "/home/deploy/sub");
    }

    #[test]
    fn test_map_windows_root() {
        assert_eq!(
            map_remote_dir("C:\\workspace", "sub/dir/a.txt").unwrap(),
            "C:\\workspace\\sub\\dir"
        );
        assert_eq!(
            map_remote_dir("C:\\workspace", "sub\\a.txt").unwrap(),
            "C:\\workspace\\sub"
        );
    }

    #[test]
    fn test_map_filesystem_root() {
        assert_eq!(map_remote_dir("/", "sub/a.txt").unwrap(), "/sub");
        assert_eq!(map_remote_dir("/", "a.txt").unwrap(), "/");
    }

    #[test]
    fn test_separator_pass_through() {
        // No detectable style in the root: separators stay as produced
        assert_eq!(map_remote_dir("base", "sub\\a.txt").unwrap(), "base/sub");
    }

    #[test]
    fn test_dot_components_are_dropped() {
        assert_eq!(
            map_remote_dir("/home/deploy", "./sub/./a.txt").unwrap(),
            "/home/deploy/sub"
        );
    }

    #[test]
    fn test_inner_parent_components_resolve() {
        assert_eq!(
            map_remote_dir("/home/deploy", "sub/../other/a.txt").unwrap(),
            "/home/deploy/other"
        );
    }

    #[test]
    fn test_traversal_is_rejected() {
        for path in [
            "../etc/passwd",
            "../../etc/passwd",
            "sub/../../etc/passwd",
            "sub/../../../a.txt",
            "..\\..\\windows\\system32\\evil.dll",
        ] {
            let err = map_remote_dir("/home/deploy", path).unwrap_err();
            assert!(matches!(err, SyncError::InvalidPath(_)), "{path} accepted");
        }
    }

    #[test]
    fn test_absolute_relative_path_is_rejected() {
        for path in ["/etc/passwd", "\\evil", "C:\\evil\\a.txt"] {
            let err = map_remote_dir("/home/deploy", path).unwrap_err();
            assert!(matches!(err, SyncError::InvalidPath(_)), "{path} accepted");
        }
    }

    #[test]
    fn test_empty_path_is_rejected() {
        assert!(map_remote_dir("/home/deploy", "").is_err());
        assert!(map_remote_dir("/home/deploy", "./.").is_err());
    }

    #[test]
    fn test_relative_dir() {
        assert_eq!(relative_dir("sub/dir/a.txt").unwrap(), "sub/dir");
        assert_eq!(relative_dir("sub\\dir\\a.txt").unwrap(), "sub/dir");
        assert_eq!(relative_dir("a.txt").unwrap(), "");
        assert!(relative_dir("../a.txt").is_err());
    }

    #[test]
    fn test_path_string_like() {
        assert_eq!(path_string_like("a\\b/c", "/unix/root"), "a/b/c");
        assert_eq!(path_string_like("a\\b/c", "C:\\win"), "a\\b\\c");
        // Both or neither: unchanged
        assert_eq!(path_string_like("a\\b/c", "mixed/and\\both"), "a\\b/c");
        assert_eq!(path_string_like("a\\b/c", "plain"), "a\\b/c");
    }
}
