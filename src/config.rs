//! Remote target configuration
//!
//! A [`RemoteTarget`] describes one sync destination: protocol, endpoint,
//! authentication and upload policy. Targets are immutable for the duration
//! of an upload batch; persistence of the surrounding configuration tree is
//! the caller's concern.

use serde::{Deserialize, Serialize};

/// Wire protocol used to push files to the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncProtocol {
    /// Classic scp over an exec channel.
    Scp,
    /// SFTP subsystem.
    Sftp,
}

impl std::fmt::Display for SyncProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncProtocol::Scp => write!(f, "scp"),
            SyncProtocol::Sftp => write!(f, "sftp"),
        }
    }
}

/// Authentication methods supported
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthMethod {
    /// Password authentication
    Password { password: String },

    /// SSH key-pair authentication
    Key {
        /// Path to private key file
        key_path: String,
        /// Optional passphrase for encrypted keys
        passphrase: Option<String>,
    },
}

impl AuthMethod {
    pub fn password(password: impl Into<String>) -> Self {
        Self::Password {
            password: password.into(),
        }
    }

    pub fn key(key_path: impl Into<String>, passphrase: Option<String>) -> Self {
        Self::Key {
            key_path: key_path.into(),
            passphrase,
        }
    }
}

/// One sync destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteTarget {
    /// Display name, also the key in the running-sync registry
    pub name: String,

    /// Upload protocol
    pub protocol: SyncProtocol,

    /// Remote host address
    pub host: String,

    /// SSH port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for authentication
    pub username: String,

    /// Authentication method
    pub auth: AuthMethod,

    /// Remote base directory every upload lands under
    pub workspace_root: String,

    /// Excluded file patterns, separated by `;`, `,` or spaces.
    /// Plain entries match as filename suffix/substring (e.g. `.iml`),
    /// entries with wildcards match as globs (e.g. `*.tmp`).
    #[serde(default)]
    pub excluded_files: String,

    /// Reapply the local modification time on the uploaded file
    #[serde(default)]
    pub preserve_timestamps: bool,

    /// Upper bound on simultaneous transfers for this target
    #[serde(default = "default_concurrency")]
    pub max_concurrency: usize,

    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl RemoteTarget {
    /// Whether a file name matches the exclusion list.
    ///
    /// Matching is against the file name only, never the full path.
    pub fn is_excluded(&self, file_name: &str) -> bool {
        self.excluded_patterns()
            .any(|pattern| pattern_matches(pattern, file_name))
    }

    fn excluded_patterns(&self) -> impl Iterator<Item = &str> {
        self.excluded_files
            .split([';', ',', ' '])
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

fn pattern_matches(pattern: &str, file_name: &str) -> bool {
    if pattern.contains(['*', '?', '[']) {
        glob::Pattern::new(pattern)
            .map(|p| p.matches(file_name))
            .unwrap_or(false)
    } else {
        file_name.contains(pattern)
    }
}

fn default_port() -> u16 {
    22
}

fn default_concurrency() -> usize {
    2
}

fn default_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target_with_exclusions(excluded: &str) -> RemoteTarget {
        RemoteTarget {
            name: "staging".to_string(),
            protocol: SyncProtocol::Sftp,
            host: "example.com".to_string(),
            port: 22,
            username: "deploy".to_string(),
            auth: AuthMethod::password("secret"),
            workspace_root: "/home/deploy".to_string(),
            excluded_files: excluded.to_string(),
            preserve_timestamps: false,
            max_concurrency: 2,
            timeout_secs: 30,
        }
    }

    #[test]
    fn test_suffix_exclusion() {
        let target = target_with_exclusions(".iml;.crt");
        assert!(target.is_excluded("project.iml"));
        assert!(target.is_excluded("server.crt"));
        assert!(!target.is_excluded("main.rs"));
    }

    #[test]
    fn test_substring_exclusion() {
        let target = target_with_exclusions("generated");
        assert!(target.is_excluded("generated_bindings.rs"));
        assert!(!target.is_excluded("main.rs"));
    }

    #[test]
    fn test_glob_exclusion() {
        let target = target_with_exclusions("*.tmp;build-?.log");
        assert!(target.is_excluded("scratch.tmp"));
        assert!(target.is_excluded("build-3.log"));
        assert!(!target.is_excluded("build-12.log"));
        assert!(!target.is_excluded("notes.txt"));
    }

    #[test]
    fn test_mixed_separators_and_whitespace() {
        let target = target_with_exclusions(" .iml, .etc  ;.crt ");
        assert!(target.is_excluded("module.iml"));
        assert!(target.is_excluded("hosts.etc"));
        assert!(target.is_excluded("ca.crt"));
    }

    #[test]
    fn test_empty_exclusion_list() {
        let target = target_with_exclusions("");
        assert!(!target.is_excluded("anything.iml"));
    }
}
