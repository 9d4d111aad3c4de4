//! Credential storage
//!
//! Secrets are kept out of the target configuration and resolved through a
//! [`CredentialStore`] keyed by (protocol, target name, username, host,
//! port). The default store uses the system keychain via the `keyring`
//! crate; [`MemoryStore`] serves tests and headless environments.

use std::collections::HashMap;

use keyring::Entry;
use parking_lot::Mutex;

use crate::config::SyncProtocol;

/// Service name for keychain entries
const SERVICE_NAME: &str = "io.sourcesync.targets";

/// Identifies one stored secret.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialScope {
    pub protocol: SyncProtocol,
    pub target: String,
    pub username: String,
    pub host: String,
    pub port: u16,
}

impl CredentialScope {
    /// Stable account string for the underlying secret store.
    pub fn account(&self) -> String {
        format!(
            "{}://{}@{}:{}/{}",
            self.protocol, self.username, self.host, self.port, self.target
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Read/write access to per-target secrets.
pub trait CredentialStore: Send + Sync {
    /// Look up the secret for a scope. `Ok(None)` means no entry.
    fn get_password(&self, scope: &CredentialScope) -> Result<Option<String>, CredentialError>;

    fn set_password(&self, scope: &CredentialScope, secret: &str) -> Result<(), CredentialError>;

    fn delete_password(&self, scope: &CredentialScope) -> Result<(), CredentialError>;
}

/// System keychain store.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
        }
    }

    /// Create with custom service name (for testing)
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, scope: &CredentialScope) -> Result<Entry, keyring::Error> {
        // Explicit username prefix keeps keychain identity stable on macOS
        let account = format!("{}@{}", whoami::username(), scope.account());
        Entry::new(&self.service, &account)
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringStore {
    fn get_password(&self, scope: &CredentialScope) -> Result<Option<String>, CredentialError> {
        match self.entry(scope)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => {
                tracing::warn!("No stored credential for {}", scope.account());
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn set_password(&self, scope: &CredentialScope, secret: &str) -> Result<(), CredentialError> {
        self.entry(scope)?.set_password(secret)?;
        tracing::info!("Stored credential for {}", scope.account());
        Ok(())
    }

    fn delete_password(&self, scope: &CredentialScope) -> Result<(), CredentialError> {
        match self.entry(scope)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for tests and environments without a keychain.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn get_password(&self, scope: &CredentialScope) -> Result<Option<String>, CredentialError> {
        Ok(self.entries.lock().get(&scope.account()).cloned())
    }

    fn set_password(&self, scope: &CredentialScope, secret: &str) -> Result<(), CredentialError> {
        self.entries
            .lock()
            .insert(scope.account(), secret.to_string());
        Ok(())
    }

    fn delete_password(&self, scope: &CredentialScope) -> Result<(), CredentialError> {
        self.entries.lock().remove(&scope.account());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> CredentialScope {
        CredentialScope {
            protocol: SyncProtocol::Scp,
            target: "staging".to_string(),
            username: "deploy".to_string(),
            host: "example.com".to_string(),
            port: 22,
        }
    }

    #[test]
    fn test_scope_account() {
        assert_eq!(scope().account(), "scp://deploy@example.com:22/staging");
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        let scope = scope();

        assert_eq!(store.get_password(&scope).unwrap(), None);
        store.set_password(&scope, "hunter2").unwrap();
        assert_eq!(
            store.get_password(&scope).unwrap(),
            Some("hunter2".to_string())
        );
        store.delete_password(&scope).unwrap();
        assert_eq!(store.get_password(&scope).unwrap(), None);
    }
}
