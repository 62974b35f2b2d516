//! User credential storage for the login and register forms.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use log::{debug, info};

use crate::server::error::Error;

/// Result of checking a login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Success,
    BadCredentials,
    UsernameTaken,
    StorageError,
}

/// Result of creating an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Success,
    UsernameTaken,
    StorageError,
}

/// Backing store for user accounts.
///
/// Implementations are shared between worker threads and must make
/// `register` atomic: two concurrent registrations of one name may not both
/// succeed.
pub trait CredentialStore: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> VerifyOutcome;
    fn register(&self, username: &str, password: &str) -> RegisterOutcome;
}

/// In-memory store guarded by a single mutex.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    users: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users<I, K, V>(users: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let users = users.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self { users: Mutex::new(users) }
    }

    /// Loads accounts from a JSON object of username to password.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let json = fs::read_to_string(path.as_ref())?;
        let users: HashMap<String, String> = serde_json::from_str(&json)?;
        info!("loaded {} users from {}", users.len(), path.as_ref().display());
        Ok(Self { users: Mutex::new(users) })
    }

    pub fn len(&self) -> usize {
        self.users.lock().map(|users| users.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn verify(&self, username: &str, password: &str) -> VerifyOutcome {
        if username.is_empty() || password.is_empty() {
            return VerifyOutcome::BadCredentials;
        }
        let Ok(users) = self.users.lock() else {
            return VerifyOutcome::StorageError;
        };
        match users.get(username) {
            Some(stored) if stored == password => VerifyOutcome::Success,
            Some(_) => {
                debug!("wrong password for {username}");
                VerifyOutcome::BadCredentials
            }
            None => {
                debug!("unknown user {username}");
                VerifyOutcome::BadCredentials
            }
        }
    }

    fn register(&self, username: &str, password: &str) -> RegisterOutcome {
        let Ok(mut users) = self.users.lock() else {
            return RegisterOutcome::StorageError;
        };
        if users.contains_key(username) {
            debug!("username {username} already taken");
            return RegisterOutcome::UsernameTaken;
        }
        users.insert(username.to_string(), password.to_string());
        debug!("registered {username}");
        RegisterOutcome::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_verify() {
        let store = MemoryCredentialStore::with_users([("alice", "p@ss")]);
        assert_eq!(store.verify("alice", "p@ss"), VerifyOutcome::Success);
        assert_eq!(store.verify("alice", "nope"), VerifyOutcome::BadCredentials);
        assert_eq!(store.verify("bob", "p@ss"), VerifyOutcome::BadCredentials);
        assert_eq!(store.verify("", ""), VerifyOutcome::BadCredentials);
    }

    #[test]
    fn test_register_then_verify() {
        let store = MemoryCredentialStore::new();
        assert_eq!(store.register("carol", "secret"), RegisterOutcome::Success);
        assert_eq!(store.register("carol", "other"), RegisterOutcome::UsernameTaken);
        assert_eq!(store.verify("carol", "secret"), VerifyOutcome::Success);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_concurrent_registration_has_one_winner() {
        let store = Arc::new(MemoryCredentialStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.register("dave", &format!("pw{i}")))
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|outcome| *outcome == RegisterOutcome::Success)
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn test_load_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, r#"{"alice": "one", "bob": "two"}"#).unwrap();

        let store = MemoryCredentialStore::from_json_file(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.verify("bob", "two"), VerifyOutcome::Success);
    }
}
