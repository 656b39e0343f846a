use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, warn};

use super::obfuscation::{obfuscate, reveal};
use super::session::SessionDescriptor;
use crate::storage::KeyValueStore;

/// Storage key for the obfuscated session descriptor
pub const SESSION_KEY: &str = "auth_session";

/// Storage key for the obfuscated refresh token
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Holds the session's credentials.
///
/// The access token lives only in this struct's memory and is therefore
/// gone after a restart. The refresh token and the session descriptor are
/// written to durable storage through storage obfuscation. This type is the
/// only writer of those two storage keys.
pub struct TokenStore {
    storage: Arc<dyn KeyValueStore>,
    // Guards the access token and every storage access, so clearing the
    // session is observed all at once.
    access_token: Mutex<Option<String>>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            storage,
            access_token: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<String>> {
        // A poisoned lock only means a panic elsewhere; the token itself is
        // still a plain value.
        self.access_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ===== Access token (memory only) =====

    pub fn set_access_token(&self, token: impl Into<String>) {
        *self.lock() = Some(token.into());
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock().clone()
    }

    // ===== Refresh token (durable) =====

    pub fn set_refresh_token(&self, token: &str) -> Result<()> {
        let _guard = self.lock();
        self.storage.set(REFRESH_TOKEN_KEY, obfuscate(token))
    }

    /// Stored refresh token, or `None` when absent or unreadable. An
    /// unreadable slot is wiped together with the rest of the session.
    pub fn refresh_token(&self) -> Option<String> {
        let mut guard = self.lock();
        let stored = match self.storage.get(REFRESH_TOKEN_KEY) {
            Ok(Some(stored)) => stored,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read refresh token, clearing session");
                self.clear_locked(&mut guard);
                return None;
            }
        };

        let token = reveal(&stored);
        if !is_plausible_token(&token) {
            warn!("Stored refresh token is corrupt, clearing session");
            self.clear_locked(&mut guard);
            return None;
        }
        Some(token)
    }

    // ===== Session descriptor (durable) =====

    pub fn set_session_state(&self, descriptor: &SessionDescriptor) -> Result<()> {
        let json = serde_json::to_string(descriptor)?;
        let _guard = self.lock();
        self.storage.set(SESSION_KEY, obfuscate(&json))
    }

    /// Stored descriptor if present and unexpired. An expired or corrupt
    /// descriptor clears the session as a side effect.
    pub fn session_state(&self) -> Option<SessionDescriptor> {
        self.session_state_at(Utc::now().timestamp_millis())
    }

    pub fn session_state_at(&self, now_ms: i64) -> Option<SessionDescriptor> {
        let mut guard = self.lock();
        let stored = match self.storage.get(SESSION_KEY) {
            Ok(Some(stored)) => stored,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read session descriptor, clearing session");
                self.clear_locked(&mut guard);
                return None;
            }
        };

        let descriptor: SessionDescriptor = match serde_json::from_str(&reveal(&stored)) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(error = %e, "Stored session descriptor is corrupt, clearing session");
                self.clear_locked(&mut guard);
                return None;
            }
        };

        if descriptor.is_expired_at(now_ms) {
            debug!(expires_at = descriptor.expires_at, "Session descriptor expired, clearing session");
            self.clear_locked(&mut guard);
            return None;
        }
        Some(descriptor)
    }

    // ===== Whole session =====

    /// Persist refresh token and descriptor as one unit.
    pub fn persist_session(&self, refresh_token: &str, descriptor: &SessionDescriptor) -> Result<()> {
        let json = serde_json::to_string(descriptor)?;
        let _guard = self.lock();
        self.storage.set_many(&[
            (REFRESH_TOKEN_KEY, obfuscate(refresh_token)),
            (SESSION_KEY, obfuscate(&json)),
        ])
    }

    /// True when an unexpired descriptor and a refresh token are both stored.
    pub fn has_active_session(&self) -> bool {
        self.session_state().is_some() && self.refresh_token().is_some()
    }

    /// Remove refresh token, descriptor and access token together.
    pub fn clear_session(&self) {
        let mut guard = self.lock();
        self.clear_locked(&mut guard);
    }

    fn clear_locked(&self, access_token: &mut Option<String>) {
        *access_token = None;
        if let Err(e) = self.storage.remove_many(&[SESSION_KEY, REFRESH_TOKEN_KEY]) {
            // Storage refusing removal leaves stale records behind; they will
            // fail the refresh exchange and be cleared again then.
            warn!(error = %e, "Failed to remove session from storage");
        }
    }
}

/// Bearer tokens are printable ASCII. Anything else came out of a corrupt
/// slot or a different obfuscation key.
fn is_plausible_token(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_graphic())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStore, MemoryStore};

    fn descriptor(expires_at: i64) -> SessionDescriptor {
        SessionDescriptor {
            user_id: "1".to_string(),
            username: "admin".to_string(),
            role: "admin".to_string(),
            expires_at,
        }
    }

    fn store() -> (Arc<MemoryStore>, TokenStore) {
        let storage = Arc::new(MemoryStore::new());
        let tokens = TokenStore::new(storage.clone());
        (storage, tokens)
    }

    fn future_ms() -> i64 {
        Utc::now().timestamp_millis() + 60_000
    }

    #[test]
    fn test_access_token_is_memory_only() {
        let (storage, tokens) = store();
        tokens.set_access_token("access-1");
        tokens.set_access_token("access-2");
        assert_eq!(tokens.access_token().as_deref(), Some("access-2"));
        assert!(storage.is_empty());

        // A new store over the same storage models a restart
        let restarted = TokenStore::new(storage);
        assert!(restarted.access_token().is_none());
    }

    #[test]
    fn test_refresh_token_is_stored_obfuscated() {
        let (storage, tokens) = store();
        tokens.set_refresh_token("refresh-abc").unwrap();

        let raw = storage.get(REFRESH_TOKEN_KEY).unwrap().unwrap();
        assert_ne!(raw, "refresh-abc");
        assert_eq!(tokens.refresh_token().as_deref(), Some("refresh-abc"));
    }

    #[test]
    fn test_session_state_round_trip() {
        let (storage, tokens) = store();
        let d = descriptor(future_ms());
        tokens.set_session_state(&d).unwrap();

        let raw = storage.get(SESSION_KEY).unwrap().unwrap();
        assert!(!raw.contains("admin"));
        assert_eq!(tokens.session_state(), Some(d));
    }

    #[test]
    fn test_expired_session_state_is_removed() {
        let (storage, tokens) = store();
        tokens.persist_session("refresh-abc", &descriptor(1_000)).unwrap();

        assert!(tokens.session_state_at(2_000).is_none());
        assert!(storage.get(SESSION_KEY).unwrap().is_none());
        assert!(storage.get(REFRESH_TOKEN_KEY).unwrap().is_none());
    }

    #[test]
    fn test_clear_session_removes_everything() {
        let (storage, tokens) = store();
        tokens.set_access_token("access-1");
        tokens.persist_session("refresh-abc", &descriptor(future_ms())).unwrap();
        assert!(tokens.has_active_session());

        tokens.clear_session();
        assert!(tokens.access_token().is_none());
        assert!(tokens.refresh_token().is_none());
        assert!(tokens.session_state().is_none());
        assert!(!tokens.has_active_session());
        assert!(storage.is_empty());
    }

    #[test]
    fn test_corrupt_descriptor_is_wiped() {
        let (storage, tokens) = store();
        tokens.set_refresh_token("refresh-abc").unwrap();
        storage.set(SESSION_KEY, obfuscate("{not json")).unwrap();

        assert!(tokens.session_state().is_none());
        assert!(storage.is_empty());
    }

    #[test]
    fn test_refresh_token_from_other_key_is_wiped() {
        let (storage, tokens) = store();
        let foreign = super::super::obfuscation::obfuscate_with_key("refresh-abc", "another-key");
        storage.set(REFRESH_TOKEN_KEY, foreign).unwrap();
        tokens.set_session_state(&descriptor(future_ms())).unwrap();

        assert!(tokens.refresh_token().is_none());
        assert!(storage.is_empty());
    }

    #[test]
    fn test_unreadable_storage_file_reads_as_absence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "garbage").unwrap();

        let tokens = TokenStore::new(Arc::new(FileStore::new(&path)));
        assert!(tokens.session_state().is_none());
        assert!(tokens.refresh_token().is_none());

        // The wipe rewrote the file into a readable, empty map
        let contents = std::fs::read_to_string(&path).unwrap();
        let map: std::collections::BTreeMap<String, String> = serde_json::from_str(&contents).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_session_survives_restart_through_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        let d = descriptor(future_ms());

        let tokens = TokenStore::new(Arc::new(FileStore::new(&path)));
        tokens.set_access_token("access-1");
        tokens.persist_session("refresh-abc", &d).unwrap();

        let restarted = TokenStore::new(Arc::new(FileStore::new(&path)));
        assert!(restarted.access_token().is_none());
        assert_eq!(restarted.refresh_token().as_deref(), Some("refresh-abc"));
        assert_eq!(restarted.session_state(), Some(d));
    }
}
