//! Session-scoped store for decrypted secret material
//!
//! Entries live only in process memory, keyed by account id, and are zeroized
//! when dropped. Nothing here is ever serialized.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use zeroize::Zeroizing;

use super::signature::ZkProof;
use super::types::AccountId;

/// Backend-defined payload that makes an account usable for signing
#[derive(Clone)]
pub enum EphemeralSecret {
    /// Derived or decrypted ed25519 secret key
    SigningKey { key: Zeroizing<[u8; 32]> },
    /// Marks that the device was present and approved this session
    LedgerSession { device_id: String },
    /// Remote signer session token
    BearerToken {
        token: Zeroizing<String>,
        expires_at: DateTime<Utc>,
    },
    ZkSession {
        ephemeral_key: Zeroizing<[u8; 32]>,
        proof: ZkProof,
        expires_at: DateTime<Utc>,
    },
}

impl EphemeralSecret {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            EphemeralSecret::BearerToken { expires_at, .. } | EphemeralSecret::ZkSession { expires_at, .. } => {
                Some(*expires_at)
            }
            _ => None,
        }
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map_or(true, |at| now < at)
    }

    fn kind(&self) -> &'static str {
        match self {
            EphemeralSecret::SigningKey { .. } => "SigningKey",
            EphemeralSecret::LedgerSession { .. } => "LedgerSession",
            EphemeralSecret::BearerToken { .. } => "BearerToken",
            EphemeralSecret::ZkSession { .. } => "ZkSession",
        }
    }
}

/// A secret as cached for one account, stamped with the unlock that
/// installed it. The stamp bounds how long it may be used for signing.
#[derive(Clone, Debug)]
pub struct SessionSecret {
    pub secret: EphemeralSecret,
    pub unlocked_at: DateTime<Utc>,
}

impl SessionSecret {
    pub fn new(secret: EphemeralSecret, unlocked_at: DateTime<Utc>) -> Self {
        Self { secret, unlocked_at }
    }
}

impl std::fmt::Debug for EphemeralSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(self.kind())
            .field("expires_at", &self.expires_at())
            .finish_non_exhaustive()
    }
}

/// Secret store contract. Synchronous: it is an in-memory map and must never
/// suspend a caller.
pub trait SecretStore: Send + Sync {
    fn get(&self, id: &str) -> Option<SessionSecret>;
    /// Store `secret`, returning whatever was there before.
    fn set(&self, id: &str, secret: SessionSecret) -> Option<SessionSecret>;
    fn clear(&self, id: &str);
    /// End of session: drop every entry.
    fn clear_all(&self);
}

#[derive(Default)]
pub struct MemorySecretStore {
    entries: RwLock<HashMap<AccountId, SessionSecret>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// A poisoned lock only means a panic happened mid-access on another thread;
// the map itself is still consistent, so keep serving it.
impl SecretStore for MemorySecretStore {
    fn get(&self, id: &str) -> Option<SessionSecret> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(id).cloned()
    }

    fn set(&self, id: &str, secret: SessionSecret) -> Option<SessionSecret> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(id.to_string(), secret)
    }

    fn clear(&self, id: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(id);
    }

    fn clear_all(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }
}

/// Installs a secret for the duration of an unlock transition.
///
/// Unless `commit` is called, dropping the guard puts back whatever entry
/// existed before, so an unlock that fails or is cancelled mid-flight leaves
/// the store exactly as it found it.
pub(crate) struct SecretGuard {
    store: Arc<dyn SecretStore>,
    id: AccountId,
    previous: Option<SessionSecret>,
    armed: bool,
}

impl SecretGuard {
    pub(crate) fn install(store: Arc<dyn SecretStore>, id: &str, secret: SessionSecret) -> Self {
        let previous = store.set(id, secret);
        Self {
            store,
            id: id.to_string(),
            previous,
            armed: true,
        }
    }

    pub(crate) fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for SecretGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.previous.take() {
            Some(previous) => {
                self.store.set(&self.id, previous);
            }
            None => self.store.clear(&self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signing_key(b: u8) -> EphemeralSecret {
        EphemeralSecret::SigningKey {
            key: Zeroizing::new([b; 32]),
        }
    }

    fn key(b: u8) -> SessionSecret {
        SessionSecret::new(signing_key(b), Utc::now())
    }

    fn key_byte(entry: Option<SessionSecret>) -> Option<u8> {
        match entry.map(|e| e.secret) {
            Some(EphemeralSecret::SigningKey { key }) => Some(key[0]),
            _ => None,
        }
    }

    #[test]
    fn test_set_get_clear() {
        let store = MemorySecretStore::new();
        assert!(store.get("a").is_none());
        store.set("a", key(1));
        assert_eq!(key_byte(store.get("a")), Some(1));
        store.clear("a");
        assert!(store.get("a").is_none());
    }

    #[test]
    fn test_clear_all() {
        let store = MemorySecretStore::new();
        store.set("a", key(1));
        store.set("b", key(2));
        store.clear_all();
        assert!(store.is_empty());
    }

    #[test]
    fn test_guard_restores_previous_on_drop() {
        let store: Arc<dyn SecretStore> = Arc::new(MemorySecretStore::new());
        store.set("a", key(1));
        {
            let _guard = SecretGuard::install(store.clone(), "a", key(2));
            assert_eq!(key_byte(store.get("a")), Some(2));
        }
        assert_eq!(key_byte(store.get("a")), Some(1));
    }

    #[test]
    fn test_guard_clears_when_nothing_was_there() {
        let store: Arc<dyn SecretStore> = Arc::new(MemorySecretStore::new());
        drop(SecretGuard::install(store.clone(), "a", key(2)));
        assert!(store.get("a").is_none());
    }

    #[test]
    fn test_committed_guard_keeps_secret() {
        let store: Arc<dyn SecretStore> = Arc::new(MemorySecretStore::new());
        SecretGuard::install(store.clone(), "a", key(3)).commit();
        assert_eq!(key_byte(store.get("a")), Some(3));
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let token = EphemeralSecret::BearerToken {
            token: Zeroizing::new("t".to_string()),
            expires_at: now + chrono::Duration::minutes(5),
        };
        assert!(token.is_live(now));
        assert!(!token.is_live(now + chrono::Duration::minutes(6)));
        assert!(signing_key(1).is_live(now + chrono::Duration::days(365)));
    }

    #[test]
    fn test_debug_does_not_leak() {
        let rendered = format!("{:?}", signing_key(0xab));
        assert!(rendered.starts_with("SigningKey"));
        assert!(!format!("{:?}", key(0xab)).contains("171"));
        assert!(!rendered.contains("171"));
    }
}
