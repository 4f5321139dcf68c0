//! Backend-independent account plumbing shared by every variant

use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use tokio::sync::{oneshot, OnceCell};
use tracing::{debug, info, warn};

use super::auth::Kdf;
use super::backends::{LedgerTransport, QredoService, ZkProver};
use super::events::{AccountEvent, EventBus};
use super::secrets::{EphemeralSecret, SecretGuard, SecretStore, SessionSecret};
use super::signature::SignatureBundle;
use super::store::AccountRecordStore;
use super::types::{AccountId, AccountRecord, AccountUpdate, DisplayRecord};
use crate::clock::Clock;
use crate::config::LockPolicy;
use crate::crypto::KeyPair;
use crate::error::{KeyringError, Result};

/// Everything an account needs from its surroundings. Owned by the manager
/// and cloned into each account instance.
#[derive(Clone)]
pub struct AccountContext {
    pub records: Arc<dyn AccountRecordStore>,
    pub secrets: Arc<dyn SecretStore>,
    pub events: EventBus,
    pub clock: Arc<dyn Clock>,
    pub policy: LockPolicy,
    pub kdf: Kdf,
    pub ledger: Option<Arc<dyn LedgerTransport>>,
    pub qredo: Option<Arc<dyn QredoService>>,
    pub zk_prover: Option<Arc<dyn ZkProver>>,
}

impl AccountContext {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Whether an unlock at `last` still permits signing.
    pub fn allows_write(&self, last: Option<DateTime<Utc>>) -> bool {
        self.within(last, self.policy.auto_lock()) && self.allows_read(last)
    }

    /// Whether an unlock at `last` still permits showing the public key.
    pub fn allows_read(&self, last: Option<DateTime<Utc>>) -> bool {
        self.within(last, self.policy.read_grace())
    }

    /// Whether a cached entry may still be used for signing: not expired and
    /// installed within the auto-lock window.
    pub fn usable(&self, entry: &SessionSecret) -> bool {
        entry.secret.is_live(self.now()) && self.allows_write(Some(entry.unlocked_at))
    }

    /// Drop the cached secret for `id` if policy no longer allows it to be
    /// used. Returns whether anything was released.
    pub fn release_if_stale(&self, id: &str) -> bool {
        match self.secrets.get(id) {
            Some(entry) if !self.usable(&entry) => {
                self.secrets.clear(id);
                debug!(account = %id, "released stale session secret");
                true
            }
            _ => false,
        }
    }

    fn within(&self, last: Option<DateTime<Utc>>, window: Option<chrono::Duration>) -> bool {
        let Some(at) = last else {
            return false;
        };
        match window {
            Some(window) => self.now().signed_duration_since(at) < window,
            None => true,
        }
    }
}

/// Fetch-once cell over the record store. Concurrent first readers share a
/// single fetch; afterwards reads never touch the store.
#[derive(Default)]
pub struct MetadataCache {
    cell: OnceCell<RwLock<AccountRecord>>,
}

impl MetadataCache {
    pub fn seeded(record: AccountRecord) -> Self {
        Self {
            cell: OnceCell::new_with(Some(RwLock::new(record))),
        }
    }

    async fn load(&self, store: &dyn AccountRecordStore, id: &str) -> Result<AccountRecord> {
        let lock = self
            .cell
            .get_or_try_init(|| async {
                let record = store.get(id).await?;
                record.validate()?;
                Ok::<_, KeyringError>(RwLock::new(record))
            })
            .await?;
        Ok(read(lock))
    }

    fn apply(&self, update: &AccountUpdate) {
        if let Some(lock) = self.cell.get() {
            let mut record = lock.write().unwrap_or_else(|e| e.into_inner());
            update.apply(&mut record);
        }
    }
}

fn read(lock: &RwLock<AccountRecord>) -> AccountRecord {
    lock.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// Per-instance state and the shared lock/unlock/sign helpers
pub struct AccountCore {
    id: AccountId,
    pub(crate) ctx: AccountContext,
    cache: MetadataCache,
}

impl AccountCore {
    pub fn new(id: AccountId, ctx: AccountContext) -> Self {
        Self {
            id,
            ctx,
            cache: MetadataCache::default(),
        }
    }

    pub fn with_record(record: AccountRecord, ctx: AccountContext) -> Self {
        Self {
            id: record.id.clone(),
            ctx,
            cache: MetadataCache::seeded(record),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Memoized metadata. Only the first call may suspend on the store.
    pub async fn metadata(&self) -> Result<AccountRecord> {
        self.cache.load(self.ctx.records.as_ref(), &self.id).await
    }

    /// Current persisted record, bypassing the memo.
    pub async fn fresh_record(&self) -> Result<AccountRecord> {
        let record = self.ctx.records.get(&self.id).await?;
        record.validate()?;
        Ok(record)
    }

    /// Secret Store entry if present and still usable under the lock policy.
    pub fn live_secret(&self) -> Option<EphemeralSecret> {
        self.ctx
            .secrets
            .get(&self.id)
            .filter(|entry| self.ctx.usable(entry))
            .map(|entry| entry.secret)
    }

    pub fn release_stale(&self) -> bool {
        self.ctx.release_if_stale(&self.id)
    }

    /// Write-lock check against the persisted timestamp and the live secret.
    /// `backend_live` carries the variant's own liveness check.
    pub async fn is_locked(&self, backend_live: bool) -> Result<bool> {
        let record = self.fresh_record().await?;
        Ok(!self.unlocked_given(&record, backend_live))
    }

    fn unlocked_given(&self, record: &AccountRecord, backend_live: bool) -> bool {
        backend_live && self.live_secret().is_some() && self.ctx.allows_write(record.last_unlocked_on)
    }

    /// No-I/O signing readiness, judged from the cached secret and the
    /// unlock time stamped on it.
    pub fn signing_ready(&self, backend_live: bool) -> bool {
        backend_live && self.live_secret().is_some()
    }

    /// Gate for signing. A secret that policy no longer allows is released
    /// here rather than left in memory.
    pub async fn ensure_unlocked(&self, backend_live: bool) -> Result<()> {
        self.release_stale();
        if self.is_locked(backend_live).await? {
            return Err(KeyringError::Locked(self.id.clone()));
        }
        Ok(())
    }

    /// Post-unlock hook: install the secret, persist `last_unlocked_on = now`
    /// (plus `extra` fields), then emit.
    ///
    /// The install and persist run on their own task so that dropping this
    /// future cannot stop them halfway. If the caller is gone before the
    /// result is handed back, the task restores the previous secret and
    /// timestamp instead. Either way nothing is emitted unless this returns
    /// `Ok`.
    pub async fn commit_unlock(&self, secret: EphemeralSecret, extra: AccountUpdate) -> Result<()> {
        let now = self.ctx.now();
        let update = AccountUpdate {
            last_unlocked_on: Some(Some(now)),
            ..extra
        };
        let (done_tx, done_rx) = oneshot::channel();
        let (ack_tx, ack_rx) = oneshot::channel();
        tokio::spawn(persist_unlock(
            self.ctx.clone(),
            self.id.clone(),
            SessionSecret::new(secret, now),
            update.clone(),
            done_tx,
            ack_rx,
        ));

        done_rx
            .await
            .map_err(|_| KeyringError::Storage(format!("unlock of {} was interrupted", self.id)))??;
        // No await from here on: once acknowledged, the unlock stands.
        let _ = ack_tx.send(());
        self.cache.apply(&update);
        info!(account = %self.id, "account unlocked");
        self.ctx.events.emit(AccountEvent::status_changed(&self.id));
        Ok(())
    }

    /// Post-lock hook. Signing is always revoked; with `allow_read` the
    /// unlock timestamp is kept so the public key stays displayable until the
    /// read grace period runs out.
    pub async fn commit_lock(&self, allow_read: bool) -> Result<()> {
        self.ctx.secrets.clear(&self.id);
        if !allow_read {
            let update = AccountUpdate::locked();
            let persisted = self.ctx.records.update(&self.id, update.clone()).await;
            // An unlock racing this one may have installed a secret while the
            // timestamp was being cleared.
            self.ctx.secrets.clear(&self.id);
            persisted?;
            self.cache.apply(&update);
        }
        debug!(account = %self.id, allow_read, "account locked");
        self.ctx.events.emit(AccountEvent::status_changed(&self.id));
        Ok(())
    }

    /// Hash-then-sign with the signing key held in the Secret Store.
    pub async fn sign_with_local_key(&self, message: &[u8]) -> Result<SignatureBundle> {
        self.ensure_unlocked(true).await?;
        let Some(EphemeralSecret::SigningKey { key }) = self.live_secret() else {
            return Err(KeyringError::Locked(self.id.clone()));
        };
        let key_pair = KeyPair::from_secret_bytes(&key[..])?;
        let record = self.metadata().await?;
        if record.public_key.as_deref() != Some(&key_pair.public_key_bytes()[..]) {
            return Err(KeyringError::Corrupted(format!(
                "cached key for {} does not match its public key",
                self.id
            )));
        }
        Ok(SignatureBundle::sign_local(&key_pair, message))
    }

    /// Check that a key recovered during unlock belongs to this account.
    pub fn check_recovered_key(&self, record: &AccountRecord, key_pair: &KeyPair) -> Result<()> {
        if record.public_key.as_deref() != Some(&key_pair.public_key_bytes()[..]) {
            return Err(KeyringError::Corrupted(format!(
                "decrypted key does not match the stored public key of {}",
                self.id
            )));
        }
        Ok(())
    }

    pub async fn display_record(&self, backend_live: bool) -> Result<DisplayRecord> {
        let memo = self.metadata().await?;
        let current = self.fresh_record().await?;
        let is_locked = !self.unlocked_given(&current, backend_live);
        let readable = self.ctx.allows_read(current.last_unlocked_on);
        let public_key = memo.public_key.or(current.public_key).filter(|_| readable);
        Ok(DisplayRecord {
            id: memo.id,
            account_type: memo.account_type,
            address: memo.address,
            is_locked,
            public_key: public_key.map(hex::encode),
            last_unlocked_on: current.last_unlocked_on,
            nickname: current.nickname,
            selected: current.selected,
        })
    }
}

async fn persist_unlock(
    ctx: AccountContext,
    id: AccountId,
    secret: SessionSecret,
    update: AccountUpdate,
    done: oneshot::Sender<Result<()>>,
    ack: oneshot::Receiver<()>,
) {
    let previous = match ctx.records.get(&id).await {
        Ok(record) => record.last_unlocked_on,
        Err(e) => {
            let _ = done.send(Err(e));
            return;
        }
    };
    if done.is_closed() {
        return;
    }

    let guard = SecretGuard::install(ctx.secrets.clone(), &id, secret);
    if let Err(e) = ctx.records.update(&id, update).await {
        drop(guard);
        let _ = done.send(Err(e));
        return;
    }
    if done.send(Ok(())).is_ok() && ack.await.is_ok() {
        guard.commit();
        return;
    }

    drop(guard);
    let revert = AccountUpdate {
        last_unlocked_on: Some(previous),
        ..Default::default()
    };
    match ctx.records.update(&id, revert).await {
        Ok(_) => debug!(account = %id, "abandoned unlock rolled back"),
        Err(e) => warn!(account = %id, error = %e, "could not roll back abandoned unlock"),
    }
}

pub(crate) mod sealed {
    use super::AccountCore;

    /// Access to the shared core; keeps the account traits closed to this crate.
    pub trait HasCore {
        fn core(&self) -> &AccountCore;

        /// Variant-specific liveness, re-checked on every lock query.
        fn backend_live(&self) -> bool {
            true
        }
    }
}
