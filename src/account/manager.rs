//! Process-wide account context: creates accounts for every backend, hands
//! out instances built from stored records, and ends the session.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::auth::{EncryptedBlob, Kdf};
use super::backends::{LedgerTransport, QredoService, ZkProver};
use super::base::AccountContext;
use super::capabilities::UnlockCredential;
use super::events::{AccountEvent, EventBus, Subscription};
use super::secrets::SecretStore;
use super::signature::SignatureBundle;
use super::store::AccountRecordStore;
use super::types::{
    zk_address_seed, zk_identifier, AccountId, AccountRecord, AccountType, AccountUpdate, BackendConfig, DisplayRecord,
};
use super::Account;
use crate::clock::{Clock, SystemClock};
use crate::config::KeyringConfig;
use crate::crypto::{self, KeyPair};
use crate::error::{KeyringError, Result};

pub struct AccountManager {
    ctx: AccountContext,
    // Held across the duplicate-address check and the insert.
    adding: Mutex<()>,
}

impl AccountManager {
    pub fn new(ctx: AccountContext) -> Self {
        Self {
            ctx,
            adding: Mutex::new(()),
        }
    }

    /// Context with a fresh event bus and the system clock. External signers
    /// are attached with the `with_*` builders.
    pub fn from_config(
        config: &KeyringConfig,
        records: Arc<dyn AccountRecordStore>,
        secrets: Arc<dyn SecretStore>,
    ) -> Result<Self> {
        config.lock.validate()?;
        Ok(Self::new(AccountContext {
            records,
            secrets,
            events: EventBus::new(),
            clock: Arc::new(SystemClock),
            policy: config.lock.clone(),
            kdf: Kdf::from_config(&config.kdf),
            ledger: None,
            qredo: None,
            zk_prover: None,
        }))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.ctx.clock = clock;
        self
    }

    pub fn with_ledger(mut self, transport: Arc<dyn LedgerTransport>) -> Self {
        self.ctx.ledger = Some(transport);
        self
    }

    pub fn with_qredo(mut self, service: Arc<dyn QredoService>) -> Self {
        self.ctx.qredo = Some(service);
        self
    }

    pub fn with_zk_prover(mut self, prover: Arc<dyn ZkProver>) -> Self {
        self.ctx.zk_prover = Some(prover);
        self
    }

    pub fn context(&self) -> &AccountContext {
        &self.ctx
    }

    pub fn events(&self) -> &EventBus {
        &self.ctx.events
    }

    pub fn subscribe(&self) -> Subscription {
        self.ctx.events.subscribe()
    }

    // ---- account creation ----

    /// Generate a fresh 24-word mnemonic and store the account at `index`.
    /// The phrase is returned once for the user to back up; only its
    /// encrypted entropy is kept.
    pub async fn create_mnemonic_account(&self, password: &str, index: u32) -> Result<(Account, Zeroizing<String>)> {
        let (mnemonic, entropy) = KeyPair::generate_mnemonic()?;
        let account = self.store_mnemonic(&entropy, password, index).await?;
        Ok((account, Zeroizing::new(mnemonic.to_string())))
    }

    pub async fn restore_mnemonic_account(&self, phrase: &str, password: &str, index: u32) -> Result<Account> {
        let mnemonic = KeyPair::parse_mnemonic(phrase)?;
        let entropy = Zeroizing::new(mnemonic.to_entropy());
        self.store_mnemonic(&entropy, password, index).await
    }

    async fn store_mnemonic(&self, entropy: &[u8], password: &str, index: u32) -> Result<Account> {
        let path = crypto::derivation_path(index);
        let key_pair = KeyPair::from_entropy(entropy, &path)?;
        let config = BackendConfig::MnemonicDerived {
            derivation_path: path,
            encrypted_entropy: EncryptedBlob::seal(entropy, password, self.ctx.kdf)?,
        };
        self.persist(key_pair.public_key_bytes().to_vec(), config).await
    }

    /// Import a raw 32-byte ed25519 secret key, encrypted under `password`.
    pub async fn import_private_key(&self, secret_key: &[u8], password: &str) -> Result<Account> {
        let key_pair = KeyPair::from_secret_bytes(secret_key)?;
        let config = BackendConfig::Imported {
            encrypted_key: EncryptedBlob::seal(&key_pair.secret_bytes()[..], password, self.ctx.kdf)?,
        };
        self.persist(key_pair.public_key_bytes().to_vec(), config).await
    }

    /// Register the device key at `index`. The device must be connected.
    pub async fn add_ledger_account(&self, index: u32) -> Result<Account> {
        let transport = self
            .ctx
            .ledger
            .as_ref()
            .ok_or_else(|| KeyringError::BackendUnavailable("no hardware wallet transport".to_string()))?;
        if !transport.is_connected() {
            return Err(KeyringError::BackendUnavailable("hardware wallet disconnected".to_string()));
        }
        let path = crypto::derivation_path(index);
        let public_key = transport.public_key(&path).await?;
        self.persist(public_key.to_vec(), BackendConfig::Ledger { derivation_path: path })
            .await
    }

    /// Register a custodial wallet. Its public key is learned on first unlock
    /// and checked against `address` then.
    pub async fn add_qredo_account(&self, connection_id: &str, wallet_id: &str, address: &str) -> Result<Account> {
        let address = address.to_lowercase();
        if !address.starts_with("0x") || hex::decode(&address[2..]).map_or(true, |b| b.len() != 32) {
            return Err(KeyringError::AuthFailed(format!("not a valid address: {}", address)));
        }
        let record = AccountRecord {
            id: Uuid::new_v4().to_string(),
            account_type: AccountType::Qredo,
            address,
            public_key: None,
            last_unlocked_on: None,
            nickname: None,
            selected: false,
            created_at: self.ctx.now(),
            config: BackendConfig::Qredo {
                connection_id: connection_id.to_string(),
                wallet_id: wallet_id.to_string(),
            },
        };
        self.insert(record).await
    }

    pub async fn add_zk_account(&self, provider: &str, subject: &str, salt: &[u8]) -> Result<Account> {
        let address_seed = zk_address_seed(subject, salt);
        let config = BackendConfig::Zk {
            provider: provider.to_string(),
            subject: subject.to_string(),
            salt: salt.to_vec(),
            address_seed,
        };
        self.persist(zk_identifier(provider, &address_seed), config).await
    }

    async fn persist(&self, public_key: Vec<u8>, config: BackendConfig) -> Result<Account> {
        let record = AccountRecord::new(Uuid::new_v4().to_string(), public_key, config, self.ctx.now());
        self.insert(record).await
    }

    async fn insert(&self, record: AccountRecord) -> Result<Account> {
        record.validate()?;
        let _adding = self.adding.lock().await;
        self.ensure_new_address(&record.address).await?;
        self.ctx.records.insert(record.clone()).await?;
        info!(account = %record.id, kind = %record.account_type, address = %record.address, "account added");
        Account::from_record(record, self.ctx.clone())
    }

    async fn ensure_new_address(&self, address: &str) -> Result<()> {
        let records = self.ctx.records.list().await?;
        if records.iter().any(|r| r.address == address) {
            warn!(address, "refusing to add duplicate account");
            return Err(KeyringError::AlreadyExists(address.to_string()));
        }
        Ok(())
    }

    // ---- access ----

    /// Fresh instance for `id`, seeded from the current stored record.
    pub async fn account(&self, id: &str) -> Result<Account> {
        let record = self.ctx.records.get(id).await?;
        Account::from_record(record, self.ctx.clone())
    }

    pub async fn accounts(&self) -> Result<Vec<Account>> {
        let mut records = self.ctx.records.list().await?;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        records
            .into_iter()
            .map(|record| Account::from_record(record, self.ctx.clone()))
            .collect()
    }

    /// Display records for every account, oldest first.
    pub async fn list(&self) -> Result<Vec<DisplayRecord>> {
        let mut out = Vec::new();
        for account in self.accounts().await? {
            out.push(account.to_display_record().await?);
        }
        Ok(out)
    }

    pub async fn unlock(&self, id: &str, credential: UnlockCredential) -> Result<()> {
        self.account(id).await?.unlock(credential).await
    }

    pub async fn lock(&self, id: &str, allow_read: bool) -> Result<()> {
        self.account(id).await?.lock(allow_read).await
    }

    pub async fn is_locked(&self, id: &str) -> Result<bool> {
        self.account(id).await?.is_locked().await
    }

    pub async fn sign(&self, id: &str, message: &[u8]) -> Result<SignatureBundle> {
        self.account(id).await?.sign(message).await
    }

    // ---- metadata ----

    pub async fn set_nickname(&self, id: &str, nickname: Option<String>) -> Result<()> {
        let update = AccountUpdate {
            nickname: Some(nickname),
            ..Default::default()
        };
        self.ctx.records.update(id, update).await?;
        self.ctx.events.emit(AccountEvent::status_changed(id));
        Ok(())
    }

    /// Mark `id` as the selected account and clear the flag everywhere else.
    pub async fn select(&self, id: &str) -> Result<()> {
        self.ctx.records.get(id).await?;
        for record in self.ctx.records.list().await? {
            let selected = record.id == id;
            if record.selected != selected {
                let update = AccountUpdate {
                    selected: Some(selected),
                    ..Default::default()
                };
                self.ctx.records.update(&record.id, update).await?;
                self.ctx.events.emit(AccountEvent::status_changed(&record.id));
            }
        }
        Ok(())
    }

    /// Forget an account: drop its session secret and its record.
    pub async fn remove(&self, id: &str) -> Result<()> {
        self.ctx.records.get(id).await?;
        self.ctx.secrets.clear(id);
        self.ctx.records.remove(id).await?;
        info!(account = %id, "account removed");
        self.ctx.events.emit(AccountEvent::status_changed(id));
        Ok(())
    }

    /// Drop every cached secret that has expired or outlived the auto-lock
    /// window, returning the ids released. Lock state is unchanged: those
    /// accounts already report locked.
    pub async fn release_expired(&self) -> Result<Vec<AccountId>> {
        let mut released = Vec::new();
        for record in self.ctx.records.list().await? {
            if self.ctx.release_if_stale(&record.id) {
                released.push(record.id);
            }
        }
        if !released.is_empty() {
            info!(count = released.len(), "released expired session secrets");
        }
        Ok(released)
    }

    /// Release every session secret and close the event bus.
    pub fn end_session(&self) {
        self.ctx.secrets.clear_all();
        self.ctx.events.shutdown();
        debug!("session ended");
    }
}
