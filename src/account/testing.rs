//! Shared fixtures for account tests: in-memory stores, a manual clock and
//! scriptable stand-ins for the external signers.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::auth::{EncryptedBlob, Kdf};
use super::backends::{LedgerTransport, QredoService, QredoToken, RemoteSignStatus, ZkProofRequest, ZkProver};
use super::base::AccountContext;
use super::events::EventBus;
use super::secrets::MemorySecretStore;
use super::signature::ZkProof;
use super::store::{AccountRecordStore, MemoryRecordStore};
use super::types::{zk_address_seed, zk_identifier, AccountRecord, BackendConfig};
use crate::clock::{Clock, ManualClock};
use crate::config::LockPolicy;
use crate::crypto::{self, KeyPair};
use crate::error::{KeyringError, Result};

pub const FAST_KDF: Kdf = Kdf::Pbkdf2Sha256 { iterations: 1000 };
pub const ZK_PROVIDER: &str = "https://accounts.google.com";
pub const DEVICE_ID: &str = "nano-x-0001";

/// Key held by the mock hardware wallet
pub fn ledger_key() -> KeyPair {
    KeyPair::from_secret_bytes(&[7u8; 32]).unwrap()
}

pub fn ledger_record(id: &str) -> AccountRecord {
    AccountRecord::new(
        id.to_string(),
        ledger_key().public_key_bytes().to_vec(),
        BackendConfig::Ledger {
            derivation_path: crypto::derivation_path(0),
        },
        chrono::Utc::now(),
    )
}

pub struct TestEnv {
    pub store: Arc<MemoryRecordStore>,
    pub secrets: Arc<MemorySecretStore>,
    pub events: EventBus,
    pub clock: Arc<ManualClock>,
    pub ledger: Arc<MockLedger>,
    pub qredo: Arc<MockQredo>,
    pub prover: Arc<MockProver>,
}

impl TestEnv {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new());
        Self {
            store: Arc::new(MemoryRecordStore::new()),
            secrets: Arc::new(MemorySecretStore::new()),
            events: EventBus::new(),
            qredo: Arc::new(MockQredo::new(clock.clone())),
            clock,
            ledger: Arc::new(MockLedger::new()),
            prover: Arc::new(MockProver),
        }
    }

    pub fn policy() -> LockPolicy {
        LockPolicy {
            qredo_poll_interval_ms: 1,
            qredo_max_polls: 10,
            ..LockPolicy::default()
        }
    }

    pub fn ctx(&self) -> AccountContext {
        AccountContext {
            records: self.store.clone(),
            secrets: self.secrets.clone(),
            events: self.events.clone(),
            clock: self.clock.clone(),
            policy: Self::policy(),
            kdf: FAST_KDF,
            ledger: Some(self.ledger.clone()),
            qredo: Some(self.qredo.clone()),
            zk_prover: Some(self.prover.clone()),
        }
    }

    async fn insert(&self, record: AccountRecord) -> AccountRecord {
        self.store.insert(record.clone()).await.unwrap();
        record
    }

    pub async fn insert_mnemonic(&self, id: &str, password: &str) -> AccountRecord {
        let (_, entropy) = KeyPair::generate_mnemonic().unwrap();
        let path = crypto::derivation_path(0);
        let key_pair = KeyPair::from_entropy(&entropy, &path).unwrap();
        let config = BackendConfig::MnemonicDerived {
            derivation_path: path,
            encrypted_entropy: EncryptedBlob::seal(&entropy, password, FAST_KDF).unwrap(),
        };
        let record = AccountRecord::new(id.to_string(), key_pair.public_key_bytes().to_vec(), config, self.clock.now());
        self.insert(record).await
    }

    pub async fn insert_imported(&self, id: &str, key_pair: &KeyPair, password: &str) -> AccountRecord {
        let config = BackendConfig::Imported {
            encrypted_key: EncryptedBlob::seal(&key_pair.secret_bytes()[..], password, FAST_KDF).unwrap(),
        };
        let record = AccountRecord::new(id.to_string(), key_pair.public_key_bytes().to_vec(), config, self.clock.now());
        self.insert(record).await
    }

    /// Remote account whose key is not yet known locally.
    pub async fn insert_qredo(&self, id: &str) -> AccountRecord {
        let config = BackendConfig::Qredo {
            connection_id: "conn-1".to_string(),
            wallet_id: "wallet-1".to_string(),
        };
        let mut record = AccountRecord::new(
            id.to_string(),
            self.qredo.key_pair.public_key_bytes().to_vec(),
            config,
            self.clock.now(),
        );
        record.public_key = None;
        self.insert(record).await
    }

    pub async fn insert_zk(&self, id: &str, subject: &str) -> AccountRecord {
        let salt = b"salt".to_vec();
        let address_seed = zk_address_seed(subject, &salt);
        let config = BackendConfig::Zk {
            provider: ZK_PROVIDER.to_string(),
            subject: subject.to_string(),
            salt,
            address_seed,
        };
        let record = AccountRecord::new(
            id.to_string(),
            zk_identifier(ZK_PROVIDER, &address_seed),
            config,
            self.clock.now(),
        );
        self.insert(record).await
    }
}

pub struct MockLedger {
    pub key_pair: KeyPair,
    connected: AtomicBool,
    hang: AtomicBool,
    device_id: Mutex<String>,
}

impl MockLedger {
    fn new() -> Self {
        Self {
            key_pair: ledger_key(),
            connected: AtomicBool::new(true),
            hang: AtomicBool::new(false),
            device_id: Mutex::new(DEVICE_ID.to_string()),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make every device call wait forever, as if approval never comes.
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub fn set_device_id(&self, id: &str) {
        *self.device_id.lock().unwrap() = id.to_string();
    }

    async fn gate(&self) -> Result<()> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if !self.is_connected() {
            return Err(KeyringError::BackendUnavailable("device unplugged".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerTransport for MockLedger {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn device_id(&self) -> Option<String> {
        self.is_connected().then(|| self.device_id.lock().unwrap().clone())
    }

    async fn public_key(&self, _derivation_path: &str) -> Result<[u8; 32]> {
        self.gate().await?;
        Ok(self.key_pair.public_key_bytes())
    }

    async fn sign_digest(&self, _derivation_path: &str, digest: &[u8; 32]) -> Result<[u8; 64]> {
        self.gate().await?;
        Ok(self.key_pair.sign(digest).to_bytes())
    }
}

pub struct MockQredo {
    pub key_pair: KeyPair,
    clock: Arc<ManualClock>,
    pending_polls: AtomicUsize,
    polls: AtomicUsize,
    reject: AtomicBool,
    requests: Mutex<HashMap<String, (Vec<u8>, usize)>>,
}

impl MockQredo {
    fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            key_pair: KeyPair::from_secret_bytes(&[9u8; 32]).unwrap(),
            clock,
            pending_polls: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            reject: AtomicBool::new(false),
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Number of `Pending` answers before each request is signed.
    pub fn set_pending_polls(&self, n: usize) {
        self.pending_polls.store(n, Ordering::SeqCst);
    }

    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QredoService for MockQredo {
    async fn authorize(&self, _connection_id: &str) -> Result<QredoToken> {
        Ok(QredoToken {
            access_token: "bearer-abc".to_string(),
            expires_at: self.clock.now() + chrono::Duration::minutes(15),
        })
    }

    async fn wallet_public_key(&self, _token: &str, _wallet_id: &str) -> Result<Vec<u8>> {
        Ok(self.key_pair.public_key_bytes().to_vec())
    }

    async fn submit_signing_request(&self, _token: &str, _wallet_id: &str, message: &[u8]) -> Result<String> {
        let mut requests = self.requests.lock().unwrap();
        let id = format!("req-{}", requests.len());
        requests.insert(id.clone(), (message.to_vec(), self.pending_polls.load(Ordering::SeqCst)));
        Ok(id)
    }

    async fn poll_signature(&self, _token: &str, request_id: &str) -> Result<RemoteSignStatus> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if self.reject.load(Ordering::SeqCst) {
            return Ok(RemoteSignStatus::Rejected {
                reason: "policy".to_string(),
            });
        }
        let mut requests = self.requests.lock().unwrap();
        let (message, remaining) = requests
            .get_mut(request_id)
            .ok_or_else(|| KeyringError::NotFound(request_id.to_string()))?;
        if *remaining > 0 {
            *remaining -= 1;
            return Ok(RemoteSignStatus::Pending);
        }
        let signature = self.key_pair.sign(&crypto::digest(message)).to_bytes().to_vec();
        Ok(RemoteSignStatus::Signed { signature })
    }
}

/// Accepts tokens of the form `jwt-for-<subject>`.
pub struct MockProver;

#[async_trait]
impl ZkProver for MockProver {
    async fn prove(&self, request: ZkProofRequest) -> Result<ZkProof> {
        let subject = request
            .jwt
            .strip_prefix("jwt-for-")
            .ok_or_else(|| KeyringError::AuthFailed("malformed token".to_string()))?;
        Ok(ZkProof {
            proof: b"groth16".to_vec(),
            address_seed: zk_address_seed(subject, &request.salt),
            expires_at: request.expires_at,
        })
    }
}
