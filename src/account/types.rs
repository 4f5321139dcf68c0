//! Account record and display types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::auth::EncryptedBlob;
use super::signature::SignatureScheme;
use crate::crypto;
use crate::error::{KeyringError, Result};

/// Account identifier - opaque, assigned at creation
pub type AccountId = String;

/// The five credential backends. Serialized with the same kebab-case names
/// `Display` prints.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum AccountType {
    MnemonicDerived,
    Imported,
    Ledger,
    Qredo,
    Zk,
}

impl AccountType {
    pub const ALL: [AccountType; 5] = [
        AccountType::MnemonicDerived,
        AccountType::Imported,
        AccountType::Ledger,
        AccountType::Qredo,
        AccountType::Zk,
    ];

    /// Scheme whose flag prefixes the public key when deriving the address.
    pub fn scheme(&self) -> SignatureScheme {
        match self {
            AccountType::Zk => SignatureScheme::ZkLogin,
            _ => SignatureScheme::Ed25519,
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountType::MnemonicDerived => write!(f, "mnemonic-derived"),
            AccountType::Imported => write!(f, "imported"),
            AccountType::Ledger => write!(f, "ledger"),
            AccountType::Qredo => write!(f, "qredo"),
            AccountType::Zk => write!(f, "zk"),
        }
    }
}

/// Backend-specific persisted fields. Only the owning variant reads these.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum BackendConfig {
    MnemonicDerived {
        derivation_path: String,
        encrypted_entropy: EncryptedBlob,
    },
    Imported {
        encrypted_key: EncryptedBlob,
    },
    Ledger {
        derivation_path: String,
    },
    Qredo {
        connection_id: String,
        wallet_id: String,
    },
    Zk {
        /// OAuth issuer, e.g. `https://accounts.google.com`
        provider: String,
        subject: String,
        salt: Vec<u8>,
        address_seed: [u8; 32],
    },
}

impl BackendConfig {
    pub fn account_type(&self) -> AccountType {
        match self {
            BackendConfig::MnemonicDerived { .. } => AccountType::MnemonicDerived,
            BackendConfig::Imported { .. } => AccountType::Imported,
            BackendConfig::Ledger { .. } => AccountType::Ledger,
            BackendConfig::Qredo { .. } => AccountType::Qredo,
            BackendConfig::Zk { .. } => AccountType::Zk,
        }
    }
}

/// Non-secret account metadata as persisted in the record store
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AccountRecord {
    pub id: AccountId,
    pub account_type: AccountType,
    pub address: String,
    pub public_key: Option<Vec<u8>>,
    pub last_unlocked_on: Option<DateTime<Utc>>,
    pub nickname: Option<String>,
    pub selected: bool,
    pub created_at: DateTime<Utc>,
    pub config: BackendConfig,
}

impl AccountRecord {
    /// Build a record whose address is derived from `public_key`.
    pub fn new(id: AccountId, public_key: Vec<u8>, config: BackendConfig, created_at: DateTime<Utc>) -> Self {
        let account_type = config.account_type();
        let address = crypto::derive_address(account_type.scheme().flag(), &public_key);
        Self {
            id,
            account_type,
            address,
            public_key: Some(public_key),
            last_unlocked_on: None,
            nickname: None,
            selected: false,
            created_at,
            config,
        }
    }

    /// Check the structural invariants a record must satisfy to be usable.
    pub fn validate(&self) -> Result<()> {
        if self.account_type != self.config.account_type() {
            return Err(KeyringError::Corrupted(format!(
                "account {} is typed {} but carries {} config",
                self.id,
                self.account_type,
                self.config.account_type()
            )));
        }

        let Some(public_key) = &self.public_key else {
            // Remote signers only reveal their key after the first unlock.
            if self.account_type == AccountType::Qredo {
                return Ok(());
            }
            return Err(KeyringError::Corrupted(format!("account {} has no public key", self.id)));
        };

        match &self.config {
            BackendConfig::Zk { provider, address_seed, .. } => {
                if *public_key != zk_identifier(provider, address_seed) {
                    return Err(KeyringError::Corrupted(format!(
                        "account {} zk identifier does not match its address seed",
                        self.id
                    )));
                }
            }
            _ if public_key.len() != crypto::ED25519_PUBLIC_KEY_LENGTH => {
                return Err(KeyringError::Corrupted(format!(
                    "account {} public key has length {}",
                    self.id,
                    public_key.len()
                )));
            }
            _ => {}
        }

        let expected = crypto::derive_address(self.account_type.scheme().flag(), public_key);
        if expected != self.address {
            return Err(KeyringError::Corrupted(format!(
                "account {} address does not match its public key",
                self.id
            )));
        }
        Ok(())
    }
}

/// Public identifier of a zk-login account: `len(iss) || iss || address_seed`.
pub fn zk_identifier(provider: &str, address_seed: &[u8; 32]) -> Vec<u8> {
    let iss = provider.as_bytes();
    let mut out = Vec::with_capacity(1 + iss.len() + address_seed.len());
    out.push(iss.len().min(u8::MAX as usize) as u8);
    out.extend_from_slice(&iss[..iss.len().min(u8::MAX as usize)]);
    out.extend_from_slice(address_seed);
    out
}

/// Address seed binding a zk account to an OAuth subject and user salt.
pub fn zk_address_seed(subject: &str, salt: &[u8]) -> [u8; 32] {
    let mut data = Vec::with_capacity(subject.len() + salt.len());
    data.extend_from_slice(subject.as_bytes());
    data.extend_from_slice(salt);
    crypto::digest(&data)
}

/// Partial update applied by `AccountRecordStore::update`.
///
/// `None` leaves a field unchanged; for nullable fields the inner option is the
/// new value.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct AccountUpdate {
    pub last_unlocked_on: Option<Option<DateTime<Utc>>>,
    pub public_key: Option<Vec<u8>>,
    pub nickname: Option<Option<String>>,
    pub selected: Option<bool>,
}

impl AccountUpdate {
    pub fn unlocked_at(at: DateTime<Utc>) -> Self {
        Self {
            last_unlocked_on: Some(Some(at)),
            ..Default::default()
        }
    }

    pub fn locked() -> Self {
        Self {
            last_unlocked_on: Some(None),
            ..Default::default()
        }
    }

    pub fn with_public_key(mut self, public_key: Vec<u8>) -> Self {
        self.public_key = Some(public_key);
        self
    }

    pub fn apply(&self, record: &mut AccountRecord) {
        if let Some(at) = self.last_unlocked_on {
            record.last_unlocked_on = at;
        }
        if let Some(pk) = &self.public_key {
            record.public_key = Some(pk.clone());
        }
        if let Some(nickname) = &self.nickname {
            record.nickname = nickname.clone();
        }
        if let Some(selected) = self.selected {
            record.selected = selected;
        }
    }
}

/// The only account shape exposed to UI code. Never carries secrets.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DisplayRecord {
    pub id: AccountId,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    pub address: String,
    pub is_locked: bool,
    /// Hex encoded; `None` while read-locked or not yet known.
    pub public_key: Option<String>,
    pub last_unlocked_on: Option<DateTime<Utc>>,
    pub nickname: Option<String>,
    pub selected: bool,
}
