//! Wallet accounts
//!
//! Every account, whatever holds its key, goes through the same lifecycle:
//! - metadata read once from the record store and memoized per instance
//! - unlock puts a session secret in the secret store and stamps the record
//! - signing reads that secret (or asks the device/custodian) and returns a
//!   `SignatureBundle`
//! - lock releases the secret; every transition is announced on the event bus
//!
//! `Account` is the sum type over the five backends. Capabilities that only
//! some backends have are reached through the `as_*` narrowing methods.

pub mod auth;
pub mod backends;
mod base;
pub mod capabilities;
pub mod events;
pub mod imported;
pub mod ledger;
pub mod manager;
pub mod mnemonic;
pub mod qredo;
pub mod secrets;
pub mod signature;
pub mod store;
pub mod types;
pub mod zk;

#[cfg(test)]
pub(crate) mod testing;

pub use base::AccountContext;
pub use capabilities::{KeyPairExportable, PasswordUnlockable, SigningAccount, UnlockCredential, WalletAccount};
pub use events::{AccountEvent, EventBus, Subscription};
pub use manager::AccountManager;
pub use secrets::{EphemeralSecret, MemorySecretStore, SecretStore, SessionSecret};
pub use signature::{SignatureBundle, SignatureScheme, ZkProof};
pub use store::{AccountRecordStore, MemoryRecordStore, SledRecordStore};
pub use types::{AccountId, AccountRecord, AccountType, AccountUpdate, BackendConfig, DisplayRecord};

use imported::ImportedAccount;
use ledger::LedgerAccount;
use mnemonic::MnemonicAccount;
use qredo::QredoAccount;
use zk::ZkAccount;

use base::AccountCore;
use crate::error::{KeyringError, Result};

pub enum Account {
    MnemonicDerived(MnemonicAccount),
    Imported(ImportedAccount),
    Ledger(LedgerAccount),
    Qredo(QredoAccount),
    Zk(ZkAccount),
}

impl Account {
    /// Build an instance around a record already in hand. The record seeds the
    /// metadata memo, so no store read happens for it.
    pub fn from_record(record: AccountRecord, ctx: AccountContext) -> Result<Self> {
        record.validate()?;
        let account_type = record.account_type;
        Ok(Self::wrap(account_type, AccountCore::with_record(record, ctx)))
    }

    /// Instance for a known id whose metadata is fetched on first use.
    pub fn new(id: AccountId, account_type: AccountType, ctx: AccountContext) -> Self {
        Self::wrap(account_type, AccountCore::new(id, ctx))
    }

    fn wrap(account_type: AccountType, core: AccountCore) -> Self {
        match account_type {
            AccountType::MnemonicDerived => Account::MnemonicDerived(MnemonicAccount::new(core)),
            AccountType::Imported => Account::Imported(ImportedAccount::new(core)),
            AccountType::Ledger => Account::Ledger(LedgerAccount::new(core)),
            AccountType::Qredo => Account::Qredo(QredoAccount::new(core)),
            AccountType::Zk => Account::Zk(ZkAccount::new(core)),
        }
    }

    fn inner(&self) -> &dyn WalletAccount {
        match self {
            Account::MnemonicDerived(a) => a,
            Account::Imported(a) => a,
            Account::Ledger(a) => a,
            Account::Qredo(a) => a,
            Account::Zk(a) => a,
        }
    }

    pub fn id(&self) -> &str {
        self.inner().id()
    }

    pub fn account_type(&self) -> AccountType {
        self.inner().account_type()
    }

    pub async fn address(&self) -> Result<String> {
        self.inner().address().await
    }

    pub async fn lock(&self, allow_read: bool) -> Result<()> {
        self.inner().lock(allow_read).await
    }

    pub async fn is_locked(&self) -> Result<bool> {
        self.inner().is_locked().await
    }

    pub async fn to_display_record(&self) -> Result<DisplayRecord> {
        self.inner().to_display_record().await
    }

    pub fn is_signing_capable(&self) -> bool {
        self.inner().is_signing_capable()
    }

    /// Type-level narrowing; every current backend signs.
    pub fn as_signing(&self) -> Option<&dyn SigningAccount> {
        match self {
            Account::MnemonicDerived(a) => Some(a),
            Account::Imported(a) => Some(a),
            Account::Ledger(a) => Some(a),
            Account::Qredo(a) => Some(a),
            Account::Zk(a) => Some(a),
        }
    }

    pub async fn sign(&self, message: &[u8]) -> Result<SignatureBundle> {
        match self.as_signing() {
            Some(account) => account.sign(message).await,
            None => Err(KeyringError::AuthFailed(format!("{} accounts cannot sign", self.account_type()))),
        }
    }

    /// `Some` for mnemonic-derived and imported accounts, in any lock state.
    pub fn as_password_unlockable(&self) -> Option<&dyn PasswordUnlockable> {
        match self {
            Account::MnemonicDerived(a) => Some(a),
            Account::Imported(a) => Some(a),
            _ => None,
        }
    }

    pub fn is_password_unlockable(&self) -> bool {
        self.as_password_unlockable().is_some()
    }

    pub fn as_key_pair_exportable(&self) -> Option<&dyn KeyPairExportable> {
        match self {
            Account::MnemonicDerived(a) => Some(a),
            Account::Imported(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_ledger(&self) -> Option<&LedgerAccount> {
        match self {
            Account::Ledger(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_qredo(&self) -> Option<&QredoAccount> {
        match self {
            Account::Qredo(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_zk(&self) -> Option<&ZkAccount> {
        match self {
            Account::Zk(a) => Some(a),
            _ => None,
        }
    }

    /// Unlock with whatever credential this backend takes. A credential of
    /// the wrong kind is rejected before any backend is contacted.
    pub async fn unlock(&self, credential: UnlockCredential) -> Result<()> {
        match (self, credential) {
            (Account::MnemonicDerived(a), UnlockCredential::Password(password)) => a.unlock(&password).await,
            (Account::Imported(a), UnlockCredential::Password(password)) => a.unlock(&password).await,
            (Account::Ledger(a), UnlockCredential::Device) => a.unlock().await,
            (Account::Qredo(a), UnlockCredential::RemoteApproval) => a.unlock().await,
            (Account::Zk(a), UnlockCredential::OAuth { jwt }) => a.unlock(&jwt).await,
            (account, credential) => Err(KeyringError::AuthFailed(format!(
                "{} accounts cannot be unlocked with a {} credential",
                account.account_type(),
                credential.kind()
            ))),
        }
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id())
            .field("type", &self.account_type())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::testing::{ledger_record, TestEnv};
    use crate::crypto::KeyPair;

    async fn one_of_each(env: &TestEnv) -> Vec<Account> {
        let records = vec![
            env.insert_mnemonic("m", "pw").await,
            env.insert_imported("i", &KeyPair::generate(), "pw").await,
            {
                let record = ledger_record("l");
                env.store.insert(record.clone()).await.unwrap();
                record
            },
            env.insert_qredo("q").await,
            env.insert_zk("z", "alice").await,
        ];
        records
            .into_iter()
            .map(|r| Account::from_record(r, env.ctx()).unwrap())
            .collect()
    }

    fn credential_for(account: &Account) -> UnlockCredential {
        match account.account_type() {
            AccountType::MnemonicDerived | AccountType::Imported => UnlockCredential::Password("pw".to_string()),
            AccountType::Ledger => UnlockCredential::Device,
            AccountType::Qredo => UnlockCredential::RemoteApproval,
            AccountType::Zk => UnlockCredential::OAuth {
                jwt: "jwt-for-alice".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_password_predicate_by_type() {
        let env = TestEnv::new();
        for account in one_of_each(&env).await {
            let expected = matches!(account.account_type(), AccountType::MnemonicDerived | AccountType::Imported);
            assert_eq!(account.is_password_unlockable(), expected, "{:?}", account);
            assert_eq!(account.as_key_pair_exportable().is_some(), expected);
            assert!(account.as_signing().is_some());

            account.unlock(credential_for(&account)).await.unwrap();
            assert_eq!(account.is_password_unlockable(), expected);
            account.lock(false).await.unwrap();
            assert_eq!(account.is_password_unlockable(), expected);
        }
    }

    #[tokio::test]
    async fn test_lock_blocks_signing_for_every_type() {
        let env = TestEnv::new();
        for account in one_of_each(&env).await {
            account.unlock(credential_for(&account)).await.unwrap();
            assert!(!account.is_locked().await.unwrap(), "{:?}", account);
            assert_eq!(
                account.to_display_record().await.unwrap().last_unlocked_on,
                Some(crate::clock::Clock::now(env.clock.as_ref()))
            );

            let bundle = account.sign(b"hello").await.unwrap();
            assert!(bundle.verify(b"hello"));

            account.lock(false).await.unwrap();
            assert!(account.is_locked().await.unwrap());
            assert!(matches!(account.sign(b"hello").await, Err(KeyringError::Locked(_))));
        }
    }

    #[tokio::test]
    async fn test_read_allowed_lock_keeps_address_and_key() {
        let env = TestEnv::new();
        for account in one_of_each(&env).await {
            account.unlock(credential_for(&account)).await.unwrap();
            account.lock(true).await.unwrap();

            let display = account.to_display_record().await.unwrap();
            assert!(display.is_locked);
            assert!(display.public_key.is_some(), "{:?}", account);
            assert!(display.address.starts_with("0x"));
            assert!(matches!(account.sign(b"hello").await, Err(KeyringError::Locked(_))));
        }
    }

    #[tokio::test]
    async fn test_wrong_credential_kind() {
        let env = TestEnv::new();
        let accounts = one_of_each(&env).await;
        let err = accounts[2]
            .unlock(UnlockCredential::Password("pw".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, KeyringError::AuthFailed(_)));
        assert!(accounts[0].unlock(UnlockCredential::Device).await.is_err());
        assert!(accounts[2].is_locked().await.unwrap());
    }

    #[tokio::test]
    async fn test_from_record_rejects_corrupted() {
        let env = TestEnv::new();
        let mut record = ledger_record("bad");
        record.address = "0xdeadbeef".to_string();
        assert!(matches!(Account::from_record(record, env.ctx()), Err(KeyringError::Corrupted(_))));
    }
}
