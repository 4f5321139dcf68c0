//! Accounts derived from a password-protected BIP-39 mnemonic

use async_trait::async_trait;
use zeroize::Zeroizing;

use super::base::sealed::HasCore;
use super::base::AccountCore;
use super::capabilities::{KeyPairExportable, PasswordUnlockable, SigningAccount, WalletAccount};
use super::secrets::EphemeralSecret;
use super::signature::SignatureBundle;
use super::types::{AccountRecord, AccountType, AccountUpdate, BackendConfig};
use crate::crypto::KeyPair;
use crate::error::{KeyringError, Result};

pub struct MnemonicAccount {
    core: AccountCore,
}

impl MnemonicAccount {
    pub(crate) fn new(core: AccountCore) -> Self {
        Self { core }
    }

    pub async fn derivation_path(&self) -> Result<String> {
        let record = self.core.metadata().await?;
        Ok(config(&record)?.0.to_string())
    }

    /// Decrypt the entropy and derive this account's child key.
    async fn derive_key(&self, password: &str) -> Result<(AccountRecord, KeyPair)> {
        let record = self.core.metadata().await?;
        let (path, blob) = config(&record)?;
        let entropy = blob.open(password)?;
        let key_pair = KeyPair::from_entropy(&entropy, path)?;
        self.core.check_recovered_key(&record, &key_pair)?;
        Ok((record, key_pair))
    }
}

fn config(record: &AccountRecord) -> Result<(&str, &super::auth::EncryptedBlob)> {
    match &record.config {
        BackendConfig::MnemonicDerived {
            derivation_path,
            encrypted_entropy,
        } => Ok((derivation_path, encrypted_entropy)),
        other => Err(KeyringError::Corrupted(format!(
            "mnemonic account {} has {} config",
            record.id,
            other.account_type()
        ))),
    }
}

impl HasCore for MnemonicAccount {
    fn core(&self) -> &AccountCore {
        &self.core
    }
}

impl WalletAccount for MnemonicAccount {
    fn account_type(&self) -> AccountType {
        AccountType::MnemonicDerived
    }
}

#[async_trait]
impl SigningAccount for MnemonicAccount {
    async fn sign(&self, message: &[u8]) -> Result<SignatureBundle> {
        self.core.sign_with_local_key(message).await
    }
}

#[async_trait]
impl PasswordUnlockable for MnemonicAccount {
    async fn unlock(&self, password: &str) -> Result<()> {
        self.core.release_stale();
        let (_, key_pair) = self.derive_key(password).await?;
        let secret = EphemeralSecret::SigningKey {
            key: key_pair.secret_bytes(),
        };
        self.core.commit_unlock(secret, AccountUpdate::default()).await
    }

    async fn verify_password(&self, password: &str) -> Result<()> {
        self.derive_key(password).await.map(|_| ())
    }
}

#[async_trait]
impl KeyPairExportable for MnemonicAccount {
    async fn export_key_pair(&self, password: &str) -> Result<Zeroizing<[u8; 32]>> {
        let (_, key_pair) = self.derive_key(password).await?;
        Ok(key_pair.secret_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::events::AccountEvent;
    use crate::account::testing::TestEnv;
    use crate::clock::Clock;

    #[tokio::test]
    async fn test_lock_unlock_sign_scenario() {
        let env = TestEnv::new();
        let mut events = env.events.subscribe();
        let record = env.insert_mnemonic("a1", "correct").await;
        let account = MnemonicAccount::new(AccountCore::new("a1".to_string(), env.ctx()));

        account.lock(false).await.unwrap();
        assert!(account.is_locked().await.unwrap());
        events.drain();

        account.unlock("correct").await.unwrap();
        assert!(!account.is_locked().await.unwrap());
        assert_eq!(events.drain(), vec![AccountEvent::status_changed("a1")]);
        assert_eq!(account.last_unlocked_on().await.unwrap(), Some(env.clock.now()));

        let bundle = account.sign(b"pay bob 5").await.unwrap();
        assert_eq!(Some(bundle.public_key.clone()), record.public_key);
        assert!(bundle.verify(b"pay bob 5"));
    }

    #[tokio::test]
    async fn test_wrong_password_leaves_state_alone() {
        let env = TestEnv::new();
        env.insert_mnemonic("a1", "correct").await;
        let account = MnemonicAccount::new(AccountCore::new("a1".to_string(), env.ctx()));
        let mut events = env.events.subscribe();

        let err = account.unlock("nope").await.unwrap_err();
        assert!(matches!(err, KeyringError::AuthFailed(_)));
        assert!(account.is_locked().await.unwrap());
        assert!(events.try_recv().is_none());
        assert!(matches!(account.verify_password("nope").await, Err(KeyringError::AuthFailed(_))));
        account.verify_password("correct").await.unwrap();
    }

    #[tokio::test]
    async fn test_export_matches_signing_key() {
        let env = TestEnv::new();
        let record = env.insert_mnemonic("a1", "correct").await;
        let account = MnemonicAccount::new(AccountCore::new("a1".to_string(), env.ctx()));

        let secret = account.export_key_pair("correct").await.unwrap();
        let key_pair = KeyPair::from_secret_bytes(&secret[..]).unwrap();
        assert_eq!(Some(key_pair.public_key_bytes().to_vec()), record.public_key);
        assert!(account.export_key_pair("wrong").await.is_err());
    }

    #[tokio::test]
    async fn test_signing_twice_is_byte_identical() {
        let env = TestEnv::new();
        env.insert_mnemonic("a1", "correct").await;
        let account = MnemonicAccount::new(AccountCore::new("a1".to_string(), env.ctx()));
        account.unlock("correct").await.unwrap();

        let a = account.sign(b"same").await.unwrap();
        let b = account.sign(b"same").await.unwrap();
        assert_eq!(a.to_bytes(), b.to_bytes());
    }
}
