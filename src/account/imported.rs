//! Accounts backed by an imported raw private key

use async_trait::async_trait;
use zeroize::Zeroizing;

use super::base::sealed::HasCore;
use super::base::AccountCore;
use super::capabilities::{KeyPairExportable, PasswordUnlockable, SigningAccount, WalletAccount};
use super::secrets::EphemeralSecret;
use super::signature::SignatureBundle;
use super::types::{AccountType, AccountUpdate, BackendConfig};
use crate::crypto::KeyPair;
use crate::error::{KeyringError, Result};

pub struct ImportedAccount {
    core: AccountCore,
}

impl ImportedAccount {
    pub(crate) fn new(core: AccountCore) -> Self {
        Self { core }
    }

    async fn decrypt_key(&self, password: &str) -> Result<KeyPair> {
        let record = self.core.metadata().await?;
        let BackendConfig::Imported { encrypted_key } = &record.config else {
            return Err(KeyringError::Corrupted(format!(
                "imported account {} has {} config",
                record.id,
                record.config.account_type()
            )));
        };
        let plaintext = encrypted_key.open(password)?;
        let key_pair = KeyPair::from_secret_bytes(&plaintext)?;
        self.core.check_recovered_key(&record, &key_pair)?;
        Ok(key_pair)
    }
}

impl HasCore for ImportedAccount {
    fn core(&self) -> &AccountCore {
        &self.core
    }
}

impl WalletAccount for ImportedAccount {
    fn account_type(&self) -> AccountType {
        AccountType::Imported
    }
}

#[async_trait]
impl SigningAccount for ImportedAccount {
    async fn sign(&self, message: &[u8]) -> Result<SignatureBundle> {
        self.core.sign_with_local_key(message).await
    }
}

#[async_trait]
impl PasswordUnlockable for ImportedAccount {
    async fn unlock(&self, password: &str) -> Result<()> {
        self.core.release_stale();
        let key_pair = self.decrypt_key(password).await?;
        let secret = EphemeralSecret::SigningKey {
            key: key_pair.secret_bytes(),
        };
        self.core.commit_unlock(secret, AccountUpdate::default()).await
    }

    async fn verify_password(&self, password: &str) -> Result<()> {
        self.decrypt_key(password).await.map(|_| ())
    }
}

#[async_trait]
impl KeyPairExportable for ImportedAccount {
    async fn export_key_pair(&self, password: &str) -> Result<Zeroizing<[u8; 32]>> {
        Ok(self.decrypt_key(password).await?.secret_bytes())
    }
}
