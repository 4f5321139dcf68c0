//! Hardware wallet accounts. The key never leaves the device; unlocking only
//! records that the right device is attached.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use super::backends::LedgerTransport;
use super::base::sealed::HasCore;
use super::base::AccountCore;
use super::capabilities::{SigningAccount, WalletAccount};
use super::secrets::EphemeralSecret;
use super::signature::SignatureBundle;
use super::types::{AccountRecord, AccountType, AccountUpdate, BackendConfig};
use crate::crypto;
use crate::error::{KeyringError, Result};

pub struct LedgerAccount {
    core: AccountCore,
}

impl LedgerAccount {
    pub(crate) fn new(core: AccountCore) -> Self {
        Self { core }
    }

    fn transport(&self) -> Result<&Arc<dyn LedgerTransport>> {
        self.core
            .ctx
            .ledger
            .as_ref()
            .ok_or_else(|| KeyringError::BackendUnavailable("no hardware wallet transport".to_string()))
    }

    fn connected_transport(&self) -> Result<&Arc<dyn LedgerTransport>> {
        let transport = self.transport()?;
        if !transport.is_connected() {
            return Err(KeyringError::BackendUnavailable("hardware wallet disconnected".to_string()));
        }
        Ok(transport)
    }

    /// Ask the device for its key and require it to match the stored one.
    pub async fn unlock(&self) -> Result<()> {
        self.core.release_stale();
        let transport = self.connected_transport()?;
        let record = self.core.metadata().await?;
        let path = derivation_path(&record)?;

        let device_key = transport.public_key(path).await?;
        if record.public_key.as_deref() != Some(&device_key[..]) {
            warn!(account = %record.id, "attached device holds a different key");
            return Err(KeyringError::AuthFailed(
                "connected device does not hold this account's key".to_string(),
            ));
        }
        let device_id = transport
            .device_id()
            .ok_or_else(|| KeyringError::BackendUnavailable("device did not report an id".to_string()))?;

        self.core
            .commit_unlock(EphemeralSecret::LedgerSession { device_id }, AccountUpdate::default())
            .await
    }
}

fn derivation_path(record: &AccountRecord) -> Result<&str> {
    match &record.config {
        BackendConfig::Ledger { derivation_path } => Ok(derivation_path),
        other => Err(KeyringError::Corrupted(format!(
            "ledger account {} has {} config",
            record.id,
            other.account_type()
        ))),
    }
}

impl HasCore for LedgerAccount {
    fn core(&self) -> &AccountCore {
        &self.core
    }

    /// Connected, and the device is the one that approved this session.
    fn backend_live(&self) -> bool {
        let Some(transport) = &self.core.ctx.ledger else {
            return false;
        };
        if !transport.is_connected() {
            return false;
        }
        match self.core.live_secret() {
            Some(EphemeralSecret::LedgerSession { device_id }) => {
                transport.device_id().as_deref() == Some(device_id.as_str())
            }
            _ => false,
        }
    }
}

impl WalletAccount for LedgerAccount {
    fn account_type(&self) -> AccountType {
        AccountType::Ledger
    }
}

#[async_trait]
impl SigningAccount for LedgerAccount {
    async fn sign(&self, message: &[u8]) -> Result<SignatureBundle> {
        self.core.ensure_unlocked(self.backend_live()).await?;
        let transport = self.connected_transport()?;
        let record = self.core.metadata().await?;
        let path = derivation_path(&record)?;
        let public_key = record
            .public_key
            .clone()
            .ok_or_else(|| KeyringError::Corrupted(format!("account {} has no public key", record.id)))?;

        let signature = transport.sign_digest(path, &crypto::digest(message)).await?;
        SignatureBundle::from_delegated(message, signature.to_vec(), public_key)
    }
}
