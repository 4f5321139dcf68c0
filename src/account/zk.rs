//! Zk-login accounts: an OAuth identity plus a user salt, signing through a
//! short-lived ephemeral key that a zero-knowledge proof ties to the account.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

use super::backends::{ZkProofRequest, ZkProver};
use super::base::sealed::HasCore;
use super::base::AccountCore;
use super::capabilities::{SigningAccount, WalletAccount};
use super::secrets::EphemeralSecret;
use super::signature::SignatureBundle;
use super::types::{AccountType, AccountUpdate, BackendConfig};
use crate::crypto::KeyPair;
use crate::error::{KeyringError, Result};

pub struct ZkAccount {
    core: AccountCore,
}

impl ZkAccount {
    pub(crate) fn new(core: AccountCore) -> Self {
        Self { core }
    }

    fn prover(&self) -> Result<&Arc<dyn ZkProver>> {
        self.core
            .ctx
            .zk_prover
            .as_ref()
            .ok_or_else(|| KeyringError::BackendUnavailable("no zk proving service configured".to_string()))
    }

    /// Start a signing session from a fresh OAuth token.
    pub async fn unlock(&self, jwt: &str) -> Result<()> {
        self.core.release_stale();
        let prover = self.prover()?;
        let record = self.core.metadata().await?;
        let BackendConfig::Zk { salt, address_seed, .. } = &record.config else {
            return Err(KeyringError::Corrupted(format!(
                "zk account {} has {} config",
                record.id,
                record.config.account_type()
            )));
        };

        let ephemeral = KeyPair::generate();
        let expires_at = self
            .core
            .ctx
            .now()
            .checked_add_signed(self.core.ctx.policy.zk_session())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let proof = prover
            .prove(ZkProofRequest {
                jwt: jwt.to_string(),
                ephemeral_public_key: ephemeral.public_key_bytes(),
                salt: salt.clone(),
                expires_at: expires_at.timestamp(),
            })
            .await?;
        if proof.address_seed != *address_seed {
            warn!(account = %record.id, "proof is for a different identity");
            return Err(KeyringError::AuthFailed("token does not belong to this account".to_string()));
        }

        let secret = EphemeralSecret::ZkSession {
            ephemeral_key: ephemeral.secret_bytes(),
            proof,
            expires_at,
        };
        self.core.commit_unlock(secret, AccountUpdate::default()).await
    }
}

impl HasCore for ZkAccount {
    fn core(&self) -> &AccountCore {
        &self.core
    }
}

impl WalletAccount for ZkAccount {
    fn account_type(&self) -> AccountType {
        AccountType::Zk
    }
}

#[async_trait]
impl SigningAccount for ZkAccount {
    async fn sign(&self, message: &[u8]) -> Result<SignatureBundle> {
        self.core.ensure_unlocked(true).await?;
        let Some(EphemeralSecret::ZkSession { ephemeral_key, proof, .. }) = self.core.live_secret() else {
            return Err(KeyringError::Locked(self.core.id().to_string()));
        };
        let key_pair = KeyPair::from_secret_bytes(&ephemeral_key[..])?;
        Ok(SignatureBundle::sign_local(&key_pair, message).with_zk_proof(proof))
    }
}
