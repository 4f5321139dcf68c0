//! Custodial accounts signed by a remote MPC service.
//!
//! Unlocking runs the service's approval flow and caches the bearer token.
//! Signing submits a request and polls until the custodian answers, giving up
//! after `LockPolicy::qredo_max_polls` attempts.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::backends::{QredoService, RemoteSignStatus};
use super::base::sealed::HasCore;
use super::base::AccountCore;
use super::capabilities::{SigningAccount, WalletAccount};
use super::secrets::EphemeralSecret;
use super::signature::SignatureBundle;
use super::types::{AccountRecord, AccountType, AccountUpdate, BackendConfig};
use crate::crypto;
use crate::error::{KeyringError, Result};

pub struct QredoAccount {
    core: AccountCore,
}

impl QredoAccount {
    pub(crate) fn new(core: AccountCore) -> Self {
        Self { core }
    }

    fn service(&self) -> Result<&Arc<dyn QredoService>> {
        self.core
            .ctx
            .qredo
            .as_ref()
            .ok_or_else(|| KeyringError::BackendUnavailable("no remote signing service configured".to_string()))
    }

    pub async fn unlock(&self) -> Result<()> {
        self.core.release_stale();
        let service = self.service()?;
        let record = self.core.metadata().await?;
        let (connection_id, wallet_id) = ids(&record)?;

        let token = service.authorize(connection_id).await?;
        if token.expires_at <= self.core.ctx.now() {
            return Err(KeyringError::AuthFailed("remote signer issued an expired token".to_string()));
        }

        let mut update = AccountUpdate::default();
        if record.public_key.is_none() {
            let public_key = service.wallet_public_key(&token.access_token, wallet_id).await?;
            let address = crypto::derive_address(AccountType::Qredo.scheme().flag(), &public_key);
            if public_key.len() != crypto::ED25519_PUBLIC_KEY_LENGTH || address != record.address {
                return Err(KeyringError::Corrupted(format!(
                    "remote wallet {} key does not match account address {}",
                    wallet_id, record.address
                )));
            }
            debug!(account = %record.id, "learned remote wallet public key");
            update = update.with_public_key(public_key);
        }

        let secret = EphemeralSecret::BearerToken {
            token: Zeroizing::new(token.access_token),
            expires_at: token.expires_at,
        };
        self.core.commit_unlock(secret, update).await
    }

    async fn await_signature(&self, service: &dyn QredoService, token: &str, request_id: &str) -> Result<Vec<u8>> {
        let policy = &self.core.ctx.policy;
        let interval = Duration::from_millis(policy.qredo_poll_interval_ms);
        for attempt in 0..policy.qredo_max_polls {
            match service.poll_signature(token, request_id).await? {
                RemoteSignStatus::Signed { signature } => return Ok(signature),
                RemoteSignStatus::Rejected { reason } => {
                    info!(account = %self.core.id(), request_id, "remote signing rejected");
                    return Err(KeyringError::AuthFailed(format!("signing request rejected: {}", reason)));
                }
                RemoteSignStatus::Pending => {
                    debug!(request_id, attempt, "signature pending");
                    tokio::time::sleep(interval).await;
                }
            }
        }
        Err(KeyringError::BackendUnavailable(format!(
            "no answer for signing request {} after {} polls",
            request_id, policy.qredo_max_polls
        )))
    }
}

fn ids(record: &AccountRecord) -> Result<(&str, &str)> {
    match &record.config {
        BackendConfig::Qredo { connection_id, wallet_id } => Ok((connection_id, wallet_id)),
        other => Err(KeyringError::Corrupted(format!(
            "qredo account {} has {} config",
            record.id,
            other.account_type()
        ))),
    }
}

impl HasCore for QredoAccount {
    fn core(&self) -> &AccountCore {
        &self.core
    }
}

impl WalletAccount for QredoAccount {
    fn account_type(&self) -> AccountType {
        AccountType::Qredo
    }
}

#[async_trait]
impl SigningAccount for QredoAccount {
    async fn sign(&self, message: &[u8]) -> Result<SignatureBundle> {
        self.core.ensure_unlocked(true).await?;
        let Some(EphemeralSecret::BearerToken { token, .. }) = self.core.live_secret() else {
            return Err(KeyringError::Locked(self.core.id().to_string()));
        };
        let service = self.service()?;
        let record = self.core.metadata().await?;
        let (_, wallet_id) = ids(&record)?;
        let public_key = record
            .public_key
            .clone()
            .ok_or_else(|| KeyringError::Locked(self.core.id().to_string()))?;

        let request_id = service.submit_signing_request(&token, wallet_id, message).await?;
        let signature = self.await_signature(service.as_ref(), &token, &request_id).await?;
        SignatureBundle::from_delegated(message, signature, public_key)
    }
}
