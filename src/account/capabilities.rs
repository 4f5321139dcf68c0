//! Account contract and the narrower capabilities only some variants have

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use zeroize::Zeroizing;

use super::base::sealed::HasCore;
use super::signature::SignatureBundle;
use super::types::{AccountType, DisplayRecord};
use crate::error::Result;

/// Operations every account provides, whatever its backend.
#[async_trait]
pub trait WalletAccount: HasCore + Send + Sync {
    fn account_type(&self) -> AccountType;

    fn id(&self) -> &str {
        self.core().id()
    }

    /// Revoke signing. With `allow_read = false` the unlock timestamp is
    /// cleared too, hiding the public key. Always emits a status change.
    async fn lock(&self, allow_read: bool) -> Result<()> {
        self.core().commit_lock(allow_read).await
    }

    async fn is_locked(&self) -> Result<bool> {
        self.core().is_locked(self.backend_live()).await
    }

    async fn to_display_record(&self) -> Result<DisplayRecord> {
        self.core().display_record(self.backend_live()).await
    }

    async fn address(&self) -> Result<String> {
        Ok(self.core().metadata().await?.address)
    }

    async fn public_key(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.core().metadata().await?.public_key)
    }

    async fn last_unlocked_on(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.core().metadata().await?.last_unlocked_on)
    }

    /// Whether a signature can be produced right now without another unlock.
    /// Pure: reads only the cached secret, the unlock time stamped on it and
    /// the backend's cheap liveness check. It never consults this instance's
    /// metadata memo, so an unlock through another instance is seen at once.
    fn is_signing_capable(&self) -> bool {
        self.core().signing_ready(self.backend_live())
    }
}

#[async_trait]
pub trait SigningAccount: WalletAccount {
    /// Hash `message` and sign it. Fails with `Locked` while write-locked.
    async fn sign(&self, message: &[u8]) -> Result<SignatureBundle>;
}

#[async_trait]
pub trait PasswordUnlockable: WalletAccount {
    async fn unlock(&self, password: &str) -> Result<()>;

    /// Check a password without changing lock state.
    async fn verify_password(&self, password: &str) -> Result<()>;
}

#[async_trait]
pub trait KeyPairExportable: PasswordUnlockable {
    /// Raw ed25519 secret key, released only against the account password.
    async fn export_key_pair(&self, password: &str) -> Result<Zeroizing<[u8; 32]>>;
}

/// What a caller supplies to unlock an account of unknown type.
#[derive(Clone)]
pub enum UnlockCredential {
    Password(String),
    /// Hardware device approval
    Device,
    /// Remote custodian approval flow
    RemoteApproval,
    /// OAuth token for zk-login
    OAuth { jwt: String },
}

impl UnlockCredential {
    pub fn kind(&self) -> &'static str {
        match self {
            UnlockCredential::Password(_) => "password",
            UnlockCredential::Device => "device",
            UnlockCredential::RemoteApproval => "remote approval",
            UnlockCredential::OAuth { .. } => "oauth",
        }
    }
}

impl std::fmt::Debug for UnlockCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UnlockCredential({})", self.kind())
    }
}
