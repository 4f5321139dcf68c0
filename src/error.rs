use thiserror::Error;

use crate::account::types::AccountId;

#[derive(Error, Debug)]
pub enum KeyringError {
    /// Record store miss. Fatal for the account: storage is corrupted or the
    /// account was deleted underneath us.
    #[error("Account not found: {0}")]
    NotFound(AccountId),
    #[error("Account already exists: {0}")]
    AlreadyExists(String),
    #[error("Account {0} is locked")]
    Locked(AccountId),
    #[error("Authentication failed: {0}")]
    AuthFailed(String),
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("Corrupted account data: {0}")]
    Corrupted(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KeyringError {
    /// Whether the caller can reasonably prompt the user and try again.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            KeyringError::Locked(_) | KeyringError::AuthFailed(_) | KeyringError::BackendUnavailable(_)
        )
    }
}

impl From<sled::Error> for KeyringError {
    fn from(err: sled::Error) -> Self {
        KeyringError::Storage(err.to_string())
    }
}

impl From<bincode::Error> for KeyringError {
    fn from(err: bincode::Error) -> Self {
        KeyringError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KeyringError>;
