use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{KeyringError, Result};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct KeyringConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub lock: LockPolicy,
    #[serde(default)]
    pub kdf: KdfConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    pub db_path: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "./data/accounts".to_string(),
            log_level: default_log_level(),
        }
    }
}

/// Time bounds on how long an unlocked account stays usable.
///
/// Checked against the clock whenever lock state is queried; nothing runs in
/// the background.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LockPolicy {
    /// Minutes after `last_unlocked_on` at which signing requires a new unlock.
    #[serde(default)]
    pub auto_lock_minutes: Option<u64>,
    /// Minutes after `last_unlocked_on` during which the public key may still
    /// be displayed. Never shorter than `auto_lock_minutes`.
    #[serde(default)]
    pub read_grace_minutes: Option<u64>,
    #[serde(default = "default_zk_session_minutes")]
    pub zk_session_minutes: u64,
    #[serde(default = "default_qredo_poll_interval_ms")]
    pub qredo_poll_interval_ms: u64,
    #[serde(default = "default_qredo_max_polls")]
    pub qredo_max_polls: u32,
}

fn default_zk_session_minutes() -> u64 {
    30
}

fn default_qredo_poll_interval_ms() -> u64 {
    1000
}

fn default_qredo_max_polls() -> u32 {
    120
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            auto_lock_minutes: Some(60),
            read_grace_minutes: Some(24 * 60),
            zk_session_minutes: default_zk_session_minutes(),
            qredo_poll_interval_ms: default_qredo_poll_interval_ms(),
            qredo_max_polls: default_qredo_max_polls(),
        }
    }
}

impl LockPolicy {
    pub fn validate(&self) -> Result<()> {
        match (self.auto_lock_minutes, self.read_grace_minutes) {
            (Some(auto), Some(grace)) if grace < auto => Err(KeyringError::Config(format!(
                "read_grace_minutes ({}) must not be shorter than auto_lock_minutes ({})",
                grace, auto
            ))),
            (None, Some(_)) => Err(KeyringError::Config(
                "read_grace_minutes requires auto_lock_minutes".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn auto_lock(&self) -> Option<chrono::Duration> {
        self.auto_lock_minutes.map(minutes)
    }

    pub fn read_grace(&self) -> Option<chrono::Duration> {
        self.read_grace_minutes.map(minutes)
    }

    pub fn zk_session(&self) -> chrono::Duration {
        minutes(self.zk_session_minutes)
    }
}

fn minutes(m: u64) -> chrono::Duration {
    i64::try_from(m)
        .ok()
        .and_then(chrono::Duration::try_minutes)
        .unwrap_or(chrono::Duration::MAX)
}

/// Key derivation parameters for newly encrypted secrets. Existing blobs keep
/// the parameters they were written with.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct KdfConfig {
    #[serde(default = "default_pbkdf2_iterations")]
    pub pbkdf2_iterations: u32,
    #[serde(default)]
    pub use_argon2: bool,
}

fn default_pbkdf2_iterations() -> u32 {
    100_000
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: default_pbkdf2_iterations(),
            use_argon2: false,
        }
    }
}

impl KeyringConfig {
    pub fn from_toml(s: &str) -> Result<Self> {
        let config: KeyringConfig =
            toml::from_str(s).map_err(|e| KeyringError::Config(format!("Error parsing config: {}", e)))?;
        config.lock.validate()?;
        Ok(config)
    }

    /// Load the config at `path`, writing the defaults there if it is missing.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if std::path::Path::new(path).exists() {
            let s = std::fs::read_to_string(path)
                .map_err(|e| KeyringError::Config(format!("Error reading config {}: {}", path, e)))?;
            let config = Self::from_toml(&s)?;
            info!("Config loaded from {}", path);
            Ok(config)
        } else {
            info!("Config file not found at '{}'. Creating default.", path);
            let config = Self::default();
            match toml::to_string_pretty(&config) {
                Ok(s) => {
                    if let Err(e) = std::fs::write(path, s) {
                        warn!("Could not write default config to {}: {}", path, e);
                    }
                }
                Err(e) => warn!("Could not serialize default config: {}", e),
            }
            Ok(config)
        }
    }
}
