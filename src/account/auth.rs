//! Password-based encryption of account secrets

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::Argon2;
use hmac::Hmac;
use pbkdf2::pbkdf2;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::config::KdfConfig;
use crate::error::{KeyringError, Result};

const NONCE_LEN: usize = 12;
const SALT_LEN: usize = 16;

/// Key derivation function recorded alongside each ciphertext
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub enum Kdf {
    Pbkdf2Sha256 { iterations: u32 },
    Argon2id,
}

impl Kdf {
    pub fn from_config(config: &KdfConfig) -> Self {
        if config.use_argon2 {
            Kdf::Argon2id
        } else {
            Kdf::Pbkdf2Sha256 {
                iterations: config.pbkdf2_iterations,
            }
        }
    }

    /// Derive an AES-256 key from a password and salt
    fn derive_key(&self, password: &str, salt: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
        let mut key = Zeroizing::new([0u8; 32]);
        match self {
            Kdf::Pbkdf2Sha256 { iterations } => {
                pbkdf2::<Hmac<Sha256>>(password.as_bytes(), salt, *iterations, &mut key[..]);
            }
            Kdf::Argon2id => {
                Argon2::default()
                    .hash_password_into(password.as_bytes(), salt, &mut key[..])
                    .map_err(|e| KeyringError::Corrupted(format!("argon2: {}", e)))?;
            }
        }
        Ok(key)
    }
}

/// AES-256-GCM ciphertext with the nonce prepended, plus its KDF parameters.
#[derive(Serialize, Deserialize, Clone, PartialEq)]
pub struct EncryptedBlob {
    pub kdf: Kdf,
    pub salt: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

impl std::fmt::Debug for EncryptedBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedBlob")
            .field("kdf", &self.kdf)
            .field("ciphertext", &format!("<{} bytes>", self.ciphertext.len()))
            .finish()
    }
}

impl EncryptedBlob {
    /// Encrypt `data` under `password` with a fresh salt and nonce
    pub fn seal(data: &[u8], password: &str, kdf: Kdf) -> Result<Self> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);

        let key = kdf.derive_key(password, &salt)?;
        let cipher = Aes256Gcm::new_from_slice(&key[..])
            .map_err(|_| KeyringError::Corrupted("invalid AES key length".to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, data)
            .map_err(|e| KeyringError::Corrupted(format!("Encryption failure: {:?}", e)))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);

        Ok(Self {
            kdf,
            salt: salt.to_vec(),
            ciphertext: blob,
        })
    }

    /// Decrypt with `password`. A wrong password fails the GCM tag check and
    /// reports `AuthFailed`.
    pub fn open(&self, password: &str) -> Result<Zeroizing<Vec<u8>>> {
        if self.ciphertext.len() < NONCE_LEN {
            return Err(KeyringError::Corrupted("Invalid blob size".to_string()));
        }

        let key = self.kdf.derive_key(password, &self.salt)?;
        let cipher = Aes256Gcm::new_from_slice(&key[..])
            .map_err(|_| KeyringError::Corrupted("invalid AES key length".to_string()))?;

        let nonce = Nonce::from_slice(&self.ciphertext[..NONCE_LEN]);
        let plaintext = cipher
            .decrypt(nonce, &self.ciphertext[NONCE_LEN..])
            .map_err(|_| KeyringError::AuthFailed("Wrong password".to_string()))?;
        Ok(Zeroizing::new(plaintext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: Kdf = Kdf::Pbkdf2Sha256 { iterations: 1_000 };

    #[test]
    fn test_encryption() {
        let data = b"sensitive data";
        let blob = EncryptedBlob::seal(data, "encryption_password", FAST).unwrap();
        let decrypted = blob.open("encryption_password").unwrap();
        assert_eq!(&data[..], &decrypted[..]);
    }

    #[test]
    fn test_wrong_password_is_auth_failure() {
        let blob = EncryptedBlob::seal(b"secret", "right", FAST).unwrap();
        assert!(matches!(blob.open("wrong"), Err(KeyringError::AuthFailed(_))));
    }

    #[test]
    fn test_argon2_blob() {
        let blob = EncryptedBlob::seal(b"secret", "pw", Kdf::Argon2id).unwrap();
        assert_eq!(blob.kdf, Kdf::Argon2id);
        assert_eq!(&blob.open("pw").unwrap()[..], b"secret");
    }

    #[test]
    fn test_truncated_blob_is_corrupted() {
        let mut blob = EncryptedBlob::seal(b"secret", "pw", FAST).unwrap();
        blob.ciphertext.truncate(4);
        assert!(matches!(blob.open("pw"), Err(KeyringError::Corrupted(_))));
    }

    #[test]
    fn test_debug_hides_ciphertext() {
        let blob = EncryptedBlob::seal(b"secret", "pw", FAST).unwrap();
        let rendered = format!("{:?}", blob);
        assert!(rendered.contains("bytes>"));
        assert!(!rendered.contains(&format!("{:?}", blob.ciphertext)));
    }
}
