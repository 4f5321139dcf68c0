use bip39::{Language, Mnemonic};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha512;
use zeroize::Zeroizing;

use crate::error::{KeyringError, Result};

pub type Blake2b256 = Blake2b<U32>;

pub const ED25519_PUBLIC_KEY_LENGTH: usize = 32;
pub const ED25519_SIGNATURE_LENGTH: usize = 64;

/// Default derivation path for the first ed25519 account of a mnemonic.
pub const DEFAULT_COIN_TYPE: u32 = 784;

const HARDENED_OFFSET: u32 = 0x8000_0000;
const SLIP10_CURVE_KEY: &[u8] = b"ed25519 seed";

/// 32-byte digest used for both addresses and message hashing.
pub fn digest(data: &[u8]) -> [u8; 32] {
    Blake2b256::digest(data).into()
}

/// Address of a public key under a given scheme flag, hex with `0x` prefix.
pub fn derive_address(scheme_flag: u8, public_key: &[u8]) -> String {
    let mut hasher = Blake2b256::new();
    hasher.update([scheme_flag]);
    hasher.update(public_key);
    let hash: [u8; 32] = hasher.finalize().into();
    format!("0x{}", hex::encode(hash))
}

/// Standard path for account `index`: m/44'/784'/{index}'/0'/0'
pub fn derivation_path(index: u32) -> String {
    format!("m/44'/{}'/{}'/0'/0'", DEFAULT_COIN_TYPE, index)
}

/// Ed25519 key pair. The secret half is zeroized by dalek on drop.
pub struct KeyPair {
    pub signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a fresh random key pair
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        KeyPair {
            signing_key: SigningKey::generate(&mut csprng),
        }
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let secret: [u8; 32] = bytes
            .try_into()
            .map_err(|_| KeyringError::Corrupted(format!("expected 32-byte secret key, got {}", bytes.len())))?;
        Ok(KeyPair {
            signing_key: SigningKey::from_bytes(&secret),
        })
    }

    /// Generate a new 24-word mnemonic and return its entropy alongside it.
    pub fn generate_mnemonic() -> Result<(Mnemonic, Zeroizing<Vec<u8>>)> {
        let mut entropy = Zeroizing::new(vec![0u8; 32]); // 256 bits = 24 words
        OsRng.fill_bytes(&mut entropy);
        let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy)
            .map_err(|e| KeyringError::Corrupted(format!("mnemonic generation: {}", e)))?;
        Ok((mnemonic, entropy))
    }

    /// Parse a user-supplied phrase. A bad phrase is the caller's mistake, so
    /// it reports as an authentication failure rather than corruption.
    pub fn parse_mnemonic(phrase: &str) -> Result<Mnemonic> {
        Mnemonic::parse_in_normalized(Language::English, phrase)
            .map_err(|e| KeyringError::AuthFailed(format!("Invalid mnemonic: {}", e)))
    }

    /// Derive the child key at `path` from mnemonic entropy.
    pub fn from_entropy(entropy: &[u8], path: &str) -> Result<Self> {
        let mnemonic = Mnemonic::from_entropy_in(Language::English, entropy)
            .map_err(|e| KeyringError::Corrupted(format!("stored entropy is invalid: {}", e)))?;
        let seed = Zeroizing::new(mnemonic.to_seed(""));
        let secret = derive_ed25519_key(&seed[..], path)?;
        Self::from_secret_bytes(&secret[..])
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.public_key().to_bytes()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    pub fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }
}

/// Verify a raw ed25519 signature over `message` with a public key.
pub fn verify_ed25519(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let (Ok(pk), Ok(sig)) = (
        <[u8; ED25519_PUBLIC_KEY_LENGTH]>::try_from(public_key),
        <[u8; ED25519_SIGNATURE_LENGTH]>::try_from(signature),
    ) else {
        return false;
    };
    match VerifyingKey::from_bytes(&pk) {
        Ok(key) => key.verify(message, &Signature::from_bytes(&sig)).is_ok(),
        Err(_) => false,
    }
}

/// SLIP-10 ed25519 derivation. Only hardened segments exist for this curve.
pub fn derive_ed25519_key(seed: &[u8], path: &str) -> Result<Zeroizing<[u8; 32]>> {
    let indices = parse_path(path)?;

    let (mut key, mut chain_code) = hmac_split(SLIP10_CURVE_KEY, &[seed])?;
    for index in indices {
        let (k, c) = hmac_split(&chain_code[..], &[&[0u8][..], &key[..], &index.to_be_bytes()[..]])?;
        key = k;
        chain_code = c;
    }
    Ok(key)
}

fn parse_path(path: &str) -> Result<Vec<u32>> {
    let mut segments = path.split('/');
    if segments.next() != Some("m") {
        return Err(KeyringError::Corrupted(format!("derivation path must start with m/: {}", path)));
    }
    segments
        .map(|segment| {
            let raw = segment
                .strip_suffix('\'')
                .ok_or_else(|| KeyringError::Corrupted(format!("non-hardened segment in {}", path)))?;
            let index: u32 = raw
                .parse()
                .map_err(|_| KeyringError::Corrupted(format!("bad path segment {:?} in {}", segment, path)))?;
            if index >= HARDENED_OFFSET {
                return Err(KeyringError::Corrupted(format!("path index out of range in {}", path)));
            }
            Ok(index | HARDENED_OFFSET)
        })
        .collect()
}

fn hmac_split(key: &[u8], parts: &[&[u8]]) -> Result<(Zeroizing<[u8; 32]>, Zeroizing<[u8; 32]>)> {
    let mut mac = <Hmac<Sha512> as Mac>::new_from_slice(key)
        .map_err(|e| KeyringError::Corrupted(format!("hmac key: {}", e)))?;
    for part in parts {
        mac.update(part);
    }
    let mut out = Zeroizing::new([0u8; 64]);
    out.copy_from_slice(&mac.finalize().into_bytes());
    let mut left = Zeroizing::new([0u8; 32]);
    let mut right = Zeroizing::new([0u8; 32]);
    left.copy_from_slice(&out[..32]);
    right.copy_from_slice(&out[32..]);
    Ok((left, right))
}

#[cfg(test)]
mod tests {
    use super::*;

    // SLIP-0010 test vector 1 for ed25519
    const SEED: &str = "000102030405060708090a0b0c0d0e0f";

    #[test]
    fn test_slip10_master_key() {
        let seed = hex::decode(SEED).unwrap();
        let key = derive_ed25519_key(&seed, "m").unwrap();
        assert_eq!(
            hex::encode(&key[..]),
            "2b4be7f19ee27bbf30c667b642d5f4aa69fd169872f8fc3059c08ebae2eb19e7"
        );
    }

    #[test]
    fn test_slip10_hardened_child() {
        let seed = hex::decode(SEED).unwrap();
        let key = derive_ed25519_key(&seed, "m/0'").unwrap();
        assert_eq!(
            hex::encode(&key[..]),
            "68e0fe46dfb67e368c75379acec591dad19df3cde26e63b93a8e704f1dade7a3"
        );
    }

    #[test]
    fn test_rejects_non_hardened_path() {
        let seed = hex::decode(SEED).unwrap();
        assert!(matches!(
            derive_ed25519_key(&seed, "m/44'/784'/0'/0/0"),
            Err(KeyringError::Corrupted(_))
        ));
        assert!(derive_ed25519_key(&seed, "44'/784'").is_err());
    }

    #[test]
    fn test_mnemonic_derivation_is_stable() {
        let (_, entropy) = KeyPair::generate_mnemonic().unwrap();
        let a = KeyPair::from_entropy(&entropy, &derivation_path(0)).unwrap();
        let b = KeyPair::from_entropy(&entropy, &derivation_path(0)).unwrap();
        let c = KeyPair::from_entropy(&entropy, &derivation_path(1)).unwrap();
        assert_eq!(a.public_key_bytes(), b.public_key_bytes());
        assert_ne!(a.public_key_bytes(), c.public_key_bytes());
    }

    #[test]
    fn test_sign_and_verify() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"hello");
        assert!(verify_ed25519(&kp.public_key_bytes(), b"hello", &sig.to_bytes()));
        assert!(!verify_ed25519(&kp.public_key_bytes(), b"other", &sig.to_bytes()));
        assert!(!verify_ed25519(&[0u8; 3], b"hello", &sig.to_bytes()));
    }

    #[test]
    fn test_address_depends_on_flag() {
        let kp = KeyPair::generate();
        let a = derive_address(0x00, &kp.public_key_bytes());
        let b = derive_address(0x05, &kp.public_key_bytes());
        assert!(a.starts_with("0x"));
        assert_eq!(a.len(), 66);
        assert_ne!(a, b);
    }
}
