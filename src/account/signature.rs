//! Signature bundles returned by every signing path
//!
//! Every account type hands back the same shape: a scheme tag, the raw
//! signature and the public key needed to check it. Zk-login bundles also
//! carry the proof that binds the ephemeral key to the account.

use serde::{Deserialize, Serialize};

use crate::crypto::{self, KeyPair, ED25519_PUBLIC_KEY_LENGTH, ED25519_SIGNATURE_LENGTH};
use crate::error::{KeyringError, Result};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureScheme {
    Ed25519,
    ZkLogin,
}

impl SignatureScheme {
    pub fn flag(&self) -> u8 {
        match self {
            SignatureScheme::Ed25519 => 0x00,
            SignatureScheme::ZkLogin => 0x05,
        }
    }

    pub fn from_flag(flag: u8) -> Result<Self> {
        match flag {
            0x00 => Ok(SignatureScheme::Ed25519),
            0x05 => Ok(SignatureScheme::ZkLogin),
            other => Err(KeyringError::Serialization(format!("unknown signature scheme flag {:#04x}", other))),
        }
    }
}

/// Zero-knowledge proof binding an ephemeral key to an OAuth identity
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ZkProof {
    pub proof: Vec<u8>,
    pub address_seed: [u8; 32],
    /// Unix seconds after which the ephemeral key is no longer accepted
    pub expires_at: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SignatureBundle {
    pub scheme: SignatureScheme,
    pub signature: Vec<u8>,
    /// For zk-login this is the ephemeral public key.
    pub public_key: Vec<u8>,
    pub zk_proof: Option<ZkProof>,
}

impl SignatureBundle {
    /// Hash-then-sign with a local key
    pub fn sign_local(key: &KeyPair, message: &[u8]) -> Self {
        let digest = crypto::digest(message);
        Self {
            scheme: SignatureScheme::Ed25519,
            signature: key.sign(&digest).to_bytes().to_vec(),
            public_key: key.public_key_bytes().to_vec(),
            zk_proof: None,
        }
    }

    /// Wrap a signature produced elsewhere (device or remote signer) over the
    /// digest of `message`, rejecting it if it does not verify.
    pub fn from_delegated(message: &[u8], signature: Vec<u8>, public_key: Vec<u8>) -> Result<Self> {
        let bundle = Self {
            scheme: SignatureScheme::Ed25519,
            signature,
            public_key,
            zk_proof: None,
        };
        if !bundle.verify(message) {
            return Err(KeyringError::AuthFailed(
                "delegated signature does not verify against the account public key".to_string(),
            ));
        }
        Ok(bundle)
    }

    /// Attach a zk proof to an ephemeral-key signature
    pub fn with_zk_proof(mut self, proof: ZkProof) -> Self {
        self.scheme = SignatureScheme::ZkLogin;
        self.zk_proof = Some(proof);
        self
    }

    /// Check the signature against the carried public key. The zk proof itself
    /// is validated by the chain, not here.
    pub fn verify(&self, message: &[u8]) -> bool {
        if self.scheme == SignatureScheme::ZkLogin && self.zk_proof.is_none() {
            return false;
        }
        crypto::verify_ed25519(&self.public_key, &crypto::digest(message), &self.signature)
    }

    /// Serialized form consumed by the transaction layer.
    ///
    /// Ed25519: `flag || signature || public_key`.
    /// ZkLogin: `flag || u32 proof len || proof || address_seed || i64 expiry || ed25519 bundle`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + ED25519_SIGNATURE_LENGTH + ED25519_PUBLIC_KEY_LENGTH);
        out.push(self.scheme.flag());
        if let Some(zk) = &self.zk_proof {
            out.extend_from_slice(&(zk.proof.len() as u32).to_be_bytes());
            out.extend_from_slice(&zk.proof);
            out.extend_from_slice(&zk.address_seed);
            out.extend_from_slice(&zk.expires_at.to_be_bytes());
            out.push(SignatureScheme::Ed25519.flag());
        }
        out.extend_from_slice(&self.signature);
        out.extend_from_slice(&self.public_key);
        out
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (&flag, rest) = bytes
            .split_first()
            .ok_or_else(|| KeyringError::Serialization("empty signature".to_string()))?;
        match SignatureScheme::from_flag(flag)? {
            SignatureScheme::Ed25519 => {
                let (signature, public_key) = split_ed25519(rest)?;
                Ok(Self {
                    scheme: SignatureScheme::Ed25519,
                    signature,
                    public_key,
                    zk_proof: None,
                })
            }
            SignatureScheme::ZkLogin => {
                let mut reader = Reader { bytes: rest };
                let proof_len = u32::from_be_bytes(reader.array()?) as usize;
                let proof = reader.take(proof_len)?.to_vec();
                let address_seed: [u8; 32] = reader.array()?;
                let expires_at = i64::from_be_bytes(reader.array()?);
                let inner_flag = reader.array::<1>()?[0];
                if inner_flag != SignatureScheme::Ed25519.flag() {
                    return Err(KeyringError::Serialization("zk bundle must wrap an ed25519 signature".to_string()));
                }
                let (signature, public_key) = split_ed25519(reader.bytes)?;
                Ok(Self {
                    scheme: SignatureScheme::ZkLogin,
                    signature,
                    public_key,
                    zk_proof: Some(ZkProof {
                        proof,
                        address_seed,
                        expires_at,
                    }),
                })
            }
        }
    }
}

fn split_ed25519(bytes: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    if bytes.len() != ED25519_SIGNATURE_LENGTH + ED25519_PUBLIC_KEY_LENGTH {
        return Err(KeyringError::Serialization(format!(
            "ed25519 bundle has length {}",
            bytes.len()
        )));
    }
    let (sig, pk) = bytes.split_at(ED25519_SIGNATURE_LENGTH);
    Ok((sig.to_vec(), pk.to_vec()))
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.bytes.len() < n {
            return Err(KeyringError::Serialization("truncated zk signature".to_string()));
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}
