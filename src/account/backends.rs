//! Seams to the external signers: hardware device, remote custodian and
//! zk-login prover. Their wire protocols live behind these traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::signature::ZkProof;
use crate::error::Result;

/// Connection to a hardware signing device
#[async_trait]
pub trait LedgerTransport: Send + Sync {
    /// Cheap liveness check; must not talk to the device.
    fn is_connected(&self) -> bool;
    /// Identifier of the currently attached device, if any.
    fn device_id(&self) -> Option<String>;
    async fn public_key(&self, derivation_path: &str) -> Result<[u8; 32]>;
    /// Sign a 32-byte digest on the device. Requires user approval there.
    async fn sign_digest(&self, derivation_path: &str, digest: &[u8; 32]) -> Result<[u8; 64]>;
}

#[derive(Clone, Debug)]
pub struct QredoToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RemoteSignStatus {
    Pending,
    /// Ed25519 signature over the digest of the submitted message
    Signed { signature: Vec<u8> },
    Rejected { reason: String },
}

/// Remote MPC/custodial signing service
#[async_trait]
pub trait QredoService: Send + Sync {
    /// Complete the approval flow for a connection and obtain a session token.
    async fn authorize(&self, connection_id: &str) -> Result<QredoToken>;
    async fn wallet_public_key(&self, token: &str, wallet_id: &str) -> Result<Vec<u8>>;
    /// Returns a request id to poll.
    async fn submit_signing_request(&self, token: &str, wallet_id: &str, message: &[u8]) -> Result<String>;
    async fn poll_signature(&self, token: &str, request_id: &str) -> Result<RemoteSignStatus>;
}

#[derive(Clone, Debug)]
pub struct ZkProofRequest {
    pub jwt: String,
    pub ephemeral_public_key: [u8; 32],
    pub salt: Vec<u8>,
    /// Unix seconds; the proof is only valid until then
    pub expires_at: i64,
}

/// Produces zk-login proofs binding an ephemeral key to an OAuth token
#[async_trait]
pub trait ZkProver: Send + Sync {
    async fn prove(&self, request: ZkProofRequest) -> Result<ZkProof>;
}
