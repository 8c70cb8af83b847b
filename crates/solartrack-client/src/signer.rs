//! minimal signer seam
//!
//! the engine only needs an account identity and a detached signature over
//! an authorization payload; wallet plumbing lives outside this crate

use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey};
use rand::RngCore;

use crate::error::{Result, TrackError};

/// identity + signing capability for the connected account
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// account address of this signer
    fn address(&self) -> String;

    /// detached signature over an arbitrary payload
    async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>>;
}

/// local ed25519 signer backed by an in-memory keypair
pub struct LocalSigner {
    key: SigningKey,
    address: String,
}

impl LocalSigner {
    pub fn new(key: SigningKey) -> Self {
        let address = derive_address(key.verifying_key().as_bytes());
        Self { key, address }
    }

    /// fresh random keypair
    pub fn generate() -> Self {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self::new(SigningKey::from_bytes(&secret))
    }

    /// load from a 32-byte hex secret
    pub fn from_hex(secret_hex: &str) -> Result<Self> {
        let raw = secret_hex.trim();
        let raw = raw.strip_prefix("0x").unwrap_or(raw);
        let bytes = hex::decode(raw)
            .map_err(|e| TrackError::Signature(format!("bad key hex: {e}")))?;
        let secret: [u8; 32] = bytes
            .try_into()
            .map_err(|_| TrackError::Signature("key must be 32 bytes".into()))?;
        Ok(Self::new(SigningKey::from_bytes(&secret)))
    }

    pub fn secret_hex(&self) -> String {
        format!("0x{}", hex::encode(self.key.to_bytes()))
    }
}

#[async_trait]
impl WalletSigner for LocalSigner {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>> {
        Ok(self.key.sign(payload).to_bytes().to_vec())
    }
}

/// account address: truncated domain-separated hash of the public key
fn derive_address(pubkey: &[u8; 32]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"solartrack.address.v1");
    hasher.update(pubkey);
    let hash = hasher.finalize();
    format!("0x{}", hex::encode(&hash.as_bytes()[..20]))
}

/// address comparison, case-insensitive on the hex part
pub fn same_address(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}
