//! decryption authorization and its cache
//!
//! a signed authorization lets the confidential computation service decrypt
//! handles owned by a contract set on behalf of one user, inside a validity
//! window. signing is interactive, so the result is cached and reused until
//! it expires or the (user, contract-set) key changes.

use ed25519_dalek::SigningKey;
use parking_lot::RwLock;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::error::{Result, TrackError};
use crate::signer::{same_address, WalletSigner};
use crate::types::{unix_now, DAY_SECONDS};

/// default authorization lifetime
pub const SIGNATURE_VALIDITY_DAYS: u64 = 365;

/// signed, time-bounded decryption authorization
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptionSignature {
    /// ephemeral secret the decryption response is bound to (hex)
    pub private_key: String,
    /// ephemeral public key shared with the service (hex)
    pub public_key: String,
    /// wallet signature over the authorization payload (hex)
    pub signature: String,
    /// contracts this authorization may decrypt for
    pub contract_addresses: Vec<String>,
    pub user_address: String,
    pub start_timestamp: u64,
    pub duration_days: u64,
}

impl DecryptionSignature {
    /// still inside the validity window at `now`?
    pub fn is_valid_at(&self, now: u64) -> bool {
        let end = self
            .start_timestamp
            .saturating_add(self.duration_days.saturating_mul(DAY_SECONDS));
        now >= self.start_timestamp && now < end
    }

    /// may this authorization decrypt handles owned by `contract`?
    pub fn covers(&self, contract: &str) -> bool {
        self.contract_addresses
            .iter()
            .any(|c| same_address(c, contract))
    }

    /// load a cached authorization or sign a fresh one
    ///
    /// at most one interactive signature prompt per validity window: a cache
    /// hit that is still valid and covers the requested contract set is
    /// reused without touching the signer
    pub async fn load_or_sign(
        contracts: &[String],
        signer: &dyn WalletSigner,
        storage: &dyn SignatureStorage,
    ) -> Result<Self> {
        let user = signer.address();
        let mut sorted: Vec<String> = contracts.iter().map(|c| c.to_lowercase()).collect();
        sorted.sort();
        sorted.dedup();

        let key = storage_key(&user, &sorted);
        let now = unix_now();

        if let Some(cached) = storage.get(&key) {
            match serde_json::from_str::<DecryptionSignature>(&cached) {
                Ok(sig)
                    if same_address(&sig.user_address, &user)
                        && sig.is_valid_at(now)
                        && sorted.iter().all(|c| sig.covers(c)) =>
                {
                    debug!(user = %user, "reusing cached decryption signature");
                    return Ok(sig);
                }
                Ok(_) => debug!("cached decryption signature expired or mismatched"),
                Err(e) => debug!("cached decryption signature unreadable: {e}"),
            }
        }

        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        let ephemeral = SigningKey::from_bytes(&secret);
        let public_key = format!("0x{}", hex::encode(ephemeral.verifying_key().as_bytes()));
        let private_key = format!("0x{}", hex::encode(ephemeral.to_bytes()));

        let payload = authorization_payload(&user, &sorted, &public_key, now, SIGNATURE_VALIDITY_DAYS);
        let signature = signer
            .sign(&payload)
            .await
            .map_err(|e| TrackError::Signature(e.to_string()))?;

        let sig = DecryptionSignature {
            private_key,
            public_key,
            signature: format!("0x{}", hex::encode(signature)),
            contract_addresses: sorted,
            user_address: user,
            start_timestamp: now,
            duration_days: SIGNATURE_VALIDITY_DAYS,
        };

        match serde_json::to_string(&sig) {
            Ok(json) => storage.put(&key, json),
            Err(e) => debug!("could not cache decryption signature: {e}"),
        }

        Ok(sig)
    }
}

/// the payload the wallet signs: binds user, contract set, ephemeral key
/// and validity window under a fixed domain tag
fn authorization_payload(
    user: &str,
    contracts: &[String],
    public_key: &str,
    start: u64,
    duration_days: u64,
) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(b"solartrack.user-decrypt.v1");
    payload.extend_from_slice(user.as_bytes());
    for contract in contracts {
        payload.extend_from_slice(contract.as_bytes());
    }
    payload.extend_from_slice(public_key.as_bytes());
    payload.extend_from_slice(&start.to_le_bytes());
    payload.extend_from_slice(&duration_days.to_le_bytes());
    payload
}

/// cache key: domain-separated hash of (user, sorted contract set)
fn storage_key(user: &str, contracts: &[String]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"solartrack.decrypt-sig.v1");
    hasher.update(user.to_lowercase().as_bytes());
    for contract in contracts {
        hasher.update(contract.as_bytes());
    }
    hex::encode(hasher.finalize().as_bytes())
}

/// pluggable persistence for cached authorizations
pub trait SignatureStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: String);
}

/// in-memory storage, the default for tests and short-lived sessions
#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SignatureStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn put(&self, key: &str, value: String) {
        self.entries.write().insert(key.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::LocalSigner;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// signer that counts how often it is asked to sign
    struct CountingSigner {
        inner: LocalSigner,
        calls: AtomicUsize,
    }

    impl CountingSigner {
        fn new() -> Self {
            Self { inner: LocalSigner::generate(), calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait::async_trait]
    impl WalletSigner for CountingSigner {
        fn address(&self) -> String {
            self.inner.address()
        }

        async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.sign(payload).await
        }
    }

    #[tokio::test]
    async fn test_sign_once_then_reuse() {
        let signer = CountingSigner::new();
        let storage = MemoryStorage::new();
        let contracts = vec!["0xAbCd000000000000000000000000000000000001".to_string()];

        let first = DecryptionSignature::load_or_sign(&contracts, &signer, &storage)
            .await
            .unwrap();
        let second = DecryptionSignature::load_or_sign(&contracts, &signer, &storage)
            .await
            .unwrap();

        assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.signature, second.signature);
        assert_eq!(first.public_key, second.public_key);
    }

    #[tokio::test]
    async fn test_contract_set_change_resigns() {
        let signer = CountingSigner::new();
        let storage = MemoryStorage::new();

        let a = vec!["0x0000000000000000000000000000000000000001".to_string()];
        let b = vec!["0x0000000000000000000000000000000000000002".to_string()];

        DecryptionSignature::load_or_sign(&a, &signer, &storage).await.unwrap();
        DecryptionSignature::load_or_sign(&b, &signer, &storage).await.unwrap();

        assert_eq!(signer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_authorization_covers_contract_set() {
        let signer = CountingSigner::new();
        let storage = MemoryStorage::new();
        let contract = "0x0000000000000000000000000000000000000003".to_string();

        let sig = DecryptionSignature::load_or_sign(
            &[contract.clone()],
            &signer,
            &storage,
        )
        .await
        .unwrap();

        assert!(sig.covers(&contract));
        assert!(sig.covers(&contract.to_uppercase().replace("0X", "0x")));
        assert!(!sig.covers("0x0000000000000000000000000000000000000004"));
        assert!(sig.is_valid_at(unix_now()));
        assert!(!sig.is_valid_at(sig.start_timestamp + (sig.duration_days + 1) * DAY_SECONDS));
    }
}
