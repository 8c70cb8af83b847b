//! confidential computation client
//!
//! the service that builds encrypted inputs (ciphertext handle + proof of
//! well-formedness) and decrypts handles under a signed authorization. both
//! operations are opaque: this crate never sees how ciphertexts are built.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Result, TrackError};
use crate::signature::DecryptionSignature;
use crate::types::EncryptedHandle;

/// an encrypted input ready for submission: one handle per appended value
/// plus a single proof covering all of them
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedInput {
    pub handles: Vec<EncryptedHandle>,
    pub input_proof: String,
}

/// one handle to decrypt, together with its owning contract
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptRequest {
    pub handle: EncryptedHandle,
    pub contract_address: String,
}

#[async_trait]
pub trait ConfidentialClient: Send + Sync {
    /// is the service usable right now?
    fn is_ready(&self) -> bool;

    /// encrypt `values` bound to (contract, user), returning handles + proof
    async fn encrypt_input(
        &self,
        contract: &str,
        user: &str,
        values: &[u32],
    ) -> Result<EncryptedInput>;

    /// decrypt handles under a signed authorization; the returned map is
    /// keyed by handle hex
    async fn user_decrypt(
        &self,
        requests: &[DecryptRequest],
        signature: &DecryptionSignature,
    ) -> Result<HashMap<String, u64>>;
}

/// builder over [`ConfidentialClient::encrypt_input`], mirroring the
/// create-input / add / encrypt call shape of the service API
pub struct EncryptedInputBuilder<'a> {
    client: &'a dyn ConfidentialClient,
    contract: String,
    user: String,
    values: Vec<u32>,
}

impl<'a> EncryptedInputBuilder<'a> {
    pub fn add_u32(mut self, value: u32) -> Self {
        self.values.push(value);
        self
    }

    pub async fn encrypt(self) -> Result<EncryptedInput> {
        self.client
            .encrypt_input(&self.contract, &self.user, &self.values)
            .await
    }
}

/// start building an encrypted input bound to (contract, user)
pub fn create_encrypted_input<'a>(
    client: &'a dyn ConfidentialClient,
    contract: &str,
    user: &str,
) -> EncryptedInputBuilder<'a> {
    EncryptedInputBuilder {
        client,
        contract: contract.to_string(),
        user: user.to_string(),
        values: Vec::new(),
    }
}

/// http client for a confidential computation relayer
pub struct HttpRelayerClient {
    http: reqwest::Client,
    base: String,
}

impl HttpRelayerClient {
    pub fn new(base: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { http, base: base.into() })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EncryptInputRequest<'a> {
    contract_address: &'a str,
    user_address: &'a str,
    values: &'a [u32],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserDecryptRequest<'a> {
    requests: &'a [DecryptRequest],
    public_key: &'a str,
    signature: &'a str,
    contract_addresses: &'a [String],
    user_address: &'a str,
    start_timestamp: u64,
    duration_days: u64,
}

#[derive(Deserialize)]
struct UserDecryptResponse {
    plaintexts: HashMap<String, u64>,
}

#[async_trait]
impl ConfidentialClient for HttpRelayerClient {
    fn is_ready(&self) -> bool {
        true
    }

    async fn encrypt_input(
        &self,
        contract: &str,
        user: &str,
        values: &[u32],
    ) -> Result<EncryptedInput> {
        let request = EncryptInputRequest {
            contract_address: contract,
            user_address: user,
            values,
        };

        let response = self
            .http
            .post(format!("{}/v1/encrypt-input", self.base))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TrackError::Encryption(format!("relayer {status}: {body}")));
        }

        Ok(response.json().await?)
    }

    async fn user_decrypt(
        &self,
        requests: &[DecryptRequest],
        signature: &DecryptionSignature,
    ) -> Result<HashMap<String, u64>> {
        let request = UserDecryptRequest {
            requests,
            public_key: &signature.public_key,
            signature: &signature.signature,
            contract_addresses: &signature.contract_addresses,
            user_address: &signature.user_address,
            start_timestamp: signature.start_timestamp,
            duration_days: signature.duration_days,
        };

        let response = self
            .http
            .post(format!("{}/v1/user-decrypt", self.base))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TrackError::Decryption(format!("relayer {status}: {body}")));
        }

        let decoded: UserDecryptResponse = response.json().await?;
        Ok(decoded.plaintexts)
    }
}
