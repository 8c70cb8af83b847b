//! ledger client
//!
//! read/write access to the usage-tracking contract, consumed through a
//! trait so the engine can run against the http gateway or test fakes

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, TrackError};
use crate::types::{EncryptedHandle, SubmissionRecord};

/// a submitted, not yet confirmed transaction
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTx {
    pub tx_hash: String,
}

/// terminal inclusion status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Success,
    Failed,
}

/// confirmed transaction receipt
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub status: TxStatus,
}

/// the contract surface the engine consumes
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn submit_usage(
        &self,
        handle: &EncryptedHandle,
        input_proof: &str,
        note_reference: &str,
    ) -> Result<PendingTx>;

    async fn estimate_submit_gas(
        &self,
        handle: &EncryptedHandle,
        input_proof: &str,
        note_reference: &str,
    ) -> Result<u64>;

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TxReceipt>;

    async fn get_user_total_handle(&self, address: &str) -> Result<EncryptedHandle>;

    async fn get_global_total_handle(&self) -> Result<EncryptedHandle>;

    async fn get_total_users(&self) -> Result<u64>;

    async fn has_submitted_today(&self, address: &str) -> Result<bool>;

    async fn get_all_users(&self) -> Result<Vec<String>>;

    async fn get_user_submission_count(&self, address: &str) -> Result<u64>;

    async fn get_user_record(&self, address: &str, day_key: u64) -> Result<SubmissionRecord>;

    async fn has_badge(&self, address: &str, badge_id: u8) -> Result<bool>;

    async fn claim_badge(&self, badge_id: u8) -> Result<PendingTx>;

    /// deployed bytecode at an address, "0x" when none
    async fn get_code(&self, address: &str) -> Result<String>;
}

/// is a get_code result "no contract here"?
pub fn code_is_empty(code: &str) -> bool {
    matches!(code.trim(), "" | "0x" | "0x0")
}

/// http client for the ledger gateway, bound to one contract and one
/// sending account
pub struct HttpLedgerClient {
    http: reqwest::Client,
    base: String,
    contract: String,
    from: String,
    receipt_poll: Duration,
    receipt_timeout: Duration,
}

impl HttpLedgerClient {
    pub fn new(
        base: impl Into<String>,
        contract: impl Into<String>,
        from: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base: base.into(),
            contract: contract.into(),
            from: from.into(),
            receipt_poll: Duration::from_secs(2),
            receipt_timeout: Duration::from_secs(timeout_secs.max(60)),
        })
    }

    fn contract_url(&self, path: &str) -> String {
        format!("{}/contract/{}/{}", self.base, self.contract, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T> {
        debug!(%url, "ledger get");
        let response = self.http.get(&url).send().await?;
        let response = check_response(response).await?;
        Ok(response.json().await?)
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        body: &B,
    ) -> Result<T> {
        debug!(%url, "ledger post");
        let response = self.http.post(&url).json(body).send().await?;
        let response = check_response(response).await?;
        Ok(response.json().await?)
    }
}

/// gateway error body: `{"error": {"message": ..., "data": ...}}`
#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: Option<String>,
    data: Option<String>,
}

/// map non-success gateway responses to the error taxonomy, preserving
/// structured revert payloads for later classification
async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    if let Ok(body) = serde_json::from_str::<ErrorBody>(&text) {
        return Err(TrackError::Reverted {
            message: body.error.message,
            data: body.error.data,
        });
    }
    Err(TrackError::Transport(format!("gateway {status}: {text}")))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBody<'a> {
    from: &'a str,
    handle: &'a EncryptedHandle,
    input_proof: &'a str,
    note_reference: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClaimBadgeBody<'a> {
    from: &'a str,
    badge_id: u8,
}

#[derive(Deserialize)]
struct HandleResponse {
    handle: EncryptedHandle,
}

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Deserialize)]
struct BoolResponse {
    value: bool,
}

#[derive(Deserialize)]
struct UsersResponse {
    users: Vec<String>,
}

#[derive(Deserialize)]
struct GasResponse {
    gas: u64,
}

#[derive(Deserialize)]
struct CodeResponse {
    code: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptResponse {
    tx_hash: String,
    block_number: Option<u64>,
    /// 1 success, 0 failed, absent while pending
    status: Option<u64>,
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn submit_usage(
        &self,
        handle: &EncryptedHandle,
        input_proof: &str,
        note_reference: &str,
    ) -> Result<PendingTx> {
        let body = SubmitBody {
            from: &self.from,
            handle,
            input_proof,
            note_reference,
        };
        self.post_json(self.contract_url("submit-usage"), &body).await
    }

    async fn estimate_submit_gas(
        &self,
        handle: &EncryptedHandle,
        input_proof: &str,
        note_reference: &str,
    ) -> Result<u64> {
        let body = SubmitBody {
            from: &self.from,
            handle,
            input_proof,
            note_reference,
        };
        let response: GasResponse = self
            .post_json(self.contract_url("estimate-submit"), &body)
            .await?;
        Ok(response.gas)
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TxReceipt> {
        let url = format!("{}/tx/{}", self.base, tx_hash);
        let deadline = tokio::time::Instant::now() + self.receipt_timeout;

        loop {
            let receipt: ReceiptResponse = self.get_json(url.clone()).await?;
            if let Some(status) = receipt.status {
                return Ok(TxReceipt {
                    tx_hash: receipt.tx_hash,
                    block_number: receipt.block_number.unwrap_or_default(),
                    status: if status == 1 { TxStatus::Success } else { TxStatus::Failed },
                });
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(TrackError::Confirmation(format!(
                    "timed out waiting for {tx_hash}"
                )));
            }
            tokio::time::sleep(self.receipt_poll).await;
        }
    }

    async fn get_user_total_handle(&self, address: &str) -> Result<EncryptedHandle> {
        let response: HandleResponse = self
            .get_json(self.contract_url(&format!("user-total/{address}")))
            .await?;
        Ok(response.handle)
    }

    async fn get_global_total_handle(&self) -> Result<EncryptedHandle> {
        let response: HandleResponse = self.get_json(self.contract_url("global-total")).await?;
        Ok(response.handle)
    }

    async fn get_total_users(&self) -> Result<u64> {
        let response: CountResponse = self.get_json(self.contract_url("total-users")).await?;
        Ok(response.count)
    }

    async fn has_submitted_today(&self, address: &str) -> Result<bool> {
        let response: BoolResponse = self
            .get_json(self.contract_url(&format!("has-submitted-today/{address}")))
            .await?;
        Ok(response.value)
    }

    async fn get_all_users(&self) -> Result<Vec<String>> {
        let response: UsersResponse = self.get_json(self.contract_url("users")).await?;
        Ok(response.users)
    }

    async fn get_user_submission_count(&self, address: &str) -> Result<u64> {
        let response: CountResponse = self
            .get_json(self.contract_url(&format!("submission-count/{address}")))
            .await?;
        Ok(response.count)
    }

    async fn get_user_record(&self, address: &str, day_key: u64) -> Result<SubmissionRecord> {
        self.get_json(self.contract_url(&format!("record/{address}/{day_key}")))
            .await
    }

    async fn has_badge(&self, address: &str, badge_id: u8) -> Result<bool> {
        let response: BoolResponse = self
            .get_json(self.contract_url(&format!("badge/{address}/{badge_id}")))
            .await?;
        Ok(response.value)
    }

    async fn claim_badge(&self, badge_id: u8) -> Result<PendingTx> {
        let body = ClaimBadgeBody { from: &self.from, badge_id };
        self.post_json(self.contract_url("claim-badge"), &body).await
    }

    async fn get_code(&self, address: &str) -> Result<String> {
        let url = format!("{}/code/{}", self.base, address);
        let response: CodeResponse = self.get_json(url).await?;
        Ok(response.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_is_empty() {
        assert!(code_is_empty(""));
        assert!(code_is_empty("0x"));
        assert!(code_is_empty("0x0"));
        assert!(!code_is_empty("0x6080604052"));
    }

    #[test]
    fn test_receipt_status_decoding() {
        let pending: ReceiptResponse =
            serde_json::from_str(r#"{"txHash": "0x1"}"#).unwrap();
        assert!(pending.status.is_none());

        let mined: ReceiptResponse =
            serde_json::from_str(r#"{"txHash": "0x1", "blockNumber": 7, "status": 1}"#).unwrap();
        assert_eq!(mined.status, Some(1));
        assert_eq!(mined.block_number, Some(7));
    }
}
