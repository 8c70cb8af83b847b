//! in-memory fakes for engine tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::confidential::{ConfidentialClient, DecryptRequest, EncryptedInput};
use crate::error::{Result, TrackError};
use crate::ledger::{LedgerClient, PendingTx, TxReceipt, TxStatus};
use crate::signature::DecryptionSignature;
use crate::signer::{LocalSigner, WalletSigner};
use crate::types::{current_day_key, EncryptedHandle, SubmissionRecord};

pub(crate) fn handle(byte: u8) -> EncryptedHandle {
    EncryptedHandle([byte; 32])
}

/// ABI-encode an `Error(string)` revert payload for classification tests
pub(crate) fn encode_error_string(reason: &str) -> String {
    let mut payload = vec![0x08, 0xc3, 0x79, 0xa0];
    let mut offset = [0u8; 32];
    offset[31] = 0x20;
    payload.extend_from_slice(&offset);
    let mut len = [0u8; 32];
    len[24..32].copy_from_slice(&(reason.len() as u64).to_be_bytes());
    payload.extend_from_slice(&len);
    let mut data = reason.as_bytes().to_vec();
    while data.len() % 32 != 0 {
        data.push(0);
    }
    payload.extend_from_slice(&data);
    format!("0x{}", hex::encode(payload))
}

#[derive(Clone)]
pub(crate) struct LedgerFixture {
    pub user_handle: EncryptedHandle,
    pub global_handle: EncryptedHandle,
    pub total_users: u64,
    pub submitted_today: bool,
    pub users: Vec<(String, u64)>,
    pub records: HashMap<u64, bool>,
    pub badges: HashSet<u8>,
    pub code: String,
    pub receipt_status: TxStatus,
    /// (message, data) reported for gas estimation
    pub estimate_revert: Option<(Option<String>, Option<String>)>,
    pub fail_reads: bool,
}

impl Default for LedgerFixture {
    fn default() -> Self {
        Self {
            user_handle: EncryptedHandle::ZERO,
            global_handle: EncryptedHandle::ZERO,
            total_users: 0,
            submitted_today: false,
            users: Vec::new(),
            records: HashMap::new(),
            badges: HashSet::new(),
            code: "0x6080604052".into(),
            receipt_status: TxStatus::Success,
            estimate_revert: None,
            fail_reads: false,
        }
    }
}

#[derive(Default)]
pub(crate) struct MockLedger {
    pub fixture: Mutex<LedgerFixture>,
    pub estimate_calls: AtomicUsize,
    pub submit_calls: AtomicUsize,
}

impl MockLedger {
    pub fn new(fixture: LedgerFixture) -> Self {
        Self { fixture: Mutex::new(fixture), ..Default::default() }
    }

    fn read_guard(&self) -> Result<LedgerFixture> {
        let fixture = self.fixture.lock();
        if fixture.fail_reads {
            return Err(TrackError::Transport("mock read failure".into()));
        }
        Ok(fixture.clone())
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn submit_usage(
        &self,
        _handle: &EncryptedHandle,
        _input_proof: &str,
        _note_reference: &str,
    ) -> Result<PendingTx> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let mut fixture = self.fixture.lock();
        if fixture.receipt_status == TxStatus::Success {
            // a confirmed submission moves every projection
            if !fixture.submitted_today {
                fixture.total_users += 1;
            }
            fixture.submitted_today = true;
            fixture.user_handle = handle(0xAB);
            fixture.global_handle = handle(0xBB);
            fixture.records.insert(current_day_key(), true);
        }
        Ok(PendingTx { tx_hash: "0xmock".into() })
    }

    async fn estimate_submit_gas(
        &self,
        _handle: &EncryptedHandle,
        _input_proof: &str,
        _note_reference: &str,
    ) -> Result<u64> {
        self.estimate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some((message, data)) = self.fixture.lock().estimate_revert.clone() {
            return Err(TrackError::Reverted { message, data });
        }
        Ok(21_000)
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TxReceipt> {
        Ok(TxReceipt {
            tx_hash: tx_hash.into(),
            block_number: 1,
            status: self.fixture.lock().receipt_status,
        })
    }

    async fn get_user_total_handle(&self, _address: &str) -> Result<EncryptedHandle> {
        Ok(self.read_guard()?.user_handle)
    }

    async fn get_global_total_handle(&self) -> Result<EncryptedHandle> {
        Ok(self.read_guard()?.global_handle)
    }

    async fn get_total_users(&self) -> Result<u64> {
        Ok(self.read_guard()?.total_users)
    }

    async fn has_submitted_today(&self, _address: &str) -> Result<bool> {
        Ok(self.read_guard()?.submitted_today)
    }

    async fn get_all_users(&self) -> Result<Vec<String>> {
        Ok(self.read_guard()?.users.iter().map(|(a, _)| a.clone()).collect())
    }

    async fn get_user_submission_count(&self, address: &str) -> Result<u64> {
        let fixture = self.read_guard()?;
        Ok(fixture
            .users
            .iter()
            .find(|(a, _)| a == address)
            .map(|(_, c)| *c)
            .unwrap_or(0))
    }

    async fn get_user_record(&self, _address: &str, day_key: u64) -> Result<SubmissionRecord> {
        let fixture = self.read_guard()?;
        let exists = fixture.records.get(&day_key).copied().unwrap_or(false);
        Ok(SubmissionRecord {
            day_key,
            encrypted_value: if exists { handle(0xEE) } else { EncryptedHandle::ZERO },
            note_reference: String::new(),
            exists,
        })
    }

    async fn has_badge(&self, _address: &str, badge_id: u8) -> Result<bool> {
        Ok(self.read_guard()?.badges.contains(&badge_id))
    }

    async fn claim_badge(&self, badge_id: u8) -> Result<PendingTx> {
        self.fixture.lock().badges.insert(badge_id);
        Ok(PendingTx { tx_hash: "0xbadge".into() })
    }

    async fn get_code(&self, _address: &str) -> Result<String> {
        Ok(self.fixture.lock().code.clone())
    }
}

pub(crate) struct MockConfidential {
    pub ready: bool,
    pub empty_proof: bool,
    pub plaintext: u64,
    pub encrypt_calls: AtomicUsize,
    pub decrypt_calls: AtomicUsize,
}

impl Default for MockConfidential {
    fn default() -> Self {
        Self {
            ready: true,
            empty_proof: false,
            plaintext: 0,
            encrypt_calls: AtomicUsize::new(0),
            decrypt_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ConfidentialClient for MockConfidential {
    fn is_ready(&self) -> bool {
        self.ready
    }

    async fn encrypt_input(
        &self,
        _contract: &str,
        _user: &str,
        values: &[u32],
    ) -> Result<EncryptedInput> {
        self.encrypt_calls.fetch_add(1, Ordering::SeqCst);
        let handles = values.iter().map(|_| handle(0xC1)).collect();
        Ok(EncryptedInput {
            handles,
            input_proof: if self.empty_proof { String::new() } else { "0x01".into() },
        })
    }

    async fn user_decrypt(
        &self,
        requests: &[DecryptRequest],
        _signature: &DecryptionSignature,
    ) -> Result<HashMap<String, u64>> {
        self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        Ok(requests
            .iter()
            .map(|r| (r.handle.to_hex(), self.plaintext))
            .collect())
    }
}

/// signer that counts interactive signature prompts
pub(crate) struct MockSigner {
    inner: LocalSigner,
    pub sign_calls: AtomicUsize,
}

impl MockSigner {
    pub fn new() -> Self {
        Self { inner: LocalSigner::generate(), sign_calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl WalletSigner for MockSigner {
    fn address(&self) -> String {
        self.inner.address()
    }

    async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.sign(payload).await
    }
}
