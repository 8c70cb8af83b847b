//! synchronization engine
//!
//! orchestrates the ledger and the confidential computation service for one
//! connected session: read refreshes, the encrypt/submit/confirm write path
//! and the reveal path with signature reuse. presentation code only ever
//! sees the [`EngineState`] snapshot and a human-readable status message.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::badges::{self, AchievementFacts, Badge};
use crate::calendar::{longest_streak, window_day_keys, CalendarDay, CALENDAR_WINDOW_DAYS};
use crate::confidential::{create_encrypted_input, ConfidentialClient, DecryptRequest};
use crate::error::{classify, Result, TrackError};
use crate::leaderboard::{rank_entries, LeaderboardEntry};
use crate::ledger::{code_is_empty, LedgerClient, TxReceipt, TxStatus};
use crate::signature::{DecryptionSignature, SignatureStorage};
use crate::signer::WalletSigner;
use crate::types::{current_day_key, ClearValue, EncryptedHandle, MAX_USAGE_VALUE};

/// identity of one connected session; the engine is scoped to it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionKey {
    pub account: String,
    pub chain_id: u64,
}

/// stage of an in-flight submission attempt
///
/// always returns to `Idle`, success or failure; no stage retries
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SubmitStage {
    #[default]
    Idle,
    Validating,
    Encrypting,
    PreflightChecking,
    Estimating,
    Submitting,
    Confirming,
}

/// observable snapshot for presentation consumers
#[derive(Clone, Debug, Default)]
pub struct EngineState {
    pub user_total_handle: Option<EncryptedHandle>,
    pub global_total_handle: Option<EncryptedHandle>,
    pub clear_user_total: Option<ClearValue>,
    pub clear_global_total: Option<ClearValue>,
    pub total_users: u64,
    pub has_logged_today: bool,
    pub submit_stage: SubmitStage,
    pub is_logging: bool,
    pub is_refreshing: bool,
    pub is_decrypting: bool,
    pub message: String,
}

impl EngineState {
    /// the user's clear value, only while it matches the current handle
    pub fn current_clear_user_total(&self) -> Option<&ClearValue> {
        let handle = self.user_total_handle.as_ref()?;
        self.clear_user_total.as_ref().filter(|c| c.is_current(handle))
    }

    /// the global clear value, only while it matches the current handle
    pub fn current_clear_global_total(&self) -> Option<&ClearValue> {
        let handle = self.global_total_handle.as_ref()?;
        self.clear_global_total.as_ref().filter(|c| c.is_current(handle))
    }
}

/// scoped single-flight acquisition: at most one operation of a kind at a
/// time, released on every exit path including panics and early returns
struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> FlightGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
            .then_some(Self { flag })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

struct SessionData {
    key: SessionKey,
    contract: Option<String>,
}

pub struct SyncEngine {
    ledger: Arc<dyn LedgerClient>,
    confidential: Arc<dyn ConfidentialClient>,
    signer: Option<Arc<dyn WalletSigner>>,
    storage: Arc<dyn SignatureStorage>,
    session: RwLock<SessionData>,
    /// bumped on session reset; completions from a superseded session
    /// compare against it and are discarded
    generation: AtomicU64,
    state: RwLock<EngineState>,
    logging: AtomicBool,
    decrypting: AtomicBool,
    refreshing_user: AtomicBool,
    refreshing_global: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        session: SessionKey,
        contract: Option<String>,
        ledger: Arc<dyn LedgerClient>,
        confidential: Arc<dyn ConfidentialClient>,
        signer: Option<Arc<dyn WalletSigner>>,
        storage: Arc<dyn SignatureStorage>,
    ) -> Self {
        let state = initial_state(&contract, session.chain_id);
        Self {
            ledger,
            confidential,
            signer,
            storage,
            session: RwLock::new(SessionData { key: session, contract }),
            generation: AtomicU64::new(0),
            state: RwLock::new(state),
            logging: AtomicBool::new(false),
            decrypting: AtomicBool::new(false),
            refreshing_user: AtomicBool::new(false),
            refreshing_global: AtomicBool::new(false),
        }
    }

    /// current snapshot, with in-flight flags stitched in
    pub async fn state(&self) -> EngineState {
        let mut snapshot = self.state.read().await.clone();
        snapshot.is_logging = self.logging.load(Ordering::Acquire);
        snapshot.is_decrypting = self.decrypting.load(Ordering::Acquire);
        snapshot.is_refreshing = self.refreshing_user.load(Ordering::Acquire)
            || self.refreshing_global.load(Ordering::Acquire);
        snapshot
    }

    pub async fn session(&self) -> SessionKey {
        self.session.read().await.key.clone()
    }

    pub async fn contract_address(&self) -> Option<String> {
        self.session.read().await.contract.clone()
    }

    pub async fn is_deployed(&self) -> bool {
        self.session.read().await.contract.is_some()
    }

    /// rebind to a new (account, chain) session
    ///
    /// in-flight operations run to completion but their results are
    /// discarded by the generation check at commit time; guard flags are
    /// reset so the new session starts clean
    pub async fn reset_session(&self, key: SessionKey, contract: Option<String>) {
        self.generation.fetch_add(1, Ordering::AcqRel);

        let chain_id = key.chain_id;
        {
            let mut session = self.session.write().await;
            session.key = key;
            session.contract = contract.clone();
        }

        self.logging.store(false, Ordering::Release);
        self.decrypting.store(false, Ordering::Release);
        self.refreshing_user.store(false, Ordering::Release);
        self.refreshing_global.store(false, Ordering::Release);

        let mut state = self.state.write().await;
        *state = initial_state(&contract, chain_id);
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// apply a state mutation, unless the session moved on since `gen`
    async fn commit<F: FnOnce(&mut EngineState)>(&self, gen: u64, mutate: F) -> bool {
        if self.generation() != gen {
            debug!("discarding result from a superseded session");
            return false;
        }
        let mut state = self.state.write().await;
        mutate(&mut state);
        true
    }

    async fn set_message(&self, gen: u64, message: impl Into<String>) {
        let message = message.into();
        self.commit(gen, |s| s.message = message).await;
    }

    // ---- read-only refreshes -------------------------------------------

    pub async fn refresh_total_users(&self) {
        if !self.is_deployed().await {
            return;
        }
        let gen = self.generation();
        match self.ledger.get_total_users().await {
            Ok(count) => {
                self.commit(gen, |s| s.total_users = count).await;
            }
            Err(e) => warn!("total users refresh failed: {e}"),
        }
    }

    pub async fn refresh_has_logged_today(&self) {
        if !self.is_deployed().await {
            return;
        }
        let Some(signer) = self.signer.clone() else { return };
        let gen = self.generation();
        match self.ledger.has_submitted_today(&signer.address()).await {
            Ok(logged) => {
                self.commit(gen, |s| s.has_logged_today = logged).await;
            }
            Err(e) => warn!("has-logged-today refresh failed: {e}"),
        }
    }

    pub async fn refresh_user_total_handle(&self) {
        if !self.is_deployed().await {
            return;
        }
        let Some(signer) = self.signer.clone() else { return };
        let Some(_guard) = FlightGuard::try_acquire(&self.refreshing_user) else {
            debug!("user total refresh already in flight");
            return;
        };
        let gen = self.generation();
        match self.ledger.get_user_total_handle(&signer.address()).await {
            Ok(handle) => {
                // unconditional replace: consumers detect stale clear
                // values by handle mismatch
                self.commit(gen, |s| s.user_total_handle = Some(handle)).await;
            }
            Err(e) => warn!("user total handle refresh failed: {e}"),
        }
    }

    pub async fn refresh_global_total_handle(&self) {
        if !self.is_deployed().await {
            return;
        }
        let Some(_guard) = FlightGuard::try_acquire(&self.refreshing_global) else {
            debug!("global total refresh already in flight");
            return;
        };
        let gen = self.generation();
        match self.ledger.get_global_total_handle().await {
            Ok(handle) => {
                self.commit(gen, |s| s.global_total_handle = Some(handle)).await;
            }
            Err(e) => warn!("global total handle refresh failed: {e}"),
        }
    }

    /// refresh every read projection at once
    pub async fn refresh_all(&self) {
        tokio::join!(
            self.refresh_user_total_handle(),
            self.refresh_global_total_handle(),
            self.refresh_total_users(),
            self.refresh_has_logged_today(),
        );
    }

    // ---- reveal path ---------------------------------------------------

    /// decrypt the user's running total
    ///
    /// silent no-op when a dependency is missing or a decrypt is already in
    /// flight. the zero handle short-circuits to a clear value of zero: the
    /// service would refuse to decrypt it, and the answer is known anyway.
    pub async fn decrypt_user_total(&self) {
        if !self.confidential.is_ready() {
            debug!("confidential client not ready");
            return;
        }
        let Some(signer) = self.signer.clone() else { return };
        let Some(contract) = self.contract_address().await else { return };
        let Some(_guard) = FlightGuard::try_acquire(&self.decrypting) else {
            debug!("decrypt already in flight");
            return;
        };

        let gen = self.generation();
        let Some(handle) = self.state.read().await.user_total_handle else { return };

        if handle.is_zero() {
            self.commit(gen, |s| {
                s.clear_user_total = Some(ClearValue { handle, clear: 0 });
                s.message = "No logged usage to reveal yet".into();
            })
            .await;
            return;
        }

        self.set_message(gen, "Decrypting usage total...").await;
        match self.decrypt_inner(&signer, &contract, handle).await {
            Ok(clear) => {
                info!(value = clear.clear, "usage total decrypted");
                self.commit(gen, |s| {
                    s.message = format!("Decrypted total: {} kWh", clear.clear);
                    s.clear_user_total = Some(clear);
                })
                .await;
            }
            Err(e) => {
                warn!("decrypt failed: {e}");
                self.set_message(gen, classify(&e)).await;
            }
        }
    }

    async fn decrypt_inner(
        &self,
        signer: &Arc<dyn WalletSigner>,
        contract: &str,
        handle: EncryptedHandle,
    ) -> Result<ClearValue> {
        let contracts = vec![contract.to_string()];
        let sig = DecryptionSignature::load_or_sign(
            &contracts,
            signer.as_ref(),
            self.storage.as_ref(),
        )
        .await?;

        // an authorization may only decrypt handles of contracts it names
        if !sig.covers(contract) {
            return Err(TrackError::Signature(
                "authorization does not cover this contract".into(),
            ));
        }

        let requests = [DecryptRequest {
            handle,
            contract_address: contract.to_string(),
        }];
        let plaintexts = self.confidential.user_decrypt(&requests, &sig).await?;

        let clear = plaintexts
            .get(&handle.to_hex())
            .copied()
            .ok_or_else(|| TrackError::Decryption(format!("no plaintext returned for {handle}")))?;

        Ok(ClearValue { handle, clear })
    }

    // ---- write path ----------------------------------------------------

    /// submit a usage value for today
    ///
    /// ordered fail-fast pipeline; every failure is reduced to a status
    /// message and the in-flight flag is released on every exit path
    pub async fn submit_usage(&self, value: u64, note_reference: &str) {
        if !self.confidential.is_ready() {
            debug!("confidential client not ready");
            return;
        }
        let Some(signer) = self.signer.clone() else { return };
        let Some(contract) = self.contract_address().await else {
            let gen = self.generation();
            let chain_id = self.session.read().await.key.chain_id;
            self.set_message(gen, TrackError::NotDeployed(chain_id).to_string()).await;
            return;
        };
        let Some(_guard) = FlightGuard::try_acquire(&self.logging) else {
            debug!("submission already in flight");
            return;
        };

        let gen = self.generation();
        if let Err(e) = self
            .submit_pipeline(gen, &signer, &contract, value, note_reference)
            .await
        {
            warn!("submission failed: {e}");
            let message = classify(&e);
            self.commit(gen, |s| {
                s.submit_stage = SubmitStage::Idle;
                s.message = message;
            })
            .await;
        }
    }

    async fn submit_pipeline(
        &self,
        gen: u64,
        signer: &Arc<dyn WalletSigner>,
        contract: &str,
        value: u64,
        note_reference: &str,
    ) -> Result<()> {
        self.commit(gen, |s| s.submit_stage = SubmitStage::Validating).await;
        if value == 0 {
            return Err(TrackError::Validation("value must be greater than zero".into()));
        }
        if value > MAX_USAGE_VALUE {
            return Err(TrackError::Validation(format!(
                "value must be at most {MAX_USAGE_VALUE}"
            )));
        }
        let value = value as u32;
        let user = signer.address();

        self.commit(gen, |s| {
            s.submit_stage = SubmitStage::Encrypting;
            s.message = "Encrypting usage value...".into();
        })
        .await;
        // let the interactive surface breathe before the heavy encryption
        tokio::task::yield_now().await;

        let input = create_encrypted_input(self.confidential.as_ref(), contract, &user)
            .add_u32(value)
            .encrypt()
            .await
            .map_err(|e| TrackError::Encryption(e.to_string()))?;
        let handle = *input
            .handles
            .first()
            .ok_or_else(|| TrackError::Encryption("no handle produced".into()))?;
        if input.input_proof.is_empty() {
            return Err(TrackError::Encryption("no input proof produced".into()));
        }

        self.commit(gen, |s| s.submit_stage = SubmitStage::PreflightChecking).await;
        self.preflight(contract, &user).await?;

        self.commit(gen, |s| {
            s.submit_stage = SubmitStage::Estimating;
            s.message = "Estimating transaction cost...".into();
        })
        .await;
        let gas = self
            .ledger
            .estimate_submit_gas(&handle, &input.input_proof, note_reference)
            .await
            .map_err(|e| TrackError::Estimation(classify(&e)))?;
        debug!(gas, "estimate ok");

        self.commit(gen, |s| {
            s.submit_stage = SubmitStage::Submitting;
            s.message = "Submitting to the ledger...".into();
        })
        .await;
        let pending = self
            .ledger
            .submit_usage(&handle, &input.input_proof, note_reference)
            .await
            .map_err(|e| TrackError::Submission(classify(&e)))?;
        info!(tx = %pending.tx_hash, "submission sent");

        self.commit(gen, |s| {
            s.submit_stage = SubmitStage::Confirming;
            s.message = "Waiting for confirmation...".into();
        })
        .await;
        let receipt = self
            .ledger
            .wait_for_receipt(&pending.tx_hash)
            .await
            .map_err(|e| TrackError::Confirmation(classify(&e)))?;
        if receipt.status != TxStatus::Success {
            return Err(TrackError::Confirmation(format!(
                "transaction {} reverted on inclusion",
                receipt.tx_hash
            )));
        }

        // bring every derived projection in line with the new record
        self.refresh_all().await;

        info!(tx = %receipt.tx_hash, "usage submitted");
        self.commit(gen, |s| {
            s.submit_stage = SubmitStage::Idle;
            s.message = "Usage submitted successfully".into();
        })
        .await;
        Ok(())
    }

    /// cheap checks before an irreversible write. only a confirmed same-day
    /// duplicate (or a confirmed codeless contract) aborts; a check that
    /// itself errors is advisory
    async fn preflight(&self, contract: &str, user: &str) -> Result<()> {
        match self.ledger.get_code(contract).await {
            Ok(code) if code_is_empty(&code) => {
                return Err(TrackError::Preflight(format!(
                    "no contract deployed at {contract}"
                )));
            }
            Ok(_) => {}
            Err(e) => warn!("code check failed, continuing: {e}"),
        }

        if let Err(e) = self.ledger.get_total_users().await {
            warn!("reachability probe failed, continuing: {e}");
        }

        match self.ledger.has_submitted_today(user).await {
            Ok(true) => Err(TrackError::Preflight(
                "already submitted today; only one submission per day is allowed".into(),
            )),
            Ok(false) => Ok(()),
            Err(e) => {
                warn!("duplicate check failed, continuing: {e}");
                Ok(())
            }
        }
    }

    // ---- aggregation views ---------------------------------------------

    /// the user's decrypted total, only while it matches the current handle
    pub async fn own_decrypted_total(&self) -> Option<u64> {
        self.state
            .read()
            .await
            .current_clear_user_total()
            .map(|c| c.clear)
    }

    /// ranked leaderboard over the public submission counts
    pub async fn load_leaderboard(&self) -> Result<Vec<LeaderboardEntry>> {
        if !self.is_deployed().await {
            return Ok(Vec::new());
        }
        let users = self.ledger.get_all_users().await?;
        let fetches = users.iter().map(|u| self.ledger.get_user_submission_count(u));
        let results = futures::future::join_all(fetches).await;

        let mut counts = Vec::with_capacity(users.len());
        for (user, count) in users.into_iter().zip(results) {
            counts.push((user, count?));
        }

        let current = self.signer.as_ref().map(|s| s.address());
        Ok(rank_entries(counts, current.as_deref()))
    }

    /// trailing activity window; per-day fetch failures mean "no record"
    pub async fn load_calendar(&self) -> Result<Vec<CalendarDay>> {
        if !self.is_deployed().await {
            return Ok(Vec::new());
        }
        let Some(signer) = self.signer.clone() else { return Ok(Vec::new()) };
        let user = signer.address();
        let today = current_day_key();

        let mut days = Vec::with_capacity(CALENDAR_WINDOW_DAYS as usize);
        for day_key in window_day_keys(today, CALENDAR_WINDOW_DAYS) {
            let has_record = match self.ledger.get_user_record(&user, day_key).await {
                Ok(record) => record.exists,
                Err(e) => {
                    debug!(day_key, "record fetch failed, treating as absent: {e}");
                    false
                }
            };
            days.push(CalendarDay {
                day_key,
                has_record,
                is_today: day_key == today,
            });
        }
        Ok(days)
    }

    // ---- badges --------------------------------------------------------

    pub async fn has_badge(&self, badge: Badge) -> Result<bool> {
        if !self.is_deployed().await {
            let chain_id = self.session.read().await.key.chain_id;
            return Err(TrackError::NotDeployed(chain_id));
        }
        let Some(signer) = &self.signer else {
            return Err(TrackError::Unavailable("no signer connected".into()));
        };
        self.ledger.has_badge(&signer.address(), badge.id()).await
    }

    /// facts the badge eligibility rules need, derived from current reads
    pub async fn achievement_facts(&self) -> Result<AchievementFacts> {
        let days = self.load_calendar().await?;
        Ok(AchievementFacts {
            has_any_record: days.iter().any(|d| d.has_record),
            longest_streak: longest_streak(&days),
            clear_total: self.own_decrypted_total().await,
        })
    }

    /// claim an earned badge; unearned or already-claimed badges are
    /// rejected before any transaction
    pub async fn claim_badge(&self, badge: Badge) -> Result<TxReceipt> {
        if self.has_badge(badge).await? {
            return Err(TrackError::Validation(format!(
                "badge {} already claimed",
                badge.name()
            )));
        }
        let facts = self.achievement_facts().await?;
        if !badges::eligible(badge, &facts) {
            return Err(TrackError::Validation(format!(
                "badge {} not earned yet",
                badge.name()
            )));
        }

        let pending = self.ledger.claim_badge(badge.id()).await?;
        let receipt = self.ledger.wait_for_receipt(&pending.tx_hash).await?;
        if receipt.status != TxStatus::Success {
            return Err(TrackError::Confirmation(format!(
                "claim transaction {} failed",
                receipt.tx_hash
            )));
        }
        Ok(receipt)
    }
}

fn initial_state(contract: &Option<String>, chain_id: u64) -> EngineState {
    let mut state = EngineState::default();
    if contract.is_none() {
        state.message = TrackError::NotDeployed(chain_id).to_string();
    }
    state
}
