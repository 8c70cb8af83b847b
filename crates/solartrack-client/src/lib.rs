//! solartrack-client: sync engine for confidential solar usage tracking
//!
//! coordinates a ledger contract and a confidential computation service so
//! a user can submit an encrypted daily usage value, track per-day state,
//! and reveal their own running total without exposing plaintext to the
//! network. ciphertext construction and proof validation are opaque
//! external services; this crate only orchestrates them.
//!
//! ## usage
//!
//! ```rust,ignore
//! let engine = SyncEngine::new(session, contract, ledger, relayer, signer, storage);
//! engine.refresh_all().await;
//! engine.submit_usage(12, "ipfs://note").await;
//! engine.decrypt_user_total().await;
//! let state = engine.state().await;
//! ```

pub mod badges;
pub mod calendar;
pub mod config;
pub mod confidential;
pub mod deployments;
pub mod engine;
pub mod error;
pub mod leaderboard;
pub mod ledger;
pub mod signature;
pub mod signer;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use badges::*;
pub use calendar::*;
pub use config::*;
pub use confidential::*;
pub use deployments::*;
pub use engine::*;
pub use error::*;
pub use leaderboard::*;
pub use ledger::*;
pub use signature::*;
pub use signer::*;
pub use types::*;
