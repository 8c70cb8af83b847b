//! handle and record types shared across the sync engine

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Result, TrackError};

/// seconds per day-key step, identical on client and ledger
pub const DAY_SECONDS: u64 = 86_400;

/// largest value the ledger's 32-bit encrypted field can hold
pub const MAX_USAGE_VALUE: u64 = u32::MAX as u64;

/// opaque ciphertext reference stored on the ledger (32 bytes)
///
/// the all-zero handle is a sentinel meaning "no value written yet"
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncryptedHandle(pub [u8; 32]);

impl EncryptedHandle {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// render as 0x-prefixed hex
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// parse from 0x-prefixed (or bare) hex
    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw)
            .map_err(|e| TrackError::Transport(format!("bad handle hex: {e}")))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| TrackError::Transport(format!("bad handle length in {s:?}")))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for EncryptedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for EncryptedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedHandle({})", self.to_hex())
    }
}

impl AsRef<[u8]> for EncryptedHandle {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// handles travel as hex strings on the gateway wire
impl Serialize for EncryptedHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EncryptedHandle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(de::Error::custom)
    }
}

/// result of decrypting a handle
///
/// only trustworthy while `handle` equals the handle currently reported by
/// the ledger for the same slot
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearValue {
    pub handle: EncryptedHandle,
    pub clear: u64,
}

impl ClearValue {
    /// does this clear value still describe the given on-ledger handle?
    pub fn is_current(&self, current: &EncryptedHandle) -> bool {
        self.handle == *current
    }
}

/// one submission per (user, day-key)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    pub day_key: u64,
    pub encrypted_value: EncryptedHandle,
    #[serde(default)]
    pub note_reference: String,
    pub exists: bool,
}

/// day index since the unix epoch for a wall-clock timestamp
pub fn day_key_from_unix(unix_seconds: u64) -> u64 {
    unix_seconds / DAY_SECONDS
}

/// today's day-key from wall-clock time
pub fn current_day_key() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    day_key_from_unix(now)
}

/// current wall-clock time as unix seconds
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
