//! error taxonomy for the sync engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackError {
    /// bad input value, rejected before any network call
    #[error("invalid value: {0}")]
    Validation(String),

    /// missing dependency (no signer, no computation client, no contract)
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// encryption produced no handle or proof
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// hard preflight failure, aborts before spending gas
    #[error("preflight failed: {0}")]
    Preflight(String),

    /// gas estimation failed, aborts without sending a transaction
    #[error("estimation failed: {0}")]
    Estimation(String),

    /// transaction rejected or reverted on submission
    #[error("submission failed: {0}")]
    Submission(String),

    /// transaction included but with a failure status
    #[error("confirmation failed: {0}")]
    Confirmation(String),

    /// decryption authorization could not be built or reused
    #[error("signature failed: {0}")]
    Signature(String),

    /// decryption service failed or returned no value
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// ledger call reverted; carries the raw payload for classification
    #[error("call reverted: {}", .message.as_deref().unwrap_or("no reason given"))]
    Reverted {
        message: Option<String>,
        data: Option<String>,
    },

    /// transport-level failure talking to a gateway
    #[error("transport error: {0}")]
    Transport(String),

    /// no deployment record for the active chain
    #[error("no deployment found for chain {0}")]
    NotDeployed(u64),
}

pub type Result<T> = std::result::Result<T, TrackError>;

impl From<reqwest::Error> for TrackError {
    fn from(e: reqwest::Error) -> Self {
        TrackError::Transport(e.to_string())
    }
}

/// selector of the solidity `Error(string)` revert payload
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// reduce a ledger error to the most specific human-readable reason:
/// structured revert data > short message > the error's own rendering
pub fn classify(err: &TrackError) -> String {
    match err {
        TrackError::Reverted { message, data } => {
            if let Some(reason) = data.as_deref().and_then(decode_revert_reason) {
                return reason;
            }
            if let Some(msg) = message.as_deref().filter(|m| !m.is_empty()) {
                return msg.to_string();
            }
            "call reverted without a reason".to_string()
        }
        other => other.to_string(),
    }
}

/// decode an ABI-encoded `Error(string)` payload, if that is what this is
pub fn decode_revert_reason(data: &str) -> Option<String> {
    let raw = data.strip_prefix("0x").unwrap_or(data);
    let bytes = hex::decode(raw).ok()?;

    // selector + offset word + length word
    if bytes.len() < 4 + 32 + 32 || bytes[..4] != ERROR_STRING_SELECTOR {
        return None;
    }

    let len_word = &bytes[4 + 32..4 + 64];
    let len = u64::from_be_bytes(len_word[24..32].try_into().ok()?) as usize;

    let start: usize = 4 + 64;
    let end = start.checked_add(len)?;
    if end > bytes.len() {
        return None;
    }

    String::from_utf8(bytes[start..end].to_vec()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_error_string(reason: &str) -> String {
        let mut payload = ERROR_STRING_SELECTOR.to_vec();
        // offset to the string data
        let mut offset = [0u8; 32];
        offset[31] = 0x20;
        payload.extend_from_slice(&offset);
        // length
        let mut len = [0u8; 32];
        len[24..32].copy_from_slice(&(reason.len() as u64).to_be_bytes());
        payload.extend_from_slice(&len);
        // data, zero padded to a word
        let mut data = reason.as_bytes().to_vec();
        while data.len() % 32 != 0 {
            data.push(0);
        }
        payload.extend_from_slice(&data);
        format!("0x{}", hex::encode(payload))
    }

    #[test]
    fn test_decode_revert_reason() {
        let encoded = encode_error_string("already submitted today");
        assert_eq!(
            decode_revert_reason(&encoded).as_deref(),
            Some("already submitted today")
        );
    }

    #[test]
    fn test_decode_rejects_other_selectors() {
        assert!(decode_revert_reason("0xdeadbeef").is_none());
        assert!(decode_revert_reason("0x").is_none());
        assert!(decode_revert_reason("garbage").is_none());
    }

    #[test]
    fn test_classify_prefers_structured_reason() {
        let err = TrackError::Reverted {
            message: Some("execution reverted".into()),
            data: Some(encode_error_string("daily limit reached")),
        };
        assert_eq!(classify(&err), "daily limit reached");
    }

    #[test]
    fn test_classify_falls_back_to_short_message() {
        let err = TrackError::Reverted {
            message: Some("execution reverted".into()),
            data: Some("0x1234".into()),
        };
        assert_eq!(classify(&err), "execution reverted");

        let bare = TrackError::Reverted { message: None, data: None };
        assert_eq!(classify(&bare), "call reverted without a reason");
    }

    #[test]
    fn test_classify_passes_through_other_errors() {
        let err = TrackError::Transport("connection refused".into());
        assert_eq!(classify(&err), "transport error: connection refused");
    }
}
