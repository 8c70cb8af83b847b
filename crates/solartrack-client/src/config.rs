//! gateway configuration and known networks

use serde::{Deserialize, Serialize};

/// endpoints and chain identity for one connected session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// network name
    pub network: String,
    /// ledger gateway http endpoint
    pub ledger_endpoint: String,
    /// confidential computation relayer http endpoint
    pub relayer_endpoint: String,
    /// chain id used to resolve the deployment record
    pub chain_id: u64,
    /// request timeout in seconds
    pub timeout_secs: u64,
}

impl GatewayConfig {
    /// local development node
    pub fn localhost() -> Self {
        Self {
            network: "localhost".into(),
            ledger_endpoint: "http://localhost:8545".into(),
            relayer_endpoint: "http://localhost:8546".into(),
            chain_id: 31337,
            timeout_secs: 30,
        }
    }

    /// sepolia testnet
    pub fn sepolia() -> Self {
        Self {
            network: "sepolia".into(),
            ledger_endpoint: "https://gateway.sepolia.rotko.net".into(),
            relayer_endpoint: "https://relayer.sepolia.rotko.net".into(),
            chain_id: 11_155_111,
            timeout_secs: 60,
        }
    }

    /// look up a named network
    pub fn named(name: &str) -> Option<Self> {
        match name {
            "localhost" => Some(Self::localhost()),
            "sepolia" => Some(Self::sepolia()),
            _ => None,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::localhost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_networks() {
        assert_eq!(GatewayConfig::named("localhost").unwrap().chain_id, 31337);
        assert_eq!(GatewayConfig::named("sepolia").unwrap().chain_id, 11_155_111);
        assert!(GatewayConfig::named("mystery").is_none());
    }
}
