//! deployment descriptor registry
//!
//! consumes the JSON artifact produced by the deployment pipeline, one
//! record per network name, and resolves the contract address for the
//! active chain at engine start

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{Result, TrackError};

pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// one deployed contract on one network
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub address: String,
    #[serde(default)]
    pub abi: serde_json::Value,
    #[serde(default)]
    pub deployer: String,
    pub network: String,
    pub chain_id: u64,
    #[serde(default)]
    pub deployed_at: String,
}

impl DeploymentRecord {
    /// a zero-address record means "not deployed on this chain"
    pub fn is_deployed(&self) -> bool {
        !self.address.is_empty() && !self.address.eq_ignore_ascii_case(ZERO_ADDRESS)
    }
}

/// registry keyed by network name
#[derive(Clone, Debug, Default)]
pub struct DeploymentRegistry {
    records: HashMap<String, DeploymentRecord>,
}

impl DeploymentRegistry {
    pub fn new(records: HashMap<String, DeploymentRecord>) -> Self {
        Self { records }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let records: HashMap<String, DeploymentRecord> = serde_json::from_str(json)
            .map_err(|e| TrackError::Transport(format!("bad deployments artifact: {e}")))?;
        Ok(Self { records })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| TrackError::Transport(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// resolve the deployed contract for a chain id
    pub fn resolve(&self, chain_id: u64) -> Option<&DeploymentRecord> {
        self.records
            .values()
            .find(|r| r.chain_id == chain_id && r.is_deployed())
    }

    /// resolve, surfacing the missing-deployment error for the engine
    pub fn require(&self, chain_id: u64) -> Result<&DeploymentRecord> {
        self.resolve(chain_id).ok_or(TrackError::NotDeployed(chain_id))
    }

    pub fn networks(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTIFACT: &str = r#"{
        "localhost": {
            "address": "0x5FbDB2315678afecb367f032d93F642f64180aa3",
            "deployer": "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
            "network": "localhost",
            "chainId": 31337,
            "deployedAt": "2025-11-02T10:00:00Z"
        },
        "sepolia": {
            "address": "0x0000000000000000000000000000000000000000",
            "deployer": "",
            "network": "sepolia",
            "chainId": 11155111,
            "deployedAt": ""
        }
    }"#;

    #[test]
    fn test_resolve_by_chain_id() {
        let registry = DeploymentRegistry::from_json_str(ARTIFACT).unwrap();
        let record = registry.resolve(31337).unwrap();
        assert_eq!(record.network, "localhost");
        assert!(record.is_deployed());
    }

    #[test]
    fn test_zero_address_is_undeployed() {
        let registry = DeploymentRegistry::from_json_str(ARTIFACT).unwrap();
        assert!(registry.resolve(11_155_111).is_none());
        assert!(matches!(
            registry.require(11_155_111),
            Err(TrackError::NotDeployed(11_155_111))
        ));
    }

    #[test]
    fn test_unknown_chain() {
        let registry = DeploymentRegistry::from_json_str(ARTIFACT).unwrap();
        assert!(registry.resolve(1).is_none());
    }
}
