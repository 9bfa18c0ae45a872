//! Client Configuration

use counter_interface::CounterProgram;
use serde::{Deserialize, Serialize};
use solana_sdk::{commitment_config::CommitmentLevel, pubkey::Pubkey};
use std::{path::Path, str::FromStr, time::Duration};
use thiserror::Error;

use crate::router::{RouterConfig, RoutingPolicy};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base ledger RPC URL
    pub base_rpc_url: String,
    /// Ephemeral rollup RPC URL
    pub ephemeral_rpc_url: String,
    /// Managing (counter) program ID
    pub program_id: String,
    /// Delegation program ID
    pub delegation_program_id: String,
    /// processed | confirmed | finalized
    pub commitment: String,
    /// Skip preflight simulation on submit
    pub skip_preflight: bool,
    /// Deadline for a transaction confirmation
    pub confirm_timeout_ms: u64,
    /// Deadline for a commit/undelegate to show up on the base ledger
    pub settlement_timeout_ms: u64,
    /// Interval between status polls
    pub poll_interval_ms: u64,
    /// Per-request HTTP timeout
    pub rpc_request_timeout_ms: u64,
    /// Whether commit needs the wallet as authority
    pub commit_requires_wallet: bool,
    /// Wallet keypair file
    pub wallet_path: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_rpc_url: "https://api.devnet.solana.com".to_string(),
            ephemeral_rpc_url: "https://devnet.magicblock.app".to_string(),
            program_id: counter_interface::id().to_string(),
            delegation_program_id: counter_interface::DELEGATION_PROGRAM_ID.to_string(),
            commitment: "confirmed".to_string(),
            skip_preflight: true,
            confirm_timeout_ms: 30_000,
            settlement_timeout_ms: 60_000,
            poll_interval_ms: 500,
            rpc_request_timeout_ms: 15_000,
            commit_requires_wallet: false,
            wallet_path: None,
        }
    }
}

impl ClientConfig {
    /// Load from a JSON file; missing fields take defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field that is parsed later
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.program()?;
        self.commitment_level()?;
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "poll_interval_ms",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    pub fn program(&self) -> Result<CounterProgram, ConfigError> {
        Ok(CounterProgram::new(
            parse_pubkey("program_id", &self.program_id)?,
            parse_pubkey("delegation_program_id", &self.delegation_program_id)?,
        ))
    }

    pub fn commitment_level(&self) -> Result<CommitmentLevel, ConfigError> {
        match self.commitment.as_str() {
            "processed" => Ok(CommitmentLevel::Processed),
            "confirmed" => Ok(CommitmentLevel::Confirmed),
            "finalized" => Ok(CommitmentLevel::Finalized),
            other => Err(ConfigError::InvalidValue {
                field: "commitment",
                value: other.to_string(),
            }),
        }
    }

    pub fn router_config(&self) -> Result<RouterConfig, ConfigError> {
        Ok(RouterConfig {
            commitment: self.commitment_level()?,
            skip_preflight: self.skip_preflight,
            confirm_timeout: Duration::from_millis(self.confirm_timeout_ms),
            settlement_timeout: Duration::from_millis(self.settlement_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            policy: RoutingPolicy {
                commit_requires_wallet: self.commit_requires_wallet,
            },
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_request_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn parse_pubkey(field: &'static str, value: &str) -> Result<Pubkey, ConfigError> {
    Pubkey::from_str(value).map_err(|_| ConfigError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClientConfig::default();
        config.validate().unwrap();
        assert_eq!(config.program().unwrap(), CounterProgram::default());
        assert_eq!(config.commitment_level().unwrap(), CommitmentLevel::Confirmed);
        assert_eq!(config.router_config().unwrap().confirm_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "ephemeral_rpc_url": "http://127.0.0.1:7799", "commitment": "processed" }}"#
        )
        .unwrap();

        let config = ClientConfig::load(file.path()).unwrap();
        assert_eq!(config.ephemeral_rpc_url, "http://127.0.0.1:7799");
        assert_eq!(config.commitment_level().unwrap(), CommitmentLevel::Processed);
        assert_eq!(config.base_rpc_url, ClientConfig::default().base_rpc_url);
    }

    #[test]
    fn test_rejects_bad_values() {
        let config = ClientConfig {
            commitment: "max".into(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "commitment", .. })
        ));

        let config = ClientConfig {
            program_id: "nope".into(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "program_id", .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ClientConfig::load("/nonexistent/er-counter.json"),
            Err(ConfigError::Read { .. })
        ));
    }
}
