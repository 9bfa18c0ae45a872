//! CLI Configuration
//!
//! Settings come from an optional JSON file, then command line flags.

use anyhow::{Context, Result};
use er_client::ClientConfig;
use std::path::PathBuf;

/// Flag overrides for `ClientConfig`
#[derive(Debug, Clone, Default, clap::Args)]
pub struct Overrides {
    /// JSON config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Base ledger RPC URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Ephemeral rollup RPC URL
    #[arg(long, global = true)]
    pub ephemeral_url: Option<String>,

    /// Counter program ID
    #[arg(long, global = true)]
    pub program_id: Option<String>,

    /// Wallet keypair file (defaults to the Solana CLI keypair)
    #[arg(long, global = true)]
    pub keypair: Option<PathBuf>,

    /// Commitment level (processed, confirmed, finalized)
    #[arg(long, global = true)]
    pub commitment: Option<String>,

    /// Require the wallet to co-sign commits
    #[arg(long, global = true)]
    pub commit_requires_wallet: bool,
}

impl Overrides {
    /// Load the config file, if any, and apply the flags on top
    pub fn resolve(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => ClientConfig::default(),
        };

        if let Some(url) = &self.base_url {
            config.base_rpc_url = url.clone();
        }
        if let Some(url) = &self.ephemeral_url {
            config.ephemeral_rpc_url = url.clone();
        }
        if let Some(program_id) = &self.program_id {
            config.program_id = program_id.clone();
        }
        if let Some(keypair) = &self.keypair {
            config.wallet_path = Some(keypair.display().to_string());
        }
        if let Some(commitment) = &self.commitment {
            config.commitment = commitment.clone();
        }
        if self.commit_requires_wallet {
            config.commit_requires_wallet = true;
        }

        config.validate().context("invalid settings")?;
        Ok(config)
    }
}

/// Keypair to sign with: configured path, else `~/.config/solana/id.json`
pub fn wallet_path(config: &ClientConfig) -> Option<PathBuf> {
    config.wallet_path.as_ref().map(PathBuf::from).or_else(|| {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config/solana/id.json"))
    })
}
