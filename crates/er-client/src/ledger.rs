//! Ledger Client - capability interface for one ledger endpoint
//!
//! The base ledger and the ephemeral execution layer are both reached through
//! this trait. The router picks an instance by `LedgerKind`; nothing else
//! branches on which endpoint it is talking to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::{
    account::Account, clock::Slot, commitment_config::CommitmentLevel, hash::Hash, pubkey::Pubkey,
    signature::Signature,
};
use std::{fmt, sync::Arc};

use crate::error::LedgerError;

/// Which of the two ledgers an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    /// Slow, finality-heavy base ledger (canonical ownership)
    Base,
    /// Low-latency ephemeral execution layer
    Ephemeral,
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerKind::Base => write!(f, "base"),
            LedgerKind::Ephemeral => write!(f, "ephemeral"),
        }
    }
}

/// Options for `submit`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    pub skip_preflight: bool,
}

/// Acknowledgment that a transaction reached the requested commitment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub signature: Signature,
    pub slot: Slot,
}

/// One ledger endpoint
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Endpoint identifier, for logs
    fn endpoint(&self) -> &str;

    /// Fetch an account; `None` if it does not exist
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, LedgerError>;

    /// Fetch a fresh recency token (latest blockhash)
    async fn get_recency_token(&self) -> Result<Hash, LedgerError>;

    /// Broadcast a signed, wire-encoded transaction
    async fn submit(&self, signed_tx: &[u8], opts: SubmitOptions) -> Result<Signature, LedgerError>;

    /// Wait until `signature` reaches `commitment`
    ///
    /// Implementations wait indefinitely; callers bound the wait. A transaction
    /// that executed with an error resolves to `LedgerError::Rejected`.
    async fn confirm(
        &self,
        signature: &Signature,
        commitment: CommitmentLevel,
    ) -> Result<Ack, LedgerError>;
}

/// The two named ledger connections
#[derive(Clone)]
pub struct LedgerPair {
    pub base: Arc<dyn LedgerClient>,
    pub ephemeral: Arc<dyn LedgerClient>,
}

impl LedgerPair {
    pub fn new(base: Arc<dyn LedgerClient>, ephemeral: Arc<dyn LedgerClient>) -> Self {
        Self { base, ephemeral }
    }

    /// Select a ledger by kind
    pub fn get(&self, kind: LedgerKind) -> &Arc<dyn LedgerClient> {
        match kind {
            LedgerKind::Base => &self.base,
            LedgerKind::Ephemeral => &self.ephemeral,
        }
    }
}
