//! Error taxonomy for reads, routing and submission

use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::time::Duration;
use thiserror::Error;

use crate::{ledger::LedgerKind, resolver::AccountStatus, router::Operation};

/// Errors reported by a single ledger endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Network failure, timeout or malformed RPC response
    #[error("Transport error: {0}")]
    Transport(String),

    /// The ledger refused or failed the transaction
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Account data could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Wallet and key errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Ephemeral key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Failed to load keypair: {0}")]
    Load(String),
}

/// Failure kinds surfaced to the interface layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ErrorKind {
    /// Transient read failure, the read may be retried
    ResolutionFailed,
    /// Operation is illegal in the current delegation state; re-check status first
    RoutingPrecondition,
    /// Nothing was applied
    SubmissionFailed,
    /// Outcome unknown; re-resolve status, never resubmit blindly
    ConfirmationTimeout,
}

/// Errors returned by lifecycle and routing operations
#[derive(Error, Debug)]
pub enum OperationError {
    #[error("Failed to resolve {address} on the {ledger} ledger: {source}")]
    ResolutionFailed {
        address: Pubkey,
        ledger: LedgerKind,
        #[source]
        source: LedgerError,
    },

    #[error("Cannot {operation} while account is {status}")]
    RoutingPrecondition {
        operation: Operation,
        status: AccountStatus,
    },

    #[error("Transaction rejected by the {ledger} ledger: {reason}")]
    SubmissionFailed { ledger: LedgerKind, reason: String },

    #[error("No confirmation for {signature} on the {ledger} ledger after {waited:?}; re-check status before retrying")]
    ConfirmationTimeout {
        ledger: LedgerKind,
        signature: Signature,
        waited: Duration,
    },

    #[error("Both ledgers unavailable (base: {base}; ephemeral: {ephemeral})")]
    ViewUnavailable {
        base: LedgerError,
        ephemeral: LedgerError,
    },

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),
}

impl OperationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OperationError::ResolutionFailed { .. } | OperationError::ViewUnavailable { .. } => {
                ErrorKind::ResolutionFailed
            }
            OperationError::RoutingPrecondition { .. } => ErrorKind::RoutingPrecondition,
            OperationError::SubmissionFailed { .. } | OperationError::Wallet(_) => {
                ErrorKind::SubmissionFailed
            }
            OperationError::ConfirmationTimeout { .. } => ErrorKind::ConfirmationTimeout,
        }
    }

    /// True when the transaction may or may not have landed
    pub fn is_ambiguous(&self) -> bool {
        self.kind() == ErrorKind::ConfirmationTimeout
    }

    /// Map a ledger error raised while submitting or confirming
    pub(crate) fn from_submission(ledger: LedgerKind, error: LedgerError) -> Self {
        OperationError::SubmissionFailed {
            ledger,
            reason: error.to_string(),
        }
    }
}

pub type OperationResult<T> = Result<T, OperationError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::DelegationStatus;

    #[test]
    fn test_error_kinds() {
        let precondition = OperationError::RoutingPrecondition {
            operation: Operation::IncrementEphemeral,
            status: AccountStatus::Present(DelegationStatus::Resident),
        };
        assert_eq!(precondition.kind(), ErrorKind::RoutingPrecondition);
        assert!(!precondition.is_ambiguous());

        let timeout = OperationError::ConfirmationTimeout {
            ledger: LedgerKind::Base,
            signature: Signature::default(),
            waited: Duration::from_secs(30),
        };
        assert!(timeout.is_ambiguous());

        let wallet = OperationError::from(WalletError::Signing("user declined".into()));
        assert_eq!(wallet.kind(), ErrorKind::SubmissionFailed);
    }

    #[test]
    fn test_messages_carry_ledger_text() {
        let err = OperationError::from_submission(
            LedgerKind::Ephemeral,
            LedgerError::Rejected("custom program error: 0x0".into()),
        );
        let msg = err.to_string();
        assert!(msg.contains("ephemeral"));
        assert!(msg.contains("custom program error: 0x0"));
    }
}
