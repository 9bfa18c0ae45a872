//! Delegation State Resolver
//!
//! Classifies the managed account by its owner on the base ledger. Every call
//! performs a fresh read; nothing is cached between calls because the
//! delegation state changes as a side effect of our own transactions.

use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use std::{fmt, sync::Arc};

use crate::{
    error::{OperationError, OperationResult},
    ledger::{LedgerClient, LedgerKind},
};

/// Where write authority currently lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DelegationStatus {
    /// Owned by the managing program on the base ledger
    Resident,
    /// Owned by the delegation program; live state is on the ephemeral layer
    Delegated,
}

/// Result of a status check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountStatus {
    /// Not yet initialized on the base ledger
    Absent,
    Present(DelegationStatus),
}

impl AccountStatus {
    pub const RESIDENT: AccountStatus = AccountStatus::Present(DelegationStatus::Resident);
    pub const DELEGATED: AccountStatus = AccountStatus::Present(DelegationStatus::Delegated);

    pub fn delegation(&self) -> Option<DelegationStatus> {
        match self {
            AccountStatus::Absent => None,
            AccountStatus::Present(status) => Some(*status),
        }
    }
}

impl Serialize for AccountStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl fmt::Display for DelegationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelegationStatus::Resident => write!(f, "resident"),
            DelegationStatus::Delegated => write!(f, "delegated"),
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountStatus::Absent => write!(f, "absent"),
            AccountStatus::Present(status) => status.fmt(f),
        }
    }
}

/// Classify an owner against the managing program
pub fn classify_owner(owner: &Pubkey, program_id: &Pubkey) -> DelegationStatus {
    if owner == program_id {
        DelegationStatus::Resident
    } else {
        DelegationStatus::Delegated
    }
}

/// Reads base-ledger ownership of the managed account
#[derive(Clone)]
pub struct DelegationResolver {
    base: Arc<dyn LedgerClient>,
    program_id: Pubkey,
    delegation_program_id: Pubkey,
}

impl DelegationResolver {
    pub fn new(
        base: Arc<dyn LedgerClient>,
        program_id: Pubkey,
        delegation_program_id: Pubkey,
    ) -> Self {
        Self {
            base,
            program_id,
            delegation_program_id,
        }
    }

    /// Fetch `address` from the base ledger and classify it
    pub async fn resolve(&self, address: &Pubkey) -> OperationResult<AccountStatus> {
        let account = self
            .base
            .get_account(address)
            .await
            .map_err(|source| OperationError::ResolutionFailed {
                address: *address,
                ledger: LedgerKind::Base,
                source,
            })?;

        let Some(account) = account else {
            tracing::debug!("Account {} absent on base ledger", address);
            return Ok(AccountStatus::Absent);
        };

        let status = classify_owner(&account.owner, &self.program_id);
        if status == DelegationStatus::Delegated && account.owner != self.delegation_program_id {
            tracing::warn!(
                "Account {} owned by unexpected program {}, treating as delegated",
                address,
                account.owner
            );
        }

        tracing::debug!("Account {} resolved as {}", address, status);
        Ok(AccountStatus::Present(status))
    }
}
