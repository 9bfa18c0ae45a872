//! Dual-View Reconciler
//!
//! Reads the managed account from both ledgers concurrently and merges the
//! two copies for display. While a delegation is active the copies legitimately
//! differ: the ephemeral layer holds the live value, the base ledger holds the
//! value as of the last commit. This view never gates a write.

use counter_interface::CounterAccount;
use serde::Serialize;
use solana_sdk::{account::Account, pubkey::Pubkey};

use crate::{
    error::{LedgerError, OperationError, OperationResult},
    ledger::{LedgerKind, LedgerPair},
    resolver::{classify_owner, DelegationStatus},
};

fn as_base58<S: serde::Serializer>(key: &Pubkey, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(key)
}

/// One ledger's copy of the managed account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ManagedAccount {
    #[serde(serialize_with = "as_base58")]
    pub address: Pubkey,
    pub ledger: LedgerKind,
    pub counter_value: u32,
    pub bump: u8,
    #[serde(serialize_with = "as_base58")]
    pub owner_program: Pubkey,
}

impl ManagedAccount {
    pub fn decode(
        address: Pubkey,
        ledger: LedgerKind,
        account: &Account,
    ) -> Result<Self, LedgerError> {
        let state = CounterAccount::try_from_account_data(&account.data)
            .map_err(|e| LedgerError::Decode(e.to_string()))?;
        Ok(Self {
            address,
            ledger,
            counter_value: state.data,
            bump: state.bump,
            owner_program: account.owner,
        })
    }
}

/// Both ledgers' copies of the managed account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DualView {
    #[serde(serialize_with = "as_base58")]
    pub address: Pubkey,
    pub base: Option<ManagedAccount>,
    pub ephemeral: Option<ManagedAccount>,
    /// Side whose read failed, if any (its copy is reported absent)
    pub unavailable: Option<LedgerKind>,
    #[serde(skip)]
    program_id: Pubkey,
}

impl DualView {
    /// Delegation status implied by the base copy, if the base copy was read
    pub fn status(&self) -> Option<DelegationStatus> {
        self.base
            .as_ref()
            .map(|base| classify_owner(&base.owner_program, &self.program_id))
    }

    /// Copy held by the ledger that currently has write authority
    pub fn canonical(&self) -> Option<&ManagedAccount> {
        match self.status()? {
            DelegationStatus::Resident => self.base.as_ref(),
            DelegationStatus::Delegated => self.ephemeral.as_ref(),
        }
    }

    /// The other ledger's copy, for staleness diagnostics
    pub fn shadow(&self) -> Option<&ManagedAccount> {
        match self.status()? {
            DelegationStatus::Resident => self.ephemeral.as_ref(),
            DelegationStatus::Delegated => self.base.as_ref(),
        }
    }

    /// True when both copies exist and hold different counter values
    pub fn is_diverged(&self) -> bool {
        match (&self.base, &self.ephemeral) {
            (Some(base), Some(ephemeral)) => base.counter_value != ephemeral.counter_value,
            _ => false,
        }
    }

    pub fn get(&self, ledger: LedgerKind) -> Option<&ManagedAccount> {
        match ledger {
            LedgerKind::Base => self.base.as_ref(),
            LedgerKind::Ephemeral => self.ephemeral.as_ref(),
        }
    }
}

/// Merges base and ephemeral reads of one account
#[derive(Clone)]
pub struct DualViewReconciler {
    ledgers: LedgerPair,
    program_id: Pubkey,
}

impl DualViewReconciler {
    pub fn new(ledgers: LedgerPair, program_id: Pubkey) -> Self {
        Self { ledgers, program_id }
    }

    /// Read `address` from both ledgers; fails only if both reads fail
    pub async fn reconcile(&self, address: &Pubkey) -> OperationResult<DualView> {
        let (base, ephemeral) = futures::join!(
            self.read(LedgerKind::Base, address),
            self.read(LedgerKind::Ephemeral, address)
        );

        let (base, ephemeral, unavailable) = match (base, ephemeral) {
            (Ok(base), Ok(ephemeral)) => (base, ephemeral, None),
            (Ok(base), Err(e)) => {
                tracing::warn!("Ephemeral view of {} unavailable: {}", address, e);
                (base, None, Some(LedgerKind::Ephemeral))
            }
            (Err(e), Ok(ephemeral)) => {
                tracing::warn!("Base view of {} unavailable: {}", address, e);
                (None, ephemeral, Some(LedgerKind::Base))
            }
            (Err(base), Err(ephemeral)) => {
                return Err(OperationError::ViewUnavailable { base, ephemeral });
            }
        };

        let view = DualView {
            address: *address,
            base,
            ephemeral,
            unavailable,
            program_id: self.program_id,
        };
        if view.is_diverged() {
            tracing::debug!(
                "Views of {} differ: base={:?} ephemeral={:?}",
                address,
                view.base.map(|a| a.counter_value),
                view.ephemeral.map(|a| a.counter_value)
            );
        }
        Ok(view)
    }

    async fn read(
        &self,
        ledger: LedgerKind,
        address: &Pubkey,
    ) -> Result<Option<ManagedAccount>, LedgerError> {
        self.ledgers
            .get(ledger)
            .get_account(address)
            .await?
            .map(|account| ManagedAccount::decode(*address, ledger, &account))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{counter_account, StubLedger};
    use counter_interface::DELEGATION_PROGRAM_ID;
    use std::sync::Arc;

    fn reconciler(base: Arc<StubLedger>, ephemeral: Arc<StubLedger>) -> DualViewReconciler {
        DualViewReconciler::new(LedgerPair::new(base, ephemeral), counter_interface::id())
    }

    #[tokio::test]
    async fn test_resident_view_prefers_base() {
        let program = counter_interface::id();
        let view = reconciler(
            StubLedger::with_account(Some(counter_account(program, 4))),
            StubLedger::with_account(None),
        )
        .reconcile(&Pubkey::new_unique())
        .await
        .unwrap();

        assert_eq!(view.status(), Some(DelegationStatus::Resident));
        assert_eq!(view.canonical().unwrap().counter_value, 4);
        assert_eq!(view.canonical().unwrap().ledger, LedgerKind::Base);
        assert!(view.shadow().is_none());
        assert!(!view.is_diverged());
    }

    #[tokio::test]
    async fn test_delegated_view_prefers_ephemeral() {
        let view = reconciler(
            StubLedger::with_account(Some(counter_account(DELEGATION_PROGRAM_ID, 1))),
            StubLedger::with_account(Some(counter_account(counter_interface::id(), 3))),
        )
        .reconcile(&Pubkey::new_unique())
        .await
        .unwrap();

        assert_eq!(view.status(), Some(DelegationStatus::Delegated));
        assert_eq!(view.canonical().unwrap().counter_value, 3);
        assert_eq!(view.shadow().unwrap().counter_value, 1);
        assert!(view.is_diverged());
    }

    #[tokio::test]
    async fn test_one_failed_side_is_absent() {
        let view = reconciler(
            StubLedger::with_account(Some(counter_account(DELEGATION_PROGRAM_ID, 1))),
            StubLedger::failing(LedgerError::Transport("timeout".into())),
        )
        .reconcile(&Pubkey::new_unique())
        .await
        .unwrap();

        assert!(view.base.is_some());
        assert!(view.ephemeral.is_none());
        assert_eq!(view.unavailable, Some(LedgerKind::Ephemeral));
        assert!(view.canonical().is_none());
    }

    #[tokio::test]
    async fn test_undecodable_side_is_absent() {
        let mut garbage = counter_account(counter_interface::id(), 0);
        garbage.data = vec![0u8; 13];
        let view = reconciler(
            StubLedger::with_account(Some(garbage)),
            StubLedger::with_account(None),
        )
        .reconcile(&Pubkey::new_unique())
        .await
        .unwrap();

        assert_eq!(view.unavailable, Some(LedgerKind::Base));
        assert!(view.status().is_none());
    }

    #[tokio::test]
    async fn test_both_sides_failed() {
        let err = reconciler(
            StubLedger::failing(LedgerError::Transport("base down".into())),
            StubLedger::failing(LedgerError::Transport("rollup down".into())),
        )
        .reconcile(&Pubkey::new_unique())
        .await
        .unwrap_err();

        assert!(matches!(err, OperationError::ViewUnavailable { .. }));
        assert!(err.to_string().contains("base down"));
        assert!(err.to_string().contains("rollup down"));
    }
}
