//! Simulated base ledger + ephemeral rollup pair

use counter_interface::{CounterAccount, CounterProgram};
use er_client::{LedgerKind, LedgerPair};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;

use crate::{account_store::AccountStore, ledger::SimulatedLedger};

/// Two linked in-memory ledgers
///
/// Delegating on the base ledger clones the account into the rollup;
/// commit and undelegate on the rollup write back to the base ledger.
#[derive(Clone)]
pub struct SimulatedCluster {
    base: Arc<SimulatedLedger>,
    ephemeral: Arc<SimulatedLedger>,
    program: CounterProgram,
}

impl SimulatedCluster {
    pub fn new(program: CounterProgram) -> Self {
        let base_store = AccountStore::new();
        let ephemeral_store = AccountStore::new();

        let base = SimulatedLedger::new(
            LedgerKind::Base,
            program,
            base_store.clone(),
            ephemeral_store.clone(),
        );
        let ephemeral =
            SimulatedLedger::new(LedgerKind::Ephemeral, program, ephemeral_store, base_store);

        tracing::debug!("Simulated cluster for program {}", program.program_id);

        Self {
            base: Arc::new(base),
            ephemeral: Arc::new(ephemeral),
            program,
        }
    }

    pub fn base(&self) -> &Arc<SimulatedLedger> {
        &self.base
    }

    pub fn ephemeral(&self) -> &Arc<SimulatedLedger> {
        &self.ephemeral
    }

    pub fn get(&self, kind: LedgerKind) -> &Arc<SimulatedLedger> {
        match kind {
            LedgerKind::Base => &self.base,
            LedgerKind::Ephemeral => &self.ephemeral,
        }
    }

    pub fn program(&self) -> CounterProgram {
        self.program
    }

    /// Both ledgers as client capabilities
    pub fn ledgers(&self) -> LedgerPair {
        LedgerPair::new(self.base.clone(), self.ephemeral.clone())
    }

    /// Submissions received by both ledgers
    pub fn total_submissions(&self) -> usize {
        self.base.submissions() + self.ephemeral.submissions()
    }

    /// Counter value held by `kind` for `address`, bypassing faults
    pub fn counter_value(&self, kind: LedgerKind, address: &Pubkey) -> Option<u32> {
        let account = self.get(kind).account(address)?;
        CounterAccount::try_from_account_data(&account.data)
            .ok()
            .map(|state| state.data)
    }

    /// Owner of `address` on the base ledger
    pub fn base_owner(&self, address: &Pubkey) -> Option<Pubkey> {
        self.base.account(address).map(|a| a.owner)
    }
}

impl Default for SimulatedCluster {
    fn default() -> Self {
        Self::new(CounterProgram::default())
    }
}
