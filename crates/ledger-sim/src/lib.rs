//! Ledger Sim - in-memory ledgers for the delegation lifecycle
//!
//! This crate provides a base ledger and an ephemeral rollup that speak the
//! `er_client::LedgerClient` capability:
//! - Account storage per ledger, shared with the peer for cross-ledger effects
//! - Counter program execution with delegation ownership rules
//! - Fault injection (failed reads, withheld confirmations, lost submissions,
//!   delayed settlement) and submission counting

pub mod account_store;
pub mod cluster;
pub mod ledger;
pub mod processor;

#[cfg(test)]
mod tests;

pub use account_store::AccountStore;
pub use cluster::SimulatedCluster;
pub use ledger::SimulatedLedger;
pub use processor::{CounterProcessor, ExecutionError, PeerEffect, ProgramError};
