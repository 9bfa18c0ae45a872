//! ER Client - dual-ledger delegation lifecycle
//!
//! Manages a counter account that moves between a base ledger and an
//! ephemeral rollup:
//! - Delegation status resolved fresh from base-ledger ownership
//! - Routing of each operation to the ledger with write authority
//! - Signing with the wallet or a derived ephemeral key
//! - Confirmation and base-ledger settlement tracking
//! - Side-by-side view of both ledgers' copies

pub mod config;
pub mod controller;
pub mod error;
pub mod ledger;
pub mod locator;
pub mod locks;
pub mod reconciler;
pub mod resolver;
pub mod router;
pub mod rpc;
pub mod wallet;

#[cfg(test)]
mod test_support;

pub use config::{ClientConfig, ConfigError};
pub use controller::{ConnectError, DelegationController};
pub use error::{ErrorKind, LedgerError, OperationError, OperationResult, WalletError};
pub use ledger::{Ack, LedgerClient, LedgerKind, LedgerPair, SubmitOptions};
pub use locator::AccountLocator;
pub use locks::AccountLocks;
pub use reconciler::{DualView, DualViewReconciler, ManagedAccount};
pub use resolver::{AccountStatus, DelegationResolver, DelegationStatus};
pub use router::{
    Confirmation, ConfirmPolicy, Operation, RouterConfig, RoutingPlan, RoutingPolicy, Settlement,
    SignerRole, TransactionRouter,
};
pub use rpc::RpcLedgerClient;
pub use wallet::{derive_ephemeral_keypair, KeypairWallet, Wallet};
