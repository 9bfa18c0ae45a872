//! Delegation Lifecycle Controller
//!
//! The only entry point for writes. State machine once the account exists:
//!
//! ```text
//! Absent --initialize--> Resident --delegate--> Delegated
//!                        Resident <--undelegate-- Delegated
//!                        (increment: self-loop)   (increment, commit: self-loop)
//! ```
//!
//! Every call re-resolves status from the base ledger under the account lock
//! before routing. A failed transition leaves the account where it was; the
//! controller never compensates or retries.

use counter_interface::CounterProgram;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;

use crate::{
    config::{ClientConfig, ConfigError},
    error::{LedgerError, OperationError, OperationResult},
    ledger::{LedgerKind, LedgerPair},
    locator::AccountLocator,
    locks::AccountLocks,
    reconciler::{DualView, DualViewReconciler},
    resolver::{AccountStatus, DelegationResolver},
    router::{Confirmation, Operation, RouterConfig, TransactionRouter},
    rpc::RpcLedgerClient,
    wallet::Wallet,
};

/// Orchestrates delegate / commit / undelegate against two ledgers
pub struct DelegationController {
    locator: AccountLocator,
    resolver: DelegationResolver,
    reconciler: DualViewReconciler,
    router: TransactionRouter,
    locks: AccountLocks,
}

impl DelegationController {
    pub fn new(
        ledgers: LedgerPair,
        wallet: Arc<dyn Wallet>,
        program: CounterProgram,
        config: RouterConfig,
    ) -> Self {
        Self {
            locator: AccountLocator::counter(&program.program_id),
            resolver: DelegationResolver::new(
                ledgers.base.clone(),
                program.program_id,
                program.delegation_program_id,
            ),
            reconciler: DualViewReconciler::new(ledgers.clone(), program.program_id),
            router: TransactionRouter::new(ledgers, wallet, program, config),
            locks: AccountLocks::new(),
        }
    }

    /// Connect both ledgers over JSON-RPC as described by `config`
    pub fn connect(config: &ClientConfig, wallet: Arc<dyn Wallet>) -> Result<Self, ConnectError> {
        config.validate()?;
        let commitment = config.commitment_level()?;
        let base = RpcLedgerClient::new(
            &config.base_rpc_url,
            commitment,
            config.request_timeout(),
            config.poll_interval(),
        )
        .map_err(|source| ConnectError::Ledger {
            ledger: LedgerKind::Base,
            source,
        })?;
        let ephemeral = RpcLedgerClient::new(
            &config.ephemeral_rpc_url,
            commitment,
            config.request_timeout(),
            config.poll_interval(),
        )
        .map_err(|source| ConnectError::Ledger {
            ledger: LedgerKind::Ephemeral,
            source,
        })?;

        tracing::info!(
            "Connected base={} ephemeral={} wallet={}",
            config.base_rpc_url,
            config.ephemeral_rpc_url,
            wallet.pubkey()
        );

        Ok(Self::new(
            LedgerPair::new(Arc::new(base), Arc::new(ephemeral)),
            wallet,
            config.program()?,
            config.router_config()?,
        ))
    }

    /// Address of the counter account, derived once at construction
    pub fn counter_address(&self) -> Pubkey {
        self.locator.address()
    }

    /// Fresh delegation status of `address`
    pub async fn status(&self, address: &Pubkey) -> OperationResult<AccountStatus> {
        self.resolver.resolve(address).await
    }

    /// Both ledgers' copies of `address`, for display
    pub async fn dual_view(&self, address: &Pubkey) -> OperationResult<DualView> {
        self.reconciler.reconcile(address).await
    }

    /// Run `operation` on `address`
    ///
    /// Lifecycle operations hold the account lock exclusively; increments hold
    /// it shared. Cancelling (dropping) this future after broadcast abandons
    /// only the wait; the transaction may still land, so re-check `status`.
    pub async fn perform(
        &self,
        operation: Operation,
        address: &Pubkey,
    ) -> OperationResult<Confirmation> {
        let _guard = self.locks.acquire(address, operation.is_lifecycle()).await;

        let status = self.resolver.resolve(address).await?;
        let plan = self.router.route(operation, status)?;
        tracing::debug!("Plan for {} on {}: {:?}", operation, address, plan);

        let confirmation = self.router.execute(&plan, address).await?;
        if operation.is_lifecycle() {
            tracing::info!(
                "{} of {} complete (was {}), signature {}",
                operation,
                address,
                status,
                confirmation.signature
            );
        }
        Ok(confirmation)
    }

    pub async fn initialize(&self, address: &Pubkey) -> OperationResult<Confirmation> {
        self.perform(Operation::Initialize, address).await
    }

    pub async fn delegate(&self, address: &Pubkey) -> OperationResult<Confirmation> {
        self.perform(Operation::Delegate, address).await
    }

    pub async fn commit(&self, address: &Pubkey) -> OperationResult<Confirmation> {
        self.perform(Operation::Commit, address).await
    }

    pub async fn undelegate(&self, address: &Pubkey) -> OperationResult<Confirmation> {
        self.perform(Operation::Undelegate, address).await
    }

    /// Increment on whichever ledger currently has authority
    pub async fn increment(&self, address: &Pubkey) -> OperationResult<Confirmation> {
        let _guard = self.locks.shared(address).await;

        let status = self.resolver.resolve(address).await?;
        let operation = match status.delegation() {
            Some(delegation) => Operation::increment_for(delegation),
            None => {
                return Err(OperationError::RoutingPrecondition {
                    operation: Operation::IncrementBase,
                    status,
                })
            }
        };

        let plan = self.router.route(operation, status)?;
        self.router.execute(&plan, address).await
    }
}

/// Errors while building a controller from configuration
#[derive(thiserror::Error, Debug)]
pub enum ConnectError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to connect to the {ledger} ledger: {source}")]
    Ledger {
        ledger: LedgerKind,
        #[source]
        source: LedgerError,
    },
}
