//! Transaction Router
//!
//! Maps an operation and the account's current status to a routing plan
//! (target ledger, signing authority, confirmation requirements) and then runs
//! the fixed submission sequence for that plan:
//!
//! 1. fresh recency token from the target ledger
//! 2. build and sign (ephemeral key and/or wallet)
//! 3. submit
//! 4. await confirmation when the plan requires it
//! 5. for commit/undelegate, await the checkpoint on the base ledger
//!
//! Precondition violations are rejected before anything is built or sent.

use counter_interface::{CounterInstruction, CounterProgram};
use serde::Serialize;
use solana_sdk::{
    clock::Slot, commitment_config::CommitmentLevel, message::Message, pubkey::Pubkey,
    signature::Signature, signer::Signer, transaction::Transaction,
};
use std::{fmt, sync::Arc, time::Duration};

use crate::{
    error::{LedgerError, OperationError, OperationResult, WalletError},
    ledger::{LedgerKind, LedgerPair, SubmitOptions},
    reconciler::ManagedAccount,
    resolver::{classify_owner, AccountStatus, DelegationStatus},
    wallet::{derive_ephemeral_keypair, Wallet},
};

/// Operations the interface layer can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Initialize,
    IncrementBase,
    IncrementEphemeral,
    Delegate,
    Commit,
    Undelegate,
}

impl Operation {
    pub fn instruction(&self) -> CounterInstruction {
        match self {
            Operation::Initialize => CounterInstruction::Initialize,
            Operation::IncrementBase | Operation::IncrementEphemeral => {
                CounterInstruction::Increment
            }
            Operation::Delegate => CounterInstruction::Delegate,
            Operation::Commit => CounterInstruction::Commit,
            Operation::Undelegate => CounterInstruction::Undelegate,
        }
    }

    /// Status the account must be in for this operation to be routed
    pub fn precondition(&self) -> AccountStatus {
        match self {
            Operation::Initialize => AccountStatus::Absent,
            Operation::IncrementBase | Operation::Delegate => AccountStatus::RESIDENT,
            Operation::IncrementEphemeral | Operation::Commit | Operation::Undelegate => {
                AccountStatus::DELEGATED
            }
        }
    }

    /// Lifecycle transitions need exclusive access to the account
    pub fn is_lifecycle(&self) -> bool {
        !matches!(self, Operation::IncrementBase | Operation::IncrementEphemeral)
    }

    /// Increment on whichever ledger has authority in `status`
    pub fn increment_for(status: DelegationStatus) -> Self {
        match status {
            DelegationStatus::Resident => Operation::IncrementBase,
            DelegationStatus::Delegated => Operation::IncrementEphemeral,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Initialize => write!(f, "initialize"),
            Operation::IncrementBase => write!(f, "increment (base)"),
            Operation::IncrementEphemeral => write!(f, "increment (ephemeral)"),
            Operation::Delegate => write!(f, "delegate"),
            Operation::Commit => write!(f, "commit"),
            Operation::Undelegate => write!(f, "undelegate"),
        }
    }
}

/// Which key pays for and signs the transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerRole {
    Wallet,
    EphemeralKey,
}

/// How long to wait before reporting success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmPolicy {
    /// Report on broadcast acceptance
    Broadcast,
    /// Wait for the configured commitment
    Confirmed,
}

/// What must become visible on the base ledger afterwards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    None,
    /// Base copy catches up with the ephemeral value
    Checkpoint,
    /// Base copy catches up and ownership returns to the managing program
    Release,
}

/// Routing decision for one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingPlan {
    pub operation: Operation,
    pub target: LedgerKind,
    pub signer: SignerRole,
    pub requires_ephemeral_key: bool,
    pub wallet_cosign: bool,
    pub confirm: ConfirmPolicy,
    pub settlement: Settlement,
}

/// Program-specific signing requirements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoutingPolicy {
    /// Whether `commit` needs the wallet as authority (undelegate always does)
    pub commit_requires_wallet: bool,
}

/// Route `operation` for an account in `status`
pub fn route(
    operation: Operation,
    status: AccountStatus,
    policy: RoutingPolicy,
) -> OperationResult<RoutingPlan> {
    if operation.precondition() != status {
        return Err(OperationError::RoutingPrecondition { operation, status });
    }

    let base = |confirm| RoutingPlan {
        operation,
        target: LedgerKind::Base,
        signer: SignerRole::Wallet,
        requires_ephemeral_key: false,
        wallet_cosign: false,
        confirm,
        settlement: Settlement::None,
    };
    let ephemeral = |confirm, wallet_cosign, settlement| RoutingPlan {
        operation,
        target: LedgerKind::Ephemeral,
        signer: SignerRole::EphemeralKey,
        requires_ephemeral_key: true,
        wallet_cosign,
        confirm,
        settlement,
    };

    Ok(match operation {
        Operation::Initialize | Operation::Delegate => base(ConfirmPolicy::Confirmed),
        Operation::IncrementBase => base(ConfirmPolicy::Broadcast),
        Operation::IncrementEphemeral => {
            ephemeral(ConfirmPolicy::Broadcast, false, Settlement::None)
        }
        Operation::Commit => ephemeral(
            ConfirmPolicy::Confirmed,
            policy.commit_requires_wallet,
            Settlement::Checkpoint,
        ),
        Operation::Undelegate => ephemeral(ConfirmPolicy::Confirmed, true, Settlement::Release),
    })
}

fn as_base58<S: serde::Serializer>(
    signature: &Signature,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(signature)
}

/// Outcome of a routed operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Confirmation {
    pub operation: Operation,
    pub ledger: LedgerKind,
    #[serde(serialize_with = "as_base58")]
    pub signature: Signature,
    /// Slot of the confirming status, when confirmation was awaited
    pub slot: Option<Slot>,
    /// False when reported on broadcast acceptance only
    pub confirmed: bool,
    /// True when the base ledger was observed to reflect the operation
    ///
    /// Settlement compares values only. A commit whose value the base ledger
    /// already holds settles on the first poll, whether or not its own write
    /// has arrived yet.
    pub settled: bool,
    /// Unix timestamp (seconds) when the outcome was observed
    pub observed_at: i64,
}

/// Router timing and submission settings
#[derive(Debug, Clone, Copy)]
pub struct RouterConfig {
    pub commitment: CommitmentLevel,
    pub skip_preflight: bool,
    pub confirm_timeout: Duration,
    pub settlement_timeout: Duration,
    pub poll_interval: Duration,
    pub policy: RoutingPolicy,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            commitment: CommitmentLevel::Confirmed,
            skip_preflight: true,
            confirm_timeout: Duration::from_secs(30),
            settlement_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
            policy: RoutingPolicy::default(),
        }
    }
}

/// Builds, signs, submits and confirms transactions on the right ledger
pub struct TransactionRouter {
    ledgers: LedgerPair,
    wallet: Arc<dyn Wallet>,
    program: CounterProgram,
    config: RouterConfig,
}

impl TransactionRouter {
    pub fn new(
        ledgers: LedgerPair,
        wallet: Arc<dyn Wallet>,
        program: CounterProgram,
        config: RouterConfig,
    ) -> Self {
        Self {
            ledgers,
            wallet,
            program,
            config,
        }
    }

    pub fn route(
        &self,
        operation: Operation,
        status: AccountStatus,
    ) -> OperationResult<RoutingPlan> {
        route(operation, status, self.config.policy)
    }

    /// Run `plan` against `address`
    ///
    /// Once the transaction is broadcast it cannot be withdrawn. Dropping the
    /// returned future abandons only the wait, never the ledger effect.
    pub async fn execute(
        &self,
        plan: &RoutingPlan,
        address: &Pubkey,
    ) -> OperationResult<Confirmation> {
        let wallet = self.wallet.pubkey();
        // Lives only for this call
        let ephemeral_key = if plan.requires_ephemeral_key {
            Some(derive_ephemeral_keypair(&wallet)?)
        } else {
            None
        };

        let fee_payer = match (plan.signer, &ephemeral_key) {
            (SignerRole::EphemeralKey, Some(key)) => key.pubkey(),
            _ => wallet,
        };
        let authority = if plan.wallet_cosign { wallet } else { fee_payer };

        // Value the base ledger must converge to after commit/undelegate
        let checkpoint = match plan.settlement {
            Settlement::None => None,
            Settlement::Checkpoint | Settlement::Release => self.ephemeral_value(address).await?,
        };

        tracing::debug!(
            "Routing {} for {} to {} ledger (payer {}, authority {})",
            plan.operation,
            address,
            plan.target,
            fee_payer,
            authority
        );

        let ledger = self.ledgers.get(plan.target);
        let blockhash = ledger
            .get_recency_token()
            .await
            .map_err(|source| OperationError::ResolutionFailed {
                address: *address,
                ledger: plan.target,
                source,
            })?;

        let instruction = self
            .program
            .instruction(plan.operation.instruction(), *address, authority);
        let message = Message::new_with_blockhash(&[instruction], Some(&fee_payer), &blockhash);
        let mut tx = Transaction::new_unsigned(message);

        if let Some(key) = &ephemeral_key {
            tx.try_partial_sign(&[key], blockhash)
                .map_err(|e| WalletError::Signing(e.to_string()))?;
        }
        if plan.signer == SignerRole::Wallet || plan.wallet_cosign {
            tx = self.wallet.sign_transaction(tx).await?;
        }

        let signature = tx.signatures[0];
        let wire = bincode::serialize(&tx).map_err(|e| OperationError::SubmissionFailed {
            ledger: plan.target,
            reason: format!("transaction encoding: {}", e),
        })?;

        let opts = SubmitOptions {
            skip_preflight: self.config.skip_preflight,
        };
        match ledger.submit(&wire, opts).await {
            Ok(_) => {}
            Err(LedgerError::Rejected(reason)) => {
                tracing::warn!("{} rejected by {}: {}", plan.operation, ledger.endpoint(), reason);
                return Err(OperationError::SubmissionFailed {
                    ledger: plan.target,
                    reason,
                });
            }
            Err(e) => {
                // The request may have reached the ledger before failing
                tracing::warn!(
                    "{} submission to {} outcome unknown ({}): {}",
                    plan.operation,
                    ledger.endpoint(),
                    signature,
                    e
                );
                return Err(OperationError::ConfirmationTimeout {
                    ledger: plan.target,
                    signature,
                    waited: Duration::ZERO,
                });
            }
        }
        tracing::info!("{} submitted to {}: {}", plan.operation, ledger.endpoint(), signature);

        let slot = match plan.confirm {
            ConfirmPolicy::Broadcast => None,
            ConfirmPolicy::Confirmed => Some(self.await_confirmation(plan, &signature).await?),
        };

        let settled = match plan.settlement {
            Settlement::None => false,
            settlement => self.await_settlement(settlement, address, checkpoint, &signature).await?,
        };

        Ok(Confirmation {
            operation: plan.operation,
            ledger: plan.target,
            signature,
            slot,
            confirmed: slot.is_some(),
            settled,
            observed_at: chrono::Utc::now().timestamp(),
        })
    }

    async fn ephemeral_value(&self, address: &Pubkey) -> OperationResult<Option<u32>> {
        let account = self
            .ledgers
            .ephemeral
            .get_account(address)
            .await
            .map_err(|source| OperationError::ResolutionFailed {
                address: *address,
                ledger: LedgerKind::Ephemeral,
                source,
            })?;

        match account {
            Some(account) => ManagedAccount::decode(*address, LedgerKind::Ephemeral, &account)
                .map(|managed| Some(managed.counter_value))
                .map_err(|source| OperationError::ResolutionFailed {
                    address: *address,
                    ledger: LedgerKind::Ephemeral,
                    source,
                }),
            None => Ok(None),
        }
    }

    async fn await_confirmation(
        &self,
        plan: &RoutingPlan,
        signature: &Signature,
    ) -> OperationResult<Slot> {
        let ledger = self.ledgers.get(plan.target);
        let waited = self.config.confirm_timeout;

        let confirm = ledger.confirm(signature, self.config.commitment);
        match tokio::time::timeout(waited, confirm).await {
            Ok(Ok(ack)) => {
                tracing::info!(
                    "{} confirmed on {} at slot {}: {}",
                    plan.operation,
                    ledger.endpoint(),
                    ack.slot,
                    signature
                );
                Ok(ack.slot)
            }
            Ok(Err(e @ LedgerError::Rejected(_))) => {
                tracing::warn!("{} failed on {} ledger: {}", plan.operation, plan.target, e);
                Err(OperationError::from_submission(plan.target, e))
            }
            Ok(Err(e)) => {
                tracing::warn!("{} confirmation for {} failed: {}", plan.operation, signature, e);
                Err(OperationError::ConfirmationTimeout {
                    ledger: plan.target,
                    signature: *signature,
                    waited,
                })
            }
            Err(_) => {
                tracing::warn!(
                    "{} not confirmed within {:?}: {}",
                    plan.operation,
                    waited,
                    signature
                );
                Err(OperationError::ConfirmationTimeout {
                    ledger: plan.target,
                    signature: *signature,
                    waited,
                })
            }
        }
    }

    /// Poll the base ledger until the checkpoint is visible
    async fn await_settlement(
        &self,
        settlement: Settlement,
        address: &Pubkey,
        checkpoint: Option<u32>,
        signature: &Signature,
    ) -> OperationResult<bool> {
        if settlement == Settlement::Checkpoint && checkpoint.is_none() {
            tracing::warn!("No ephemeral copy of {} to checkpoint; not waiting for base", address);
            return Ok(false);
        }

        let program_id = self.program.program_id;
        let base = &self.ledgers.base;
        let poll_interval = self.config.poll_interval;
        let waited = self.config.settlement_timeout;

        let poll = async {
            loop {
                match base.get_account(address).await {
                    Ok(Some(account)) => {
                        let value = ManagedAccount::decode(*address, LedgerKind::Base, &account)
                            .ok()
                            .map(|managed| managed.counter_value);
                        let value_matches = checkpoint.is_none() || value == checkpoint;
                        let released = classify_owner(&account.owner, &program_id)
                            == DelegationStatus::Resident;
                        let owner_matches = settlement != Settlement::Release || released;
                        if value_matches && owner_matches {
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => tracing::debug!("Settlement poll for {} failed: {}", address, e),
                }
                tokio::time::sleep(poll_interval).await;
            }
        };

        match tokio::time::timeout(waited, poll).await {
            Ok(()) => {
                tracing::info!("Base ledger reflects {:?} of {}", settlement, address);
                Ok(true)
            }
            Err(_) => {
                tracing::warn!(
                    "Base ledger did not reflect {:?} of {} within {:?}",
                    settlement,
                    address,
                    waited
                );
                Err(OperationError::ConfirmationTimeout {
                    ledger: LedgerKind::Base,
                    signature: *signature,
                    waited,
                })
            }
        }
    }
}
