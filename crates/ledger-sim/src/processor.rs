//! Counter Program Processor
//!
//! Executes the counter program's five instructions against one ledger's
//! account store, with the ownership rules of the delegation program:
//! - base ledger: initialize, increment (owner must be the counter program), delegate
//! - ephemeral ledger: increment on the delegated clone, commit, undelegate
//!
//! A transaction is executed against a staging overlay and only written back
//! if every instruction succeeds. Effects on the other ledger are returned as
//! `PeerEffect`s for the caller to apply.

use counter_interface::{
    constants::PDA_SEED, derive_counter_pda, derive_delegation_record_pda, CounterAccount,
    CounterInstruction, CounterProgram,
};
use er_client::LedgerKind;
use solana_sdk::{
    account::Account, pubkey::Pubkey, rent::Rent, transaction::Transaction,
};
use std::collections::HashMap;
use thiserror::Error;

use crate::account_store::AccountStore;

/// Counter program errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProgramError {
    #[error("Unknown program {0}")]
    UnknownProgram(Pubkey),

    #[error("Invalid instruction data")]
    InvalidInstructionData,

    #[error("Not enough account keys")]
    NotEnoughAccountKeys,

    #[error("Missing required signature")]
    MissingRequiredSignature,

    #[error("Invalid seeds")]
    InvalidSeeds,

    #[error("Account already initialized")]
    AccountAlreadyInitialized,

    #[error("Account not initialized")]
    AccountNotInitialized,

    #[error("Invalid account owner")]
    InvalidAccountOwner,

    #[error("Invalid account data: {0}")]
    InvalidAccountData(String),

    #[error("Arithmetic overflow")]
    ArithmeticOverflow,

    #[error("{instruction} is not available on the {ledger} ledger")]
    UnsupportedOnLedger {
        instruction: &'static str,
        ledger: LedgerKind,
    },
}

/// A failed transaction, attributed to the instruction that failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Error processing Instruction {index}: {error}")]
pub struct ExecutionError {
    pub index: usize,
    pub error: ProgramError,
}

/// A write this ledger's execution causes on the other ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEffect {
    /// The rollup clones the delegated account, owned by the counter program
    Clone { address: Pubkey, account: Account },
    /// The base copy takes the rollup's data
    Checkpoint { address: Pubkey, data: Vec<u8> },
    /// Checkpoint, then ownership returns to the counter program and the
    /// delegation record is closed
    Release {
        address: Pubkey,
        data: Vec<u8>,
        owner: Pubkey,
        record: Pubkey,
    },
}

impl PeerEffect {
    pub fn address(&self) -> Pubkey {
        match self {
            PeerEffect::Clone { address, .. }
            | PeerEffect::Checkpoint { address, .. }
            | PeerEffect::Release { address, .. } => *address,
        }
    }

    /// Write this effect into the peer ledger's store
    pub fn apply(&self, store: &AccountStore) {
        match self {
            PeerEffect::Clone { address, account } => {
                store.store_account(*address, account.clone());
            }
            PeerEffect::Checkpoint { address, data } => {
                if !store.update_account(address, |a| a.data = data.clone()) {
                    tracing::warn!("Checkpoint for {} found no base account", address);
                }
            }
            PeerEffect::Release {
                address,
                data,
                owner,
                record,
            } => {
                let released = store.update_account(address, |a| {
                    a.data = data.clone();
                    a.owner = *owner;
                });
                if !released {
                    tracing::warn!("Release for {} found no base account", address);
                }
                store.remove_account(record);
            }
        }
    }
}

/// Result of a successful transaction
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Account writes on this ledger; `None` closes the account
    pub writes: Vec<(Pubkey, Option<Account>)>,
    pub effects: Vec<PeerEffect>,
    pub logs: Vec<String>,
}

struct InstructionAccount {
    key: Pubkey,
    is_signer: bool,
}

/// Staged view of the store for one transaction
struct Overlay<'a> {
    store: &'a AccountStore,
    staged: HashMap<Pubkey, Option<Account>>,
    order: Vec<Pubkey>,
}

impl<'a> Overlay<'a> {
    fn new(store: &'a AccountStore) -> Self {
        Self {
            store,
            staged: HashMap::new(),
            order: Vec::new(),
        }
    }

    fn get(&self, key: &Pubkey) -> Option<Account> {
        match self.staged.get(key) {
            Some(staged) => staged.clone(),
            None => self.store.get_account(key),
        }
    }

    fn set(&mut self, key: Pubkey, account: Option<Account>) {
        if self.staged.insert(key, account).is_none() {
            self.order.push(key);
        }
    }

    fn into_writes(mut self) -> Vec<(Pubkey, Option<Account>)> {
        self.order
            .into_iter()
            .filter_map(|key| self.staged.remove(&key).map(|account| (key, account)))
            .collect()
    }
}

/// Interprets counter program instructions for one ledger
#[derive(Debug, Clone, Copy)]
pub struct CounterProcessor {
    program: CounterProgram,
    ledger: LedgerKind,
}

impl CounterProcessor {
    pub fn new(program: CounterProgram, ledger: LedgerKind) -> Self {
        Self { program, ledger }
    }

    /// Execute every instruction of `tx`; nothing is staged on failure
    pub fn process_transaction(
        &self,
        tx: &Transaction,
        store: &AccountStore,
    ) -> Result<ProcessOutput, ExecutionError> {
        let mut overlay = Overlay::new(store);
        let mut effects = Vec::new();
        let mut logs = Vec::new();

        for (index, ix) in tx.message.instructions.iter().enumerate() {
            let fail = |error| ExecutionError { index, error };

            let program_id = tx
                .message
                .account_keys
                .get(ix.program_id_index as usize)
                .copied()
                .ok_or_else(|| fail(ProgramError::NotEnoughAccountKeys))?;
            if program_id != self.program.program_id {
                return Err(fail(ProgramError::UnknownProgram(program_id)));
            }

            let accounts = ix
                .accounts
                .iter()
                .map(|&i| {
                    let i = i as usize;
                    tx.message
                        .account_keys
                        .get(i)
                        .map(|key| InstructionAccount {
                            key: *key,
                            is_signer: tx.message.is_signer(i),
                        })
                        .ok_or(ProgramError::NotEnoughAccountKeys)
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(fail)?;

            let instruction = CounterInstruction::from_data(&ix.data)
                .ok_or_else(|| fail(ProgramError::InvalidInstructionData))?;
            logs.push(format!("Program log: Instruction: {}", instruction.name()));

            let effect = self
                .process_instruction(instruction, &accounts, &mut overlay, &mut logs)
                .map_err(fail)?;
            effects.extend(effect);
        }

        Ok(ProcessOutput {
            writes: overlay.into_writes(),
            effects,
            logs,
        })
    }

    fn process_instruction(
        &self,
        instruction: CounterInstruction,
        accounts: &[InstructionAccount],
        overlay: &mut Overlay,
        logs: &mut Vec<String>,
    ) -> Result<Option<PeerEffect>, ProgramError> {
        match (instruction, self.ledger) {
            (CounterInstruction::Initialize, LedgerKind::Base) => {
                self.process_initialize(accounts, overlay).map(|_| None)
            }
            (CounterInstruction::Increment, _) => {
                self.process_increment(accounts, overlay, logs).map(|_| None)
            }
            (CounterInstruction::Delegate, LedgerKind::Base) => {
                self.process_delegate(accounts, overlay).map(Some)
            }
            (CounterInstruction::Commit, LedgerKind::Ephemeral) => {
                self.process_commit(accounts, overlay, false).map(Some)
            }
            (CounterInstruction::Undelegate, LedgerKind::Ephemeral) => {
                self.process_commit(accounts, overlay, true).map(Some)
            }
            (instruction, ledger) => Err(ProgramError::UnsupportedOnLedger {
                instruction: instruction.name(),
                ledger,
            }),
        }
    }

    fn process_initialize(
        &self,
        accounts: &[InstructionAccount],
        overlay: &mut Overlay,
    ) -> Result<(), ProgramError> {
        let [counter, payer, ..] = accounts else {
            return Err(ProgramError::NotEnoughAccountKeys);
        };
        if !payer.is_signer {
            return Err(ProgramError::MissingRequiredSignature);
        }

        let (expected, bump) = derive_counter_pda(PDA_SEED, &self.program.program_id);
        if counter.key != expected {
            return Err(ProgramError::InvalidSeeds);
        }
        if overlay.get(&counter.key).is_some() {
            return Err(ProgramError::AccountAlreadyInitialized);
        }

        let account = Account {
            lamports: Rent::default().minimum_balance(CounterAccount::SPACE),
            data: encode(&CounterAccount { data: 0, bump })?,
            owner: self.program.program_id,
            executable: false,
            rent_epoch: 0,
        };
        overlay.set(counter.key, Some(account));
        Ok(())
    }

    fn process_increment(
        &self,
        accounts: &[InstructionAccount],
        overlay: &mut Overlay,
        logs: &mut Vec<String>,
    ) -> Result<(), ProgramError> {
        let [counter, ..] = accounts else {
            return Err(ProgramError::NotEnoughAccountKeys);
        };
        let mut account = self.owned_counter(&counter.key, overlay)?;
        let mut state = decode(&account)?;

        state.data = state.data.checked_add(1).ok_or(ProgramError::ArithmeticOverflow)?;
        logs.push(format!("Program log: Counter: {}", state.data));

        account.data = encode(&state)?;
        overlay.set(counter.key, Some(account));
        Ok(())
    }

    fn process_delegate(
        &self,
        accounts: &[InstructionAccount],
        overlay: &mut Overlay,
    ) -> Result<PeerEffect, ProgramError> {
        let [payer, _buffer, record, _metadata, counter, ..] = accounts else {
            return Err(ProgramError::NotEnoughAccountKeys);
        };
        if !payer.is_signer {
            return Err(ProgramError::MissingRequiredSignature);
        }
        let delegation_program = self.program.delegation_program_id;
        if record.key != derive_delegation_record_pda(&counter.key, &delegation_program) {
            return Err(ProgramError::InvalidSeeds);
        }

        let mut account = self.owned_counter(&counter.key, overlay)?;
        decode(&account)?;

        let clone = account.clone();
        account.owner = delegation_program;
        overlay.set(counter.key, Some(account));
        overlay.set(
            record.key,
            Some(Account {
                lamports: Rent::default().minimum_balance(32),
                data: payer.key.to_bytes().to_vec(),
                owner: delegation_program,
                executable: false,
                rent_epoch: 0,
            }),
        );

        Ok(PeerEffect::Clone {
            address: counter.key,
            account: clone,
        })
    }

    fn process_commit(
        &self,
        accounts: &[InstructionAccount],
        overlay: &mut Overlay,
        undelegate: bool,
    ) -> Result<PeerEffect, ProgramError> {
        let [counter, payer, ..] = accounts else {
            return Err(ProgramError::NotEnoughAccountKeys);
        };
        if !payer.is_signer {
            return Err(ProgramError::MissingRequiredSignature);
        }

        let account = self.owned_counter(&counter.key, overlay)?;
        decode(&account)?;

        if !undelegate {
            return Ok(PeerEffect::Checkpoint {
                address: counter.key,
                data: account.data,
            });
        }

        overlay.set(counter.key, None);
        Ok(PeerEffect::Release {
            address: counter.key,
            data: account.data,
            owner: self.program.program_id,
            record: derive_delegation_record_pda(&counter.key, &self.program.delegation_program_id),
        })
    }

    /// The counter account, which the counter program must own on this ledger
    fn owned_counter(&self, key: &Pubkey, overlay: &Overlay) -> Result<Account, ProgramError> {
        let account = overlay.get(key).ok_or(ProgramError::AccountNotInitialized)?;
        if account.owner != self.program.program_id {
            return Err(ProgramError::InvalidAccountOwner);
        }
        Ok(account)
    }
}

fn decode(account: &Account) -> Result<CounterAccount, ProgramError> {
    CounterAccount::try_from_account_data(&account.data)
        .map_err(|e| ProgramError::InvalidAccountData(e.to_string()))
}

fn encode(state: &CounterAccount) -> Result<Vec<u8>, ProgramError> {
    state
        .to_account_data()
        .map_err(|e| ProgramError::InvalidAccountData(e.to_string()))
}
