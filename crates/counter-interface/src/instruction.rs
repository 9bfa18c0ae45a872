//! Counter Program Instructions
//!
//! The program takes no instruction arguments, so every instruction is its
//! 8-byte Anchor discriminator plus an account list.

use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_program,
};

use crate::{
    constants::*, derive_buffer_pda, derive_delegation_metadata_pda,
    derive_delegation_record_pda, DELEGATION_PROGRAM_ID, MAGIC_CONTEXT_ID, MAGIC_PROGRAM_ID,
};

/// Counter program instructions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CounterInstruction {
    /// Create the counter account with value 0
    ///
    /// Accounts:
    /// 0. `[writable]` Counter account (PDA)
    /// 1. `[signer, writable]` Payer
    /// 2. `[]` System program
    Initialize,

    /// Add one to the counter
    ///
    /// Accounts:
    /// 0. `[writable]` Counter account (PDA)
    Increment,

    /// Hand the counter account to the delegation program
    ///
    /// Accounts:
    /// 0. `[signer, writable]` Payer
    /// 1. `[writable]` Delegation buffer (PDA of owner program)
    /// 2. `[writable]` Delegation record (PDA of delegation program)
    /// 3. `[writable]` Delegation metadata (PDA of delegation program)
    /// 4. `[writable]` Counter account (PDA)
    /// 5. `[]` Owner program
    /// 6. `[]` Delegation program
    /// 7. `[]` System program
    Delegate,

    /// Checkpoint the ephemeral state to the base layer
    ///
    /// Accounts:
    /// 0. `[writable]` Counter account (PDA)
    /// 1. `[signer, writable]` Payer / authority
    /// 2. `[]` Magic program
    /// 3. `[writable]` Magic context
    Commit,

    /// Checkpoint and return ownership to the counter program
    ///
    /// Accounts: same as `Commit`
    Undelegate,
}

impl CounterInstruction {
    pub const ALL: [CounterInstruction; 5] = [
        CounterInstruction::Initialize,
        CounterInstruction::Increment,
        CounterInstruction::Delegate,
        CounterInstruction::Commit,
        CounterInstruction::Undelegate,
    ];

    pub fn discriminator(&self) -> [u8; 8] {
        match self {
            CounterInstruction::Initialize => INITIALIZE_DISCRIMINATOR,
            CounterInstruction::Increment => INCREMENT_DISCRIMINATOR,
            CounterInstruction::Delegate => DELEGATE_DISCRIMINATOR,
            CounterInstruction::Commit => COMMIT_DISCRIMINATOR,
            CounterInstruction::Undelegate => UNDELEGATE_DISCRIMINATOR,
        }
    }

    /// Identify an instruction from its data
    pub fn from_data(data: &[u8]) -> Option<Self> {
        let discriminator = data.get(..8)?;
        Self::ALL
            .into_iter()
            .find(|ix| ix.discriminator() == discriminator)
    }

    pub fn name(&self) -> &'static str {
        match self {
            CounterInstruction::Initialize => "initialize",
            CounterInstruction::Increment => "increment",
            CounterInstruction::Delegate => "delegate",
            CounterInstruction::Commit => "commit",
            CounterInstruction::Undelegate => "undelegate",
        }
    }
}

/// Instruction builder bound to a program deployment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CounterProgram {
    pub program_id: Pubkey,
    pub delegation_program_id: Pubkey,
}

impl Default for CounterProgram {
    fn default() -> Self {
        Self {
            program_id: crate::id(),
            delegation_program_id: DELEGATION_PROGRAM_ID,
        }
    }
}

impl CounterProgram {
    pub fn new(program_id: Pubkey, delegation_program_id: Pubkey) -> Self {
        Self {
            program_id,
            delegation_program_id,
        }
    }

    /// Build the instruction for `ix` against `counter`, with `authority` as the signing account
    pub fn instruction(
        &self,
        ix: CounterInstruction,
        counter: Pubkey,
        authority: Pubkey,
    ) -> Instruction {
        match ix {
            CounterInstruction::Initialize => self.initialize(counter, authority),
            CounterInstruction::Increment => self.increment(counter),
            CounterInstruction::Delegate => self.delegate(counter, authority),
            CounterInstruction::Commit => self.commit(counter, authority),
            CounterInstruction::Undelegate => self.undelegate(counter, authority),
        }
    }

    pub fn initialize(&self, counter: Pubkey, payer: Pubkey) -> Instruction {
        Instruction::new_with_bytes(
            self.program_id,
            &INITIALIZE_DISCRIMINATOR,
            vec![
                AccountMeta::new(counter, false),
                AccountMeta::new(payer, true),
                AccountMeta::new_readonly(system_program::id(), false),
            ],
        )
    }

    pub fn increment(&self, counter: Pubkey) -> Instruction {
        Instruction::new_with_bytes(
            self.program_id,
            &INCREMENT_DISCRIMINATOR,
            vec![AccountMeta::new(counter, false)],
        )
    }

    pub fn delegate(&self, counter: Pubkey, payer: Pubkey) -> Instruction {
        Instruction::new_with_bytes(
            self.program_id,
            &DELEGATE_DISCRIMINATOR,
            vec![
                AccountMeta::new(payer, true),
                AccountMeta::new(derive_buffer_pda(&counter, &self.program_id), false),
                AccountMeta::new(
                    derive_delegation_record_pda(&counter, &self.delegation_program_id),
                    false,
                ),
                AccountMeta::new(
                    derive_delegation_metadata_pda(&counter, &self.delegation_program_id),
                    false,
                ),
                AccountMeta::new(counter, false),
                AccountMeta::new_readonly(self.program_id, false),
                AccountMeta::new_readonly(self.delegation_program_id, false),
                AccountMeta::new_readonly(system_program::id(), false),
            ],
        )
    }

    pub fn commit(&self, counter: Pubkey, payer: Pubkey) -> Instruction {
        self.magic_instruction(COMMIT_DISCRIMINATOR, counter, payer)
    }

    pub fn undelegate(&self, counter: Pubkey, payer: Pubkey) -> Instruction {
        self.magic_instruction(UNDELEGATE_DISCRIMINATOR, counter, payer)
    }

    fn magic_instruction(
        &self,
        discriminator: [u8; 8],
        counter: Pubkey,
        payer: Pubkey,
    ) -> Instruction {
        Instruction::new_with_bytes(
            self.program_id,
            &discriminator,
            vec![
                AccountMeta::new(counter, false),
                AccountMeta::new(payer, true),
                AccountMeta::new_readonly(MAGIC_PROGRAM_ID, false),
                AccountMeta::new(MAGIC_CONTEXT_ID, false),
            ],
        )
    }
}
