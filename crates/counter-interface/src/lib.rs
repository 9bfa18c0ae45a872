//! Counter Program Interface
//!
//! Type definitions and instruction builders that mirror the on-chain counter
//! program (an Anchor program with ephemeral rollup support). Nothing in this
//! crate performs I/O; it only knows how bytes are laid out.
//!
//! Account Structure:
//! - CounterAccount: single PDA derived from `PDA_SEED`, holds the counter

use solana_sdk::pubkey::Pubkey;

pub mod instruction;
pub mod state;

pub use instruction::{CounterInstruction, CounterProgram};
pub use state::{CounterAccount, InterfaceError};

// Managing program ID (matches the deployed counter program)
solana_sdk::declare_id!("5cmQHS2mVhgkyfh2sNdtdMSMadLpSj2N3Gjc6QJhn6Cn");

/// Delegation program that takes ownership of delegated accounts on the base layer
pub const DELEGATION_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("DELeGGvXpWV2fqJUhqcF5ZSYMS4JTLjteaAMARRSaeSh");

/// Ephemeral rollup magic program (schedules commits back to the base layer)
pub const MAGIC_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("Magic11111111111111111111111111111111111111");

/// Ephemeral rollup magic context account
pub const MAGIC_CONTEXT_ID: Pubkey =
    solana_sdk::pubkey!("MagicContext1111111111111111111111111111111");

/// Constants
pub mod constants {
    // PDA seeds
    /// Counter account seed
    pub const PDA_SEED: &[u8] = b"pda-seed";
    /// Delegation buffer seed (derived under the owner program)
    pub const BUFFER_SEED: &[u8] = b"buffer";
    /// Delegation record seed (derived under the delegation program)
    pub const DELEGATION_RECORD_SEED: &[u8] = b"delegation";
    /// Delegation metadata seed (derived under the delegation program)
    pub const DELEGATION_METADATA_SEED: &[u8] = b"delegation-metadata";

    // Anchor discriminators
    /// `account:NewAccount`
    pub const COUNTER_ACCOUNT_DISCRIMINATOR: [u8; 8] = [176, 95, 4, 118, 91, 177, 125, 232];
    pub const INITIALIZE_DISCRIMINATOR: [u8; 8] = [175, 175, 109, 31, 13, 152, 155, 237];
    pub const INCREMENT_DISCRIMINATOR: [u8; 8] = [11, 18, 104, 9, 104, 174, 59, 33];
    /// `global:delegate_data_account`
    pub const DELEGATE_DISCRIMINATOR: [u8; 8] = [70, 56, 109, 100, 144, 222, 100, 251];
    pub const COMMIT_DISCRIMINATOR: [u8; 8] = [223, 140, 142, 165, 229, 208, 156, 74];
    pub const UNDELEGATE_DISCRIMINATOR: [u8; 8] = [131, 148, 180, 198, 91, 104, 42, 238];
}

/// Derive the counter PDA
pub fn derive_counter_pda(seed: &[u8], program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[seed], program_id)
}

/// Derive the delegation buffer PDA for a delegated account
pub fn derive_buffer_pda(account: &Pubkey, owner_program: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[constants::BUFFER_SEED, account.as_ref()], owner_program).0
}

/// Derive the delegation record PDA for a delegated account
pub fn derive_delegation_record_pda(account: &Pubkey, delegation_program: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[constants::DELEGATION_RECORD_SEED, account.as_ref()],
        delegation_program,
    )
    .0
}

/// Derive the delegation metadata PDA for a delegated account
pub fn derive_delegation_metadata_pda(account: &Pubkey, delegation_program: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[constants::DELEGATION_METADATA_SEED, account.as_ref()],
        delegation_program,
    )
    .0
}
