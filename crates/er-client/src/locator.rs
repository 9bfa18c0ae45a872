//! Account Locator - deterministic address of the managed account

use counter_interface::{constants::PDA_SEED, derive_counter_pda};
use solana_sdk::pubkey::Pubkey;

/// Resolved address of the managed account
///
/// Computed once at construction and carried by value afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountLocator {
    address: Pubkey,
}

impl AccountLocator {
    /// Derive the address for `seed` under `program_id`
    ///
    /// Panics on an empty seed; seeds are compile-time constants, so that is
    /// a programming error.
    pub fn locate(seed: &[u8], program_id: &Pubkey) -> Self {
        assert!(!seed.is_empty(), "account seed must not be empty");
        let (address, _bump) = derive_counter_pda(seed, program_id);
        Self { address }
    }

    /// Locator for the counter program's account
    pub fn counter(program_id: &Pubkey) -> Self {
        Self::locate(PDA_SEED, program_id)
    }

    pub fn address(&self) -> Pubkey {
        self.address
    }
}
