//! Counter Program State

use borsh::{BorshDeserialize, BorshSerialize};
use thiserror::Error;

use crate::constants::COUNTER_ACCOUNT_DISCRIMINATOR;

/// Errors raised while decoding program accounts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("Account data too short: {0} bytes")]
    AccountTooShort(usize),

    #[error("Account discriminator mismatch")]
    DiscriminatorMismatch,

    #[error("Invalid account data: {0}")]
    InvalidAccountData(String),
}

/// Counter account (matches the program's `NewAccount`)
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CounterAccount {
    /// Counter value
    pub data: u32,
    /// PDA bump seed
    pub bump: u8,
}

impl CounterAccount {
    /// Serialized body size (without discriminator)
    pub const LEN: usize = 4 + 1;

    /// Full on-chain size: discriminator + body
    pub const SPACE: usize = 8 + Self::LEN;

    /// Decode from raw account data, checking the Anchor discriminator
    pub fn try_from_account_data(data: &[u8]) -> Result<Self, InterfaceError> {
        if data.len() < Self::SPACE {
            return Err(InterfaceError::AccountTooShort(data.len()));
        }
        if data[..8] != COUNTER_ACCOUNT_DISCRIMINATOR {
            return Err(InterfaceError::DiscriminatorMismatch);
        }
        let mut body = &data[8..];
        Self::deserialize(&mut body).map_err(|e| InterfaceError::InvalidAccountData(e.to_string()))
    }

    /// Encode to raw account data with the Anchor discriminator
    pub fn to_account_data(&self) -> Result<Vec<u8>, InterfaceError> {
        let mut data = Vec::with_capacity(Self::SPACE);
        data.extend_from_slice(&COUNTER_ACCOUNT_DISCRIMINATOR);
        borsh::to_writer(&mut data, self)
            .map_err(|e| InterfaceError::InvalidAccountData(e.to_string()))?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_known_layout() {
        let mut raw = COUNTER_ACCOUNT_DISCRIMINATOR.to_vec();
        raw.extend_from_slice(&7u32.to_le_bytes());
        raw.push(254);

        let account = CounterAccount::try_from_account_data(&raw).unwrap();
        assert_eq!(account.data, 7);
        assert_eq!(account.bump, 254);
        assert_eq!(account.to_account_data().unwrap(), raw);
    }

    #[test]
    fn test_encoding_is_discriminator_then_borsh_body() {
        let account = CounterAccount { data: 0x0102_0304, bump: 7 };
        let raw = account.to_account_data().unwrap();
        assert_eq!(raw.len(), CounterAccount::SPACE);
        assert_eq!(raw[..8], COUNTER_ACCOUNT_DISCRIMINATOR);
        assert_eq!(raw[8..], borsh::to_vec(&account).unwrap()[..]);
        assert_eq!(CounterAccount::try_from_account_data(&raw).unwrap(), account);
    }

    #[test]
    fn test_rejects_wrong_discriminator() {
        let mut raw = vec![0u8; 8];
        raw.extend_from_slice(&[1, 0, 0, 0, 255]);
        assert_eq!(
            CounterAccount::try_from_account_data(&raw),
            Err(InterfaceError::DiscriminatorMismatch)
        );
    }

    #[test]
    fn test_rejects_short_data() {
        assert_eq!(
            CounterAccount::try_from_account_data(&COUNTER_ACCOUNT_DISCRIMINATOR),
            Err(InterfaceError::AccountTooShort(8))
        );
    }

    #[test]
    fn test_tolerates_trailing_padding() {
        let mut raw = CounterAccount { data: 3, bump: 1 }.to_account_data().unwrap();
        raw.extend_from_slice(&[0u8; 16]);
        assert_eq!(CounterAccount::try_from_account_data(&raw).unwrap().data, 3);
    }
}
