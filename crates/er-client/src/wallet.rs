//! Wallet capability and ephemeral signing key
//!
//! The wallet is an opaque signer: it exposes a public key and partially signs
//! transactions handed to it. Key custody is the wallet's business.

use async_trait::async_trait;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{read_keypair_file, Keypair},
    signer::{keypair::keypair_from_seed, Signer},
    transaction::Transaction,
};
use std::path::Path;

use crate::error::WalletError;

/// A long-lived signing authority
#[async_trait]
pub trait Wallet: Send + Sync {
    fn pubkey(&self) -> Pubkey;

    /// Add this wallet's signature to `tx`, leaving other signatures intact
    async fn sign_transaction(&self, tx: Transaction) -> Result<Transaction, WalletError>;
}

/// Wallet backed by an in-process keypair
pub struct KeypairWallet {
    keypair: Keypair,
}

impl KeypairWallet {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    /// Load a Solana CLI JSON keypair file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, WalletError> {
        let path = path.as_ref();
        let keypair = read_keypair_file(path)
            .map_err(|e| WalletError::Load(format!("{}: {}", path.display(), e)))?;
        Ok(Self::new(keypair))
    }
}

#[async_trait]
impl Wallet for KeypairWallet {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_transaction(&self, mut tx: Transaction) -> Result<Transaction, WalletError> {
        let blockhash = tx.message.recent_blockhash;
        tx.try_partial_sign(&[&self.keypair], blockhash)
            .map_err(|e| WalletError::Signing(e.to_string()))?;
        Ok(tx)
    }
}

/// Derive the ephemeral-layer signing key from a wallet public key
///
/// The public key bytes are used directly as the ed25519 seed, so the result
/// is reproducible by anyone who knows the wallet address. It gives the
/// ephemeral layer a stable fee payer without prompting the wallet; it is not
/// a secret and must not guard anything of value.
pub fn derive_ephemeral_keypair(wallet: &Pubkey) -> Result<Keypair, WalletError> {
    keypair_from_seed(wallet.as_ref()).map_err(|e| WalletError::KeyDerivation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{hash::Hash, message::Message, system_instruction};

    #[test]
    fn test_ephemeral_key_is_deterministic() {
        let wallet = Pubkey::new_unique();
        let a = derive_ephemeral_keypair(&wallet).unwrap();
        let b = derive_ephemeral_keypair(&wallet).unwrap();
        assert_eq!(a.pubkey(), b.pubkey());
        assert_ne!(a.pubkey(), wallet);

        let other = derive_ephemeral_keypair(&Pubkey::new_unique()).unwrap();
        assert_ne!(a.pubkey(), other.pubkey());
    }

    #[tokio::test]
    async fn test_wallet_partial_sign_keeps_cosigner() {
        let wallet = KeypairWallet::new(Keypair::new());
        let cosigner = Keypair::new();
        let blockhash = Hash::new_unique();

        // Transfer from the cosigner, with the wallet as an extra required signer
        let mut ix = system_instruction::transfer(&cosigner.pubkey(), &wallet.pubkey(), 1);
        ix.accounts.push(solana_sdk::instruction::AccountMeta::new_readonly(wallet.pubkey(), true));
        let message = Message::new_with_blockhash(&[ix], Some(&cosigner.pubkey()), &blockhash);
        let mut tx = Transaction::new_unsigned(message);
        tx.try_partial_sign(&[&cosigner], blockhash).unwrap();
        assert!(!tx.is_signed());

        let tx = wallet.sign_transaction(tx).await.unwrap();
        assert!(tx.is_signed());
        assert!(tx.verify().is_ok());
    }

    #[test]
    fn test_load_keypair_file() {
        let keypair = Keypair::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id.json");
        solana_sdk::signature::write_keypair_file(&keypair, &path).unwrap();

        let wallet = KeypairWallet::from_file(&path).unwrap();
        assert_eq!(wallet.pubkey(), keypair.pubkey());

        assert!(matches!(
            KeypairWallet::from_file(dir.path().join("missing.json")),
            Err(WalletError::Load(_))
        ));
    }
}
