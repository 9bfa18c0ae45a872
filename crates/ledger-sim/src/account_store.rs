//! In-memory account storage using DashMap for concurrent access

use dashmap::DashMap;
use solana_sdk::{account::Account, pubkey::Pubkey};
use std::sync::Arc;

/// Thread-safe account storage for one simulated ledger
///
/// Cloning shares the underlying maps, so the peer ledger can write
/// delegation and settlement effects into it directly.
#[derive(Clone, Default)]
pub struct AccountStore {
    accounts: Arc<DashMap<Pubkey, Account>>,
}

impl AccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_account(&self, pubkey: &Pubkey) -> Option<Account> {
        self.accounts.get(pubkey).map(|r| r.value().clone())
    }

    pub fn store_account(&self, pubkey: Pubkey, account: Account) {
        self.accounts.insert(pubkey, account);
    }

    pub fn remove_account(&self, pubkey: &Pubkey) -> Option<Account> {
        self.accounts.remove(pubkey).map(|(_, v)| v)
    }

    /// Rewrite an existing account in place; returns false if it is absent
    pub fn update_account<F: FnOnce(&mut Account)>(&self, pubkey: &Pubkey, f: F) -> bool {
        match self.accounts.get_mut(pubkey) {
            Some(mut entry) => {
                f(entry.value_mut());
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(data: Vec<u8>) -> Account {
        Account {
            lamports: 1000,
            data,
            owner: Pubkey::new_unique(),
            executable: false,
            rent_epoch: 0,
        }
    }

    #[test]
    fn test_store_and_get() {
        let store = AccountStore::new();
        let pubkey = Pubkey::new_unique();

        store.store_account(pubkey, account(vec![1, 2, 3]));

        let retrieved = store.get_account(&pubkey).unwrap();
        assert_eq!(retrieved.data, vec![1, 2, 3]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let store = AccountStore::new();
        let peer_view = store.clone();
        let pubkey = Pubkey::new_unique();

        store.store_account(pubkey, account(vec![7]));
        assert!(peer_view.update_account(&pubkey, |a| a.data[0] = 8));
        assert_eq!(store.get_account(&pubkey).unwrap().data, vec![8]);

        assert!(peer_view.remove_account(&pubkey).is_some());
        assert!(store.is_empty());
        assert!(!store.update_account(&pubkey, |_| {}));
    }
}
