//! Per-account write locks
//!
//! Lifecycle transitions hold an account's lock exclusively; increments hold
//! it shared, so they run alongside each other but never straddle a
//! delegate/undelegate that would invalidate their routing.

use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

type LockMap = DashMap<Pubkey, Arc<RwLock<()>>>;

enum Held {
    Exclusive(OwnedRwLockWriteGuard<()>),
    Shared(OwnedRwLockReadGuard<()>),
}

/// A held account lock of either mode
///
/// Dropping the last guard for an account removes its registry entry.
pub struct AccountGuard {
    held: Option<Held>,
    address: Pubkey,
    locks: Arc<LockMap>,
}

impl AccountGuard {
    pub fn is_exclusive(&self) -> bool {
        matches!(self.held, Some(Held::Exclusive(_)))
    }
}

impl Drop for AccountGuard {
    fn drop(&mut self) {
        self.held.take();
        // Waiters and holders each own a clone, so a count of one is the map's
        self.locks
            .remove_if(&self.address, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Registry of account-scoped locks
#[derive(Clone, Default)]
pub struct AccountLocks {
    locks: Arc<LockMap>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, address: &Pubkey) -> Arc<RwLock<()>> {
        self.locks
            .entry(*address)
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    fn guard(&self, address: &Pubkey, held: Held) -> AccountGuard {
        AccountGuard {
            held: Some(held),
            address: *address,
            locks: self.locks.clone(),
        }
    }

    /// Exclusive access for a lifecycle transition
    pub async fn exclusive(&self, address: &Pubkey) -> AccountGuard {
        let held = Held::Exclusive(self.lock_for(address).write_owned().await);
        self.guard(address, held)
    }

    /// Shared access for a payload-only mutation
    pub async fn shared(&self, address: &Pubkey) -> AccountGuard {
        let held = Held::Shared(self.lock_for(address).read_owned().await);
        self.guard(address, held)
    }

    pub async fn acquire(&self, address: &Pubkey, exclusive: bool) -> AccountGuard {
        if exclusive {
            self.exclusive(address).await
        } else {
            self.shared(address).await
        }
    }

    /// Number of accounts with a live or awaited lock
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shared_holders_coexist() {
        let locks = AccountLocks::new();
        let address = Pubkey::new_unique();

        let a = locks.shared(&address).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.shared(&address)).await;
        assert!(b.is_ok());
        assert!(!a.is_exclusive());
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn test_exclusive_blocks_shared() {
        let locks = AccountLocks::new();
        let address = Pubkey::new_unique();

        let guard = locks.acquire(&address, true).await;
        assert!(guard.is_exclusive());
        let blocked = tokio::time::timeout(Duration::from_millis(50), locks.shared(&address)).await;
        assert!(blocked.is_err());

        drop(guard);
        let unblocked =
            tokio::time::timeout(Duration::from_millis(50), locks.shared(&address)).await;
        assert!(unblocked.is_ok());
    }

    #[tokio::test]
    async fn test_accounts_are_independent() {
        let locks = AccountLocks::new();
        let _guard = locks.exclusive(&Pubkey::new_unique()).await;
        let other = tokio::time::timeout(
            Duration::from_millis(50),
            locks.exclusive(&Pubkey::new_unique()),
        )
        .await;
        assert!(other.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_released_locks_are_pruned() {
        let locks = AccountLocks::new();
        let address = Pubkey::new_unique();

        let first = locks.shared(&address).await;
        let second = locks.shared(&address).await;
        drop(first);
        assert_eq!(locks.len(), 1);

        drop(second);
        assert!(locks.is_empty());

        for _ in 0..16 {
            drop(locks.exclusive(&Pubkey::new_unique()).await);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_waiter_keeps_entry_alive() {
        let locks = AccountLocks::new();
        let address = Pubkey::new_unique();

        let holder = locks.exclusive(&address).await;
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.shared(&address).await.is_exclusive() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(holder);
        assert_eq!(locks.len(), 1);
        assert!(!waiter.await.unwrap());
        assert!(locks.is_empty());
    }
}
