//! Per-account locks around session use.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-account exclusive use of a session blob.
///
/// A client writes its blob back on disconnect, so two connections on one
/// account must never overlap: the harvester, the keep-alive touch, a
/// re-login publish and account deletion all hold the account's guard for
/// their whole run. Keyed by account id.
#[derive(Default)]
pub struct AccountLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drop locks nobody holds or waits on.
    pub fn prune(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(AccountLocks::new());
        let guard = locks.acquire("a").await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.acquire("a").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        // A different account is not blocked.
        let _other = locks.acquire("b").await;

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_prune_keeps_held_locks() {
        let locks = AccountLocks::new();
        let held = locks.acquire("a").await;
        drop(locks.acquire("b").await);

        locks.prune();

        assert_eq!(locks.len(), 1);
        drop(held);
        locks.prune();
        assert!(locks.is_empty());
    }
}
