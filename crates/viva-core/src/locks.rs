//! Per-candidate async mutexes serializing session read-modify-write.
//!
//! Entries live only while someone holds or awaits them; the guard removes its
//! entry on drop, so ids that never match a candidate leave nothing behind.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct CandidateLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CandidateLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`. The guard releases and prunes on drop.
    pub async fn acquire(&self, key: &str) -> CandidateGuard<'_> {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        CandidateGuard {
            locks: self,
            key: key.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Drop the entry for `key` if nobody holds or awaits it.
    fn prune(&self, key: &str) {
        self.locks.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

pub struct CandidateGuard<'a> {
    locks: &'a CandidateLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for CandidateGuard<'_> {
    fn drop(&mut self) {
        // Release first so the held Arc no longer counts against the prune.
        self.guard.take();
        self.locks.prune(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_serialized() {
        let locks = Arc::new(CandidateLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let (locks, inside, max_seen) = (locks.clone(), inside.clone(), max_seen.clone());
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("c1").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn prune_keeps_held_locks() {
        let locks = CandidateLocks::new();
        let guard = locks.acquire("c1").await;
        locks.prune("c1");
        assert_eq!(locks.len(), 1);
        drop(guard);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn entry_survives_while_a_waiter_is_queued() {
        let locks = Arc::new(CandidateLocks::new());
        let first = locks.acquire("c1").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _second = locks.acquire("c1").await;
                locks.len()
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(first);
        assert_eq!(locks.len(), 1);

        assert_eq!(waiter.await.unwrap(), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn distinct_keys_do_not_accumulate() {
        let locks = CandidateLocks::new();
        for i in 0..1000 {
            let _guard = locks.acquire(&format!("bogus{}", i)).await;
        }
        assert!(locks.is_empty());
    }
}
