//! Per-key serialization inside one process.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

/// Locks guarding a single key.
#[derive(Debug, Default)]
pub(crate) struct KeyLock {
    /// Held for the whole of a write.
    pub(crate) writer: tokio::sync::Mutex<()>,
    /// Shared by readers; exclusive while a write prunes old versions.
    pub(crate) prune: tokio::sync::RwLock<()>,
}

/// Lazily created [`KeyLock`]s, one per key ever touched.
#[derive(Debug, Default)]
pub(crate) struct KeyLocks {
    inner: Mutex<HashMap<String, Arc<KeyLock>>>,
}

impl KeyLocks {
    pub(crate) fn get(&self, key: &str) -> Arc<KeyLock> {
        // The map is only touched for lookups, so a poisoned guard is still
        // consistent.
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match map.get(key) {
            Some(lock) => Arc::clone(lock),
            None => {
                let lock = Arc::new(KeyLock::default());
                map.insert(key.to_string(), Arc::clone(&lock));
                lock
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_shares_a_lock() {
        let locks = KeyLocks::default();
        let a = locks.get("eurusd");
        let b = locks.get("eurusd");
        let c = locks.get("usdjpy");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[tokio::test]
    async fn readers_share_while_pruning_excludes() {
        let locks = KeyLocks::default();
        let lock = locks.get("k");
        let r1 = lock.prune.read().await;
        let r2 = lock.prune.read().await;
        assert!(lock.prune.try_write().is_err());
        drop(r1);
        drop(r2);
        assert!(lock.prune.try_write().is_ok());
    }
}
