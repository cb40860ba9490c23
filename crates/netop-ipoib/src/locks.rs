//! Per-identity locks
//!
//! At most one reconciliation attempt runs per resource identity. Attempts for
//! different identities never contend. Idle entries are removed so the map
//! only holds identities with an attempt in flight or waiting.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::controller::ReconcileRequest;

type LockMap = DashMap<ReconcileRequest, Arc<Mutex<()>>>;

/// Async mutex per reconciliation identity
#[derive(Clone, Default)]
pub struct KeyLocks {
    inner: Arc<LockMap>,
}

impl KeyLocks {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other attempt holds `key`, then hold it until the guard drops
    pub async fn acquire(&self, key: &ReconcileRequest) -> KeyGuard {
        let mutex = self.inner.entry(key.clone()).or_default().clone();
        let guard = mutex.lock_owned().await;
        KeyGuard {
            guard: Some(guard),
            key: key.clone(),
            locks: self.inner.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Held lock for one identity
pub struct KeyGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: ReconcileRequest,
    locks: Arc<LockMap>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // Release first so the guard's own reference is not counted
        self.guard.take();
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
