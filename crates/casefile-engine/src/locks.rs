//! Per-key async locks.
//!
//! Handles are created on first use and dropped from the table once nobody
//! holds or awaits them.

use std::{
  collections::HashMap,
  hash::Hash,
  sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

pub struct KeyedLocks<K> {
  table: Arc<Mutex<HashMap<K, Arc<RwLock<()>>>>>,
}

impl<K> Clone for KeyedLocks<K> {
  fn clone(&self) -> Self { Self { table: self.table.clone() } }
}

impl<K: Eq + Hash> Default for KeyedLocks<K> {
  fn default() -> Self { Self { table: Arc::new(Mutex::new(HashMap::new())) } }
}

impl<K: Eq + Hash> KeyedLocks<K> {
  pub fn new() -> Self { Self::default() }

  /// Shared access to `key`; excludes only writers.
  pub async fn read(&self, key: K) -> OwnedRwLockReadGuard<()> {
    self.handle(key).read_owned().await
  }

  /// Exclusive access to `key`.
  pub async fn write(&self, key: K) -> OwnedRwLockWriteGuard<()> {
    self.handle(key).write_owned().await
  }

  fn handle(&self, key: K) -> Arc<RwLock<()>> {
    let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
    table.retain(|_, lock| Arc::strong_count(lock) > 1);
    table.entry(key).or_default().clone()
  }

  #[cfg(test)]
  pub(crate) fn len(&self) -> usize {
    self.table.lock().unwrap_or_else(PoisonError::into_inner).len()
  }
}
