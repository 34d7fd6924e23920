use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

struct Entry<V> {
  expires_at: Instant,
  value: V,
}

/// Short-lived response cache. Entries expire on their own; callers drop
/// them early with `invalidate` after a write.
pub struct TtlCache<K, V> {
  ttl: Duration,
  entries: HashMap<K, Entry<V>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
  pub fn new(ttl: Duration) -> Self {
    Self {
      ttl,
      entries: HashMap::new(),
    }
  }

  pub fn get(&self, key: &K) -> Option<V> {
    self
      .entries
      .get(key)
      .filter(|entry| Instant::now() < entry.expires_at)
      .map(|entry| entry.value.clone())
  }

  pub fn insert(&mut self, key: K, value: V) {
    let ttl = self.ttl;
    self.insert_with_ttl(key, value, ttl);
  }

  pub fn insert_with_ttl(&mut self, key: K, value: V, ttl: Duration) {
    self.entries.insert(
      key,
      Entry {
        expires_at: Instant::now() + ttl,
        value,
      },
    );
  }

  pub fn invalidate(&mut self, key: &K) -> bool {
    self.entries.remove(key).is_some()
  }

  pub fn clear(&mut self) {
    self.entries.clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test(start_paused = true)]
  async fn entries_expire_after_ttl() {
    let mut cache = TtlCache::new(Duration::from_secs(60));
    cache.insert("main", 1);
    cache.insert_with_ttl("full_flow", 2, Duration::from_secs(30));

    tokio::time::advance(Duration::from_secs(31)).await;
    assert_eq!(cache.get(&"main"), Some(1));
    assert_eq!(cache.get(&"full_flow"), None);

    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(cache.get(&"main"), None);
  }

  #[test]
  fn invalidate_and_clear() {
    let mut cache = TtlCache::new(Duration::from_secs(60));
    cache.insert(1u8, "a".to_string());
    cache.insert(2u8, "b".to_string());
    assert!(cache.invalidate(&1));
    assert!(!cache.invalidate(&1));
    assert_eq!(cache.get(&2).as_deref(), Some("b"));
    cache.clear();
    assert_eq!(cache.get(&2), None);
  }
}
