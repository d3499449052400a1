use parking_lot::Mutex;

/// A fixed-size hash table with per-bucket chains, partitioned across
/// worker threads.
///
/// The original design gives each bucket a single long-lived owner thread
/// and forbids any other thread from touching it. Enforcing that in safe
/// Rust without raw pointers or `unsafe Send` impls means each bucket still
/// needs *some* synchronization primitive so the type is `Sync`; a
/// `Mutex` per bucket is that primitive. Dispatch routing (see
/// [`crate::lockmgr::dispatcher`]) guarantees only the assigned worker ever
/// acquires a given bucket's mutex in practice, so it is never contended —
/// the ownership discipline is enforced by construction, not by the lock.
pub struct ShardedTable<V> {
    buckets: Vec<Mutex<Vec<(u32, V)>>>,
    capacity: usize,
}

impl<V> ShardedTable<V> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "sharded table capacity must be positive");
        let buckets = (0..capacity).map(|_| Mutex::new(Vec::new())).collect();
        Self { buckets, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn bucket_index(&self, key: u32) -> usize {
        (key as usize) % self.capacity
    }

    pub fn bucket(&self, index: usize) -> &Mutex<Vec<(u32, V)>> {
        &self.buckets[index]
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl<V: Clone> ShardedTable<V> {
    pub fn get(&self, key: u32) -> Option<V> {
        let idx = self.bucket_index(key);
        let bucket = self.buckets[idx].lock();
        bucket.iter().find(|(k, _)| *k == key).map(|(_, v)| v.clone())
    }

    pub fn contains(&self, key: u32) -> bool {
        let idx = self.bucket_index(key);
        let bucket = self.buckets[idx].lock();
        bucket.iter().any(|(k, _)| *k == key)
    }

    /// Inserts `value` at `key` only if `key` is absent. Returns `true` if
    /// the insert happened. Duplicate `set` calls are ignored — first
    /// writer wins (tested property I7).
    pub fn set(&self, key: u32, value: V) -> bool {
        let idx = self.bucket_index(key);
        let mut bucket = self.buckets[idx].lock();
        if bucket.iter().any(|(k, _)| *k == key) {
            return false;
        }
        bucket.push((key, value));
        true
    }

    pub fn remove(&self, key: u32) -> Option<V> {
        let idx = self.bucket_index(key);
        let mut bucket = self.buckets[idx].lock();
        let pos = bucket.iter().position(|(k, _)| *k == key)?;
        Some(bucket.remove(pos).1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_is_first_writer_wins() {
        let t: ShardedTable<u32> = ShardedTable::new(16);
        assert!(t.set(5, 100));
        assert!(!t.set(5, 200));
        assert_eq!(t.get(5), Some(100));
    }

    #[test]
    fn remove_then_reinsert() {
        let t: ShardedTable<u32> = ShardedTable::new(16);
        t.set(5, 100);
        assert_eq!(t.remove(5), Some(100));
        assert!(t.set(5, 200));
        assert_eq!(t.get(5), Some(200));
    }

    #[test]
    fn keys_hash_to_bucket_by_modulo() {
        let t: ShardedTable<u32> = ShardedTable::new(4);
        assert_eq!(t.bucket_index(9), 1);
        assert_eq!(t.bucket_index(4), 0);
    }
}
