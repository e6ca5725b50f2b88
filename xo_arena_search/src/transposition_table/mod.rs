use std::sync::{PoisonError, RwLock};

pub const ENTRIES_PER_BUCKET: usize = 32;

pub type Bucket<K, V> = [Option<(K, V)>; ENTRIES_PER_BUCKET];

/// A fixed-size hash table shared between threads.
///
/// Each key maps to exactly one slot; a colliding key overwrites or is
/// rejected according to the caller's replacement rule. Slots are grouped in
/// buckets so concurrent searches rarely contend on the same lock.
pub struct CacheTable<K: Eq + Copy + Into<usize>, V: Sized + Clone> {
    megabytes: usize,
    number_of_entries: usize,
    buckets: Vec<RwLock<Bucket<K, V>>>,
}

impl<K: Eq + Copy + Into<usize>, V: Sized + Clone> std::fmt::Debug for CacheTable<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheTable")
            .field("megabytes", &self.megabytes)
            .field("number_of_entries", &self.number_of_entries)
            .field("buckets", &self.buckets.len())
            .finish()
    }
}

impl<K: Eq + Copy + Into<usize>, V: Sized + Clone> CacheTable<K, V> {
    /// Allocates as many whole buckets as fit in `megabytes`.
    pub fn new(megabytes: usize) -> Self {
        let bytes_per_bucket = std::mem::size_of::<RwLock<Bucket<K, V>>>();
        let bucket_count = (megabytes * 1024 * 1024) / bytes_per_bucket.max(1);
        Self::with_buckets(megabytes, bucket_count)
    }

    fn with_buckets(megabytes: usize, bucket_count: usize) -> Self {
        let buckets = (0..bucket_count).map(|_| Default::default()).collect();
        Self {
            megabytes,
            number_of_entries: bucket_count * ENTRIES_PER_BUCKET,
            buckets,
        }
    }

    pub fn megabytes(&self) -> usize {
        self.megabytes
    }

    pub fn max_entries(&self) -> usize {
        self.number_of_entries
    }

    pub fn occupied_count(&self) -> usize {
        self.buckets
            .iter()
            .map(|bucket| {
                let bucket = bucket.read().unwrap_or_else(PoisonError::into_inner);
                bucket.iter().filter(|x| x.is_some()).count()
            })
            .sum()
    }

    #[inline]
    fn slot(&self, k: &K) -> Option<(usize, usize)> {
        if self.number_of_entries == 0 {
            return None;
        }
        let index = (*k).into() % self.number_of_entries;
        Some((index / ENTRIES_PER_BUCKET, index % ENTRIES_PER_BUCKET))
    }

    pub fn clear(&self) {
        for b in &self.buckets {
            let mut bucket = b.write().unwrap_or_else(PoisonError::into_inner);
            bucket.iter_mut().for_each(|r| *r = None)
        }
    }

    pub fn get(&self, k: &K) -> Option<V> {
        let (bi, ei) = self.slot(k)?;
        let bucket = self.buckets[bi].read().unwrap_or_else(PoisonError::into_inner);
        match &bucket[ei] {
            Some((k1, v)) if k1 == k => Some(v.clone()),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn set(&self, k: &K, v: V) {
        let Some((bi, ei)) = self.slot(k) else { return };
        let mut bucket = self.buckets[bi].write().unwrap_or_else(PoisonError::into_inner);
        bucket[ei] = Some((*k, v));
    }

    /// Stores `v` if the slot is empty or `should_replace` accepts the current value.
    pub fn replace_if<F: Fn(&V) -> bool>(&self, k: &K, v: V, should_replace: F) -> bool {
        let Some((bi, ei)) = self.slot(k) else { return false };
        let mut bucket = self.buckets[bi].write().unwrap_or_else(PoisonError::into_inner);
        let entry = &mut bucket[ei];
        match entry {
            Some((_, v0)) if !should_replace(v0) => false,
            _ => {
                *entry = Some((*k, v));
                true
            }
        }
    }
}
