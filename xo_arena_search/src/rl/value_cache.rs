use std::collections::BTreeMap;

use log::trace;
use xo_arena::prelude::*;

#[derive(Debug, Clone)]
struct Entry {
    key: StateKey,
    values: ByPlayer<RlFixed>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Bounded map from state key to a value estimate per side.
///
/// Keys are indexed by an ordered map into a slab of entries. The entries are
/// threaded on a doubly linked recency list: `head` is the least recently
/// used, `tail` the most recently used. When the slab is full, inserting a new
/// key reuses the head's slot.
#[derive(Debug, Clone)]
pub struct ValueCache {
    capacity: usize,
    index: BTreeMap<StateKey, usize>,
    entries: Vec<Entry>,
    head: Option<usize>,
    tail: Option<usize>,
    evictions: u64,
}

impl ValueCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            index: BTreeMap::new(),
            entries: Vec::with_capacity(capacity),
            head: None,
            tail: None,
            evictions: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[inline]
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    #[inline]
    pub fn contains(&self, key: StateKey) -> bool {
        self.index.contains_key(&key)
    }

    /// Looks up without touching recency.
    pub fn peek(&self, key: StateKey) -> Option<ByPlayer<RlFixed>> {
        self.index.get(&key).map(|&i| self.entries[i].values)
    }

    /// Returns the entry for `key`, creating it with `init` if absent, and
    /// marks it most recently used. May evict the least recently used entry.
    pub fn get_or_insert_with<F: FnOnce() -> ByPlayer<RlFixed>>(
        &mut self,
        key: StateKey,
        init: F,
    ) -> &mut ByPlayer<RlFixed> {
        let slot = match self.index.get(&key) {
            Some(&i) => {
                self.unlink(i);
                i
            }
            None => self.insert(key, init()),
        };
        self.push_tail(slot);
        &mut self.entries[slot].values
    }

    /// Keys from least to most recently used.
    pub fn keys_by_recency(&self) -> Vec<StateKey> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cur = self.head;
        while let Some(i) = cur {
            keys.push(self.entries[i].key);
            cur = self.entries[i].next;
        }
        keys
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.entries.clear();
        self.head = None;
        self.tail = None;
    }

    /// Places a new entry in a free or evicted slot. The slot is left unlinked.
    fn insert(&mut self, key: StateKey, values: ByPlayer<RlFixed>) -> usize {
        let entry = Entry {
            key,
            values,
            prev: None,
            next: None,
        };
        let slot = if self.entries.len() < self.capacity {
            self.entries.push(entry);
            self.entries.len() - 1
        } else {
            let victim = self.head.unwrap_or(0);
            self.unlink(victim);
            let old = std::mem::replace(&mut self.entries[victim], entry);
            self.index.remove(&old.key);
            self.evictions += 1;
            trace!("value cache: evicted {:?} for {:?}", old.key, key);
            victim
        };
        self.index.insert(key, slot);
        slot
    }

    fn unlink(&mut self, i: usize) {
        let (prev, next) = (self.entries[i].prev, self.entries[i].next);
        match prev {
            Some(p) => self.entries[p].next = next,
            None if self.head == Some(i) => self.head = next,
            None => {}
        }
        match next {
            Some(n) => self.entries[n].prev = prev,
            None if self.tail == Some(i) => self.tail = prev,
            None => {}
        }
        self.entries[i].prev = None;
        self.entries[i].next = None;
    }

    fn push_tail(&mut self, i: usize) {
        self.entries[i].prev = self.tail;
        self.entries[i].next = None;
        match self.tail {
            Some(t) => self.entries[t].next = Some(i),
            None => self.head = Some(i),
        }
        self.tail = Some(i);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(n: i32) -> ByPlayer<RlFixed> {
        ByPlayer::splat(RlFixed(n))
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut cache = ValueCache::new(4);
        assert!(cache.is_empty());
        cache.get_or_insert_with(StateKey(1), || v(10));
        assert_eq!(Some(v(10)), cache.peek(StateKey(1)));
        // existing entries keep their value
        assert_eq!(v(10), *cache.get_or_insert_with(StateKey(1), || v(99)));
        assert_eq!(1, cache.len());
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = ValueCache::new(3);
        for k in 1..=3 {
            cache.get_or_insert_with(StateKey(k), || v(k as i32));
        }
        // touch 1 so that 2 becomes the oldest
        cache.get_or_insert_with(StateKey(1), || v(0));
        assert_eq!(vec![StateKey(2), StateKey(3), StateKey(1)], cache.keys_by_recency());

        cache.get_or_insert_with(StateKey(4), || v(4));
        assert_eq!(3, cache.len());
        assert!(!cache.contains(StateKey(2)));
        assert_eq!(1, cache.evictions());
        assert_eq!(vec![StateKey(3), StateKey(1), StateKey(4)], cache.keys_by_recency());
        assert_eq!(Some(v(4)), cache.peek(StateKey(4)));
        assert_eq!(Some(v(1)), cache.peek(StateKey(1)));
    }

    #[test]
    fn test_updates_through_returned_reference() {
        let mut cache = ValueCache::new(2);
        cache.get_or_insert_with(StateKey(7), || v(0))[Player::X] = RlFixed(5);
        assert_eq!(Some(ByPlayer(RlFixed(0), RlFixed(5))), cache.peek(StateKey(7)));
    }

    #[test]
    fn test_capacity_one() {
        let mut cache = ValueCache::new(1);
        for k in 0..10 {
            cache.get_or_insert_with(StateKey(k), || v(k as i32));
            assert_eq!(1, cache.len());
            assert_eq!(vec![StateKey(k)], cache.keys_by_recency());
        }
        assert_eq!(9, cache.evictions());
    }

    #[test]
    fn test_zero_capacity_is_one() {
        assert_eq!(1, ValueCache::new(0).capacity());
    }

    mod prop {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn recency_matches_model(capacity in 1usize..8, keys in proptest::collection::vec(0u32..20, 0..200)) {
                let mut cache = ValueCache::new(capacity);
                let mut model: Vec<StateKey> = Vec::new();
                let mut evictions = 0u64;
                for k in keys {
                    let key = StateKey(k);
                    match model.iter().position(|&m| m == key) {
                        Some(i) => {
                            model.remove(i);
                        }
                        None if model.len() == capacity => {
                            model.remove(0);
                            evictions += 1;
                        }
                        None => {}
                    }
                    model.push(key);
                    cache.get_or_insert_with(key, || v(k as i32));
                    prop_assert_eq!(&model, &cache.keys_by_recency());
                }
                prop_assert!(cache.len() <= capacity);
                prop_assert_eq!(evictions, cache.evictions());
                for &key in &model {
                    prop_assert_eq!(Some(v(key.0 as i32)), cache.peek(key));
                }
            }
        }
    }
}
