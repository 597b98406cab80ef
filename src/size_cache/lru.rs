use std::collections::HashMap;
use std::hash::Hash;

/// Slot in the recency list. `prev` points towards the most recently used
/// end, `next` towards the least recently used end.
#[derive(Debug)]
struct Entry<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Bounded map with least-recently-used eviction.
///
/// A hash index maps keys to slots; slots form an intrusive doubly linked
/// recency list. Slots are never freed, an eviction hands its slot to the
/// incoming entry, so the slab stays dense.
#[derive(Debug)]
pub struct LruMap<K, V> {
    capacity: usize,
    index: HashMap<K, usize>,
    slots: Vec<Entry<K, V>>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<K: Eq + Hash + Clone, V> LruMap<K, V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            index: HashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            head: None,
            tail: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Look up without touching recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.index.get(key).map(|&idx| &self.slots[idx].value)
    }

    /// Look up and mark as most recently used.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let idx = *self.index.get(key)?;
        self.touch(idx);
        Some(&mut self.slots[idx].value)
    }

    /// Return the entry for `key`, creating it with `make` if absent.
    ///
    /// Creating an entry at capacity evicts the least recently used one,
    /// which is handed back to the caller.
    pub fn get_or_insert_with<F>(
        &mut self,
        key: K,
        make: F,
    ) -> (&mut V, Option<(K, V)>)
    where
        F: FnOnce() -> V,
    {
        if let Some(&idx) = self.index.get(&key) {
            self.touch(idx);
            return (&mut self.slots[idx].value, None);
        }

        let fresh = Entry {
            key: key.clone(),
            value: make(),
            prev: None,
            next: None,
        };

        let full = self.slots.len() >= self.capacity;
        let (idx, evicted) = match self.tail.filter(|_| full) {
            Some(idx) => {
                self.detach(idx);
                let old = std::mem::replace(&mut self.slots[idx], fresh);
                self.index.remove(&old.key);
                (idx, Some((old.key, old.value)))
            }
            None => {
                self.slots.push(fresh);
                (self.slots.len() - 1, None)
            }
        };

        self.index.insert(key, idx);
        self.push_front(idx);
        (&mut self.slots[idx].value, evicted)
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let idx = cursor?;
            cursor = self.slots[idx].next;
            Some(&self.slots[idx].key)
        })
    }

    // ── Recency list plumbing ───────────────────────────────────

    fn touch(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.detach(idx);
        self.push_front(idx);
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);
        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }
        self.slots[idx].prev = None;
        self.slots[idx].next = None;
    }

    fn push_front(&mut self, idx: usize) {
        self.slots[idx].prev = None;
        self.slots[idx].next = self.head;
        if let Some(h) = self.head {
            self.slots[h].prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(map: &LruMap<&'static str, u32>) -> Vec<&'static str> {
        map.keys().copied().collect()
    }

    #[test]
    fn inserts_until_capacity_without_eviction() {
        let mut map = LruMap::new(3);
        for (i, k) in ["a", "b", "c"].into_iter().enumerate() {
            let (_, evicted) = map.get_or_insert_with(k, || i as u32);
            assert!(evicted.is_none());
        }
        assert_eq!(map.len(), 3);
        assert_eq!(keys(&map), vec!["c", "b", "a"]);
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut map = LruMap::new(2);
        map.get_or_insert_with("a", || 1);
        map.get_or_insert_with("b", || 2);
        // touch "a" so "b" becomes the eviction candidate
        assert_eq!(map.get_mut(&"a"), Some(&mut 1));

        let (value, evicted) = map.get_or_insert_with("c", || 3);
        assert_eq!(*value, 3);
        assert_eq!(evicted, Some(("b", 2)));
        assert!(!map.contains(&"b"));
        assert_eq!(keys(&map), vec!["c", "a"]);
    }

    #[test]
    fn existing_key_is_not_rebuilt() {
        let mut map = LruMap::new(2);
        map.get_or_insert_with("a", || 1);
        let (value, evicted) = map.get_or_insert_with("a", || 99);
        assert_eq!(*value, 1);
        assert!(evicted.is_none());
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn capacity_one_replaces_in_place() {
        let mut map = LruMap::new(1);
        map.get_or_insert_with("a", || 1);
        let (_, evicted) = map.get_or_insert_with("b", || 2);
        assert_eq!(evicted, Some(("a", 1)));
        assert_eq!(map.peek(&"b"), Some(&2));
        assert_eq!(keys(&map), vec!["b"]);
    }

    #[test]
    fn peek_does_not_promote() {
        let mut map = LruMap::new(2);
        map.get_or_insert_with("a", || 1);
        map.get_or_insert_with("b", || 2);
        assert_eq!(map.peek(&"a"), Some(&1));
        let (_, evicted) = map.get_or_insert_with("c", || 3);
        assert_eq!(evicted.map(|(k, _)| k), Some("a"));
    }

    #[test]
    fn long_churn_keeps_list_consistent() {
        let mut map: LruMap<u32, u32> = LruMap::new(4);
        for i in 0..100u32 {
            map.get_or_insert_with(i % 7, || i);
            if i % 3 == 0 {
                map.get_mut(&(i % 5));
            }
            assert!(map.len() <= 4);
            assert_eq!(map.keys().count(), map.len());
        }
    }
}
