//! A [CostBasedLru] is an Lru cache bounded both by how many entries it holds and by the summed cost of those entries.
//!
//! This is implemented as a vec-backed doubly linked list where the items are allocated on the heap behind `Arc`, plus
//! an auxiliary hash-based index.  Slots freed by removal are threaded onto a free list and reused by later inserts.
//!
//! The cache never decides what to do with evicted entries; [CostBasedLru::insert] hands them back so that the owner can
//! keep side tables in sync.
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use ahash::RandomState;

struct OccupiedEntry<K, V> {
    key: K,
    item: Arc<V>,
    prev: Option<usize>,
    next: Option<usize>,
    cost: u64,
}

struct EmptyEntry {
    next_empty: Option<usize>,
}

enum Slot<K, V> {
    /// This slot is empty, possibly with a pointer at the next empty slot.
    Empty(EmptyEntry),
    /// This slot is occupied, and doubly linked to the previous and next entry.
    Occupied(OccupiedEntry<K, V>),
}

impl<K, V> Slot<K, V> {
    fn as_occupied_mut(&mut self) -> &mut OccupiedEntry<K, V> {
        match self {
            Self::Occupied(ref mut x) => x,
            _ => panic!("Slot should be occupied"),
        }
    }

    fn as_occupied(&self) -> &OccupiedEntry<K, V> {
        match self {
            Self::Occupied(ref x) => x,
            _ => panic!("Slot should be occupied"),
        }
    }

    fn as_empty_mut(&mut self) -> &mut EmptyEntry {
        match self {
            Self::Empty(ref mut x) => x,
            _ => panic!("Slot should be empty"),
        }
    }
}

/// An entry pushed out of the cache to bring it back under its limits.
#[derive(Debug)]
pub struct Evicted<K, V> {
    pub key: K,
    pub item: Arc<V>,
    pub cost: u64,
}

/// What happened to the cache during [CostBasedLru::insert].
#[derive(Debug)]
pub struct InsertOutcome<K, V> {
    /// The value previously stored under the same key, if any.
    pub replaced: Option<Arc<V>>,
    /// Entries evicted by this insert, least recently used first.
    ///
    /// Contains the inserted entry itself only when it can never fit: its cost alone is above the cost limit, or the
    /// entry limit is zero.
    pub evicted: Vec<Evicted<K, V>>,
}

impl<K, V> InsertOutcome<K, V> {
    /// Was the just-inserted entry kept?
    pub fn kept<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        !self.evicted.iter().any(|e| e.key.borrow() == key)
    }
}

pub struct CostBasedLru<K, V> {
    slots: Vec<Slot<K, V>>,
    /// Points at the slot of the key.
    index: HashMap<K, usize, RandomState>,
    max_entries: usize,
    // At what cost do we start evicting?
    max_cost: u64,
    /// Most recently used.
    head: Option<usize>,
    /// Least recently used; the next eviction candidate.
    tail: Option<usize>,
    empty_head: Option<usize>,
    /// Current cost of the items in the cache.
    current_cost: u64,
}

impl<K: Hash + Eq + Clone, V> CostBasedLru<K, V> {
    pub fn new(max_entries: usize, max_cost: u64) -> CostBasedLru<K, V> {
        CostBasedLru {
            slots: Default::default(),
            index: Default::default(),
            max_entries,
            max_cost,
            head: None,
            tail: None,
            empty_head: None,
            current_cost: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn current_cost(&self) -> u64 {
        self.current_cost
    }

    pub fn max_cost(&self) -> u64 {
        self.max_cost
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Detach an occupied slot from the recency list, patching up head and tail.
    fn unlink(&mut self, index: usize) {
        let (prev, next) = {
            let e = self.slots[index].as_occupied();
            (e.prev, e.next)
        };

        match prev {
            Some(p) => self.slots[p].as_occupied_mut().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].as_occupied_mut().prev = prev,
            None => self.tail = prev,
        }

        let e = self.slots[index].as_occupied_mut();
        e.prev = None;
        e.next = None;
    }

    /// Link a detached occupied slot in as the most recent entry.
    fn push_front(&mut self, index: usize) {
        let old_head = self.head;
        {
            let e = self.slots[index].as_occupied_mut();
            e.prev = None;
            e.next = old_head;
        }

        match old_head {
            Some(h) => self.slots[h].as_occupied_mut().prev = Some(index),
            // First entry: it is the tail as well.
            None => self.tail = Some(index),
        }
        self.head = Some(index);
    }

    /// Look up a key, making it the most recently used entry.
    pub fn get<Q>(&mut self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let ind = *self.index.get(key)?;
        if self.head != Some(ind) {
            self.unlink(ind);
            self.push_front(ind);
        }
        Some(self.slots[ind].as_occupied().item.clone())
    }

    /// Look up a key without touching its recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let ind = *self.index.get(key)?;
        Some(self.slots[ind].as_occupied().item.clone())
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.contains_key(key)
    }

    /// Make a specific slot become empty, returning what was in it.
    fn become_empty(&mut self, index: usize) -> OccupiedEntry<K, V> {
        self.unlink(index);
        let old = std::mem::replace(
            &mut self.slots[index],
            Slot::Empty(EmptyEntry {
                next_empty: self.empty_head,
            }),
        );
        self.empty_head = Some(index);
        match old {
            Slot::Occupied(entry) => {
                self.index.remove(&entry.key);
                self.current_cost -= entry.cost;
                entry
            }
            _ => panic!("Should have been occupied"),
        }
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let ind = *self.index.get(key)?;
        Some(self.become_empty(ind).item)
    }

    /// Find an available empty slot, or make one if necessary.
    fn find_empty(&mut self) -> usize {
        if let Some(e) = self.empty_head {
            self.empty_head = self.slots[e].as_empty_mut().next_empty;
            return e;
        }

        self.slots.push(Slot::Empty(EmptyEntry { next_empty: None }));
        self.slots.len() - 1
    }

    /// Add an entry to the cache as the most recently used one, evicting first so that both limits hold once it is in.
    ///
    /// Older entries always go first.  The new entry is only dropped if it can never fit, i.e. its own cost is above the
    /// cost limit or the cache holds no entries at all, in which case nothing else is touched.
    pub fn insert(&mut self, key: K, item: Arc<V>, cost: u64) -> InsertOutcome<K, V> {
        let replaced = self.remove(&key);

        if cost > self.max_cost || self.max_entries == 0 {
            return InsertOutcome {
                replaced,
                evicted: vec![Evicted { key, item, cost }],
            };
        }

        // Nothing is linked until there is room, so the running cost never exceeds `max_cost`.
        let evicted = self.make_room(cost);

        let ind = self.find_empty();
        self.slots[ind] = Slot::Occupied(OccupiedEntry {
            key: key.clone(),
            item,
            prev: None,
            next: None,
            cost,
        });
        self.push_front(ind);
        self.index.insert(key, ind);
        self.current_cost += cost;

        InsertOutcome { replaced, evicted }
    }

    /// Evict from the tail until one more entry of `cost` fits within both limits.
    ///
    /// Callers guarantee `cost <= max_cost` and `max_entries > 0`.
    fn make_room(&mut self, cost: u64) -> Vec<Evicted<K, V>> {
        let mut evicted = vec![];
        while self.len() >= self.max_entries || self.current_cost > self.max_cost - cost {
            let cur = match self.tail {
                Some(t) => t,
                None => panic!("Not enough entries to explain cost"),
            };

            let OccupiedEntry {
                key, item, cost, ..
            } = self.become_empty(cur);
            evicted.push(Evicted { key, item, cost });
        }
        evicted
    }

    /// Drop every entry, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let dropped = self.len();
        self.slots.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
        self.empty_head = None;
        self.current_cost = 0;
        dropped
    }

    /// Iterator visiting entries in most-recently-used order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        let mut ind = self.head;
        std::iter::from_fn(move || {
            let next = ind?;
            let ret = self.slots[next].as_occupied();
            ind = ret.next;
            Some((&ret.key, &*ret.item))
        })
    }
}
