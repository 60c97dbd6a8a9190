//! An indexable binary max-heap.
//!
//! Items are dense ids `0..n`, and the heap owns their keys. The heap keeps a position table
//! (`pos[id]` = slot in the heap array) alongside the heap array itself, so when the key of an item
//! already in the heap changes, the heap finds it in O(1) and restores the heap property in
//! O(log n) by sifting from that slot.

use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};

/// Sentinel position for items which have been popped.
const POPPED: usize = usize::MAX;

pub struct IndexedHeap<K, F> {
    /// Heap slot -> item id.
    heap: Vec<usize>,
    /// Item id -> heap slot, or POPPED.
    pos: Vec<usize>,
    keys: Vec<K>,
    cmp: F,
}

impl<K: Debug, F> Debug for IndexedHeap<K, F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedHeap")
            .field("heap", &self.heap)
            .field("keys", &self.keys)
            .finish()
    }
}

impl<K: Ord> IndexedHeap<K, fn(&K, &K) -> Ordering> {
    /// Build a heap over items `0..keys.len()` using the keys' natural order.
    pub fn from_keys(keys: Vec<K>) -> Self {
        Self::with_comparator(keys, K::cmp as fn(&K, &K) -> Ordering)
    }
}

impl<K, F: Fn(&K, &K) -> Ordering> IndexedHeap<K, F> {
    /// Build a heap over items `0..keys.len()`, where item `i` has key `keys[i]`. The item with the
    /// greatest key according to `cmp` is popped first. O(n).
    pub fn with_comparator(keys: Vec<K>, cmp: F) -> Self {
        let n = keys.len();
        let mut result = Self {
            heap: (0..n).collect(),
            pos: (0..n).collect(),
            keys,
            cmp,
        };
        for slot in (0..n / 2).rev() {
            result.sift_down(slot);
        }
        result
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn contains(&self, id: usize) -> bool {
        self.pos[id] != POPPED
    }

    /// The current key of an item. Keys remain readable after the item has been popped.
    pub fn key(&self, id: usize) -> &K {
        &self.keys[id]
    }

    /// The item which would be popped next.
    #[cfg(test)]
    pub fn peek(&self) -> Option<usize> {
        self.heap.first().copied()
    }

    /// Remove and return the item with the greatest key.
    pub fn pop(&mut self) -> Option<usize> {
        let last = self.heap.len().checked_sub(1)?;
        self.swap(0, last);
        let id = self.heap.pop()?;
        self.pos[id] = POPPED;
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        Some(id)
    }

    /// Modify an item's key in place. If the item is still in the heap, its position is repaired
    /// in either direction.
    pub fn update<R>(&mut self, id: usize, f: impl FnOnce(&mut K) -> R) -> R {
        let r = f(&mut self.keys[id]);
        let slot = self.pos[id];
        if slot != POPPED {
            let slot = self.sift_up(slot);
            self.sift_down(slot);
        }
        r
    }

    fn less(&self, a: usize, b: usize) -> bool {
        (self.cmp)(&self.keys[self.heap[a]], &self.keys[self.heap[b]]) == Ordering::Less
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.pos[self.heap[a]] = a;
        self.pos[self.heap[b]] = b;
    }

    fn sift_up(&mut self, mut slot: usize) -> usize {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if !self.less(parent, slot) { break; }
            self.swap(slot, parent);
            slot = parent;
        }
        slot
    }

    fn sift_down(&mut self, mut slot: usize) {
        let len = self.heap.len();
        loop {
            let left = slot * 2 + 1;
            if left >= len { break; }
            let right = left + 1;
            let child = if right < len && self.less(left, right) { right } else { left };
            if !self.less(slot, child) { break; }
            self.swap(slot, child);
            slot = child;
        }
    }

    #[allow(unused)]
    pub(crate) fn dbg_check(&self) {
        for slot in 1..self.heap.len() {
            assert!(!self.less((slot - 1) / 2, slot), "Heap order violated at slot {slot}");
        }
        for (slot, &id) in self.heap.iter().enumerate() {
            assert_eq!(self.pos[id], slot);
        }
        assert_eq!(self.pos.iter().filter(|&&p| p != POPPED).count(), self.heap.len());
    }
}

#[cfg(test)]
mod test {
    use std::cmp::Reverse;

    use rand::prelude::*;
    use rand::rngs::SmallRng;

    use super::*;

    fn drain<K, F: Fn(&K, &K) -> Ordering>(heap: &mut IndexedHeap<K, F>) -> Vec<usize> {
        let mut result = vec![];
        while let Some(id) = heap.pop() {
            heap.dbg_check();
            result.push(id);
        }
        result
    }

    #[test]
    fn empty() {
        let mut heap = IndexedHeap::from_keys(Vec::<i32>::new());
        assert!(heap.is_empty());
        assert_eq!(heap.pop(), None);
        assert_eq!(heap.peek(), None);
    }

    #[test]
    fn pops_in_descending_order() {
        let mut rng = SmallRng::seed_from_u64(10);
        let mut values: Vec<i32> = (-20..=20).collect();
        let mut expected = values.clone();
        expected.sort_unstable_by(|a, b| b.cmp(a));

        for _ in 0..1000 {
            values.shuffle(&mut rng);
            let mut heap = IndexedHeap::from_keys(values.clone());
            heap.dbg_check();
            let popped: Vec<i32> = drain(&mut heap).into_iter().map(|id| values[id]).collect();
            assert_eq!(popped, expected);
        }
    }

    #[test]
    fn update_moves_both_ways() {
        let mut rng = SmallRng::seed_from_u64(20);
        let mut values: Vec<i32> = (-20..=20).collect();

        for _ in 0..1000 {
            values.shuffle(&mut rng);
            let mut heap = IndexedHeap::from_keys(values.clone());

            let min = (0..values.len()).min_by_key(|&i| values[i]).unwrap();
            let max = (0..values.len()).max_by_key(|&i| values[i]).unwrap();
            heap.update(min, |k| *k += 100);
            heap.dbg_check();
            heap.update(max, |k| *k -= 100);
            heap.dbg_check();
            assert_eq!(heap.peek(), Some(min));

            let popped: Vec<i32> = drain(&mut heap).into_iter().map(|id| *heap.key(id)).collect();
            let mut expected: Vec<i32> = (0..values.len()).map(|i| *heap.key(i)).collect();
            expected.sort_unstable_by(|a, b| b.cmp(a));
            assert_eq!(popped, expected);
        }
    }

    #[test]
    fn custom_comparator_and_popped_items() {
        // Min-heap by flipping the comparator.
        let mut heap = IndexedHeap::with_comparator(vec![5, 3, 9], |a: &i32, b: &i32| b.cmp(a));
        assert_eq!(heap.pop(), Some(1));
        assert!(!heap.contains(1));

        // Updating a popped item changes its key but nothing else.
        heap.update(1, |k| *k = -100);
        assert_eq!(*heap.key(1), -100);
        assert_eq!(heap.len(), 2);
        assert_eq!(drain(&mut heap), [0, 2]);
    }

    #[test]
    fn fuzz_against_sorting() {
        let mut rng = SmallRng::seed_from_u64(321);
        for _ in 0..200 {
            let n = rng.gen_range(0..60);
            let keys: Vec<(u32, Reverse<usize>)> = (0..n)
                .map(|i| (rng.gen_range(0..8), Reverse(i)))
                .collect();
            let mut heap = IndexedHeap::from_keys(keys);

            let mut order = vec![];
            while !heap.is_empty() {
                // Bump a few random keys before each pop.
                for _ in 0..3 {
                    let id = rng.gen_range(0..n);
                    if heap.contains(id) {
                        heap.update(id, |k| k.0 += 1);
                    }
                }
                heap.dbg_check();

                let best = (0..n).filter(|&i| heap.contains(i)).max_by_key(|&i| *heap.key(i));
                let id = heap.pop();
                assert_eq!(id, best);
                order.extend(id);
            }
            assert_eq!(order.len(), n);
        }
    }
}
