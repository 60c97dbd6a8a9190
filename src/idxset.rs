use std::fmt::Debug;

use smallvec::SmallVec;

/// A small set of arena indexes, stored as a sorted inline vector.
///
/// Most checksums are shared by only one or two app-versions, and most app-versions have only a
/// few dependency edges. So nearly all of these sets fit inline without allocating.
///
/// The contents must always remain sorted and free of duplicates.
#[derive(Clone, Default, Eq, PartialEq, Hash)]
pub struct IdxSet(SmallVec<[usize; 2]>);

impl Debug for IdxSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.0.iter()).finish()
    }
}

pub(crate) fn is_sorted_set(s: &[usize]) -> bool {
    s.windows(2).all(|w| w[0] < w[1])
}

impl IdxSet {
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    #[cfg(test)]
    pub fn new_1(v: usize) -> Self {
        let mut s = Self::new();
        s.0.push(v);
        s
    }

    pub fn from_unsorted_iter<I: IntoIterator<Item=usize>>(iter: I) -> Self {
        let mut arr: SmallVec<[usize; 2]> = iter.into_iter().collect();
        arr.sort_unstable();
        arr.dedup();
        Self(arr)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, v: usize) -> bool {
        self.0.binary_search(&v).is_ok()
    }

    /// Returns true if the value was newly inserted.
    pub fn insert(&mut self, v: usize) -> bool {
        match self.0.binary_search(&v) {
            Ok(_) => false,
            Err(pos) => {
                self.0.insert(pos, v);
                true
            }
        }
    }

    /// Returns true if the value was present.
    pub fn remove(&mut self, v: usize) -> bool {
        match self.0.binary_search(&v) {
            Ok(pos) => {
                self.0.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    pub fn extend<I: IntoIterator<Item=usize>>(&mut self, iter: I) {
        for v in iter { self.insert(v); }
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// The only item in the set, if the set has exactly one item.
    pub fn single(&self) -> Option<usize> {
        if self.0.len() == 1 { Some(self.0[0]) } else { None }
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item=usize> + ExactSizeIterator + '_ {
        self.0.iter().copied()
    }

    pub fn as_slice(&self) -> &[usize] {
        self.0.as_slice()
    }

    /// Keep only the items which are also in `other`.
    pub fn retain_in(&mut self, other: &IdxSet) {
        self.0.retain(|v| other.contains(*v));
    }

    pub fn is_disjoint(&self, other: &IdxSet) -> bool {
        let (small, big) = if self.len() <= other.len() { (self, other) } else { (other, self) };
        small.iter().all(|v| !big.contains(v))
    }

    pub(crate) fn debug_check_sorted(&self) {
        debug_assert!(is_sorted_set(self.0.as_slice()));
    }
}

impl FromIterator<usize> for IdxSet {
    fn from_iter<T: IntoIterator<Item=usize>>(iter: T) -> Self {
        IdxSet::from_unsorted_iter(iter)
    }
}

impl<'a> IntoIterator for &'a IdxSet {
    type Item = usize;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, usize>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter().copied()
    }
}
