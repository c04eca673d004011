//! Dense bit sets keyed by index newtypes.

use crate::index::Idx;
use std::{fmt, marker::PhantomData};

/// A dense, growable bit set over an index type.
#[derive(Clone, PartialEq, Eq)]
pub struct BitSet<I> {
    /// Bit `i` of word `i / 64` is set when index `i` is in the set.
    words: Vec<u64>,
    _marker: PhantomData<fn(I)>,
}

impl<I> Default for BitSet<I> {
    fn default() -> Self {
        Self { words: Vec::new(), _marker: PhantomData }
    }
}

impl<I: Idx> BitSet<I> {
    /// Creates a new empty set with room for `n` indices.
    #[must_use]
    pub fn with_capacity(n: usize) -> Self {
        Self { words: vec![0; n.div_ceil(64)], _marker: PhantomData }
    }

    /// Returns true if `idx` is in the set.
    #[must_use]
    pub fn contains(&self, idx: I) -> bool {
        let (word, mask) = Self::locate(idx);
        word < self.words.len() && (self.words[word] & mask) != 0
    }

    /// Adds `idx` to the set. Returns true if it was not already present.
    pub fn insert(&mut self, idx: I) -> bool {
        let (word, mask) = Self::locate(idx);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let was_absent = (self.words[word] & mask) == 0;
        self.words[word] |= mask;
        was_absent
    }

    /// Returns an iterator over the indices in the set, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = I> + '_ {
        self.words.iter().enumerate().flat_map(|(word_idx, &word)| {
            (0..64)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| I::from_usize(word_idx * 64 + bit))
        })
    }

    fn locate(idx: I) -> (usize, u64) {
        let idx = idx.index();
        (idx / 64, 1u64 << (idx % 64))
    }
}

impl<I: Idx + fmt::Debug> fmt::Debug for BitSet<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::newtype_index! {
        struct TestIdx;
    }

    #[test]
    fn test_bitset_basic() {
        let mut set = BitSet::with_capacity(100);
        let i0 = TestIdx::from_usize(0);
        let i42 = TestIdx::from_usize(42);
        let i99 = TestIdx::from_usize(99);

        assert!(!set.contains(i0));
        assert_eq!(set.iter().next(), None);

        assert!(set.insert(i0));
        assert!(set.contains(i0));
        assert!(!set.insert(i0)); // Already present

        assert!(set.insert(i99));
        assert!(!set.contains(i42));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![i0, i99]);
    }

    #[test]
    fn test_bitset_insert_grows() {
        let mut set: BitSet<TestIdx> = BitSet::default();
        let far = TestIdx::from_usize(130);
        assert!(!set.contains(far));
        assert!(set.insert(far));
        assert!(set.contains(far));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![far]);
    }
}
