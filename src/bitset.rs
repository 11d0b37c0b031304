//! Bitset
//!
//! Fixed capacity set of sample indices, used to track which rows of the
//! training data are still active at a node of the tree while it is grown.

const WORD_BITS: usize = u64::BITS as usize;

/// A fixed capacity bit vector over sample indices, with a population
/// count that is maintained on every mutation.
///
/// Every index passed to a method must be in `0..capacity`, an index
/// outside of that range panics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitset {
    words: Vec<u64>,
    capacity: usize,
    n_set: usize,
}

impl Bitset {
    /// Create a bitset able to hold `capacity` indices, with no bits set.
    pub fn new(capacity: usize) -> Self {
        Bitset {
            words: vec![0; capacity.div_ceil(WORD_BITS)],
            capacity,
            n_set: 0,
        }
    }

    /// Create a bitset with every index in `0..capacity` set.
    pub fn full(capacity: usize) -> Self {
        let mut bs = Bitset::new(capacity);
        bs.set_all();
        bs
    }

    #[inline]
    fn locate(&self, i: usize) -> (usize, u64) {
        assert!(
            i < self.capacity,
            "bitset index {} out of range for capacity {}",
            i,
            self.capacity
        );
        (i / WORD_BITS, 1 << (i % WORD_BITS))
    }

    /// Set bit `i`. Setting a bit that is already set leaves the count unchanged.
    #[inline]
    pub fn set(&mut self, i: usize) {
        let (w, mask) = self.locate(i);
        if self.words[w] & mask == 0 {
            self.words[w] |= mask;
            self.n_set += 1;
        }
    }

    /// Unset bit `i`. Unsetting a bit that is not set leaves the count unchanged.
    #[inline]
    pub fn unset(&mut self, i: usize) {
        let (w, mask) = self.locate(i);
        if self.words[w] & mask != 0 {
            self.words[w] &= !mask;
            self.n_set -= 1;
        }
    }

    pub fn set_all(&mut self) {
        self.words.iter_mut().for_each(|w| *w = u64::MAX);
        // Clear the tail of the last word, so bits beyond capacity are never observed.
        let tail = self.capacity % WORD_BITS;
        if tail != 0 {
            if let Some(last) = self.words.last_mut() {
                *last = (1 << tail) - 1;
            }
        }
        self.n_set = self.capacity;
    }

    pub fn unset_all(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
        self.n_set = 0;
    }

    #[inline]
    pub fn is_set(&self, i: usize) -> bool {
        let (w, mask) = self.locate(i);
        self.words[w] & mask != 0
    }

    /// Number of set bits, read in constant time.
    #[inline]
    pub fn count(&self) -> usize {
        self.n_set
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n_set == 0
    }

    /// Count the set bits by scanning the words, rather than
    /// reading the maintained count.
    pub fn recount(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterate over the set indices in ascending order.
    pub fn iter(&self) -> Ones<'_> {
        Ones {
            words: &self.words,
            word_idx: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }
}

/// Iterator over the set indices of a [`Bitset`], lowest index first.
pub struct Ones<'a> {
    words: &'a [u64],
    word_idx: usize,
    current: u64,
}

impl Iterator for Ones<'_> {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        while self.current == 0 {
            self.word_idx += 1;
            self.current = *self.words.get(self.word_idx)?;
        }
        let bit = self.current.trailing_zeros() as usize;
        // Clear the lowest set bit.
        self.current &= self.current - 1;
        Some(self.word_idx * WORD_BITS + bit)
    }
}

impl<'a> IntoIterator for &'a Bitset {
    type Item = usize;
    type IntoIter = Ones<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
