//! # Dirty Bit Set
//!
//! One bit per slot, packed 64 to a word. Each word is an independent
//! atomic so concurrent writers on different slots never contend on a lock.
//!
//! Marking is `&self`; growing and draining the whole set happen under
//! exclusive access to the owning table.

use std::sync::atomic::{AtomicU64, Ordering};

const WORD_BITS: usize = 64;

/// Atomic bit set tracking which slots changed during the current tick.
#[derive(Debug, Default)]
pub struct DirtyBits {
    words: Vec<AtomicU64>,
}

impl DirtyBits {
    /// Creates a bit set able to track `capacity` slots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let mut bits = Self::default();
        bits.grow(capacity);
        bits
    }

    /// Number of slots representable without growing.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.words.len() * WORD_BITS
    }

    /// Grows to at least `capacity` slots. Never shrinks.
    pub fn grow(&mut self, capacity: usize) {
        let needed = capacity.div_ceil(WORD_BITS);
        while self.words.len() < needed {
            self.words.push(AtomicU64::new(0));
        }
    }

    /// Marks `index` dirty. Returns true if it was previously clean.
    ///
    /// # Panics
    ///
    /// Panics if `index` is outside the current capacity.
    #[inline]
    pub fn mark(&self, index: usize) -> bool {
        let bit = 1u64 << (index % WORD_BITS);
        let prev = self.words[index / WORD_BITS].fetch_or(bit, Ordering::AcqRel);
        prev & bit == 0
    }

    /// Clears `index`. Out-of-range indices are ignored.
    #[inline]
    pub fn clear(&self, index: usize) {
        if let Some(word) = self.words.get(index / WORD_BITS) {
            word.fetch_and(!(1u64 << (index % WORD_BITS)), Ordering::AcqRel);
        }
    }

    /// True if `index` is marked.
    #[inline]
    #[must_use]
    pub fn is_dirty(&self, index: usize) -> bool {
        self.words
            .get(index / WORD_BITS)
            .is_some_and(|w| w.load(Ordering::Acquire) & (1u64 << (index % WORD_BITS)) != 0)
    }

    /// Number of marked slots.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words
            .iter()
            .map(|w| w.load(Ordering::Acquire).count_ones() as usize)
            .sum()
    }

    /// Marked slot indices in ascending order, without clearing them.
    pub fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(word_idx, word)| {
            let mut bits = word.load(Ordering::Acquire);
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let bit = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some(word_idx * WORD_BITS + bit)
            })
        })
    }

    /// Clears every bit.
    pub fn clear_all(&self) {
        for word in &self.words {
            word.store(0, Ordering::Release);
        }
    }

    /// Clears every bit and returns the indices that were marked.
    pub fn take(&mut self) -> Vec<usize> {
        let mut out = Vec::new();
        for (word_idx, word) in self.words.iter_mut().enumerate() {
            let bits = std::mem::take(word.get_mut());
            collect_bits(bits, word_idx, &mut out);
        }
        out
    }
}

fn collect_bits(mut bits: u64, word_idx: usize, out: &mut Vec<usize>) {
    while bits != 0 {
        let bit = bits.trailing_zeros() as usize;
        out.push(word_idx * WORD_BITS + bit);
        bits &= bits - 1;
    }
}
