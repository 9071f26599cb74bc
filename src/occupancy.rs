//! Occupancy bitmap parallel to the slot array.

use std::collections::TryReserveError;
use std::ops::Range;

const WORD_BITS: usize = u64::BITS as usize;

/// Mask selecting bits `lo..hi` of a word (`hi <= 64`).
#[inline]
fn span_mask(lo: usize, hi: usize) -> u64 {
    debug_assert!(lo <= hi && hi <= WORD_BITS);
    if hi - lo == WORD_BITS {
        u64::MAX
    } else {
        ((1u64 << (hi - lo)) - 1) << lo
    }
}

/// One bit per slot: set iff the slot holds a key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Occupancy {
    words: Vec<u64>,
    len: usize,
}

impl Occupancy {
    /// All-clear bitmap of `len` bits.
    pub fn try_with_len(len: usize) -> Result<Self, TryReserveError> {
        let n = len.div_ceil(WORD_BITS);
        let mut words = Vec::new();
        words.try_reserve_exact(n)?;
        words.resize(n, 0);
        Ok(Self { words, len })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn get(&self, i: usize) -> bool {
        debug_assert!(i < self.len);
        self.words[i / WORD_BITS] & (1u64 << (i % WORD_BITS)) != 0
    }

    #[inline]
    pub fn set(&mut self, i: usize) {
        debug_assert!(i < self.len);
        self.words[i / WORD_BITS] |= 1u64 << (i % WORD_BITS);
    }

    /// Applies `f(word, mask)` to every word overlapping `range`.
    fn for_each_word(&mut self, range: Range<usize>, f: impl Fn(&mut u64, u64)) {
        debug_assert!(range.end <= self.len);
        let mut i = range.start;
        while i < range.end {
            let w = i / WORD_BITS;
            let lo = i % WORD_BITS;
            let hi = (range.end - w * WORD_BITS).min(WORD_BITS);
            f(&mut self.words[w], span_mask(lo, hi));
            i = (w + 1) * WORD_BITS;
        }
    }

    pub fn set_range(&mut self, range: Range<usize>) {
        self.for_each_word(range, |word, mask| *word |= mask);
    }

    pub fn clear_range(&mut self, range: Range<usize>) {
        self.for_each_word(range, |word, mask| *word &= !mask);
    }

    /// Number of set bits in `range`.
    pub fn count_range(&self, range: Range<usize>) -> usize {
        debug_assert!(range.end <= self.len);
        let mut count = 0usize;
        let mut i = range.start;
        while i < range.end {
            let w = i / WORD_BITS;
            let lo = i % WORD_BITS;
            let hi = (range.end - w * WORD_BITS).min(WORD_BITS);
            count += (self.words[w] & span_mask(lo, hi)).count_ones() as usize;
            i = (w + 1) * WORD_BITS;
        }
        count
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}
