//! Index arithmetic for the implicit rebalancing tree.
//!
//! Nothing here owns storage. Chunks, levels and segments are pure functions
//! of a capacity, so the tree is never materialized as nodes.

use std::ops::Range;

use crate::error::PmaError;

/// Floor of `log2(n)`, with `log2(0) == log2(1) == 0`.
#[inline]
pub(crate) fn log2(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - 1 - n.leading_zeros()
    }
}

/// Capacity after multiplying `current` by `factor`, or
/// [`PmaError::CapacityOverflow`] if that does not fit in `usize`.
pub(crate) fn grown_capacity(current: usize, factor: usize) -> Result<usize, PmaError> {
    current
        .checked_mul(factor)
        .ok_or(PmaError::CapacityOverflow { current, factor })
}

/// Maximum occupancy ratio allowed for a segment at `level` of an array with
/// `capacity` slots.
///
/// Interpolates linearly from `high` at a single chunk towards `low`. The
/// denominator is `log2(capacity)`, not the level count, so the root stays
/// strictly above `low`.
pub(crate) fn upper_threshold(level: u32, capacity: usize, high: f64, low: f64) -> f64 {
    let height = log2(capacity);
    if height == 0 {
        return high;
    }
    high - (high - low) * f64::from(level) / f64::from(height)
}

/// Chunk geometry derived from a power-of-two capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Layout {
    pub capacity: usize,
    pub chunk_size: usize,
    pub chunk_count: usize,
    /// `log2(chunk_count)`; level `level_count` is the whole array.
    pub level_count: u32,
}

impl Layout {
    pub fn for_capacity(capacity: usize) -> Result<Self, PmaError> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(PmaError::invalid(format!(
                "capacity must be a positive power of two, got {capacity}"
            )));
        }
        // 2^floor(log2(2 * floor(log2 capacity))): on the order of log(capacity).
        let chunk_size = 1usize << log2(2 * log2(capacity) as usize);
        let chunk_count = capacity / chunk_size;
        Ok(Self {
            capacity,
            chunk_size,
            chunk_count,
            level_count: log2(chunk_count),
        })
    }

    #[inline]
    pub fn chunk_range(&self, chunk: usize) -> Range<usize> {
        let start = chunk * self.chunk_size;
        start..start + self.chunk_size
    }

    #[inline]
    pub fn segment_len(&self, level: u32) -> usize {
        self.chunk_size << level
    }

    /// The aligned segment at `level` that contains `chunk`.
    pub fn segment_range(&self, level: u32, chunk: usize) -> Range<usize> {
        let len = self.segment_len(level);
        let start = (chunk >> level) * len;
        start..start + len
    }

    /// The half of the `level` segment around `chunk` that was not already
    /// counted at `level - 1`.
    ///
    /// When the chunk's `level - 1` ancestor is a left child the right half is
    /// returned, otherwise the left half.
    pub fn counter_half(&self, level: u32, chunk: usize) -> Range<usize> {
        debug_assert!(level >= 1);
        let segment = self.segment_range(level, chunk);
        let half = segment.len() / 2;
        if (chunk >> (level - 1)) % 2 == 0 {
            segment.start + half..segment.end
        } else {
            segment.start..segment.start + half
        }
    }

    #[inline]
    pub fn upper_threshold_at(&self, level: u32, high: f64, low: f64) -> f64 {
        upper_threshold(level, self.capacity, high, low)
    }
}
