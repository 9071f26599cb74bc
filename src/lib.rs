//! # pma-rs
//!
//! A sorted container backed by a Packed Memory Array (PMA).
//!
//! Keys live in one flat slot array interleaved with gaps, so an in-order
//! scan is a linear walk over contiguous memory while insertion into sorted
//! position only shifts keys inside a small, density-bounded segment.
//!
//! Based on Bender, Demaine and Farach-Colton, "Cache-Oblivious B-Trees"
//! (FOCS 2000), with a chunked implicit tree over the slot array.
//!
//! ## Example
//!
//! ```rust
//! use pma_rs::PackedMemoryArray;
//!
//! let mut pma = PackedMemoryArray::new();
//! for k in [5, 3, 9, 3] {
//!     pma.insert(k);
//! }
//!
//! assert_eq!(pma.to_sorted_vec(), vec![3, 3, 5, 9]);
//! assert!(pma.verify_sorted());
//! ```

#![deny(unsafe_code)]

mod config;
mod error;
mod layout;
mod occupancy;

pub use config::{
    PmaConfig, DEFAULT_BOOTSTRAP_GROWTH, DEFAULT_RESIZE_GROWTH, DEFAULT_UPPER_DENSITY_HIGH,
    DEFAULT_UPPER_DENSITY_LOW, DEFAULT_WARM_UP_SIZE,
};
pub use error::PmaError;

use std::collections::TryReserveError;
use std::ops::Range;

use layout::{grown_capacity, upper_threshold, Layout};
use occupancy::Occupancy;
use tracing::{debug, trace};

/// How a single insert was absorbed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Placement {
    /// Appended to the warm-up buffer.
    Buffered,
    /// Triggered the one-time sort-and-pack into a fresh slot array.
    Bootstrapped { capacity: usize },
    /// Fit into its target chunk.
    Chunk { chunk: usize },
    /// The target chunk was full; the ancestor segment `start..end` at
    /// `level` was redistributed.
    Segment { level: u32, start: usize, end: usize },
    /// No ancestor could absorb the key; the array grew to `capacity`.
    Resized { capacity: usize },
}

/// Occupancy tally for one step of an insert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ChunkFill {
    occupied: usize,
    within_limit: bool,
}

// =============================================================================
// Packed storage
// =============================================================================

/// The slot array and its occupancy bitmap. Slot `i` is `Some` iff bit `i` is
/// set.
#[derive(Clone)]
struct Packed<K> {
    layout: Layout,
    slots: Vec<Option<K>>,
    occupancy: Occupancy,
}

impl<K> Packed<K> {
    fn allocate(layout: Layout) -> Result<Self, TryReserveError> {
        let mut slots = Vec::new();
        slots.try_reserve_exact(layout.capacity)?;
        slots.resize_with(layout.capacity, || None);
        let occupancy = Occupancy::try_with_len(layout.capacity)?;
        debug_assert_eq!(occupancy.len(), slots.len());
        Ok(Self {
            layout,
            slots,
            occupancy,
        })
    }

    /// Removes every key in `range`, in slot order.
    fn drain(&mut self, range: Range<usize>) -> Vec<K> {
        let keys: Vec<K> = self.slots[range.clone()]
            .iter_mut()
            .filter_map(Option::take)
            .collect();
        self.occupancy.clear_range(range);
        keys
    }

    /// Left-packs sorted `keys` into the chunks of an empty array, as evenly
    /// as whole keys allow.
    fn pack_left(&mut self, keys: Vec<K>) {
        let chunk_count = self.layout.chunk_count;
        let per_chunk = keys.len() / chunk_count;
        let extra = keys.len() % chunk_count;
        debug_assert!(per_chunk + usize::from(extra > 0) <= self.layout.chunk_size);

        let mut keys = keys.into_iter();
        for chunk in 0..chunk_count {
            let start = self.layout.chunk_range(chunk).start;
            let end = start + per_chunk + usize::from(chunk < extra);
            for (slot, key) in self.slots[start..end].iter_mut().zip(keys.by_ref()) {
                *slot = Some(key);
            }
            self.occupancy.set_range(start..end);
        }
        debug_assert_eq!(self.occupancy.count(), self.slots.iter().flatten().count());
    }
}

impl<K: Ord> Packed<K> {
    /// Index of the first occupied slot in `chunk` holding a key `>= key`, or
    /// the chunk's end.
    fn scan_chunk(&self, chunk: usize, key: &K) -> usize {
        let range = self.layout.chunk_range(chunk);
        self.slots[range.clone()]
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|k| k >= key))
            .map_or(range.end, |i| range.start + i)
    }

    /// Chunk that must receive `key`.
    fn chunk_for_insertion(&self, key: &K) -> usize {
        let mut left = 0;
        let mut right = self.layout.chunk_count - 1;
        while left != right {
            let middle = (left + right) / 2;
            if self.scan_chunk(middle, key) == self.layout.chunk_range(middle).end {
                left = middle + 1;
            } else {
                right = middle;
            }
        }

        // A key that sorts between two chunks (or equals the first key of the
        // later one) goes to the tail of the earlier chunk.
        if left > 0 && self.scan_chunk(left - 1, key) == self.layout.chunk_range(left - 1).end {
            let first = self.layout.chunk_range(left).start;
            if self.slots[first].as_ref().is_some_and(|k| k >= key) {
                return left - 1;
            }
        }
        left
    }

    /// Merges `key` into `chunk` and left-packs the chunk. Hands the key back
    /// untouched when the chunk has no free slot.
    fn insert_into_chunk(&mut self, chunk: usize, key: K) -> Result<ChunkFill, K> {
        let range = self.layout.chunk_range(chunk);
        if self.occupancy.count_range(range.clone()) == self.layout.chunk_size {
            return Err(key);
        }

        let slots = &mut self.slots[range.clone()];
        let mut packed = 0;
        for i in 0..slots.len() {
            if slots[i].is_some() {
                slots.swap(packed, i);
                packed += 1;
            }
        }
        // New key goes before any equal key.
        let rank = slots[..packed].partition_point(|slot| slot.as_ref().is_some_and(|k| *k < key));
        slots[packed] = Some(key);
        slots[rank..=packed].rotate_right(1);

        self.occupancy.clear_range(range.clone());
        self.occupancy.set_range(range.start..range.start + packed + 1);
        Ok(ChunkFill {
            occupied: packed + 1,
            within_limit: true,
        })
    }

    /// Adds the half of the `level` ancestor not yet counted to `carried`
    /// and tests the total against that level's threshold.
    fn level_fill(&self, level: u32, chunk: usize, carried: usize, config: &PmaConfig) -> ChunkFill {
        let occupied = carried + self.occupancy.count_range(self.layout.counter_half(level, chunk));
        let density = occupied as f64 / self.layout.segment_len(level) as f64;
        let threshold = self.layout.upper_threshold_at(
            level,
            config.upper_density_high,
            config.upper_density_low,
        );
        ChunkFill {
            occupied,
            within_limit: density <= threshold,
        }
    }

    /// Spreads `keys` plus `key` evenly over the empty slots `range`.
    ///
    /// Rank `i` lands at `start + floor(i * len / (n + 1))`. `key` takes the
    /// first rank whose existing key is not smaller than it.
    fn redistribute(&mut self, range: Range<usize>, keys: Vec<K>, key: K) {
        let count = keys.len();
        let ratio = range.len() as f64 / (count + 1) as f64;
        debug_assert!(ratio >= 1.0);

        let mut pending = Some(key);
        let mut existing = keys.into_iter().peekable();
        for rank in 0..=count {
            let slot = range.start + (rank as f64 * ratio) as usize;
            debug_assert!(slot < range.end && !self.occupancy.get(slot));
            let next = match (&pending, existing.peek()) {
                (Some(new), Some(old)) if new > old => existing.next(),
                (Some(_), _) => pending.take(),
                (None, _) => existing.next(),
            };
            if let Some(next) = next {
                self.slots[slot] = Some(next);
                self.occupancy.set(slot);
            }
        }
    }

    fn insert(&mut self, key: K, config: &PmaConfig) -> Result<Placement, PmaError> {
        let chunk = self.chunk_for_insertion(&key);
        let key = match self.insert_into_chunk(chunk, key) {
            Ok(fill) => {
                debug_assert!(fill.within_limit && fill.occupied <= self.layout.chunk_size);
                return Ok(Placement::Chunk { chunk });
            }
            Err(key) => key,
        };

        // The full chunk plus the pending key.
        let mut carried = self.layout.chunk_size + 1;
        for level in 1..=self.layout.level_count {
            let fill = self.level_fill(level, chunk, carried, config);
            if fill.within_limit {
                let segment = self.layout.segment_range(level, chunk);
                trace!(
                    level,
                    start = segment.start,
                    end = segment.end,
                    occupied = fill.occupied,
                    "redistributing segment"
                );
                let keys = self.drain(segment.clone());
                self.redistribute(segment.clone(), keys, key);
                return Ok(Placement::Segment {
                    level,
                    start: segment.start,
                    end: segment.end,
                });
            }
            carried = fill.occupied;
        }

        self.grow(key, config.resize_growth)
    }

    /// Replaces the storage with one `factor` times larger holding every key
    /// plus `key`. Leaves `self` untouched on error.
    fn grow(&mut self, key: K, factor: usize) -> Result<Placement, PmaError> {
        let current = self.layout.capacity;
        let capacity = grown_capacity(current, factor)?;
        let layout = Layout::for_capacity(capacity)?;
        let mut grown =
            Packed::allocate(layout).map_err(|_| PmaError::CapacityOverflow { current, factor })?;

        let keys: Vec<K> = std::mem::take(&mut self.slots)
            .into_iter()
            .flatten()
            .collect();
        let len = keys.len() + 1;
        grown.redistribute(0..capacity, keys, key);
        debug!(
            from = current,
            capacity,
            chunk_size = layout.chunk_size,
            chunk_count = layout.chunk_count,
            len,
            "resized packed memory array"
        );

        *self = grown;
        Ok(Placement::Resized { capacity })
    }
}

// =============================================================================
// Public container
// =============================================================================

enum State<K> {
    /// Unsorted warm-up keys; no slot array yet.
    Buffering(Vec<K>),
    Packed(Packed<K>),
}

impl<K: Clone> Clone for State<K> {
    fn clone(&self) -> Self {
        match self {
            Self::Buffering(buffer) => Self::Buffering(buffer.clone()),
            Self::Packed(packed) => Self::Packed(packed.clone()),
        }
    }
}

/// A sorted multiset of keys stored in a Packed Memory Array.
///
/// - The first `warm_up_size - 1` keys are buffered unsorted.
/// - The next insert sorts them into a slot array `bootstrap_growth` times
///   larger, leaving gaps in every chunk.
/// - Later inserts land in their chunk, redistribute the nearest ancestor
///   segment within its density threshold, or grow the whole array.
///
/// Duplicates are kept. Every operation is synchronous; `insert` needs
/// `&mut self`, so readers can never observe a partially rebalanced array.
pub struct PackedMemoryArray<K> {
    config: PmaConfig,
    state: State<K>,
    len: usize,
}

impl<K> PackedMemoryArray<K> {
    /// Empty array with the default configuration. Allocates nothing.
    pub fn new() -> Self {
        Self {
            config: PmaConfig::default(),
            state: State::Buffering(Vec::new()),
            len: 0,
        }
    }

    pub fn with_config(config: PmaConfig) -> Result<Self, PmaError> {
        config.validate()?;
        Ok(Self {
            config,
            state: State::Buffering(Vec::new()),
            len: 0,
        })
    }

    #[inline]
    pub fn config(&self) -> &PmaConfig {
        &self.config
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the warm-up phase is over and the slot array exists.
    #[inline]
    pub fn is_packed(&self) -> bool {
        matches!(self.state, State::Packed(_))
    }

    fn layout(&self) -> Option<&Layout> {
        match &self.state {
            State::Buffering(_) => None,
            State::Packed(packed) => Some(&packed.layout),
        }
    }

    /// Number of slots, occupied or not. Zero during warm-up.
    pub fn capacity(&self) -> usize {
        self.layout().map_or(0, |l| l.capacity)
    }

    /// Slots per chunk. Zero during warm-up.
    pub fn chunk_size(&self) -> usize {
        self.layout().map_or(0, |l| l.chunk_size)
    }

    /// Zero during warm-up.
    pub fn chunk_count(&self) -> usize {
        self.layout().map_or(0, |l| l.chunk_count)
    }

    /// Height of the implicit tree over chunks; the whole array is at this
    /// level. Zero during warm-up.
    pub fn level_count(&self) -> u32 {
        self.layout().map_or(0, |l| l.level_count)
    }

    /// Maximum occupancy ratio tolerated for a segment at `level` at the
    /// current capacity.
    pub fn upper_threshold_at(&self, level: u32) -> f64 {
        upper_threshold(
            level,
            self.capacity(),
            self.config.upper_density_high,
            self.config.upper_density_low,
        )
    }
}

impl<K: Ord> PackedMemoryArray<K> {
    /// Inserts `key` in sorted position.
    ///
    /// # Panics
    ///
    /// Panics if the array cannot grow any further. See [`try_insert`].
    ///
    /// [`try_insert`]: PackedMemoryArray::try_insert
    pub fn insert(&mut self, key: K) {
        if let Err(err) = self.try_insert(key) {
            panic!("{err}");
        }
    }

    /// Inserts `key` in sorted position.
    ///
    /// Fails only with [`PmaError::CapacityOverflow`] when growing the array
    /// overflows `usize` or the allocation is refused. The array is unchanged
    /// and `key` is dropped in that case.
    pub fn try_insert(&mut self, key: K) -> Result<(), PmaError> {
        self.place(key).map(|_| ())
    }

    fn place(&mut self, key: K) -> Result<Placement, PmaError> {
        let placement = match &mut self.state {
            State::Buffering(buffer) if buffer.len() + 1 < self.config.warm_up_size => {
                buffer.push(key);
                Placement::Buffered
            }
            State::Buffering(buffer) => {
                let capacity = self.config.bootstrap_capacity()?;
                let layout = Layout::for_capacity(capacity)?;
                let mut packed = Packed::allocate(layout).map_err(|_| PmaError::CapacityOverflow {
                    current: self.config.warm_up_size,
                    factor: self.config.bootstrap_growth,
                })?;

                let mut keys = std::mem::take(buffer);
                keys.push(key);
                keys.sort();
                let len = keys.len();
                packed.pack_left(keys);
                debug!(
                    capacity,
                    chunk_size = layout.chunk_size,
                    chunk_count = layout.chunk_count,
                    len,
                    "bootstrapped packed memory array"
                );

                self.state = State::Packed(packed);
                Placement::Bootstrapped { capacity }
            }
            State::Packed(packed) => packed.insert(key, &self.config)?,
        };
        self.len += 1;
        Ok(placement)
    }

    /// Keys in ascending order.
    ///
    /// During warm-up this sorts references to the buffered keys first.
    pub fn iter(&self) -> Iter<'_, K> {
        let inner = match &self.state {
            State::Buffering(buffer) => {
                let mut refs: Vec<&K> = buffer.iter().collect();
                refs.sort();
                IterInner::Buffered(refs.into_iter())
            }
            State::Packed(packed) => IterInner::Packed(packed.slots.iter().flatten()),
        };
        Iter { inner }
    }

    /// Whether the occupied slots, read left to right, are non-decreasing.
    pub fn verify_sorted(&self) -> bool {
        match &self.state {
            State::Buffering(_) => true,
            State::Packed(packed) => packed.slots.iter().flatten().is_sorted(),
        }
    }
}

impl<K: Ord + Clone> PackedMemoryArray<K> {
    /// All keys in ascending order.
    pub fn to_sorted_vec(&self) -> Vec<K> {
        self.iter().cloned().collect()
    }
}

impl<K> Default for PackedMemoryArray<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone> Clone for PackedMemoryArray<K> {
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            state: self.state.clone(),
            len: self.len,
        }
    }
}

impl<K> std::fmt::Debug for PackedMemoryArray<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackedMemoryArray")
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .field("chunk_size", &self.chunk_size())
            .field("chunk_count", &self.chunk_count())
            .field("level_count", &self.level_count())
            .finish()
    }
}

impl<K: Ord> Extend<K> for PackedMemoryArray<K> {
    fn extend<I: IntoIterator<Item = K>>(&mut self, iter: I) {
        for key in iter {
            self.insert(key);
        }
    }
}

impl<K: Ord> FromIterator<K> for PackedMemoryArray<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut pma = Self::new();
        pma.extend(iter);
        pma
    }
}

impl<'a, K: Ord> IntoIterator for &'a PackedMemoryArray<K> {
    type Item = &'a K;
    type IntoIter = Iter<'a, K>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the keys of a [`PackedMemoryArray`] in ascending order.
pub struct Iter<'a, K> {
    inner: IterInner<'a, K>,
}

enum IterInner<'a, K> {
    Buffered(std::vec::IntoIter<&'a K>),
    Packed(std::iter::Flatten<std::slice::Iter<'a, Option<K>>>),
}

impl<'a, K> Iterator for Iter<'a, K> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            IterInner::Buffered(it) => it.next(),
            IterInner::Packed(it) => it.next(),
        }
    }
}


#[cfg(test)]
mod proptests;
