//! Tunables for the warm-up phase, growth and density bounds.
//!
//! # Example
//!
//! ```rust
//! use pma_rs::{PackedMemoryArray, PmaConfig};
//!
//! let config = PmaConfig::default().with_warm_up_size(16);
//! let mut pma: PackedMemoryArray<u32> = PackedMemoryArray::with_config(config).unwrap();
//! for k in (0..100).rev() {
//!     pma.insert(k);
//! }
//! assert_eq!(pma.len(), 100);
//! assert!(pma.iter().copied().eq(0..100));
//! ```

use crate::error::PmaError;
use crate::layout::Layout;

pub const DEFAULT_WARM_UP_SIZE: usize = 64;
pub const DEFAULT_BOOTSTRAP_GROWTH: usize = 4;
pub const DEFAULT_RESIZE_GROWTH: usize = 2;
pub const DEFAULT_UPPER_DENSITY_HIGH: f64 = 1.0;
pub const DEFAULT_UPPER_DENSITY_LOW: f64 = 0.5;

/// Widest spacing, in slots per key, that a redistribution may produce.
///
/// Chunks are never smaller than this once the array holds at least 4 slots,
/// so a spread at most this wide cannot leave a whole chunk empty. The chunk
/// locator relies on every chunk holding a key.
const MAX_SPREAD: f64 = 4.0;

/// Configuration for a [`PackedMemoryArray`](crate::PackedMemoryArray).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PmaConfig {
    /// Number of inserts buffered before the slot array exists. The insert
    /// that reaches this count allocates and packs the array.
    pub warm_up_size: usize,
    /// Initial capacity is `warm_up_size * bootstrap_growth`.
    pub bootstrap_growth: usize,
    /// Capacity multiplier applied when the whole array is too dense.
    pub resize_growth: usize,
    /// Density allowed at a single chunk.
    pub upper_density_high: f64,
    /// Density the thresholds interpolate towards at the root.
    pub upper_density_low: f64,
}

impl Default for PmaConfig {
    fn default() -> Self {
        Self {
            warm_up_size: DEFAULT_WARM_UP_SIZE,
            bootstrap_growth: DEFAULT_BOOTSTRAP_GROWTH,
            resize_growth: DEFAULT_RESIZE_GROWTH,
            upper_density_high: DEFAULT_UPPER_DENSITY_HIGH,
            upper_density_low: DEFAULT_UPPER_DENSITY_LOW,
        }
    }
}

impl PmaConfig {
    pub fn with_warm_up_size(mut self, warm_up_size: usize) -> Self {
        self.warm_up_size = warm_up_size;
        self
    }

    pub fn with_bootstrap_growth(mut self, factor: usize) -> Self {
        self.bootstrap_growth = factor;
        self
    }

    pub fn with_resize_growth(mut self, factor: usize) -> Self {
        self.resize_growth = factor;
        self
    }

    pub fn with_density_bounds(mut self, high: f64, low: f64) -> Self {
        self.upper_density_high = high;
        self.upper_density_low = low;
        self
    }

    /// Slot count allocated by the bootstrap event.
    pub fn bootstrap_capacity(&self) -> Result<usize, PmaError> {
        self.warm_up_size
            .checked_mul(self.bootstrap_growth)
            .ok_or(PmaError::CapacityOverflow {
                current: self.warm_up_size,
                factor: self.bootstrap_growth,
            })
    }

    /// Checks that every structural invariant can be maintained with these
    /// values.
    pub fn validate(&self) -> Result<(), PmaError> {
        let high = self.upper_density_high;
        let low = self.upper_density_low;
        if !(high.is_finite() && low.is_finite()) {
            return Err(PmaError::invalid("density bounds must be finite"));
        }
        if !(0.0 < low && low <= high && high <= 1.0) {
            return Err(PmaError::invalid(format!(
                "density bounds must satisfy 0 < low <= high <= 1, got low={low} high={high}"
            )));
        }
        if self.warm_up_size == 0 {
            return Err(PmaError::invalid("warm_up_size must be at least 1"));
        }
        if !self.bootstrap_growth.is_power_of_two() {
            return Err(PmaError::invalid(format!(
                "bootstrap_growth must be a power of two, got {}",
                self.bootstrap_growth
            )));
        }
        if self.resize_growth < 2 || !self.resize_growth.is_power_of_two() {
            return Err(PmaError::invalid(format!(
                "resize_growth must be a power of two >= 2, got {}",
                self.resize_growth
            )));
        }

        // An ancestor segment is only rebalanced after its child overflowed
        // `low`, and a resize only after the root did.
        if 2.0 / low > MAX_SPREAD || self.resize_growth as f64 / low > MAX_SPREAD {
            return Err(PmaError::invalid(format!(
                "resize_growth={} with low={low} spreads keys more than {MAX_SPREAD} slots apart",
                self.resize_growth
            )));
        }

        let capacity = self
            .bootstrap_capacity()
            .map_err(|_| PmaError::invalid("warm_up_size * bootstrap_growth overflows"))?;
        if capacity < MAX_SPREAD as usize {
            return Err(PmaError::invalid(format!(
                "bootstrap capacity must be at least {MAX_SPREAD}, got {capacity}"
            )));
        }
        let layout = Layout::for_capacity(capacity)?;
        if self.warm_up_size < layout.chunk_count {
            return Err(PmaError::invalid(format!(
                "warm_up_size {} cannot seed all {} chunks of the bootstrap array",
                self.warm_up_size, layout.chunk_count
            )));
        }
        Ok(())
    }
}
