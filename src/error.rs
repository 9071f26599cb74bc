use thiserror::Error;

/// Errors surfaced by [`PackedMemoryArray`](crate::PackedMemoryArray).
///
/// Insertion of a key never fails for ordering reasons. The only failures are
/// rejected tunables and growth past what the platform can address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PmaError {
    /// A configuration value, or a capacity handed to the layout step, was
    /// rejected.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    /// Growing `current` slots by `factor` overflows `usize` or cannot be
    /// allocated.
    #[error("capacity overflow: cannot grow {current} slots by a factor of {factor}")]
    CapacityOverflow { current: usize, factor: usize },
}

impl PmaError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }
}
