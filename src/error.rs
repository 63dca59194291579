//! Construction-time error type for the Flux Cell library.
//!
//! This is distinct from [`crate::result::OpResult`]: `FluxCellError` covers
//! failures that happen once, at setup time (bad arena capacity, mmap
//! failure), while `OpResult` is the closed, `Copy` status code every
//! container operation returns on the hot path.

use thiserror::Error;

/// Result type alias for fallible construction in this crate.
pub type Result<T> = std::result::Result<T, FluxCellError>;

/// Errors raised while building an [`crate::arena::Arena`] or a container
/// head record. Never returned from `insert`/`pop`/`search`/`delete`/`verify`.
#[derive(Error, Debug)]
pub enum FluxCellError {
    /// Arena capacity was not a positive, 8-byte-alignable size.
    #[error("invalid arena capacity: {message}")]
    InvalidCapacity {
        /// Reason the capacity was rejected.
        message: String,
    },

    /// A container's capacity parameter (Vyukov MPMC) was not a power of two.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Reason the configuration was rejected.
        message: String,
    },

    /// The arena has no room left for a head record at construction time.
    #[error("arena exhausted while installing a container head")]
    ArenaExhausted,

    /// `mmap`/`mlock` failed while creating a memory-mapped arena.
    #[error("memory mapping error: {0}")]
    Mmap(#[from] std::io::Error),
}

impl FluxCellError {
    /// Create a new invalid-capacity error.
    pub fn capacity(message: impl Into<String>) -> Self {
        Self::InvalidCapacity {
            message: message.into(),
        }
    }

    /// Create a new invalid-configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_as_expected_variant() {
        let err = FluxCellError::capacity("must be positive");
        assert!(matches!(err, FluxCellError::InvalidCapacity { .. }));

        let err = FluxCellError::config("capacity must be power of two");
        assert!(matches!(err, FluxCellError::InvalidConfig { .. }));
    }
}
