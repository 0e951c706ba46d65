//! Error types for obsv collections.

use thiserror::Error;

/// Result type for collection operations.
pub type CollectionResult<T> = Result<T, CollectionError>;

/// Errors that can occur when mutating an observable collection.
///
/// Every variant is raised before any mutation happens, so a failed call
/// leaves the structure exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    /// An argument violated a structural invariant.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the violated invariant.
        message: String,
    },

    /// A positional operation referenced an index past the end.
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// Length of the collection at the time of the call.
        len: usize,
    },
}

impl CollectionError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an index out of bounds error.
    pub fn index_out_of_bounds(index: usize, len: usize) -> Self {
        Self::IndexOutOfBounds { index, len }
    }

    /// Returns true if this is an invalid argument error.
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = CollectionError::invalid_argument("self loop");
        assert_eq!(err.to_string(), "invalid argument: self loop");

        let err = CollectionError::index_out_of_bounds(4, 2);
        assert_eq!(err.to_string(), "index 4 out of bounds for length 2");
    }

    #[test]
    fn classification() {
        assert!(CollectionError::invalid_argument("x").is_invalid_argument());
        assert!(!CollectionError::index_out_of_bounds(0, 0).is_invalid_argument());
    }
}
