use thiserror::Error;

/// The Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum encapsulating all the possible errors from this library.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Indicates that a PRNG was asked to rewind its clock.
    #[error("prng clock cannot rewind: currently at {current}, requested {requested}")]
    BackwardsClock {
        /// The current clock value.
        current: u64,
        /// The requested clock value.
        requested: u64,
    },

    /// Indicates that a ciphertext, key or share is not at the level an
    /// operation expects.
    #[error("level mismatch: expected {expected}, found {found}")]
    LevelMismatch {
        /// The level the operation expects.
        expected: usize,
        /// The level found.
        found: usize,
    },

    /// Indicates that a polynomial is not in the representation an
    /// operation expects.
    #[error("domain mismatch: {0}")]
    DomainMismatch(String),

    /// Indicates that share or parameter vectors disagree in length or
    /// basis.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Indicates that a protocol round artifact was produced or consumed
    /// out of order.
    #[error("aggregation order violated: {0}")]
    AggregationOrder(String),

    /// Indicates that a masked transform lies outside the supported
    /// (additive) class.
    #[error("unsupported transform: {0}")]
    UnsupportedTransform(String),

    /// Indicates that ring or scheme parameters failed a construction
    /// precondition.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Indicates that an error from the underlying mathematical library
    /// was encountered.
    #[error("{0}")]
    MathError(#[from] fhe_math::Error),
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn error_strings() {
        assert_eq!(
            Error::BackwardsClock {
                current: 4,
                requested: 2
            }
            .to_string(),
            "prng clock cannot rewind: currently at 4, requested 2"
        );
        assert_eq!(
            Error::LevelMismatch {
                expected: 0,
                found: 1
            }
            .to_string(),
            "level mismatch: expected 0, found 1"
        );
        assert_eq!(
            Error::ShapeMismatch("test".to_string()).to_string(),
            "shape mismatch: test"
        );
    }
}
