use thiserror::Error;

use crate::mbfv::Phase;

/// The Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum encapsulating all the possible errors from this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Indicates that an error from the underlying mathematical library was
    /// encountered.
    #[error("{0}")]
    MathError(fhe_math::Error),

    /// Indicates a serialization error.
    #[error("Serialization error")]
    SerializationError,

    /// Indicates that too many values were provided.
    #[error("Too many values provided: {0} exceeds limit {1}")]
    TooManyValues(usize, usize),

    /// Indicates that too few values were provided.
    #[error("Too few values provided: {0} is below limit {1}")]
    TooFewValues(usize, usize),

    /// Indicates that an input is invalid.
    #[error("{0}")]
    UnspecifiedInput(String),

    /// Indicates a parameter error.
    #[error("{0}")]
    ParametersError(ParametersError),

    /// Two objects were built for different BFV parameters.
    #[error("Incompatible BFV parameters")]
    ParametersMismatch,

    /// An object lives at a different modulus level than expected.
    #[error("Level mismatch: expected level {expected}, found level {found}")]
    LevelMismatch {
        /// Level of the protocol instance or of the first operand.
        expected: usize,
        /// Level of the offending object.
        found: usize,
    },

    /// Key-switching shares disagree on their decomposition.
    #[error("Decomposition mismatch: expected {expected}, found {found}")]
    DecompositionMismatch {
        /// Expected number of digits, or Galois element.
        expected: usize,
        /// Value carried by the offending share.
        found: usize,
    },

    /// A share does not have the shape expected by the protocol.
    #[error("Malformed share: {0}")]
    MalformedShare(String),

    /// A noise distribution is too weak, or too strong to decrypt correctly.
    #[error("Security parameter error: {0}")]
    SecurityParameter(String),

    /// An operation was attempted in a protocol phase that does not allow it.
    #[error("Operation `{operation}` is not allowed in phase {phase}")]
    InvalidPhase {
        /// Name of the rejected operation.
        operation: &'static str,
        /// Phase of the protocol instance.
        phase: Phase,
    },

    /// `finalize` was called on a share missing contributions.
    #[error("Incomplete aggregation: {found} of {expected} contributions")]
    IncompleteAggregation {
        /// Number of contributions folded into the share.
        found: usize,
        /// Number of parties of the protocol instance.
        expected: usize,
    },

    /// Default error
    #[error("{0}")]
    DefaultError(String),
}

impl From<fhe_math::Error> for Error {
    fn from(e: fhe_math::Error) -> Self {
        Error::MathError(e)
    }
}

/// Separate enum to indicate parameters-related errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParametersError {
    /// Indicates that the degree is invalid.
    #[error("Invalid degree: {0} is not a power of 2 larger than 8")]
    InvalidDegree(usize),

    /// Indicates that the moduli sizes are invalid.
    #[error("Invalid modulus size: {0}, expected an integer between {1} and {2}")]
    InvalidModulusSize(usize, usize, usize),

    /// Indicates that there exists not enough primes of this size.
    #[error("Not enough primes of size {0} for polynomials of degree {1}")]
    NotEnoughPrimes(usize, usize),

    /// Indicates that the plaintext is invalid.
    #[error("{0}")]
    InvalidPlaintext(String),

    /// Indicates that the error variance is invalid.
    #[error("Invalid variance: {0}, expected an integer between {1} and {2}")]
    InvalidVariance(usize, usize, usize),

    /// Indicates that too many parameters were specified.
    #[error("{0}")]
    TooManySpecified(String),

    /// Indicates that too few parameters were specified.
    #[error("{0}")]
    TooFewSpecified(String),
}
