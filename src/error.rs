//! Error kinds of the encrypted evaluation pipeline.

use thiserror::Error;

/// The Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum encapsulating every fatal condition of the pipeline.
///
/// Numeric tolerance mismatches are not errors; they are recorded in a
/// [`ToleranceReport`](crate::verify::ToleranceReport).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// The requested security level, ring dimension or modulus chain cannot be realised.
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// A multiplication was requested on a handle that has no level left.
    #[error("Depth exhausted: ciphertext at level {level} cannot be multiplied under depth {depth}")]
    DepthExhausted {
        /// Level of the offending handle.
        level: usize,
        /// Configured multiplicative depth.
        depth: usize,
    },

    /// Tensor, kernel or vector dimensions do not line up.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// The configured depth does not cover the planned computation.
    #[error("Insufficient parameters: computation needs depth {required}, context provides {available}")]
    ParameterInsufficient {
        /// Depth of the deepest computation chain.
        required: usize,
        /// Configured multiplicative depth.
        available: usize,
    },

    /// Two handles at the same level carry scales that cannot be reconciled.
    #[error("Scale mismatch: {0} vs {1}")]
    ScaleMismatch(f64, f64),

    /// A real value cannot be encoded under the current scale.
    #[error("Cannot encode {0}: {1}")]
    Encoding(f64, String),

    /// A decrypted plaintext cannot be read back as a real value.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// A polynomial approximation is malformed.
    #[error("Invalid polynomial approximation: {0}")]
    InvalidApproximation(String),
}
