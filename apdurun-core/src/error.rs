//! Protocol errors.
//!
//! All errors are terminal. The chained IV has no safe resumption point, so
//! when an error occurs the run must stop.

use thiserror::Error;

/// All possible protocol errors.
///
/// No variant is "recoverable" or "retryable".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Script line is not valid hexadecimal (odd length or bad character).
    #[error("malformed input: line is not valid hex")]
    MalformedInput,

    /// Decrypted response carries no 0x80 padding marker.
    #[error("padding marker not found in decrypted response")]
    PaddingNotFound,

    /// Ciphertext is not a whole number of cipher blocks.
    #[error("ciphertext length {0} is not a multiple of the block size")]
    CiphertextLength(usize),

    /// Encrypted payload does not fit in the single LC byte.
    #[error("encrypted payload of {0} bytes does not fit in an APDU")]
    PayloadTooLarge(usize),

    /// Root private key is not 32 bytes of valid hex for the curve.
    #[error("invalid root private key")]
    InvalidRootKey,
}
