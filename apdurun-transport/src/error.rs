//! Transport errors.

use thiserror::Error;

/// Errors that can occur while talking to the device.
///
/// All of them end the run. Nothing is retried: repeating an encrypted
/// exchange with an IV that has already moved would not reproduce the request.
#[derive(Debug, Error)]
pub enum TransportError {
    // --- Connection & Setup ---
    /// Could not reach the device proxy.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// Key exchange with the device failed.
    #[error("secure channel handshake failed: {0}")]
    Handshake(String),
    /// Target does not use a 16-byte channel secret.
    #[error("unsupported target id 0x{0:08x}")]
    UnsupportedTarget(u32),

    // --- Protocol Violations ---
    /// Protocol-level error from apdurun-core.
    #[error("protocol error: {0}")]
    Protocol(#[from] apdurun_core::ProtocolError),
    /// Device answered with a status word other than 0x9000.
    #[error("invalid status {sw:04x}")]
    Status {
        /// Status word.
        sw: u16,
        /// Response data preceding the status word.
        data: Vec<u8>,
    },
    /// Device response is shorter than the exchange requires.
    #[error("response too short: expected {expected} bytes, got {actual}")]
    ResponseTooShort {
        /// Minimum length.
        expected: usize,
        /// Received length.
        actual: usize,
    },
    /// Proxy announced a response longer than any device can produce.
    #[error("response too large: {actual} bytes announced, at most {max} accepted")]
    ResponseTooLarge {
        /// Largest accepted length.
        max: usize,
        /// Announced length.
        actual: usize,
    },

    // --- Lifecycle & Transport ---
    /// Socket or input stream error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
