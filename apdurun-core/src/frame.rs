//! Command frame codec.
//!
//! Script line format: one hex-encoded command APDU per line.
//!
//! Frame format:
//! ```text
//! +-----+-----+----+----+----+-----------------+
//! | CLA | INS | P1 | P2 | LC | DATA (LC bytes) |
//! +-----+-----+----+----+----+-----------------+
//! ```

use crate::error::ProtocolError;

/// Length of the `CLA INS P1 P2 LC` header.
pub const HEADER_LENGTH: usize = 5;

/// Offset of the LC byte inside the header.
pub const LC_OFFSET: usize = 4;

/// Largest payload a single LC byte can announce.
pub const MAX_DATA_LENGTH: usize = u8::MAX as usize;

/// A decoded command APDU.
///
/// Always at least [`HEADER_LENGTH`] bytes long. DATA content is opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    bytes: Vec<u8>,
}

impl CommandFrame {
    /// Parse one script line.
    ///
    /// Trailing `\r` and `\n` are stripped before decoding. Lines that decode
    /// to fewer than five bytes return `Ok(None)` and are meant to be skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedInput`] if the line has an odd number
    /// of digits or a non-hex character.
    pub fn parse_line(line: &str) -> Result<Option<Self>, ProtocolError> {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        let bytes = hex::decode(trimmed).map_err(|_| ProtocolError::MalformedInput)?;
        Ok(Self::from_bytes(bytes))
    }

    /// Wrap raw bytes, or `None` if they are shorter than a header.
    pub fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        if bytes.len() < HEADER_LENGTH {
            return None;
        }
        Some(Self { bytes })
    }

    /// Build a frame from a header and payload, with LC set to the payload length.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::PayloadTooLarge`] when the payload does not fit
    /// in the LC byte.
    pub fn with_data(cla: u8, ins: u8, p1: u8, p2: u8, data: &[u8]) -> Result<Self, ProtocolError> {
        let lc = u8::try_from(data.len()).map_err(|_| ProtocolError::PayloadTooLarge(data.len()))?;
        let mut bytes = Vec::with_capacity(HEADER_LENGTH + data.len());
        bytes.extend_from_slice(&[cla, ins, p1, p2, lc]);
        bytes.extend_from_slice(data);
        Ok(Self { bytes })
    }

    /// Class byte.
    pub fn cla(&self) -> u8 {
        self.bytes[0]
    }

    /// Instruction byte.
    pub fn ins(&self) -> u8 {
        self.bytes[1]
    }

    /// First parameter byte.
    pub fn p1(&self) -> u8 {
        self.bytes[2]
    }

    /// Second parameter byte.
    pub fn p2(&self) -> u8 {
        self.bytes[3]
    }

    /// Declared payload length.
    pub fn lc(&self) -> u8 {
        self.bytes[LC_OFFSET]
    }

    /// The five header bytes, LC included.
    pub fn header(&self) -> &[u8] {
        &self.bytes[..HEADER_LENGTH]
    }

    /// DATA as declared by LC.
    ///
    /// Clamped to the bytes actually present when the line is shorter than
    /// LC announces. Bytes past `5 + LC` are not part of DATA.
    pub fn data(&self) -> &[u8] {
        let end = (HEADER_LENGTH + self.lc() as usize).min(self.bytes.len());
        &self.bytes[HEADER_LENGTH..end]
    }

    /// True when LC is non-zero and payload bytes follow the header.
    pub fn has_data(&self) -> bool {
        self.lc() > 0 && self.bytes.len() > HEADER_LENGTH
    }

    /// The raw frame as read from the script.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the frame and return its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
