//! Exchange orchestration.
//!
//! The main public interface for sending script frames to the device.
//!
//! # Invariants
//!
//! - `SecureSession` does not implement `Clone`
//! - The channel IV advances once per encrypt and once per decrypt, one pair
//!   per exchange, and is never rolled back
//! - A failed exchange leaves the session unusable; the caller must stop

use apdurun_core::frame::{CommandFrame, HEADER_LENGTH, LC_OFFSET};
use apdurun_core::scp::encrypted_len;
use apdurun_core::{ProtocolError, RootKey, SecureChannel};

use crate::deployed::SecretDeriver;
use crate::device::Transport;
use crate::error::TransportError;

/// A device session, with or without the secure channel.
pub struct SecureSession<T> {
    transport: T,
    channel: Option<SecureChannel>,
}

// Explicitly NOT implementing Clone

impl<T: Transport> SecureSession<T> {
    /// Session that relays frames unchanged.
    pub fn plain(transport: T) -> Self {
        Self {
            transport,
            channel: None,
        }
    }

    /// Run the key exchange and open the secure channel.
    ///
    /// The channel starts with a zero IV.
    pub fn establish<D: SecretDeriver>(
        mut transport: T,
        deriver: &mut D,
        root: &RootKey,
        target_id: u32,
    ) -> Result<Self, TransportError> {
        let key = deriver.derive_secret(&mut transport, root, target_id)?;
        tracing::info!("secure channel established");
        Ok(Self {
            transport,
            channel: Some(SecureChannel::new(key)),
        })
    }

    /// Whether frames are wrapped in the secure channel.
    pub fn is_secure(&self) -> bool {
        self.channel.is_some()
    }

    /// Send one frame.
    ///
    /// Without the channel the frame goes out unchanged and the response is
    /// dropped (`None`). With the channel, DATA is encrypted, LC is rewritten
    /// to the ciphertext length, and the decrypted response is returned.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::PayloadTooLarge`] if the encrypted DATA would not
    ///   fit in LC. Nothing is sent and the IV does not move.
    /// - [`ProtocolError::PaddingNotFound`] or
    ///   [`ProtocolError::CiphertextLength`] if the response does not decrypt.
    ///   The command has already advanced the IV, so the channel is out of
    ///   step with the device and the session must not be reused.
    ///
    /// Transport errors are surfaced unchanged.
    pub fn exchange(&mut self, frame: &CommandFrame) -> Result<Option<Vec<u8>>, TransportError> {
        let channel = match &mut self.channel {
            Some(channel) => channel,
            None => {
                self.transport.exchange(frame.as_bytes())?;
                return Ok(None);
            }
        };

        let wire = wrap(channel, frame)?;
        let response = self.transport.exchange(&wire)?;
        let clear = channel.decrypt(&response)?;
        Ok(Some(clear))
    }

    /// Give the transport back.
    pub fn into_transport(self) -> T {
        self.transport
    }
}

/// Build the outbound frame for the secure channel.
///
/// Header-only frames go out as the bare 5-byte header.
fn wrap(channel: &mut SecureChannel, frame: &CommandFrame) -> Result<Vec<u8>, ProtocolError> {
    if !frame.has_data() {
        return Ok(frame.header().to_vec());
    }

    // Checked before encrypting so a rejected frame leaves the IV alone.
    let expected = encrypted_len(frame.data().len());
    let lc = u8::try_from(expected).map_err(|_| ProtocolError::PayloadTooLarge(expected))?;
    let encrypted = channel.encrypt(frame.data());

    let mut wire = Vec::with_capacity(HEADER_LENGTH + encrypted.len());
    wire.extend_from_slice(&frame.header()[..LC_OFFSET]);
    wire.push(lc);
    wire.extend_from_slice(&encrypted);
    Ok(wire)
}
