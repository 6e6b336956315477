//! SCP secure channel.
//!
//! AES-128 in CBC mode with the chaining value carried across calls:
//!
//! - `encrypt` pads with `0x80 00..00` to the block size and leaves the last
//!   ciphertext block as the next IV
//! - `decrypt` strips everything from the last `0x80` onward and leaves the
//!   last block of the *input* ciphertext as the next IV
//!
//! Both ends therefore evolve the same IV as long as every exchange is seen in
//! order. A lost or replayed exchange desynchronizes the channel for good.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use zeroize::Zeroizing;

use crate::error::ProtocolError;

/// Cipher block size.
pub const BLOCK_SIZE: usize = 16;

/// Session key size (AES-128).
pub const KEY_SIZE: usize = 16;

/// First byte of the padding.
pub const PADDING_MARKER: u8 = 0x80;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// Symmetric key shared with the device. Zeroized on drop.
#[derive(Clone)]
pub struct SessionKey(Zeroizing<[u8; KEY_SIZE]>);

impl SessionKey {
    /// Wrap raw key bytes.
    pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Take the first [`KEY_SIZE`] bytes of a longer secret.
    ///
    /// Returns `None` if the secret is too short.
    pub fn from_prefix(secret: &[u8]) -> Option<Self> {
        let prefix = secret.get(..KEY_SIZE)?;
        let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
        bytes.copy_from_slice(prefix);
        Some(Self(bytes))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Secure channel state for one run.
///
/// The key never changes. The IV moves after every encrypt and every
/// non-empty decrypt. Does not implement `Clone`: two copies would fork the
/// chain.
pub struct SecureChannel {
    key: SessionKey,
    iv: [u8; BLOCK_SIZE],
}

impl SecureChannel {
    /// Open a channel with a zero IV.
    pub fn new(key: SessionKey) -> Self {
        Self {
            key,
            iv: [0u8; BLOCK_SIZE],
        }
    }

    /// Current chaining value.
    pub fn iv(&self) -> &[u8; BLOCK_SIZE] {
        &self.iv
    }

    /// Encrypt an outbound payload.
    ///
    /// The result is always a non-empty multiple of [`BLOCK_SIZE`], even for
    /// an empty payload.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Vec<u8> {
        let mut buf = pad(plaintext);

        let mut cipher = Aes128CbcEnc::new(self.key.as_bytes().into(), (&self.iv).into());
        for block in buf.chunks_exact_mut(BLOCK_SIZE) {
            cipher.encrypt_block_mut(GenericArray::from_mut_slice(block));
        }

        self.iv.copy_from_slice(&buf[buf.len() - BLOCK_SIZE..]);
        buf
    }

    /// Decrypt an inbound response.
    ///
    /// An empty response is returned as is and does not move the IV.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::CiphertextLength`] if the response is not block aligned
    /// - [`ProtocolError::PaddingNotFound`] if no `0x80` marker is present
    ///
    /// The IV is left untouched on error.
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        if ciphertext.is_empty() {
            return Ok(Vec::new());
        }
        if ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(ProtocolError::CiphertextLength(ciphertext.len()));
        }

        let mut buf = ciphertext.to_vec();
        let mut cipher = Aes128CbcDec::new(self.key.as_bytes().into(), (&self.iv).into());
        for block in buf.chunks_exact_mut(BLOCK_SIZE) {
            cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
        }

        let marker = unpad_position(&buf).ok_or(ProtocolError::PaddingNotFound)?;
        buf.truncate(marker);

        self.iv
            .copy_from_slice(&ciphertext[ciphertext.len() - BLOCK_SIZE..]);
        Ok(buf)
    }
}

/// Ciphertext length [`SecureChannel::encrypt`] produces for `len` bytes.
pub fn encrypted_len(len: usize) -> usize {
    (len / BLOCK_SIZE + 1) * BLOCK_SIZE
}

/// Append the marker and zero-fill to the next block boundary.
fn pad(data: &[u8]) -> Vec<u8> {
    let padded_len = encrypted_len(data.len());
    let mut buf = Vec::with_capacity(padded_len);
    buf.extend_from_slice(data);
    buf.push(PADDING_MARKER);
    buf.resize(padded_len, 0x00);
    buf
}

/// Index of the last marker byte.
///
/// Scans from the end for the last `0x80`, so a payload whose own trailing
/// bytes look like padding is cut there. The device relies on exactly this
/// behaviour.
fn unpad_position(data: &[u8]) -> Option<usize> {
    data.iter().rposition(|&b| b == PADDING_MARKER)
}
