//! Root signing key for secure channel establishment.
//!
//! The root key signs the host certificates presented to the device during
//! the key exchange. When none is supplied a random one is generated, and its
//! public half must be shown to the operator so it can be recorded.

use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};
use rand::rngs::OsRng;

use crate::error::ProtocolError;

/// Size of a serialized private key.
pub const PRIVATE_KEY_SIZE: usize = 32;

/// Size of an uncompressed SEC1 public key.
pub const PUBLIC_KEY_SIZE: usize = 65;

/// Where a root key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKeyOrigin {
    /// Provided by the caller.
    Supplied,
    /// Generated at random for this run.
    Generated,
}

/// secp256k1 root private key.
///
/// The scalar is zeroized on drop by `k256`.
pub struct RootKey {
    secret: SecretKey,
    origin: RootKeyOrigin,
}

impl RootKey {
    /// Use the supplied hex key, or generate a random one when absent.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidRootKey`] if the supplied key does not
    /// decode to a valid 32-byte scalar.
    pub fn resolve(supplied: Option<&str>) -> Result<Self, ProtocolError> {
        match supplied {
            Some(hex_key) => Self::from_hex(hex_key),
            None => Ok(Self::generate()),
        }
    }

    /// Parse a hex-encoded private key.
    pub fn from_hex(hex_key: &str) -> Result<Self, ProtocolError> {
        let bytes = zeroize::Zeroizing::new(
            hex::decode(hex_key.trim()).map_err(|_| ProtocolError::InvalidRootKey)?,
        );
        if bytes.len() != PRIVATE_KEY_SIZE {
            return Err(ProtocolError::InvalidRootKey);
        }
        let secret = SecretKey::from_slice(&bytes).map_err(|_| ProtocolError::InvalidRootKey)?;
        Ok(Self {
            secret,
            origin: RootKeyOrigin::Supplied,
        })
    }

    /// Generate a random key from the OS CSPRNG.
    pub fn generate() -> Self {
        Self {
            secret: SecretKey::random(&mut OsRng),
            origin: RootKeyOrigin::Generated,
        }
    }

    /// Whether the key was supplied or generated.
    pub fn origin(&self) -> RootKeyOrigin {
        self.origin
    }

    /// The secret scalar.
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    /// The public key.
    pub fn public_key(&self) -> PublicKey {
        self.secret.public_key()
    }

    /// Uncompressed SEC1 encoding of the public key (65 bytes, `04 || X || Y`).
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public_key().to_encoded_point(false).as_bytes().to_vec()
    }

    /// Hex of [`Self::public_key_bytes`].
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }
}

impl std::fmt::Debug for RootKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootKey")
            .field("public", &self.public_key_hex())
            .field("origin", &self.origin)
            .finish()
    }
}
