//! Deployed secret key exchange.
//!
//! Derives the SCP session key with the device over secp256k1:
//!
//! 1. IDENTIFY the target
//! 2. swap 8-byte nonces
//! 3. present the root (signer) certificate
//! 4. present a fresh ephemeral certificate signed by the root key
//! 5. walk the device certificate chain down to its ephemeral key
//! 6. COMMIT and run ECDH between the two ephemeral keys
//!
//! The session key is the first 16 bytes of SHA-256 over the compressed
//! shared point.

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{AffinePoint, ProjectivePoint, PublicKey, SecretKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use apdurun_core::frame::CommandFrame;
use apdurun_core::{ProtocolError, RootKey, SessionKey};

use crate::device::Transport;
use crate::error::TransportError;

/// Command bytes of the exchange.
mod ins {
    pub const CLA: u8 = 0xE0;
    pub const IDENTIFY: u8 = 0x04;
    pub const VALIDATE_TARGET_NONCE: u8 = 0x50;
    pub const VALIDATE_CERTIFICATE: u8 = 0x51;
    pub const GET_CERTIFICATE: u8 = 0x52;
    pub const COMMIT: u8 = 0x53;

    /// P1 marking the last certificate of a chain.
    pub const P1_LAST: u8 = 0x80;
}

/// Role bytes prefixed to every signed blob.
mod role {
    pub const SIGNER: u8 = 0x01;
    pub const DEVICE: u8 = 0x02;
    pub const HOST_EPHEMERAL: u8 = 0x11;
    pub const DEVICE_EPHEMERAL: u8 = 0x12;
}

/// Nonce size on both sides.
pub const NONCE_SIZE: usize = 8;

/// Batch signer serial preceding the device nonce.
const SERIAL_SIZE: usize = 4;

/// Targets whose low nibble is this value use a 16-byte channel secret.
const SCP_V2_TARGET_NIBBLE: u32 = 0x2;

/// Derives the secure channel key with the device.
pub trait SecretDeriver {
    /// Run the exchange over `transport` and return the session key.
    fn derive_secret<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        root: &RootKey,
        target_id: u32,
    ) -> Result<SessionKey, TransportError>;
}

/// The deployed-secret exchange described in the module docs.
#[derive(Debug, Default, Clone)]
pub struct DeployedSecret {
    issuer: Option<VerifyingKey>,
}

impl DeployedSecret {
    /// Exchange without checking the device certificate's issuer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also verify the device certificate against `issuer`.
    pub fn with_issuer_key(mut self, issuer: &PublicKey) -> Self {
        self.issuer = Some(VerifyingKey::from(issuer));
        self
    }
}

impl SecretDeriver for DeployedSecret {
    fn derive_secret<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        root: &RootKey,
        target_id: u32,
    ) -> Result<SessionKey, TransportError> {
        if target_id & 0xF != SCP_V2_TARGET_NIBBLE {
            return Err(TransportError::UnsupportedTarget(target_id));
        }

        let signer = SigningKey::from(root.secret_key());
        let root_public = root.public_key_bytes();

        // Identify
        send(transport, ins::IDENTIFY, 0x00, &target_id.to_be_bytes())?;

        // Nonces
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);
        let auth_info = send(transport, ins::VALIDATE_TARGET_NONCE, 0x00, &nonce)?;
        if auth_info.len() < SERIAL_SIZE + NONCE_SIZE {
            return Err(TransportError::ResponseTooShort {
                expected: SERIAL_SIZE + NONCE_SIZE,
                actual: auth_info.len(),
            });
        }
        let device_nonce = &auth_info[SERIAL_SIZE..SERIAL_SIZE + NONCE_SIZE];

        // Signer certificate
        let signed = [&[role::SIGNER][..], &root_public[..]].concat();
        let signature: Signature = signer.sign(&signed);
        let certificate = encode_certificate(&root_public, &signature)?;
        send(transport, ins::VALIDATE_CERTIFICATE, 0x00, &certificate)?;

        // Ephemeral certificate
        let ephemeral = SecretKey::random(&mut OsRng);
        let ephemeral_public = ephemeral.public_key().to_encoded_point(false);
        let signed = [
            &[role::HOST_EPHEMERAL][..],
            &nonce[..],
            device_nonce,
            ephemeral_public.as_bytes(),
        ]
        .concat();
        let signature: Signature = signer.sign(&signed);
        let certificate = encode_certificate(ephemeral_public.as_bytes(), &signature)?;
        send(transport, ins::VALIDATE_CERTIFICATE, ins::P1_LAST, &certificate)?;

        // Device certificate, then device ephemeral certificate
        let device = DeviceCertificate::parse(&send(transport, ins::GET_CERTIFICATE, 0x00, &[])?)?;
        if let Some(issuer) = &self.issuer {
            let signed = [&[role::DEVICE][..], &device.header[..], &device.public_key[..]].concat();
            device.verify(issuer, &signed, "device certificate")?;
        }
        let device_key = device.verifying_key()?;

        let device_ephemeral =
            DeviceCertificate::parse(&send(transport, ins::GET_CERTIFICATE, ins::P1_LAST, &[])?)?;
        let signed = [
            &[role::DEVICE_EPHEMERAL][..],
            device_nonce,
            &nonce[..],
            &device_ephemeral.public_key[..],
        ]
        .concat();
        device_ephemeral.verify(&device_key, &signed, "device ephemeral certificate")?;
        let device_ephemeral_key = device_ephemeral.public()?;

        // Commit
        send(transport, ins::COMMIT, 0x00, &[])?;

        let secret = ecdh_secret(&ephemeral, &device_ephemeral_key);
        tracing::info!(target_id = %format!("0x{:08x}", target_id), "secure channel key derived");

        SessionKey::from_prefix(&secret[..])
            .ok_or_else(|| TransportError::Handshake("short shared secret".into()))
    }
}

/// SHA-256 of the compressed shared point, the way libsecp256k1 hashes ECDH.
pub fn ecdh_secret(secret: &SecretKey, peer: &PublicKey) -> Zeroizing<[u8; 32]> {
    let shared = AffinePoint::from(ProjectivePoint::from(*peer.as_affine()) * *secret.to_nonzero_scalar());
    let encoded = shared.to_encoded_point(true);
    let mut out = Zeroizing::new([0u8; 32]);
    out.copy_from_slice(&Sha256::digest(encoded.as_bytes()));
    out
}

/// `[len][public key][len][DER signature]`
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLarge`] if a field does not fit its
/// length byte.
pub fn encode_certificate(
    public_key: &[u8],
    signature: &Signature,
) -> Result<Vec<u8>, ProtocolError> {
    let der = signature.to_der();
    let der = der.as_bytes();
    let mut out = Vec::with_capacity(2 + public_key.len() + der.len());
    push_field(&mut out, public_key)?;
    push_field(&mut out, der)?;
    Ok(out)
}

/// Append a one-byte length prefix and the field.
fn push_field(out: &mut Vec<u8>, field: &[u8]) -> Result<(), ProtocolError> {
    let len = u8::try_from(field.len()).map_err(|_| ProtocolError::PayloadTooLarge(field.len()))?;
    out.push(len);
    out.extend_from_slice(field);
    Ok(())
}

fn send<T: Transport + ?Sized>(
    transport: &mut T,
    instruction: u8,
    p1: u8,
    data: &[u8],
) -> Result<Vec<u8>, TransportError> {
    let frame = CommandFrame::with_data(ins::CLA, instruction, p1, 0x00, data)?;
    transport.exchange(frame.as_bytes())
}

/// A certificate returned by the device: `[len][header][len][pub][len][sig]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCertificate {
    /// Role header (empty for ephemeral certificates).
    pub header: Vec<u8>,
    /// SEC1 public key.
    pub public_key: Vec<u8>,
    /// DER ECDSA signature.
    pub signature: Vec<u8>,
}

impl DeviceCertificate {
    /// Split a certificate into its three length-prefixed fields.
    pub fn parse(bytes: &[u8]) -> Result<Self, TransportError> {
        if bytes.is_empty() {
            return Err(TransportError::Handshake("device returned no certificate".into()));
        }
        let mut rest = bytes;
        let header = take_field(&mut rest)?;
        let public_key = take_field(&mut rest)?;
        let signature = take_field(&mut rest)?;
        Ok(Self {
            header,
            public_key,
            signature,
        })
    }

    /// Encode back into the wire layout.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::PayloadTooLarge`] if a field is longer than
    /// 255 bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut out = Vec::new();
        for field in [&self.header, &self.public_key, &self.signature] {
            push_field(&mut out, field)?;
        }
        Ok(out)
    }

    fn public(&self) -> Result<PublicKey, TransportError> {
        PublicKey::from_sec1_bytes(&self.public_key)
            .map_err(|_| TransportError::Handshake("invalid device public key".into()))
    }

    fn verifying_key(&self) -> Result<VerifyingKey, TransportError> {
        Ok(VerifyingKey::from(self.public()?))
    }

    fn verify(&self, key: &VerifyingKey, signed: &[u8], what: &str) -> Result<(), TransportError> {
        let signature = Signature::from_der(&self.signature)
            .map_err(|_| TransportError::Handshake(format!("malformed {} signature", what)))?;
        key.verify(signed, &signature)
            .map_err(|_| TransportError::Handshake(format!("{} signature mismatch", what)))
    }
}

fn take_field(rest: &mut &[u8]) -> Result<Vec<u8>, TransportError> {
    let (&len, tail) = rest
        .split_first()
        .ok_or_else(|| TransportError::Handshake("truncated device certificate".into()))?;
    let len = len as usize;
    if tail.len() < len {
        return Err(TransportError::Handshake("truncated device certificate".into()));
    }
    let (field, tail) = tail.split_at(len);
    *rest = tail;
    Ok(field.to_vec())
}
