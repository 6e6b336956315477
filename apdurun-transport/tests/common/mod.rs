use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};
use rand::rngs::OsRng;

use apdurun_core::{SecureChannel, SessionKey};
use apdurun_transport::deployed::{ecdh_secret, DeviceCertificate};
use apdurun_transport::{Transport, TransportError};

pub const SW_WRONG_DATA: u16 = 0x6A80;

/// INS the simulated device answers with an empty response.
#[allow(dead_code)]
pub const INS_SILENT: u8 = 0xEE;

/// Software stand-in for a device: runs the device half of the key exchange,
/// then decrypts commands and answers with encrypted echoes.
///
/// Secure replies are `[INS, len(data)] || data`.
pub struct SimulatedDevice {
    issuer: SecretKey,
    device_key: SecretKey,
    device_ephemeral: SecretKey,
    device_nonce: [u8; 8],
    host_nonce: Vec<u8>,
    signer: Option<(VerifyingKey, Vec<u8>)>,
    host_ephemeral: Option<PublicKey>,
    channel: Option<SecureChannel>,
    pub target_id: Option<u32>,
    /// Raw APDUs as they arrived.
    pub wire: Vec<Vec<u8>>,
    /// Decrypted DATA of each secure command.
    pub received: Vec<Vec<u8>>,
    /// Sign the device ephemeral certificate with the wrong key.
    pub forge_ephemeral: bool,
}

#[allow(dead_code)]
impl SimulatedDevice {
    pub fn new() -> Self {
        Self {
            issuer: SecretKey::random(&mut OsRng),
            device_key: SecretKey::random(&mut OsRng),
            device_ephemeral: SecretKey::random(&mut OsRng),
            device_nonce: [0x5A, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77],
            host_nonce: Vec::new(),
            signer: None,
            host_ephemeral: None,
            channel: None,
            target_id: None,
            wire: Vec::new(),
            received: Vec::new(),
            forge_ephemeral: false,
        }
    }

    pub fn issuer_public(&self) -> PublicKey {
        self.issuer.public_key()
    }

    pub fn is_committed(&self) -> bool {
        self.channel.is_some()
    }

    /// Signer public key presented by the host, uncompressed.
    pub fn signer_public(&self) -> Option<Vec<u8>> {
        self.signer.as_ref().map(|(_, public)| public.clone())
    }

    fn handshake(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        let data = apdu.get(5..).unwrap_or(&[]);
        match (apdu[1], apdu[2]) {
            (0x04, _) => {
                self.target_id = Some(u32::from_be_bytes(data.try_into().map_err(|_| reject())?));
                Ok(Vec::new())
            }
            (0x50, _) => {
                self.host_nonce = data.to_vec();
                let mut out = vec![0x00, 0x00, 0x00, 0x01];
                out.extend_from_slice(&self.device_nonce);
                Ok(out)
            }
            (0x51, 0x00) => {
                let (public, signature) = host_certificate(data)?;
                let key = VerifyingKey::from_sec1_bytes(&public).map_err(|_| reject())?;
                let signed = [&[0x01][..], &public[..]].concat();
                key.verify(&signed, &signature).map_err(|_| reject())?;
                self.signer = Some((key, public));
                Ok(Vec::new())
            }
            (0x51, 0x80) => {
                let (public, signature) = host_certificate(data)?;
                let (signer, _) = self.signer.as_ref().ok_or_else(reject)?;
                let signed = [&[0x11][..], &self.host_nonce[..], &self.device_nonce[..], &public[..]].concat();
                signer.verify(&signed, &signature).map_err(|_| reject())?;
                self.host_ephemeral = Some(PublicKey::from_sec1_bytes(&public).map_err(|_| reject())?);
                Ok(Vec::new())
            }
            (0x52, 0x00) => {
                let header = vec![0x01, 0xCA, 0xFE];
                let public = uncompressed(&self.device_key);
                let signed = [&[0x02][..], &header[..], &public[..]].concat();
                let signature: Signature = SigningKey::from(&self.issuer).sign(&signed);
                Ok(certificate(header, public, &signature))
            }
            (0x52, 0x80) => {
                let public = uncompressed(&self.device_ephemeral);
                let signed =
                    [&[0x12][..], &self.device_nonce[..], &self.host_nonce[..], &public[..]].concat();
                let signing = if self.forge_ephemeral {
                    SigningKey::from(&self.issuer)
                } else {
                    SigningKey::from(&self.device_key)
                };
                let signature: Signature = signing.sign(&signed);
                Ok(certificate(Vec::new(), public, &signature))
            }
            (0x53, _) => {
                let host = self.host_ephemeral.as_ref().ok_or_else(reject)?;
                let secret = ecdh_secret(&self.device_ephemeral, host);
                let key = SessionKey::from_prefix(&secret[..]).ok_or_else(reject)?;
                self.channel = Some(SecureChannel::new(key));
                Ok(Vec::new())
            }
            _ => Err(reject()),
        }
    }
}

impl Transport for SimulatedDevice {
    fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.wire.push(apdu.to_vec());
        if apdu.len() < 5 {
            return Err(reject());
        }

        if self.channel.is_none() {
            return self.handshake(apdu);
        }
        let channel = self.channel.as_mut().ok_or_else(reject)?;

        let data = if apdu.len() > 5 {
            channel.decrypt(&apdu[5..])?
        } else {
            Vec::new()
        };
        self.received.push(data.clone());

        if apdu[1] == INS_SILENT {
            return Ok(Vec::new());
        }
        let mut reply = vec![apdu[1], data.len() as u8];
        reply.extend_from_slice(&data);
        Ok(channel.encrypt(&reply))
    }
}

fn reject() -> TransportError {
    TransportError::Status {
        sw: SW_WRONG_DATA,
        data: Vec::new(),
    }
}

fn uncompressed(key: &SecretKey) -> Vec<u8> {
    key.public_key().to_encoded_point(false).as_bytes().to_vec()
}

fn certificate(header: Vec<u8>, public_key: Vec<u8>, signature: &Signature) -> Vec<u8> {
    DeviceCertificate {
        header,
        public_key,
        signature: signature.to_der().as_bytes().to_vec(),
    }
    .to_bytes()
    .unwrap()
}

/// `[len][pub][len][sig]` as sent by the host.
fn host_certificate(data: &[u8]) -> Result<(Vec<u8>, Signature), TransportError> {
    let pub_len = *data.first().ok_or_else(reject)? as usize;
    let public = data.get(1..1 + pub_len).ok_or_else(reject)?.to_vec();
    let sig_len = *data.get(1 + pub_len).ok_or_else(reject)? as usize;
    let sig = data
        .get(2 + pub_len..2 + pub_len + sig_len)
        .ok_or_else(reject)?;
    let signature = Signature::from_der(sig).map_err(|_| reject())?;
    Ok((public, signature))
}

/// Serve the proxy framing for `device` on a local port, one connection.
///
/// Transport errors from the device become status words; 0x9000 otherwise.
#[allow(dead_code)]
pub fn spawn_proxy<D>(mut device: D) -> (String, u16, thread::JoinHandle<D>)
where
    D: Transport + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        while let Some(apdu) = read_request(&mut stream) {
            let (data, sw) = match device.exchange(&apdu) {
                Ok(data) => (data, 0x9000u16),
                Err(TransportError::Status { sw, data }) => (data, sw),
                Err(_) => (Vec::new(), 0x6F00),
            };
            let mut out = (data.len() as u32).to_be_bytes().to_vec();
            out.extend_from_slice(&data);
            out.extend_from_slice(&sw.to_be_bytes());
            if stream.write_all(&out).is_err() {
                break;
            }
        }
        device
    });

    ("127.0.0.1".to_string(), port, handle)
}

fn read_request(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut len = [0u8; 4];
    stream.read_exact(&mut len).ok()?;
    let mut apdu = vec![0u8; u32::from_be_bytes(len) as usize];
    stream.read_exact(&mut apdu).ok()?;
    Some(apdu)
}
