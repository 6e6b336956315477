//! TCP proxy transport.
//!
//! Talks to a device emulator or a USB proxy over a plain TCP socket.
//!
//! # Framing
//!
//! ```text
//! request:  [len:4 BE][apdu:len]
//! response: [len:4 BE][data:len][sw:2 BE]
//! ```
//!
//! - Strict 1:1 mapping: one `exchange()` = one request + one response
//! - No pipelining, no buffering across exchanges

use std::io::{Read, Write};
use std::net::TcpStream;

use crate::config::TransportConfig;
use crate::device::{check_status, Transport};
use crate::error::TransportError;

/// Length prefix size.
const LENGTH_PREFIX_SIZE: usize = 4;

/// Status word size.
const STATUS_WORD_SIZE: usize = 2;

/// Upper bound on a single response; anything larger is a broken peer.
const MAX_RESPONSE_LENGTH: usize = 64 * 1024;

/// Blocking TCP transport to a device proxy.
pub struct ProxyTransport<S = TcpStream> {
    stream: S,
}

impl std::fmt::Debug for ProxyTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyTransport")
            .field("peer", &self.stream.peer_addr().ok())
            .finish()
    }
}

impl ProxyTransport {
    /// Connect to the proxy named in `config`.
    pub fn connect(config: &TransportConfig) -> Result<Self, TransportError> {
        let endpoint = config.proxy_endpoint();
        let stream = TcpStream::connect(&endpoint)
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", endpoint, e)))?;
        stream.set_read_timeout(config.timeout)?;
        stream.set_write_timeout(config.timeout)?;
        stream.set_nodelay(true)?;

        tracing::debug!(%endpoint, "connected to device proxy");
        Ok(Self { stream })
    }
}

impl<S: Read + Write> ProxyTransport<S> {
    /// Wrap an already-open stream.
    pub fn from_stream(stream: S) -> Self {
        Self { stream }
    }

    fn send_apdu(&mut self, apdu: &[u8]) -> Result<(), TransportError> {
        let len = u32::try_from(apdu.len()).map_err(|_| {
            TransportError::Protocol(apdurun_core::ProtocolError::PayloadTooLarge(apdu.len()))
        })?;

        let mut request = Vec::with_capacity(LENGTH_PREFIX_SIZE + apdu.len());
        request.extend_from_slice(&len.to_be_bytes());
        request.extend_from_slice(apdu);

        self.stream.write_all(&request)?;
        self.stream.flush()?;
        Ok(())
    }

    fn recv_response(&mut self) -> Result<(u16, Vec<u8>), TransportError> {
        let mut len_bytes = [0u8; LENGTH_PREFIX_SIZE];
        self.stream.read_exact(&mut len_bytes)?;
        let len = u32::from_be_bytes(len_bytes) as usize;
        if len > MAX_RESPONSE_LENGTH {
            return Err(TransportError::ResponseTooLarge {
                max: MAX_RESPONSE_LENGTH,
                actual: len,
            });
        }

        let mut data = vec![0u8; len];
        self.stream.read_exact(&mut data)?;

        let mut sw_bytes = [0u8; STATUS_WORD_SIZE];
        self.stream.read_exact(&mut sw_bytes)?;

        Ok((u16::from_be_bytes(sw_bytes), data))
    }
}

impl<S: Read + Write> Transport for ProxyTransport<S> {
    fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        tracing::debug!("=> {}", hex::encode(apdu));
        self.send_apdu(apdu)?;

        let (sw, data) = self.recv_response()?;
        tracing::debug!("<= {}{:04x}", hex::encode(&data), sw);

        check_status(sw, data)
    }
}
