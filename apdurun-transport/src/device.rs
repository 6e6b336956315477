//! Device transport abstraction.

use crate::error::TransportError;

/// Status word for a successful command.
pub const SW_OK: u16 = 0x9000;

/// Something that can exchange one APDU with a device.
///
/// `exchange` is a blocking round trip: it sends the frame and waits for the
/// response data, with the status word already checked and removed.
pub trait Transport {
    /// Send a command APDU and return the response data.
    fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        (**self).exchange(apdu)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        (**self).exchange(apdu)
    }
}

/// Check a status word and hand back the data that preceded it.
pub fn check_status(sw: u16, data: Vec<u8>) -> Result<Vec<u8>, TransportError> {
    if sw != SW_OK {
        tracing::warn!(sw = %format!("{:04x}", sw), "device rejected command");
        return Err(TransportError::Status { sw, data });
    }
    Ok(data)
}
