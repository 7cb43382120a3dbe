//! The transport seam (spec §6) — an abstract byte-level channel to the
//! card. Reconstructed from the teacher's `Nfc` usage in `main.rs`
//! (`Nfc::new_proxmark3`, `nfc.connect()?`, `nfc.send_apdu(...)`); this is
//! also the seam a future PACE engine or a test double plugs into.

use crate::error::TransportError;

/// Anything that can carry one APDU round-trip to a contactless card.
pub trait Transport {
    fn connect(&mut self, alert_message: Option<&str>) -> Result<(), TransportError>;

    fn disconnect(
        &mut self,
        alert_message: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    /// One command/response round-trip. Timeouts and tag-lost conditions
    /// surface as [`TransportError::Timeout`] / [`TransportError::TagLost`].
    fn transceive(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError>;

    /// Cosmetic hook on platforms that render an alert; a no-op default
    /// suits transports with no such UI.
    fn set_alert_message(&mut self, _text: &str) {}
}

/// An in-memory transport double used by tests: a caller-supplied closure
/// decides the response bytes for each request.
#[cfg(any(test, feature = "test-support"))]
pub struct MockTransport {
    connected: bool,
    pub respond: Box<dyn FnMut(&[u8]) -> Result<Vec<u8>, TransportError> + Send>,
}

#[cfg(any(test, feature = "test-support"))]
impl MockTransport {
    pub fn new(respond: impl FnMut(&[u8]) -> Result<Vec<u8>, TransportError> + Send + 'static) -> Self {
        Self {
            connected: false,
            respond: Box::new(respond),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Transport for MockTransport {
    fn connect(&mut self, _alert_message: Option<&str>) -> Result<(), TransportError> {
        self.connected = true;
        Ok(())
    }

    fn disconnect(
        &mut self,
        _alert_message: Option<&str>,
        _error_message: Option<&str>,
    ) -> Result<(), TransportError> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn transceive(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        (self.respond)(apdu)
    }
}
