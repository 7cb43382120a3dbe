//! Closed error types for each layer of the stack.
//!
//! Transport errors are non-recoverable within the core. ICC errors carry
//! the status word and any data already received so the read loop (and
//! its callers) can decide whether to recover. Protocol errors are always
//! fatal to the current BAC/SM session.

use crate::status::StatusWord;

/// Error surfaced by the transport seam (connection, timeout, tag loss).
///
/// The read loop and façade only ever match on the message substrings the
/// spec names ("timeout", "tag was lost"); the variants below exist so a
/// concrete transport can still report a structured cause.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("not connected to a card")]
    NotConnected,

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("transceive timeout")]
    Timeout,

    #[error("tag was lost")]
    TagLost,

    #[error("transport error: {0}")]
    Other(String),
}

/// Error returned by an ISO/IEC 7816-4 command primitive: a non-success
/// status word, optionally carrying whatever data preceded it.
#[derive(Debug, thiserror::Error)]
#[error("ICC error: {message} ({status})")]
pub struct IccError {
    pub message: String,
    pub status: StatusWord,
    pub data_before_error: Vec<u8>,
}

impl IccError {
    pub fn new(message: impl Into<String>, status: StatusWord) -> Self {
        Self {
            message: message.into(),
            status,
            data_before_error: Vec::new(),
        }
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data_before_error = data;
        self
    }
}

/// Whatever can go wrong sending one APDU through the ICC layer: the
/// transport failed outright, or the installed SM engine rejected the
/// response. Neither carries a status word — there was no response to
/// read one from, or SM could not be trusted enough to read one out of.
#[derive(Debug, thiserror::Error)]
pub enum IccSendError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Fatal protocol-level failures: BAC mismatch, SM MAC mismatch, malformed
/// TLV, invalid SFI/FID, extended-offset exceeded.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("BAC MAC verification failed")]
    BacMacMismatch,

    #[error("BAC nonce mismatch: RND.IFD echoed by the card does not match")]
    BacNonceMismatch,

    #[error("secure messaging MAC verification failed")]
    SmMacMismatch,

    #[error("secure messaging response missing mandatory DO'99'")]
    SmMissingStatus,

    #[error("secure messaging response missing mandatory DO'8E'")]
    SmMissingMac,

    #[error("malformed BER-TLV: {0}")]
    MalformedTlv(String),

    #[error("invalid short file identifier: {0:#04x}")]
    InvalidSfi(u8),

    #[error("extended offset {0} exceeds the 15-bit range before DO'54' is required")]
    OffsetRequiresExtended(u32),

    #[error("file identifier out of range: {0:#06x}")]
    InvalidFileId(u16),
}

/// The single error type the passport façade raises. All lower-layer
/// errors are folded into this with a human message and, where known, the
/// status word that caused it.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct PassportError {
    pub message: String,
    pub status: Option<StatusWord>,
}

impl PassportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(message: impl Into<String>, status: StatusWord) -> Self {
        Self {
            message: message.into(),
            status: Some(remap_status(status)),
        }
    }
}

/// Some cards return `0x63CF` where ICAO 9303 specifies
/// `SECURITY_STATUS_NOT_SATISFIED` (`0x6982`); the façade normalises it so
/// callers only ever see the standard value.
fn remap_status(status: StatusWord) -> StatusWord {
    match status {
        StatusWord::Other(0x63CF) => StatusWord::SecurityStatusNotSatisfied,
        other => other,
    }
}

impl From<IccError> for PassportError {
    fn from(e: IccError) -> Self {
        PassportError::with_status(e.message, e.status)
    }
}

impl From<ProtocolError> for PassportError {
    fn from(e: ProtocolError) -> Self {
        PassportError::new(e.to_string())
    }
}

impl From<TransportError> for PassportError {
    fn from(e: TransportError) -> Self {
        PassportError::new(e.to_string())
    }
}
