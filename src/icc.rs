//! ICC layer — ISO/IEC 7816-4 command primitives over an optional Secure
//! Messaging session.
//!
//! Generalizes the teacher's `Icao9303` struct: the teacher's
//! `select_master_file`/`select_dedicated_file`/`select_elementary_file`/
//! `read_binary_short_ef`/`get_challenge`/`external_authenticate`/
//! `read_elementary_file`/`send_apdu` all reappear here, but every send
//! now consults an installed [`SecureMessaging`] engine, and `READ BINARY`
//! gains explicit-offset and extended-offset forms the teacher's demo
//! never needed.

use crate::{
    apdu::{CommandApdu, ResponseApdu},
    error::{IccError, IccSendError, TransportError},
    secure_messaging::SecureMessaging,
    status::StatusWord,
    transport::Transport,
};

/// Offsets above this require the extended-offset form (`READ BINARY`
/// with INS `0xB1` and a DO'54').
pub const MAX_SHORT_OFFSET: u32 = 32767;

pub struct Icc<T: Transport> {
    transport: T,
    sm: Option<SecureMessaging>,
}

impl<T: Transport> Icc<T> {
    pub fn new(transport: T) -> Self {
        Self { transport, sm: None }
    }

    pub fn connect(&mut self) -> Result<(), crate::error::TransportError> {
        self.transport.connect(None)
    }

    pub fn disconnect(&mut self) -> Result<(), crate::error::TransportError> {
        self.sm = None;
        self.transport.disconnect(None, None)
    }

    pub fn install_secure_messaging(&mut self, sm: SecureMessaging) {
        self.sm = Some(sm);
    }

    pub fn clear_secure_messaging(&mut self) {
        self.sm = None;
    }

    pub fn has_secure_messaging(&self) -> bool {
        self.sm.is_some()
    }

    /// Sends one command through the SM engine (if installed), routes it
    /// through the transport, and unwraps the response.
    pub fn send(&mut self, cmd: CommandApdu) -> Result<ResponseApdu, IccSendError> {
        let wire_cmd = match &mut self.sm {
            Some(sm) => sm.protect(&cmd),
            None => cmd,
        };
        let raw = self.transport.transceive(&wire_cmd.encode())?;
        let rsp = ResponseApdu::try_decode(&raw).ok_or(TransportError::Other(
            "transport returned a frame shorter than SW1/SW2".into(),
        ))?;
        match &mut self.sm {
            Some(sm) => Ok(sm.unprotect(&rsp)?),
            None => Ok(rsp),
        }
    }

    fn send_expect_success(&mut self, cmd: CommandApdu, what: &str) -> Result<ResponseApdu, IccError> {
        let rsp = self
            .send(cmd)
            .map_err(|e| IccError::new(format!("{what}: {e}"), StatusWord::Other(0)))?;
        let status = rsp.status();
        if !status.is_success() {
            return Err(IccError::new(format!("{what} failed"), status).with_data(rsp.data));
        }
        Ok(rsp)
    }

    /// `SELECT FILE` by file identifier, applicative DF unchanged.
    /// ISO/IEC 7816-4 §11.2.2, ICAO 9303-10 §3.6.2.
    pub fn select_elementary_file(&mut self, file_id: u16) -> Result<(), IccError> {
        let fid = file_id.to_be_bytes();
        let cmd = CommandApdu::new(0x00, 0xA4, 0x02, 0x0C).with_data(vec![fid[0], fid[1]]);
        let rsp = self
            .send(cmd)
            .map_err(|e| IccError::new(format!("select EF {file_id:04X}: {e}"), StatusWord::Other(0)))?;
        let status = rsp.status();
        if !status.is_success() && status.data_remaining().is_none() {
            return Err(IccError::new(format!("select EF {file_id:04X}"), status).with_data(rsp.data));
        }
        Ok(())
    }

    /// `SELECT FILE` by file identifier, for the Master File.
    pub fn select_master_file(&mut self) -> Result<(), IccError> {
        let cmd = CommandApdu::new(0x00, 0xA4, 0x00, 0x0C).with_data(vec![0x3F, 0x00]);
        self.select_generic(cmd, "select master file")
    }

    /// `SELECT FILE` by DF name (application identifier), §4.4/S2.
    pub fn select_dedicated_file(&mut self, application_id: &[u8]) -> Result<(), IccError> {
        if application_id.len() > 16 {
            return Err(IccError::new("AID too long", StatusWord::Other(0)));
        }
        let cmd = CommandApdu::new(0x00, 0xA4, 0x04, 0x0C).with_data(application_id.to_vec());
        self.select_generic(cmd, "select dedicated file")
    }

    /// `SELECT FILE` by parent DF (P1 = `0x03`).
    pub fn select_parent_df(&mut self) -> Result<(), IccError> {
        let cmd = CommandApdu::new(0x00, 0xA4, 0x03, 0x0C);
        self.select_generic(cmd, "select parent DF")
    }

    /// `SELECT FILE` by path from the MF (P1 = `0x08`) or from the
    /// current DF (P1 = `0x09`).
    pub fn select_by_path(&mut self, path: &[u8], from_mf: bool) -> Result<(), IccError> {
        let p1 = if from_mf { 0x08 } else { 0x09 };
        let cmd = CommandApdu::new(0x00, 0xA4, p1, 0x0C).with_data(path.to_vec());
        self.select_generic(cmd, "select by path")
    }

    fn select_generic(&mut self, cmd: CommandApdu, what: &str) -> Result<(), IccError> {
        let rsp = self
            .send(cmd)
            .map_err(|e| IccError::new(format!("{what}: {e}"), StatusWord::Other(0)))?;
        let status = rsp.status();
        if !status.is_success() && status.data_remaining().is_none() {
            return Err(IccError::new(what.to_string(), status).with_data(rsp.data));
        }
        Ok(())
    }

    /// `GET CHALLENGE` — ICAO 9303-11 §4.3.4.1. Always requests an 8-byte
    /// nonce, which is all BAC needs.
    pub fn get_challenge(&mut self) -> Result<[u8; 8], IccError> {
        let cmd = CommandApdu::new(0x00, 0x84, 0x00, 0x00).with_le(8);
        let rsp = self.send_expect_success(cmd, "get challenge")?;
        rsp.data
            .try_into()
            .map_err(|_| IccError::new("get challenge: unexpected length", rsp.status()))
    }

    /// `EXTERNAL AUTHENTICATE` with the 40-byte BAC cryptogram+MAC.
    pub fn external_authenticate(&mut self, data: &[u8]) -> Result<Vec<u8>, IccError> {
        assert_eq!(data.len(), 0x28);
        let cmd = CommandApdu::new(0x00, 0x82, 0x00, 0x00)
            .with_data(data.to_vec())
            .with_le(40);
        let rsp = self.send_expect_success(cmd, "external authenticate")?;
        Ok(rsp.data)
    }

    /// `INTERNAL AUTHENTICATE` — Active Authentication pass-through. The
    /// AA protocol logic itself is out of scope; this only issues the
    /// command and returns the raw signature bytes.
    pub fn internal_authenticate(&mut self, challenge: &[u8]) -> Result<Vec<u8>, IccError> {
        let cmd = CommandApdu::new(0x00, 0x88, 0x00, 0x00)
            .with_data(challenge.to_vec())
            .with_le(256);
        let rsp = self.send_expect_success(cmd, "internal authenticate")?;
        Ok(rsp.data)
    }

    /// `READ BINARY` by short EF identifier, offset 0..255, P1 = `0x80 |
    /// sfi`. ICAO 9303-10 §3.6.3.2, ISO 7816-4 §11.3.3.
    pub fn read_binary_by_sfi(&mut self, sfi: u8, offset: u8, ne: u32) -> Result<ResponseApdu, IccError> {
        let cmd = CommandApdu::new(0x00, 0xB0, 0x80 | sfi, offset).with_le(ne);
        self.read_binary_generic(cmd)
    }

    /// `READ BINARY` with a short, direct offset (bit 8 of P1 clear),
    /// offset 0..32767.
    pub fn read_binary(&mut self, offset: u32, ne: u32) -> Result<ResponseApdu, IccError> {
        assert!(offset <= MAX_SHORT_OFFSET, "offset requires extended form");
        let p1 = ((offset >> 8) & 0x7F) as u8;
        let p2 = (offset & 0xFF) as u8;
        let cmd = CommandApdu::new(0x00, 0xB0, p1, p2).with_le(ne);
        self.read_binary_generic(cmd)
    }

    /// `READ BINARY (extended offset)` — INS `0xB1`, offset wrapped in
    /// DO'54', response unwrapped from DO'53'. ICAO 9303-10 §3.6.4.2.
    pub fn read_binary_extended_offset(&mut self, offset: u32, ne: u32) -> Result<ResponseApdu, IccError> {
        let mut do54 = vec![0x54];
        let offset_bytes = encode_minimal_be(offset);
        do54.push(offset_bytes.len() as u8);
        do54.extend_from_slice(&offset_bytes);

        let cmd = CommandApdu::new(0x00, 0xB1, 0x00, 0x00)
            .with_data(do54)
            .with_le(ne);
        let rsp = self.send_expect_success(cmd, "read binary (extended offset)")?;

        let value = extract_do53(&rsp.data)
            .ok_or_else(|| IccError::new("read binary (extended offset): missing DO'53'", rsp.status()))?;
        Ok(ResponseApdu {
            data: value,
            sw1: rsp.sw1,
            sw2: rsp.sw2,
        })
    }

    fn read_binary_generic(&mut self, cmd: CommandApdu) -> Result<ResponseApdu, IccError> {
        let rsp = self
            .send(cmd)
            .map_err(|e| IccError::new(format!("read binary: {e}"), StatusWord::Other(0)))?;
        let status = rsp.status();
        if !status.is_success() {
            return Err(IccError::new("read binary failed", status).with_data(rsp.data));
        }
        Ok(rsp)
    }
}

fn encode_minimal_be(value: u32) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first_nonzero = bytes.iter().position(|&b| b != 0).unwrap_or(3);
    bytes[first_nonzero..].to_vec()
}

fn extract_do53(data: &[u8]) -> Option<Vec<u8>> {
    if data.first() != Some(&0x53) {
        return None;
    }
    let (len, rest) = decode_ber_length(data.get(1..)?)?;
    rest.get(..len).map(|s| s.to_vec())
}

/// BER-TLV length, short or long form (ISO/IEC 7816-4 §5.2.2.1).
fn decode_ber_length(data: &[u8]) -> Option<(usize, &[u8])> {
    let first = *data.first()?;
    if first < 0x80 {
        Some((first as usize, &data[1..]))
    } else {
        let n = (first & 0x7F) as usize;
        if n == 0 || n > 4 || data.len() < 1 + n {
            return None;
        }
        let mut len = 0usize;
        for &b in &data[1..1 + n] {
            len = (len << 8) | b as usize;
        }
        Some((len, &data[1 + n..]))
    }
}
