//! Secure Messaging engine — ICAO 9303 part 11 §9.8.
//!
//! Generalizes the teacher's free function `enc_apdu` (which protected a
//! single, fixed command and never unwrapped a response) into a stateful
//! engine owning `(KSenc, KSmac, SSC)`, following the shape of a session
//! struct owning derived keys plus a monotone counter (see
//! `yubihsm-rs`'s `securechannel::Channel`).

use crate::{
    apdu::{CommandApdu, ResponseApdu},
    crypto::tdes::{mac3, tdes_cbc_decrypt, tdes_cbc_encrypt, Padding},
    error::ProtocolError,
};

/// DO tags used in the protected APDU wire format.
mod tag {
    pub const DO87_ENCRYPTED_DATA: u8 = 0x87;
    pub const DO97_LE: u8 = 0x97;
    pub const DO99_STATUS: u8 = 0x99;
    pub const DO8E_MAC: u8 = 0x8E;
    /// Padding-indicator byte prefixed to DO'87's value: `0x01` means
    /// "padded data follows".
    const _PADDING_INDICATOR: u8 = 0x01;
}

/// A Secure Messaging session: the two session keys plus the 8-byte send
/// sequence counter, incremented once per `protect` and once per
/// `unprotect`.
#[derive(Clone)]
pub struct SecureMessaging {
    ks_enc: [u8; 16],
    ks_mac: [u8; 16],
    ssc: u64,
}

impl SecureMessaging {
    pub fn new(ks_enc: [u8; 16], ks_mac: [u8; 16], ssc: u64) -> Self {
        Self { ks_enc, ks_mac, ssc }
    }

    pub fn ssc(&self) -> u64 {
        self.ssc
    }

    /// Wraps a plaintext command into its SM-protected form.
    pub fn protect(&mut self, cmd: &CommandApdu) -> CommandApdu {
        self.ssc = self.ssc.wrapping_add(1);

        // Set the SM bit (0x0C = secure messaging, command header
        // authenticated, no command chaining).
        let header = [cmd.cla | 0x0C, cmd.ins, cmd.p1, cmd.p2];
        let padded_header = {
            let mut h = header.to_vec();
            h.extend_from_slice(&[0x80, 0x00, 0x00, 0x00]);
            h
        };

        let mut body = Vec::new();

        if !cmd.data.is_empty() {
            let ciphertext = tdes_cbc_encrypt(&self.ks_enc, &[0; 8], &cmd.data, Padding::Iso7816);
            let mut value = vec![0x01];
            value.extend_from_slice(&ciphertext);
            body.extend_from_slice(&build_do(tag::DO87_ENCRYPTED_DATA, &value));
        }

        if let Some(le) = cmd.le {
            let le_bytes = if le >= crate::apdu::NE_SHORT_MAX {
                vec![0x00]
            } else {
                vec![le as u8]
            };
            body.extend_from_slice(&build_do(tag::DO97_LE, &le_bytes));
        }

        let mut mac_input = self.ssc.to_be_bytes().to_vec();
        mac_input.extend_from_slice(&padded_header);
        mac_input.extend_from_slice(&body);
        let mac = mac3(&self.ks_mac, &mac_input, Padding::Iso7816);
        body.extend_from_slice(&build_do(tag::DO8E_MAC, &mac));

        // The outer protected command always asks for "whatever comes
        // back"; the real expected length travels inside DO'97' and the
        // actual status/data arrive wrapped in DO'99'/DO'87'.
        CommandApdu {
            cla: header[0],
            ins: cmd.ins,
            p1: cmd.p1,
            p2: cmd.p2,
            data: body,
            le: Some(crate::apdu::NE_SHORT_MAX),
        }
    }

    /// Unwraps and verifies an SM-protected response, recovering the
    /// plaintext data field and the card's status word.
    pub fn unprotect(&mut self, rsp: &ResponseApdu) -> Result<ResponseApdu, ProtocolError> {
        self.ssc = self.ssc.wrapping_add(1);

        let dos = parse_dos(&rsp.data)?;
        let do99 = dos
            .iter()
            .find(|(t, _)| *t == tag::DO99_STATUS)
            .ok_or(ProtocolError::SmMissingStatus)?;
        let do8e = dos
            .iter()
            .find(|(t, _)| *t == tag::DO8E_MAC)
            .ok_or(ProtocolError::SmMissingMac)?;
        let do87 = dos.iter().find(|(t, _)| *t == tag::DO87_ENCRYPTED_DATA);

        let mut mac_input = self.ssc.to_be_bytes().to_vec();
        if let Some((t, v)) = do87 {
            mac_input.extend_from_slice(&build_do(*t, v));
        }
        mac_input.extend_from_slice(&build_do(do99.0, &do99.1));
        let expected_mac = mac3(&self.ks_mac, &mac_input, Padding::Iso7816);
        if expected_mac.as_slice() != do8e.1.as_slice() {
            return Err(ProtocolError::SmMacMismatch);
        }

        let data = match do87 {
            Some((_, v)) => {
                let ciphertext = &v[1..]; // strip the 0x01 padding-indicator prefix
                let plaintext = tdes_cbc_decrypt(&self.ks_enc, &[0; 8], ciphertext, Padding::Iso7816);
                plaintext
            }
            None => Vec::new(),
        };

        if do99.1.len() != 2 {
            return Err(ProtocolError::MalformedTlv("DO'99' must carry exactly 2 bytes".into()));
        }

        Ok(ResponseApdu {
            data,
            sw1: do99.1[0],
            sw2: do99.1[1],
        })
    }
}

fn build_do(tag: u8, value: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend_from_slice(&encode_ber_length(value.len()));
    out.extend_from_slice(value);
    out
}

fn encode_ber_length(len: usize) -> Vec<u8> {
    if len < 0x80 {
        vec![len as u8]
    } else if len <= 0xFF {
        vec![0x81, len as u8]
    } else {
        vec![0x82, (len >> 8) as u8, len as u8]
    }
}

/// Parses a flat sequence of BER-TLV data objects (no nesting), as used by
/// the SM response wrapping.
fn parse_dos(mut data: &[u8]) -> Result<Vec<(u8, Vec<u8>)>, ProtocolError> {
    let mut out = Vec::new();
    while !data.is_empty() {
        let tag = data[0];
        data = &data[1..];
        let (len, rest) = decode_ber_length(data)?;
        if rest.len() < len {
            return Err(ProtocolError::MalformedTlv("length exceeds remaining data".into()));
        }
        out.push((tag, rest[..len].to_vec()));
        data = &rest[len..];
    }
    Ok(out)
}

fn decode_ber_length(data: &[u8]) -> Result<(usize, &[u8]), ProtocolError> {
    let first = *data
        .first()
        .ok_or_else(|| ProtocolError::MalformedTlv("missing length byte".into()))?;
    if first < 0x80 {
        Ok((first as usize, &data[1..]))
    } else {
        let n = (first & 0x7F) as usize;
        if data.len() < 1 + n {
            return Err(ProtocolError::MalformedTlv("truncated long-form length".into()));
        }
        let mut len = 0usize;
        for &b in &data[1..1 + n] {
            len = (len << 8) | b as usize;
        }
        Ok((len, &data[1 + n..]))
    }
}
