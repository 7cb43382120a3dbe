//! Command/Response APDU codec — ISO/IEC 7816-4 §5.1.
//!
//! Short form is used exactly when `data.len() <= 255` and `Ne <= 256`;
//! otherwise three-byte Lc/Le extended form is emitted. Decoding is total:
//! any byte string of length >= 2 decodes, the last two bytes are always
//! SW1/SW2.

use crate::status::StatusWord;
use bytes::{BufMut, BytesMut};

/// `Ne == 256` requests the short-form maximum (encoded as `0x00`);
/// `Ne == 65536` requests the extended-form maximum (`0x00 0x00 0x00`).
pub const NE_SHORT_MAX: u32 = 256;
pub const NE_EXTENDED_MAX: u32 = 65536;

/// A Command APDU: `CLA INS P1 P2 [Lc data] [Le]`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandApdu {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
    /// Expected response length. `None` means no Le byte at all (Case 1).
    pub le: Option<u32>,
}

impl CommandApdu {
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le: None,
        }
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    pub fn with_le(mut self, le: u32) -> Self {
        self.le = Some(le);
        self
    }

    /// Short form applies iff both bounds hold; this must stay consistent
    /// with what [`Self::encode`] actually emits.
    pub fn needs_extended_form(&self) -> bool {
        self.data.len() > 255 || self.le.is_some_and(|le| le > NE_SHORT_MAX)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = BytesMut::with_capacity(4 + 3 + self.data.len() + 3);
        out.put_u8(self.cla);
        out.put_u8(self.ins);
        out.put_u8(self.p1);
        out.put_u8(self.p2);

        if self.needs_extended_form() {
            if !self.data.is_empty() {
                out.put_u8(0x00);
                out.put_u16(self.data.len() as u16);
                out.put_slice(&self.data);
            }
            if let Some(le) = self.le {
                // When Lc was already emitted, the extended-form marker byte
                // was already consumed, so Le is just two bytes; `0x0000`
                // means Ne = 65536 either way.
                if self.data.is_empty() {
                    out.put_u8(0x00);
                }
                out.put_u16(if le >= NE_EXTENDED_MAX { 0 } else { le as u16 });
            }
        } else {
            if !self.data.is_empty() {
                out.put_u8(self.data.len() as u8);
                out.put_slice(&self.data);
            }
            if let Some(le) = self.le {
                out.put_u8(if le >= NE_SHORT_MAX { 0x00 } else { le as u8 });
            }
        }

        out.to_vec()
    }
}

/// A Response APDU: `[data] SW1 SW2`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResponseApdu {
    pub data: Vec<u8>,
    pub sw1: u8,
    pub sw2: u8,
}

impl ResponseApdu {
    /// Total: any slice of length >= 2 decodes. `None` for a shorter
    /// slice — a transport-layer bug, not a protocol condition, so
    /// callers that can't guarantee the transport delivered at least
    /// SW1/SW2 (i.e. anything other than trusted test fixtures) should
    /// use this instead of [`Self::decode`] and surface the failure as a
    /// transport error rather than panicking.
    pub fn try_decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 2 {
            return None;
        }
        let (data, sw) = bytes.split_at(bytes.len() - 2);
        Some(Self {
            data: data.to_vec(),
            sw1: sw[0],
            sw2: sw[1],
        })
    }

    /// Convenience for call sites (tests, fixed literals) that already
    /// know `bytes.len() >= 2`. Panics otherwise; see [`Self::try_decode`]
    /// for the fallible form raw transport bytes should go through.
    pub fn decode(bytes: &[u8]) -> Self {
        Self::try_decode(bytes).expect("response APDU shorter than SW1 SW2")
    }

    pub fn status(&self) -> StatusWord {
        StatusWord::from_bytes(self.sw1, self.sw2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_select_df_by_name() {
        // S2: AID A0000002471001, P1=04, P2=0C
        let cmd = CommandApdu::new(0x00, 0xA4, 0x04, 0x0C)
            .with_data(hex::decode("A0000002471001").unwrap());
        assert_eq!(
            cmd.encode(),
            hex::decode("00A4040C07A0000002471001").unwrap()
        );
    }

    #[test]
    fn short_form_le_256_encodes_as_zero() {
        let cmd = CommandApdu::new(0x00, 0xB0, 0x00, 0x00).with_le(256);
        assert_eq!(cmd.encode(), vec![0x00, 0xB0, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn extended_form_triggered_by_large_data() {
        let data = vec![0xAA; 300];
        let cmd = CommandApdu::new(0x00, 0xA4, 0x00, 0x00).with_data(data.clone());
        assert!(cmd.needs_extended_form());
        let enc = cmd.encode();
        assert_eq!(&enc[0..4], &[0x00, 0xA4, 0x00, 0x00]);
        assert_eq!(&enc[4..5], &[0x00]);
        assert_eq!(u16::from_be_bytes([enc[5], enc[6]]) as usize, data.len());
        assert_eq!(&enc[7..], &data[..]);
    }

    #[test]
    fn extended_form_le_65536_is_all_zero() {
        let cmd = CommandApdu::new(0x00, 0xB0, 0x00, 0x00).with_le(65536);
        assert_eq!(cmd.encode(), vec![0x00, 0xB0, 0x00, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn round_trips_short_form() {
        let cmd = CommandApdu::new(0x00, 0xA4, 0x02, 0x0C)
            .with_data(vec![0x01, 0x1E])
            .with_le(256);
        let wire = cmd.encode();
        assert_eq!(wire, hex::decode("00A4020C0201 1E00".replace(' ', "")).unwrap());
    }

    #[test]
    fn decode_splits_trailer() {
        let rsp = ResponseApdu::decode(&[0x60, 0x16, 0x90, 0x00]);
        assert_eq!(rsp.data, vec![0x60, 0x16]);
        assert_eq!(rsp.status(), StatusWord::Success);
    }

    #[test]
    fn decode_handles_empty_data() {
        let rsp = ResponseApdu::decode(&[0x6A, 0x82]);
        assert!(rsp.data.is_empty());
        assert_eq!(rsp.status(), StatusWord::Other(0x6A82));
    }

    #[test]
    fn try_decode_rejects_short_frames() {
        assert!(ResponseApdu::try_decode(&[]).is_none());
        assert!(ResponseApdu::try_decode(&[0x90]).is_none());
        assert!(ResponseApdu::try_decode(&[0x90, 0x00]).is_some());
    }
}
