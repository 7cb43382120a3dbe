//! MRTD read loop — spec §4.6.
//!
//! New relative to the teacher: the teacher's `read_elementary_file`
//! reads a whole file in one shot with a `0xFF` Le "hack" and is marked
//! `TODO: Implement proper handling`. This module is that proper
//! handling: a read-ahead TLV probe, chunked continuation with a
//! max-read back-off schedule, status-word-driven recovery, and an SM
//! re-init callback for recoverable errors.

use crate::{
    error::{IccError, ProtocolError},
    icc::{Icc, MAX_SHORT_OFFSET},
    status::StatusWord,
    transport::Transport,
};

/// Starting `maxRead` and the back-off sequence the read loop steps
/// through on `0x6282` (unexpected EOF). Card quirks observed in the
/// field motivate these exact steps; see spec §4.6.
pub const DEFAULT_MAX_READ: u32 = 256;
const BACKOFF_SCHEDULE: &[u32] = &[224, 160, 128, 96, 64, 32, 16, 8, 1];

/// How many bytes of read-ahead to request to decode the BER-TLV header
/// (tag + length) that opens every EF. 8 bytes is always sufficient for
/// tags and lengths this crate encounters.
const READ_AHEAD_LEN: u8 = 8;

/// The SM re-init seam (spec §9): a small polymorphic handle, not global
/// state, invoked by the read loop after a recoverable error that arrived
/// with data already received.
pub type ReinitSession<'a, T> = dyn FnMut(&mut Icc<T>) -> Result<(), IccError> + 'a;

struct MaxRead {
    current: u32,
    backoff_index: usize,
}

impl MaxRead {
    fn new() -> Self {
        Self {
            current: DEFAULT_MAX_READ,
            backoff_index: 0,
        }
    }

    fn reset(&mut self) {
        self.current = DEFAULT_MAX_READ;
        self.backoff_index = 0;
    }

    /// Steps down the back-off schedule exactly once (S4, invariant 6).
    fn back_off(&mut self) {
        if let Some(&next) = BACKOFF_SCHEDULE.get(self.backoff_index) {
            self.current = next;
            self.backoff_index += 1;
        } else {
            self.current = *BACKOFF_SCHEDULE.last().unwrap();
        }
    }

    fn set_exact(&mut self, n: u32) {
        self.current = n;
    }
}

/// Whether reading `n_read` bytes starting at `offset` needs the
/// extended-offset form (INS `0xB1`, DO'54'/DO'53') rather than a short
/// `READ BINARY`: true once `offset` is already past the 15-bit short
/// range, or as soon as the requested window would cross it (spec §8 S6:
/// `offset = 32767`, `nRead = 16` must already take this branch).
fn needs_extended_offset(offset: u32, n_read: u32) -> bool {
    offset > MAX_SHORT_OFFSET || offset as u64 + n_read as u64 > MAX_SHORT_OFFSET as u64 + 1
}

/// Decodes a BER-TLV tag + length prefix from the start of `data`,
/// returning `(header_len, value_len)`.
fn decode_tlv_header(data: &[u8]) -> Result<(usize, usize), ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::MalformedTlv("empty read-ahead".into()));
    }
    // Single-byte tags only: every EF this crate reads (EF.COM, EF.SOD,
    // EF.DGn, EF.CardAccess, EF.CardSecurity) opens with a low-tag-number
    // or application-class tag that fits in one byte.
    let tag_len = 1;
    let len_byte = *data
        .get(tag_len)
        .ok_or_else(|| ProtocolError::MalformedTlv("read-ahead too short for length byte".into()))?;

    if len_byte < 0x80 {
        Ok((tag_len + 1, len_byte as usize))
    } else {
        let n = (len_byte & 0x7F) as usize;
        if n == 0 || n > 4 {
            return Err(ProtocolError::MalformedTlv(format!("unsupported long length form, {n} bytes")));
        }
        let len_bytes = data
            .get(tag_len + 1..tag_len + 1 + n)
            .ok_or_else(|| ProtocolError::MalformedTlv("read-ahead too short for long length".into()))?;
        let mut value_len = 0usize;
        for &b in len_bytes {
            value_len = (value_len << 8) | b as usize;
        }
        Ok((tag_len + 1 + n, value_len))
    }
}

/// Reads a complete EF addressed by its Short File Identifier, returning
/// the full TLV-framed bytes (header + value).
///
/// `reinit` is invoked when a recoverable error status arrives alongside
/// already-received data, per spec §4.6 step 4's "any other error with
/// non-empty data received" branch.
pub fn read_file_by_sfi<T: Transport>(
    icc: &mut Icc<T>,
    sfi: u8,
    mut reinit: Option<&mut ReinitSession<'_, T>>,
) -> Result<Vec<u8>, IccError> {
    let mut max_read = MaxRead::new();

    let rsp = icc.read_binary_by_sfi(sfi, 0, READ_AHEAD_LEN as u32)?;
    let (hdr_len, value_len) = decode_tlv_header(&rsp.data)
        .map_err(|e| IccError::new(e.to_string(), rsp.status()).with_data(rsp.data.clone()))?;

    let mut buf = rsp.data.clone();
    let already_have = buf.len().saturating_sub(hdr_len);
    let mut remaining = value_len.saturating_sub(already_have);
    let mut offset: u32 = buf.len() as u32;

    while remaining > 0 {
        let n_read = remaining.min(max_read.current as usize) as u32;
        let target_offset = offset;

        let result = if needs_extended_offset(target_offset, n_read) {
            icc.read_binary_extended_offset(target_offset, n_read)
        } else {
            icc.read_binary(target_offset, n_read)
        };

        // READ BINARY only returns `Ok` for `0x9000`/`0x61XX`; every other
        // status (including the recoverable `0x6282`/`0x6281`/`0x6700`/
        // `0x6CXX` ones the loop reacts to) comes back as `Err(IccError)`
        // carrying the status and whatever data preceded it, per spec §4.4.
        match result {
            Ok(rsp) => {
                buf.extend_from_slice(&rsp.data);
                offset += rsp.data.len() as u32;
                remaining = remaining.saturating_sub(rsp.data.len());
                // Success or success-with-more-bytes: loop condition
                // re-checks `remaining`.
            }
            Err(e) => {
                // Appended regardless of which branch below ultimately
                // raises. The original implementation this was distilled
                // from keeps whatever partial data arrived even along an
                // error path; preserved here deliberately, see DESIGN.md
                // Open Question 2.
                buf.extend_from_slice(&e.data_before_error);
                offset += e.data_before_error.len() as u32;
                remaining = remaining.saturating_sub(e.data_before_error.len());

                match e.status {
                    StatusWord::UnexpectedEof => {
                        log::warn!("read_file_by_sfi: unexpected EOF at offset {offset}, backing off max_read");
                        max_read.back_off();
                    }
                    StatusWord::PossiblyCorrupted => {
                        log::warn!("read_file_by_sfi: possibly corrupted data at offset {offset}");
                    }
                    StatusWord::WrongLength => {
                        max_read.back_off();
                    }
                    StatusWord::WrongLengthExact(exact) => {
                        max_read.set_exact(exact as u32);
                    }
                    other => {
                        if !e.data_before_error.is_empty() {
                            if let Some(cb) = reinit.as_deref_mut() {
                                cb(icc)?;
                            }
                        } else {
                            max_read.reset();
                            return Err(IccError::new("read loop: unrecoverable status", other).with_data(buf));
                        }
                    }
                }
            }
        }
    }

    if buf.len() > hdr_len + value_len {
        buf.truncate(hdr_len + value_len);
    }

    Ok(buf)
}
