//! Elementary File identifiers and short file identifiers.
//!
//! See ICAO 9303-10 §4.6 for the reserved tag and file-id assignments.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 2-byte file identifiers for files that live under the Master File,
/// addressed by `SELECT FILE`. Kept as a `u16`-backed enum, following the
/// teacher's original `File` enum.
#[repr(u16)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
pub enum File {
    MasterFile = 0x3F00,
    Directory = 0x2F00,
    Attributes = 0x2F01,

    // ICAO 9303-10
    CardAccess = 0x011C,
    CardSecurity = 0x011D,
}

/// File identifiers for files that live under the eMRTD application DF
/// (DF1). `EF.SOD` and `EF.CardSecurity` share the numeric value `0x011D`
/// because file identifiers are scoped per dedicated file.
pub const FID_COM: u16 = 0x011E;
pub const FID_SOD: u16 = 0x011D;

/// File identifier for `EF.DGn`, `n` in `1..=16`.
pub fn dg_file_id(n: u8) -> Option<u16> {
    if (1..=16).contains(&n) {
        Some(0x0100 + n as u16)
    } else {
        None
    }
}

/// Short File Identifier for `EF.DGn`, equal to `n` by ICAO convention.
pub fn dg_sfi(n: u8) -> Option<u8> {
    if (1..=16).contains(&n) {
        Some(n)
    } else {
        None
    }
}

pub const SFI_COM: u8 = 0x1E;
pub const SFI_SOD: u8 = 0x1D;
pub const SFI_CARD_ACCESS: u8 = 0x1C;
pub const SFI_CARD_SECURITY: u8 = 0x1D;

/// Validates a short file identifier is in the 5-bit range ISO/IEC 7816-4
/// reserves for `b8..b6 = 100` addressing (`0x00..=0x1F`).
pub fn validate_sfi(sfi: u8) -> Result<u8, crate::error::ProtocolError> {
    if sfi <= 0x1F {
        Ok(sfi)
    } else {
        Err(crate::error::ProtocolError::InvalidSfi(sfi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dg_file_ids_span_the_documented_range() {
        assert_eq!(dg_file_id(1), Some(0x0101));
        assert_eq!(dg_file_id(16), Some(0x0110));
        assert_eq!(dg_file_id(0), None);
        assert_eq!(dg_file_id(17), None);
    }

    #[test]
    fn rejects_sfi_above_five_bits() {
        assert!(validate_sfi(0x1F).is_ok());
        assert!(validate_sfi(0x20).is_err());
    }
}
