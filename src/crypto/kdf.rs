//! ICAO key-derivation function — ICAO 9303-11 §9.7.1 (3DES profile).
//!
//! `KDF(seed, counter) = SHA-1(seed || counter)`, truncated to 16 bytes
//! and split into `K1 || K2` with DES parity forced on each byte.
//! Generalizes the teacher's free functions `derive_keys`/`derive_key`
//! (and `seed_from_mrz`, kept here as [`seed_from_mrz_line`]) so BAC and
//! any future Secure Messaging re-keying share one implementation.

use super::tdes::set_parity_bits;
use sha1::{Digest, Sha1};

pub const ENC_COUNTER: u32 = 1;
pub const MAC_COUNTER: u32 = 2;

/// `KDF(seed, counter)`.
pub fn derive_key(seed: &[u8; 16], counter: u32) -> [u8; 16] {
    let mut hasher = Sha1::new();
    hasher.update(seed);
    hasher.update(counter.to_be_bytes());
    let hash = hasher.finalize();
    let mut key: [u8; 16] = hash[0..16].try_into().unwrap();
    set_parity_bits(&mut key);
    key
}

/// `DeriveKey.desEDE(seed)` / `DeriveKey.iso9797MacAlg3(seed)` as a pair.
pub fn derive_keys(seed: &[u8; 16]) -> ([u8; 16], [u8; 16]) {
    (derive_key(seed, ENC_COUNTER), derive_key(seed, MAC_COUNTER))
}

/// The document-basic-access key seed, `SHA-1(document number || DoB || DoE)`
/// each with its ICAO check digit appended, truncated to 16 bytes.
///
/// Callers are expected to have already assembled the single MRZ
/// concatenation (document number + check digit, date of birth + check
/// digit, date of expiry + check digit) — this just hashes it, matching
/// the teacher's `seed_from_mrz`.
pub fn seed_from_mrz_line(mrz_concat: &str) -> [u8; 16] {
    let mut hasher = Sha1::new();
    hasher.update(mrz_concat.as_bytes());
    let hash = hasher.finalize();
    hash[0..16].try_into().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    /// ICAO 9303-11 Appendix D.2 worked example.
    #[test]
    fn test_bac_example() {
        let mrz = "L898902C<369080619406236";
        let seed = seed_from_mrz_line(mrz);
        assert_eq!(seed, hex!("239AB9CB282DAF66231DC5A4DF6BFBAE"));

        let (kenc, kmac) = derive_keys(&seed);
        assert_eq!(kenc, hex!("AB94FDECF2674FDFB9B391F85D7F76F2"));
        assert_eq!(kmac, hex!("7962D9ECE03D1ACD4C76089DCE131543"));
    }

    #[test]
    fn test_derive_session_keys() {
        let k_seed = hex!("0036D272F5C350ACAC50C3F572D23600");
        let (ksenc, ksmac) = derive_keys(&k_seed);
        assert_eq!(ksenc, hex!("979EC13B1CBFE9DCD01AB0FED307EAE5"));
        assert_eq!(ksmac, hex!("F1CB1F1FB5ADF208806B89DC579DC1F8"));
    }
}
