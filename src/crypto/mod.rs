//! Crypto primitives: single-DES/3DES-CBC, ISO/IEC 9797-1 MAC alg 3, the
//! ICAO KDF, and secure random bytes.

pub mod kdf;
pub mod tdes;

use rand::RngCore;

/// Cryptographically secure random bytes, used for `RND.IFD`/`K.IFD` in
/// the BAC handshake.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}
