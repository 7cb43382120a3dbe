//! DES / 3DES-CBC and the ISO/IEC 9797-1 MAC algorithm 3 ("retail MAC").
//!
//! Generalizes the teacher's `tdes` module (`enc_3des`, `dec_3des`,
//! `mac_3des`, `set_parity_bits`), adding an explicit IV parameter and an
//! ISO/IEC 7816-4 padding toggle instead of hardcoding both inline at each
//! call site the way `main.rs`'s `enc_apdu` did.

use cbc::{Decryptor, Encryptor};
use cipher::{
    block_padding::{Iso7816, NoPadding},
    BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit,
};
use des::{Des, TdesEde2};

pub const BLOCK_SIZE: usize = 8;
pub const KEY_SIZE: usize = 16;

/// Whether to apply ISO/IEC 7816-4 padding (append `0x80` then `0x00`* to
/// the next 8-byte boundary) before encrypting, or require the input to
/// already be block-aligned.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Padding {
    Iso7816,
    None,
}

/// 3DES-CBC encrypt under a 16-byte key (`K1 || K2`, EDE: encrypt-K1,
/// decrypt-K2, encrypt-K1) with a caller-supplied 8-byte IV.
pub fn tdes_cbc_encrypt(key: &[u8; KEY_SIZE], iv: &[u8; BLOCK_SIZE], data: &[u8], padding: Padding) -> Vec<u8> {
    let key24 = expand_to_three_key(key);
    let enc = Encryptor::<TdesEde2>::new_from_slices(&key24, iv).expect("valid key/iv length");
    match padding {
        Padding::Iso7816 => enc.encrypt_padded_vec_mut::<Iso7816>(data),
        Padding::None => {
            assert_eq!(data.len() % BLOCK_SIZE, 0, "unpadded input must be block-aligned");
            enc.encrypt_padded_vec_mut::<NoPadding>(data)
        }
    }
}

/// 3DES-CBC decrypt; the inverse of [`tdes_cbc_encrypt`]. Panics if padding
/// is requested and the trailing padding is malformed — a cryptographic
/// failure here is always fatal to the calling session, never recoverable.
pub fn tdes_cbc_decrypt(key: &[u8; KEY_SIZE], iv: &[u8; BLOCK_SIZE], data: &[u8], padding: Padding) -> Vec<u8> {
    let key24 = expand_to_three_key(key);
    let dec = Decryptor::<TdesEde2>::new_from_slices(&key24, iv).expect("valid key/iv length");
    match padding {
        Padding::Iso7816 => dec
            .decrypt_padded_vec_mut::<Iso7816>(data)
            .expect("malformed ISO/IEC 7816-4 padding"),
        Padding::None => dec
            .decrypt_padded_vec_mut::<NoPadding>(data)
            .expect("unreachable: NoPadding never rejects"),
    }
}

/// `des` / `cbc`'s `TdesEde2` expects the 24-byte 3-key form `K1 || K2 ||
/// K1`; the ICAO BAC profile only ever uses 2-key (16-byte) material.
fn expand_to_three_key(key16: &[u8; KEY_SIZE]) -> [u8; 24] {
    let mut out = [0u8; 24];
    out[0..16].copy_from_slice(key16);
    out[16..24].copy_from_slice(&key16[0..8]);
    out
}

/// ISO/IEC 9797-1 MAC algorithm 3 ("retail MAC"): single-DES CBC-MAC under
/// `K1`, with the final block transformed as
/// `DES_ENC(K1, DES_DEC(K2, X))`. `padding` mirrors [`Padding`]; without
/// padding the input must already be block-aligned.
pub fn mac3(key: &[u8; KEY_SIZE], data: &[u8], padding: Padding) -> [u8; 8] {
    let k1: [u8; 8] = key[0..8].try_into().unwrap();
    let k2: [u8; 8] = key[8..16].try_into().unwrap();

    let padded = match padding {
        Padding::Iso7816 => iso7816_pad(data),
        Padding::None => {
            assert_eq!(data.len() % BLOCK_SIZE, 0, "unpadded MAC input must be block-aligned");
            data.to_vec()
        }
    };

    let cipher_k1 = Des::new_from_slice(&k1).expect("8-byte key");
    let cipher_k2 = Des::new_from_slice(&k2).expect("8-byte key");

    let mut x = [0u8; 8];
    for block in padded.chunks_exact(BLOCK_SIZE) {
        for i in 0..8 {
            x[i] ^= block[i];
        }
        x = des_encrypt_block(&cipher_k1, x);
    }

    let y = des_decrypt_block(&cipher_k2, x);
    des_encrypt_block(&cipher_k1, y)
}

fn des_encrypt_block(cipher: &Des, block: [u8; 8]) -> [u8; 8] {
    use cipher::BlockEncrypt;
    let mut b = block.into();
    cipher.encrypt_block(&mut b);
    b.into()
}

fn des_decrypt_block(cipher: &Des, block: [u8; 8]) -> [u8; 8] {
    use cipher::BlockDecrypt;
    let mut b = block.into();
    cipher.decrypt_block(&mut b);
    b.into()
}

fn iso7816_pad(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    out.push(0x80);
    while out.len() % BLOCK_SIZE != 0 {
        out.push(0x00);
    }
    out
}

/// Strip ISO/IEC 7816-4 padding, locating the last non-zero byte and
/// requiring it to be `0x80`.
pub fn iso7816_unpad(data: &[u8]) -> Option<&[u8]> {
    let last_nonzero = data.iter().rposition(|&b| b != 0x00)?;
    if data[last_nonzero] == 0x80 {
        Some(&data[..last_nonzero])
    } else {
        None
    }
}

/// Force odd parity on each byte of a DES/3DES key, as the teacher's
/// `set_parity_bits` does for keys derived from the ICAO KDF.
pub fn set_parity_bits(key: &mut [u8]) {
    for byte in key.iter_mut() {
        let ones = byte.count_ones();
        if ones % 2 == 0 {
            *byte ^= 0x01;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn bac_worked_example_eifd() {
        // ICAO 9303-11 Appendix D.2
        let kenc = hex!("AB94FDECF2674FDFB9B391F85D7F76F2");
        let rnd_ifd = hex!("781723860C06C226");
        let rnd_ic = hex!("4608F91988702212");
        let k_ifd = hex!("0B795240CB7049B01C19B33E32804F0B");

        let mut s = vec![];
        s.extend_from_slice(&rnd_ifd);
        s.extend_from_slice(&rnd_ic);
        s.extend_from_slice(&k_ifd);

        let e_ifd = tdes_cbc_encrypt(&kenc, &[0; 8], &s, Padding::None);
        assert_eq!(
            e_ifd,
            hex!("72C29C2371CC9BDB65B779B8E8D37B29ECC154AA56A8799FAE2F498F76ED92F2")
        );
    }

    #[test]
    fn bac_worked_example_mifd() {
        let kmac = hex!("7962D9ECE03D1ACD4C76089DCE131543");
        let e_ifd = hex!("72C29C2371CC9BDB65B779B8E8D37B29ECC154AA56A8799FAE2F498F76ED92F2");
        let m_ifd = mac3(&kmac, &e_ifd, Padding::Iso7816);
        assert_eq!(m_ifd, hex!("5F1448EEA8AD90A7"));
    }

    #[test]
    fn mac3_with_padding_matches_block_aligned_equivalent() {
        let key = hex!("0123456789ABCDEF23456789ABCDEF01");
        let msg = b"abcdefg";
        let mut padded = msg.to_vec();
        padded.push(0x80);
        while padded.len() % 8 != 0 {
            padded.push(0x00);
        }
        assert_eq!(
            mac3(&key, msg, Padding::Iso7816),
            mac3(&key, &padded, Padding::None)
        );
    }

    #[test]
    fn iso7816_pad_round_trips() {
        let data = b"hello world!";
        let padded = iso7816_pad(data);
        assert_eq!(padded.len() % BLOCK_SIZE, 0);
        assert_eq!(iso7816_unpad(&padded), Some(&data[..]));
    }

    #[test]
    fn set_parity_bits_makes_every_byte_odd() {
        let mut key = [0u8; 16];
        set_parity_bits(&mut key);
        for byte in key {
            assert_eq!(byte.count_ones() % 2, 1);
        }
    }
}
