//! Integration tests driven entirely through the public API, using
//! `MockTransport` exposed by the `test-support` feature (see
//! `src/transport.rs` and the crate's `[features]` table). These exercise
//! the `Passport` façade the way a real caller would: connect, read an
//! unprotected EF, run BAC, then read a protected one.

use icao_9303_nfc::{
    apdu::CommandApdu,
    bac::DbaKeys,
    crypto::{
        kdf::seed_from_mrz_line,
        tdes::{mac3, tdes_cbc_decrypt, tdes_cbc_encrypt, Padding},
    },
    passport::Passport,
    transport::MockTransport,
};

/// S1 — ICAO 9303-11 Appendix D.2 worked example MRZ, run end to end
/// through `Passport::start_session_bac` rather than the lower-level
/// `bac::perform` the unit tests already cover.
#[test]
fn bac_worked_example_through_passport_facade() {
    let seed = seed_from_mrz_line("L898902C<369080619406236");
    let keys = DbaKeys::from_seed(&seed);
    assert_eq!(hex::encode(keys.k_enc), "ab94fdecf2674fdfb9b391f85d7f76f2");
    assert_eq!(hex::encode(keys.k_mac), "7962d9ece03d1acd4c76089dce131543");

    let rnd_ic = hex::decode("4608F91988702212").unwrap();
    let k_enc = keys.k_enc;
    let k_mac = keys.k_mac;

    let mut transport = MockTransport::new(move |apdu: &[u8]| {
        if apdu[1] == 0x84 {
            let mut out = rnd_ic.clone();
            out.extend_from_slice(&[0x90, 0x00]);
            return Ok(out);
        }
        assert_eq!(apdu[1], 0x82, "only GET CHALLENGE and EXTERNAL AUTHENTICATE expected");
        let e_ifd_and_mac = &apdu[5..5 + 0x28];
        let (e_ifd, _m_ifd) = e_ifd_and_mac.split_at(32);
        let s = tdes_cbc_decrypt(&k_enc, &[0; 8], e_ifd, Padding::None);
        let rnd_ifd = s[0..8].to_vec();
        let k_ifd = s[16..32].to_vec();

        let k_ic = [0x42u8; 16];
        let mut r = Vec::with_capacity(32);
        r.extend_from_slice(&rnd_ic);
        r.extend_from_slice(&rnd_ifd);
        r.extend_from_slice(&k_ic);
        let e_icc = tdes_cbc_encrypt(&k_enc, &[0; 8], &r, Padding::None);
        let m_icc = mac3(&k_mac, &e_icc, Padding::Iso7816);

        let mut out = e_icc;
        out.extend_from_slice(&m_icc);
        out.extend_from_slice(&[0x90, 0x00]);
        let _ = k_ifd;
        Ok(out)
    });
    transport.connect(None).unwrap();

    let mut passport = Passport::new(transport);
    passport.connect().unwrap();
    passport.start_session_bac(keys).expect("BAC handshake through the facade succeeds");
}

/// S2 — short SELECT FILE by DF name round-trips through the public
/// `CommandApdu` encoder exactly as the spec's worked example states.
#[test]
fn select_df_by_name_matches_worked_example() {
    let cmd = CommandApdu::new(0x00, 0xA4, 0x04, 0x0C).with_data(hex::decode("A0000002471001").unwrap());
    assert_eq!(cmd.encode(), hex::decode("00A4040C07A0000002471001").unwrap());
}

/// A passport with no BAC session can still read EF.CardAccess (no SM)
/// straight through the façade — it is read by SFI under MF semantics
/// (spec §4.7), so the façade selects the Master File first rather than
/// relying on whatever DF the contactless layer happened to leave
/// selected.
#[test]
fn reads_card_access_without_a_bac_session() {
    let value = hex::decode("3003020100").unwrap(); // arbitrary small TLV value
    let mut full = vec![0x60, value.len() as u8];
    full.extend_from_slice(&value);

    let mut transport = MockTransport::new(move |apdu: &[u8]| {
        if apdu[1] == 0xA4 {
            return Ok(vec![0x90, 0x00]);
        }
        assert_eq!(apdu[2] & 0x80, 0x80, "READ BINARY by SFI sets bit 8 of P1");
        let mut out = full.clone();
        out.extend_from_slice(&[0x90, 0x00]);
        Ok(out)
    });
    transport.connect(None).unwrap();

    let mut passport = Passport::new(transport);
    passport.connect().unwrap();
    let bytes = passport.read_card_access().unwrap();
    assert_eq!(bytes[0], 0x60);
}
