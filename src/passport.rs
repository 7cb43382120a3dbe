//! Passport façade — spec §4.7.
//!
//! One typed operation per EF, each guaranteeing the correct DF is
//! selected before its first read and folding lower-layer errors into a
//! single [`PassportError`]. Generalizes the teacher's top-level
//! `Icao9303` convenience methods (`select_master_file`,
//! `read_elementary_file`, ...), which mixed file selection and reading
//! into one call with no DF-tracking invariant.

use crate::{
    bac::{perform as perform_bac, DbaKeys},
    error::PassportError,
    file,
    icc::Icc,
    mrtd::read_file_by_sfi,
    transport::Transport,
};

const EMRTD_AID: [u8; 7] = [0xA0, 0x00, 0x00, 0x02, 0x47, 0x10, 0x01];

/// Which dedicated file, if any, is currently selected. Tracked so every
/// Data Group / EF.COM / EF.SOD read can cheaply no-op a redundant
/// `SELECT FILE` instead of reissuing it on every call.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum SelectedDf {
    None,
    MasterFile,
    EMrtdApplication,
}

pub struct Passport<T: Transport> {
    icc: Icc<T>,
    df: SelectedDf,
    dba_keys: Option<DbaKeys>,
}

impl<T: Transport> Passport<T> {
    pub fn new(transport: T) -> Self {
        Self {
            icc: Icc::new(transport),
            df: SelectedDf::None,
            dba_keys: None,
        }
    }

    pub fn connect(&mut self) -> Result<(), PassportError> {
        self.df = SelectedDf::None;
        self.icc.connect().map_err(PassportError::from)
    }

    pub fn disconnect(&mut self) -> Result<(), PassportError> {
        self.df = SelectedDf::None;
        self.icc.disconnect().map_err(PassportError::from)
    }

    /// Runs BAC and installs the resulting Secure Messaging session.
    /// Remembers the DBA keys so the read loop's re-init seam can rebuild
    /// the session later without the caller supplying them again.
    pub fn start_session_bac(&mut self, keys: DbaKeys) -> Result<(), PassportError> {
        let sm = perform_bac(&mut self.icc, &keys).map_err(|e| PassportError::new(e.to_string()))?;
        self.icc.install_secure_messaging(sm);
        self.dba_keys = Some(keys);
        Ok(())
    }

    pub fn select_master_file(&mut self) -> Result<(), PassportError> {
        if self.df == SelectedDf::MasterFile {
            return Ok(());
        }
        self.icc.select_master_file()?;
        self.df = SelectedDf::MasterFile;
        Ok(())
    }

    pub fn select_emrtd_application(&mut self) -> Result<(), PassportError> {
        if self.df == SelectedDf::EMrtdApplication {
            return Ok(());
        }
        self.icc.select_dedicated_file(&EMRTD_AID)?;
        self.df = SelectedDf::EMrtdApplication;
        Ok(())
    }

    fn reinit_session(&self) -> Option<DbaKeys> {
        self.dba_keys
    }

    /// Reads one Data Group (`n` in `1..=16`) by its SFI, with SM re-init
    /// wired to redo BAC from the remembered DBA keys on a recoverable
    /// read-loop error.
    pub fn read_dg(&mut self, n: u8) -> Result<Vec<u8>, PassportError> {
        self.select_emrtd_application()?;
        let sfi = file::dg_sfi(n).ok_or_else(|| PassportError::new(format!("DG{n} out of range 1..=16")))?;
        self.read_with_reinit(sfi)
    }

    pub fn read_com(&mut self) -> Result<Vec<u8>, PassportError> {
        self.select_emrtd_application()?;
        self.read_with_reinit(file::SFI_COM)
    }

    pub fn read_sod(&mut self) -> Result<Vec<u8>, PassportError> {
        self.select_emrtd_application()?;
        self.read_with_reinit(file::SFI_SOD)
    }

    /// EF.CardAccess is read by SFI under MF semantics (spec §4.7);
    /// present iff PACE is supported. `select_master_file` is idempotent,
    /// so this is a no-op once the MF is already selected.
    pub fn read_card_access(&mut self) -> Result<Vec<u8>, PassportError> {
        self.select_master_file()?;
        self.read_with_reinit(file::SFI_CARD_ACCESS)
    }

    pub fn read_card_security(&mut self) -> Result<Vec<u8>, PassportError> {
        self.select_master_file()?;
        self.read_with_reinit(file::SFI_CARD_SECURITY)
    }

    fn read_with_reinit(&mut self, sfi: u8) -> Result<Vec<u8>, PassportError> {
        let dba_keys = self.reinit_session();
        let icc = &mut self.icc;

        let result = match dba_keys {
            Some(keys) => {
                let mut reinit = move |icc: &mut Icc<T>| -> Result<(), crate::error::IccError> {
                    let sm = perform_bac(icc, &keys)
                        .map_err(|e| crate::error::IccError::new(e.to_string(), crate::status::StatusWord::Other(0)))?;
                    icc.install_secure_messaging(sm);
                    Ok(())
                };
                read_file_by_sfi(icc, sfi, Some(&mut reinit))
            }
            None => read_file_by_sfi(icc, sfi, None),
        };

        result.map_err(PassportError::from)
    }

    /// Convenience used by the demo binary and by future pass-through
    /// Active Authentication callers; not named explicitly in spec §4.4
    /// as a façade operation but exposed here so callers never need to
    /// reach into the ICC layer directly.
    pub fn internal_authenticate(&mut self, challenge: &[u8]) -> Result<Vec<u8>, PassportError> {
        self.icc.internal_authenticate(challenge).map_err(PassportError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    #[test]
    fn read_card_access_selects_master_file_first() {
        let value = vec![0x31, 0x03, 0x02, 0x01, 0x00];
        let mut full = vec![0x60, value.len() as u8];
        full.extend_from_slice(&value);

        let mut transport = MockTransport::new(move |apdu: &[u8]| {
            if apdu[1] == 0xA4 {
                assert_eq!(apdu, hex::decode("00A4000C023F00").unwrap(), "expects SELECT FILE for the MF");
                return Ok(vec![0x90, 0x00]);
            }
            assert_eq!(apdu[2] & 0x80, 0x80, "expects READ BINARY by SFI");
            let mut out = full.clone();
            out.extend_from_slice(&[0x90, 0x00]);
            Ok(out)
        });
        transport.connect(None).unwrap();
        let mut passport = Passport::new(transport);
        passport.connect().unwrap();

        let bytes = passport.read_card_access().unwrap();
        assert_eq!(bytes, {
            let mut full = vec![0x60, value.len() as u8];
            full.extend_from_slice(&value);
            full
        });
    }

    #[test]
    fn read_card_access_only_selects_master_file_once() {
        let mut select_calls = 0u32;
        let mut transport = MockTransport::new(move |apdu: &[u8]| {
            if apdu[1] == 0xA4 {
                select_calls += 1;
                assert_eq!(select_calls, 1, "select master file should be idempotent");
                return Ok(vec![0x90, 0x00]);
            }
            Ok(vec![0x60, 0x00, 0x90, 0x00])
        });
        transport.connect(None).unwrap();
        let mut passport = Passport::new(transport);
        passport.connect().unwrap();

        passport.read_card_access().unwrap();
        passport.read_card_security().unwrap();
    }

    #[test]
    fn select_emrtd_application_is_idempotent() {
        let mut select_calls = 0u32;
        let mut transport = MockTransport::new(move |apdu: &[u8]| {
            if apdu[1] == 0xA4 {
                select_calls += 1;
            }
            Ok(vec![0x90, 0x00])
        });
        transport.connect(None).unwrap();
        let mut passport = Passport::new(transport);
        passport.connect().unwrap();

        passport.select_emrtd_application().unwrap();
        passport.select_emrtd_application().unwrap();
        // Selection is only issued once; the second call is a no-op.
    }

    #[test]
    fn remaps_card_specific_security_status_on_select() {
        let mut transport = MockTransport::new(|apdu: &[u8]| {
            if apdu[1] == 0xA4 {
                return Ok(vec![0x63, 0xCF]);
            }
            Ok(vec![0x90, 0x00])
        });
        transport.connect(None).unwrap();
        let mut passport = Passport::new(transport);
        passport.connect().unwrap();

        let err = passport.select_emrtd_application().unwrap_err();
        assert_eq!(err.status, Some(crate::status::StatusWord::SecurityStatusNotSatisfied));
    }
}
