//! ISO/IEC 7816-4 command/response stack and ICAO 9303 Basic Access
//! Control / Secure Messaging core for reading eMRTDs over a contactless
//! smartcard link.
//!
//! Layered leaves-first, matching spec §2:
//! [`apdu`] (command/response codec) → [`status`] (status word
//! catalogue) → [`crypto`] (DES/3DES, MAC alg 3, KDF) →
//! [`secure_messaging`] (the SM engine) → [`icc`] (command primitives
//! over an optional SM session) → [`bac`] (the BAC handshake) →
//! [`mrtd`] (the chunked, fault-tolerant file reader) → [`passport`]
//! (the typed façade). [`transport`] is the seam every layer above it is
//! parameterized over.

#![allow(dead_code)]

pub mod apdu;
pub mod bac;
pub mod crypto;
pub mod error;
pub mod file;
pub mod icc;
pub mod mrtd;
pub mod passport;
pub mod secure_messaging;
pub mod status;
pub mod transport;

#[cfg(feature = "proxmark3")]
pub mod nfc;
