#![forbid(unsafe_code)]

//! Private keys and X.509 certificates for the valv PKCS#12 codec.
//!
//! Key bags carry one of the closed set of [`PrivateKey`] kinds; certificate
//! bags carry [`Certificate`]s. The [`loader`] module reads both from PEM or
//! DER files.

pub mod key;
pub mod loader;
pub mod x509;

pub use key::{GostKey, KeyKind, PrivateKey};
pub use x509::Certificate;
