#![forbid(unsafe_code)]

//! Cryptographic building blocks for the valv PKCS#12 codec.
//!
//! Provides the digest/KDF and cipher registries, the password-based key
//! derivations PKCS#12 relies on, and RSA key transport for enveloped data.
//! Primitive algorithms come from the RustCrypto crates.

pub mod cipher;
pub mod digest;
pub mod kdf;
pub mod keytransport;
pub mod registry;

pub use self::cipher::Cipher;
pub use self::digest::HashAlgorithm;
pub use keytransport::{KeyEncryption, KeyTransportAlgorithm, OaepParams};
pub use registry::{AlgorithmRegistry, RegistryBuilder};
