#![forbid(unsafe_code)]

//! Umbrella crate re-exporting the valv workspace.

pub use valv_core as core;
pub use valv_crypto as crypto;
pub use valv_keys as keys;
pub use valv_pkcs12 as pkcs12;
