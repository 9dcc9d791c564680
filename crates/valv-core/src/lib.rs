#![forbid(unsafe_code)]

//! Shared error type and algorithm identifiers for the valv PKCS#12 codec.

pub mod algorithm;
pub mod error;

pub use error::{Error, Result};
