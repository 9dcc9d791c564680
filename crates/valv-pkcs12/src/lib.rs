#![forbid(unsafe_code)]

//! PKCS#12 (RFC 7292) container codec with PBMAC1 (RFC 9579) and CMS
//! enveloped certificate protection.
//!
//! [`Pkcs12`] is the full container model. The free functions below cover
//! the common single-key and trust-store shapes.
//!
//! ```no_run
//! # fn main() -> valv_core::Result<()> {
//! let der = std::fs::read("client.p12")?;
//! let (key, cert, chain) = valv_pkcs12::decode_chain(&der, "secret")?;
//! println!("{} with {} CA certificates", cert.subject(), chain.len());
//! # let _ = key;
//! # Ok(())
//! # }
//! ```

pub mod asn1;
pub mod attributes;
pub mod bags;
pub mod container;
pub mod envelope;
pub mod mac;
pub mod opts;
pub mod pbe;
pub mod pbes2;

pub use self::attributes::BagAttributes;
pub use self::bags::CertValue;
pub use self::container::{Decoder, Pkcs12, TrustStoreEntry};
pub use self::envelope::{EnvelopedOpts, RecipientKey};
pub use self::mac::{MacOpts, MacScheme};
pub use self::opts::{CertProtection, Opts};
pub use self::pbe::{LegacyPbe, Pbes1, PbeChoice};
pub use self::pbes2::{KdfChoice, KdfOpts};

use rand_core::CryptoRngCore;
use valv_core::Error;
use valv_keys::{Certificate, PrivateKey};

/// Decode a container holding one private key and its certificate.
///
/// A container without either is `Error::MissingEntry`.
pub fn decode(der: &[u8], password: &str) -> Result<(PrivateKey, Certificate), Error> {
    let (key, cert, _) = decode_chain(der, password)?;
    Ok((key, cert))
}

/// Like [`decode`], also returning the CA certificates.
pub fn decode_chain(
    der: &[u8],
    password: &str,
) -> Result<(PrivateKey, Certificate, Vec<Certificate>), Error> {
    let p12 = Pkcs12::parse(der, password)?;
    let key = p12
        .private_key()
        .cloned()
        .ok_or_else(|| Error::MissingEntry("container has no private key".into()))?;
    let cert = p12
        .cert()
        .cloned()
        .ok_or_else(|| Error::MissingEntry("container has no end-entity certificate".into()))?;
    Ok((key, cert, p12.ca_certs().to_vec()))
}

/// Decode a Java-style trust store.
pub fn decode_trust_store(der: &[u8], password: &str) -> Result<Vec<Certificate>, Error> {
    let p12 = Pkcs12::parse(der, password)?;
    Ok(p12.trust_stores().cloned().collect())
}

/// Decode a container holding a secret key.
pub fn decode_secret(der: &[u8], password: &str) -> Result<Vec<u8>, Error> {
    Pkcs12::parse(der, password)?
        .secret_key()
        .map(<[u8]>::to_vec)
        .ok_or_else(|| Error::MissingEntry("container has no secret key".into()))
}

pub fn encode(
    rng: &mut dyn CryptoRngCore,
    key: PrivateKey,
    cert: Certificate,
    ca_certs: Vec<Certificate>,
    password: &str,
    opts: &Opts,
) -> Result<Vec<u8>, Error> {
    Pkcs12::new()
        .add_private_key(key)
        .add_cert(cert)
        .add_ca_certs(ca_certs)
        .marshal(rng, password, opts)
}

pub fn encode_trust_store(
    rng: &mut dyn CryptoRngCore,
    entries: Vec<TrustStoreEntry>,
    password: &str,
    opts: &Opts,
) -> Result<Vec<u8>, Error> {
    Pkcs12::new()
        .add_trust_store_entries(entries)
        .marshal(rng, password, opts)
}

pub fn encode_secret(
    rng: &mut dyn CryptoRngCore,
    secret: &[u8],
    password: &str,
    opts: &Opts,
) -> Result<Vec<u8>, Error> {
    Pkcs12::new()
        .add_secret_key(secret)
        .marshal(rng, password, opts)
}
