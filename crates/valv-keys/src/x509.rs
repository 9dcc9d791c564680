#![forbid(unsafe_code)]

//! X.509 certificates as carried in certificate bags.
//!
//! A [`Certificate`] keeps the exact DER it was parsed from, so a container
//! re-emits certificates byte-for-byte, alongside the decoded structure
//! used for recipient matching and display.

use der::{Decode, Encode};
use pkcs8::DecodePublicKey;
use valv_core::Error;

/// A parsed X.509 certificate together with its original encoding.
#[derive(Clone)]
pub struct Certificate {
    der: Vec<u8>,
    inner: x509_cert::Certificate,
}

impl Certificate {
    pub fn from_der(der: &[u8]) -> Result<Self, Error> {
        let inner = x509_cert::Certificate::from_der(der)
            .map_err(|e| Error::Certificate(format!("failed to parse certificate: {e}")))?;
        Ok(Self {
            der: der.to_vec(),
            inner,
        })
    }

    /// Parse a single `CERTIFICATE` PEM block.
    pub fn from_pem(pem: &[u8]) -> Result<Self, Error> {
        let text = std::str::from_utf8(pem)
            .map_err(|e| Error::Certificate(format!("invalid PEM encoding: {e}")))?;
        let (label, der) = pem_rfc7468::decode_vec(text.trim().as_bytes())
            .map_err(|e| Error::Certificate(format!("failed to decode certificate PEM: {e}")))?;
        if label != "CERTIFICATE" {
            return Err(Error::Certificate(format!(
                "expected CERTIFICATE PEM label, got: {label}"
            )));
        }
        Self::from_der(&der)
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn into_der(self) -> Vec<u8> {
        self.der
    }

    pub fn subject(&self) -> String {
        self.inner.tbs_certificate.subject.to_string()
    }

    pub fn issuer(&self) -> String {
        self.inner.tbs_certificate.issuer.to_string()
    }

    /// Big-endian serial number bytes.
    pub fn serial_number(&self) -> &[u8] {
        self.inner.tbs_certificate.serial_number.as_bytes()
    }

    /// DER of the issuer `Name`.
    pub fn issuer_der(&self) -> Result<Vec<u8>, Error> {
        self.inner
            .tbs_certificate
            .issuer
            .to_der()
            .map_err(|e| Error::Certificate(format!("failed to encode issuer: {e}")))
    }

    /// DER of the serial number `INTEGER`.
    pub fn serial_der(&self) -> Result<Vec<u8>, Error> {
        self.inner
            .tbs_certificate
            .serial_number
            .to_der()
            .map_err(|e| Error::Certificate(format!("failed to encode serial number: {e}")))
    }

    /// The subject public key, when it is an RSA key.
    pub fn rsa_public_key(&self) -> Result<rsa::RsaPublicKey, Error> {
        let spki = self
            .inner
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| Error::Certificate(format!("failed to encode public key: {e}")))?;
        rsa::RsaPublicKey::from_public_key_der(&spki)
            .map_err(|e| Error::Key(format!("certificate does not hold an RSA key: {e}")))
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject())
            .field("issuer", &self.issuer())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CERT_DER: &[u8] = include_bytes!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../test-data/pkcs12/cert.der"
    ));
    const CERT_PEM: &[u8] = include_bytes!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../test-data/pkcs12/cert.pem"
    ));

    #[test]
    fn test_parse_der_and_pem() {
        let cert = Certificate::from_der(CERT_DER).unwrap();
        assert_eq!(cert.der(), CERT_DER);
        assert_eq!(cert.subject(), "CN=valv test leaf");
        assert_eq!(cert.issuer(), "CN=valv test leaf");
        assert_eq!(Certificate::from_pem(CERT_PEM).unwrap(), cert);
    }

    #[test]
    fn test_issuer_and_serial() {
        let cert = Certificate::from_der(CERT_DER).unwrap();
        let serial = cert.serial_der().unwrap();
        assert_eq!(serial[0], 0x02);
        assert!(serial.ends_with(cert.serial_number()));
        assert_eq!(cert.issuer_der().unwrap()[0], 0x30);
    }

    #[test]
    fn test_rsa_public_key() {
        use rsa::traits::PublicKeyParts;
        let cert = Certificate::from_der(CERT_DER).unwrap();
        assert_eq!(cert.rsa_public_key().unwrap().size(), 256);
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            Certificate::from_der(&[0x30, 0x00]),
            Err(Error::Certificate(_))
        ));
    }
}
