#![forbid(unsafe_code)]

//! Private key kinds carried inside PKCS#12 key bags.
//!
//! The set of key algorithms is closed: a key bag holds PKCS#8
//! `PrivateKeyInfo` DER, and [`PrivateKey::from_pkcs8_der`] dispatches on
//! its algorithm OID. Anything outside the enum is reported as an
//! unsupported algorithm.

use pkcs8::der::Decode;
use pkcs8::{DecodePrivateKey, EncodePrivateKey};
use valv_core::{algorithm, Error};

/// Algorithm family of a [`PrivateKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Rsa,
    Dsa,
    EcP256,
    EcP384,
    EcP521,
    Ed25519,
    Sm2,
    Gost2012_256,
    Gost2012_512,
}

impl KeyKind {
    pub const ALL: [Self; 9] = [
        Self::Rsa,
        Self::Dsa,
        Self::EcP256,
        Self::EcP384,
        Self::EcP521,
        Self::Ed25519,
        Self::Sm2,
        Self::Gost2012_256,
        Self::Gost2012_512,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Rsa => "RSA",
            Self::Dsa => "DSA",
            Self::EcP256 => "EC P-256",
            Self::EcP384 => "EC P-384",
            Self::EcP521 => "EC P-521",
            Self::Ed25519 => "Ed25519",
            Self::Sm2 => "SM2",
            Self::Gost2012_256 => "GOST R 34.10-2012 (256)",
            Self::Gost2012_512 => "GOST R 34.10-2012 (512)",
        }
    }
}

impl std::fmt::Display for KeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// GOST R 34.10-2012 key kept as validated PKCS#8 DER.
///
/// No GOST arithmetic is available, so the key is transported opaquely.
#[derive(Clone, PartialEq, Eq)]
pub struct GostKey {
    kind: KeyKind,
    pkcs8: Vec<u8>,
}

impl GostKey {
    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn pkcs8_der(&self) -> &[u8] {
        &self.pkcs8
    }
}

/// A private key of one of the supported kinds.
#[derive(Clone)]
pub enum PrivateKey {
    Rsa(rsa::RsaPrivateKey),
    Dsa(dsa::SigningKey),
    EcP256(p256::SecretKey),
    EcP384(p384::SecretKey),
    EcP521(p521::SecretKey),
    Ed25519(ed25519_dalek::SigningKey),
    Sm2(sm2::SecretKey),
    Gost(GostKey),
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rsa(k) => {
                use rsa::traits::PublicKeyParts;
                write!(f, "RSA private key ({} bits)", k.size() * 8)
            }
            other => write!(f, "{} private key", other.kind()),
        }
    }
}

impl PrivateKey {
    pub fn kind(&self) -> KeyKind {
        match self {
            Self::Rsa(_) => KeyKind::Rsa,
            Self::Dsa(_) => KeyKind::Dsa,
            Self::EcP256(_) => KeyKind::EcP256,
            Self::EcP384(_) => KeyKind::EcP384,
            Self::EcP521(_) => KeyKind::EcP521,
            Self::Ed25519(_) => KeyKind::Ed25519,
            Self::Sm2(_) => KeyKind::Sm2,
            Self::Gost(k) => k.kind,
        }
    }

    /// Parse a PKCS#8 `PrivateKeyInfo`, dispatching on its algorithm OID.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, Error> {
        let (oid, param) = pkcs8_algorithm(der)?;
        let key_err = |e: &dyn std::fmt::Display| {
            Error::Key(format!("failed to parse PKCS#8 private key: {e}"))
        };

        let key = match oid.as_slice() {
            o if o == algorithm::RSA_ENCRYPTION => {
                Self::Rsa(rsa::RsaPrivateKey::from_pkcs8_der(der).map_err(|e| key_err(&e))?)
            }
            o if o == algorithm::DSA => {
                let info = pkcs8::PrivateKeyInfo::from_der(der).map_err(|e| key_err(&e))?;
                Self::Dsa(dsa::SigningKey::try_from(info).map_err(|e| key_err(&e))?)
            }
            o if o == algorithm::EC_PUBLIC_KEY => {
                let curve = param.ok_or_else(|| {
                    Error::Key("EC private key without named curve parameter".into())
                })?;
                match curve.as_slice() {
                    c if c == algorithm::SECP256R1 => Self::EcP256(
                        p256::SecretKey::from_pkcs8_der(der).map_err(|e| key_err(&e))?,
                    ),
                    c if c == algorithm::SECP384R1 => Self::EcP384(
                        p384::SecretKey::from_pkcs8_der(der).map_err(|e| key_err(&e))?,
                    ),
                    c if c == algorithm::SECP521R1 => Self::EcP521(
                        p521::SecretKey::from_pkcs8_der(der).map_err(|e| key_err(&e))?,
                    ),
                    c if c == algorithm::SM2P256V1 => {
                        Self::Sm2(sm2::SecretKey::from_pkcs8_der(der).map_err(|e| key_err(&e))?)
                    }
                    c => {
                        return Err(Error::UnsupportedAlgorithm(format!(
                            "elliptic curve {}",
                            algorithm::dotted(c)
                        )))
                    }
                }
            }
            o if o == algorithm::ED25519 => Self::Ed25519(
                ed25519_dalek::SigningKey::from_pkcs8_der(der).map_err(|e| key_err(&e))?,
            ),
            o if o == algorithm::GOST2012_256 || o == algorithm::GOST2012_512 => {
                let kind = if o == algorithm::GOST2012_256 {
                    KeyKind::Gost2012_256
                } else {
                    KeyKind::Gost2012_512
                };
                Self::Gost(GostKey {
                    kind,
                    pkcs8: der.to_vec(),
                })
            }
            o => {
                return Err(Error::UnsupportedAlgorithm(format!(
                    "private key algorithm {}",
                    algorithm::dotted(o)
                )))
            }
        };
        Ok(key)
    }

    /// Encode as PKCS#8 `PrivateKeyInfo` DER.
    pub fn to_pkcs8_der(&self) -> Result<Vec<u8>, Error> {
        let doc = match self {
            Self::Rsa(k) => k.to_pkcs8_der(),
            Self::Dsa(k) => k.to_pkcs8_der(),
            Self::EcP256(k) => k.to_pkcs8_der(),
            Self::EcP384(k) => k.to_pkcs8_der(),
            Self::EcP521(k) => k.to_pkcs8_der(),
            Self::Ed25519(k) => k.to_pkcs8_der(),
            Self::Sm2(k) => k.to_pkcs8_der(),
            Self::Gost(k) => return Ok(k.pkcs8.clone()),
        };
        doc.map(|d| d.as_bytes().to_vec()).map_err(|e| {
            Error::Key(format!("failed to encode {} private key: {e}", self.kind()))
        })
    }

    /// The RSA key, if this is one.
    pub fn as_rsa(&self) -> Option<&rsa::RsaPrivateKey> {
        match self {
            Self::Rsa(k) => Some(k),
            _ => None,
        }
    }
}

/// Algorithm OID and, when present, an OID-valued parameter (the named
/// curve for EC keys) of a `PrivateKeyInfo`.
fn pkcs8_algorithm(der: &[u8]) -> Result<(Vec<u64>, Option<Vec<u64>>), Error> {
    yasna::parse_ber(der, |r| {
        r.read_sequence(|r| {
            let _version = r.next().read_u64()?;
            let (oid, param) = r.next().read_sequence(|r| {
                let oid = r.next().read_oid()?;
                let param = r.read_optional(|r| r.read_oid())?;
                if param.is_none() {
                    // NULL, DSA domain parameters or GOST parameter sets.
                    r.read_optional(|r| r.read_der())?;
                }
                Ok((oid, param))
            })?;
            let _private_key = r.next().read_bytes()?;
            r.read_optional(|r| r.read_der())?;
            r.read_optional(|r| r.read_der())?;
            Ok((
                oid.components().to_vec(),
                param.map(|p| p.components().to_vec()),
            ))
        })
    })
    .map_err(|e| Error::malformed("PKCS#8 private key", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSA_PKCS8: &[u8] = include_bytes!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../test-data/pkcs12/key.pk8.der"
    ));

    #[test]
    fn test_rsa_from_pkcs8() {
        let key = PrivateKey::from_pkcs8_der(RSA_PKCS8).unwrap();
        assert_eq!(key.kind(), KeyKind::Rsa);
        assert!(key.as_rsa().is_some());
        assert_eq!(format!("{key:?}"), "RSA private key (2048 bits)");

        let again = PrivateKey::from_pkcs8_der(&key.to_pkcs8_der().unwrap()).unwrap();
        assert_eq!(again.as_rsa(), key.as_rsa());
    }

    #[test]
    fn test_ed25519_from_pkcs8() {
        let sk = ed25519_dalek::SigningKey::from_bytes(&[0x42; 32]);
        let der = sk.to_pkcs8_der().unwrap();
        match PrivateKey::from_pkcs8_der(der.as_bytes()).unwrap() {
            PrivateKey::Ed25519(parsed) => assert_eq!(parsed.to_bytes(), sk.to_bytes()),
            other => panic!("unexpected key: {other:?}"),
        }
    }

    #[test]
    fn test_ec_curves_from_pkcs8() {
        let p256 = p256::SecretKey::from_slice(&[0x11; 32]).unwrap();
        let der = p256.to_pkcs8_der().unwrap();
        let key = PrivateKey::from_pkcs8_der(der.as_bytes()).unwrap();
        assert_eq!(key.kind(), KeyKind::EcP256);

        let p384 = p384::SecretKey::from_slice(&[0x22; 48]).unwrap();
        let der = p384.to_pkcs8_der().unwrap();
        let key = PrivateKey::from_pkcs8_der(der.as_bytes()).unwrap();
        assert_eq!(key.kind(), KeyKind::EcP384);
        let reencoded = PrivateKey::from_pkcs8_der(&key.to_pkcs8_der().unwrap()).unwrap();
        assert_eq!(reencoded.kind(), KeyKind::EcP384);
    }

    fn gost_pkcs8(oid: &[u64]) -> Vec<u8> {
        yasna::construct_der(|w| {
            w.write_sequence(|w| {
                w.next().write_u64(0);
                w.next().write_sequence(|w| {
                    w.next().write_oid(&yasna::models::ObjectIdentifier::from_slice(oid));
                    w.next().write_sequence(|w| {
                        w.next().write_oid(&yasna::models::ObjectIdentifier::from_slice(&[
                            1, 2, 643, 7, 1, 2, 1, 1, 1,
                        ]));
                    });
                });
                w.next().write_bytes(&[0x04, 0x20, 0x01, 0x02]);
            })
        })
    }

    #[test]
    fn test_gost_kept_opaque() {
        let der = gost_pkcs8(algorithm::GOST2012_256);
        let key = PrivateKey::from_pkcs8_der(&der).unwrap();
        assert_eq!(key.kind(), KeyKind::Gost2012_256);
        assert_eq!(key.to_pkcs8_der().unwrap(), der);
    }

    #[test]
    fn test_unknown_algorithm() {
        let der = gost_pkcs8(&[1, 2, 3, 4]);
        match PrivateKey::from_pkcs8_der(&der) {
            Err(Error::UnsupportedAlgorithm(msg)) => assert!(msg.contains("1.2.3.4")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            PrivateKey::from_pkcs8_der(&[0x30, 0x03, 0x02, 0x01]),
            Err(Error::MalformedContainer(_))
        ));
    }
}
