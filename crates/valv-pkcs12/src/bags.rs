#![forbid(unsafe_code)]

//! Encoding and decoding of the individual SafeBag kinds (RFC 7292 §4.2).

use rand_core::CryptoRngCore;
use valv_core::{algorithm, Error};
use valv_crypto::AlgorithmRegistry;
use valv_keys::PrivateKey;
use yasna::models::ObjectIdentifier;
use yasna::tags::TAG_IA5STRING;
use yasna::Tag;

use crate::asn1::{EncryptedPrivateKeyInfo, SafeBag};
use crate::attributes::BagAttributes;
use crate::pbe::{self, Password, PbeChoice};
use crate::pbes2::KdfOpts;

/// The value of a certificate bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertValue {
    /// DER X.509 certificate.
    X509(Vec<u8>),
    /// Base64 SDSI certificate.
    Sdsi(String),
}

fn bag(bag_id: &[u64], value: Vec<u8>, attributes: &BagAttributes) -> SafeBag {
    SafeBag {
        bag_id: bag_id.to_vec(),
        value,
        attributes: attributes.to_attributes(),
    }
}

/// `SEQUENCE { typeId OID, value [0] EXPLICIT <inner> }`, the shape shared
/// by CertBag, CRLBag and SecretBag.
fn encode_typed_value(type_id: &[u64], inner: impl FnOnce(yasna::DERWriter)) -> Vec<u8> {
    yasna::construct_der(|w| {
        w.write_sequence(|w| {
            w.next().write_oid(&ObjectIdentifier::from_slice(type_id));
            w.next().write_tagged(Tag::context(0), inner);
        })
    })
}

fn decode_typed_value(what: &str, der: &[u8]) -> Result<(Vec<u64>, Vec<u8>), Error> {
    yasna::parse_ber(der, |r| {
        r.read_sequence(|r| {
            let type_id = r.next().read_oid()?.components().to_vec();
            let value = r.next().read_tagged(Tag::context(0), |r| r.read_der())?;
            Ok((type_id, value))
        })
    })
    .map_err(|e| Error::malformed(what, e))
}

fn read_octets(what: &str, der: &[u8]) -> Result<Vec<u8>, Error> {
    yasna::parse_ber(der, |r| r.read_bytes()).map_err(|e| Error::malformed(what, e))
}

// ── Key bags ───────────────────────────────────────────────────────────────

/// An unencrypted `keyBag` holding PKCS#8 `PrivateKeyInfo`.
pub fn encode_key_bag(key: &PrivateKey, attributes: &BagAttributes) -> Result<SafeBag, Error> {
    Ok(bag(algorithm::KEY_BAG, key.to_pkcs8_der()?, attributes))
}

/// A `pkcs8ShroudedKeyBag` encrypted under `choice`.
pub fn encode_shrouded_key_bag(
    registry: &AlgorithmRegistry,
    rng: &mut dyn CryptoRngCore,
    password: &Password<'_>,
    key: &PrivateKey,
    choice: &PbeChoice,
    kdf: &KdfOpts,
    attributes: &BagAttributes,
) -> Result<SafeBag, Error> {
    let pkcs8 = key.to_pkcs8_der()?;
    let (data, algorithm) = pbe::encrypt(registry, rng, password, &pkcs8, choice, kdf)?;
    let epki = EncryptedPrivateKeyInfo { algorithm, data };
    Ok(bag(
        algorithm::PKCS8_SHROUDED_KEY_BAG,
        epki.to_der(),
        attributes,
    ))
}

/// Decode a `keyBag` or `pkcs8ShroudedKeyBag`.
pub fn decode_key_bag(
    registry: &AlgorithmRegistry,
    password: &Password<'_>,
    bag: &SafeBag,
) -> Result<PrivateKey, Error> {
    if bag.bag_id == algorithm::PKCS8_SHROUDED_KEY_BAG {
        let epki = EncryptedPrivateKeyInfo::decode(&bag.value)?;
        let pkcs8 = pbe::decrypt(registry, password, &epki.algorithm, &epki.data)?;
        PrivateKey::from_pkcs8_der(&pkcs8)
    } else {
        PrivateKey::from_pkcs8_der(&bag.value)
    }
}

// ── Certificate and CRL bags ───────────────────────────────────────────────

pub fn encode_cert_bag(value: &CertValue, attributes: &BagAttributes) -> SafeBag {
    let der = match value {
        CertValue::X509(der) => {
            encode_typed_value(algorithm::X509_CERTIFICATE, |w| w.write_bytes(der))
        }
        CertValue::Sdsi(text) => encode_typed_value(algorithm::SDSI_CERTIFICATE, |w| {
            w.write_tagged_implicit(TAG_IA5STRING, |w| w.write_bytes(text.as_bytes()))
        }),
    };
    bag(algorithm::CERT_BAG, der, attributes)
}

pub fn decode_cert_bag(bag: &SafeBag) -> Result<CertValue, Error> {
    let (cert_id, value) = decode_typed_value("CertBag", &bag.value)?;
    if cert_id == algorithm::X509_CERTIFICATE {
        Ok(CertValue::X509(read_octets("x509Certificate", &value)?))
    } else if cert_id == algorithm::SDSI_CERTIFICATE {
        let bytes = yasna::parse_ber(&value, |r| {
            r.read_tagged_implicit(TAG_IA5STRING, |r| r.read_bytes())
        })
        .map_err(|e| Error::malformed("sdsiCertificate", e))?;
        if !bytes.is_ascii() {
            return Err(Error::MalformedContainer(
                "sdsiCertificate is not IA5".into(),
            ));
        }
        let text = String::from_utf8(bytes).map_err(|e| Error::malformed("sdsiCertificate", e))?;
        Ok(CertValue::Sdsi(text))
    } else {
        Err(Error::UnsupportedFeature(format!(
            "certificate type {}",
            algorithm::dotted(&cert_id)
        )))
    }
}

pub fn encode_crl_bag(crl: &[u8], attributes: &BagAttributes) -> SafeBag {
    let der = encode_typed_value(algorithm::X509_CRL, |w| w.write_bytes(crl));
    bag(algorithm::CRL_BAG, der, attributes)
}

pub fn decode_crl_bag(bag: &SafeBag) -> Result<Vec<u8>, Error> {
    let (crl_id, value) = decode_typed_value("CRLBag", &bag.value)?;
    if crl_id != algorithm::X509_CRL {
        return Err(Error::UnsupportedFeature(format!(
            "CRL type {}",
            algorithm::dotted(&crl_id)
        )));
    }
    read_octets("x509CRL", &value)
}

// ── Secret bags ────────────────────────────────────────────────────────────

/// A `secretBag`. With a key cipher the secret is shrouded like a private
/// key (`secretTypeId` = pkcs8ShroudedKeyBag, value = EncryptedPrivateKeyInfo
/// DER); without one it is stored as is (`secretTypeId` = keyBag).
pub fn encode_secret_bag(
    registry: &AlgorithmRegistry,
    rng: &mut dyn CryptoRngCore,
    password: &Password<'_>,
    secret: &[u8],
    cipher: Option<(&PbeChoice, &KdfOpts)>,
    attributes: &BagAttributes,
) -> Result<SafeBag, Error> {
    let der = match cipher {
        Some((choice, kdf)) => {
            let (data, algorithm) = pbe::encrypt(registry, rng, password, secret, choice, kdf)?;
            let epki = EncryptedPrivateKeyInfo { algorithm, data }.to_der();
            encode_typed_value(algorithm::PKCS8_SHROUDED_KEY_BAG, |w| w.write_bytes(&epki))
        }
        None => encode_typed_value(algorithm::KEY_BAG, |w| w.write_bytes(secret)),
    };
    Ok(bag(algorithm::SECRET_BAG, der, attributes))
}

pub fn decode_secret_bag(
    registry: &AlgorithmRegistry,
    password: &Password<'_>,
    bag: &SafeBag,
) -> Result<Vec<u8>, Error> {
    let (type_id, value) = decode_typed_value("SecretBag", &bag.value)?;
    let octets = read_octets("secretValue", &value)?;
    if type_id == algorithm::PKCS8_SHROUDED_KEY_BAG {
        let epki = EncryptedPrivateKeyInfo::decode(&octets)?;
        pbe::decrypt(registry, password, &epki.algorithm, &epki.data)
    } else if type_id == algorithm::KEY_BAG {
        Ok(octets)
    } else {
        Err(Error::UnsupportedFeature(format!(
            "secret type {}",
            algorithm::dotted(&type_id)
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const KEY: &[u8] = include_bytes!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../test-data/pkcs12/key.pk8.der"
    ));

    #[test]
    fn test_shrouded_key_roundtrip() {
        let reg = AlgorithmRegistry::global();
        let mut rng = StdRng::seed_from_u64(31);
        let key = PrivateKey::from_pkcs8_der(KEY).unwrap();
        let pw = Password::new("pw");
        let attrs = BagAttributes::default().with_local_key_id(vec![1, 2, 3]);
        let bag = encode_shrouded_key_bag(
            reg,
            &mut rng,
            &pw,
            &key,
            &PbeChoice::AES_256_CBC,
            &KdfOpts::PBKDF2_SHA256,
            &attrs,
        )
        .unwrap();
        assert_eq!(bag.bag_id, algorithm::PKCS8_SHROUDED_KEY_BAG);
        let back = decode_key_bag(reg, &pw, &bag).unwrap();
        assert_eq!(back.as_rsa(), key.as_rsa());
        assert_eq!(BagAttributes::from_attributes(&bag.attributes).unwrap(), attrs);
    }

    #[test]
    fn test_plain_key_bag() {
        let key = PrivateKey::from_pkcs8_der(KEY).unwrap();
        let bag = encode_key_bag(&key, &BagAttributes::default()).unwrap();
        assert!(bag.attributes.is_empty());
        let back = decode_key_bag(AlgorithmRegistry::global(), &Password::new(""), &bag).unwrap();
        assert_eq!(back.as_rsa(), key.as_rsa());
    }

    #[test]
    fn test_cert_bag_kinds() {
        let x509 = CertValue::X509(vec![0x30, 0x00]);
        let sdsi = CertValue::Sdsi("KDM6Zm9vKQ==".into());
        for value in [x509, sdsi] {
            let bag = encode_cert_bag(&value, &BagAttributes::default());
            assert_eq!(decode_cert_bag(&bag).unwrap(), value);
        }
    }

    #[test]
    fn test_unknown_cert_type() {
        let der = encode_typed_value(&[1, 2, 3], |w| w.write_bytes(b"x"));
        let bag = bag(algorithm::CERT_BAG, der, &BagAttributes::default());
        assert!(matches!(
            decode_cert_bag(&bag),
            Err(Error::UnsupportedFeature(_))
        ));
    }

    #[test]
    fn test_crl_bag() {
        let bag = encode_crl_bag(&[0x30, 0x03, 1, 2, 3], &BagAttributes::default());
        assert_eq!(decode_crl_bag(&bag).unwrap(), vec![0x30, 0x03, 1, 2, 3]);
    }

    #[test]
    fn test_secret_bag_both_forms() {
        let reg = AlgorithmRegistry::global();
        let mut rng = StdRng::seed_from_u64(32);
        let pw = Password::new("pw");
        let secret = b"0123456789abcdef";

        let shrouded = encode_secret_bag(
            reg,
            &mut rng,
            &pw,
            secret,
            Some((&PbeChoice::AES_256_CBC, &KdfOpts::PBKDF2_SHA256)),
            &BagAttributes::default(),
        )
        .unwrap();
        let (type_id, _) = decode_typed_value("SecretBag", &shrouded.value).unwrap();
        assert_eq!(type_id, algorithm::PKCS8_SHROUDED_KEY_BAG);
        assert_eq!(decode_secret_bag(reg, &pw, &shrouded).unwrap(), secret);

        let plain =
            encode_secret_bag(reg, &mut rng, &pw, secret, None, &BagAttributes::default()).unwrap();
        let (type_id, _) = decode_typed_value("SecretBag", &plain.value).unwrap();
        assert_eq!(type_id, algorithm::KEY_BAG);
        assert_eq!(decode_secret_bag(reg, &pw, &plain).unwrap(), secret);
    }
}
