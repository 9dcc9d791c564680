#![forbid(unsafe_code)]

//! Key transport algorithms for CMS enveloped data (RSA PKCS#1 v1.5, RSAES-OAEP).

use rand_core::CryptoRngCore;
use valv_core::{algorithm, Error};
use yasna::models::ObjectIdentifier;
use yasna::{BERReader, Tag};

/// Trait for key transport algorithms.
pub trait KeyTransportAlgorithm: Send {
    fn oid(&self) -> &'static [u64];
    fn name(&self) -> &'static str;
    /// DER of the AlgorithmIdentifier parameters, `None` when absent.
    fn encode_params(&self) -> Option<Vec<u8>>;
    fn encrypt(
        &self,
        rng: &mut dyn CryptoRngCore,
        public_key: &rsa::RsaPublicKey,
        key_data: &[u8],
    ) -> Result<Vec<u8>, Error>;
    fn decrypt(&self, private_key: &rsa::RsaPrivateKey, encrypted: &[u8])
        -> Result<Vec<u8>, Error>;
}

/// RSA-OAEP configuration: label digest and MGF1 digest, as digest OIDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OaepParams {
    pub digest: &'static [u64],
    pub mgf_digest: &'static [u64],
}

impl OaepParams {
    /// RFC 8017 defaults: SHA-1 with MGF1-SHA-1.
    pub const SHA1: Self = Self {
        digest: algorithm::SHA1,
        mgf_digest: algorithm::SHA1,
    };
    pub const SHA256: Self = Self {
        digest: algorithm::SHA256,
        mgf_digest: algorithm::SHA256,
    };
}

impl Default for OaepParams {
    fn default() -> Self {
        Self::SHA1
    }
}

/// Key encryption selection for enveloped data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEncryption {
    RsaPkcs1v15,
    RsaOaep(OaepParams),
}

impl KeyEncryption {
    pub fn algorithm(&self) -> Box<dyn KeyTransportAlgorithm> {
        match *self {
            Self::RsaPkcs1v15 => Box::new(RsaPkcs1Transport),
            Self::RsaOaep(params) => Box::new(RsaOaepTransport { params }),
        }
    }
}

/// Create a key transport algorithm from its AlgorithmIdentifier.
pub fn from_oid(
    oid: &[u64],
    params: Option<&[u8]>,
) -> Result<Box<dyn KeyTransportAlgorithm>, Error> {
    if oid == algorithm::RSA_ENCRYPTION {
        Ok(Box::new(RsaPkcs1Transport))
    } else if oid == algorithm::RSAES_OAEP {
        let params = match params {
            Some(der) => decode_oaep_params(der)?,
            None => OaepParams::default(),
        };
        Ok(Box::new(RsaOaepTransport { params }))
    } else {
        Err(Error::UnsupportedAlgorithm(format!(
            "key transport for OID {}",
            algorithm::dotted(oid)
        )))
    }
}

struct RsaPkcs1Transport;

impl KeyTransportAlgorithm for RsaPkcs1Transport {
    fn oid(&self) -> &'static [u64] {
        algorithm::RSA_ENCRYPTION
    }

    fn name(&self) -> &'static str {
        "rsa-pkcs1v15"
    }

    fn encode_params(&self) -> Option<Vec<u8>> {
        Some(yasna::construct_der(|w| w.write_null()))
    }

    fn encrypt(
        &self,
        mut rng: &mut dyn CryptoRngCore,
        public_key: &rsa::RsaPublicKey,
        key_data: &[u8],
    ) -> Result<Vec<u8>, Error> {
        use rsa::Pkcs1v15Encrypt;
        public_key
            .encrypt(&mut rng, Pkcs1v15Encrypt, key_data)
            .map_err(|e| Error::Crypto(format!("RSA PKCS#1 encrypt: {e}")))
    }

    fn decrypt(
        &self,
        private_key: &rsa::RsaPrivateKey,
        encrypted: &[u8],
    ) -> Result<Vec<u8>, Error> {
        use rsa::Pkcs1v15Encrypt;
        private_key
            .decrypt(Pkcs1v15Encrypt, encrypted)
            .map_err(|e| Error::Decryption(format!("RSA PKCS#1 decrypt: {e}")))
    }
}

struct RsaOaepTransport {
    params: OaepParams,
}

macro_rules! oaep_encrypt {
    ($public_key:expr, $rng:expr, $key_data:expr, $digest:ty, $mgf:ty) => {{
        let padding = rsa::Oaep::new_with_mgf_hash::<$digest, $mgf>();
        $public_key
            .encrypt($rng, padding, $key_data)
            .map_err(|e| Error::Crypto(format!("RSA-OAEP encrypt: {e}")))
    }};
}

macro_rules! oaep_decrypt {
    ($private_key:expr, $encrypted:expr, $digest:ty, $mgf:ty) => {{
        let padding = rsa::Oaep::new_with_mgf_hash::<$digest, $mgf>();
        $private_key
            .decrypt(padding, $encrypted)
            .map_err(|e| Error::Decryption(format!("RSA-OAEP decrypt: {e}")))
    }};
}

/// Expand `$body` once per supported (digest, mgf) pair.
macro_rules! oaep_dispatch {
    ($digest:expr, $mgf:expr, $call:ident, ($($args:expr),*)) => {{
        macro_rules! with_mgf {
            ($d:ty) => {
                match $mgf {
                    "sha1" => $call!($($args),*, $d, sha1::Sha1),
                    "sha224" => $call!($($args),*, $d, sha2::Sha224),
                    "sha256" => $call!($($args),*, $d, sha2::Sha256),
                    "sha384" => $call!($($args),*, $d, sha2::Sha384),
                    _ => $call!($($args),*, $d, sha2::Sha512),
                }
            };
        }
        match $digest {
            "sha1" => with_mgf!(sha1::Sha1),
            "sha224" => with_mgf!(sha2::Sha224),
            "sha256" => with_mgf!(sha2::Sha256),
            "sha384" => with_mgf!(sha2::Sha384),
            _ => with_mgf!(sha2::Sha512),
        }
    }};
}

/// Map a digest OID to the short name used by the OAEP dispatch.
fn oaep_digest_name(oid: &[u64]) -> Result<&'static str, Error> {
    match oid {
        o if o == algorithm::SHA1 => Ok("sha1"),
        o if o == algorithm::SHA224 => Ok("sha224"),
        o if o == algorithm::SHA256 => Ok("sha256"),
        o if o == algorithm::SHA384 => Ok("sha384"),
        o if o == algorithm::SHA512 => Ok("sha512"),
        other => Err(Error::UnsupportedAlgorithm(format!(
            "RSA-OAEP digest for OID {}",
            algorithm::dotted(other)
        ))),
    }
}

impl KeyTransportAlgorithm for RsaOaepTransport {
    fn oid(&self) -> &'static [u64] {
        algorithm::RSAES_OAEP
    }

    fn name(&self) -> &'static str {
        "rsa-oaep"
    }

    fn encode_params(&self) -> Option<Vec<u8>> {
        Some(encode_oaep_params(&self.params))
    }

    fn encrypt(
        &self,
        mut rng: &mut dyn CryptoRngCore,
        public_key: &rsa::RsaPublicKey,
        key_data: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let digest = oaep_digest_name(self.params.digest)?;
        let mgf = oaep_digest_name(self.params.mgf_digest)?;
        oaep_dispatch!(digest, mgf, oaep_encrypt, (public_key, &mut rng, key_data))
    }

    fn decrypt(
        &self,
        private_key: &rsa::RsaPrivateKey,
        encrypted: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let digest = oaep_digest_name(self.params.digest)?;
        let mgf = oaep_digest_name(self.params.mgf_digest)?;
        oaep_dispatch!(digest, mgf, oaep_decrypt, (private_key, encrypted))
    }
}

// ── RSAES-OAEP-params (RFC 8017 Appendix A.2.1) ─────────────────────

fn write_hash_alg(w: yasna::DERWriter, oid: &[u64]) {
    w.write_sequence(|w| {
        w.next().write_oid(&ObjectIdentifier::from_slice(oid));
        w.next().write_null();
    })
}

fn read_hash_alg(r: BERReader) -> yasna::ASN1Result<Vec<u64>> {
    r.read_sequence(|r| {
        let oid = r.next().read_oid()?;
        r.read_optional(|r| r.read_null())?;
        Ok(oid.components().to_vec())
    })
}

/// Encode OAEP parameters, omitting fields equal to their DEFAULT.
pub fn encode_oaep_params(params: &OaepParams) -> Vec<u8> {
    yasna::construct_der(|w| {
        w.write_sequence(|w| {
            if params.digest != algorithm::SHA1 {
                w.next()
                    .write_tagged(Tag::context(0), |w| write_hash_alg(w, params.digest));
            }
            if params.mgf_digest != algorithm::SHA1 {
                w.next().write_tagged(Tag::context(1), |w| {
                    w.write_sequence(|w| {
                        w.next().write_oid(&ObjectIdentifier::from_slice(algorithm::MGF1));
                        write_hash_alg(w.next(), params.mgf_digest);
                    })
                });
            }
        })
    })
}

/// Decode OAEP parameters. A non-empty label (`pSourceAlgorithm`) is rejected.
pub fn decode_oaep_params(der: &[u8]) -> Result<OaepParams, Error> {
    let (digest, mgf, psource) = yasna::parse_ber(der, |r| {
        r.read_sequence(|r| {
            let digest = r.read_optional(|r| r.read_tagged(Tag::context(0), read_hash_alg))?;
            let mgf = r.read_optional(|r| {
                r.read_tagged(Tag::context(1), |r| {
                    r.read_sequence(|r| {
                        let mgf_oid = r.next().read_oid()?;
                        let inner = read_hash_alg(r.next())?;
                        Ok((mgf_oid.components().to_vec(), inner))
                    })
                })
            })?;
            let psource = r.read_optional(|r| r.read_tagged(Tag::context(2), |r| r.read_der()))?;
            Ok((digest, mgf, psource))
        })
    })
    .map_err(|e| Error::malformed("RSAES-OAEP parameters", e))?;

    if psource.is_some() {
        return Err(Error::UnsupportedFeature("RSA-OAEP label".into()));
    }

    let digest = match digest {
        Some(oid) => canonical_digest(&oid)?,
        None => algorithm::SHA1,
    };
    let mgf_digest = match mgf {
        Some((mgf_oid, _)) if mgf_oid != algorithm::MGF1 => {
            return Err(Error::UnsupportedAlgorithm(format!(
                "mask generation function {}",
                algorithm::dotted(&mgf_oid)
            )))
        }
        Some((_, inner)) => canonical_digest(&inner)?,
        None => algorithm::SHA1,
    };
    Ok(OaepParams { digest, mgf_digest })
}

fn canonical_digest(oid: &[u64]) -> Result<&'static [u64], Error> {
    [
        algorithm::SHA1,
        algorithm::SHA224,
        algorithm::SHA256,
        algorithm::SHA384,
        algorithm::SHA512,
    ]
    .into_iter()
    .find(|known| *known == oid)
    .ok_or_else(|| {
        Error::UnsupportedAlgorithm(format!("RSA-OAEP digest for OID {}", algorithm::dotted(oid)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::OnceLock;

    fn test_key() -> &'static rsa::RsaPrivateKey {
        static KEY: OnceLock<rsa::RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| {
            let mut rng = StdRng::seed_from_u64(7);
            rsa::RsaPrivateKey::new(&mut rng, 1024).unwrap()
        })
    }

    fn roundtrip(choice: KeyEncryption) {
        let sk = test_key();
        let pk = sk.to_public_key();
        let mut rng = StdRng::seed_from_u64(1);
        let alg = choice.algorithm();
        let ct = alg.encrypt(&mut rng, &pk, b"0123456789abcdef").unwrap();
        assert_eq!(ct.len(), 128);
        assert_eq!(alg.decrypt(sk, &ct).unwrap(), b"0123456789abcdef");
    }

    #[test]
    fn test_pkcs1_roundtrip() {
        roundtrip(KeyEncryption::RsaPkcs1v15);
    }

    #[test]
    fn test_oaep_roundtrip() {
        roundtrip(KeyEncryption::RsaOaep(OaepParams::SHA1));
        roundtrip(KeyEncryption::RsaOaep(OaepParams::SHA256));
    }

    #[test]
    fn test_oaep_default_params_encode_empty() {
        assert_eq!(encode_oaep_params(&OaepParams::SHA1), vec![0x30, 0x00]);
        assert_eq!(decode_oaep_params(&[0x30, 0x00]).unwrap(), OaepParams::SHA1);
    }

    #[test]
    fn test_oaep_sha256_params_roundtrip() {
        let der = encode_oaep_params(&OaepParams::SHA256);
        assert_eq!(decode_oaep_params(&der).unwrap(), OaepParams::SHA256);
        let alg = from_oid(algorithm::RSAES_OAEP, Some(&der)).unwrap();
        assert_eq!(alg.oid(), algorithm::RSAES_OAEP);
    }

    #[test]
    fn test_unknown_transport_oid() {
        let err = from_oid(&[1, 2, 3], None).err().unwrap();
        assert!(matches!(err, Error::UnsupportedAlgorithm(_)));
    }
}
