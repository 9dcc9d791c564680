#![forbid(unsafe_code)]

//! Digest algorithms together with the HMAC and password-based derivations
//! built on top of them.
//!
//! A PKCS#12 file names digests in several places (MAC digest, PBKDF2 PRF,
//! PBMAC1 message auth scheme, legacy PBE); every one of them resolves to a
//! [`HashAlgorithm`].

use digest::core_api::BlockSizeUser;
use digest::Digest;
use hmac::{Mac, SimpleHmac};
use valv_core::{algorithm, Error};

/// A digest with its HMAC and KDF companions.
pub trait HashAlgorithm: Send + Sync {
    /// Canonical lowercase name, e.g. `sha256`.
    fn name(&self) -> &'static str;
    /// Digest algorithm OID.
    fn oid(&self) -> &'static [u64];
    /// OID of HMAC over this digest, when one is assigned.
    fn hmac_oid(&self) -> Option<&'static [u64]>;
    fn output_size(&self) -> usize;
    fn block_size(&self) -> usize;

    fn digest(&self, data: &[u8]) -> Vec<u8>;
    fn hmac(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error>;
    /// Constant-time HMAC verification.
    fn verify_hmac(&self, key: &[u8], data: &[u8], tag: &[u8]) -> bool;

    /// RFC 7292 Appendix B KDF over this digest.
    fn pkcs12_kdf(
        &self,
        id: u8,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
        output_len: usize,
    ) -> Vec<u8>;
    /// PBKDF2 with HMAC over this digest as the PRF.
    fn pbkdf2(&self, password: &[u8], salt: &[u8], iterations: u32, output: &mut [u8])
        -> Result<(), Error>;
    /// PBKDF1 over this digest.
    fn pbkdf1(
        &self,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
        output_len: usize,
    ) -> Result<Vec<u8>, Error>;
}

impl std::fmt::Debug for dyn HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HashAlgorithm({})", self.name())
    }
}

// ── Concrete implementations ─────────────────────────────────────────

macro_rules! impl_hash {
    ($name:ident, $hasher:ty, $label:expr, $oid:expr, $hmac_oid:expr) => {
        #[derive(Default)]
        pub(crate) struct $name;

        impl HashAlgorithm for $name {
            fn name(&self) -> &'static str {
                $label
            }

            fn oid(&self) -> &'static [u64] {
                $oid
            }

            fn hmac_oid(&self) -> Option<&'static [u64]> {
                $hmac_oid
            }

            fn output_size(&self) -> usize {
                <$hasher as Digest>::output_size()
            }

            fn block_size(&self) -> usize {
                <$hasher as BlockSizeUser>::block_size()
            }

            fn digest(&self, data: &[u8]) -> Vec<u8> {
                <$hasher as Digest>::digest(data).to_vec()
            }

            fn hmac(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
                let mut mac = <SimpleHmac<$hasher> as Mac>::new_from_slice(key)
                    .map_err(|e| Error::Crypto(format!("HMAC-{} init: {e}", $label)))?;
                mac.update(data);
                Ok(mac.finalize().into_bytes().to_vec())
            }

            fn verify_hmac(&self, key: &[u8], data: &[u8], tag: &[u8]) -> bool {
                match <SimpleHmac<$hasher> as Mac>::new_from_slice(key) {
                    Ok(mut mac) => {
                        mac.update(data);
                        mac.verify_slice(tag).is_ok()
                    }
                    Err(_) => false,
                }
            }

            fn pkcs12_kdf(
                &self,
                id: u8,
                password: &[u8],
                salt: &[u8],
                iterations: u32,
                output_len: usize,
            ) -> Vec<u8> {
                crate::kdf::pkcs12_kdf::<$hasher>(
                    id,
                    password,
                    salt,
                    iterations,
                    output_len,
                    <$hasher as BlockSizeUser>::block_size(),
                )
            }

            fn pbkdf2(
                &self,
                password: &[u8],
                salt: &[u8],
                iterations: u32,
                output: &mut [u8],
            ) -> Result<(), Error> {
                pbkdf2::pbkdf2::<SimpleHmac<$hasher>>(password, salt, iterations, output)
                    .map_err(|e| Error::Crypto(format!("PBKDF2-HMAC-{}: {e}", $label)))
            }

            fn pbkdf1(
                &self,
                password: &[u8],
                salt: &[u8],
                iterations: u32,
                output_len: usize,
            ) -> Result<Vec<u8>, Error> {
                crate::kdf::pbkdf1::<$hasher>(password, salt, iterations, output_len)
            }
        }
    };
}

impl_hash!(Md5Hash, md5::Md5, "md5", algorithm::MD5, Some(algorithm::HMAC_MD5));
impl_hash!(Sha1Hash, sha1::Sha1, "sha1", algorithm::SHA1, Some(algorithm::HMAC_SHA1));
impl_hash!(Sha224Hash, sha2::Sha224, "sha224", algorithm::SHA224, Some(algorithm::HMAC_SHA224));
impl_hash!(Sha256Hash, sha2::Sha256, "sha256", algorithm::SHA256, Some(algorithm::HMAC_SHA256));
impl_hash!(Sha384Hash, sha2::Sha384, "sha384", algorithm::SHA384, Some(algorithm::HMAC_SHA384));
impl_hash!(Sha512Hash, sha2::Sha512, "sha512", algorithm::SHA512, Some(algorithm::HMAC_SHA512));
impl_hash!(
    Sha512_224Hash,
    sha2::Sha512_224,
    "sha512-224",
    algorithm::SHA512_224,
    Some(algorithm::HMAC_SHA512_224)
);
impl_hash!(
    Sha512_256Hash,
    sha2::Sha512_256,
    "sha512-256",
    algorithm::SHA512_256,
    Some(algorithm::HMAC_SHA512_256)
);
impl_hash!(Sha3_224Hash, sha3::Sha3_224, "sha3-224", algorithm::SHA3_224, Some(algorithm::HMAC_SHA3_224));
impl_hash!(Sha3_256Hash, sha3::Sha3_256, "sha3-256", algorithm::SHA3_256, Some(algorithm::HMAC_SHA3_256));
impl_hash!(Sha3_384Hash, sha3::Sha3_384, "sha3-384", algorithm::SHA3_384, Some(algorithm::HMAC_SHA3_384));
impl_hash!(Sha3_512Hash, sha3::Sha3_512, "sha3-512", algorithm::SHA3_512, Some(algorithm::HMAC_SHA3_512));
impl_hash!(Sm3Hash, sm3::Sm3, "sm3", algorithm::SM3, Some(algorithm::HMAC_SM3));
impl_hash!(
    Streebog256Hash,
    streebog::Streebog256,
    "streebog256",
    algorithm::STREEBOG256,
    Some(algorithm::HMAC_STREEBOG256)
);
impl_hash!(
    Streebog512Hash,
    streebog::Streebog512,
    "streebog512",
    algorithm::STREEBOG512,
    Some(algorithm::HMAC_STREEBOG512)
);

/// Zero-argument constructor stored in the registry.
pub type HashFactory = fn() -> Box<dyn HashAlgorithm>;

fn boxed<H: HashAlgorithm + Default + 'static>() -> Box<dyn HashAlgorithm> {
    Box::new(H::default())
}

/// Factories for every digest known to this crate, in registration order.
pub(crate) fn defaults() -> Vec<HashFactory> {
    vec![
        boxed::<Md5Hash> as HashFactory,
        boxed::<Sha1Hash> as HashFactory,
        boxed::<Sha224Hash> as HashFactory,
        boxed::<Sha256Hash> as HashFactory,
        boxed::<Sha384Hash> as HashFactory,
        boxed::<Sha512Hash> as HashFactory,
        boxed::<Sha512_224Hash> as HashFactory,
        boxed::<Sha512_256Hash> as HashFactory,
        boxed::<Sha3_224Hash> as HashFactory,
        boxed::<Sha3_256Hash> as HashFactory,
        boxed::<Sha3_384Hash> as HashFactory,
        boxed::<Sha3_512Hash> as HashFactory,
        boxed::<Sm3Hash> as HashFactory,
        boxed::<Streebog256Hash> as HashFactory,
        boxed::<Streebog512Hash> as HashFactory,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        let result = Sha256Hash.digest(b"hello");
        assert_eq!(
            hex::encode(result),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_sizes() {
        assert_eq!(Sha1Hash.output_size(), 20);
        assert_eq!(Sha1Hash.block_size(), 64);
        assert_eq!(Sha512Hash.block_size(), 128);
        assert_eq!(Sm3Hash.output_size(), 32);
        assert_eq!(Streebog512Hash.output_size(), 64);
    }

    #[test]
    fn test_hmac_sha256_rfc4231() {
        // RFC 4231 test case 2
        let tag = Sha256Hash
            .hmac(b"Jefe", b"what do ya want for nothing?")
            .unwrap();
        assert_eq!(
            hex::encode(&tag),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
        assert!(Sha256Hash.verify_hmac(b"Jefe", b"what do ya want for nothing?", &tag));
        assert!(!Sha256Hash.verify_hmac(b"jefe", b"what do ya want for nothing?", &tag));
    }

    #[test]
    fn test_pbkdf2_sha256_rfc7914() {
        let mut out = [0u8; 64];
        Sha256Hash.pbkdf2(b"passwd", b"salt", 1, &mut out).unwrap();
        assert_eq!(
            hex::encode(out),
            "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc\
             49ca9cccf179b645991664b39d77ef317c71b845b1e30bd509112041d3a19783"
        );
    }
}
