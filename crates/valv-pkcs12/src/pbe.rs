#![forbid(unsafe_code)]

//! Password-based encryption engines and their dispatch.
//!
//! Three families share one contract, selected by the OID on the wire:
//!
//! * RFC 7292 Appendix C schemes (`pbeWithSHAAnd...`): key and IV from the
//!   PKCS#12 KDF over the BMP-encoded password.
//! * PBES1 (RFC 8018 §6.1): PBKDF1 over the UTF-8 password, DES or RC2.
//! * PBES2 (RFC 8018 §6.2): see [`crate::pbes2`].

use rand_core::CryptoRngCore;
use valv_core::{algorithm, Error};
use valv_crypto::kdf::{self, ID_IV, ID_KEY};
use valv_crypto::AlgorithmRegistry;

use crate::asn1::AlgorithmIdentifier;
use crate::pbes2::{self, KdfOpts};

/// A container password.
///
/// The empty password has two byte forms in the wild: the BMP encoding of
/// `""` (a lone two-byte terminator) and a zero-length buffer. `Password`
/// carries which one is in effect for the legacy KDF.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Password<'a> {
    text: &'a str,
    zero_length: bool,
}

impl<'a> Password<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            zero_length: false,
        }
    }

    /// The empty password as a zero-length buffer.
    pub fn zero_length() -> Self {
        Self {
            text: "",
            zero_length: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn is_zero_length(&self) -> bool {
        self.zero_length
    }

    /// Null-terminated UTF-16BE, as the PKCS#12 KDF consumes it.
    pub fn bmp(&self) -> Vec<u8> {
        if self.zero_length {
            Vec::new()
        } else {
            kdf::password_to_bmp(self.text)
        }
    }

    /// UTF-8 bytes, as PBKDF1/PBKDF2/scrypt consume them.
    pub fn utf8(&self) -> &'a [u8] {
        self.text.as_bytes()
    }
}

impl std::fmt::Debug for Password<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.zero_length {
            f.write_str("Password(<zero-length>)")
        } else if self.text.is_empty() {
            f.write_str("Password(<empty>)")
        } else {
            f.write_str("Password(<redacted>)")
        }
    }
}

/// RFC 7292 Appendix C PBE schemes, all SHA-1 based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyPbe {
    Sha1Rc4_128,
    Sha1Rc4_40,
    Sha1Des3,
    Sha1Des2,
    Sha1Rc2_128,
    Sha1Rc2_40,
}

impl LegacyPbe {
    const ALL: [Self; 6] = [
        Self::Sha1Rc4_128,
        Self::Sha1Rc4_40,
        Self::Sha1Des3,
        Self::Sha1Des2,
        Self::Sha1Rc2_128,
        Self::Sha1Rc2_40,
    ];

    pub fn oid(self) -> &'static [u64] {
        match self {
            Self::Sha1Rc4_128 => algorithm::PBE_SHA1_RC4_128,
            Self::Sha1Rc4_40 => algorithm::PBE_SHA1_RC4_40,
            Self::Sha1Des3 => algorithm::PBE_SHA1_3DES,
            Self::Sha1Des2 => algorithm::PBE_SHA1_2DES,
            Self::Sha1Rc2_128 => algorithm::PBE_SHA1_RC2_128,
            Self::Sha1Rc2_40 => algorithm::PBE_SHA1_RC2_40,
        }
    }

    /// Registry name of the underlying cipher.
    fn cipher_name(self) -> &'static str {
        match self {
            Self::Sha1Rc4_128 => "rc4-128",
            Self::Sha1Rc4_40 => "rc4-40",
            Self::Sha1Des3 => "des-ede3-cbc",
            Self::Sha1Des2 => "des-ede-cbc",
            Self::Sha1Rc2_128 => "rc2-128-cbc",
            Self::Sha1Rc2_40 => "rc2-40-cbc",
        }
    }

    pub fn from_oid(oid: &[u64]) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.oid() == oid)
    }
}

/// RFC 8018 PBES1 schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pbes1 {
    Md5Des,
    Md5Rc2,
    Sha1Des,
    Sha1Rc2,
}

impl Pbes1 {
    const ALL: [Self; 4] = [Self::Md5Des, Self::Md5Rc2, Self::Sha1Des, Self::Sha1Rc2];

    pub fn oid(self) -> &'static [u64] {
        match self {
            Self::Md5Des => algorithm::PBE_MD5_DES,
            Self::Md5Rc2 => algorithm::PBE_MD5_RC2,
            Self::Sha1Des => algorithm::PBE_SHA1_DES,
            Self::Sha1Rc2 => algorithm::PBE_SHA1_RC2,
        }
    }

    fn digest(self) -> &'static [u64] {
        match self {
            Self::Md5Des | Self::Md5Rc2 => algorithm::MD5,
            Self::Sha1Des | Self::Sha1Rc2 => algorithm::SHA1,
        }
    }

    fn cipher_name(self) -> &'static str {
        match self {
            Self::Md5Des | Self::Sha1Des => "des-cbc",
            Self::Md5Rc2 | Self::Sha1Rc2 => "rc2-64-cbc",
        }
    }

    pub fn from_oid(oid: &[u64]) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.oid() == oid)
    }
}

/// The password-based encryption to apply to a key bag or to the
/// certificate ContentInfo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PbeChoice {
    Pkcs12(LegacyPbe),
    Pbes1(Pbes1),
    /// PBES2 with the cipher registered under this OID.
    Pbes2 { cipher: &'static [u64] },
}

impl PbeChoice {
    pub const AES_256_CBC: Self = Self::Pbes2 {
        cipher: algorithm::AES256_CBC,
    };
    pub const SM4_CBC: Self = Self::Pbes2 {
        cipher: algorithm::SM4_CBC,
    };
    pub const SHA1_3DES: Self = Self::Pkcs12(LegacyPbe::Sha1Des3);
    pub const SHA1_RC2_40: Self = Self::Pkcs12(LegacyPbe::Sha1Rc2_40);
}

/// `PBEParameter ::= SEQUENCE { salt OCTET STRING, iterationCount INTEGER }`
fn encode_pbe_params(salt: &[u8], iterations: u32) -> Vec<u8> {
    yasna::construct_der(|w| {
        w.write_sequence(|w| {
            w.next().write_bytes(salt);
            w.next().write_u32(iterations);
        })
    })
}

fn decode_pbe_params(params: &[u8]) -> Result<(Vec<u8>, u32), Error> {
    yasna::parse_ber(params, |r| {
        r.read_sequence(|r| {
            let salt = r.next().read_bytes()?;
            let iterations = r.next().read_u32()?;
            Ok((salt, iterations))
        })
    })
    .map_err(|e| Error::malformed("PBE parameters", e))
}

/// Key and IV for a legacy scheme.
fn legacy_key_iv(
    registry: &AlgorithmRegistry,
    scheme: LegacyPbe,
    password: &Password<'_>,
    salt: &[u8],
    iterations: u32,
) -> Result<(Box<dyn valv_crypto::Cipher>, Vec<u8>, Vec<u8>), Error> {
    let sha1 = registry.hash(algorithm::SHA1)?;
    let cipher = registry.cipher_by_name(scheme.cipher_name())?;
    let bmp = password.bmp();
    let key = sha1.pkcs12_kdf(ID_KEY, &bmp, salt, iterations, cipher.key_size());
    let iv = match cipher.iv_size() {
        0 => Vec::new(),
        n => sha1.pkcs12_kdf(ID_IV, &bmp, salt, iterations, n),
    };
    Ok((cipher, key, iv))
}

/// Key and IV for a PBES1 scheme: PBKDF1 output split in half.
fn pbes1_key_iv(
    registry: &AlgorithmRegistry,
    scheme: Pbes1,
    password: &Password<'_>,
    salt: &[u8],
    iterations: u32,
) -> Result<(Box<dyn valv_crypto::Cipher>, Vec<u8>, Vec<u8>), Error> {
    let digest = registry.hash(scheme.digest())?;
    let cipher = registry.cipher_by_name(scheme.cipher_name())?;
    let mut dk = digest.pbkdf1(password.utf8(), salt, iterations, 16)?;
    let iv = dk.split_off(8);
    Ok((cipher, dk, iv))
}

/// Encrypt `plaintext`, returning the ciphertext and the AlgorithmIdentifier
/// to record next to it.
pub fn encrypt(
    registry: &AlgorithmRegistry,
    rng: &mut dyn CryptoRngCore,
    password: &Password<'_>,
    plaintext: &[u8],
    choice: &PbeChoice,
    opts: &KdfOpts,
) -> Result<(Vec<u8>, AlgorithmIdentifier), Error> {
    let mut salt = vec![0u8; opts.salt_size];
    match *choice {
        PbeChoice::Pkcs12(scheme) => {
            rng.fill_bytes(&mut salt);
            let (cipher, key, iv) =
                legacy_key_iv(registry, scheme, password, &salt, opts.iterations)?;
            let ct = cipher.encrypt(&key, &iv, plaintext)?;
            let params = encode_pbe_params(&salt, opts.iterations);
            Ok((ct, AlgorithmIdentifier::new(scheme.oid(), Some(params))))
        }
        PbeChoice::Pbes1(scheme) => {
            // PBES1 salts are exactly eight octets.
            salt.resize(8, 0);
            rng.fill_bytes(&mut salt);
            let (cipher, key, iv) =
                pbes1_key_iv(registry, scheme, password, &salt, opts.iterations)?;
            let ct = cipher.encrypt(&key, &iv, plaintext)?;
            let params = encode_pbe_params(&salt, opts.iterations);
            Ok((ct, AlgorithmIdentifier::new(scheme.oid(), Some(params))))
        }
        PbeChoice::Pbes2 { cipher } => {
            pbes2::encrypt(registry, rng, password.utf8(), plaintext, cipher, opts)
        }
    }
}

/// Decrypt content protected under the scheme named by `alg`.
pub fn decrypt(
    registry: &AlgorithmRegistry,
    password: &Password<'_>,
    alg: &AlgorithmIdentifier,
    ciphertext: &[u8],
) -> Result<Vec<u8>, Error> {
    if let Some(scheme) = LegacyPbe::from_oid(&alg.oid) {
        let (salt, iterations) = decode_pbe_params(alg.require_parameters()?)?;
        let (cipher, key, iv) = legacy_key_iv(registry, scheme, password, &salt, iterations)?;
        tracing::trace!(?scheme, iterations, "legacy PBE decrypt");
        cipher.decrypt(&key, &iv, ciphertext)
    } else if let Some(scheme) = Pbes1::from_oid(&alg.oid) {
        let (salt, iterations) = decode_pbe_params(alg.require_parameters()?)?;
        let (cipher, key, iv) = pbes1_key_iv(registry, scheme, password, &salt, iterations)?;
        tracing::trace!(?scheme, iterations, "PBES1 decrypt");
        cipher.decrypt(&key, &iv, ciphertext)
    } else if alg.is(algorithm::PBES2) {
        pbes2::decrypt(
            registry,
            password.utf8(),
            alg.require_parameters()?,
            ciphertext,
        )
    } else {
        Err(Error::UnsupportedAlgorithm(format!(
            "password-based encryption scheme for OID {}",
            algorithm::dotted(&alg.oid)
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn roundtrip(choice: PbeChoice, opts: &KdfOpts) {
        let reg = AlgorithmRegistry::global();
        let mut rng = StdRng::seed_from_u64(11);
        let pw = Password::new("pässword");
        let plaintext = b"a private key would go here, longer than one block";
        let (ct, alg) = encrypt(reg, &mut rng, &pw, plaintext, &choice, opts).unwrap();
        assert_ne!(&ct[..], &plaintext[..]);
        let pt = decrypt(reg, &pw, &alg, &ct).unwrap();
        assert_eq!(pt, plaintext, "{choice:?}");
    }

    #[test]
    fn test_legacy_schemes_roundtrip() {
        for scheme in LegacyPbe::ALL {
            roundtrip(PbeChoice::Pkcs12(scheme), &KdfOpts::LEGACY);
        }
    }

    #[test]
    fn test_pbes1_schemes_roundtrip() {
        for scheme in Pbes1::ALL {
            roundtrip(PbeChoice::Pbes1(scheme), &KdfOpts::LEGACY);
        }
    }

    #[test]
    fn test_pbes2_roundtrip() {
        roundtrip(PbeChoice::AES_256_CBC, &KdfOpts::PBKDF2_SHA256);
        roundtrip(PbeChoice::SM4_CBC, &KdfOpts::PBKDF2_SHA256);
        roundtrip(
            PbeChoice::Pbes2 {
                cipher: algorithm::DES_EDE3_CBC,
            },
            &KdfOpts::PBKDF2_SHA256,
        );
    }

    #[test]
    fn test_empty_password_forms_differ() {
        assert_eq!(Password::new("").bmp(), vec![0, 0]);
        assert!(Password::zero_length().bmp().is_empty());
        assert_eq!(Password::new("a").bmp(), vec![0, b'a', 0, 0]);
    }

    #[test]
    fn test_legacy_uses_bmp_password() {
        let reg = AlgorithmRegistry::global();
        let mut rng = StdRng::seed_from_u64(12);
        let (ct, alg) = encrypt(
            reg,
            &mut rng,
            &Password::new(""),
            &[0x42; 24],
            &PbeChoice::SHA1_3DES,
            &KdfOpts::LEGACY,
        )
        .unwrap();
        // Decrypting with the zero-length form derives a different key.
        let other = decrypt(reg, &Password::zero_length(), &alg, &ct);
        assert!(other.map_or(true, |pt| pt != vec![0x42; 24]));
        assert_eq!(
            decrypt(reg, &Password::new(""), &alg, &ct).unwrap(),
            vec![0x42; 24]
        );
    }

    #[test]
    fn test_unknown_scheme() {
        let alg = AlgorithmIdentifier::new(&[1, 2, 840, 113549, 1, 12, 1, 9], None);
        match decrypt(AlgorithmRegistry::global(), &Password::new("x"), &alg, &[0; 8]) {
            Err(Error::UnsupportedAlgorithm(msg)) => {
                assert!(msg.contains("1.2.840.113549.1.12.1.9"))
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_redacted_debug() {
        assert_eq!(format!("{:?}", Password::new("hunter2")), "Password(<redacted>)");
    }
}
