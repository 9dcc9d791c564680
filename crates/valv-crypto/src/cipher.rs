#![forbid(unsafe_code)]

//! Content-encryption ciphers used by PKCS#12 password-based encryption and
//! CMS enveloped data (AES-CBC, DES/3DES-CBC, RC2-CBC, RC4, SM4-CBC).
//!
//! Block ciphers run in CBC mode with PKCS#7 padding. Key and IV are always
//! supplied by the caller; where they come from (PKCS#12 KDF, PBKDF2,
//! scrypt, a random CEK) is the engine's business.

use cipher::block_padding::Pkcs7;
use cipher::{BlockDecryptMut, BlockEncryptMut, InnerIvInit, KeyInit, KeyIvInit, StreamCipher};
use valv_core::{algorithm, Error};

/// Trait for content-encryption ciphers.
pub trait Cipher: Send {
    /// Canonical lowercase name, e.g. `aes-256-cbc`.
    fn name(&self) -> &'static str;
    /// Algorithm OID used in PBES2 and CMS; `None` for ciphers only reachable
    /// through a legacy PKCS#12 PBE scheme.
    fn oid(&self) -> Option<&'static [u64]>;
    fn key_size(&self) -> usize;
    fn iv_size(&self) -> usize;
    /// Whether PBKDF2 parameters carry an explicit `keyLength` for this cipher.
    fn has_key_length(&self) -> bool {
        false
    }
    /// Override the key size for variable-length ciphers.
    fn set_key_size(&mut self, len: usize) -> Result<(), Error> {
        if len != self.key_size() {
            return Err(Error::Crypto(format!(
                "{} requires a {} byte key, got {len}",
                self.name(),
                self.key_size()
            )));
        }
        Ok(())
    }

    fn encrypt(&self, key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error>;
    fn decrypt(&self, key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error>;

    /// DER encoding of the AlgorithmIdentifier parameters carrying `iv`.
    fn encode_params(&self, iv: &[u8]) -> Vec<u8> {
        yasna::construct_der(|w| w.write_bytes(iv))
    }
    /// Parse AlgorithmIdentifier parameters and return the IV.
    fn decode_params(&mut self, params: &[u8]) -> Result<Vec<u8>, Error> {
        decode_iv(self.name(), self.iv_size(), params)
    }
}

/// Parse an `OCTET STRING` IV parameter and check its length.
fn decode_iv(name: &str, iv_size: usize, params: &[u8]) -> Result<Vec<u8>, Error> {
    let iv = yasna::parse_ber(params, |r| r.read_bytes()).map_err(|e| Error::malformed(name, e))?;
    if iv.len() != iv_size {
        return Err(Error::MalformedContainer(format!(
            "{name}: expected {iv_size} byte IV, got {}",
            iv.len()
        )));
    }
    Ok(iv)
}

impl std::fmt::Debug for dyn Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Cipher({})", self.name())
    }
}

/// Zero-argument constructor stored in the registry.
pub type CipherFactory = fn() -> Box<dyn Cipher>;

// ── CBC block ciphers ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Aes128,
    Aes192,
    Aes256,
    Des,
    TdesEde2,
    TdesEde3,
    Sm4,
    Rc2 { effective_bits: usize },
}

impl BlockKind {
    fn block_size(self) -> usize {
        match self {
            Self::Aes128 | Self::Aes192 | Self::Aes256 | Self::Sm4 => 16,
            Self::Des | Self::TdesEde2 | Self::TdesEde3 | Self::Rc2 { .. } => 8,
        }
    }
}

struct BlockCbc {
    name: &'static str,
    oid: Option<&'static [u64]>,
    kind: BlockKind,
    key_size: usize,
}

macro_rules! cbc_encrypt {
    ($cipher:ty, $name:expr, $key:expr, $iv:expr, $data:expr) => {{
        cbc::Encryptor::<$cipher>::new_from_slices($key, $iv)
            .map_err(|e| Error::Crypto(format!("{} init: {e}", $name)))?
            .encrypt_padded_vec_mut::<Pkcs7>($data)
    }};
}

macro_rules! cbc_decrypt {
    ($cipher:ty, $name:expr, $key:expr, $iv:expr, $data:expr) => {{
        cbc::Decryptor::<$cipher>::new_from_slices($key, $iv)
            .map_err(|e| Error::Crypto(format!("{} init: {e}", $name)))?
            .decrypt_padded_vec_mut::<Pkcs7>($data)
            .map_err(|_| Error::Decryption(format!("{}: bad padding", $name)))?
    }};
}

impl BlockCbc {
    fn rc2(&self, key: &[u8], effective_bits: usize) -> Result<rc2::Rc2, Error> {
        if key.is_empty() || key.len() > 128 {
            return Err(Error::Crypto(format!(
                "{}: invalid key length {}",
                self.name,
                key.len()
            )));
        }
        Ok(rc2::Rc2::new_with_eff_key_len(key, effective_bits))
    }

    fn check_key(&self, key: &[u8]) -> Result<(), Error> {
        if key.len() != self.key_size {
            return Err(Error::Crypto(format!(
                "{}: expected {} byte key, got {}",
                self.name,
                self.key_size,
                key.len()
            )));
        }
        Ok(())
    }
}

impl Cipher for BlockCbc {
    fn name(&self) -> &'static str {
        self.name
    }
    fn oid(&self) -> Option<&'static [u64]> {
        self.oid
    }
    fn key_size(&self) -> usize {
        self.key_size
    }
    fn iv_size(&self) -> usize {
        self.kind.block_size()
    }
    fn has_key_length(&self) -> bool {
        matches!(self.kind, BlockKind::Rc2 { .. })
    }

    fn set_key_size(&mut self, len: usize) -> Result<(), Error> {
        match self.kind {
            BlockKind::Rc2 { .. } if (1..=128).contains(&len) => {
                self.key_size = len;
                Ok(())
            }
            _ if len == self.key_size => Ok(()),
            _ => Err(Error::Crypto(format!(
                "{} requires a {} byte key, got {len}",
                self.name, self.key_size
            ))),
        }
    }

    fn encrypt(&self, key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        self.check_key(key)?;
        let name = self.name;
        let out = match self.kind {
            BlockKind::Aes128 => cbc_encrypt!(aes::Aes128, name, key, iv, plaintext),
            BlockKind::Aes192 => cbc_encrypt!(aes::Aes192, name, key, iv, plaintext),
            BlockKind::Aes256 => cbc_encrypt!(aes::Aes256, name, key, iv, plaintext),
            BlockKind::Des => cbc_encrypt!(des::Des, name, key, iv, plaintext),
            BlockKind::TdesEde2 => cbc_encrypt!(des::TdesEde2, name, key, iv, plaintext),
            BlockKind::TdesEde3 => cbc_encrypt!(des::TdesEde3, name, key, iv, plaintext),
            BlockKind::Sm4 => cbc_encrypt!(sm4::Sm4, name, key, iv, plaintext),
            BlockKind::Rc2 { effective_bits } => {
                let inner = self.rc2(key, effective_bits)?;
                cbc::Encryptor::<rc2::Rc2>::inner_iv_slice_init(inner, iv)
                    .map_err(|e| Error::Crypto(format!("{name} init: {e}")))?
                    .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
            }
        };
        Ok(out)
    }

    fn decrypt(&self, key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        self.check_key(key)?;
        let name = self.name;
        let block = self.kind.block_size();
        if ciphertext.is_empty() || ciphertext.len() % block != 0 {
            return Err(Error::Decryption(format!(
                "{name}: ciphertext length {} is not a multiple of {block}",
                ciphertext.len()
            )));
        }
        let out = match self.kind {
            BlockKind::Aes128 => cbc_decrypt!(aes::Aes128, name, key, iv, ciphertext),
            BlockKind::Aes192 => cbc_decrypt!(aes::Aes192, name, key, iv, ciphertext),
            BlockKind::Aes256 => cbc_decrypt!(aes::Aes256, name, key, iv, ciphertext),
            BlockKind::Des => cbc_decrypt!(des::Des, name, key, iv, ciphertext),
            BlockKind::TdesEde2 => cbc_decrypt!(des::TdesEde2, name, key, iv, ciphertext),
            BlockKind::TdesEde3 => cbc_decrypt!(des::TdesEde3, name, key, iv, ciphertext),
            BlockKind::Sm4 => cbc_decrypt!(sm4::Sm4, name, key, iv, ciphertext),
            BlockKind::Rc2 { effective_bits } => {
                let inner = self.rc2(key, effective_bits)?;
                cbc::Decryptor::<rc2::Rc2>::inner_iv_slice_init(inner, iv)
                    .map_err(|e| Error::Crypto(format!("{name} init: {e}")))?
                    .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                    .map_err(|_| Error::Decryption(format!("{name}: bad padding")))?
            }
        };
        Ok(out)
    }

    fn encode_params(&self, iv: &[u8]) -> Vec<u8> {
        match self.kind {
            // RC2-CBCParameter ::= SEQUENCE { rc2ParameterVersion INTEGER, iv OCTET STRING }
            BlockKind::Rc2 { effective_bits } => yasna::construct_der(|w| {
                w.write_sequence(|w| {
                    w.next().write_u64(rc2_version(effective_bits));
                    w.next().write_bytes(iv);
                })
            }),
            _ => yasna::construct_der(|w| w.write_bytes(iv)),
        }
    }

    fn decode_params(&mut self, params: &[u8]) -> Result<Vec<u8>, Error> {
        let BlockKind::Rc2 { .. } = self.kind else {
            return decode_iv(self.name, self.iv_size(), params);
        };

        // The version is optional; an absent version means 32 effective bits.
        let (version, iv) = yasna::parse_ber(params, |r| {
            r.read_sequence(|r| {
                let version = r.read_optional(|r| r.read_u64())?;
                let iv = r.next().read_bytes()?;
                Ok((version, iv))
            })
        })
        .map_err(|e| Error::malformed("RC2-CBC parameters", e))?;

        let effective_bits = match version {
            None => 32,
            Some(v) => rc2_effective_bits(v).ok_or_else(|| {
                Error::UnsupportedAlgorithm(format!("RC2 parameter version {v}"))
            })?,
        };
        if iv.len() != 8 {
            return Err(Error::MalformedContainer(format!(
                "RC2-CBC: expected 8 byte IV, got {}",
                iv.len()
            )));
        }
        self.kind = BlockKind::Rc2 { effective_bits };
        Ok(iv)
    }
}

/// RFC 8018 §B.2.3 encoding of the RC2 effective key bits.
fn rc2_version(effective_bits: usize) -> u64 {
    match effective_bits {
        40 => 160,
        64 => 120,
        128 => 58,
        bits => bits as u64,
    }
}

fn rc2_effective_bits(version: u64) -> Option<usize> {
    match version {
        160 => Some(40),
        120 => Some(64),
        58 => Some(128),
        v if (256..=1024).contains(&v) => Some(v as usize),
        _ => None,
    }
}

// ── RC4 ──────────────────────────────────────────────────────────────

struct Rc4Stream {
    name: &'static str,
    key_size: usize,
}

impl Rc4Stream {
    fn apply(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
        use rc4::consts::{U16, U5};

        let mut buf = data.to_vec();
        match self.key_size {
            5 => rc4::Rc4::<U5>::new_from_slice(key)
                .map_err(|e| Error::Crypto(format!("{} init: {e}", self.name)))?
                .apply_keystream(&mut buf),
            16 => rc4::Rc4::<U16>::new_from_slice(key)
                .map_err(|e| Error::Crypto(format!("{} init: {e}", self.name)))?
                .apply_keystream(&mut buf),
            n => return Err(Error::Crypto(format!("unsupported RC4 key size {n}"))),
        }
        Ok(buf)
    }
}

impl Cipher for Rc4Stream {
    fn name(&self) -> &'static str {
        self.name
    }
    fn oid(&self) -> Option<&'static [u64]> {
        None
    }
    fn key_size(&self) -> usize {
        self.key_size
    }
    fn iv_size(&self) -> usize {
        0
    }
    fn encrypt(&self, key: &[u8], _iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        self.apply(key, plaintext)
    }
    fn decrypt(&self, key: &[u8], _iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        self.apply(key, ciphertext)
    }
    fn encode_params(&self, _iv: &[u8]) -> Vec<u8> {
        yasna::construct_der(|w| w.write_null())
    }
    fn decode_params(&mut self, _params: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(Vec::new())
    }
}

// ── Factories ────────────────────────────────────────────────────────

fn block(
    name: &'static str,
    oid: Option<&'static [u64]>,
    kind: BlockKind,
    key_size: usize,
) -> Box<dyn Cipher> {
    Box::new(BlockCbc {
        name,
        oid,
        kind,
        key_size,
    })
}

fn aes128_cbc() -> Box<dyn Cipher> {
    block("aes-128-cbc", Some(algorithm::AES128_CBC), BlockKind::Aes128, 16)
}
fn aes192_cbc() -> Box<dyn Cipher> {
    block("aes-192-cbc", Some(algorithm::AES192_CBC), BlockKind::Aes192, 24)
}
fn aes256_cbc() -> Box<dyn Cipher> {
    block("aes-256-cbc", Some(algorithm::AES256_CBC), BlockKind::Aes256, 32)
}
fn des_cbc() -> Box<dyn Cipher> {
    block("des-cbc", Some(algorithm::DES_CBC), BlockKind::Des, 8)
}
fn des_ede3_cbc() -> Box<dyn Cipher> {
    block("des-ede3-cbc", Some(algorithm::DES_EDE3_CBC), BlockKind::TdesEde3, 24)
}
fn des_ede_cbc() -> Box<dyn Cipher> {
    block("des-ede-cbc", None, BlockKind::TdesEde2, 16)
}
fn rc2_128_cbc() -> Box<dyn Cipher> {
    let kind = BlockKind::Rc2 { effective_bits: 128 };
    block("rc2-128-cbc", Some(algorithm::RC2_CBC), kind, 16)
}
fn rc2_64_cbc() -> Box<dyn Cipher> {
    let kind = BlockKind::Rc2 { effective_bits: 64 };
    block("rc2-64-cbc", Some(algorithm::RC2_CBC), kind, 8)
}
fn rc2_40_cbc() -> Box<dyn Cipher> {
    let kind = BlockKind::Rc2 { effective_bits: 40 };
    block("rc2-40-cbc", Some(algorithm::RC2_CBC), kind, 5)
}
fn sm4_cbc() -> Box<dyn Cipher> {
    block("sm4-cbc", Some(algorithm::SM4_CBC), BlockKind::Sm4, 16)
}
fn rc4_128() -> Box<dyn Cipher> {
    Box::new(Rc4Stream {
        name: "rc4-128",
        key_size: 16,
    })
}
fn rc4_40() -> Box<dyn Cipher> {
    Box::new(Rc4Stream {
        name: "rc4-40",
        key_size: 5,
    })
}

/// Factories for every cipher known to this crate, in registration order.
///
/// When several ciphers share an OID (RC2 variants) the first one wins the
/// OID slot; its parameters are rewritten by `decode_params`.
pub(crate) fn defaults() -> Vec<CipherFactory> {
    vec![
        aes128_cbc,
        aes192_cbc,
        aes256_cbc,
        des_cbc,
        des_ede3_cbc,
        des_ede_cbc,
        rc2_128_cbc,
        rc2_64_cbc,
        rc2_40_cbc,
        sm4_cbc,
        rc4_128,
        rc4_40,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(factory: CipherFactory) {
        let cipher = factory();
        let key = vec![0x42u8; cipher.key_size()];
        let iv = vec![0x24u8; cipher.iv_size()];
        let plaintext = b"The quick brown fox jumps over the lazy dog";
        let ct = cipher.encrypt(&key, &iv, plaintext).unwrap();
        assert_ne!(&ct[..], &plaintext[..]);
        let pt = cipher.decrypt(&key, &iv, &ct).unwrap();
        assert_eq!(pt, plaintext, "{} round-trip", cipher.name());
    }

    #[test]
    fn test_all_ciphers_roundtrip() {
        for factory in defaults() {
            roundtrip(factory);
        }
    }

    #[test]
    fn test_aes128_cbc_nist_vector() {
        // NIST SP 800-38A F.2.1, first block, followed by a full padding block
        let key = hex::decode("2b7e151628aed2a6abf7158809cf4f3c").unwrap();
        let iv = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let pt = hex::decode("6bc1bee22e409f96e93d7e117393172a").unwrap();
        let ct = aes128_cbc().encrypt(&key, &iv, &pt).unwrap();
        assert_eq!(ct.len(), 32);
        assert_eq!(hex::encode(&ct[..16]), "7649abac8119b246cee98e9b12e9197d");
    }

    #[test]
    fn test_bad_padding_is_decryption_error() {
        let cipher = aes256_cbc();
        let key = [1u8; 32];
        let iv = [2u8; 16];
        let mut ct = cipher.encrypt(&key, &iv, b"secret payload").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0xff;
        let err = cipher.decrypt(&key, &iv, &ct).unwrap_err();
        assert!(matches!(err, Error::Decryption(_)), "got {err:?}");
    }

    #[test]
    fn test_truncated_ciphertext() {
        let err = des_ede3_cbc().decrypt(&[3u8; 24], &[0u8; 8], &[0u8; 7]).unwrap_err();
        assert!(matches!(err, Error::Decryption(_)));
    }

    #[test]
    fn test_wrong_key_size() {
        let err = aes128_cbc().encrypt(&[0u8; 15], &[0u8; 16], b"x").unwrap_err();
        assert!(matches!(err, Error::Crypto(_)));
    }

    #[test]
    fn test_rc2_params_roundtrip() {
        let cipher = rc2_40_cbc();
        let params = cipher.encode_params(&[9u8; 8]);
        let mut decoded = rc2_128_cbc();
        let iv = decoded.decode_params(&params).unwrap();
        assert_eq!(iv, vec![9u8; 8]);
        decoded.set_key_size(5).unwrap();

        // The decoded instance now behaves like RC2-40.
        let key = [7u8; 5];
        let ct = cipher.encrypt(&key, &iv, b"rc2 forty").unwrap();
        assert_eq!(decoded.decrypt(&key, &iv, &ct).unwrap(), b"rc2 forty");
    }

    #[test]
    fn test_aes_params() {
        let mut cipher = aes256_cbc();
        let params = cipher.encode_params(&[5u8; 16]);
        assert_eq!(params[0], 0x04);
        assert_eq!(cipher.decode_params(&params).unwrap(), vec![5u8; 16]);
        let bad = yasna::construct_der(|w| w.write_bytes(&[5u8; 8]));
        assert!(cipher.decode_params(&bad).is_err());
    }

    #[test]
    fn test_has_key_length() {
        assert!(rc2_128_cbc().has_key_length());
        assert!(!aes256_cbc().has_key_length());
        assert!(aes256_cbc().set_key_size(16).is_err());
    }
}
