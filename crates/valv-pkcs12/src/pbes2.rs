#![forbid(unsafe_code)]

//! PBES2 (RFC 8018 §6.2) with PBKDF2 or scrypt as key derivation.
//!
//! PBES2 feeds the password to the KDF as UTF-8 bytes. The content cipher is
//! resolved through the registry by its OID, so any registered CBC cipher
//! can be used.

use rand_core::CryptoRngCore;
use valv_core::{algorithm, Error};
use valv_crypto::AlgorithmRegistry;
use yasna::ASN1Result;

use crate::asn1::AlgorithmIdentifier;

/// Upper bounds applied to scrypt parameters read from a container.
const SCRYPT_MAX_LOG_N: u8 = 20;
const SCRYPT_MAX_R: u32 = 32;
const SCRYPT_MAX_P: u32 = 16;
/// `128 * r * N` bytes of working memory.
const SCRYPT_MAX_MEMORY: u64 = 1 << 30;

/// Key derivation used for PBES2 and PBMAC1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdfChoice {
    /// PBKDF2 with HMAC over the digest whose HMAC OID is `prf`.
    Pbkdf2 { prf: &'static [u64] },
    /// scrypt with cost `2^log_n`.
    Scrypt { log_n: u8, r: u32, p: u32 },
}

/// Caller-chosen key derivation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfOpts {
    pub kdf: KdfChoice,
    pub salt_size: usize,
    /// Iteration count (ignored by scrypt).
    pub iterations: u32,
}

impl KdfOpts {
    pub const PBKDF2_SHA256: Self = Self {
        kdf: KdfChoice::Pbkdf2 {
            prf: algorithm::HMAC_SHA256,
        },
        salt_size: 16,
        iterations: 2048,
    };

    /// Legacy schemes: salt and iteration count only.
    pub const LEGACY: Self = Self {
        kdf: KdfChoice::Pbkdf2 {
            prf: algorithm::HMAC_SHA1,
        },
        salt_size: 8,
        iterations: 2048,
    };

    pub const SCRYPT: Self = Self {
        kdf: KdfChoice::Scrypt {
            log_n: 14,
            r: 8,
            p: 1,
        },
        salt_size: 16,
        iterations: 1,
    };

    pub const fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }
}

impl Default for KdfOpts {
    fn default() -> Self {
        Self::PBKDF2_SHA256
    }
}

/// Parsed KDF parameters, dispatched on the KDF OID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KdfParams {
    Pbkdf2 {
        salt: Vec<u8>,
        iterations: u32,
        key_length: Option<u32>,
        /// HMAC OID of the PRF.
        prf: Vec<u64>,
    },
    Scrypt {
        salt: Vec<u8>,
        log_n: u8,
        r: u32,
        p: u32,
        key_length: Option<u32>,
    },
}

impl KdfParams {
    pub fn key_length(&self) -> Option<u32> {
        match self {
            Self::Pbkdf2 { key_length, .. } | Self::Scrypt { key_length, .. } => *key_length,
        }
    }

    pub fn salt(&self) -> &[u8] {
        match self {
            Self::Pbkdf2 { salt, .. } | Self::Scrypt { salt, .. } => salt,
        }
    }

    /// Fresh parameters with a random salt.
    pub fn generate(
        rng: &mut dyn CryptoRngCore,
        opts: &KdfOpts,
        key_length: Option<u32>,
    ) -> Self {
        let mut salt = vec![0u8; opts.salt_size];
        rng.fill_bytes(&mut salt);
        match opts.kdf {
            KdfChoice::Pbkdf2 { prf } => Self::Pbkdf2 {
                salt,
                iterations: opts.iterations,
                key_length,
                prf: prf.to_vec(),
            },
            KdfChoice::Scrypt { log_n, r, p } => Self::Scrypt {
                salt,
                log_n,
                r,
                p,
                key_length,
            },
        }
    }

    pub fn decode(alg: &AlgorithmIdentifier) -> Result<Self, Error> {
        let params = alg.require_parameters()?;
        if alg.is(algorithm::PBKDF2) {
            let (salt, iterations, key_length, prf) = yasna::parse_ber(params, |r| {
                r.read_sequence(|r| {
                    let salt = r.next().read_bytes()?;
                    let iterations = r.next().read_u32()?;
                    let key_length = r.read_optional(|r| r.read_u32())?;
                    let prf = r.read_optional(AlgorithmIdentifier::read)?;
                    Ok((salt, iterations, key_length, prf))
                })
            })
            .map_err(|e| Error::malformed("PBKDF2 parameters", e))?;
            Ok(Self::Pbkdf2 {
                salt,
                iterations,
                key_length,
                prf: prf.map_or_else(|| algorithm::HMAC_SHA1.to_vec(), |p| p.oid),
            })
        } else if alg.is(algorithm::SCRYPT) {
            let (salt, cost, r, p, key_length) = yasna::parse_ber(params, read_scrypt_params)
                .map_err(|e| Error::malformed("scrypt parameters", e))?;
            if cost < 2 || !cost.is_power_of_two() {
                return Err(Error::MalformedContainer(format!(
                    "scrypt cost {cost} is not a power of two"
                )));
            }
            let log_n = cost.trailing_zeros() as u8;
            check_scrypt_bounds(log_n, r, p)?;
            Ok(Self::Scrypt {
                salt,
                log_n,
                r,
                p,
                key_length,
            })
        } else {
            Err(Error::UnsupportedAlgorithm(format!(
                "key derivation function for OID {}",
                algorithm::dotted(&alg.oid)
            )))
        }
    }

    pub fn to_algorithm_identifier(&self) -> AlgorithmIdentifier {
        match self {
            Self::Pbkdf2 {
                salt,
                iterations,
                key_length,
                prf,
            } => {
                let params = yasna::construct_der(|w| {
                    w.write_sequence(|w| {
                        w.next().write_bytes(salt);
                        w.next().write_u32(*iterations);
                        if let Some(len) = key_length {
                            w.next().write_u32(*len);
                        }
                        // DEFAULT hmacWithSHA1
                        if prf.as_slice() != algorithm::HMAC_SHA1 {
                            AlgorithmIdentifier::with_null(prf).write(w.next());
                        }
                    })
                });
                AlgorithmIdentifier::new(algorithm::PBKDF2, Some(params))
            }
            Self::Scrypt {
                salt,
                log_n,
                r,
                p,
                key_length,
            } => {
                let params = yasna::construct_der(|w| {
                    w.write_sequence(|w| {
                        w.next().write_bytes(salt);
                        w.next().write_u64(1u64 << log_n);
                        w.next().write_u32(*r);
                        w.next().write_u32(*p);
                        if let Some(len) = key_length {
                            w.next().write_u32(*len);
                        }
                    })
                });
                AlgorithmIdentifier::new(algorithm::SCRYPT, Some(params))
            }
        }
    }

    /// Derive `len` bytes from `password`.
    pub fn derive(
        &self,
        registry: &AlgorithmRegistry,
        password: &[u8],
        len: usize,
    ) -> Result<Vec<u8>, Error> {
        let mut out = vec![0u8; len];
        match self {
            Self::Pbkdf2 {
                salt,
                iterations,
                prf,
                ..
            } => {
                let hash = registry.hash_for_hmac(prf)?;
                hash.pbkdf2(password, salt, *iterations, &mut out)?;
            }
            Self::Scrypt {
                salt, log_n, r, p, ..
            } => valv_crypto::kdf::scrypt(password, salt, *log_n, *r, *p, &mut out)?,
        }
        Ok(out)
    }
}

fn check_scrypt_bounds(log_n: u8, r: u32, p: u32) -> Result<(), Error> {
    let memory = (128 * u64::from(r)) << log_n.min(SCRYPT_MAX_LOG_N);
    if log_n > SCRYPT_MAX_LOG_N
        || r == 0
        || r > SCRYPT_MAX_R
        || p == 0
        || p > SCRYPT_MAX_P
        || memory > SCRYPT_MAX_MEMORY
    {
        return Err(Error::MalformedContainer(format!(
            "scrypt parameters out of range (N=2^{log_n}, r={r}, p={p})"
        )));
    }
    Ok(())
}

type ScryptFields = (Vec<u8>, u64, u32, u32, Option<u32>);

fn read_scrypt_params(r: yasna::BERReader) -> ASN1Result<ScryptFields> {
    r.read_sequence(|r| {
        let salt = r.next().read_bytes()?;
        let cost = r.next().read_u64()?;
        let block_size = r.next().read_u32()?;
        let parallelization = r.next().read_u32()?;
        let key_length = r.read_optional(|r| r.read_u32())?;
        Ok((salt, cost, block_size, parallelization, key_length))
    })
}

fn encode_pbes2_params(kdf: &AlgorithmIdentifier, scheme: &AlgorithmIdentifier) -> Vec<u8> {
    yasna::construct_der(|w| {
        w.write_sequence(|w| {
            kdf.write(w.next());
            scheme.write(w.next());
        })
    })
}

/// Encrypt `plaintext` under PBES2 with the cipher registered for
/// `cipher_oid`.
pub fn encrypt(
    registry: &AlgorithmRegistry,
    rng: &mut dyn CryptoRngCore,
    password: &[u8],
    plaintext: &[u8],
    cipher_oid: &[u64],
    opts: &KdfOpts,
) -> Result<(Vec<u8>, AlgorithmIdentifier), Error> {
    let cipher = registry.cipher(cipher_oid)?;
    let key_length = cipher.has_key_length().then_some(cipher.key_size() as u32);
    let kdf = KdfParams::generate(rng, opts, key_length);

    let mut iv = vec![0u8; cipher.iv_size()];
    rng.fill_bytes(&mut iv);

    let key = kdf.derive(registry, password, cipher.key_size())?;
    let ciphertext = cipher.encrypt(&key, &iv, plaintext)?;

    let scheme = AlgorithmIdentifier::new(cipher_oid, Some(cipher.encode_params(&iv)));
    let params = encode_pbes2_params(&kdf.to_algorithm_identifier(), &scheme);
    Ok((
        ciphertext,
        AlgorithmIdentifier::new(algorithm::PBES2, Some(params)),
    ))
}

/// Decrypt PBES2 content given the `PBES2-params` DER.
pub fn decrypt(
    registry: &AlgorithmRegistry,
    password: &[u8],
    params: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, Error> {
    let (kdf_alg, scheme) = yasna::parse_ber(params, |r| {
        r.read_sequence(|r| {
            let kdf = AlgorithmIdentifier::read(r.next())?;
            let scheme = AlgorithmIdentifier::read(r.next())?;
            Ok((kdf, scheme))
        })
    })
    .map_err(|e| Error::malformed("PBES2 parameters", e))?;

    let kdf = KdfParams::decode(&kdf_alg)?;
    let mut cipher = registry.cipher(&scheme.oid)?;
    let iv = cipher.decode_params(scheme.require_parameters()?)?;
    if let Some(len) = kdf.key_length() {
        cipher.set_key_size(len as usize)?;
    }
    tracing::trace!(cipher = cipher.name(), kdf = ?kdf_alg.oid, "PBES2 decrypt");

    let key = kdf.derive(registry, password, cipher.key_size())?;
    cipher.decrypt(&key, &iv, ciphertext)
}
