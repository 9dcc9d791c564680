#![forbid(unsafe_code)]

//! Container integrity: the RFC 7292 password MAC and PBMAC1 (RFC 9579).
//!
//! The MAC covers the content octets of the `authSafe` ContentInfo and is
//! checked before anything is decrypted.

use rand_core::CryptoRngCore;
use valv_core::{algorithm, Error};
use valv_crypto::kdf::ID_MAC;
use valv_crypto::AlgorithmRegistry;

use crate::asn1::{AlgorithmIdentifier, DigestInfo, MacData};
use crate::pbe::Password;
use crate::pbes2::KdfParams;

/// How the MAC key is derived and the MAC computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacScheme {
    /// PKCS#12 KDF (ID 3) and HMAC over `digest`, BMP password.
    Legacy { digest: &'static [u64] },
    /// PBKDF2 with the `kdf_prf` HMAC, then the `mac` HMAC. UTF-8 password.
    /// Both are HMAC OIDs.
    Pbmac1 {
        kdf_prf: &'static [u64],
        mac: &'static [u64],
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacOpts {
    pub scheme: MacScheme,
    pub salt_size: usize,
    pub iterations: u32,
}

impl MacOpts {
    pub const SHA1: Self = Self::legacy(algorithm::SHA1);
    pub const SHA256: Self = Self::legacy(algorithm::SHA256);
    pub const SM3: Self = Self::legacy(algorithm::SM3);
    pub const PBMAC1_SHA256: Self = Self {
        scheme: MacScheme::Pbmac1 {
            kdf_prf: algorithm::HMAC_SHA256,
            mac: algorithm::HMAC_SHA256,
        },
        salt_size: 16,
        iterations: 2048,
    };

    pub const fn legacy(digest: &'static [u64]) -> Self {
        Self {
            scheme: MacScheme::Legacy { digest },
            salt_size: 8,
            iterations: 2048,
        }
    }
}

fn encode_pbmac1_params(kdf: &AlgorithmIdentifier, mac: &AlgorithmIdentifier) -> Vec<u8> {
    yasna::construct_der(|w| {
        w.write_sequence(|w| {
            kdf.write(w.next());
            mac.write(w.next());
        })
    })
}

/// Compute the MacData for `message`.
pub fn compute(
    registry: &AlgorithmRegistry,
    rng: &mut dyn CryptoRngCore,
    message: &[u8],
    password: &Password<'_>,
    opts: &MacOpts,
) -> Result<MacData, Error> {
    let mut salt = vec![0u8; opts.salt_size];
    rng.fill_bytes(&mut salt);

    let (algorithm, digest) = match opts.scheme {
        MacScheme::Legacy { digest } => {
            let hash = registry.hash(digest)?;
            let key = hash.pkcs12_kdf(
                ID_MAC,
                &password.bmp(),
                &salt,
                opts.iterations,
                hash.output_size(),
            );
            (AlgorithmIdentifier::with_null(digest), hash.hmac(&key, message)?)
        }
        MacScheme::Pbmac1 { kdf_prf, mac } => {
            let hash = registry.hash_for_hmac(mac)?;
            let key_len = hash.output_size();
            let kdf = KdfParams::Pbkdf2 {
                salt: salt.clone(),
                iterations: opts.iterations,
                key_length: Some(key_len as u32),
                prf: kdf_prf.to_vec(),
            };
            let key = kdf.derive(registry, password.utf8(), key_len)?;
            let params = encode_pbmac1_params(
                &kdf.to_algorithm_identifier(),
                &AlgorithmIdentifier::with_null(mac),
            );
            (
                AlgorithmIdentifier::new(algorithm::PBMAC1, Some(params)),
                hash.hmac(&key, message)?,
            )
        }
    };

    Ok(MacData {
        mac: DigestInfo { algorithm, digest },
        salt,
        iterations: opts.iterations,
    })
}

/// Verify `mac_data` over `message` with exactly the given password.
pub fn verify(
    registry: &AlgorithmRegistry,
    mac_data: &MacData,
    message: &[u8],
    password: &Password<'_>,
) -> Result<(), Error> {
    let alg = &mac_data.mac.algorithm;
    let ok = if alg.is(algorithm::PBMAC1) {
        let (kdf_alg, mac_alg) = yasna::parse_ber(alg.require_parameters()?, |r| {
            r.read_sequence(|r| {
                let kdf = AlgorithmIdentifier::read(r.next())?;
                let mac = AlgorithmIdentifier::read(r.next())?;
                Ok((kdf, mac))
            })
        })
        .map_err(|e| Error::malformed("PBMAC1 parameters", e))?;

        let kdf = KdfParams::decode(&kdf_alg)?;
        if !matches!(kdf, KdfParams::Pbkdf2 { .. }) {
            return Err(Error::UnsupportedAlgorithm(format!(
                "PBMAC1 key derivation {}",
                algorithm::dotted(&kdf_alg.oid)
            )));
        }
        let key_len = kdf.key_length().ok_or_else(|| {
            Error::MalformedContainer("PBMAC1 PBKDF2 parameters lack keyLength".into())
        })?;
        let hash = registry.hash_for_hmac(&mac_alg.oid)?;
        // The MAC key is exactly one HMAC output long.
        if key_len as usize != hash.output_size() {
            return Err(Error::MalformedContainer(format!(
                "PBMAC1 keyLength {key_len} does not match {} output size {}",
                hash.name(),
                hash.output_size()
            )));
        }
        let key = kdf.derive(registry, password.utf8(), hash.output_size())?;
        hash.verify_hmac(&key, message, &mac_data.mac.digest)
    } else {
        let hash = registry.hash(&alg.oid)?;
        let key = hash.pkcs12_kdf(
            ID_MAC,
            &password.bmp(),
            &mac_data.salt,
            mac_data.iterations,
            hash.output_size(),
        );
        hash.verify_hmac(&key, message, &mac_data.mac.digest)
    };

    if ok {
        Ok(())
    } else {
        Err(Error::IncorrectPassword)
    }
}

/// Verify, retrying an empty password as a zero-length buffer.
///
/// Returns the password form that verified; that form must be used for
/// decrypting the container contents.
pub fn verify_password<'a>(
    registry: &AlgorithmRegistry,
    mac_data: &MacData,
    message: &[u8],
    password: Password<'a>,
) -> Result<Password<'a>, Error> {
    match verify(registry, mac_data, message, &password) {
        Err(Error::IncorrectPassword) if password.is_empty() && !password.is_zero_length() => {
            let fallback = Password::zero_length();
            verify(registry, mac_data, message, &fallback)?;
            tracing::warn!("MAC verified with a zero-length password instead of the empty BMP string");
            Ok(fallback)
        }
        other => other.map(|()| password),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const MESSAGE: &[u8] = b"authenticated safe contents";

    fn compute_with(opts: &MacOpts, password: &Password<'_>) -> MacData {
        let mut rng = StdRng::seed_from_u64(5);
        compute(AlgorithmRegistry::global(), &mut rng, MESSAGE, password, opts).unwrap()
    }

    #[test]
    fn test_legacy_mac_roundtrip() {
        let reg = AlgorithmRegistry::global();
        for opts in [MacOpts::SHA1, MacOpts::SHA256, MacOpts::SM3] {
            let pw = Password::new("secret");
            let mac = compute_with(&opts, &pw);
            assert!(mac.mac.algorithm.parameters.is_some());
            verify(reg, &mac, MESSAGE, &pw).unwrap();
            assert!(matches!(
                verify(reg, &mac, MESSAGE, &Password::new("Secret")),
                Err(Error::IncorrectPassword)
            ));
        }
    }

    #[test]
    fn test_pbmac1_roundtrip() {
        let reg = AlgorithmRegistry::global();
        let pw = Password::new("secret");
        let mac = compute_with(&MacOpts::PBMAC1_SHA256, &pw);
        assert!(mac.mac.algorithm.is(algorithm::PBMAC1));
        assert_eq!(mac.mac.digest.len(), 32);
        verify(reg, &mac, MESSAGE, &pw).unwrap();
        assert!(matches!(
            verify(reg, &mac, b"tampered", &pw),
            Err(Error::IncorrectPassword)
        ));
    }

    #[test]
    fn test_pbmac1_ignores_mac_data_salt() {
        let reg = AlgorithmRegistry::global();
        let pw = Password::new("secret");
        let mut mac = compute_with(&MacOpts::PBMAC1_SHA256, &pw);
        mac.salt = vec![0xFF; 3];
        mac.iterations = 1;
        verify(reg, &mac, MESSAGE, &pw).unwrap();
    }

    fn with_key_length(mac: &MacData, key_length: u32) -> MacData {
        let (kdf_alg, mac_alg) = yasna::parse_der(
            mac.mac.algorithm.parameters.as_deref().unwrap(),
            |r| {
                r.read_sequence(|r| {
                    Ok((
                        AlgorithmIdentifier::read(r.next())?,
                        AlgorithmIdentifier::read(r.next())?,
                    ))
                })
            },
        )
        .unwrap();
        let kdf = match KdfParams::decode(&kdf_alg).unwrap() {
            KdfParams::Pbkdf2 {
                salt,
                iterations,
                prf,
                ..
            } => KdfParams::Pbkdf2 {
                salt,
                iterations,
                key_length: Some(key_length),
                prf,
            },
            other => panic!("unexpected KDF {other:?}"),
        };
        let mut out = mac.clone();
        out.mac.algorithm = AlgorithmIdentifier::new(
            algorithm::PBMAC1,
            Some(encode_pbmac1_params(&kdf.to_algorithm_identifier(), &mac_alg)),
        );
        out
    }

    #[test]
    fn test_pbmac1_key_length_must_match_hmac() {
        let reg = AlgorithmRegistry::global();
        let pw = Password::new("pw");
        let mac = compute_with(&MacOpts::PBMAC1_SHA256, &pw);
        verify(reg, &with_key_length(&mac, 32), MESSAGE, &pw).unwrap();
        for len in [0, 16, 64, 256 << 20] {
            assert!(matches!(
                verify(reg, &with_key_length(&mac, len), MESSAGE, &pw),
                Err(Error::MalformedContainer(_))
            ));
        }
    }

    #[test]
    fn test_zero_length_password_fallback() {
        let reg = AlgorithmRegistry::global();
        let mac = compute_with(&MacOpts::SHA1, &Password::zero_length());

        assert!(matches!(
            verify(reg, &mac, MESSAGE, &Password::new("")),
            Err(Error::IncorrectPassword)
        ));
        let used = verify_password(reg, &mac, MESSAGE, Password::new("")).unwrap();
        assert!(used.is_zero_length());

        // The BMP form verifies directly without falling back.
        let mac = compute_with(&MacOpts::SHA1, &Password::new(""));
        let used = verify_password(reg, &mac, MESSAGE, Password::new("")).unwrap();
        assert!(!used.is_zero_length());
    }

    #[test]
    fn test_no_fallback_for_non_empty_password() {
        let reg = AlgorithmRegistry::global();
        let mac = compute_with(&MacOpts::SHA256, &Password::new("a"));
        assert!(matches!(
            verify_password(reg, &mac, MESSAGE, Password::new("b")),
            Err(Error::IncorrectPassword)
        ));
    }

    #[test]
    fn test_unknown_mac_digest() {
        let reg = AlgorithmRegistry::global();
        let mut mac = compute_with(&MacOpts::SHA1, &Password::new("x"));
        mac.mac.algorithm = AlgorithmIdentifier::with_null(&[1, 2, 840, 113549, 2, 2]);
        assert!(matches!(
            verify(reg, &mac, MESSAGE, &Password::new("x")),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }
}
