#![forbid(unsafe_code)]

//! Algorithm registry mapping OIDs and names to factory functions.
//!
//! A registry is assembled with [`RegistryBuilder`] and is immutable once
//! built. Every lookup returns a fresh instance from its factory, so callers
//! never share per-operation state. [`AlgorithmRegistry::global`] holds the
//! default set and is initialized on first use.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::cipher::{Cipher, CipherFactory};
use crate::digest::{HashAlgorithm, HashFactory};
use crate::keytransport::KeyTransportAlgorithm;
use valv_core::{algorithm, Error};

/// Central registry for hash and cipher algorithms.
pub struct AlgorithmRegistry {
    hashes: Vec<HashFactory>,
    hashes_by_oid: HashMap<&'static [u64], HashFactory>,
    hashes_by_hmac_oid: HashMap<&'static [u64], HashFactory>,
    hashes_by_name: HashMap<&'static str, HashFactory>,
    ciphers: Vec<CipherFactory>,
    ciphers_by_oid: HashMap<&'static [u64], CipherFactory>,
    ciphers_by_name: HashMap<&'static str, CipherFactory>,
}

/// Collects factories before freezing them into an [`AlgorithmRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    hashes: Vec<HashFactory>,
    ciphers: Vec<CipherFactory>,
}

impl RegistryBuilder {
    /// Add every algorithm this crate implements.
    pub fn with_defaults(mut self) -> Self {
        self.hashes.extend(crate::digest::defaults());
        self.ciphers.extend(crate::cipher::defaults());
        self
    }

    pub fn register_hash(mut self, factory: HashFactory) -> Self {
        self.hashes.push(factory);
        self
    }

    pub fn register_cipher(mut self, factory: CipherFactory) -> Self {
        self.ciphers.push(factory);
        self
    }

    /// Freeze the registry. On duplicate keys the first registration wins.
    pub fn build(self) -> AlgorithmRegistry {
        let mut registry = AlgorithmRegistry {
            hashes: Vec::new(),
            hashes_by_oid: HashMap::new(),
            hashes_by_hmac_oid: HashMap::new(),
            hashes_by_name: HashMap::new(),
            ciphers: Vec::new(),
            ciphers_by_oid: HashMap::new(),
            ciphers_by_name: HashMap::new(),
        };

        for factory in self.hashes {
            let probe = factory();
            if registry.hashes_by_name.contains_key(probe.name()) {
                continue;
            }
            registry.hashes_by_name.insert(probe.name(), factory);
            registry.hashes_by_oid.entry(probe.oid()).or_insert(factory);
            if let Some(hmac_oid) = probe.hmac_oid() {
                registry.hashes_by_hmac_oid.entry(hmac_oid).or_insert(factory);
            }
            registry.hashes.push(factory);
        }

        for factory in self.ciphers {
            let probe = factory();
            if registry.ciphers_by_name.contains_key(probe.name()) {
                continue;
            }
            registry.ciphers_by_name.insert(probe.name(), factory);
            if let Some(oid) = probe.oid() {
                registry.ciphers_by_oid.entry(oid).or_insert(factory);
            }
            registry.ciphers.push(factory);
        }

        registry
    }
}

impl AlgorithmRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// A fresh registry holding every built-in algorithm.
    pub fn with_defaults() -> Self {
        Self::builder().with_defaults().build()
    }

    /// The process-wide default registry.
    pub fn global() -> &'static AlgorithmRegistry {
        static GLOBAL: OnceLock<AlgorithmRegistry> = OnceLock::new();
        GLOBAL.get_or_init(AlgorithmRegistry::with_defaults)
    }

    /// Look up a digest by its algorithm OID.
    pub fn hash(&self, oid: &[u64]) -> Result<Box<dyn HashAlgorithm>, Error> {
        self.hashes_by_oid
            .get(oid)
            .map(|factory| factory())
            .ok_or_else(|| unsupported("digest", oid))
    }

    /// Look up a digest by the OID of HMAC over it (PBKDF2 PRF, PBMAC1).
    pub fn hash_for_hmac(&self, hmac_oid: &[u64]) -> Result<Box<dyn HashAlgorithm>, Error> {
        self.hashes_by_hmac_oid
            .get(hmac_oid)
            .map(|factory| factory())
            .ok_or_else(|| unsupported("HMAC", hmac_oid))
    }

    pub fn hash_by_name(&self, name: &str) -> Result<Box<dyn HashAlgorithm>, Error> {
        self.hashes_by_name
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| Error::UnsupportedAlgorithm(format!("digest named {name}")))
    }

    /// Look up a cipher by its algorithm OID.
    pub fn cipher(&self, oid: &[u64]) -> Result<Box<dyn Cipher>, Error> {
        self.ciphers_by_oid
            .get(oid)
            .map(|factory| factory())
            .ok_or_else(|| unsupported("cipher", oid))
    }

    pub fn cipher_by_name(&self, name: &str) -> Result<Box<dyn Cipher>, Error> {
        self.ciphers_by_name
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| Error::UnsupportedAlgorithm(format!("cipher named {name}")))
    }

    /// Look up a key transport algorithm from its AlgorithmIdentifier.
    pub fn key_transport(
        &self,
        oid: &[u64],
        params: Option<&[u8]>,
    ) -> Result<Box<dyn KeyTransportAlgorithm>, Error> {
        crate::keytransport::from_oid(oid, params)
    }

    /// All registered digests, in registration order.
    pub fn hashes(&self) -> impl Iterator<Item = Box<dyn HashAlgorithm>> + '_ {
        self.hashes.iter().map(|factory| factory())
    }

    /// All registered ciphers, in registration order.
    pub fn ciphers(&self) -> impl Iterator<Item = Box<dyn Cipher>> + '_ {
        self.ciphers.iter().map(|factory| factory())
    }
}

impl std::fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlgorithmRegistry")
            .field("hashes", &self.hashes.len())
            .field("ciphers", &self.ciphers.len())
            .finish()
    }
}

fn unsupported(kind: &str, oid: &[u64]) -> Error {
    Error::UnsupportedAlgorithm(format!("{kind} for OID {}", algorithm::dotted(oid)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_is_singleton() {
        let a = AlgorithmRegistry::global() as *const AlgorithmRegistry;
        let b = AlgorithmRegistry::global() as *const AlgorithmRegistry;
        assert_eq!(a, b);
    }

    #[test]
    fn test_lookup_by_oid_and_name() {
        let reg = AlgorithmRegistry::global();
        assert_eq!(reg.hash(algorithm::SHA256).unwrap().name(), "sha256");
        assert_eq!(reg.hash_for_hmac(algorithm::HMAC_SM3).unwrap().name(), "sm3");
        assert_eq!(reg.hash_by_name("sha1").unwrap().oid(), algorithm::SHA1);
        assert_eq!(reg.cipher(algorithm::AES256_CBC).unwrap().key_size(), 32);
        assert_eq!(reg.cipher_by_name("rc2-40-cbc").unwrap().key_size(), 5);
        // RC2 variants share one OID; the 128-bit variant owns it.
        assert_eq!(reg.cipher(algorithm::RC2_CBC).unwrap().name(), "rc2-128-cbc");
    }

    #[test]
    fn test_miss_is_unsupported_algorithm() {
        let reg = AlgorithmRegistry::global();
        let err = reg.cipher(&[2, 16, 840, 1, 101, 3, 4, 1, 46]).unwrap_err();
        match err {
            Error::UnsupportedAlgorithm(msg) => assert!(msg.contains("2.16.840.1.101.3.4.1.46")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(
            reg.hash_by_name("md4"),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_isolated_registry() {
        fn only_sha1() -> Box<dyn HashAlgorithm> {
            AlgorithmRegistry::global().hash(algorithm::SHA1).unwrap()
        }
        let reg = AlgorithmRegistry::builder()
            .register_hash(only_sha1)
            .register_hash(only_sha1)
            .build();
        assert_eq!(reg.hashes().count(), 1);
        assert!(reg.hash(algorithm::SHA256).is_err());
        assert!(reg.cipher(algorithm::AES128_CBC).is_err());
    }

    #[test]
    fn test_defaults_listed() {
        let reg = AlgorithmRegistry::with_defaults();
        assert_eq!(reg.hashes().count(), 15);
        assert_eq!(reg.ciphers().count(), 12);
    }
}
