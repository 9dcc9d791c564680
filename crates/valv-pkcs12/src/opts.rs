#![forbid(unsafe_code)]

//! Encoding options and the stock presets.

use valv_core::algorithm;

use crate::envelope::EnvelopedOpts;
use crate::mac::MacOpts;
use crate::pbe::PbeChoice;
use crate::pbes2::{KdfChoice, KdfOpts};

/// How the certificate-side ContentInfo is protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertProtection {
    /// `encryptedData` under a password-based scheme.
    Password(PbeChoice),
    /// `envelopedData` for the recipients in [`Opts::enveloped`].
    Enveloped,
}

/// Settings consumed by [`Pkcs12::marshal`](crate::Pkcs12::marshal).
///
/// `None` for a cipher stores that side unencrypted; `None` for `mac`
/// omits the MacData.
#[derive(Debug, Clone)]
pub struct Opts {
    pub key_cipher: Option<PbeChoice>,
    pub key_kdf: KdfOpts,
    pub cert_cipher: Option<CertProtection>,
    pub cert_kdf: KdfOpts,
    pub mac: Option<MacOpts>,
    pub enveloped: Option<EnvelopedOpts>,
}

const PBKDF2_SM3: KdfOpts = KdfOpts {
    kdf: KdfChoice::Pbkdf2 {
        prf: algorithm::HMAC_SM3,
    },
    ..KdfOpts::PBKDF2_SHA256
};

impl Opts {
    /// RC2-40 certificates, 3DES key, SHA-1 MAC. What OpenSSL 1.x writes.
    pub const LEGACY_RC2: Self = Self {
        key_cipher: Some(PbeChoice::SHA1_3DES),
        key_kdf: KdfOpts::LEGACY,
        cert_cipher: Some(CertProtection::Password(PbeChoice::SHA1_RC2_40)),
        cert_kdf: KdfOpts::LEGACY,
        mac: Some(MacOpts::SHA1),
        enveloped: None,
    };

    /// 3DES for both key and certificates, SHA-1 MAC.
    pub const LEGACY_DES: Self = Self {
        key_cipher: Some(PbeChoice::SHA1_3DES),
        key_kdf: KdfOpts::LEGACY,
        cert_cipher: Some(CertProtection::Password(PbeChoice::SHA1_3DES)),
        cert_kdf: KdfOpts::LEGACY,
        mac: Some(MacOpts::SHA1),
        enveloped: None,
    };

    /// No encryption and no MAC. Only valid with the empty password.
    pub const PASSWORDLESS: Self = Self {
        key_cipher: None,
        key_kdf: KdfOpts::LEGACY,
        cert_cipher: None,
        cert_kdf: KdfOpts::LEGACY,
        mac: None,
        enveloped: None,
    };

    /// AES-256-CBC with PBKDF2-HMAC-SHA256 and a SHA-256 MAC.
    pub const MODERN_2023: Self = Self {
        key_cipher: Some(PbeChoice::AES_256_CBC),
        key_kdf: KdfOpts::PBKDF2_SHA256,
        cert_cipher: Some(CertProtection::Password(PbeChoice::AES_256_CBC)),
        cert_kdf: KdfOpts::PBKDF2_SHA256,
        mac: Some(MacOpts::SHA256),
        enveloped: None,
    };

    /// [`Opts::MODERN_2023`] with a PBMAC1 integrity check.
    pub const MODERN_PBMAC1: Self = Self {
        key_cipher: Some(PbeChoice::AES_256_CBC),
        key_kdf: KdfOpts::PBKDF2_SHA256,
        cert_cipher: Some(CertProtection::Password(PbeChoice::AES_256_CBC)),
        cert_kdf: KdfOpts::PBKDF2_SHA256,
        mac: Some(MacOpts::PBMAC1_SHA256),
        enveloped: None,
    };

    /// SM4-CBC with PBKDF2-HMAC-SM3 and an SM3 MAC.
    pub const SHANGMI: Self = Self {
        key_cipher: Some(PbeChoice::SM4_CBC),
        key_kdf: PBKDF2_SM3,
        cert_cipher: Some(CertProtection::Password(PbeChoice::SM4_CBC)),
        cert_kdf: PBKDF2_SM3,
        mac: Some(MacOpts::SM3),
        enveloped: None,
    };

    /// Look a preset up by its CLI name.
    pub fn preset(name: &str) -> Option<Self> {
        let opts = match name {
            "legacy-rc2" => Self::LEGACY_RC2,
            "legacy-des" => Self::LEGACY_DES,
            "passwordless" => Self::PASSWORDLESS,
            "modern" | "modern-2023" => Self::MODERN_2023,
            "modern-pbmac1" => Self::MODERN_PBMAC1,
            "shangmi" => Self::SHANGMI,
            _ => return None,
        };
        Some(opts)
    }

    pub const PRESET_NAMES: &'static [&'static str] = &[
        "legacy-rc2",
        "legacy-des",
        "passwordless",
        "modern-2023",
        "modern-pbmac1",
        "shangmi",
    ];

    /// Protect the certificates with `envelopedData` for `opts.recipients`.
    pub fn with_enveloped(mut self, opts: EnvelopedOpts) -> Self {
        self.cert_cipher = Some(CertProtection::Enveloped);
        self.enveloped = Some(opts);
        self
    }

    pub fn with_key_cipher(mut self, cipher: Option<PbeChoice>) -> Self {
        self.key_cipher = cipher;
        self
    }

    pub fn with_cert_cipher(mut self, cipher: Option<CertProtection>) -> Self {
        self.cert_cipher = cipher;
        self
    }

    pub fn with_mac(mut self, mac: Option<MacOpts>) -> Self {
        self.mac = mac;
        self
    }

    /// Set the iteration count of both KDFs and the MAC.
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.key_kdf = self.key_kdf.with_iterations(iterations);
        self.cert_kdf = self.cert_kdf.with_iterations(iterations);
        if let Some(mac) = self.mac.as_mut() {
            mac.iterations = iterations;
        }
        self
    }

    /// Whether the container carries no password protection at all.
    pub fn is_passwordless(&self) -> bool {
        self.key_cipher.is_none()
            && !matches!(self.cert_cipher, Some(CertProtection::Password(_)))
            && self.mac.is_none()
    }
}

impl Default for Opts {
    fn default() -> Self {
        Self::MODERN_2023
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_by_name() {
        for name in Opts::PRESET_NAMES {
            assert!(Opts::preset(name).is_some(), "{name}");
        }
        assert!(Opts::preset("rot13").is_none());
        assert_eq!(
            Opts::preset("modern-pbmac1").unwrap().mac,
            Some(MacOpts::PBMAC1_SHA256)
        );
    }

    #[test]
    fn test_passwordless() {
        assert!(Opts::PASSWORDLESS.is_passwordless());
        assert!(!Opts::LEGACY_RC2.is_passwordless());
        assert!(!Opts::PASSWORDLESS.with_mac(Some(MacOpts::SHA1)).is_passwordless());
    }

    #[test]
    fn test_shangmi_uses_sm3_prf() {
        assert_eq!(
            Opts::SHANGMI.key_kdf.kdf,
            KdfChoice::Pbkdf2 {
                prf: algorithm::HMAC_SM3
            }
        );
        assert_eq!(Opts::SHANGMI.key_kdf.iterations, 2048);
    }

    #[test]
    fn test_with_iterations() {
        let opts = Opts::LEGACY_RC2.with_iterations(10);
        assert_eq!(opts.key_kdf.iterations, 10);
        assert_eq!(opts.cert_kdf.iterations, 10);
        assert_eq!(opts.mac.map(|m| m.iterations), Some(10));
    }
}
