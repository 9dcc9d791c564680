#![forbid(unsafe_code)]

//! Object identifier constants used by PKCS#12 and its companion standards.
//!
//! Each constant holds the arc components of the OID, in the form yasna's
//! `ObjectIdentifier::from_slice` accepts.

// ── Content types (PKCS#7 / CMS) ─────────────────────────────────────

pub const DATA: &[u64] = &[1, 2, 840, 113549, 1, 7, 1];
pub const SIGNED_DATA: &[u64] = &[1, 2, 840, 113549, 1, 7, 2];
pub const ENVELOPED_DATA: &[u64] = &[1, 2, 840, 113549, 1, 7, 3];
pub const ENCRYPTED_DATA: &[u64] = &[1, 2, 840, 113549, 1, 7, 6];

// ── Bag types (RFC 7292 §4.2) ────────────────────────────────────────

pub const KEY_BAG: &[u64] = &[1, 2, 840, 113549, 1, 12, 10, 1, 1];
pub const PKCS8_SHROUDED_KEY_BAG: &[u64] = &[1, 2, 840, 113549, 1, 12, 10, 1, 2];
pub const CERT_BAG: &[u64] = &[1, 2, 840, 113549, 1, 12, 10, 1, 3];
pub const CRL_BAG: &[u64] = &[1, 2, 840, 113549, 1, 12, 10, 1, 4];
pub const SECRET_BAG: &[u64] = &[1, 2, 840, 113549, 1, 12, 10, 1, 5];
pub const SAFE_CONTENTS_BAG: &[u64] = &[1, 2, 840, 113549, 1, 12, 10, 1, 6];

pub const X509_CERTIFICATE: &[u64] = &[1, 2, 840, 113549, 1, 9, 22, 1];
pub const SDSI_CERTIFICATE: &[u64] = &[1, 2, 840, 113549, 1, 9, 22, 2];
pub const X509_CRL: &[u64] = &[1, 2, 840, 113549, 1, 9, 23, 1];

// ── Bag attributes ───────────────────────────────────────────────────

pub const FRIENDLY_NAME: &[u64] = &[1, 2, 840, 113549, 1, 9, 20];
pub const LOCAL_KEY_ID: &[u64] = &[1, 2, 840, 113549, 1, 9, 21];
/// Oracle/Java "trusted key usage" attribute marking trust-store certificates.
pub const JAVA_TRUSTED_KEY_USAGE: &[u64] = &[2, 16, 840, 1, 113894, 746875, 1, 1];
pub const ANY_EXTENDED_KEY_USAGE: &[u64] = &[2, 5, 29, 37, 0];

// ── Legacy PKCS#12 PBE (RFC 7292 Appendix C) ─────────────────────────

pub const PBE_SHA1_RC4_128: &[u64] = &[1, 2, 840, 113549, 1, 12, 1, 1];
pub const PBE_SHA1_RC4_40: &[u64] = &[1, 2, 840, 113549, 1, 12, 1, 2];
pub const PBE_SHA1_3DES: &[u64] = &[1, 2, 840, 113549, 1, 12, 1, 3];
pub const PBE_SHA1_2DES: &[u64] = &[1, 2, 840, 113549, 1, 12, 1, 4];
pub const PBE_SHA1_RC2_128: &[u64] = &[1, 2, 840, 113549, 1, 12, 1, 5];
pub const PBE_SHA1_RC2_40: &[u64] = &[1, 2, 840, 113549, 1, 12, 1, 6];

// ── PKCS#5 (RFC 8018, RFC 9579) ──────────────────────────────────────

pub const PBE_MD5_DES: &[u64] = &[1, 2, 840, 113549, 1, 5, 3];
pub const PBE_MD5_RC2: &[u64] = &[1, 2, 840, 113549, 1, 5, 6];
pub const PBE_SHA1_DES: &[u64] = &[1, 2, 840, 113549, 1, 5, 10];
pub const PBE_SHA1_RC2: &[u64] = &[1, 2, 840, 113549, 1, 5, 11];
pub const PBKDF2: &[u64] = &[1, 2, 840, 113549, 1, 5, 12];
pub const PBES2: &[u64] = &[1, 2, 840, 113549, 1, 5, 13];
pub const PBMAC1: &[u64] = &[1, 2, 840, 113549, 1, 5, 14];
pub const SCRYPT: &[u64] = &[1, 3, 6, 1, 4, 1, 11591, 4, 11];

// ── Digest algorithms ────────────────────────────────────────────────

pub const MD5: &[u64] = &[1, 2, 840, 113549, 2, 5];
pub const SHA1: &[u64] = &[1, 3, 14, 3, 2, 26];
pub const SHA224: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 4];
pub const SHA256: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 1];
pub const SHA384: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 2];
pub const SHA512: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 3];
pub const SHA512_224: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 5];
pub const SHA512_256: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 6];
pub const SHA3_224: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 7];
pub const SHA3_256: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 8];
pub const SHA3_384: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 9];
pub const SHA3_512: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 10];
pub const SM3: &[u64] = &[1, 2, 156, 10197, 1, 401];
pub const STREEBOG256: &[u64] = &[1, 2, 643, 7, 1, 1, 2, 2];
pub const STREEBOG512: &[u64] = &[1, 2, 643, 7, 1, 1, 2, 3];

// ── HMAC algorithms (PBKDF2 PRFs and PBMAC1 message auth schemes) ────

pub const HMAC_MD5: &[u64] = &[1, 3, 6, 1, 5, 5, 8, 1, 1];
pub const HMAC_SHA1: &[u64] = &[1, 2, 840, 113549, 2, 7];
pub const HMAC_SHA224: &[u64] = &[1, 2, 840, 113549, 2, 8];
pub const HMAC_SHA256: &[u64] = &[1, 2, 840, 113549, 2, 9];
pub const HMAC_SHA384: &[u64] = &[1, 2, 840, 113549, 2, 10];
pub const HMAC_SHA512: &[u64] = &[1, 2, 840, 113549, 2, 11];
pub const HMAC_SHA512_224: &[u64] = &[1, 2, 840, 113549, 2, 12];
pub const HMAC_SHA512_256: &[u64] = &[1, 2, 840, 113549, 2, 13];
pub const HMAC_SHA3_224: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 13];
pub const HMAC_SHA3_256: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 14];
pub const HMAC_SHA3_384: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 15];
pub const HMAC_SHA3_512: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 16];
pub const HMAC_SM3: &[u64] = &[1, 2, 156, 10197, 1, 401, 3, 1];
pub const HMAC_STREEBOG256: &[u64] = &[1, 2, 643, 7, 1, 1, 4, 1];
pub const HMAC_STREEBOG512: &[u64] = &[1, 2, 643, 7, 1, 1, 4, 2];

// ── Block and stream ciphers ─────────────────────────────────────────

pub const AES128_CBC: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 1, 2];
pub const AES192_CBC: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 1, 22];
pub const AES256_CBC: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 1, 42];
pub const DES_CBC: &[u64] = &[1, 3, 14, 3, 2, 7];
pub const DES_EDE3_CBC: &[u64] = &[1, 2, 840, 113549, 3, 7];
pub const RC2_CBC: &[u64] = &[1, 2, 840, 113549, 3, 2];
pub const SM4_CBC: &[u64] = &[1, 2, 156, 10197, 1, 104, 2];

// ── Key transport ────────────────────────────────────────────────────

pub const RSA_ENCRYPTION: &[u64] = &[1, 2, 840, 113549, 1, 1, 1];
pub const RSAES_OAEP: &[u64] = &[1, 2, 840, 113549, 1, 1, 7];
pub const MGF1: &[u64] = &[1, 2, 840, 113549, 1, 1, 8];

// ── Private key algorithms (PKCS#8) ──────────────────────────────────

pub const DSA: &[u64] = &[1, 2, 840, 10040, 4, 1];
pub const EC_PUBLIC_KEY: &[u64] = &[1, 2, 840, 10045, 2, 1];
pub const SECP256R1: &[u64] = &[1, 2, 840, 10045, 3, 1, 7];
pub const SECP384R1: &[u64] = &[1, 3, 132, 0, 34];
pub const SECP521R1: &[u64] = &[1, 3, 132, 0, 35];
pub const SM2P256V1: &[u64] = &[1, 2, 156, 10197, 1, 301];
pub const ED25519: &[u64] = &[1, 3, 101, 112];
pub const GOST2012_256: &[u64] = &[1, 2, 643, 7, 1, 1, 1, 1];
pub const GOST2012_512: &[u64] = &[1, 2, 643, 7, 1, 1, 1, 2];

/// Render OID components in dotted form, e.g. `1.2.840.113549.1.7.1`.
pub fn dotted(oid: &[u64]) -> String {
    oid.iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(".")
}
