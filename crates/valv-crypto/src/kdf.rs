#![forbid(unsafe_code)]

//! Password-based key derivation.
//!
//! Three constructions are used by PKCS#12 files in the wild:
//! 1. PKCS#12 KDF (RFC 7292 Appendix B): legacy PBE key/IV and the legacy MAC key
//! 2. PBKDF1 (RFC 8018 §5.1): PBES1 schemes
//! 3. PBKDF2 and scrypt (RFC 8018 §5.2, RFC 7914): PBES2 and PBMAC1
//!
//! PBKDF2 is dispatched per digest through [`crate::HashAlgorithm`]; this
//! module holds the generic building blocks.

use digest::Digest;
use valv_core::Error;

/// PKCS#12 KDF ID values (RFC 7292 Appendix B.3).
pub const ID_KEY: u8 = 1;
pub const ID_IV: u8 = 2;
pub const ID_MAC: u8 = 3;

/// PKCS#12 KDF (RFC 7292 Appendix B) over digest `D` with block size `v`.
///
/// `password` is already BMP-encoded (see [`password_to_bmp`]). An empty
/// slice is a legitimate input and produces an empty `P` block.
pub fn pkcs12_kdf<D: Digest>(
    id: u8,
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    output_len: usize,
    v: usize,
) -> Vec<u8> {
    let u = <D as Digest>::output_size();

    // D = id repeated v times
    let d_block = vec![id; v];

    // I = S || P, each padded by repetition to a multiple of v
    let s = extend_to_multiple(salt, v);
    let p = extend_to_multiple(password, v);
    let mut i_block = Vec::with_capacity(s.len() + p.len());
    i_block.extend_from_slice(&s);
    i_block.extend_from_slice(&p);

    let num_blocks = output_len.div_ceil(u);
    let mut result = Vec::with_capacity(num_blocks * u);

    for block_idx in 0..num_blocks {
        // A = H^c(D || I)
        let mut hasher = D::new();
        hasher.update(&d_block);
        hasher.update(&i_block);
        let mut a = hasher.finalize().to_vec();
        for _ in 1..iterations {
            a = D::digest(&a).to_vec();
        }

        result.extend_from_slice(&a);

        if block_idx + 1 < num_blocks {
            // I_j = (I_j + B + 1) mod 2^(v*8)
            let b = extend_to_multiple(&a, v);
            for chunk in i_block.chunks_mut(v) {
                add_one_plus_b(chunk, &b);
            }
        }
    }

    result.truncate(output_len);
    result
}

/// Repeat `data` until its length is the next multiple of `v`.
/// Empty input stays empty.
fn extend_to_multiple(data: &[u8], v: usize) -> Vec<u8> {
    if data.is_empty() {
        return Vec::new();
    }
    let len = data.len().div_ceil(v) * v;
    data.iter().copied().cycle().take(len).collect()
}

/// Compute (block + b + 1) mod 2^(8 * block.len()) in place.
fn add_one_plus_b(block: &mut [u8], b: &[u8]) {
    let mut carry: u16 = 1;
    for k in (0..block.len()).rev() {
        let sum = block[k] as u16 + b[k] as u16 + carry;
        block[k] = sum as u8;
        carry = sum >> 8;
    }
}

/// Encode a password as a BMPString (UTF-16BE) with two trailing zero bytes.
///
/// The empty password encodes to `[0, 0]`. Some encoders use a zero-length
/// buffer instead; callers that need that form pass `&[]` directly.
pub fn password_to_bmp(password: &str) -> Vec<u8> {
    let mut bmp = Vec::with_capacity(password.len() * 2 + 2);
    for c in password.encode_utf16() {
        bmp.extend_from_slice(&c.to_be_bytes());
    }
    bmp.extend_from_slice(&[0, 0]);
    bmp
}

/// PBKDF1 (RFC 8018 §5.1). `output_len` may not exceed the digest size.
pub fn pbkdf1<D: Digest>(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    output_len: usize,
) -> Result<Vec<u8>, Error> {
    if output_len > <D as Digest>::output_size() {
        return Err(Error::Crypto(format!(
            "PBKDF1 cannot derive {output_len} bytes from a {}-byte digest",
            <D as Digest>::output_size()
        )));
    }
    let mut hasher = D::new();
    hasher.update(password);
    hasher.update(salt);
    let mut t = hasher.finalize().to_vec();
    for _ in 1..iterations {
        t = D::digest(&t).to_vec();
    }
    t.truncate(output_len);
    Ok(t)
}

/// scrypt (RFC 7914) with cost `2^log_n`, block size `r` and parallelism `p`.
pub fn scrypt(
    password: &[u8],
    salt: &[u8],
    log_n: u8,
    r: u32,
    p: u32,
    output: &mut [u8],
) -> Result<(), Error> {
    let params = scrypt::Params::new(log_n, r, p, output.len())
        .map_err(|e| Error::Crypto(format!("invalid scrypt parameters: {e}")))?;
    scrypt::scrypt(password, salt, &params, output)
        .map_err(|e| Error::Crypto(format!("scrypt failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha1::Sha1;
    use sha2::Sha256;

    #[test]
    fn test_pkcs12_kdf_sha1_key_and_iv() {
        let password = password_to_bmp("smeg");
        let salt = hex::decode("0a58cf64530d823f").unwrap();
        let key = pkcs12_kdf::<Sha1>(ID_KEY, &password, &salt, 1, 24, 64);
        assert_eq!(
            hex::encode(key),
            "8aaae6297b6cb04642ab5b077851284eb7128f1a2a7fbca3"
        );
        let iv = pkcs12_kdf::<Sha1>(ID_IV, &password, &salt, 1, 8, 64);
        assert_eq!(hex::encode(iv), "79993dfe048d3b76");
    }

    #[test]
    fn test_pkcs12_kdf_sha1_mac_key() {
        let password = password_to_bmp("queeg");
        let salt = hex::decode("3d83c0e4546ac140").unwrap();
        let key = pkcs12_kdf::<Sha1>(ID_MAC, &password, &salt, 1000, 20, 64);
        assert_eq!(hex::encode(key), "17b9e78ea534fc2b6a35512d03799d9ea3c461c0");
    }

    #[test]
    fn test_pkcs12_kdf_sha256() {
        let password = password_to_bmp("test");
        let key = pkcs12_kdf::<Sha256>(ID_KEY, &password, b"saltsalt", 2048, 32, 64);
        assert_eq!(
            hex::encode(key),
            "98c91164482561333b50e5ce54de82996b58d5c66649bb9cbd45668f23049f2b"
        );
    }

    #[test]
    fn test_pkcs12_kdf_empty_password_forms_differ() {
        let sentinel = pkcs12_kdf::<Sha1>(ID_MAC, &password_to_bmp(""), b"salt", 1, 20, 64);
        let zero_len = pkcs12_kdf::<Sha1>(ID_MAC, &[], b"salt", 1, 20, 64);
        assert_ne!(sentinel, zero_len);
    }

    #[test]
    fn test_password_to_bmp() {
        assert_eq!(password_to_bmp(""), vec![0x00, 0x00]);
        assert_eq!(password_to_bmp("A"), vec![0x00, 0x41, 0x00, 0x00]);
        assert_eq!(
            password_to_bmp("ab"),
            vec![0x00, 0x61, 0x00, 0x62, 0x00, 0x00]
        );
        // Non-ASCII characters keep their UTF-16 code unit
        assert_eq!(password_to_bmp("é"), vec![0x00, 0xe9, 0x00, 0x00]);
    }

    #[test]
    fn test_pbkdf1() {
        let salt = hex::decode("78578e5a5d63cb06").unwrap();
        let dk = pbkdf1::<Sha1>(b"password", &salt, 1000, 16).unwrap();
        assert_eq!(hex::encode(dk), "dc19847e05c64d2faf10ebfb4a3d2a20");
        let dk = pbkdf1::<md5::Md5>(b"password", &salt, 1000, 16).unwrap();
        assert_eq!(hex::encode(dk), "c11246e6b87e77a09ab0643de76e1ea7");
    }

    #[test]
    fn test_pbkdf1_rejects_long_output() {
        assert!(pbkdf1::<md5::Md5>(b"password", b"salt", 1, 17).is_err());
    }

    #[test]
    fn test_scrypt_rfc7914() {
        let mut out = [0u8; 64];
        scrypt(b"", b"", 4, 1, 1, &mut out).unwrap();
        assert_eq!(
            hex::encode(out),
            "77d6576238657b203b19ca42c18a0497f16b4844e3074ae8dfdffa3fede21442\
             fcd0069ded0948f8326a753a0fc81f17e8d3e0fb2e0d3628cf35e20c38d18906"
        );
    }
}
