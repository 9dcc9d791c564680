#![forbid(unsafe_code)]

//! Loading keys and certificates from PEM or DER files.
//!
//! The format is auto-detected: input starting with `-----BEGIN` is PEM,
//! anything else is treated as DER.

use crate::key::PrivateKey;
use crate::x509::Certificate;
use valv_core::Error;

const PEM_BEGIN: &str = "-----BEGIN ";
const PEM_END: &str = "-----END ";

fn is_pem(data: &[u8]) -> bool {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    data[start..].starts_with(PEM_BEGIN.as_bytes())
}

/// Split concatenated PEM blocks, ignoring any text between them.
fn pem_blocks(data: &[u8]) -> Result<Vec<(String, Vec<u8>)>, Error> {
    let text = std::str::from_utf8(data)
        .map_err(|e| Error::Key(format!("PEM data is not valid UTF-8: {e}")))?;

    let mut blocks = Vec::new();
    let mut current: Option<String> = None;
    for line in text.lines().map(str::trim_end) {
        if let Some(block) = current.as_mut() {
            block.push('\n');
            block.push_str(line);
            if !line.starts_with(PEM_END) {
                continue;
            }
            let (label, der) = pem_rfc7468::decode_vec(block.as_bytes())
                .map_err(|e| Error::Key(format!("failed to decode PEM: {e}")))?;
            blocks.push((label.to_string(), der));
            current = None;
        } else if line.starts_with(PEM_BEGIN) {
            current = Some(line.to_string());
        }
    }
    if current.is_some() {
        return Err(Error::Key("unterminated PEM block".into()));
    }
    Ok(blocks)
}

/// Load a private key from PKCS#8 (`PRIVATE KEY`) or PKCS#1
/// (`RSA PRIVATE KEY`) PEM, or from PKCS#8 DER.
pub fn load_private_key(data: &[u8]) -> Result<PrivateKey, Error> {
    if !is_pem(data) {
        return PrivateKey::from_pkcs8_der(data);
    }

    let blocks = pem_blocks(data)?;
    let (label, der) = blocks
        .into_iter()
        .find(|(label, _)| label.ends_with("PRIVATE KEY"))
        .ok_or_else(|| Error::Key("no private key found in PEM data".into()))?;
    match label.as_str() {
        "PRIVATE KEY" => PrivateKey::from_pkcs8_der(&der),
        "RSA PRIVATE KEY" => {
            use rsa::pkcs1::DecodeRsaPrivateKey;
            let key = rsa::RsaPrivateKey::from_pkcs1_der(&der)
                .map_err(|e| Error::Key(format!("failed to parse RSA private key PEM: {e}")))?;
            Ok(PrivateKey::Rsa(key))
        }
        other => Err(Error::Key(format!("unsupported PEM label: {other}"))),
    }
}

/// Load every certificate from a PEM bundle, or the single certificate of
/// a DER file.
pub fn load_certificates(data: &[u8]) -> Result<Vec<Certificate>, Error> {
    if !is_pem(data) {
        return Ok(vec![Certificate::from_der(data)?]);
    }

    let certs = pem_blocks(data)?
        .into_iter()
        .filter(|(label, _)| label == "CERTIFICATE")
        .map(|(_, der)| Certificate::from_der(&der))
        .collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(Error::Certificate("no certificate found in PEM data".into()));
    }
    Ok(certs)
}

/// Read and load a private key file.
pub fn load_private_key_file(path: &std::path::Path) -> Result<PrivateKey, Error> {
    load_private_key(&std::fs::read(path)?)
}

/// Read and load a certificate file.
pub fn load_certificates_file(path: &std::path::Path) -> Result<Vec<Certificate>, Error> {
    load_certificates(&std::fs::read(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyKind;

    fn data(name: &str) -> Vec<u8> {
        let path = std::path::Path::new("../../test-data/pkcs12").join(name);
        std::fs::read(&path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()))
    }

    #[test]
    fn test_pkcs8_pem_and_der_agree() {
        let pem = load_private_key(&data("key.pem")).unwrap();
        let der = load_private_key(&data("key.pk8.der")).unwrap();
        assert_eq!(pem.kind(), KeyKind::Rsa);
        assert_eq!(pem.as_rsa(), der.as_rsa());
    }

    #[test]
    fn test_pkcs1_pem() {
        use rsa::pkcs1::EncodeRsaPrivateKey;
        let key = load_private_key(&data("key.pem")).unwrap();
        let pkcs1 = key
            .as_rsa()
            .unwrap()
            .to_pkcs1_pem(rsa::pkcs8::LineEnding::LF)
            .unwrap();
        let again = load_private_key(pkcs1.as_bytes()).unwrap();
        assert_eq!(again.as_rsa(), key.as_rsa());
    }

    #[test]
    fn test_certificate_bundle() {
        let mut bundle = data("cert.pem");
        bundle.extend_from_slice(b"\nsome comment\n");
        bundle.extend_from_slice(&data("ca.pem"));
        let certs = load_certificates(&bundle).unwrap();
        assert_eq!(certs.len(), 2);
        assert_eq!(certs[0].subject(), "CN=valv test leaf");
        assert_eq!(certs[1].subject(), "CN=valv test ca");

        let der = load_certificates(&data("ca.der")).unwrap();
        assert_eq!(der, vec![certs[1].clone()]);
    }

    #[test]
    fn test_crlf_bundle_and_unterminated_block() {
        let pem = String::from_utf8(data("cert.pem")).unwrap();
        let crlf = format!("{}\r\n{}", pem.replace('\n', "\r\n"), pem);
        assert_eq!(load_certificates(crlf.as_bytes()).unwrap().len(), 2);

        let cut = &pem[..pem.find(PEM_END).unwrap()];
        assert!(matches!(
            load_certificates(cut.as_bytes()),
            Err(Error::Key(_))
        ));
    }

    #[test]
    fn test_no_key_in_pem() {
        assert!(matches!(
            load_private_key(&data("cert.pem")),
            Err(Error::Key(_))
        ));
    }
}
