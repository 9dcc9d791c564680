#![forbid(unsafe_code)]

//! CMS EnvelopedData (RFC 5652 §6) protection for the certificate side of
//! a container.
//!
//! Only the key transport recipient kind with an `IssuerAndSerialNumber`
//! identifier is produced or consumed. The content-encryption key is
//! random and wrapped for every recipient with RSA PKCS#1 v1.5 or OAEP.

use rand_core::CryptoRngCore;
use valv_core::{algorithm, Error};
use valv_crypto::{AlgorithmRegistry, KeyEncryption};
use valv_keys::{Certificate, PrivateKey};
use yasna::{ASN1Result, BERReader, Tag};

use crate::asn1::{AlgorithmIdentifier, EncryptedContentInfo};

/// The certificate and private key of the party opening an envelope.
#[derive(Debug, Clone)]
pub struct RecipientKey {
    pub certificate: Certificate,
    pub key: PrivateKey,
}

/// Settings for enveloped certificate protection.
#[derive(Debug, Clone)]
pub struct EnvelopedOpts {
    /// Content-encryption cipher OID.
    pub cipher: &'static [u64],
    pub key_encryption: KeyEncryption,
    /// Certificates to encrypt for (RSA keys).
    pub recipients: Vec<Certificate>,
    /// Key used to open enveloped content on decode.
    pub decryption_key: Option<RecipientKey>,
}

impl EnvelopedOpts {
    pub fn new(recipients: Vec<Certificate>) -> Self {
        Self {
            cipher: algorithm::AES256_CBC,
            key_encryption: KeyEncryption::RsaPkcs1v15,
            recipients,
            decryption_key: None,
        }
    }

    pub fn with_cipher(mut self, cipher: &'static [u64]) -> Self {
        self.cipher = cipher;
        self
    }

    pub fn with_key_encryption(mut self, key_encryption: KeyEncryption) -> Self {
        self.key_encryption = key_encryption;
        self
    }

    pub fn with_decryption_key(mut self, certificate: Certificate, key: PrivateKey) -> Self {
        self.decryption_key = Some(RecipientKey { certificate, key });
        self
    }
}

/// A parsed `KeyTransRecipientInfo` addressed by issuer and serial number.
struct KeyTransRecipient {
    issuer: Vec<u8>,
    serial: Vec<u8>,
    algorithm: AlgorithmIdentifier,
    encrypted_key: Vec<u8>,
}

impl KeyTransRecipient {
    /// Returns `None` for recipient kinds other than issuer-and-serial
    /// key transport.
    fn read(r: BERReader) -> ASN1Result<Option<Self>> {
        let tag = r.lookahead_tag()?;
        if tag != yasna::tags::TAG_SEQUENCE {
            r.read_der()?;
            return Ok(None);
        }
        r.read_sequence(|r| {
            let _version = r.next().read_u64()?;
            let rid = r.read_optional(|r| {
                r.read_sequence(|r| {
                    let issuer = r.next().read_der()?;
                    let serial = r.next().read_der()?;
                    Ok((issuer, serial))
                })
            })?;
            if rid.is_none() {
                // subjectKeyIdentifier [0]
                r.next().read_der()?;
            }
            let algorithm = AlgorithmIdentifier::read(r.next())?;
            let encrypted_key = r.next().read_bytes()?;
            Ok(rid.map(|(issuer, serial)| Self {
                issuer,
                serial,
                algorithm,
                encrypted_key,
            }))
        })
    }
}

/// Encrypt `data` for every recipient in `opts`, returning the
/// `EnvelopedData` DER.
pub fn encrypt(
    registry: &AlgorithmRegistry,
    rng: &mut dyn CryptoRngCore,
    data: &[u8],
    opts: &EnvelopedOpts,
) -> Result<Vec<u8>, Error> {
    if opts.recipients.is_empty() {
        return Err(Error::InvalidConfig(
            "enveloped data needs at least one recipient".into(),
        ));
    }

    let cipher = registry.cipher(opts.cipher)?;
    let mut cek = vec![0u8; cipher.key_size()];
    rng.fill_bytes(&mut cek);
    let mut iv = vec![0u8; cipher.iv_size()];
    rng.fill_bytes(&mut iv);
    let ciphertext = cipher.encrypt(&cek, &iv, data)?;
    let content = EncryptedContentInfo::new(
        AlgorithmIdentifier::new(opts.cipher, Some(cipher.encode_params(&iv))),
        ciphertext,
    );

    let transport = opts.key_encryption.algorithm();
    let key_alg = AlgorithmIdentifier::new(transport.oid(), transport.encode_params());
    let mut recipients = Vec::with_capacity(opts.recipients.len());
    for cert in &opts.recipients {
        let public_key = cert.rsa_public_key()?;
        recipients.push(KeyTransRecipient {
            issuer: cert.issuer_der()?,
            serial: cert.serial_der()?,
            algorithm: key_alg.clone(),
            encrypted_key: transport.encrypt(rng, &public_key, &cek)?,
        });
    }
    tracing::debug!(
        recipients = recipients.len(),
        cipher = cipher.name(),
        transport = transport.name(),
        "built enveloped data"
    );

    Ok(yasna::construct_der(|w| {
        w.write_sequence(|w| {
            w.next().write_u64(0);
            w.next().write_set_of(|w| {
                for ri in &recipients {
                    w.next().write_sequence(|w| {
                        w.next().write_u64(0);
                        w.next().write_sequence(|w| {
                            w.next().write_der(&ri.issuer);
                            w.next().write_der(&ri.serial);
                        });
                        ri.algorithm.write(w.next());
                        w.next().write_bytes(&ri.encrypted_key);
                    });
                }
            });
            content.write(w.next());
        })
    }))
}

/// Open `EnvelopedData` DER with the recipient's certificate and key.
pub fn decrypt(
    registry: &AlgorithmRegistry,
    envelope: &[u8],
    recipient: &RecipientKey,
) -> Result<Vec<u8>, Error> {
    let (recipients, content) = yasna::parse_ber(envelope, |r| {
        r.read_sequence(|r| {
            let _version = r.next().read_u64()?;
            // originatorInfo [0] IMPLICIT
            r.read_optional(|r| r.read_tagged_implicit(Tag::context(0), |r| r.read_der()))?;
            let mut recipients = Vec::new();
            r.next().read_set_of(|r| {
                if let Some(ri) = KeyTransRecipient::read(r)? {
                    recipients.push(ri);
                }
                Ok(())
            })?;
            let content = EncryptedContentInfo::read(r.next())?;
            r.read_optional(|r| r.read_der())?;
            Ok((recipients, content))
        })
    })
    .map_err(|e| Error::malformed("EnvelopedData", e))?;

    let issuer = recipient.certificate.issuer_der()?;
    let serial = recipient.certificate.serial_der()?;
    let ri = recipients
        .iter()
        .find(|ri| ri.issuer == issuer && ri.serial == serial)
        .ok_or_else(|| Error::Decryption("no matching recipient".into()))?;

    let private_key = recipient.key.as_rsa().ok_or_else(|| {
        Error::Key(format!(
            "enveloped data needs an RSA recipient key, got {}",
            recipient.key.kind()
        ))
    })?;
    let transport =
        registry.key_transport(&ri.algorithm.oid, ri.algorithm.parameters.as_deref())?;
    let cek = transport.decrypt(private_key, &ri.encrypted_key)?;

    let mut cipher = registry.cipher(&content.algorithm.oid)?;
    let iv = cipher.decode_params(content.algorithm.require_parameters()?)?;
    if cek.len() != cipher.key_size() {
        cipher.set_key_size(cek.len())?;
    }
    tracing::debug!(
        cipher = cipher.name(),
        transport = transport.name(),
        "opening enveloped data"
    );
    cipher.decrypt(&cek, &iv, &content.encrypted_content)
}
