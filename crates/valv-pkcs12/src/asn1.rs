#![forbid(unsafe_code)]

//! Typed PKCS#12 (RFC 7292) structures with BER decoding and DER encoding.
//!
//! Reading goes through `yasna::parse_ber` since PKCS#12 files produced in
//! the wild use BER (indefinite lengths, constructed OCTET STRINGs). Writing
//! always produces DER. Structural violations, including trailing bytes
//! after a top-level value, surface as [`Error::MalformedContainer`];
//! semantic checks (version, content type) happen after the structure has
//! been read.

use valv_core::{algorithm, Error};
use yasna::models::ObjectIdentifier;
use yasna::{ASN1Result, BERReader, DERWriter, Tag};

fn write_oid(w: DERWriter, oid: &[u64]) {
    w.write_oid(&ObjectIdentifier::from_slice(oid));
}

fn read_oid(r: BERReader) -> ASN1Result<Vec<u64>> {
    Ok(r.read_oid()?.components().to_vec())
}

// ── AlgorithmIdentifier ────────────────────────────────────────────────────

/// `AlgorithmIdentifier ::= SEQUENCE { algorithm OID, parameters ANY OPTIONAL }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmIdentifier {
    pub oid: Vec<u64>,
    /// DER of the parameters element, when present.
    pub parameters: Option<Vec<u8>>,
}

impl AlgorithmIdentifier {
    pub fn new(oid: &[u64], parameters: Option<Vec<u8>>) -> Self {
        Self {
            oid: oid.to_vec(),
            parameters,
        }
    }

    /// An identifier with an explicit NULL parameter.
    pub fn with_null(oid: &[u64]) -> Self {
        Self::new(oid, Some(yasna::construct_der(|w| w.write_null())))
    }

    pub fn is(&self, oid: &[u64]) -> bool {
        self.oid == oid
    }

    /// The parameters, or an error naming the algorithm when they are absent.
    pub fn require_parameters(&self) -> Result<&[u8], Error> {
        self.parameters.as_deref().ok_or_else(|| {
            Error::MalformedContainer(format!(
                "missing parameters for {}",
                algorithm::dotted(&self.oid)
            ))
        })
    }

    pub(crate) fn read(r: BERReader) -> ASN1Result<Self> {
        r.read_sequence(|r| {
            let oid = read_oid(r.next())?;
            let parameters = r.read_optional(|r| r.read_der())?;
            Ok(Self { oid, parameters })
        })
    }

    pub(crate) fn write(&self, w: DERWriter) {
        w.write_sequence(|w| {
            write_oid(w.next(), &self.oid);
            if let Some(params) = &self.parameters {
                w.next().write_der(params);
            }
        })
    }

    pub fn decode(der: &[u8]) -> Result<Self, Error> {
        yasna::parse_ber(der, Self::read).map_err(|e| Error::malformed("AlgorithmIdentifier", e))
    }

    pub fn to_der(&self) -> Vec<u8> {
        yasna::construct_der(|w| self.write(w))
    }
}

// ── MacData ────────────────────────────────────────────────────────────────

/// `DigestInfo ::= SEQUENCE { digestAlgorithm AlgorithmIdentifier, digest OCTET STRING }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestInfo {
    pub algorithm: AlgorithmIdentifier,
    pub digest: Vec<u8>,
}

impl DigestInfo {
    fn read(r: BERReader) -> ASN1Result<Self> {
        r.read_sequence(|r| {
            let algorithm = AlgorithmIdentifier::read(r.next())?;
            let digest = r.next().read_bytes()?;
            Ok(Self { algorithm, digest })
        })
    }

    fn write(&self, w: DERWriter) {
        w.write_sequence(|w| {
            self.algorithm.write(w.next());
            w.next().write_bytes(&self.digest);
        })
    }
}

/// `MacData ::= SEQUENCE { mac DigestInfo, macSalt OCTET STRING, iterations INTEGER DEFAULT 1 }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacData {
    pub mac: DigestInfo,
    pub salt: Vec<u8>,
    pub iterations: u32,
}

impl MacData {
    pub(crate) fn read(r: BERReader) -> ASN1Result<Self> {
        r.read_sequence(|r| {
            let mac = DigestInfo::read(r.next())?;
            let salt = r.next().read_bytes()?;
            let iterations = r.read_optional(|r| r.read_u32())?.unwrap_or(1);
            Ok(Self {
                mac,
                salt,
                iterations,
            })
        })
    }

    pub(crate) fn write(&self, w: DERWriter) {
        w.write_sequence(|w| {
            self.mac.write(w.next());
            w.next().write_bytes(&self.salt);
            if self.iterations != 1 {
                w.next().write_u32(self.iterations);
            }
        })
    }
}

// ── ContentInfo ────────────────────────────────────────────────────────────

/// `EncryptedContentInfo` of an `EncryptedData` or `EnvelopedData`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedContentInfo {
    pub content_type: Vec<u64>,
    pub algorithm: AlgorithmIdentifier,
    pub encrypted_content: Vec<u8>,
}

impl EncryptedContentInfo {
    pub fn new(algorithm: AlgorithmIdentifier, encrypted_content: Vec<u8>) -> Self {
        Self {
            content_type: algorithm::DATA.to_vec(),
            algorithm,
            encrypted_content,
        }
    }

    pub(crate) fn read(r: BERReader) -> ASN1Result<Self> {
        r.read_sequence(|r| {
            let content_type = read_oid(r.next())?;
            let algorithm = AlgorithmIdentifier::read(r.next())?;
            let encrypted_content = r
                .read_optional(|r| r.read_tagged_implicit(Tag::context(0), |r| r.read_bytes()))?
                .unwrap_or_default();
            Ok(Self {
                content_type,
                algorithm,
                encrypted_content,
            })
        })
    }

    pub(crate) fn write(&self, w: DERWriter) {
        w.write_sequence(|w| {
            write_oid(w.next(), &self.content_type);
            self.algorithm.write(w.next());
            w.next().write_tagged_implicit(Tag::context(0), |w| {
                w.write_bytes(&self.encrypted_content)
            });
        })
    }
}

/// `EncryptedData ::= SEQUENCE { version INTEGER, encryptedContentInfo }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedData {
    pub version: u64,
    pub content: EncryptedContentInfo,
}

impl EncryptedData {
    fn read(r: BERReader) -> ASN1Result<Self> {
        r.read_sequence(|r| {
            let version = r.next().read_u64()?;
            let content = EncryptedContentInfo::read(r.next())?;
            // unprotectedAttrs [1] IMPLICIT, ignored
            r.read_optional(|r| r.read_der())?;
            Ok(Self { version, content })
        })
    }

    fn write(&self, w: DERWriter) {
        w.write_sequence(|w| {
            w.next().write_u64(self.version);
            self.content.write(w.next());
        })
    }
}

/// A `ContentInfo` of one of the three content types PKCS#12 uses for
/// protection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentInfo {
    /// `data`: the OCTET STRING content.
    Data(Vec<u8>),
    /// `encryptedData`: password-protected content.
    EncryptedData(EncryptedData),
    /// `envelopedData`: the DER of the `EnvelopedData` structure.
    EnvelopedData(Vec<u8>),
}

/// A `ContentInfo` before its content type has been interpreted.
struct RawContentInfo {
    content_type: Vec<u64>,
    content: Option<Vec<u8>>,
}

impl RawContentInfo {
    fn read(r: BERReader) -> ASN1Result<Self> {
        r.read_sequence(|r| {
            let content_type = read_oid(r.next())?;
            let content = r.read_optional(|r| r.read_tagged(Tag::context(0), |r| r.read_der()))?;
            Ok(Self {
                content_type,
                content,
            })
        })
    }

    fn interpret(self) -> Result<ContentInfo, Error> {
        let ct = self.content_type.as_slice();
        let content = || {
            self.content.as_deref().ok_or_else(|| {
                Error::MalformedContainer(format!("{} content missing", algorithm::dotted(ct)))
            })
        };
        if ct == algorithm::DATA {
            let data = yasna::parse_ber(content()?, |r| r.read_bytes())
                .map_err(|e| Error::malformed("data content", e))?;
            Ok(ContentInfo::Data(data))
        } else if ct == algorithm::ENCRYPTED_DATA {
            let data = yasna::parse_ber(content()?, EncryptedData::read)
                .map_err(|e| Error::malformed("EncryptedData", e))?;
            Ok(ContentInfo::EncryptedData(data))
        } else if ct == algorithm::ENVELOPED_DATA {
            Ok(ContentInfo::EnvelopedData(content()?.to_vec()))
        } else if ct == algorithm::SIGNED_DATA {
            Err(Error::UnsupportedFeature(
                "signedData content (public-key integrity mode)".into(),
            ))
        } else {
            Err(Error::UnsupportedFeature(format!(
                "content type {}",
                algorithm::dotted(ct)
            )))
        }
    }
}

impl ContentInfo {
    pub fn decode(der: &[u8]) -> Result<Self, Error> {
        yasna::parse_ber(der, RawContentInfo::read)
            .map_err(|e| Error::malformed("ContentInfo", e))?
            .interpret()
    }

    /// Content type OID.
    pub fn content_type(&self) -> &'static [u64] {
        match self {
            Self::Data(_) => algorithm::DATA,
            Self::EncryptedData(_) => algorithm::ENCRYPTED_DATA,
            Self::EnvelopedData(_) => algorithm::ENVELOPED_DATA,
        }
    }

    pub(crate) fn write(&self, w: DERWriter) {
        w.write_sequence(|w| {
            write_oid(w.next(), self.content_type());
            w.next().write_tagged(Tag::context(0), |w| match self {
                Self::Data(data) => w.write_bytes(data),
                Self::EncryptedData(data) => data.write(w),
                Self::EnvelopedData(der) => w.write_der(der),
            });
        })
    }

    pub fn to_der(&self) -> Vec<u8> {
        yasna::construct_der(|w| self.write(w))
    }
}

/// `AuthenticatedSafe ::= SEQUENCE OF ContentInfo`
pub fn decode_authenticated_safe(der: &[u8]) -> Result<Vec<ContentInfo>, Error> {
    yasna::parse_ber(der, |r| r.collect_sequence_of(RawContentInfo::read))
        .map_err(|e| Error::malformed("AuthenticatedSafe", e))?
        .into_iter()
        .map(RawContentInfo::interpret)
        .collect()
}

pub fn encode_authenticated_safe(contents: &[ContentInfo]) -> Vec<u8> {
    yasna::construct_der(|w| {
        w.write_sequence(|w| {
            for content in contents {
                content.write(w.next());
            }
        })
    })
}

// ── Pfx ────────────────────────────────────────────────────────────────────

/// The outer `PFX` structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pfx {
    pub version: u64,
    /// Content of the `authSafe` data ContentInfo: a DER `AuthenticatedSafe`.
    /// This is the message the MAC is computed over.
    pub auth_safe: Vec<u8>,
    pub mac_data: Option<MacData>,
}

impl Pfx {
    pub fn new(auth_safe: Vec<u8>, mac_data: Option<MacData>) -> Self {
        Self {
            version: 3,
            auth_safe,
            mac_data,
        }
    }

    pub fn decode(der: &[u8]) -> Result<Self, Error> {
        let (version, auth_safe, mac_data) = yasna::parse_ber(der, |r| {
            r.read_sequence(|r| {
                let version = r.next().read_u64()?;
                let auth_safe = RawContentInfo::read(r.next())?;
                let mac_data = r.read_optional(MacData::read)?;
                Ok((version, auth_safe, mac_data))
            })
        })
        .map_err(|e| Error::malformed("PFX", e))?;

        if version != 3 {
            return Err(Error::UnsupportedVersion(version));
        }
        let auth_safe = match auth_safe.interpret()? {
            ContentInfo::Data(data) => data,
            other => {
                return Err(Error::UnsupportedFeature(format!(
                    "authSafe of content type {}",
                    algorithm::dotted(other.content_type())
                )))
            }
        };
        Ok(Self {
            version,
            auth_safe,
            mac_data,
        })
    }

    pub fn to_der(&self) -> Vec<u8> {
        yasna::construct_der(|w| {
            w.write_sequence(|w| {
                w.next().write_u64(self.version);
                ContentInfo::Data(self.auth_safe.clone()).write(w.next());
                if let Some(mac) = &self.mac_data {
                    mac.write(w.next());
                }
            })
        })
    }
}

// ── SafeBag ────────────────────────────────────────────────────────────────

/// `Attribute ::= SEQUENCE { attrId OID, attrValues SET OF ANY }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub oid: Vec<u64>,
    /// DER of each value.
    pub values: Vec<Vec<u8>>,
}

impl Attribute {
    fn read(r: BERReader) -> ASN1Result<Self> {
        r.read_sequence(|r| {
            let oid = read_oid(r.next())?;
            let mut values = Vec::new();
            r.next().read_set_of(|r| {
                values.push(r.read_der()?);
                Ok(())
            })?;
            Ok(Self { oid, values })
        })
    }

    fn write(&self, w: DERWriter) {
        w.write_sequence(|w| {
            write_oid(w.next(), &self.oid);
            w.next().write_set_of(|w| {
                for value in &self.values {
                    w.next().write_der(value);
                }
            });
        })
    }
}

/// `SafeBag ::= SEQUENCE { bagId OID, bagValue [0] EXPLICIT ANY, bagAttributes SET OF Attribute OPTIONAL }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeBag {
    pub bag_id: Vec<u64>,
    /// DER of the bag value (inside the `[0]` tag).
    pub value: Vec<u8>,
    pub attributes: Vec<Attribute>,
}

impl SafeBag {
    fn read(r: BERReader) -> ASN1Result<Self> {
        r.read_sequence(|r| {
            let bag_id = read_oid(r.next())?;
            let value = r.next().read_tagged(Tag::context(0), |r| r.read_der())?;
            let mut attributes = Vec::new();
            r.read_optional(|r| {
                r.read_set_of(|r| {
                    attributes.push(Attribute::read(r)?);
                    Ok(())
                })
            })?;
            Ok(Self {
                bag_id,
                value,
                attributes,
            })
        })
    }

    fn write(&self, w: DERWriter) {
        w.write_sequence(|w| {
            write_oid(w.next(), &self.bag_id);
            w.next()
                .write_tagged(Tag::context(0), |w| w.write_der(&self.value));
            if !self.attributes.is_empty() {
                w.next().write_set_of(|w| {
                    for attr in &self.attributes {
                        attr.write(w.next());
                    }
                });
            }
        })
    }
}

/// Deepest `safeContentsBag` nesting accepted on decode.
pub const MAX_SAFE_CONTENTS_DEPTH: usize = 8;

/// `SafeContents ::= SEQUENCE OF SafeBag`, with nested `safeContentsBag`
/// values flattened into the result.
pub fn decode_safe_contents(der: &[u8]) -> Result<Vec<SafeBag>, Error> {
    let mut out = Vec::new();
    collect_safe_contents(der, 0, &mut out)?;
    Ok(out)
}

fn collect_safe_contents(der: &[u8], depth: usize, out: &mut Vec<SafeBag>) -> Result<(), Error> {
    if depth > MAX_SAFE_CONTENTS_DEPTH {
        return Err(Error::MalformedContainer(format!(
            "safeContentsBag nested deeper than {MAX_SAFE_CONTENTS_DEPTH}"
        )));
    }
    let bags = yasna::parse_ber(der, |r| r.collect_sequence_of(SafeBag::read))
        .map_err(|e| Error::malformed("SafeContents", e))?;
    for bag in bags {
        if bag.bag_id == algorithm::SAFE_CONTENTS_BAG {
            collect_safe_contents(&bag.value, depth + 1, out)?;
        } else {
            out.push(bag);
        }
    }
    Ok(())
}

pub fn encode_safe_contents(bags: &[SafeBag]) -> Vec<u8> {
    yasna::construct_der(|w| {
        w.write_sequence(|w| {
            for bag in bags {
                bag.write(w.next());
            }
        })
    })
}

// ── EncryptedPrivateKeyInfo ────────────────────────────────────────────────

/// `EncryptedPrivateKeyInfo ::= SEQUENCE { encryptionAlgorithm, encryptedData OCTET STRING }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPrivateKeyInfo {
    pub algorithm: AlgorithmIdentifier,
    pub data: Vec<u8>,
}

impl EncryptedPrivateKeyInfo {
    pub fn decode(der: &[u8]) -> Result<Self, Error> {
        yasna::parse_ber(der, |r| {
            r.read_sequence(|r| {
                let algorithm = AlgorithmIdentifier::read(r.next())?;
                let data = r.next().read_bytes()?;
                Ok(Self { algorithm, data })
            })
        })
        .map_err(|e| Error::malformed("EncryptedPrivateKeyInfo", e))
    }

    pub fn to_der(&self) -> Vec<u8> {
        yasna::construct_der(|w| {
            w.write_sequence(|w| {
                self.algorithm.write(w.next());
                w.next().write_bytes(&self.data);
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bag() -> SafeBag {
        SafeBag {
            bag_id: algorithm::KEY_BAG.to_vec(),
            value: yasna::construct_der(|w| w.write_bytes(b"opaque")),
            attributes: vec![Attribute {
                oid: algorithm::LOCAL_KEY_ID.to_vec(),
                values: vec![yasna::construct_der(|w| w.write_bytes(&[1, 2, 3]))],
            }],
        }
    }

    #[test]
    fn test_pfx_roundtrip() {
        let mac = MacData {
            mac: DigestInfo {
                algorithm: AlgorithmIdentifier::with_null(algorithm::SHA256),
                digest: vec![0xAB; 32],
            },
            salt: vec![1; 8],
            iterations: 2048,
        };
        let pfx = Pfx::new(encode_authenticated_safe(&[]), Some(mac));
        let der = pfx.to_der();
        assert_eq!(Pfx::decode(&der).unwrap(), pfx);
    }

    #[test]
    fn test_mac_iterations_default() {
        let mac = MacData {
            mac: DigestInfo {
                algorithm: AlgorithmIdentifier::with_null(algorithm::SHA1),
                digest: vec![0; 20],
            },
            salt: vec![2; 8],
            iterations: 1,
        };
        let der = yasna::construct_der(|w| mac.write(w));
        // DEFAULT 1 is omitted from the encoding.
        let with_explicit = yasna::construct_der(|w| {
            w.write_sequence(|w| {
                mac.mac.write(w.next());
                w.next().write_bytes(&mac.salt);
                w.next().write_u32(1);
            })
        });
        assert!(der.len() < with_explicit.len());
        assert_eq!(yasna::parse_ber(&der, MacData::read).unwrap(), mac);
        assert_eq!(yasna::parse_ber(&with_explicit, MacData::read).unwrap(), mac);
    }

    #[test]
    fn test_unsupported_version() {
        let mut pfx = Pfx::new(encode_authenticated_safe(&[]), None);
        pfx.version = 4;
        assert!(matches!(
            Pfx::decode(&pfx.to_der()),
            Err(Error::UnsupportedVersion(4))
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut der = Pfx::new(encode_authenticated_safe(&[]), None).to_der();
        der.push(0);
        assert!(matches!(
            Pfx::decode(&der),
            Err(Error::MalformedContainer(_))
        ));
    }

    #[test]
    fn test_unknown_content_type() {
        let der = yasna::construct_der(|w| {
            w.write_sequence(|w| {
                write_oid(w.next(), &[1, 2, 840, 113549, 1, 7, 5]);
                w.next()
                    .write_tagged(Tag::context(0), |w| w.write_bytes(b"x"));
            })
        });
        assert!(matches!(
            ContentInfo::decode(&der),
            Err(Error::UnsupportedFeature(_))
        ));
    }

    #[test]
    fn test_content_info_roundtrip() {
        let contents = vec![
            ContentInfo::Data(b"plain".to_vec()),
            ContentInfo::EncryptedData(EncryptedData {
                version: 0,
                content: EncryptedContentInfo::new(
                    AlgorithmIdentifier::new(algorithm::PBES2, Some(vec![0x05, 0x00])),
                    vec![9; 16],
                ),
            }),
        ];
        let der = encode_authenticated_safe(&contents);
        assert_eq!(decode_authenticated_safe(&der).unwrap(), contents);
    }

    #[test]
    fn test_nested_safe_contents_flattened() {
        let inner = encode_safe_contents(&[sample_bag(), sample_bag()]);
        let nested = SafeBag {
            bag_id: algorithm::SAFE_CONTENTS_BAG.to_vec(),
            value: inner,
            attributes: Vec::new(),
        };
        let der = encode_safe_contents(&[sample_bag(), nested]);
        let bags = decode_safe_contents(&der).unwrap();
        assert_eq!(bags, vec![sample_bag(), sample_bag(), sample_bag()]);
    }

    fn nest(levels: usize) -> Vec<u8> {
        let mut der = encode_safe_contents(&[sample_bag()]);
        for _ in 0..levels {
            der = encode_safe_contents(&[SafeBag {
                bag_id: algorithm::SAFE_CONTENTS_BAG.to_vec(),
                value: der,
                attributes: Vec::new(),
            }]);
        }
        der
    }

    #[test]
    fn test_nested_safe_contents_depth_limit() {
        let bags = decode_safe_contents(&nest(MAX_SAFE_CONTENTS_DEPTH)).unwrap();
        assert_eq!(bags, vec![sample_bag()]);
        assert!(matches!(
            decode_safe_contents(&nest(MAX_SAFE_CONTENTS_DEPTH + 1)),
            Err(Error::MalformedContainer(_))
        ));
        assert!(matches!(
            decode_safe_contents(&nest(10_000)),
            Err(Error::MalformedContainer(_))
        ));
    }

    #[test]
    fn test_ber_indefinite_length_accepted() {
        // SEQUENCE (indefinite) { OID data, [0] (indefinite) { OCTET STRING "hi" } }
        let mut ber = vec![0x30, 0x80, 0x06, 0x09];
        ber.extend_from_slice(&[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x01]);
        ber.extend_from_slice(&[0xA0, 0x80, 0x04, 0x02, b'h', b'i', 0x00, 0x00]);
        ber.extend_from_slice(&[0x00, 0x00]);
        assert_eq!(
            ContentInfo::decode(&ber).unwrap(),
            ContentInfo::Data(b"hi".to_vec())
        );
    }
}
