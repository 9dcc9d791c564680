#![forbid(unsafe_code)]

//! Typed view of SafeBag attributes.

use crate::asn1::Attribute;
use valv_core::{algorithm, Error};
use yasna::models::ObjectIdentifier;
use yasna::tags::TAG_BMPSTRING;

/// The attributes of one bag. Well-known attributes are decoded; anything
/// else is kept verbatim in `other` and written back on encode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BagAttributes {
    /// `localKeyId` (PKCS#9), pairs a key with its certificate.
    pub local_key_id: Option<Vec<u8>>,
    /// `friendlyName` (PKCS#9 BMPString).
    pub friendly_name: Option<String>,
    /// Java trust-store marker (`2.16.840.1.113894.746875.1.1`).
    pub java_trust_store: bool,
    /// DER values of the trust-store marker. Empty means
    /// `anyExtendedKeyUsage` on encode.
    pub trusted_usages: Vec<Vec<u8>>,
    pub other: Vec<Attribute>,
}

impl BagAttributes {
    /// Attributes of a trust-store entry trusted for any usage.
    pub fn java_trusted() -> Self {
        Self {
            java_trust_store: true,
            trusted_usages: vec![any_extended_key_usage()],
            ..Self::default()
        }
    }

    pub fn with_local_key_id(mut self, id: impl Into<Vec<u8>>) -> Self {
        self.local_key_id = Some(id.into());
        self
    }

    pub fn with_friendly_name(mut self, name: impl Into<String>) -> Self {
        self.friendly_name = Some(name.into());
        self
    }

    pub fn from_attributes(attributes: &[Attribute]) -> Result<Self, Error> {
        let mut out = Self::default();
        for attr in attributes {
            let oid = attr.oid.as_slice();
            if oid == algorithm::LOCAL_KEY_ID {
                let value = single_value(attr)?;
                let id = yasna::parse_ber(value, |r| r.read_bytes())
                    .map_err(|e| Error::malformed("localKeyId", e))?;
                out.local_key_id = Some(id);
            } else if oid == algorithm::FRIENDLY_NAME {
                let value = single_value(attr)?;
                let bmp = yasna::parse_ber(value, |r| {
                    r.read_tagged_implicit(TAG_BMPSTRING, |r| r.read_bytes())
                })
                .map_err(|e| Error::malformed("friendlyName", e))?;
                out.friendly_name = Some(decode_bmp(&bmp)?);
            } else if oid == algorithm::JAVA_TRUSTED_KEY_USAGE {
                out.java_trust_store = true;
                out.trusted_usages = attr.values.clone();
            } else {
                out.other.push(attr.clone());
            }
        }
        Ok(out)
    }

    pub fn to_attributes(&self) -> Vec<Attribute> {
        let mut attrs = Vec::new();
        if let Some(name) = &self.friendly_name {
            let bmp = encode_bmp(name);
            attrs.push(Attribute {
                oid: algorithm::FRIENDLY_NAME.to_vec(),
                values: vec![yasna::construct_der(|w| {
                    w.write_tagged_implicit(TAG_BMPSTRING, |w| w.write_bytes(&bmp))
                })],
            });
        }
        if let Some(id) = &self.local_key_id {
            attrs.push(Attribute {
                oid: algorithm::LOCAL_KEY_ID.to_vec(),
                values: vec![yasna::construct_der(|w| w.write_bytes(id))],
            });
        }
        if self.java_trust_store {
            let values = if self.trusted_usages.is_empty() {
                vec![any_extended_key_usage()]
            } else {
                self.trusted_usages.clone()
            };
            attrs.push(Attribute {
                oid: algorithm::JAVA_TRUSTED_KEY_USAGE.to_vec(),
                values,
            });
        }
        attrs.extend(self.other.iter().cloned());
        attrs
    }
}

fn any_extended_key_usage() -> Vec<u8> {
    yasna::construct_der(|w| {
        w.write_oid(&ObjectIdentifier::from_slice(algorithm::ANY_EXTENDED_KEY_USAGE))
    })
}

fn single_value(attr: &Attribute) -> Result<&[u8], Error> {
    match attr.values.as_slice() {
        [value] => Ok(value),
        values => Err(Error::MalformedContainer(format!(
            "attribute {} has {} values, expected 1",
            algorithm::dotted(&attr.oid),
            values.len()
        ))),
    }
}

/// UTF-16BE, as BMPString carries it.
fn encode_bmp(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_be_bytes).collect()
}

fn decode_bmp(bytes: &[u8]) -> Result<String, Error> {
    if bytes.len() % 2 != 0 {
        return Err(Error::MalformedContainer(
            "BMPString with odd length".into(),
        ));
    }
    let units = bytes
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]));
    char::decode_utf16(units)
        .collect::<Result<String, _>>()
        .map_err(|e| Error::malformed("BMPString", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let attrs = BagAttributes {
            local_key_id: Some(vec![0xDE, 0xAD]),
            friendly_name: Some("rétt nafn".into()),
            java_trust_store: true,
            trusted_usages: vec![any_extended_key_usage()],
            other: vec![Attribute {
                oid: vec![1, 2, 3, 4],
                values: vec![vec![0x05, 0x00]],
            }],
        };
        let decoded = BagAttributes::from_attributes(&attrs.to_attributes()).unwrap();
        assert_eq!(decoded, attrs);
    }

    #[test]
    fn test_trust_marker_values_kept() {
        // id-kp-serverAuth instead of anyExtendedKeyUsage
        let server_auth = yasna::construct_der(|w| {
            w.write_oid(&ObjectIdentifier::from_slice(&[1, 3, 6, 1, 5, 5, 7, 3, 1]))
        });
        let attr = Attribute {
            oid: algorithm::JAVA_TRUSTED_KEY_USAGE.to_vec(),
            values: vec![server_auth.clone()],
        };
        let decoded = BagAttributes::from_attributes(&[attr.clone()]).unwrap();
        assert!(decoded.java_trust_store);
        assert_eq!(decoded.trusted_usages, vec![server_auth]);
        assert_eq!(decoded.to_attributes(), vec![attr]);

        let default = BagAttributes {
            java_trust_store: true,
            ..BagAttributes::default()
        };
        assert_eq!(
            BagAttributes::from_attributes(&default.to_attributes()).unwrap(),
            BagAttributes::java_trusted()
        );
    }

    #[test]
    fn test_friendly_name_encoding() {
        let attrs = BagAttributes::default().with_friendly_name("ab");
        let encoded = attrs.to_attributes();
        assert_eq!(encoded[0].values[0], vec![0x1E, 0x04, 0x00, b'a', 0x00, b'b']);
    }

    #[test]
    fn test_odd_bmp_rejected() {
        let attr = Attribute {
            oid: algorithm::FRIENDLY_NAME.to_vec(),
            values: vec![vec![0x1E, 0x01, 0x41]],
        };
        assert!(matches!(
            BagAttributes::from_attributes(&[attr]),
            Err(Error::MalformedContainer(_))
        ));
    }

    #[test]
    fn test_multi_valued_key_id_rejected() {
        let attr = Attribute {
            oid: algorithm::LOCAL_KEY_ID.to_vec(),
            values: vec![vec![0x04, 0x00], vec![0x04, 0x01, 0x01]],
        };
        assert!(BagAttributes::from_attributes(&[attr]).is_err());
    }
}
