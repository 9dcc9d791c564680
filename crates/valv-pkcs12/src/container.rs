#![forbid(unsafe_code)]

//! The PKCS#12 container: decode pipeline, bag classification and the
//! encode pipeline.

use rand_core::CryptoRngCore;
use valv_core::{algorithm, Error};
use valv_crypto::AlgorithmRegistry;
use valv_keys::{Certificate, PrivateKey};

use crate::asn1::{self, ContentInfo, EncryptedContentInfo, EncryptedData, Pfx, SafeBag};
use crate::attributes::BagAttributes;
use crate::bags::{self, CertValue};
use crate::envelope::{self, EnvelopedOpts};
use crate::mac;
use crate::opts::{CertProtection, Opts};
use crate::pbe::{self, Password};

/// A trusted certificate as Java keystores record it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustStoreEntry {
    pub certificate: Certificate,
    /// The alias, written as `friendlyName`.
    pub friendly_name: String,
    /// The remaining bag attributes, including the trust marker values.
    pub attributes: BagAttributes,
}

impl TrustStoreEntry {
    pub fn new(certificate: Certificate, friendly_name: impl Into<String>) -> Self {
        Self {
            certificate,
            friendly_name: friendly_name.into(),
            attributes: BagAttributes::java_trusted(),
        }
    }
}

/// The decoded contents of a PKCS#12 file, or the contents to encode.
#[derive(Debug, Clone, Default)]
pub struct Pkcs12 {
    private_key: Option<PrivateKey>,
    private_key_attributes: BagAttributes,
    cert: Option<Certificate>,
    cert_attributes: BagAttributes,
    ca_certs: Vec<Certificate>,
    ca_cert_attributes: Vec<BagAttributes>,
    trust_stores: Vec<TrustStoreEntry>,
    secret_key: Option<Vec<u8>>,
    secret_key_attributes: BagAttributes,
    crls: Vec<Vec<u8>>,
    crl_attributes: Vec<BagAttributes>,
    unknown_bags: Vec<SafeBag>,
    local_key_id: Option<Vec<u8>>,
}

impl Pkcs12 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `der` with the default registry.
    pub fn parse(der: &[u8], password: &str) -> Result<Self, Error> {
        Decoder::new().decode(der, password)
    }

    // ── Accessors ──────────────────────────────────────────────────────

    pub fn private_key(&self) -> Option<&PrivateKey> {
        self.private_key.as_ref()
    }

    pub fn private_key_attributes(&self) -> &BagAttributes {
        &self.private_key_attributes
    }

    /// The end-entity certificate.
    pub fn cert(&self) -> Option<&Certificate> {
        self.cert.as_ref()
    }

    pub fn cert_attributes(&self) -> &BagAttributes {
        &self.cert_attributes
    }

    pub fn ca_certs(&self) -> &[Certificate] {
        &self.ca_certs
    }

    /// Bag attributes of each CA certificate, in `ca_certs` order.
    pub fn ca_cert_attributes(&self) -> &[BagAttributes] {
        &self.ca_cert_attributes
    }

    /// Trusted certificates, without their aliases.
    pub fn trust_stores(&self) -> impl Iterator<Item = &Certificate> + '_ {
        self.trust_stores.iter().map(|e| &e.certificate)
    }

    pub fn trust_store_entries(&self) -> &[TrustStoreEntry] {
        &self.trust_stores
    }

    pub fn secret_key(&self) -> Option<&[u8]> {
        self.secret_key.as_deref()
    }

    pub fn secret_key_attributes(&self) -> &BagAttributes {
        &self.secret_key_attributes
    }

    /// DER-encoded certificate revocation lists.
    pub fn crls(&self) -> &[Vec<u8>] {
        &self.crls
    }

    pub fn crl_attributes(&self) -> &[BagAttributes] {
        &self.crl_attributes
    }

    /// Bags that were carried through without interpretation.
    pub fn unknown_bags(&self) -> &[SafeBag] {
        &self.unknown_bags
    }

    // ── Builders ───────────────────────────────────────────────────────

    pub fn add_private_key(mut self, key: PrivateKey) -> Self {
        self.private_key = Some(key);
        self
    }

    /// Set the end-entity certificate.
    pub fn add_cert(mut self, cert: Certificate) -> Self {
        self.cert = Some(cert);
        self
    }

    pub fn add_ca_cert(self, cert: Certificate) -> Self {
        self.add_ca_cert_with_attributes(cert, BagAttributes::default())
    }

    pub fn add_ca_cert_with_attributes(
        mut self,
        cert: Certificate,
        attributes: BagAttributes,
    ) -> Self {
        self.ca_certs.push(cert);
        self.ca_cert_attributes.push(attributes);
        self
    }

    pub fn add_ca_certs(self, certs: impl IntoIterator<Item = Certificate>) -> Self {
        certs.into_iter().fold(self, Self::add_ca_cert)
    }

    pub fn add_trust_store_entry(
        mut self,
        certificate: Certificate,
        friendly_name: impl Into<String>,
    ) -> Self {
        self.trust_stores
            .push(TrustStoreEntry::new(certificate, friendly_name));
        self
    }

    pub fn add_trust_store_entries(
        mut self,
        entries: impl IntoIterator<Item = TrustStoreEntry>,
    ) -> Self {
        self.trust_stores.extend(entries);
        self
    }

    pub fn add_secret_key(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.secret_key = Some(secret.into());
        self
    }

    pub fn add_crl(mut self, crl: impl Into<Vec<u8>>) -> Self {
        self.crls.push(crl.into());
        self.crl_attributes.push(BagAttributes::default());
        self
    }

    pub fn add_unknown_bag(mut self, bag: SafeBag) -> Self {
        self.unknown_bags.push(bag);
        self
    }

    /// Override the `localKeyId` written for the key/certificate pair and
    /// the secret key.
    pub fn with_local_key_id(mut self, id: impl Into<Vec<u8>>) -> Self {
        self.local_key_id = Some(id.into());
        self
    }

    /// Set the `friendlyName` of the private key and its certificate.
    pub fn with_friendly_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.private_key_attributes.friendly_name = Some(name.clone());
        self.cert_attributes.friendly_name = Some(name);
        self
    }

    // ── Encoding ───────────────────────────────────────────────────────

    /// Encode with the default registry.
    pub fn marshal(
        &self,
        rng: &mut dyn CryptoRngCore,
        password: &str,
        opts: &Opts,
    ) -> Result<Vec<u8>, Error> {
        self.marshal_with(AlgorithmRegistry::global(), rng, password, opts)
    }

    pub fn marshal_with(
        &self,
        registry: &AlgorithmRegistry,
        rng: &mut dyn CryptoRngCore,
        password: &str,
        opts: &Opts,
    ) -> Result<Vec<u8>, Error> {
        if opts.is_passwordless() && !password.is_empty() {
            return Err(Error::UnsupportedFeature(
                "a password-less container cannot carry a password".into(),
            ));
        }
        let password = Password::new(password);
        let sha1 = registry.hash(algorithm::SHA1)?;

        let pair_id = self
            .local_key_id
            .clone()
            .or_else(|| self.private_key_attributes.local_key_id.clone())
            .or_else(|| self.cert.as_ref().map(|c| sha1.digest(c.der())));

        let mut contents = Vec::with_capacity(2);

        // Certificate side.
        let mut cert_bags = Vec::new();
        if let Some(cert) = &self.cert {
            let mut attrs = self.cert_attributes.clone();
            attrs.local_key_id = pair_id.clone();
            cert_bags.push(bags::encode_cert_bag(
                &CertValue::X509(cert.der().to_vec()),
                &attrs,
            ));
        }
        for (i, ca) in self.ca_certs.iter().enumerate() {
            let attrs = self.ca_cert_attributes.get(i).cloned().unwrap_or_default();
            cert_bags.push(bags::encode_cert_bag(
                &CertValue::X509(ca.der().to_vec()),
                &attrs,
            ));
        }
        for entry in &self.trust_stores {
            let mut attrs = entry.attributes.clone();
            attrs.friendly_name = Some(entry.friendly_name.clone());
            attrs.java_trust_store = true;
            cert_bags.push(bags::encode_cert_bag(
                &CertValue::X509(entry.certificate.der().to_vec()),
                &attrs,
            ));
        }
        for (i, crl) in self.crls.iter().enumerate() {
            let attrs = self.crl_attributes.get(i).cloned().unwrap_or_default();
            cert_bags.push(bags::encode_crl_bag(crl, &attrs));
        }
        cert_bags.extend(self.unknown_bags.iter().cloned());

        if !cert_bags.is_empty() {
            let safe_contents = asn1::encode_safe_contents(&cert_bags);
            let content = match opts.cert_cipher {
                None => ContentInfo::Data(safe_contents),
                Some(CertProtection::Password(choice)) => {
                    let (ct, alg) = pbe::encrypt(
                        registry,
                        rng,
                        &password,
                        &safe_contents,
                        &choice,
                        &opts.cert_kdf,
                    )?;
                    ContentInfo::EncryptedData(EncryptedData {
                        version: 0,
                        content: EncryptedContentInfo::new(alg, ct),
                    })
                }
                Some(CertProtection::Enveloped) => {
                    let enveloped = opts.enveloped.as_ref().ok_or_else(|| {
                        Error::InvalidConfig(
                            "enveloped certificate protection without recipients".into(),
                        )
                    })?;
                    ContentInfo::EnvelopedData(envelope::encrypt(
                        registry,
                        rng,
                        &safe_contents,
                        enveloped,
                    )?)
                }
            };
            tracing::debug!(
                bags = cert_bags.len(),
                content_type = %algorithm::dotted(content.content_type()),
                "encoded certificate safe contents"
            );
            contents.push(content);
        }

        // Key side.
        let mut key_bags = Vec::new();
        if let Some(key) = &self.private_key {
            let mut attrs = self.private_key_attributes.clone();
            attrs.local_key_id = pair_id.clone();
            let bag = match &opts.key_cipher {
                Some(choice) => bags::encode_shrouded_key_bag(
                    registry,
                    rng,
                    &password,
                    key,
                    choice,
                    &opts.key_kdf,
                    &attrs,
                )?,
                None => bags::encode_key_bag(key, &attrs)?,
            };
            tracing::trace!(kind = %key.kind(), "encoded key bag");
            key_bags.push(bag);
        }
        if let Some(secret) = &self.secret_key {
            let mut attrs = self.secret_key_attributes.clone();
            let id = self
                .local_key_id
                .clone()
                .or_else(|| attrs.local_key_id.clone())
                .unwrap_or_else(|| sha1.digest(secret));
            attrs.local_key_id = Some(id);
            let cipher = opts.key_cipher.as_ref().map(|c| (c, &opts.key_kdf));
            key_bags.push(bags::encode_secret_bag(
                registry, rng, &password, secret, cipher, &attrs,
            )?);
        }
        if !key_bags.is_empty() {
            tracing::debug!(bags = key_bags.len(), "encoded key safe contents");
            contents.push(ContentInfo::Data(asn1::encode_safe_contents(&key_bags)));
        }

        let auth_safe = asn1::encode_authenticated_safe(&contents);
        let mac_data = opts
            .mac
            .as_ref()
            .map(|m| mac::compute(registry, rng, &auth_safe, &password, m))
            .transpose()?;
        tracing::debug!(
            contents = contents.len(),
            mac = mac_data.is_some(),
            "encoded PFX"
        );
        Ok(Pfx::new(auth_safe, mac_data).to_der())
    }
}

/// Decodes containers with a configurable registry and enveloped-data key.
#[derive(Debug, Clone)]
pub struct Decoder<'r> {
    registry: &'r AlgorithmRegistry,
    enveloped: Option<EnvelopedOpts>,
}

impl Decoder<'static> {
    pub fn new() -> Self {
        Self {
            registry: AlgorithmRegistry::global(),
            enveloped: None,
        }
    }
}

impl Default for Decoder<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'r> Decoder<'r> {
    pub fn with_registry<'a>(self, registry: &'a AlgorithmRegistry) -> Decoder<'a> {
        Decoder {
            registry,
            enveloped: self.enveloped,
        }
    }

    /// Supply the recipient key for `envelopedData` contents.
    pub fn with_enveloped_opts(mut self, opts: EnvelopedOpts) -> Self {
        self.enveloped = Some(opts);
        self
    }

    pub fn decode(&self, der: &[u8], password: &str) -> Result<Pkcs12, Error> {
        let pfx = Pfx::decode(der)?;

        // The MAC covers the raw authSafe octets and is checked before they
        // are interpreted.
        let (password, contents) = match &pfx.mac_data {
            Some(mac_data) => {
                let password = mac::verify_password(
                    self.registry,
                    mac_data,
                    &pfx.auth_safe,
                    Password::new(password),
                )?;
                (password, asn1::decode_authenticated_safe(&pfx.auth_safe)?)
            }
            None => {
                let contents = asn1::decode_authenticated_safe(&pfx.auth_safe)?;
                let all_enveloped = !contents.is_empty()
                    && contents
                        .iter()
                        .all(|c| matches!(c, ContentInfo::EnvelopedData(_)));
                if !password.is_empty() && !all_enveloped {
                    return Err(Error::MissingMac);
                }
                (Password::new(password), contents)
            }
        };
        tracing::debug!(
            contents = contents.len(),
            mac = pfx.mac_data.is_some(),
            "decoded PFX"
        );

        let mut safe_bags = Vec::new();
        for content in &contents {
            let plain = match content {
                ContentInfo::Data(data) => data.clone(),
                ContentInfo::EncryptedData(encrypted) => pbe::decrypt(
                    self.registry,
                    &password,
                    &encrypted.content.algorithm,
                    &encrypted.content.encrypted_content,
                )?,
                ContentInfo::EnvelopedData(env) => {
                    let recipient = self
                        .enveloped
                        .as_ref()
                        .and_then(|o| o.decryption_key.as_ref())
                        .ok_or_else(|| {
                            Error::UnsupportedFeature(
                                "enveloped content without a decryption key".into(),
                            )
                        })?;
                    envelope::decrypt(self.registry, env, recipient)?
                }
            };
            let decoded = asn1::decode_safe_contents(&plain)?;
            tracing::debug!(
                content_type = %algorithm::dotted(content.content_type()),
                bags = decoded.len(),
                "decoded safe contents"
            );
            safe_bags.extend(decoded);
        }

        self.classify(safe_bags, &password)
    }

    fn classify(&self, safe_bags: Vec<SafeBag>, password: &Password<'_>) -> Result<Pkcs12, Error> {
        let mut p12 = Pkcs12::default();
        let mut certs: Vec<(Certificate, BagAttributes)> = Vec::new();

        for bag in safe_bags {
            tracing::trace!(bag = %algorithm::dotted(&bag.bag_id), "classifying bag");
            let id = bag.bag_id.as_slice();
            if id == algorithm::KEY_BAG || id == algorithm::PKCS8_SHROUDED_KEY_BAG {
                if p12.private_key.is_some() {
                    p12.unknown_bags.push(bag);
                    continue;
                }
                p12.private_key = Some(bags::decode_key_bag(self.registry, password, &bag)?);
                p12.private_key_attributes = BagAttributes::from_attributes(&bag.attributes)?;
            } else if id == algorithm::CERT_BAG {
                match bags::decode_cert_bag(&bag)? {
                    CertValue::X509(der) => {
                        let cert = Certificate::from_der(&der)?;
                        certs.push((cert, BagAttributes::from_attributes(&bag.attributes)?));
                    }
                    CertValue::Sdsi(_) => p12.unknown_bags.push(bag),
                }
            } else if id == algorithm::CRL_BAG {
                p12.crls.push(bags::decode_crl_bag(&bag)?);
                p12.crl_attributes
                    .push(BagAttributes::from_attributes(&bag.attributes)?);
            } else if id == algorithm::SECRET_BAG {
                if p12.secret_key.is_some() {
                    p12.unknown_bags.push(bag);
                    continue;
                }
                p12.secret_key = Some(bags::decode_secret_bag(self.registry, password, &bag)?);
                p12.secret_key_attributes = BagAttributes::from_attributes(&bag.attributes)?;
            } else {
                p12.unknown_bags.push(bag);
            }
        }

        let key_id = p12.private_key_attributes.local_key_id.clone();
        let (trusted, candidates): (Vec<_>, Vec<_>) =
            certs.into_iter().partition(|(_, attrs)| attrs.java_trust_store);
        p12.trust_stores = trusted
            .into_iter()
            .map(|(certificate, mut attrs)| TrustStoreEntry {
                certificate,
                friendly_name: attrs.friendly_name.take().unwrap_or_default(),
                attributes: attrs,
            })
            .collect();

        let leaf = key_id
            .as_ref()
            .and_then(|id| {
                candidates
                    .iter()
                    .position(|(_, attrs)| attrs.local_key_id.as_ref() == Some(id))
            })
            .or_else(|| {
                candidates
                    .iter()
                    .position(|(_, attrs)| attrs.local_key_id.is_some())
            });
        for (i, (cert, attrs)) in candidates.into_iter().enumerate() {
            if Some(i) == leaf {
                p12.cert = Some(cert);
                p12.cert_attributes = attrs;
            } else {
                p12.ca_certs.push(cert);
                p12.ca_cert_attributes.push(attrs);
            }
        }

        tracing::debug!(
            key = p12.private_key.is_some(),
            cert = p12.cert.is_some(),
            ca_certs = p12.ca_certs.len(),
            trust_stores = p12.trust_stores.len(),
            secret = p12.secret_key.is_some(),
            crls = p12.crls.len(),
            unknown = p12.unknown_bags.len(),
            "classified bags"
        );
        Ok(p12)
    }
}
