//! Containers written by OpenSSL 3 (`openssl pkcs12 -export`).
//!
//! All fixtures hold the same RSA-2048 key, its self-signed certificate
//! ("CN=valv test leaf") and, except for `nopass.p12`, an unrelated CA
//! certificate. Password: `secret123`.

use rand::rngs::StdRng;
use rand::SeedableRng;
use valv_core::Error;
use valv_keys::PrivateKey;
use valv_pkcs12::asn1::Pfx;
use valv_pkcs12::{Opts, Pkcs12};

const LEGACY: &[u8] = include_bytes!("../../../test-data/pkcs12/legacy.p12");
const MODERN: &[u8] = include_bytes!("../../../test-data/pkcs12/modern.p12");
const PBMAC1: &[u8] = include_bytes!("../../../test-data/pkcs12/pbmac1.p12");
const NOPASS: &[u8] = include_bytes!("../../../test-data/pkcs12/nopass.p12");
const CERT: &[u8] = include_bytes!("../../../test-data/pkcs12/cert.der");
const CA: &[u8] = include_bytes!("../../../test-data/pkcs12/ca.der");
const KEY: &[u8] = include_bytes!("../../../test-data/pkcs12/key.pk8.der");

const LOCAL_KEY_ID: &str = "62fe9d757768d4c7daa76a1e3f4ca92f28ad4141";

fn check(p12: &Pkcs12, expect_ca: bool) {
    let key = p12.private_key().expect("private key");
    let cert = p12.cert().expect("end-entity certificate");
    assert_eq!(cert.der(), CERT);
    assert_eq!(cert.subject(), "CN=valv test leaf");
    assert_eq!(
        key.as_rsa().unwrap().to_public_key(),
        cert.rsa_public_key().unwrap()
    );
    assert_eq!(
        key.as_rsa(),
        PrivateKey::from_pkcs8_der(KEY).unwrap().as_rsa()
    );
    assert_eq!(
        hex::encode(p12.private_key_attributes().local_key_id.as_ref().unwrap()),
        LOCAL_KEY_ID
    );
    if expect_ca {
        assert_eq!(p12.ca_certs().len(), 1);
        assert_eq!(p12.ca_certs()[0].der(), CA);
    } else {
        assert!(p12.ca_certs().is_empty());
    }
    assert!(p12.unknown_bags().is_empty());
}

#[test]
fn test_legacy_rc2_3des() {
    check(&Pkcs12::parse(LEGACY, "secret123").unwrap(), true);
}

#[test]
fn test_modern_aes_pbkdf2() {
    check(&Pkcs12::parse(MODERN, "secret123").unwrap(), true);
}

#[test]
fn test_pbmac1() {
    let pfx = Pfx::decode(PBMAC1).unwrap();
    assert!(pfx
        .mac_data
        .as_ref()
        .unwrap()
        .mac
        .algorithm
        .is(valv_core::algorithm::PBMAC1));
    check(&Pkcs12::parse(PBMAC1, "secret123").unwrap(), true);
}

#[test]
fn test_no_encryption_no_mac() {
    assert!(Pfx::decode(NOPASS).unwrap().mac_data.is_none());
    check(&Pkcs12::parse(NOPASS, "").unwrap(), false);
    assert!(matches!(
        Pkcs12::parse(NOPASS, "secret123"),
        Err(Error::MissingMac)
    ));
}

#[test]
fn test_wrong_password() {
    for der in [LEGACY, MODERN, PBMAC1] {
        assert!(matches!(
            Pkcs12::parse(der, "secret124"),
            Err(Error::IncorrectPassword)
        ));
    }
}

#[test]
fn test_reencode_openssl_container() {
    let p12 = Pkcs12::parse(LEGACY, "secret123").unwrap();
    let mut rng = StdRng::seed_from_u64(99);
    let der = p12.marshal(&mut rng, "new", &Opts::MODERN_PBMAC1).unwrap();
    let again = Pkcs12::parse(&der, "new").unwrap();
    check(&again, true);
}
