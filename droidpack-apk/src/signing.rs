//! v1 (JAR scheme) APK signing: self-signed certificate generation and the
//! detached PKCS#7 signature block stored as `META-INF/CERT.RSA`.
//!
//! Android does not validate the certificate chain for v1 signatures, so a
//! self-signed certificate with an arbitrary subject is sufficient. The
//! signature block carries no authenticated attributes; the RSA-SHA1
//! signature is computed over the raw CERT.SF bytes, which is what
//! `openssl smime -verify -noverify` and the platform verifier expect in
//! that case.

use anyhow::{anyhow, Context, Result};
use chrono::TimeZone;
use rasn::types::{Any, BitString, ObjectIdentifier, OctetString, SetOf, Utf8String};
use rasn_cms::{
    CertificateChoices, CmsVersion, ContentInfo, EncapsulatedContentInfo, IssuerAndSerialNumber,
    SignedData, SignerIdentifier, SignerInfo,
};
use rasn_pkix::{
    AlgorithmIdentifier, AttributeTypeAndValue, Certificate, Name, RelativeDistinguishedName,
    SubjectPublicKeyInfo, TbsCertificate, Time, Validity, Version,
};
use rsa::{
    pkcs1::{DecodeRsaPrivateKey, EncodeRsaPublicKey},
    Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey,
};
use sha1::{Digest, Sha1};

const OID_PKCS7_DATA: &[u32] = &[1, 2, 840, 113549, 1, 7, 1];
const OID_PKCS7_SIGNED_DATA: &[u32] = &[1, 2, 840, 113549, 1, 7, 2];
const OID_RSA_ENCRYPTION: &[u32] = &[1, 2, 840, 113549, 1, 1, 1];
const OID_SHA1_WITH_RSA: &[u32] = &[1, 2, 840, 113549, 1, 1, 5];
const OID_SHA1: &[u32] = &[1, 3, 14, 3, 2, 26];
const OID_COMMON_NAME: &[u32] = &[2, 5, 4, 3];

/// Parses an RSA private key from PEM data containing an `RSA PRIVATE KEY`
/// section (PKCS#1), the format Android debug keys are usually exported in.
pub fn load_priv_key(pem_data: &[u8]) -> Result<RsaPrivateKey> {
    let sections = pem::parse_many(pem_data).context("Invalid PEM")?;

    for section in sections {
        if section.tag() == "RSA PRIVATE KEY" {
            return RsaPrivateKey::from_pkcs1_der(section.contents())
                .context("Invalid RSA private key");
        }
    }

    Err(anyhow!("No RSA private key found in PEM data"))
}

/// Builds the throwaway self-signed X.509 certificate that accompanies the
/// signature. The validity window is fixed so output is reproducible.
pub fn self_signed_certificate(key: &RsaPrivateKey) -> Result<Certificate> {
    let public_key = RsaPublicKey::from(key)
        .to_pkcs1_der()
        .context("Encoding RSA public key")?;

    let tbs = TbsCertificate {
        version: Version::V1,
        serial_number: 1.into(),
        signature: algorithm(OID_SHA1_WITH_RSA),
        issuer: common_name("Android Debug"),
        validity: Validity {
            not_before: Time::Utc(utc_date(2014, 1, 1)?),
            not_after: Time::Utc(utc_date(2044, 1, 1)?),
        },
        subject: common_name("Android Debug"),
        subject_public_key_info: SubjectPublicKeyInfo {
            algorithm: algorithm(OID_RSA_ENCRYPTION),
            subject_public_key: BitString::from_vec(public_key.as_bytes().to_vec()),
        },
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: None,
    };

    let tbs_der = rasn::der::encode(&tbs).expect("Failed to encode TBS certificate");
    let signature = sign_sha1_rsa(key, &tbs_der)?;

    Ok(Certificate {
        tbs_certificate: tbs,
        signature_algorithm: algorithm(OID_SHA1_WITH_RSA),
        signature_value: BitString::from_vec(signature),
    })
}

/// Produces the DER-encoded PKCS#7 `SignedData` for CERT.RSA: detached
/// content, one signer, the given certificate embedded.
pub fn sign_signature_file(
    sf_bytes: &[u8],
    key: &RsaPrivateKey,
    cert: &Certificate,
) -> Result<Vec<u8>> {
    let signature = sign_sha1_rsa(key, sf_bytes)?;

    let signer_info = SignerInfo {
        version: CmsVersion::from(1),
        sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: cert.tbs_certificate.issuer.clone(),
            serial_number: cert.tbs_certificate.serial_number.clone(),
        }),
        digest_algorithm: algorithm(OID_SHA1),
        signed_attrs: None,
        signature_algorithm: algorithm(OID_RSA_ENCRYPTION),
        signature: OctetString::from(signature),
        unsigned_attrs: None,
    };

    let signed_data = SignedData {
        version: CmsVersion::from(1),
        digest_algorithms: SetOf::from([algorithm(OID_SHA1)]),
        encap_content_info: EncapsulatedContentInfo {
            content_type: oid(OID_PKCS7_DATA),
            // Detached: CERT.SF itself lives as its own archive entry.
            content: None,
        },
        certificates: Some(SetOf::from([CertificateChoices::Certificate(Box::new(
            cert.clone(),
        ))])),
        crls: None,
        signer_infos: SetOf::from([signer_info]),
    };

    let content_info = ContentInfo {
        content_type: oid(OID_PKCS7_SIGNED_DATA),
        content: Any::new(rasn::der::encode(&signed_data).expect("Failed to encode SignedData")),
    };

    Ok(rasn::der::encode(&content_info).expect("Failed to encode PKCS#7 structure"))
}

/// RSA PKCS#1 v1.5 signature over the SHA-1 digest of `data`. Deterministic
/// for a given key and input.
pub(crate) fn sign_sha1_rsa(key: &RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>> {
    let digest = Sha1::digest(data);
    key.sign(Pkcs1v15Sign::new::<Sha1>(), &digest)
        .context("RSA signing failed")
}

fn oid(arcs: &[u32]) -> ObjectIdentifier {
    ObjectIdentifier::new(arcs.to_vec()).expect("OID arcs are well formed")
}

fn algorithm(arcs: &[u32]) -> AlgorithmIdentifier {
    AlgorithmIdentifier {
        algorithm: oid(arcs),
        // Explicit DER NULL, as OpenSSL and the JDK emit for these algorithms.
        parameters: Some(Any::new(vec![0x05, 0x00])),
    }
}

fn common_name(cn: &str) -> Name {
    let value = Any::new(
        rasn::der::encode(&Utf8String::from(cn)).expect("Failed to encode certificate name"),
    );
    let attribute = AttributeTypeAndValue {
        r#type: oid(OID_COMMON_NAME),
        value,
    };
    Name::RdnSequence(vec![RelativeDistinguishedName::from(
        std::collections::BTreeSet::from([attribute]),
    )])
}

fn utc_date(year: i32, month: u32, day: u32) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::Utc
        .with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .ok_or_else(|| anyhow!("Invalid certificate validity date"))
}
