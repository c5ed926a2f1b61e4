//! Hand-built DER certificates for attestation tests.
//!
//! Trust-path and AIK checks need certificates whose signatures really
//! verify, so these helpers assemble X.509 v3 structures byte by byte
//! and sign them with freshly generated keys.

use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::{Pkcs1v15Sign, Pss, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

// ---- DER primitives ----

/// Wrap `content` in a definite-length TLV.
pub fn der(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else if len <= 0xFF {
        out.push(0x81);
        out.push(len as u8);
    } else {
        out.push(0x82);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    }
    out.extend_from_slice(content);
    out
}

pub fn der_seq(parts: &[Vec<u8>]) -> Vec<u8> {
    der(0x30, &parts.concat())
}

/// OBJECT IDENTIFIER from dotted notation.
pub fn der_oid(dotted: &str) -> Vec<u8> {
    let arcs: Vec<u64> = dotted
        .split('.')
        .map(|arc| arc.parse().expect("numeric OID arc"))
        .collect();
    let mut content = vec![(arcs[0] * 40 + arcs[1]) as u8];
    for &arc in &arcs[2..] {
        content.extend_from_slice(&base128(arc));
    }
    der(0x06, &content)
}

fn base128(mut arc: u64) -> Vec<u8> {
    let mut out = vec![(arc & 0x7F) as u8];
    arc >>= 7;
    while arc > 0 {
        out.insert(0, (arc & 0x7F) as u8 | 0x80);
        arc >>= 7;
    }
    out
}

pub fn der_utf8(value: &str) -> Vec<u8> {
    der(0x0C, value.as_bytes())
}

fn der_utc(value: &str) -> Vec<u8> {
    der(0x17, value.as_bytes())
}

pub fn der_octet_string(content: &[u8]) -> Vec<u8> {
    der(0x04, content)
}

fn der_bit_string(content: &[u8]) -> Vec<u8> {
    let mut padded = vec![0x00];
    padded.extend_from_slice(content);
    der(0x03, &padded)
}

fn der_null() -> Vec<u8> {
    vec![0x05, 0x00]
}

// ---- names and extensions ----

fn name_attr(oid: &str, value: &str) -> Vec<u8> {
    der(0x31, &der_seq(&[der_oid(oid), der_utf8(value)]))
}

/// X.501 Name. An empty attribute list yields the empty subject that
/// AIK certificates require.
pub fn x501_name(attrs: &[(&str, &str)]) -> Vec<u8> {
    let rdns: Vec<u8> = attrs
        .iter()
        .flat_map(|(oid, value)| name_attr(oid, value))
        .collect();
    der(0x30, &rdns)
}

pub fn common_name(name: &str) -> Vec<u8> {
    x501_name(&[("2.5.4.3", name)])
}

fn extension(oid: &str, inner: &[u8]) -> Vec<u8> {
    der_seq(&[der_oid(oid), der_octet_string(inner)])
}

/// subjectAltName carrying the TCG directory attributes.
pub fn tpm_san_extension(manufacturer: &str, model: &str, version: &str) -> Vec<u8> {
    let directory_name = x501_name(&[
        ("2.23.133.2.1", manufacturer),
        ("2.23.133.2.2", model),
        ("2.23.133.2.3", version),
    ]);
    let general_names = der(0x30, &der(0xA4, &directory_name));
    extension("2.5.29.17", &general_names)
}

/// subjectAltName carrying a single dNSName.
pub fn dns_san_extension(hostname: &str) -> Vec<u8> {
    let general_names = der(0x30, &der(0x82, hostname.as_bytes()));
    extension("2.5.29.17", &general_names)
}

/// extendedKeyUsage with tcg-kp-AIKCertificate.
pub fn aik_eku_extension() -> Vec<u8> {
    extension("2.5.29.37", &der(0x30, &der_oid("2.23.133.8.3")))
}

/// basicConstraints without a CA component.
pub fn end_entity_constraints() -> Vec<u8> {
    extension("2.5.29.19", &der(0x30, &[]))
}

/// id-fido-gen-ce-aaguid: an OCTET STRING wrapping the sixteen bytes.
pub fn aaguid_extension(aaguid: &[u8; 16]) -> Vec<u8> {
    extension("1.3.6.1.4.1.45724.1.1.4", &der_octet_string(aaguid))
}

// ---- subject public key info ----

pub fn rsa_spki(key: &RsaPublicKey) -> Vec<u8> {
    let pkcs1 = key.to_pkcs1_der().expect("encode RSA public key");
    der_seq(&[
        der_seq(&[der_oid("1.2.840.113549.1.1.1"), der_null()]),
        der_bit_string(pkcs1.as_bytes()),
    ])
}

/// SPKI for an uncompressed P-256 point.
pub fn ec_p256_spki(point: &[u8]) -> Vec<u8> {
    der_seq(&[
        der_seq(&[
            der_oid("1.2.840.10045.2.1"),
            der_oid("1.2.840.10045.3.1.7"),
        ]),
        der_bit_string(point),
    ])
}

// ---- certificate assembly ----

fn rsa_sha256_alg() -> Vec<u8> {
    der_seq(&[der_oid("1.2.840.113549.1.1.11"), der_null()])
}

fn ecdsa_sha256_alg() -> Vec<u8> {
    der_seq(&[der_oid("1.2.840.10045.4.3.2")])
}

pub struct CertParams<'a> {
    /// Keep below 0x80 so the INTEGER stays positive.
    pub serial: u8,
    pub issuer: &'a str,
    /// `None` builds the empty subject AIK profiles require.
    pub subject: Option<&'a str>,
    pub spki: Vec<u8>,
    pub extensions: Vec<Vec<u8>>,
}

fn build_tbs(params: &CertParams, sig_alg: &[u8]) -> Vec<u8> {
    let subject = match params.subject {
        Some(name) => common_name(name),
        None => x501_name(&[]),
    };
    let mut parts = vec![
        der(0xA0, &[0x02, 0x01, 0x02]), // version v3
        der(0x02, &[params.serial]),
        sig_alg.to_vec(),
        common_name(params.issuer),
        der_seq(&[der_utc("250101000000Z"), der_utc("451231235959Z")]),
        subject,
        params.spki.clone(),
    ];
    if !params.extensions.is_empty() {
        parts.push(der(0xA3, &der(0x30, &params.extensions.concat())));
    }
    der(0x30, &parts.concat())
}

fn assemble(tbs: &[u8], sig_alg: &[u8], signature: &[u8]) -> Vec<u8> {
    der_seq(&[tbs.to_vec(), sig_alg.to_vec(), der_bit_string(signature)])
}

/// Issue a certificate signed with sha256WithRSAEncryption.
pub fn issue_rsa_certificate(params: &CertParams, signer: &RsaPrivateKey) -> Vec<u8> {
    let alg = rsa_sha256_alg();
    let tbs = build_tbs(params, &alg);
    let digest = Sha256::digest(&tbs);
    let signature = signer
        .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
        .expect("sign certificate");
    assemble(&tbs, &alg, &signature)
}

/// Issue a certificate signed with ecdsa-with-SHA256.
pub fn issue_ec_certificate(
    params: &CertParams,
    signer: &ring::signature::EcdsaKeyPair,
) -> Vec<u8> {
    let alg = ecdsa_sha256_alg();
    let tbs = build_tbs(params, &alg);
    let rng = ring::rand::SystemRandom::new();
    let signature = signer.sign(&rng, &tbs).expect("sign certificate");
    assemble(&tbs, &alg, signature.as_ref())
}

// ---- keys ----

/// Fresh RSA-2048 key. Generation is slow, so fixtures cache results.
pub fn rsa_key() -> RsaPrivateKey {
    let mut rng = rand::thread_rng();
    RsaPrivateKey::new(&mut rng, 2048).expect("generate RSA key")
}

/// RSASSA-PSS signature over `message` with SHA-256, the salt length
/// matching the digest length.
pub fn sign_ps256(key: &RsaPrivateKey, message: &[u8]) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let digest = Sha256::digest(message);
    key.sign_with_rng(&mut rng, Pss::new::<Sha256>(), &digest)
        .expect("PSS signature")
}

/// Fresh P-256 key pair producing DER signatures.
pub fn ec_key_pair() -> ring::signature::EcdsaKeyPair {
    ec_key_pair_for(&ring::signature::ECDSA_P256_SHA256_ASN1_SIGNING)
}

/// Fresh P-256 key pair producing fixed-width signatures, as JWS uses.
pub fn ec_key_pair_fixed() -> ring::signature::EcdsaKeyPair {
    ec_key_pair_for(&ring::signature::ECDSA_P256_SHA256_FIXED_SIGNING)
}

fn ec_key_pair_for(
    alg: &'static ring::signature::EcdsaSigningAlgorithm,
) -> ring::signature::EcdsaKeyPair {
    let rng = ring::rand::SystemRandom::new();
    let pkcs8 = ring::signature::EcdsaKeyPair::generate_pkcs8(alg, &rng)
        .expect("generate key pair");
    ring::signature::EcdsaKeyPair::from_pkcs8(alg, pkcs8.as_ref(), &rng)
        .expect("load key pair")
}
