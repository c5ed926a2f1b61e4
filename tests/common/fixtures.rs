//! Attestation object fixtures assembled from real signatures.

use std::sync::OnceLock;

use base64::{
    Engine as _,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use ciborium::value::{Integer, Value};
use fido2_verify::flags;
use ring::signature::KeyPair;
use sha2::{Digest, Sha256};

use super::certificates;

pub const CLIENT_DATA_HASH: [u8; 32] = [0x55; 32];
pub const AAGUID: [u8; 16] = [0xAB; 16];
pub const CREDENTIAL_ID: [u8; 16] = [0xC0; 16];
pub const RP_ID_HASH: [u8; 32] = [0xAA; 32];

pub fn cbor_bytes(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out).expect("CBOR encode");
    out
}

/// Authenticator data carrying attested credential data for `cose_key`.
pub fn attested_auth_data(
    aaguid: &[u8; 16],
    flags: u8,
    sign_count: u32,
    cose_key: &[u8],
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&RP_ID_HASH);
    out.push(flags);
    out.extend_from_slice(&sign_count.to_be_bytes());
    out.extend_from_slice(aaguid);
    out.extend_from_slice(&(CREDENTIAL_ID.len() as u16).to_be_bytes());
    out.extend_from_slice(&CREDENTIAL_ID);
    out.extend_from_slice(cose_key);
    out
}

/// The 37-byte authenticator data an assertion signs over.
pub fn assertion_auth_data(flags: u8, sign_count: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&RP_ID_HASH);
    out.push(flags);
    out.extend_from_slice(&sign_count.to_be_bytes());
    out
}

/// ES256 COSE key map for an uncompressed P-256 point.
pub fn ec2_cose_key(point: &[u8]) -> Vec<u8> {
    assert_eq!(point.len(), 65, "uncompressed point expected");
    let int = |v: i64| Value::Integer(Integer::from(v));
    cbor_bytes(&Value::Map(vec![
        (int(1), int(2)),
        (int(3), int(-7)),
        (int(-1), int(1)),
        (int(-2), Value::Bytes(point[1..33].to_vec())),
        (int(-3), Value::Bytes(point[33..65].to_vec())),
    ]))
}

/// PS256 COSE key map for RSA parameters.
pub fn rsa_cose_key(modulus: &[u8], exponent: &[u8]) -> Vec<u8> {
    let int = |v: i64| Value::Integer(Integer::from(v));
    cbor_bytes(&Value::Map(vec![
        (int(1), int(3)),
        (int(3), int(-37)),
        (int(-1), Value::Bytes(modulus.to_vec())),
        (int(-2), Value::Bytes(exponent.to_vec())),
    ]))
}

/// Assemble the registration envelope.
pub fn attestation_object(
    fmt: &str,
    att_stmt: Vec<(Value, Value)>,
    auth_data: &[u8],
) -> Vec<u8> {
    cbor_bytes(&Value::Map(vec![
        (Value::Text("fmt".into()), Value::Text(fmt.into())),
        (Value::Text("attStmt".into()), Value::Map(att_stmt)),
        (
            Value::Text("authData".into()),
            Value::Bytes(auth_data.to_vec()),
        ),
    ]))
}

// ---- TPM ----

const TPM_ALG_RSA: u16 = 0x0001;
const TPM_ALG_SHA256: u16 = 0x000B;
const TPM_ALG_NULL: u16 = 0x0010;
const TPM_GENERATED_VALUE: u32 = 0xFF544347;
const TPM_ST_ATTEST_CERTIFY: u16 = 0x8017;

fn push_tpm2b(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u16).to_be_bytes());
    out.extend_from_slice(data);
}

/// Marshalled `TPMT_PUBLIC` for an RSA-2048 key.
pub fn rsa_pub_area(modulus: &[u8], exponent: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&TPM_ALG_RSA.to_be_bytes());
    out.extend_from_slice(&TPM_ALG_SHA256.to_be_bytes()); // nameAlg
    out.extend_from_slice(&0x0004_0072u32.to_be_bytes()); // objectAttributes
    push_tpm2b(&mut out, &[]); // authPolicy
    out.extend_from_slice(&TPM_ALG_NULL.to_be_bytes()); // symmetric
    out.extend_from_slice(&TPM_ALG_NULL.to_be_bytes()); // scheme
    out.extend_from_slice(&2048u16.to_be_bytes()); // keyBits
    out.extend_from_slice(&exponent.to_be_bytes());
    push_tpm2b(&mut out, modulus);
    out
}

/// Marshalled `TPMS_ATTEST` with the certify magic and tag.
pub fn certify_info(extra_data: &[u8], name: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&TPM_GENERATED_VALUE.to_be_bytes());
    out.extend_from_slice(&TPM_ST_ATTEST_CERTIFY.to_be_bytes());
    push_tpm2b(&mut out, &[]); // qualifiedSigner
    push_tpm2b(&mut out, extra_data);
    out.extend_from_slice(&0u64.to_be_bytes()); // clock
    out.extend_from_slice(&0u32.to_be_bytes()); // resetCount
    out.extend_from_slice(&0u32.to_be_bytes()); // restartCount
    out.push(1); // safe
    out.extend_from_slice(&0u64.to_be_bytes()); // firmwareVersion
    push_tpm2b(&mut out, name);
    push_tpm2b(&mut out, &[]); // qualifiedName
    out
}

/// `TPM2B_NAME` binding a pubArea under SHA-256.
pub fn sha256_name(pub_area: &[u8]) -> Vec<u8> {
    let mut name = TPM_ALG_SHA256.to_be_bytes().to_vec();
    name.extend_from_slice(&Sha256::digest(pub_area));
    name
}

/// A root CA, an AIK certificate chained to it, and a PS256 signature
/// over the certInfo built for `auth_data`.
pub struct TpmFixture {
    pub root_cert: Vec<u8>,
    pub aik_cert: Vec<u8>,
    pub auth_data: Vec<u8>,
    pub pub_area: Vec<u8>,
    pub cert_info: Vec<u8>,
    pub signature: Vec<u8>,
}

/// RSA key generation is slow enough that every TPM scenario shares
/// one fixture.
pub fn tpm_fixture() -> &'static TpmFixture {
    static FIXTURE: OnceLock<TpmFixture> = OnceLock::new();
    FIXTURE.get_or_init(build_tpm_fixture)
}

fn build_tpm_fixture() -> TpmFixture {
    let root_key = certificates::rsa_key();
    let aik_key = certificates::rsa_key();

    let root_cert = certificates::issue_rsa_certificate(
        &certificates::CertParams {
            serial: 1,
            issuer: "TPM Test Root",
            subject: Some("TPM Test Root"),
            spki: certificates::rsa_spki(&root_key.to_public_key()),
            extensions: Vec::new(),
        },
        &root_key,
    );
    let aik_cert = certificates::issue_rsa_certificate(
        &certificates::CertParams {
            serial: 2,
            issuer: "TPM Test Root",
            subject: None,
            spki: certificates::rsa_spki(&aik_key.to_public_key()),
            extensions: vec![
                certificates::tpm_san_extension("id:FFFFF1D0", "NPCT6xx", "id:13"),
                certificates::aik_eku_extension(),
                certificates::end_entity_constraints(),
                certificates::aaguid_extension(&AAGUID),
            ],
        },
        &root_key,
    );

    // The credential key never signs anything in a TPM statement, so a
    // fixed modulus is enough for the pubArea cross-checks.
    let modulus = [0xBB; 256];
    let cose_key = rsa_cose_key(&modulus, &[0x01, 0x00, 0x01]);
    let auth_data = attested_auth_data(&AAGUID, flags::UP | flags::AT, 0, &cose_key);

    let pub_area = rsa_pub_area(&modulus, 65537);
    let mut signed = auth_data.clone();
    signed.extend_from_slice(&CLIENT_DATA_HASH);
    let extra_data = Sha256::digest(&signed);
    let cert_info = certify_info(&extra_data, &sha256_name(&pub_area));
    let signature = certificates::sign_ps256(&aik_key, &cert_info);

    TpmFixture {
        root_cert,
        aik_cert,
        auth_data,
        pub_area,
        cert_info,
        signature,
    }
}

/// TPM attestation object with the statement signature swappable for
/// tamper scenarios.
pub fn tpm_attestation_object(fixture: &TpmFixture, signature: &[u8]) -> Vec<u8> {
    let att_stmt = vec![
        (Value::Text("ver".into()), Value::Text("2.0".into())),
        (Value::Text("alg".into()), Value::Integer(Integer::from(-37))),
        (Value::Text("sig".into()), Value::Bytes(signature.to_vec())),
        (
            Value::Text("x5c".into()),
            Value::Array(vec![Value::Bytes(fixture.aik_cert.clone())]),
        ),
        (
            Value::Text("pubArea".into()),
            Value::Bytes(fixture.pub_area.clone()),
        ),
        (
            Value::Text("certInfo".into()),
            Value::Bytes(fixture.cert_info.clone()),
        ),
    ];
    attestation_object("tpm", att_stmt, &fixture.auth_data)
}

// ---- FIDO-U2F ----

/// A self-signed P-256 attestation certificate and the reconstructed
/// registration message signature U2F statements carry.
pub struct U2fFixture {
    pub cert: Vec<u8>,
    pub auth_data: Vec<u8>,
    pub signature: Vec<u8>,
}

pub fn build_u2f_fixture(aaguid: &[u8; 16]) -> U2fFixture {
    let key_pair = certificates::ec_key_pair();
    let point = key_pair.public_key().as_ref().to_vec();
    let cert = certificates::issue_ec_certificate(
        &certificates::CertParams {
            serial: 3,
            issuer: "U2F Test Attestation",
            subject: Some("U2F Test Attestation"),
            spki: certificates::ec_p256_spki(&point),
            // webpki refuses certificates without an extensions element,
            // so the leaf carries the same end-entity constraints the
            // other attestation fixtures do.
            extensions: vec![certificates::end_entity_constraints()],
        },
        &key_pair,
    );

    let cose_key = ec2_cose_key(&point);
    let auth_data = attested_auth_data(aaguid, flags::UP | flags::AT, 0, &cose_key);

    let mut message = vec![0x00];
    message.extend_from_slice(&RP_ID_HASH);
    message.extend_from_slice(&CLIENT_DATA_HASH);
    message.extend_from_slice(&CREDENTIAL_ID);
    message.extend_from_slice(&point);
    let rng = ring::rand::SystemRandom::new();
    let signature = key_pair
        .sign(&rng, &message)
        .expect("sign registration message")
        .as_ref()
        .to_vec();

    U2fFixture {
        cert,
        auth_data,
        signature,
    }
}

pub fn u2f_attestation_object(fixture: &U2fFixture) -> Vec<u8> {
    let att_stmt = vec![
        (
            Value::Text("sig".into()),
            Value::Bytes(fixture.signature.clone()),
        ),
        (
            Value::Text("x5c".into()),
            Value::Array(vec![Value::Bytes(fixture.cert.clone())]),
        ),
    ];
    attestation_object("fido-u2f", att_stmt, &fixture.auth_data)
}

// ---- packed ----

/// Packed self-attestation signed by the credential key itself. The
/// key pair is kept so assertion flows can keep signing with it.
pub struct PackedFixture {
    pub key_pair: ring::signature::EcdsaKeyPair,
    pub auth_data: Vec<u8>,
    pub attestation: Vec<u8>,
}

pub fn build_packed_fixture() -> PackedFixture {
    let key_pair = certificates::ec_key_pair();
    let point = key_pair.public_key().as_ref().to_vec();
    let cose_key = ec2_cose_key(&point);
    let auth_data =
        attested_auth_data(&[0u8; 16], flags::UP | flags::UV | flags::AT, 1, &cose_key);

    let mut signed = auth_data.clone();
    signed.extend_from_slice(&CLIENT_DATA_HASH);
    let rng = ring::rand::SystemRandom::new();
    let signature = key_pair.sign(&rng, &signed).expect("sign attestation");

    let att_stmt = vec![
        (Value::Text("alg".into()), Value::Integer(Integer::from(-7))),
        (
            Value::Text("sig".into()),
            Value::Bytes(signature.as_ref().to_vec()),
        ),
    ];
    let attestation = attestation_object("packed", att_stmt, &auth_data);

    PackedFixture {
        key_pair,
        auth_data,
        attestation,
    }
}

// ---- SafetyNet ----

/// SafetyNet response whose JWS leaf certificate is valid for
/// attest.android.com and whose nonce matches the ceremony.
pub fn safetynet_attestation_object(timestamp_ms: i64) -> Vec<u8> {
    let key_pair = certificates::ec_key_pair_fixed();
    let point = key_pair.public_key().as_ref().to_vec();
    let cert = certificates::issue_ec_certificate(
        &certificates::CertParams {
            serial: 4,
            issuer: "SafetyNet Test",
            subject: Some("SafetyNet Test"),
            spki: certificates::ec_p256_spki(&point),
            extensions: vec![certificates::dns_san_extension("attest.android.com")],
        },
        &key_pair,
    );

    let cose_key = ec2_cose_key(&point);
    let auth_data = attested_auth_data(&[0u8; 16], flags::UP | flags::AT, 0, &cose_key);

    let mut signed = auth_data.clone();
    signed.extend_from_slice(&CLIENT_DATA_HASH);
    let nonce = STANDARD.encode(Sha256::digest(&signed));

    let header = serde_json::json!({
        "alg": "ES256",
        "x5c": [STANDARD.encode(&cert)],
    });
    let payload = serde_json::json!({
        "nonce": nonce,
        "timestampMs": timestamp_ms,
        "ctsProfileMatch": true,
        "basicIntegrity": true,
    });
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(payload.to_string())
    );
    let rng = ring::rand::SystemRandom::new();
    let signature = key_pair
        .sign(&rng, signing_input.as_bytes())
        .expect("sign JWS");
    let jws = format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature));

    let att_stmt = vec![
        (Value::Text("ver".into()), Value::Text("14799021".into())),
        (
            Value::Text("response".into()),
            Value::Bytes(jws.into_bytes()),
        ),
    ];
    attestation_object("android-safetynet", att_stmt, &auth_data)
}

/// Self-signed P-256 certificate unrelated to any fixture chain.
pub fn unrelated_root() -> Vec<u8> {
    let key_pair = certificates::ec_key_pair();
    certificates::issue_ec_certificate(
        &certificates::CertParams {
            serial: 9,
            issuer: "Unrelated Root",
            subject: Some("Unrelated Root"),
            spki: certificates::ec_p256_spki(key_pair.public_key().as_ref()),
            extensions: Vec::new(),
        },
        &key_pair,
    )
}
