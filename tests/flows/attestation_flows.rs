use chrono::Utc;
use fido2_verify::{
    AttestationFormat, AttestationObject, AttestationType, CoseAlgorithm, TrustAnchors,
    VerificationError, VerificationPolicy, verify_attestation_object,
};

use crate::common;

fn policy_with_root(format: AttestationFormat, root: Vec<u8>) -> VerificationPolicy {
    let mut trust_anchors = TrustAnchors::new();
    trust_anchors.add_root(format, root);
    VerificationPolicy {
        trust_anchors,
        ..VerificationPolicy::default()
    }
}

#[test]
fn test_tpm_rsa_ps256_attestation_verifies() {
    let fixture = common::tpm_fixture();
    let bytes = common::tpm_attestation_object(fixture, &fixture.signature);
    let attestation = AttestationObject::parse(&bytes).expect("parse attestation object");
    let policy = policy_with_root(AttestationFormat::Tpm, fixture.root_cert.clone());

    let verified = verify_attestation_object(&attestation, &common::CLIENT_DATA_HASH, &policy)
        .expect("TPM attestation should verify");

    assert_eq!(verified.attestation_type, AttestationType::AttCa);
    assert_eq!(verified.format, "tpm");
    assert_eq!(verified.credential_id, common::CREDENTIAL_ID);
    assert_eq!(verified.aaguid.as_bytes(), &common::AAGUID);
    assert_eq!(verified.algorithm, CoseAlgorithm::Ps256);
    assert_eq!(verified.sign_count, 0);
    assert_eq!(verified.trust_path, vec![fixture.aik_cert.clone()]);
}

#[test]
fn test_tpm_tampered_signature_reports_pinned_message() {
    let fixture = common::tpm_fixture();
    let mut signature = fixture.signature.clone();
    let last = signature.len() - 1;
    signature[last] ^= 0x01;
    let bytes = common::tpm_attestation_object(fixture, &signature);
    let attestation = AttestationObject::parse(&bytes).expect("parse attestation object");

    let err = verify_attestation_object(
        &attestation,
        &common::CLIENT_DATA_HASH,
        &VerificationPolicy::default(),
    )
    .expect_err("tampered signature must fail");

    assert_eq!(err, VerificationError::TpmBadSignature);
    assert_eq!(err.to_string(), "Bad signature in TPM with aikCert");
}

#[test]
fn test_tpm_verification_is_repeatable() {
    let fixture = common::tpm_fixture();
    let bytes = common::tpm_attestation_object(fixture, &fixture.signature);
    let attestation = AttestationObject::parse(&bytes).expect("parse attestation object");
    let policy = policy_with_root(AttestationFormat::Tpm, fixture.root_cert.clone());

    let first = verify_attestation_object(&attestation, &common::CLIENT_DATA_HASH, &policy)
        .expect("first pass");
    let second = verify_attestation_object(&attestation, &common::CLIENT_DATA_HASH, &policy)
        .expect("second pass");

    assert_eq!(first.attestation_type, second.attestation_type);
    assert_eq!(first.trust_path, second.trust_path);
    assert_eq!(first.public_key_bytes, second.public_key_bytes);
}

#[test]
fn test_tpm_unrelated_root_rejected() {
    let fixture = common::tpm_fixture();
    let bytes = common::tpm_attestation_object(fixture, &fixture.signature);
    let attestation = AttestationObject::parse(&bytes).expect("parse attestation object");
    let policy = policy_with_root(AttestationFormat::Tpm, common::unrelated_root());

    let err = verify_attestation_object(&attestation, &common::CLIENT_DATA_HASH, &policy)
        .expect_err("unrelated root must not validate");

    assert_eq!(err, VerificationError::TrustPathInvalid);
}

#[test]
fn test_u2f_attestation_with_self_signed_anchor() {
    let fixture = common::build_u2f_fixture(&[0u8; 16]);
    let bytes = common::u2f_attestation_object(&fixture);
    let attestation = AttestationObject::parse(&bytes).expect("parse attestation object");
    let policy = policy_with_root(AttestationFormat::FidoU2f, fixture.cert.clone());

    let verified = verify_attestation_object(&attestation, &common::CLIENT_DATA_HASH, &policy)
        .expect("U2F attestation should verify");

    assert_eq!(verified.attestation_type, AttestationType::Basic);
    assert!(verified.aaguid.is_nil());
    assert_eq!(verified.algorithm, CoseAlgorithm::Es256);
    assert_eq!(verified.trust_path, vec![fixture.cert.clone()]);
}

#[test]
fn test_u2f_nonzero_aaguid_rejected() {
    let fixture = common::build_u2f_fixture(&[0x01; 16]);
    let bytes = common::u2f_attestation_object(&fixture);
    let attestation = AttestationObject::parse(&bytes).expect("parse attestation object");

    let err = verify_attestation_object(
        &attestation,
        &common::CLIENT_DATA_HASH,
        &VerificationPolicy::default(),
    )
    .expect_err("non-zero AAGUID must fail");

    assert_eq!(err, VerificationError::U2fAaguidNotEmpty);
}

#[test]
fn test_packed_self_attestation_verifies() {
    let fixture = common::build_packed_fixture();
    let attestation =
        AttestationObject::parse(&fixture.attestation).expect("parse attestation object");

    let verified = verify_attestation_object(
        &attestation,
        &common::CLIENT_DATA_HASH,
        &VerificationPolicy::default(),
    )
    .expect("packed self-attestation should verify");

    assert_eq!(verified.attestation_type, AttestationType::SelfAttestation);
    assert!(verified.trust_path.is_empty());
    assert_eq!(verified.sign_count, 1);
    assert_eq!(verified.algorithm, CoseAlgorithm::Es256);
}

#[test]
fn test_safetynet_attestation_verifies() {
    let bytes = common::safetynet_attestation_object(Utc::now().timestamp_millis());
    let attestation = AttestationObject::parse(&bytes).expect("parse attestation object");

    let verified = verify_attestation_object(
        &attestation,
        &common::CLIENT_DATA_HASH,
        &VerificationPolicy::default(),
    )
    .expect("SafetyNet attestation should verify");

    assert_eq!(verified.attestation_type, AttestationType::Basic);
    assert_eq!(verified.trust_path.len(), 1);
    assert_eq!(verified.format, "android-safetynet");
}

#[test]
fn test_safetynet_stale_timestamp_rejected() {
    let stale = Utc::now().timestamp_millis() - 120_000;
    let bytes = common::safetynet_attestation_object(stale);
    let attestation = AttestationObject::parse(&bytes).expect("parse attestation object");

    let err = verify_attestation_object(
        &attestation,
        &common::CLIENT_DATA_HASH,
        &VerificationPolicy::default(),
    )
    .expect_err("stale timestamp must fail");

    assert_eq!(err, VerificationError::SafetyNetTimestampInvalid(stale));
}
