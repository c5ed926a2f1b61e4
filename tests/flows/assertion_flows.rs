use fido2_verify::{
    AttestationObject, AttestationType, CoseKey, CredentialStore, MemoryCredentialStore,
    StoredCredential, UserAccount, VerificationError, VerificationPolicy, base64url_decode,
    base64url_encode, flags, verify_assertion, verify_attestation_object,
};

use crate::common;

/// Registration stores the credential, an assertion signed by the same
/// key verifies against the stored public key, and the counter moves
/// forward.
#[test]
fn test_registration_then_assertion_against_store() {
    let fixture = common::build_packed_fixture();
    let attestation =
        AttestationObject::parse(&fixture.attestation).expect("parse attestation object");
    let policy = VerificationPolicy::default();
    let verified = verify_attestation_object(&attestation, &common::CLIENT_DATA_HASH, &policy)
        .expect("registration should verify");
    assert_eq!(verified.attestation_type, AttestationType::SelfAttestation);

    let store = MemoryCredentialStore::new();
    let account = store
        .get_or_create_user("alice", UserAccount::new("alice", "Alice (test)"))
        .expect("create user");
    store
        .add_credential(StoredCredential::from_attestation(
            &verified,
            account.user_handle.clone(),
        ))
        .expect("store credential");

    let listed = store
        .get_credentials_by_user_handle(&account.user_handle)
        .expect("list credentials");
    assert_eq!(listed.len(), 1);

    // Authentication ceremony with a higher counter.
    let auth_data = common::assertion_auth_data(flags::UP | flags::UV, 9);
    let mut signed = auth_data.clone();
    signed.extend_from_slice(&common::CLIENT_DATA_HASH);
    let rng = ring::rand::SystemRandom::new();
    let signature = fixture
        .key_pair
        .sign(&rng, &signed)
        .expect("sign assertion");

    let stored = store
        .get_credential_by_id(&verified.credential_id)
        .expect("look up credential")
        .expect("credential present");
    let public_key = CoseKey::parse(&stored.public_key).expect("decode stored key");

    let assertion = verify_assertion(
        &auth_data,
        &common::CLIENT_DATA_HASH,
        signature.as_ref(),
        &public_key,
        stored.sign_count,
        &policy,
    )
    .expect("assertion should verify");
    assert_eq!(assertion.sign_count, 9);
    assert!(assertion.user_verified);

    store
        .update_counter(&verified.credential_id, assertion.sign_count)
        .expect("persist counter");
    let updated = store
        .get_credential_by_id(&verified.credential_id)
        .expect("look up credential")
        .expect("credential present");
    assert_eq!(updated.sign_count, 9);
}

/// A replayed assertion with a stale counter fails even though the
/// signature itself is valid.
#[test]
fn test_assertion_counter_regression_detected() {
    let fixture = common::build_packed_fixture();
    let attestation =
        AttestationObject::parse(&fixture.attestation).expect("parse attestation object");
    let policy = VerificationPolicy::default();
    let verified = verify_attestation_object(&attestation, &common::CLIENT_DATA_HASH, &policy)
        .expect("registration should verify");

    let auth_data = common::assertion_auth_data(flags::UP, 3);
    let mut signed = auth_data.clone();
    signed.extend_from_slice(&common::CLIENT_DATA_HASH);
    let rng = ring::rand::SystemRandom::new();
    let signature = fixture
        .key_pair
        .sign(&rng, &signed)
        .expect("sign assertion");

    let err = verify_assertion(
        &auth_data,
        &common::CLIENT_DATA_HASH,
        signature.as_ref(),
        &verified.public_key,
        9,
        &policy,
    )
    .expect_err("stale counter must fail");
    assert_eq!(err, VerificationError::SignCountInvalid(3, 9));
}

/// Attestation objects survive the base64url trip registration
/// responses take over the wire.
#[test]
fn test_wire_encoding_round_trip() {
    let fixture = common::build_packed_fixture();

    let encoded = base64url_encode(&fixture.attestation);
    assert!(!encoded.contains('='));
    let decoded = base64url_decode(&encoded).expect("decode wire payload");
    assert_eq!(decoded, fixture.attestation);

    let attestation = AttestationObject::parse(&decoded).expect("parse attestation object");
    let verified = verify_attestation_object(
        &attestation,
        &common::CLIENT_DATA_HASH,
        &VerificationPolicy::default(),
    )
    .expect("registration should verify");
    assert_eq!(verified.credential_id, common::CREDENTIAL_ID);
}
