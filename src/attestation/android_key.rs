//! Android Key attestation statement verification.
//!
//! The statement signs `authData ‖ clientDataHash` with the attested
//! key itself; provenance comes from the Android keystore attestation
//! extension in the leaf certificate, which binds the challenge and
//! describes how the key was created.

use ciborium::value::Value;
use webpki::EndEntityCert;
use x509_parser::prelude::*;

use crate::asn1::Asn1Element;
use crate::authenticator_data::AuthenticatorData;
use crate::cose::CoseAlgorithm;
use crate::errors::VerificationError;

use super::{
    AttestationType, spki_matches_cose_key, stmt_alg, stmt_bytes, stmt_x5c,
    webpki_signature_algorithm,
};

/// Android keystore attestation extension.
const OID_ANDROID_KEY_DESCRIPTION: &str = "1.3.6.1.4.1.11129.2.1.17";

// KeyDescription authorization list tags and keymaster values.
const TAG_PURPOSE: u32 = 1;
const TAG_ALL_APPLICATIONS: u32 = 600;
const TAG_ORIGIN: u32 = 702;
const KM_ORIGIN_GENERATED: u64 = 0;
const KM_PURPOSE_SIGN: u64 = 2;

/// Verifies an android-key attestation statement
///
/// # Arguments
/// * `auth_data_raw` - Raw authenticator data bytes
/// * `auth_data` - The decoded authenticator data
/// * `client_data_hash` - SHA-256 of the client data JSON
/// * `att_stmt` - The attestation statement map
///
/// # Returns
/// * The attestation type and trust path, or the first failing check
pub(super) fn verify_android_key_attestation(
    auth_data_raw: &[u8],
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8],
    att_stmt: &[(Value, Value)],
) -> Result<(AttestationType, Vec<Vec<u8>>), VerificationError> {
    let alg = stmt_alg(att_stmt)
        .ok_or(VerificationError::AttStmtFieldMissing("android-key", "alg"))?;
    let alg = CoseAlgorithm::try_from_i64(alg)?;
    let sig = stmt_bytes(att_stmt, "sig")
        .ok_or(VerificationError::AttStmtFieldMissing("android-key", "sig"))?;
    let x5c = stmt_x5c(att_stmt)
        .ok_or(VerificationError::AttStmtFieldMissing("android-key", "x5c"))?;

    let leaf_bytes = &x5c[0];
    let leaf = EndEntityCert::try_from(leaf_bytes.as_ref())
        .map_err(|e| VerificationError::CertificateParse(format!("{e:?}")))?;
    let (_, x509_cert) = X509Certificate::from_der(leaf_bytes)
        .map_err(|e| VerificationError::CertificateParse(e.to_string()))?;

    let mut signed_data = Vec::with_capacity(auth_data_raw.len() + client_data_hash.len());
    signed_data.extend_from_slice(auth_data_raw);
    signed_data.extend_from_slice(client_data_hash);
    leaf.verify_signature(webpki_signature_algorithm(alg)?, &signed_data, sig)
        .map_err(|_| VerificationError::AndroidKeySignatureInvalid)?;

    let credential_key = &auth_data.attested_credential_data()?.public_key;
    if !spki_matches_cose_key(&x509_cert, credential_key) {
        return Err(VerificationError::AndroidKeyPublicKeyMismatch);
    }

    let ext = x509_cert
        .extensions()
        .iter()
        .find(|ext| ext.oid.to_string() == OID_ANDROID_KEY_DESCRIPTION)
        .ok_or(VerificationError::AndroidKeyExtensionMissing)?;
    verify_key_description(ext.value, client_data_hash)?;

    Ok((AttestationType::Basic, x5c))
}

/// Checks on the keystore `KeyDescription`: the challenge binds the
/// client data, the key was generated in the keystore for signing, and
/// it is not shared with all applications.
///
/// Authorization values may sit in `softwareEnforced` or `teeEnforced`;
/// the TEE list wins when both carry a tag.
fn verify_key_description(
    ext_value: &[u8],
    client_data_hash: &[u8],
) -> Result<(), VerificationError> {
    let key_description = Asn1Element::parse_single(ext_value)
        .map_err(|_| VerificationError::AndroidKeyMalformed)?;

    let challenge = key_description
        .child(4)
        .and_then(|c| c.octet_string())
        .map_err(|_| VerificationError::AndroidKeyMalformed)?;
    if challenge != client_data_hash {
        return Err(VerificationError::AndroidKeyChallengeMismatch);
    }

    let software_enforced = key_description
        .child(6)
        .map_err(|_| VerificationError::AndroidKeyMalformed)?;
    let tee_enforced = key_description
        .child(7)
        .map_err(|_| VerificationError::AndroidKeyMalformed)?;

    let mut origin = KM_ORIGIN_GENERATED;
    let mut purpose = 0u64;
    for list in [&software_enforced, &tee_enforced] {
        if list
            .find_context(TAG_ALL_APPLICATIONS)
            .map_err(|_| VerificationError::AndroidKeyMalformed)?
            .is_some()
        {
            return Err(VerificationError::AndroidKeyAllApplicationsPresent);
        }
        if let Some(element) = list
            .find_context(TAG_ORIGIN)
            .map_err(|_| VerificationError::AndroidKeyMalformed)?
        {
            origin = element
                .child(0)
                .and_then(|c| c.integer_u64())
                .map_err(|_| VerificationError::AndroidKeyMalformed)?;
        }
        if let Some(element) = list
            .find_context(TAG_PURPOSE)
            .map_err(|_| VerificationError::AndroidKeyMalformed)?
        {
            // purpose is a SET OF INTEGER; the first entry decides
            purpose = element
                .child(0)
                .and_then(|set| set.child(0))
                .and_then(|c| c.integer_u64())
                .map_err(|_| VerificationError::AndroidKeyMalformed)?;
        }
    }

    if origin != KM_ORIGIN_GENERATED {
        return Err(VerificationError::AndroidKeyOriginNotGenerated);
    }
    if purpose != KM_PURPOSE_SIGN {
        return Err(VerificationError::AndroidKeyPurposeNotSign);
    }

    Ok(())
}
