//! Apple anonymous attestation statement verification.
//!
//! The statement has no signature of its own. Apple's CA certifies a
//! fresh leaf whose nonce extension carries
//! SHA-256(`authData ‖ clientDataHash`) and whose subject key is the
//! credential key, so both bindings are checked on the leaf.

use ciborium::value::Value;
use x509_parser::prelude::*;

use crate::asn1::Asn1Element;
use crate::authenticator_data::AuthenticatorData;
use crate::crypto;
use crate::errors::VerificationError;

use super::{AttestationType, spki_matches_cose_key, stmt_x5c};

const OID_APPLE_NONCE: &str = "1.2.840.113635.100.8.2";

/// Verifies an `apple` attestation statement.
///
/// # Arguments
/// * `auth_data_raw` - Raw authenticator data bytes
/// * `auth_data` - The decoded authenticator data
/// * `client_data_hash` - SHA-256 of the client data JSON
/// * `att_stmt` - The attestation statement map
///
/// # Returns
/// * The attestation type and trust path, or the first failing check
pub(super) fn verify_apple_attestation(
    auth_data_raw: &[u8],
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8],
    att_stmt: &[(Value, Value)],
) -> Result<(AttestationType, Vec<Vec<u8>>), VerificationError> {
    let x5c = stmt_x5c(att_stmt).ok_or(VerificationError::AttStmtFieldMissing("apple", "x5c"))?;

    let leaf_bytes = &x5c[0];
    let (_, x509_cert) = X509Certificate::from_der(leaf_bytes)
        .map_err(|e| VerificationError::CertificateParse(e.to_string()))?;

    let mut nonce_input = Vec::with_capacity(auth_data_raw.len() + client_data_hash.len());
    nonce_input.extend_from_slice(auth_data_raw);
    nonce_input.extend_from_slice(client_data_hash);
    let expected_nonce = crypto::sha256(&nonce_input);

    let ext = x509_cert
        .extensions()
        .iter()
        .find(|ext| ext.oid.to_string() == OID_APPLE_NONCE)
        .ok_or(VerificationError::AppleMalformedX5c)?;
    let nonce =
        extension_nonce(ext.value).map_err(|_| VerificationError::AppleMalformedX5c)?;
    if nonce != expected_nonce {
        return Err(VerificationError::AppleNonceMismatch);
    }

    let credential_key = &auth_data.attested_credential_data()?.public_key;
    if !spki_matches_cose_key(&x509_cert, credential_key) {
        return Err(VerificationError::ApplePublicKeyMismatch);
    }

    Ok((AttestationType::AttCa, x5c))
}

/// The extension value is `SEQUENCE { [1] { OCTET STRING nonce } }`.
fn extension_nonce(ext_value: &[u8]) -> Result<Vec<u8>, VerificationError> {
    let envelope = Asn1Element::parse_single(ext_value)?;
    let holder = envelope.child(0)?;
    if !holder.is_context() || holder.tag() != 1 {
        return Err(VerificationError::Asn1Decode("expected [1] nonce holder"));
    }
    Ok(holder.child(0)?.octet_string()?.to_vec())
}
