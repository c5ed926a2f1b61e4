//! Android SafetyNet attestation statement verification.
//!
//! The statement wraps a Google-signed JWS whose payload attests device
//! integrity. The nonce inside the payload binds the JWS to this
//! ceremony: it is the standard-base64 SHA-256 of
//! `authData ‖ clientDataHash`.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::Utc;
use ciborium::value::Value;
use ring::signature;
use serde::Deserialize;
use webpki::{DnsNameRef, EndEntityCert};
use x509_parser::public_key::PublicKey;
use x509_parser::{certificate::X509Certificate, prelude::*};

use crate::crypto;
use crate::errors::VerificationError;
use crate::utils::base64url_decode;

use super::{AttestationType, stmt_bytes, stmt_text};

const ATTEST_HOSTNAME: &str = "attest.android.com";

/// Freshness window for the JWS timestamp, in milliseconds.
const TIMESTAMP_WINDOW_MS: i64 = 60_000;

#[derive(Deserialize)]
struct JwsHeader {
    alg: String,
    #[serde(default)]
    x5c: Vec<String>,
}

#[derive(Deserialize)]
struct JwsPayload {
    #[serde(default)]
    nonce: String,
    #[serde(rename = "timestampMs")]
    timestamp_ms: Option<i64>,
    #[serde(rename = "ctsProfileMatch")]
    cts_profile_match: Option<bool>,
}

/// Verifies an `android-safetynet` attestation statement.
///
/// # Arguments
/// * `auth_data_raw` - Raw authenticator data bytes from the attestation object
/// * `client_data_hash` - SHA-256 hash of the client data JSON
/// * `att_stmt` - Attestation statement map entries
///
/// # Returns
/// The attestation type and the certificate chain from the JWS header.
pub(super) fn verify_safetynet_attestation(
    auth_data_raw: &[u8],
    client_data_hash: &[u8],
    att_stmt: &[(Value, Value)],
) -> Result<(AttestationType, Vec<Vec<u8>>), VerificationError> {
    stmt_text(att_stmt, "ver")
        .filter(|ver| !ver.is_empty())
        .ok_or(VerificationError::SafetyNetVersionMissing)?;

    let response = stmt_bytes(att_stmt, "response").ok_or(
        VerificationError::AttStmtFieldMissing("android-safetynet", "response"),
    )?;
    let response =
        std::str::from_utf8(response).map_err(|_| VerificationError::SafetyNetMalformedJws)?;

    let parts: Vec<&str> = response.split('.').collect();
    let (header_b64, payload_b64, signature_b64) = match parts.as_slice() {
        [header, payload, signature] => (*header, *payload, *signature),
        _ => return Err(VerificationError::SafetyNetMalformedJws),
    };

    let header_bytes =
        base64url_decode(header_b64).map_err(|_| VerificationError::SafetyNetMalformedJws)?;
    let header: JwsHeader = serde_json::from_slice(&header_bytes)
        .map_err(|_| VerificationError::SafetyNetMalformedJws)?;

    // The embedded chain uses standard base64, unlike the JWS segments.
    let mut chain = Vec::with_capacity(header.x5c.len());
    for cert_b64 in &header.x5c {
        let der = STANDARD
            .decode(cert_b64)
            .map_err(|_| VerificationError::SafetyNetMalformedJws)?;
        chain.push(der);
    }
    let leaf_der = chain
        .first()
        .ok_or(VerificationError::SafetyNetMissingX5c)?;

    let leaf = EndEntityCert::try_from(leaf_der.as_slice())
        .map_err(|e| VerificationError::CertificateParse(format!("{e:?}")))?;
    let hostname = DnsNameRef::try_from_ascii_str(ATTEST_HOSTNAME)
        .map_err(|_| VerificationError::SafetyNetInvalidDnsName)?;
    leaf.verify_is_valid_for_dns_name(hostname)
        .map_err(|_| VerificationError::SafetyNetInvalidDnsName)?;

    let jws_signature =
        base64url_decode(signature_b64).map_err(|_| VerificationError::SafetyNetMalformedJws)?;
    let (_, x509_cert) = X509Certificate::from_der(leaf_der)
        .map_err(|e| VerificationError::CertificateParse(e.to_string()))?;
    let signed_data = format!("{header_b64}.{payload_b64}");
    verify_jws_signature(&x509_cert, &header.alg, signed_data.as_bytes(), &jws_signature)?;

    let payload_bytes =
        base64url_decode(payload_b64).map_err(|_| VerificationError::SafetyNetMalformedJws)?;
    let payload: JwsPayload = serde_json::from_slice(&payload_bytes)
        .map_err(|_| VerificationError::SafetyNetMalformedJws)?;

    if payload.nonce != expected_nonce(auth_data_raw, client_data_hash) {
        tracing::debug!("SafetyNet nonce does not bind this ceremony");
        return Err(VerificationError::SafetyNetNonceMismatch);
    }

    if payload.cts_profile_match != Some(true) {
        return Err(VerificationError::SafetyNetCtsProfileMatchFalse);
    }

    let timestamp_ms = payload
        .timestamp_ms
        .ok_or(VerificationError::SafetyNetMalformedJws)?;
    let now_ms = Utc::now().timestamp_millis();
    if timestamp_ms <= now_ms - TIMESTAMP_WINDOW_MS || timestamp_ms >= now_ms + TIMESTAMP_WINDOW_MS
    {
        return Err(VerificationError::SafetyNetTimestampInvalid(timestamp_ms));
    }

    Ok((AttestationType::Basic, chain))
}

/// Standard-base64 SHA-256 of `authData ‖ clientDataHash`, the value the
/// payload `nonce` field must carry.
fn expected_nonce(auth_data_raw: &[u8], client_data_hash: &[u8]) -> String {
    let mut nonce_input = Vec::with_capacity(auth_data_raw.len() + client_data_hash.len());
    nonce_input.extend_from_slice(auth_data_raw);
    nonce_input.extend_from_slice(client_data_hash);
    STANDARD.encode(crypto::sha256(&nonce_input))
}

/// JWS signatures cover the ASCII `header.payload` text. ECDSA
/// signatures here are fixed-width `r ‖ s`, not DER.
fn verify_jws_signature(
    cert: &X509Certificate<'_>,
    alg: &str,
    message: &[u8],
    jws_signature: &[u8],
) -> Result<(), VerificationError> {
    let spki = cert.public_key();
    let verified = match (alg, spki.parsed()) {
        ("RS256", Ok(PublicKey::RSA(_))) => crypto::verify_with_key(
            &signature::RSA_PKCS1_2048_8192_SHA256,
            spki.subject_public_key.data.as_ref(),
            message,
            jws_signature,
        ),
        ("ES256", Ok(PublicKey::EC(point))) => crypto::verify_with_key(
            &signature::ECDSA_P256_SHA256_FIXED,
            point.data(),
            message,
            jws_signature,
        ),
        _ => return Err(VerificationError::SafetyNetSignatureInvalid),
    };
    if !verified {
        return Err(VerificationError::SafetyNetSignatureInvalid);
    }
    Ok(())
}
