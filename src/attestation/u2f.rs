use ciborium::value::Value;
use webpki::EndEntityCert;
use x509_parser::{certificate::X509Certificate, prelude::*, public_key::PublicKey};

use crate::authenticator_data::AuthenticatorData;
use crate::cose::{self, CoseCurve, CoseKey};
use crate::errors::VerificationError;

use super::{AttestationType, stmt_bytes, stmt_x5c};

const OID_EC_P256: &str = "1.2.840.10045.3.1.7";

/// Verifies a FIDO-U2F attestation statement
///
/// U2F predates the attestation object layout; the signature covers a
/// reconstructed registration message
/// `0x00 ‖ rpIdHash ‖ clientDataHash ‖ credentialId ‖ uncompressed point`
/// rather than the authenticator data itself.
///
/// # Arguments
/// * `auth_data` - The decoded authenticator data
/// * `client_data_hash` - SHA-256 of the client data JSON
/// * `att_stmt` - The attestation statement map
///
/// # Returns
/// * The attestation type and trust path, or an error if the
///   attestation is invalid
pub(super) fn verify_u2f_attestation(
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8],
    att_stmt: &[(Value, Value)],
) -> Result<(AttestationType, Vec<Vec<u8>>), VerificationError> {
    tracing::debug!("Verifying FIDO-U2F attestation");

    let sig = stmt_bytes(att_stmt, "sig")
        .ok_or(VerificationError::AttStmtFieldMissing("fido-u2f", "sig"))?;
    let x5c = stmt_x5c(att_stmt)
        .ok_or(VerificationError::AttStmtFieldMissing("fido-u2f", "x5c"))?;
    if x5c.len() != 1 {
        return Err(VerificationError::U2fMalformedX5c);
    }

    let attestn_cert_bytes = &x5c[0];
    let attestn_cert = EndEntityCert::try_from(attestn_cert_bytes.as_ref())
        .map_err(|e| VerificationError::CertificateParse(format!("{e:?}")))?;
    let (_, x509_cert) = X509Certificate::from_der(attestn_cert_bytes)
        .map_err(|e| VerificationError::CertificateParse(e.to_string()))?;

    if !certificate_key_is_p256(&x509_cert) {
        return Err(VerificationError::U2fCertKeyNotP256);
    }

    let acd = auth_data.attested_credential_data()?;
    if !acd.aaguid.is_nil() {
        return Err(VerificationError::U2fAaguidNotEmpty);
    }

    let (x, y) = match &acd.public_key {
        CoseKey::Ec2 {
            curve: CoseCurve::P256,
            x,
            y,
            ..
        } => (x, y),
        _ => return Err(VerificationError::KeyTypeMismatch),
    };

    let mut verification_data = Vec::with_capacity(1 + 32 + client_data_hash.len() + 65);
    verification_data.push(0x00);
    verification_data.extend_from_slice(&auth_data.rp_id_hash);
    verification_data.extend_from_slice(client_data_hash);
    verification_data.extend_from_slice(&acd.credential_id);
    verification_data.extend_from_slice(&cose::uncompressed_point(CoseCurve::P256, x, y));

    attestn_cert
        .verify_signature(&webpki::ECDSA_P256_SHA256, &verification_data, sig)
        .map_err(|_| VerificationError::U2fSignatureInvalid)?;

    tracing::debug!("FIDO-U2F attestation verification successful");
    Ok((AttestationType::Basic, x5c))
}

fn certificate_key_is_p256(cert: &X509Certificate) -> bool {
    let spki = cert.public_key();
    let named_curve_is_p256 = spki
        .algorithm
        .parameters
        .as_ref()
        .map_or(false, |params| {
            params
                .as_oid()
                .map_or(false, |oid| oid.to_string() == OID_EC_P256)
        });
    match spki.parsed() {
        Ok(PublicKey::EC(point)) => named_curve_is_p256 && point.data().len() == 65,
        _ => false,
    }
}
