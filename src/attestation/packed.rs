use chrono::Utc;
use ciborium::value::Value;
use uuid::Uuid;
use webpki::EndEntityCert;
use x509_parser::{certificate::X509Certificate, prelude::*, time::ASN1Time};

use crate::authenticator_data::AuthenticatorData;
use crate::cose::CoseAlgorithm;
use crate::errors::VerificationError;

use super::{
    AttestationType, aaguid_from_certificate, stmt_alg, stmt_bytes, stmt_x5c,
    webpki_signature_algorithm,
};

/// Verifies a packed attestation statement
///
/// # Arguments
/// * `auth_data_raw` - Raw authenticator data bytes (signature base)
/// * `auth_data` - The decoded authenticator data
/// * `client_data_hash` - SHA-256 of the client data JSON
/// * `att_stmt` - The attestation statement map
///
/// # Returns
/// * The attestation type and trust path, or an error if the
///   attestation is invalid
pub(super) fn verify_packed_attestation(
    auth_data_raw: &[u8],
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8],
    att_stmt: &[(Value, Value)],
) -> Result<(AttestationType, Vec<Vec<u8>>), VerificationError> {
    let alg = stmt_alg(att_stmt)
        .ok_or(VerificationError::AttStmtFieldMissing("packed", "alg"))?;
    let alg = CoseAlgorithm::try_from_i64(alg)?;
    let sig = stmt_bytes(att_stmt, "sig")
        .ok_or(VerificationError::AttStmtFieldMissing("packed", "sig"))?;

    let mut signed_data = Vec::with_capacity(auth_data_raw.len() + client_data_hash.len());
    signed_data.extend_from_slice(auth_data_raw);
    signed_data.extend_from_slice(client_data_hash);

    let x5c = stmt_x5c(att_stmt);
    let ecdaa_key_id = stmt_bytes(att_stmt, "ecdaaKeyId");

    match (x5c, ecdaa_key_id) {
        (Some(x5c), None) => {
            tracing::debug!("Full attestation with certificate chain");

            let attestn_cert_bytes = &x5c[0];
            let attestn_cert =
                EndEntityCert::try_from(attestn_cert_bytes.as_ref()).map_err(|e| {
                    VerificationError::CertificateParse(format!("{e:?}"))
                })?;
            let (_, x509_cert) = X509Certificate::from_der(attestn_cert_bytes)
                .map_err(|e| VerificationError::CertificateParse(e.to_string()))?;

            let aaguid = auth_data.attested_credential_data()?.aaguid;
            verify_packed_attestation_cert(&x509_cert, aaguid)?;

            attestn_cert
                .verify_signature(webpki_signature_algorithm(alg)?, &signed_data, sig)
                .map_err(|_| VerificationError::PackedFullSignatureInvalid)?;

            if x5c.len() > 1 {
                verify_certificate_chain(&x5c)?;
            }

            Ok((AttestationType::Basic, x5c))
        }
        (None, Some(_)) => Err(VerificationError::EcdaaNotImplemented),
        (None, None) => {
            tracing::debug!("Self attestation");

            let key = &auth_data.attested_credential_data()?.public_key;
            if key.algorithm() != alg {
                return Err(VerificationError::PackedSelfAlgMismatch);
            }
            if !key.verify(alg, &signed_data, sig)? {
                return Err(VerificationError::PackedSelfSignatureInvalid);
            }

            Ok((AttestationType::SelfAttestation, Vec::new()))
        }
        (Some(_), Some(_)) => Err(VerificationError::AttStmtFieldMalformed(
            "packed",
            "ecdaaKeyId",
        )),
    }
}

/// FIDO requirements on the packed attestation certificate: v3, subject
/// OU "Authenticator Attestation", not a CA, AAGUID extension (when
/// present) matching the authenticator data.
fn verify_packed_attestation_cert(
    cert: &X509Certificate,
    aaguid: Uuid,
) -> Result<(), VerificationError> {
    if cert.version() != X509Version::V3 {
        return Err(VerificationError::PackedCertNotV3);
    }

    let has_attestation_ou = cert
        .subject()
        .iter_organizational_unit()
        .any(|ou| ou.as_str().map_or(false, |s| s == "Authenticator Attestation"));
    if !has_attestation_ou {
        return Err(VerificationError::PackedCertSubjectInvalid);
    }

    if let Ok(Some(bc)) = cert.basic_constraints() {
        if bc.value.ca {
            return Err(VerificationError::PackedCertCaFlagPresent);
        }
    }

    if let Some(cert_aaguid) = aaguid_from_certificate(cert)? {
        if cert_aaguid != aaguid {
            return Err(VerificationError::AaguidMismatch {
                expected: aaguid,
                actual: cert_aaguid,
            });
        }
    }

    Ok(())
}

fn verify_certificate_chain(x5c: &[Vec<u8>]) -> Result<(), VerificationError> {
    let now = ASN1Time::from_timestamp(Utc::now().timestamp())
        .map_err(|e| VerificationError::CertificateParse(e.to_string()))?;

    for cert_bytes in x5c {
        let (_, cert) = X509Certificate::from_der(cert_bytes)
            .map_err(|e| VerificationError::CertificateParse(e.to_string()))?;
        if !cert.validity().is_valid_at(now) {
            return Err(VerificationError::CertificateNotCurrentlyValid);
        }
    }

    Ok(())
}
