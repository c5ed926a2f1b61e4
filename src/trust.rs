//! Trust-path validation against caller-supplied attestation roots.
//!
//! Verification is offline: each certificate in the path must chain by
//! signature to the next, the terminal issuer must be one of the
//! configured roots byte-for-byte, and every certificate must be inside
//! its validity window. Revocation is not consulted here; the CRL
//! helpers below are separate, caller-invoked utilities.

use chrono::Utc;
use x509_parser::{certificate::X509Certificate, prelude::*, time::ASN1Time};

use crate::asn1::Asn1Element;
use crate::errors::VerificationError;

/// `true` when `trust_path` (leaf first, DER) chains up to one of
/// `trusted_roots`. Unknown intermediates are fine as long as every
/// signature verifies; the terminal certificate must either verify under
/// a candidate root or be that root itself (self-signed).
pub(crate) fn validate_trust_chain(trust_path: &[Vec<u8>], trusted_roots: &[Vec<u8>]) -> bool {
    if trust_path.is_empty() {
        return false;
    }

    let mut path = Vec::with_capacity(trust_path.len());
    for cert_bytes in trust_path {
        match X509Certificate::from_der(cert_bytes) {
            Ok((_, cert)) => path.push(cert),
            Err(e) => {
                tracing::debug!("Unparseable certificate in trust path: {e}");
                return false;
            }
        }
    }

    let now = match ASN1Time::from_timestamp(Utc::now().timestamp()) {
        Ok(now) => now,
        Err(_) => return false,
    };
    if path.iter().any(|cert| !cert.validity().is_valid_at(now)) {
        tracing::debug!("Certificate in trust path expired or not yet valid");
        return false;
    }

    trusted_roots
        .iter()
        .any(|root_bytes| chains_to_root(&path, trust_path, root_bytes, now))
}

fn chains_to_root(
    path: &[X509Certificate<'_>],
    path_der: &[Vec<u8>],
    root_bytes: &[u8],
    now: ASN1Time,
) -> bool {
    let Ok((_, root)) = X509Certificate::from_der(root_bytes) else {
        return false;
    };
    if !root.validity().is_valid_at(now) {
        return false;
    }

    for (cert, issuer) in path.iter().zip(path.iter().skip(1)) {
        if cert.verify_signature(Some(issuer.public_key())).is_err() {
            return false;
        }
    }

    let terminal = &path[path.len() - 1];
    if path_der[path_der.len() - 1].as_slice() == root_bytes {
        // The path already ends at the candidate root.
        return terminal.verify_signature(None).is_ok();
    }
    terminal.verify_signature(Some(root.public_key())).is_ok()
}

/// CRL distribution point URI from the certificate's 2.5.29.31
/// extension, when one is present.
pub fn crl_distribution_point(cert_der: &[u8]) -> Result<Option<String>, VerificationError> {
    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| VerificationError::CertificateParse(e.to_string()))?;
    let Some(ext) = cert.extensions().iter().find(|ext| {
        ext.oid.as_bytes() == oid_registry::OID_X509_EXT_CRL_DISTRIBUTION_POINTS.as_bytes()
    }) else {
        return Ok(None);
    };
    distribution_point_uri(ext.value).map(Some)
}

/// First URI in the CRLDistributionPoints value:
/// `SEQUENCE { SEQUENCE { [0] { [0] { [6] uri } } } }`.
fn distribution_point_uri(ext_value: &[u8]) -> Result<String, VerificationError> {
    let uri = Asn1Element::parse_single(ext_value)?
        .child(0)?
        .child(0)?
        .child(0)?
        .child(0)?
        .content();
    String::from_utf8(uri.to_vec())
        .map_err(|_| VerificationError::Asn1Decode("distribution point URI not ASCII"))
}

/// Whether the certificate's serial number appears in the DER-encoded
/// CRL's revoked list. The CRL signature is not checked; callers decide
/// whether to trust the list they fetched.
pub fn is_cert_revoked(cert_der: &[u8], crl_der: &[u8]) -> Result<bool, VerificationError> {
    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| VerificationError::CertificateParse(e.to_string()))?;
    crl_contains_serial(crl_der, cert.raw_serial())
}

fn crl_contains_serial(crl_der: &[u8], serial: &[u8]) -> Result<bool, VerificationError> {
    let cert_list = Asn1Element::parse_single(crl_der)?;
    let tbs_fields = cert_list.child(0)?.children()?;
    // A TBSCertList without a revokedCertificates field has fewer than
    // seven children.
    if tbs_fields.len() < 7 {
        return Ok(false);
    }
    for entry in tbs_fields[5].children()? {
        if entry.child(0)?.integer_bytes()? == serial {
            return Ok(true);
        }
    }
    Ok(false)
}
