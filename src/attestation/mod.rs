//! Attestation statement verification.
//!
//! The attestation object is a CBOR map `{fmt, attStmt, authData}`.
//! Dispatch is a closed set of format verifiers; each one checks the
//! statement's signatures and structure and yields an attestation type
//! plus the trust path (DER certificates, leaf first) it vouches with.
//! Trust-path validation against policy roots happens after dispatch.

mod android_key;
mod android_safetynet;
mod apple;
mod none;
mod packed;
mod tpm;
mod u2f;

use ciborium::value::Value;
use uuid::Uuid;
use x509_parser::certificate::X509Certificate;
use x509_parser::public_key::PublicKey;

use crate::asn1::Asn1Element;
use crate::authenticator_data::AuthenticatorData;
use crate::cbor;
use crate::config::VerificationPolicy;
use crate::cose::{self, CoseAlgorithm, CoseKey};
use crate::errors::VerificationError;
use crate::trust;

// Constants for FIDO OIDs id-fido-gen-ce-aaguid
pub(super) const OID_FIDO_GEN_CE_AAGUID: &str = "1.3.6.1.4.1.45724.1.1.4";

/// The decoded registration envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct AttestationObject {
    pub fmt: String,
    /// Raw authenticator data bytes, the signature base for most formats.
    pub auth_data_raw: Vec<u8>,
    pub auth_data: AuthenticatorData,
    pub att_stmt: Vec<(Value, Value)>,
}

impl AttestationObject {
    /// Decode the envelope. All three members are required and no other
    /// member is allowed.
    pub fn parse(bytes: &[u8]) -> Result<Self, VerificationError> {
        let entries = match cbor::decode(bytes)? {
            Value::Map(entries) => entries,
            _ => {
                return Err(VerificationError::AttestationObjectMalformed(
                    "not a CBOR map",
                ));
            }
        };

        let mut fmt = None;
        let mut att_stmt = None;
        let mut auth_data_raw = None;

        for (key, value) in entries {
            let key = match key {
                Value::Text(text) => text,
                _ => {
                    return Err(VerificationError::AttestationObjectMalformed(
                        "non-text member key",
                    ));
                }
            };
            match (key.as_str(), value) {
                ("fmt", Value::Text(text)) => fmt = Some(text),
                ("fmt", _) => {
                    return Err(VerificationError::AttestationObjectMalformed(
                        "fmt is not a text string",
                    ));
                }
                ("attStmt", Value::Map(entries)) => att_stmt = Some(entries),
                ("attStmt", _) => {
                    return Err(VerificationError::AttestationObjectMalformed(
                        "attStmt is not a map",
                    ));
                }
                ("authData", Value::Bytes(bytes)) => auth_data_raw = Some(bytes),
                ("authData", _) => {
                    return Err(VerificationError::AttestationObjectMalformed(
                        "authData is not a byte string",
                    ));
                }
                _ => {
                    return Err(VerificationError::AttestationObjectMalformed(
                        "unexpected member",
                    ));
                }
            }
        }

        let fmt = fmt.ok_or(VerificationError::AttestationObjectMalformed("missing fmt"))?;
        let att_stmt =
            att_stmt.ok_or(VerificationError::AttestationObjectMalformed("missing attStmt"))?;
        let auth_data_raw = auth_data_raw
            .ok_or(VerificationError::AttestationObjectMalformed("missing authData"))?;
        let auth_data = AuthenticatorData::parse(&auth_data_raw)?;

        Ok(Self {
            fmt,
            auth_data_raw,
            auth_data,
            att_stmt,
        })
    }
}

/// The closed set of attestation statement formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttestationFormat {
    Packed,
    Tpm,
    AndroidKey,
    AndroidSafetyNet,
    FidoU2f,
    Apple,
    None,
}

impl AttestationFormat {
    pub fn from_fmt(fmt: &str) -> Option<Self> {
        match fmt {
            "packed" => Some(AttestationFormat::Packed),
            "tpm" => Some(AttestationFormat::Tpm),
            "android-key" => Some(AttestationFormat::AndroidKey),
            "android-safetynet" => Some(AttestationFormat::AndroidSafetyNet),
            "fido-u2f" => Some(AttestationFormat::FidoU2f),
            "apple" => Some(AttestationFormat::Apple),
            "none" => Some(AttestationFormat::None),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttestationFormat::Packed => "packed",
            AttestationFormat::Tpm => "tpm",
            AttestationFormat::AndroidKey => "android-key",
            AttestationFormat::AndroidSafetyNet => "android-safetynet",
            AttestationFormat::FidoU2f => "fido-u2f",
            AttestationFormat::Apple => "apple",
            AttestationFormat::None => "none",
        }
    }
}

/// How strongly the statement ties the credential to an authenticator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationType {
    /// No attestation claim at all (`fmt` none).
    None,
    /// Signed by the credential key itself.
    SelfAttestation,
    /// Signed by an attestation key with a certificate chain.
    Basic,
    /// Anonymization CA (Apple).
    AttCa,
    /// Unknown format accepted by policy without verification.
    Uncertain,
}

/// The verdict of a successful registration verification.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedAttestation {
    pub credential_id: Vec<u8>,
    pub aaguid: Uuid,
    pub public_key: CoseKey,
    /// Canonical COSE encoding of the key, suitable for storage.
    pub public_key_bytes: Vec<u8>,
    pub algorithm: CoseAlgorithm,
    pub sign_count: u32,
    pub backup_eligible: bool,
    pub backed_up: bool,
    pub attestation_type: AttestationType,
    /// The wire `fmt` tag.
    pub format: String,
    /// Validated certificate chain, leaf first. Empty for self/none.
    pub trust_path: Vec<Vec<u8>>,
}

/// Verifies a registration attestation object.
///
/// # Arguments
/// * `attestation` - The decoded attestation object
/// * `client_data_hash` - SHA-256 of the client data JSON; binds the challenge
/// * `policy` - Acceptance switches and per-format trusted roots
///
/// # Returns
/// * `Result<VerifiedAttestation, VerificationError>` - The credential data
///   and trust verdict, or the first failing check
pub fn verify_attestation_object(
    attestation: &AttestationObject,
    client_data_hash: &[u8],
    policy: &VerificationPolicy,
) -> Result<VerifiedAttestation, VerificationError> {
    let auth_data = &attestation.auth_data;

    if policy.require_user_present && !auth_data.is_user_present() {
        return Err(VerificationError::UserPresentFlagNotSet);
    }
    if policy.require_user_verified && !auth_data.is_user_verified() {
        return Err(VerificationError::UserVerifiedFlagNotSet);
    }

    let acd = auth_data.attested_credential_data()?;

    let format = AttestationFormat::from_fmt(&attestation.fmt);
    let (attestation_type, trust_path) = match format {
        Some(format) => {
            tracing::debug!("Verifying '{}' attestation format", format.as_str());
            match format {
                AttestationFormat::None => {
                    if !policy.allow_none_attestation {
                        return Err(VerificationError::NoneAttestationNotAccepted);
                    }
                    none::verify_none_attestation(&attestation.att_stmt)?
                }
                AttestationFormat::Packed => packed::verify_packed_attestation(
                    &attestation.auth_data_raw,
                    auth_data,
                    client_data_hash,
                    &attestation.att_stmt,
                )?,
                AttestationFormat::FidoU2f => u2f::verify_u2f_attestation(
                    auth_data,
                    client_data_hash,
                    &attestation.att_stmt,
                )?,
                AttestationFormat::Tpm => tpm::verify_tpm_attestation(
                    &attestation.auth_data_raw,
                    auth_data,
                    client_data_hash,
                    &attestation.att_stmt,
                )?,
                AttestationFormat::AndroidKey => android_key::verify_android_key_attestation(
                    &attestation.auth_data_raw,
                    auth_data,
                    client_data_hash,
                    &attestation.att_stmt,
                )?,
                AttestationFormat::AndroidSafetyNet => {
                    android_safetynet::verify_safetynet_attestation(
                        &attestation.auth_data_raw,
                        client_data_hash,
                        &attestation.att_stmt,
                    )?
                }
                AttestationFormat::Apple => apple::verify_apple_attestation(
                    &attestation.auth_data_raw,
                    auth_data,
                    client_data_hash,
                    &attestation.att_stmt,
                )?,
            }
        }
        None if policy.allow_unknown_formats => {
            tracing::warn!(
                "Accepting unknown attestation format '{}' without verification",
                attestation.fmt
            );
            (AttestationType::Uncertain, Vec::new())
        }
        None => return Err(VerificationError::UnsupportedFormat(attestation.fmt.clone())),
    };

    if let Some(format) = format {
        if let Some(roots) = policy.trust_anchors.for_format(format) {
            if !trust_path.is_empty() && !trust::validate_trust_chain(&trust_path, roots) {
                return Err(VerificationError::TrustPathInvalid);
            }
        }
    }

    Ok(VerifiedAttestation {
        credential_id: acd.credential_id.clone(),
        aaguid: acd.aaguid,
        public_key_bytes: acd.public_key.to_bytes()?,
        algorithm: acd.public_key.algorithm(),
        public_key: acd.public_key.clone(),
        sign_count: auth_data.sign_count,
        backup_eligible: auth_data.is_backup_eligible(),
        backed_up: auth_data.is_backed_up(),
        attestation_type,
        format: attestation.fmt.clone(),
        trust_path,
    })
}

// ---- attestation statement field helpers ----

pub(super) fn stmt_value<'a>(
    att_stmt: &'a [(Value, Value)],
    name: &str,
) -> Option<&'a Value> {
    att_stmt.iter().find_map(|(k, v)| match k {
        Value::Text(key) if key == name => Some(v),
        _ => None,
    })
}

pub(super) fn stmt_bytes<'a>(att_stmt: &'a [(Value, Value)], name: &str) -> Option<&'a [u8]> {
    match stmt_value(att_stmt, name) {
        Some(Value::Bytes(bytes)) => Some(bytes.as_slice()),
        _ => None,
    }
}

pub(super) fn stmt_text<'a>(att_stmt: &'a [(Value, Value)], name: &str) -> Option<&'a str> {
    match stmt_value(att_stmt, name) {
        Some(Value::Text(text)) => Some(text.as_str()),
        _ => None,
    }
}

pub(super) fn stmt_alg(att_stmt: &[(Value, Value)]) -> Option<i64> {
    match stmt_value(att_stmt, "alg") {
        Some(Value::Integer(alg)) => cbor::integer_to_i64(alg),
        _ => None,
    }
}

/// Certificate chain from an `x5c` member. Entries that are not byte
/// strings are skipped; an absent member and an array without any byte
/// string both come back as `None`.
pub(super) fn stmt_x5c(att_stmt: &[(Value, Value)]) -> Option<Vec<Vec<u8>>> {
    match stmt_value(att_stmt, "x5c") {
        Some(Value::Array(certs)) => {
            let chain: Vec<Vec<u8>> = certs
                .iter()
                .filter_map(|cert| match cert {
                    Value::Bytes(bytes) => Some(bytes.clone()),
                    _ => None,
                })
                .collect();
            if chain.is_empty() { None } else { Some(chain) }
        }
        _ => None,
    }
}

/// webpki verification algorithm for a COSE algorithm, for signatures
/// made by an attestation certificate key.
pub(super) fn webpki_signature_algorithm(
    alg: CoseAlgorithm,
) -> Result<&'static webpki::SignatureAlgorithm, VerificationError> {
    Ok(match alg {
        CoseAlgorithm::Es256 => &webpki::ECDSA_P256_SHA256,
        CoseAlgorithm::Es384 => &webpki::ECDSA_P384_SHA384,
        CoseAlgorithm::Rs256 => &webpki::RSA_PKCS1_2048_8192_SHA256,
        CoseAlgorithm::Rs384 => &webpki::RSA_PKCS1_2048_8192_SHA384,
        CoseAlgorithm::Rs512 => &webpki::RSA_PKCS1_2048_8192_SHA512,
        CoseAlgorithm::Ps256 => &webpki::RSA_PSS_2048_8192_SHA256_LEGACY_KEY,
        CoseAlgorithm::Ps384 => &webpki::RSA_PSS_2048_8192_SHA384_LEGACY_KEY,
        CoseAlgorithm::Ps512 => &webpki::RSA_PSS_2048_8192_SHA512_LEGACY_KEY,
        CoseAlgorithm::EdDsa => &webpki::ED25519,
        _ => return Err(VerificationError::UnsupportedAlgorithm(alg.value())),
    })
}

/// Whether the certificate's subject public key is the credential key.
pub(super) fn spki_matches_cose_key(cert: &X509Certificate<'_>, key: &CoseKey) -> bool {
    match (cert.public_key().parsed(), key) {
        (Ok(PublicKey::EC(point)), CoseKey::Ec2 { curve, x, y, .. }) => {
            point.data() == cose::uncompressed_point(*curve, x, y).as_slice()
        }
        (Ok(PublicKey::RSA(rsa)), CoseKey::Rsa {
            modulus, exponent, ..
        }) => {
            trim_leading_zeros(rsa.modulus) == trim_leading_zeros(modulus)
                && trim_leading_zeros(rsa.exponent) == trim_leading_zeros(exponent)
        }
        _ => false,
    }
}

/// DER INTEGER values carry a sign-padding octet; COSE values do not.
fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

/// AAGUID from the id-fido-gen-ce-aaguid extension, when the
/// certificate carries one. The extension value is an OCTET STRING
/// wrapping the 16 bytes.
pub(super) fn aaguid_from_certificate(
    cert: &X509Certificate<'_>,
) -> Result<Option<Uuid>, VerificationError> {
    let Some(ext) = cert
        .extensions()
        .iter()
        .find(|ext| ext.oid.to_string() == OID_FIDO_GEN_CE_AAGUID)
    else {
        return Ok(None);
    };
    let octets = Asn1Element::parse_single(ext.value)?.octet_string()?;
    let aaguid = Uuid::from_slice(octets).map_err(|_| {
        VerificationError::CertificateParse("AAGUID extension is not 16 bytes".to_string())
    })?;
    Ok(Some(aaguid))
}
