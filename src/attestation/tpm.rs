//! TPM attestation statement verification.
//!
//! The statement carries the credential public key a second time as a
//! marshalled `TPMT_PUBLIC` and wraps the signed claim in a
//! `TPMS_ATTEST` structure. Every binding between the COSE key, the
//! pubArea, and the certInfo is cross-checked before the AIK signature
//! and certificate profile are examined.

use ciborium::value::Value;
use ring::signature;
use uuid::Uuid;
use x509_parser::public_key::PublicKey;
use x509_parser::{extensions::GeneralName, prelude::*};

use crate::authenticator_data::AuthenticatorData;
use crate::bytes::ByteReader;
use crate::cose::{CoseAlgorithm, CoseCurve, CoseKey};
use crate::crypto::{self, HashAlg};
use crate::errors::VerificationError;

use super::{
    AttestationType, aaguid_from_certificate, stmt_alg, stmt_bytes, stmt_text, stmt_x5c,
};

const TPM_GENERATED_VALUE: u32 = 0xFF544347; // 0xFF + "TCG"
const TPM_ST_ATTEST_CERTIFY: u16 = 0x8017;

// TPM_ALG_ID values the parser handles by name.
const TPM_ALG_RSA: u16 = 0x0001;
const TPM_ALG_SHA1: u16 = 0x0004;
const TPM_ALG_SHA256: u16 = 0x000B;
const TPM_ALG_SHA384: u16 = 0x000C;
const TPM_ALG_SHA512: u16 = 0x000D;
const TPM_ALG_ECC: u16 = 0x0023;

/// Every identifier registered in the TPM_ALG_ID table. A name whose
/// algorithm falls outside this set is invalid rather than merely an
/// unacceptable hash.
const TPM_ALG_REGISTRY: &[u16] = &[
    0x0001, 0x0003, 0x0004, 0x0005, 0x0006, 0x0007, 0x0008, 0x000A, 0x000B, 0x000C, 0x000D,
    0x0010, 0x0012, 0x0013, 0x0014, 0x0015, 0x0016, 0x0017, 0x0018, 0x0019, 0x001A, 0x001B,
    0x001C, 0x001D, 0x0020, 0x0021, 0x0022, 0x0023, 0x0025, 0x0026, 0x0040, 0x0041, 0x0042,
    0x0043, 0x0044,
];

// TPM_ECC_CURVE registry values.
const TPM_ECC_NIST_P256: u16 = 0x0003;
const TPM_ECC_NIST_P384: u16 = 0x0004;
const TPM_ECC_NIST_P521: u16 = 0x0005;

// TCG directory attribute types carried in the SAN.
const OID_TCG_AT_TPM_MANUFACTURER: &str = "2.23.133.2.1";
const OID_TCG_AT_TPM_MODEL: &str = "2.23.133.2.2";
const OID_TCG_AT_TPM_VERSION: &str = "2.23.133.2.3";
// tcg-kp-AIKCertificate extended key usage.
const OID_TCG_KP_AIK_CERTIFICATE: &str = "2.23.133.8.3";

/// TCG registered TPM manufacturer identifiers. The last entry is the
/// FIDO conformance testing vendor id.
const TPM_MANUFACTURERS: &[&str] = &[
    "id:414D4400", // AMD
    "id:41544D4C", // Atmel
    "id:4252434D", // Broadcom
    "id:4353434F", // Cisco
    "id:464C5953", // Flyslice Technologies
    "id:474F4F47", // Google
    "id:48504500", // HPE
    "id:49424D00", // IBM
    "id:49465800", // Infineon
    "id:494E5443", // Intel
    "id:4C454E00", // Lenovo
    "id:4D534654", // Microsoft
    "id:4E534D20", // National Semiconductor
    "id:4E545A00", // Nationz
    "id:4E544300", // Nuvoton Technology
    "id:51434F4D", // Qualcomm
    "id:524F4343", // Fuzhou Rockchip
    "id:534D5343", // SMSC
    "id:534D534E", // Samsung
    "id:534E5300", // Sinosun
    "id:53544D20", // STMicroelectronics
    "id:54584E00", // Texas Instruments
    "id:57454300", // Winbond
    "id:FFFFF1D0", // FIDO conformance testing
];

/// Verifies a TPM attestation statement
///
/// # Arguments
/// * `auth_data_raw` - Raw authenticator data bytes
/// * `auth_data` - The decoded authenticator data
/// * `client_data_hash` - SHA-256 of the client data JSON
/// * `att_stmt` - The attestation statement map
///
/// # Returns
/// * The attestation type and trust path, or the first failing check
pub(super) fn verify_tpm_attestation(
    auth_data_raw: &[u8],
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8],
    att_stmt: &[(Value, Value)],
) -> Result<(AttestationType, Vec<Vec<u8>>), VerificationError> {
    let ver =
        stmt_text(att_stmt, "ver").ok_or(VerificationError::AttStmtFieldMissing("tpm", "ver"))?;
    if ver != "2.0" {
        return Err(VerificationError::TpmVersionUnsupported);
    }

    let alg = stmt_alg(att_stmt).ok_or(VerificationError::AttStmtFieldMissing("tpm", "alg"))?;
    let alg = CoseAlgorithm::try_from_i64(alg)?;

    let pub_area_raw = stmt_bytes(att_stmt, "pubArea")
        .filter(|b| !b.is_empty())
        .ok_or(VerificationError::TpmMalformedPubArea)?;
    let tpm_key = TpmPublicKey::parse(pub_area_raw)?;
    let credential_key = &auth_data.attested_credential_data()?.public_key;
    verify_public_key_match(credential_key, &tpm_key)?;

    let cert_info_raw = stmt_bytes(att_stmt, "certInfo")
        .filter(|b| !b.is_empty())
        .ok_or(VerificationError::TpmMalformedCertInfo)?;
    let cert_info = TpmsAttest::parse(cert_info_raw)?;

    if cert_info.extra_data.is_empty() {
        return Err(VerificationError::TpmBadExtraData);
    }
    let mut att_to_be_signed = Vec::with_capacity(auth_data_raw.len() + client_data_hash.len());
    att_to_be_signed.extend_from_slice(auth_data_raw);
    att_to_be_signed.extend_from_slice(client_data_hash);
    if cert_info.extra_data != alg.hash_alg().digest(&att_to_be_signed) {
        return Err(VerificationError::TpmExtraDataHashMismatch);
    }

    // certInfo.attested.name must be a valid Name for pubArea
    let (name_hash, name_digest) = parse_tpm2b_name(&cert_info.name)?;
    if name_hash.digest(pub_area_raw) != name_digest {
        return Err(VerificationError::TpmAttestedHashMismatch);
    }

    match (stmt_x5c(att_stmt), stmt_bytes(att_stmt, "ecdaaKeyId")) {
        (Some(x5c), None) => {
            let sig = stmt_bytes(att_stmt, "sig")
                .filter(|s| !s.is_empty())
                .ok_or(VerificationError::TpmInvalidSignature)?;

            let aik_cert_bytes = &x5c[0];
            let (_, aik_cert) = X509Certificate::from_der(aik_cert_bytes)
                .map_err(|e| VerificationError::CertificateParse(e.to_string()))?;

            if !verify_certify_signature(&aik_cert, alg, cert_info_raw, sig)? {
                return Err(VerificationError::TpmBadSignature);
            }

            verify_aik_certificate(&aik_cert, auth_data.attested_credential_data()?.aaguid)?;

            Ok((AttestationType::AttCa, x5c))
        }
        (None, Some(_)) => Err(VerificationError::TpmEcdaaNotImplemented),
        (None, None) => Err(VerificationError::TpmMissingX5cOrEcdaa),
        (Some(_), Some(_)) => {
            Err(VerificationError::AttStmtFieldMalformed("tpm", "ecdaaKeyId"))
        }
    }
}

/// Key material from a marshalled `TPMT_PUBLIC`, trimmed to the two key
/// types WebAuthn statements carry. RSA parameters hold `symmetric`,
/// `scheme`, and `keyBits` before the exponent; ECC parameters hold
/// `symmetric`, `scheme`, the curve, and `kdf` before the point.
#[derive(Debug, PartialEq)]
enum TpmPublicKey {
    Rsa { exponent: u32, modulus: Vec<u8> },
    Ecc { curve_id: u16, x: Vec<u8>, y: Vec<u8> },
}

impl TpmPublicKey {
    fn parse(pub_area: &[u8]) -> Result<Self, VerificationError> {
        let mut reader = ByteReader::new(pub_area);

        let key_type = reader
            .read_u16_be()
            .ok_or(VerificationError::TpmMalformedPubArea)?;
        // nameAlg, objectAttributes, authPolicy
        reader
            .read_u16_be()
            .ok_or(VerificationError::TpmMalformedPubArea)?;
        reader
            .read_u32_be()
            .ok_or(VerificationError::TpmMalformedPubArea)?;
        reader
            .read_tpm2b()
            .ok_or(VerificationError::TpmMalformedPubArea)?;

        match key_type {
            TPM_ALG_RSA => {
                // symmetric, scheme, keyBits
                reader
                    .skip(6)
                    .ok_or(VerificationError::TpmMalformedPubArea)?;
                let exponent = match reader
                    .read_u32_be()
                    .ok_or(VerificationError::TpmMalformedPubArea)?
                {
                    // zero marks the default RSA exponent
                    0 => 65537,
                    e => e,
                };
                let modulus = reader
                    .read_tpm2b()
                    .ok_or(VerificationError::TpmMalformedPubArea)?
                    .to_vec();
                Ok(TpmPublicKey::Rsa { exponent, modulus })
            }
            TPM_ALG_ECC => {
                // symmetric, scheme
                reader
                    .skip(4)
                    .ok_or(VerificationError::TpmMalformedPubArea)?;
                let curve_id = reader
                    .read_u16_be()
                    .ok_or(VerificationError::TpmMalformedPubArea)?;
                // kdf
                reader
                    .read_u16_be()
                    .ok_or(VerificationError::TpmMalformedPubArea)?;
                let x = reader
                    .read_tpm2b()
                    .ok_or(VerificationError::TpmMalformedPubArea)?
                    .to_vec();
                let y = reader
                    .read_tpm2b()
                    .ok_or(VerificationError::TpmMalformedPubArea)?
                    .to_vec();
                Ok(TpmPublicKey::Ecc { curve_id, x, y })
            }
            _ => Err(VerificationError::TpmMalformedPubArea),
        }
    }
}

/// The signed `TPMS_ATTEST` claim. Only the fields the checks consume
/// are retained; clock and firmware data are skipped over.
#[derive(Debug)]
struct TpmsAttest {
    extra_data: Vec<u8>,
    name: Vec<u8>,
}

impl TpmsAttest {
    fn parse(cert_info: &[u8]) -> Result<Self, VerificationError> {
        let mut reader = ByteReader::new(cert_info);

        let magic = reader
            .read_u32_be()
            .ok_or(VerificationError::TpmMalformedCertInfo)?;
        if magic != TPM_GENERATED_VALUE {
            return Err(VerificationError::TpmBadMagic(magic));
        }
        let tag = reader
            .read_u16_be()
            .ok_or(VerificationError::TpmMalformedCertInfo)?;
        if tag != TPM_ST_ATTEST_CERTIFY {
            return Err(VerificationError::TpmBadStructureTag(tag));
        }

        // qualifiedSigner
        reader
            .read_tpm2b()
            .ok_or(VerificationError::TpmMalformedCertInfo)?;
        let extra_data = reader
            .read_tpm2b()
            .ok_or(VerificationError::TpmMalformedCertInfo)?
            .to_vec();
        // clockInfo: clock, resetCount, restartCount, safe
        reader
            .skip(8 + 4 + 4 + 1)
            .ok_or(VerificationError::TpmMalformedCertInfo)?;
        // firmwareVersion
        reader
            .read_u64_be()
            .ok_or(VerificationError::TpmMalformedCertInfo)?;
        let name = reader
            .read_tpm2b()
            .ok_or(VerificationError::TpmMalformedCertInfo)?
            .to_vec();
        // qualifiedName
        reader
            .read_tpm2b()
            .ok_or(VerificationError::TpmMalformedCertInfo)?;

        Ok(TpmsAttest { extra_data, name })
    }
}

/// A `TPM2B_NAME` holds either a 4-byte handle or a hash algorithm
/// identifier followed by a digest of that algorithm's width.
fn parse_tpm2b_name(name: &[u8]) -> Result<(HashAlg, &[u8]), VerificationError> {
    if name.len() == 4 {
        return Err(VerificationError::TpmNameHandlePresent);
    }
    if name.is_empty() {
        return Err(VerificationError::TpmNameEmpty);
    }
    if name.len() < 2 {
        return Err(VerificationError::TpmNameAlgInvalid);
    }

    let alg_id = u16::from_be_bytes([name[0], name[1]]);
    let digest = &name[2..];
    let hash = match alg_id {
        TPM_ALG_SHA1 => HashAlg::Sha1,
        TPM_ALG_SHA256 => HashAlg::Sha256,
        TPM_ALG_SHA384 => HashAlg::Sha384,
        TPM_ALG_SHA512 => HashAlg::Sha512,
        id if TPM_ALG_REGISTRY.contains(&id) => {
            return Err(VerificationError::TpmNameHashUnacceptable);
        }
        _ => return Err(VerificationError::TpmNameAlgInvalid),
    };
    if digest.len() != hash.output_len() {
        return Err(VerificationError::TpmNameExtraBytes);
    }

    Ok((hash, digest))
}

/// The credential COSE key and the TPM `pubArea` must describe the same
/// key material.
fn verify_public_key_match(
    key: &CoseKey,
    tpm_key: &TpmPublicKey,
) -> Result<(), VerificationError> {
    match (key, tpm_key) {
        (
            CoseKey::Rsa {
                modulus, exponent, ..
            },
            TpmPublicKey::Rsa {
                exponent: tpm_exponent,
                modulus: tpm_modulus,
            },
        ) => {
            if modulus != tpm_modulus {
                return Err(VerificationError::TpmPublicKeyMismatch);
            }
            if exponent.len() > 4 || cose_exponent(exponent) != *tpm_exponent {
                return Err(VerificationError::TpmExponentMismatch);
            }
            Ok(())
        }
        (
            CoseKey::Ec2 { curve, x, y, .. },
            TpmPublicKey::Ecc {
                curve_id,
                x: tpm_x,
                y: tpm_y,
            },
        ) => {
            if tpm_curve(*curve) != Some(*curve_id) {
                return Err(VerificationError::TpmCurveMismatch);
            }
            if x != tpm_x {
                return Err(VerificationError::TpmXCoordinateMismatch);
            }
            if y != tpm_y {
                return Err(VerificationError::TpmYCoordinateMismatch);
            }
            Ok(())
        }
        _ => Err(VerificationError::TpmPublicKeyMismatch),
    }
}

fn cose_exponent(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b))
}

fn tpm_curve(curve: CoseCurve) -> Option<u16> {
    match curve {
        CoseCurve::P256 => Some(TPM_ECC_NIST_P256),
        CoseCurve::P384 => Some(TPM_ECC_NIST_P384),
        CoseCurve::P521 => Some(TPM_ECC_NIST_P521),
        _ => None,
    }
}

/// Signature over the raw `certInfo` bytes made by the AIK. The key is
/// the certificate's SubjectPublicKeyInfo, paired with the declared
/// COSE algorithm.
fn verify_certify_signature(
    cert: &X509Certificate,
    alg: CoseAlgorithm,
    cert_info_raw: &[u8],
    sig: &[u8],
) -> Result<bool, VerificationError> {
    let spki = cert.public_key();
    match spki.parsed() {
        Ok(PublicKey::RSA(_)) => {
            let ring_alg: &dyn signature::VerificationAlgorithm = match alg {
                CoseAlgorithm::Rs256 => &signature::RSA_PKCS1_2048_8192_SHA256,
                CoseAlgorithm::Rs384 => &signature::RSA_PKCS1_2048_8192_SHA384,
                CoseAlgorithm::Rs512 => &signature::RSA_PKCS1_2048_8192_SHA512,
                CoseAlgorithm::Ps256 => &signature::RSA_PSS_2048_8192_SHA256,
                CoseAlgorithm::Ps384 => &signature::RSA_PSS_2048_8192_SHA384,
                CoseAlgorithm::Ps512 => &signature::RSA_PSS_2048_8192_SHA512,
                CoseAlgorithm::Rs1 => &signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
                _ => return Err(VerificationError::KeyTypeMismatch),
            };
            Ok(crypto::verify_with_key(
                ring_alg,
                spki.subject_public_key.data.as_ref(),
                cert_info_raw,
                sig,
            ))
        }
        Ok(PublicKey::EC(point)) => {
            let ring_alg: &dyn signature::VerificationAlgorithm =
                match (alg, point.data().len()) {
                    (CoseAlgorithm::Es256, 65) => &signature::ECDSA_P256_SHA256_ASN1,
                    (CoseAlgorithm::Es384, 97) => &signature::ECDSA_P384_SHA384_ASN1,
                    (CoseAlgorithm::Es256, 97) => &signature::ECDSA_P384_SHA256_ASN1,
                    (CoseAlgorithm::Es384, 65) => &signature::ECDSA_P256_SHA384_ASN1,
                    _ => return Err(VerificationError::UnsupportedAlgorithm(alg.value())),
                };
            Ok(crypto::verify_with_key(
                ring_alg,
                point.data(),
                cert_info_raw,
                sig,
            ))
        }
        _ => Err(VerificationError::UnsupportedAlgorithm(alg.value())),
    }
}

/// TPM attestation identity certificate requirements: v3, empty
/// subject, TCG directory attributes in the SAN, the AIK extended key
/// usage, and not a CA.
fn verify_aik_certificate(
    cert: &X509Certificate,
    aaguid: Uuid,
) -> Result<(), VerificationError> {
    if cert.version() != X509Version::V3 {
        return Err(VerificationError::AikCertNotV3);
    }

    if cert.subject().iter().next().is_some() {
        return Err(VerificationError::AikCertSubjectNotEmpty);
    }

    let san = cert
        .subject_alternative_name()
        .map_err(|e| VerificationError::CertificateParse(e.to_string()))?
        .ok_or(VerificationError::AikCertSanMissing)?;
    let mut manufacturer = None;
    let mut model = None;
    let mut version = None;
    for name in &san.value.general_names {
        if let GeneralName::DirectoryName(dir) = name {
            for attr in dir.iter_attributes() {
                match attr.attr_type().to_string().as_str() {
                    OID_TCG_AT_TPM_MANUFACTURER => manufacturer = attr.as_str().ok(),
                    OID_TCG_AT_TPM_MODEL => model = attr.as_str().ok(),
                    OID_TCG_AT_TPM_VERSION => version = attr.as_str().ok(),
                    _ => {}
                }
            }
        }
    }
    let (Some(manufacturer), Some(_model), Some(_version)) = (manufacturer, model, version)
    else {
        return Err(VerificationError::AikCertSanMissing);
    };
    if !TPM_MANUFACTURERS.contains(&manufacturer) {
        return Err(VerificationError::AikCertInvalidManufacturer);
    }

    let eku = cert
        .extended_key_usage()
        .map_err(|e| VerificationError::CertificateParse(e.to_string()))?
        .ok_or(VerificationError::AikCertEkuMissingAik)?;
    let has_aik_usage = eku
        .value
        .other
        .iter()
        .any(|oid| oid.to_string() == OID_TCG_KP_AIK_CERTIFICATE);
    if !has_aik_usage {
        return Err(VerificationError::AikCertEkuMissingAik);
    }

    match cert.basic_constraints() {
        Ok(Some(bc)) if !bc.value.ca => {}
        _ => return Err(VerificationError::AikCertCaComponentTrue),
    }

    // An all-zero extension value stands for "no AAGUID claim"
    if let Some(cert_aaguid) = aaguid_from_certificate(cert)? {
        if !cert_aaguid.is_nil() && cert_aaguid != aaguid {
            return Err(VerificationError::AaguidMismatch {
                expected: aaguid,
                actual: cert_aaguid,
            });
        }
    }

    Ok(())
}
