//! COSE public-key and algorithm model.
//!
//! A credential public key arrives as a CBOR map inside attested
//! credential data. The engine decodes it into one of three key shapes
//! (EC2, RSA, OKP) and exposes a single capability: verifying a signature
//! over a message under a named COSE algorithm. Signature bytes follow
//! the WebAuthn wire convention (ASN.1 DER for ECDSA).

use ciborium::value::{Integer, Value};

use crate::cbor;
use crate::crypto::{self, HashAlg};
use crate::errors::VerificationError;

/// COSE signature algorithm identifiers the engine recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoseAlgorithm {
    Es256,
    Es384,
    Es512,
    EdDsa,
    Es256K,
    Ps256,
    Ps384,
    Ps512,
    Rs256,
    Rs384,
    Rs512,
    Rs1,
}

impl CoseAlgorithm {
    pub fn try_from_i64(value: i64) -> Result<Self, VerificationError> {
        match value {
            -7 => Ok(CoseAlgorithm::Es256),
            -35 => Ok(CoseAlgorithm::Es384),
            -36 => Ok(CoseAlgorithm::Es512),
            -8 => Ok(CoseAlgorithm::EdDsa),
            -47 => Ok(CoseAlgorithm::Es256K),
            -37 => Ok(CoseAlgorithm::Ps256),
            -38 => Ok(CoseAlgorithm::Ps384),
            -39 => Ok(CoseAlgorithm::Ps512),
            -257 => Ok(CoseAlgorithm::Rs256),
            -258 => Ok(CoseAlgorithm::Rs384),
            -259 => Ok(CoseAlgorithm::Rs512),
            -65535 => Ok(CoseAlgorithm::Rs1),
            other => Err(VerificationError::UnrecognizedAlgorithm(other)),
        }
    }

    pub fn value(&self) -> i64 {
        match self {
            CoseAlgorithm::Es256 => -7,
            CoseAlgorithm::Es384 => -35,
            CoseAlgorithm::Es512 => -36,
            CoseAlgorithm::EdDsa => -8,
            CoseAlgorithm::Es256K => -47,
            CoseAlgorithm::Ps256 => -37,
            CoseAlgorithm::Ps384 => -38,
            CoseAlgorithm::Ps512 => -39,
            CoseAlgorithm::Rs256 => -257,
            CoseAlgorithm::Rs384 => -258,
            CoseAlgorithm::Rs512 => -259,
            CoseAlgorithm::Rs1 => -65535,
        }
    }

    /// The hash each algorithm binds its message with. Total over the
    /// recognized set; EdDSA is listed as SHA-512 for parity with TPM
    /// statements even though Ed25519 verification consumes the raw
    /// message.
    pub fn hash_alg(&self) -> HashAlg {
        match self {
            CoseAlgorithm::Es256 | CoseAlgorithm::Es256K | CoseAlgorithm::Ps256
            | CoseAlgorithm::Rs256 => HashAlg::Sha256,
            CoseAlgorithm::Es384 | CoseAlgorithm::Ps384 | CoseAlgorithm::Rs384 => HashAlg::Sha384,
            CoseAlgorithm::Es512 | CoseAlgorithm::EdDsa | CoseAlgorithm::Ps512
            | CoseAlgorithm::Rs512 => HashAlg::Sha512,
            CoseAlgorithm::Rs1 => HashAlg::Sha1,
        }
    }
}

/// COSE elliptic curve identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoseCurve {
    P256,
    P384,
    P521,
    Ed25519,
    Secp256k1,
}

impl CoseCurve {
    pub fn try_from_i64(value: i64) -> Result<Self, VerificationError> {
        match value {
            1 => Ok(CoseCurve::P256),
            2 => Ok(CoseCurve::P384),
            3 => Ok(CoseCurve::P521),
            6 => Ok(CoseCurve::Ed25519),
            8 => Ok(CoseCurve::Secp256k1),
            other => Err(VerificationError::UnsupportedCurve(other)),
        }
    }

    pub fn value(&self) -> i64 {
        match self {
            CoseCurve::P256 => 1,
            CoseCurve::P384 => 2,
            CoseCurve::P521 => 3,
            CoseCurve::Ed25519 => 6,
            CoseCurve::Secp256k1 => 8,
        }
    }

    /// Coordinate width in bytes (ceil of the field size).
    pub fn coordinate_size(&self) -> usize {
        match self {
            CoseCurve::P256 | CoseCurve::Secp256k1 | CoseCurve::Ed25519 => 32,
            CoseCurve::P384 => 48,
            CoseCurve::P521 => 66,
        }
    }
}

/// A decoded credential public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoseKey {
    Ec2 {
        alg: CoseAlgorithm,
        curve: CoseCurve,
        x: Vec<u8>,
        y: Vec<u8>,
    },
    Rsa {
        alg: CoseAlgorithm,
        modulus: Vec<u8>,
        exponent: Vec<u8>,
    },
    Okp {
        alg: CoseAlgorithm,
        curve: CoseCurve,
        x: Vec<u8>,
    },
}

// COSE map labels
const LABEL_KTY: i64 = 1;
const LABEL_ALG: i64 = 3;
const LABEL_CRV_OR_N: i64 = -1;
const LABEL_X_OR_E: i64 = -2;
const LABEL_Y: i64 = -3;

const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;

impl CoseKey {
    /// Decode a key from a buffer holding exactly one CBOR map.
    pub fn parse(bytes: &[u8]) -> Result<Self, VerificationError> {
        Self::from_cbor_value(&cbor::decode(bytes)?)
    }

    /// Decode the key map at the start of `bytes`, reporting how many
    /// bytes it occupied. The authenticator-data parser needs this to
    /// find where the extensions begin.
    pub(crate) fn parse_first(bytes: &[u8]) -> Result<(Self, usize), VerificationError> {
        let (value, consumed) = cbor::decode_first(bytes)?;
        Ok((Self::from_cbor_value(&value)?, consumed))
    }

    pub(crate) fn from_cbor_value(value: &Value) -> Result<Self, VerificationError> {
        let entries = match value {
            Value::Map(entries) => entries,
            _ => return Err(VerificationError::CoseKeyMalformed("not a map")),
        };

        let get_int = |label: i64| -> Option<i64> {
            entries.iter().find_map(|(k, v)| match (k, v) {
                (Value::Integer(k), Value::Integer(v))
                    if cbor::integer_to_i64(k) == Some(label) =>
                {
                    cbor::integer_to_i64(v)
                }
                _ => None,
            })
        };
        let get_bytes = |label: i64| -> Option<&[u8]> {
            entries.iter().find_map(|(k, v)| match (k, v) {
                (Value::Integer(k), Value::Bytes(v))
                    if cbor::integer_to_i64(k) == Some(label) =>
                {
                    Some(v.as_slice())
                }
                _ => None,
            })
        };

        let kty = get_int(LABEL_KTY).ok_or(VerificationError::CoseKeyMissingField("kty"))?;
        let alg_value =
            get_int(LABEL_ALG).ok_or(VerificationError::CoseKeyMissingField("alg"))?;
        let alg = CoseAlgorithm::try_from_i64(alg_value)?;

        match kty {
            KTY_EC2 => {
                let crv = get_int(LABEL_CRV_OR_N)
                    .ok_or(VerificationError::CoseKeyMissingField("crv"))?;
                let curve = CoseCurve::try_from_i64(crv)?;
                let x = get_bytes(LABEL_X_OR_E)
                    .ok_or(VerificationError::CoseKeyMissingField("x"))?;
                let y = get_bytes(LABEL_Y).ok_or(VerificationError::CoseKeyMissingField("y"))?;
                if x.is_empty() || y.is_empty() || x.len() > curve.coordinate_size()
                    || y.len() > curve.coordinate_size()
                {
                    return Err(VerificationError::CoseKeyMalformed(
                        "coordinate length does not fit the curve",
                    ));
                }
                Ok(CoseKey::Ec2 {
                    alg,
                    curve,
                    x: x.to_vec(),
                    y: y.to_vec(),
                })
            }
            KTY_RSA => {
                let modulus = get_bytes(LABEL_CRV_OR_N)
                    .ok_or(VerificationError::CoseKeyMissingField("n"))?;
                let exponent = get_bytes(LABEL_X_OR_E)
                    .ok_or(VerificationError::CoseKeyMissingField("e"))?;
                if modulus.is_empty() || exponent.is_empty() {
                    return Err(VerificationError::CoseKeyMalformed(
                        "empty RSA modulus or exponent",
                    ));
                }
                Ok(CoseKey::Rsa {
                    alg,
                    modulus: modulus.to_vec(),
                    exponent: exponent.to_vec(),
                })
            }
            KTY_OKP => {
                let crv = get_int(LABEL_CRV_OR_N)
                    .ok_or(VerificationError::CoseKeyMissingField("crv"))?;
                let curve = CoseCurve::try_from_i64(crv)?;
                let x = get_bytes(LABEL_X_OR_E)
                    .ok_or(VerificationError::CoseKeyMissingField("x"))?;
                if x.len() != curve.coordinate_size() {
                    return Err(VerificationError::CoseKeyMalformed(
                        "public key length does not fit the curve",
                    ));
                }
                Ok(CoseKey::Okp {
                    alg,
                    curve,
                    x: x.to_vec(),
                })
            }
            other => Err(VerificationError::UnsupportedKeyType(other)),
        }
    }

    /// Canonical CBOR encoding of the key (labels in the order
    /// authenticators emit: 1, 3, -1, -2, -3).
    pub fn to_bytes(&self) -> Result<Vec<u8>, VerificationError> {
        let int = |v: i64| Value::Integer(Integer::from(v));
        let entries = match self {
            CoseKey::Ec2 { alg, curve, x, y } => vec![
                (int(LABEL_KTY), int(KTY_EC2)),
                (int(LABEL_ALG), int(alg.value())),
                (int(LABEL_CRV_OR_N), int(curve.value())),
                (int(LABEL_X_OR_E), Value::Bytes(x.clone())),
                (int(LABEL_Y), Value::Bytes(y.clone())),
            ],
            CoseKey::Rsa {
                alg,
                modulus,
                exponent,
            } => vec![
                (int(LABEL_KTY), int(KTY_RSA)),
                (int(LABEL_ALG), int(alg.value())),
                (int(LABEL_CRV_OR_N), Value::Bytes(modulus.clone())),
                (int(LABEL_X_OR_E), Value::Bytes(exponent.clone())),
            ],
            CoseKey::Okp { alg, curve, x } => vec![
                (int(LABEL_KTY), int(KTY_OKP)),
                (int(LABEL_ALG), int(alg.value())),
                (int(LABEL_CRV_OR_N), int(curve.value())),
                (int(LABEL_X_OR_E), Value::Bytes(x.clone())),
            ],
        };
        cbor::encode(&Value::Map(entries))
    }

    pub fn algorithm(&self) -> CoseAlgorithm {
        match self {
            CoseKey::Ec2 { alg, .. } | CoseKey::Rsa { alg, .. } | CoseKey::Okp { alg, .. } => *alg,
        }
    }

    /// Verify `signature` over `message` under `alg`.
    ///
    /// Returns `Ok(false)` on a cryptographic mismatch; errors are
    /// reserved for structural problems: a key-type/algorithm pairing
    /// that makes no sense, or an algorithm the verification backend
    /// does not implement (P-521, secp256k1).
    pub fn verify(
        &self,
        alg: CoseAlgorithm,
        message: &[u8],
        signature: &[u8],
    ) -> Result<bool, VerificationError> {
        use ring::signature as rs;

        match self {
            CoseKey::Ec2 { curve, x, y, .. } => {
                match alg {
                    CoseAlgorithm::Es256 | CoseAlgorithm::Es384 | CoseAlgorithm::Es512 => {}
                    CoseAlgorithm::Es256K if *curve == CoseCurve::Secp256k1 => {
                        return Err(VerificationError::UnsupportedAlgorithm(alg.value()));
                    }
                    _ => return Err(VerificationError::KeyTypeMismatch),
                }
                let ring_alg: &'static dyn rs::VerificationAlgorithm =
                    match (curve, alg.hash_alg()) {
                        (CoseCurve::P256, HashAlg::Sha256) => &rs::ECDSA_P256_SHA256_ASN1,
                        (CoseCurve::P256, HashAlg::Sha384) => &rs::ECDSA_P256_SHA384_ASN1,
                        (CoseCurve::P384, HashAlg::Sha256) => &rs::ECDSA_P384_SHA256_ASN1,
                        (CoseCurve::P384, HashAlg::Sha384) => &rs::ECDSA_P384_SHA384_ASN1,
                        _ => return Err(VerificationError::UnsupportedAlgorithm(alg.value())),
                    };
                let point = uncompressed_point(*curve, x, y);
                Ok(crypto::verify_with_key(ring_alg, &point, message, signature))
            }
            CoseKey::Rsa {
                modulus, exponent, ..
            } => {
                let ring_alg: &'static dyn rs::VerificationAlgorithm = match alg {
                    CoseAlgorithm::Rs256 => &rs::RSA_PKCS1_2048_8192_SHA256,
                    CoseAlgorithm::Rs384 => &rs::RSA_PKCS1_2048_8192_SHA384,
                    CoseAlgorithm::Rs512 => &rs::RSA_PKCS1_2048_8192_SHA512,
                    CoseAlgorithm::Rs1 => &rs::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
                    CoseAlgorithm::Ps256 => &rs::RSA_PSS_2048_8192_SHA256,
                    CoseAlgorithm::Ps384 => &rs::RSA_PSS_2048_8192_SHA384,
                    CoseAlgorithm::Ps512 => &rs::RSA_PSS_2048_8192_SHA512,
                    _ => return Err(VerificationError::KeyTypeMismatch),
                };
                let der = crypto::rsa_public_key_der(modulus, exponent);
                Ok(crypto::verify_with_key(ring_alg, &der, message, signature))
            }
            CoseKey::Okp { curve, x, .. } => {
                if !matches!(alg, CoseAlgorithm::EdDsa) || *curve != CoseCurve::Ed25519 {
                    return Err(VerificationError::KeyTypeMismatch);
                }
                Ok(crypto::verify_with_key(
                    &rs::ED25519,
                    x,
                    message,
                    signature,
                ))
            }
        }
    }
}

/// SEC1 uncompressed point with coordinates left-padded to the curve
/// width (COSE keys occasionally arrive with stripped leading zeros).
pub(crate) fn uncompressed_point(curve: CoseCurve, x: &[u8], y: &[u8]) -> Vec<u8> {
    let size = curve.coordinate_size();
    let mut point = vec![0u8; 1 + 2 * size];
    point[0] = 0x04;
    point[1 + size - x.len()..1 + size].copy_from_slice(x);
    point[1 + 2 * size - y.len()..].copy_from_slice(y);
    point
}
