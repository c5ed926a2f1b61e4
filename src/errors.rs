use thiserror::Error;
use uuid::Uuid;

/// Coarse error categories for programmatic branching.
///
/// Every [`VerificationError`] maps onto exactly one code via
/// [`VerificationError::code`]. Callers that need policy decisions
/// (reject vs. downgrade vs. warn) branch on the code; the `Display`
/// message of the error itself is stable and safe to surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidAuthenticatorData,
    MalformedCbor,
    MalformedAsn1,
    InvalidAttestation,
    InvalidCertificate,
    PublicKeyMismatch,
    HashMismatch,
    InvalidSignature,
    UnsupportedAlgorithm,
    UnsupportedFormat,
    UntrustedAttestation,
    InvalidSignCount,
    UserVerificationRequirementNotMet,
    InvalidInput,
}

/// Errors produced while verifying WebAuthn attestations and assertions.
///
/// This is a closed taxonomy: every failure the engine can report is a
/// variant here, with a stable human-readable message. Messages are part
/// of the crate contract (conformance tests assert them verbatim), so
/// changing one is a breaking change.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerificationError {
    // ---- input / encoding ----
    /// A protocol field that should be base64url (no padding) did not decode.
    #[error("Failed to decode base64url")]
    Base64Decode,

    // ---- CBOR decode layer ----
    #[error("Unexpected end of CBOR data")]
    CborTruncated,

    #[error("Indefinite-length CBOR is not allowed")]
    CborIndefiniteLength,

    #[error("Non-canonical CBOR length encoding")]
    CborNonCanonical,

    #[error("CBOR nesting depth exceeded")]
    CborDepthExceeded,

    #[error("Leftover bytes decoding CBOR object")]
    CborLeftoverBytes,

    /// Residual decoder failure (reserved major type, invalid UTF-8, ...).
    #[error("Failed to decode CBOR: {0}")]
    CborDecode(String),

    #[error("Malformed attestation object: {0}")]
    AttestationObjectMalformed(&'static str),

    // ---- ASN.1/DER decode layer ----
    #[error("ASN.1 decode error: {0}")]
    Asn1Decode(&'static str),

    // ---- authenticator data ----
    #[error("Authenticator data is less than the minimum structure length of 37")]
    AuthenticatorDataTooShort,

    #[error("Leftover bytes decoding AuthenticatorData")]
    AuthenticatorDataLeftoverBytes,

    #[error("Attested credential data is truncated")]
    AttestedCredentialDataTruncated,

    #[error("Attestation flag not set on attestation data")]
    AttestedCredentialDataFlagNotSet,

    #[error("Extension data is not a CBOR map")]
    ExtensionDataMalformed,

    #[error("User Present flag not set in authenticator data")]
    UserPresentFlagNotSet,

    #[error("User Verified flag not set in authenticator data")]
    UserVerifiedFlagNotSet,

    // ---- COSE keys and algorithms ----
    #[error("Unrecognized COSE alg value {0}")]
    UnrecognizedAlgorithm(i64),

    /// The algorithm is part of the COSE model but the verification
    /// backend has no implementation for it (P-521, secp256k1).
    #[error("COSE algorithm {0} is not supported for signature verification")]
    UnsupportedAlgorithm(i64),

    #[error("Unsupported COSE key type {0}")]
    UnsupportedKeyType(i64),

    #[error("Unsupported COSE curve {0}")]
    UnsupportedCurve(i64),

    #[error("Missing {0} in COSE public key")]
    CoseKeyMissingField(&'static str),

    #[error("Malformed COSE public key: {0}")]
    CoseKeyMalformed(&'static str),

    /// Key type and signature algorithm do not go together
    /// (e.g. an RSA key presented with ES256).
    #[error("COSE key type does not match signature algorithm")]
    KeyTypeMismatch,

    // ---- attestation statement dispatch ----
    #[error("Unsupported attestation format: {0}")]
    UnsupportedFormat(String),

    #[error("Missing {1} in {0} attestation statement")]
    AttStmtFieldMissing(&'static str, &'static str),

    #[error("Malformed {1} in {0} attestation statement")]
    AttStmtFieldMalformed(&'static str, &'static str),

    #[error("Attestation format none should have no attestation statement")]
    NoneAttStmtNotEmpty,

    #[error("Attestation format none is not accepted by policy")]
    NoneAttestationNotAccepted,

    // ---- packed ----
    #[error("Algorithm mismatch between credential public key and attestation statement alg in packed self attestation")]
    PackedSelfAlgMismatch,

    #[error("Failed to validate signature in packed self attestation")]
    PackedSelfSignatureInvalid,

    #[error("Invalid full packed signature")]
    PackedFullSignatureInvalid,

    #[error("Packed x5c attestation certificate not V3")]
    PackedCertNotV3,

    #[error("Invalid attestation cert subject")]
    PackedCertSubjectInvalid,

    #[error("Attestation certificate has CA cert flag present")]
    PackedCertCaFlagPresent,

    #[error("ECDAA is not yet implemented")]
    EcdaaNotImplemented,

    // ---- fido-u2f ----
    #[error("Malformed x5c in fido-u2f attestation")]
    U2fMalformedX5c,

    #[error("Attestation certificate public key is not an Elliptic Curve (EC) key over P-256")]
    U2fCertKeyNotP256,

    #[error("Aaguid was not empty parsing fido-u2f attestation statement")]
    U2fAaguidNotEmpty,

    #[error("Invalid fido-u2f attestation signature")]
    U2fSignatureInvalid,

    // ---- tpm ----
    #[error("FIDO2 only supports TPM 2.0")]
    TpmVersionUnsupported,

    #[error("Missing or malformed pubArea")]
    TpmMalformedPubArea,

    #[error("Public key mismatch between pubArea and credentialPublicKey")]
    TpmPublicKeyMismatch,

    #[error("Public key exponent mismatch between pubArea and credentialPublicKey")]
    TpmExponentMismatch,

    #[error("Curve mismatch between pubArea and credentialPublicKey")]
    TpmCurveMismatch,

    #[error("X-coordinate mismatch between pubArea and credentialPublicKey")]
    TpmXCoordinateMismatch,

    #[error("Y-coordinate mismatch between pubArea and credentialPublicKey")]
    TpmYCoordinateMismatch,

    #[error("CertInfo invalid parsing TPM format attStmt")]
    TpmMalformedCertInfo,

    #[error("Bad magic number {0:08x}")]
    TpmBadMagic(u32),

    #[error("Bad structure tag {0:04x}")]
    TpmBadStructureTag(u16),

    #[error("Bad extraData in certInfo")]
    TpmBadExtraData,

    #[error("Hash value mismatch extraData and attToBeSigned")]
    TpmExtraDataHashMismatch,

    #[error("Unexpected handle in TPM2B_NAME")]
    TpmNameHandlePresent,

    #[error("Unexpected no name found in TPM2B_NAME")]
    TpmNameEmpty,

    #[error("Unexpected extra bytes found in TPM2B_NAME")]
    TpmNameExtraBytes,

    #[error("TPM_ALG_ID found in TPM2B_NAME not acceptable hash algorithm")]
    TpmNameHashUnacceptable,

    #[error("Invalid TPM_ALG_ID found in TPM2B_NAME")]
    TpmNameAlgInvalid,

    #[error("Hash value mismatch attested and pubArea")]
    TpmAttestedHashMismatch,

    /// sig was absent, not a byte string, or zero length.
    #[error("Invalid TPM attestation signature")]
    TpmInvalidSignature,

    #[error("Bad signature in TPM with aikCert")]
    TpmBadSignature,

    #[error("aikCert must be V3")]
    AikCertNotV3,

    #[error("aikCert subject must be empty")]
    AikCertSubjectNotEmpty,

    #[error("SAN missing TPMManufacturer, TPMModel, or TPMVersion from TPM attestation certificate")]
    AikCertSanMissing,

    #[error("Invalid TPM manufacturer found parsing TPM attestation")]
    AikCertInvalidManufacturer,

    #[error("aikCert EKU missing tcg-kp-AIKCertificate OID")]
    AikCertEkuMissingAik,

    #[error("aikCert Basic Constraints extension CA component must be false")]
    AikCertCaComponentTrue,

    #[error("ECDAA support for TPM attestation is not yet implemented")]
    TpmEcdaaNotImplemented,

    #[error("Neither x5c nor ECDAA were found in the TPM attestation statement")]
    TpmMissingX5cOrEcdaa,

    // ---- android-key ----
    #[error("Malformed android key attestation statement")]
    AndroidKeyMalformed,

    #[error("Invalid android key attestation signature")]
    AndroidKeySignatureInvalid,

    #[error("Incorrect public key in android key attestation")]
    AndroidKeyPublicKeyMismatch,

    #[error("Android key attestation certificate contains no AttestationRecord extension")]
    AndroidKeyExtensionMissing,

    #[error("Mismatch between attestationChallenge and hashedClientDataJson verifying android key attestation certificate extension")]
    AndroidKeyChallengeMismatch,

    #[error("Found all applications field in android key attestation certificate extension")]
    AndroidKeyAllApplicationsPresent,

    #[error("Found purpose field not set to KM_PURPOSE_SIGN in android key attestation certificate extension")]
    AndroidKeyPurposeNotSign,

    #[error("Found origin field not set to KM_ORIGIN_GENERATED in android key attestation certificate extension")]
    AndroidKeyOriginNotGenerated,

    // ---- android-safetynet ----
    #[error("Invalid SafetyNet version in attestation")]
    SafetyNetVersionMissing,

    #[error("Malformed SafetyNet response JWS")]
    SafetyNetMalformedJws,

    #[error("SafetyNet response JWS header missing x5c")]
    SafetyNetMissingX5c,

    #[error("Invalid SafetyNet attestation cert DnsName")]
    SafetyNetInvalidDnsName,

    #[error("Invalid SafetyNet response JWS signature")]
    SafetyNetSignatureInvalid,

    #[error("SafetyNet response nonce / hash value mismatch")]
    SafetyNetNonceMismatch,

    #[error("SafetyNet response ctsProfileMatch false")]
    SafetyNetCtsProfileMatchFalse,

    #[error("SafetyNet timestampMs must be between one minute ago and now, got: {0}")]
    SafetyNetTimestampInvalid(i64),

    // ---- apple ----
    #[error("Malformed x5c in Apple attestation")]
    AppleMalformedX5c,

    #[error("Mismatch between nonce and expectedNonce verifying Apple attestation")]
    AppleNonceMismatch,

    #[error("Attestation public key does not match the credential public key")]
    ApplePublicKeyMismatch,

    // ---- certificates / trust path ----
    #[error("Failed to parse certificate: {0}")]
    CertificateParse(String),

    #[error("Attestation certificate is expired or not yet valid")]
    CertificateNotCurrentlyValid,

    #[error("aaguid malformed, expected {expected}, got {actual}")]
    AaguidMismatch { expected: Uuid, actual: Uuid },

    #[error("Failed to validate trust path against trusted roots")]
    TrustPathInvalid,

    // ---- assertion ----
    #[error("Signature verification failed")]
    AssertionSignatureInvalid,

    #[error("SignCount {0} must be greater than stored sign count {1}")]
    SignCountInvalid(u32, u32),

    // ---- credential store collaborator ----
    #[error("Credential store is unavailable")]
    StoreUnavailable,
}

impl VerificationError {
    /// The branching code for this error. Stable across message changes
    /// within a category.
    pub fn code(&self) -> ErrorCode {
        use VerificationError::*;
        match self {
            Base64Decode => ErrorCode::InvalidInput,

            CborTruncated | CborIndefiniteLength | CborNonCanonical | CborDepthExceeded
            | CborLeftoverBytes | CborDecode(_) | AttestationObjectMalformed(_) => {
                ErrorCode::MalformedCbor
            }

            Asn1Decode(_) => ErrorCode::MalformedAsn1,

            AuthenticatorDataTooShort
            | AuthenticatorDataLeftoverBytes
            | AttestedCredentialDataTruncated
            | AttestedCredentialDataFlagNotSet
            | ExtensionDataMalformed => ErrorCode::InvalidAuthenticatorData,

            UserPresentFlagNotSet | UserVerifiedFlagNotSet => {
                ErrorCode::UserVerificationRequirementNotMet
            }

            UnrecognizedAlgorithm(_) | UnsupportedAlgorithm(_) | UnsupportedKeyType(_)
            | UnsupportedCurve(_) => ErrorCode::UnsupportedAlgorithm,

            CoseKeyMissingField(_) | CoseKeyMalformed(_) | KeyTypeMismatch => {
                ErrorCode::PublicKeyMismatch
            }

            UnsupportedFormat(_) => ErrorCode::UnsupportedFormat,

            AttStmtFieldMissing(_, _) | AttStmtFieldMalformed(_, _) | NoneAttStmtNotEmpty
            | AndroidKeyMalformed | SafetyNetVersionMissing | SafetyNetMalformedJws
            | SafetyNetMissingX5c | TpmVersionUnsupported | TpmMalformedPubArea
            | TpmMalformedCertInfo | TpmBadMagic(_) | TpmBadStructureTag(_)
            | TpmBadExtraData | TpmNameHandlePresent | TpmNameEmpty | TpmNameExtraBytes
            | TpmNameHashUnacceptable | TpmNameAlgInvalid | TpmInvalidSignature
            | U2fMalformedX5c | U2fAaguidNotEmpty | AppleMalformedX5c => {
                ErrorCode::InvalidAttestation
            }

            EcdaaNotImplemented | TpmEcdaaNotImplemented | TpmMissingX5cOrEcdaa => {
                ErrorCode::InvalidAttestation
            }

            TpmPublicKeyMismatch | TpmExponentMismatch | TpmCurveMismatch
            | TpmXCoordinateMismatch | TpmYCoordinateMismatch | AndroidKeyPublicKeyMismatch
            | ApplePublicKeyMismatch | PackedSelfAlgMismatch => ErrorCode::PublicKeyMismatch,

            TpmExtraDataHashMismatch | TpmAttestedHashMismatch | SafetyNetNonceMismatch
            | AppleNonceMismatch | AndroidKeyChallengeMismatch => ErrorCode::HashMismatch,

            TpmBadSignature | PackedSelfSignatureInvalid | PackedFullSignatureInvalid
            | U2fSignatureInvalid | AndroidKeySignatureInvalid | SafetyNetSignatureInvalid
            | AssertionSignatureInvalid => ErrorCode::InvalidSignature,

            AikCertNotV3 | AikCertSubjectNotEmpty | AikCertSanMissing
            | AikCertInvalidManufacturer | AikCertEkuMissingAik | AikCertCaComponentTrue
            | PackedCertNotV3 | PackedCertSubjectInvalid | PackedCertCaFlagPresent
            | U2fCertKeyNotP256 | AndroidKeyExtensionMissing | SafetyNetInvalidDnsName
            | CertificateParse(_) | CertificateNotCurrentlyValid
            | AndroidKeyAllApplicationsPresent | AndroidKeyPurposeNotSign
            | AndroidKeyOriginNotGenerated => ErrorCode::InvalidCertificate,

            AaguidMismatch { .. } => ErrorCode::InvalidCertificate,

            TrustPathInvalid | NoneAttestationNotAccepted | SafetyNetCtsProfileMatchFalse
            | SafetyNetTimestampInvalid(_) => ErrorCode::UntrustedAttestation,

            SignCountInvalid(_, _) => ErrorCode::InvalidSignCount,

            StoreUnavailable => ErrorCode::InvalidInput,
        }
    }
}
