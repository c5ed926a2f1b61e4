//! fido2-verify - WebAuthn/FIDO2 relying-party verification engine
//!
//! Registration hands the server a CBOR attestation object and
//! authentication hands it an assertion signature; this crate decodes
//! both, runs the per-format attestation statement checks, validates
//! trust paths against caller-supplied roots, and enforces the
//! signature counter rule. Verification is pure and synchronous; the
//! caller owns challenge handling and persistence.

mod asn1;
mod assertion;
mod attestation;
mod authenticator_data;
mod bytes;
mod cbor;
mod config;
mod cose;
mod crypto;
mod errors;
mod store;
mod trust;
mod utils;

// Re-export the verification entry points
pub use assertion::{VerifiedAssertion, verify_assertion};
pub use attestation::{
    AttestationFormat, AttestationObject, AttestationType, VerifiedAttestation,
    verify_attestation_object,
};

pub use authenticator_data::{AttestedCredentialData, AuthenticatorData, flags};
pub use config::{TrustAnchors, VerificationPolicy};
pub use cose::{CoseAlgorithm, CoseCurve, CoseKey};
pub use errors::{ErrorCode, VerificationError};

// Signature re-encoding and wire-format helpers
pub use asn1::{der_to_p1363, p1363_to_der};
pub use utils::{base64url_decode, base64url_encode};

// Trust and revocation helpers for callers that fetch CRLs themselves
pub use trust::{crl_distribution_point, is_cert_revoked};

pub use store::{CredentialStore, MemoryCredentialStore, StoredCredential, UserAccount};
