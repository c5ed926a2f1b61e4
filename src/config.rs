//! Caller-supplied verification policy.

use std::collections::HashMap;

use crate::attestation::AttestationFormat;

/// Trusted attestation root certificates (DER), keyed by format.
///
/// Formats without registered roots skip trust-path validation; root
/// distribution (for example FIDO MDS) is the caller's concern.
#[derive(Debug, Clone, Default)]
pub struct TrustAnchors {
    anchors: HashMap<AttestationFormat, Vec<Vec<u8>>>,
}

impl TrustAnchors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a DER root certificate for the format. Repeated calls
    /// accumulate.
    pub fn add_root(&mut self, format: AttestationFormat, root_der: Vec<u8>) {
        self.anchors.entry(format).or_default().push(root_der);
    }

    pub fn for_format(&self, format: AttestationFormat) -> Option<&[Vec<u8>]> {
        self.anchors.get(&format).map(Vec::as_slice)
    }
}

/// Acceptance switches for registration and authentication checks.
#[derive(Debug, Clone)]
pub struct VerificationPolicy {
    pub trust_anchors: TrustAnchors,
    /// Accept `fmt` "none" statements (no provenance claim).
    pub allow_none_attestation: bool,
    /// Accept unknown `fmt` tags as Uncertain instead of failing.
    pub allow_unknown_formats: bool,
    pub require_user_present: bool,
    pub require_user_verified: bool,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            trust_anchors: TrustAnchors::default(),
            allow_none_attestation: true,
            allow_unknown_formats: false,
            require_user_present: true,
            require_user_verified: false,
        }
    }
}
