use ciborium::value::Value;

use crate::errors::VerificationError;

use super::AttestationType;

/// The `none` format makes no attestation claim. The only obligation is
/// an empty statement map.
pub(super) fn verify_none_attestation(
    att_stmt: &[(Value, Value)],
) -> Result<(AttestationType, Vec<Vec<u8>>), VerificationError> {
    if !att_stmt.is_empty() {
        return Err(VerificationError::NoneAttStmtNotEmpty);
    }
    Ok((AttestationType::None, Vec::new()))
}
