//! Authentication assertion verification.
//!
//! Registration stored the credential key; an assertion proves
//! possession by signing `authData ‖ clientDataHash` with it. The
//! signature counter is the clone-detection signal: when the
//! authenticator supports one, it must strictly increase.

use crate::authenticator_data::AuthenticatorData;
use crate::config::VerificationPolicy;
use crate::cose::CoseKey;
use crate::errors::VerificationError;

/// The verdict of a successful assertion verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedAssertion {
    /// The authenticator's new signature counter; the caller persists it.
    pub sign_count: u32,
    pub user_verified: bool,
    pub backup_eligible: bool,
    pub backed_up: bool,
}

/// Verifies an authentication assertion against a stored credential key.
///
/// # Arguments
/// * `authenticator_data` - Raw authenticator data bytes from the response
/// * `client_data_hash` - SHA-256 of the client data JSON; binds the challenge
/// * `signature` - Assertion signature over `authData ‖ clientDataHash`
/// * `public_key` - The credential's stored COSE public key
/// * `stored_sign_count` - Counter persisted at registration or last use
/// * `policy` - User presence / verification requirements
///
/// # Returns
/// * `Result<VerifiedAssertion, VerificationError>` - The new counter and
///   flags, or the first failing check
pub fn verify_assertion(
    authenticator_data: &[u8],
    client_data_hash: &[u8],
    signature: &[u8],
    public_key: &CoseKey,
    stored_sign_count: u32,
    policy: &VerificationPolicy,
) -> Result<VerifiedAssertion, VerificationError> {
    let auth_data = AuthenticatorData::parse(authenticator_data)?;

    if policy.require_user_present && !auth_data.is_user_present() {
        return Err(VerificationError::UserPresentFlagNotSet);
    }
    if policy.require_user_verified && !auth_data.is_user_verified() {
        return Err(VerificationError::UserVerifiedFlagNotSet);
    }

    let mut signed_data = Vec::with_capacity(authenticator_data.len() + client_data_hash.len());
    signed_data.extend_from_slice(authenticator_data);
    signed_data.extend_from_slice(client_data_hash);
    if !public_key.verify(public_key.algorithm(), &signed_data, signature)? {
        return Err(VerificationError::AssertionSignatureInvalid);
    }

    verify_sign_count(auth_data.sign_count, stored_sign_count)?;

    Ok(VerifiedAssertion {
        sign_count: auth_data.sign_count,
        user_verified: auth_data.is_user_verified(),
        backup_eligible: auth_data.is_backup_eligible(),
        backed_up: auth_data.is_backed_up(),
    })
}

/// Both counters zero means the authenticator does not implement one;
/// otherwise the new count must be strictly greater than the stored
/// count.
fn verify_sign_count(new_count: u32, stored_count: u32) -> Result<(), VerificationError> {
    if new_count == 0 && stored_count == 0 {
        tracing::debug!("Authenticator does not support signature counters");
        return Ok(());
    }
    if new_count <= stored_count {
        tracing::warn!(
            "Counter did not increase - stored: {stored_count}, received: {new_count}; possible cloned credential"
        );
        return Err(VerificationError::SignCountInvalid(new_count, stored_count));
    }
    Ok(())
}
