//! Credential storage collaborator.
//!
//! The verification engine persists nothing. `CredentialStore` is the
//! contract registration and authentication flows need from the caller,
//! and `MemoryCredentialStore` is a mutex-guarded map implementation
//! for development and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attestation::VerifiedAttestation;
use crate::errors::VerificationError;

/// A registered credential as the storage collaborator holds it.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct StoredCredential {
    /// Raw credential ID bytes
    pub credential_id: Vec<u8>,
    /// User handle the credential belongs to
    pub user_handle: Vec<u8>,
    /// Canonical COSE encoding of the credential public key
    pub public_key: Vec<u8>,
    /// COSE algorithm identifier of the key
    pub algorithm: i64,
    /// Counter value for the credential (used to prevent replay attacks)
    pub sign_count: u32,
    /// AAGUID of the authenticator, hyphenated
    pub aaguid: String,
    /// Attestation format the credential registered with
    pub attestation_format: String,
    /// Whether the credential may move to another device
    pub backup_eligible: bool,
    /// Whether the credential is currently backed up
    pub backed_up: bool,
    /// When the credential was registered
    pub created_at: DateTime<Utc>,
    /// When the counter was last updated
    pub updated_at: DateTime<Utc>,
}

impl StoredCredential {
    /// The storable record for a verified registration.
    pub fn from_attestation(verified: &VerifiedAttestation, user_handle: Vec<u8>) -> Self {
        let now = Utc::now();
        Self {
            credential_id: verified.credential_id.clone(),
            user_handle,
            public_key: verified.public_key_bytes.clone(),
            algorithm: verified.algorithm.value(),
            sign_count: verified.sign_count,
            aaguid: verified.aaguid.to_string(),
            attestation_format: verified.format.clone(),
            backup_eligible: verified.backup_eligible,
            backed_up: verified.backed_up,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A user record keyed by account name.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct UserAccount {
    /// Opaque user handle sent to the authenticator
    pub user_handle: Vec<u8>,
    /// Account name
    pub name: String,
    /// Human-readable display name
    pub display_name: String,
    /// When the account was created
    pub created_at: DateTime<Utc>,
}

impl UserAccount {
    /// A new account with a freshly minted opaque user handle.
    pub fn new(name: &str, display_name: &str) -> Self {
        Self {
            user_handle: Uuid::new_v4().as_bytes().to_vec(),
            name: name.to_string(),
            display_name: display_name.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Storage contract for the registration and authentication flows.
pub trait CredentialStore {
    fn get_credential_by_id(
        &self,
        credential_id: &[u8],
    ) -> Result<Option<StoredCredential>, VerificationError>;

    fn get_credentials_by_user_handle(
        &self,
        user_handle: &[u8],
    ) -> Result<Vec<StoredCredential>, VerificationError>;

    /// Persist a new counter value after a verified assertion.
    fn update_counter(
        &self,
        credential_id: &[u8],
        new_count: u32,
    ) -> Result<(), VerificationError>;

    fn add_credential(&self, credential: StoredCredential) -> Result<(), VerificationError>;

    /// The account stored under `username`, inserting `account` when none
    /// exists yet.
    fn get_or_create_user(
        &self,
        username: &str,
        account: UserAccount,
    ) -> Result<UserAccount, VerificationError>;

    fn get_user(&self, username: &str) -> Result<Option<UserAccount>, VerificationError>;
}

/// Mutex-guarded in-memory store. Not durable; development and tests
/// only.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credentials: Mutex<HashMap<Vec<u8>, StoredCredential>>,
    users: Mutex<HashMap<String, UserAccount>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get_credential_by_id(
        &self,
        credential_id: &[u8],
    ) -> Result<Option<StoredCredential>, VerificationError> {
        let credentials = self
            .credentials
            .lock()
            .map_err(|_| VerificationError::StoreUnavailable)?;
        Ok(credentials.get(credential_id).cloned())
    }

    fn get_credentials_by_user_handle(
        &self,
        user_handle: &[u8],
    ) -> Result<Vec<StoredCredential>, VerificationError> {
        let credentials = self
            .credentials
            .lock()
            .map_err(|_| VerificationError::StoreUnavailable)?;
        Ok(credentials
            .values()
            .filter(|c| c.user_handle == user_handle)
            .cloned()
            .collect())
    }

    fn update_counter(
        &self,
        credential_id: &[u8],
        new_count: u32,
    ) -> Result<(), VerificationError> {
        let mut credentials = self
            .credentials
            .lock()
            .map_err(|_| VerificationError::StoreUnavailable)?;
        match credentials.get_mut(credential_id) {
            Some(credential) => {
                credential.sign_count = new_count;
                credential.updated_at = Utc::now();
            }
            None => tracing::warn!("update_counter for unknown credential id"),
        }
        Ok(())
    }

    fn add_credential(&self, credential: StoredCredential) -> Result<(), VerificationError> {
        let mut credentials = self
            .credentials
            .lock()
            .map_err(|_| VerificationError::StoreUnavailable)?;
        credentials.insert(credential.credential_id.clone(), credential);
        Ok(())
    }

    fn get_or_create_user(
        &self,
        username: &str,
        account: UserAccount,
    ) -> Result<UserAccount, VerificationError> {
        let mut users = self
            .users
            .lock()
            .map_err(|_| VerificationError::StoreUnavailable)?;
        Ok(users.entry(username.to_string()).or_insert(account).clone())
    }

    fn get_user(&self, username: &str) -> Result<Option<UserAccount>, VerificationError> {
        let users = self
            .users
            .lock()
            .map_err(|_| VerificationError::StoreUnavailable)?;
        Ok(users.get(username).cloned())
    }
}
