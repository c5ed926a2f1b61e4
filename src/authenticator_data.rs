//! Authenticator data parsing.
//!
//! Format (minimum 37 bytes):
//! - RP ID Hash (32 bytes)
//! - Flags (1 byte)
//! - Signature counter (4 bytes, big-endian)
//! - Optional: attested credential data (when the AT flag is set)
//! - Optional: extension data, one CBOR map (when the ED flag is set)
//!
//! Parsing consumes the buffer exactly. Trailing bytes after the last
//! declared section are an error, as is a flag promising a section the
//! buffer does not contain.

use ciborium::value::Value;
use uuid::Uuid;

use crate::bytes::ByteReader;
use crate::cbor;
use crate::cose::CoseKey;
use crate::errors::VerificationError;

/// Flags for AuthenticatorData as defined in WebAuthn spec Level 2
pub mod flags {
    /// User Present (UP) - Bit 0
    pub const UP: u8 = 1 << 0;
    /// User Verified (UV) - Bit 2
    pub const UV: u8 = 1 << 2;
    /// Backup Eligibility (BE) - Bit 3
    pub const BE: u8 = 1 << 3;
    /// Backup State (BS) - Bit 4
    pub const BS: u8 = 1 << 4;
    /// Attested Credential Data Present - Bit 6
    pub const AT: u8 = 1 << 6;
    /// Extension Data Present - Bit 7
    pub const ED: u8 = 1 << 7;
}

/// The credential a registering authenticator attests to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredentialData {
    pub aaguid: Uuid,
    pub credential_id: Vec<u8>,
    pub public_key: CoseKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub sign_count: u32,
    pub attested_credential_data: Option<AttestedCredentialData>,
    /// Raw bytes of the extension CBOR map, when present.
    pub extensions: Option<Vec<u8>>,
}

impl AuthenticatorData {
    pub fn parse(bytes: &[u8]) -> Result<Self, VerificationError> {
        if bytes.len() < 37 {
            return Err(VerificationError::AuthenticatorDataTooShort);
        }

        let mut reader = ByteReader::new(bytes);
        let rp_id_hash: [u8; 32] = reader
            .read_bytes(32)
            .and_then(|b| b.try_into().ok())
            .ok_or(VerificationError::AuthenticatorDataTooShort)?;
        let flags = reader
            .read_u8()
            .ok_or(VerificationError::AuthenticatorDataTooShort)?;
        let sign_count = reader
            .read_u32_be()
            .ok_or(VerificationError::AuthenticatorDataTooShort)?;

        let attested_credential_data = if flags & flags::AT != 0 {
            let aaguid = reader
                .read_bytes(16)
                .and_then(|b| Uuid::from_slice(b).ok())
                .ok_or(VerificationError::AttestedCredentialDataTruncated)?;
            let id_len = reader
                .read_u16_be()
                .ok_or(VerificationError::AttestedCredentialDataTruncated)?
                as usize;
            let credential_id = reader
                .read_bytes(id_len)
                .ok_or(VerificationError::AttestedCredentialDataTruncated)?
                .to_vec();
            let (public_key, consumed) = CoseKey::parse_first(&bytes[reader.position()..])?;
            reader
                .skip(consumed)
                .ok_or(VerificationError::AttestedCredentialDataTruncated)?;
            Some(AttestedCredentialData {
                aaguid,
                credential_id,
                public_key,
            })
        } else {
            None
        };

        let extensions = if flags & flags::ED != 0 {
            let (value, consumed) = cbor::decode_first(&bytes[reader.position()..])?;
            if !matches!(value, Value::Map(_)) {
                return Err(VerificationError::ExtensionDataMalformed);
            }
            let raw = reader
                .read_bytes(consumed)
                .ok_or(VerificationError::ExtensionDataMalformed)?
                .to_vec();
            Some(raw)
        } else {
            None
        };

        if !reader.is_empty() {
            return Err(VerificationError::AuthenticatorDataLeftoverBytes);
        }

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested_credential_data,
            extensions,
        })
    }

    /// Serialize back to the wire layout. A parse of the result yields
    /// an equal value.
    pub fn to_bytes(&self) -> Result<Vec<u8>, VerificationError> {
        let mut out = Vec::with_capacity(37);
        out.extend_from_slice(&self.rp_id_hash);
        out.push(self.flags);
        out.extend_from_slice(&self.sign_count.to_be_bytes());
        if let Some(acd) = &self.attested_credential_data {
            out.extend_from_slice(acd.aaguid.as_bytes());
            let id_len = u16::try_from(acd.credential_id.len())
                .map_err(|_| VerificationError::AttestedCredentialDataTruncated)?;
            out.extend_from_slice(&id_len.to_be_bytes());
            out.extend_from_slice(&acd.credential_id);
            out.extend_from_slice(&acd.public_key.to_bytes()?);
        }
        if let Some(ext) = &self.extensions {
            out.extend_from_slice(ext);
        }
        Ok(out)
    }

    /// The attested credential data, required present. Registration
    /// ceremonies call this; assertions never carry it.
    pub fn attested_credential_data(
        &self,
    ) -> Result<&AttestedCredentialData, VerificationError> {
        self.attested_credential_data
            .as_ref()
            .ok_or(VerificationError::AttestedCredentialDataFlagNotSet)
    }

    /// Check if user was present
    pub fn is_user_present(&self) -> bool {
        (self.flags & flags::UP) != 0
    }

    /// Check if user was verified by the authenticator
    pub fn is_user_verified(&self) -> bool {
        (self.flags & flags::UV) != 0
    }

    /// Check if this is a discoverable credential
    pub fn is_backup_eligible(&self) -> bool {
        (self.flags & flags::BE) != 0
    }

    /// Check if this credential is backed up
    pub fn is_backed_up(&self) -> bool {
        (self.flags & flags::BS) != 0
    }

    /// Check if attested credential data is present
    pub fn has_attested_credential_data(&self) -> bool {
        (self.flags & flags::AT) != 0
    }

    /// Check if extension data is present
    pub fn has_extension_data(&self) -> bool {
        (self.flags & flags::ED) != 0
    }
}
