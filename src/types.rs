use chrono::{DateTime, Utc};
use ciborium::value::{Integer, Value as CborValue};
use ring::{digest, signature::UnparsedPublicKey};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::errors::CeremonyError;
use crate::utils::{base64url_decode, base64url_encode};

/// A single-use random challenge issued to the client.
///
/// The value is 32 CSPRNG bytes, base64url-encoded. A challenge is pending
/// from issuance until it is consumed by the first verification attempt tied
/// to it, or until its validity window passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Opaque base64url challenge value
    pub value: String,
    /// Issuance time, seconds since the Unix epoch
    pub issued_at: u64,
    /// Validity window in seconds
    pub ttl_seconds: u64,
}

impl Challenge {
    pub(crate) fn is_expired_at(&self, now: u64) -> bool {
        now.saturating_sub(self.issued_at) > self.ttl_seconds
    }
}

/// COSE algorithm identifier for a credential public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyAlgorithm {
    /// ECDSA over P-256 with SHA-256 (COSE -7)
    Es256,
}

impl KeyAlgorithm {
    pub fn cose_id(&self) -> i64 {
        match self {
            KeyAlgorithm::Es256 => -7,
        }
    }

    fn from_cose_id(id: i64) -> Result<Self, CeremonyError> {
        match id {
            -7 => Ok(KeyAlgorithm::Es256),
            other => Err(CeremonyError::Format(format!(
                "Unsupported or unrecognized algorithm: {other}"
            ))),
        }
    }
}

/// Algorithm-tagged public key material for a registered credential.
///
/// The key bytes are the uncompressed P-256 point (0x04 ‖ x ‖ y),
/// base64url-encoded for storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialKey {
    pub algorithm: KeyAlgorithm,
    pub key: String,
}

impl CredentialKey {
    /// Parses a base64url-encoded COSE_Key (CBOR map with alg at label 3 and
    /// EC2 coordinates at labels -2/-3) into an algorithm-tagged key.
    pub fn from_cose_base64(encoded: &str) -> Result<Self, CeremonyError> {
        let bytes = base64url_decode(encoded)
            .map_err(|e| CeremonyError::Format(format!("Failed to decode public key: {e}")))?;

        let key_cbor: CborValue = ciborium::de::from_reader(&bytes[..])
            .map_err(|e| CeremonyError::Format(format!("Invalid public key CBOR: {e}")))?;

        let CborValue::Map(map) = key_cbor else {
            return Err(CeremonyError::Format("Invalid public key format".to_string()));
        };

        let mut alg = None;
        let mut x_coord = None;
        let mut y_coord = None;

        for (key, value) in map {
            if let CborValue::Integer(i) = key {
                if i == Integer::from(3) {
                    if let CborValue::Integer(a) = value {
                        alg = i64::try_from(a).ok();
                    }
                } else if i == Integer::from(-2) {
                    if let CborValue::Bytes(x) = value {
                        x_coord = Some(x);
                    }
                } else if i == Integer::from(-3) {
                    if let CborValue::Bytes(y) = value {
                        y_coord = Some(y);
                    }
                }
            }
        }

        let alg = alg.ok_or_else(|| {
            CeremonyError::Format("Missing algorithm in public key".to_string())
        })?;
        let algorithm = KeyAlgorithm::from_cose_id(alg)?;

        match (x_coord, y_coord) {
            (Some(x), Some(y)) if x.len() == 32 && y.len() == 32 => {
                let mut point = Vec::with_capacity(65);
                point.push(0x04); // Uncompressed point format
                point.extend_from_slice(&x);
                point.extend_from_slice(&y);
                Ok(Self {
                    algorithm,
                    key: base64url_encode(point),
                })
            }
            _ => Err(CeremonyError::Format(
                "Missing or invalid key coordinates".to_string(),
            )),
        }
    }

    /// Verifies `signature` over `signed_data` with this key.
    pub fn verify_signature(
        &self,
        signed_data: &[u8],
        signature: &[u8],
    ) -> Result<(), CeremonyError> {
        let verification_algorithm = match self.algorithm {
            KeyAlgorithm::Es256 => &ring::signature::ECDSA_P256_SHA256_ASN1,
        };

        let key_bytes = base64url_decode(&self.key)
            .map_err(|e| CeremonyError::Format(format!("Invalid public key: {e}")))?;
        let public_key = UnparsedPublicKey::new(verification_algorithm, &key_bytes);

        public_key.verify(signed_data, signature).map_err(|_| {
            tracing::warn!("Signature verification failed");
            CeremonyError::SignatureInvalid
        })
    }
}

/// A registered credential as held by the relying party.
///
/// Created only by a successful registration ceremony. The signature counter
/// is mutated exclusively through `CredentialStore::update_signature_counter`
/// after a successful authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Authenticator-assigned credential ID, base64url
    pub credential_id: String,
    /// Algorithm-tagged public key material
    pub public_key: CredentialKey,
    /// Monotonically non-decreasing usage counter, for clone detection
    pub signature_counter: u32,
    /// Optional display label for the authenticator
    pub authenticator_label: Option<String>,
    /// When the credential was created
    pub created_at: DateTime<Utc>,
    /// When the credential was last updated
    pub updated_at: DateTime<Utc>,
    /// When the credential was last used to authenticate
    pub last_used_at: DateTime<Utc>,
}

/// Outcome of a successful registration ceremony.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationResult {
    pub credential: CredentialRecord,
    pub verified: bool,
    pub authenticator_display_name: Option<String>,
}

/// Outcome of a successful authentication ceremony.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticationResult {
    pub user_verified: bool,
    pub new_signature_counter: u32,
    pub verified_at: DateTime<Utc>,
}

/// Signed envelope produced by the authenticator during registration.
///
/// Carries the new credential's ID and COSE public key next to the standard
/// signed-challenge pieces: base64url client data JSON, base64url
/// authenticator data, and the attestation signature over
/// `authenticator_data ‖ SHA-256(client_data)`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub credential_id: String,
    pub client_data_json: String,
    pub authenticator_data: String,
    pub public_key: String,
    pub signature: String,
    #[serde(default)]
    pub authenticator_label: Option<String>,
}

/// Signed envelope produced by the authenticator during authentication.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResponse {
    pub credential_id: String,
    pub client_data_json: String,
    pub authenticator_data: String,
    pub signature: String,
}

/// What the relying party expects a registration response to prove.
#[derive(Debug, Clone)]
pub struct ExpectedRegistration {
    pub challenge: Challenge,
    pub origin: String,
    pub user_label: Option<String>,
}

/// What the relying party expects an authentication response to prove.
#[derive(Debug, Clone)]
pub struct ExpectedAuthentication {
    pub challenge: Challenge,
    pub origin: String,
    pub require_user_verification: bool,
}

/// Client data decoded from the base64url JSON sent by the client.
#[derive(Debug)]
pub(crate) struct ParsedClientData {
    pub(crate) challenge: String,
    pub(crate) origin: String,
    pub(crate) type_: String,
    pub(crate) raw_data: Vec<u8>,
}

impl ParsedClientData {
    pub(crate) fn from_base64(client_data_json: &str) -> Result<Self, CeremonyError> {
        let raw_data = base64url_decode(client_data_json)
            .map_err(|e| CeremonyError::Format(format!("Failed to decode: {e}")))?;

        let data_str = String::from_utf8(raw_data.clone())
            .map_err(|e| CeremonyError::Format(format!("Invalid UTF-8: {e}")))?;

        let data: serde_json::Value = serde_json::from_str(&data_str)
            .map_err(|e| CeremonyError::Format(format!("Invalid JSON: {e}")))?;

        let challenge = data["challenge"]
            .as_str()
            .ok_or_else(|| CeremonyError::Format("Missing challenge".into()))?;

        Ok(Self {
            challenge: challenge.to_string(),
            origin: data["origin"]
                .as_str()
                .ok_or_else(|| CeremonyError::Format("Missing origin".into()))?
                .to_string(),
            type_: data["type"]
                .as_str()
                .ok_or_else(|| CeremonyError::Format("Missing type".into()))?
                .to_string(),
            raw_data,
        })
    }

    /// Checks the ceremony type tag (`webauthn.create` or `webauthn.get`).
    pub(crate) fn verify_ceremony_type(&self, expected: &str) -> Result<(), CeremonyError> {
        if self.type_ != expected {
            return Err(CeremonyError::Format(format!(
                "Invalid type. Expected '{expected}', Got: {}",
                self.type_
            )));
        }
        Ok(())
    }

    /// Compares the asserted challenge against the issued value in constant time.
    pub(crate) fn verify_challenge(&self, issued: &str) -> Result<(), CeremonyError> {
        if bool::from(self.challenge.as_bytes().ct_eq(issued.as_bytes())) {
            Ok(())
        } else {
            tracing::warn!("Challenge mismatch in client data");
            Err(CeremonyError::ChallengeMismatch)
        }
    }

    /// Compares the asserted origin against the expected origin exactly.
    pub(crate) fn verify_origin(&self, expected: &str) -> Result<(), CeremonyError> {
        if self.origin != expected {
            tracing::warn!(
                expected = %expected,
                asserted = %self.origin,
                "Origin mismatch in client data"
            );
            return Err(CeremonyError::OriginMismatch);
        }
        Ok(())
    }

    /// SHA-256 hash of the raw client data, the second half of the signed bytes.
    pub(crate) fn hash(&self) -> Vec<u8> {
        digest::digest(&digest::SHA256, &self.raw_data).as_ref().to_vec()
    }
}

/// Flags for AuthenticatorData as defined in WebAuthn spec Level 2
pub(crate) mod auth_data_flags {
    /// User Present (UP) - Bit 0
    pub(crate) const UP: u8 = 1 << 0;
    /// User Verified (UV) - Bit 2
    pub(crate) const UV: u8 = 1 << 2;
    /// Attested Credential Data Present - Bit 6
    pub(crate) const AT: u8 = 1 << 6;
}

/// Authenticator data decoded from its base64url binary form.
///
/// Format (minimum 37 bytes):
/// - RP ID Hash (32 bytes)
/// - Flags (1 byte)
/// - Counter (4 bytes, big-endian)
#[derive(Debug)]
pub(crate) struct AuthenticatorData {
    pub(crate) rp_id_hash: Vec<u8>,
    pub(crate) flags: u8,
    pub(crate) counter: u32,
    pub(crate) raw_data: Vec<u8>,
}

impl AuthenticatorData {
    pub(crate) fn from_base64(auth_data: &str) -> Result<Self, CeremonyError> {
        let data = base64url_decode(auth_data)
            .map_err(|e| CeremonyError::Format(format!("Failed to decode: {e}")))?;

        if data.len() < 37 {
            return Err(CeremonyError::Format(
                "Authenticator data too short".to_string(),
            ));
        }

        Ok(Self {
            rp_id_hash: data[..32].to_vec(),
            flags: data[32],
            counter: u32::from_be_bytes([data[33], data[34], data[35], data[36]]),
            raw_data: data,
        })
    }

    pub(crate) fn is_user_present(&self) -> bool {
        (self.flags & auth_data_flags::UP) != 0
    }

    pub(crate) fn is_user_verified(&self) -> bool {
        (self.flags & auth_data_flags::UV) != 0
    }

    pub(crate) fn has_attested_credential_data(&self) -> bool {
        (self.flags & auth_data_flags::AT) != 0
    }

    /// Verifies that the RP ID hash matches SHA-256 of the expected RP ID.
    /// A mismatch means the response was produced for a different domain.
    pub(crate) fn verify_rp_id_hash(&self, rp_id: &str) -> Result<(), CeremonyError> {
        let expected_hash = digest::digest(&digest::SHA256, rp_id.as_bytes());
        if self.rp_id_hash != expected_hash.as_ref() {
            tracing::warn!(rp_id = %rp_id, "RP ID hash mismatch in authenticator data");
            return Err(CeremonyError::OriginMismatch);
        }
        Ok(())
    }
}
