use std::sync::Arc;

use chrono::Utc;

use crate::challenge::ChallengeIssuer;
use crate::config::rp_id_from_origin;
use crate::errors::CeremonyError;
use crate::store::CredentialStore;
use crate::types::{
    AuthenticatorData, CredentialKey, CredentialRecord, ExpectedRegistration, ParsedClientData,
    RegistrationResponse, RegistrationResult,
};
use crate::utils::base64url_decode;

/// Validates registration (attestation) ceremony responses.
///
/// A successful run consumes the issued challenge and persists a new
/// `CredentialRecord`; every failure is surfaced as a typed `CeremonyError`.
pub struct RegistrationVerifier {
    challenges: Arc<ChallengeIssuer>,
    store: Arc<dyn CredentialStore>,
}

impl RegistrationVerifier {
    pub fn new(challenges: Arc<ChallengeIssuer>, store: Arc<dyn CredentialStore>) -> Self {
        Self { challenges, store }
    }

    /// Verifies a registration response against the issued challenge and
    /// expected origin.
    ///
    /// Validation order:
    /// 1. challenge equals the issued value, is still pending, and is
    ///    consumed atomically (consumed even if a later step fails)
    /// 2. asserted origin matches exactly; RP ID hash matches the origin host
    /// 3. the credential ID is not already registered
    /// 4. the attestation signature verifies over
    ///    `authenticator_data ‖ SHA-256(client_data)` with the asserted key
    pub async fn verify_registration(
        &self,
        response: &RegistrationResponse,
        expected: &ExpectedRegistration,
    ) -> Result<RegistrationResult, CeremonyError> {
        tracing::debug!(credential_id = %response.credential_id, "Verifying registration response");

        let client_data = ParsedClientData::from_base64(&response.client_data_json)?;
        client_data.verify_ceremony_type("webauthn.create")?;

        client_data.verify_challenge(&expected.challenge.value)?;
        self.challenges.consume(&expected.challenge.value).await?;

        client_data.verify_origin(&expected.origin)?;

        let auth_data = AuthenticatorData::from_base64(&response.authenticator_data)?;
        auth_data.verify_rp_id_hash(&rp_id_from_origin(&expected.origin))?;
        if !auth_data.has_attested_credential_data() {
            return Err(CeremonyError::Format(
                "No attested credential data present".to_string(),
            ));
        }

        if self
            .store
            .load_credential(&response.credential_id)
            .await?
            .is_some()
        {
            tracing::warn!(
                credential_id = %response.credential_id,
                "Credential ID already registered"
            );
            return Err(CeremonyError::DuplicateCredential);
        }

        let public_key = CredentialKey::from_cose_base64(&response.public_key)?;

        let signature = base64url_decode(&response.signature)
            .map_err(|e| CeremonyError::Format(format!("Invalid signature: {e}")))?;

        let mut signed_data = auth_data.raw_data.clone();
        signed_data.extend_from_slice(&client_data.hash());
        public_key.verify_signature(&signed_data, &signature)?;

        let authenticator_label = response
            .authenticator_label
            .clone()
            .or_else(|| expected.user_label.clone());

        let now = Utc::now();
        let credential = CredentialRecord {
            credential_id: response.credential_id.clone(),
            public_key,
            signature_counter: auth_data.counter,
            authenticator_label,
            created_at: now,
            updated_at: now,
            last_used_at: now,
        };

        self.store.save_credential(credential.clone()).await?;

        tracing::info!(
            credential_id = %credential.credential_id,
            counter = credential.signature_counter,
            "Registration verified, credential stored"
        );

        Ok(RegistrationResult {
            authenticator_display_name: credential.authenticator_label.clone(),
            credential,
            verified: true,
        })
    }
}
