use std::sync::Arc;

use chrono::Utc;

use crate::challenge::ChallengeIssuer;
use crate::config::rp_id_from_origin;
use crate::errors::CeremonyError;
use crate::store::CredentialStore;
use crate::types::{
    AuthenticationResponse, AuthenticationResult, AuthenticatorData, CredentialRecord,
    ExpectedAuthentication, ParsedClientData,
};
use crate::utils::base64url_decode;

/// Validates authentication (assertion) ceremony responses.
///
/// On success the stored signature counter is advanced through the store,
/// which is the only mutation path for that field; on any failure the stored
/// record is left untouched.
pub struct AuthenticationVerifier {
    challenges: Arc<ChallengeIssuer>,
    store: Arc<dyn CredentialStore>,
}

impl AuthenticationVerifier {
    pub fn new(challenges: Arc<ChallengeIssuer>, store: Arc<dyn CredentialStore>) -> Self {
        Self { challenges, store }
    }

    /// Verifies an authentication response against the issued challenge, the
    /// stored credential, and the replay-protection rules.
    ///
    /// Validation order:
    /// 1. challenge equals the issued value, is still pending, and is
    ///    consumed atomically
    /// 2. asserted origin matches exactly; RP ID hash matches the origin host
    /// 3. asserted credential ID equals the stored credential's ID
    /// 4. the assertion signature verifies with the stored public key
    /// 5. the reported counter is strictly greater than the stored counter,
    ///    or both are exactly 0 (authenticator without counter support)
    /// 6. the UV flag is set when user verification is required by policy
    pub async fn verify_authentication(
        &self,
        response: &AuthenticationResponse,
        credential: &CredentialRecord,
        expected: &ExpectedAuthentication,
    ) -> Result<AuthenticationResult, CeremonyError> {
        tracing::debug!(credential_id = %response.credential_id, "Verifying authentication response");

        let client_data = ParsedClientData::from_base64(&response.client_data_json)?;
        client_data.verify_ceremony_type("webauthn.get")?;

        client_data.verify_challenge(&expected.challenge.value)?;
        self.challenges.consume(&expected.challenge.value).await?;

        client_data.verify_origin(&expected.origin)?;

        let auth_data = AuthenticatorData::from_base64(&response.authenticator_data)?;
        auth_data.verify_rp_id_hash(&rp_id_from_origin(&expected.origin))?;

        tracing::debug!(
            user_present = auth_data.is_user_present(),
            user_verified = auth_data.is_user_verified(),
            counter = auth_data.counter,
            "Parsed authenticator data"
        );

        if response.credential_id != credential.credential_id {
            tracing::warn!(
                asserted = %response.credential_id,
                stored = %credential.credential_id,
                "Credential ID mismatch"
            );
            return Err(CeremonyError::CredentialMismatch);
        }

        let signature = base64url_decode(&response.signature)
            .map_err(|e| CeremonyError::Format(format!("Invalid signature: {e}")))?;

        let mut signed_data = auth_data.raw_data.clone();
        signed_data.extend_from_slice(&client_data.hash());
        credential
            .public_key
            .verify_signature(&signed_data, &signature)?;

        verify_counter(&auth_data, credential)?;

        if expected.require_user_verification && !auth_data.is_user_verified() {
            tracing::warn!(
                "User verification required but flag not set. Flags: {:02x}",
                auth_data.flags
            );
            return Err(CeremonyError::UserVerificationRequired);
        }

        self.store
            .update_signature_counter(&credential.credential_id, auth_data.counter)
            .await?;

        tracing::info!(
            credential_id = %credential.credential_id,
            new_counter = auth_data.counter,
            "Authentication verified"
        );

        Ok(AuthenticationResult {
            user_verified: auth_data.is_user_verified(),
            new_signature_counter: auth_data.counter,
            verified_at: Utc::now(),
        })
    }
}

/// The counter must advance on every use; a counter that fails to do so
/// indicates a cloned authenticator. Authenticators without counter support
/// report 0 forever, which is accepted only while the stored value is also 0.
fn verify_counter(
    auth_data: &AuthenticatorData,
    credential: &CredentialRecord,
) -> Result<(), CeremonyError> {
    let reported = auth_data.counter;
    let stored = credential.signature_counter;

    if reported == 0 && stored == 0 {
        tracing::debug!("Authenticator does not support counters");
        return Ok(());
    }

    if reported <= stored {
        tracing::warn!(
            stored,
            reported,
            "Counter did not advance - possible credential cloning"
        );
        return Err(CeremonyError::ReplayDetected);
    }

    Ok(())
}
