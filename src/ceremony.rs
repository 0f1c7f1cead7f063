use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::auth::AuthenticationVerifier;
use crate::challenge::ChallengeIssuer;
use crate::config::VerifierConfig;
use crate::errors::CeremonyError;
use crate::register::RegistrationVerifier;
use crate::store::CredentialStore;
use crate::types::{
    AuthenticationResponse, AuthenticationResult, Challenge, ExpectedAuthentication,
    ExpectedRegistration, ParsedClientData, RegistrationResponse, RegistrationResult,
};

/// Which verifier a ceremony is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyKind {
    Registration,
    Authentication,
}

/// Lifecycle of a single ceremony attempt. `Verified` and `Failed` are
/// terminal; the ceremony is discarded on reaching either and a new attempt
/// requires a fresh challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CeremonyState {
    Idle,
    ChallengeIssued,
    ResponseReceived,
    Verified,
    Failed,
}

#[derive(Debug)]
struct Ceremony {
    kind: CeremonyKind,
    state: CeremonyState,
    challenge: Challenge,
    user_label: Option<String>,
    credential_id: Option<String>,
}

impl Ceremony {
    fn new(kind: CeremonyKind, challenge: Challenge) -> Self {
        Self {
            kind,
            state: CeremonyState::Idle,
            challenge,
            user_label: None,
            credential_id: None,
        }
    }

    fn advance(&mut self, next: CeremonyState) {
        debug_assert!(
            matches!(
                (self.state, next),
                (CeremonyState::Idle, CeremonyState::ChallengeIssued)
                    | (CeremonyState::ChallengeIssued, CeremonyState::ResponseReceived)
                    | (CeremonyState::ResponseReceived, CeremonyState::Verified)
                    | (CeremonyState::ResponseReceived, CeremonyState::Failed)
            ),
            "illegal ceremony transition: {:?} -> {:?}",
            self.state,
            next
        );
        tracing::trace!(kind = ?self.kind, from = ?self.state, to = ?next, "Ceremony transition");
        self.state = next;
    }
}

/// Sequences issue → collect → verify for both ceremony flows and mediates
/// between the verifiers and the credential store.
///
/// Each in-flight ceremony is keyed by its challenge value; completing a
/// ceremony takes it out of the map before verification runs, so at most one
/// verification can ever be in flight per issued challenge.
pub struct CeremonyCoordinator {
    config: VerifierConfig,
    challenges: Arc<ChallengeIssuer>,
    store: Arc<dyn CredentialStore>,
    registration: RegistrationVerifier,
    authentication: AuthenticationVerifier,
    ceremonies: Mutex<HashMap<String, Ceremony>>,
}

impl CeremonyCoordinator {
    pub fn new(config: VerifierConfig, store: Arc<dyn CredentialStore>) -> Self {
        let challenges = Arc::new(ChallengeIssuer::new(config.challenge_ttl_seconds));
        let registration = RegistrationVerifier::new(challenges.clone(), store.clone());
        let authentication = AuthenticationVerifier::new(challenges.clone(), store.clone());
        Self {
            config,
            challenges,
            store,
            registration,
            authentication,
            ceremonies: Mutex::new(HashMap::new()),
        }
    }

    /// The credential store this coordinator mediates (e.g. for revocation).
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Picks the ceremony for an acting identity: registration when no
    /// credential record is on file, authentication when one is.
    pub async fn begin(
        &self,
        user_label: &str,
        credential_id: Option<&str>,
    ) -> Result<(Challenge, CeremonyKind), CeremonyError> {
        match credential_id {
            Some(id) if self.store.load_credential(id).await?.is_some() => {
                let challenge = self.begin_authentication(id).await?;
                Ok((challenge, CeremonyKind::Authentication))
            }
            _ => {
                let challenge = self.begin_registration(user_label).await?;
                Ok((challenge, CeremonyKind::Registration))
            }
        }
    }

    /// Starts a registration ceremony and returns its challenge.
    pub async fn begin_registration(&self, user_label: &str) -> Result<Challenge, CeremonyError> {
        let challenge = self.challenges.issue().await?;

        let mut ceremony = Ceremony::new(CeremonyKind::Registration, challenge.clone());
        ceremony.user_label = Some(user_label.to_string());
        ceremony.advance(CeremonyState::ChallengeIssued);

        self.ceremonies
            .lock()
            .await
            .insert(challenge.value.clone(), ceremony);

        tracing::debug!(user_label, "Registration ceremony started");
        Ok(challenge)
    }

    /// Starts an authentication ceremony for a registered credential.
    pub async fn begin_authentication(
        &self,
        credential_id: &str,
    ) -> Result<Challenge, CeremonyError> {
        if self.store.load_credential(credential_id).await?.is_none() {
            return Err(CeremonyError::NotFound(format!(
                "Credential not found: {credential_id}"
            )));
        }

        let challenge = self.challenges.issue().await?;

        let mut ceremony = Ceremony::new(CeremonyKind::Authentication, challenge.clone());
        ceremony.credential_id = Some(credential_id.to_string());
        ceremony.advance(CeremonyState::ChallengeIssued);

        self.ceremonies
            .lock()
            .await
            .insert(challenge.value.clone(), ceremony);

        tracing::debug!(credential_id, "Authentication ceremony started");
        Ok(challenge)
    }

    /// Completes a registration ceremony with the authenticator's response.
    pub async fn complete_registration(
        &self,
        response: &RegistrationResponse,
    ) -> Result<RegistrationResult, CeremonyError> {
        let mut ceremony = self
            .take_ceremony(&response.client_data_json, CeremonyKind::Registration)
            .await?;
        ceremony.advance(CeremonyState::ResponseReceived);

        let expected = ExpectedRegistration {
            challenge: ceremony.challenge.clone(),
            origin: self.config.expected_origin.clone(),
            user_label: ceremony.user_label.clone(),
        };

        let result = self
            .registration
            .verify_registration(response, &expected)
            .await;
        ceremony.advance(match result {
            Ok(_) => CeremonyState::Verified,
            Err(_) => CeremonyState::Failed,
        });

        result
    }

    /// Completes an authentication ceremony with the authenticator's response.
    pub async fn complete_authentication(
        &self,
        response: &AuthenticationResponse,
    ) -> Result<AuthenticationResult, CeremonyError> {
        let mut ceremony = self
            .take_ceremony(&response.client_data_json, CeremonyKind::Authentication)
            .await?;
        ceremony.advance(CeremonyState::ResponseReceived);

        // The ceremony was started for this credential; the verifier still
        // checks it against the ID asserted in the response.
        let credential_id = ceremony.credential_id.as_deref().unwrap_or_default();
        let credential = self
            .store
            .load_credential(credential_id)
            .await?
            .ok_or_else(|| {
                CeremonyError::NotFound(format!("Credential not found: {credential_id}"))
            })?;

        let expected = ExpectedAuthentication {
            challenge: ceremony.challenge.clone(),
            origin: self.config.expected_origin.clone(),
            require_user_verification: self.config.require_user_verification,
        };

        let result = self
            .authentication
            .verify_authentication(response, &credential, &expected)
            .await;
        ceremony.advance(match result {
            Ok(_) => CeremonyState::Verified,
            Err(_) => CeremonyState::Failed,
        });

        result
    }

    /// Evicts expired challenges and their abandoned ceremonies. Abandoned
    /// ceremonies expire on the challenge timer; nothing lingers waiting for
    /// a response that never arrives.
    pub async fn sweep_expired(&self) -> usize {
        let removed = self.challenges.sweep_expired().await;
        let now = crate::challenge::unix_now();
        self.ceremonies
            .lock()
            .await
            .retain(|_, ceremony| !ceremony.challenge.is_expired_at(now));
        removed
    }

    /// Removes the in-flight ceremony matching the challenge asserted in the
    /// response's client data. An unknown or already-taken challenge fails
    /// with `ChallengeMismatch`; a challenge bound to the other ceremony kind
    /// is consumed and fails the same way.
    async fn take_ceremony(
        &self,
        client_data_json: &str,
        kind: CeremonyKind,
    ) -> Result<Ceremony, CeremonyError> {
        let client_data = ParsedClientData::from_base64(client_data_json)?;

        let ceremony = self
            .ceremonies
            .lock()
            .await
            .remove(&client_data.challenge)
            .ok_or(CeremonyError::ChallengeMismatch)?;

        if ceremony.kind != kind {
            tracing::warn!(
                expected = ?kind,
                actual = ?ceremony.kind,
                "Response completes the wrong ceremony kind"
            );
            // The challenge is burned either way
            let _ = self.challenges.consume(&ceremony.challenge.value).await;
            return Err(CeremonyError::ChallengeMismatch);
        }

        Ok(ceremony)
    }
}
