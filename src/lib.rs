//! passkey-verifier - relying-party verification core for passkey ceremonies
//!
//! This crate implements the security-critical half of a WebAuthn-style
//! passwordless login: issuing unpredictable single-use challenges,
//! verifying registration (attestation) and authentication (assertion)
//! responses, and maintaining the credential records that bind a user to a
//! public key and signature counter.
//!
//! Everything around it - UI, transport to the platform credential API,
//! durable persistence - is a collaborator behind an explicit interface:
//! the [`CredentialStore`] port is injected, and the [`CeremonyCoordinator`]
//! sequences issue → collect → verify for both flows.
//!
//! ```no_run
//! use std::sync::Arc;
//! use passkey_verifier::{CeremonyCoordinator, MemoryCredentialStore, VerifierConfig};
//!
//! # async fn demo() -> Result<(), passkey_verifier::CeremonyError> {
//! let coordinator = CeremonyCoordinator::new(
//!     VerifierConfig::new("https://example.com"),
//!     Arc::new(MemoryCredentialStore::new()),
//! );
//! let challenge = coordinator.begin_registration("Test User").await?;
//! // hand `challenge` to the platform authenticator, then feed its signed
//! // response to `coordinator.complete_registration(..)`
//! # Ok(())
//! # }
//! ```

mod auth;
mod ceremony;
mod challenge;
mod config;
mod errors;
mod register;
mod store;
#[cfg(test)]
mod test_utils;
mod types;
mod utils;

pub use auth::AuthenticationVerifier;
pub use ceremony::{CeremonyCoordinator, CeremonyKind};
pub use challenge::ChallengeIssuer;
pub use config::VerifierConfig;
pub use errors::CeremonyError;
pub use register::RegistrationVerifier;
pub use store::{CredentialStore, MemoryCredentialStore};
pub use types::{
    AuthenticationResponse, AuthenticationResult, Challenge, CredentialKey, CredentialRecord,
    ExpectedAuthentication, ExpectedRegistration, KeyAlgorithm, RegistrationResponse,
    RegistrationResult,
};
pub use utils::UtilError;
