use std::env;

use crate::errors::CeremonyError;

const DEFAULT_CHALLENGE_TTL_SECONDS: u64 = 60;

/// Policy knobs for the verification core.
///
/// The config is handed to the coordinator and verifiers explicitly; nothing
/// in the core reads ambient global state, so tests can run several
/// differently-configured cores side by side.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Exact origin (scheme + host + port) the client must assert
    pub expected_origin: String,
    /// Relying-party ID, derived from the origin host unless overridden
    pub rp_id: String,
    /// Validity window of an issued challenge, in seconds
    pub challenge_ttl_seconds: u64,
    /// Whether the authenticator must have verified the user (UV flag)
    pub require_user_verification: bool,
}

impl VerifierConfig {
    /// Builds a config for the given origin with default policy: 60 second
    /// challenge TTL and user verification required.
    pub fn new(expected_origin: impl Into<String>) -> Self {
        let expected_origin = expected_origin.into();
        let rp_id = rp_id_from_origin(&expected_origin);
        Self {
            expected_origin,
            rp_id,
            challenge_ttl_seconds: DEFAULT_CHALLENGE_TTL_SECONDS,
            require_user_verification: true,
        }
    }

    pub fn with_challenge_ttl(mut self, seconds: u64) -> Self {
        self.challenge_ttl_seconds = seconds;
        self
    }

    pub fn with_user_verification(mut self, required: bool) -> Self {
        self.require_user_verification = required;
        self
    }

    /// Reads the configuration from the environment.
    ///
    /// Recognized variables: `ORIGIN` (required), `PASSKEY_CHALLENGE_TIMEOUT`
    /// (seconds), `PASSKEY_USER_VERIFICATION` (`required` or `discouraged`).
    pub fn from_env() -> Result<Self, CeremonyError> {
        let origin = env::var("ORIGIN")
            .map_err(|_| CeremonyError::Config("ORIGIN must be set".to_string()))?;

        let mut config = Self::new(origin);

        if let Ok(v) = env::var("PASSKEY_CHALLENGE_TIMEOUT") {
            config.challenge_ttl_seconds = v.parse::<u64>().map_err(|_| {
                CeremonyError::Config(format!("Invalid PASSKEY_CHALLENGE_TIMEOUT: {v}"))
            })?;
        }

        if let Ok(v) = env::var("PASSKEY_USER_VERIFICATION") {
            config.require_user_verification = match v.to_lowercase().as_str() {
                "required" => true,
                "preferred" | "discouraged" => false,
                invalid => {
                    return Err(CeremonyError::Config(format!(
                        "Invalid PASSKEY_USER_VERIFICATION: {invalid}"
                    )));
                }
            };
        }

        Ok(config)
    }
}

/// Extracts the RP ID (host without scheme and port) from an origin string.
pub(crate) fn rp_id_from_origin(origin: &str) -> String {
    origin
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .split(':')
        .next()
        .unwrap_or(origin)
        .to_string()
}
