use thiserror::Error;

use crate::utils::UtilError;

/// Errors that can occur while running a passkey ceremony.
///
/// The first eight variants are the protocol-level failure taxonomy: each
/// one indicates a protocol violation or a security anomaly detected during
/// verification. None of them is retried by the core; how to react ("try
/// again" vs. "lock the account") is a caller decision.
#[derive(Debug, Error)]
pub enum CeremonyError {
    /// The presented challenge was issued but its validity window has passed
    #[error("Challenge expired")]
    ChallengeExpired,

    /// The presented challenge does not match an issued, still-pending challenge
    /// (never issued, already consumed, or tied to a different ceremony)
    #[error("Challenge mismatch")]
    ChallengeMismatch,

    /// The origin asserted by the client does not exactly match the expected origin
    #[error("Origin mismatch")]
    OriginMismatch,

    /// A credential with this ID is already registered
    #[error("Duplicate credential")]
    DuplicateCredential,

    /// The asserted credential ID does not match the credential being authenticated
    #[error("Credential mismatch")]
    CredentialMismatch,

    /// The signature over the canonical signed bytes failed cryptographic verification
    #[error("Signature invalid")]
    SignatureInvalid,

    /// The signature counter failed to advance, indicating a possible cloned authenticator
    #[error("Replay detected: signature counter did not advance")]
    ReplayDetected,

    /// User verification was required by policy but the authenticator did not perform it
    #[error("User verification required")]
    UserVerificationRequired,

    /// Error in ceremony or verifier configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error with improperly formatted response data
    #[error("Invalid format: {0}")]
    Format(String),

    /// Error accessing or modifying the credential store
    #[error("Storage error: {0}")]
    Storage(String),

    /// Error in cryptographic operations, including secure-random-source
    /// unavailability at challenge issuance (fatal for the ceremony)
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// A requested resource (e.g. a credential record) was not found
    #[error("Not found error: {0}")]
    NotFound(String),

    /// Error from utility operations
    #[error("Utils error: {0}")]
    Utils(#[from] UtilError),

    /// Error from JSON serialization/deserialization
    #[error("Serde error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}
