mod memory;

pub use memory::MemoryCredentialStore;

use async_trait::async_trait;

use crate::errors::CeremonyError;
use crate::types::CredentialRecord;

/// Persistence port for credential records, owned by the relying party.
///
/// Implementations must make `update_signature_counter` an atomic
/// read-modify-write: two authentications racing to bump the same counter
/// must not interleave. The trait is injected into the verifiers so the
/// core can be tested without any real persistence behind it.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Loads the record for a credential ID, if one is registered.
    async fn load_credential(
        &self,
        credential_id: &str,
    ) -> Result<Option<CredentialRecord>, CeremonyError>;

    /// Persists a newly registered credential.
    async fn save_credential(&self, record: CredentialRecord) -> Result<(), CeremonyError>;

    /// Updates the signature counter after a successful authentication.
    /// This is the only mutation path for the counter.
    ///
    /// Implementations must compare-and-set inside their own critical
    /// section: a value that does not strictly advance the stored counter
    /// (unless both are exactly 0) fails with `ReplayDetected` and leaves
    /// the record untouched. The verifier's snapshot check alone cannot
    /// arbitrate between two authentications racing on distinct challenges.
    async fn update_signature_counter(
        &self,
        credential_id: &str,
        counter: u32,
    ) -> Result<(), CeremonyError>;

    /// Removes a credential record (user-initiated revocation).
    async fn delete_credential(&self, credential_id: &str) -> Result<(), CeremonyError>;
}
