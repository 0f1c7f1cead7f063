use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::errors::CeremonyError;
use crate::types::CredentialRecord;

use super::CredentialStore;

/// In-memory credential store, for tests and embedded use.
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, CredentialRecord>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        tracing::debug!("Creating new in-memory credential store");
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load_credential(
        &self,
        credential_id: &str,
    ) -> Result<Option<CredentialRecord>, CeremonyError> {
        Ok(self.entries.lock().await.get(credential_id).cloned())
    }

    async fn save_credential(&self, record: CredentialRecord) -> Result<(), CeremonyError> {
        self.entries
            .lock()
            .await
            .insert(record.credential_id.clone(), record);
        Ok(())
    }

    async fn update_signature_counter(
        &self,
        credential_id: &str,
        counter: u32,
    ) -> Result<(), CeremonyError> {
        let mut entries = self.entries.lock().await;
        let record = entries.get_mut(credential_id).ok_or_else(|| {
            CeremonyError::NotFound(format!("Credential not found: {credential_id}"))
        })?;
        // Re-checked under the lock: a concurrent authentication may have
        // advanced the stored counter after the verifier took its snapshot.
        let advances = counter > record.signature_counter
            || (counter == 0 && record.signature_counter == 0);
        if !advances {
            tracing::warn!(
                credential_id,
                stored = record.signature_counter,
                reported = counter,
                "Counter update lost to a concurrent advance"
            );
            return Err(CeremonyError::ReplayDetected);
        }
        record.signature_counter = counter;
        record.updated_at = Utc::now();
        record.last_used_at = Utc::now();
        Ok(())
    }

    async fn delete_credential(&self, credential_id: &str) -> Result<(), CeremonyError> {
        self.entries.lock().await.remove(credential_id);
        Ok(())
    }
}
