use std::collections::HashMap;
use std::time::SystemTime;

use tokio::sync::Mutex;

use crate::errors::CeremonyError;
use crate::types::Challenge;
use crate::utils::gen_random_string;

const CHALLENGE_BYTES: usize = 32;

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Issues single-use random challenges and tracks their validity window.
///
/// An issued challenge stays pending until `consume` removes it; consumption
/// is an atomic take under the mutex, so of two concurrent verification
/// attempts presenting the same challenge exactly one can succeed and the
/// other observes `ChallengeMismatch`.
pub struct ChallengeIssuer {
    ttl_seconds: u64,
    pending: Mutex<HashMap<String, Challenge>>,
}

impl ChallengeIssuer {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            ttl_seconds,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Issues a fresh challenge and registers it as pending.
    ///
    /// Entropy unavailability aborts issuance; there is no fallback source.
    pub async fn issue(&self) -> Result<Challenge, CeremonyError> {
        let value = gen_random_string(CHALLENGE_BYTES)
            .map_err(|e| CeremonyError::Crypto(e.to_string()))?;

        let challenge = Challenge {
            value: value.clone(),
            issued_at: unix_now(),
            ttl_seconds: self.ttl_seconds,
        };

        self.pending.lock().await.insert(value, challenge.clone());
        tracing::debug!(ttl_seconds = self.ttl_seconds, "Issued challenge");

        Ok(challenge)
    }

    /// Atomically consumes a pending challenge.
    ///
    /// A value that was never issued, or was already consumed by another
    /// verification attempt, fails with `ChallengeMismatch`. A pending value
    /// whose validity window has passed fails with `ChallengeExpired`; it is
    /// removed either way, so a ceremony consumes its challenge exactly once
    /// whether verification ultimately succeeds or fails.
    pub async fn consume(&self, value: &str) -> Result<(), CeremonyError> {
        let removed = self.pending.lock().await.remove(value);

        match removed {
            None => {
                tracing::warn!("Challenge not pending: never issued or already consumed");
                Err(CeremonyError::ChallengeMismatch)
            }
            Some(challenge) if challenge.is_expired_at(unix_now()) => {
                tracing::warn!(
                    issued_at = challenge.issued_at,
                    ttl_seconds = challenge.ttl_seconds,
                    "Challenge expired"
                );
                Err(CeremonyError::ChallengeExpired)
            }
            Some(_) => Ok(()),
        }
    }

    /// Evicts expired, never-consumed challenges. Returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = unix_now();
        let mut pending = self.pending.lock().await;
        let before = pending.len();
        pending.retain(|_, challenge| !challenge.is_expired_at(now));
        let removed = before - pending.len();
        if removed > 0 {
            tracing::info!(removed, "Swept expired challenges");
        }
        removed
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Registers an arbitrary pending challenge, used to simulate the passage
    /// of time by backdating `issued_at`.
    #[cfg(test)]
    pub(crate) async fn insert_pending(&self, challenge: Challenge) {
        self.pending
            .lock()
            .await
            .insert(challenge.value.clone(), challenge);
    }
}
