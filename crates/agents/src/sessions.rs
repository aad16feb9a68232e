use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use prism_anonymizer::{deanonymize, MatchingStrategy};
use prism_core::AnonymizationMapping;
use prism_storage::{MappingRepository, StoredMapping};
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_MAPPING_TTL_SECONDS: i64 = 3600;

/// Keeps anonymization mappings under a session id so a later request can restore
/// the originals.
pub struct MappingSessions<R> {
    store: Arc<R>,
    ttl: Duration,
}

impl<R: MappingRepository> MappingSessions<R> {
    pub fn new(store: Arc<R>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// TTL from `PRISM_MAPPING_TTL_SECONDS`.
    pub fn from_env(store: Arc<R>) -> Self {
        let seconds = env::var("PRISM_MAPPING_TTL_SECONDS")
            .ok()
            .and_then(|value| value.parse::<i64>().ok())
            .filter(|seconds| *seconds > 0)
            .unwrap_or(DEFAULT_MAPPING_TTL_SECONDS);
        Self::new(store, Duration::seconds(seconds))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stores `mapping` under `session_id`, or a fresh id, and returns the id.
    pub async fn retain(
        &self,
        session_id: Option<&str>,
        mapping: AnonymizationMapping,
    ) -> Result<String> {
        let session_id = session_id
            .map(ToString::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = Utc::now();
        let stored = StoredMapping {
            session_id: session_id.clone(),
            mapping,
            created_at: now,
            expires_at: now + self.ttl,
        };

        self.store
            .upsert_mapping(&stored)
            .await
            .with_context(|| format!("failed storing mapping for session {session_id}"))?;
        debug!(session_id = %session_id, entries = stored.mapping.len(), "mapping retained");
        Ok(session_id)
    }

    /// The live mapping for `session_id`. Expired mappings read as absent.
    pub async fn mapping(&self, session_id: &str) -> Result<Option<AnonymizationMapping>> {
        let stored = self
            .store
            .load_mapping(session_id)
            .await
            .with_context(|| format!("failed loading mapping for session {session_id}"))?;

        Ok(stored
            .filter(|stored| !stored.is_expired(Utc::now()))
            .map(|stored| stored.mapping))
    }

    /// Deanonymizes `text` with the session's mapping; unchanged when there is none.
    pub async fn restore(
        &self,
        session_id: &str,
        text: &str,
        strategy: MatchingStrategy,
    ) -> Result<String> {
        Ok(match self.mapping(session_id).await? {
            Some(mapping) => deanonymize(text, &mapping, strategy),
            None => text.to_string(),
        })
    }

    pub async fn forget(&self, session_id: &str) -> Result<bool> {
        self.store.remove_mapping(session_id).await
    }

    pub async fn purge_expired(&self) -> Result<u64> {
        let removed = self.store.purge_expired(Utc::now()).await?;
        if removed > 0 {
            info!(removed, "expired mappings purged");
        }
        Ok(removed)
    }
}
