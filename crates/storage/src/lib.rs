use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use prism_core::AnonymizationMapping;
use serde::{Deserialize, Serialize};

/// A mapping retained between the anonymizing call and a later deanonymizing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMapping {
    pub session_id: String,
    pub mapping: AnonymizationMapping,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl StoredMapping {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

pub trait MappingRepository: Send + Sync {
    async fn load_mapping(&self, session_id: &str) -> Result<Option<StoredMapping>>;
    async fn upsert_mapping(&self, stored: &StoredMapping) -> Result<()>;
    async fn remove_mapping(&self, session_id: &str) -> Result<bool>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    mappings: Arc<RwLock<HashMap<String, StoredMapping>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.mappings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.read().is_empty()
    }
}

impl MappingRepository for MemoryStore {
    async fn load_mapping(&self, session_id: &str) -> Result<Option<StoredMapping>> {
        Ok(self.mappings.read().get(session_id).cloned())
    }

    async fn upsert_mapping(&self, stored: &StoredMapping) -> Result<()> {
        self.mappings
            .write()
            .insert(stored.session_id.clone(), stored.clone());
        Ok(())
    }

    async fn remove_mapping(&self, session_id: &str) -> Result<bool> {
        Ok(self.mappings.write().remove(session_id).is_some())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut removed = 0_u64;
        self.mappings.write().retain(|_, value| {
            let keep = !value.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });

        Ok(removed)
    }
}
