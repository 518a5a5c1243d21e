//! In-memory registry
//!
//! DashMap-backed, shared through `Clone`. Nothing survives a restart,
//! so it serves tests and throwaway runs.

use alloy_primitives::U256;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use super::{registry_key, TokenRegistry};
use crate::models::errors::AppResult;
use crate::models::types::TokenRecord;

#[derive(Clone, Default)]
pub struct MemoryRegistry {
    /// lowercase address -> record
    store: Arc<DashMap<String, TokenRecord>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records
    pub fn records(&self) -> Vec<TokenRecord> {
        self.store.iter().map(|e| e.value().clone()).collect()
    }
}

#[async_trait]
impl TokenRegistry for MemoryRegistry {
    async fn find(&self, address: &str) -> AppResult<Option<TokenRecord>> {
        let key = registry_key(address);
        Ok(self.store.get(&key).map(|e| e.value().clone()))
    }

    async fn upsert(&self, address: &str, count: U256) -> AppResult<()> {
        let key = registry_key(address);
        self.store
            .entry(key.clone())
            .and_modify(|rec| {
                rec.last_count = count;
                rec.updated_at = Utc::now();
            })
            .or_insert_with(|| TokenRecord::new(key.clone(), count));
        debug!("💾 UPSERT: {} = {}", key, count);
        Ok(())
    }

    async fn len(&self) -> AppResult<usize> {
        Ok(self.store.len())
    }
}
