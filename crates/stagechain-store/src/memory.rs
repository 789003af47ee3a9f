//! In-memory implementation of the StageStore trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use stagechain_core::{StageId, StageRecord};

use crate::error::{Result, StoreError};
use crate::traits::StageStore;

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    stages: RwLock<HashMap<StageId, StageRecord>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            stages: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Unavailable(format!("lock poisoned: {}", e))
}

#[async_trait]
impl StageStore for MemoryStore {
    async fn insert_stages(&self, stages: &[StageRecord]) -> Result<()> {
        let mut map = self.stages.write().map_err(poisoned)?;

        // Check every id before touching the map so a failure stores nothing
        for (i, stage) in stages.iter().enumerate() {
            if map.contains_key(&stage.id) || stages[..i].iter().any(|s| s.id == stage.id) {
                return Err(StoreError::DuplicateId(stage.id.to_string()));
            }
        }

        for stage in stages {
            map.insert(stage.id.clone(), stage.clone());
        }
        Ok(())
    }

    async fn get_stage(&self, id: &StageId) -> Result<Option<StageRecord>> {
        let map = self.stages.read().map_err(poisoned)?;
        Ok(map.get(id).cloned())
    }

    async fn purge_expired(&self, now: i64) -> Result<usize> {
        let mut map = self.stages.write().map_err(poisoned)?;
        let before = map.len();
        map.retain(|_, stage| !stage.is_expired(now));
        Ok(before - map.len())
    }

    async fn stage_count(&self) -> Result<usize> {
        let map = self.stages.read().map_err(poisoned)?;
        Ok(map.len())
    }
}
