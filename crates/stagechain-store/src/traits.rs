//! Store trait: the abstract interface for stage persistence.
//!
//! The store is a key-value map from stage id to stage record with expiry.
//! Implementations include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use stagechain_core::{StageId, StageRecord};

use crate::error::Result;

/// The StageStore trait: async interface for stage persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **All-or-nothing inserts**: `insert_stages` either stores every record
///   or none of them.
/// - **Unique ids**: inserting an id that already exists fails with
///   `DuplicateId` and stores nothing.
/// - **Raw reads**: `get_stage` returns expired records that have not been
///   purged yet. Callers enforce expiry (see [`StageStoreExt::get_live_stage`]).
#[async_trait]
pub trait StageStore: Send + Sync {
    /// Insert all records of a chain.
    async fn insert_stages(&self, stages: &[StageRecord]) -> Result<()>;

    /// Get a stage by id, expired or not.
    async fn get_stage(&self, id: &StageId) -> Result<Option<StageRecord>>;

    /// Physically delete every record with `expires_at < now`.
    ///
    /// Returns the number of records removed.
    async fn purge_expired(&self, now: i64) -> Result<usize>;

    /// Number of records currently stored, expired ones included.
    async fn stage_count(&self) -> Result<usize>;
}

/// Extension trait for common store patterns.
pub trait StageStoreExt: StageStore {
    /// Get a stage only if it is still readable at `now`.
    ///
    /// Expired and missing stages are indistinguishable to the caller.
    fn get_live_stage(
        &self,
        id: &StageId,
        now: i64,
    ) -> impl std::future::Future<Output = Result<Option<StageRecord>>> + Send;
}

impl<S: StageStore + ?Sized> StageStoreExt for S {
    async fn get_live_stage(&self, id: &StageId, now: i64) -> Result<Option<StageRecord>> {
        let stage = self.get_stage(id).await?;
        Ok(stage.filter(|s| !s.is_expired(now)))
    }
}
