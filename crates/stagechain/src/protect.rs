//! The Protector: build a chain and persist it.
//!
//! The entry point is only handed back once every stage of the chain is
//! stored. A failed build writes nothing; a failed write reports a store
//! error and the entry point is never returned.

use std::sync::Arc;

use tracing::{error, info};

use stagechain_core::{Chain, ChainBuilder, ChainConfig, StageId, StageRole};
use stagechain_store::StageStore;

use crate::error::{ProtectError, Result};

/// One stage of a protected chain, as reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSummary {
    /// Stage id.
    pub id: StageId,
    /// Position in the chain.
    pub role: StageRole,
    /// What the stage does.
    pub description: &'static str,
}

/// The result of a successful protection run.
#[derive(Debug, Clone)]
pub struct ProtectOutcome {
    /// The statement that starts the chain.
    pub entry_point: String,
    /// Stages in fetch order.
    pub stages: Vec<StageSummary>,
}

/// Protects scripts and stores their chains.
pub struct Protector<S: StageStore> {
    builder: ChainBuilder,
    store: Arc<S>,
}

impl<S: StageStore> Protector<S> {
    /// Create a protector writing to `store`.
    pub fn new(store: Arc<S>, config: ChainConfig) -> Result<Self> {
        Ok(Self {
            builder: ChainBuilder::new(config)?,
            store,
        })
    }

    /// The underlying chain builder.
    pub fn builder(&self) -> &ChainBuilder {
        &self.builder
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Protect `script`: build its chain, store every stage, return the
    /// entry point.
    pub async fn protect(&self, script: &str) -> Result<ProtectOutcome> {
        // Built to completion before the first await
        let chain = self.builder.build(script).map_err(|e| {
            if !matches!(e, stagechain_core::ChainError::InvalidInput(_)) {
                error!(error = %e, "chain generation failed");
            }
            ProtectError::from(e)
        })?;
        self.persist(chain).await
    }

    /// Store an already built chain.
    pub async fn persist(&self, chain: Chain) -> Result<ProtectOutcome> {
        let stages: Vec<StageSummary> = chain
            .roles()
            .map(|(role, record)| StageSummary {
                id: record.id.clone(),
                role,
                description: role.description(),
            })
            .collect();
        let entry_point = chain.entry_point().text();

        if let Err(e) = self.store.insert_stages(chain.stages()).await {
            error!(error = %e, "failed to persist stage chain");
            return Err(e.into());
        }

        info!(
            first_stage = %stages[0].id,
            stages = stages.len(),
            "protected script"
        );
        Ok(ProtectOutcome {
            entry_point,
            stages,
        })
    }
}
