//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use stagechain::{
    Chain, DeliveryPolicy, ProtectOutcome, Protector, StageRecord, StageRequest, StageServer,
};
use stagechain_core::{ChainConfig, RandomMaterial};
use stagechain_store::{MemoryStore, StageStore};

use crate::client::SimulatedClient;

/// Fixed creation time used by fixtures (2025-01-14T16:00:00Z).
pub const FIXTURE_NOW: i64 = 1_736_870_400_000;

/// A test fixture with seeded randomness, a store, a protector and a server.
pub struct TestFixture<S: StageStore = MemoryStore> {
    pub store: Arc<S>,
    pub protector: Protector<S>,
    pub server: StageServer<S>,
    pub now: i64,
    material: RandomMaterial<StdRng>,
}

impl TestFixture<MemoryStore> {
    /// Create a fixture over an empty memory store.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Create with deterministic randomness from `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_store(MemoryStore::new(), seed)
    }
}

impl Default for TestFixture<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StageStore> TestFixture<S> {
    /// Create a fixture over `store` with default chain and delivery settings.
    pub fn with_store(store: S, seed: u64) -> Self {
        let store = Arc::new(store);
        let protector = Protector::new(Arc::clone(&store), ChainConfig::default())
            .expect("default chain config is valid");
        let server = StageServer::new(Arc::clone(&store), DeliveryPolicy::default());
        Self {
            store,
            protector,
            server,
            now: FIXTURE_NOW,
            material: RandomMaterial::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Build a chain for `script` at the fixture's time without storing it.
    pub fn build(&mut self, script: &str) -> stagechain_core::Result<Chain> {
        self.protector
            .builder()
            .build_with(script, &mut self.material, self.now)
    }

    /// Build and store a chain, returning both the chain and the outcome.
    pub async fn protect(&mut self, script: &str) -> stagechain::Result<(Chain, ProtectOutcome)> {
        let chain = self.build(script)?;
        let outcome = self.protector.persist(chain.clone()).await?;
        Ok((chain, outcome))
    }

    /// A client bound to this fixture's server and clock.
    pub fn client(&self) -> SimulatedClient<'_, S> {
        SimulatedClient::new(&self.server).at(self.now)
    }

    /// A request that passes every delivery check for `record`.
    pub fn valid_request(&self, record: &StageRecord) -> StageRequest {
        let mut request = StageRequest::new(record.id.clone())
            .client(format!("{}/WinInet", self.server.policy().client_marker));
        if let Some(access) = &record.access {
            request = request.header(&access.name, access.value.as_str());
        }
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixture_protect_stores_chain() {
        let mut fixture = TestFixture::new();
        let (chain, outcome) = fixture.protect("print(1)").await.unwrap();
        assert_eq!(outcome.entry_point, chain.entry_point().text());
        assert_eq!(fixture.store.stage_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_valid_request_is_served() {
        let mut fixture = TestFixture::with_seed(7);
        let (chain, _) = fixture.protect("print(1)").await.unwrap();
        for record in chain.stages() {
            let body = fixture
                .server
                .serve(&fixture.valid_request(record), fixture.now)
                .await
                .unwrap();
            assert_eq!(body, record.content);
        }
    }

    #[test]
    fn test_same_seed_same_chain() {
        let a = TestFixture::with_seed(42).build("print(1)").unwrap();
        let b = TestFixture::with_seed(42).build("print(1)").unwrap();
        assert_eq!(a.stages(), b.stages());
    }
}
