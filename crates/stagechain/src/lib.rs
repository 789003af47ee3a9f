//! # Stagechain
//!
//! Stage-chain script protection: split a script's delivery into an ordered
//! chain of guarded, short-lived stages, and serve those stages only to the
//! intended runtime client.
//!
//! ## Overview
//!
//! - **Protection**: [`Protector`] builds a chain for a script and persists
//!   every stage before handing back the entry point
//! - **Delivery**: [`StageServer`] runs each stage fetch through the
//!   `Received -> ClientChecked -> AuthChecked -> Found -> Served` checks
//! - **HTTP**: [`http::router`] exposes both over axum; the `stagechain`
//!   binary serves it from a SQLite database
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use stagechain::store::MemoryStore;
//! use stagechain::{ChainConfig, DeliveryPolicy, Protector, StageRequest, StageServer};
//!
//! async fn example() {
//!     let store = Arc::new(MemoryStore::new());
//!
//!     // Protect a script
//!     let protector = Protector::new(Arc::clone(&store), ChainConfig::default()).unwrap();
//!     let outcome = protector.protect("print(1)").await.unwrap();
//!     println!("{}", outcome.entry_point);
//!
//!     // Serve its first stage
//!     let server = StageServer::new(store, DeliveryPolicy::default());
//!     let request = StageRequest::new(outcome.stages[0].id.clone()).client("Roblox");
//!     let _ = server.serve(&request, stagechain::core::now_millis()).await;
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `stagechain::core` - Chain generation primitives
//! - `stagechain::store` - Storage abstraction and SQLite

pub mod config;
pub mod delivery;
pub mod error;
pub mod http;
pub mod protect;

// Re-export component crates
pub use stagechain_core as core;
pub use stagechain_store as store;

// Re-export main types for convenience
pub use config::ServerConfig;
pub use delivery::{DeliveryPolicy, StageRequest, StageServer};
pub use error::{DeliveryPhase, ProtectError, Rejection, RejectionKind, Result, ServerError};
pub use protect::{ProtectOutcome, Protector, StageSummary};

// Re-export commonly used core types
pub use stagechain_core::{
    Chain, ChainBuilder, ChainConfig, EntryPoint, StageId, StageRecord, StageRole,
};
