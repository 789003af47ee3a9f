//! # Stagechain Store
//!
//! Storage abstraction for stagechain. Provides a trait-based interface
//! for stage persistence with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! The store module abstracts stage storage behind the [`StageStore`] trait,
//! keeping chain generation and delivery storage-agnostic. The primary
//! implementation is [`SqliteStore`], with [`MemoryStore`] for testing.
//!
//! ## Key Types
//!
//! - [`StageStore`] - The async trait for all storage operations
//! - [`StageStoreExt`] - Expiry-aware reads on top of any store
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use stagechain_store::{SqliteStore, StageStore, StageStoreExt};
//!
//! async fn example() {
//!     // Open a SQLite database
//!     let store = SqliteStore::open("stages.db").unwrap();
//!
//!     // Or use an in-memory database for testing
//!     let store = SqliteStore::open_memory().unwrap();
//!
//!     // Read a stage only while it is live
//!     let now = stagechain_core::now_millis();
//!     let stage = store.get_live_stage(&"abc".into(), now).await.unwrap();
//!     assert!(stage.is_none());
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **All-or-nothing inserts**: a chain's records are written together or not at all
//! - **Unique ids**: a duplicate id aborts the insert with `DuplicateId`
//! - **Expiry at read time**: expired records are unreadable through
//!   `get_live_stage` whether or not they have been purged

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{StageStore, StageStoreExt};
