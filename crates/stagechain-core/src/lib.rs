//! # Stagechain Core
//!
//! Pure primitives for stagechain: key material, the obfuscation cipher,
//! code mutation and chain building.
//!
//! This crate contains no I/O, no storage, no networking. It turns a script
//! into an entry point plus an ordered set of stage records; persisting and
//! serving those records is the job of the other crates.
//!
//! ## Key Types
//!
//! - [`ChainBuilder`] - Builds a [`Chain`] from a script
//! - [`StageRecord`] - One persisted stage: id, content, access header, expiry
//! - [`EntryPoint`] - The statement handed back to the caller
//! - [`KeySplit`] - The payload key partitioned across two stages
//! - [`StageInput`] - The typed argument each stage receives from its predecessor
//!
//! ## Chain Shape
//!
//! ```text
//! entry point --(checksum)--> verification --(key part 1)--> decrypt --> payload
//! ```
//!
//! Each hop fetches its successor presenting that stage's access header.
//! The verification stage holds the first key part, the decrypt stage the
//! second; the payload is the script XORed with the full key and Base64
//! encoded.

pub mod chain;
pub mod cipher;
pub mod error;
pub mod integrity;
pub mod loader;
pub mod mutator;
pub mod random;
pub mod types;
pub mod validation;

pub use chain::{now_millis, Chain, ChainBuilder, ChainConfig, DEFAULT_STAGE_PATH};
pub use error::{ChainError, Result};
pub use integrity::{checksum, minify};
pub use loader::EntryPoint;
pub use mutator::Snippet;
pub use random::{NameAllocator, NameSupply, RandomMaterial, SequentialNames};
pub use types::{AccessHeader, KeySplit, StageId, StageInput, StageRecord, StageRole};
pub use validation::validate_chain;
