//! # Stagechain Testkit
//!
//! Testing utilities for stagechain.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Simulated client**: Replays the runtime client's fetch sequence
//!   against a stage server, following only what the stage text says
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: Helper structs for setting up test scenarios
//!
//! ## Simulated Client
//!
//! ```rust,no_run
//! use stagechain_testkit::TestFixture;
//!
//! async fn example() {
//!     let mut fixture = TestFixture::new();
//!     let (_, outcome) = fixture.protect("print(1)").await.unwrap();
//!     let script = fixture.client().run(&outcome.entry_point).await.unwrap();
//!     assert_eq!(script, "print(1)");
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use stagechain_testkit::{ChainParams, TestFixture};
//!
//! proptest! {
//!     #[test]
//!     fn chains_validate(params: ChainParams) {
//!         let chain = TestFixture::with_seed(params.seed).build(&params.script).unwrap();
//!         prop_assert!(stagechain::core::validate_chain(&chain).is_ok());
//!     }
//! }
//! ```

pub mod client;
pub mod fixtures;
pub mod generators;

pub use client::{parse_hop, ClientError, Hop, SimulatedClient};
pub use fixtures::{TestFixture, FIXTURE_NOW};
pub use generators::ChainParams;
