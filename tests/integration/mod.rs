//! Integration test suite for push-validator.
//!
//! End-to-end tests that drive the real HTTP, archive and filesystem stack
//! against a local [`TestServer`](push_validator_cli::test_utils::TestServer).
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **harness**: release server setup shared by the update tests
//! - **update_flow**: full update runs (happy path, checksum mismatch, rollback)
//! - **install_invariants**: atomic install and single-generation rollback
//! - **update_cache**: cache freshness and the startup banner pipeline
//! - **peer_refresh**: peer refresh with and without node restart
//! - **cli**: binary-level smoke tests with `assert_cmd`

mod harness;

mod cli;
mod install_invariants;
mod peer_refresh;
mod update_cache;
mod update_flow;
