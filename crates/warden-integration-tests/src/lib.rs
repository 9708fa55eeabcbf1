//! Integration test crate for the Warden keeper.
//!
//! This crate has no library code. It only contains integration tests that
//! run keepers, providers and data owners against each other over an
//! in-process network.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p warden-integration-tests
//! ```
