//! Shared storage integration tests.
//!
//! Tests the ledger, outbox and inbox interfaces against all implementations.
//! Each implementation module imports these test functions and runs them.

pub mod account_ledger_tests;
pub mod order_ledger_tests;
pub mod outbox_tests;
