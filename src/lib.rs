//! swapwatch: watcher and settlement engine for swap orders.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod storage;
pub mod chain;
pub mod wallet;
pub mod engine;
pub mod api;
