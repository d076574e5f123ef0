//! SUREBET — Sports-Betting Arbitrage Scanner
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod alerts;
pub mod arb;
pub mod config;
pub mod engine;
pub mod feeds;
pub mod markets;
pub mod quota;
pub mod storage;
pub mod types;
