//! Arbitrage engine — implied-probability math and opportunity detection.

pub mod calc;
pub mod detector;
