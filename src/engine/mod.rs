//! Core engine — the periodic scan → detect → persist → alert cycle.

pub mod scanner;

pub use scanner::{CycleReport, Scanner};
