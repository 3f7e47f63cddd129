//! Domain models for muster.
//!
//! These are the core types shared across all crates.

pub mod audit;
pub mod change;
pub mod member;
pub mod rank;
pub mod warning;
