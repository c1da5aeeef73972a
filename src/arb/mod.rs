//! # Arbitrage Module
//!
//! Cycle detection over a liquidity graph, trade sizing, and the pipeline
//! that verifies, ranks and dispatches the resulting flash loans.

/// Time limited set of failed cycles
pub mod blacklist;
/// Breadth first cycle search
pub mod circular;
/// Cycles and the arena they are built in
pub mod cycle;
/// Candidate records
pub mod execution;
/// Flash loan call assembly
pub mod flash_loan;
/// Liquidity graph construction
pub mod liquidity;
/// Fixed point helpers shared by the curves
pub mod math;
/// Trade size search
pub mod optimize;
/// Verification, ranking and dispatch
pub mod pipeline;
/// Pool data structures and curves
pub mod pool;
/// Flash loan sources
pub mod starters;
/// Test helpers and utilities
#[cfg(test)]
pub(crate) mod test_helpers;
/// Token data structures and utilities
pub mod token;
