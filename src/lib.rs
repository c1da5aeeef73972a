/*!
 * # Ouro - Circular Flash Loan Arbitrage
 *
 * Ouro finds token cycles across constant product and concentrated liquidity
 * pools, sizes the trade, borrows the input with a flash loan and repays it
 * out of the proceeds in a single transaction.
 *
 * ## Module Structure
 *
 * - `arb`: Liquidity graph, cycle search, sizing and the execution pipeline
 * - `bootstrap`: Pool and token discovery with on disk caches
 * - `bot`: The block loop
 * - `chain`: Chain reads, dry runs and broadcasting
 * - `config`: Environment configuration
 * - `server`: HTTP status endpoint
 * - `utils`: Logging, batching and network presets
 */

/// Arbitrage detection and execution logic
pub mod arb;
/// Pool and token discovery
pub mod bootstrap;
/// The block loop
pub mod bot;
/// Chain access
pub mod chain;
/// Configuration management for the system
pub mod config;
/// Status endpoint
pub mod server;
/// Utility functions and helpers
pub mod utils;
