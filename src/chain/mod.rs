//! Everything that talks to the chain: reading state, dry runs and broadcasting.

/// Broadcasting through bundle relays or a plain RPC endpoint
pub mod relay;
/// Alloy backed ledger
pub mod rpc;

use std::collections::HashSet;

use alloy::primitives::{B256, U256};
use eyre::Result;

use crate::arb::execution::GasPlan;
use crate::arb::flash_loan::{FlashCall, Rejection};
use crate::arb::pool::{Pool, PoolId};

pub use relay::RelayBroadcaster;
pub use rpc::RpcLedger;

/// Successful dry run of a flash call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Verified {
    /// Profit returned by the contract, in the borrowed token
    pub profit: U256,
    /// Gas estimate
    pub gas: u64,
}

/// What came out of a broadcast
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dispatch {
    /// The transaction was included
    pub success: bool,
    /// Hash of the signed transaction
    pub tx_hash: Option<B256>,
    /// Relay responses and other notes, for the status view
    pub debug: Vec<String>,
}

/// Read access to chain state and dry runs
#[allow(async_fn_in_trait)]
pub trait Ledger {
    /// Latest block number
    ///
    /// # Errors
    /// * Transport failure
    async fn block_number(&self) -> Result<u64>;

    /// Which of `pools` emitted logs in blocks `from..=to`
    ///
    /// # Errors
    /// * Transport failure
    async fn touched_pools(&self, from: u64, to: u64, pools: &HashSet<PoolId>) -> Result<HashSet<PoolId>>;

    /// Current gas price in wei
    ///
    /// # Errors
    /// * Transport failure
    async fn gas_price(&self) -> Result<u128>;

    /// `pool` with its state read from the chain
    ///
    /// # Errors
    /// * Transport failure or unreadable state
    async fn refresh(&self, pool: &Pool) -> Result<Pool>;

    /// Dry runs the flash call and estimates its gas. Transport errors and
    /// reverts both come back as a rejection.
    async fn simulate(&self, call: &FlashCall) -> std::result::Result<Verified, Rejection>;
}

/// Sends a signed flash call to the network
#[allow(async_fn_in_trait)]
pub trait Broadcaster {
    /// Signs and sends `call`, built on top of `block`, then waits for inclusion
    ///
    /// # Errors
    /// * Signing or nonce lookup failure
    async fn dispatch(&self, call: &FlashCall, plan: &GasPlan, block: u64) -> Result<Dispatch>;
}
