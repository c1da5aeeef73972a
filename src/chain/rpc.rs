use std::collections::HashSet;

use alloy::network::Ethereum;
use alloy::primitives::aliases::I24;
use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::Filter;
use alloy::sol;
use eyre::{eyre, Result};
use log::debug;
use url::Url;

use super::{Ledger, Verified};
use crate::arb::flash_loan::{decode_revert, FlashCall, IFlashArbitrage, IUniswapV2Pair, Rejection};
use crate::arb::pool::{Amm, Concentrated, Pool, PoolId};

sol! {
    #[sol(rpc)]
    interface IUniswapV3Pool {
        function token0() external view returns (address);
        function token1() external view returns (address);
        function fee() external view returns (uint24);
        function tickSpacing() external view returns (int24);
        function liquidity() external view returns (uint128);
        function slot0() external view returns (
            uint160 sqrtPriceX96,
            int24 tick,
            uint16 observationIndex,
            uint16 observationCardinality,
            uint16 observationCardinalityNext,
            uint8 feeProtocol,
            bool unlocked
        );
        function ticks(int24 tick) external view returns (
            uint128 liquidityGross,
            int128 liquidityNet,
            uint256 feeGrowthOutside0X128,
            uint256 feeGrowthOutside1X128,
            int56 tickCumulativeOutside,
            uint160 secondsPerLiquidityOutsideX128,
            uint32 secondsOutside,
            bool initialized
        );
    }
}

/// Creates an HTTP provider for `url`
///
/// # Errors
/// * If the URL can not be parsed
pub fn http_provider(url: &str) -> Result<RootProvider<Ethereum>> {
    let url = Url::parse(url)?;
    let provider = ProviderBuilder::new().on_http(url);
    Ok((*provider.root()).clone())
}

/// Converts a solidity `int24` to `i32`
///
/// # Errors
/// * Never for values read from a pool, kept for the type system
pub fn i24_to_i32(value: I24) -> Result<i32> {
    i32::try_from(value).map_err(|_| eyre!("Overflow: {value} does not fit an i32"))
}

/// Reads the state of a concentrated liquidity pool: price, tick and active
/// liquidity, plus the gross liquidity of the lower tick of the active range
///
/// # Errors
/// * If any call fails
pub async fn read_concentrated(
    provider: &RootProvider<Ethereum>,
    pool: Address,
    tick_spacing: i32,
    fee: u32,
) -> Result<Concentrated> {
    let contract = IUniswapV3Pool::new(pool, provider);
    let slot0 = contract.slot0().call().await?;
    let liquidity = contract.liquidity().call().await?._0;
    let tick = i24_to_i32(slot0.tick)?;

    let mut state = Concentrated::new(U256::from(slot0.sqrtPriceX96), liquidity, tick, tick_spacing, fee, 0);
    let (lower, _) = state.active_range()?;
    let lower = I24::try_from(lower).map_err(|_| eyre!("Overflow: tick {lower} does not fit an int24"))?;
    let gross = contract.ticks(lower).call().await?.liquidityGross;

    state.liquidity_gross = gross;
    Ok(state)
}

/// [`Ledger`] over a JSON-RPC endpoint
#[derive(Clone, Debug)]
pub struct RpcLedger {
    provider: RootProvider<Ethereum>,
    /// Sender of the dry runs
    owner: Address,
    /// The flash contract
    flash_contract: Address,
}

impl RpcLedger {
    /// Dry runs are sent from `owner` to `flash_contract`
    #[must_use]
    pub const fn new(provider: RootProvider<Ethereum>, owner: Address, flash_contract: Address) -> Self {
        Self {
            provider,
            owner,
            flash_contract,
        }
    }

    /// The underlying provider
    #[must_use]
    pub const fn provider(&self) -> &RootProvider<Ethereum> {
        &self.provider
    }
}

impl Ledger for RpcLedger {
    async fn block_number(&self) -> Result<u64> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn touched_pools(&self, from: u64, to: u64, pools: &HashSet<PoolId>) -> Result<HashSet<PoolId>> {
        let filter = Filter::new().from_block(from).to_block(to);
        let logs = self.provider.get_logs(&filter).await?;
        let touched: HashSet<PoolId> = logs
            .iter()
            .map(|log| PoolId(log.address()))
            .filter(|pool| pools.contains(pool))
            .collect();
        debug!(
            "chain::rpc: {} logs in blocks {from}..={to}, {} watched pools touched",
            logs.len(),
            touched.len()
        );
        Ok(touched)
    }

    async fn gas_price(&self) -> Result<u128> {
        Ok(self.provider.get_gas_price().await?)
    }

    async fn refresh(&self, pool: &Pool) -> Result<Pool> {
        match pool.amm {
            Amm::ConstantProduct(_) => {
                let reserves = IUniswapV2Pair::new(pool.id.0, &self.provider)
                    .getReserves()
                    .call()
                    .await?;
                Ok(Pool::constant_product(
                    pool.id,
                    pool.token0,
                    pool.token1,
                    pool.router,
                    U256::from(reserves.reserve0),
                    U256::from(reserves.reserve1),
                ))
            }
            Amm::ConcentratedLiquidity(state) => {
                let state = read_concentrated(&self.provider, pool.id.0, state.tick_spacing, state.fee).await?;
                Ok(Pool::concentrated(pool.id, pool.token0, pool.token1, pool.router, state))
            }
        }
    }

    async fn simulate(&self, call: &FlashCall) -> std::result::Result<Verified, Rejection> {
        let flash = IFlashArbitrage::new(self.flash_contract, &self.provider);
        let request = flash
            .uniswapV3Flash(
                call.pool.0,
                call.token.0,
                call.min_profit,
                call.deadline,
                call.recipient,
                call.amount0,
                call.amount1,
                call.data.clone(),
            )
            .from(self.owner);

        let profit = request.call().await.map_err(rejection)?.profit;
        let gas = request.estimate_gas().await.map_err(rejection)?;
        Ok(Verified { profit, gas })
    }
}

/// Decodes the revert carried by a failed call, if there is one
fn rejection(error: alloy::contract::Error) -> Rejection {
    let revert = match &error {
        alloy::contract::Error::TransportError(e) => e
            .as_error_resp()
            .and_then(|payload| payload.as_revert_data()),
        _ => None,
    };
    revert
        .and_then(|data| decode_revert(&data))
        .unwrap_or_else(|| Rejection::new(error.to_string()))
}
