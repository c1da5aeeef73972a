//! Pool and token discovery. Every exchange is cached as JSON under the data
//! directory and scanned from the chain only when no cache exists.

/// On disk pool cache
pub mod cache;
/// Token metadata cache
pub mod tokens;

use std::future::Future;
use std::path::Path;

use alloy::network::Ethereum;
use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::Filter;
use alloy::sol;
use alloy::sol_types::SolEvent;
use eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};

use crate::arb::flash_loan::IUniswapV2Pair;
use crate::arb::pool::{Concentrated, ExchangeKind, Pool, PoolId};
use crate::arb::token::TokenId;
use crate::chain::rpc::{i24_to_i32, read_concentrated};
use crate::utils::batch::batch;
use crate::utils::constants::{ExchangePreset, LOG_WINDOW, REFRESH_BATCH};

sol! {
    #[sol(rpc)]
    interface IUniswapV2Factory {
        function allPairsLength() external view returns (uint256);
        function allPairs(uint256 index) external view returns (address);
    }

    interface IUniswapV3Factory {
        event PoolCreated(
            address indexed token0,
            address indexed token1,
            uint24 indexed fee,
            int24 tickSpacing,
            address pool
        );
    }
}

/// `eth_getLogs` windows requested concurrently
const LOG_REQUESTS: usize = 10;

/// A pool found through a `PoolCreated` event
#[derive(Clone, Copy, Debug)]
struct Created {
    pool: Address,
    token0: Address,
    token1: Address,
    fee: u32,
    tick_spacing: i32,
}

/// Runs [`batch`] chunk by chunk behind a progress bar
async fn with_progress<I, O, F, Fut>(label: &str, inputs: &[I], size: usize, f: F) -> Result<Vec<O>>
where
    F: Fn(&I) -> Fut,
    Fut: Future<Output = Result<O>>,
{
    let bar = ProgressBar::new(inputs.len() as u64);
    bar.set_style(ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} ({eta})")?);
    bar.set_message(label.to_string());

    let mut outputs = Vec::with_capacity(inputs.len());
    for chunk in inputs.chunks(size.max(1)) {
        outputs.extend(batch(chunk, size, &f, false).await?);
        bar.inc(chunk.len() as u64);
    }
    bar.finish();
    Ok(outputs)
}

/// Every pair of a Uniswap V2 style factory, enumerated by index
///
/// # Errors
/// * A chunk of calls still failing after retries
pub async fn scan_constant_product(provider: &RootProvider<Ethereum>, preset: &ExchangePreset) -> Result<Vec<Pool>> {
    let factory = IUniswapV2Factory::new(preset.factory, provider);
    let count: u64 = factory.allPairsLength().call().await?._0.saturating_to();
    info!("bootstrap: {} has {count} pairs", preset.name);

    let indexes: Vec<u64> = (0..count).collect();
    with_progress(preset.name, &indexes, REFRESH_BATCH, |index| {
        let factory = &factory;
        let index = U256::from(*index);
        async move {
            let address = factory.allPairs(index).call().await?._0;
            let pair = IUniswapV2Pair::new(address, provider);
            let token0 = pair.token0().call().await?._0;
            let token1 = pair.token1().call().await?._0;
            let reserves = pair.getReserves().call().await?;
            Ok(Pool::constant_product(
                PoolId(address),
                TokenId(token0),
                TokenId(token1),
                preset.router,
                U256::from(reserves.reserve0),
                U256::from(reserves.reserve1),
            ))
        }
    })
    .await
}

/// `PoolCreated` events of `preset` in `[from, to]`
async fn created_between(
    provider: &RootProvider<Ethereum>,
    preset: &ExchangePreset,
    from: u64,
    to: u64,
) -> Result<Vec<Created>> {
    let filter = Filter::new()
        .address(preset.factory)
        .event_signature(IUniswapV3Factory::PoolCreated::SIGNATURE_HASH)
        .from_block(from)
        .to_block(to);

    let mut created = Vec::new();
    for log in provider.get_logs(&filter).await? {
        let event = log.log_decode::<IUniswapV3Factory::PoolCreated>()?.inner.data;
        created.push(Created {
            pool: event.pool,
            token0: event.token0,
            token1: event.token1,
            fee: event.fee.to::<u32>(),
            tick_spacing: i24_to_i32(event.tickSpacing)?,
        });
    }
    Ok(created)
}

/// Every pool of a Uniswap V3 style factory, found through its creation
/// events. A pool whose state can not be read is kept, untradable.
///
/// # Errors
/// * A log window still failing after retries
pub async fn scan_concentrated(provider: &RootProvider<Ethereum>, preset: &ExchangePreset) -> Result<Vec<Pool>> {
    let windows: Vec<(u64, u64)> = (preset.start_block..=preset.end_block)
        .step_by(usize::try_from(LOG_WINDOW)?)
        .map(|from| (from, (from + LOG_WINDOW - 1).min(preset.end_block)))
        .collect();

    let created: Vec<Created> = with_progress("PoolCreated", &windows, LOG_REQUESTS, |&(from, to)| {
        created_between(provider, preset, from, to)
    })
    .await?
    .into_iter()
    .flatten()
    .collect();
    info!("bootstrap: {} has {} pools", preset.name, created.len());

    with_progress(preset.name, &created, REFRESH_BATCH, |created| {
        let created = *created;
        async move {
            let state = match read_concentrated(provider, created.pool, created.tick_spacing, created.fee).await {
                Ok(state) => state,
                Err(e) => {
                    debug!("bootstrap: can not read {}: {e}", created.pool);
                    Concentrated::new(U256::ZERO, 0, 0, created.tick_spacing, created.fee, 0)
                }
            };
            Ok(Pool::concentrated(
                PoolId(created.pool),
                TokenId(created.token0),
                TokenId(created.token1),
                preset.router,
                state,
            ))
        }
    })
    .await
}

/// Pools of `preset`, from `<dir>/<name>.json` unless `rescan` is set or the
/// cache is missing. A scan rewrites the cache.
///
/// # Errors
/// * Unreadable cache or failed scan
pub async fn load_exchange(
    provider: &RootProvider<Ethereum>,
    preset: &ExchangePreset,
    dir: &Path,
    rescan: bool,
) -> Result<Vec<Pool>> {
    let path = dir.join(format!("{}.json", preset.name));

    if !rescan {
        if let Some(pools) = cache::read(&path, preset.router)? {
            info!("bootstrap: loaded {} {} pools from {}", pools.len(), preset.name, path.display());
            return Ok(pools);
        }
    }

    let pools = match preset.kind {
        ExchangeKind::ConstantProduct => scan_constant_product(provider, preset).await?,
        ExchangeKind::ConcentratedLiquidity => scan_concentrated(provider, preset).await?,
    };
    cache::write(&path, &pools)?;
    info!("bootstrap: saved {} {} pools to {}", pools.len(), preset.name, path.display());
    Ok(pools)
}
