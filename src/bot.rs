//! The block loop: keeps the liquid pools fresh and runs the pipeline every
//! time one of them is touched.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use alloy::network::Ethereum;
use alloy::primitives::U256;
use alloy::providers::RootProvider;
use chrono::Utc;
use eyre::{eyre, Result};
use log::{error, info};

use crate::arb::circular::CircularArbitrager;
use crate::arb::execution::ArbitrageExecution;
use crate::arb::liquidity::find_liquid_pairs;
use crate::arb::pipeline::Pipeline;
use crate::arb::pool::{Pool, PoolId};
use crate::arb::starters::{get_starters, StartToken};
use crate::arb::token::{TokenBook, TokenId};
use crate::bootstrap::load_exchange;
use crate::bootstrap::tokens::load_tokens;
use crate::chain::{Broadcaster, Ledger};
use crate::config::Config;
use crate::utils::batch::batch;
use crate::utils::constants::{BLOCK_TIME_SECONDS, REFRESH_BATCH, REFRESH_TIMEOUT};

/// Lending pools only need a tenth of the search threshold
const STARTER_FRACTION: u64 = 10;

/// Everything loaded before the loop starts
#[derive(Clone, Debug, Default)]
pub struct Market {
    /// Token the liquidity threshold is measured in
    pub stable: TokenId,
    /// Minimum liquidity in `stable` units
    pub min_liquidity: U256,
    /// Tokens whose pools are never traded
    pub blocked: HashSet<TokenId>,
    /// Pools of every searched exchange
    pub pools: Vec<Pool>,
    /// Metadata of every token of `pools`
    pub tokens: TokenBook,
    /// Flash loan sources, one per token
    pub starters: Vec<StartToken>,
}

/// Loads every exchange of the configured network, token metadata and the
/// flash loan starters. `rescan` ignores the caches.
///
/// # Errors
/// * Cache or chain failure
pub async fn load_market(provider: &RootProvider<Ethereum>, config: &Config, rescan: bool) -> Result<Market> {
    let network = config.network;
    let dir = config.network_dir();
    let stable = TokenId(network.stable);

    let mut pools = Vec::new();
    for preset in network.exchanges {
        pools.extend(load_exchange(provider, preset, &dir, rescan).await?);
    }
    let lenders = load_exchange(provider, &network.lender, &dir, rescan).await?;
    let starters = get_starters(&lenders, stable, config.min_liquidity / U256::from(STARTER_FRACTION));

    let addresses: HashSet<TokenId> = pools
        .iter()
        .chain(lenders.iter())
        .flat_map(|pool| [pool.token0, pool.token1])
        .collect();
    info!("bot: {} pools, {} tokens", pools.len(), addresses.len());
    let tokens = load_tokens(provider, &config.data_dir, &addresses).await?;

    Ok(Market {
        stable,
        min_liquidity: config.min_liquidity,
        blocked: network.blocked.iter().copied().map(TokenId).collect(),
        pools,
        tokens,
        starters,
    })
}

/// How long to wait after an iteration that took `elapsed`: the rest of a
/// block time, at least one second
#[must_use]
pub fn pause_after(elapsed: Duration) -> Duration {
    Duration::from_secs(BLOCK_TIME_SECONDS)
        .saturating_sub(elapsed)
        .max(Duration::from_secs(1))
}

fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}

/// Arbitrage bot over a [`Ledger`] and a [`Broadcaster`]
pub struct Bot<L, B> {
    ledger: L,
    broadcaster: B,
    pipeline: Pipeline,
    market: Market,
    /// First block not scanned yet
    next_block: u64,
}

impl<L: Ledger, B: Broadcaster> Bot<L, B> {
    /// A bot that has not scanned any block yet
    pub fn new(ledger: L, broadcaster: B, pipeline: Pipeline, market: Market) -> Self {
        Self {
            ledger,
            broadcaster,
            pipeline,
            market,
            next_block: 0,
        }
    }

    /// Pools the loop currently watches
    #[must_use]
    pub fn pools(&self) -> &[Pool] {
        &self.market.pools
    }

    /// The pipeline, for its history
    #[must_use]
    pub const fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Fresh state of `pools`. A read that outlives [`REFRESH_TIMEOUT`]
    /// fails, and a chunk that keeps failing after retries keeps its cached
    /// state.
    async fn refresh(&self, pools: &[Pool], verbose: bool) -> Vec<Pool> {
        let ledger = &self.ledger;
        let read = |pool: &Pool| {
            let pool = *pool;
            async move {
                tokio::time::timeout(REFRESH_TIMEOUT, ledger.refresh(&pool))
                    .await
                    .map_err(|_| eyre!("refresh of {:?} timed out", pool.id))?
            }
        };

        let mut fresh = Vec::with_capacity(pools.len());
        for chunk in pools.chunks(REFRESH_BATCH) {
            match batch(chunk, REFRESH_BATCH, &read, verbose).await {
                Ok(pools) => fresh.extend(pools),
                Err(e) => {
                    error!("bot::refresh: keeping {} stale pools: {e}", chunk.len());
                    fresh.extend_from_slice(chunk);
                }
            }
        }
        fresh
    }

    fn liquid(&self, pools: &[Pool], min_liquidity: U256) -> Vec<Pool> {
        find_liquid_pairs(pools, self.market.stable, min_liquidity)
            .into_iter()
            .map(|info| info.pool)
            .collect()
    }

    /// Narrows the pools down to the liquid ones: a coarse pass on cached
    /// state at half the threshold, a refresh, then the real threshold.
    /// Pools of blocked tokens are dropped.
    ///
    /// # Errors
    /// * Chain failure
    pub async fn prepare(&mut self) -> Result<()> {
        self.next_block = self.ledger.block_number().await? + 1;

        let coarse = self.liquid(&self.market.pools, self.market.min_liquidity / U256::from(2));
        info!("bot::prepare: {} initial liquid pools", coarse.len());

        let refreshed = self.refresh(&coarse, true).await;
        let liquid = self.liquid(&refreshed, self.market.min_liquidity);
        info!("bot::prepare: {} final liquid pools", liquid.len());

        let blocked = &self.market.blocked;
        self.market.pools = liquid
            .into_iter()
            .filter(|pool| !blocked.contains(&pool.token0) && !blocked.contains(&pool.token1))
            .collect();
        info!("bot::prepare: {} pools not blocked", self.market.pools.len());
        Ok(())
    }

    /// Scans the blocks since the last tick. When a watched pool was
    /// touched, refreshes it and runs one pipeline iteration.
    ///
    /// # Errors
    /// * Chain failure
    pub async fn tick(&mut self, now: u64) -> Result<Option<ArbitrageExecution>> {
        let latest = self.ledger.block_number().await?;
        if latest < self.next_block {
            return Ok(None);
        }

        let watched: HashSet<PoolId> = self.market.pools.iter().map(|pool| pool.id).collect();
        let touched = self.ledger.touched_pools(self.next_block, latest, &watched).await?;
        self.next_block = latest + 1;
        if touched.is_empty() {
            return Ok(None);
        }

        let stale: Vec<Pool> = self
            .market
            .pools
            .iter()
            .filter(|pool| touched.contains(&pool.id))
            .copied()
            .collect();
        for fresh in self.refresh(&stale, false).await {
            if let Some(pool) = self.market.pools.iter_mut().find(|pool| pool.id == fresh.id) {
                *pool = fresh;
            }
        }
        info!("bot::tick: block {latest}, {} pools updated", stale.len());

        let graph = find_liquid_pairs(&self.market.pools, self.market.stable, self.market.min_liquidity);
        let mut arbitrager = CircularArbitrager::new(graph);
        self.pipeline
            .run(
                &mut arbitrager,
                &self.market.starters,
                &self.market.tokens,
                &self.ledger,
                &self.broadcaster,
                latest,
                now,
            )
            .await
    }

    /// Prepares, then ticks forever roughly once per block. Tick errors are
    /// logged and the loop goes on.
    ///
    /// # Errors
    /// * Preparation failure
    pub async fn run(mut self) -> Result<()> {
        self.prepare().await?;

        loop {
            let started = Instant::now();
            match self.tick(unix_now()).await {
                Ok(Some(execution)) => info!("bot::run: dispatched {}", execution.state),
                Ok(None) => {}
                Err(e) => error!("bot::run: {e}"),
            }
            tokio::time::sleep(pause_after(started.elapsed())).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use alloy::primitives::Address;

    use super::*;
    use crate::arb::execution::GasPlan;
    use crate::arb::flash_loan::{FlashCall, Rejection};
    use crate::arb::pipeline::PipelineSettings;
    use crate::arb::test_helpers::*;
    use crate::chain::{Dispatch, Verified};

    /// Chain whose pools hold whatever `state` says
    struct ScriptedLedger {
        block: Mutex<u64>,
        touched: HashSet<PoolId>,
        state: HashMap<PoolId, Pool>,
        ranges: Mutex<Vec<(u64, u64)>>,
        /// every refresh fails
        broken: bool,
        /// every refresh never answers
        hanging: bool,
    }

    impl ScriptedLedger {
        fn new(state: Vec<Pool>) -> Self {
            Self {
                block: Mutex::new(100),
                touched: HashSet::new(),
                state: state.into_iter().map(|pool| (pool.id, pool)).collect(),
                ranges: Mutex::new(Vec::new()),
                broken: false,
                hanging: false,
            }
        }
    }

    impl Ledger for ScriptedLedger {
        async fn block_number(&self) -> Result<u64> {
            Ok(*self.block.lock().unwrap())
        }

        async fn touched_pools(&self, from: u64, to: u64, pools: &HashSet<PoolId>) -> Result<HashSet<PoolId>> {
            self.ranges.lock().unwrap().push((from, to));
            Ok(self.touched.intersection(pools).copied().collect())
        }

        async fn gas_price(&self) -> Result<u128> {
            Ok(1)
        }

        async fn refresh(&self, pool: &Pool) -> Result<Pool> {
            if self.broken {
                eyre::bail!("rate limited");
            }
            if self.hanging {
                std::future::pending::<()>().await;
            }
            Ok(self.state.get(&pool.id).copied().unwrap_or(*pool))
        }

        async fn simulate(&self, _call: &FlashCall) -> std::result::Result<Verified, Rejection> {
            Err(Rejection::new("reverted"))
        }
    }

    struct NoBroadcast;

    impl Broadcaster for NoBroadcast {
        async fn dispatch(&self, _call: &FlashCall, _plan: &GasPlan, _block: u64) -> Result<Dispatch> {
            Ok(Dispatch::default())
        }
    }

    fn bot(cached: Vec<Pool>, chain: Vec<Pool>, blocked: &[&str]) -> Bot<ScriptedLedger, NoBroadcast> {
        let (pipeline, _) = Pipeline::new(PipelineSettings {
            min_liquidity_usd: U256::from(1000),
            eth_price: U256::from(2_000_000_000_u64),
            flash_contract: Address::ZERO,
        });
        let market = Market {
            stable: token("USD"),
            min_liquidity: U256::from(1000),
            blocked: blocked.iter().map(|name| token(name)).collect(),
            pools: cached,
            starters: vec![StartToken {
                address: token("USD"),
                flash_pool: pool_id("F"),
                is_token0: true,
                fee: 500,
            }],
            ..Market::default()
        };
        Bot::new(ScriptedLedger::new(chain), NoBroadcast, pipeline, market)
    }

    fn ids(pools: &[Pool]) -> Vec<PoolId> {
        let mut ids: Vec<PoolId> = pools.iter().map(|pool| pool.id).collect();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn test_prepare_uses_fresh_state() {
        let mut bot = bot(
            vec![
                // drained since the cache was written
                pool("P1", "USD", "A", 5_000, 5_000),
                // below half the threshold in the cache, never refreshed
                pool("P2", "USD", "B", 400, 400),
                pool("P3", "A", "C", 5_000, 5_000),
            ],
            vec![pool("P1", "USD", "A", 900, 900), pool("P2", "USD", "B", 5_000, 5_000)],
            &[],
        );
        bot.prepare().await.unwrap();

        assert!(bot.pools().is_empty());
        assert_eq!(bot.next_block, 101);
    }

    #[tokio::test]
    async fn test_prepare_drops_blocked_tokens() {
        let cached = vec![
            pool("P1", "USD", "A", 5_000, 5_000),
            pool("P2", "A", "TAX", 5_000, 5_000),
            pool("P3", "USD", "B", 5_000, 5_000),
        ];
        let mut bot = bot(cached.clone(), cached, &["TAX"]);
        bot.prepare().await.unwrap();

        assert_eq!(ids(bot.pools()), ids(&[pool("P1", "USD", "A", 1, 1), pool("P3", "USD", "B", 1, 1)]));
    }

    #[tokio::test]
    async fn test_prepare_keeps_cached_state_on_failure() {
        let cached = vec![pool("P1", "USD", "A", 5_000, 5_000), pool("P2", "A", "B", 5_000, 5_000)];
        let mut bot = bot(cached.clone(), vec![pool("P1", "USD", "A", 1, 1)], &[]);
        bot.ledger.broken = true;
        bot.prepare().await.unwrap();

        assert_eq!(ids(bot.pools()), ids(&cached));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_refresh_keeps_cached_state() {
        let cached = vec![
            pool("P1", "USD", "A", 5_000, 5_000),
            pool("P2", "A", "B", 5_000, 5_000),
            pool("P3", "B", "USD", 5_000, 5_000),
        ];
        let mut bot = bot(cached.clone(), vec![pool("P1", "USD", "A", 1, 1)], &[]);
        bot.ledger.hanging = true;
        bot.prepare().await.unwrap();
        assert_eq!(ids(bot.pools()), ids(&cached));

        bot.ledger.touched = [pool_id("P2")].into_iter().collect();
        *bot.ledger.block.lock().unwrap() = 101;
        assert!(bot.tick(0).await.unwrap().is_none());
        let kept = bot.pools().iter().find(|pool| pool.id == pool_id("P2")).unwrap();
        assert_eq!(kept.reserve_of(token("B")).unwrap(), U256::from(5_000));
    }

    #[tokio::test]
    async fn test_tick_scans_each_block_once() {
        let cached = vec![
            pool("P1", "USD", "A", 5_000, 5_000),
            pool("P2", "A", "B", 5_000, 5_000),
            pool("P3", "B", "USD", 5_000, 5_000),
        ];
        let mut bot = bot(cached.clone(), cached, &[]);
        bot.prepare().await.unwrap();

        // no new block
        assert!(bot.tick(0).await.unwrap().is_none());
        assert!(bot.ledger.ranges.lock().unwrap().is_empty());

        *bot.ledger.block.lock().unwrap() = 103;
        assert!(bot.tick(0).await.unwrap().is_none());
        *bot.ledger.block.lock().unwrap() = 104;
        assert!(bot.tick(0).await.unwrap().is_none());

        assert_eq!(*bot.ledger.ranges.lock().unwrap(), vec![(101, 103), (104, 104)]);
    }

    #[tokio::test]
    async fn test_tick_refreshes_touched_pools() {
        let cached = vec![
            pool("P1", "USD", "A", 5_000, 5_000),
            pool("P2", "A", "B", 5_000, 5_000),
            pool("P3", "B", "USD", 5_000, 5_000),
        ];
        let mut bot = bot(cached.clone(), cached, &[]);
        bot.prepare().await.unwrap();

        bot.ledger.touched = [pool_id("P2"), pool_id("Z9")].into_iter().collect();
        bot.ledger.state.insert(pool_id("P2"), pool("P2", "A", "B", 5_000, 6_000));
        *bot.ledger.block.lock().unwrap() = 101;

        // the cycle is found but its dry run reverts
        assert!(bot.tick(0).await.unwrap().is_none());

        let updated = bot.pools().iter().find(|pool| pool.id == pool_id("P2")).unwrap();
        assert_eq!(updated.reserve_of(token("B")).unwrap(), U256::from(6_000));
        assert_eq!(bot.pipeline().history().len(), 1);
    }

    #[test]
    fn test_pause_after() {
        assert_eq!(pause_after(Duration::from_secs(2)), Duration::from_secs(10));
        assert_eq!(pause_after(Duration::from_millis(11_500)), Duration::from_secs(1));
        assert_eq!(pause_after(Duration::from_secs(30)), Duration::from_secs(1));
    }
}
