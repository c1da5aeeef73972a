//! Liquidity graph: which pools are deep enough to trade through, measured
//! against a minimum amount of an anchor token propagated through prices.

use std::collections::{HashMap, HashSet};

use alloy::primitives::U256;
use log::debug;

use super::pool::{Pool, PoolId};
use super::token::TokenId;

/// How many hops away from the anchor the minimum amount is propagated
pub const LIQUIDITY_DEPTH: usize = 3;

/// A pool annotated with the minimum reserves it needs on each side to count as liquid
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LiquidityInfo {
    /// The pool
    pub pool: Pool,
    /// Minimum reserve of token0
    pub min_amount0: U256,
    /// Minimum reserve of token1
    pub min_amount1: U256,
}

impl LiquidityInfo {
    /// Minimum recorded for `token`, if the pool trades it
    #[must_use]
    pub fn min_amount_of(&self, token: TokenId) -> Option<U256> {
        if token == self.pool.token0 {
            Some(self.min_amount0)
        } else if token == self.pool.token1 {
            Some(self.min_amount1)
        } else {
            None
        }
    }
}

/// Groups item indexes by every token the item trades
pub fn index_by_token<'a>(pools: impl Iterator<Item = &'a Pool>) -> HashMap<TokenId, Vec<usize>> {
    let mut map: HashMap<TokenId, Vec<usize>> = HashMap::new();
    for (index, pool) in pools.enumerate() {
        map.entry(pool.token0).or_default().push(index);
        map.entry(pool.token1).or_default().push(index);
    }
    map
}

/// Pools reachable from `anchor` whose reserves hold at least the equivalent
/// of `min_anchor_amount`, converted hop by hop at pool prices.
///
/// Each pool is considered once, from the first token it is reached through.
/// Non-tradable pools are dropped up front and conversion failures only prune
/// the pool they happen on.
#[must_use]
pub fn find_liquid_pairs(pools: &[Pool], anchor: TokenId, min_anchor_amount: U256) -> Vec<LiquidityInfo> {
    let tradable: Vec<&Pool> = pools.iter().filter(|pool| pool.is_tradable()).collect();
    let by_token = index_by_token(tradable.iter().copied());

    let mut output = Vec::new();
    let mut visited = HashSet::new();
    propagate(
        &mut output,
        &mut visited,
        &tradable,
        &by_token,
        anchor,
        min_anchor_amount,
        LIQUIDITY_DEPTH,
    );
    output
}

fn propagate(
    output: &mut Vec<LiquidityInfo>,
    visited: &mut HashSet<PoolId>,
    pools: &[&Pool],
    by_token: &HashMap<TokenId, Vec<usize>>,
    token: TokenId,
    min_amount: U256,
    depth: usize,
) {
    let Some(indexes) = by_token.get(&token) else {
        return;
    };

    let mut next_layer = Vec::new();

    for &index in indexes {
        let pool = pools[index];
        if !visited.insert(pool.id) {
            continue;
        }

        match pool.reserve_of(token) {
            Ok(reserve) if reserve >= min_amount => {}
            _ => continue,
        }

        let other_min_amount = match pool.convert(token, min_amount) {
            Ok(amount) => amount,
            Err(e) => {
                debug!("liquidity: skipping {:?}: {e}", pool.id);
                continue;
            }
        };
        let other = pool.other(token);

        match pool.reserve_of(other) {
            Ok(reserve) if reserve >= other_min_amount => {}
            _ => continue,
        }

        let (min_amount0, min_amount1) = if pool.token0 == token {
            (min_amount, other_min_amount)
        } else {
            (other_min_amount, min_amount)
        };
        output.push(LiquidityInfo {
            pool: *pool,
            min_amount0,
            min_amount1,
        });

        if depth > 0 {
            next_layer.push((other, other_min_amount));
        }
    }

    for (token, min_amount) in next_layer {
        propagate(output, visited, pools, by_token, token, min_amount, depth - 1);
    }
}
