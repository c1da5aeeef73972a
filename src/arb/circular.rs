//! Breadth first search for cycles through the liquidity graph.
//!
//! Exhaustive path enumeration explodes quickly, so the search keeps, per
//! token, the best amount ever reached there and drops any arrival that is
//! strictly worse. Only the surviving arrivals are expanded further.

use std::collections::{HashMap, VecDeque};

use alloy::primitives::U256;
use log::debug;

use super::cycle::{Cycle, PathArena, PathNode, PoolRef};
use super::liquidity::{index_by_token, LiquidityInfo};
use super::math::calculate_fee;
use super::pool::Pool;
use super::starters::StartToken;
use super::token::TokenId;

/// Maximum number of swaps in a cycle
pub const MAX_DEPTH: usize = 8;

/// The start amount is this fraction of the starter's minimum liquidity
pub const START_FRACTION: u64 = 10;

/// Finds cycles in a liquidity graph and owns that graph for the iteration
#[derive(Debug, Clone)]
pub struct CircularArbitrager {
    /// Liquid pools, the search graph
    pub(super) graph: Vec<LiquidityInfo>,
    /// Graph positions by token
    pub(super) by_token: HashMap<TokenId, Vec<usize>>,
}

impl CircularArbitrager {
    /// Builds the search graph
    #[must_use]
    pub fn new(graph: Vec<LiquidityInfo>) -> Self {
        let by_token = index_by_token(graph.iter().map(|info| &info.pool));
        Self { graph, by_token }
    }

    /// The liquid pools
    #[must_use]
    pub fn graph(&self) -> &[LiquidityInfo] {
        &self.graph
    }

    /// The pool at a graph position
    #[must_use]
    pub fn pool(&self, index: usize) -> &Pool {
        &self.graph[index].pool
    }

    /// Smallest amount of `token` recorded as liquid, taken from the first
    /// pool that holds it as token0, else as token1
    #[must_use]
    pub fn min_liquidity_of(&self, token: TokenId) -> Option<U256> {
        self.graph
            .iter()
            .find(|info| info.pool.token0 == token)
            .map(|info| info.min_amount0)
            .or_else(|| {
                self.graph
                    .iter()
                    .find(|info| info.pool.token1 == token)
                    .map(|info| info.min_amount1)
            })
    }

    /// Cycles for every starter whose output beats the input plus the loan fee
    #[must_use]
    pub fn find(&self, starters: &[StartToken]) -> Vec<Cycle> {
        let mut cycles = Vec::new();

        for starter in starters {
            let Some(indexes) = self.by_token.get(&starter.address) else {
                continue;
            };
            if indexes.len() <= 1 {
                continue;
            }

            let Some(min_amount) = self.graph[indexes[0]].min_amount_of(starter.address) else {
                continue;
            };
            let amount = min_amount / U256::from(START_FRACTION);
            if amount.is_zero() {
                continue;
            }
            let Ok(fee) = calculate_fee(amount, starter.fee) else {
                continue;
            };

            let found = self.find_for_token(starter.address, amount, MAX_DEPTH);
            debug!(
                "circular::find: {} cycles for {} starting with {amount}",
                found.len(),
                starter.address
            );
            cycles.extend(
                found
                    .into_iter()
                    .filter(|cycle| cycle.output().saturating_sub(fee) > amount),
            );
        }

        cycles
    }

    /// Every cycle from `token` back to `token` with at most `max_depth` swaps
    /// that survives dominance pruning.
    #[must_use]
    pub fn find_for_token(&self, token: TokenId, amount: U256, max_depth: usize) -> Vec<Cycle> {
        let mut arena = PathArena::new();
        let root = arena.push(PathNode {
            previous: None,
            pool: None,
            token,
            amount,
            depth: 0,
        });

        let mut queue = VecDeque::from([root]);
        let mut best: HashMap<TokenId, U256> = HashMap::from([(token, amount)]);
        let mut found = Vec::new();

        while let Some(id) = queue.pop_front() {
            let node = *arena.get(id);
            let Some(indexes) = self.by_token.get(&node.token) else {
                continue;
            };

            for &index in indexes {
                let pool = &self.graph[index].pool;
                if !pool.is_tradable() {
                    continue;
                }
                let other = pool.other(node.token);

                let amount_out = match pool.swap(node.token, node.amount) {
                    Ok(amount_out) if !amount_out.is_zero() => amount_out,
                    _ => continue,
                };

                if let Some(best_amount) = best.get(&other) {
                    if amount_out < *best_amount {
                        continue;
                    }
                }
                best.insert(other, amount_out);

                let next = PathNode {
                    previous: Some(id),
                    pool: Some(PoolRef { index, id: pool.id }),
                    token: other,
                    amount: amount_out,
                    depth: node.depth + 1,
                };

                if other == token {
                    let end = arena.push(next);
                    found.push(arena.resolve(end));
                } else if node.depth + 1 < max_depth {
                    queue.push_back(arena.push(next));
                }
            }
        }

        found
    }
}
