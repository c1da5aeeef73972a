use alloy::primitives::{keccak256, Address, U256};

use super::circular::CircularArbitrager;
use super::cycle::{Cycle, PathArena, PathNode, PoolRef};
use super::liquidity::LiquidityInfo;
use super::pool::{Concentrated, Pool, PoolId};
use super::token::TokenId;

fn address(name: &str) -> Address {
    Address::from_word(keccak256(name.as_bytes()))
}

#[allow(dead_code)]
pub fn token(name: &str) -> TokenId {
    TokenId(address(name))
}

#[allow(dead_code)]
pub fn pool_id(name: &str) -> PoolId {
    PoolId(address(name))
}

#[allow(dead_code)]
pub fn router(name: &str) -> Address {
    address(name)
}

#[allow(dead_code)]
pub fn pool(id: &str, token0: &str, token1: &str, reserve0: u64, reserve1: u64) -> Pool {
    Pool::constant_product(
        pool_id(id),
        token(token0),
        token(token1),
        router("V2Router"),
        U256::from(reserve0),
        U256::from(reserve1),
    )
}

/// Price 4 token1 per token0, deep enough for small test amounts
#[allow(dead_code)]
pub fn concentrated_pool(id: &str, token0: &str, token1: &str, fee: u32) -> Pool {
    Pool::concentrated(
        pool_id(id),
        token(token0),
        token(token1),
        router("V3Router"),
        Concentrated::new(U256::from(2) << 96, 10_u128.pow(24), 13_863, 60, fee, 0),
    )
}

#[allow(dead_code)]
pub fn arbitrager(pools: &[(&str, &str, &str, u64, u64)]) -> CircularArbitrager {
    arbitrager_with_minimums(pools, 0)
}

#[allow(dead_code)]
pub fn arbitrager_with_minimums(pools: &[(&str, &str, &str, u64, u64)], min_amount: u64) -> CircularArbitrager {
    let graph = pools
        .iter()
        .map(|(id, token0, token1, reserve0, reserve1)| LiquidityInfo {
            pool: pool(id, token0, token1, *reserve0, *reserve1),
            min_amount0: U256::from(min_amount),
            min_amount1: U256::from(min_amount),
        })
        .collect();
    CircularArbitrager::new(graph)
}

/// Random pools between tokens `T0`..`T{token_count - 1}`
#[allow(dead_code)]
pub fn random_arbitrager(token_count: usize, pool_count: usize) -> CircularArbitrager {
    let graph = (0..pool_count)
        .map(|i| {
            let first = fastrand::usize(0..token_count);
            let second = (first + fastrand::usize(1..token_count)) % token_count;
            LiquidityInfo {
                pool: pool(
                    &format!("P{i}"),
                    &format!("T{first}"),
                    &format!("T{second}"),
                    fastrand::u64(1000..1_000_000),
                    fastrand::u64(1000..1_000_000),
                ),
                min_amount0: U256::ZERO,
                min_amount1: U256::ZERO,
            }
        })
        .collect();
    CircularArbitrager::new(graph)
}

/// A cycle through the given pools with made up amounts: `(pool, token reached, amount)`
#[allow(dead_code)]
pub fn cycle(start: &str, input: u64, steps: &[(usize, &str, &str, u64)]) -> Cycle {
    let mut arena = PathArena::new();
    let mut current = arena.push(PathNode {
        previous: None,
        pool: None,
        token: token(start),
        amount: U256::from(input),
        depth: 0,
    });
    for (depth, (index, id, reached, amount)) in steps.iter().enumerate() {
        current = arena.push(PathNode {
            previous: Some(current),
            pool: Some(PoolRef {
                index: *index,
                id: pool_id(id),
            }),
            token: token(reached),
            amount: U256::from(*amount),
            depth: depth + 1,
        });
    }
    arena.resolve(current)
}
