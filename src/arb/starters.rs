//! Tokens a cycle may start from: those we can borrow through a flash loan.

use alloy::primitives::U256;
use log::info;

use super::liquidity::find_liquid_pairs;
use super::pool::{ExchangeKind, Pool, PoolId};
use super::token::TokenId;

/// A token that can open a cycle, with the pool its flash loan is drawn from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StartToken {
    /// The borrowed token
    pub address: TokenId,
    /// Pool issuing the flash loan
    pub flash_pool: PoolId,
    /// Whether the token is token0 of `flash_pool`
    pub is_token0: bool,
    /// Flash loan fee of `flash_pool`, millionths
    pub fee: u32,
}

/// Both tokens of every concentrated liquidity pool that is liquid at
/// `min_anchor_amount`. A token reachable through several pools keeps the
/// cheapest one.
#[must_use]
pub fn get_starters(pools: &[Pool], anchor: TokenId, min_anchor_amount: U256) -> Vec<StartToken> {
    let lenders: Vec<Pool> = pools
        .iter()
        .filter(|pool| pool.kind() == ExchangeKind::ConcentratedLiquidity)
        .copied()
        .collect();

    let mut starters: Vec<StartToken> = Vec::new();
    let mut add = |pool: &Pool, token: TokenId, is_token0: bool| {
        let candidate = StartToken {
            address: token,
            flash_pool: pool.id,
            is_token0,
            fee: pool.fee(),
        };
        match starters.iter_mut().find(|starter| starter.address == token) {
            Some(existing) if existing.fee > candidate.fee => *existing = candidate,
            Some(_) => {}
            None => starters.push(candidate),
        }
    };

    for info in find_liquid_pairs(&lenders, anchor, min_anchor_amount) {
        add(&info.pool, info.pool.token0, true);
        add(&info.pool, info.pool.token1, false);
    }

    info!("starters: found {} start tokens", starters.len());
    starters
}
