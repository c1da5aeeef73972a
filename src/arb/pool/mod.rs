//! Pools: the two tokens they trade, the router used to trade through them,
//! and the curve that prices a swap.

/// Concentrated liquidity curve
pub mod concentrated;
/// Constant product curve
pub mod constant_product;

use std::fmt::{self, Debug, Display};

use alloy::primitives::{Address, U256};
use derive_more::derive::Display;
use eyre::{bail, Result};
use serde::{Deserialize, Serialize};

use super::token::TokenId;
pub use concentrated::Concentrated;
pub use constant_product::ConstantProduct;

/// A pool is identified by its contract address
#[derive(Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Display, Serialize, Deserialize)]
#[display("{_0}")]
pub struct PoolId(pub Address);

impl Debug for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Address> for PoolId {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

/// The direction of a swap in a pool.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Direction {
    /// token0 in, token1 out
    ZeroForOne,
    /// token1 in, token0 out
    OneForZero,
}

impl Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Debug for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroForOne => write!(f, "0>1"),
            Self::OneForZero => write!(f, "1>0"),
        }
    }
}

/// The exchange families we know how to price and trade
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display, Serialize, Deserialize)]
pub enum ExchangeKind {
    /// Uniswap V2 style x*y=k pairs
    #[display("constant-product")]
    ConstantProduct,
    /// Uniswap V3 style tick based pools
    #[display("concentrated-liquidity")]
    ConcentratedLiquidity,
}

/// Pricing behaviour shared by every curve.
pub trait Curve {
    /// Whether every reserve, liquidity and price term is usable
    fn is_tradable(&self) -> bool;

    /// Reserves of token0 and token1 available to swaps
    fn reserves(&self) -> (U256, U256);

    /// Value of `amount` on the other side at the current price, no fee.
    ///
    /// # Errors
    /// * Degenerate price or overflow
    fn convert(&self, direction: Direction, amount: U256) -> Result<U256>;

    /// Output of swapping `amount_in`, rounded down like the contract.
    ///
    /// # Errors
    /// * Degenerate reserves or overflow
    fn swap(&self, direction: Direction, amount_in: U256) -> Result<U256>;

    /// Books a swap into the state.
    ///
    /// # Errors
    /// * The swap does not fit the reserves
    fn apply(&mut self, direction: Direction, amount_in: U256, amount_out: U256) -> Result<()>;
}

/// Curve of a pool. A new exchange family is a new variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Amm {
    /// x*y=k with a 0.3% fee
    ConstantProduct(ConstantProduct),
    /// Price and liquidity over the active tick range
    ConcentratedLiquidity(Concentrated),
}

impl Amm {
    fn curve(&self) -> &dyn Curve {
        match self {
            Self::ConstantProduct(state) => state,
            Self::ConcentratedLiquidity(state) => state,
        }
    }

    fn curve_mut(&mut self) -> &mut dyn Curve {
        match self {
            Self::ConstantProduct(state) => state,
            Self::ConcentratedLiquidity(state) => state,
        }
    }
}

/// Saved mutable state of a pool, see [`Pool::snapshot`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolSnapshot(Amm);

/// A tradable pair of tokens
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Pool {
    /// Pool contract
    pub id: PoolId,
    /// Lower sorted token
    pub token0: TokenId,
    /// Higher sorted token
    pub token1: TokenId,
    /// Router of the exchange the pool belongs to
    pub router: Address,
    /// Pricing state
    pub amm: Amm,
}

impl Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (reserve0, reserve1) = self.amm.curve().reserves();
        write!(
            f,
            "Pool({:?}, {} {:?} / {} {:?}, {})",
            self.id,
            reserve0,
            self.token0,
            reserve1,
            self.token1,
            self.kind()
        )
    }
}

impl Pool {
    /// New constant product pool
    #[must_use]
    pub const fn constant_product(
        id: PoolId,
        token0: TokenId,
        token1: TokenId,
        router: Address,
        reserve0: U256,
        reserve1: U256,
    ) -> Self {
        Self {
            id,
            token0,
            token1,
            router,
            amm: Amm::ConstantProduct(ConstantProduct::new(reserve0, reserve1)),
        }
    }

    /// New concentrated liquidity pool
    #[must_use]
    pub const fn concentrated(
        id: PoolId,
        token0: TokenId,
        token1: TokenId,
        router: Address,
        state: Concentrated,
    ) -> Self {
        Self {
            id,
            token0,
            token1,
            router,
            amm: Amm::ConcentratedLiquidity(state),
        }
    }

    /// Exchange family of the pool
    #[must_use]
    pub const fn kind(&self) -> ExchangeKind {
        match self.amm {
            Amm::ConstantProduct(_) => ExchangeKind::ConstantProduct,
            Amm::ConcentratedLiquidity(_) => ExchangeKind::ConcentratedLiquidity,
        }
    }

    /// Swap fee in millionths
    #[must_use]
    pub const fn fee(&self) -> u32 {
        match self.amm {
            Amm::ConstantProduct(_) => 3000,
            Amm::ConcentratedLiquidity(state) => state.fee,
        }
    }

    /// Whether the pool trades `token`
    #[must_use]
    pub fn has(&self, token: TokenId) -> bool {
        self.token0 == token || self.token1 == token
    }

    /// The token on the other side of `token`
    #[must_use]
    pub fn other(&self, token: TokenId) -> TokenId {
        if token == self.token0 {
            self.token1
        } else {
            self.token0
        }
    }

    /// Direction of a swap that takes `token_in`
    ///
    /// # Errors
    /// * `token_in` is not traded by the pool
    pub fn direction(&self, token_in: TokenId) -> Result<Direction> {
        if token_in == self.token0 {
            Ok(Direction::ZeroForOne)
        } else if token_in == self.token1 {
            Ok(Direction::OneForZero)
        } else {
            bail!("Invalid token {token_in} for pool {}", self.id)
        }
    }

    /// Whether the pool can be traded through
    #[must_use]
    pub fn is_tradable(&self) -> bool {
        self.amm.curve().is_tradable()
    }

    /// Reserve of `token`
    ///
    /// # Errors
    /// * `token` is not traded by the pool
    pub fn reserve_of(&self, token: TokenId) -> Result<U256> {
        let (reserve0, reserve1) = self.amm.curve().reserves();
        match self.direction(token)? {
            Direction::ZeroForOne => Ok(reserve0),
            Direction::OneForZero => Ok(reserve1),
        }
    }

    /// Value of `amount` of `token` in the other token at the current price, no fee
    ///
    /// # Errors
    /// * Unknown token, degenerate price or overflow
    pub fn convert(&self, token: TokenId, amount: U256) -> Result<U256> {
        self.amm.curve().convert(self.direction(token)?, amount)
    }

    /// Output of swapping `amount` of `token` through the pool
    ///
    /// # Errors
    /// * Unknown token, degenerate reserves or overflow
    pub fn swap(&self, token: TokenId, amount: U256) -> Result<U256> {
        self.amm.curve().swap(self.direction(token)?, amount)
    }

    /// Swaps and books the trade into the pool state
    ///
    /// # Errors
    /// * Unknown token, degenerate reserves or overflow
    pub fn swap_updating(&mut self, token: TokenId, amount: U256) -> Result<U256> {
        let direction = self.direction(token)?;
        let amount_out = self.amm.curve().swap(direction, amount)?;
        self.amm.curve_mut().apply(direction, amount, amount_out)?;
        Ok(amount_out)
    }

    /// Copy of the mutable state
    #[must_use]
    pub const fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot(self.amm)
    }

    /// Puts back a state taken with [`Pool::snapshot`]
    pub fn restore(&mut self, snapshot: PoolSnapshot) {
        self.amm = snapshot.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arb::test_helpers::*;

    #[test]
    fn test_direction_and_other() {
        let pool = pool("P1", "A", "B", 100, 200);
        assert_eq!(pool.direction(token("A")).unwrap(), Direction::ZeroForOne);
        assert_eq!(pool.direction(token("B")).unwrap(), Direction::OneForZero);
        assert!(pool.direction(token("C")).is_err());
        assert_eq!(pool.other(token("A")), token("B"));
        assert_eq!(pool.other(token("B")), token("A"));
    }

    #[test]
    fn test_reserve_of() {
        let pool = pool("P1", "A", "B", 100, 200);
        assert_eq!(pool.reserve_of(token("A")).unwrap(), U256::from(100));
        assert_eq!(pool.reserve_of(token("B")).unwrap(), U256::from(200));
        assert!(pool.reserve_of(token("C")).is_err());
    }

    #[test]
    fn test_snapshot_restore() {
        let mut pool = pool("P1", "A", "B", 1000, 2000);
        let snapshot = pool.snapshot();

        let first = pool.swap_updating(token("A"), U256::from(100)).unwrap();
        let second = pool.swap_updating(token("A"), U256::from(100)).unwrap();
        assert_eq!(first, U256::from(181));
        // reserves moved, so the same input buys less
        assert!(second < first);

        pool.restore(snapshot);
        assert_eq!(pool.reserve_of(token("A")).unwrap(), U256::from(1000));
        assert_eq!(pool.swap(token("A"), U256::from(100)).unwrap(), first);
    }

    #[test]
    fn test_fee() {
        assert_eq!(pool("P1", "A", "B", 1, 1).fee(), 3000);
        assert_eq!(pool("P1", "A", "B", 1, 1).kind(), ExchangeKind::ConstantProduct);
    }
}
