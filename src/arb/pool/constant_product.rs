/// x*y=k pool with a 0.3% fee folded into the input amount
use alloy::primitives::U256;
use eyre::{bail, Result};

use super::{Curve, Direction};
use crate::arb::math::mul_div;

/// Fee multiplier numerator, the input is credited at 997/1000
const FEE_NUMERATOR: u64 = 997;
/// Fee multiplier denominator
const FEE_DENOMINATOR: u64 = 1000;

/// Reserves of a constant product pool
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConstantProduct {
    /// Reserve of token0
    pub reserve0: U256,
    /// Reserve of token1
    pub reserve1: U256,
}

impl ConstantProduct {
    /// New pool state from raw reserves
    #[must_use]
    pub const fn new(reserve0: U256, reserve1: U256) -> Self {
        Self { reserve0, reserve1 }
    }

    const fn oriented(&self, direction: Direction) -> (U256, U256) {
        match direction {
            Direction::ZeroForOne => (self.reserve0, self.reserve1),
            Direction::OneForZero => (self.reserve1, self.reserve0),
        }
    }
}

impl Curve for ConstantProduct {
    fn is_tradable(&self) -> bool {
        !self.reserve0.is_zero() && !self.reserve1.is_zero()
    }

    fn reserves(&self) -> (U256, U256) {
        (self.reserve0, self.reserve1)
    }

    fn convert(&self, direction: Direction, amount: U256) -> Result<U256> {
        let (reserve_in, reserve_out) = self.oriented(direction);
        if reserve_in.is_zero() {
            bail!("Zero reserve");
        }
        mul_div(amount, reserve_out, reserve_in)
    }

    fn swap(&self, direction: Direction, amount_in: U256) -> Result<U256> {
        if !self.is_tradable() {
            bail!("Zero reserve");
        }
        let (reserve_in, reserve_out) = self.oriented(direction);

        let Some(amount_with_fee) = amount_in.checked_mul(U256::from(FEE_NUMERATOR)) else {
            bail!("Overflow: amount in too large");
        };
        let Some(denominator) = reserve_in
            .checked_mul(U256::from(FEE_DENOMINATOR))
            .and_then(|scaled| scaled.checked_add(amount_with_fee))
        else {
            bail!("Overflow: reserve too large");
        };
        mul_div(amount_with_fee, reserve_out, denominator)
    }

    fn apply(&mut self, direction: Direction, amount_in: U256, amount_out: U256) -> Result<()> {
        let (reserve_in, reserve_out) = match direction {
            Direction::ZeroForOne => (&mut self.reserve0, &mut self.reserve1),
            Direction::OneForZero => (&mut self.reserve1, &mut self.reserve0),
        };
        let (Some(new_in), Some(new_out)) = (
            reserve_in.checked_add(amount_in),
            reserve_out.checked_sub(amount_out),
        ) else {
            bail!("Swap does not fit the reserves");
        };
        *reserve_in = new_in;
        *reserve_out = new_out;
        Ok(())
    }
}
