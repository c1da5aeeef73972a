/// Concentrated liquidity pool, priced at its current square root price.
///
/// Swaps are modeled at a constant price inside the active tick range:
/// no tick crossing is simulated, and a swap whose output would exceed what
/// the active range holds is rejected instead.
use alloy::primitives::U256;
use eyre::{bail, Result};
use log::debug;

use super::{Curve, Direction};
use crate::arb::math::{
    amount0_for_liquidity, amount1_for_liquidity, mul_div, price_from_sqrt, sqrt_ratio_at_tick,
    E18, FEE_DENOMINATOR,
};

/// Slot and liquidity state of a concentrated liquidity pool
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Concentrated {
    /// Current square root price, Q64.96
    pub sqrt_price_x96: U256,
    /// Active liquidity
    pub liquidity: u128,
    /// Current tick
    pub tick: i32,
    /// Distance between initializable ticks
    pub tick_spacing: i32,
    /// Swap fee in millionths
    pub fee: u32,
    /// Gross liquidity referencing the lower tick of the active range
    pub liquidity_gross: u128,
    /// Price of token0 in token1, 18 decimals
    price: U256,
    /// token0 held by the active range
    reserve0: U256,
    /// token1 held by the active range
    reserve1: U256,
}

impl Concentrated {
    /// Builds the state and derives the active range reserves.
    /// A state whose reserves can not be derived ends up with zero reserves
    /// and is therefore not tradable.
    #[must_use]
    pub fn new(
        sqrt_price_x96: U256,
        liquidity: u128,
        tick: i32,
        tick_spacing: i32,
        fee: u32,
        liquidity_gross: u128,
    ) -> Self {
        let mut state = Self {
            sqrt_price_x96,
            liquidity,
            tick,
            tick_spacing,
            fee,
            liquidity_gross,
            price: U256::ZERO,
            reserve0: U256::ZERO,
            reserve1: U256::ZERO,
        };
        match state.derive() {
            Ok((price, reserve0, reserve1)) => {
                state.price = price;
                state.reserve0 = reserve0;
                state.reserve1 = reserve1;
            }
            Err(e) => debug!("pool::concentrated: can not derive reserves: {e}"),
        }
        state
    }

    /// Bounds of the active tick range `[lower, lower + spacing)`
    ///
    /// # Errors
    /// * Non-positive tick spacing
    pub fn active_range(&self) -> Result<(i32, i32)> {
        if self.tick_spacing <= 0 {
            bail!("Invalid tick spacing {}", self.tick_spacing);
        }
        let lower = self.tick.div_euclid(self.tick_spacing) * self.tick_spacing;
        Ok((lower, lower + self.tick_spacing))
    }

    fn derive(&self) -> Result<(U256, U256, U256)> {
        let price = price_from_sqrt(self.sqrt_price_x96)?;
        let (lower, upper) = self.active_range()?;
        let sqrt_lower = sqrt_ratio_at_tick(lower)?;
        let sqrt_upper = sqrt_ratio_at_tick(upper)?;
        let sqrt_price = self.sqrt_price_x96.clamp(sqrt_lower, sqrt_upper);

        let reserve0 = amount0_for_liquidity(sqrt_price, sqrt_upper, self.liquidity)?;
        let reserve1 = amount1_for_liquidity(sqrt_lower, sqrt_price, self.liquidity)?;
        Ok((price, reserve0, reserve1))
    }

    /// Price of token0 in token1 with 18 decimals
    #[must_use]
    pub const fn price(&self) -> U256 {
        self.price
    }

    fn quote(&self, direction: Direction, amount: U256) -> Result<U256> {
        if self.price.is_zero() {
            bail!("Zero price");
        }
        match direction {
            Direction::ZeroForOne => mul_div(amount, self.price, U256::from(E18)),
            Direction::OneForZero => mul_div(amount, U256::from(E18), self.price),
        }
    }
}

impl Curve for Concentrated {
    fn is_tradable(&self) -> bool {
        !self.sqrt_price_x96.is_zero()
            && self.liquidity > 0
            && !self.price.is_zero()
            && !self.reserve0.is_zero()
            && !self.reserve1.is_zero()
            && self.liquidity_gross != self.liquidity
    }

    fn reserves(&self) -> (U256, U256) {
        (self.reserve0, self.reserve1)
    }

    fn convert(&self, direction: Direction, amount: U256) -> Result<U256> {
        self.quote(direction, amount)
    }

    fn swap(&self, direction: Direction, amount_in: U256) -> Result<U256> {
        if u64::from(self.fee) >= FEE_DENOMINATOR {
            bail!("Invalid fee {}", self.fee);
        }
        let after_fee = mul_div(
            amount_in,
            U256::from(FEE_DENOMINATOR - u64::from(self.fee)),
            U256::from(FEE_DENOMINATOR),
        )?;
        let amount_out = self.quote(direction, after_fee)?;

        let available = match direction {
            Direction::ZeroForOne => self.reserve1,
            Direction::OneForZero => self.reserve0,
        };
        if amount_out > available {
            bail!("Swap exceeds the active tick range");
        }
        Ok(amount_out)
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

#[cfg(test)]
mod tests {
    use super::*;

    /// Price 1, tick 0, spacing 60, fee 0.3%
    fn at_par(liquidity: u128) -> Concentrated {
        Concentrated::new(U256::from(1) << 96, liquidity, 0, 60, 3000, 0)
    }

    #[test]
    fn test_active_range() {
        let mut state = at_par(1);
        assert_eq!(state.active_range().unwrap(), (0, 60));
        state.tick = -1;
        assert_eq!(state.active_range().unwrap(), (-60, 0));
        state.tick = 125;
        assert_eq!(state.active_range().unwrap(), (120, 180));
        state.tick_spacing = 0;
        assert!(state.active_range().is_err());
    }

    #[test]
    fn test_reserves_at_lower_bound() {
        // At the lower bound of the range everything is held in token0
        let state = at_par(1_000_000_000_000);
        let (reserve0, reserve1) = state.reserves();
        assert!(reserve0 > U256::ZERO);
        assert_eq!(reserve1, U256::ZERO);
        assert!(!state.is_tradable());
    }

    #[test]
    fn test_swap_at_constant_price() {
        // Price 4 (sqrt 2), tick 13863 is just below ln(4)/ln(1.0001)
        let state = Concentrated::new(U256::from(2) << 96, 10_u128.pow(24), 13_863, 60, 3000, 0);
        assert!(state.is_tradable());
        assert_eq!(state.price(), U256::from(4 * E18));

        // 1000 * 0.997 * 4
        assert_eq!(
            state.swap(Direction::ZeroForOne, U256::from(1000)).unwrap(),
            U256::from(3988)
        );
        // 1000 * 0.997 / 4
        assert_eq!(
            state.swap(Direction::OneForZero, U256::from(1000)).unwrap(),
            U256::from(249)
        );
        // convert has no fee
        assert_eq!(
            state.convert(Direction::ZeroForOne, U256::from(1000)).unwrap(),
            U256::from(4000)
        );
    }

    #[test]
    fn test_swap_beyond_active_range() {
        let state = Concentrated::new(U256::from(2) << 96, 10_u128.pow(24), 13_863, 60, 3000, 0);
        let (_, reserve1) = state.reserves();
        let too_much = reserve1 / U256::from(2);
        assert_eq!(
            state
                .swap(Direction::ZeroForOne, too_much)
                .unwrap_err()
                .to_string(),
            "Swap exceeds the active tick range"
        );
    }

    #[test]
    fn test_not_concentrated_at_tick() {
        let liquidity = 10_u128.pow(24);
        let state = Concentrated::new(U256::from(2) << 96, liquidity, 13_863, 60, 3000, liquidity);
        assert!(!state.is_tradable());
    }

    #[test]
    fn test_zero_price() {
        let state = Concentrated::new(U256::ZERO, 10, 0, 60, 3000, 0);
        assert!(!state.is_tradable());
        assert!(state.swap(Direction::OneForZero, U256::from(10)).is_err());
    }
}
