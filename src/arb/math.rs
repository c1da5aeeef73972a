//! Integer helpers shared by the pool models and the transaction assembler.
//!
//! Everything here works on `U256` values with 512-bit intermediates so that
//! the results match what the contracts compute on chain, to the unit.

use alloy::primitives::{ruint::UintTryFrom, U256, U512};
use eyre::{bail, eyre, Result};

/// Lowest tick supported by concentrated liquidity pools
pub const MIN_TICK: i32 = -887_272;
/// Highest tick supported by concentrated liquidity pools
pub const MAX_TICK: i32 = 887_272;

/// Fees of concentrated liquidity pools are expressed in millionths
pub const FEE_DENOMINATOR: u64 = 1_000_000;

/// 18-decimal fixed point unit
pub const E18: u64 = 1_000_000_000_000_000_000;

fn narrow(value: U512) -> Result<U256> {
    U256::uint_try_from(value).map_err(|_| eyre!("Overflow: result does not fit in 256 bits"))
}

/// `floor(a * b / denominator)` without intermediate overflow.
///
/// # Errors
/// * Division by zero
/// * Result larger than `U256::MAX`
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Result<U256> {
    if denominator.is_zero() {
        bail!("Division by zero");
    }
    narrow(U512::from(a) * U512::from(b) / U512::from(denominator))
}

/// `ceil(a * b / denominator)` without intermediate overflow.
///
/// # Errors
/// * Division by zero
/// * Result larger than `U256::MAX`
pub fn mul_div_rounding_up(a: U256, b: U256, denominator: U256) -> Result<U256> {
    if denominator.is_zero() {
        bail!("Division by zero");
    }
    let product = U512::from(a) * U512::from(b);
    let denominator = U512::from(denominator);
    let mut result = product / denominator;
    if !(product % denominator).is_zero() {
        result += U512::from(1);
    }
    narrow(result)
}

/// Fee owed on a flash loan of `amount` at `fee` millionths, always rounded up
/// so the loan is never under-repaid.
///
/// # Errors
/// * Result larger than `U256::MAX`
pub fn calculate_fee(amount: U256, fee: u32) -> Result<U256> {
    mul_div_rounding_up(amount, U256::from(fee), U256::from(FEE_DENOMINATOR))
}

/// Price of token0 in token1 as an 18-decimal fixed point number,
/// `sqrt_price_x96^2 * 1e18 / 2^192`.
///
/// # Errors
/// * Result larger than `U256::MAX`
pub fn price_from_sqrt(sqrt_price_x96: U256) -> Result<U256> {
    let squared = U512::from(sqrt_price_x96) * U512::from(sqrt_price_x96);
    narrow((squared * U512::from(E18)) >> 192)
}

/// `(val * mul_by) >> 128`, both operands are below 2^129 so the product fits.
fn mul_shift(val: U256, mul_by: u128) -> U256 {
    (val * U256::from(mul_by)) >> 128
}

/// Square root price (Q64.96) at the given tick, rounded up like the pool contract.
///
/// # Errors
/// * Tick outside of `[MIN_TICK, MAX_TICK]`
pub fn sqrt_ratio_at_tick(tick: i32) -> Result<U256> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        bail!("Tick {tick} out of range");
    }
    let abs_tick = tick.unsigned_abs();

    let mut ratio = if abs_tick & 0x1 == 0 {
        U256::from(1) << 128
    } else {
        U256::from(0xfffc_b933_bd6f_ad37_aa2d_162d_1a59_4001_u128)
    };

    let factors: [(u32, u128); 19] = [
        (0x2, 0xfff9_7272_373d_4132_59a4_6990_580e_213a),
        (0x4, 0xfff2_e50f_5f65_6932_ef12_357c_f3c7_fdcc),
        (0x8, 0xffe5_caca_7e10_e4e6_1c36_24ea_a094_1cd0),
        (0x10, 0xffcb_9843_d60f_6159_c9db_5883_5c92_6644),
        (0x20, 0xff97_3b41_fa98_c081_472e_6896_dfb2_54c0),
        (0x40, 0xff2e_a164_66c9_6a38_43ec_78b3_26b5_2861),
        (0x80, 0xfe5d_ee04_6a99_a2a8_11c4_61f1_969c_3053),
        (0x100, 0xfcbe_86c7_900a_88ae_dcff_c83b_479a_a3a4),
        (0x200, 0xf987_a725_3ac4_1317_6f2b_074c_f781_5e54),
        (0x400, 0xf339_2b08_22b7_0005_940c_7a39_8e4b_70f3),
        (0x800, 0xe715_9475_a2c2_9b74_43b2_9c7f_a6e8_89d9),
        (0x1000, 0xd097_f3bd_fd20_22b8_845a_d8f7_92aa_5825),
        (0x2000, 0xa9f7_4646_2d87_0fdf_8a65_dc1f_90e0_61e5),
        (0x4000, 0x70d8_69a1_56d2_a1b8_90bb_3df6_2baf_32f7),
        (0x8000, 0x31be_135f_97d0_8fd9_8123_1505_542f_cfa6),
        (0x10000, 0x9aa_508b_5b7a_84e1_c677_de54_f3e9_9bc9),
        (0x20000, 0x5d_6af8_dedb_8119_6699_c329_225e_e604),
        (0x40000, 0x2216_e584_f5fa_1ea9_2604_1bed_fe98),
        (0x80000, 0x48a_1703_91f7_dc42_444e_8fa2),
    ];
    for (bit, factor) in factors {
        if abs_tick & bit != 0 {
            ratio = mul_shift(ratio, factor);
        }
    }

    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    // Q128.128 to Q64.96, rounding up
    let shifted = ratio >> 32;
    if (ratio & U256::from(u32::MAX)).is_zero() {
        Ok(shifted)
    } else {
        Ok(shifted + U256::from(1))
    }
}

fn ordered(a: U256, b: U256) -> (U256, U256) {
    if a > b {
        (b, a)
    } else {
        (a, b)
    }
}

/// Amount of token0 held by `liquidity` between two square root prices.
///
/// # Errors
/// * Zero square root price
pub fn amount0_for_liquidity(sqrt_a: U256, sqrt_b: U256, liquidity: u128) -> Result<U256> {
    let (sqrt_a, sqrt_b) = ordered(sqrt_a, sqrt_b);
    if sqrt_a.is_zero() {
        bail!("Zero sqrt price");
    }
    let numerator = (U512::from(liquidity) << 96) * U512::from(sqrt_b - sqrt_a);
    narrow(numerator / U512::from(sqrt_b) / U512::from(sqrt_a))
}

/// Amount of token1 held by `liquidity` between two square root prices.
///
/// # Errors
/// * Result larger than `U256::MAX`
pub fn amount1_for_liquidity(sqrt_a: U256, sqrt_b: U256, liquidity: u128) -> Result<U256> {
    let (sqrt_a, sqrt_b) = ordered(sqrt_a, sqrt_b);
    narrow((U512::from(liquidity) * U512::from(sqrt_b - sqrt_a)) >> 96)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_div() {
        assert_eq!(
            mul_div(U256::from(10), U256::from(3), U256::from(4)).unwrap(),
            U256::from(7)
        );
        assert_eq!(
            mul_div(U256::MAX, U256::from(2), U256::from(2)).unwrap(),
            U256::MAX
        );
        assert!(mul_div(U256::MAX, U256::from(2), U256::from(1)).is_err());
        assert!(mul_div(U256::from(1), U256::from(1), U256::ZERO).is_err());
    }

    #[test]
    fn test_calculate_fee_rounds_up() {
        for (amount, fee, expected) in [
            // amount, fee (millionths), fee amount
            (1_000_000_u64, 3000_u32, 3000_u64), // exact
            (1_000_001, 3000, 3001),             // 3000.003 -> 3001
            (1, 500, 1),                         // 0.0005 -> 1
            (0, 3000, 0),
            (999_999, 100, 100), // 99.9999 -> 100
        ] {
            let result = calculate_fee(U256::from(amount), fee).unwrap();
            assert_eq!(result, U256::from(expected), "amount {amount} fee {fee}");
        }
    }

    #[test]
    fn test_calculate_fee_never_under_repays() {
        for _ in 0..1000 {
            let amount = U256::from(fastrand::u128(..));
            let fee = fastrand::u32(1..1_000_000);
            let result = calculate_fee(amount, fee).unwrap();
            let scaled = result * U256::from(FEE_DENOMINATOR);
            let exact = amount * U256::from(fee);
            assert!(scaled >= exact);
            if !(exact % U256::from(FEE_DENOMINATOR)).is_zero() {
                assert!(scaled > exact);
            }
        }
    }

    #[test]
    fn test_sqrt_ratio_at_tick() {
        // Known values of the pool contract
        assert_eq!(
            sqrt_ratio_at_tick(0).unwrap(),
            U256::from(1) << 96
        );
        assert_eq!(
            sqrt_ratio_at_tick(MIN_TICK).unwrap(),
            U256::from(4_295_128_739_u64)
        );
        assert_eq!(
            sqrt_ratio_at_tick(MAX_TICK).unwrap(),
            "1461446703485210103287273052203988822378723970342"
                .parse::<U256>()
                .unwrap()
        );
        assert!(sqrt_ratio_at_tick(MAX_TICK + 1).is_err());
        assert!(sqrt_ratio_at_tick(MIN_TICK - 1).is_err());
    }

    #[test]
    fn test_sqrt_ratio_is_monotonic() {
        let mut previous = sqrt_ratio_at_tick(-1000).unwrap();
        for tick in -999..1000 {
            let current = sqrt_ratio_at_tick(tick).unwrap();
            assert!(current > previous);
            previous = current;
        }
    }

    #[test]
    fn test_price_from_sqrt() {
        // sqrt price of exactly 1 is a price of 1
        assert_eq!(
            price_from_sqrt(U256::from(1) << 96).unwrap(),
            U256::from(E18)
        );
        // sqrt price of 2 is a price of 4
        assert_eq!(
            price_from_sqrt(U256::from(2) << 96).unwrap(),
            U256::from(4 * E18)
        );
    }

    #[test]
    fn test_amounts_for_liquidity() {
        let sqrt_a = U256::from(1) << 96;
        let sqrt_b = U256::from(2) << 96;
        // amount1 = L * (b - a) = L * 1
        assert_eq!(
            amount1_for_liquidity(sqrt_a, sqrt_b, 1_000_000).unwrap(),
            U256::from(1_000_000)
        );
        // amount0 = L * (b - a) / (a * b) = L / 2
        assert_eq!(
            amount0_for_liquidity(sqrt_a, sqrt_b, 1_000_000).unwrap(),
            U256::from(500_000)
        );
        // argument order does not matter
        assert_eq!(
            amount0_for_liquidity(sqrt_b, sqrt_a, 1_000_000).unwrap(),
            U256::from(500_000)
        );
    }
}
