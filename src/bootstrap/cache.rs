use std::fs;
use std::path::Path;
use std::str::FromStr;

use alloy::primitives::{Address, U256};
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};

use crate::arb::pool::{Amm, Concentrated, Pool, PoolId};
use crate::arb::token::TokenId;

/// Pool state as stored on disk. Amounts are decimal strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StateRecord {
    /// Reserves of a constant product pair
    #[serde(rename_all = "camelCase")]
    ConstantProduct { reserve0: String, reserve1: String },
    /// Slot and liquidity of a concentrated liquidity pool
    #[serde(rename_all = "camelCase")]
    ConcentratedLiquidity {
        sqrt_price_x96: String,
        liquidity: String,
        tick: i32,
        tick_spacing: i32,
        fee: u32,
        liquidity_gross: String,
    },
}

/// One cached pool
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolRecord {
    /// Pool contract
    pub address: Address,
    /// Lower sorted token
    pub token0: Address,
    /// Higher sorted token
    pub token1: Address,
    /// Curve state, inlined in the record
    #[serde(flatten)]
    pub state: StateRecord,
}

/// Content of an exchange cache file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExchangeFile {
    /// Every known pool of the exchange
    pub pairs: Vec<PoolRecord>,
}

fn number<T>(field: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e| eyre!("Invalid {field} {value:?}: {e}"))
}

impl From<&Pool> for PoolRecord {
    fn from(pool: &Pool) -> Self {
        let state = match pool.amm {
            Amm::ConstantProduct(state) => StateRecord::ConstantProduct {
                reserve0: state.reserve0.to_string(),
                reserve1: state.reserve1.to_string(),
            },
            Amm::ConcentratedLiquidity(state) => StateRecord::ConcentratedLiquidity {
                sqrt_price_x96: state.sqrt_price_x96.to_string(),
                liquidity: state.liquidity.to_string(),
                tick: state.tick,
                tick_spacing: state.tick_spacing,
                fee: state.fee,
                liquidity_gross: state.liquidity_gross.to_string(),
            },
        };
        Self {
            address: pool.id.0,
            token0: pool.token0.0,
            token1: pool.token1.0,
            state,
        }
    }
}

impl PoolRecord {
    /// Rebuilds the pool, traded through `router`
    ///
    /// # Errors
    /// * Malformed amount
    pub fn to_pool(&self, router: Address) -> Result<Pool> {
        let (id, token0, token1) = (PoolId(self.address), TokenId(self.token0), TokenId(self.token1));
        match &self.state {
            StateRecord::ConstantProduct { reserve0, reserve1 } => Ok(Pool::constant_product(
                id,
                token0,
                token1,
                router,
                number::<U256>("reserve0", reserve0)?,
                number::<U256>("reserve1", reserve1)?,
            )),
            StateRecord::ConcentratedLiquidity {
                sqrt_price_x96,
                liquidity,
                tick,
                tick_spacing,
                fee,
                liquidity_gross,
            } => {
                let state = Concentrated::new(
                    number("sqrtPriceX96", sqrt_price_x96)?,
                    number("liquidity", liquidity)?,
                    *tick,
                    *tick_spacing,
                    *fee,
                    number("liquidityGross", liquidity_gross)?,
                );
                Ok(Pool::concentrated(id, token0, token1, router, state))
            }
        }
    }
}

/// Pools cached at `path`, `None` when there is no cache yet
///
/// # Errors
/// * Unreadable file or malformed content
pub fn read(path: &Path, router: Address) -> Result<Option<Vec<Pool>>> {
    if !path.exists() {
        return Ok(None);
    }
    let file: ExchangeFile = serde_json::from_str(&fs::read_to_string(path)?)?;
    let pools = file
        .pairs
        .iter()
        .map(|record| record.to_pool(router))
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(pools))
}

/// Replaces the cache at `path`, creating its directory
///
/// # Errors
/// * Filesystem failure
pub fn write(path: &Path, pools: &[Pool]) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let file = ExchangeFile {
        pairs: pools.iter().map(PoolRecord::from).collect(),
    };
    fs::write(path, serde_json::to_string(&file)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arb::test_helpers::*;

    #[test]
    fn test_constant_product_record_format() {
        let pool = pool("P1", "A", "B", 1_000, 2_000);
        let value = serde_json::to_value(PoolRecord::from(&pool)).unwrap();

        assert_eq!(value["kind"], "constantProduct");
        assert_eq!(value["reserve0"], "1000");
        assert_eq!(value["reserve1"], "2000");
        assert_eq!(value["address"], serde_json::to_value(pool.id.0).unwrap());
    }

    #[test]
    fn test_file_keeps_pools() {
        let pools = vec![
            pool("P1", "A", "B", 1_000, 2_000),
            concentrated_pool("V1", "A", "B", 500),
        ];
        let path = std::env::temp_dir()
            .join(format!("ouro-cache-{}", fastrand::u64(..)))
            .join("UniswapV2.json");

        assert!(read(&path, router("V2Router")).unwrap().is_none());
        write(&path, &pools).unwrap();
        let loaded = read(&path, router("V2Router")).unwrap().unwrap();
        fs::remove_dir_all(path.parent().unwrap()).unwrap();

        assert_eq!(loaded[0], pools[0]);
        assert_eq!(loaded[1].amm, pools[1].amm);
        assert_eq!(loaded[1].router, router("V2Router"));
    }

    #[test]
    fn test_malformed_amount() {
        let record = PoolRecord {
            address: Address::ZERO,
            token0: Address::ZERO,
            token1: Address::ZERO,
            state: StateRecord::ConstantProduct {
                reserve0: "12x".to_string(),
                reserve1: "1".to_string(),
            },
        };
        assert!(record.to_pool(Address::ZERO).is_err());
    }
}
