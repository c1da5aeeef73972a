//! Runtime configuration, read from the environment and `.env`.

use std::path::PathBuf;
use std::str::FromStr;

use alloy::primitives::{Address, U256};
use eyre::{eyre, Result};

use crate::utils::constants::{network, NetworkPreset};

/// Liquidity threshold used when `MIN_LIQUIDITY_IN_USDT` is unset, 1750 USDT
pub const DEFAULT_MIN_LIQUIDITY: u64 = 1_750_000_000;
/// Port of the status endpoint when `STATUS_PORT` is unset
pub const DEFAULT_STATUS_PORT: u16 = 8080;

/// Bot configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// JSON-RPC endpoint for reads and dry runs
    pub rpc_url: String,
    /// Endpoint for raw transactions when relays are not used
    pub execution_rpc_url: Option<String>,
    /// Hex private key of the sender
    pub private_key: String,
    /// Deployed flash loan executor
    pub flash_contract: Address,
    /// Minimum pool liquidity, in stable token units (6 decimals)
    pub min_liquidity: U256,
    /// USD per ETH, 6 decimals
    pub eth_price: U256,
    /// Root of the pool and token caches
    pub data_dir: PathBuf,
    /// Port of the status endpoint
    pub status_port: u16,
    /// Send bundles to relays instead of raw transactions
    pub use_relays: bool,
    /// Exchanges, tokens and relays of the chain
    pub network: NetworkPreset,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment
    ///
    /// # Errors
    /// * Missing or malformed variable
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `var`
    ///
    /// # Errors
    /// * Missing or malformed variable
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |name: &str| var(name).ok_or_else(|| eyre!("{name} not set"));

        let network_name = var("NETWORK").unwrap_or_else(|| "ethereum".to_string());
        let network = network(&network_name).ok_or_else(|| eyre!("Unknown NETWORK {network_name}"))?;

        Ok(Self {
            rpc_url: required("RPC_URL")?,
            execution_rpc_url: var("EXECUTION_RPC_URL"),
            private_key: required("PRIVATE_KEY")?,
            flash_contract: parse("FLASH_CONTRACT", &required("FLASH_CONTRACT")?)?,
            min_liquidity: var("MIN_LIQUIDITY_IN_USDT")
                .map(|value| parse("MIN_LIQUIDITY_IN_USDT", &value))
                .transpose()?
                .unwrap_or(U256::from(DEFAULT_MIN_LIQUIDITY)),
            eth_price: parse("ETH_PRICE_USD", &required("ETH_PRICE_USD")?)?,
            data_dir: var("DATA_DIR").map_or_else(|| PathBuf::from("data"), PathBuf::from),
            status_port: var("STATUS_PORT")
                .map(|value| parse("STATUS_PORT", &value))
                .transpose()?
                .unwrap_or(DEFAULT_STATUS_PORT),
            use_relays: var("USE_RELAYS")
                .map(|value| parse("USE_RELAYS", &value))
                .transpose()?
                .unwrap_or(network.use_relays),
            network,
        })
    }

    /// Directory of the exchange caches of the configured network
    #[must_use]
    pub fn network_dir(&self) -> PathBuf {
        self.data_dir.join(self.network.name)
    }
}

fn parse<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| eyre!("Invalid {name} {value:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 4] = [
        ("RPC_URL", "http://localhost:8545"),
        ("PRIVATE_KEY", "0x01"),
        ("FLASH_CONTRACT", "0x7d68D27905550C22B0547A6838A2651A0db662df"),
        ("ETH_PRICE_USD", "2000000000"),
    ];

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(vars(&REQUIRED)).unwrap();
        assert_eq!(config.min_liquidity, U256::from(DEFAULT_MIN_LIQUIDITY));
        assert_eq!(config.eth_price, U256::from(2_000_000_000u64));
        assert_eq!(config.status_port, DEFAULT_STATUS_PORT);
        assert_eq!(config.network.name, "ethereum");
        assert!(config.use_relays);
        assert_eq!(config.network_dir(), PathBuf::from("data/ethereum"));
        assert!(config.execution_rpc_url.is_none());
    }

    #[test]
    fn test_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("NETWORK", "arbitrum"),
            ("USE_RELAYS", "true"),
            ("STATUS_PORT", "9000"),
            ("DATA_DIR", "/tmp/ouro"),
        ]);
        let config = Config::from_vars(vars(&pairs)).unwrap();
        assert_eq!(config.network.name, "arbitrum");
        assert!(config.use_relays);
        assert_eq!(config.status_port, 9000);
        assert_eq!(config.network_dir(), PathBuf::from("/tmp/ouro/arbitrum"));
    }

    #[test]
    fn test_missing_and_invalid() {
        let error = Config::from_vars(vars(&REQUIRED[1..])).unwrap_err();
        assert_eq!(error.to_string(), "RPC_URL not set");

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("STATUS_PORT", "eighty"));
        assert!(Config::from_vars(vars(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("NETWORK", "solana"));
        assert!(Config::from_vars(vars(&pairs)).is_err());
    }
}
