use std::time::Duration;

use alloy::primitives::{address, Address};

use crate::arb::pool::ExchangeKind;

/// Block builder relays accepting `eth_sendBundle`
pub const RELAYS: [&str; 8] = [
    "https://relay.flashbots.net",
    "https://builder0x69.io",
    "https://rpc.beaverbuild.org",
    "https://rsync-builder.xyz",
    "https://buildai.net",
    "https://eth-builder.com",
    "https://mev.api.blxrbdn.com",
    "https://api.blocknative.com/v1/auction",
];

/// Average Ethereum block time in seconds
pub const BLOCK_TIME_SECONDS: u64 = 12;

/// Blocks per `eth_getLogs` request when scanning factory events
pub const LOG_WINDOW: u64 = 2500;

/// Concurrent requests when refreshing pool state
pub const REFRESH_BATCH: usize = 1000;
/// Time limit of one pool state read
pub const REFRESH_TIMEOUT: Duration = Duration::from_secs(60);

/// Concurrent requests when reading token metadata
pub const TOKEN_BATCH: usize = 100;

/// A factory and the router trading its pools
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExchangePreset {
    /// Name, also the cache file name
    pub name: &'static str,
    /// Curve family of every pool of the factory
    pub kind: ExchangeKind,
    /// Factory creating the pools
    pub factory: Address,
    /// Router the flash contract swaps through
    pub router: Address,
    /// First block to scan for pool creation events
    pub start_block: u64,
    /// Last block to scan for pool creation events
    pub end_block: u64,
}

/// Everything that differs between networks
#[derive(Clone, Copy, Debug)]
pub struct NetworkPreset {
    /// Name, also the cache directory name
    pub name: &'static str,
    /// Token the liquidity threshold is expressed in, 6 decimals
    pub stable: Address,
    /// Exchanges searched for cycles
    pub exchanges: &'static [ExchangePreset],
    /// Exchange whose pools lend the flash loans
    pub lender: ExchangePreset,
    /// Fee on transfer and otherwise unusable tokens
    pub blocked: &'static [Address],
    /// Whether bundle relays exist for the network
    pub use_relays: bool,
}

/// Ethereum mainnet USDT
pub const ETHEREUM_USDT: Address = address!("0xdAC17F958D2ee523a2206206994597C13D831ec7");

const UNISWAP_V2: ExchangePreset = ExchangePreset {
    name: "UniswapV2",
    kind: ExchangeKind::ConstantProduct,
    factory: address!("0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f"),
    router: address!("0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D"),
    start_block: 0,
    end_block: 0,
};

const SUSHISWAP: ExchangePreset = ExchangePreset {
    name: "SushiSwap",
    kind: ExchangeKind::ConstantProduct,
    factory: address!("0xC0AEe478e3658e2610c5F7A4A2E1777cE9e4f2Ac"),
    router: address!("0xd9e1cE17f2641f24aE83637ab66a2cca9C378B9F"),
    start_block: 0,
    end_block: 0,
};

const SHIBASWAP: ExchangePreset = ExchangePreset {
    name: "ShibaSwap",
    kind: ExchangeKind::ConstantProduct,
    factory: address!("0x115934131916C8b277DD010Ee02de363c09d037c"),
    router: address!("0x03f7724180AA6b939894B5Ca4314783B0b36b329"),
    start_block: 0,
    end_block: 0,
};

const UNISWAP_V3: ExchangePreset = ExchangePreset {
    name: "UniswapV3",
    kind: ExchangeKind::ConcentratedLiquidity,
    factory: address!("0x1F98431c8aD98523631AE4a59f267346ea31F984"),
    router: address!("0xE592427A0AEce92De3Edee1F18E0157C05861564"),
    start_block: 12_369_621,
    end_block: 16_772_418,
};

/// Ethereum mainnet
pub const ETHEREUM: NetworkPreset = NetworkPreset {
    name: "ethereum",
    stable: ETHEREUM_USDT,
    exchanges: &[UNISWAP_V2, SUSHISWAP, SHIBASWAP],
    lender: UNISWAP_V3,
    blocked: &[
        // taxed
        address!("0xCc802c45B55581713cEcd1Eb17BE9Ab7fcCb0844"),
        address!("0x131157c6760f78f7dDF877C0019Eba175BA4b6F6"),
        address!("0x73A83269b9bbAFC427E76Be0A2C1a1db2a26f4C2"),
        address!("0x7101a9392EAc53B01e7c07ca3baCa945A56EE105"),
        address!("0x7102DC82EF61bfB0410B1b1bF8EA74575bf0A105"),
        address!("0x7103eBdbF1f89be2d53EFF9B3CF996C9E775c105"),
        address!("0x7104D1f179Cc9cc7fb5c79Be6Da846E3FBC4C105"),
        address!("0x7105FAA4a26eD1c67B8B2b41BEc98F06Ee21D105"),
        address!("0xd5De579f8324E3625bDC5E8C6F3dB248614a41C5"),
        address!("0xFeeeef4D7b4Bf3cc8BD012D02D32Ba5fD3D51e31"),
        address!("0xBfB2b6870501a6Ff17121D676A0A45a38c9eeD1e"),
        address!("0x616ef40D55C0D2c506f4d6873Bda8090b79BF8fC"),
        address!("0x33D203FA03bb30b133De0fE2d6533C268bA286B6"),
        // weird
        address!("0xd233D1f6FD11640081aBB8db125f722b5dc729dc"),
        address!("0x9EA3b5b4EC044b70375236A281986106457b20EF"),
    ],
    use_relays: true,
};

/// Arbitrum One
pub const ARBITRUM: NetworkPreset = NetworkPreset {
    name: "arbitrum",
    stable: address!("0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9"),
    exchanges: &[ExchangePreset {
        name: "SushiSwap",
        kind: ExchangeKind::ConstantProduct,
        factory: address!("0xc35DADB65012eC5796536bD9864eD8773aBc74C4"),
        router: address!("0x1b02dA8Cb0d097eB8D57A175b88c7D8b47997506"),
        start_block: 0,
        end_block: 0,
    }],
    lender: ExchangePreset {
        name: "UniswapV3",
        kind: ExchangeKind::ConcentratedLiquidity,
        factory: address!("0x1F98431c8aD98523631AE4a59f267346ea31F984"),
        router: address!("0x68b3465833fb72A70ecDF485E0e4C7bD8665Fc45"),
        start_block: 165,
        end_block: 70_198_712,
    },
    blocked: &[],
    use_relays: false,
};

/// Preset named `name`, case insensitive
#[must_use]
pub fn network(name: &str) -> Option<NetworkPreset> {
    [ETHEREUM, ARBITRUM]
        .into_iter()
        .find(|preset| preset.name.eq_ignore_ascii_case(name))
}
