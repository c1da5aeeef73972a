//! Assembly of the single flash loan transaction that runs a cycle.
//!
//! The flash contract borrows from a concentrated liquidity pool, runs a list
//! of actions and repays the pool. An action may take one of its arguments
//! from the return data of an earlier action: its `input` word packs the
//! action index, the byte offset in that action's return data, and the byte
//! offset in its own calldata where the value is written.

use alloy::primitives::aliases::{U160, U24};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::{Revert, SolCall, SolError, SolValue};
use eyre::{bail, eyre, Result};

use super::cycle::Cycle;
use super::liquidity::LiquidityInfo;
use super::math::calculate_fee;
use super::pool::{ExchangeKind, Pool, PoolId};
use super::starters::StartToken;
use super::token::TokenId;

sol! {
    /// One call made by the flash contract
    #[derive(Debug, PartialEq, Eq)]
    struct Action {
        uint64 input;
        address to;
        uint256 value;
        bytes data;
    }

    #[sol(rpc)]
    interface IFlashArbitrage {
        error ActionFailed(uint256 index, bytes returnData);

        function uniswapV3Flash(
            address pool,
            address token,
            uint256 minProfit,
            uint256 deadline,
            address recipient,
            uint256 amount0,
            uint256 amount1,
            bytes data
        ) external payable returns (uint256 profit);
    }

    #[sol(rpc)]
    interface IERC20 {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function balanceOf(address owner) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
    }

    #[sol(rpc)]
    interface IUniswapV2Router {
        function getAmountsOut(uint256 amountIn, address[] path) external view returns (uint256[] amounts);
    }

    #[sol(rpc)]
    interface IUniswapV2Pair {
        function token0() external view returns (address);
        function token1() external view returns (address);
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
        function swap(uint256 amount0Out, uint256 amount1Out, address to, bytes data) external;
    }

    #[sol(rpc)]
    interface ISwapRouter {
        struct ExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            uint24 fee;
            address recipient;
            uint256 deadline;
            uint256 amountIn;
            uint256 amountOutMinimum;
            uint160 sqrtPriceLimitX96;
        }

        function exactInputSingle(ExactInputSingleParams params) external payable returns (uint256 amountOut);
    }
}

/// Return data of `getAmountsOut`: offset word, length word, then the amounts
const AMOUNTS_START: u64 = 64;
const WORD: u64 = 32;
/// Position of `amountIn` in `exactInputSingle` arguments
const EXACT_INPUT_AMOUNT_IN: u64 = 160;

/// Packs a dynamic input reference.
///
/// The value is read at `output_offset` in the return data of action `index`
/// and written at `data_offset` in the arguments of the referencing action,
/// after the 4 byte selector.
#[must_use]
pub const fn encode_input(index: u64, output_offset: u64, data_offset: u64) -> u64 {
    index + (output_offset << 8) + ((4 + data_offset) << 24)
}

/// Arguments of `uniswapV3Flash`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlashCall {
    /// Pool lending the token
    pub pool: PoolId,
    /// Borrowed token
    pub token: TokenId,
    /// The contract reverts when it keeps less than this
    pub min_profit: U256,
    /// Unix time after which the call reverts
    pub deadline: U256,
    /// Receiver of the profit
    pub recipient: Address,
    /// Borrowed token0
    pub amount0: U256,
    /// Borrowed token1
    pub amount1: U256,
    /// ABI encoded `Action[]`
    pub data: Bytes,
}

impl FlashCall {
    /// The same call with another profit floor
    #[must_use]
    pub fn with_min_profit(mut self, min_profit: U256) -> Self {
        self.min_profit = min_profit;
        self
    }

    /// Typed call for the contract bindings
    #[must_use]
    pub fn to_call(&self) -> IFlashArbitrage::uniswapV3FlashCall {
        IFlashArbitrage::uniswapV3FlashCall {
            pool: self.pool.0,
            token: self.token.0,
            minProfit: self.min_profit,
            deadline: self.deadline,
            recipient: self.recipient,
            amount0: self.amount0,
            amount1: self.amount1,
            data: self.data.clone(),
        }
    }

    /// Encoded transaction input
    #[must_use]
    pub fn calldata(&self) -> Bytes {
        self.to_call().abi_encode().into()
    }

    /// Decoded actions carried by the call
    ///
    /// # Errors
    /// * `data` is not an encoded `Action[]`
    pub fn actions(&self) -> Result<Vec<Action>> {
        Ok(Vec::<Action>::abi_decode(&self.data, true)?)
    }
}

/// A swap of one hop of a cycle
#[derive(Clone, Copy, Debug)]
struct Hop {
    pool: Pool,
    token_in: TokenId,
    token_out: TokenId,
}

/// Consecutive hops traded through the same router
#[derive(Debug)]
enum Leg {
    /// Pairs of one constant product exchange, priced together by its router
    Pairs { router: Address, hops: Vec<Hop> },
    /// One concentrated liquidity swap through the router
    Single(Hop),
}

impl Leg {
    /// Contract receiving the tokens that enter the leg
    fn entry(&self) -> Option<Address> {
        match self {
            Self::Pairs { hops, .. } => hops.first().map(|hop| hop.pool.id.0),
            Self::Single(_) => None,
        }
    }
}

fn legs(cycle: &Cycle, graph: &[LiquidityInfo]) -> Result<Vec<Leg>> {
    let mut legs: Vec<Leg> = Vec::new();
    for (token_in, pool_ref, token_out) in cycle.hops() {
        let pool = graph
            .get(pool_ref.index)
            .map(|info| info.pool)
            .ok_or_else(|| eyre!("Pool {} is not in the graph", pool_ref.id))?;
        if pool.id != pool_ref.id {
            bail!("Graph position {} does not hold pool {}", pool_ref.index, pool_ref.id);
        }
        let hop = Hop {
            pool,
            token_in,
            token_out,
        };

        if pool.kind() == ExchangeKind::ConcentratedLiquidity {
            legs.push(Leg::Single(hop));
            continue;
        }
        if let Some(Leg::Pairs { router, hops }) = legs.last_mut() {
            if *router == pool.router {
                hops.push(hop);
                continue;
            }
        }
        legs.push(Leg::Pairs {
            router: pool.router,
            hops: vec![hop],
        });
    }
    Ok(legs)
}

fn action(input: u64, to: Address, data: Vec<u8>) -> Action {
    Action {
        input,
        to,
        value: U256::ZERO,
        data: data.into(),
    }
}

/// Builds the flash loan call that borrows `input` of the cycle token from the
/// starter's pool, runs every hop and repays the loan with its fee.
///
/// `graph` must be the graph the cycle was found in.
///
/// # Errors
/// * The cycle does not match the graph or the starter
/// * Overflow computing the repayment
pub fn assemble(
    input: U256,
    cycle: &Cycle,
    graph: &[LiquidityInfo],
    starter: &StartToken,
    flash_contract: Address,
    deadline: U256,
) -> Result<FlashCall> {
    if cycle.token() != starter.address {
        bail!("Cycle starts with {} but the loan is in {}", cycle.token(), starter.address);
    }
    let legs = legs(cycle, graph)?;
    let Some(first) = legs.first() else {
        bail!("Empty cycle");
    };

    let token = starter.address.0;
    let mut actions = Vec::new();

    if let Some(first_pair) = first.entry() {
        actions.push(action(
            0,
            token,
            IERC20::transferCall {
                to: first_pair,
                amount: input,
            }
            .abi_encode(),
        ));
    }

    // Where the previous leg left its output: action index and offset
    let mut previous: Option<(u64, u64)> = None;

    for (i, leg) in legs.iter().enumerate() {
        let next_entry = legs.get(i + 1).and_then(Leg::entry);
        match leg {
            Leg::Pairs { router, hops } => {
                let mut path = vec![hops[0].token_in.0];
                path.extend(hops.iter().map(|hop| hop.token_out.0));
                let path_len = path.len() as u64;

                actions.push(action(
                    previous.map_or(0, |(index, offset)| encode_input(index, offset, 0)),
                    *router,
                    IUniswapV2Router::getAmountsOutCall { amountIn: input, path }.abi_encode(),
                ));
                let amounts_index = actions.len() as u64 - 1;

                for (j, hop) in hops.iter().enumerate() {
                    let to = hops
                        .get(j + 1)
                        .map(|next| next.pool.id.0)
                        .or(next_entry)
                        .unwrap_or(flash_contract);
                    let data_offset = if hop.token_out == hop.pool.token0 { 0 } else { WORD };
                    actions.push(action(
                        encode_input(amounts_index, AMOUNTS_START + (j as u64 + 1) * WORD, data_offset),
                        hop.pool.id.0,
                        IUniswapV2Pair::swapCall {
                            amount0Out: U256::ZERO,
                            amount1Out: U256::ZERO,
                            to,
                            data: Bytes::new(),
                        }
                        .abi_encode(),
                    ));
                }

                previous = Some((amounts_index, AMOUNTS_START + (path_len - 1) * WORD));
            }
            Leg::Single(hop) => {
                let router = hop.pool.router;
                actions.push(action(
                    0,
                    hop.token_in.0,
                    IERC20::approveCall {
                        spender: router,
                        amount: U256::MAX,
                    }
                    .abi_encode(),
                ));
                actions.push(action(
                    previous.map_or(0, |(index, offset)| encode_input(index, offset, EXACT_INPUT_AMOUNT_IN)),
                    router,
                    ISwapRouter::exactInputSingleCall {
                        params: ISwapRouter::ExactInputSingleParams {
                            tokenIn: hop.token_in.0,
                            tokenOut: hop.token_out.0,
                            fee: U24::saturating_from(hop.pool.fee()),
                            recipient: next_entry.unwrap_or(flash_contract),
                            deadline,
                            amountIn: input,
                            amountOutMinimum: U256::ZERO,
                            sqrtPriceLimitX96: U160::ZERO,
                        },
                    }
                    .abi_encode(),
                ));
                previous = Some((actions.len() as u64 - 1, 0));
            }
        }
    }

    let repay = input
        .checked_add(calculate_fee(input, starter.fee)?)
        .ok_or_else(|| eyre!("Overflow: repayment of {input}"))?;
    actions.push(action(
        0,
        token,
        IERC20::transferCall {
            to: starter.flash_pool.0,
            amount: repay,
        }
        .abi_encode(),
    ));

    let (amount0, amount1) = if starter.is_token0 {
        (input, U256::ZERO)
    } else {
        (U256::ZERO, input)
    };

    Ok(FlashCall {
        pool: starter.flash_pool,
        token: starter.address,
        min_profit: U256::ZERO,
        deadline,
        recipient: flash_contract,
        amount0,
        amount1,
        data: actions.abi_encode().into(),
    })
}

/// A failed dry run: the action that failed, when the contract says so, and
/// the decoded revert reason
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Rejection {
    /// Index of the failing action
    pub index: Option<U256>,
    /// `Error(string)` message, empty when there is none
    pub reason: String,
}

impl Rejection {
    /// A rejection that does not come from the contract
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            index: None,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.index {
            Some(index) => write!(f, "action {index} failed: {}", self.reason),
            None => write!(f, "{}", self.reason),
        }
    }
}

/// Decodes revert data of the flash contract: `ActionFailed(index, returnData)`
/// with an `Error(string)` inside, or a bare `Error(string)`.
#[must_use]
pub fn decode_revert(data: &[u8]) -> Option<Rejection> {
    if let Ok(failed) = IFlashArbitrage::ActionFailed::abi_decode(data, true) {
        let reason = failed
            .returnData
            .get(4..)
            .and_then(|payload| String::abi_decode(payload, true).ok())
            .unwrap_or_default();
        return Some(Rejection {
            index: Some(failed.index),
            reason,
        });
    }
    Revert::abi_decode(data, true).ok().map(|revert| Rejection::new(revert.reason))
}
