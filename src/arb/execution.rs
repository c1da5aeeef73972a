//! One candidate cycle on its way from discovery to the chain.

use alloy::primitives::{I256, U256};
use derive_more::Display;
use eyre::{eyre, Result};
use serde_json::{json, Value};

use super::cycle::Cycle;
use super::flash_loan::{FlashCall, Rejection};
use super::math::{mul_div, E18};
use super::optimize::Optimum;
use super::starters::StartToken;
use super::token::{TokenBook, TokenInfo};
use crate::chain::{Dispatch, Verified};

/// Net profit, in 6 decimal USD, above which part of it goes to the block builder
pub const MINER_REWARD_THRESHOLD: u64 = 5_000_000;

/// Longest string kept in the status view
pub const MAX_STATUS_STRING: usize = 1000;

/// Where a candidate stands. Moves forward only.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExecutionState {
    /// Found, not solved yet
    Created,
    /// Solved, dry run pending
    Verifying,
    /// The dry run succeeded
    Verified,
    /// Unprofitable after solving, or the dry run failed
    Rejected,
    /// USD profit and gas computed
    ProfitComputed,
    /// Profitable and ranked
    Ranked,
    /// Handed to the broadcaster
    Dispatched,
    /// Included on chain
    Succeeded,
    /// Not included, or the broadcast failed
    Failed,
}

/// Profit and gas of a verified candidate, USD amounts with 6 decimals
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProfitBreakdown {
    /// Verified profit converted to USD
    pub profit_usd: U256,
    /// `gas * gas_price`
    pub gas_wei: U256,
    /// Gas cost in USD
    pub gas_usd: U256,
    /// Gas cost in the borrowed token
    pub gas_in_token: U256,
    /// `profit_usd - gas_usd`
    pub net_usd: I256,
    /// Gas price the profit was computed with
    pub gas_price: U256,
}

/// Transaction parameters of the candidate that gets dispatched
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasPlan {
    /// Gas limit, from the estimate
    pub gas_limit: u64,
    /// Gas price, raised when a miner reward is paid
    pub gas_price: U256,
    /// Profit floor passed to the contract, the gas cost in the borrowed token
    pub min_profit: U256,
    /// Extra USD paid to the builder through the gas price
    pub miner_reward_usd: U256,
}

/// Everything known about one candidate
#[derive(Clone, Debug)]
pub struct ArbitrageExecution {
    /// The cycle found by the search
    pub cycle: Cycle,
    /// The loan that funds it
    pub starter: StartToken,
    /// Metadata of the borrowed token
    pub token: TokenInfo,
    /// Current state
    pub state: ExecutionState,
    /// Solved trade size
    pub optimum: Option<Optimum>,
    /// The call verified by the dry run
    pub call: Option<FlashCall>,
    /// Dry run result
    pub verified: Option<Verified>,
    /// Why the candidate was rejected
    pub rejection: Option<Rejection>,
    /// USD figures
    pub profit: Option<ProfitBreakdown>,
    /// Parameters it was dispatched with
    pub plan: Option<GasPlan>,
    /// Broadcast outcome
    pub dispatch: Option<Dispatch>,
    /// Unexpected failure while dispatching
    pub error: Option<String>,
}

fn signed(value: U256) -> Result<I256> {
    I256::try_from(value).map_err(|_| eyre!("Overflow: {value} does not fit a signed integer"))
}

impl ArbitrageExecution {
    /// A freshly found candidate
    #[must_use]
    pub fn new(cycle: Cycle, starter: StartToken, token: TokenInfo) -> Self {
        Self {
            cycle,
            starter,
            token,
            state: ExecutionState::Created,
            optimum: None,
            call: None,
            verified: None,
            rejection: None,
            profit: None,
            plan: None,
            dispatch: None,
            error: None,
        }
    }

    /// Marks the candidate rejected
    pub fn reject(&mut self, rejection: Rejection) {
        self.rejection = Some(rejection);
        self.state = ExecutionState::Rejected;
    }

    /// Whether the dry run succeeded
    #[must_use]
    pub const fn is_verified(&self) -> bool {
        self.verified.is_some()
    }

    /// Net USD profit, once computed
    #[must_use]
    pub fn net_usd(&self) -> Option<I256> {
        self.profit.map(|profit| profit.net_usd)
    }

    /// Computes USD profit and gas.
    ///
    /// * `min_liquidity_of_token` - minimum amount of the token in the graph,
    ///   worth `min_liquidity_usd`
    /// * `eth_price` - USD per ETH with 6 decimals
    ///
    /// # Errors
    /// * Not verified, zero minimum liquidity or overflow
    pub fn calculate_profit(
        &mut self,
        min_liquidity_of_token: U256,
        min_liquidity_usd: U256,
        gas_price: U256,
        eth_price: U256,
    ) -> Result<ProfitBreakdown> {
        let verified = self
            .verified
            .ok_or_else(|| eyre!("Profit of an unverified candidate"))?;

        let profit_usd = mul_div(verified.profit, min_liquidity_usd, min_liquidity_of_token)?;
        let gas_wei = U256::from(verified.gas)
            .checked_mul(gas_price)
            .ok_or_else(|| eyre!("Overflow: gas cost of {} at {gas_price}", verified.gas))?;
        let gas_usd = mul_div(gas_wei, eth_price, U256::from(E18))?;
        let gas_in_token = if profit_usd.is_zero() {
            verified.profit
        } else {
            mul_div(verified.profit, gas_usd, profit_usd)?
        };
        let net_usd = signed(profit_usd)? - signed(gas_usd)?;

        let breakdown = ProfitBreakdown {
            profit_usd,
            gas_wei,
            gas_usd,
            gas_in_token,
            net_usd,
            gas_price,
        };
        self.profit = Some(breakdown);
        self.state = ExecutionState::ProfitComputed;
        Ok(breakdown)
    }

    /// Gas price and profit floor for dispatch.
    ///
    /// Above [`MINER_REWARD_THRESHOLD`] of net profit, the excess is paid to
    /// the builder through the gas price, capped at the gas cost itself, so
    /// the gas price at most doubles.
    ///
    /// # Errors
    /// * Profit not computed or overflow
    pub fn gas_plan(&self) -> Result<GasPlan> {
        let verified = self
            .verified
            .ok_or_else(|| eyre!("Gas plan of an unverified candidate"))?;
        let profit = self
            .profit
            .ok_or_else(|| eyre!("Gas plan before profit computation"))?;

        let threshold = signed(U256::from(MINER_REWARD_THRESHOLD))?;
        let mut plan = GasPlan {
            gas_limit: verified.gas,
            gas_price: profit.gas_price,
            min_profit: profit.gas_in_token,
            miner_reward_usd: U256::ZERO,
        };

        if profit.net_usd > threshold && !profit.gas_usd.is_zero() {
            let excess = (profit.net_usd - threshold).into_raw();
            let reward = excess.min(profit.gas_usd);
            let scaled = profit
                .gas_usd
                .checked_add(reward)
                .ok_or_else(|| eyre!("Overflow: miner reward {reward}"))?;

            plan.miner_reward_usd = reward;
            plan.gas_price = mul_div(profit.gas_price, scaled, profit.gas_usd)?;
            plan.min_profit = mul_div(profit.gas_in_token, scaled, profit.gas_usd)?;
        }

        Ok(plan)
    }

    /// JSON view for the status endpoint. Integers are decimal strings and
    /// strings longer than [`MAX_STATUS_STRING`] are cut.
    #[must_use]
    pub fn to_status(&self, tokens: &TokenBook) -> Value {
        let path: Vec<Value> = self
            .cycle
            .nodes()
            .iter()
            .map(|node| {
                json!({
                    "token": tokens.get(node.token),
                    "amount": node.amount.to_string(),
                    "pair": node.pool.map(|pool| pool.id.to_string()),
                })
            })
            .collect();

        let mut status = json!({
            "state": self.state.to_string(),
            "description": self.cycle.describe(tokens),
            "path": path,
            "token": self.token,
            "pool": {
                "address": self.starter.address.to_string(),
                "flashPool": self.starter.flash_pool.to_string(),
                "isToken0": self.starter.is_token0,
                "fee": self.starter.fee,
            },
            "optimalInput": self.optimum.map(|optimum| optimum.input.to_string()),
            "optimalOutput": self.optimum.map(|optimum| optimum.output.to_string()),
            "profit": self.verified.map(|verified| verified.profit.to_string()),
            "gasLimit": self.verified.map(|verified| verified.gas.to_string()),
            "args": self.call.as_ref().map(|call| json!({
                "pool": call.pool.to_string(),
                "token": call.token.to_string(),
                "minProfit": call.min_profit.to_string(),
                "deadline": call.deadline.to_string(),
                "recipient": call.recipient.to_string(),
                "amount0": call.amount0.to_string(),
                "amount1": call.amount1.to_string(),
                "data": call.data.to_string(),
            })),
            "verified": self.is_verified(),
            "errorIndex": self.rejection.as_ref().and_then(|rejection| rejection.index).map(|index| index.to_string()),
            "errorReason": self.rejection.as_ref().map(|rejection| rejection.reason.clone()),
            "profitInUSD": self.profit.map(|profit| profit.profit_usd.to_string()),
            "gasInETH": self.profit.map(|profit| profit.gas_wei.to_string()),
            "gasInUSD": self.profit.map(|profit| profit.gas_usd.to_string()),
            "gasInToken": self.profit.map(|profit| profit.gas_in_token.to_string()),
            "netProfitInUSD": self.profit.map(|profit| profit.net_usd.to_string()),
            "gasPrice": self.plan.map_or_else(
                || self.profit.map(|profit| profit.gas_price.to_string()),
                |plan| Some(plan.gas_price.to_string()),
            ),
            "minerRewardInUSD": self.plan.map(|plan| plan.miner_reward_usd.to_string()),
            "success": self.dispatch.as_ref().is_some_and(|dispatch| dispatch.success),
            "tx": self.dispatch.as_ref().and_then(|dispatch| dispatch.tx_hash).map(|hash| hash.to_string()),
            "debug": self.dispatch.as_ref().map(|dispatch| dispatch.debug.clone()),
            "error": self.error,
        });
        truncate_strings(&mut status);
        status
    }
}

/// Cuts every string in `value` to [`MAX_STATUS_STRING`] characters plus `"..."`
pub fn truncate_strings(value: &mut Value) {
    match value {
        Value::String(text) => {
            if let Some((cut, _)) = text.char_indices().nth(MAX_STATUS_STRING) {
                text.truncate(cut);
                text.push_str("...");
            }
        }
        Value::Array(items) => items.iter_mut().for_each(truncate_strings),
        Value::Object(fields) => fields.values_mut().for_each(truncate_strings),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arb::pool::PoolId;
    use crate::arb::test_helpers::*;

    fn execution(profit: u64, gas: u64) -> ArbitrageExecution {
        let cycle = cycle("A", 1000, &[(0, "P1", "B", 1900), (1, "P2", "A", 1100)]);
        let starter = StartToken {
            address: token("A"),
            flash_pool: PoolId(router("F")),
            is_token0: true,
            fee: 500,
        };
        let mut execution = ArbitrageExecution::new(cycle, starter, TokenInfo::unknown(token("A")));
        execution.verified = Some(Verified {
            profit: U256::from(profit),
            gas,
        });
        execution.state = ExecutionState::Verified;
        execution
    }

    const GWEI: u64 = 1_000_000_000;
    /// 2000 USD per ETH
    const ETH_PRICE: u64 = 2_000_000_000;

    #[test]
    fn test_calculate_profit() {
        // 1e18 of the token is worth 100 USD
        let mut execution = execution(5 * 10_u64.pow(17), 200_000);
        let breakdown = execution
            .calculate_profit(U256::from(E18), U256::from(100_000_000), U256::from(10 * GWEI), U256::from(ETH_PRICE))
            .unwrap();

        assert_eq!(breakdown.profit_usd, U256::from(50_000_000));
        // 200k gas at 10 gwei is 0.002 ETH, 4 USD
        assert_eq!(breakdown.gas_wei, U256::from(2 * 10_u64.pow(15)));
        assert_eq!(breakdown.gas_usd, U256::from(4_000_000));
        assert_eq!(breakdown.gas_in_token, U256::from(4 * 10_u64.pow(16)));
        assert_eq!(breakdown.net_usd, I256::try_from(46_000_000_i64).unwrap());
        assert_eq!(execution.state, ExecutionState::ProfitComputed);
    }

    #[test]
    fn test_gas_cost_above_profit_is_negative() {
        let mut execution = execution(10_u64.pow(16), 200_000);
        let breakdown = execution
            .calculate_profit(U256::from(E18), U256::from(100_000_000), U256::from(10 * GWEI), U256::from(ETH_PRICE))
            .unwrap();
        // 1 USD of profit, 4 USD of gas
        assert_eq!(breakdown.net_usd, I256::try_from(-3_000_000_i64).unwrap());
    }

    #[test]
    fn test_unverified_has_no_profit() {
        let mut execution = execution(1, 1);
        execution.verified = None;
        assert!(execution
            .calculate_profit(U256::from(1), U256::from(1), U256::from(1), U256::from(1))
            .is_err());
        assert!(execution.gas_plan().is_err());
    }

    #[test]
    fn test_gas_plan_without_reward() {
        // net 3 USD, below the threshold
        let mut execution = execution(7 * 10_u64.pow(16), 200_000);
        execution
            .calculate_profit(U256::from(E18), U256::from(100_000_000), U256::from(10 * GWEI), U256::from(ETH_PRICE))
            .unwrap();
        let plan = execution.gas_plan().unwrap();
        assert_eq!(plan.gas_limit, 200_000);
        assert_eq!(plan.gas_price, U256::from(10 * GWEI));
        assert_eq!(plan.miner_reward_usd, U256::ZERO);
        assert_eq!(plan.min_profit, execution.profit.unwrap().gas_in_token);
    }

    #[test]
    fn test_gas_plan_reward_is_capped_at_gas_cost() {
        // net 46 USD: the excess of 41 USD is capped at the 4 USD of gas
        let mut execution = execution(5 * 10_u64.pow(17), 200_000);
        execution
            .calculate_profit(U256::from(E18), U256::from(100_000_000), U256::from(10 * GWEI), U256::from(ETH_PRICE))
            .unwrap();
        let plan = execution.gas_plan().unwrap();
        assert_eq!(plan.miner_reward_usd, U256::from(4_000_000));
        assert_eq!(plan.gas_price, U256::from(20 * GWEI));
        assert_eq!(plan.min_profit, U256::from(8 * 10_u64.pow(16)));
    }

    #[test]
    fn test_gas_plan_partial_reward() {
        // profit 10 USD, gas 4 USD: net 6 USD, reward 1 USD
        let mut execution = execution(10_u64.pow(17), 200_000);
        execution
            .calculate_profit(U256::from(E18), U256::from(100_000_000), U256::from(10 * GWEI), U256::from(ETH_PRICE))
            .unwrap();
        let plan = execution.gas_plan().unwrap();
        assert_eq!(plan.miner_reward_usd, U256::from(1_000_000));
        // scaled by 5 / 4
        assert_eq!(plan.gas_price, U256::from(12_500_000_000_u64));
        assert_eq!(plan.min_profit, U256::from(5 * 10_u64.pow(16)));
    }

    #[test]
    fn test_status_uses_decimal_strings() {
        let mut execution = execution(5 * 10_u64.pow(17), 200_000);
        execution
            .calculate_profit(U256::from(E18), U256::from(100_000_000), U256::from(10 * GWEI), U256::from(ETH_PRICE))
            .unwrap();
        let status = execution.to_status(&TokenBook::default());

        assert_eq!(status["profit"], "500000000000000000");
        assert_eq!(status["gasLimit"], "200000");
        assert_eq!(status["netProfitInUSD"], "46000000");
        assert_eq!(status["path"][1]["amount"], "1900");
        assert_eq!(status["path"][0]["pair"], Value::Null);
        assert_eq!(status["state"], "ProfitComputed");
        assert_eq!(status["success"], false);
        assert_eq!(status["description"], "110% - ---->---->---");
    }

    #[test]
    fn test_long_strings_are_truncated() {
        let mut execution = execution(1, 1);
        execution.error = Some("x".repeat(5000));
        let status = execution.to_status(&TokenBook::default());
        let error = status["error"].as_str().unwrap();
        assert_eq!(error.len(), MAX_STATUS_STRING + 3);
        assert!(error.ends_with("..."));

        let mut short = json!(["abc", { "nested": "y".repeat(MAX_STATUS_STRING) }]);
        truncate_strings(&mut short);
        assert_eq!(short[0], "abc");
        assert_eq!(short[1]["nested"].as_str().unwrap().len(), MAX_STATUS_STRING);
    }
}
