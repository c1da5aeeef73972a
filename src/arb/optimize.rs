/// Trade size search: run the whole cycle with swaps that move the reserves,
/// then roll the pools back, and climb towards the input with the best net.
use alloy::primitives::{I256, U256};
use eyre::{eyre, Result};
use log::{debug, error};

use super::circular::CircularArbitrager;
use super::cycle::Cycle;
use super::liquidity::LiquidityInfo;
use super::math::calculate_fee;
use super::pool::PoolSnapshot;
use super::token::TokenId;

/// Multiplicative steps are expressed in thousandths
const PRECISION: u64 = 1000;
/// The step shrinks by this much when neither neighbour improves
const STEP: u64 = PRECISION / 10;
/// Arbitrary limit on moves, the climb normally stops long before
const MAX_MOVES: usize = 1000;

/// Speculative swaps on the search graph. Every touched pool is put back
/// as it was when the simulation is dropped, including on early returns.
pub struct Simulation<'a> {
    /// The pools being mutated
    graph: &'a mut [LiquidityInfo],
    /// State of each touched pool before its first swap
    saved: Vec<(usize, PoolSnapshot)>,
}

impl<'a> Simulation<'a> {
    /// Starts a simulation on `graph`
    pub fn new(graph: &'a mut [LiquidityInfo]) -> Self {
        Self {
            graph,
            saved: Vec::new(),
        }
    }

    /// Swaps through the pool at `index`, moving its reserves
    ///
    /// # Errors
    /// * Degenerate pool or overflow
    pub fn swap(&mut self, index: usize, token: TokenId, amount: U256) -> Result<U256> {
        let pool = &mut self.graph[index].pool;
        self.saved.push((index, pool.snapshot()));
        pool.swap_updating(token, amount)
    }
}

impl Drop for Simulation<'_> {
    fn drop(&mut self) {
        for (index, snapshot) in self.saved.drain(..).rev() {
            self.graph[index].pool.restore(snapshot);
        }
    }
}

/// Result of the trade size search
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Optimum {
    /// Amount to borrow
    pub input: U256,
    /// Amount the cycle returns, before repaying the loan fee
    pub output: U256,
    /// Flash loan fee on `input`
    pub fee: U256,
    /// `output - fee - input`
    pub net: I256,
}

fn signed(value: U256) -> Result<I256> {
    I256::try_from(value).map_err(|_| eyre!("Overflow: {value} does not fit a signed integer"))
}

impl CircularArbitrager {
    /// Runs `input` through the cycle with reserves moving after each swap.
    /// The graph is unchanged afterwards.
    ///
    /// # Errors
    /// * Any swap of the cycle fails
    pub fn get_output(&mut self, cycle: &Cycle, input: U256, fee: u32) -> Result<Optimum> {
        let mut amount = input;
        {
            let mut simulation = Simulation::new(&mut self.graph);
            for (token_in, pool, _) in cycle.hops() {
                amount = simulation.swap(pool.index, token_in, amount)?;
            }
        }
        let loan_fee = calculate_fee(input, fee)?;
        let net = signed(amount)?
            .checked_sub(signed(loan_fee)?)
            .and_then(|net| net.checked_sub(signed(input).ok()?))
            .ok_or_else(|| eyre!("Overflow computing net output"))?;
        Ok(Optimum {
            input,
            output: amount,
            fee: loan_fee,
            net,
        })
    }

    /// Local search for the input that maximizes `output - fee - input`,
    /// starting from the amount the cycle was discovered with.
    ///
    /// Each round tries `input / k` and `input * k`, with `k` starting at 2
    /// and shrinking towards 1 whenever neither neighbour is better. The
    /// result is never worse than the starting input.
    ///
    /// # Errors
    /// * The cycle can not be evaluated at its discovery input
    pub fn find_optimal_amounts(&mut self, cycle: &Cycle, fee: u32) -> Result<Optimum> {
        let mut best = self.get_output(cycle, cycle.input(), fee)?;

        let precision = U256::from(PRECISION);
        let mut divider = PRECISION * 2;
        let mut moves = 0;

        loop {
            let less_input = best.input * precision / U256::from(divider);
            let more_input = best.input.saturating_mul(U256::from(divider)) / precision;

            let less = self.get_output(cycle, less_input, fee).ok();
            let more = self.get_output(cycle, more_input, fee).ok();

            match (less, more) {
                (Some(less), _) if less.net > best.net => best = less,
                (_, Some(more)) if more.net > best.net => best = more,
                _ if divider > PRECISION => {
                    divider -= STEP;
                    continue;
                }
                _ => break,
            }

            moves += 1;
            if moves > MAX_MOVES {
                error!("optimize: no convergence after {moves} moves for {cycle:?}");
                break;
            }
        }

        debug!(
            "optimize: {} -> {} in, net {} after {moves} moves",
            cycle.input(),
            best.input,
            best.net
        );
        Ok(best)
    }
}
