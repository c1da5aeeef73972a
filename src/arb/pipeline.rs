//! One iteration of the execution pipeline: find cycles, solve their size,
//! verify them against the chain, rank them by net USD profit and dispatch
//! the best one. The pipeline owns the blacklist and the execution history
//! and publishes a JSON view of both after every iteration.

use std::collections::VecDeque;
use std::time::Duration;

use alloy::primitives::{Address, I256, U256};
use eyre::{bail, Result};
use futures::future::join_all;
use log::{debug, error, info, warn};
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::time::timeout;

use super::blacklist::Blacklist;
use super::circular::CircularArbitrager;
use super::execution::{ArbitrageExecution, ExecutionState};
use super::flash_loan::{assemble, Rejection};
use super::starters::StartToken;
use super::token::TokenBook;
use crate::chain::{Broadcaster, Ledger};

/// Iterations kept in the history
pub const HISTORY_SIZE: usize = 20;
/// Dry runs in flight at once
pub const VERIFY_BATCH: usize = 100;
/// Seconds a flash call stays valid
pub const DEADLINE_SECONDS: u64 = 60;
/// Time limit of one dry run
pub const VERIFY_TIMEOUT: Duration = Duration::from_secs(60);

/// Fixed inputs of the profit computation and the call assembly
#[derive(Clone, Copy, Debug)]
pub struct PipelineSettings {
    /// USD value, 6 decimals, of the minimum liquidity the graph was built with
    pub min_liquidity_usd: U256,
    /// USD per ETH, 6 decimals
    pub eth_price: U256,
    /// The flash contract, receiver of every profit
    pub flash_contract: Address,
}

/// Execution pipeline state
#[derive(Debug)]
pub struct Pipeline {
    settings: PipelineSettings,
    blacklist: Blacklist,
    history: VecDeque<Vec<ArbitrageExecution>>,
    executed: Vec<ArbitrageExecution>,
    status: watch::Sender<Value>,
}

impl Pipeline {
    /// A pipeline with empty history, and the receiving end of its status
    #[must_use]
    pub fn new(settings: PipelineSettings) -> (Self, watch::Receiver<Value>) {
        let (status, receiver) = watch::channel(json!({ "history": [], "executed": [] }));
        let pipeline = Self {
            settings,
            blacklist: Blacklist::new(),
            history: VecDeque::with_capacity(HISTORY_SIZE),
            executed: Vec::new(),
            status,
        };
        (pipeline, receiver)
    }

    /// Candidates of the last iterations, oldest first
    #[must_use]
    pub const fn history(&self) -> &VecDeque<Vec<ArbitrageExecution>> {
        &self.history
    }

    /// Every dispatched candidate
    #[must_use]
    pub fn executed(&self) -> &[ArbitrageExecution] {
        &self.executed
    }

    /// `{history, executed}` as served by the status endpoint
    #[must_use]
    pub fn status(&self, tokens: &TokenBook) -> Value {
        let history: Vec<Vec<Value>> = self
            .history
            .iter()
            .map(|iteration| iteration.iter().map(|execution| execution.to_status(tokens)).collect())
            .collect();
        let executed: Vec<Value> = self
            .executed
            .iter()
            .map(|execution| execution.to_status(tokens))
            .collect();
        json!({ "history": history, "executed": executed })
    }

    /// Runs one iteration on `arbitrager` at unix time `now` for the chain at
    /// `block`, and returns the dispatched candidate, if any.
    ///
    /// # Errors
    /// * Gas price lookup or dispatch preparation failed. The iteration is
    ///   still recorded in the history.
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &mut self,
        arbitrager: &mut CircularArbitrager,
        starters: &[StartToken],
        tokens: &TokenBook,
        ledger: &impl Ledger,
        broadcaster: &impl Broadcaster,
        block: u64,
        now: u64,
    ) -> Result<Option<ArbitrageExecution>> {
        self.blacklist.purge(now);

        let cycles: Vec<_> = arbitrager
            .find(starters)
            .into_iter()
            .filter(|cycle| !self.blacklist.contains(&cycle.hash_key(), now))
            .collect();
        if cycles.is_empty() {
            debug!("pipeline::run: no cycle");
            return Ok(None);
        }

        let mut executions: Vec<ArbitrageExecution> = cycles
            .into_iter()
            .filter_map(|cycle| {
                let starter = starters.iter().find(|starter| starter.address == cycle.token())?;
                let token = tokens.get(cycle.token());
                Some(ArbitrageExecution::new(cycle, *starter, token))
            })
            .collect();
        info!("pipeline::run: {} candidates at block {block}", executions.len());

        for execution in &mut executions {
            self.prepare(arbitrager, execution, now);
        }

        verify(&mut executions, ledger).await;

        for execution in executions.iter().filter(|execution| !execution.is_verified()) {
            debug!(
                "pipeline::run: rejected {}: {}",
                execution.cycle.describe(tokens),
                execution.rejection.as_ref().map(ToString::to_string).unwrap_or_default()
            );
            self.blacklist.add(execution.cycle.hash_key(), now);
        }

        let outcome = self
            .settle(&mut executions, arbitrager, ledger, broadcaster, block)
            .await;

        let dispatched = match &outcome {
            Ok(Some(index)) => {
                self.executed.push(executions[*index].clone());
                Some(executions[*index].clone())
            }
            _ => None,
        };

        if self.history.len() == HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(executions);
        self.status.send_replace(self.status(tokens));

        outcome.map(|_| dispatched)
    }

    /// Solves the trade size and assembles the call
    fn prepare(&self, arbitrager: &mut CircularArbitrager, execution: &mut ArbitrageExecution, now: u64) {
        let optimum = match arbitrager.find_optimal_amounts(&execution.cycle, execution.starter.fee) {
            Ok(optimum) => optimum,
            Err(e) => {
                execution.reject(Rejection::new(format!("optimization failed: {e}")));
                return;
            }
        };
        execution.optimum = Some(optimum);

        if optimum.net <= I256::ZERO {
            execution.reject(Rejection::new("unprofitable after optimization"));
            return;
        }

        match assemble(
            optimum.input,
            &execution.cycle,
            arbitrager.graph(),
            &execution.starter,
            self.settings.flash_contract,
            U256::from(now + DEADLINE_SECONDS),
        ) {
            Ok(call) => {
                execution.call = Some(call);
                execution.state = ExecutionState::Verifying;
            }
            Err(e) => execution.reject(Rejection::new(format!("assembly failed: {e}"))),
        }
    }

    /// Prices the verified candidates and dispatches the most profitable one.
    /// Returns its position in `executions`.
    async fn settle(
        &self,
        executions: &mut [ArbitrageExecution],
        arbitrager: &CircularArbitrager,
        ledger: &impl Ledger,
        broadcaster: &impl Broadcaster,
        block: u64,
    ) -> Result<Option<usize>> {
        if !executions.iter().any(ArbitrageExecution::is_verified) {
            return Ok(None);
        }

        let gas_price = U256::from(ledger.gas_price().await?);

        let mut ranked = Vec::new();
        for (index, execution) in executions.iter_mut().enumerate() {
            if !execution.is_verified() {
                continue;
            }
            let Some(min_liquidity) = arbitrager.min_liquidity_of(execution.cycle.token()) else {
                warn!("pipeline::settle: no liquidity recorded for {}", execution.cycle.token());
                continue;
            };
            match execution.calculate_profit(
                min_liquidity,
                self.settings.min_liquidity_usd,
                gas_price,
                self.settings.eth_price,
            ) {
                Ok(breakdown) if breakdown.net_usd > I256::ZERO => {
                    execution.state = ExecutionState::Ranked;
                    ranked.push((index, breakdown.net_usd));
                }
                Ok(_) => {}
                Err(e) => warn!("pipeline::settle: profit of {:?}: {e}", execution.cycle),
            }
        }

        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        let Some(&(best, net)) = ranked.first() else {
            debug!("pipeline::settle: nothing profitable after gas");
            return Ok(None);
        };

        let execution = &mut executions[best];
        let plan = execution.gas_plan()?;
        let Some(call) = execution.call.take() else {
            bail!("Verified candidate without a call");
        };
        let call = call.with_min_profit(plan.min_profit);
        execution.call = Some(call.clone());
        execution.plan = Some(plan);
        execution.state = ExecutionState::Dispatched;

        info!(
            "pipeline::settle: dispatching {:?}, net {net} USD (6 decimals), gas price {}",
            execution.cycle, plan.gas_price
        );

        match broadcaster.dispatch(&call, &plan, block).await {
            Ok(dispatch) => {
                execution.state = if dispatch.success {
                    ExecutionState::Succeeded
                } else {
                    ExecutionState::Failed
                };
                info!(
                    "pipeline::settle: success {}, tx {:?}",
                    dispatch.success, dispatch.tx_hash
                );
                execution.dispatch = Some(dispatch);
            }
            Err(e) => {
                error!("pipeline::settle: dispatch failed: {e}");
                execution.error = Some(e.to_string());
                execution.state = ExecutionState::Failed;
            }
        }

        Ok(Some(best))
    }
}

/// Dry runs every assembled call, [`VERIFY_BATCH`] at a time. A dry run
/// that outlives [`VERIFY_TIMEOUT`] is a rejection.
async fn verify(executions: &mut [ArbitrageExecution], ledger: &impl Ledger) {
    for chunk in executions.chunks_mut(VERIFY_BATCH) {
        let results = join_all(chunk.iter().map(|execution| async move {
            match (execution.state, &execution.call) {
                (ExecutionState::Verifying, Some(call)) => Some(
                    timeout(VERIFY_TIMEOUT, ledger.simulate(call))
                        .await
                        .unwrap_or_else(|_| Err(Rejection::new("dry run timed out"))),
                ),
                _ => None,
            }
        }))
        .await;

        for (execution, result) in chunk.iter_mut().zip(results) {
            match result {
                Some(Ok(verified)) => {
                    execution.verified = Some(verified);
                    execution.state = ExecutionState::Verified;
                }
                Some(Err(rejection)) => execution.reject(rejection),
                None => {}
            }
        }
    }
}
