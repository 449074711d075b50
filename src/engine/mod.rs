//! Cycle driver and lifecycle controller
//!
//! One task owns the ledger, history, and budget - the single writer. The
//! interval tick runs, in order: daily rollover, proposal expiry, price
//! refresh, trigger evaluation and handling, dump detection, and entries.
//! Command intents arrive on a queue and are applied between cycle steps,
//! never during one, so a trigger and a manual command cannot race on the
//! same position. Swaps are awaited inline: at most one is in flight
//! system-wide.

pub mod admission;
pub mod commands;

pub use admission::AdmissionController;
pub use commands::{
    CloseTarget, CommandHandle, CommandIntent, CommandOutcome, CommandRequest, PositionSummary,
    StatusReport,
};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Local, Utc};
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{Config, TradeMode};
use crate::error::{Error, Result};
use crate::feed::{Candle, MarketFeed};
use crate::notify::{Alert, AlertSink};
use crate::position::{Position, PositionLedger, TradeHistory, TradeKind, TradeRecord, TradeSide};
use crate::risk::{dump, RiskBudget, TriggerEvaluator, TriggerEvent, TriggerKind};
use crate::swap::{SwapExecutor, SwapIntent, TxBroadcaster};

/// Decides whether to open a position this cycle. Decision generation (AI
/// consensus, advisory feeds) is a collaborator concern; implementations
/// return the quote-currency amount to deploy, or None to stay out.
#[async_trait]
pub trait EntrySignal: Send + Sync {
    async fn entry_for(&self, token: &str, price: f64, candles: &[Candle]) -> Option<f64>;
}

/// Default signal: never enters. Opens still happen via command intents.
pub struct NoEntry;

#[async_trait]
impl EntrySignal for NoEntry {
    async fn entry_for(&self, _token: &str, _price: f64, _candles: &[Candle]) -> Option<f64> {
        None
    }
}

/// A semi-auto entry awaiting confirmation; discarded at `expires_at`.
#[derive(Debug, Clone)]
struct TradeProposal {
    id: u64,
    token: String,
    quote_amount: f64,
    expires_at: DateTime<Utc>,
}

pub struct TradeEngine {
    config: Config,
    executor: SwapExecutor,
    broadcaster: Arc<dyn TxBroadcaster>,
    feed: Arc<dyn MarketFeed>,
    alerts: Arc<dyn AlertSink>,
    entry_signal: Arc<dyn EntrySignal>,
    wallet_pubkey: String,
    dry_run: bool,

    ledger: PositionLedger,
    history: TradeHistory,
    budget: RiskBudget,
    admission: AdmissionController,
    evaluator: TriggerEvaluator,

    /// Last seen price per token; refreshed each cycle.
    prices: HashMap<String, f64>,
    proposals: Vec<TradeProposal>,
    next_proposal_id: u64,
    paused: bool,
}

impl TradeEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        executor: SwapExecutor,
        broadcaster: Arc<dyn TxBroadcaster>,
        feed: Arc<dyn MarketFeed>,
        alerts: Arc<dyn AlertSink>,
        entry_signal: Arc<dyn EntrySignal>,
        wallet_pubkey: String,
        dry_run: bool,
    ) -> Self {
        let history = TradeHistory::new(config.engine.history_limit);
        let admission = AdmissionController::new(config.limits.clone());
        let evaluator = TriggerEvaluator::new(config.risk.trailing_distance_pct);

        Self {
            config,
            executor,
            broadcaster,
            feed,
            alerts,
            entry_signal,
            wallet_pubkey,
            dry_run,
            ledger: PositionLedger::new(),
            history,
            budget: RiskBudget::new(Local::now()),
            admission,
            evaluator,
            prices: HashMap::new(),
            proposals: Vec::new(),
            next_proposal_id: 1,
            paused: false,
        }
    }

    /// Run until the command channel closes.
    pub async fn run(&mut self, mut cmd_rx: mpsc::Receiver<CommandRequest>) {
        self.alerts.notify(&Alert::EngineStarted {
            watch_tokens: self.config.engine.watch_tokens.len(),
            dry_run: self.dry_run,
        });

        let mut ticker = interval(Duration::from_secs(self.config.engine.cycle_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                request = cmd_rx.recv() => {
                    match request {
                        Some(request) => {
                            let outcome = self.handle_command(request.intent).await;
                            let _ = request.reply.send(outcome);
                        }
                        None => {
                            info!("command channel closed, stopping engine");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// One full cycle. Public so embedders and tests can drive the engine
    /// without the ticker.
    pub async fn run_cycle(&mut self) {
        self.budget.roll_over(Local::now());
        self.expire_proposals(Utc::now());
        self.refresh_prices().await;
        self.evaluate_triggers().await;
        self.detect_dumps().await;
        if !self.paused {
            self.consider_entries().await;
        }
    }

    async fn refresh_prices(&mut self) {
        let mut tokens: BTreeSet<String> =
            self.config.engine.watch_tokens.iter().cloned().collect();
        for position in self.ledger.list(None) {
            tokens.insert(position.token.clone());
        }

        for token in tokens {
            match self.feed.get_price(&token).await {
                Ok(price) => {
                    self.prices.insert(token, price);
                }
                Err(e) => {
                    // Advisory failure: skip this token for the cycle.
                    warn!(%token, error = %e, "price refresh failed, skipping");
                }
            }
        }
    }

    async fn evaluate_triggers(&mut self) {
        let events = self.evaluator.evaluate(&mut self.ledger, &self.prices);
        for event in events {
            self.handle_trigger(event).await;
        }
    }

    async fn handle_trigger(&mut self, event: TriggerEvent) {
        self.alerts.notify(&Alert::TriggerFired {
            token: event.token.clone(),
            kind: event.kind,
            pnl_pct: event.pnl_pct,
            pnl_usd: event.pnl_usd,
        });

        // The position may already be gone if an earlier event this cycle
        // closed it (several positions can share a token).
        let Some(position) = self.ledger.get(event.position_id).cloned() else {
            return;
        };

        let kind = match event.kind {
            TriggerKind::StopLoss => TradeKind::StopLoss,
            TriggerKind::TakeProfit => TradeKind::TakeProfit,
        };

        self.sell_position(&position, event.current_price, kind).await;
    }

    /// Sell a full position. On success the entry is removed, the trade is
    /// recorded, and the daily budget updated. On failure the position STAYS
    /// in the ledger - the asset is still held - and an operator alert names
    /// it.
    async fn sell_position(
        &mut self,
        position: &Position,
        current_price: f64,
        kind: TradeKind,
    ) -> bool {
        let intent = SwapIntent::sell(
            &position.token,
            &self.config.trading.quote_mint,
            position.raw_amount,
        );

        let result = self.executor.execute(&intent).await;

        if !result.success {
            self.alerts.notify(&Alert::ManualActionRequired {
                token: position.token.clone(),
                amount: position.amount,
                error: result
                    .error
                    .unwrap_or_else(|| "unknown error".to_string()),
            });
            return false;
        }

        let closed = self.ledger.close_by_id(position.id);
        debug_assert!(closed.is_some(), "sold a position missing from the ledger");

        let pnl_pct = position.pnl_pct(current_price);
        let pnl_usd = position.pnl_usd(current_price);

        self.history.push(TradeRecord {
            side: TradeSide::Sell,
            token: position.token.clone(),
            amount: position.amount,
            price: current_price,
            pnl_pct,
            pnl_usd,
            kind,
            timestamp: Utc::now(),
        });
        self.budget.record_trade(Local::now(), pnl_usd);

        self.alerts.notify(&Alert::TradeExecuted {
            side: TradeSide::Sell,
            token: position.token.clone(),
            amount: position.amount,
            price: current_price,
            kind,
            signature: result.signature,
        });

        true
    }

    async fn detect_dumps(&mut self) {
        let tokens: BTreeSet<String> = self
            .ledger
            .list(None)
            .into_iter()
            .map(|p| p.token.clone())
            .collect();

        for token in tokens {
            let candles = match self
                .feed
                .get_candles(
                    &token,
                    &self.config.dump.candle_interval,
                    self.config.dump.candle_limit,
                )
                .await
            {
                Ok(candles) => candles,
                Err(e) => {
                    warn!(%token, error = %e, "candle fetch failed, skipping dump check");
                    continue;
                }
            };

            let verdict = dump::detect(&candles, &self.config.dump);
            if verdict.is_dump {
                self.alerts.notify(&Alert::DumpDetected {
                    token: token.clone(),
                    reason: verdict.reason,
                });
                self.emergency_exit_all().await;
                break;
            }
        }
    }

    /// Sell every open position. Successes are closed and aggregated into
    /// one summary; failures stay open for manual handling - the ledger
    /// never pretends a held asset is gone.
    pub async fn emergency_exit_all(&mut self) -> (Vec<Position>, f64) {
        let open: Vec<Position> = self.ledger.list(None).into_iter().cloned().collect();

        let mut closed = Vec::new();
        let mut failed = 0usize;
        let mut realized_pnl_usd = 0.0;

        for position in open {
            let price = self
                .prices
                .get(&position.token)
                .copied()
                .unwrap_or(position.entry_price);

            if self.sell_position(&position, price, TradeKind::Emergency).await {
                realized_pnl_usd += position.pnl_usd(price);
                closed.push(position);
            } else {
                failed += 1;
            }
        }

        self.alerts.notify(&Alert::EmergencyExitSummary {
            closed: closed.len(),
            failed,
            realized_pnl_usd,
        });

        (closed, realized_pnl_usd)
    }

    async fn consider_entries(&mut self) {
        for token in self.config.engine.watch_tokens.clone() {
            let Some(&price) = self.prices.get(&token) else {
                continue;
            };

            let candles = self
                .feed
                .get_candles(
                    &token,
                    &self.config.dump.candle_interval,
                    self.config.dump.candle_limit,
                )
                .await
                .unwrap_or_default();

            let Some(quote_amount) = self.entry_signal.entry_for(&token, price, &candles).await
            else {
                continue;
            };

            match self.config.engine.mode {
                TradeMode::Auto => {
                    if let Err(e) = self.open_position(&token, quote_amount, TradeKind::Auto).await
                    {
                        info!(%token, reason = %e, "entry rejected");
                    }
                }
                TradeMode::SemiAuto => {
                    self.queue_proposal(token, quote_amount);
                }
            }
        }
    }

    fn queue_proposal(&mut self, token: String, quote_amount: f64) -> TradeProposal {
        let id = self.next_proposal_id;
        self.next_proposal_id += 1;

        let proposal = TradeProposal {
            id,
            token,
            quote_amount,
            expires_at: Utc::now()
                + ChronoDuration::seconds(self.config.engine.proposal_ttl_secs as i64),
        };

        info!(
            id,
            token = %proposal.token,
            quote_amount,
            expires_at = %proposal.expires_at,
            "queued trade proposal"
        );

        self.proposals.push(proposal.clone());
        proposal
    }

    fn expire_proposals(&mut self, now: DateTime<Utc>) {
        let before = self.proposals.len();
        self.proposals.retain(|p| p.expires_at > now);
        let expired = before - self.proposals.len();
        if expired > 0 {
            debug!(expired, "discarded expired trade proposals");
        }
    }

    /// Full admission-gated open: balance check, swap, ledger entry.
    async fn open_position(
        &mut self,
        token: &str,
        quote_amount: f64,
        kind: TradeKind,
    ) -> Result<Position> {
        let price = *self
            .prices
            .get(token)
            .ok_or_else(|| Error::Feed(format!("no price for {}", token)))?;

        let quote_balance = self
            .broadcaster
            .token_balance(&self.wallet_pubkey, &self.config.trading.quote_mint)
            .await?;

        self.admission.check_open(
            &self.ledger,
            &self.budget,
            Local::now(),
            token,
            price,
            quote_balance,
            quote_amount,
        )?;

        // Resolve decimals before the swap so a lookup failure cannot leave
        // a filled buy untracked.
        let decimals = self.broadcaster.token_decimals(token).await?;

        let amount_atoms =
            (quote_amount * 10f64.powi(self.config.trading.quote_decimals as i32)) as u64;
        let intent = SwapIntent::buy(&self.config.trading.quote_mint, token, amount_atoms);

        let result = self.executor.execute(&intent).await;
        if !result.success {
            return Err(Error::SwapFailed(
                result.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        let amount_ui = result.out_amount as f64 / 10f64.powi(decimals as i32);
        let position = self.ledger.open(
            token,
            amount_ui,
            result.out_amount,
            price,
            self.config.risk.stop_loss_pct,
            self.config.risk.take_profit_pct,
            self.config.risk.trailing_enabled,
        );

        self.history.push(TradeRecord {
            side: TradeSide::Buy,
            token: token.to_string(),
            amount: amount_ui,
            price,
            pnl_pct: 0.0,
            pnl_usd: 0.0,
            kind,
            timestamp: Utc::now(),
        });
        self.budget.record_trade(Local::now(), 0.0);

        self.alerts.notify(&Alert::TradeExecuted {
            side: TradeSide::Buy,
            token: token.to_string(),
            amount: amount_ui,
            price,
            kind,
            signature: result.signature,
        });

        Ok(position)
    }

    /// Apply one command intent now. Normally intents arrive through the
    /// `CommandHandle` queue; embedders driving the engine directly call
    /// this between cycles.
    pub async fn handle_command(&mut self, intent: CommandIntent) -> CommandOutcome {
        match intent {
            CommandIntent::Open {
                token,
                quote_amount,
            } => {
                let amount = quote_amount.unwrap_or(self.config.trading.buy_amount_usd);

                // A manual open may name a token the cycle has not priced yet.
                if !self.prices.contains_key(&token) {
                    match self.feed.get_price(&token).await {
                        Ok(price) => {
                            self.prices.insert(token.clone(), price);
                        }
                        Err(e) => {
                            return CommandOutcome::Rejected {
                                reason: e.to_string(),
                            }
                        }
                    }
                }

                match self.open_position(&token, amount, TradeKind::Manual).await {
                    Ok(position) => CommandOutcome::Opened { position },
                    Err(e) => CommandOutcome::Rejected {
                        reason: e.to_string(),
                    },
                }
            }

            CommandIntent::Close { target } => {
                let targets: Vec<Position> = match &target {
                    CloseTarget::Id(id) => self.ledger.get(*id).cloned().into_iter().collect(),
                    CloseTarget::Token(token) => self
                        .ledger
                        .list(Some(token))
                        .into_iter()
                        .cloned()
                        .collect(),
                };

                if targets.is_empty() {
                    return CommandOutcome::Rejected {
                        reason: "no matching open position".to_string(),
                    };
                }

                let mut closed = Vec::new();
                let mut realized_pnl_usd = 0.0;
                for position in targets {
                    let price = self
                        .prices
                        .get(&position.token)
                        .copied()
                        .unwrap_or(position.entry_price);
                    if self.sell_position(&position, price, TradeKind::Manual).await {
                        realized_pnl_usd += position.pnl_usd(price);
                        closed.push(position);
                    }
                }

                CommandOutcome::Closed {
                    positions: closed,
                    realized_pnl_usd,
                }
            }

            CommandIntent::CloseAll => {
                let (positions, realized_pnl_usd) = self.emergency_exit_all().await;
                CommandOutcome::Closed {
                    positions,
                    realized_pnl_usd,
                }
            }

            CommandIntent::SetStopLoss { token, pct } => {
                if pct <= 0.0 || pct >= 100.0 {
                    return CommandOutcome::Rejected {
                        reason: "stop-loss pct must be between 0 and 100".to_string(),
                    };
                }
                let mut updated = Vec::new();
                for position in self.ledger.positions_mut() {
                    if position.token == token {
                        position.set_stop_loss_pct(pct);
                        updated.push(position.clone());
                    }
                }
                if updated.is_empty() {
                    CommandOutcome::Rejected {
                        reason: format!("no open position for {}", token),
                    }
                } else {
                    CommandOutcome::Updated { positions: updated }
                }
            }

            CommandIntent::SetTakeProfit { token, pct } => {
                if pct <= 0.0 {
                    return CommandOutcome::Rejected {
                        reason: "take-profit pct must be positive".to_string(),
                    };
                }
                let mut updated = Vec::new();
                for position in self.ledger.positions_mut() {
                    if position.token == token {
                        position.set_take_profit_pct(pct);
                        updated.push(position.clone());
                    }
                }
                if updated.is_empty() {
                    CommandOutcome::Rejected {
                        reason: format!("no open position for {}", token),
                    }
                } else {
                    CommandOutcome::Updated { positions: updated }
                }
            }

            CommandIntent::Pause => {
                self.paused = true;
                self.alerts.notify(&Alert::TradingPaused);
                CommandOutcome::Paused
            }

            CommandIntent::Resume => {
                self.paused = false;
                self.alerts.notify(&Alert::TradingResumed);
                CommandOutcome::Resumed
            }

            CommandIntent::Confirm { proposal_id } => {
                self.expire_proposals(Utc::now());
                let Some(index) = self.proposals.iter().position(|p| p.id == proposal_id) else {
                    return CommandOutcome::Rejected {
                        reason: "proposal not found or expired".to_string(),
                    };
                };
                let proposal = self.proposals.remove(index);

                match self
                    .open_position(&proposal.token, proposal.quote_amount, TradeKind::Manual)
                    .await
                {
                    Ok(position) => CommandOutcome::Opened { position },
                    Err(e) => CommandOutcome::Rejected {
                        reason: e.to_string(),
                    },
                }
            }

            CommandIntent::Status => CommandOutcome::Status(self.status_report()),
        }
    }

    pub fn status_report(&self) -> StatusReport {
        let open_positions = self
            .ledger
            .list(None)
            .into_iter()
            .map(|position| PositionSummary {
                id: position.id,
                token: position.token.clone(),
                amount: position.amount,
                entry_price: position.entry_price,
                stop_loss_price: position.stop_loss_price,
                take_profit_price: position.take_profit_price,
                pnl_pct: self
                    .prices
                    .get(&position.token)
                    .map(|&price| position.pnl_pct(price)),
            })
            .collect();

        StatusReport {
            open_positions,
            daily_trade_count: self.budget.daily_trade_count,
            daily_pnl_usd: self.budget.daily_pnl_usd,
            paused: self.paused,
        }
    }

    /// Open-position count; exposed for embedders and tests.
    pub fn open_position_count(&self) -> usize {
        self.ledger.count()
    }
}
