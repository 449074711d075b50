//! Risk trigger evaluation
//!
//! Run once per cycle against every open position. Stop-loss wins over
//! take-profit, and the trailing stop only ever ratchets upward. Selling
//! and closing are the engine's job; the evaluator only emits events and
//! advances trailing levels.

use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::position::PositionLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    StopLoss,
    TakeProfit,
}

/// A fired trigger with the P&L snapshot at evaluation time
#[derive(Debug, Clone)]
pub struct TriggerEvent {
    pub position_id: u64,
    pub token: String,
    pub kind: TriggerKind,
    pub current_price: f64,
    pub pnl_pct: f64,
    pub pnl_usd: f64,
}

pub struct TriggerEvaluator {
    trailing_distance_pct: f64,
}

impl TriggerEvaluator {
    pub fn new(trailing_distance_pct: f64) -> Self {
        Self {
            trailing_distance_pct,
        }
    }

    /// Evaluate every open position against current prices. Positions with
    /// no price this cycle are skipped, never force-exited.
    pub fn evaluate(
        &self,
        ledger: &mut PositionLedger,
        prices: &HashMap<String, f64>,
    ) -> Vec<TriggerEvent> {
        let mut events = Vec::new();

        for position in ledger.positions_mut() {
            let Some(&current) = prices.get(&position.token) else {
                continue;
            };

            if current <= position.stop_loss_price {
                events.push(TriggerEvent {
                    position_id: position.id,
                    token: position.token.clone(),
                    kind: TriggerKind::StopLoss,
                    current_price: current,
                    pnl_pct: position.pnl_pct(current),
                    pnl_usd: position.pnl_usd(current),
                });
            } else if current >= position.take_profit_price {
                events.push(TriggerEvent {
                    position_id: position.id,
                    token: position.token.clone(),
                    kind: TriggerKind::TakeProfit,
                    current_price: current,
                    pnl_pct: position.pnl_pct(current),
                    pnl_usd: position.pnl_usd(current),
                });
            } else if position.trailing_enabled && current > position.high_price {
                position.high_price = current;
                let candidate = current * (1.0 - self.trailing_distance_pct / 100.0);
                // Ratchet: the stop is raised, never lowered.
                if candidate > position.stop_loss_price {
                    debug!(
                        id = position.id,
                        token = %position.token,
                        from = position.stop_loss_price,
                        to = candidate,
                        "trailing stop raised"
                    );
                    position.stop_loss_price = candidate;
                }
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices(token: &str, price: f64) -> HashMap<String, f64> {
        HashMap::from([(token.to_string(), price)])
    }

    fn ledger_with(entry: f64, trailing: bool) -> (PositionLedger, u64) {
        let mut ledger = PositionLedger::new();
        let id = ledger.open("SOL", 1.0, 1_000_000, entry, 5.0, 10.0, trailing).id;
        (ledger, id)
    }

    #[test]
    fn test_stop_loss_fires_below_level() {
        // entry=100, slPct=5 -> stop at 95; current 94 fires with -6%
        let (mut ledger, _) = ledger_with(100.0, false);
        let evaluator = TriggerEvaluator::new(5.0);

        let events = evaluator.evaluate(&mut ledger, &prices("SOL", 94.0));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TriggerKind::StopLoss);
        assert!((events[0].pnl_pct - (-6.0)).abs() < 1e-9);
        assert!((events[0].pnl_usd - (-6.0)).abs() < 1e-9);
    }

    #[test]
    fn test_take_profit_fires_above_level() {
        // entry=100, tpPct=10 -> target 110; current 111 fires with +11%
        let (mut ledger, _) = ledger_with(100.0, false);
        let evaluator = TriggerEvaluator::new(5.0);

        let events = evaluator.evaluate(&mut ledger, &prices("SOL", 111.0));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TriggerKind::TakeProfit);
        assert!((events[0].pnl_pct - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_trigger_inside_band() {
        let (mut ledger, _) = ledger_with(100.0, false);
        let evaluator = TriggerEvaluator::new(5.0);

        let events = evaluator.evaluate(&mut ledger, &prices("SOL", 102.0));
        assert!(events.is_empty());
        assert_eq!(ledger.count(), 1);
    }

    #[test]
    fn test_trailing_stop_never_decreases() {
        let (mut ledger, id) = ledger_with(100.0, true);
        let evaluator = TriggerEvaluator::new(5.0);

        let sequence = [100.0, 104.0, 103.0, 106.0, 105.0, 108.0, 107.5, 109.0];
        let mut last_stop = ledger.get(id).unwrap().stop_loss_price;
        let mut last_high = ledger.get(id).unwrap().high_price;

        for price in sequence {
            evaluator.evaluate(&mut ledger, &prices("SOL", price));
            let position = ledger.get(id).unwrap();
            assert!(position.stop_loss_price >= last_stop);
            assert!(position.high_price >= last_high);
            last_stop = position.stop_loss_price;
            last_high = position.high_price;
        }

        // Peak was 109: stop ratcheted to 109 * 0.95
        assert!((last_stop - 109.0 * 0.95).abs() < 1e-9);
        assert!((last_high - 109.0).abs() < 1e-9);
    }

    #[test]
    fn test_trailing_candidate_below_stop_is_ignored() {
        let (mut ledger, id) = ledger_with(100.0, true);
        // With a wide trailing distance the candidate stays below the
        // entry-anchored stop and must not lower it.
        let evaluator = TriggerEvaluator::new(50.0);

        evaluator.evaluate(&mut ledger, &prices("SOL", 105.0));
        let position = ledger.get(id).unwrap();
        assert!((position.stop_loss_price - 95.0).abs() < 1e-9);
        assert!((position.high_price - 105.0).abs() < 1e-9);
    }

    #[test]
    fn test_trailing_disabled_keeps_levels() {
        let (mut ledger, id) = ledger_with(100.0, false);
        let evaluator = TriggerEvaluator::new(5.0);

        evaluator.evaluate(&mut ledger, &prices("SOL", 108.0));
        let position = ledger.get(id).unwrap();
        assert!((position.stop_loss_price - 95.0).abs() < 1e-9);
        assert!((position.high_price - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_trailing_can_lift_stop_into_profit_and_fire() {
        // Wide take-profit so the run-up exercises the trailing path.
        let mut ledger = PositionLedger::new();
        let id = ledger.open("SOL", 1.0, 1_000_000, 100.0, 5.0, 50.0, true).id;
        let evaluator = TriggerEvaluator::new(5.0);

        // Run up to 130: stop ratchets to 123.5
        evaluator.evaluate(&mut ledger, &prices("SOL", 130.0));
        assert!((ledger.get(id).unwrap().stop_loss_price - 123.5).abs() < 1e-9);

        // Pull back through the ratcheted stop: fires as a stop-loss with
        // positive P&L.
        let events = evaluator.evaluate(&mut ledger, &prices("SOL", 120.0));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TriggerKind::StopLoss);
        assert!(events[0].pnl_pct > 0.0);
    }

    #[test]
    fn test_missing_price_skips_position() {
        let (mut ledger, _) = ledger_with(100.0, true);
        let evaluator = TriggerEvaluator::new(5.0);

        let events = evaluator.evaluate(&mut ledger, &HashMap::new());
        assert!(events.is_empty());
        assert_eq!(ledger.count(), 1);
    }
}
