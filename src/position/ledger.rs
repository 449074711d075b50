//! Open-position ledger
//!
//! Owns the set of open positions as a list with unique monotonic ids;
//! several positions per token are allowed and ids are never reused.
//! Admission policy lives in the engine - the ledger only enforces its own
//! shape: one entry per open trade, stop below entry below take-profit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// A single open position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Unique, monotonically assigned id
    pub id: u64,
    /// Token mint address
    pub token: String,
    /// Token amount in UI units, used for P&L math
    pub amount: f64,
    /// Exact on-chain amount in atomic units, used for full-position sells
    pub raw_amount: u64,
    /// Entry price in quote currency per token
    pub entry_price: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    /// Peak price seen while open; never decreases once trailing is active
    pub high_price: f64,
    pub trailing_enabled: bool,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Unrealized P&L percentage at the given price
    pub fn pnl_pct(&self, current_price: f64) -> f64 {
        (current_price - self.entry_price) / self.entry_price * 100.0
    }

    /// Unrealized P&L in quote currency at the given price
    pub fn pnl_usd(&self, current_price: f64) -> f64 {
        (current_price - self.entry_price) * self.amount
    }

    /// Re-anchor the stop-loss as a percentage below entry
    pub fn set_stop_loss_pct(&mut self, pct: f64) {
        self.stop_loss_pct = pct;
        self.stop_loss_price = self.entry_price * (1.0 - pct / 100.0);
    }

    /// Re-anchor the take-profit as a percentage above entry
    pub fn set_take_profit_pct(&mut self, pct: f64) {
        self.take_profit_pct = pct;
        self.take_profit_price = self.entry_price * (1.0 + pct / 100.0);
    }
}

/// In-memory ledger of open positions
#[derive(Debug)]
pub struct PositionLedger {
    positions: Vec<Position>,
    next_id: u64,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self {
            positions: Vec::new(),
            next_id: 1,
        }
    }

    /// Open a new position, computing stop and take-profit prices from the
    /// given percentages. Performs no admission checks.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        &mut self,
        token: &str,
        amount: f64,
        raw_amount: u64,
        entry_price: f64,
        stop_loss_pct: f64,
        take_profit_pct: f64,
        trailing_enabled: bool,
    ) -> Position {
        let id = self.next_id;
        self.next_id += 1;

        let position = Position {
            id,
            token: token.to_string(),
            amount,
            raw_amount,
            entry_price,
            stop_loss_pct,
            take_profit_pct,
            stop_loss_price: entry_price * (1.0 - stop_loss_pct / 100.0),
            take_profit_price: entry_price * (1.0 + take_profit_pct / 100.0),
            high_price: entry_price,
            trailing_enabled,
            opened_at: Utc::now(),
        };

        info!(
            id,
            token,
            amount,
            entry_price,
            stop = position.stop_loss_price,
            target = position.take_profit_price,
            "opened position"
        );

        self.positions.push(position.clone());
        position
    }

    /// Remove and return the position with the given id. Absent ids are an
    /// idempotent no-op, not an error.
    pub fn close_by_id(&mut self, id: u64) -> Option<Position> {
        let index = self.positions.iter().position(|p| p.id == id)?;
        let position = self.positions.remove(index);
        info!(id, token = %position.token, "closed position");
        Some(position)
    }

    /// Remove and return all positions, optionally only for one token.
    pub fn close_all(&mut self, token: Option<&str>) -> Vec<Position> {
        match token {
            None => std::mem::take(&mut self.positions),
            Some(token) => {
                let (closed, kept) = self
                    .positions
                    .drain(..)
                    .partition(|p| p.token == token);
                self.positions = kept;
                closed
            }
        }
    }

    pub fn count(&self) -> usize {
        self.positions.len()
    }

    pub fn list(&self, token: Option<&str>) -> Vec<&Position> {
        self.positions
            .iter()
            .filter(|p| token.map_or(true, |t| p.token == t))
            .collect()
    }

    pub fn get(&self, id: u64) -> Option<&Position> {
        self.positions.iter().find(|p| p.id == id)
    }

    pub fn position_mut(&mut self, id: u64) -> Option<&mut Position> {
        self.positions.iter_mut().find(|p| p.id == id)
    }

    pub fn positions_mut(&mut self) -> impl Iterator<Item = &mut Position> {
        self.positions.iter_mut()
    }

    /// Entry price of the most recently opened position for a token, open
    /// positions only. Used by the re-entry admission gate.
    pub fn last_entry_price(&self, token: &str) -> Option<f64> {
        self.positions
            .iter()
            .filter(|p| p.token == token)
            .max_by_key(|p| p.id)
            .map(|p| p.entry_price)
    }
}

impl Default for PositionLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_default(ledger: &mut PositionLedger, token: &str, entry: f64) -> Position {
        ledger.open(token, 1.0, 1_000_000, entry, 5.0, 10.0, true)
    }

    #[test]
    fn test_price_bracketing_invariant() {
        let mut ledger = PositionLedger::new();
        let position = open_default(&mut ledger, "SOL", 100.0);

        assert!(position.stop_loss_price < position.entry_price);
        assert!(position.entry_price < position.take_profit_price);
        assert!((position.stop_loss_price - 95.0).abs() < 1e-9);
        assert!((position.take_profit_price - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_ids_are_unique_and_monotonic() {
        let mut ledger = PositionLedger::new();
        let a = open_default(&mut ledger, "SOL", 100.0);
        let b = open_default(&mut ledger, "SOL", 101.5);
        assert!(b.id > a.id);

        // Ids are never reused, even after a close.
        ledger.close_by_id(b.id);
        let c = open_default(&mut ledger, "SOL", 103.0);
        assert!(c.id > b.id);
    }

    #[test]
    fn test_close_by_id_is_idempotent() {
        let mut ledger = PositionLedger::new();
        let position = open_default(&mut ledger, "SOL", 100.0);

        assert!(ledger.close_by_id(position.id).is_some());
        assert_eq!(ledger.count(), 0);

        // Second close of the same id: no-op, not an error.
        assert!(ledger.close_by_id(position.id).is_none());
        assert_eq!(ledger.count(), 0);
    }

    #[test]
    fn test_close_all_with_token_filter() {
        let mut ledger = PositionLedger::new();
        open_default(&mut ledger, "SOL", 100.0);
        open_default(&mut ledger, "JUP", 2.0);
        open_default(&mut ledger, "SOL", 102.0);

        let closed = ledger.close_all(Some("SOL"));
        assert_eq!(closed.len(), 2);
        assert_eq!(ledger.count(), 1);
        assert_eq!(ledger.list(None)[0].token, "JUP");

        let rest = ledger.close_all(None);
        assert_eq!(rest.len(), 1);
        assert_eq!(ledger.count(), 0);
    }

    #[test]
    fn test_pnl_math() {
        let mut ledger = PositionLedger::new();
        let position = open_default(&mut ledger, "SOL", 100.0);

        assert!((position.pnl_pct(94.0) - (-6.0)).abs() < 1e-9);
        assert!((position.pnl_pct(111.0) - 11.0).abs() < 1e-9);
        assert!((position.pnl_usd(94.0) - (-6.0)).abs() < 1e-9);
    }

    #[test]
    fn test_sol_scenario_brackets_and_pnl() {
        // amount=0.01, entry=200, SL=5%, TP=10%
        let mut ledger = PositionLedger::new();
        let position = ledger.open("SOL", 0.01, 10_000_000, 200.0, 5.0, 10.0, false);

        assert!((position.stop_loss_price - 190.0).abs() < 1e-9);
        assert!((position.take_profit_price - 220.0).abs() < 1e-9);
        assert!((position.pnl_usd(189.0) - (-0.11)).abs() < 1e-9);
    }

    #[test]
    fn test_set_levels_reanchor_from_entry() {
        let mut ledger = PositionLedger::new();
        let id = open_default(&mut ledger, "SOL", 100.0).id;

        let position = ledger.position_mut(id).unwrap();
        position.set_stop_loss_pct(8.0);
        position.set_take_profit_pct(20.0);

        assert!((position.stop_loss_price - 92.0).abs() < 1e-9);
        assert!((position.take_profit_price - 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_last_entry_price_tracks_most_recent() {
        let mut ledger = PositionLedger::new();
        assert!(ledger.last_entry_price("SOL").is_none());

        open_default(&mut ledger, "SOL", 100.0);
        let second = open_default(&mut ledger, "SOL", 105.0);
        assert_eq!(ledger.last_entry_price("SOL"), Some(105.0));

        ledger.close_by_id(second.id);
        assert_eq!(ledger.last_entry_price("SOL"), Some(100.0));
    }
}
