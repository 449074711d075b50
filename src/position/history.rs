//! Trade history
//!
//! Append-only record of executed trades, bounded to the most recent N.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// What caused the trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeKind {
    Manual,
    Auto,
    StopLoss,
    TakeProfit,
    Emergency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub side: TradeSide,
    pub token: String,
    pub amount: f64,
    pub price: f64,
    pub pnl_pct: f64,
    pub pnl_usd: f64,
    pub kind: TradeKind,
    pub timestamp: DateTime<Utc>,
}

/// Bounded ring of trade records; the oldest entry is evicted first.
#[derive(Debug)]
pub struct TradeHistory {
    records: VecDeque<TradeRecord>,
    capacity: usize,
}

impl TradeHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, record: TradeRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TradeRecord> {
        self.records.iter()
    }

    /// The most recent `n` records, newest first.
    pub fn recent(&self, n: usize) -> Vec<&TradeRecord> {
        self.records.iter().rev().take(n).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(token: &str, pnl_usd: f64) -> TradeRecord {
        TradeRecord {
            side: TradeSide::Sell,
            token: token.to_string(),
            amount: 1.0,
            price: 100.0,
            pnl_pct: pnl_usd,
            pnl_usd,
            kind: TradeKind::StopLoss,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_bounded_eviction_drops_oldest() {
        let mut history = TradeHistory::new(2);
        history.push(record("A", 1.0));
        history.push(record("B", 2.0));
        history.push(record("C", 3.0));

        assert_eq!(history.len(), 2);
        let tokens: Vec<&str> = history.iter().map(|r| r.token.as_str()).collect();
        assert_eq!(tokens, vec!["B", "C"]);
    }

    #[test]
    fn test_recent_is_newest_first() {
        let mut history = TradeHistory::new(10);
        history.push(record("A", 1.0));
        history.push(record("B", 2.0));

        let recent = history.recent(1);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].token, "B");
    }
}
