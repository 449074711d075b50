//! Position tracking module

pub mod history;
pub mod ledger;

pub use history::{TradeHistory, TradeKind, TradeRecord, TradeSide};
pub use ledger::{Position, PositionLedger};
