//! Typed command intents
//!
//! The command surface is a typed enum, not text: parsing free-form chat
//! input happens in the collaborator layer. Each intent is answered with a
//! structured outcome that layer can render however it likes.

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::position::Position;

#[derive(Debug, Clone)]
pub enum CloseTarget {
    Id(u64),
    Token(String),
}

#[derive(Debug, Clone)]
pub enum CommandIntent {
    /// Open a position; `quote_amount` defaults to the configured buy size.
    Open {
        token: String,
        quote_amount: Option<f64>,
    },
    Close {
        target: CloseTarget,
    },
    CloseAll,
    SetStopLoss {
        token: String,
        pct: f64,
    },
    SetTakeProfit {
        token: String,
        pct: f64,
    },
    Pause,
    Resume,
    /// Confirm a queued semi-auto proposal before it expires.
    Confirm {
        proposal_id: u64,
    },
    Status,
}

#[derive(Debug)]
pub enum CommandOutcome {
    Opened {
        position: Position,
    },
    /// Semi-auto mode: the entry was queued, not executed.
    Proposed {
        proposal_id: u64,
        token: String,
        expires_at: DateTime<Utc>,
    },
    Closed {
        positions: Vec<Position>,
        realized_pnl_usd: f64,
    },
    Updated {
        positions: Vec<Position>,
    },
    Rejected {
        reason: String,
    },
    Status(StatusReport),
    Paused,
    Resumed,
}

#[derive(Debug, Clone)]
pub struct PositionSummary {
    pub id: u64,
    pub token: String,
    pub amount: f64,
    pub entry_price: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    /// None when no price has been seen for the token yet.
    pub pnl_pct: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub open_positions: Vec<PositionSummary>,
    pub daily_trade_count: u32,
    pub daily_pnl_usd: f64,
    pub paused: bool,
}

/// An intent plus its reply slot.
#[derive(Debug)]
pub struct CommandRequest {
    pub intent: CommandIntent,
    pub reply: oneshot::Sender<CommandOutcome>,
}

/// Cloneable handle the collaborator layer uses to submit intents.
#[derive(Clone)]
pub struct CommandHandle {
    tx: mpsc::Sender<CommandRequest>,
}

impl CommandHandle {
    /// Create a handle and the receiver the engine consumes.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<CommandRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Submit an intent and wait for the engine's structured answer.
    pub async fn submit(&self, intent: CommandIntent) -> Result<CommandOutcome> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CommandRequest { intent, reply })
            .await
            .map_err(|_| Error::Internal("engine stopped".to_string()))?;
        rx.await
            .map_err(|_| Error::Internal("engine dropped the reply".to_string()))
    }
}
