//! Operator alerts
//!
//! The engine emits typed alerts through this seam; rendering and transport
//! (Telegram, etc.) belong to the collaborator layer. The built-in sink
//! writes to the log so nothing is ever silently dropped.

use tracing::{error, info, warn};

use crate::position::{TradeKind, TradeSide};
use crate::risk::TriggerKind;

#[derive(Debug, Clone)]
pub enum Alert {
    EngineStarted {
        watch_tokens: usize,
        dry_run: bool,
    },
    TradeExecuted {
        side: TradeSide,
        token: String,
        amount: f64,
        price: f64,
        kind: TradeKind,
        signature: Option<String>,
    },
    TriggerFired {
        token: String,
        kind: TriggerKind,
        pnl_pct: f64,
        pnl_usd: f64,
    },
    /// A triggered sell failed: the asset is still held and the ledger still
    /// tracks it. A human has to intervene.
    ManualActionRequired {
        token: String,
        amount: f64,
        error: String,
    },
    DumpDetected {
        token: String,
        reason: String,
    },
    EmergencyExitSummary {
        closed: usize,
        failed: usize,
        realized_pnl_usd: f64,
    },
    TradingPaused,
    TradingResumed,
}

pub trait AlertSink: Send + Sync {
    fn notify(&self, alert: &Alert);
}

/// Log-backed sink used when no external transport is wired in.
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn notify(&self, alert: &Alert) {
        match alert {
            Alert::EngineStarted {
                watch_tokens,
                dry_run,
            } => {
                info!(watch_tokens, dry_run, "engine started");
            }
            Alert::TradeExecuted {
                side,
                token,
                amount,
                price,
                kind,
                signature,
            } => {
                info!(
                    ?side,
                    %token,
                    amount,
                    price,
                    ?kind,
                    signature = signature.as_deref().unwrap_or("-"),
                    "trade executed"
                );
            }
            Alert::TriggerFired {
                token,
                kind,
                pnl_pct,
                pnl_usd,
            } => {
                info!(%token, ?kind, pnl_pct, pnl_usd, "risk trigger fired");
            }
            Alert::ManualActionRequired {
                token,
                amount,
                error,
            } => {
                error!(
                    %token,
                    amount,
                    %error,
                    "MANUAL ACTION REQUIRED: sell failed, asset is still held"
                );
            }
            Alert::DumpDetected { token, reason } => {
                warn!(%token, %reason, "dump detected");
            }
            Alert::EmergencyExitSummary {
                closed,
                failed,
                realized_pnl_usd,
            } => {
                warn!(closed, failed, realized_pnl_usd, "emergency exit finished");
            }
            Alert::TradingPaused => warn!("trading paused"),
            Alert::TradingResumed => info!("trading resumed"),
        }
    }
}
