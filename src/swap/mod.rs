//! Swap execution - aggregator quoting, broadcast, and orchestration
//!
//! The pipeline is quote -> build -> sign -> broadcast -> confirm, with all
//! retry and slippage-escalation policy owned by the executor. Nothing in
//! this module touches the position ledger.

pub mod broadcast;
pub mod executor;
pub mod jupiter;

pub use broadcast::{ConfirmStatus, RpcBroadcaster, TxBroadcaster};
pub use executor::{RetryPolicy, SwapExecutor};
pub use jupiter::{JupiterClient, Quote, SwapApi};

use serde::{Deserialize, Serialize};

/// Swap direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SwapDirection {
    Buy,
    Sell,
}

/// A swap request. Immutable once handed to the executor.
#[derive(Debug, Clone)]
pub struct SwapIntent {
    pub direction: SwapDirection,
    pub input_mint: String,
    pub output_mint: String,
    /// Input amount in atomic units.
    pub amount: u64,
    /// Per-intent slippage ceiling override, still capped by configuration.
    pub max_slippage_bps: Option<u32>,
}

impl SwapIntent {
    /// Spend `amount` of the quote currency to acquire `token`.
    pub fn buy(quote_mint: &str, token: &str, amount: u64) -> Self {
        Self {
            direction: SwapDirection::Buy,
            input_mint: quote_mint.to_string(),
            output_mint: token.to_string(),
            amount,
            max_slippage_bps: None,
        }
    }

    /// Sell `amount` of `token` back into the quote currency.
    pub fn sell(token: &str, quote_mint: &str, amount: u64) -> Self {
        Self {
            direction: SwapDirection::Sell,
            input_mint: token.to_string(),
            output_mint: quote_mint.to_string(),
            amount,
            max_slippage_bps: None,
        }
    }
}

/// Terminal outcome of a swap attempt.
///
/// `success` implies a broadcast signature exists. `confirmed` separates
/// finalized transactions from the ambiguous submitted-but-unverified state,
/// which is NOT a failure: the transaction may still land.
#[derive(Debug, Clone, Serialize)]
pub struct SwapResult {
    pub success: bool,
    pub confirmed: bool,
    pub signature: Option<String>,
    pub out_amount: u64,
    pub error: Option<String>,
}

impl SwapResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            confirmed: false,
            signature: None,
            out_amount: 0,
            error: Some(error.into()),
        }
    }

    pub fn confirmed(signature: String, out_amount: u64) -> Self {
        Self {
            success: true,
            confirmed: true,
            signature: Some(signature),
            out_amount,
            error: None,
        }
    }

    pub fn unconfirmed(signature: String, out_amount: u64) -> Self {
        Self {
            success: true,
            confirmed: false,
            signature: Some(signature),
            out_amount,
            error: None,
        }
    }
}
