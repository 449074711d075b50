//! Swap orchestration: quote, build, sign, broadcast, confirm
//!
//! All retry, backoff, and slippage-escalation policy lives here, as
//! explicit bounded loops over a plain `RetryPolicy` value. The executor
//! never mutates the position ledger; callers act on the returned
//! `SwapResult`.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::SwapConfig;
use crate::error::Error;
use crate::swap::broadcast::{ConfirmStatus, TxBroadcaster};
use crate::swap::jupiter::SwapApi;
use crate::swap::{SwapIntent, SwapResult};
use crate::wallet::TxSigner;

/// Bounds and delays for the execution pipeline. A plain value so tests can
/// shrink the delays to milliseconds and assert the bounds directly.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Fresh-quote retries after a slippage rejection or on-chain failure.
    pub max_quote_refreshes: u32,
    /// Full restarts after every endpoint rejected the transaction.
    pub max_send_attempts: u32,
    /// Base delay between full restarts; multiplied by the attempt number.
    pub send_backoff: Duration,
    pub confirm_poll_interval: Duration,
    pub confirm_max_polls: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &SwapConfig) -> Self {
        Self {
            max_quote_refreshes: config.max_quote_refreshes,
            max_send_attempts: config.max_send_attempts,
            send_backoff: Duration::from_secs(config.send_backoff_secs),
            confirm_poll_interval: Duration::from_millis(config.confirm_poll_interval_ms),
            confirm_max_polls: config.confirm_max_polls,
        }
    }
}

enum BroadcastOutcome {
    /// One endpoint accepted the transaction.
    Sent(String),
    /// The network rejected the quoted slippage tolerance; requote.
    SlippageRejected(String),
    /// Every endpoint errored.
    AllFailed,
}

/// Drives a swap intent to a terminal `SwapResult`.
pub struct SwapExecutor {
    api: Arc<dyn SwapApi>,
    broadcaster: Arc<dyn TxBroadcaster>,
    signer: Arc<dyn TxSigner>,
    policy: RetryPolicy,
    default_slippage_bps: u32,
    slippage_step_bps: u32,
    max_slippage_bps: u32,
    dry_run: bool,
}

impl SwapExecutor {
    pub fn new(
        api: Arc<dyn SwapApi>,
        broadcaster: Arc<dyn TxBroadcaster>,
        signer: Arc<dyn TxSigner>,
        config: &SwapConfig,
        dry_run: bool,
    ) -> Self {
        Self {
            api,
            broadcaster,
            signer,
            policy: RetryPolicy::from_config(config),
            default_slippage_bps: config.slippage_bps,
            slippage_step_bps: config.slippage_step_bps,
            max_slippage_bps: config.max_slippage_bps,
            dry_run,
        }
    }

    /// Slippage tolerance for the given requote round, never above the cap.
    fn slippage_for(&self, refresh_round: u32, override_bps: Option<u32>) -> u32 {
        let base = override_bps.unwrap_or(self.default_slippage_bps);
        base.saturating_add(self.slippage_step_bps.saturating_mul(refresh_round))
            .min(self.max_slippage_bps)
    }

    /// Execute a swap intent to completion.
    ///
    /// Terminal states: confirmed success, ambiguous success (broadcast but
    /// unverified within the polling window), or failure with a reason.
    pub async fn execute(&self, intent: &SwapIntent) -> SwapResult {
        let mut quote_refreshes: u32 = 0;
        let mut send_attempts: u32 = 0;

        // Bounded: every `continue` below first increments one of the two
        // counters and checks it against its limit.
        loop {
            let slippage_bps = self.slippage_for(quote_refreshes, intent.max_slippage_bps);

            let quote = match self
                .api
                .get_quote(
                    &intent.input_mint,
                    &intent.output_mint,
                    intent.amount,
                    slippage_bps,
                )
                .await
            {
                Ok(quote) => quote,
                // No route / malformed quote is structural; a blind retry
                // cannot fix it.
                Err(e) => return SwapResult::failure(e.to_string()),
            };

            debug!(
                out_amount = quote.out_amount,
                slippage_bps, "quote received"
            );

            if self.dry_run {
                info!(
                    "DRY-RUN: would swap {} {} -> {} (est. out {})",
                    intent.amount, intent.input_mint, intent.output_mint, quote.out_amount
                );
                return SwapResult::unconfirmed("dry-run".to_string(), quote.out_amount);
            }

            let unsigned = match self
                .api
                .build_swap_transaction(&quote, &self.signer.pubkey())
                .await
            {
                Ok(tx) => tx,
                Err(e) => return SwapResult::failure(e.to_string()),
            };

            let signed = match self.signer.sign_transaction(&unsigned) {
                Ok(tx) => tx,
                Err(e) => return SwapResult::failure(e.to_string()),
            };

            match self.broadcast_once(&signed).await {
                BroadcastOutcome::Sent(signature) => {
                    match self.await_confirmation(&signature).await {
                        ConfirmStatus::Confirmed => {
                            info!(%signature, "swap confirmed");
                            return SwapResult::confirmed(signature, quote.out_amount);
                        }
                        ConfirmStatus::Pending => {
                            // The transaction may still land; report the
                            // ambiguity instead of pretending failure.
                            warn!(%signature, "confirmation window elapsed, outcome unverified");
                            return SwapResult::unconfirmed(signature, quote.out_amount);
                        }
                        ConfirmStatus::Failed(reason) => {
                            if quote_refreshes >= self.policy.max_quote_refreshes {
                                return SwapResult::failure(format!(
                                    "transaction failed on-chain: {}",
                                    reason
                                ));
                            }
                            quote_refreshes += 1;
                            warn!(%signature, %reason, "on-chain failure, retrying with a fresh quote");
                        }
                    }
                }
                BroadcastOutcome::SlippageRejected(reason) => {
                    if quote_refreshes >= self.policy.max_quote_refreshes {
                        return SwapResult::failure(format!(
                            "slippage tolerance exceeded: {}",
                            reason
                        ));
                    }
                    quote_refreshes += 1;
                    warn!(%reason, "slippage rejection, requoting");
                }
                BroadcastOutcome::AllFailed => {
                    send_attempts += 1;
                    if send_attempts >= self.policy.max_send_attempts {
                        return SwapResult::failure("all endpoints failed");
                    }
                    let delay = self.policy.send_backoff * send_attempts;
                    warn!(
                        attempt = send_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "every endpoint rejected the send, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Walk the endpoint list in order. A slippage rejection aborts the walk
    /// immediately: the quote is stale for every endpoint, not just this one.
    async fn broadcast_once(&self, signed_tx_base64: &str) -> BroadcastOutcome {
        let endpoints: Vec<String> = self.broadcaster.endpoints().to_vec();

        for endpoint in &endpoints {
            match self
                .broadcaster
                .send_transaction(endpoint, signed_tx_base64)
                .await
            {
                Ok(signature) => {
                    info!(%endpoint, %signature, "transaction accepted");
                    return BroadcastOutcome::Sent(signature);
                }
                Err(Error::SlippageExceeded(reason)) => {
                    return BroadcastOutcome::SlippageRejected(reason);
                }
                Err(e) => {
                    warn!(%endpoint, error = %e, "endpoint rejected send, trying next");
                }
            }
        }

        BroadcastOutcome::AllFailed
    }

    async fn await_confirmation(&self, signature: &str) -> ConfirmStatus {
        for poll in 0..self.policy.confirm_max_polls {
            match self.broadcaster.signature_status(signature).await {
                Ok(ConfirmStatus::Confirmed) => {
                    debug!(%signature, poll, "confirmed");
                    return ConfirmStatus::Confirmed;
                }
                Ok(ConfirmStatus::Failed(reason)) => return ConfirmStatus::Failed(reason),
                Ok(ConfirmStatus::Pending) => {}
                Err(e) => {
                    warn!(%signature, error = %e, "status poll failed");
                }
            }
            tokio::time::sleep(self.policy.confirm_poll_interval).await;
        }

        ConfirmStatus::Pending
    }
}
