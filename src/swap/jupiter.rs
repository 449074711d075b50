//! Jupiter aggregator API client
//!
//! Wraps the v6 quote and swap endpoints. The swap endpoint returns a
//! complete unsigned transaction, so no instructions are assembled here.
//!
//! Rate limits apply - don't spam requests

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::AggregatorConfig;
use crate::error::{Error, Result};

/// Quoting and transaction-building seam, mockable in tests.
#[async_trait]
pub trait SwapApi: Send + Sync {
    /// Quote an exact-in swap at the given slippage tolerance.
    async fn get_quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u32,
    ) -> Result<Quote>;

    /// Request an unsigned transaction bound to the quote and wallet.
    /// Returns the base64-encoded transaction payload.
    async fn build_swap_transaction(&self, quote: &Quote, user_pubkey: &str) -> Result<String>;
}

/// A priced route, valid for a short window.
#[derive(Debug, Clone)]
pub struct Quote {
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: u64,
    pub out_amount: u64,
    pub slippage_bps: u32,
    pub price_impact_pct: f64,
    /// Raw quote payload, passed back verbatim to the swap endpoint.
    pub raw: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    input_mint: String,
    output_mint: String,
    in_amount: String,
    out_amount: String,
    #[serde(default)]
    price_impact_pct: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapRequest<'a> {
    quote_response: &'a Value,
    user_public_key: &'a str,
    wrap_and_unwrap_sol: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    swap_transaction: Option<String>,
    error: Option<String>,
}

/// Jupiter HTTP API client
pub struct JupiterClient {
    client: Client,
    base_url: String,
}

impl JupiterClient {
    pub fn new(config: &AggregatorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Parse a raw quote payload, rejecting no-route responses.
fn parse_quote(raw: Value, slippage_bps: u32) -> Result<Quote> {
    if let Some(error) = raw.get("error").and_then(|e| e.as_str()) {
        return Err(Error::Quote(error.to_string()));
    }

    let parsed: QuoteResponse = serde_json::from_value(raw.clone())
        .map_err(|e| Error::Quote(format!("Malformed quote response: {}", e)))?;

    let in_amount: u64 = parsed
        .in_amount
        .parse()
        .map_err(|e| Error::Quote(format!("Bad inAmount: {}", e)))?;
    let out_amount: u64 = parsed
        .out_amount
        .parse()
        .map_err(|e| Error::Quote(format!("Bad outAmount: {}", e)))?;

    // Zero output means no viable route; retrying the same request blindly
    // cannot help.
    if out_amount == 0 {
        return Err(Error::Quote(
            "no viable route: quoted output amount is zero".to_string(),
        ));
    }

    let price_impact_pct = parsed
        .price_impact_pct
        .and_then(|p| p.parse().ok())
        .unwrap_or(0.0);

    Ok(Quote {
        input_mint: parsed.input_mint,
        output_mint: parsed.output_mint,
        in_amount,
        out_amount,
        slippage_bps,
        price_impact_pct,
        raw,
    })
}

#[async_trait]
impl SwapApi for JupiterClient {
    async fn get_quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u32,
    ) -> Result<Quote> {
        let url = format!("{}/quote", self.base_url);

        debug!(
            input_mint,
            output_mint, amount, slippage_bps, "requesting quote"
        );

        let response = self
            .client
            .get(&url)
            .query(&[
                ("inputMint", input_mint.to_string()),
                ("outputMint", output_mint.to_string()),
                ("amount", amount.to_string()),
                ("slippageBps", slippage_bps.to_string()),
            ])
            .send()
            .await
            .map_err(|e| Error::Quote(format!("HTTP request failed: {}", e)))?;

        let raw: Value = response
            .json()
            .await
            .map_err(|e| Error::Quote(format!("Failed to parse response: {}", e)))?;

        parse_quote(raw, slippage_bps)
    }

    async fn build_swap_transaction(&self, quote: &Quote, user_pubkey: &str) -> Result<String> {
        let url = format!("{}/swap", self.base_url);

        let request = SwapRequest {
            quote_response: &quote.raw,
            user_public_key: user_pubkey,
            wrap_and_unwrap_sol: true,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Build(format!("HTTP request failed: {}", e)))?;

        let swap_response: SwapResponse = response
            .json()
            .await
            .map_err(|e| Error::Build(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = swap_response.error {
            return Err(Error::Build(error));
        }

        swap_response
            .swap_transaction
            .ok_or_else(|| Error::Build("no transaction payload in response".to_string()))
    }
}
