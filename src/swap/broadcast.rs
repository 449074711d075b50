//! Transaction broadcast and confirmation over an ordered RPC endpoint list
//!
//! The primary endpoint is first; fallbacks follow. The executor walks the
//! list in order, so endpoint ordering is the failover policy.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use solana_account_decoder::UiAccountData;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_client::rpc_request::TokenAccountsFilter;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use solana_transaction_status::TransactionConfirmationStatus;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RpcConfig;
use crate::error::{Error, Result};

/// Signature confirmation state as seen by the network.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmStatus {
    /// Confirmed or finalized.
    Confirmed,
    /// Not yet visible or still processing.
    Pending,
    /// Landed with an on-chain error.
    Failed(String),
}

/// Broadcast seam, mockable in tests.
#[async_trait]
pub trait TxBroadcaster: Send + Sync {
    /// Ordered endpoint list: primary first.
    fn endpoints(&self) -> &[String];

    /// Send a signed transaction through one endpoint. Returns the signature.
    async fn send_transaction(&self, endpoint: &str, signed_tx_base64: &str) -> Result<String>;

    /// Check confirmation status for a signature.
    async fn signature_status(&self, signature: &str) -> Result<ConfirmStatus>;

    /// Total UI-unit balance of `mint` held by `owner`.
    async fn token_balance(&self, owner: &str, mint: &str) -> Result<f64>;

    /// Decimal places of a mint.
    async fn token_decimals(&self, mint: &str) -> Result<u8>;
}

/// Returns true when an RPC error message indicates the swap was rejected
/// for exceeding the quoted slippage tolerance (Jupiter custom error 0x1771).
pub fn is_slippage_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("slippage") || lower.contains("0x1771")
}

/// RPC-backed broadcaster over the configured endpoint list.
pub struct RpcBroadcaster {
    endpoints: Vec<String>,
    clients: Vec<Arc<RpcClient>>,
    send_timeout: Duration,
    skip_preflight: bool,
}

impl RpcBroadcaster {
    pub fn new(config: &RpcConfig, skip_preflight: bool) -> Result<Self> {
        if config.endpoints.is_empty() {
            return Err(Error::Config(
                "at least one RPC endpoint is required".to_string(),
            ));
        }

        let timeout = Duration::from_millis(config.timeout_ms);
        let clients = config
            .endpoints
            .iter()
            .map(|endpoint| {
                Arc::new(RpcClient::new_with_timeout_and_commitment(
                    endpoint.clone(),
                    timeout,
                    CommitmentConfig::confirmed(),
                ))
            })
            .collect();

        Ok(Self {
            endpoints: config.endpoints.clone(),
            clients,
            send_timeout: timeout,
            skip_preflight,
        })
    }

    fn client_for(&self, endpoint: &str) -> Result<&Arc<RpcClient>> {
        self.endpoints
            .iter()
            .position(|e| e == endpoint)
            .map(|i| &self.clients[i])
            .ok_or_else(|| Error::Rpc(format!("unknown endpoint: {}", endpoint)))
    }

    /// Primary endpoint client; used for reads and confirmation polling.
    fn primary(&self) -> &Arc<RpcClient> {
        &self.clients[0]
    }

    fn decode_transaction(signed_tx_base64: &str) -> Result<VersionedTransaction> {
        let bytes = BASE64
            .decode(signed_tx_base64)
            .map_err(|e| Error::Serialization(format!("invalid transaction base64: {}", e)))?;

        bincode::deserialize(&bytes)
            .map_err(|e| Error::Serialization(format!("invalid transaction bytes: {}", e)))
    }
}

#[async_trait]
impl TxBroadcaster for RpcBroadcaster {
    fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    async fn send_transaction(&self, endpoint: &str, signed_tx_base64: &str) -> Result<String> {
        let client = self.client_for(endpoint)?;
        let transaction = Self::decode_transaction(signed_tx_base64)?;

        let config = RpcSendTransactionConfig {
            skip_preflight: self.skip_preflight,
            // The executor owns retry policy; the node must not re-send.
            max_retries: Some(0),
            ..Default::default()
        };

        let send = client.send_transaction_with_config(&transaction, config);
        let signature = tokio::time::timeout(self.send_timeout, send)
            .await
            .map_err(|_| Error::Broadcast {
                endpoint: endpoint.to_string(),
                reason: format!("timed out after {}ms", self.send_timeout.as_millis()),
            })?
            .map_err(|e| {
                let reason = e.to_string();
                if is_slippage_error(&reason) {
                    Error::SlippageExceeded(reason)
                } else {
                    Error::Broadcast {
                        endpoint: endpoint.to_string(),
                        reason,
                    }
                }
            })?;

        Ok(signature.to_string())
    }

    async fn signature_status(&self, signature: &str) -> Result<ConfirmStatus> {
        let signature = Signature::from_str(signature)
            .map_err(|e| Error::Rpc(format!("invalid signature: {}", e)))?;

        let response = self.primary().get_signature_statuses(&[signature]).await?;

        let status = match response.value.into_iter().flatten().next() {
            Some(status) => status,
            None => return Ok(ConfirmStatus::Pending),
        };

        if let Some(err) = status.err {
            return Ok(ConfirmStatus::Failed(err.to_string()));
        }

        match status.confirmation_status {
            Some(TransactionConfirmationStatus::Confirmed)
            | Some(TransactionConfirmationStatus::Finalized) => Ok(ConfirmStatus::Confirmed),
            _ => Ok(ConfirmStatus::Pending),
        }
    }

    async fn token_balance(&self, owner: &str, mint: &str) -> Result<f64> {
        let owner =
            Pubkey::from_str(owner).map_err(|e| Error::Rpc(format!("invalid owner: {}", e)))?;
        let mint =
            Pubkey::from_str(mint).map_err(|e| Error::Rpc(format!("invalid mint: {}", e)))?;

        let accounts = self
            .primary()
            .get_token_accounts_by_owner(&owner, TokenAccountsFilter::Mint(mint))
            .await?;

        let mut total = 0.0;
        for keyed in accounts {
            if let UiAccountData::Json(parsed) = keyed.account.data {
                let amount = parsed
                    .parsed
                    .get("info")
                    .and_then(|info| info.get("tokenAmount"))
                    .and_then(|token| token.get("uiAmount"))
                    .and_then(|value| value.as_f64());
                if let Some(amount) = amount {
                    total += amount;
                }
            }
        }

        Ok(total)
    }

    async fn token_decimals(&self, mint: &str) -> Result<u8> {
        let mint =
            Pubkey::from_str(mint).map_err(|e| Error::Rpc(format!("invalid mint: {}", e)))?;

        let supply = self.primary().get_token_supply(&mint).await?;
        Ok(supply.decimals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slippage_error_classification() {
        assert!(is_slippage_error(
            "Transaction simulation failed: custom program error: 0x1771"
        ));
        assert!(is_slippage_error("SlippageToleranceExceeded"));
        assert!(is_slippage_error("slippage tolerance exceeded"));

        assert!(!is_slippage_error("blockhash not found"));
        assert!(!is_slippage_error("connection refused"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = RpcBroadcaster::decode_transaction("not-base64!").unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));

        // Valid base64 but not a transaction
        let err = RpcBroadcaster::decode_transaction("aGVsbG8=").unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_new_requires_endpoints() {
        let config = RpcConfig {
            endpoints: vec![],
            timeout_ms: 1000,
        };
        assert!(RpcBroadcaster::new(&config, true).is_err());
    }
}
