//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub swap: SwapConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub dump: DumpConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    /// Ordered broadcast endpoints: primary first, fallbacks after.
    #[serde(default = "default_rpc_endpoints")]
    pub endpoints: Vec<String>,
    #[serde(default = "default_rpc_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_aggregator_url")]
    pub base_url: String,
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwapConfig {
    /// Starting slippage tolerance for the first quote.
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u32,
    /// Hard cap applied on every attempt regardless of escalation.
    #[serde(default = "default_max_slippage_bps")]
    pub max_slippage_bps: u32,
    /// Added per fresh-quote retry, up to the cap.
    #[serde(default = "default_slippage_step_bps")]
    pub slippage_step_bps: u32,
    /// Fresh-quote retries after slippage rejection or on-chain failure.
    #[serde(default = "default_max_quote_refreshes")]
    pub max_quote_refreshes: u32,
    /// Full pipeline restarts after every endpoint rejected the send.
    #[serde(default = "default_max_send_attempts")]
    pub max_send_attempts: u32,
    /// Base delay between restarts; multiplied by the attempt number.
    #[serde(default = "default_send_backoff_secs")]
    pub send_backoff_secs: u64,
    #[serde(default = "default_confirm_poll_interval_ms")]
    pub confirm_poll_interval_ms: u64,
    #[serde(default = "default_confirm_max_polls")]
    pub confirm_max_polls: u32,
    #[serde(default = "default_true")]
    pub skip_preflight: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Quote currency mint (USDC by default).
    #[serde(default = "default_quote_mint")]
    pub quote_mint: String,
    #[serde(default = "default_quote_decimals")]
    pub quote_decimals: u32,
    /// Default quote-currency amount deployed per buy.
    #[serde(default = "default_buy_amount_usd")]
    pub buy_amount_usd: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,
    #[serde(default = "default_true")]
    pub trailing_enabled: bool,
    /// Distance from the peak at which the ratcheted stop sits.
    #[serde(default = "default_trailing_distance_pct")]
    pub trailing_distance_pct: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DumpConfig {
    #[serde(default = "default_candle_interval")]
    pub candle_interval: String,
    /// Number of candles covering roughly the last hour.
    #[serde(default = "default_candle_limit")]
    pub candle_limit: usize,
    /// Change at or below this flags a dump outright.
    #[serde(default = "default_hard_drop_pct")]
    pub hard_drop_pct: f64,
    /// Change at or below this flags a dump only with volume confirmation.
    #[serde(default = "default_soft_drop_pct")]
    pub soft_drop_pct: f64,
    /// Recent-quarter volume must be this multiple of the earlier average.
    #[serde(default = "default_volume_spike_ratio")]
    pub volume_spike_ratio: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    /// Minimum price move vs. the last entry before re-entering a token.
    #[serde(default = "default_min_price_change_pct")]
    pub min_price_change_pct: f64,
    #[serde(default = "default_max_daily_trades")]
    pub max_daily_trades: u32,
    #[serde(default = "default_max_daily_loss_usd")]
    pub max_daily_loss_usd: f64,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u32,
}

/// How entry decisions are acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeMode {
    /// Execute entries as soon as admission passes.
    Auto,
    /// Queue entries as proposals that expire unless confirmed.
    SemiAuto,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_cycle_interval_secs")]
    pub cycle_interval_secs: u64,
    /// Tokens considered for new entries each cycle.
    #[serde(default)]
    pub watch_tokens: Vec<String>,
    #[serde(default = "default_trade_mode")]
    pub mode: TradeMode,
    /// Wall-clock lifetime of an unconfirmed semi-auto proposal.
    #[serde(default = "default_proposal_ttl_secs")]
    pub proposal_ttl_secs: u64,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_feed_url")]
    pub base_url: String,
    #[serde(default = "default_feed_api_key")]
    pub api_key: String,
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Path to a JSON byte-array keypair file. WALLET_PRIVATE_KEY (base58)
    /// takes precedence when set.
    #[serde(default = "default_keypair_path")]
    pub keypair_path: String,
}

// Default value functions
fn default_rpc_endpoints() -> Vec<String> {
    std::env::var("RPC_ENDPOINTS")
        .map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_else(|_| vec!["https://api.mainnet-beta.solana.com".to_string()])
}

fn default_rpc_timeout_ms() -> u64 {
    30000
}

fn default_aggregator_url() -> String {
    "https://quote-api.jup.ag/v6".to_string()
}

fn default_http_timeout_ms() -> u64 {
    10000
}

fn default_slippage_bps() -> u32 {
    50
}

fn default_max_slippage_bps() -> u32 {
    100
}

fn default_slippage_step_bps() -> u32 {
    25
}

fn default_max_quote_refreshes() -> u32 {
    2
}

fn default_max_send_attempts() -> u32 {
    3
}

fn default_send_backoff_secs() -> u64 {
    3
}

fn default_confirm_poll_interval_ms() -> u64 {
    2000
}

fn default_confirm_max_polls() -> u32 {
    15
}

fn default_quote_mint() -> String {
    // USDC
    "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string()
}

fn default_quote_decimals() -> u32 {
    6
}

fn default_buy_amount_usd() -> f64 {
    25.0
}

fn default_stop_loss_pct() -> f64 {
    5.0
}

fn default_take_profit_pct() -> f64 {
    10.0
}

fn default_trailing_distance_pct() -> f64 {
    5.0
}

fn default_candle_interval() -> String {
    "5m".to_string()
}

fn default_candle_limit() -> usize {
    12
}

fn default_hard_drop_pct() -> f64 {
    -5.0
}

fn default_soft_drop_pct() -> f64 {
    -2.0
}

fn default_volume_spike_ratio() -> f64 {
    3.0
}

fn default_max_positions() -> usize {
    3
}

fn default_min_price_change_pct() -> f64 {
    1.0
}

fn default_max_daily_trades() -> u32 {
    10
}

fn default_max_daily_loss_usd() -> f64 {
    100.0
}

fn default_cooldown_minutes() -> u32 {
    30
}

fn default_cycle_interval_secs() -> u64 {
    30
}

fn default_trade_mode() -> TradeMode {
    TradeMode::Auto
}

fn default_proposal_ttl_secs() -> u64 {
    120
}

fn default_history_limit() -> usize {
    200
}

fn default_feed_url() -> String {
    "https://public-api.birdeye.so".to_string()
}

fn default_feed_api_key() -> String {
    std::env::var("BIRDEYE_API_KEY").unwrap_or_default()
}

fn default_keypair_path() -> String {
    "credentials/keypair.json".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoints: default_rpc_endpoints(),
            timeout_ms: default_rpc_timeout_ms(),
        }
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            base_url: default_aggregator_url(),
            timeout_ms: default_http_timeout_ms(),
        }
    }
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            slippage_bps: default_slippage_bps(),
            max_slippage_bps: default_max_slippage_bps(),
            slippage_step_bps: default_slippage_step_bps(),
            max_quote_refreshes: default_max_quote_refreshes(),
            max_send_attempts: default_max_send_attempts(),
            send_backoff_secs: default_send_backoff_secs(),
            confirm_poll_interval_ms: default_confirm_poll_interval_ms(),
            confirm_max_polls: default_confirm_max_polls(),
            skip_preflight: true,
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            quote_mint: default_quote_mint(),
            quote_decimals: default_quote_decimals(),
            buy_amount_usd: default_buy_amount_usd(),
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
            trailing_enabled: true,
            trailing_distance_pct: default_trailing_distance_pct(),
        }
    }
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            candle_interval: default_candle_interval(),
            candle_limit: default_candle_limit(),
            hard_drop_pct: default_hard_drop_pct(),
            soft_drop_pct: default_soft_drop_pct(),
            volume_spike_ratio: default_volume_spike_ratio(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_positions: default_max_positions(),
            min_price_change_pct: default_min_price_change_pct(),
            max_daily_trades: default_max_daily_trades(),
            max_daily_loss_usd: default_max_daily_loss_usd(),
            cooldown_minutes: default_cooldown_minutes(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: default_cycle_interval_secs(),
            watch_tokens: vec![],
            mode: default_trade_mode(),
            proposal_ttl_secs: default_proposal_ttl_secs(),
            history_limit: default_history_limit(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_feed_url(),
            api_key: default_feed_api_key(),
            timeout_ms: default_http_timeout_ms(),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            keypair_path: default_keypair_path(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            aggregator: AggregatorConfig::default(),
            swap: SwapConfig::default(),
            trading: TradingConfig::default(),
            risk: RiskConfig::default(),
            dump: DumpConfig::default(),
            limits: LimitsConfig::default(),
            engine: EngineConfig::default(),
            feed: FeedConfig::default(),
            wallet: WalletConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix SWAPGUARD_)
            .add_source(
                config::Environment::with_prefix("SWAPGUARD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.rpc.endpoints.is_empty() {
            anyhow::bail!("at least one RPC endpoint is required");
        }

        if self.swap.max_slippage_bps > 10000 {
            anyhow::bail!("max_slippage_bps cannot exceed 10000 (100%)");
        }

        if self.swap.slippage_bps > self.swap.max_slippage_bps {
            anyhow::bail!(
                "slippage_bps ({}) exceeds max_slippage_bps ({})",
                self.swap.slippage_bps,
                self.swap.max_slippage_bps
            );
        }

        if self.trading.buy_amount_usd <= 0.0 {
            anyhow::bail!("buy_amount_usd must be positive");
        }

        if self.risk.stop_loss_pct <= 0.0 || self.risk.stop_loss_pct >= 100.0 {
            anyhow::bail!("stop_loss_pct must be between 0 and 100");
        }

        if self.risk.take_profit_pct <= 0.0 {
            anyhow::bail!("take_profit_pct must be positive");
        }

        if self.risk.trailing_distance_pct <= 0.0 || self.risk.trailing_distance_pct >= 100.0 {
            anyhow::bail!("trailing_distance_pct must be between 0 and 100");
        }

        if self.dump.hard_drop_pct >= 0.0 || self.dump.soft_drop_pct >= 0.0 {
            anyhow::bail!("dump thresholds must be negative percentages");
        }

        if self.dump.hard_drop_pct > self.dump.soft_drop_pct {
            anyhow::bail!("hard_drop_pct must be at or below soft_drop_pct");
        }

        if self.dump.volume_spike_ratio < 1.0 {
            anyhow::bail!("volume_spike_ratio must be at least 1.0");
        }

        if self.limits.max_positions == 0 {
            anyhow::bail!("max_positions must be positive");
        }

        if self.limits.max_daily_loss_usd <= 0.0 {
            anyhow::bail!("max_daily_loss_usd must be positive");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  RPC:
    endpoints: {:?}
    timeout: {}ms
  Aggregator:
    base_url: {}
  Swap:
    slippage: {}bps (cap {}bps, +{}bps per requote)
    quote refreshes: {}, send attempts: {}
  Trading:
    quote_mint: {}
    buy_amount: {} USD
  Risk:
    stop_loss: {}%, take_profit: {}%
    trailing: {} ({}% distance)
  Limits:
    max_positions: {}
    max_daily_trades: {}, max_daily_loss: {} USD
    cooldown: {}min, min re-entry move: {}%
  Feed:
    base_url: {}
    api_key: {}
  Engine:
    cycle: {}s, mode: {:?}, watching {} token(s)
"#,
            self.rpc
                .endpoints
                .iter()
                .map(|e| mask_url(e))
                .collect::<Vec<_>>(),
            self.rpc.timeout_ms,
            self.aggregator.base_url,
            self.swap.slippage_bps,
            self.swap.max_slippage_bps,
            self.swap.slippage_step_bps,
            self.swap.max_quote_refreshes,
            self.swap.max_send_attempts,
            self.trading.quote_mint,
            self.trading.buy_amount_usd,
            self.risk.stop_loss_pct,
            self.risk.take_profit_pct,
            self.risk.trailing_enabled,
            self.risk.trailing_distance_pct,
            self.limits.max_positions,
            self.limits.max_daily_trades,
            self.limits.max_daily_loss_usd,
            self.limits.cooldown_minutes,
            self.limits.min_price_change_pct,
            self.feed.base_url,
            if self.feed.api_key.is_empty() {
                "(not set)"
            } else {
                "***"
            },
            self.engine.cycle_interval_secs,
            self.engine.mode,
            self.engine.watch_tokens.len(),
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.swap.max_slippage_bps, 100);
        assert_eq!(config.limits.max_positions, 3);
        assert_eq!(config.engine.mode, TradeMode::Auto);
    }

    #[test]
    fn test_validate_rejects_uncapped_slippage() {
        let mut config = Config::default();
        config.swap.slippage_bps = 500;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_stop_loss() {
        let mut config = Config::default();
        config.risk.stop_loss_pct = 100.0;
        assert!(config.validate().is_err());

        config.risk.stop_loss_pct = -5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_dump_thresholds() {
        let mut config = Config::default();
        config.dump.hard_drop_pct = -1.0;
        config.dump.soft_drop_pct = -2.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
[limits]
max_positions = 5

[risk]
stop_loss_pct = 7.5
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.limits.max_positions, 5);
        assert!((config.risk.stop_loss_pct - 7.5).abs() < f64::EPSILON);
        // Untouched sections keep their defaults
        assert_eq!(config.swap.max_send_attempts, 3);
    }

    #[test]
    fn test_trade_mode_deserialize() {
        let json = r#""semi_auto""#;
        let mode: TradeMode = serde_json::from_str(json).unwrap();
        assert_eq!(mode, TradeMode::SemiAuto);
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("https://rpc.example.com?api-key=secret"),
            "https://rpc.example.com?***"
        );
        assert_eq!(mask_url("https://rpc.example.com"), "https://rpc.example.com");
    }
}
