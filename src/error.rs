//! Error types for the trading engine

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the trading engine
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // Swap pipeline errors
    #[error("Quote failed: {0}")]
    Quote(String),

    #[error("Transaction build failed: {0}")]
    Build(String),

    #[error("Signing failed: {0}")]
    Sign(String),

    #[error("Broadcast failed on {endpoint}: {reason}")]
    Broadcast { endpoint: String, reason: String },

    #[error("All RPC endpoints failed")]
    AllEndpointsFailed,

    #[error("Slippage tolerance exceeded: {0}")]
    SlippageExceeded(String),

    #[error("Transaction failed on-chain: {0}")]
    OnChainFailure(String),

    #[error("Swap failed: {0}")]
    SwapFailed(String),

    // Admission rejections
    #[error("Insufficient balance: {available} available, {required} required")]
    InsufficientBalance { available: f64, required: f64 },

    #[error("Position capacity reached: {open}/{max} open")]
    CapacityExceeded { open: usize, max: usize },

    #[error("Re-entry too soon for {token}: price moved {delta_pct:.2}%, need {min_pct:.2}%")]
    ReentryTooSoon {
        token: String,
        delta_pct: f64,
        min_pct: f64,
    },

    #[error("Cooldown active: {remaining_secs}s remaining")]
    CooldownActive { remaining_secs: i64 },

    #[error("Daily trade limit reached: {count}/{max}")]
    DailyTradeLimitReached { count: u32, max: u32 },

    #[error("Daily loss limit reached: lost {lost:.2} USD, limit is {limit:.2} USD")]
    DailyLossLimitReached { lost: f64, limit: f64 },

    // RPC / feed errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Market feed error: {0}")]
    Feed(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Broadcast { .. }
                | Error::SlippageExceeded(_)
                | Error::OnChainFailure(_)
                | Error::Rpc(_)
                | Error::Feed(_)
        )
    }

    /// Check if this error is an admission-gate rejection
    pub fn is_admission_rejection(&self) -> bool {
        matches!(
            self,
            Error::InsufficientBalance { .. }
                | Error::CapacityExceeded { .. }
                | Error::ReentryTooSoon { .. }
                | Error::CooldownActive { .. }
                | Error::DailyTradeLimitReached { .. }
                | Error::DailyLossLimitReached { .. }
        )
    }
}

// Conversion from solana_client errors
impl From<solana_client::client_error::ClientError> for Error {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        Error::Rpc(e.to_string())
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Broadcast {
            endpoint: "https://rpc".to_string(),
            reason: "timeout".to_string()
        }
        .is_retryable());
        assert!(Error::SlippageExceeded("0x1771".to_string()).is_retryable());
        assert!(Error::OnChainFailure("InstructionError".to_string()).is_retryable());

        assert!(!Error::Quote("no route".to_string()).is_retryable());
        assert!(!Error::Build("empty payload".to_string()).is_retryable());
        assert!(!Error::Sign("missing key".to_string()).is_retryable());
    }

    #[test]
    fn test_admission_rejection_classification() {
        assert!(Error::CapacityExceeded { open: 3, max: 3 }.is_admission_rejection());
        assert!(Error::DailyTradeLimitReached { count: 10, max: 10 }.is_admission_rejection());
        assert!(Error::CooldownActive { remaining_secs: 60 }.is_admission_rejection());

        assert!(!Error::Rpc("503".to_string()).is_admission_rejection());
    }
}
