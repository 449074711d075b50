//! Wallet keypair loading and local transaction signing
//!
//! The private key never leaves the process: unsigned transactions come in
//! as base64, get signed locally, and only the signed bytes go out.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use solana_sdk::transaction::VersionedTransaction;
use tracing::info;

use crate::config::WalletConfig;
use crate::error::{Error, Result};

/// Local signing seam, mockable in tests.
pub trait TxSigner: Send + Sync {
    /// Base58 wallet public key.
    fn pubkey(&self) -> String;

    /// Sign a base64-encoded unsigned transaction, returning signed base64.
    fn sign_transaction(&self, unsigned_tx_base64: &str) -> Result<String>;
}

/// File- or env-backed signing keypair.
pub struct LocalWallet {
    keypair: Keypair,
}

impl std::fmt::Debug for LocalWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the secret key material.
        f.debug_struct("LocalWallet")
            .field("pubkey", &self.keypair.pubkey())
            .finish_non_exhaustive()
    }
}

impl LocalWallet {
    /// Load the wallet. `WALLET_PRIVATE_KEY` (base58) takes precedence over
    /// the configured keypair file so containers can avoid mounting key files.
    pub fn load(config: &WalletConfig) -> Result<Self> {
        if let Ok(raw) = std::env::var("WALLET_PRIVATE_KEY") {
            return Self::from_base58(raw.trim());
        }
        Self::from_file(&config.keypair_path)
    }

    /// Load from a JSON byte-array keypair file (solana-keygen format).
    pub fn from_file(path: &str) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read keypair {}: {}", path, e)))?;

        let bytes: Vec<u8> = serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("Failed to parse keypair {}: {}", path, e)))?;

        let keypair = Keypair::from_bytes(&bytes)
            .map_err(|e| Error::Config(format!("Invalid keypair: {}", e)))?;

        info!("Loaded keypair: {}", keypair.pubkey());
        Ok(Self { keypair })
    }

    /// Load from a base58-encoded secret key string.
    pub fn from_base58(encoded: &str) -> Result<Self> {
        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|e| Error::Config(format!("Invalid base58 key: {}", e)))?;

        let keypair = Keypair::from_bytes(&bytes)
            .map_err(|e| Error::Config(format!("Invalid keypair: {}", e)))?;

        Ok(Self { keypair })
    }
}

impl TxSigner for LocalWallet {
    fn pubkey(&self) -> String {
        self.keypair.pubkey().to_string()
    }

    fn sign_transaction(&self, unsigned_tx_base64: &str) -> Result<String> {
        let bytes = BASE64
            .decode(unsigned_tx_base64)
            .map_err(|e| Error::Sign(format!("invalid transaction base64: {}", e)))?;

        let unsigned: VersionedTransaction = bincode::deserialize(&bytes)
            .map_err(|e| Error::Sign(format!("invalid transaction bytes: {}", e)))?;

        let signed = VersionedTransaction::try_new(unsigned.message, &[&self.keypair])
            .map_err(|e| Error::Sign(e.to_string()))?;

        let signed_bytes = bincode::serialize(&signed)
            .map_err(|e| Error::Sign(format!("failed to serialize: {}", e)))?;

        Ok(BASE64.encode(signed_bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::message::{Message, VersionedMessage};
    use solana_sdk::signature::Signature;
    use std::io::Write;

    fn unsigned_transfer(payer: &Keypair) -> String {
        let message = VersionedMessage::Legacy(Message::new(&[], Some(&payer.pubkey())));
        let unsigned = VersionedTransaction {
            signatures: vec![Signature::default()],
            message,
        };
        BASE64.encode(bincode::serialize(&unsigned).unwrap())
    }

    #[test]
    fn test_sign_transaction_fills_signature() {
        let keypair = Keypair::new();
        let unsigned = unsigned_transfer(&keypair);

        let wallet = LocalWallet::from_base58(&keypair.to_base58_string()).unwrap();
        let signed_b64 = wallet.sign_transaction(&unsigned).unwrap();

        let signed: VersionedTransaction =
            bincode::deserialize(&BASE64.decode(signed_b64).unwrap()).unwrap();
        assert_eq!(signed.signatures.len(), 1);
        assert_ne!(signed.signatures[0], Signature::default());
    }

    #[test]
    fn test_from_file_round_trip() {
        let keypair = Keypair::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap()).unwrap();

        let wallet = LocalWallet::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(wallet.pubkey(), keypair.pubkey().to_string());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = LocalWallet::from_file("/nonexistent/keypair.json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_sign_rejects_garbage() {
        let wallet = LocalWallet::from_base58(&Keypair::new().to_base58_string()).unwrap();
        assert!(matches!(
            wallet.sign_transaction("not-base64!"),
            Err(Error::Sign(_))
        ));
    }
}
