//! Network and signer configuration.
//!
//! All network parameters (chain id, RPC endpoint, registry address, signing
//! key) travel together in [`RegistryConfig`] and are handed to the chain
//! client at construction. Nothing here is a process-wide constant, so tests
//! and multi-network callers can build their own.

use alloy::primitives::{Address, B256, TxHash};
use alloy::signers::local::PrivateKeySigner;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use url::Url;

/// Configuration errors. All pre-flight: nothing has touched the network yet.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("AGENT_PRIVATE_KEY is not set (export it or add it to .env)")]
    MissingPrivateKey,
    #[error("private key is not a hex-encoded 32-byte value")]
    InvalidPrivateKey,
    #[error("failed to create signer: {0}")]
    SignerCreation(String),
}

/// Everything needed to talk to one identity registry on one network.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// EIP-155 chain id of the target network.
    pub chain_id: u64,
    /// JSON-RPC endpoint for that network.
    pub rpc_url: Url,
    /// Identity registry contract address.
    pub registry: Address,
    /// Bound on how long to wait for transaction inclusion.
    pub tx_timeout: Duration,
    /// Hex-encoded signing key, with or without a `0x` prefix.
    private_key: SecretString,
}

impl RegistryConfig {
    pub fn new(
        chain_id: u64,
        rpc_url: Url,
        registry: Address,
        private_key: SecretString,
        tx_timeout: Duration,
    ) -> Self {
        Self {
            chain_id,
            rpc_url,
            registry,
            tx_timeout,
            private_key,
        }
    }

    /// Build the local signer from the configured private key.
    ///
    /// The key is only materialized for the duration of signer construction.
    pub fn signer(&self) -> Result<PrivateKeySigner, ConfigError> {
        let key_hex = self.private_key.expose_secret();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);
        let key_bytes = hex_decode(key_hex).map_err(|_| ConfigError::InvalidPrivateKey)?;
        if key_bytes.len() != 32 {
            return Err(ConfigError::InvalidPrivateKey);
        }
        PrivateKeySigner::from_bytes(&B256::from_slice(&key_bytes))
            .map_err(|e| ConfigError::SignerCreation(e.to_string()))
    }

    /// CAIP-style registry locator: `eip155:<chainId>:<contractAddress>`.
    pub fn locator(&self) -> String {
        format!("eip155:{}:{}", self.chain_id, self.registry)
    }

    /// Block-explorer link for a transaction, when the chain is a known one.
    pub fn explorer_tx_url(&self, tx: TxHash) -> Option<String> {
        explorer_base(self.chain_id).map(|base| format!("{base}/tx/{tx}"))
    }
}

/// Explorer base URLs for the networks this tool is commonly pointed at.
fn explorer_base(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        1 => Some("https://etherscan.io"),
        11155111 => Some("https://sepolia.etherscan.io"),
        8453 => Some("https://basescan.org"),
        84532 => Some("https://sepolia.basescan.org"),
        _ => None,
    }
}

// Minimal hex decode to avoid pulling in another crate.

fn hex_decode(hex: &str) -> Result<Vec<u8>, ()> {
    if hex.len() % 2 != 0 {
        return Err(());
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ()))
        .collect()
}
