//! Chain access: transaction submission and receipt polling.
//!
//! [`ChainClient`] is the seam between the registration workflow and the
//! network. The production implementation ([`RegistryClient`]) signs with a
//! local key and talks JSON-RPC over HTTP via alloy; tests substitute scripted
//! doubles. Neither operation is ever retried here: `register` mints a new
//! token on every successful call, so blind retry risks a duplicate identity.

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, B256, Bytes, TxHash};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionReceipt;
use alloy::sol;
use async_trait::async_trait;
use std::time::Duration;

use crate::config::{ConfigError, RegistryConfig};

sol! {
    /// The two-member surface of the ERC-8004 identity registry this tool
    /// touches: the registration call and the event it emits.
    #[sol(rpc)]
    interface IIdentityRegistry {
        function register(string agentURI) external returns (uint256 agentId);
        event Registered(uint256 indexed agentId, string agentURI, address indexed owner);
    }
}

/// How often to poll for a receipt while waiting for inclusion.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// One emitted log, decoupled from the transport's receipt types so the
/// event decoder stays pure and testable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

/// Confirmation that a submitted transaction was included.
#[derive(Debug, Clone)]
pub struct SubmissionReceipt {
    pub transaction_hash: TxHash,
    /// Whether execution succeeded. A mined-but-reverted transaction is
    /// included with `status == false`.
    pub status: bool,
    /// Emitted logs, in execution order.
    pub logs: Vec<EventLog>,
}

/// Chain-layer failures, classified so the caller can report and exit
/// distinctly per kind.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("RPC endpoint unreachable or failing: {0}")]
    Network(String),
    #[error("signer cannot cover gas: {0}")]
    Funds(String),
    #[error("nonce conflict with a pending transaction: {0}")]
    Nonce(String),
    #[error("registry rejected the transaction: {0}")]
    Rejected(String),
    #[error("transaction {tx} not confirmed within {waited_secs}s")]
    ConfirmationTimeout { tx: TxHash, waited_secs: u64 },
}

/// Read/write access to one identity registry on one network.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Sign and dispatch `register(agentURI)`. Returns as soon as the
    /// transaction is accepted into the mempool. Never retried.
    async fn submit_registration(&self, agent_uri: &str) -> Result<TxHash, ChainError>;

    /// Wait until the transaction is included or the bound elapses. A timeout
    /// leaves all external state untouched; the transaction itself may still
    /// land later.
    async fn wait_for_receipt(
        &self,
        tx: TxHash,
        timeout: Duration,
    ) -> Result<SubmissionReceipt, ChainError>;
}

/// Production [`ChainClient`] backed by an alloy HTTP provider with a local
/// signing key.
pub struct RegistryClient {
    provider: DynProvider,
    registry: Address,
}

impl RegistryClient {
    /// Build a client from the resolved network configuration. Fails only on
    /// an unusable signing key; no network traffic happens here.
    pub fn new(config: &RegistryConfig) -> Result<Self, ConfigError> {
        let signer = config.signer()?;
        let wallet = EthereumWallet::from(signer);
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(config.rpc_url.clone())
            .erased();
        Ok(Self {
            provider,
            registry: config.registry,
        })
    }
}

#[async_trait]
impl ChainClient for RegistryClient {
    async fn submit_registration(&self, agent_uri: &str) -> Result<TxHash, ChainError> {
        let registry = IIdentityRegistry::new(self.registry, self.provider.clone());
        let pending = registry
            .register(agent_uri.to_string())
            .send()
            .await
            .map_err(classify_submit_error)?;
        Ok(*pending.tx_hash())
    }

    async fn wait_for_receipt(
        &self,
        tx: TxHash,
        timeout: Duration,
    ) -> Result<SubmissionReceipt, ChainError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.provider.get_transaction_receipt(tx).await {
                Ok(Some(receipt)) => return Ok(convert_receipt(receipt)),
                Ok(None) => {}
                Err(err) => return Err(ChainError::Network(err.to_string())),
            }
            if tokio::time::Instant::now() + RECEIPT_POLL_INTERVAL > deadline {
                return Err(ChainError::ConfirmationTimeout {
                    tx,
                    waited_secs: timeout.as_secs(),
                });
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}

fn convert_receipt(receipt: TransactionReceipt) -> SubmissionReceipt {
    let logs = receipt
        .inner
        .logs()
        .iter()
        .map(|log| EventLog {
            address: log.inner.address,
            topics: log.inner.data.topics().to_vec(),
            data: log.inner.data.data.clone(),
        })
        .collect();
    SubmissionReceipt {
        transaction_hash: receipt.transaction_hash,
        status: receipt.status(),
        logs,
    }
}

/// Sort a submission failure into the error taxonomy. Node implementations
/// disagree on exact wording, so this matches the common geth/reth phrases
/// and treats anything transport-shaped as a network failure.
fn classify_submit_error(err: alloy::contract::Error) -> ChainError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("insufficient funds") || lower.contains("insufficient balance") {
        ChainError::Funds(message)
    } else if lower.contains("nonce too low")
        || lower.contains("nonce too high")
        || lower.contains("replacement transaction underpriced")
        || lower.contains("already known")
    {
        ChainError::Nonce(message)
    } else if lower.contains("revert") || lower.contains("execution failed") {
        ChainError::Rejected(message)
    } else {
        ChainError::Network(message)
    }
}
