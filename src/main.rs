//! `mintmark` — register an agent identity with an on-chain identity registry.

use std::path::PathBuf;
use std::time::Duration;

use alloy::primitives::Address;
use clap::Parser;
use secrecy::SecretString;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use url::Url;

use mintmark::chain::RegistryClient;
use mintmark::config::{ConfigError, RegistryConfig};
use mintmark::error::RegisterError;
use mintmark::metadata::{AgentId, MetadataRecord};
use mintmark::workflow::{self, Outcome};

/// Register an agent identity with an ERC-8004 identity registry.
///
/// Reads the agent metadata file, embeds it in a data URI, submits
/// `register(agentURI)` to the registry, waits for confirmation, and writes
/// the assigned agent id back into the metadata file.
#[derive(Debug, Parser)]
#[command(name = "mintmark", version)]
struct Cli {
    /// Path to the agent metadata JSON file.
    #[arg(long, env = "AGENT_METADATA", default_value = "agent.json")]
    metadata: PathBuf,

    /// JSON-RPC endpoint of the target network.
    #[arg(long, env = "RPC_URL")]
    rpc_url: Url,

    /// EIP-155 chain id of the target network.
    #[arg(long, env = "CHAIN_ID")]
    chain_id: u64,

    /// Identity registry contract address.
    #[arg(long, env = "IDENTITY_REGISTRY")]
    registry: Address,

    /// Seconds to wait for transaction inclusion before giving up.
    #[arg(long, env = "TX_TIMEOUT_SECS", default_value_t = 120)]
    timeout_secs: u64,

    /// Re-register even if the metadata already holds an agent id for this
    /// network.
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() {
    // A local .env may carry AGENT_PRIVATE_KEY and the network parameters.
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("error: {} failed: {err}", err.phase());
        std::process::exit(err.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), RegisterError> {
    // The signing key is env/.env only, never a flag: flags leak into shell
    // history and process listings.
    let private_key = std::env::var("AGENT_PRIVATE_KEY")
        .map(SecretString::from)
        .map_err(|_| ConfigError::MissingPrivateKey)?;

    let config = RegistryConfig::new(
        cli.chain_id,
        cli.rpc_url,
        cli.registry,
        private_key,
        Duration::from_secs(cli.timeout_secs),
    );
    let mut record = MetadataRecord::load(&cli.metadata)?;
    let client = RegistryClient::new(&config)?;

    match workflow::run_registration(&client, &config, &mut record, cli.force).await? {
        Outcome::AlreadyRegistered {
            agent_id,
            agent_registry,
        } => {
            println!("already registered: agentId {agent_id} on {agent_registry}");
            println!("nothing submitted; use --force to register again");
        }
        Outcome::Registered {
            tx_hash,
            agent_id,
            agent_registry,
            explorer_url,
        } => {
            println!("registration confirmed in transaction {tx_hash}");
            if let Some(url) = explorer_url {
                println!("  explorer: {url}");
            }
            match agent_id {
                AgentId::Assigned(id) => {
                    println!("  agentId {id} recorded for {agent_registry}");
                }
                AgentId::Unknown => {
                    println!(
                        "  agentId could not be resolved from the receipt; \
                         recorded as UNKNOWN for {agent_registry} (reconcile manually)"
                    );
                }
            }
            println!("  updated {}", record.path().display());
        }
    }
    Ok(())
}
