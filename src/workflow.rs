//! Registration workflow: one sequential run from metadata to persisted
//! registry reference.
//!
//! The two network calls are the only suspension points and run strictly in
//! order; a second transaction is never issued before the first is confirmed
//! or abandoned. Cancellation mid-run needs no cleanup: the metadata file is
//! only written in the final phase, and a transaction already sent stays
//! sent either way.

use std::time::Duration;

use tracing::{debug, info, warn};

use alloy::primitives::TxHash;

use crate::chain::{ChainClient, ChainError};
use crate::config::RegistryConfig;
use crate::error::{Phase, RegisterError};
use crate::events::{self, Resolution};
use crate::metadata::{AgentId, MetadataRecord, Registration};
use crate::uri;

/// Registration run lifecycle.
///
/// ```text
/// unregistered → submitted → confirmed → resolved ───┐
///                                      ↘ unresolved ─┴→ persisted
/// ```
///
/// Every non-terminal state can move to `aborted` on a fatal error.
/// `unresolved` is a degraded success, not a failure: the transaction landed,
/// only the assigned id could not be read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Unregistered,
    Submitted,
    Confirmed,
    Resolved,
    Unresolved,
    Persisted,
    Aborted,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Persisted | Self::Aborted)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Unregistered => "unregistered",
            Self::Submitted => "submitted",
            Self::Confirmed => "confirmed",
            Self::Resolved => "resolved",
            Self::Unresolved => "unresolved",
            Self::Persisted => "persisted",
            Self::Aborted => "aborted",
        })
    }
}

/// Successful terminal outcome of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The metadata already holds an assigned id for this network; nothing
    /// was submitted and the file is untouched.
    AlreadyRegistered {
        agent_id: u64,
        agent_registry: String,
    },
    /// A registration transaction was confirmed and the reference persisted.
    Registered {
        tx_hash: TxHash,
        agent_id: AgentId,
        agent_registry: String,
        explorer_url: Option<String>,
    },
}

/// Run the registration lifecycle end to end.
///
/// `force` skips the pre-submission idempotency guard and registers again
/// even if the record already carries an assigned id for this network.
pub async fn run_registration<C: ChainClient + ?Sized>(
    client: &C,
    config: &RegistryConfig,
    record: &mut MetadataRecord,
    force: bool,
) -> Result<Outcome, RegisterError> {
    let agent_registry = config.locator();

    // Guard against minting a second, redundant identity on re-run. A prior
    // UNKNOWN entry doesn't block: that run never resolved an id.
    match record.assigned_registration(config.chain_id) {
        Some(existing) if force => {
            warn!(
                agent_id = %existing.agent_id,
                "already registered on this network, re-registering anyway (--force)"
            );
        }
        Some(Registration {
            agent_id: AgentId::Assigned(agent_id),
            agent_registry,
        }) => {
            info!(agent_id, registry = %agent_registry, "already registered");
            return Ok(Outcome::AlreadyRegistered {
                agent_id,
                agent_registry,
            });
        }
        _ => {}
    }

    let mut state = RunState::Unregistered;
    let agent_uri = uri::encode_metadata(&record.to_bytes());
    debug!(uri_len = agent_uri.len(), "metadata encoded into agent URI");

    info!(chain_id = config.chain_id, registry = %config.registry, "submitting registration");
    let tx_hash = client
        .submit_registration(&agent_uri)
        .await
        .map_err(|e| abort(&mut state, Phase::Submit, e))?;
    state = RunState::Submitted;
    info!(tx = %tx_hash, state = %state, "transaction accepted");

    info!(timeout_secs = config.tx_timeout.as_secs(), "waiting for confirmation");
    let receipt = client
        .wait_for_receipt(tx_hash, config.tx_timeout)
        .await
        .map_err(|e| abort(&mut state, Phase::Confirm, e))?;
    if !receipt.status {
        return Err(abort(
            &mut state,
            Phase::Confirm,
            ChainError::Rejected(format!("transaction {tx_hash} reverted on-chain")),
        ));
    }
    state = RunState::Confirmed;
    info!(tx = %tx_hash, logs = receipt.logs.len(), state = %state, "transaction confirmed");

    let agent_id = match events::decode_registration(&receipt, config.registry) {
        Resolution::Resolved(id) => {
            state = RunState::Resolved;
            info!(agent_id = id, state = %state, "agent id resolved from receipt");
            AgentId::Assigned(id)
        }
        Resolution::Unresolved => {
            state = RunState::Unresolved;
            warn!(
                state = %state,
                "could not resolve agent id from receipt; recording the UNKNOWN sentinel"
            );
            AgentId::Unknown
        }
    };

    let registration = Registration {
        agent_id,
        agent_registry: agent_registry.clone(),
    };
    record.record_registration(&registration);
    record.persist().map_err(|e| {
        state = RunState::Aborted;
        RegisterError::from(e)
    })?;
    state = RunState::Persisted;
    info!(path = %record.path().display(), state = %state, "registry reference persisted");

    Ok(Outcome::Registered {
        tx_hash,
        agent_id,
        agent_registry,
        explorer_url: config.explorer_tx_url(tx_hash),
    })
}

fn abort(state: &mut RunState, phase: Phase, source: ChainError) -> RegisterError {
    *state = RunState::Aborted;
    RegisterError::chain(phase, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{EventLog, IIdentityRegistry, SubmissionReceipt};
    use alloy::primitives::{Address, Bytes, U256};
    use alloy::sol_types::SolEvent;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use secrecy::SecretString;
    use std::fs;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    const REGISTRY: Address = Address::new([0xaa; 20]);
    const TEST_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    /// Scripted double: each operation yields its queued result once.
    #[derive(Default)]
    struct ScriptedClient {
        submit: Mutex<Option<Result<TxHash, ChainError>>>,
        receipt: Mutex<Option<Result<SubmissionReceipt, ChainError>>>,
        submissions: AtomicUsize,
    }

    #[async_trait]
    impl ChainClient for ScriptedClient {
        async fn submit_registration(&self, _agent_uri: &str) -> Result<TxHash, ChainError> {
            self.submissions.fetch_add(1, Ordering::SeqCst);
            self.submit
                .lock()
                .unwrap()
                .take()
                .expect("unexpected submit_registration call")
        }

        async fn wait_for_receipt(
            &self,
            _tx: TxHash,
            _timeout: Duration,
        ) -> Result<SubmissionReceipt, ChainError> {
            self.receipt
                .lock()
                .unwrap()
                .take()
                .expect("unexpected wait_for_receipt call")
        }
    }

    fn test_config() -> RegistryConfig {
        RegistryConfig::new(
            84532,
            Url::parse("http://localhost:8545").unwrap(),
            REGISTRY,
            SecretString::from(TEST_KEY.to_string()),
            Duration::from_secs(5),
        )
    }

    fn metadata_file(json: &str) -> (tempfile::TempDir, MetadataRecord) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.json");
        fs::write(&path, json).unwrap();
        (dir, MetadataRecord::load(&path).unwrap())
    }

    fn registered_receipt(tx: TxHash, agent_id: u64) -> SubmissionReceipt {
        let event = IIdentityRegistry::Registered {
            agentId: U256::from(agent_id),
            agentURI: "data:application/json;base64,e30=".to_string(),
            owner: Address::new([0xbb; 20]),
        };
        SubmissionReceipt {
            transaction_hash: tx,
            status: true,
            logs: vec![EventLog {
                address: REGISTRY,
                topics: event.encode_topics().into_iter().map(|t| t.0).collect(),
                data: Bytes::from(event.encode_data()),
            }],
        }
    }

    #[tokio::test]
    async fn happy_path_persists_resolved_id() {
        let tx = TxHash::new([0x33; 32]);
        let client = ScriptedClient {
            submit: Mutex::new(Some(Ok(tx))),
            receipt: Mutex::new(Some(Ok(registered_receipt(tx, 42)))),
            ..Default::default()
        };
        let (_dir, mut record) = metadata_file(r#"{"name":"A"}"#);

        let outcome = run_registration(&client, &test_config(), &mut record, false)
            .await
            .unwrap();
        let Outcome::Registered {
            tx_hash,
            agent_id,
            agent_registry,
            explorer_url,
        } = outcome
        else {
            panic!("expected Registered outcome");
        };
        assert_eq!(tx_hash, tx);
        assert_eq!(agent_id, AgentId::Assigned(42));
        assert!(agent_registry.starts_with("eip155:84532:0x"));
        assert!(explorer_url.unwrap().starts_with("https://sepolia.basescan.org/tx/"));

        let persisted: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(record.path()).unwrap()).unwrap();
        assert_eq!(persisted["registrations"][0]["agentId"], 42);
        assert_eq!(
            persisted["registrations"][0]["agentRegistry"],
            serde_json::Value::String(agent_registry)
        );
    }

    #[tokio::test]
    async fn decode_miss_persists_unknown_sentinel_and_succeeds() {
        let tx = TxHash::new([0x33; 32]);
        // Receipt with no logs from the registry at all.
        let receipt = SubmissionReceipt {
            transaction_hash: tx,
            status: true,
            logs: vec![],
        };
        let client = ScriptedClient {
            submit: Mutex::new(Some(Ok(tx))),
            receipt: Mutex::new(Some(Ok(receipt))),
            ..Default::default()
        };
        let (_dir, mut record) = metadata_file(r#"{"name":"A"}"#);

        let outcome = run_registration(&client, &test_config(), &mut record, false)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            Outcome::Registered {
                agent_id: AgentId::Unknown,
                ..
            }
        ));

        let persisted: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(record.path()).unwrap()).unwrap();
        assert_eq!(persisted["registrations"][0]["agentId"], "UNKNOWN");
    }

    #[tokio::test]
    async fn confirmation_timeout_leaves_file_byte_identical() {
        let tx = TxHash::new([0x33; 32]);
        let client = ScriptedClient {
            submit: Mutex::new(Some(Ok(tx))),
            receipt: Mutex::new(Some(Err(ChainError::ConfirmationTimeout {
                tx,
                waited_secs: 5,
            }))),
            ..Default::default()
        };
        let (_dir, mut record) = metadata_file(r#"{"name":"A"}"#);
        let before = fs::read(record.path()).unwrap();

        let err = run_registration(&client, &test_config(), &mut record, false)
            .await
            .unwrap_err();
        assert_eq!(err.phase(), Phase::Confirm);
        assert_eq!(err.exit_code(), 8);
        assert_eq!(fs::read(record.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn submit_failure_aborts_without_persistence() {
        let client = ScriptedClient {
            submit: Mutex::new(Some(Err(ChainError::Funds("insufficient funds".into())))),
            ..Default::default()
        };
        let (_dir, mut record) = metadata_file(r#"{"name":"A"}"#);
        let before = fs::read(record.path()).unwrap();

        let err = run_registration(&client, &test_config(), &mut record, false)
            .await
            .unwrap_err();
        assert_eq!(err.phase(), Phase::Submit);
        assert_eq!(fs::read(record.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn reverted_transaction_is_rejected_at_confirmation() {
        let tx = TxHash::new([0x33; 32]);
        let mut receipt = registered_receipt(tx, 42);
        receipt.status = false;
        let client = ScriptedClient {
            submit: Mutex::new(Some(Ok(tx))),
            receipt: Mutex::new(Some(Ok(receipt))),
            ..Default::default()
        };
        let (_dir, mut record) = metadata_file(r#"{"name":"A"}"#);

        let err = run_registration(&client, &test_config(), &mut record, false)
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 7);
        assert_eq!(err.phase(), Phase::Confirm);
    }

    #[tokio::test]
    async fn existing_registration_short_circuits_before_submit() {
        let client = ScriptedClient::default();
        let locator = test_config().locator();
        let (_dir, mut record) = metadata_file(&format!(
            r#"{{"name":"A","registrations":[{{"agentId":7,"agentRegistry":"{locator}"}}]}}"#
        ));
        let before = fs::read(record.path()).unwrap();

        let outcome = run_registration(&client, &test_config(), &mut record, false)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::AlreadyRegistered {
                agent_id: 7,
                agent_registry: locator,
            }
        );
        assert_eq!(client.submissions.load(Ordering::SeqCst), 0);
        assert_eq!(fs::read(record.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn force_re_registers_and_replaces_the_entry() {
        let tx = TxHash::new([0x33; 32]);
        let client = ScriptedClient {
            submit: Mutex::new(Some(Ok(tx))),
            receipt: Mutex::new(Some(Ok(registered_receipt(tx, 43)))),
            ..Default::default()
        };
        let locator = test_config().locator();
        let (_dir, mut record) = metadata_file(&format!(
            r#"{{"name":"A","registrations":[{{"agentId":7,"agentRegistry":"{locator}"}}]}}"#
        ));

        run_registration(&client, &test_config(), &mut record, true)
            .await
            .unwrap();
        assert_eq!(client.submissions.load(Ordering::SeqCst), 1);

        let persisted: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(record.path()).unwrap()).unwrap();
        let registrations = persisted["registrations"].as_array().unwrap();
        assert_eq!(registrations.len(), 1, "prior entry must be replaced, not duplicated");
        assert_eq!(registrations[0]["agentId"], 43);
    }

    #[tokio::test]
    async fn prior_unknown_sentinel_does_not_block_a_re_run() {
        let tx = TxHash::new([0x33; 32]);
        let client = ScriptedClient {
            submit: Mutex::new(Some(Ok(tx))),
            receipt: Mutex::new(Some(Ok(registered_receipt(tx, 42)))),
            ..Default::default()
        };
        let locator = test_config().locator();
        let (_dir, mut record) = metadata_file(&format!(
            r#"{{"name":"A","registrations":[{{"agentId":"UNKNOWN","agentRegistry":"{locator}"}}]}}"#
        ));

        let outcome = run_registration(&client, &test_config(), &mut record, false)
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Registered { .. }));
        assert_eq!(client.submissions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn run_states_terminality() {
        assert!(RunState::Persisted.is_terminal());
        assert!(RunState::Aborted.is_terminal());
        for state in [
            RunState::Unregistered,
            RunState::Submitted,
            RunState::Confirmed,
            RunState::Resolved,
            RunState::Unresolved,
        ] {
            assert!(!state.is_terminal(), "{state} must not be terminal");
        }
    }
}
