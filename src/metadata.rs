//! Agent metadata record: load, registry-reference merge, atomic persist.
//!
//! The metadata file is an ERC-8004 agent-card shaped JSON object with
//! arbitrary agent-defined fields plus an optional `registrations` array.
//! This module is the only writer of that array: it merges in a new
//! [`Registration`] (replacing any prior entry for the same network) and
//! persists the document via write-to-temp-then-rename, so a crash mid-write
//! can never leave a truncated record behind.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Sentinel recorded when the registry assigned an id we could not read back
/// from the receipt. A human (or a later run with `--force`) reconciles it.
pub const UNKNOWN_AGENT_ID: &str = "UNKNOWN";

/// Metadata loading and persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("failed to read metadata file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("metadata file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("metadata file {path} must contain a JSON object")]
    NotObject { path: PathBuf },
    #[error("failed to persist metadata file {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Registry-assigned agent id, or the `"UNKNOWN"` sentinel when the id could
/// not be resolved from the transaction receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentId {
    Assigned(u64),
    Unknown,
}

impl Serialize for AgentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Assigned(id) => serializer.serialize_u64(*id),
            Self::Unknown => serializer.serialize_str(UNKNOWN_AGENT_ID),
        }
    }
}

impl<'de> Deserialize<'de> for AgentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Number(n) => n
                .as_u64()
                .map(Self::Assigned)
                .ok_or_else(|| D::Error::custom("agentId out of u64 range")),
            Value::String(s) if s == UNKNOWN_AGENT_ID => Ok(Self::Unknown),
            other => Err(D::Error::custom(format!("invalid agentId: {other}"))),
        }
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Assigned(id) => write!(f, "{id}"),
            Self::Unknown => f.write_str(UNKNOWN_AGENT_ID),
        }
    }
}

/// On-chain registration reference, immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    /// Registry-assigned token id.
    #[serde(rename = "agentId")]
    pub agent_id: AgentId,

    /// Registry locator: `eip155:{chainId}:{identityRegistry}`.
    #[serde(rename = "agentRegistry")]
    pub agent_registry: String,
}

/// The `eip155:<chainId>:` prefix identifying a registration's network.
fn network_prefix(locator: &str) -> String {
    let mut parts = locator.splitn(3, ':');
    match (parts.next(), parts.next()) {
        (Some(namespace), Some(chain)) => format!("{namespace}:{chain}:"),
        _ => locator.to_string(),
    }
}

/// The agent metadata document, bound to its on-disk location.
#[derive(Debug, Clone)]
pub struct MetadataRecord {
    path: PathBuf,
    doc: Map<String, Value>,
}

impl MetadataRecord {
    /// Read and parse the metadata file. The file must hold a JSON object.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, MetadataError> {
        let path = path.into();
        let raw = fs::read_to_string(&path).map_err(|source| MetadataError::Read {
            path: path.clone(),
            source,
        })?;
        let value: Value =
            serde_json::from_str(&raw).map_err(|source| MetadataError::Parse {
                path: path.clone(),
                source,
            })?;
        match value {
            Value::Object(doc) => Ok(Self { path, doc }),
            _ => Err(MetadataError::NotObject { path }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize the document to the exact bytes that get embedded on-chain.
    pub fn to_bytes(&self) -> Vec<u8> {
        // Map serialization into a Vec cannot fail.
        serde_json::to_vec(&self.doc).unwrap_or_default()
    }

    /// Parsed registration entries. Entries that don't match the expected
    /// shape are skipped here but preserved in the document.
    pub fn registrations(&self) -> Vec<Registration> {
        self.doc
            .get("registrations")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// An existing registration with an assigned id on the given chain, if
    /// any. Sentinel (`"UNKNOWN"`) entries don't count: that run never
    /// resolved an id, so a re-run is allowed to replace them.
    pub fn assigned_registration(&self, chain_id: u64) -> Option<Registration> {
        let prefix = format!("eip155:{chain_id}:");
        self.registrations()
            .into_iter()
            .find(|r| {
                r.agent_registry.starts_with(&prefix)
                    && matches!(r.agent_id, AgentId::Assigned(_))
            })
    }

    /// Merge a registration into the document, replacing any prior entry for
    /// the same network. Entries for other networks survive. Idempotent:
    /// recording the same reference twice leaves a single entry.
    pub fn record_registration(&mut self, registration: &Registration) {
        let prefix = network_prefix(&registration.agent_registry);
        let mut entries: Vec<Value> = self
            .doc
            .get("registrations")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        entries.retain(|entry| {
            entry
                .get("agentRegistry")
                .and_then(Value::as_str)
                .is_none_or(|locator| !locator.starts_with(&prefix))
        });
        // Registration serialization into a Value cannot fail.
        if let Ok(value) = serde_json::to_value(registration) {
            entries.push(value);
        }
        self.doc.insert("registrations".to_string(), Value::Array(entries));
    }

    /// Write the document back to its source path atomically: serialize to a
    /// sibling temp file, then rename over the original. On any failure the
    /// previous on-disk record is untouched.
    pub fn persist(&self) -> Result<(), MetadataError> {
        let persist_err = |source| MetadataError::Persist {
            path: self.path.clone(),
            source,
        };
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| persist_err(std::io::Error::other("metadata path has no file name")))?;
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        let mut json = serde_json::to_string_pretty(&self.doc)
            .map_err(|e| persist_err(std::io::Error::other(e)))?;
        json.push('\n');

        fs::write(&tmp_path, json).map_err(persist_err)?;
        fs::rename(&tmp_path, &self.path)
            .inspect_err(|_| {
                let _ = fs::remove_file(&tmp_path);
            })
            .map_err(persist_err)?;
        Ok(())
    }
}
