//! Top-level error taxonomy and exit-status mapping.
//!
//! Every fatal condition carries the phase it occurred in, so the binary can
//! report "what failed, and where" without the user digging through logs.
//! Event-decode ambiguity is deliberately absent here: it is a recoverable
//! condition handled as [`crate::events::Resolution::Unresolved`].

use crate::chain::ChainError;
use crate::config::ConfigError;
use crate::metadata::MetadataError;

/// Workflow phase in which a fatal error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Configuration and metadata loading, before anything touches the network.
    Preflight,
    /// Signing and dispatching the registration transaction.
    Submit,
    /// Waiting for the transaction to be included.
    Confirm,
    /// Writing the updated metadata record back to disk.
    Persist,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Preflight => "pre-flight",
            Self::Submit => "transaction submission",
            Self::Confirm => "confirmation",
            Self::Persist => "persistence",
        })
    }
}

/// A fatal registration failure.
#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("{source}")]
    Chain {
        phase: Phase,
        #[source]
        source: ChainError,
    },
}

impl RegisterError {
    /// Attach the workflow phase to a chain-layer error.
    pub fn chain(phase: Phase, source: ChainError) -> Self {
        Self::Chain { phase, source }
    }

    /// The phase this error aborted.
    pub fn phase(&self) -> Phase {
        match self {
            Self::Config(_) => Phase::Preflight,
            Self::Metadata(MetadataError::Persist { .. }) => Phase::Persist,
            Self::Metadata(_) => Phase::Preflight,
            Self::Chain { phase, .. } => *phase,
        }
    }

    /// Process exit status for this error kind.
    ///
    /// Each kind gets its own code so callers scripting around the binary can
    /// distinguish, say, a funding problem from an unreachable endpoint.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Metadata(MetadataError::Persist { .. }) => 9,
            Self::Metadata(_) => 3,
            Self::Chain { source, .. } => match source {
                ChainError::Network(_) => 4,
                ChainError::Funds(_) => 5,
                ChainError::Nonce(_) => 6,
                ChainError::Rejected(_) => 7,
                ChainError::ConfirmationTimeout { .. } => 8,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_per_kind() {
        let errors = vec![
            RegisterError::Config(ConfigError::MissingPrivateKey),
            RegisterError::Metadata(MetadataError::NotObject {
                path: "agent.json".into(),
            }),
            RegisterError::chain(Phase::Submit, ChainError::Network("down".into())),
            RegisterError::chain(Phase::Submit, ChainError::Funds("broke".into())),
            RegisterError::chain(Phase::Submit, ChainError::Nonce("stale".into())),
            RegisterError::chain(Phase::Submit, ChainError::Rejected("revert".into())),
            RegisterError::chain(
                Phase::Confirm,
                ChainError::ConfirmationTimeout {
                    tx: Default::default(),
                    waited_secs: 120,
                },
            ),
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len(), "exit codes must not collide");
        assert!(codes.iter().all(|c| *c != 0), "no error may exit zero");
    }

    #[test]
    fn phase_follows_error_kind() {
        let timeout = RegisterError::chain(
            Phase::Confirm,
            ChainError::ConfirmationTimeout {
                tx: Default::default(),
                waited_secs: 30,
            },
        );
        assert_eq!(timeout.phase(), Phase::Confirm);

        let persist = RegisterError::Metadata(MetadataError::Persist {
            path: "agent.json".into(),
            source: std::io::Error::other("disk full"),
        });
        assert_eq!(persist.phase(), Phase::Persist);
        assert_eq!(persist.exit_code(), 9);
    }
}
