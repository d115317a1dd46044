//! Registration event extraction from transaction receipts.
//!
//! The receipt of a `register` call carries logs from every contract the
//! transaction touched. Only the first `Registered` log emitted by the target
//! registry matters; everything else is skipped without comment. Failure to
//! find or decode that log is an expected, recoverable condition — the
//! registration itself already succeeded on-chain — so the result is a
//! two-variant [`Resolution`], never an error.

use alloy::primitives::Address;
use alloy::sol_types::SolEvent;
use tracing::warn;

use crate::chain::{IIdentityRegistry, SubmissionReceipt};

/// Outcome of scanning a receipt for the registry's `Registered` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The event was found and decoded; this is the assigned agent id.
    Resolved(u64),
    /// No matching event, or a matching log that would not decode. The
    /// registration stands, but the id must be reconciled manually.
    Unresolved,
}

/// Scan the receipt's logs in order for the registry's `Registered` event and
/// pull the assigned agent id out of it.
pub fn decode_registration(receipt: &SubmissionReceipt, registry: Address) -> Resolution {
    let signature = IIdentityRegistry::Registered::SIGNATURE_HASH;
    for log in &receipt.logs {
        if log.address != registry || log.topics.first() != Some(&signature) {
            continue;
        }
        let event =
            match IIdentityRegistry::Registered::decode_raw_log(log.topics.iter().copied(), &log.data) {
                Ok(event) => event,
                Err(err) => {
                    warn!(tx = %receipt.transaction_hash, %err, "Registered log failed to decode");
                    return Resolution::Unresolved;
                }
            };
        return match u64::try_from(event.agentId) {
            Ok(id) => Resolution::Resolved(id),
            Err(_) => {
                warn!(tx = %receipt.transaction_hash, "Registered agentId exceeds u64");
                Resolution::Unresolved
            }
        };
    }
    Resolution::Unresolved
}
