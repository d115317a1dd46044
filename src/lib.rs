//! On-chain agent identity registration (ERC-8004).
//!
//! `mintmark` performs a one-time registration of an agent's identity with an
//! on-chain identity registry: it encodes the agent's metadata into a
//! self-contained `data:` URI, submits a `register(string)` transaction,
//! waits for confirmation, pulls the assigned agent id out of the emitted
//! `Registered` event, and writes the resulting registry reference back into
//! the local metadata file.
//!
//! # Architecture
//!
//! ```text
//! metadata file ─► uri::encode ─► ChainClient::submit ─► tx hash
//!                                       │
//!                                       ▼
//!                    ChainClient::wait_for_receipt ─► receipt
//!                                       │
//!                                       ▼
//!                    events::decode_registration ─► Resolved(id) | Unresolved
//!                                       │
//!                                       ▼
//!                    MetadataRecord::record_registration + atomic persist
//! ```
//!
//! The contract call is non-idempotent (every successful call mints a new
//! token), so nothing in this crate retries a submitted transaction. The
//! metadata file is read once at the start and written at most once at the
//! end, via temp-file-then-rename, so an abort at any point leaves it intact.

pub mod chain;
pub mod config;
pub mod error;
pub mod events;
pub mod metadata;
pub mod uri;
pub mod workflow;
