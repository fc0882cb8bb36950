//! Call-session core for a messaging backend.
//!
//! Manages the lifecycle of voice and video calls (initiation, ringing,
//! signaling relay, connection establishment, termination) across an
//! ephemeral TTL-backed session store and a durable call ledger. Media
//! never passes through here; this crate owns state, timers and the
//! signaling relay, and the transport layer re-exposes its operations.

pub mod calls;
pub mod config;
pub mod store;
pub mod types;

pub use calls::coordinator::{CallLifecycleCoordinator, IceRelayOutcome};
pub use calls::error::CallError;
pub use config::CallConfig;
pub use store::{CallLedger, MemoryCallLedger, MemorySessionStore, SessionStateStore};
pub use types::call::{CallId, CallPresence, CallStatus, CallType, EndReason, UserId};
