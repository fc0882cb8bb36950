//! Call session management.
//!
//! This module drives the full lifecycle of a voice/video call: initiation,
//! ringing, signaling relay, connection establishment and termination,
//! keeping the ephemeral session store and the durable ledger consistent
//! under timeouts, races and partial failure.
//!
//! # Architecture
//!
//! - [`CallSession`] & [`CallTransition`]: the call state machine
//! - [`CallLifecycleCoordinator`]: orchestrates transitions, timers and
//!   cross-store persistence
//! - [`SignalExchange`]: opaque SDP/ICE relay keyed by call id
//! - [`TimerRegistry`]: (call id, phase)-keyed scheduled tasks with
//!   cancel-before-arm discipline
//! - [`classify()`]: the fixed failure taxonomy surfaced to clients
//! - [`CallError`]: typed failures for every coordinator operation

pub mod classify;
pub mod coordinator;
pub mod error;
pub mod signaling;
pub mod state;
pub mod timers;

pub use classify::{classify, classify_call_error, ClassifiedError, ErrorKind, ErrorResponse};
pub use coordinator::{CallLifecycleCoordinator, IceRelayOutcome};
pub use error::CallError;
pub use signaling::{IceCandidate, SessionDescription, SignalExchange, SignalingBlob};
pub use state::{CallSession, CallTransition, InvalidTransition};
pub use timers::{TimerDeadline, TimerPhase, TimerRegistry};
