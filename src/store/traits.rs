//! Store traits for the two backing systems.
//!
//! [`SessionStateStore`] is the ephemeral, TTL-backed store holding live
//! call state, per-user presence and persisted timer deadlines.
//! [`CallLedger`] is the durable, append-then-finalize record store.
//! The in-crate implementations live in [`super::memory`]; production
//! deployments implement these traits over their own backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::Result;
use crate::calls::state::{CallSession, CallTransition, InvalidTransition};
use crate::calls::timers::{TimerDeadline, TimerPhase};
use crate::types::call::{CallId, CallPresence, CallStatus, EndReason, UserId};
use crate::types::record::{CallRecord, ParticipantStatus, QualityMetrics};

/// Result of an atomic state-machine application inside the store.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// The transition applied; here is the updated session.
    Applied(CallSession),
    /// The state-machine guard rejected it; nothing was mutated.
    Rejected(InvalidTransition),
    /// No live session under that call id.
    NotFound,
}

/// Ephemeral store for live call sessions and user presence.
///
/// All mutations are read-modify-write inside the store; writes refresh
/// the entry TTL. The store offers no optimistic concurrency: the
/// coordinator is the single writer per call by ownership contract. The
/// one atomicity it does provide is [`apply_transition`], which runs the
/// state-machine guard under the store's own critical section so that of
/// two racing requests exactly one wins the phase.
///
/// [`apply_transition`]: SessionStateStore::apply_transition
#[async_trait]
pub trait SessionStateStore: Send + Sync {
    async fn create_session(&self, session: CallSession) -> Result<()>;

    async fn get_session(&self, call_id: &CallId) -> Result<Option<CallSession>>;

    /// Apply a state transition to the stored session, atomically.
    async fn apply_transition(
        &self,
        call_id: &CallId,
        transition: CallTransition,
    ) -> Result<TransitionOutcome>;

    /// Add a participant to a live group call. No-op if already present.
    async fn add_participant(&self, call_id: &CallId, user_id: &UserId)
        -> Result<Option<CallSession>>;

    /// Remove a participant. The initiator cannot be removed.
    async fn remove_participant(
        &self,
        call_id: &CallId,
        user_id: &UserId,
    ) -> Result<Option<CallSession>>;

    /// Explicitly delete a session; termination never waits for TTL expiry.
    async fn remove_session(&self, call_id: &CallId) -> Result<()>;

    /// Presence for a user; key absence reads as [`CallPresence::Idle`].
    async fn get_presence(&self, user_id: &UserId) -> Result<CallPresence>;

    /// Set presence. Setting [`CallPresence::Idle`] deletes the key.
    async fn set_presence(&self, user_id: &UserId, presence: CallPresence) -> Result<()>;

    /// Bounded list of live call ids the user participates in, for
    /// reconciliation when a device disconnects.
    async fn call_ids_for_user(&self, user_id: &UserId, limit: usize) -> Result<Vec<CallId>>;

    async fn put_timer_deadline(&self, deadline: TimerDeadline) -> Result<()>;

    async fn remove_timer_deadline(&self, call_id: &CallId, phase: TimerPhase) -> Result<()>;

    /// Every persisted deadline, for the startup recovery scan.
    async fn list_timer_deadlines(&self) -> Result<Vec<TimerDeadline>>;
}

/// Durable, append-then-finalize call record store.
///
/// Writes that arrive after finalization are no-ops, not errors; the
/// termination path is idempotent against the ledger.
#[async_trait]
pub trait CallLedger: Send + Sync {
    async fn create(&self, record: CallRecord) -> Result<()>;

    async fn get(&self, call_id: &CallId) -> Result<Option<CallRecord>>;

    async fn update_participant_status(
        &self,
        call_id: &CallId,
        user_id: &UserId,
        status: ParticipantStatus,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Stamp the moment the call went ACTIVE.
    async fn mark_started(&self, call_id: &CallId, started_at: DateTime<Utc>) -> Result<()>;

    /// Finalize the record: set the terminal status (`Ended` or `Failed`),
    /// end reason and timestamps, and recompute the duration from the
    /// stored `started_at`; externally supplied durations are never
    /// trusted.
    async fn finalize(
        &self,
        call_id: &CallId,
        terminal_status: CallStatus,
        end_reason: EndReason,
        ended_at: DateTime<Utc>,
        quality: Option<QualityMetrics>,
    ) -> Result<()>;
}
