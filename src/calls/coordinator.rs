//! Call lifecycle coordination.
//!
//! [`CallLifecycleCoordinator`] is the single owner of call state
//! transitions and timers. User actions and timer expiries both funnel
//! into the same termination path; races between them are settled by the
//! state-machine guard inside the session store, not by locks. The
//! ephemeral store is authoritative for liveness: a ledger write failure
//! degrades audit history and is logged, never fatal to a live call.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};

use super::signaling::{IceCandidate, SignalExchange, SignalingBlob};
use super::state::{CallSession, CallTransition};
use super::timers::{TimerDeadline, TimerPhase, TimerRegistry};
use crate::calls::error::CallError;
use crate::config::CallConfig;
use crate::store::traits::{CallLedger, SessionStateStore, TransitionOutcome};
use crate::types::call::{CallId, CallPresence, CallStatus, CallType, EndReason, UserId};
use crate::types::events::{
    CallAccepted, CallConnected, CallEnded, CallFailed, CallMissed, CallRinging, EventBus,
};
use crate::types::record::{CallRecord, ParticipantStatus};

/// Outcome of relaying an ICE candidate.
///
/// A candidate for a call that no longer exists is an expected late
/// arrival, distinct from a genuine authorization failure; callers get a
/// typed discriminator, never an error message to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceRelayOutcome {
    Relayed,
    DroppedCallGone,
}

pub struct CallLifecycleCoordinator {
    config: CallConfig,
    sessions: Arc<dyn SessionStateStore>,
    ledger: Arc<dyn CallLedger>,
    signaling: SignalExchange,
    timers: TimerRegistry,
    events: EventBus,
    /// Handed to timer tasks; a fire after the coordinator is gone no-ops.
    self_ref: Weak<Self>,
}

impl CallLifecycleCoordinator {
    pub fn new(
        config: CallConfig,
        sessions: Arc<dyn SessionStateStore>,
        ledger: Arc<dyn CallLedger>,
    ) -> Arc<Self> {
        let signaling =
            SignalExchange::new(config.signaling_ttl, config.max_ice_candidates_per_user);
        Arc::new_cyclic(|self_ref| Self {
            signaling,
            timers: TimerRegistry::new(),
            events: EventBus::new(),
            config,
            sessions,
            ledger,
            self_ref: self_ref.clone(),
        })
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &CallConfig {
        &self.config
    }

    /// Re-arm timers from deadlines persisted in the ephemeral store.
    ///
    /// Run once at startup. Past-due deadlines fire immediately; the
    /// stale-state check makes a double fire harmless, so recovering on
    /// top of live timers is safe.
    pub async fn recover_timers(&self) -> Result<usize, CallError> {
        let deadlines = self.sessions.list_timer_deadlines().await?;
        let count = deadlines.len();
        for deadline in deadlines {
            let delay = (deadline.deadline - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            debug!(
                "re-arming {} timer for call {} ({}ms out)",
                deadline.phase.as_str(),
                deadline.call_id,
                delay.as_millis()
            );
            self.spawn_timer(deadline.call_id, deadline.phase, delay);
        }
        if count > 0 {
            info!("recovered {} persisted call timer(s)", count);
        }
        Ok(count)
    }

    /// Start a call. Preconditions run before any state is created, so a
    /// busy party means nothing to roll back.
    pub async fn initiate_call(
        &self,
        call_type: CallType,
        initiator: UserId,
        targets: Vec<UserId>,
        conversation_id: Option<String>,
    ) -> Result<CallSession, CallError> {
        if targets.is_empty() {
            return Err(CallError::NoTargets);
        }
        if targets.contains(&initiator) {
            return Err(CallError::SelfCall);
        }
        let count = targets.len() + 1;
        if count > self.config.max_participants {
            return Err(CallError::TooManyParticipants {
                count,
                max: self.config.max_participants,
            });
        }

        if !self.sessions.get_presence(&initiator).await?.is_idle() {
            return Err(CallError::UserBusy(initiator));
        }
        for target in &targets {
            if !self.sessions.get_presence(target).await?.is_idle() {
                return Err(CallError::UserBusy(target.clone()));
            }
        }

        let call_id = CallId::generate();
        let session = CallSession::new(
            call_id.clone(),
            call_type,
            initiator.clone(),
            &targets,
            conversation_id.clone(),
        );

        let record = CallRecord::new(
            call_id.clone(),
            call_type,
            initiator.clone(),
            &targets,
            conversation_id,
            session.created_at,
        );
        if let Err(e) = self.ledger.create(record).await {
            warn!("ledger create failed for call {}: {} (audit degraded)", call_id, e);
        }

        self.sessions.create_session(session).await?;

        let session = match self
            .sessions
            .apply_transition(&call_id, CallTransition::RingingStarted)
            .await?
        {
            TransitionOutcome::Applied(session) => session,
            TransitionOutcome::Rejected(rejected) => return Err(rejected.into()),
            TransitionOutcome::NotFound => return Err(CallError::NotFound(call_id)),
        };

        self.sessions
            .set_presence(&initiator, CallPresence::initiating(call_id.clone()))
            .await?;
        for target in session.targets() {
            self.sessions
                .set_presence(target, CallPresence::ringing(call_id.clone()))
                .await?;
        }

        self.arm_phase(&call_id, TimerPhase::Ringing, self.config.ringing_timeout)
            .await?;

        let _ = self.events.call_ringing.send(Arc::new(CallRinging {
            call_id: call_id.clone(),
            call_type,
            initiator: session.initiator.clone(),
            targets: session.targets().cloned().collect(),
        }));

        info!(
            "call {} initiated by {} ({:?}, {} target(s))",
            call_id,
            session.initiator,
            call_type,
            session.participants.len() - 1
        );
        Ok(session)
    }

    /// Accept a ringing call. The state-machine guard settles duplicate
    /// or racing accepts: exactly one wins the transition to CONNECTING.
    pub async fn accept_call(
        &self,
        call_id: &CallId,
        user_id: &UserId,
    ) -> Result<CallSession, CallError> {
        let current = self.authorized_session(call_id, user_id).await?;
        if *user_id == current.initiator {
            return Err(CallError::NotCallee);
        }

        let session = match self
            .sessions
            .apply_transition(call_id, CallTransition::Accepted)
            .await?
        {
            TransitionOutcome::Applied(session) => session,
            TransitionOutcome::Rejected(rejected) => return Err(rejected.into()),
            TransitionOutcome::NotFound => return Err(CallError::NotFound(call_id.clone())),
        };

        self.cancel_phase(call_id, TimerPhase::Ringing).await;
        self.arm_phase(call_id, TimerPhase::Connecting, self.config.connecting_timeout)
            .await?;

        self.sessions
            .set_presence(user_id, CallPresence::in_call(call_id.clone()))
            .await?;
        self.sessions
            .set_presence(&session.initiator, CallPresence::in_call(call_id.clone()))
            .await?;

        if let Err(e) = self
            .ledger
            .update_participant_status(call_id, user_id, ParticipantStatus::Joined, Utc::now())
            .await
        {
            warn!("ledger participant update failed for call {}: {}", call_id, e);
        }

        let _ = self.events.call_accepted.send(Arc::new(CallAccepted {
            call_id: call_id.clone(),
            user_id: user_id.clone(),
        }));

        info!("call {} accepted by {}", call_id, user_id);
        Ok(session)
    }

    /// Media connected: CONNECTING -> ACTIVE, stamp `started_at`, arm the
    /// max-duration safety net.
    pub async fn establish_connection(
        &self,
        call_id: &CallId,
    ) -> Result<CallSession, CallError> {
        let session = match self
            .sessions
            .apply_transition(call_id, CallTransition::Connected)
            .await?
        {
            TransitionOutcome::Applied(session) => session,
            TransitionOutcome::Rejected(rejected) => return Err(rejected.into()),
            TransitionOutcome::NotFound => return Err(CallError::NotFound(call_id.clone())),
        };

        self.cancel_phase(call_id, TimerPhase::Connecting).await;

        let started_at = Utc::now();
        if let Err(e) = self.ledger.mark_started(call_id, started_at).await {
            warn!(
                "ledger mark_started failed for call {}: {} (duration will read zero)",
                call_id, e
            );
        }

        for participant in &session.participants {
            self.sessions
                .set_presence(participant, CallPresence::in_call(call_id.clone()))
                .await?;
        }

        self.arm_phase(call_id, TimerPhase::MaxDuration, self.config.max_call_duration)
            .await?;

        let _ = self.events.call_connected.send(Arc::new(CallConnected {
            call_id: call_id.clone(),
            started_at,
        }));

        info!("call {} active", call_id);
        Ok(session)
    }

    /// Decline a call. From the initiator this is a cancel; from a callee
    /// the record keeps their declined participant status.
    pub async fn decline_call(
        &self,
        call_id: &CallId,
        user_id: &UserId,
    ) -> Result<CallSession, CallError> {
        let session = self.authorized_session(call_id, user_id).await?;
        if *user_id == session.initiator {
            return self.terminate(call_id, CallStatus::Ended, EndReason::Cancelled).await;
        }

        if let Err(e) = self
            .ledger
            .update_participant_status(call_id, user_id, ParticipantStatus::Declined, Utc::now())
            .await
        {
            warn!("ledger participant update failed for call {}: {}", call_id, e);
        }

        self.terminate(call_id, CallStatus::Ended, EndReason::Declined).await
    }

    /// End a call from any non-terminal state.
    pub async fn end_call(
        &self,
        call_id: &CallId,
        reason: EndReason,
        user_id: Option<&UserId>,
    ) -> Result<CallSession, CallError> {
        if let Some(user_id) = user_id {
            self.authorized_session(call_id, user_id).await?;
        }
        self.terminate(call_id, CallStatus::Ended, reason).await
    }

    /// Kill a call after an unrecoverable failure or timer expiry. Same
    /// persistence and cleanup path as a user-initiated end.
    pub async fn handle_call_failure(
        &self,
        call_id: &CallId,
        reason: EndReason,
    ) -> Result<CallSession, CallError> {
        self.terminate(call_id, CallStatus::Failed, reason).await
    }

    /// Current session state, including terminal sessions still inside
    /// their cleanup delay.
    pub async fn get_call_status(&self, call_id: &CallId) -> Result<Option<CallSession>, CallError> {
        Ok(self.sessions.get_session(call_id).await?)
    }

    pub async fn get_user_status(&self, user_id: &UserId) -> Result<CallPresence, CallError> {
        Ok(self.sessions.get_presence(user_id).await?)
    }

    /// End every live call a disconnected user participates in.
    pub async fn reconcile_user_disconnect(
        &self,
        user_id: &UserId,
    ) -> Result<usize, CallError> {
        let call_ids = self
            .sessions
            .call_ids_for_user(user_id, self.config.reconcile_scan_limit)
            .await?;
        let mut ended = 0;
        for call_id in call_ids {
            match self.sessions.get_session(&call_id).await? {
                Some(session) if !session.status.is_terminal() => {
                    match self
                        .handle_call_failure(&call_id, EndReason::ConnectionLost)
                        .await
                    {
                        Ok(_) => ended += 1,
                        // Another terminator won the race.
                        Err(CallError::InvalidTransition(_) | CallError::NotFound(_)) => {}
                        Err(e) => return Err(e),
                    }
                }
                _ => {}
            }
        }
        if ended > 0 {
            info!("reconciled {} live call(s) after {} disconnected", ended, user_id);
        }
        Ok(ended)
    }

    /// Relay an SDP offer after checking the sender is a participant of a
    /// live call.
    pub async fn relay_offer(
        &self,
        call_id: &CallId,
        user_id: &UserId,
        sdp: String,
    ) -> Result<(), CallError> {
        let session = self.authorized_session(call_id, user_id).await?;
        if session.status.is_terminal() {
            return Err(CallError::CallOver(call_id.clone()));
        }
        self.signaling.store_offer(call_id, user_id, sdp).await;
        Ok(())
    }

    /// Relay an SDP answer; same authorization as [`relay_offer`](Self::relay_offer).
    pub async fn relay_answer(
        &self,
        call_id: &CallId,
        user_id: &UserId,
        sdp: String,
    ) -> Result<(), CallError> {
        let session = self.authorized_session(call_id, user_id).await?;
        if session.status.is_terminal() {
            return Err(CallError::CallOver(call_id.clone()));
        }
        self.signaling.store_answer(call_id, user_id, sdp).await;
        Ok(())
    }

    /// Relay an ICE candidate.
    ///
    /// Candidates for unknown or terminal calls are expected late arrivals
    /// (in-flight packets legitimately outlive their call) and come back
    /// as [`IceRelayOutcome::DroppedCallGone`], never an error. A
    /// non-participant submitting to a live call is a real authorization
    /// failure.
    pub async fn submit_ice_candidate(
        &self,
        call_id: &CallId,
        user_id: &UserId,
        candidate: IceCandidate,
    ) -> Result<IceRelayOutcome, CallError> {
        match self.sessions.get_session(call_id).await? {
            None => {
                debug!(
                    "dropping ICE candidate from {} for unknown or ended call {}",
                    user_id, call_id
                );
                Ok(IceRelayOutcome::DroppedCallGone)
            }
            Some(session) if session.status.is_terminal() => {
                debug!(
                    "dropping ICE candidate from {} for terminal call {}",
                    user_id, call_id
                );
                Ok(IceRelayOutcome::DroppedCallGone)
            }
            Some(session) => {
                if !session.is_participant(user_id) {
                    return Err(CallError::NotAuthorized {
                        call_id: call_id.clone(),
                        user_id: user_id.clone(),
                    });
                }
                self.signaling
                    .append_ice_candidate(call_id, user_id, candidate)
                    .await;
                Ok(IceRelayOutcome::Relayed)
            }
        }
    }

    /// Signaling snapshot for a participant.
    pub async fn signaling_state(
        &self,
        call_id: &CallId,
        user_id: &UserId,
    ) -> Result<SignalingBlob, CallError> {
        self.authorized_session(call_id, user_id).await?;
        Ok(self
            .signaling
            .get_signaling_state(call_id)
            .await
            .unwrap_or_default())
    }

    /// Remove all ephemeral state for a call: session, signaling blob and
    /// any leftover deadline records. Idempotent.
    pub async fn cleanup_call(&self, call_id: &CallId) -> Result<(), CallError> {
        self.sessions.remove_session(call_id).await?;
        self.signaling.remove(call_id).await;
        for phase in TimerPhase::ALL {
            if let Err(e) = self.sessions.remove_timer_deadline(call_id, phase).await {
                warn!(
                    "failed to drop {} deadline for call {}: {}",
                    phase.as_str(),
                    call_id,
                    e
                );
            }
        }
        debug!("cleaned up ephemeral state for call {}", call_id);
        Ok(())
    }

    /// The one path by which a call dies, shared by user hangups,
    /// declines, failures and timer expiries.
    async fn terminate(
        &self,
        call_id: &CallId,
        terminal_status: CallStatus,
        reason: EndReason,
    ) -> Result<CallSession, CallError> {
        let transition = match terminal_status {
            CallStatus::Failed => CallTransition::Failed { reason },
            _ => CallTransition::Terminated { reason },
        };
        let session = match self.sessions.apply_transition(call_id, transition).await? {
            TransitionOutcome::Applied(session) => session,
            TransitionOutcome::Rejected(rejected) => return Err(rejected.into()),
            TransitionOutcome::NotFound => return Err(CallError::NotFound(call_id.clone())),
        };

        // Best-effort: a stale fire is re-checked against current state.
        self.timers.cancel_all(call_id);
        for phase in [TimerPhase::Ringing, TimerPhase::Connecting, TimerPhase::MaxDuration] {
            if let Err(e) = self.sessions.remove_timer_deadline(call_id, phase).await {
                warn!(
                    "failed to drop {} deadline for call {}: {}",
                    phase.as_str(),
                    call_id,
                    e
                );
            }
        }

        let ended_at = Utc::now();
        if let Err(e) = self
            .ledger
            .finalize(call_id, terminal_status, reason, ended_at, None)
            .await
        {
            warn!("ledger finalize failed for call {}: {} (audit degraded)", call_id, e);
        }

        for participant in &session.participants {
            self.sessions
                .set_presence(participant, CallPresence::Idle)
                .await?;
        }

        self.arm_phase(call_id, TimerPhase::Cleanup, self.config.cleanup_delay)
            .await?;

        match terminal_status {
            CallStatus::Failed => {
                let _ = self.events.call_failed.send(Arc::new(CallFailed {
                    call_id: call_id.clone(),
                    reason,
                }));
            }
            _ => {
                let duration_secs = match self.ledger.get(call_id).await {
                    Ok(Some(record)) => record.duration_secs,
                    _ => 0,
                };
                let _ = self.events.call_ended.send(Arc::new(CallEnded {
                    call_id: call_id.clone(),
                    reason,
                    duration_secs,
                }));
            }
        }

        info!("call {} terminated: {:?} ({:?})", call_id, terminal_status, reason);
        Ok(session)
    }

    async fn authorized_session(
        &self,
        call_id: &CallId,
        user_id: &UserId,
    ) -> Result<CallSession, CallError> {
        let session = self
            .sessions
            .get_session(call_id)
            .await?
            .ok_or_else(|| CallError::NotFound(call_id.clone()))?;
        if !session.is_participant(user_id) {
            return Err(CallError::NotAuthorized {
                call_id: call_id.clone(),
                user_id: user_id.clone(),
            });
        }
        Ok(session)
    }

    /// Persist the deadline, then arm the in-process timer.
    async fn arm_phase(
        &self,
        call_id: &CallId,
        phase: TimerPhase,
        delay: Duration,
    ) -> Result<(), CallError> {
        let deadline = Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);
        self.sessions
            .put_timer_deadline(TimerDeadline {
                call_id: call_id.clone(),
                phase,
                deadline,
            })
            .await?;
        self.spawn_timer(call_id.clone(), phase, delay);
        Ok(())
    }

    fn spawn_timer(&self, call_id: CallId, phase: TimerPhase, delay: Duration) {
        let coordinator = self.self_ref.clone();
        let fired_call_id = call_id.clone();
        self.timers.arm(&call_id, phase, delay, async move {
            if let Some(coordinator) = coordinator.upgrade() {
                coordinator.handle_timer_fired(fired_call_id, phase).await;
            }
        });
    }

    async fn cancel_phase(&self, call_id: &CallId, phase: TimerPhase) {
        self.timers.cancel(call_id, phase);
        if let Err(e) = self.sessions.remove_timer_deadline(call_id, phase).await {
            warn!(
                "failed to drop {} deadline for call {}: {} (a stale fire will no-op)",
                phase.as_str(),
                call_id,
                e
            );
        }
    }

    /// Timer expiry entry point. Always re-checks current state first: a
    /// timer that lost the race against a user action is a no-op.
    async fn handle_timer_fired(self: Arc<Self>, call_id: CallId, phase: TimerPhase) {
        if let Err(e) = self.sessions.remove_timer_deadline(&call_id, phase).await {
            warn!(
                "failed to drop fired {} deadline for call {}: {}",
                phase.as_str(),
                call_id,
                e
            );
        }

        let session = match self.sessions.get_session(&call_id).await {
            Ok(session) => session,
            Err(e) => {
                warn!(
                    "{} timer for call {}: session read failed: {}",
                    phase.as_str(),
                    call_id,
                    e
                );
                return;
            }
        };

        match phase {
            TimerPhase::Ringing => {
                let Some(session) = session else {
                    debug!("stale ringing timer for gone call {}", call_id);
                    return;
                };
                if session.status != CallStatus::Ringing {
                    debug!(
                        "stale ringing timer for call {} in {:?}",
                        call_id, session.status
                    );
                    return;
                }
                info!("call {} rang out unanswered", call_id);
                let _ = self.events.call_missed.send(Arc::new(CallMissed {
                    call_id: call_id.clone(),
                    initiator: session.initiator.clone(),
                    targets: session.targets().cloned().collect(),
                }));
                if let Err(e) = self.handle_call_failure(&call_id, EndReason::Timeout).await {
                    debug!("ringing timeout for call {} lost the race: {}", call_id, e);
                }
            }
            TimerPhase::Connecting => {
                let Some(session) = session else {
                    debug!("stale connecting timer for gone call {}", call_id);
                    return;
                };
                if session.status != CallStatus::Connecting {
                    debug!(
                        "stale connecting timer for call {} in {:?}",
                        call_id, session.status
                    );
                    return;
                }
                info!("call {} never connected", call_id);
                if let Err(e) = self.handle_call_failure(&call_id, EndReason::Timeout).await {
                    debug!("connecting timeout for call {} lost the race: {}", call_id, e);
                }
            }
            TimerPhase::MaxDuration => {
                let Some(session) = session else {
                    debug!("stale max-duration timer for gone call {}", call_id);
                    return;
                };
                if session.status != CallStatus::Active {
                    debug!(
                        "stale max-duration timer for call {} in {:?}",
                        call_id, session.status
                    );
                    return;
                }
                info!("call {} hit the max-duration safety net", call_id);
                if let Err(e) = self.end_call(&call_id, EndReason::MaxDuration, None).await {
                    debug!("max-duration end for call {} lost the race: {}", call_id, e);
                }
            }
            TimerPhase::Cleanup => {
                if let Some(session) = &session
                    && !session.status.is_terminal()
                {
                    debug!("stale cleanup timer for live call {}", call_id);
                    return;
                }
                if let Err(e) = self.cleanup_call(&call_id).await {
                    warn!("cleanup failed for call {}: {}", call_id, e);
                }
            }
        }
    }
}
