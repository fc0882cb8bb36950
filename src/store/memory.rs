//! In-memory store backends.
//!
//! [`MemorySessionStore`] plays the role of the low-latency TTL store and
//! [`MemoryCallLedger`] the durable document store. They are the backends
//! used by tests and the demo binary; deployments swap in adapters over
//! real infrastructure behind the same traits.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use tokio::sync::Mutex;

use super::error::Result;
use super::traits::{CallLedger, SessionStateStore, TransitionOutcome};
use super::ttl::TtlMemoryStore;
use crate::calls::state::{CallSession, CallTransition};
use crate::calls::timers::{TimerDeadline, TimerPhase};
use crate::types::call::{CallId, CallPresence, CallStatus, EndReason, UserId};
use crate::types::record::{call_duration_secs, CallRecord, ParticipantStatus, QualityMetrics};

pub struct MemorySessionStore {
    sessions: TtlMemoryStore<CallId, CallSession>,
    presence: TtlMemoryStore<UserId, CallPresence>,
    /// Secondary index user -> call ids, maintained on session writes.
    user_calls: Mutex<HashMap<UserId, BTreeSet<CallId>>>,
    timer_deadlines: Mutex<HashMap<(CallId, TimerPhase), TimerDeadline>>,
}

impl MemorySessionStore {
    pub fn new(session_ttl: Duration) -> Self {
        Self {
            sessions: TtlMemoryStore::new(session_ttl),
            presence: TtlMemoryStore::new(session_ttl),
            user_calls: Mutex::new(HashMap::new()),
            timer_deadlines: Mutex::new(HashMap::new()),
        }
    }

    async fn index_participants(&self, call_id: &CallId, participants: &[UserId]) {
        let mut index = self.user_calls.lock().await;
        for user_id in participants {
            index
                .entry(user_id.clone())
                .or_default()
                .insert(call_id.clone());
        }
    }

    async fn unindex_call(&self, call_id: &CallId, participants: &[UserId]) {
        let mut index = self.user_calls.lock().await;
        for user_id in participants {
            if let Some(calls) = index.get_mut(user_id) {
                calls.remove(call_id);
                if calls.is_empty() {
                    index.remove(user_id);
                }
            }
        }
    }
}

#[async_trait]
impl SessionStateStore for MemorySessionStore {
    async fn create_session(&self, session: CallSession) -> Result<()> {
        self.index_participants(&session.call_id, &session.participants)
            .await;
        self.sessions.put(session.call_id.clone(), session).await;
        Ok(())
    }

    async fn get_session(&self, call_id: &CallId) -> Result<Option<CallSession>> {
        Ok(self.sessions.get(call_id).await)
    }

    async fn apply_transition(
        &self,
        call_id: &CallId,
        transition: CallTransition,
    ) -> Result<TransitionOutcome> {
        let outcome = self
            .sessions
            .update(call_id, |session| {
                match session.apply_transition(&transition) {
                    Ok(()) => TransitionOutcome::Applied(session.clone()),
                    Err(rejected) => TransitionOutcome::Rejected(rejected),
                }
            })
            .await;
        Ok(outcome.unwrap_or(TransitionOutcome::NotFound))
    }

    async fn add_participant(
        &self,
        call_id: &CallId,
        user_id: &UserId,
    ) -> Result<Option<CallSession>> {
        let session = self
            .sessions
            .update(call_id, |session| {
                if !session.participants.contains(user_id) {
                    session.participants.push(user_id.clone());
                }
                session.last_activity = Utc::now();
                session.clone()
            })
            .await;
        if let Some(session) = &session {
            self.index_participants(call_id, std::slice::from_ref(user_id))
                .await;
            debug!(
                "added participant {} to call {} ({} total)",
                user_id,
                call_id,
                session.participants.len()
            );
        }
        Ok(session)
    }

    async fn remove_participant(
        &self,
        call_id: &CallId,
        user_id: &UserId,
    ) -> Result<Option<CallSession>> {
        let mut removed = false;
        let session = self
            .sessions
            .update(call_id, |session| {
                if *user_id != session.initiator && session.participants.contains(user_id) {
                    session.participants.retain(|p| p != user_id);
                    removed = true;
                }
                session.last_activity = Utc::now();
                session.clone()
            })
            .await;
        if removed {
            self.unindex_call(call_id, std::slice::from_ref(user_id)).await;
        }
        Ok(session)
    }

    async fn remove_session(&self, call_id: &CallId) -> Result<()> {
        if let Some(session) = self.sessions.remove(call_id).await {
            self.unindex_call(call_id, &session.participants).await;
        }
        Ok(())
    }

    async fn get_presence(&self, user_id: &UserId) -> Result<CallPresence> {
        Ok(self
            .presence
            .get(user_id)
            .await
            .unwrap_or(CallPresence::Idle))
    }

    async fn set_presence(&self, user_id: &UserId, presence: CallPresence) -> Result<()> {
        match presence {
            CallPresence::Idle => {
                self.presence.remove(user_id).await;
            }
            engaged => {
                self.presence.put(user_id.clone(), engaged).await;
            }
        }
        Ok(())
    }

    async fn call_ids_for_user(&self, user_id: &UserId, limit: usize) -> Result<Vec<CallId>> {
        let index = self.user_calls.lock().await;
        Ok(index
            .get(user_id)
            .map(|calls| calls.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn put_timer_deadline(&self, deadline: TimerDeadline) -> Result<()> {
        let mut deadlines = self.timer_deadlines.lock().await;
        deadlines.insert((deadline.call_id.clone(), deadline.phase), deadline);
        Ok(())
    }

    async fn remove_timer_deadline(&self, call_id: &CallId, phase: TimerPhase) -> Result<()> {
        let mut deadlines = self.timer_deadlines.lock().await;
        deadlines.remove(&(call_id.clone(), phase));
        Ok(())
    }

    async fn list_timer_deadlines(&self) -> Result<Vec<TimerDeadline>> {
        let deadlines = self.timer_deadlines.lock().await;
        Ok(deadlines.values().cloned().collect())
    }
}

#[derive(Default)]
pub struct MemoryCallLedger {
    records: Mutex<HashMap<CallId, CallRecord>>,
}

impl MemoryCallLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CallLedger for MemoryCallLedger {
    async fn create(&self, record: CallRecord) -> Result<()> {
        let mut records = self.records.lock().await;
        if records.contains_key(&record.call_id) {
            warn!("ledger already has a record for call {}", record.call_id);
            return Ok(());
        }
        records.insert(record.call_id.clone(), record);
        Ok(())
    }

    async fn get(&self, call_id: &CallId) -> Result<Option<CallRecord>> {
        Ok(self.records.lock().await.get(call_id).cloned())
    }

    async fn update_participant_status(
        &self,
        call_id: &CallId,
        user_id: &UserId,
        status: ParticipantStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut records = self.records.lock().await;
        let Some(record) = records.get_mut(call_id) else {
            // Creation may have failed earlier; audit is already degraded.
            debug!("no ledger record for call {}, dropping participant update", call_id);
            return Ok(());
        };
        if record.is_finalized() {
            debug!("call {} already finalized, dropping participant update", call_id);
            return Ok(());
        }
        if let Some(participant) = record.participant_mut(user_id) {
            participant.status = status;
            match status {
                ParticipantStatus::Joined => participant.joined_at = Some(at),
                ParticipantStatus::Left => participant.left_at = Some(at),
                _ => {}
            }
        }
        Ok(())
    }

    async fn mark_started(&self, call_id: &CallId, started_at: DateTime<Utc>) -> Result<()> {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(call_id)
            && !record.is_finalized()
        {
            record.status = CallStatus::Active;
            record.started_at = Some(started_at);
        }
        Ok(())
    }

    async fn finalize(
        &self,
        call_id: &CallId,
        terminal_status: CallStatus,
        end_reason: EndReason,
        ended_at: DateTime<Utc>,
        quality: Option<QualityMetrics>,
    ) -> Result<()> {
        let mut records = self.records.lock().await;
        let Some(record) = records.get_mut(call_id) else {
            debug!("no ledger record for call {}, dropping finalize", call_id);
            return Ok(());
        };
        if record.is_finalized() {
            debug!("call {} already finalized, dropping repeat finalize", call_id);
            return Ok(());
        }

        record.status = terminal_status;
        record.end_reason = Some(end_reason);
        record.ended_at = Some(ended_at);
        record.duration_secs = call_duration_secs(record.started_at, ended_at);
        record.quality = quality;
        for participant in &mut record.participants {
            if participant.status == ParticipantStatus::Joined {
                participant.status = ParticipantStatus::Left;
                participant.left_at = Some(ended_at);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::call::CallType;

    fn make_session(initiator: &str, target: &str) -> CallSession {
        CallSession::new(
            CallId::generate(),
            CallType::Voice,
            UserId::new(initiator),
            &[UserId::new(target)],
            None,
        )
    }

    fn make_record(session: &CallSession) -> CallRecord {
        CallRecord::new(
            session.call_id.clone(),
            session.call_type,
            session.initiator.clone(),
            &session.targets().cloned().collect::<Vec<_>>(),
            None,
            session.created_at,
        )
    }

    #[tokio::test]
    async fn test_session_roundtrip_and_index() {
        let store = MemorySessionStore::new(Duration::from_secs(60));
        let session = make_session("alice", "bob");
        let call_id = session.call_id.clone();

        store.create_session(session.clone()).await.unwrap();
        assert_eq!(store.get_session(&call_id).await.unwrap(), Some(session));

        let bob_calls = store
            .call_ids_for_user(&UserId::new("bob"), 10)
            .await
            .unwrap();
        assert_eq!(bob_calls, vec![call_id.clone()]);

        store.remove_session(&call_id).await.unwrap();
        assert_eq!(store.get_session(&call_id).await.unwrap(), None);
        assert!(store
            .call_ids_for_user(&UserId::new("bob"), 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_apply_transition_guard_is_atomic() {
        let store = MemorySessionStore::new(Duration::from_secs(60));
        let session = make_session("alice", "bob");
        let call_id = session.call_id.clone();
        store.create_session(session).await.unwrap();

        match store
            .apply_transition(&call_id, CallTransition::RingingStarted)
            .await
            .unwrap()
        {
            TransitionOutcome::Applied(s) => assert_eq!(s.status, CallStatus::Ringing),
            other => panic!("expected Applied, got {:?}", other),
        }

        // Out-of-order signal is rejected without mutation.
        match store
            .apply_transition(&call_id, CallTransition::Connected)
            .await
            .unwrap()
        {
            TransitionOutcome::Rejected(err) => assert_eq!(err.from, CallStatus::Ringing),
            other => panic!("expected Rejected, got {:?}", other),
        }

        match store
            .apply_transition(&CallId::generate(), CallTransition::Accepted)
            .await
            .unwrap()
        {
            TransitionOutcome::NotFound => {}
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_add_remove_participant_keeps_index_current() {
        let store = MemorySessionStore::new(Duration::from_secs(60));
        let session = make_session("alice", "bob");
        let call_id = session.call_id.clone();
        store.create_session(session).await.unwrap();

        let carol = UserId::new("carol");
        let session = store
            .add_participant(&call_id, &carol)
            .await
            .unwrap()
            .unwrap();
        assert!(session.is_participant(&carol));
        assert_eq!(
            store.call_ids_for_user(&carol, 10).await.unwrap(),
            vec![call_id.clone()]
        );

        // Adding twice does not duplicate.
        let session = store
            .add_participant(&call_id, &carol)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.participants.len(), 3);

        let session = store
            .remove_participant(&call_id, &carol)
            .await
            .unwrap()
            .unwrap();
        assert!(!session.is_participant(&carol));
        assert!(store.call_ids_for_user(&carol, 10).await.unwrap().is_empty());

        // The initiator cannot be removed.
        let session = store
            .remove_participant(&call_id, &UserId::new("alice"))
            .await
            .unwrap()
            .unwrap();
        assert!(session.is_participant(&UserId::new("alice")));
    }

    #[tokio::test]
    async fn test_presence_idle_is_key_absence() {
        let store = MemorySessionStore::new(Duration::from_secs(60));
        let alice = UserId::new("alice");

        assert_eq!(store.get_presence(&alice).await.unwrap(), CallPresence::Idle);

        let call_id = CallId::generate();
        store
            .set_presence(&alice, CallPresence::ringing(call_id.clone()))
            .await
            .unwrap();
        assert_eq!(
            store.get_presence(&alice).await.unwrap(),
            CallPresence::ringing(call_id)
        );

        store.set_presence(&alice, CallPresence::Idle).await.unwrap();
        assert_eq!(store.get_presence(&alice).await.unwrap(), CallPresence::Idle);
    }

    #[tokio::test]
    async fn test_timer_deadline_records() {
        let store = MemorySessionStore::new(Duration::from_secs(60));
        let call_id = CallId::generate();
        let deadline = TimerDeadline {
            call_id: call_id.clone(),
            phase: TimerPhase::Ringing,
            deadline: Utc::now(),
        };

        store.put_timer_deadline(deadline.clone()).await.unwrap();
        assert_eq!(store.list_timer_deadlines().await.unwrap(), vec![deadline]);

        store
            .remove_timer_deadline(&call_id, TimerPhase::Ringing)
            .await
            .unwrap();
        assert!(store.list_timer_deadlines().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ledger_finalize_recomputes_duration_and_is_idempotent() {
        let ledger = MemoryCallLedger::new();
        let session = make_session("alice", "bob");
        let call_id = session.call_id.clone();
        ledger.create(make_record(&session)).await.unwrap();

        let started_at = Utc::now();
        ledger.mark_started(&call_id, started_at).await.unwrap();

        let ended_at = started_at + chrono::Duration::seconds(90);
        ledger
            .finalize(&call_id, CallStatus::Ended, EndReason::UserEnded, ended_at, None)
            .await
            .unwrap();

        let record = ledger.get(&call_id).await.unwrap().unwrap();
        assert_eq!(record.status, CallStatus::Ended);
        assert_eq!(record.duration_secs, 90);
        assert_eq!(record.end_reason, Some(EndReason::UserEnded));

        // Repeat finalize and late participant writes are silent no-ops.
        ledger
            .finalize(
                &call_id,
                CallStatus::Failed,
                EndReason::SystemFailure,
                ended_at + chrono::Duration::seconds(10),
                None,
            )
            .await
            .unwrap();
        ledger
            .update_participant_status(
                &call_id,
                &UserId::new("bob"),
                ParticipantStatus::Joined,
                Utc::now(),
            )
            .await
            .unwrap();

        let record = ledger.get(&call_id).await.unwrap().unwrap();
        assert_eq!(record.status, CallStatus::Ended);
        assert_eq!(record.duration_secs, 90);
    }

    #[tokio::test]
    async fn test_ledger_duration_zero_when_never_active() {
        let ledger = MemoryCallLedger::new();
        let session = make_session("alice", "bob");
        let call_id = session.call_id.clone();
        ledger.create(make_record(&session)).await.unwrap();

        ledger
            .finalize(
                &call_id,
                CallStatus::Failed,
                EndReason::Timeout,
                Utc::now(),
                None,
            )
            .await
            .unwrap();

        let record = ledger.get(&call_id).await.unwrap().unwrap();
        assert_eq!(record.duration_secs, 0);
        assert!(record.started_at.is_none());
    }

    #[tokio::test]
    async fn test_participant_status_updates() {
        let ledger = MemoryCallLedger::new();
        let session = make_session("alice", "bob");
        let call_id = session.call_id.clone();
        ledger.create(make_record(&session)).await.unwrap();

        let now = Utc::now();
        ledger
            .update_participant_status(&call_id, &UserId::new("bob"), ParticipantStatus::Joined, now)
            .await
            .unwrap();

        let record = ledger.get(&call_id).await.unwrap().unwrap();
        let bob = record
            .participants
            .iter()
            .find(|p| p.user_id == UserId::new("bob"))
            .unwrap();
        assert_eq!(bob.status, ParticipantStatus::Joined);
        assert_eq!(bob.joined_at, Some(now));
    }
}
