//! Durable call record model.
//!
//! A [`CallRecord`] is created at initiation, appended to while the call is
//! live, and finalized exactly once at termination. Once finalized it is
//! immutable; the ledger enforces that by treating later writes as no-ops.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::call::{CallId, CallStatus, CallType, EndReason, UserId};

/// Status of one participant within a call record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Invited,
    Ringing,
    Joined,
    Left,
    Declined,
}

/// Per-participant sub-record of a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub user_id: UserId,
    pub status: ParticipantStatus,
    pub joined_at: Option<DateTime<Utc>>,
    pub left_at: Option<DateTime<Utc>>,
}

impl ParticipantRecord {
    pub fn new(user_id: UserId, status: ParticipantStatus) -> Self {
        Self {
            user_id,
            status,
            joined_at: None,
            left_at: None,
        }
    }
}

/// Optional connection quality metrics attached at finalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub avg_rtt_ms: Option<u32>,
    pub packet_loss_pct: Option<f32>,
    pub jitter_ms: Option<u32>,
}

/// Durable record of a call, superset of the ephemeral session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_id: CallId,
    pub call_type: CallType,
    pub status: CallStatus,
    pub initiator: UserId,
    pub participants: Vec<ParticipantRecord>,
    pub conversation_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Server-derived seconds between `started_at` and `ended_at`.
    /// Never client-supplied; zero until finalization.
    pub duration_secs: i64,
    pub end_reason: Option<EndReason>,
    pub quality: Option<QualityMetrics>,
}

impl CallRecord {
    /// Record for a freshly initiated call. The initiator joins at
    /// creation; every target starts out ringing.
    pub fn new(
        call_id: CallId,
        call_type: CallType,
        initiator: UserId,
        targets: &[UserId],
        conversation_id: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut participants = Vec::with_capacity(targets.len() + 1);
        let mut initiator_record =
            ParticipantRecord::new(initiator.clone(), ParticipantStatus::Joined);
        initiator_record.joined_at = Some(created_at);
        participants.push(initiator_record);
        for target in targets {
            participants.push(ParticipantRecord::new(
                target.clone(),
                ParticipantStatus::Ringing,
            ));
        }

        Self {
            call_id,
            call_type,
            status: CallStatus::Initiating,
            initiator,
            participants,
            conversation_id,
            created_at,
            started_at: None,
            ended_at: None,
            duration_secs: 0,
            end_reason: None,
            quality: None,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn participant_mut(&mut self, user_id: &UserId) -> Option<&mut ParticipantRecord> {
        self.participants
            .iter_mut()
            .find(|p| &p.user_id == user_id)
    }
}

/// Derive a call's duration in whole seconds.
///
/// Always computed from server timestamps at finalization: zero when the
/// call never reached ACTIVE, never negative even for skewed inputs.
pub fn call_duration_secs(
    started_at: Option<DateTime<Utc>>,
    ended_at: DateTime<Utc>,
) -> i64 {
    match started_at {
        Some(started_at) => ended_at.signed_duration_since(started_at).num_seconds().max(0),
        None => 0,
    }
}
