//! Call state machine implementation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::call::{CallId, CallStatus, CallType, EndReason, UserId};

/// Ephemeral state of one live call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSession {
    pub call_id: CallId,
    pub call_type: CallType,
    pub status: CallStatus,
    pub initiator: UserId,
    /// Non-empty, always includes the initiator, no duplicates.
    pub participants: Vec<UserId>,
    pub conversation_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Set by the terminal transition, for reads that race the cleanup delay.
    pub end_reason: Option<EndReason>,
}

impl CallSession {
    pub fn new(
        call_id: CallId,
        call_type: CallType,
        initiator: UserId,
        targets: &[UserId],
        conversation_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        let mut participants = Vec::with_capacity(targets.len() + 1);
        participants.push(initiator.clone());
        for target in targets {
            if !participants.contains(target) {
                participants.push(target.clone());
            }
        }

        Self {
            call_id,
            call_type,
            status: CallStatus::Initiating,
            initiator,
            participants,
            conversation_id,
            created_at: now,
            last_activity: now,
            end_reason: None,
        }
    }

    pub fn is_participant(&self, user_id: &UserId) -> bool {
        self.participants.contains(user_id)
    }

    /// Participants other than the initiator.
    pub fn targets(&self) -> impl Iterator<Item = &UserId> {
        self.participants.iter().filter(|p| **p != self.initiator)
    }

    /// Apply a state transition. Returns error and mutates nothing if the
    /// transition is invalid from the current status.
    pub fn apply_transition(&mut self, transition: &CallTransition) -> Result<(), InvalidTransition> {
        use CallStatus::*;

        let (new_status, end_reason) = match (self.status, transition) {
            (Initiating, CallTransition::RingingStarted) => (Ringing, None),
            (Ringing, CallTransition::Accepted) => (Connecting, None),
            (Connecting, CallTransition::Connected) => (Active, None),
            (
                Initiating | Ringing | Connecting | Active,
                CallTransition::Terminated { reason },
            ) => (Ended, Some(*reason)),
            (
                Initiating | Ringing | Connecting | Active,
                CallTransition::Failed { reason },
            ) => (Failed, Some(*reason)),
            (current, transition) => {
                return Err(InvalidTransition {
                    from: current,
                    attempted: transition.name(),
                });
            }
        };

        self.status = new_status;
        if end_reason.is_some() {
            self.end_reason = end_reason;
        }
        self.last_activity = Utc::now();
        Ok(())
    }
}

/// State transitions for calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTransition {
    /// INITIATING -> RINGING, applied immediately after initiation.
    RingingStarted,
    /// RINGING -> CONNECTING, a callee accepted.
    Accepted,
    /// CONNECTING -> ACTIVE, media connection established.
    Connected,
    /// Any non-terminal status -> ENDED.
    Terminated { reason: EndReason },
    /// Any non-terminal status -> FAILED.
    Failed { reason: EndReason },
}

impl CallTransition {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RingingStarted => "RingingStarted",
            Self::Accepted => "Accepted",
            Self::Connected => "Connected",
            Self::Terminated { .. } => "Terminated",
            Self::Failed { .. } => "Failed",
        }
    }
}

/// A transition was attempted from a status that does not permit it.
///
/// This is the guard that rejects duplicate and out-of-order signals
/// (double-accept, hangup racing a timeout); losers of a phase race get
/// this error while the call state stays whatever the winner made it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: CallStatus,
    pub attempted: &'static str,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {} from state {:?}",
            self.attempted, self.from
        )
    }
}

impl std::error::Error for InvalidTransition {}
