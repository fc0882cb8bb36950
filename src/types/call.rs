//! Core call identifiers and enums shared across the crate.

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Opaque, server-generated call identifier.
///
/// Call ids are never client-supplied; [`CallId::generate`] is the only
/// way a new one comes into existence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh call id: 16 random bytes as 32 uppercase hex chars.
    pub fn generate() -> Self {
        let mut random_bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut random_bytes);
        Self(hex::encode(random_bytes).to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authenticated user identifier, assigned by the identity layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Kind of call being placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallType {
    Voice,
    Video,
    GroupVoice,
    GroupVideo,
}

impl CallType {
    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video | Self::GroupVideo)
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Self::GroupVoice | Self::GroupVideo)
    }
}

/// Lifecycle status of a call session.
///
/// The only legal forward path is
/// `Initiating -> Ringing -> Connecting -> Active`, with `Ended` and
/// `Failed` reachable from any non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Initiating,
    Ringing,
    Connecting,
    Active,
    Ended,
    Failed,
}

impl CallStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Failed)
    }
}

/// Why a call reached a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// A participant hung up a connected call.
    UserEnded,
    /// The callee declined while ringing.
    Declined,
    /// The callee was engaged in another call.
    Busy,
    /// The initiator cancelled before the callee answered.
    Cancelled,
    /// A ringing or connecting phase timer expired.
    Timeout,
    /// The max-duration safety net fired.
    MaxDuration,
    /// A participant's transport dropped and reconciliation ended the call.
    ConnectionLost,
    /// Offer/answer relay could not complete.
    SignalingFailure,
    /// An internal failure killed the call.
    SystemFailure,
}

/// A user's engagement while attached to a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagedStatus {
    Initiating,
    Ringing,
    InCall,
}

/// Per-user call presence.
///
/// `Idle` is represented by key absence in the ephemeral store; the store
/// materializes it on read so callers never deal with missing keys. A user
/// holds at most one engaged call id at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallPresence {
    Idle,
    Engaged { call_id: CallId, status: EngagedStatus },
}

impl CallPresence {
    pub fn initiating(call_id: CallId) -> Self {
        Self::Engaged {
            call_id,
            status: EngagedStatus::Initiating,
        }
    }

    pub fn ringing(call_id: CallId) -> Self {
        Self::Engaged {
            call_id,
            status: EngagedStatus::Ringing,
        }
    }

    pub fn in_call(call_id: CallId) -> Self {
        Self::Engaged {
            call_id,
            status: EngagedStatus::InCall,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// The call the user is currently engaged in, if any.
    pub fn current_call_id(&self) -> Option<&CallId> {
        match self {
            Self::Idle => None,
            Self::Engaged { call_id, .. } => Some(call_id),
        }
    }
}
