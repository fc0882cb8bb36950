//! Call-related error types.
//!
//! Variants are the discriminators callers match on; nothing in this crate
//! (or in any well-behaved caller) inspects error message text.

use thiserror::Error;

use super::state::InvalidTransition;
use crate::store::error::StoreError;
use crate::types::call::{CallId, UserId};

#[derive(Debug, Error)]
pub enum CallError {
    #[error("call not found: {0}")]
    NotFound(CallId),

    #[error("call already ended: {0}")]
    CallOver(CallId),

    #[error("invalid call state transition: {0}")]
    InvalidTransition(#[from] InvalidTransition),

    #[error("user {0} is busy with another call")]
    UserBusy(UserId),

    #[error("a call cannot target its own initiator")]
    SelfCall,

    #[error("a call requires at least one target")]
    NoTargets,

    #[error("participant limit exceeded: {count} > {max}")]
    TooManyParticipants { count: usize, max: usize },

    #[error("user {user_id} is not a participant of call {call_id}")]
    NotAuthorized { call_id: CallId, user_id: UserId },

    #[error("the initiator cannot accept its own call")]
    NotCallee,

    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}
