//! Error classification for the transport layer.
//!
//! [`classify`] is a pure, total function over the closed [`ErrorKind`]
//! taxonomy: every kind maps to exactly one user-facing message and one
//! recovery action, with no default fallthrough. Raw internal errors stay
//! on the server; clients only ever see the classified shape.

use serde::Serialize;

use super::error::CallError;
use crate::types::call::{CallId, UserId};

/// Closed taxonomy of call failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    // Network
    NetworkUnreachable,
    IceConnectionFailed,
    // Permission
    MediaPermissionDenied,
    // User state
    UserBusy,
    UserOffline,
    CallDeclined,
    CallNotFound,
    // Timeouts
    RingingTimeout,
    ConnectingTimeout,
    MaxDurationExceeded,
    // Signaling
    OfferFailed,
    AnswerFailed,
    ConnectionLost,
    // Authorization / limits
    NotAuthorized,
    ConcurrentCallLimit,
    InvalidState,
    // System
    StorageUnavailable,
}

impl ErrorKind {
    /// Every defined kind, for exhaustiveness checks.
    pub const ALL: [ErrorKind; 17] = [
        ErrorKind::NetworkUnreachable,
        ErrorKind::IceConnectionFailed,
        ErrorKind::MediaPermissionDenied,
        ErrorKind::UserBusy,
        ErrorKind::UserOffline,
        ErrorKind::CallDeclined,
        ErrorKind::CallNotFound,
        ErrorKind::RingingTimeout,
        ErrorKind::ConnectingTimeout,
        ErrorKind::MaxDurationExceeded,
        ErrorKind::OfferFailed,
        ErrorKind::AnswerFailed,
        ErrorKind::ConnectionLost,
        ErrorKind::NotAuthorized,
        ErrorKind::ConcurrentCallLimit,
        ErrorKind::InvalidState,
        ErrorKind::StorageUnavailable,
    ];
}

/// What the client should do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    Retry,
    Fallback,
    Abort,
    Redirect,
}

/// Recovery instructions attached to a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecoveryAction {
    pub strategy: RecoveryStrategy,
    pub max_retries: u32,
    pub retry_delay_ms: Option<u64>,
}

impl RecoveryAction {
    const fn retry(max_retries: u32, retry_delay_ms: u64) -> Self {
        Self {
            strategy: RecoveryStrategy::Retry,
            max_retries,
            retry_delay_ms: Some(retry_delay_ms),
        }
    }

    const fn fallback() -> Self {
        Self {
            strategy: RecoveryStrategy::Fallback,
            max_retries: 0,
            retry_delay_ms: None,
        }
    }

    const fn abort() -> Self {
        Self {
            strategy: RecoveryStrategy::Abort,
            max_retries: 0,
            retry_delay_ms: None,
        }
    }

    const fn redirect() -> Self {
        Self {
            strategy: RecoveryStrategy::Redirect,
            max_retries: 0,
            retry_delay_ms: None,
        }
    }
}

/// Localized, user-facing description of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UserFacingError {
    pub title: &'static str,
    pub message: &'static str,
    pub action: &'static str,
}

/// Structured context attached to a classification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorContext {
    pub call_id: Option<CallId>,
    pub user_id: Option<UserId>,
    pub cause: Option<String>,
}

impl ErrorContext {
    pub fn for_call(call_id: CallId) -> Self {
        Self {
            call_id: Some(call_id),
            ..Default::default()
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

/// A fully classified failure: internal detail for logs, localized shape
/// for clients.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub internal_message: String,
    pub user: UserFacingError,
    pub recovery: RecoveryAction,
    pub recoverable: bool,
}

/// Classify a failure kind with its context.
///
/// Pure and total: never panics, and every kind has exactly one arm.
pub fn classify(kind: ErrorKind, context: ErrorContext) -> ClassifiedError {
    let (user, recovery, recoverable) = match kind {
        ErrorKind::NetworkUnreachable => (
            UserFacingError {
                title: "Connection problem",
                message: "We couldn't reach the call service. Check your connection.",
                action: "Try again",
            },
            RecoveryAction::retry(3, 2_000),
            true,
        ),
        ErrorKind::IceConnectionFailed => (
            UserFacingError {
                title: "Connection problem",
                message: "A direct connection could not be established.",
                action: "Try again",
            },
            RecoveryAction::retry(2, 1_000),
            true,
        ),
        ErrorKind::MediaPermissionDenied => (
            UserFacingError {
                title: "Permission needed",
                message: "Calls need access to your microphone and camera.",
                action: "Open settings",
            },
            RecoveryAction::redirect(),
            true,
        ),
        ErrorKind::UserBusy => (
            UserFacingError {
                title: "Busy",
                message: "This person is on another call.",
                action: "Send a message instead",
            },
            RecoveryAction::fallback(),
            true,
        ),
        ErrorKind::UserOffline => (
            UserFacingError {
                title: "Unavailable",
                message: "This person can't take calls right now.",
                action: "Send a message instead",
            },
            RecoveryAction::fallback(),
            true,
        ),
        ErrorKind::CallDeclined => (
            UserFacingError {
                title: "Call declined",
                message: "Your call was declined.",
                action: "Send a message instead",
            },
            RecoveryAction::fallback(),
            true,
        ),
        ErrorKind::CallNotFound => (
            UserFacingError {
                title: "Call unavailable",
                message: "This call no longer exists.",
                action: "Dismiss",
            },
            RecoveryAction::abort(),
            false,
        ),
        ErrorKind::RingingTimeout => (
            UserFacingError {
                title: "No answer",
                message: "Nobody picked up.",
                action: "Leave a message",
            },
            RecoveryAction::fallback(),
            true,
        ),
        ErrorKind::ConnectingTimeout => (
            UserFacingError {
                title: "Couldn't connect",
                message: "The call was accepted but a connection never formed.",
                action: "Leave a message",
            },
            RecoveryAction::fallback(),
            true,
        ),
        ErrorKind::MaxDurationExceeded => (
            UserFacingError {
                title: "Call ended",
                message: "The call reached its maximum duration.",
                action: "Call again",
            },
            RecoveryAction::fallback(),
            true,
        ),
        ErrorKind::OfferFailed => (
            UserFacingError {
                title: "Call setup failed",
                message: "The call offer couldn't be delivered.",
                action: "Try again",
            },
            RecoveryAction::retry(2, 1_000),
            true,
        ),
        ErrorKind::AnswerFailed => (
            UserFacingError {
                title: "Call setup failed",
                message: "The call answer couldn't be delivered.",
                action: "Try again",
            },
            RecoveryAction::retry(2, 1_000),
            true,
        ),
        ErrorKind::ConnectionLost => (
            UserFacingError {
                title: "Connection lost",
                message: "The call dropped.",
                action: "Call again",
            },
            RecoveryAction::retry(1, 500),
            true,
        ),
        ErrorKind::NotAuthorized => (
            UserFacingError {
                title: "Not allowed",
                message: "You are not part of this call.",
                action: "Dismiss",
            },
            RecoveryAction::abort(),
            false,
        ),
        ErrorKind::ConcurrentCallLimit => (
            UserFacingError {
                title: "Too many participants",
                message: "This call can't take more participants.",
                action: "Dismiss",
            },
            RecoveryAction::abort(),
            false,
        ),
        ErrorKind::InvalidState => (
            UserFacingError {
                title: "Action not possible",
                message: "The call has already moved on.",
                action: "Dismiss",
            },
            RecoveryAction::abort(),
            false,
        ),
        ErrorKind::StorageUnavailable => (
            UserFacingError {
                title: "Service unavailable",
                message: "The call service had a hiccup.",
                action: "Try again",
            },
            RecoveryAction::retry(3, 2_000),
            true,
        ),
    };

    let mut internal_message = format!("{:?}", kind);
    if let Some(call_id) = &context.call_id {
        internal_message.push_str(&format!(" call={}", call_id));
    }
    if let Some(user_id) = &context.user_id {
        internal_message.push_str(&format!(" user={}", user_id));
    }
    if let Some(cause) = &context.cause {
        internal_message.push_str(&format!(" cause={}", cause));
    }

    ClassifiedError {
        kind,
        internal_message,
        user,
        recovery,
        recoverable,
    }
}

/// Map a [`CallError`] onto the taxonomy.
///
/// This is how the transport layer turns every rejection into the one
/// uniform response shape; no raw error text ever crosses the wire.
pub fn classify_call_error(error: &CallError) -> ClassifiedError {
    let (kind, context) = match error {
        CallError::NotFound(call_id) | CallError::CallOver(call_id) => (
            ErrorKind::CallNotFound,
            ErrorContext::for_call(call_id.clone()),
        ),
        CallError::InvalidTransition(rejected) => (
            ErrorKind::InvalidState,
            ErrorContext::default().with_cause(rejected.to_string()),
        ),
        CallError::UserBusy(user_id) => (
            ErrorKind::UserBusy,
            ErrorContext {
                user_id: Some(user_id.clone()),
                ..Default::default()
            },
        ),
        CallError::SelfCall | CallError::NoTargets | CallError::NotCallee => (
            ErrorKind::InvalidState,
            ErrorContext::default().with_cause(error.to_string()),
        ),
        CallError::TooManyParticipants { count, max } => (
            ErrorKind::ConcurrentCallLimit,
            ErrorContext::default().with_cause(format!("{} > {}", count, max)),
        ),
        CallError::NotAuthorized { call_id, user_id } => (
            ErrorKind::NotAuthorized,
            ErrorContext {
                call_id: Some(call_id.clone()),
                user_id: Some(user_id.clone()),
                cause: None,
            },
        ),
        CallError::Store(store_error) => (
            ErrorKind::StorageUnavailable,
            ErrorContext::default().with_cause(store_error.to_string()),
        ),
    };
    classify(kind, context)
}

/// Wire shape for a failed operation: `{ "success": false, "error": ... }`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub title: &'static str,
    pub message: &'static str,
    pub action: &'static str,
    pub recoverable: bool,
    pub recovery: RecoveryAction,
}

impl From<ClassifiedError> for ErrorResponse {
    fn from(classified: ClassifiedError) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                kind: classified.kind,
                title: classified.user.title,
                message: classified.user.message,
                action: classified.user.action,
                recoverable: classified.recoverable,
                recovery: classified.recovery,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    /// Every kind classifies to exactly one user-facing message and one
    /// recovery action, and the taxonomy has no duplicates.
    #[test]
    fn test_every_kind_maps_exactly_once() {
        let mut seen = HashSet::new();
        for kind in ErrorKind::ALL {
            assert!(seen.insert(kind), "duplicate kind in ALL: {:?}", kind);

            let classified = classify(kind, ErrorContext::default());
            assert_eq!(classified.kind, kind);
            assert!(!classified.user.title.is_empty());
            assert!(!classified.user.message.is_empty());
            assert!(!classified.user.action.is_empty());

            // Classifying twice is deterministic.
            let again = classify(kind, ErrorContext::default());
            assert_eq!(classified, again);
        }
        assert_eq!(seen.len(), ErrorKind::ALL.len());
    }

    #[test]
    fn test_retry_kinds_carry_retry_budget() {
        for kind in ErrorKind::ALL {
            let classified = classify(kind, ErrorContext::default());
            if classified.recovery.strategy == RecoveryStrategy::Retry {
                assert!(classified.recovery.max_retries > 0, "{:?}", kind);
                assert!(classified.recovery.retry_delay_ms.is_some(), "{:?}", kind);
            }
        }
    }

    #[test]
    fn test_abort_kinds_are_non_recoverable() {
        for kind in ErrorKind::ALL {
            let classified = classify(kind, ErrorContext::default());
            if classified.recovery.strategy == RecoveryStrategy::Abort {
                assert!(!classified.recoverable, "{:?}", kind);
            } else {
                assert!(classified.recoverable, "{:?}", kind);
            }
        }
    }

    #[test]
    fn test_context_lands_in_internal_message_only() {
        let call_id = CallId::new("AC90CFD09DF712D981142B172706F9F2");
        let classified = classify(
            ErrorKind::ConnectionLost,
            ErrorContext::for_call(call_id.clone()).with_cause("socket reset"),
        );
        assert!(classified.internal_message.contains(call_id.as_str()));
        assert!(classified.internal_message.contains("socket reset"));
        // User-facing text never embeds internal detail.
        assert!(!classified.user.message.contains(call_id.as_str()));
    }

    #[test]
    fn test_call_error_mapping_is_typed() {
        let call_id = CallId::generate();
        let classified = classify_call_error(&CallError::NotFound(call_id.clone()));
        assert_eq!(classified.kind, ErrorKind::CallNotFound);

        let classified = classify_call_error(&CallError::NotAuthorized {
            call_id,
            user_id: UserId::new("mallory"),
        });
        assert_eq!(classified.kind, ErrorKind::NotAuthorized);
        assert!(!classified.recoverable);

        let classified = classify_call_error(&CallError::UserBusy(UserId::new("bob")));
        assert_eq!(classified.kind, ErrorKind::UserBusy);
        assert_eq!(classified.recovery.strategy, RecoveryStrategy::Fallback);
    }

    #[test]
    fn test_error_response_wire_shape() {
        let classified = classify(ErrorKind::UserBusy, ErrorContext::default());
        let response = ErrorResponse::from(classified);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["kind"], "user_busy");
        assert_eq!(json["error"]["recovery"]["strategy"], "fallback");
    }
}
