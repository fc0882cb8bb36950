pub mod call;
pub mod events;
pub mod record;

pub use call::{CallId, CallPresence, CallStatus, CallType, EndReason, EngagedStatus, UserId};
pub use record::{CallRecord, ParticipantRecord, ParticipantStatus, QualityMetrics};
