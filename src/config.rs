use std::time::Duration;

/// Configuration for the call lifecycle coordinator.
#[derive(Debug, Clone)]
pub struct CallConfig {
    /// How long a call may ring before it is failed as missed.
    pub ringing_timeout: Duration,
    /// How long media negotiation may take after an accept.
    pub connecting_timeout: Duration,
    /// Safety net against a lost hangup signal.
    pub max_call_duration: Duration,
    /// Delay before terminal ephemeral state is removed, so in-flight
    /// reads still observe the terminal status.
    pub cleanup_delay: Duration,
    /// Leak safety net on session/presence entries; explicit deletes are
    /// the control mechanism.
    pub session_ttl: Duration,
    /// Signaling blobs expire independently of the session TTL.
    pub signaling_ttl: Duration,
    /// Participant cap including the initiator.
    pub max_participants: usize,
    /// Per-user ICE candidate cap within one call.
    pub max_ice_candidates_per_user: usize,
    /// Bound on the per-user call list scanned during disconnect
    /// reconciliation.
    pub reconcile_scan_limit: usize,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ringing_timeout: Duration::from_secs(30),
            connecting_timeout: Duration::from_secs(15),
            max_call_duration: Duration::from_secs(60 * 60),
            cleanup_delay: Duration::from_secs(5),
            session_ttl: Duration::from_secs(2 * 60 * 60),
            signaling_ttl: Duration::from_secs(5 * 60),
            max_participants: 8,
            max_ice_candidates_per_user: 64,
            reconcile_scan_limit: 16,
        }
    }
}
