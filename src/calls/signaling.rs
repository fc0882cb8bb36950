//! Opaque signaling relay.
//!
//! [`SignalExchange`] stores the latest SDP offer/answer and per-user ICE
//! candidate lists for a call. It never parses SDP or ICE content and
//! never touches call state; authorization is the caller's job, checked
//! against the session store before anything lands here. Blobs sit in
//! their own short-TTL map and are removed explicitly when a call is
//! cleaned up.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::store::ttl::TtlMemoryStore;
use crate::types::call::{CallId, UserId};

/// An opaque SDP payload with sender attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub from: UserId,
    pub sdp: String,
    pub received_at: DateTime<Utc>,
}

/// One proposed network path, relayed verbatim between peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u32>,
}

/// Signaling state accumulated for one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalingBlob {
    pub offer: Option<SessionDescription>,
    pub answer: Option<SessionDescription>,
    /// Append-only per user; bounded by the exchange's candidate cap.
    pub candidates: HashMap<UserId, Vec<IceCandidate>>,
}

/// Store-and-relay for call signaling payloads.
pub struct SignalExchange {
    blobs: TtlMemoryStore<CallId, SignalingBlob>,
    max_candidates_per_user: usize,
}

impl SignalExchange {
    pub fn new(ttl: Duration, max_candidates_per_user: usize) -> Self {
        Self {
            blobs: TtlMemoryStore::new(ttl),
            max_candidates_per_user,
        }
    }

    /// Store the latest offer for a call, replacing any previous one.
    pub async fn store_offer(&self, call_id: &CallId, from: &UserId, sdp: String) {
        let description = SessionDescription {
            from: from.clone(),
            sdp,
            received_at: Utc::now(),
        };
        self.blobs
            .upsert(call_id.clone(), SignalingBlob::default, |blob| {
                blob.offer = Some(description);
            })
            .await;
    }

    /// Store the latest answer for a call, replacing any previous one.
    pub async fn store_answer(&self, call_id: &CallId, from: &UserId, sdp: String) {
        let description = SessionDescription {
            from: from.clone(),
            sdp,
            received_at: Utc::now(),
        };
        self.blobs
            .upsert(call_id.clone(), SignalingBlob::default, |blob| {
                blob.answer = Some(description);
            })
            .await;
    }

    /// Append an ICE candidate to the user's list for this call.
    ///
    /// Appends past the per-user cap are dropped with a warning; candidate
    /// floods must never become a caller-visible failure.
    pub async fn append_ice_candidate(
        &self,
        call_id: &CallId,
        user_id: &UserId,
        candidate: IceCandidate,
    ) {
        let cap = self.max_candidates_per_user;
        let dropped = self
            .blobs
            .upsert(call_id.clone(), SignalingBlob::default, |blob| {
                let list = blob.candidates.entry(user_id.clone()).or_default();
                if list.len() >= cap {
                    return true;
                }
                list.push(candidate);
                false
            })
            .await;
        if dropped {
            warn!(
                "dropping ICE candidate for call {}: user {} hit the cap of {}",
                call_id, user_id, cap
            );
        }
    }

    /// Snapshot of the current signaling state for a call.
    pub async fn get_signaling_state(&self, call_id: &CallId) -> Option<SignalingBlob> {
        self.blobs.get(call_id).await
    }

    /// Drop everything stored for a call.
    pub async fn remove(&self, call_id: &CallId) {
        self.blobs.remove(call_id).await;
    }
}
