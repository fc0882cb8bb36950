//! Scheduled-task registry for call phase timers.
//!
//! Timers are keyed by `(call id, phase)`; arming a key cancels whatever
//! was armed there before. Cancellation is best-effort; the coordinator
//! re-checks call state when a timer fires, so a stale fire is harmless.
//! Deadlines are persisted separately (see
//! [`TimerDeadline`] and the session store) so a restarted process can
//! re-arm in-flight timers instead of silently abandoning calls.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::types::call::CallId;

/// Which lifecycle deadline a timer guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    Ringing,
    Connecting,
    MaxDuration,
    Cleanup,
}

impl TimerPhase {
    pub const ALL: [TimerPhase; 4] = [
        TimerPhase::Ringing,
        TimerPhase::Connecting,
        TimerPhase::MaxDuration,
        TimerPhase::Cleanup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ringing => "ringing",
            Self::Connecting => "connecting",
            Self::MaxDuration => "max_duration",
            Self::Cleanup => "cleanup",
        }
    }
}

/// Persisted absolute deadline for one `(call, phase)` timer.
///
/// Absolute wall-clock time, not a delay: it must stay meaningful across a
/// process restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerDeadline {
    pub call_id: CallId,
    pub phase: TimerPhase,
    pub deadline: DateTime<Utc>,
}

struct TimerTask {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
    tasks: Mutex<HashMap<(CallId, TimerPhase), TimerTask>>,
    next_generation: AtomicU64,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(tasks) = self.tasks.get_mut() {
            for task in tasks.values() {
                task.handle.abort();
            }
        }
    }
}

/// In-process scheduler for call timers.
#[derive(Clone, Default)]
pub struct TimerRegistry {
    inner: Arc<Inner>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer, cancelling any timer already armed for the same key.
    ///
    /// `on_fire` runs after `delay` unless the timer is cancelled first.
    /// A per-key generation counter guarantees a fired stale task never
    /// removes the handle of a newer timer armed under the same key.
    pub fn arm<F>(&self, call_id: &CallId, phase: TimerPhase, delay: std::time::Duration, on_fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let key = (call_id.clone(), phase);
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut tasks = inner
                    .tasks
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                match tasks.get(&task_key) {
                    Some(task) if task.generation == generation => {
                        tasks.remove(&task_key);
                    }
                    _ => {}
                }
            }
            on_fire.await;
        });

        let mut tasks = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = tasks.insert(key, TimerTask { generation, handle }) {
            previous.handle.abort();
        }
    }

    /// Cancel a single phase timer. Returns whether one was armed.
    pub fn cancel(&self, call_id: &CallId, phase: TimerPhase) -> bool {
        let mut tasks = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match tasks.remove(&(call_id.clone(), phase)) {
            Some(task) => {
                task.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every timer for a call. Returns how many were armed.
    pub fn cancel_all(&self, call_id: &CallId) -> usize {
        let mut tasks = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut cancelled = 0;
        tasks.retain(|(id, phase), task| {
            if id == call_id {
                debug!("cancelling {} timer for call {}", phase.as_str(), id);
                task.handle.abort();
                cancelled += 1;
                false
            } else {
                true
            }
        });
        cancelled
    }

    pub fn active_count(&self) -> usize {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
