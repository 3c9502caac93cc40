//! Event system for progress and session-change notification
//!
//! An in-process event bus built on `tokio::sync::broadcast`. The bus is
//! constructed once at the composition root and cloned into whatever needs
//! to emit; there is no ambient global bus. Emission is fire-and-forget: if
//! no subscribers exist the event is dropped, and lagging subscribers never
//! block emitters.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{Platform, PostAttemptResult};

/// Event receiver type alias
pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus with the specified per-subscriber capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers.
    ///
    /// Non-blocking; send errors (no receivers) are ignored.
    pub fn emit(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Events emitted during posting and session lifecycle operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A fan-out started for the listed platforms
    PostingStarted { platforms: Vec<Platform> },

    /// Per-platform lifecycle transition; fired at least twice per platform
    /// (entering `posting`, then the terminal state with the full result)
    PostingProgress {
        platform: Platform,
        result: PostAttemptResult,
    },

    /// The fan-out settled; carries the final per-platform results
    PostingCompleted {
        results: Vec<PostAttemptResult>,
        errors: Vec<String>,
    },

    /// The session store changed. No payload: consumers re-read the store.
    SessionsChanged,
}
