//! Per-platform auth sessions and the persisted session store

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::store::JsonStore;
use crate::types::Platform;

/// One year, the synthetic expiry given to Mastodon tokens (which do not
/// expire in practice but are modeled with a far-future expiry).
pub const MASTODON_SESSION_TTL_SECS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MastodonSession {
    /// Instance base URL, e.g. "https://mastodon.social"
    pub instance: String,
    pub access_token: String,
    pub user_id: String,
    pub username: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadsProfile {
    pub id: String,
    pub username: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub biography: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadsSession {
    pub access_token: String,
    pub token_type: String,
    /// Token time-to-live in seconds, counted from `created_at`
    pub expires_in: i64,
    pub created_at: i64,
    pub user: ThreadsProfile,
}

impl ThreadsSession {
    pub fn expires_at(&self) -> i64 {
        self.created_at + self.expires_in
    }

    /// Remaining lifetime in seconds (negative once expired)
    pub fn remaining_secs(&self, now: i64) -> i64 {
        self.expires_at() - now
    }
}

/// Thin descriptor for a Bluesky login. The actual JWT material lives in the
/// OAuth vault, keyed by this DID; this record exists for display and lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueskySession {
    pub did: String,
    pub handle: String,
    pub active: bool,
}

/// A platform-scoped record of authentication state, tagged by platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum Session {
    Mastodon(MastodonSession),
    Threads(ThreadsSession),
    Bluesky(BlueskySession),
}

impl Session {
    pub fn platform(&self) -> Platform {
        match self {
            Session::Mastodon(_) => Platform::Mastodon,
            Session::Threads(_) => Platform::Threads,
            Session::Bluesky(_) => Platform::Bluesky,
        }
    }

    /// Absolute expiry timestamp, for the variants that have one
    pub fn expires_at(&self) -> Option<i64> {
        match self {
            Session::Mastodon(s) => s.expires_at,
            Session::Threads(s) => Some(s.expires_at()),
            Session::Bluesky(_) => None,
        }
    }

    /// Platform-specific validity rule: Mastodon/Threads require no expiry
    /// or a future expiry, Bluesky uses its `active` flag.
    pub fn is_valid(&self, now: i64) -> bool {
        match self {
            Session::Mastodon(s) => s.expires_at.map_or(true, |e| e > now),
            Session::Threads(s) => s.expires_at() > now,
            Session::Bluesky(s) => s.active,
        }
    }

    /// Account label for listings (handle or username)
    pub fn account_label(&self) -> &str {
        match self {
            Session::Mastodon(s) => &s.username,
            Session::Threads(s) => &s.user.username,
            Session::Bluesky(s) => &s.handle,
        }
    }
}

/// Read-only copy of the store contents taken once before a fan-out.
pub type SessionSnapshot = BTreeMap<Platform, Session>;

/// Persisted single-record-per-platform credential store.
///
/// One JSON blob on disk, fully rewritten on every mutation. Loading prunes
/// sessions whose computed expiry is in the past and persists the pruned set
/// back immediately, so an expired session is gone for good after the first
/// load that sees it.
///
/// CONTRACT: the store does not emit events and holds no subscriptions.
/// Every mutating call site (in practice, the auth lifecycle managers) must
/// broadcast [`Event::SessionsChanged`](crate::events::Event) after calling
/// `set`/`remove`. Keeping the store free of event-bus dependencies is
/// deliberate; forgetting to announce a mutation is a bug at the call site.
///
/// Writer discipline: only the auth managers mutate the store. The
/// orchestrator and posters work from a [`SessionSnapshot`] taken before
/// dispatch and never write back.
pub struct SessionStore {
    store: JsonStore,
    sessions: BTreeMap<Platform, Session>,
}

impl SessionStore {
    /// Load the store from `path`, pruning expired sessions.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let store = JsonStore::new(path);
        let mut sessions: BTreeMap<Platform, Session> = store.read_or_default();

        let now = chrono::Utc::now().timestamp();
        let before = sessions.len();
        sessions.retain(|platform, session| {
            let expired = session.expires_at().is_some_and(|e| e <= now);
            if expired {
                warn!("Dropping expired {} session", platform);
            }
            !expired
        });

        let store = Self { store, sessions };
        if store.sessions.len() != before {
            store.persist()?;
        }
        debug!(
            "Loaded session store with {} session(s)",
            store.sessions.len()
        );
        Ok(store)
    }

    pub fn get(&self, platform: Platform) -> Option<&Session> {
        self.sessions.get(&platform)
    }

    /// Overwrite the platform's session (at most one per platform) and
    /// persist immediately.
    pub fn set(&mut self, session: Session) -> Result<()> {
        self.sessions.insert(session.platform(), session);
        self.persist()
    }

    /// Delete the platform's session and persist.
    pub fn remove(&mut self, platform: Platform) -> Result<Option<Session>> {
        let removed = self.sessions.remove(&platform);
        if removed.is_some() {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Connected platforms in the fixed enumeration order, for deterministic
    /// downstream auto-selection.
    pub fn connected_platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .iter()
            .copied()
            .filter(|p| self.sessions.contains_key(p))
            .collect()
    }

    pub fn is_valid(&self, platform: Platform) -> bool {
        let now = chrono::Utc::now().timestamp();
        self.sessions
            .get(&platform)
            .map_or(false, |s| s.is_valid(now))
    }

    /// Clone the current contents for a read-only fan-out.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.sessions.clone()
    }

    fn persist(&self) -> Result<()> {
        self.store.write(&self.sessions)
    }
}
