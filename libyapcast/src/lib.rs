//! Yapcast - post once, land everywhere
//!
//! Core library for a multi-platform crossposter: a single composition fans
//! out concurrently to Mastodon, Threads, and Bluesky, with per-platform
//! OAuth session lifecycles, a persisted session store, and progress events
//! streamed to whoever is rendering the results.

pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod media_store;
pub mod orchestrator;
pub mod platforms;
pub mod session;
pub mod store;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, YapcastError};
pub use events::{Event, EventBus};
pub use orchestrator::Orchestrator;
pub use session::{Session, SessionStore};
pub use types::{Platform, PostAttemptResult, PostContent, PostOutcome};
