//! Multi-platform posting orchestration
//!
//! Takes one composition and produces one aggregated outcome, dispatching
//! every selected platform concurrently and streaming per-platform progress
//! through the event bus. Sessions are read once, as a snapshot taken
//! before the fan-out; the orchestrator never writes to the session store.

use futures::future::join_all;
use tracing::{info, warn};

use crate::events::{Event, EventBus};
use crate::platforms::PosterRegistry;
use crate::session::SessionSnapshot;
use crate::types::{Platform, PostAttemptResult, PostContent, PostOutcome};

pub struct Orchestrator {
    registry: PosterRegistry,
    event_bus: EventBus,
}

impl Orchestrator {
    pub fn new(registry: PosterRegistry, event_bus: EventBus) -> Self {
        Self {
            registry,
            event_bus,
        }
    }

    /// Fan one composition out to every selected platform.
    ///
    /// Always returns a well-formed outcome with exactly one result per
    /// selected platform, in selection order; nothing escapes as an error.
    /// Each platform transitions `posting` then `completed`/`failed`, with a
    /// progress event per transition. A platform without a stored session
    /// fails immediately without any network I/O. Dispatches run
    /// concurrently and are joined at the end, so one slow platform never
    /// delays the others; a panic inside a poster is caught at the join and
    /// downgraded to a failed result for that platform alone.
    pub async fn post_all(
        &self,
        content: &PostContent,
        sessions: &SessionSnapshot,
    ) -> PostOutcome {
        info!(
            "Posting to {} platform(s): {:?}",
            content.platforms.len(),
            content.platforms
        );
        self.event_bus.emit(Event::PostingStarted {
            platforms: content.platforms.clone(),
        });

        let mut slots: Vec<PostAttemptResult> = content
            .platforms
            .iter()
            .map(|&p| PostAttemptResult::pending(p))
            .collect();
        let mut dispatched = Vec::new();

        for (index, &platform) in content.platforms.iter().enumerate() {
            self.event_bus.emit(Event::PostingProgress {
                platform,
                result: PostAttemptResult::posting(platform),
            });

            let session = match sessions.get(&platform) {
                Some(session) => session.clone(),
                None => {
                    let result = PostAttemptResult::failed(
                        platform,
                        format!("{} account not connected", platform.display_name()),
                    );
                    self.event_bus.emit(Event::PostingProgress {
                        platform,
                        result: result.clone(),
                    });
                    slots[index] = result;
                    continue;
                }
            };

            let poster = match self.registry.get(platform) {
                Some(poster) => poster,
                None => {
                    let result = PostAttemptResult::failed(
                        platform,
                        format!("No poster registered for {}", platform),
                    );
                    self.event_bus.emit(Event::PostingProgress {
                        platform,
                        result: result.clone(),
                    });
                    slots[index] = result;
                    continue;
                }
            };

            let text = content.text.clone();
            let images = content.images.clone();
            dispatched.push((
                index,
                platform,
                tokio::spawn(async move { poster.post(&session, &text, &images).await }),
            ));
        }

        // Join in dispatch order; completion order is irrelevant since every
        // result lands in its platform's slot.
        for (index, platform, handle) in dispatched {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!("Poster for {} aborted: {}", platform, e);
                    PostAttemptResult::failed(platform, format!("Unexpected failure: {}", e))
                }
            };
            self.event_bus.emit(Event::PostingProgress {
                platform,
                result: result.clone(),
            });
            slots[index] = result;
        }

        let errors: Vec<String> = slots
            .iter()
            .filter(|r| !r.success)
            .filter_map(|r| {
                r.error
                    .as_ref()
                    .map(|e| format!("{}: {}", r.platform, e))
            })
            .collect();

        let outcome = PostOutcome {
            results: slots,
            errors,
            is_posting: false,
        };
        info!("{}", outcome.summary());
        self.event_bus.emit(Event::PostingCompleted {
            results: outcome.results.clone(),
            errors: outcome.errors.clone(),
        });

        outcome
    }

    /// Probe each platform's stored session with a lightweight authenticated
    /// call; platforms without a session report `false`.
    pub async fn verify_connections(
        &self,
        platforms: &[Platform],
        sessions: &SessionSnapshot,
    ) -> Vec<(Platform, bool)> {
        let probes: Vec<_> = platforms
            .iter()
            .map(|&platform| {
                let session = sessions.get(&platform).cloned();
                let poster = self.registry.get(platform);
                async move {
                    let ok = match (session, poster) {
                        (Some(session), Some(poster)) => {
                            poster.verify_connection(&session).await
                        }
                        _ => false,
                    };
                    (platform, ok)
                }
            })
            .collect();

        join_all(probes).await
    }
}
