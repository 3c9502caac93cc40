//! Bluesky OAuth lifecycle
//!
//! The vault owns the cryptographic session (tokens, refresh); this manager
//! drives the login flow and keeps the session store's thin descriptor
//! (DID, handle, active flag) in sync with it. The descriptor exists only
//! for UI display and lookup: possession and refresh of tokens are
//! delegated entirely to the vault, restored on demand by DID.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::auth::vault::{CallbackParams, SessionVault};
use crate::config::BlueskyAppConfig;
use crate::error::Result;
use crate::events::{Event, EventBus};
use crate::platforms::http_client;
use crate::session::{BlueskySession, Session, SessionStore};
use crate::types::Platform;

pub struct BlueskyAuth {
    vault: Arc<dyn SessionVault>,
    http: reqwest::Client,
    config: BlueskyAppConfig,
}

impl BlueskyAuth {
    pub fn new(vault: Arc<dyn SessionVault>, config: BlueskyAppConfig) -> Self {
        Self {
            vault,
            http: http_client(),
            config,
        }
    }

    /// Begin a login for `handle`; returns the authorization URL to open.
    pub async fn begin_login(&self, handle: &str) -> Result<String> {
        Ok(self.vault.authorize_url(handle).await?)
    }

    /// Complete the callback: the vault derives and keeps the cryptographic
    /// session; only the thin descriptor lands in the session store.
    pub async fn complete_login(
        &self,
        store: &mut SessionStore,
        bus: &EventBus,
        params: &CallbackParams,
    ) -> Result<BlueskySession> {
        let identity = self.vault.complete(params).await?;
        let handle = self
            .resolve_display_handle(&identity.did, &identity.handle)
            .await;

        let session = BlueskySession {
            did: identity.did,
            handle,
            active: true,
        };

        store.set(Session::Bluesky(session.clone()))?;
        bus.emit(Event::SessionsChanged);
        debug!("Stored Bluesky session for {}", session.did);

        Ok(session)
    }

    /// Best display handle for the DID: ask the session endpoint, then the
    /// PLC directory, then fall back to what the user typed (or the DID).
    async fn resolve_display_handle(&self, did: &str, fallback: &str) -> String {
        if let Some(agent) = self.vault.restore(did).await {
            if let Ok(info) = agent.get_session().await {
                if let Some(handle) = info["handle"].as_str() {
                    return handle.to_string();
                }
            }
        }

        if let Some(handle) = self.plc_directory_handle(did).await {
            return handle;
        }

        if fallback.is_empty() {
            did.to_string()
        } else {
            fallback.to_string()
        }
    }

    /// Look the DID up in the PLC directory and read the `at://` claim.
    async fn plc_directory_handle(&self, did: &str) -> Option<String> {
        let response = self
            .http
            .get(format!("{}/{}", self.config.plc_directory, did))
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }

        let document: serde_json::Value = response.json().await.ok()?;
        document["alsoKnownAs"]
            .as_array()?
            .iter()
            .filter_map(|aka| aka.as_str())
            .find(|aka| aka.starts_with("at://"))
            .map(|aka| aka.trim_start_matches("at://").to_string())
    }

    /// Remove the vault entry and the descriptor.
    pub async fn logout(&self, store: &mut SessionStore, bus: &EventBus) -> Result<()> {
        if let Some(Session::Bluesky(session)) = store.get(Platform::Bluesky) {
            let did = session.did.clone();
            if let Err(e) = self.vault.remove(&did).await {
                warn!("Failed to drop vault entry for {}: {}", did, e);
            }
        }

        store.remove(Platform::Bluesky)?;
        bus.emit(Event::SessionsChanged);
        Ok(())
    }
}
