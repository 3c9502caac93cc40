//! Threads OAuth lifecycle
//!
//! Login: authorization redirect (with a transient CSRF state token), code
//! exchange against the Facebook Graph endpoint, long-lived token exchange,
//! then the profile snapshot. Long-lived tokens last about 60 days; on
//! every session load a background check refreshes tokens that are inside
//! the freshness threshold but not yet expired. The refresh is
//! fire-and-forget: on failure the old token stays in place until it
//! actually expires and surfaces as a posting failure.

use std::sync::{Arc, Mutex, RwLock};

use rand::RngCore;
use tracing::{debug, warn};

use crate::auth::urlencode;
use crate::config::ThreadsAppConfig;
use crate::error::{AuthError, Result};
use crate::events::{Event, EventBus};
use crate::platforms::http_client;
use crate::session::{Session, SessionStore, ThreadsProfile, ThreadsSession};
use crate::types::Platform;

const AUTHORIZE_URL: &str = "https://threads.net/oauth/authorize";
const SCOPES: &str = "threads_basic,threads_content_publish";
/// Fallback TTL when the token endpoints omit expires_in: 60 days
const DEFAULT_TOKEN_TTL_SECS: i64 = 5_184_000;

pub struct ThreadsAuth {
    http: reqwest::Client,
    config: ThreadsAppConfig,
    /// CSRF state for the in-flight authorization, consumed on callback
    pending_state: Mutex<Option<String>>,
}

impl ThreadsAuth {
    pub fn new(config: ThreadsAppConfig) -> Self {
        Self {
            http: http_client(),
            config,
            pending_state: Mutex::new(None),
        }
    }

    /// Authorization page URL; retains the CSRF state until the callback.
    pub fn authorize_url(&self) -> std::result::Result<String, AuthError> {
        if self.config.app_id.is_empty() {
            return Err(AuthError::Registration(
                "Threads app_id is not configured".to_string(),
            ));
        }

        let state = generate_state();
        let url = format!(
            "{}?client_id={}&redirect_uri={}&scope={}&response_type=code&state={}",
            AUTHORIZE_URL,
            urlencode(&self.config.app_id),
            urlencode(&self.config.redirect_uri),
            urlencode(SCOPES),
            state,
        );
        *self.pending_state.lock().unwrap() = Some(state);
        Ok(url)
    }

    /// Exchange the authorization code: verify state, short-lived token,
    /// long-lived token, profile snapshot.
    pub async fn exchange_code(
        &self,
        code: &str,
        state: &str,
    ) -> std::result::Result<ThreadsSession, AuthError> {
        let expected = self.pending_state.lock().unwrap().take();
        if expected.as_deref() != Some(state) {
            return Err(AuthError::StateMismatch);
        }

        let short_token = self.exchange_short_lived(code).await?;
        let (access_token, token_type, expires_in) =
            self.exchange_long_lived(&short_token).await?;
        let user = self.fetch_profile(&access_token).await?;

        Ok(ThreadsSession {
            access_token,
            token_type,
            expires_in,
            created_at: chrono::Utc::now().timestamp(),
            user,
        })
    }

    async fn exchange_short_lived(&self, code: &str) -> std::result::Result<String, AuthError> {
        let response = self
            .http
            .get(format!("{}/oauth/access_token", self.config.graph_base))
            .query(&[
                ("client_id", self.config.app_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("client_secret", self.config.app_secret.as_str()),
                ("code", code),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Exchange(format!("Token exchange failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            return Err(AuthError::Exchange(
                body["error"]["message"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("HTTP {}", status)),
            ));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AuthError::Exchange(format!("Invalid token response: {}", e)))?;

        body["access_token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AuthError::Exchange("No access token received".to_string()))
    }

    async fn exchange_long_lived(
        &self,
        short_token: &str,
    ) -> std::result::Result<(String, String, i64), AuthError> {
        let response = self
            .http
            .get(format!("{}/access_token", self.config.api_base))
            .query(&[
                ("grant_type", "th_exchange_token"),
                ("client_secret", self.config.app_secret.as_str()),
                ("access_token", short_token),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Exchange(format!("Long-lived exchange failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AuthError::Exchange(format!(
                "Long-lived exchange rejected: HTTP {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AuthError::Exchange(format!("Invalid exchange response: {}", e)))?;

        let token = body["access_token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AuthError::Exchange("No long-lived token received".to_string()))?;
        let token_type = body["token_type"].as_str().unwrap_or("bearer").to_string();
        let expires_in = body["expires_in"].as_i64().unwrap_or(DEFAULT_TOKEN_TTL_SECS);

        Ok((token, token_type, expires_in))
    }

    async fn fetch_profile(
        &self,
        access_token: &str,
    ) -> std::result::Result<ThreadsProfile, AuthError> {
        let response = self
            .http
            .get(format!("{}/me", self.config.api_base))
            .query(&[
                (
                    "fields",
                    "id,username,name,threads_profile_picture_url,threads_biography",
                ),
                ("access_token", access_token),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Profile(format!("Profile fetch failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AuthError::Profile(format!(
                "Failed to get user info: HTTP {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AuthError::Profile(format!("Invalid profile response: {}", e)))?;

        let id = body["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AuthError::Profile("No user id in response".to_string()))?;
        let name = body["name"].as_str().unwrap_or_default().to_string();
        let username = body["username"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| name.clone());

        Ok(ThreadsProfile {
            id,
            username,
            name,
            profile_picture_url: body["threads_profile_picture_url"]
                .as_str()
                .map(str::to_string),
            biography: body["threads_biography"].as_str().map(str::to_string),
        })
    }

    /// Finish the login and store the session. The store is only touched
    /// once the whole exchange chain has succeeded.
    pub async fn complete_login(
        &self,
        store: &mut SessionStore,
        bus: &EventBus,
        code: &str,
        state: &str,
    ) -> Result<ThreadsSession> {
        let session = self.exchange_code(code, state).await?;
        store.set(Session::Threads(session.clone()))?;
        bus.emit(Event::SessionsChanged);
        debug!("Stored Threads session for @{}", session.user.username);
        Ok(session)
    }

    /// Refresh the long-lived token, keeping the stored profile snapshot.
    pub async fn refresh(
        &self,
        session: &ThreadsSession,
    ) -> std::result::Result<ThreadsSession, AuthError> {
        let response = self
            .http
            .get(format!("{}/refresh_access_token", self.config.api_base))
            .query(&[
                ("grant_type", "th_refresh_token"),
                ("access_token", session.access_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Exchange(format!("Token refresh failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            return Err(AuthError::Exchange(
                body["error"]["message"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Failed to refresh token: HTTP {}", status)),
            ));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AuthError::Exchange(format!("Invalid refresh response: {}", e)))?;

        let access_token = body["access_token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AuthError::Exchange("No access token in refresh".to_string()))?;

        Ok(ThreadsSession {
            access_token,
            token_type: body["token_type"].as_str().unwrap_or("bearer").to_string(),
            expires_in: body["expires_in"].as_i64().unwrap_or(DEFAULT_TOKEN_TTL_SECS),
            created_at: chrono::Utc::now().timestamp(),
            user: session.user.clone(),
        })
    }

    /// Background freshness check, run after every session store load.
    ///
    /// When the stored token's remaining lifetime is under the threshold but
    /// not yet zero, a refresh task is spawned; the caller is not blocked.
    /// A failed refresh is logged and the old token kept. Returns whether a
    /// refresh was spawned.
    pub fn spawn_refresh_if_stale(
        &self,
        store: Arc<RwLock<SessionStore>>,
        bus: EventBus,
    ) -> bool {
        let session = match store.read().unwrap().get(Platform::Threads) {
            Some(Session::Threads(s)) => s.clone(),
            _ => return false,
        };

        let now = chrono::Utc::now().timestamp();
        if !needs_refresh(&session, now, self.config.refresh_threshold_hours) {
            return false;
        }

        debug!(
            "Threads token has {}s left, refreshing in the background",
            session.remaining_secs(now)
        );
        let auth = ThreadsAuth::new(self.config.clone());
        tokio::spawn(async move {
            match auth.refresh(&session).await {
                Ok(refreshed) => {
                    let stored = store.write().unwrap().set(Session::Threads(refreshed));
                    match stored {
                        Ok(()) => bus.emit(Event::SessionsChanged),
                        Err(e) => warn!("Failed to store refreshed Threads token: {}", e),
                    }
                }
                Err(e) => {
                    warn!("Threads token refresh failed, keeping current token: {}", e);
                }
            }
        });
        true
    }

    /// Delete the local session. Threads has no revocation endpoint; the
    /// token simply ages out server-side.
    pub fn logout(&self, store: &mut SessionStore, bus: &EventBus) -> Result<()> {
        store.remove(Platform::Threads)?;
        bus.emit(Event::SessionsChanged);
        Ok(())
    }
}

/// True when the session is inside the freshness threshold but not expired.
fn needs_refresh(session: &ThreadsSession, now: i64, threshold_hours: i64) -> bool {
    let remaining = session.remaining_secs(now);
    remaining > 0 && remaining < threshold_hours * 3600
}

fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn session_with_remaining(remaining_secs: i64) -> ThreadsSession {
        let now = chrono::Utc::now().timestamp();
        ThreadsSession {
            access_token: "token".to_string(),
            token_type: "bearer".to_string(),
            expires_in: remaining_secs,
            created_at: now,
            user: ThreadsProfile {
                id: "9".to_string(),
                username: "bob".to_string(),
                name: "Bob".to_string(),
                profile_picture_url: None,
                biography: None,
            },
        }
    }

    fn configured_auth() -> ThreadsAuth {
        ThreadsAuth::new(ThreadsAppConfig {
            app_id: "12345".to_string(),
            app_secret: "secret".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_authorize_url_requires_app_id() {
        let auth = ThreadsAuth::new(ThreadsAppConfig::default());
        assert!(matches!(
            auth.authorize_url(),
            Err(AuthError::Registration(_))
        ));
    }

    #[test]
    fn test_authorize_url_carries_state() {
        let auth = configured_auth();
        let url = auth.authorize_url().unwrap();

        assert!(url.starts_with("https://threads.net/oauth/authorize?"));
        assert!(url.contains("client_id=12345"));
        assert!(url.contains("scope=threads_basic%2Cthreads_content_publish"));
        assert!(url.contains("state="));
        assert!(auth.pending_state.lock().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_exchange_rejects_mismatched_state() {
        let auth = configured_auth();
        let _url = auth.authorize_url().unwrap();

        let result = auth.exchange_code("some-code", "wrong-state").await;
        assert!(matches!(result, Err(AuthError::StateMismatch)));
        // The pending state was consumed either way
        assert!(auth.pending_state.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_exchange_without_pending_state_is_rejected() {
        let auth = configured_auth();
        let result = auth.exchange_code("some-code", "any-state").await;
        assert!(matches!(result, Err(AuthError::StateMismatch)));
    }

    #[test]
    fn test_needs_refresh_inside_threshold() {
        // 2 hours remaining, threshold 24h: refresh
        let session = session_with_remaining(2 * 3600);
        let now = chrono::Utc::now().timestamp();
        assert!(needs_refresh(&session, now, 24));
    }

    #[test]
    fn test_needs_refresh_fresh_token() {
        // 59 days remaining: no refresh
        let session = session_with_remaining(59 * 24 * 3600);
        let now = chrono::Utc::now().timestamp();
        assert!(!needs_refresh(&session, now, 24));
    }

    #[test]
    fn test_needs_refresh_expired_token() {
        // Already expired: nothing to refresh, the load purge handles it
        let session = session_with_remaining(-60);
        let now = chrono::Utc::now().timestamp();
        assert!(!needs_refresh(&session, now, 24));
    }

    #[tokio::test]
    async fn test_spawn_refresh_skips_fresh_sessions() {
        let dir = TempDir::new().unwrap();
        let mut store = SessionStore::load(dir.path().join("sessions.json")).unwrap();
        store
            .set(Session::Threads(session_with_remaining(59 * 24 * 3600)))
            .unwrap();

        let auth = configured_auth();
        let spawned =
            auth.spawn_refresh_if_stale(Arc::new(RwLock::new(store)), EventBus::new(10));
        assert!(!spawned);
    }

    #[tokio::test]
    async fn test_spawn_refresh_skips_missing_session() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::load(dir.path().join("sessions.json")).unwrap();

        let auth = configured_auth();
        let spawned =
            auth.spawn_refresh_if_stale(Arc::new(RwLock::new(store)), EventBus::new(10));
        assert!(!spawned);
    }

    #[tokio::test]
    async fn test_logout_removes_session_and_notifies() {
        let dir = TempDir::new().unwrap();
        let mut store = SessionStore::load(dir.path().join("sessions.json")).unwrap();
        store
            .set(Session::Threads(session_with_remaining(3600)))
            .unwrap();

        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();

        configured_auth().logout(&mut store, &bus).unwrap();
        assert!(store.get(Platform::Threads).is_none());
        assert!(matches!(
            receiver.try_recv().unwrap(),
            Event::SessionsChanged
        ));
    }

    #[test]
    fn test_generate_state_is_random_hex() {
        let a = generate_state();
        let b = generate_state();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
