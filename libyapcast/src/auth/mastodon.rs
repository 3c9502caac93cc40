//! Mastodon OAuth lifecycle
//!
//! Login walks the full dance against the target instance: register an app
//! (client id/secret), send the user to the authorization page, exchange
//! the code for a token, fetch the account for the profile snapshot, then
//! store the session. Mastodon tokens do not expire in practice, so the
//! stored session carries a synthetic one-year expiry. Logout revokes the
//! token server-side on a best-effort basis before deleting locally.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::auth::urlencode;
use crate::config::MastodonAppConfig;
use crate::error::{AuthError, Result};
use crate::events::{Event, EventBus};
use crate::platforms::http_client;
use crate::session::{MastodonSession, Session, SessionStore, MASTODON_SESSION_TTL_SECS};
use crate::types::Platform;

/// App credentials registered with one instance
#[derive(Debug, Clone, Deserialize)]
pub struct RegisteredApp {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    id: String,
    username: String,
    display_name: String,
    avatar: Option<String>,
}

pub struct MastodonAuth {
    http: reqwest::Client,
    config: MastodonAppConfig,
}

impl MastodonAuth {
    pub fn new(config: MastodonAppConfig) -> Self {
        Self {
            http: http_client(),
            config,
        }
    }

    /// Register this client with the instance, obtaining app credentials.
    pub async fn register_app(&self, instance: &str) -> std::result::Result<RegisteredApp, AuthError> {
        let instance_url = normalize_instance_url(instance);

        let response = self
            .http
            .post(format!("{}/api/v1/apps", instance_url))
            .json(&serde_json::json!({
                "client_name": self.config.client_name,
                "redirect_uris": self.config.redirect_uri,
                "scopes": self.config.scopes,
                "website": self.config.website,
            }))
            .send()
            .await
            .map_err(|e| AuthError::Registration(format!("App registration failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AuthError::Registration(format!(
                "Failed to register app: HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::Registration(format!("Invalid registration response: {}", e)))
    }

    /// Authorization page URL for the user to visit.
    pub fn authorize_url(&self, instance: &str, client_id: &str) -> String {
        format!(
            "{}/oauth/authorize?client_id={}&redirect_uri={}&response_type=code&scope={}",
            normalize_instance_url(instance),
            urlencode(client_id),
            urlencode(&self.config.redirect_uri),
            urlencode(&self.config.scopes),
        )
    }

    async fn exchange_code(
        &self,
        instance_url: &str,
        app: &RegisteredApp,
        code: &str,
    ) -> std::result::Result<TokenGrant, AuthError> {
        let response = self
            .http
            .post(format!("{}/oauth/token", instance_url))
            .json(&serde_json::json!({
                "client_id": app.client_id,
                "client_secret": app.client_secret,
                "redirect_uri": self.config.redirect_uri,
                "grant_type": "authorization_code",
                "code": code,
            }))
            .send()
            .await
            .map_err(|e| AuthError::Exchange(format!("Token exchange failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AuthError::Exchange(format!(
                "Failed to exchange code for token: HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::Exchange(format!("Invalid token response: {}", e)))
    }

    async fn fetch_account(
        &self,
        instance_url: &str,
        access_token: &str,
    ) -> std::result::Result<AccountInfo, AuthError> {
        let response = self
            .http
            .get(format!(
                "{}/api/v1/accounts/verify_credentials",
                instance_url
            ))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::Profile(format!("Account fetch failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AuthError::Profile(format!(
                "Failed to get account info: HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::Profile(format!("Invalid account response: {}", e)))
    }

    /// Finish the login: exchange the code, fetch the account, store the
    /// session. The store is only touched once every step has succeeded.
    pub async fn complete_login(
        &self,
        store: &mut SessionStore,
        bus: &EventBus,
        instance: &str,
        app: &RegisteredApp,
        code: &str,
    ) -> Result<MastodonSession> {
        let instance_url = normalize_instance_url(instance);
        let grant = self.exchange_code(&instance_url, app, code).await?;
        let account = self.fetch_account(&instance_url, &grant.access_token).await?;

        let now = chrono::Utc::now().timestamp();
        let session = MastodonSession {
            instance: instance_url,
            access_token: grant.access_token,
            user_id: account.id,
            username: account.username,
            display_name: account.display_name,
            avatar: account.avatar,
            created_at: now,
            expires_at: Some(now + MASTODON_SESSION_TTL_SECS),
        };

        store.set(Session::Mastodon(session.clone()))?;
        bus.emit(Event::SessionsChanged);
        debug!("Stored Mastodon session for @{}", session.username);

        Ok(session)
    }

    /// Revoke the token server-side (best-effort) and delete the local
    /// session.
    pub async fn logout(&self, store: &mut SessionStore, bus: &EventBus) -> Result<()> {
        if let Some(Session::Mastodon(session)) = store.get(Platform::Mastodon).cloned() {
            let result = self
                .http
                .post(format!("{}/oauth/revoke", session.instance))
                .json(&serde_json::json!({ "token": session.access_token }))
                .send()
                .await;
            if let Err(e) = result {
                warn!("Failed to revoke Mastodon token: {}", e);
            }
        }

        store.remove(Platform::Mastodon)?;
        bus.emit(Event::SessionsChanged);
        Ok(())
    }
}

/// Prefix `https://` when no scheme is present and trim the trailing slash.
pub fn normalize_instance_url(instance: &str) -> String {
    let mut url = instance.trim().to_string();
    if !url.starts_with("http://") && !url.starts_with("https://") {
        url = format!("https://{}", url);
    }
    url.trim_end_matches('/').to_string()
}
