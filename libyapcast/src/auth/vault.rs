//! Bluesky OAuth session vault
//!
//! The session store only holds a thin `{did, handle, active}` descriptor
//! for Bluesky; the cryptographic material (access/refresh tokens and where
//! they came from) is owned by a vault keyed by DID. The [`SessionVault`]
//! capability is what the rest of the crate programs against: begin an
//! authorization, complete a callback, restore an agent by DID, drop an
//! entry. Restoration refreshes a stale token transparently; a session that
//! cannot be restored is reported as absent, never as an error.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::auth::urlencode;
use crate::config::BlueskyAppConfig;
use crate::error::{AuthError, PlatformError};
use crate::platforms::facets::MentionResolver;
use crate::platforms::{api_error_message, http_client};
use crate::store::JsonStore;

/// Seconds of remaining validity under which `restore` refreshes eagerly
const REFRESH_MARGIN_SECS: i64 = 60;
const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

/// Query parameters delivered to the OAuth redirect URI
#[derive(Debug, Clone)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

/// The identity derived from a completed authorization
#[derive(Debug, Clone)]
pub struct VaultIdentity {
    pub did: String,
    pub handle: String,
}

/// Keyed cryptographic-session cache capability.
///
/// The Bluesky lifecycle manager owns the vault's lifetime and is the only
/// writer; the poster only calls `restore`.
#[async_trait]
pub trait SessionVault: Send + Sync {
    /// Begin an authorization for `handle`; returns the URL to open.
    async fn authorize_url(&self, handle: &str) -> Result<String, AuthError>;

    /// Complete a pending authorization from redirect parameters.
    async fn complete(&self, params: &CallbackParams) -> Result<VaultIdentity, AuthError>;

    /// Restore an authenticated agent for `did`, refreshing a stale token
    /// first. Absent or unrefreshable sessions yield `None`.
    async fn restore(&self, did: &str) -> Option<AtpAgent>;

    /// Drop the vault entry for `did`.
    async fn remove(&self, did: &str) -> Result<(), AuthError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VaultRecord {
    did: String,
    handle: String,
    /// Service the tokens were issued against
    service: String,
    token_endpoint: String,
    access_token: String,
    refresh_token: String,
    expires_at: i64,
}

struct PendingAuthorization {
    handle: String,
    did: String,
    service: String,
    verifier: String,
}

/// JSON-file-backed vault performing the PKCE authorization-code dance
/// against the resolved service and refreshing tokens inside `restore`.
pub struct JsonSessionVault {
    store: JsonStore,
    http: reqwest::Client,
    config: BlueskyAppConfig,
    records: Mutex<HashMap<String, VaultRecord>>,
    /// In-flight authorizations keyed by CSRF state token
    pending: Mutex<HashMap<String, PendingAuthorization>>,
}

impl JsonSessionVault {
    pub fn load(path: impl Into<PathBuf>, config: BlueskyAppConfig) -> Self {
        let store = JsonStore::new(path);
        let records = store.read_or_default();
        Self {
            store,
            http: http_client(),
            config,
            records: Mutex::new(records),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a handle to its DID through the configured resolver service.
    pub async fn resolve_handle(&self, handle: &str) -> Result<String, AuthError> {
        let response = self
            .http
            .get(format!(
                "{}/xrpc/com.atproto.identity.resolveHandle",
                self.config.handle_resolver
            ))
            .query(&[("handle", handle)])
            .send()
            .await
            .map_err(|e| AuthError::Vault(format!("Handle resolution failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AuthError::Vault(format!(
                "Could not resolve handle '{}': HTTP {}",
                handle,
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AuthError::Vault(format!("Invalid resolution response: {}", e)))?;

        body["did"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AuthError::Vault("No DID in resolution response".to_string()))
    }

    fn persist(&self, records: &HashMap<String, VaultRecord>) {
        if let Err(e) = self.store.write(records) {
            warn!("Failed to persist session vault: {}", e);
        }
    }

    async fn refresh(&self, record: &VaultRecord) -> Result<VaultRecord, AuthError> {
        let response = self
            .http
            .post(&record.token_endpoint)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", record.refresh_token.as_str()),
                ("client_id", self.config.client_id.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Exchange(format!("Token refresh failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AuthError::Exchange(format!(
                "Token refresh rejected: HTTP {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AuthError::Exchange(format!("Invalid refresh response: {}", e)))?;

        let access_token = body["access_token"]
            .as_str()
            .ok_or_else(|| AuthError::Exchange("No access token in refresh".to_string()))?
            .to_string();
        // Refresh tokens rotate; keep the old one if the server omits it
        let refresh_token = body["refresh_token"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| record.refresh_token.clone());
        let expires_in = body["expires_in"].as_i64().unwrap_or(DEFAULT_TOKEN_TTL_SECS);

        Ok(VaultRecord {
            access_token,
            refresh_token,
            expires_at: chrono::Utc::now().timestamp() + expires_in,
            ..record.clone()
        })
    }
}

#[async_trait]
impl SessionVault for JsonSessionVault {
    async fn authorize_url(&self, handle: &str) -> Result<String, AuthError> {
        let did = self.resolve_handle(handle).await?;
        // The resolver service doubles as the authorization server; walking
        // the DID document to the user's own PDS is out of scope here.
        let service = self.config.handle_resolver.clone();

        let state = random_token();
        let verifier = random_token();
        let challenge = pkce_challenge(&verifier);

        let url = format!(
            "{}/oauth/authorize?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&code_challenge={}&code_challenge_method=S256&login_hint={}",
            service,
            urlencode(&self.config.client_id),
            urlencode(&self.config.redirect_uri),
            urlencode("atproto transition:generic"),
            state,
            challenge,
            urlencode(handle),
        );

        self.pending.lock().unwrap().insert(
            state,
            PendingAuthorization {
                handle: handle.to_string(),
                did,
                service,
                verifier,
            },
        );

        Ok(url)
    }

    async fn complete(&self, params: &CallbackParams) -> Result<VaultIdentity, AuthError> {
        let pending = self
            .pending
            .lock()
            .unwrap()
            .remove(&params.state)
            .ok_or(AuthError::StateMismatch)?;

        let token_endpoint = format!("{}/oauth/token", pending.service);
        let response = self
            .http
            .post(&token_endpoint)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", params.code.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("code_verifier", pending.verifier.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Exchange(format!("Token exchange failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AuthError::Exchange(format!(
                "Token exchange rejected: HTTP {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AuthError::Exchange(format!("Invalid token response: {}", e)))?;

        let access_token = body["access_token"]
            .as_str()
            .ok_or_else(|| AuthError::Exchange("No access token received".to_string()))?
            .to_string();
        let refresh_token = body["refresh_token"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let expires_in = body["expires_in"].as_i64().unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        // The token response's subject is authoritative for the DID
        let did = body["sub"]
            .as_str()
            .map(str::to_string)
            .unwrap_or(pending.did);

        let record = VaultRecord {
            did: did.clone(),
            handle: pending.handle.clone(),
            service: pending.service,
            token_endpoint,
            access_token,
            refresh_token,
            expires_at: chrono::Utc::now().timestamp() + expires_in,
        };

        {
            let mut records = self.records.lock().unwrap();
            records.insert(did.clone(), record);
            self.persist(&records);
        }

        debug!("Derived Bluesky session for {}", did);
        Ok(VaultIdentity {
            did,
            handle: pending.handle,
        })
    }

    async fn restore(&self, did: &str) -> Option<AtpAgent> {
        let record = self.records.lock().unwrap().get(did).cloned()?;

        let now = chrono::Utc::now().timestamp();
        let record = if record.expires_at - now < REFRESH_MARGIN_SECS {
            match self.refresh(&record).await {
                Ok(refreshed) => {
                    let mut records = self.records.lock().unwrap();
                    records.insert(did.to_string(), refreshed.clone());
                    self.persist(&records);
                    refreshed
                }
                Err(e) => {
                    warn!("Could not refresh Bluesky session for {}: {}", did, e);
                    return None;
                }
            }
        } else {
            record
        };

        Some(AtpAgent {
            http: self.http.clone(),
            service: record.service,
            access_token: record.access_token,
            did: record.did,
        })
    }

    async fn remove(&self, did: &str) -> Result<(), AuthError> {
        let mut records = self.records.lock().unwrap();
        if records.remove(did).is_some() {
            self.persist(&records);
        }
        Ok(())
    }
}

/// Authenticated XRPC handle bound to one restored session.
#[derive(Clone)]
pub struct AtpAgent {
    http: reqwest::Client,
    service: String,
    access_token: String,
    did: String,
}

impl AtpAgent {
    pub fn did(&self) -> &str {
        &self.did
    }

    fn xrpc(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.service, method)
    }

    async fn check(
        response: reqwest::Response,
        context: &str,
    ) -> Result<serde_json::Value, PlatformError> {
        let status = response.status();
        if !status.is_success() {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            return Err(PlatformError::Posting(format!(
                "{}: {}",
                context,
                api_error_message(status, &body)
            )));
        }
        response
            .json()
            .await
            .map_err(|e| PlatformError::Posting(format!("{}: invalid response: {}", context, e)))
    }

    /// Create a repository record; returns `(uri, cid)`.
    pub async fn create_record(
        &self,
        collection: &str,
        record: serde_json::Value,
    ) -> Result<(String, String), PlatformError> {
        let response = self
            .http
            .post(self.xrpc("com.atproto.repo.createRecord"))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({
                "repo": self.did,
                "collection": collection,
                "record": record,
            }))
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("createRecord failed: {}", e)))?;

        let body = Self::check(response, "createRecord").await?;
        let uri = body["uri"]
            .as_str()
            .ok_or_else(|| PlatformError::Posting("No uri in createRecord response".to_string()))?
            .to_string();
        let cid = body["cid"].as_str().unwrap_or_default().to_string();
        Ok((uri, cid))
    }

    /// Upload raw bytes as a blob; returns the blob reference object to
    /// embed in a record.
    pub async fn upload_blob(
        &self,
        bytes: Vec<u8>,
        mime: &str,
    ) -> Result<serde_json::Value, PlatformError> {
        let response = self
            .http
            .post(self.xrpc("com.atproto.repo.uploadBlob"))
            .bearer_auth(&self.access_token)
            .header(reqwest::header::CONTENT_TYPE, mime)
            .body(bytes)
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("uploadBlob failed: {}", e)))?;

        let body = Self::check(response, "uploadBlob").await?;
        if body["blob"].is_null() {
            return Err(PlatformError::Posting(
                "No blob in uploadBlob response".to_string(),
            ));
        }
        Ok(body["blob"].clone())
    }

    /// Probe the session; also yields the server's view of handle and DID.
    pub async fn get_session(&self) -> Result<serde_json::Value, PlatformError> {
        let response = self
            .http
            .get(self.xrpc("com.atproto.server.getSession"))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("getSession failed: {}", e)))?;

        Self::check(response, "getSession").await
    }
}

#[async_trait]
impl MentionResolver for AtpAgent {
    async fn resolve_handle(&self, handle: &str) -> Option<String> {
        let response = self
            .http
            .get(self.xrpc("com.atproto.identity.resolveHandle"))
            .query(&[("handle", handle)])
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body: serde_json::Value = response.json().await.ok()?;
        body["did"].as_str().map(str::to_string)
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// S256 code challenge over the PKCE verifier
fn pkce_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}
