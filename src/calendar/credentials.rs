//! OAuth credentials for the calendar API, kept in a JSON token file.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::remote::RemoteError;

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Token file contents. Field names follow the authorized-user JSON that
/// Google's client libraries write, so an existing file can be reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    #[serde(rename = "token")]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl TokenInfo {
    /// Tokens without an expiry are assumed valid.
    pub fn expires_within(&self, lead: Duration, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|at| at - now <= lead)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_within(Duration::zero(), now)
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    expires_in: Option<i64>,
}

/// File-backed token cache. Refreshes are serialized through the mutex so a
/// burst of auth failures produces one token request.
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    client_id: String,
    client_secret: String,
    cached: Mutex<Option<TokenInfo>>,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>, client_id: String, client_secret: String) -> Self {
        Self {
            path: path.into(),
            client_id,
            client_secret,
            cached: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<TokenInfo, RemoteError> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            RemoteError::unconfigured(format!(
                "cannot read token file {}: {e}",
                self.path.display()
            ))
        })?;
        let tokens: TokenInfo = serde_json::from_str(&content).map_err(|e| {
            RemoteError::unconfigured(format!("cannot parse token file: {e}"))
        })?;
        debug!(path = %self.path.display(), "loaded calendar credentials");
        Ok(tokens)
    }

    /// Write to a temp file and rename over the original, owner-only.
    fn save(&self, tokens: &TokenInfo) -> Result<(), RemoteError> {
        let content = serde_json::to_string_pretty(tokens)
            .map_err(|e| RemoteError::invalid_response(format!("cannot serialize tokens: {e}")))?;
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, content)
            .and_then(|()| fs::rename(&temp_path, &self.path))
            .map_err(|e| RemoteError::unconfigured(format!("cannot write token file: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600));
        }
        Ok(())
    }

    /// A usable access token, refreshing first if the cached one has expired.
    pub async fn access_token(&self, http: &reqwest::Client) -> Result<String, RemoteError> {
        let mut cached = self.cached.lock().await;
        let tokens = match cached.take() {
            Some(tokens) => tokens,
            None => self.load()?,
        };
        if tokens.is_expired(Utc::now()) {
            return self.refresh_locked(http, &mut cached, tokens).await;
        }
        let access = tokens.access_token.clone();
        *cached = Some(tokens);
        Ok(access)
    }

    /// Unconditional refresh, after the API rejected the current token.
    pub async fn refresh(&self, http: &reqwest::Client) -> Result<String, RemoteError> {
        let mut cached = self.cached.lock().await;
        let tokens = match cached.take() {
            Some(tokens) => tokens,
            None => self.load()?,
        };
        self.refresh_locked(http, &mut cached, tokens).await
    }

    /// Refresh when the token expires within `lead`. Re-reads the file so
    /// tokens written by an operator are picked up.
    pub async fn refresh_if_expiring(
        &self,
        http: &reqwest::Client,
        lead: Duration,
    ) -> Result<bool, RemoteError> {
        let mut cached = self.cached.lock().await;
        let tokens = self.load()?;
        if !tokens.expires_within(lead, Utc::now()) {
            *cached = Some(tokens);
            return Ok(false);
        }
        self.refresh_locked(http, &mut cached, tokens).await?;
        Ok(true)
    }

    async fn refresh_locked(
        &self,
        http: &reqwest::Client,
        cached: &mut Option<TokenInfo>,
        mut tokens: TokenInfo,
    ) -> Result<String, RemoteError> {
        let Some(refresh_token) = tokens.refresh_token.clone() else {
            *cached = Some(tokens);
            return Err(RemoteError::authentication(
                "no refresh token; re-authorize the calendar account",
            ));
        };
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let response = http.post(GOOGLE_TOKEN_URL).form(&params).send().await;
        let response = match response {
            Ok(r) => r,
            Err(e) => {
                *cached = Some(tokens);
                return Err(e.into());
            }
        };
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            *cached = Some(tokens);
            return Err(RemoteError::authentication(format!(
                "token refresh failed ({status}): {body}"
            )));
        }
        let refreshed: RefreshResponse = match serde_json::from_str(&body) {
            Ok(r) => r,
            Err(e) => {
                *cached = Some(tokens);
                return Err(RemoteError::invalid_response(format!(
                    "invalid token response: {e}"
                )));
            }
        };

        tokens.access_token = refreshed.access_token;
        tokens.expiry = refreshed
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));
        let saved = self.save(&tokens);
        let access = tokens.access_token.clone();
        info!(expiry = ?tokens.expiry, "calendar credentials refreshed");
        *cached = Some(tokens);
        saved.map(|()| access)
    }
}
