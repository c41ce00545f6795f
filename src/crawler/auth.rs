//! Form-login session handling for adult-gated listings
//!
//! The platforms gate adult titles behind an account. When a run asks for
//! adult content, this module performs the platform's form login once,
//! captures the session cookies from the response, and hands the combined
//! Cookie header to the fetcher. Nothing here runs for regular requests.
//!
//! Sessions can optionally be cached across runs in a JSON file with a
//! TTL, so repeated invocations do not hammer the login endpoint.

use crate::config::{AuthConfig, CrawlerConfig, SessionConfig};
use crate::crawler::fetcher::build_login_client;
use crate::record::Platform;
use chrono::{DateTime, Utc};
use reqwest::header::SET_COOKIE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Errors raised while establishing a session.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Credentials are not present in the environment
    #[error("credentials for {platform} not found ({prefix}_USERNAME / {prefix}_PASSWORD)")]
    MissingCredentials { platform: String, prefix: String },

    /// The login request itself failed
    #[error("login request to {url} failed: {message}")]
    Request { url: String, message: String },

    /// The login endpoint answered with an error status
    #[error("login to {url} rejected (HTTP {status})")]
    Rejected { url: String, status: u16 },

    /// The login response carried no usable session cookie
    #[error("login to {url} returned no session cookie")]
    NoSession { url: String },

    /// The session cache file could not be read or written
    #[error("session cache error: {0}")]
    Cache(String),
}

/// An established login session: the Cookie header to send, and when the
/// login happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub cookie_header: String,
    pub established: DateTime<Utc>,
}

impl Session {
    /// Whether the session is younger than the given TTL.
    pub fn is_fresh(&self, ttl_secs: u64) -> bool {
        let age = Utc::now() - self.established;
        age.num_seconds() < ttl_secs as i64
    }
}

/// Extracts `name=value` pairs from Set-Cookie header values, dropping
/// attributes (Path, Expires, HttpOnly, ...) and deletion cookies with
/// empty values.
pub(crate) fn cookie_pairs(header_values: &[String]) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for value in header_values {
        let Some(first) = value.split(';').next() else {
            continue;
        };
        let Some((name, value)) = first.split_once('=') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.is_empty() || value.is_empty() {
            continue;
        }
        pairs.push((name.to_string(), value.to_string()));
    }
    pairs
}

/// JSON file caching one session per platform across runs.
pub struct SessionCache {
    path: PathBuf,
    ttl_secs: u64,
}

impl SessionCache {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            path: PathBuf::from(&config.cache_path),
            ttl_secs: config.ttl_secs,
        }
    }

    /// Loads a cached session for the platform, if present and fresh.
    pub fn load(&self, platform: Platform) -> Option<Session> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        let sessions: HashMap<String, Session> = match serde_json::from_str(&content) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Ignoring unreadable session cache {:?}: {}", self.path, e);
                return None;
            }
        };
        let session = sessions.get(platform.as_str())?.clone();
        if session.is_fresh(self.ttl_secs) {
            Some(session)
        } else {
            tracing::debug!("Cached session for {} is stale", platform);
            None
        }
    }

    /// Stores a session for the platform, merging with other platforms'
    /// cached entries.
    pub fn store(&self, platform: Platform, session: &Session) -> Result<(), AuthError> {
        let mut sessions: HashMap<String, Session> = std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();
        sessions.insert(platform.as_str().to_string(), session.clone());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| AuthError::Cache(e.to_string()))?;
            }
        }
        let json =
            serde_json::to_string_pretty(&sessions).map_err(|e| AuthError::Cache(e.to_string()))?;
        std::fs::write(&self.path, json).map_err(|e| AuthError::Cache(e.to_string()))?;
        Ok(())
    }

    /// Drops the platform's cached entry, if any. Called after a failed
    /// login so a dead session cannot linger in the file.
    pub fn invalidate(&self, platform: Platform) {
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return;
        };
        let Ok(mut sessions) = serde_json::from_str::<HashMap<String, Session>>(&content) else {
            return;
        };
        if sessions.remove(platform.as_str()).is_none() {
            return;
        }
        if let Ok(json) = serde_json::to_string_pretty(&sessions) {
            if let Err(e) = std::fs::write(&self.path, json) {
                tracing::warn!("Failed to rewrite session cache {:?}: {}", self.path, e);
            }
        }
    }
}

/// Performs a platform's form login and produces a [`Session`].
pub struct AuthAdapter {
    client: Client,
    auth: AuthConfig,
    platform: Platform,
    cache: Option<SessionCache>,
}

impl AuthAdapter {
    /// Creates an adapter for one platform's login flow.
    ///
    /// # Arguments
    ///
    /// * `auth` - The platform's auth configuration
    /// * `platform` - Which platform this adapter logs into
    /// * `crawler` - Crawler configuration (timeouts, user agent)
    /// * `session` - Optional cross-run session cache settings
    pub fn new(
        auth: AuthConfig,
        platform: Platform,
        crawler: &CrawlerConfig,
        session: Option<&SessionConfig>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_login_client(crawler)?,
            auth,
            platform,
            cache: session.map(SessionCache::new),
        })
    }

    /// Establishes a session, from the cache when possible, otherwise by
    /// posting the login form. A failed login also drops the platform's
    /// cached entry.
    pub async fn establish(&self) -> Result<Session, AuthError> {
        if let Some(cache) = &self.cache {
            if let Some(session) = cache.load(self.platform) {
                tracing::info!("Reusing cached session for {}", self.platform);
                return Ok(session);
            }
        }

        let session = match self.login().await {
            Ok(session) => session,
            Err(e) => {
                if let Some(cache) = &self.cache {
                    cache.invalidate(self.platform);
                }
                return Err(e);
            }
        };

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.store(self.platform, &session) {
                tracing::warn!("Failed to cache session for {}: {}", self.platform, e);
            }
        }
        Ok(session)
    }

    /// Posts the login form and builds a [`Session`] from the response.
    ///
    /// Login success is judged from the immediate response: any non-error
    /// status that sets at least one real cookie (and the configured
    /// session cookie, when named) counts. Redirects are not followed, so
    /// the usual 302-after-login lands here with its cookies intact.
    async fn login(&self) -> Result<Session, AuthError> {
        let Some(credentials) = self.auth.credentials() else {
            return Err(AuthError::MissingCredentials {
                platform: self.platform.to_string(),
                prefix: self.auth.env_prefix.clone(),
            });
        };

        tracing::info!(
            "Logging in to {} as '{}'",
            self.platform,
            credentials.username
        );

        let params = [
            (
                self.auth.username_field.as_str(),
                credentials.username.as_str(),
            ),
            (
                self.auth.password_field.as_str(),
                credentials.password.as_str(),
            ),
        ];
        let response = self
            .client
            .post(&self.auth.login_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Request {
                url: self.auth.login_url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(AuthError::Rejected {
                url: self.auth.login_url.clone(),
                status: status.as_u16(),
            });
        }

        let header_values: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(String::from)
            .collect();
        let pairs = cookie_pairs(&header_values);
        if pairs.is_empty() {
            return Err(AuthError::NoSession {
                url: self.auth.login_url.clone(),
            });
        }
        if let Some(required) = &self.auth.session_cookie {
            if !pairs.iter().any(|(name, _)| name == required) {
                tracing::debug!(
                    "Login set cookies {:?} but not '{}'",
                    pairs.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
                    required
                );
                return Err(AuthError::NoSession {
                    url: self.auth.login_url.clone(),
                });
            }
        }

        let cookie_header = pairs
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");

        tracing::info!("Session established for {}", self.platform);
        Ok(Session {
            cookie_header,
            established: Utc::now(),
        })
    }
}
