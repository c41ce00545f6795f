//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the harvester, including:
//! - Building HTTP clients with browser-equivalent headers
//! - GET requests for listing, detail, and menu pages
//! - Per-platform request pacing
//! - Retry logic for transient failures
//! - Error classification

use crate::config::CrawlerConfig;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, COOKIE};
use reqwest::{redirect::Policy, Client};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use url::Url;

/// Errors raised while fetching a page.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The server answered with a non-success status code
    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },

    /// The request did not complete in time
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// Connection-level failure (refused, reset, DNS, TLS)
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    /// The response carried a non-HTML Content-Type
    #[error("{url} returned '{content_type}', expected HTML")]
    NotHtml { url: String, content_type: String },

    /// A rendered URL template did not produce a parseable URL
    #[error("rendered URL '{url}' is invalid: {message}")]
    InvalidUrl { url: String, message: String },
}

impl FetchError {
    /// Whether another attempt at the same request could succeed.
    ///
    /// Rate limiting and server errors are transient; 404s, auth walls,
    /// and malformed URLs are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Timeout { .. } | Self::Network { .. } => true,
            Self::NotHtml { .. } | Self::InvalidUrl { .. } => false,
        }
    }
}

fn classify_error(url: &Url, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

/// Builds the HTTP client used for page fetching
///
/// The platforms serve the same markup to any browser-looking client, so
/// the client carries a browser Accept header and a Korean Accept-Language
/// alongside the configured User-Agent.
///
/// # Arguments
///
/// * `config` - The crawler configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &CrawlerConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(&config.user_agent)
        .default_headers(browser_headers())
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Builds the HTTP client used for login requests
///
/// Redirects are disabled: a successful form login is detected from the
/// Set-Cookie headers on the immediate response, which a followed redirect
/// would swallow.
pub fn build_login_client(config: &CrawlerConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(&config.user_agent)
        .default_headers(browser_headers())
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .redirect(Policy::none()) // Inspect the login response directly
        .gzip(true)
        .brotli(true)
        .build()
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7"),
    );
    headers
}

/// Spaces requests out so one platform never sees more than one request
/// per configured interval, no matter which task asks.
pub(crate) struct RequestPacer {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub(crate) fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Waits until this caller's reserved slot comes up.
    pub(crate) async fn pause(&self) {
        let wait = {
            let mut next_slot = self.next_slot.lock().unwrap();
            let now = Instant::now();
            let slot = match *next_slot {
                Some(at) => at.max(now),
                None => now,
            };
            // Reserve the following slot before sleeping so concurrent
            // callers queue up instead of waking together.
            *next_slot = Some(slot + self.min_interval);
            slot.saturating_duration_since(now)
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

/// Paced, retrying page fetcher for one platform.
///
/// Listing, detail, and menu fetches all go through `fetch_html`, which
/// applies the platform's rate limit and retries transient failures with
/// a linearly growing backoff.
pub struct Fetcher {
    client: Client,
    pacer: RequestPacer,
    max_retries: u32,
    retry_backoff: Duration,
    cookie: Mutex<Option<String>>,
}

impl Fetcher {
    /// Creates a fetcher for one platform run.
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration (timeouts, retries, headers)
    /// * `rate_limit` - Minimum delay between this platform's requests
    pub fn new(config: &CrawlerConfig, rate_limit: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
            pacer: RequestPacer::new(rate_limit),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            cookie: Mutex::new(None),
        })
    }

    /// Attaches a session cookie header to every subsequent request.
    pub fn set_cookie_header(&self, header: String) {
        *self.cookie.lock().unwrap() = Some(header);
    }

    fn cookie_header(&self) -> Option<String> {
        self.cookie.lock().unwrap().clone()
    }

    /// Fetches a page and returns its HTML body.
    ///
    /// Waits for the platform's rate-limit slot first, then retries
    /// transient failures up to the configured attempt count. Attempt `n`
    /// backs off for `n * retry-backoff-ms` before the next try.
    pub async fn fetch_html(&self, url: &Url) -> Result<String, FetchError> {
        self.pacer.pause().await;

        let mut attempt: u32 = 1;
        loop {
            match self.try_fetch(url).await {
                Ok(body) => return Ok(body),
                Err(e) if attempt < self.max_retries && e.is_retryable() => {
                    let backoff = self.retry_backoff * attempt;
                    tracing::warn!(
                        "Fetch attempt {}/{} for {} failed: {} (retrying in {:?})",
                        attempt,
                        self.max_retries,
                        url,
                        e,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_fetch(&self, url: &Url) -> Result<String, FetchError> {
        let mut request = self.client.get(url.clone());
        if let Some(cookie) = self.cookie_header() {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await.map_err(|e| classify_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // A missing Content-Type is accepted; an explicit non-HTML one is not.
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.is_empty()
            && !content_type.contains("html")
            && !content_type.contains("text/plain")
        {
            return Err(FetchError::NotHtml {
                url: url.to_string(),
                content_type,
            });
        }

        response.text().await.map_err(|e| classify_error(url, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client() {
        let config = CrawlerConfig::default();
        assert!(build_http_client(&config).is_ok());
        assert!(build_login_client(&config).is_ok());
    }

    #[test]
    fn test_retryable_classification() {
        let retryable = [
            FetchError::Status {
                url: "https://x".to_string(),
                status: 429,
            },
            FetchError::Status {
                url: "https://x".to_string(),
                status: 503,
            },
            FetchError::Timeout {
                url: "https://x".to_string(),
            },
            FetchError::Network {
                url: "https://x".to_string(),
                message: "connection reset".to_string(),
            },
        ];
        for e in &retryable {
            assert!(e.is_retryable(), "{e} should be retryable");
        }

        let terminal = [
            FetchError::Status {
                url: "https://x".to_string(),
                status: 404,
            },
            FetchError::Status {
                url: "https://x".to_string(),
                status: 403,
            },
            FetchError::NotHtml {
                url: "https://x".to_string(),
                content_type: "application/pdf".to_string(),
            },
        ];
        for e in &terminal {
            assert!(!e.is_retryable(), "{e} should not be retryable");
        }
    }

    #[test]
    fn test_fetch_error_display() {
        let e = FetchError::Status {
            url: "https://novel.naver.com/list".to_string(),
            status: 404,
        };
        assert_eq!(e.to_string(), "HTTP 404 fetching https://novel.naver.com/list");
    }

    #[tokio::test]
    async fn test_pacer_spaces_requests() {
        let pacer = RequestPacer::new(Duration::from_millis(50));

        let start = Instant::now();
        pacer.pause().await; // First call is immediate
        pacer.pause().await; // Second waits out the interval
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_pacer_zero_interval_is_free() {
        let pacer = RequestPacer::new(Duration::ZERO);
        let start = Instant::now();
        for _ in 0..10 {
            pacer.pause().await;
        }
        assert!(start.elapsed() < Duration::from_millis(20));
    }
}
