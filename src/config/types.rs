use serde::Deserialize;
use std::time::Duration;

use crate::record::Platform;

/// Main configuration structure for Yeonjae
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub session: Option<SessionConfig>,
    #[serde(rename = "platform", default)]
    pub platforms: Vec<PlatformConfig>,
}

impl Config {
    /// Looks up the configuration block for one platform.
    pub fn platform(&self, platform: Platform) -> Option<&PlatformConfig> {
        self.platforms.iter().find(|p| p.name == platform)
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// User-Agent header sent with every request
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Minimum time between network requests within one platform run (milliseconds)
    #[serde(rename = "rate-limit-ms")]
    pub rate_limit_ms: u64,

    /// Whole-request timeout (seconds)
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,

    /// Connection timeout (seconds)
    #[serde(rename = "connect-timeout-secs")]
    pub connect_timeout_secs: u64,

    /// Fetch attempts per page before giving up
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Base backoff between fetch retries (milliseconds); grows linearly per attempt
    #[serde(rename = "retry-backoff-ms")]
    pub retry_backoff_ms: u64,

    /// Records accumulated before a sink flush
    #[serde(rename = "batch-size")]
    pub batch_size: usize,

    /// Page cap per pagination traversal
    #[serde(rename = "max-pages")]
    pub max_pages: u32,

    /// Settle wait after a scroll/load-more step (milliseconds)
    #[serde(rename = "scroll-settle-ms")]
    pub scroll_settle_ms: u64,

    /// Consecutive no-new-item scroll steps before the traversal stops
    #[serde(rename = "max-stale-scrolls")]
    pub max_stale_scrolls: u32,

    /// Attempts per batch write before the run fails
    #[serde(rename = "sink-retries")]
    pub sink_retries: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            // The platforms serve browser traffic; a browser identity avoids
            // spurious bot walls the original system also sidestepped.
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            rate_limit_ms: 1500,
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            max_retries: 3,
            retry_backoff_ms: 2000,
            batch_size: 50,
            max_pages: 100,
            scroll_settle_ms: 2000,
            max_stale_scrolls: 3,
            sink_retries: 3,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Cross-run session cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Path to the JSON session-cache file
    #[serde(rename = "cache-path")]
    pub cache_path: String,

    /// Maximum session age before a fresh login (seconds)
    #[serde(rename = "ttl-secs", default = "default_session_ttl")]
    pub ttl_secs: u64,
}

fn default_session_ttl() -> u64 {
    86_400
}

/// Listing traversal strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Numbered pages via a `{page}` URL template
    Pagination,
    /// Load-more requests via a `{step}` URL template with seen-item rescans
    InfiniteScroll,
    /// Per-genre pagination across the configured (or discovered) genre table
    Category,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pagination => write!(f, "pagination"),
            Self::InfiniteScroll => write!(f, "infinite-scroll"),
            Self::Category => write!(f, "category"),
        }
    }
}

/// Which listing surface of a platform a run traverses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Collection {
    /// The complete catalog listing
    #[default]
    All,
    /// New releases
    New,
    /// Ranking chart
    Ranking,
    /// Completed series
    Completed,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::New => "new",
            Self::Ranking => "ranking",
            Self::Completed => "completed",
        }
    }

    /// Parses a collection mode from its CLI/config string.
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "all" => Some(Self::All),
            "new" => Some(Self::New),
            "ranking" => Some(Self::Ranking),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Listing URL templates per collection. Templates may carry `{page}`,
/// `{step}`, and `{genre}` placeholders.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SurfaceConfig {
    pub all: Option<String>,
    pub new: Option<String>,
    pub ranking: Option<String>,
    pub completed: Option<String>,
}

impl SurfaceConfig {
    /// Returns the URL template for a collection, if the platform has that
    /// surface.
    pub fn template_for(&self, collection: Collection) -> Option<&str> {
        match collection {
            Collection::All => self.all.as_deref(),
            Collection::New => self.new.as_deref(),
            Collection::Ranking => self.ranking.as_deref(),
            Collection::Completed => self.completed.as_deref(),
        }
    }

    /// Iterates the configured (collection, template) pairs.
    pub fn entries(&self) -> impl Iterator<Item = (Collection, &str)> {
        [
            (Collection::All, self.all.as_deref()),
            (Collection::New, self.new.as_deref()),
            (Collection::Ranking, self.ranking.as_deref()),
            (Collection::Completed, self.completed.as_deref()),
        ]
        .into_iter()
        .filter_map(|(c, t)| t.map(|t| (c, t)))
    }
}

/// One genre/category entry: display name plus the code substituted into
/// `{genre}` URL templates.
#[derive(Debug, Clone, Deserialize)]
pub struct GenreEntry {
    pub name: String,
    pub code: String,
    /// Used when a request carries no genre filter on a `{genre}` template
    #[serde(default)]
    pub default: bool,
}

/// Category discovery from a menu page, for platforms whose genre set is
/// read off the site instead of configured.
#[derive(Debug, Clone, Deserialize)]
pub struct MenuConfig {
    /// Page carrying the category menu
    pub url: String,
    /// CSS selector for the menu's link elements (name from text, URL from href)
    pub item: String,
}

/// Selectors applied to each listing item fragment.
#[derive(Debug, Clone, Deserialize)]
pub struct ListSelectors {
    /// Splits the listing page into item fragments (must be CSS)
    pub item: String,
    pub title: String,
    pub author: String,
    /// The item's detail link (typically `a@href`)
    pub url: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub keywords: Option<String>,
    /// Presence of a match marks the item adult-gated
    #[serde(rename = "adult-marker")]
    pub adult_marker: Option<String>,
}

/// Selectors applied to a detail document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetailSelectors {
    pub description: Option<String>,
    pub keywords: Option<String>,
    pub genre: Option<String>,
    /// Link to the information tab holding the deep fields; followed once
    /// before extraction when it matches
    #[serde(rename = "tab-link")]
    pub tab_link: Option<String>,
}

/// Form-login configuration for adult-gated content.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Login form endpoint
    #[serde(rename = "login-url")]
    pub login_url: String,

    /// Form field name for the account identifier
    #[serde(rename = "username-field", default = "default_username_field")]
    pub username_field: String,

    /// Form field name for the password
    #[serde(rename = "password-field", default = "default_password_field")]
    pub password_field: String,

    /// Environment variable prefix; credentials come from
    /// `{prefix}_USERNAME` and `{prefix}_PASSWORD`
    #[serde(rename = "env-prefix")]
    pub env_prefix: String,

    /// When set, login succeeds only if this cookie is among the Set-Cookie
    /// response headers
    #[serde(rename = "session-cookie")]
    pub session_cookie: Option<String>,
}

fn default_username_field() -> String {
    "username".to_string()
}

fn default_password_field() -> String {
    "password".to_string()
}

impl AuthConfig {
    /// Resolves credentials from the environment.
    ///
    /// Returns None when either variable is unset or empty; the caller
    /// degrades to non-adult extraction in that case.
    pub fn credentials(&self) -> Option<Credentials> {
        let username = std::env::var(format!("{}_USERNAME", self.env_prefix)).ok()?;
        let password = std::env::var(format!("{}_PASSWORD", self.env_prefix)).ok()?;
        if username.is_empty() || password.is_empty() {
            return None;
        }
        Some(Credentials { username, password })
    }
}

/// A resolved username/password pair.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Per-platform configuration block.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    pub name: Platform,

    /// Platform origin, e.g. `https://page.kakao.com`
    #[serde(rename = "base-url")]
    pub base_url: String,

    pub strategy: Strategy,

    /// Overrides the global rate limit for this platform (milliseconds)
    #[serde(rename = "rate-limit-ms")]
    pub rate_limit_ms: Option<u64>,

    /// Overrides the global page cap for this platform
    #[serde(rename = "max-pages")]
    pub max_pages: Option<u32>,

    #[serde(default)]
    pub surfaces: SurfaceConfig,

    /// Load-more URL template for the infinite-scroll strategy
    #[serde(rename = "load-more-url")]
    pub load_more_url: Option<String>,

    #[serde(default)]
    pub genres: Vec<GenreEntry>,

    pub menu: Option<MenuConfig>,

    pub list: ListSelectors,

    pub detail: Option<DetailSelectors>,

    pub auth: Option<AuthConfig>,
}

impl PlatformConfig {
    /// Inter-request delay for this platform.
    pub fn rate_limit(&self, global: &CrawlerConfig) -> Duration {
        Duration::from_millis(self.rate_limit_ms.unwrap_or(global.rate_limit_ms))
    }

    /// Page cap for this platform's pagination traversals.
    pub fn page_cap(&self, global: &CrawlerConfig) -> u32 {
        self.max_pages.unwrap_or(global.max_pages)
    }

    /// Finds a configured genre by its display name.
    pub fn genre_by_name(&self, name: &str) -> Option<&GenreEntry> {
        self.genres.iter().find(|g| g.name == name)
    }

    /// The genre used when a `{genre}` template runs without a genre filter.
    pub fn default_genre(&self) -> Option<&GenreEntry> {
        self.genres
            .iter()
            .find(|g| g.default)
            .or_else(|| self.genres.first())
    }
}

/// Extracts the `{placeholder}` names appearing in a URL template.
pub(crate) fn template_placeholders(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start + 1..].find('}') else {
            break;
        };
        names.push(&rest[start + 1..start + 1 + len]);
        rest = &rest[start + 1 + len + 1..];
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crawler_defaults() {
        let config = CrawlerConfig::default();
        assert_eq!(config.rate_limit_ms, 1500);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_stale_scrolls, 3);
        assert!(config.user_agent.starts_with("Mozilla/5.0"));
    }

    #[test]
    fn test_surface_template_lookup() {
        let surfaces = SurfaceConfig {
            all: Some("https://example.com/list?page={page}".to_string()),
            new: None,
            ranking: None,
            completed: None,
        };
        assert!(surfaces.template_for(Collection::All).is_some());
        assert!(surfaces.template_for(Collection::Ranking).is_none());
        assert_eq!(surfaces.entries().count(), 1);
    }

    #[test]
    fn test_template_placeholders() {
        assert_eq!(
            template_placeholders("https://x.com/{genre}?page={page}"),
            vec!["genre", "page"]
        );
        assert!(template_placeholders("https://x.com/plain").is_empty());
        // Unclosed brace: scanning stops without panicking.
        assert!(template_placeholders("https://x.com/{oops").is_empty());
    }

    #[test]
    fn test_default_genre_prefers_marked_entry() {
        let platform = PlatformConfig {
            name: Platform::Kakao,
            base_url: "https://page.kakao.com".to_string(),
            strategy: Strategy::InfiniteScroll,
            rate_limit_ms: None,
            max_pages: None,
            surfaces: SurfaceConfig::default(),
            load_more_url: None,
            genres: vec![
                GenreEntry {
                    name: "로맨스".to_string(),
                    code: "10022".to_string(),
                    default: false,
                },
                GenreEntry {
                    name: "판타지".to_string(),
                    code: "10011".to_string(),
                    default: true,
                },
            ],
            menu: None,
            list: ListSelectors {
                item: ".card".to_string(),
                title: ".title".to_string(),
                author: ".author".to_string(),
                url: "a@href".to_string(),
                description: None,
                genre: None,
                keywords: None,
                adult_marker: None,
            },
            detail: None,
            auth: None,
        };
        assert_eq!(platform.default_genre().map(|g| g.code.as_str()), Some("10011"));
        assert_eq!(
            platform.genre_by_name("로맨스").map(|g| g.code.as_str()),
            Some("10022")
        );
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials {
            username: "reader".to_string(),
            password: "secret".to_string(),
        };
        let debug = format!("{creds:?}");
        assert!(debug.contains("reader"));
        assert!(!debug.contains("secret"));
    }
}
