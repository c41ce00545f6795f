//! Yeonjae: a web-novel metadata harvester
//!
//! This crate implements a metadata extraction pipeline for Korean web-novel
//! platforms (Naver Series, KakaoPage, Ridibooks). It drives each platform's
//! listing surface (pagination, infinite scroll, or category menus), extracts
//! structured fields via configurable CSS/XPath selectors, optionally visits
//! per-item detail pages, validates and deduplicates the results, and persists
//! them idempotently to SQLite.

pub mod config;
pub mod crawler;
pub mod record;
pub mod selector;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Yeonjae operations
#[derive(Debug, Error)]
pub enum YeonjaeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Authentication error: {0}")]
    Auth(#[from] crawler::AuthError),

    #[error("Validation error: {0}")]
    Validation(#[from] record::ValidationError),

    #[error("Sink error: {0}")]
    Sink(#[from] storage::SinkError),

    #[error("Listing surface unreachable for {platform}: {message}")]
    ListingUnreachable { platform: String, message: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Platform task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector for '{field}': {message}")]
    InvalidSelector { field: String, message: String },

    #[error("Unknown placeholder '{{{placeholder}}}' in template: {template}")]
    UnknownPlaceholder {
        placeholder: String,
        template: String,
    },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Empty link")]
    EmptyLink,
}

/// Result type alias for Yeonjae operations
pub type Result<T> = std::result::Result<T, YeonjaeError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::{Config, PlatformConfig};
pub use crawler::{run_once, Collection, CrawlRequest, RunSummary};
pub use record::{NovelRecord, Platform};
pub use selector::{FieldSelector, SelectorValue};
