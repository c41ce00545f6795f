//! Crawler module for listing traversal and metadata extraction
//!
//! This module contains the extraction machinery, including:
//! - HTTP fetching with retry logic and per-platform pacing
//! - Listing navigation (pagination, infinite scroll, category sweeps)
//! - Field extraction from list items and detail pages
//! - Session establishment for adult-gated catalogs
//! - The per-platform pipeline that ties all of it together

mod auth;
mod detail;
mod extract;
mod fetcher;
mod navigate;
mod pipeline;

pub use auth::{AuthAdapter, AuthError, Session, SessionCache};
pub use fetcher::{build_http_client, build_login_client, FetchError, Fetcher};
pub use navigate::{
    CategoryNavigator, ItemFragment, Navigator, PaginatedNavigator, ScrollNavigator,
};
pub use pipeline::{run_once, CrawlRequest, Phase, PlatformSummary, RunSummary, SharedSink};

// The collection enum lives with the config types that name its surfaces.
pub use crate::config::Collection;
