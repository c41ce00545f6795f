//! Configuration module for Yeonjae
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, including compiling every selector expression so malformed
//! configurations fail before any network traffic happens.
//!
//! # Example
//!
//! ```no_run
//! use yeonjae::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! for platform in &config.platforms {
//!     println!("{} via {}", platform.name, platform.strategy);
//! }
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AuthConfig, Collection, Config, CrawlerConfig, Credentials, DetailSelectors, GenreEntry,
    ListSelectors, MenuConfig, PlatformConfig, SessionConfig, StorageConfig, Strategy,
    SurfaceConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};

// Re-export validation for callers that build configs programmatically
pub use validation::validate;
