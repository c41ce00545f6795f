//! Configuration validation
//!
//! Every selector expression and URL template is checked here, at load
//! time, so a malformed configuration can never take down a run halfway
//! through a listing.

use crate::config::types::{
    template_placeholders, Config, GenreEntry, PlatformConfig, Strategy,
};
use crate::selector::FieldSelector;
use crate::ConfigError;
use url::Url;

const KNOWN_PLACEHOLDERS: &[&str] = &["page", "step", "genre"];

/// Validates the complete configuration
///
/// # Arguments
///
/// * `config` - The configuration to validate
///
/// # Returns
///
/// * `Ok(())` - Configuration is valid
/// * `Err(ConfigError)` - Configuration has validation errors
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler(config)?;
    validate_storage(config)?;
    validate_platforms(config)?;
    Ok(())
}

fn validate_crawler(config: &Config) -> Result<(), ConfigError> {
    let crawler = &config.crawler;

    if crawler.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "crawler.user-agent must not be empty".to_string(),
        ));
    }

    if crawler.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "crawler.request-timeout-secs must be at least 1".to_string(),
        ));
    }

    if crawler.connect_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "crawler.connect-timeout-secs must be at least 1".to_string(),
        ));
    }

    if crawler.max_retries == 0 {
        return Err(ConfigError::Validation(
            "crawler.max-retries must be at least 1".to_string(),
        ));
    }

    if crawler.batch_size == 0 {
        return Err(ConfigError::Validation(
            "crawler.batch-size must be at least 1".to_string(),
        ));
    }

    if crawler.max_pages == 0 {
        return Err(ConfigError::Validation(
            "crawler.max-pages must be at least 1".to_string(),
        ));
    }

    if crawler.max_stale_scrolls == 0 {
        return Err(ConfigError::Validation(
            "crawler.max-stale-scrolls must be at least 1".to_string(),
        ));
    }

    if crawler.sink_retries == 0 {
        return Err(ConfigError::Validation(
            "crawler.sink-retries must be at least 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage(config: &Config) -> Result<(), ConfigError> {
    if config.storage.database_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "storage.database-path must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_platforms(config: &Config) -> Result<(), ConfigError> {
    if config.platforms.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[platform]] block is required".to_string(),
        ));
    }

    for (i, platform) in config.platforms.iter().enumerate() {
        if config.platforms[..i].iter().any(|p| p.name == platform.name) {
            return Err(ConfigError::Validation(format!(
                "duplicate [[platform]] block for '{}'",
                platform.name
            )));
        }
        validate_platform(platform)?;
    }

    Ok(())
}

fn validate_platform(platform: &PlatformConfig) -> Result<(), ConfigError> {
    let name = platform.name.as_str();

    validate_http_url(&platform.base_url, &format!("{name}.base-url"))?;

    // ===== Surfaces and templates =====

    if platform.surfaces.entries().next().is_none() {
        return Err(ConfigError::Validation(format!(
            "{name}: at least one surface template is required"
        )));
    }

    let has_genre_table = !platform.genres.is_empty() || platform.menu.is_some();

    for (collection, template) in platform.surfaces.entries() {
        validate_template(template)?;
        if template.contains("{genre}") && !has_genre_table {
            return Err(ConfigError::Validation(format!(
                "{name}.surfaces.{collection}: template uses {{genre}} but the \
                 platform has no genres and no menu"
            )));
        }
    }

    match platform.strategy {
        Strategy::InfiniteScroll => {
            let Some(load_more) = platform.load_more_url.as_deref() else {
                return Err(ConfigError::Validation(format!(
                    "{name}: infinite-scroll strategy requires load-more-url"
                )));
            };
            validate_template(load_more)?;
            if !load_more.contains("{step}") {
                return Err(ConfigError::Validation(format!(
                    "{name}.load-more-url must contain {{step}}"
                )));
            }
        }
        Strategy::Category => {
            if !has_genre_table {
                return Err(ConfigError::Validation(format!(
                    "{name}: category strategy requires a genre table or a menu"
                )));
            }
        }
        Strategy::Pagination => {
            if let Some(load_more) = platform.load_more_url.as_deref() {
                validate_template(load_more)?;
            }
        }
    }

    // ===== Genres =====

    validate_genres(name, &platform.genres)?;

    // ===== Selectors =====

    validate_item_selector(&format!("{name}.list.item"), &platform.list.item)?;
    compile_selector(&format!("{name}.list.title"), &platform.list.title)?;
    compile_selector(&format!("{name}.list.author"), &platform.list.author)?;
    compile_selector(&format!("{name}.list.url"), &platform.list.url)?;
    compile_optional(&format!("{name}.list.description"), &platform.list.description)?;
    compile_optional(&format!("{name}.list.genre"), &platform.list.genre)?;
    compile_optional(&format!("{name}.list.keywords"), &platform.list.keywords)?;
    compile_optional(
        &format!("{name}.list.adult-marker"),
        &platform.list.adult_marker,
    )?;

    if let Some(detail) = &platform.detail {
        compile_optional(&format!("{name}.detail.description"), &detail.description)?;
        compile_optional(&format!("{name}.detail.keywords"), &detail.keywords)?;
        compile_optional(&format!("{name}.detail.genre"), &detail.genre)?;
        compile_optional(&format!("{name}.detail.tab-link"), &detail.tab_link)?;
    }

    if let Some(menu) = &platform.menu {
        validate_http_url(&menu.url, &format!("{name}.menu.url"))?;
        validate_item_selector(&format!("{name}.menu.item"), &menu.item)?;
    }

    // ===== Auth =====

    if let Some(auth) = &platform.auth {
        validate_http_url(&auth.login_url, &format!("{name}.auth.login-url"))?;
        if auth.env_prefix.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{name}.auth.env-prefix must not be empty"
            )));
        }
    }

    Ok(())
}

fn validate_genres(name: &str, genres: &[GenreEntry]) -> Result<(), ConfigError> {
    let mut defaults = 0;
    for genre in genres {
        if genre.name.trim().is_empty() || genre.code.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{name}: genre entries need a non-empty name and code"
            )));
        }
        if genre.default {
            defaults += 1;
        }
    }
    if defaults > 1 {
        return Err(ConfigError::Validation(format!(
            "{name}: at most one genre may be marked default"
        )));
    }
    Ok(())
}

fn validate_http_url(raw: &str, field: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidUrl(format!("{field}: {e}")))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{field}: scheme must be http or https, got '{}'",
            url.scheme()
        )));
    }
    Ok(())
}

fn validate_template(template: &str) -> Result<(), ConfigError> {
    for placeholder in template_placeholders(template) {
        if !KNOWN_PLACEHOLDERS.contains(&placeholder) {
            return Err(ConfigError::UnknownPlaceholder {
                placeholder: placeholder.to_string(),
                template: template.to_string(),
            });
        }
    }
    Ok(())
}

/// Compiles one selector expression, failing the load on any parse error.
fn compile_selector(field: &str, raw: &str) -> Result<FieldSelector, ConfigError> {
    FieldSelector::parse(raw).map_err(|e| ConfigError::InvalidSelector {
        field: field.to_string(),
        message: e.to_string(),
    })
}

fn compile_optional(field: &str, raw: &Option<String>) -> Result<(), ConfigError> {
    if let Some(raw) = raw {
        compile_selector(field, raw)?;
    }
    Ok(())
}

/// Item-splitting selectors must be plain CSS: the engine carves fragments
/// out of the parsed document tree, which XPath expressions (evaluated over
/// a re-serialized copy) cannot address.
fn validate_item_selector(field: &str, raw: &str) -> Result<(), ConfigError> {
    let parsed = compile_selector(field, raw)?;
    if parsed.as_css().is_none() {
        return Err(ConfigError::Validation(format!(
            "{field} must be a CSS selector"
        )));
    }
    if parsed.attribute().is_some() || parsed.is_multiple() {
        return Err(ConfigError::Validation(format!(
            "{field} must not carry '@attr' or '[multiple]'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{
        AuthConfig, CrawlerConfig, ListSelectors, MenuConfig, StorageConfig, SurfaceConfig,
    };
    use crate::record::Platform;

    fn test_platform() -> PlatformConfig {
        PlatformConfig {
            name: Platform::Naver,
            base_url: "https://novel.naver.com".to_string(),
            strategy: Strategy::Pagination,
            rate_limit_ms: None,
            max_pages: None,
            surfaces: SurfaceConfig {
                all: Some("https://novel.naver.com/webnovel/list?page={page}".to_string()),
                new: None,
                ranking: None,
                completed: None,
            },
            load_more_url: None,
            genres: Vec::new(),
            menu: None,
            list: ListSelectors {
                item: "li.card".to_string(),
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
        }
    }

    fn test_config() -> Config {
        Config {
            crawler: CrawlerConfig::default(),
            storage: StorageConfig {
                database_path: "./novels.db".to_string(),
            },
            session: None,
            platforms: vec![test_platform()],
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate(&test_config()).is_ok());
    }

    #[test]
    fn test_zero_batch_size_fails() {
        let mut config = test_config();
        config.crawler.batch_size = 0;
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_empty_database_path_fails() {
        let mut config = test_config();
        config.storage.database_path = "  ".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_no_platforms_fails() {
        let mut config = test_config();
        config.platforms.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_duplicate_platform_fails() {
        let mut config = test_config();
        config.platforms.push(test_platform());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_base_url_fails() {
        let mut config = test_config();
        config.platforms[0].base_url = "ftp://novel.naver.com".to_string();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_no_surfaces_fails() {
        let mut config = test_config();
        config.platforms[0].surfaces = SurfaceConfig::default();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_unknown_placeholder_fails() {
        let mut config = test_config();
        config.platforms[0].surfaces.all =
            Some("https://novel.naver.com/list?cursor={cursor}".to_string());
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPlaceholder { .. }));
    }

    #[test]
    fn test_genre_template_without_genres_fails() {
        let mut config = test_config();
        config.platforms[0].surfaces.all =
            Some("https://novel.naver.com/list?genre={genre}&page={page}".to_string());
        assert!(validate(&config).is_err());

        // A configured genre table makes the same template valid.
        config.platforms[0].genres.push(GenreEntry {
            name: "로맨스".to_string(),
            code: "101".to_string(),
            default: false,
        });
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_infinite_scroll_requires_load_more_url() {
        let mut config = test_config();
        config.platforms[0].strategy = Strategy::InfiniteScroll;
        assert!(validate(&config).is_err());

        config.platforms[0].load_more_url =
            Some("https://novel.naver.com/list/more?step={step}".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_load_more_url_requires_step_placeholder() {
        let mut config = test_config();
        config.platforms[0].strategy = Strategy::InfiniteScroll;
        config.platforms[0].load_more_url =
            Some("https://novel.naver.com/list/more".to_string());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_category_requires_genre_table_or_menu() {
        let mut config = test_config();
        config.platforms[0].strategy = Strategy::Category;
        assert!(validate(&config).is_err());

        config.platforms[0].menu = Some(MenuConfig {
            url: "https://novel.naver.com/webnovel/categoryList".to_string(),
            item: "ul.menu a".to_string(),
        });
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_item_selector_must_be_plain_css() {
        let mut config = test_config();
        config.platforms[0].list.item = "li.card a@href".to_string();
        assert!(validate(&config).is_err());

        config.platforms[0].list.item = "xpath://li[@class='card']".to_string();
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_malformed_css_selector_fails() {
        let mut config = test_config();
        config.platforms[0].list.title = "div[[[".to_string();
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSelector { .. }));
    }

    #[test]
    fn test_malformed_xpath_selector_fails() {
        let mut config = test_config();
        config.platforms[0].list.title = "xpath://span[".to_string();
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSelector { .. }));
    }

    #[test]
    fn test_empty_auth_env_prefix_fails() {
        let mut config = test_config();
        config.platforms[0].auth = Some(AuthConfig {
            login_url: "https://nid.naver.com/nidlogin.login".to_string(),
            username_field: "id".to_string(),
            password_field: "pw".to_string(),
            env_prefix: "".to_string(),
            session_cookie: None,
        });
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_two_default_genres_fail() {
        let mut config = test_config();
        for code in ["101", "102"] {
            config.platforms[0].genres.push(GenreEntry {
                name: format!("genre-{code}"),
                code: code.to_string(),
                default: true,
            });
        }
        assert!(validate(&config).is_err());
    }
}
