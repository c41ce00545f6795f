//! Field extraction
//!
//! Turns item fragments and detail documents into [`NovelRecord`]s by
//! driving the selector engine with a platform's compiled selector sets.
//! One bad item never takes down the surrounding traversal: extraction
//! failures come back as [`ItemFailure`] and the caller decides what to
//! count and what to skip.

use crate::config::{DetailSelectors, ListSelectors};
use crate::crawler::navigate::ItemFragment;
use crate::record::{DetailFields, NovelRecord, Platform, ValidationError};
use crate::selector::{FieldSelector, Fragment};
use crate::url::canonicalize_link;
use crate::{ConfigError, UrlError};
use url::Url;

/// Why a single listing item could not become a record.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ItemFailure {
    #[error("item has no link")]
    NoLink,
    #[error(transparent)]
    BadLink(#[from] UrlError),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

fn compile(field: &str, raw: &str) -> Result<FieldSelector, ConfigError> {
    FieldSelector::parse(raw).map_err(|e| ConfigError::InvalidSelector {
        field: field.to_string(),
        message: e.to_string(),
    })
}

fn compile_opt(field: &str, raw: &Option<String>) -> Result<Option<FieldSelector>, ConfigError> {
    raw.as_deref().map(|r| compile(field, r)).transpose()
}

/// Compiled selectors for one platform's listing items.
pub(crate) struct ListSelectorSet {
    pub item: FieldSelector,
    pub title: FieldSelector,
    pub author: FieldSelector,
    pub url: FieldSelector,
    pub description: Option<FieldSelector>,
    pub genre: Option<FieldSelector>,
    pub keywords: Option<FieldSelector>,
    pub adult_marker: Option<FieldSelector>,
}

impl ListSelectorSet {
    /// Compiles a platform's listing selectors.
    ///
    /// Configurations are validated at load time, so this only fails for
    /// configs constructed programmatically without validation.
    pub fn compile(config: &ListSelectors) -> Result<Self, ConfigError> {
        Ok(Self {
            item: compile("list.item", &config.item)?,
            title: compile("list.title", &config.title)?,
            author: compile("list.author", &config.author)?,
            url: compile("list.url", &config.url)?,
            description: compile_opt("list.description", &config.description)?,
            genre: compile_opt("list.genre", &config.genre)?,
            keywords: compile_opt("list.keywords", &config.keywords)?,
            adult_marker: compile_opt("list.adult-marker", &config.adult_marker)?,
        })
    }
}

/// Compiled selectors for one platform's detail pages.
pub(crate) struct DetailSelectorSet {
    pub description: Option<FieldSelector>,
    pub keywords: Option<FieldSelector>,
    pub genre: Option<FieldSelector>,
    pub tab_link: Option<FieldSelector>,
}

impl DetailSelectorSet {
    pub fn compile(config: &DetailSelectors) -> Result<Self, ConfigError> {
        Ok(Self {
            description: compile_opt("detail.description", &config.description)?,
            keywords: compile_opt("detail.keywords", &config.keywords)?,
            genre: compile_opt("detail.genre", &config.genre)?,
            tab_link: compile_opt("detail.tab-link", &config.tab_link)?,
        })
    }
}

/// Resolves a selector to a non-empty scalar, treating empty matches as
/// absent.
fn scalar(doc: &Fragment, selector: &FieldSelector) -> Option<String> {
    doc.resolve(selector)
        .into_scalar()
        .filter(|v| !v.trim().is_empty())
}

fn scalar_opt(doc: &Fragment, selector: &Option<FieldSelector>) -> Option<String> {
    selector.as_ref().and_then(|s| scalar(doc, s))
}

/// Extracts a record's listing fields from one item fragment.
///
/// The link is resolved against the fragment's page URL and canonicalized;
/// an item without a usable link is a failed item. Title and author may
/// come back empty here; validation rejects them after the detail merge.
pub(crate) fn extract_list_item(
    fragment: &ItemFragment,
    selectors: &ListSelectorSet,
    platform: Platform,
) -> Result<NovelRecord, ItemFailure> {
    let doc = Fragment::from_fragment(&fragment.html);

    let link = scalar(&doc, &selectors.url).ok_or(ItemFailure::NoLink)?;
    let url = canonicalize_link(&fragment.base, &link)?;

    let title = scalar(&doc, &selectors.title).unwrap_or_default();
    let author = scalar(&doc, &selectors.author).unwrap_or_default();
    let description = scalar_opt(&doc, &selectors.description);
    // An extracted genre wins; otherwise the genre the navigator was
    // traversing fills the gap.
    let genre = scalar_opt(&doc, &selectors.genre).or_else(|| fragment.genre.clone());
    let keywords = selectors
        .keywords
        .as_ref()
        .map(|s| doc.resolve(s).into_list())
        .unwrap_or_default();
    let is_adult = selectors
        .adult_marker
        .as_ref()
        .map(|s| !doc.resolve(s).is_absent())
        .unwrap_or(false);

    Ok(NovelRecord {
        title,
        author,
        description,
        platform,
        url: url.to_string(),
        keywords,
        genre,
        is_adult,
        fetched_detail: false,
    })
}

/// Extracts deep fields from a detail document, plus the info-tab link
/// when the page has one.
pub(crate) fn extract_detail(
    body: &str,
    base: &Url,
    selectors: &DetailSelectorSet,
) -> (DetailFields, Option<Url>) {
    let doc = Fragment::from_document(body);

    let fields = DetailFields {
        description: scalar_opt(&doc, &selectors.description),
        keywords: selectors
            .keywords
            .as_ref()
            .map(|s| doc.resolve(s).into_list())
            .unwrap_or_default(),
        genre: scalar_opt(&doc, &selectors.genre),
    };

    let tab = scalar_opt(&doc, &selectors.tab_link).and_then(|href| {
        match canonicalize_link(base, &href) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::debug!("Ignoring unusable tab link '{}': {}", href, e);
                None
            }
        }
    });

    (fields, tab)
}
