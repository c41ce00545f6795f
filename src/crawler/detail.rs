//! Detail-page enrichment
//!
//! Listing items carry shallow metadata; the full description, keyword
//! set, and genre often live on the title's detail page (or behind its
//! information tab). Enrichment is strictly best-effort: a failed detail
//! fetch leaves the record partial with `fetched_detail` unset and the
//! traversal moves on.

use crate::crawler::extract::{extract_detail, DetailSelectorSet};
use crate::crawler::fetcher::Fetcher;
use crate::record::{DetailFields, NovelRecord};
use std::sync::Arc;
use url::Url;

pub(crate) struct DetailFetcher {
    fetcher: Arc<Fetcher>,
    selectors: DetailSelectorSet,
}

impl DetailFetcher {
    pub fn new(fetcher: Arc<Fetcher>, selectors: DetailSelectorSet) -> Self {
        Self { fetcher, selectors }
    }

    /// Fetches the record's detail page and merges the deep fields in.
    ///
    /// When the page carries an info-tab link, the tab is followed once
    /// and its fields take precedence. Returns false when the detail page
    /// itself could not be fetched.
    pub async fn enrich(&self, record: &mut NovelRecord) -> bool {
        let url = match Url::parse(&record.url) {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!("Record URL '{}' unusable for detail fetch: {}", record.url, e);
                return false;
            }
        };

        let body = match self.fetcher.fetch_html(&url).await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("Detail fetch failed for {}: {}", record.url, e);
                return false;
            }
        };

        let (page_fields, tab) = extract_detail(&body, &url, &self.selectors);
        let fields = match tab {
            Some(tab_url) => {
                tracing::debug!("Following info tab {}", tab_url);
                match self.fetcher.fetch_html(&tab_url).await {
                    Ok(tab_body) => {
                        let (tab_fields, _) = extract_detail(&tab_body, &tab_url, &self.selectors);
                        prefer(tab_fields, page_fields)
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Info tab fetch failed for {}: {} (keeping detail page fields)",
                            tab_url,
                            e
                        );
                        page_fields
                    }
                }
            }
            None => page_fields,
        };

        record.merge_detail(fields);
        true
    }
}

/// Field-wise preference: primary when present, fallback otherwise.
fn prefer(primary: DetailFields, fallback: DetailFields) -> DetailFields {
    DetailFields {
        description: primary.description.or(fallback.description),
        keywords: if primary.keywords.is_empty() {
            fallback.keywords
        } else {
            primary.keywords
        },
        genre: primary.genre.or(fallback.genre),
    }
}
