//! Numbered-page traversal

use super::{parse_rendered, render_template, ItemFragment, Navigator};
use crate::config::GenreEntry;
use crate::crawler::fetcher::{FetchError, Fetcher};
use crate::selector::FieldSelector;
use async_trait::async_trait;
use std::sync::Arc;

/// Walks a listing through its `{page}` template, one page per batch.
///
/// The traversal ends when a page yields zero items, when the page cap is
/// reached, or immediately after the first batch for templates without a
/// `{page}` placeholder (single-page surfaces such as ranking charts).
pub struct PaginatedNavigator {
    fetcher: Arc<Fetcher>,
    item_selector: FieldSelector,
    template: String,
    genre: Option<GenreEntry>,
    page: u32,
    page_cap: u32,
    multi_page: bool,
    done: bool,
}

impl PaginatedNavigator {
    pub fn new(
        fetcher: Arc<Fetcher>,
        item_selector: FieldSelector,
        template: String,
        genre: Option<GenreEntry>,
        page_cap: u32,
    ) -> Self {
        let multi_page = template.contains("{page}");
        Self {
            fetcher,
            item_selector,
            template,
            genre,
            page: 1,
            page_cap,
            multi_page,
            done: false,
        }
    }
}

#[async_trait]
impl Navigator for PaginatedNavigator {
    async fn next_batch(&mut self) -> Result<Vec<ItemFragment>, FetchError> {
        if self.done {
            return Ok(Vec::new());
        }

        let genre_code = self.genre.as_ref().map(|g| g.code.as_str());
        let rendered = render_template(&self.template, self.page, self.page, genre_code);
        let url = parse_rendered(&rendered)?;

        tracing::debug!("Fetching listing page {} ({})", self.page, url);
        let body = self.fetcher.fetch_html(&url).await?;

        let genre_name = self.genre.as_ref().map(|g| g.name.as_str());
        let items = super::split_items(&body, &url, &self.item_selector, genre_name);

        if items.is_empty() {
            tracing::debug!("Page {} returned no items, traversal complete", self.page);
            self.done = true;
        } else {
            self.page += 1;
            if !self.multi_page || self.page > self.page_cap {
                self.done = true;
            }
        }

        Ok(items)
    }

    fn has_more(&self) -> bool {
        !self.done
    }

    fn reset(&mut self) {
        self.page = 1;
        self.done = false;
    }
}
