//! Infinite-scroll traversal over load-more requests
//!
//! Scroll-fed listings keep their whole accumulated container in the
//! page, so every step re-serves items from earlier steps. The navigator
//! remembers what it has already handed out and only returns genuinely
//! new fragments; a run of steps with nothing new means the feed is
//! exhausted.

use super::{parse_rendered, render_template, ItemFragment, Navigator};
use crate::config::GenreEntry;
use crate::crawler::fetcher::{FetchError, Fetcher};
use crate::selector::FieldSelector;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

fn fragment_key(html: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    html.hash(&mut hasher);
    hasher.finish()
}

/// Walks an infinite-scroll surface: the surface template once, then the
/// `{step}` load-more template until the feed goes stale.
///
/// The first load-more request renders `{step}` as 2, matching feeds
/// whose initial screen is page 1 of the same sequence.
pub struct ScrollNavigator {
    fetcher: Arc<Fetcher>,
    item_selector: FieldSelector,
    initial_template: String,
    load_more_template: String,
    genre: Option<GenreEntry>,
    settle: Duration,
    max_stale: u32,
    step_cap: u32,
    fetches: u32,
    stale_steps: u32,
    seen: HashSet<u64>,
    done: bool,
}

impl ScrollNavigator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fetcher: Arc<Fetcher>,
        item_selector: FieldSelector,
        initial_template: String,
        load_more_template: String,
        genre: Option<GenreEntry>,
        settle: Duration,
        max_stale: u32,
        step_cap: u32,
    ) -> Self {
        Self {
            fetcher,
            item_selector,
            initial_template,
            load_more_template,
            genre,
            settle,
            max_stale,
            step_cap,
            fetches: 0,
            stale_steps: 0,
            seen: HashSet::new(),
            done: false,
        }
    }
}

#[async_trait]
impl Navigator for ScrollNavigator {
    async fn next_batch(&mut self) -> Result<Vec<ItemFragment>, FetchError> {
        if self.done {
            return Ok(Vec::new());
        }

        let genre_code = self.genre.as_ref().map(|g| g.code.as_str());
        let rendered = if self.fetches == 0 {
            render_template(&self.initial_template, 1, 1, genre_code)
        } else {
            // Let freshly loaded content settle the way a real scroll would
            // before asking for the next screen.
            tokio::time::sleep(self.settle).await;
            let step = self.fetches + 1;
            render_template(&self.load_more_template, step, step, genre_code)
        };
        let url = parse_rendered(&rendered)?;

        tracing::debug!("Fetching scroll step {} ({})", self.fetches + 1, url);
        let body = self.fetcher.fetch_html(&url).await?;

        let genre_name = self.genre.as_ref().map(|g| g.name.as_str());
        let all = super::split_items(&body, &url, &self.item_selector, genre_name);
        let total = all.len();

        let fresh: Vec<ItemFragment> = all
            .into_iter()
            .filter(|item| self.seen.insert(fragment_key(&item.html)))
            .collect();

        if fresh.is_empty() {
            self.stale_steps += 1;
            tracing::debug!(
                "Scroll step {} yielded nothing new ({}/{} stale)",
                self.fetches + 1,
                self.stale_steps,
                self.max_stale
            );
        } else {
            self.stale_steps = 0;
        }

        self.fetches += 1;
        if total == 0 || self.stale_steps >= self.max_stale || self.fetches >= self.step_cap {
            self.done = true;
        }

        Ok(fresh)
    }

    fn has_more(&self) -> bool {
        !self.done
    }

    fn reset(&mut self) {
        self.fetches = 0;
        self.stale_steps = 0;
        self.seen.clear();
        self.done = false;
    }
}
