//! Listing traversal strategies
//!
//! Each platform surfaces its catalog differently: numbered pages, an
//! infinite-scroll feed backed by load-more requests, or a tree of genre
//! categories. A [`Navigator`] walks one surface and hands back the raw
//! item fragments; it never extracts fields or touches storage.
//!
//! URL templates drive every strategy. `{page}` is the 1-based page
//! number, `{step}` the load-more counter, and `{genre}` the code (or
//! discovered URL) of the genre being traversed.

mod category;
mod paginated;
mod scroll;

pub use category::CategoryNavigator;
pub(crate) use category::discover_genres;
pub use paginated::PaginatedNavigator;
pub use scroll::ScrollNavigator;

use crate::crawler::fetcher::FetchError;
use crate::selector::{FieldSelector, Fragment};
use async_trait::async_trait;
use url::Url;

/// One listing item, carved out of a page but not yet extracted.
#[derive(Debug, Clone)]
pub struct ItemFragment {
    /// The item's outer HTML
    pub html: String,
    /// URL of the page the item came from, for resolving relative links
    pub base: Url,
    /// Display name of the genre being traversed, when the navigator knows it
    pub genre: Option<String>,
}

/// Walks one listing surface, batch by batch.
#[async_trait]
pub trait Navigator: Send {
    /// Fetches the next page or step and returns its item fragments.
    ///
    /// An empty batch does not by itself mean the traversal is over;
    /// callers should keep going while [`has_more`](Self::has_more)
    /// holds. Errors from the underlying fetch (already retried) bubble
    /// up unchanged.
    async fn next_batch(&mut self) -> Result<Vec<ItemFragment>, FetchError>;

    /// Whether another batch may exist.
    fn has_more(&self) -> bool;

    /// Rewinds the traversal to its first page.
    fn reset(&mut self);
}

/// Substitutes the known placeholders into a URL template.
pub(crate) fn render_template(
    template: &str,
    page: u32,
    step: u32,
    genre: Option<&str>,
) -> String {
    let mut url = template.replace("{page}", &page.to_string());
    url = url.replace("{step}", &step.to_string());
    if let Some(code) = genre {
        url = url.replace("{genre}", code);
    }
    url
}

/// Parses a rendered template into a URL.
pub(crate) fn parse_rendered(rendered: &str) -> Result<Url, FetchError> {
    Url::parse(rendered).map_err(|e| FetchError::InvalidUrl {
        url: rendered.to_string(),
        message: e.to_string(),
    })
}

/// Splits a listing page body into item fragments.
pub(crate) fn split_items(
    body: &str,
    base: &Url,
    item_selector: &FieldSelector,
    genre: Option<&str>,
) -> Vec<ItemFragment> {
    Fragment::from_document(body)
        .item_fragments(item_selector)
        .into_iter()
        .map(|html| ItemFragment {
            html,
            base: base.clone(),
            genre: genre.map(String::from),
        })
        .collect()
}
