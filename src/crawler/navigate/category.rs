//! Per-genre category traversal
//!
//! Category platforms expose one listing per genre. The navigator walks
//! the whole genre table in order, running a paginated traversal inside
//! each genre. Genres either come from the configuration or are
//! discovered off the platform's category menu page.

use super::{ItemFragment, Navigator, PaginatedNavigator};
use crate::config::{GenreEntry, MenuConfig};
use crate::crawler::fetcher::{FetchError, Fetcher};
use crate::record::clean_text;
use crate::selector::FieldSelector;
use crate::url::canonicalize_link;
use async_trait::async_trait;
use scraper::Html;
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

/// Walks every genre of a category platform, one paginated traversal per
/// genre, in table order.
pub struct CategoryNavigator {
    fetcher: Arc<Fetcher>,
    item_selector: FieldSelector,
    template: String,
    genres: Vec<GenreEntry>,
    page_cap: u32,
    position: usize,
    current: Option<PaginatedNavigator>,
}

impl CategoryNavigator {
    pub fn new(
        fetcher: Arc<Fetcher>,
        item_selector: FieldSelector,
        template: String,
        genres: Vec<GenreEntry>,
        page_cap: u32,
    ) -> Self {
        Self {
            fetcher,
            item_selector,
            template,
            genres,
            page_cap,
            position: 0,
            current: None,
        }
    }

    /// Moves to the next genre, returning false when the table is done.
    fn advance(&mut self) -> bool {
        let Some(genre) = self.genres.get(self.position) else {
            self.current = None;
            return false;
        };
        self.position += 1;
        tracing::info!("Traversing category '{}'", genre.name);
        self.current = Some(PaginatedNavigator::new(
            self.fetcher.clone(),
            self.item_selector.clone(),
            self.template.clone(),
            Some(genre.clone()),
            self.page_cap,
        ));
        true
    }
}

#[async_trait]
impl Navigator for CategoryNavigator {
    async fn next_batch(&mut self) -> Result<Vec<ItemFragment>, FetchError> {
        loop {
            match self.current.as_mut() {
                Some(nav) if nav.has_more() => return nav.next_batch().await,
                _ => {
                    if !self.advance() {
                        return Ok(Vec::new());
                    }
                }
            }
        }
    }

    fn has_more(&self) -> bool {
        let current_live = self.current.as_ref().map(|n| n.has_more()).unwrap_or(false);
        current_live || self.position < self.genres.len()
    }

    fn reset(&mut self) {
        self.position = 0;
        self.current = None;
    }
}

/// Reads the genre table off a platform's category menu page.
///
/// The configured menu selector must match the anchor elements themselves;
/// each match becomes a genre whose display name is the link text and
/// whose code is the resolved link URL (category templates then substitute
/// it via `{genre}`).
pub(crate) async fn discover_genres(
    fetcher: &Fetcher,
    menu: &MenuConfig,
    item_selector: &FieldSelector,
) -> Result<Vec<GenreEntry>, FetchError> {
    let url = super::parse_rendered(&menu.url)?;
    let body = fetcher.fetch_html(&url).await?;
    Ok(genres_from_menu(&body, &url, item_selector))
}

fn genres_from_menu(body: &str, base: &Url, item_selector: &FieldSelector) -> Vec<GenreEntry> {
    let Some(css) = item_selector.as_css() else {
        return Vec::new();
    };

    let doc = Html::parse_document(body);
    let mut seen = HashSet::new();
    let mut genres = Vec::new();
    for element in doc.select(css) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let name = clean_text(&element.text().collect::<String>());
        if name.is_empty() {
            continue;
        }
        match canonicalize_link(base, href) {
            Ok(link) => {
                let code = link.to_string();
                if seen.insert(code.clone()) {
                    genres.push(GenreEntry {
                        name,
                        code,
                        default: false,
                    });
                }
            }
            Err(e) => tracing::debug!("Skipping menu link '{}': {}", href, e),
        }
    }

    tracing::info!("Discovered {} categories from {}", genres.len(), base);
    genres
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genres_from_menu() {
        let body = r#"
            <html><body><ul class="menu">
                <li><a href="/webnovel/list?genre=101">로맨스</a></li>
                <li><a href="/webnovel/list?genre=102">판타지</a></li>
                <li><a href="/webnovel/list?genre=101">로맨스</a></li>
                <li><a>링크 없음</a></li>
            </ul></body></html>
        "#;
        let base = Url::parse("https://novel.example.com/categories").unwrap();
        let selector = FieldSelector::parse("ul.menu a").unwrap();

        let genres = genres_from_menu(body, &base, &selector);
        assert_eq!(genres.len(), 2);
        assert_eq!(genres[0].name, "로맨스");
        assert_eq!(
            genres[0].code,
            "https://novel.example.com/webnovel/list?genre=101"
        );
        assert_eq!(genres[1].name, "판타지");
    }

    #[test]
    fn test_genres_from_menu_skips_bad_links() {
        let body = r#"
            <html><body>
                <a class="cat" href="javascript:void(0)">전체</a>
                <a class="cat" href="/real">무협</a>
            </body></html>
        "#;
        let base = Url::parse("https://novel.example.com/").unwrap();
        let selector = FieldSelector::parse("a.cat").unwrap();

        let genres = genres_from_menu(body, &base, &selector);
        assert_eq!(genres.len(), 1);
        assert_eq!(genres[0].name, "무협");
    }
}
