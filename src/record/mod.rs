//! Novel record data model
//!
//! The unit of extraction is a [`NovelRecord`]: one web novel's metadata as
//! seen on a platform's listing surface, optionally enriched from its detail
//! page. Records are transient — they live in batch buffers and are handed
//! off to the sink, which owns them after a successful write.

mod validate;

pub use validate::{dedupe_by_title_author, dedupe_by_url, validate, ValidationError};

use serde::{Deserialize, Serialize};

/// The platforms this pipeline knows how to crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Naver Series (series.naver.com)
    Naver,
    /// KakaoPage (page.kakao.com)
    Kakao,
    /// Ridibooks (ridibooks.com)
    Ridi,
}

impl Platform {
    /// Returns all supported platforms in a fixed order.
    pub fn all() -> [Self; 3] {
        [Self::Naver, Self::Kakao, Self::Ridi]
    }

    /// Converts the platform to its database/config string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Naver => "naver",
            Self::Kakao => "kakao",
            Self::Ridi => "ridi",
        }
    }

    /// Parses a platform from its string representation.
    ///
    /// Returns None if the string doesn't match any known platform.
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "naver" => Some(Self::Naver),
            "kakao" => Some(Self::Kakao),
            "ridi" => Some(Self::Ridi),
            _ => None,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One extracted web novel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NovelRecord {
    /// Novel title (required, non-empty)
    pub title: String,

    /// Author name (required, non-empty)
    pub author: String,

    /// Short summary from the listing, or full synopsis once detail-fetched
    pub description: Option<String>,

    /// Platform the record came from
    pub platform: Platform,

    /// Canonical absolute detail-page URL; the dedup key
    pub url: String,

    /// Keyword tags in extraction order (may be empty)
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Genre, extracted or inherited from the traversed category
    pub genre: Option<String>,

    /// Whether the novel is adult-gated
    #[serde(default)]
    pub is_adult: bool,

    /// Whether deep fields were populated from the detail page
    #[serde(default)]
    pub fetched_detail: bool,
}

/// Extended fields extracted from a detail document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailFields {
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub genre: Option<String>,
}

impl NovelRecord {
    /// Merges detail-page fields into this record.
    ///
    /// Non-empty detail values override listing values; listing values
    /// survive where the detail page yielded nothing. Marks the record as
    /// detail-fetched.
    pub fn merge_detail(&mut self, detail: DetailFields) {
        if let Some(description) = non_empty(detail.description) {
            self.description = Some(description);
        }
        if !detail.keywords.is_empty() {
            self.keywords = detail.keywords;
        }
        if let Some(genre) = non_empty(detail.genre) {
            self.genre = Some(genre);
        }
        self.fetched_detail = true;
    }

    /// Normalizes text fields in place: collapses whitespace runs in
    /// title/author/description, cleans the keyword list, trims the genre.
    pub fn normalize(&mut self) {
        self.title = clean_text(&self.title);
        self.author = clean_text(&self.author);
        self.description = self
            .description
            .take()
            .map(|d| clean_text(&d))
            .filter(|d| !d.is_empty());
        self.genre = self
            .genre
            .take()
            .map(|g| clean_text(&g))
            .filter(|g| !g.is_empty());
        self.keywords = normalize_keywords(std::mem::take(&mut self.keywords));
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Collapses internal whitespace runs to single spaces and trims the edges.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalizes a keyword list: splits comma-joined entries, trims each,
/// drops empties, and collapses exact duplicates keeping the first. Order
/// is otherwise preserved.
pub fn normalize_keywords(raw: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut keywords = Vec::new();
    for entry in raw {
        for part in entry.split(',') {
            let keyword = clean_text(part);
            if keyword.is_empty() {
                continue;
            }
            if seen.insert(keyword.clone()) {
                keywords.push(keyword);
            }
        }
    }
    keywords
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> NovelRecord {
        NovelRecord {
            title: "달빛 조각사".to_string(),
            author: "남희성".to_string(),
            description: Some("가상현실 게임".to_string()),
            platform: Platform::Naver,
            url: "https://series.naver.com/novel/detail.series?productNo=1".to_string(),
            keywords: vec!["판타지".to_string()],
            genre: None,
            is_adult: false,
            fetched_detail: false,
        }
    }

    #[test]
    fn test_platform_round_trip() {
        for platform in Platform::all() {
            assert_eq!(Platform::from_str_opt(platform.as_str()), Some(platform));
        }
        assert_eq!(Platform::from_str_opt("munpia"), None);
    }

    #[test]
    fn test_platform_serde_lowercase() {
        let json = serde_json::to_string(&Platform::Kakao).unwrap();
        assert_eq!(json, "\"kakao\"");
    }

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  달빛   조각사 \n 1부  "), "달빛 조각사 1부");
        assert_eq!(clean_text(""), "");
        assert_eq!(clean_text("   "), "");
    }

    #[test]
    fn test_merge_detail_overrides_non_empty() {
        let mut rec = record();
        rec.merge_detail(DetailFields {
            description: Some("전체 줄거리".to_string()),
            keywords: vec!["게임".to_string(), "성장".to_string()],
            genre: Some("판타지".to_string()),
        });
        assert_eq!(rec.description.as_deref(), Some("전체 줄거리"));
        assert_eq!(rec.keywords, vec!["게임", "성장"]);
        assert_eq!(rec.genre.as_deref(), Some("판타지"));
        assert!(rec.fetched_detail);
    }

    #[test]
    fn test_merge_detail_keeps_listing_values_on_empty() {
        let mut rec = record();
        rec.merge_detail(DetailFields {
            description: Some("   ".to_string()),
            keywords: Vec::new(),
            genre: None,
        });
        assert_eq!(rec.description.as_deref(), Some("가상현실 게임"));
        assert_eq!(rec.keywords, vec!["판타지"]);
        assert!(rec.fetched_detail);
    }

    #[test]
    fn test_normalize_keywords_splits_and_trims() {
        let keywords = normalize_keywords(vec![
            "판타지, 게임".to_string(),
            "  성장 ".to_string(),
            "".to_string(),
            "판타지".to_string(),
        ]);
        assert_eq!(keywords, vec!["판타지", "게임", "성장"]);
    }

    #[test]
    fn test_normalize_record() {
        let mut rec = record();
        rec.title = "  달빛   조각사  ".to_string();
        rec.description = Some("   ".to_string());
        rec.keywords = vec![" 판타지 ".to_string(), "판타지".to_string()];
        rec.normalize();
        assert_eq!(rec.title, "달빛 조각사");
        assert_eq!(rec.description, None);
        assert_eq!(rec.keywords, vec!["판타지"]);
    }
}
