//! Selector resolution against parsed documents
//!
//! A [`Fragment`] wraps one parsed HTML tree — a whole listing/detail page or
//! a single item sub-tree — and resolves [`FieldSelector`]s against it. CSS
//! selectors run directly on the element tree; XPath expressions run against
//! a lazily computed XML re-serialization of the same tree, so relative paths
//! work against sub-trees exactly as they do against whole documents.
//!
//! Resolution is pure: matching nothing yields absence, never an error.

use std::cell::OnceCell;

use scraper::{ElementRef, Html, Selector};
use sxd_xpath::{Context, Factory, Value};

use super::xml::element_to_xml;
use super::{CompiledExpr, FieldSelector, SelectorValue};

/// One parsed document or sub-tree, ready for selector resolution.
///
/// Holds a non-`Send` parse tree; construct, resolve, and drop it without
/// crossing an await point.
pub struct Fragment {
    doc: Html,
    xml: OnceCell<String>,
}

impl Fragment {
    /// Parses an item sub-tree (serialized outer HTML of one listing item).
    pub fn from_fragment(html: &str) -> Self {
        Self {
            doc: Html::parse_fragment(html),
            xml: OnceCell::new(),
        }
    }

    /// Parses a complete page.
    pub fn from_document(html: &str) -> Self {
        Self {
            doc: Html::parse_document(html),
            xml: OnceCell::new(),
        }
    }

    /// Resolves one field selector against this fragment.
    ///
    /// # Returns
    ///
    /// * `SelectorValue::One` - first match (or `None`) for scalar selectors
    /// * `SelectorValue::Many` - all matches in document order for
    ///   `[multiple]` selectors
    pub fn resolve(&self, selector: &FieldSelector) -> SelectorValue {
        match &selector.expr {
            CompiledExpr::Css(css) => self.resolve_css(css, selector),
            CompiledExpr::Xpath(expr) => self.resolve_xpath(expr, selector.is_multiple()),
        }
    }

    /// Splits this fragment into item sub-trees via a CSS item selector,
    /// returning each match's serialized outer HTML.
    pub fn item_fragments(&self, selector: &FieldSelector) -> Vec<String> {
        match selector.as_css() {
            Some(css) => self.doc.select(css).map(|el| el.html()).collect(),
            None => {
                // Validation restricts item selectors to CSS; an XPath one
                // reaching this point yields nothing rather than panicking.
                tracing::warn!(selector = selector.raw(), "item selector is not CSS");
                Vec::new()
            }
        }
    }

    fn resolve_css(&self, css: &Selector, selector: &FieldSelector) -> SelectorValue {
        if selector.is_multiple() {
            let values = self
                .doc
                .select(css)
                .filter_map(|el| element_value(el, selector.attribute()))
                .collect();
            SelectorValue::Many(values)
        } else {
            let first = self
                .doc
                .select(css)
                .next()
                .and_then(|el| element_value(el, selector.attribute()));
            SelectorValue::One(first)
        }
    }

    fn resolve_xpath(&self, expr: &str, multiple: bool) -> SelectorValue {
        let absent = if multiple {
            SelectorValue::Many(Vec::new())
        } else {
            SelectorValue::One(None)
        };

        let xml = self
            .xml
            .get_or_init(|| element_to_xml(self.doc.root_element()));
        let package = match sxd_document::parser::parse(xml) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(error = %e, "fragment did not re-serialize as XML");
                return absent;
            }
        };
        let document = package.as_document();

        // The expression was syntax-checked at configuration load.
        let xpath = match Factory::new().build(expr) {
            Ok(Some(x)) => x,
            _ => return absent,
        };
        let context = Context::new();
        let value = match xpath.evaluate(&context, document.root()) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(expr, error = %e, "xpath evaluation failed");
                return absent;
            }
        };

        match value {
            Value::Nodeset(nodes) => {
                if multiple {
                    let values = nodes
                        .document_order()
                        .iter()
                        .map(|node| node.string_value().trim().to_string())
                        .collect();
                    SelectorValue::Many(values)
                } else {
                    let first = nodes
                        .document_order_first()
                        .map(|node| node.string_value().trim().to_string());
                    SelectorValue::One(first)
                }
            }
            Value::String(s) => wrap_scalar(s.trim().to_string(), multiple),
            Value::Number(n) => wrap_scalar(n.to_string(), multiple),
            Value::Boolean(b) => wrap_scalar(b.to_string(), multiple),
        }
    }
}

fn wrap_scalar(value: String, multiple: bool) -> SelectorValue {
    if multiple {
        SelectorValue::Many(vec![value])
    } else {
        SelectorValue::One(Some(value))
    }
}

/// Extracts the configured value from one matched element: an attribute if
/// requested, otherwise the concatenated descendant text, edge-trimmed.
fn element_value(el: ElementRef<'_>, attribute: Option<&str>) -> Option<String> {
    match attribute {
        Some(attr) => el.value().attr(attr).map(|v| v.trim().to_string()),
        None => Some(el.text().collect::<String>().trim().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::FieldSelector;

    const LISTING: &str = r#"
        <ul class="novel-list">
            <li class="novel-card">
                <h3 class="title">달빛 조각사</h3>
                <span class="author">남희성</span>
                <a class="link" href="/novel/1">more</a>
                <span class="tag">판타지</span>
                <span class="tag">게임</span>
            </li>
            <li class="novel-card">
                <h3 class="title">전지적 독자 시점</h3>
                <span class="author">싱숑</span>
                <a class="link" href="/novel/2">more</a>
            </li>
            <li class="novel-card">
                <h3 class="title">화산귀환</h3>
                <span class="author">비가</span>
                <a class="link" href="/novel/3">more</a>
            </li>
        </ul>
    "#;

    fn sel(raw: &str) -> FieldSelector {
        FieldSelector::parse(raw).unwrap()
    }

    #[test]
    fn test_css_text_first_match() {
        let frag = Fragment::from_fragment(LISTING);
        let value = frag.resolve(&sel("h3.title"));
        assert_eq!(value, SelectorValue::One(Some("달빛 조각사".to_string())));
    }

    #[test]
    fn test_css_attribute() {
        let frag = Fragment::from_fragment(LISTING);
        let value = frag.resolve(&sel("a.link@href"));
        assert_eq!(value, SelectorValue::One(Some("/novel/1".to_string())));
    }

    #[test]
    fn test_css_multiple_ordered() {
        let frag = Fragment::from_fragment(LISTING);
        let value = frag.resolve(&sel("span.tag[multiple]"));
        assert_eq!(
            value,
            SelectorValue::Many(vec!["판타지".to_string(), "게임".to_string()])
        );
    }

    #[test]
    fn test_css_no_match_is_absence() {
        let frag = Fragment::from_fragment(LISTING);
        assert_eq!(frag.resolve(&sel(".missing")), SelectorValue::One(None));
        assert_eq!(
            frag.resolve(&sel(".missing[multiple]")),
            SelectorValue::Many(Vec::new())
        );
    }

    #[test]
    fn test_scalar_never_returns_many() {
        let frag = Fragment::from_fragment(LISTING);
        // Three titles in the document, multiple=false: at most one value.
        match frag.resolve(&sel("h3.title")) {
            SelectorValue::One(Some(_)) => {}
            other => panic!("expected scalar, got {other:?}"),
        }
    }

    #[test]
    fn test_multiple_always_returns_list() {
        let frag = Fragment::from_fragment(LISTING);
        // One match only, multiple=true: still a sequence.
        match frag.resolve(&sel("ul.novel-list[multiple]")) {
            SelectorValue::Many(items) => assert_eq!(items.len(), 1),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_item_fragments_splits_cards() {
        let frag = Fragment::from_fragment(LISTING);
        let items = frag.item_fragments(&sel(".novel-card"));
        assert_eq!(items.len(), 3);

        // Each item resolves its own fields with non-empty title and url.
        for item in &items {
            let item = Fragment::from_fragment(item);
            let title = item.resolve(&sel("h3.title")).into_scalar().unwrap();
            let url = item.resolve(&sel("a@href")).into_scalar().unwrap();
            assert!(!title.is_empty());
            assert!(!url.is_empty());
        }
    }

    #[test]
    fn test_xpath_following_sibling() {
        let frag = Fragment::from_fragment("<div><span>작가</span><span>홍길동</span></div>");
        let value = frag.resolve(&sel("xpath://span[text()='작가']/following-sibling::span"));
        assert_eq!(value, SelectorValue::One(Some("홍길동".to_string())));
    }

    #[test]
    fn test_xpath_relative_against_subtree() {
        let frag = Fragment::from_fragment(
            "<li><div class=\"meta\"><span class=\"author\">남희성</span></div></li>",
        );
        let value = frag.resolve(&sel("xpath:.//span[@class='author']"));
        assert_eq!(value, SelectorValue::One(Some("남희성".to_string())));
    }

    #[test]
    fn test_xpath_attribute_extraction() {
        let frag = Fragment::from_fragment(LISTING);
        let value = frag.resolve(&sel("xpath://a[@class='link']/@href"));
        assert_eq!(value, SelectorValue::One(Some("/novel/1".to_string())));
    }

    #[test]
    fn test_xpath_multiple_document_order() {
        let frag = Fragment::from_fragment(LISTING);
        let value = frag.resolve(&sel("xpath://a[@class='link']/@href[multiple]"));
        assert_eq!(
            value,
            SelectorValue::Many(vec![
                "/novel/1".to_string(),
                "/novel/2".to_string(),
                "/novel/3".to_string()
            ])
        );
    }

    #[test]
    fn test_xpath_no_match_is_absence() {
        let frag = Fragment::from_fragment(LISTING);
        let value = frag.resolve(&sel("xpath://em[@class='nope']"));
        assert_eq!(value, SelectorValue::One(None));
    }

    #[test]
    fn test_xpath_on_full_document() {
        let html = "<html><head><title>t</title></head><body>\
                    <div id=\"desc\">  줄거리   내용  </div></body></html>";
        let frag = Fragment::from_document(html);
        let value = frag.resolve(&sel("xpath://div[@id='desc']"));
        assert_eq!(value, SelectorValue::One(Some("줄거리   내용".to_string())));
    }

    #[test]
    fn test_text_edge_trimmed() {
        let frag = Fragment::from_fragment("<span class=\"a\">  spaced  </span>");
        let value = frag.resolve(&sel("span.a"));
        assert_eq!(value, SelectorValue::One(Some("spaced".to_string())));
    }
}
