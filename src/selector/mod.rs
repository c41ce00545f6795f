//! Declarative field selectors (CSS or XPath)
//!
//! Selectors arrive as raw strings in platform configuration and are parsed
//! once, at load time, into a structured form:
//!
//! - an `xpath:` prefix switches the dialect from CSS to XPath;
//! - a trailing `[multiple]` marker makes the field list-valued;
//! - an `@attr` suffix (CSS: `a.link@href`; XPath: `//a/@href`) extracts an
//!   attribute instead of text content.
//!
//! Malformed syntax is rejected here, so a bad selector fails configuration
//! loading instead of failing per item mid-crawl. Resolution against parsed
//! documents lives in [`engine`].

mod engine;
mod xml;

pub use engine::Fragment;

use scraper::Selector;
use sxd_xpath::Factory;
use thiserror::Error;

/// Errors raised while parsing a selector expression string.
#[derive(Debug, Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,

    #[error("invalid CSS selector '{selector}': {message}")]
    Css { selector: String, message: String },

    #[error("invalid XPath expression '{selector}': {message}")]
    Xpath { selector: String, message: String },

    #[error("missing attribute name after '@' in '{0}'")]
    MissingAttribute(String),
}

/// Selector dialect, inferred from the raw expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Css,
    Xpath,
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Css => write!(f, "css"),
            Self::Xpath => write!(f, "xpath"),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum CompiledExpr {
    /// Eagerly compiled CSS selector.
    Css(Selector),
    /// Syntax-checked XPath expression; rebuilt cheaply at evaluation time.
    Xpath(String),
}

/// One field's selector, parsed into `{dialect, expression, attribute, multiple}`.
#[derive(Debug, Clone)]
pub struct FieldSelector {
    raw: String,
    pub(crate) expr: CompiledExpr,
    pub(crate) attribute: Option<String>,
    multiple: bool,
}

impl FieldSelector {
    /// Parses a raw selector expression string.
    ///
    /// # Arguments
    ///
    /// * `raw` - The expression as written in configuration
    ///
    /// # Returns
    ///
    /// * `Ok(FieldSelector)` - Parsed and syntax-checked selector
    /// * `Err(SelectorError)` - Malformed expression
    pub fn parse(raw: &str) -> Result<Self, SelectorError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SelectorError::Empty);
        }

        // The trailing `[multiple]` marker is ours, not a CSS attribute test.
        let (body, multiple) = match trimmed.strip_suffix("[multiple]") {
            Some(rest) => (rest.trim(), true),
            None => (trimmed, false),
        };
        if body.is_empty() {
            return Err(SelectorError::Empty);
        }

        if let Some(expr) = body.strip_prefix("xpath:") {
            let expr = expr.trim();
            if expr.is_empty() {
                return Err(SelectorError::Empty);
            }
            let factory = Factory::new();
            match factory.build(expr) {
                Ok(Some(_)) => {}
                Ok(None) => return Err(SelectorError::Empty),
                Err(e) => {
                    return Err(SelectorError::Xpath {
                        selector: expr.to_string(),
                        message: e.to_string(),
                    })
                }
            }
            return Ok(Self {
                raw: trimmed.to_string(),
                attribute: xpath_trailing_attribute(expr),
                expr: CompiledExpr::Xpath(expr.to_string()),
                multiple,
            });
        }

        // CSS: a single `@` splits the element selector from the attribute
        // to extract. CSS grammar itself never uses `@` mid-selector.
        let (css_part, attribute) = match body.split_once('@') {
            Some((css, attr)) => {
                let attr = attr.trim();
                if attr.is_empty() {
                    return Err(SelectorError::MissingAttribute(body.to_string()));
                }
                (css.trim(), Some(attr.to_string()))
            }
            None => (body, None),
        };
        if css_part.is_empty() {
            return Err(SelectorError::Empty);
        }

        let compiled = Selector::parse(css_part).map_err(|e| SelectorError::Css {
            selector: css_part.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            raw: trimmed.to_string(),
            expr: CompiledExpr::Css(compiled),
            attribute,
            multiple,
        })
    }

    /// The original expression string as configured.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Which dialect this selector evaluates in.
    pub fn dialect(&self) -> Dialect {
        match self.expr {
            CompiledExpr::Css(_) => Dialect::Css,
            CompiledExpr::Xpath(_) => Dialect::Xpath,
        }
    }

    /// The attribute extracted instead of text content, if any.
    pub fn attribute(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    /// Whether this selector yields a list of values.
    pub fn is_multiple(&self) -> bool {
        self.multiple
    }

    /// Returns the compiled CSS selector, or `None` for XPath selectors.
    ///
    /// Item-splitting requires CSS (the matched sub-trees must be
    /// re-serializable); configuration validation enforces that.
    pub fn as_css(&self) -> Option<&Selector> {
        match &self.expr {
            CompiledExpr::Css(s) => Some(s),
            CompiledExpr::Xpath(_) => None,
        }
    }
}

/// A resolved selector value: scalar for `multiple=false`, ordered list for
/// `multiple=true`. Absence is `One(None)` or an empty `Many`, never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorValue {
    One(Option<String>),
    Many(Vec<String>),
}

impl SelectorValue {
    /// Collapses to a single optional value (first element for lists).
    pub fn into_scalar(self) -> Option<String> {
        match self {
            Self::One(v) => v,
            Self::Many(mut items) => {
                if items.is_empty() {
                    None
                } else {
                    Some(items.remove(0))
                }
            }
        }
    }

    /// Converts to a list (zero-or-one element for scalars).
    pub fn into_list(self) -> Vec<String> {
        match self {
            Self::One(Some(v)) => vec![v],
            Self::One(None) => Vec::new(),
            Self::Many(items) => items,
        }
    }

    /// True when the selector matched nothing.
    pub fn is_absent(&self) -> bool {
        match self {
            Self::One(v) => v.is_none(),
            Self::Many(items) => items.is_empty(),
        }
    }
}

/// Detects a trailing `/@name` attribute step in an XPath expression.
///
/// Predicates like `//a[@href]` end in `]`, so only a genuine final
/// attribute step matches.
fn xpath_trailing_attribute(expr: &str) -> Option<String> {
    let idx = expr.rfind("/@")?;
    let name = &expr[idx + 2..];
    if !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        Some(name.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_css() {
        let sel = FieldSelector::parse("h3.title").unwrap();
        assert_eq!(sel.dialect(), Dialect::Css);
        assert_eq!(sel.attribute(), None);
        assert!(!sel.is_multiple());
        assert!(sel.as_css().is_some());
    }

    #[test]
    fn test_parse_css_attribute() {
        let sel = FieldSelector::parse("a.link@href").unwrap();
        assert_eq!(sel.dialect(), Dialect::Css);
        assert_eq!(sel.attribute(), Some("href"));
    }

    #[test]
    fn test_parse_css_multiple() {
        let sel = FieldSelector::parse("span.tag[multiple]").unwrap();
        assert!(sel.is_multiple());
        assert_eq!(sel.attribute(), None);
    }

    #[test]
    fn test_parse_css_attribute_and_multiple() {
        let sel = FieldSelector::parse("img.cover@src[multiple]").unwrap();
        assert!(sel.is_multiple());
        assert_eq!(sel.attribute(), Some("src"));
    }

    #[test]
    fn test_parse_xpath() {
        let sel = FieldSelector::parse("xpath://span[text()='작가']/following-sibling::span").unwrap();
        assert_eq!(sel.dialect(), Dialect::Xpath);
        assert_eq!(sel.attribute(), None);
        assert!(sel.as_css().is_none());
    }

    #[test]
    fn test_parse_xpath_attribute() {
        let sel = FieldSelector::parse("xpath://a[@class='item']/@href").unwrap();
        assert_eq!(sel.dialect(), Dialect::Xpath);
        assert_eq!(sel.attribute(), Some("href"));
    }

    #[test]
    fn test_parse_xpath_multiple() {
        let sel = FieldSelector::parse("xpath://span[@class='tag'][multiple]").unwrap();
        assert_eq!(sel.dialect(), Dialect::Xpath);
        assert!(sel.is_multiple());
        // The predicate `[@class='tag']` is not an attribute extraction.
        assert_eq!(sel.attribute(), None);
    }

    #[test]
    fn test_parse_relative_xpath() {
        let sel = FieldSelector::parse("xpath:.//span[@class='author']").unwrap();
        assert_eq!(sel.dialect(), Dialect::Xpath);
    }

    #[test]
    fn test_invalid_css_rejected() {
        let err = FieldSelector::parse("div[[bad").unwrap_err();
        assert!(matches!(err, SelectorError::Css { .. }));
    }

    #[test]
    fn test_invalid_xpath_rejected() {
        let err = FieldSelector::parse("xpath://span[").unwrap_err();
        assert!(matches!(err, SelectorError::Xpath { .. }));
    }

    #[test]
    fn test_empty_selector_rejected() {
        assert!(matches!(FieldSelector::parse(""), Err(SelectorError::Empty)));
        assert!(matches!(FieldSelector::parse("  "), Err(SelectorError::Empty)));
        assert!(matches!(
            FieldSelector::parse("xpath:"),
            Err(SelectorError::Empty)
        ));
        assert!(matches!(
            FieldSelector::parse("[multiple]"),
            Err(SelectorError::Empty)
        ));
    }

    #[test]
    fn test_missing_attribute_name_rejected() {
        let err = FieldSelector::parse("a.link@").unwrap_err();
        assert!(matches!(err, SelectorError::MissingAttribute(_)));
    }

    #[test]
    fn test_selector_value_scalar() {
        assert_eq!(
            SelectorValue::One(Some("x".into())).into_scalar(),
            Some("x".to_string())
        );
        assert_eq!(SelectorValue::One(None).into_scalar(), None);
        assert_eq!(
            SelectorValue::Many(vec!["a".into(), "b".into()]).into_scalar(),
            Some("a".to_string())
        );
    }

    #[test]
    fn test_selector_value_list() {
        assert_eq!(
            SelectorValue::One(Some("x".into())).into_list(),
            vec!["x".to_string()]
        );
        assert!(SelectorValue::One(None).into_list().is_empty());
        assert!(SelectorValue::Many(vec![]).is_absent());
    }
}
