use crate::UrlError;
use url::Url;

/// Canonicalizes an extracted item link into the detail-page URL used as the
/// dedup key.
///
/// # Canonicalization Steps
///
/// 1. Trim the raw href; reject empty or fragment-only links
/// 2. Resolve relative links against the listing page the item came from
/// 3. Require an http(s) scheme (rejects `javascript:`, `mailto:`, ...)
/// 4. Drop the fragment
///
/// Query parameters are kept as-is: on these platforms the detail URL's
/// query carries the item identity (e.g. `?productNo=...`).
///
/// # Arguments
///
/// * `base` - The listing page URL the href was extracted from
/// * `href` - The raw link value from the item fragment
///
/// # Returns
///
/// * `Ok(Url)` - Canonical absolute detail URL
/// * `Err(UrlError)` - Link unusable as a detail URL
///
/// # Examples
///
/// ```
/// use yeonjae::url::canonicalize_link;
///
/// let base = url::Url::parse("https://series.naver.com/novel/home.series").unwrap();
/// let url = canonicalize_link(&base, "/novel/detail.series?productNo=42#ter").unwrap();
/// assert_eq!(
///     url.as_str(),
///     "https://series.naver.com/novel/detail.series?productNo=42"
/// );
/// ```
pub fn canonicalize_link(base: &Url, href: &str) -> Result<Url, UrlError> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return Err(UrlError::EmptyLink);
    }

    let mut url = base
        .join(href)
        .map_err(|e| UrlError::Parse(format!("{href}: {e}")))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    url.set_fragment(None);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://page.kakao.com/menu/10011").unwrap()
    }

    #[test]
    fn test_relative_link_resolved() {
        let url = canonicalize_link(&base(), "/content/53456").unwrap();
        assert_eq!(url.as_str(), "https://page.kakao.com/content/53456");
    }

    #[test]
    fn test_absolute_link_passes_through() {
        let url = canonicalize_link(&base(), "https://ridibooks.com/books/777").unwrap();
        assert_eq!(url.as_str(), "https://ridibooks.com/books/777");
    }

    #[test]
    fn test_fragment_dropped() {
        let url = canonicalize_link(&base(), "/content/1#tab_review").unwrap();
        assert_eq!(url.as_str(), "https://page.kakao.com/content/1");
    }

    #[test]
    fn test_query_kept() {
        let url = canonicalize_link(&base(), "detail.series?productNo=9").unwrap();
        assert!(url.as_str().ends_with("?productNo=9"));
    }

    #[test]
    fn test_empty_and_fragment_only_rejected() {
        assert!(matches!(
            canonicalize_link(&base(), "  "),
            Err(UrlError::EmptyLink)
        ));
        assert!(matches!(
            canonicalize_link(&base(), "#top"),
            Err(UrlError::EmptyLink)
        ));
    }

    #[test]
    fn test_non_web_schemes_rejected() {
        assert!(matches!(
            canonicalize_link(&base(), "javascript:void(0)"),
            Err(UrlError::InvalidScheme(_))
        ));
        assert!(matches!(
            canonicalize_link(&base(), "mailto:editor@example.com"),
            Err(UrlError::InvalidScheme(_))
        ));
    }
}
