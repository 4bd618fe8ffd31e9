//! Parser Pool: dequeue fetched bodies, extract links, compute a
//! change-detection content hash, and assemble enriched page records.
//!
//! Built on `scraper` rather than a hand-rolled tokenizer:
//! `Html::parse_document` plus CSS `Selector`s for `a[href]`/`title`/
//! canonical links. `scraper`'s DOM walk is iterative, not recursive per
//! nesting level, so deeply nested documents don't blow the stack.

mod priority;

pub use priority::score_link;

use crate::url::{is_static_asset, normalize_url, MAX_URL_LENGTH};
use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use url::Url;

/// A link discovered on a page, already normalized and scored.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredLink {
    pub url: String,
    pub priority: f64,
}

/// Extracted information from an HTML page.
#[derive(Debug, Clone)]
pub struct ParsedPage {
    pub title: Option<String>,
    pub links: Vec<DiscoveredLink>,
    /// Hash over title/first-paragraph/first-2KB fallback, used for
    /// change-detection rather than byte-for-byte comparison so that
    /// boilerplate and advertising churn don't reset the crawl schedule.
    pub content_hash: String,
}

/// Parses HTML content and extracts links, title, and a content hash.
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links, data URIs, fragment-only hrefs
/// - Static assets (`.css`, `.js`, images, audio, video, archives)
/// - Links longer than 200 characters after normalization
///
/// **Note:** `rel="nofollow"` links ARE followed.
pub fn parse_html(html: &str, base_url: &Url) -> Result<ParsedPage, String> {
    let document = Html::parse_document(html);

    let title = extract_title(&document);
    let links = extract_links(&document, base_url);
    let content_hash = hash_content(&document, html, &title);

    Ok(ParsedPage {
        title,
        links,
        content_hash,
    })
}

fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;
    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn first_paragraph(document: &Html) -> Option<String> {
    let p_selector = Selector::parse("p").ok()?;
    document
        .select(&p_selector)
        .map(|element| element.text().collect::<String>().trim().to_string())
        .find(|s| !s.is_empty())
}

/// Computes the stable content hash used for change detection.
fn hash_content(document: &Html, raw_html: &str, title: &Option<String>) -> String {
    let paragraph = first_paragraph(document);
    let key = match (title, paragraph) {
        (Some(t), Some(p)) => format!("{}\n{}", t, p),
        (Some(t), None) => t.clone(),
        (None, Some(p)) => p,
        (None, None) => raw_html.chars().take(2048).collect(),
    };

    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<DiscoveredLink> {
    let mut links = Vec::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }
            if let Some(href) = element.value().attr("href") {
                if let Some(url) = resolve_link(href, base_url) {
                    links.push(score_link(url));
                }
            }
        }
    }

    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(href) = element.value().attr("href") {
                if let Some(url) = resolve_link(href, base_url) {
                    links.push(score_link(url));
                }
            }
        }
    }

    links
}

/// Resolves a link href against `base_url`, normalizes it, and applies the
/// deny-list/length-cap filters. Returns `None` if the link should be
/// excluded.
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let joined = base_url.join(href).ok()?;
    if joined.scheme() != "http" && joined.scheme() != "https" {
        return None;
    }

    let normalized = normalize_url(joined.as_str()).ok()?;
    if normalized.as_str().len() > MAX_URL_LENGTH {
        return None;
    }
    if is_static_asset(&normalized) {
        return None;
    }
    Some(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    #[test]
    fn test_extract_title() {
        let html = r#"<html><head><title>Test Page</title></head><body></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.title, Some("Test Page".to_string()));
    }

    #[test]
    fn test_no_title() {
        let html = r#"<html><head></head><body></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.title, None);
    }

    #[test]
    fn test_extract_absolute_link() {
        let html = r#"<html><body><a href="https://other.com/page">Link</a></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.links.len(), 1);
        assert_eq!(parsed.links[0].url, "https://other.com/page");
    }

    #[test]
    fn test_extract_relative_link() {
        let html = r#"<html><body><a href="/other">Link</a></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.links[0].url, "https://example.com/other");
    }

    #[test]
    fn test_skip_javascript_mailto_tel_data() {
        let html = r#"<html><body>
            <a href="javascript:void(0)">J</a>
            <a href="mailto:test@example.com">M</a>
            <a href="tel:+1234567890">T</a>
            <a href="data:text/html,hi">D</a>
        </body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.links.len(), 0);
    }

    #[test]
    fn test_skip_download_link() {
        let html = r#"<html><body><a href="/file.pdf" download>Download</a></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.links.len(), 0);
    }

    #[test]
    fn test_skip_static_asset_links() {
        let html = r#"<html><body>
            <a href="/style.css">CSS</a>
            <a href="/app.js">JS</a>
            <a href="/photo.jpg">Photo</a>
            <a href="/archive.zip">Zip</a>
        </body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.links.len(), 0);
    }

    #[test]
    fn test_skip_overlong_links() {
        let long_path = "a".repeat(250);
        let html = format!(r#"<html><body><a href="/{}">Long</a></body></html>"#, long_path);
        let parsed = parse_html(&html, &base_url()).unwrap();
        assert_eq!(parsed.links.len(), 0);
    }

    #[test]
    fn test_skip_fragment_only() {
        let html = r##"<html><body><a href="#section">Jump</a></body></html>"##;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.links.len(), 0);
    }

    #[test]
    fn test_follow_nofollow_links() {
        let html = r#"<html><body><a href="/page" rel="nofollow">Link</a></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.links.len(), 1);
    }

    #[test]
    fn test_extract_canonical_link() {
        let html = r#"<html><head><link rel="canonical" href="https://example.com/canonical" /></head><body></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert!(parsed.links.iter().any(|l| l.url == "https://example.com/canonical"));
    }

    #[test]
    fn content_hash_is_stable_for_identical_input() {
        let html = r#"<html><head><title>T</title></head><body><p>Hello world</p></body></html>"#;
        let a = parse_html(html, &base_url()).unwrap();
        let b = parse_html(html, &base_url()).unwrap();
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn content_hash_changes_when_paragraph_text_changes() {
        let a = parse_html(
            r#"<html><head><title>T</title></head><body><p>Hello</p></body></html>"#,
            &base_url(),
        )
        .unwrap();
        let b = parse_html(
            r#"<html><head><title>T</title></head><body><p>Goodbye</p></body></html>"#,
            &base_url(),
        )
        .unwrap();
        assert_ne!(a.content_hash, b.content_hash);
    }

    #[test]
    fn content_hash_tolerates_boilerplate_changes_around_tracked_content() {
        let a = parse_html(
            r#"<html><head><title>T</title></head><body><nav>Ad 1</nav><p>Hello</p></body></html>"#,
            &base_url(),
        )
        .unwrap();
        let b = parse_html(
            r#"<html><head><title>T</title></head><body><nav>Ad 2</nav><p>Hello</p></body></html>"#,
            &base_url(),
        )
        .unwrap();
        assert_eq!(a.content_hash, b.content_hash);
    }
}
