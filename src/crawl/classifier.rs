//! HTML classification helpers for course pages and embed pages.
//!
//! Everything here is pure: it takes markup or an href and never touches the
//! network. `scraper::Html` is not `Send`, so callers parse, extract owned
//! values and drop the document before awaiting.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

/// Hrefs pointing at a PDF or at a platform resource module.
static RESOURCE_HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"^.+(?:\.pdf|resource).*$"));

/// Hrefs pointing at a platform URL module.
static URL_MODULE_HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"^.+/mod/url.+$"));

static MAIN_CONTENT_LINKS: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("#region-main a[href]"));
static WORKAROUND_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("div.resourceworkaround a[href]"));
static RESOURCE_OBJECT: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("object#resourceobject[data]"));
static RESOURCE_IFRAME: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("iframe#resourceobject[src]"));
static COURSE_LINKS: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("li.type_course a[title]"));
static LOGOUT_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("div.logininfo a[href*=logout]"));
static TYPED_INPUTS: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("input[type]"));

fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

fn compile_static_selector(selector: &str) -> Selector {
    Selector::parse(selector).unwrap_or_else(|e| panic!("invalid static selector '{selector}': {e}"))
}

/// Returns true when an href is worth resolving.
///
/// # Examples
///
/// ```
/// use coursefetch_core::crawl::is_candidate_href;
///
/// assert!(is_candidate_href("https://m.example.ch/mod/resource/view.php?id=4"));
/// assert!(is_candidate_href("https://m.example.ch/files/notes.pdf"));
/// assert!(is_candidate_href("https://m.example.ch/mod/url/view.php?id=9"));
/// assert!(!is_candidate_href("https://m.example.ch/mod/forum/view.php?id=2"));
/// ```
#[must_use]
pub fn is_candidate_href(href: &str) -> bool {
    RESOURCE_HREF_RE.is_match(href) || URL_MODULE_HREF_RE.is_match(href)
}

/// Finds the resource an embed page wraps.
///
/// Checked in order: a resource-workaround link, an `<object>` viewer, an
/// `<iframe>` viewer. Returns the raw (possibly relative) target.
#[must_use]
pub fn find_embedded_target(document: &Html) -> Option<String> {
    let attr_of = |selector: &Selector, attr: &str| {
        document
            .select(selector)
            .find_map(|element| element.value().attr(attr))
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
    };
    attr_of(&WORKAROUND_LINK, "href")
        .or_else(|| attr_of(&RESOURCE_OBJECT, "data"))
        .or_else(|| attr_of(&RESOURCE_IFRAME, "src"))
}

/// Parses `html` and runs [`find_embedded_target`].
#[must_use]
pub fn find_embedded_target_in(html: &str) -> Option<String> {
    find_embedded_target(&Html::parse_document(html))
}

/// Hrefs of every anchor inside the main content region, in document order.
#[must_use]
pub fn main_content_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&MAIN_CONTENT_LINKS)
        .filter_map(|element| element.value().attr("href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty())
        .collect()
}

/// Enrolled courses listed on the home page, keyed by title.
#[must_use]
pub fn course_links(html: &str) -> BTreeMap<String, String> {
    let document = Html::parse_document(html);
    document
        .select(&COURSE_LINKS)
        .filter_map(|element| {
            let title = element.value().attr("title")?.trim();
            let href = element.value().attr("href")?.trim();
            (!title.is_empty() && !href.is_empty()).then(|| (title.to_string(), href.to_string()))
        })
        .collect()
}

/// Returns true when the page shows a logout link, i.e. the user is signed in.
#[must_use]
pub fn has_logout_marker(html: &str) -> bool {
    Html::parse_document(html)
        .select(&LOGOUT_LINK)
        .next()
        .is_some()
}

/// Name/value pairs of every hidden input, in document order.
///
/// Inputs without a name are skipped; a missing value is sent as empty.
#[must_use]
pub fn hidden_fields(html: &str) -> Vec<(String, String)> {
    let document = Html::parse_document(html);
    document
        .select(&TYPED_INPUTS)
        .filter(|element| {
            element
                .value()
                .attr("type")
                .is_some_and(|kind| kind.trim().eq_ignore_ascii_case("hidden"))
        })
        .filter_map(|element| {
            let name = element.value().attr("name")?;
            if name.is_empty() {
                return None;
            }
            let value = element.value().attr("value").unwrap_or_default();
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}
