//! Resource naming and on-disk file name rules.

use url::Url;

/// Name used when a URL path has no usable last segment.
const FALLBACK_STEM: &str = "resource";

/// Derives a resource name from its final URL.
///
/// The last path segment is percent-decoded; query and fragment are ignored.
/// When the path ends with `/` the name falls back to `resource` plus an
/// extension guessed from the content type.
///
/// # Examples
///
/// ```
/// use coursefetch_core::crawl::resource_name;
/// use url::Url;
///
/// let url = Url::parse("https://m.example.ch/pluginfile.php/9/Week%201%20notes.pdf?forcedownload=1").unwrap();
/// assert_eq!(resource_name(&url, "application/pdf"), "Week 1 notes.pdf");
///
/// let url = Url::parse("https://m.example.ch/files/").unwrap();
/// assert_eq!(resource_name(&url, "application/pdf"), "resource.pdf");
/// ```
#[must_use]
pub fn resource_name(url: &Url, content_type: &str) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            urlencoding::decode(segment)
                .map_or_else(|_| segment.to_string(), std::borrow::Cow::into_owned)
        })
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| format!("{FALLBACK_STEM}{}", extension_from_content_type(content_type)))
}

/// Reduces a resource name to a file name safe to create in a directory.
///
/// Letters (accented included), digits, space, `.`, `_` and `-` are kept;
/// everything else is dropped. Returns `None` when nothing usable remains
/// (including `.` and `..`).
#[must_use]
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | ' ' | '_' | '-'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Lowercased extension of a name, without the dot.
#[must_use]
pub fn extension_of(name: &str) -> Option<String> {
    let (stem, extension) = name.rsplit_once('.')?;
    (!stem.is_empty() && !extension.is_empty()).then(|| extension.to_ascii_lowercase())
}

/// Guess file extension from a Content-Type value.
#[must_use]
pub(crate) fn extension_from_content_type(content_type: &str) -> &'static str {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "application/pdf" => ".pdf",
        "text/plain" => ".txt",
        "text/html" => ".html",
        "text/csv" => ".csv",
        "application/zip" | "application/x-zip-compressed" => ".zip",
        "application/msword" => ".doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => ".docx",
        "application/vnd.ms-powerpoint" => ".ppt",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => ".pptx",
        "application/vnd.ms-excel" => ".xls",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => ".xlsx",
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "video/mp4" => ".mp4",
        _ => ".bin",
    }
}
