//! Interstitial page parsing.
//!
//! Pure functions over the HTML of a mirror's "slow download" page. They never
//! touch the network, so the matching strategy can change without touching
//! the executor.

use std::ops::RangeInclusive;
use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;
use url::Url;

/// Default sanity bounds for a parsed countdown, in seconds.
pub const DEFAULT_COUNTDOWN_BOUNDS: RangeInclusive<u32> = 1..=300;

/// `navigator.clipboard.writeText('https://...')`
#[allow(clippy::expect_used)]
static CLIPBOARD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"navigator\.clipboard\.writeText\(\s*['"]([^'"]+)['"]\s*\)"#)
        .expect("clipboard regex is valid") // Static pattern, safe to panic
});

/// The copy-box span the page renders the link into.
#[allow(clippy::expect_used)]
static STYLED_SPAN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<span\b[^>]*\bclass\s*=\s*["'][^"']*\bbreak-all\b[^"']*["'][^>]*>\s*(https?://[^<\s]+)\s*</span>"#)
        .expect("styled span regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static ANCHOR_TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<a\b[^>]*>").expect("anchor regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static DOWNLOAD_ATTR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\sdownload(?:\s|=|/|>)").expect("download attribute regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static HREF_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bhref\s*=\s*["']([^"']+)["']"#).expect("href regex is valid") // Static pattern, safe to panic
});

/// `window.location = '...'` or `window.location.href = '...'`
#[allow(clippy::expect_used)]
static WINDOW_LOCATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"window\.location(?:\.href)?\s*=\s*['"]([^'"]+)['"]"#)
        .expect("window.location regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static COUNTDOWN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<span\b[^>]*\bclass\s*=\s*["'][^"']*\bjs-partner-countdown\b[^"']*["'][^>]*>\s*(\d{1,6})\s*</span>"#)
        .expect("countdown regex is valid") // Static pattern, safe to panic
});

/// Phrases the origin uses when the daily download allowance is used up.
const QUOTA_PHRASES: &[&str] = &[
    "reached the daily download limit",
    "daily download limit",
    "too many downloads",
];

/// Extracts the direct download URL from an interstitial page.
///
/// Patterns are tried in order and the first absolute `http(s)` URL wins:
/// 1. `navigator.clipboard.writeText(...)` argument
/// 2. text of the `break-all` copy-box span
/// 3. `href` of an anchor carrying a `download` attribute
/// 4. `window.location` assignment
#[must_use]
pub fn extract_download_url(html: &str) -> Option<String> {
    let found = first_capture(&CLIPBOARD_PATTERN, html)
        .or_else(|| first_capture(&STYLED_SPAN_PATTERN, html))
        .or_else(|| download_anchor_href(html))
        .or_else(|| first_capture(&WINDOW_LOCATION_PATTERN, html));

    if let Some(url) = &found {
        trace!(%url, "interstitial download url found");
    }
    found
}

/// Extracts the countdown the page asks the visitor to wait out.
///
/// Values outside `bounds` are treated as mis-parses and ignored.
#[must_use]
pub fn extract_countdown_seconds(html: &str, bounds: &RangeInclusive<u32>) -> Option<u32> {
    COUNTDOWN_PATTERN
        .captures_iter(html)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
        .find(|seconds| bounds.contains(seconds))
}

/// Returns true if the page says the daily download quota is exhausted.
#[must_use]
pub fn detect_quota_exhausted(html: &str) -> bool {
    let lowered = html.to_lowercase();
    QUOTA_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

fn first_capture(pattern: &Regex, html: &str) -> Option<String> {
    pattern
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .find_map(normalize_candidate)
}

fn download_anchor_href(html: &str) -> Option<String> {
    ANCHOR_TAG_PATTERN
        .find_iter(html)
        .map(|tag| tag.as_str())
        .filter(|tag| DOWNLOAD_ATTR_PATTERN.is_match(tag))
        .filter_map(|tag| HREF_PATTERN.captures(tag)?.get(1).map(|m| m.as_str()))
        .find_map(normalize_candidate)
}

/// Decodes the handful of entities that show up inside attributes and keeps
/// only absolute http(s) URLs.
fn normalize_candidate(raw: &str) -> Option<String> {
    let decoded = raw
        .trim()
        .replace("&amp;", "&")
        .replace("&#x2F;", "/")
        .replace("&#47;", "/")
        .replace("\\/", "/");
    let parsed = Url::parse(&decoded).ok()?;
    matches!(parsed.scheme(), "http" | "https").then_some(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNTDOWN_ONLY: &str = r#"
        <html><body>
          <p>Please wait <span class="js-partner-countdown">45</span> seconds to download.</p>
          <a href="/slow_download/abc/0/0">Reload</a>
        </body></html>
    "#;

    const CLIPBOARD_WITH_COUNTDOWN: &str = r#"
        <html><body>
          <span class="js-partner-countdown">12</span>
          <button onclick="navigator.clipboard.writeText('https://mirror/x.epub'); return false;">copy</button>
          <script>window.location = 'https://elsewhere.example/other.epub';</script>
        </body></html>
    "#;

    #[test]
    fn test_countdown_parsed_when_no_url_present() {
        assert_eq!(extract_download_url(COUNTDOWN_ONLY), None);
        assert_eq!(
            extract_countdown_seconds(COUNTDOWN_ONLY, &DEFAULT_COUNTDOWN_BOUNDS),
            Some(45)
        );
    }

    #[test]
    fn test_clipboard_url_wins_over_countdown_and_later_patterns() {
        assert_eq!(
            extract_download_url(CLIPBOARD_WITH_COUNTDOWN).as_deref(),
            Some("https://mirror/x.epub")
        );
    }

    #[test]
    fn test_styled_span_url() {
        let html = r#"<span class="whitespace-normal bg-gray-200 break-all">
            https://b4mcx2ml.net/d3/x/Dune%20--%20Frank%20Herbert.epub?key=1&amp;t=2
        </span>"#;
        assert_eq!(
            extract_download_url(html).as_deref(),
            Some("https://b4mcx2ml.net/d3/x/Dune%20--%20Frank%20Herbert.epub?key=1&t=2")
        );
    }

    #[test]
    fn test_download_flagged_anchor() {
        let html = r#"
            <a href="https://example.com/not-this.epub">plain</a>
            <a class="btn" href="https://files.example.com/book.pdf" download>Download now</a>
        "#;
        assert_eq!(
            extract_download_url(html).as_deref(),
            Some("https://files.example.com/book.pdf")
        );
    }

    #[test]
    fn test_window_location_assignment() {
        let html = r"<script>setTimeout(function(){ window.location.href = 'https://dl.example.org/a.mobi'; }, 10);</script>";
        assert_eq!(
            extract_download_url(html).as_deref(),
            Some("https://dl.example.org/a.mobi")
        );
    }

    #[test]
    fn test_relative_urls_are_ignored() {
        let html = r#"<a href="/md5/abc" download>x</a><script>window.location = '/login';</script>"#;
        assert_eq!(extract_download_url(html), None);
    }

    #[test]
    fn test_countdown_outside_bounds_is_rejected() {
        let html = r#"<span class="js-partner-countdown">9000</span>"#;
        assert_eq!(extract_countdown_seconds(html, &DEFAULT_COUNTDOWN_BOUNDS), None);
        let zero = r#"<span class="js-partner-countdown">0</span>"#;
        assert_eq!(extract_countdown_seconds(zero, &DEFAULT_COUNTDOWN_BOUNDS), None);
        assert_eq!(extract_countdown_seconds(html, &(1..=10_000)), Some(9000));
    }

    #[test]
    fn test_countdown_absent() {
        assert_eq!(
            extract_countdown_seconds("<p>nothing here</p>", &DEFAULT_COUNTDOWN_BOUNDS),
            None
        );
    }

    #[test]
    fn test_quota_phrases_detected_case_insensitively() {
        assert!(detect_quota_exhausted(
            "<p>You have Reached the daily download limit for today.</p>"
        ));
        assert!(detect_quota_exhausted("Too many downloads from your IP"));
        assert!(!detect_quota_exhausted(COUNTDOWN_ONLY));
    }
}
