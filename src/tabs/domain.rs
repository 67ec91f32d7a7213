//! URL helpers: domain derivation, analysis eligibility, privacy reduction.

use url::Url;

/// URL schemes belonging to the browser or to extensions. Tabs on these
/// pages are never sent to the classifier.
const INTERNAL_SCHEMES: &[&str] = &[
    "chrome",
    "chrome-extension",
    "chrome-search",
    "edge",
    "about",
    "moz-extension",
    "devtools",
    "view-source",
];

/// Host portion of a URL, lowercased. `None` for unparseable or hostless URLs.
pub fn extract_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.trim_start_matches("www.").to_ascii_lowercase())
}

/// Whether a tab with this URL may be sent for analysis.
pub fn is_eligible_for_analysis(url: &str) -> bool {
    let url = url.trim();
    if url.is_empty() {
        return false;
    }
    match Url::parse(url) {
        Ok(parsed) => !INTERNAL_SCHEMES.contains(&parsed.scheme()),
        Err(_) => false,
    }
}

/// Reduce a URL to `scheme://host/` for privacy mode.
///
/// Unparseable URLs reduce to an empty string.
pub fn privacy_reduced_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) => format!("{}://{host}/", parsed.scheme()),
            None => format!("{}:", parsed.scheme()),
        },
        Err(_) => String::new(),
    }
}
