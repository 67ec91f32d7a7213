//! Keyword extraction from tab titles.

use std::collections::HashMap;

/// Maximum keywords kept per group.
pub const MAX_KEYWORDS: usize = 10;

const MIN_WORD_LEN: usize = 3;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "you", "your", "are", "was", "this", "that", "from", "how",
    "what", "why", "when", "who", "new", "all", "not", "but", "can", "has", "have", "our",
    "its", "into", "about", "more", "http", "https", "www", "com", "org", "net", "html",
];

/// Extract up to `limit` keywords from a set of texts.
///
/// Words are lowercased alphanumeric runs of at least three characters with
/// stopwords and pure numbers removed, ranked by frequency then alphabetically.
pub fn extract_keywords<'a, I>(texts: I, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: HashMap<String, usize> = HashMap::new();

    for text in texts {
        for word in text.split(|c: char| !c.is_alphanumeric()) {
            if word.chars().count() < MIN_WORD_LEN {
                continue;
            }
            let word = word.to_lowercase();
            if STOPWORDS.contains(&word.as_str()) || word.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            *counts.entry(word).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(limit).map(|(w, _)| w).collect()
}
