//! Best-effort page content enrichment.
//!
//! One extraction per tab runs concurrently. Each is bounded by its own
//! timeout; a slow or failing page leaves `content: None` for that tab only.

use std::time::Duration;

use futures::future::join_all;

use super::types::TabInfo;
use crate::platform::ContentExtractor;

/// Default per-tab extraction timeout.
pub const EXTRACTION_TIMEOUT: Duration = Duration::from_secs(3);

/// Extracted text is truncated to this many characters.
pub const MAX_CONTENT_CHARS: usize = 2000;

/// Fill `content` for every tab the extractor can read within `timeout`.
pub async fn enrich_tabs(
    tabs: &mut [TabInfo],
    extractor: &dyn ContentExtractor,
    timeout: Duration,
) {
    let jobs = tabs.iter().map(|info| {
        let tab_id = info.id();
        async move {
            match tokio::time::timeout(timeout, extractor.extract_text(tab_id)).await {
                Ok(Ok(text)) => Some(truncate_chars(text.trim(), MAX_CONTENT_CHARS)),
                Ok(Err(e)) => {
                    tracing::debug!(tab_id, error = %e, "content extraction failed");
                    None
                }
                Err(_) => {
                    tracing::debug!(
                        tab_id,
                        timeout_ms = timeout.as_millis() as u64,
                        "content extraction timed out"
                    );
                    None
                }
            }
        }
    });

    let results = join_all(jobs).await;
    let mut extracted = 0usize;
    for (info, content) in tabs.iter_mut().zip(results) {
        if let Some(text) = content.filter(|t| !t.is_empty()) {
            info.content = Some(text);
            extracted += 1;
        }
    }

    tracing::debug!(total = tabs.len(), extracted, "tab content enrichment finished");
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
