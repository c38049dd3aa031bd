//! Chapter content pages.

use super::ExtractEnv;
use crate::errors::{ExtractionFieldError, Result};
use crate::profile::non_empty;

/// What one content page yielded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentPage {
    /// Content lines, trimmed, blank lines dropped, joined by `\n`.
    pub content: String,
    /// Further pages of the same chapter.
    pub next_pages: Vec<String>,
}

/// Extracts the text and next-page links of one content page.
///
/// A next-page link pointing at `next_chapter_url` ends the chapter and is
/// not returned.
pub fn analyze_content_page(
    env: &ExtractEnv,
    body: &str,
    final_url: &str,
    next_chapter_url: Option<&str>,
) -> Result<ContentPage> {
    let doc = env.document(body)?;
    let ev = env.evaluator(final_url);
    let root = doc.root();
    let rule = &env.profile.rule_content;

    let values = match non_empty(rule.content.as_deref()) {
        Some(content_rule) => ev.strings(content_rule, &root).unwrap_or_else(|e| {
            env.tracer
                .field_error(&ExtractionFieldError::new("content", content_rule, e.message));
            Vec::new()
        }),
        None => Vec::new(),
    };
    env.check_cancelled()?;

    let content = values
        .iter()
        .flat_map(|v| v.lines())
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if content.is_empty() {
        env.tracer.log("≡ content rule matched nothing");
    }

    let next_chapter = next_chapter_url.map(str::trim).filter(|u| !u.is_empty());
    let mut next_pages = Vec::new();
    for url in env.urls(&ev, "nextContentUrl", rule.next_content_url.as_deref(), &root) {
        if url == final_url || next_pages.contains(&url) {
            continue;
        }
        if Some(url.as_str()) == next_chapter {
            env.tracer.log("≡ next page is the next chapter, stopping");
            continue;
        }
        next_pages.push(url);
    }

    Ok(ContentPage { content, next_pages })
}
