//! Table-of-contents pages.

use super::ExtractEnv;
use crate::errors::{ExtractionFieldError, Result};
use crate::models::{Book, BookChapter};
use crate::profile::non_empty;

/// Where the next page of a table of contents comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PageRef {
    /// Fetch this URL.
    Fetch(String),
    /// The page is the book page itself; use its cached body when there is one.
    ReuseParentBody,
}

/// What one toc page yielded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TocPage {
    /// Chapters in page order, indexed from 0 within the page.
    pub chapters: Vec<BookChapter>,
    /// Further toc pages, excluding the page itself.
    pub next_pages: Vec<PageRef>,
    /// Whether the chapter list rule asked for the toc to be reversed.
    pub reverse: bool,
}

/// Extracts the chapters and next-page links of one toc page.
pub fn analyze_chapter_page(env: &ExtractEnv, book: &Book, body: &str, final_url: &str) -> Result<TocPage> {
    let doc = env.document(body)?;
    let ev = env.evaluator(final_url);
    let root = doc.root();
    let rule = &env.profile.rule_toc;

    let Some(list_rule) = non_empty(rule.chapter_list.as_deref()) else {
        env.tracer.log("≡ no chapter list rule");
        return Ok(TocPage::default());
    };

    let entries = match ev.list(list_rule, &root) {
        Ok(entries) => entries,
        Err(e) => {
            env.tracer
                .field_error(&ExtractionFieldError::new("chapterList", list_rule, e.message));
            return Ok(TocPage::default());
        }
    };
    env.tracer.log(format!("≡ found {} chapter entries", entries.nodes.len()));

    let mut chapters = Vec::with_capacity(entries.nodes.len());
    for node in &entries.nodes {
        env.check_cancelled()?;
        let title = env.text(&ev, "chapterName", rule.chapter_name.as_deref(), node);
        let url = env.url(&ev, "chapterUrl", rule.chapter_url.as_deref(), node);
        if title.is_empty() && url.is_empty() {
            continue;
        }

        let is_volume = is_truthy(&env.text(&ev, "isVolume", rule.is_volume.as_deref(), node));
        let url = match (url.is_empty(), is_volume) {
            (false, _) => url,
            // Volume headings without a link still need a unique key.
            (true, true) => format!("{title}{}", chapters.len()),
            (true, false) => final_url.to_string(),
        };

        let mut chapter = BookChapter::new(url, title, book.book_url.as_str()).with_index(chapters.len());
        chapter.is_volume = is_volume;
        chapter.update_time = env.text(&ev, "updateTime", rule.update_time.as_deref(), node);
        if chapters.is_empty() {
            env.trace_field("chapterName", &chapter.title);
            env.trace_field("chapterUrl", &chapter.url);
        }
        chapters.push(chapter);
    }

    let mut next_pages = Vec::new();
    for url in env.urls(&ev, "nextTocUrl", rule.next_toc_url.as_deref(), &root) {
        if url == final_url {
            continue;
        }
        let page = if url == book.book_url {
            PageRef::ReuseParentBody
        } else {
            PageRef::Fetch(url)
        };
        if !next_pages.contains(&page) {
            next_pages.push(page);
        }
    }
    if !next_pages.is_empty() {
        env.tracer.log(format!("≡ {} further toc pages", next_pages.len()));
    }

    Ok(TocPage {
        chapters,
        next_pages,
        reverse: entries.reverse,
    })
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}
