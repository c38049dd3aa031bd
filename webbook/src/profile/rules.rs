//! Per-stage rule records. Every field is a rule string in the
//! [`rules`](crate::rules) language; a missing or blank field extracts nothing.

use serde::{Deserialize, Serialize};

/// Rules for search and explore result lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookListRule {
    /// Selects one element per result. A leading `-` reverses the list.
    pub book_list: Option<String>,
    pub name: Option<String>,
    pub author: Option<String>,
    pub intro: Option<String>,
    pub kind: Option<String>,
    pub last_chapter: Option<String>,
    pub update_time: Option<String>,
    pub book_url: Option<String>,
    pub cover_url: Option<String>,
    pub word_count: Option<String>,
}

/// Rules for the detail page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookInfoRule {
    /// Narrows the page to one element / JSON value before the field rules run.
    pub init: Option<String>,
    pub name: Option<String>,
    pub author: Option<String>,
    pub intro: Option<String>,
    pub kind: Option<String>,
    pub last_chapter: Option<String>,
    pub update_time: Option<String>,
    pub cover_url: Option<String>,
    pub toc_url: Option<String>,
    pub word_count: Option<String>,
}

/// Rules for table-of-contents pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TocRule {
    /// Selects one element per chapter. A leading `-` reverses the whole toc.
    pub chapter_list: Option<String>,
    pub chapter_name: Option<String>,
    pub chapter_url: Option<String>,
    /// Evaluates to a truthy string for volume headings.
    pub is_volume: Option<String>,
    pub update_time: Option<String>,
    /// Further toc pages.
    pub next_toc_url: Option<String>,
}

/// Rules for content pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentRule {
    /// Content text. Empty means chapters are direct resource links.
    pub content: Option<String>,
    /// Further pages of the same chapter.
    pub next_content_url: Option<String>,
    /// Script run on every fetched content body before extraction.
    pub web_js: Option<String>,
    /// Regex lifting the usable fragment out of every fetched content body.
    pub source_regex: Option<String>,
}
