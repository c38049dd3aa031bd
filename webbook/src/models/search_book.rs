use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::book::{Book, SourceType};

/// Which stage produced a [`SearchBook`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    /// Free-text search.
    #[default]
    Search,
    /// Catalog / explore listing.
    Explore,
}

/// One entry of a search or explore result list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchBook {
    /// Title.
    pub name: String,
    /// Author.
    pub author: String,
    /// Genre / tags text.
    pub kind: String,
    /// Cover image URL.
    pub cover_url: String,
    /// Synopsis.
    pub intro: String,
    /// Detail page URL.
    pub book_url: String,
    /// Title of the newest chapter.
    pub latest_chapter_title: String,
    /// Word count text.
    pub word_count: String,
    /// Update time text.
    pub update_time: String,
    /// Source origin (the profile's `source_url`).
    pub origin: String,
    /// Display name of the source.
    pub origin_name: String,
    /// Content kind tag of the source.
    pub book_type: SourceType,
    /// Provenance: search or explore.
    pub list_kind: ListKind,
    /// Relevance to the search key in `[0, 1]`; search mode only.
    pub relevance: Option<f64>,
}

impl SearchBook {
    /// Converts the result into a [`Book`] ready for the info stage.
    #[must_use]
    pub fn to_book(&self) -> Book {
        Book {
            book_url: self.book_url.clone(),
            origin: self.origin.clone(),
            origin_name: self.origin_name.clone(),
            name: self.name.clone(),
            author: self.author.clone(),
            kind: self.kind.clone(),
            cover_url: self.cover_url.clone(),
            intro: self.intro.clone(),
            latest_chapter_title: self.latest_chapter_title.clone(),
            word_count: self.word_count.clone(),
            update_time: self.update_time.clone(),
            book_type: self.book_type,
            ..Default::default()
        }
    }

    /// Builds a result from book fields extracted off a detail page.
    #[must_use]
    pub fn from_book(book: &Book, list_kind: ListKind) -> Self {
        Self {
            name: book.name.clone(),
            author: book.author.clone(),
            kind: book.kind.clone(),
            cover_url: book.cover_url.clone(),
            intro: book.intro.clone(),
            book_url: book.book_url.clone(),
            latest_chapter_title: book.latest_chapter_title.clone(),
            word_count: book.word_count.clone(),
            update_time: book.update_time.clone(),
            origin: book.origin.clone(),
            origin_name: book.origin_name.clone(),
            book_type: book.book_type,
            list_kind,
            relevance: None,
        }
    }
}

/// Calculates the relevance of a result to a search key.
///
/// An exact title match scores 1.0; otherwise the share of key terms found
/// in the title or author.
#[must_use]
pub fn calculate_relevance_score(book: &SearchBook, key: &str) -> f64 {
    let key = key.trim().to_lowercase();
    if key.is_empty() {
        return 0.0;
    }
    if book.name.trim().to_lowercase() == key {
        return 1.0;
    }

    let terms: HashSet<&str> = key.split_whitespace().collect();
    let haystack = format!("{} {}", book.name, book.author).to_lowercase();
    let matches = terms.iter().filter(|term| haystack.contains(*term)).count();

    #[allow(clippy::cast_precision_loss)]
    let score = matches as f64 / terms.len() as f64;
    // Partial matches never tie with an exact title.
    score * 0.9
}

/// Stable sort by descending relevance.
pub fn sort_by_relevance(books: &mut [SearchBook]) {
    books.sort_by(|a, b| {
        b.relevance
            .unwrap_or(0.0)
            .partial_cmp(&a.relevance.unwrap_or(0.0))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
