use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What kind of content a source serves. Copied onto every [`Book`] it touches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Text chapters.
    #[default]
    Text,
    /// Audio chapters.
    Audio,
    /// Image (comic) chapters.
    Image,
    /// Downloadable files.
    File,
}

/// A book (or document) as known to the pipeline.
///
/// `info_html` and `toc_html` are raw bodies cached by earlier stages. A
/// non-empty `info_html` skips the info fetch; a non-empty `toc_html` is
/// reused when the toc page or a chapter page is the book page itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Book {
    /// Detail page URL.
    pub book_url: String,
    /// Table-of-contents URL.
    pub toc_url: String,
    /// Source origin (the profile's `source_url`).
    pub origin: String,
    /// Display name of the source.
    pub origin_name: String,
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
    /// Title of the newest chapter.
    pub latest_chapter_title: String,
    /// Word count text as published by the source.
    pub word_count: String,
    /// Last update text as published by the source.
    pub update_time: String,
    /// Content kind tag copied from the source profile.
    pub book_type: SourceType,
    /// Cached detail page body.
    pub info_html: Option<String>,
    /// Cached table-of-contents body.
    pub toc_html: Option<String>,
}

impl Book {
    /// Creates a book for a detail page URL of a source.
    #[must_use]
    pub fn new(book_url: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            book_url: book_url.into(),
            origin: origin.into(),
            ..Default::default()
        }
    }

    /// The cached detail body, if any and non-empty.
    #[must_use]
    pub fn cached_info_html(&self) -> Option<&str> {
        self.info_html.as_deref().filter(|s| !s.is_empty())
    }

    /// The cached toc body, if any and non-empty.
    #[must_use]
    pub fn cached_toc_html(&self) -> Option<&str> {
        self.toc_html.as_deref().filter(|s| !s.is_empty())
    }

    /// The toc URL, falling back to the book URL when unset.
    #[must_use]
    pub fn effective_toc_url(&self) -> &str {
        if self.toc_url.is_empty() {
            &self.book_url
        } else {
            &self.toc_url
        }
    }

    /// Copies the fields owned by the info stage from `other`.
    pub fn apply_info(&mut self, other: &Self) {
        self.name.clone_from(&other.name);
        self.author.clone_from(&other.author);
        self.kind.clone_from(&other.kind);
        self.cover_url.clone_from(&other.cover_url);
        self.intro.clone_from(&other.intro);
        self.latest_chapter_title.clone_from(&other.latest_chapter_title);
        self.word_count.clone_from(&other.word_count);
        self.update_time.clone_from(&other.update_time);
        self.toc_url.clone_from(&other.toc_url);
        self.book_type = other.book_type;
        if other.toc_html.is_some() {
            self.toc_html.clone_from(&other.toc_html);
        }
    }
}

/// A [`Book`] shared between concurrent stage calls.
///
/// Stages read one [`snapshot`](Self::snapshot) and write back with a single
/// [`update`](Self::update), so readers never see a half-applied stage.
#[derive(Debug, Clone, Default)]
pub struct SharedBook {
    inner: Arc<RwLock<Book>>,
}

impl SharedBook {
    /// Wraps a book.
    #[must_use]
    pub fn new(book: Book) -> Self {
        Self {
            inner: Arc::new(RwLock::new(book)),
        }
    }

    /// Returns a consistent copy of the book.
    #[must_use]
    pub fn snapshot(&self) -> Book {
        self.inner.read().clone()
    }

    /// Mutates the book under the write lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut Book) -> R) -> R {
        f(&mut self.inner.write())
    }
}

impl From<Book> for SharedBook {
    fn from(book: Book) -> Self {
        Self::new(book)
    }
}
