use serde::{Deserialize, Serialize};

/// One entry of a table of contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookChapter {
    /// Chapter URL (absolute).
    pub url: String,
    /// Chapter title.
    pub title: String,
    /// Position in the table of contents, starting at 0.
    pub index: usize,
    /// URL of the owning book.
    pub book_url: String,
    /// Whether the entry is a volume heading rather than a readable chapter.
    pub is_volume: bool,
    /// Update time text, if the source publishes one.
    pub update_time: String,
}

impl BookChapter {
    /// Creates a chapter of a book.
    #[must_use]
    pub fn new(url: impl Into<String>, title: impl Into<String>, book_url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            book_url: book_url.into(),
            ..Default::default()
        }
    }

    /// Sets the index.
    #[must_use]
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }
}
