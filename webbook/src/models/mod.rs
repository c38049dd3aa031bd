//! Data models handed to and returned by the stage operations.
//!
//! - [`Book`] / [`SharedBook`]: the item a source describes, with its cached raw bodies
//! - [`BookChapter`]: one table-of-contents entry
//! - [`SearchBook`]: one search or explore result

mod book;
mod chapter;
mod search_book;

pub use book::{Book, SharedBook, SourceType};
pub use chapter::BookChapter;
pub use search_book::{calculate_relevance_score, sort_by_relevance, ListKind, SearchBook};
