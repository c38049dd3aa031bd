//! # Webbook
//!
//! A rule-driven fetch-and-extract pipeline for declarative web content
//! sources.
//!
//! A [`SourceProfile`](profile::SourceProfile) describes how to reach one
//! site: URL templates for search and explore, and extraction rules for each
//! page kind. [`WebBook`](webbook::WebBook) runs the four stages against it:
//!
//! - **search / explore**: build the list request, extract [`SearchBook`](models::SearchBook)s
//! - **book info**: fill a [`Book`](models::Book) from its detail page
//! - **table of contents**: follow toc pages, collect [`BookChapter`](models::BookChapter)s
//! - **content**: follow content pages, join the chapter text
//!
//! Every stage is cancellable and reports its progress as
//! [`TraceLine`](debug::TraceLine)s on a debug sink.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use webbook::prelude::*;
//!
//! let profile = SourceProfile::from_path("source.json")?;
//! let wb = WebBook::new(profile)?;
//! let token = Arc::new(CancellationToken::new());
//!
//! let results = wb.search_book_await("dune", 1, &token).await?;
//! let book = SharedBook::new(results[0].to_book());
//! wb.get_book_info_await(&book, &token).await?;
//! let chapters = wb.get_chapter_list_await(&book, &token).await?;
//! let text = wb.get_content_await(&book, &chapters[0], None, &token).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod debug;
pub mod errors;
pub mod extract;
pub mod http;
pub mod models;
pub mod profile;
pub mod rules;
pub mod script;
pub mod transform;
pub mod webbook;

#[cfg(test)]
pub(crate) mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancellationToken, StageTask, TaskOutcome, TaskScope};
    pub use crate::config::{FetchConfig, PipelineConfig, ScriptConfig, WebBookConfig};
    pub use crate::debug::{
        set_debug_sink, CollectingDebugSink, DebugSink, LoggingDebugSink, TraceKind, TraceLine,
    };
    pub use crate::errors::{ErrorKind, Result, WebBookError};
    pub use crate::http::{Fetcher, ReqwestFetcher, Response};
    pub use crate::models::{Book, BookChapter, ListKind, SearchBook, SharedBook, SourceType};
    pub use crate::profile::{ExploreKind, SourceProfile};
    pub use crate::script::ScriptEngine;
    pub use crate::webbook::{WebBook, WebBookBuilder};
    pub use std::sync::Arc;
}
