//! Test support: a fixture HTTP server, an in-memory fetcher and a fixture
//! source with its pages.

mod fixtures;
mod mocks;
mod server;

pub use fixtures::{
    book_page, chapter_page, fixture_profile, search_page, toc_page, FIXTURE_ORIGIN,
};
pub use mocks::StaticFetcher;
pub use server::{FixtureServer, Route};
