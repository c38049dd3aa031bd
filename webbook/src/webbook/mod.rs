//! The orchestrator: one operation per stage.
//!
//! Every stage comes in two forms. The `*_await` form runs on the caller's
//! task under the caller's token. The task form spawns the same run on a
//! [`TaskScope`] and returns a [`StageTask`] whose outcome is success, error
//! or cancelled. Each run gets its own [`Tracer`].
//!
//! A stage first checks its short-circuits (disabled template, empty content
//! rule, cached bodies), then builds and executes a request, then hands the
//! body to its extractor. Nothing is retried.

mod builder;

pub use builder::WebBookBuilder;

use futures::future::try_join_all;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::debug;

use crate::cancellation::{background_runtime, CancellationToken, StageTask, TaskScope};
use crate::config::WebBookConfig;
use crate::debug::{debug_sink, DebugSink, Tracer};
use crate::errors::{Result, WebBookError};
use crate::extract::{
    analyze_book_info, analyze_book_list, analyze_chapter_page, analyze_content_page, ContentPage, ExtractEnv, PageRef,
    TocPage,
};
use crate::http::{RequestBuilder, RequestContext, RequestExecutor, ResolvedRequest, Response};
use crate::models::{Book, BookChapter, ListKind, SearchBook, SharedBook};
use crate::profile::{non_empty, ExploreKind, SourceProfile};
use crate::rules::RuleCache;
use crate::script::{ScriptEngine, ScriptRunner};
use crate::transform::ContentTransformer;

pub(crate) struct Inner {
    pub(crate) profile: Arc<SourceProfile>,
    pub(crate) config: WebBookConfig,
    pub(crate) executor: RequestExecutor,
    pub(crate) scripts: Arc<dyn ScriptEngine>,
    pub(crate) runner: ScriptRunner,
    pub(crate) cache: Arc<RuleCache>,
    pub(crate) sink: Option<Arc<dyn DebugSink>>,
}

/// Stage operations against one source profile.
///
/// Cheap to clone; clones share the profile, the fetcher and the rule cache.
#[derive(Clone)]
pub struct WebBook {
    inner: Arc<Inner>,
}

impl WebBook {
    /// Creates a handle with default collaborators.
    pub fn new(profile: impl Into<Arc<SourceProfile>>) -> Result<Self> {
        Self::builder(profile).build()
    }

    /// Starts building a handle.
    pub fn builder(profile: impl Into<Arc<SourceProfile>>) -> WebBookBuilder {
        WebBookBuilder::new(profile.into())
    }

    /// The source profile.
    #[must_use]
    pub fn profile(&self) -> &Arc<SourceProfile> {
        &self.inner.profile
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &WebBookConfig {
        &self.inner.config
    }

    /// The compiled-rule cache.
    #[must_use]
    pub fn rule_cache(&self) -> &Arc<RuleCache> {
        &self.inner.cache
    }

    /// The titled explore entries of the profile.
    #[must_use]
    pub fn explore_kinds(&self) -> Vec<ExploreKind> {
        self.inner.profile.explore_kinds()
    }

    // ------------------------------------------------------------------
    // search / explore
    // ------------------------------------------------------------------

    /// Searches the source for `key`.
    ///
    /// Returns an empty list without any request when the profile has no
    /// search template.
    pub async fn search_book_await(
        &self,
        key: &str,
        page: u32,
        token: &Arc<CancellationToken>,
    ) -> Result<Vec<SearchBook>> {
        let tracer = self.tracer("search", token);
        let stage = async {
            let Some(template) = self.inner.profile.search_template() else {
                tracer.log("≡ search is disabled, no search url");
                return Ok(Vec::new());
            };
            tracer.log(format!("︾ searching '{key}', page {page}"));

            let ctx = RequestContext::new(self.inner.profile.source_url.as_str())
                .with_key(key)
                .with_page(page);
            let request = self.request(template, &ctx)?;
            let response = self.inner.executor.execute(&request, None, &tracer).await?;

            let key = key.to_string();
            self.extract(&tracer, response, move |env, body, final_url| {
                analyze_book_list(env, body, final_url, ListKind::Search, Some(&key))
            })
            .await
        };
        self.run_stage(&tracer, stage, |books: &Vec<SearchBook>| {
            format!("◇ search done, {} results", books.len())
        })
        .await
    }

    /// Spawns [`search_book_await`](Self::search_book_await) on `scope`.
    pub fn search_book(&self, key: impl Into<String>, page: u32, scope: &TaskScope) -> StageTask<Vec<SearchBook>> {
        let this = self.clone();
        let key = key.into();
        scope.spawn(move |token| async move { this.search_book_await(&key, page, &token).await })
    }

    /// Lists an explore (catalog) page.
    ///
    /// `url` is an explore template, usually one of
    /// [`explore_kinds`](Self::explore_kinds). A blank template yields an
    /// empty list.
    pub async fn explore_book_await(
        &self,
        url: &str,
        page: u32,
        token: &Arc<CancellationToken>,
    ) -> Result<Vec<SearchBook>> {
        let tracer = self.tracer("explore", token);
        let stage = async {
            if url.trim().is_empty() {
                tracer.log("≡ explore is disabled, no explore url");
                return Ok(Vec::new());
            }
            tracer.log(format!("︾ exploring page {page}"));

            let ctx = RequestContext::new(self.inner.profile.source_url.as_str()).with_page(page);
            let request = self.request(url, &ctx)?;
            let response = self.inner.executor.execute(&request, None, &tracer).await?;

            self.extract(&tracer, response, |env, body, final_url| {
                analyze_book_list(env, body, final_url, ListKind::Explore, None)
            })
            .await
        };
        self.run_stage(&tracer, stage, |books: &Vec<SearchBook>| {
            format!("◇ explore done, {} results", books.len())
        })
        .await
    }

    /// Spawns [`explore_book_await`](Self::explore_book_await) on `scope`.
    pub fn explore_book(&self, url: impl Into<String>, page: u32, scope: &TaskScope) -> StageTask<Vec<SearchBook>> {
        let this = self.clone();
        let url = url.into();
        scope.spawn(move |token| async move { this.explore_book_await(&url, page, &token).await })
    }

    // ------------------------------------------------------------------
    // book info
    // ------------------------------------------------------------------

    /// Fills `book` from its detail page and returns the updated book.
    ///
    /// The cached detail body is used when present; otherwise the book URL
    /// is fetched. The content kind is copied onto the book first.
    pub async fn get_book_info_await(&self, book: &SharedBook, token: &Arc<CancellationToken>) -> Result<Book> {
        let tracer = self.tracer("info", token);
        let stage = async {
            let snapshot = self.stamp_kind(book);
            tracer.log(format!("︾ book info of {}", snapshot.book_url));

            let response = match snapshot.cached_info_html() {
                Some(html) => {
                    tracer.log("≡ using the cached detail page");
                    Response::new(html, snapshot.book_url.as_str())
                }
                None => {
                    let ctx = RequestContext::new(self.inner.profile.source_url.as_str()).with_book(&snapshot);
                    let request = self.request(&snapshot.book_url, &ctx)?;
                    self.inner.executor.execute(&request, None, &tracer).await?
                }
            };

            let updated = self
                .extract(&tracer, response, move |env, body, final_url| {
                    let mut updated = snapshot;
                    analyze_book_info(env, &mut updated, body, final_url)?;
                    Ok(updated)
                })
                .await?;

            Ok(book.update(|b| {
                b.apply_info(&updated);
                b.clone()
            }))
        };
        self.run_stage(&tracer, stage, |b: &Book| format!("◇ book info done, '{}'", b.name))
            .await
    }

    /// Spawns [`get_book_info_await`](Self::get_book_info_await) on `scope`.
    pub fn get_book_info(&self, book: &SharedBook, scope: &TaskScope) -> StageTask<Book> {
        let this = self.clone();
        let book = book.clone();
        scope.spawn(move |token| async move { this.get_book_info_await(&book, &token).await })
    }

    // ------------------------------------------------------------------
    // table of contents
    // ------------------------------------------------------------------

    /// Builds the table of contents of `book`.
    ///
    /// When the toc page is the book page and its body is cached, no request
    /// is made for the first page. Further pages are fetched concurrently,
    /// each at most once, up to the configured page limit. Chapters are
    /// de-duplicated on (url, title) and indexed from 0. Relative toc URLs
    /// resolve against the book URL.
    pub async fn get_chapter_list_await(
        &self,
        book: &SharedBook,
        token: &Arc<CancellationToken>,
    ) -> Result<Vec<BookChapter>> {
        let tracer = self.tracer("toc", token);
        let stage = async {
            let snapshot = self.stamp_kind(book);
            let toc_url = snapshot.effective_toc_url().to_string();
            tracer.log(format!("︾ toc of {toc_url}"));

            let first = match snapshot.cached_toc_html() {
                Some(html) if toc_url == snapshot.book_url => {
                    tracer.log("≡ toc page is the book page, using the cached body");
                    Response::new(html, toc_url.as_str())
                }
                _ => self.fetch_page(&toc_url, &snapshot, &tracer).await?,
            };

            let mut visited = HashSet::from([toc_url.clone(), first.final_url.clone()]);
            let page = self.toc_page(&tracer, &snapshot, first).await?;
            let reverse = page.reverse;
            let mut chapters = page.chapters;
            let mut pending = page.next_pages;
            let mut pages = 1;

            while !pending.is_empty() {
                let budget = self.inner.config.pipeline.max_toc_pages.saturating_sub(pages);
                if budget == 0 {
                    tracer.log(format!("≡ stopped after {pages} toc pages"));
                    break;
                }

                let mut batch = Vec::new();
                for next in pending.drain(..) {
                    if batch.len() == budget {
                        break;
                    }
                    let url = match &next {
                        PageRef::Fetch(url) => url.clone(),
                        PageRef::ReuseParentBody => snapshot.book_url.clone(),
                    };
                    if visited.insert(url) {
                        batch.push(next);
                    }
                }
                pages += batch.len();

                let responses = try_join_all(batch.iter().map(|next| self.resolve_page(next, &snapshot, &tracer))).await?;
                for response in responses {
                    visited.insert(response.final_url.clone());
                    let page = self.toc_page(&tracer, &snapshot, response).await?;
                    chapters.extend(page.chapters);
                    pending.extend(page.next_pages);
                }
            }

            Ok(finish_toc(chapters, reverse))
        };
        self.run_stage(&tracer, stage, |chapters: &Vec<BookChapter>| {
            format!("◇ toc done, {} chapters", chapters.len())
        })
        .await
    }

    /// Spawns [`get_chapter_list_await`](Self::get_chapter_list_await) on `scope`.
    pub fn get_chapter_list(&self, book: &SharedBook, scope: &TaskScope) -> StageTask<Vec<BookChapter>> {
        let this = self.clone();
        let book = book.clone();
        scope.spawn(move |token| async move { this.get_chapter_list_await(&book, &token).await })
    }

    async fn toc_page(&self, tracer: &Tracer, book: &Book, response: Response) -> Result<TocPage> {
        let book = book.clone();
        self.extract(tracer, response, move |env, body, final_url| {
            analyze_chapter_page(env, &book, body, final_url)
        })
        .await
    }

    async fn resolve_page(&self, page: &PageRef, book: &Book, tracer: &Tracer) -> Result<Response> {
        match page {
            PageRef::Fetch(url) => self.fetch_page(url, book, tracer).await,
            PageRef::ReuseParentBody => match book.cached_toc_html().or_else(|| book.cached_info_html()) {
                Some(html) => {
                    tracer.log("≡ next toc page is the book page, using the cached body");
                    Ok(Response::new(html, book.book_url.as_str()))
                }
                None => self.fetch_page(&book.book_url, book, tracer).await,
            },
        }
    }

    // ------------------------------------------------------------------
    // content
    // ------------------------------------------------------------------

    /// Reads the content of `chapter`.
    ///
    /// With an empty content rule the chapter URL is the content and nothing
    /// is fetched. A chapter living on the book page reuses the cached toc
    /// body. Content pages are followed until `next_chapter_url` or the page
    /// limit; every fetched page goes through the content transformer.
    /// Relative chapter URLs resolve against the book's toc URL.
    pub async fn get_content_await(
        &self,
        book: &SharedBook,
        chapter: &BookChapter,
        next_chapter_url: Option<&str>,
        token: &Arc<CancellationToken>,
    ) -> Result<String> {
        let tracer = self.tracer("content", token);
        let stage = async {
            let rule = &self.inner.profile.rule_content;
            if non_empty(rule.content.as_deref()).is_none() {
                tracer.log(format!("⇒ content rule is empty, the chapter url is the content: {}", chapter.url));
                return Ok(chapter.url.clone());
            }
            tracer.log(format!("︾ content of '{}'", chapter.title));

            let snapshot = book.snapshot();
            let transformer = ContentTransformer::new(
                self.inner.runner.clone(),
                self.inner.profile.source_url.as_str(),
            )
            .with_script(rule.web_js.as_deref())
            .with_source_regex(rule.source_regex.as_deref())?;

            let first = match snapshot.cached_toc_html() {
                Some(html) if chapter.url == snapshot.book_url => {
                    tracer.log("≡ chapter is the book page, using the cached toc body");
                    Response::new(html, chapter.url.as_str())
                }
                _ => {
                    let ctx = RequestContext::new(snapshot.effective_toc_url()).with_book(&snapshot);
                    let request = self.request(&chapter.url, &ctx)?;
                    self.inner.executor.execute(&request, Some(&transformer), &tracer).await?
                }
            };

            let mut visited = HashSet::from([chapter.url.clone(), first.final_url.clone()]);
            let page = self.content_page(&tracer, first, next_chapter_url).await?;
            let mut parts = vec![page.content];
            let max_pages = self.inner.config.pipeline.max_content_pages;

            match page.next_pages.len() {
                0 => {}
                1 => {
                    // Single next link: follow it page by page.
                    let mut next = page.next_pages.into_iter().next();
                    while let Some(url) = next.take() {
                        if parts.len() >= max_pages {
                            tracer.log(format!("≡ stopped after {max_pages} content pages"));
                            break;
                        }
                        if !visited.insert(url.clone()) {
                            break;
                        }
                        let response = self.fetch_content_page(&url, &snapshot, &transformer, &tracer).await?;
                        visited.insert(response.final_url.clone());
                        let page = self.content_page(&tracer, response, next_chapter_url).await?;
                        parts.push(page.content);
                        next = page.next_pages.into_iter().next();
                    }
                }
                _ => {
                    // A page listing every part: fetch them all at once.
                    let urls: Vec<String> = page
                        .next_pages
                        .into_iter()
                        .filter(|u| visited.insert(u.clone()))
                        .take(max_pages.saturating_sub(1))
                        .collect();
                    let responses = try_join_all(
                        urls.iter()
                            .map(|url| self.fetch_content_page(url, &snapshot, &transformer, &tracer)),
                    )
                    .await?;
                    for response in responses {
                        let page = self.content_page(&tracer, response, next_chapter_url).await?;
                        parts.push(page.content);
                    }
                }
            }

            let content = parts
                .into_iter()
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            if content.is_empty() {
                return Err(WebBookError::no_content(format!("no content extracted from {}", chapter.url)));
            }
            Ok(content)
        };
        self.run_stage(&tracer, stage, |content: &String| {
            format!("◇ content done, {} chars", content.chars().count())
        })
        .await
    }

    /// Spawns [`get_content_await`](Self::get_content_await) on `scope`.
    pub fn get_content(
        &self,
        book: &SharedBook,
        chapter: &BookChapter,
        next_chapter_url: Option<String>,
        scope: &TaskScope,
    ) -> StageTask<String> {
        let this = self.clone();
        let book = book.clone();
        let chapter = chapter.clone();
        scope.spawn(move |token| async move {
            this.get_content_await(&book, &chapter, next_chapter_url.as_deref(), &token)
                .await
        })
    }

    /// Blocking twin of [`get_content_await`](Self::get_content_await).
    ///
    /// Drives the run on the shared background runtime from the calling
    /// thread. Calling it from inside a tokio runtime returns
    /// [`WebBookError::BlockingInAsyncContext`].
    pub fn get_content_blocking(
        &self,
        book: &SharedBook,
        chapter: &BookChapter,
        next_chapter_url: Option<&str>,
        token: &Arc<CancellationToken>,
    ) -> Result<String> {
        if Handle::try_current().is_ok() {
            return Err(WebBookError::BlockingInAsyncContext);
        }
        let runtime = background_runtime(self.inner.config.pipeline.io_workers)?;
        runtime.block_on(self.get_content_await(book, chapter, next_chapter_url, token))
    }

    async fn content_page(
        &self,
        tracer: &Tracer,
        response: Response,
        next_chapter_url: Option<&str>,
    ) -> Result<ContentPage> {
        let next_chapter_url = next_chapter_url.map(str::to_string);
        self.extract(tracer, response, move |env, body, final_url| {
            analyze_content_page(env, body, final_url, next_chapter_url.as_deref())
        })
        .await
    }

    async fn fetch_content_page(
        &self,
        url: &str,
        book: &Book,
        transformer: &ContentTransformer,
        tracer: &Tracer,
    ) -> Result<Response> {
        let ctx = RequestContext::new(book.effective_toc_url()).with_book(book);
        let request = self.request(url, &ctx)?;
        self.inner.executor.execute(&request, Some(transformer), tracer).await
    }

    // ------------------------------------------------------------------
    // plumbing
    // ------------------------------------------------------------------

    fn tracer(&self, stage: &'static str, token: &Arc<CancellationToken>) -> Tracer {
        let sink = self.inner.sink.clone().unwrap_or_else(debug_sink);
        Tracer::new(self.inner.profile.source_url.as_str(), stage, sink, Arc::clone(token))
    }

    fn request(&self, template: &str, ctx: &RequestContext) -> Result<ResolvedRequest> {
        Ok(RequestBuilder::new(&self.inner.profile, &self.inner.config.fetch).build(template, ctx)?)
    }

    /// Fetches a toc page; relative URLs resolve against the book page.
    async fn fetch_page(&self, url: &str, book: &Book, tracer: &Tracer) -> Result<Response> {
        let ctx = RequestContext::new(book.book_url.as_str()).with_book(book);
        let request = self.request(url, &ctx)?;
        self.inner.executor.execute(&request, None, tracer).await
    }

    /// Copies the profile's content kind onto the book and returns a snapshot.
    fn stamp_kind(&self, book: &SharedBook) -> Book {
        let kind = self.inner.profile.source_type;
        book.update(|b| {
            b.book_type = kind;
            b.clone()
        })
    }

    /// Runs an extractor, on the blocking pool when the body is large.
    async fn extract<T, F>(&self, tracer: &Tracer, response: Response, extractor: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&ExtractEnv, &str, &str) -> Result<T> + Send + 'static,
    {
        let env = ExtractEnv::new(
            Arc::clone(&self.inner.profile),
            Arc::clone(&self.inner.cache),
            Arc::clone(&self.inner.scripts),
            tracer.clone(),
            self.inner.config.pipeline.clone(),
        );
        if response.body.len() <= self.inner.config.pipeline.inline_extraction_limit {
            return extractor(&env, &response.body, &response.final_url);
        }

        debug!(bytes = response.body.len(), url = %response.final_url, "extracting on the blocking pool");
        tokio::task::spawn_blocking(move || extractor(&env, &response.body, &response.final_url))
            .await
            .map_err(|e| WebBookError::Internal(format!("extraction worker failed: {e}")))?
    }

    /// Races `stage` against the run token and writes the terminal trace line.
    async fn run_stage<T, Fut>(&self, tracer: &Tracer, stage: Fut, summary: impl FnOnce(&T) -> String) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let token = Arc::clone(tracer.token());
        let result = tokio::select! {
            biased;
            () = token.cancelled() => Err(cancelled(&token)),
            result = stage => result,
        };
        let result = match result {
            Ok(_) if token.is_cancelled() => Err(cancelled(&token)),
            other => other,
        };

        match &result {
            Ok(value) => tracer.completed(summary(value)),
            Err(WebBookError::Cancelled(_)) => {}
            Err(e) => {
                debug!(source = %self.inner.profile.source_url, error = %e, "stage failed");
                tracer.failed(e);
            }
        }
        result
    }
}

fn cancelled(token: &CancellationToken) -> WebBookError {
    WebBookError::Cancelled(token.reason().unwrap_or_default())
}

/// De-duplicates on (url, title), applies the reverse flag and re-indexes.
fn finish_toc(chapters: Vec<BookChapter>, reverse: bool) -> Vec<BookChapter> {
    let mut seen = HashSet::new();
    let mut chapters: Vec<BookChapter> = chapters
        .into_iter()
        .filter(|c| seen.insert((c.url.clone(), c.title.clone())))
        .collect();
    if reverse {
        chapters.reverse();
    }
    for (index, chapter) in chapters.iter_mut().enumerate() {
        chapter.index = index;
    }
    chapters
}

impl std::fmt::Debug for WebBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebBook")
            .field("source", &self.inner.profile.source_url)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
