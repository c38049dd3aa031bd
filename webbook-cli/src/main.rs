//! Runs the stages of one source profile from the command line.
//!
//! Results go to stdout as JSON; trace lines and logs go to stderr.

mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context as _};
use clap::Parser as _;
use serde::Serialize;
use tracing::Level;

use webbook::prelude::*;

use crate::cli::{Cli, Command, SourceArgs};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    init_logging().context("init logging")?;

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    let wb = open(&cli.source).context("open source")?;
    let scope = TaskScope::current().context("task scope")?;

    let interrupt = scope.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel("interrupted");
        }
    });

    match cli.command {
        Command::Search { key, page } => {
            let books = wb.search_book(key, page, &scope).outcome().await.into_result().context("search")?;
            print_json(&books)?;
        }
        Command::Kinds => {
            print_json(&wb.explore_kinds())?;
        }
        Command::Explore { kind, page } => {
            let kinds = wb.explore_kinds();
            let selected = kind
                .parse::<usize>()
                .ok()
                .and_then(|i| kinds.get(i))
                .or_else(|| kinds.iter().find(|k| k.title == kind))
                .ok_or_else(|| anyhow!("no explore kind '{kind}'"))?;
            let books = wb
                .explore_book(selected.url.clone(), page, &scope)
                .outcome()
                .await
                .into_result()
                .context("explore")?;
            print_json(&books)?;
        }
        Command::Info(args) => {
            let book = SharedBook::new(Book::new(args.book_url, wb.profile().source_url.as_str()));
            let info = wb.get_book_info(&book, &scope).outcome().await.into_result().context("book info")?;
            print_json(&info)?;
        }
        Command::Toc(args) => {
            let book = SharedBook::new(Book::new(args.book_url, wb.profile().source_url.as_str()));
            let chapters = chapters(&wb, &book, &scope).await?;
            print_json(&chapters)?;
        }
        Command::Content { book, chapter } => {
            let book = SharedBook::new(Book::new(book.book_url, wb.profile().source_url.as_str()));
            let chapters = chapters(&wb, &book, &scope).await?;
            let Some(current) = chapters.get(chapter) else {
                bail!("chapter {chapter} out of range, the book has {} chapters", chapters.len());
            };
            let next = chapters.get(chapter + 1).map(|c| c.url.clone());
            let content = wb
                .get_content(&book, current, next, &scope)
                .outcome()
                .await
                .into_result()
                .context("content")?;
            println!("{content}");
        }
    }

    Ok(())
}

fn init_logging() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
        .context("build log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}

fn open(args: &SourceArgs) -> anyhow::Result<WebBook> {
    let profile = SourceProfile::from_path(&args.source)
        .with_context(|| format!("read profile {}", args.source.display()))?;
    let config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
            WebBookConfig::from_json(&json)?
        }
        None => WebBookConfig::default(),
    };
    // Trace lines below the default filter unless asked for.
    let level = if args.verbose { Level::INFO } else { Level::DEBUG };

    Ok(WebBook::builder(profile)
        .config(config)
        .debug_sink(Arc::new(LoggingDebugSink::new(level)))
        .build()?)
}

/// Reads the detail page, then the table of contents.
async fn chapters(wb: &WebBook, book: &SharedBook, scope: &TaskScope) -> anyhow::Result<Vec<BookChapter>> {
    wb.get_book_info(book, scope).outcome().await.into_result().context("book info")?;
    wb.get_chapter_list(book, scope)
        .outcome()
        .await
        .into_result()
        .context("toc")
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{json}");
    Ok(())
}
