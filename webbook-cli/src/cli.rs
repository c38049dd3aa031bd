use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Source profile (JSON).
    #[arg(long, global = true, default_value = "source.json")]
    pub source: PathBuf,

    /// Pipeline configuration (JSON). Defaults apply when omitted.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print every trace line, not only stage results.
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search the source.
    Search {
        /// Search key.
        key: String,

        /// Result page, from 1.
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// List the explore categories of the source.
    Kinds,
    /// Browse one explore category.
    Explore {
        /// Category title, or its index in `kinds`.
        kind: String,

        /// Result page, from 1.
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Read the detail page of a book.
    Info(BookArgs),
    /// Read the table of contents of a book.
    Toc(BookArgs),
    /// Read one chapter of a book.
    Content {
        #[command(flatten)]
        book: BookArgs,

        /// Chapter index in the table of contents.
        #[arg(long, default_value_t = 0)]
        chapter: usize,
    },
}

#[derive(Debug, Args)]
pub struct BookArgs {
    /// Book detail URL.
    pub book_url: String,
}
