//! Search command handlers

use anyhow::Result;
use clap::Args;

use markstore_core::{SearchMode, Store};

use crate::output::Output;

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Keywords matched against url, title, tags and description
    #[arg(required = true)]
    pub keywords: Vec<String>,

    /// Require every keyword ("blank" and "immutable" are special here)
    #[arg(long, conflicts_with = "regex")]
    pub all: bool,

    /// Treat keywords as case-insensitive regular expressions
    #[arg(long)]
    pub regex: bool,

    /// Match substrings instead of whole words
    #[arg(long)]
    pub deep: bool,

    /// Only keep results matching this tag expression
    #[arg(long, value_name = "EXPR", allow_hyphen_values = true)]
    pub stag: Option<String>,

    /// Drop results matching any of these keywords
    #[arg(long, value_name = "KEYWORD", num_args = 1..)]
    pub exclude: Vec<String>,
}

impl SearchArgs {
    fn mode(&self) -> SearchMode {
        if self.regex {
            SearchMode::Regex
        } else if self.all {
            SearchMode::All
        } else {
            SearchMode::Any
        }
    }
}

/// Keyword search
pub fn search(store: &Store, args: SearchArgs, output: &Output) -> Result<()> {
    let mode = args.mode();
    let mut results = match &args.stag {
        Some(expr) => store.search_with_tags(&args.keywords, mode, args.deep, expr)?,
        None => store.search(&args.keywords, mode, args.deep)?,
    };
    if !args.exclude.is_empty() {
        results = store.exclude(results, &args.exclude, args.deep)?;
    }

    output.print_bookmarks(&results);
    Ok(())
}

/// Tag search; without an expression, list the tags instead
pub fn stag(store: &Store, expr: &[String], output: &Output) -> Result<()> {
    if expr.is_empty() {
        return super::tag::list(store, output);
    }

    let results = store.search_by_tag(&expr.join(" "))?;
    output.print_bookmarks(&results);
    Ok(())
}
