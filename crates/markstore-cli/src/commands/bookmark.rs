//! Bookmark command handlers

use anyhow::Result;
use clap::Args;

use markstore_core::{AddRequest, RefreshOptions, Selection, Store, TagEdit, UpdateRequest};

use super::{transfer, CaptureArgs, NetworkArgs};
use crate::output::Output;
use crate::prompt::confirm;

#[derive(Args, Debug)]
pub struct AddArgs {
    /// URL to bookmark
    pub url: String,

    /// Comma-separated tags (repeatable)
    #[arg(short, long = "tag", value_name = "TAGS")]
    pub tags: Vec<String>,

    /// Title to use instead of the fetched one
    #[arg(long)]
    pub title: Option<String>,

    /// Description to use instead of the fetched one
    #[arg(short, long)]
    pub comment: Option<String>,

    /// Never refetch the title of this bookmark
    #[arg(long)]
    pub immutable: bool,

    /// Do not fetch the page
    #[arg(long)]
    pub offline: bool,

    #[command(flatten)]
    pub network: NetworkArgs,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Indices to update, e.g. "3", "1-5" or "2,4"; all when omitted
    pub indices: Vec<String>,

    /// New URL (single index only); fetches the page unless --title is given
    #[arg(long)]
    pub url: Option<String>,

    /// New title; an empty value clears it
    #[arg(long)]
    pub title: Option<String>,

    /// Tags: "a,b" replaces, "+a,b" appends, "-a,b" removes
    #[arg(short, long, allow_hyphen_values = true, value_name = "TAGS")]
    pub tag: Option<String>,

    /// New description
    #[arg(short, long)]
    pub comment: Option<String>,

    /// Lock or unlock the title against refreshes
    #[arg(long, value_name = "BOOL")]
    pub immutable: Option<bool>,

    /// Worker threads for network refresh
    #[arg(long)]
    pub threads: Option<usize>,

    #[command(flatten)]
    pub network: NetworkArgs,

    #[command(flatten)]
    pub capture: CaptureArgs,
}

#[derive(Args, Debug)]
pub struct RefreshArgs {
    /// Indices to refresh; all when omitted
    pub indices: Vec<String>,

    /// Worker threads
    #[arg(long)]
    pub threads: Option<usize>,

    /// Leave titles and descriptions alone (status checks only)
    #[arg(long)]
    pub no_title: bool,

    #[command(flatten)]
    pub network: NetworkArgs,

    #[command(flatten)]
    pub capture: CaptureArgs,
}

/// Add a bookmark
pub fn add(store: &Store, args: AddArgs, output: &Output) -> Result<()> {
    let request = AddRequest {
        url: args.url,
        title: args.title,
        tags: args.tags.join(","),
        description: args.comment,
        immutable: args.immutable,
        offline: args.offline,
        url_redirect: args.network.url_redirect,
        tag_redirect: args.network.tag_redirect(),
        tag_error: args.network.tag_error(),
        del_error: args.network.del_error()?,
    };

    let id = store.add(&request)?;

    output.success(&format!("Added bookmark {}", id));
    if let Some(bm) = store.get(id)? {
        output.print_bookmark(&bm);
    }
    Ok(())
}

/// Update bookmarks, refreshing from the network where asked
pub fn update(store: &Store, args: UpdateArgs, yes: bool, output: &Output) -> Result<()> {
    let selection = Selection::parse(&args.indices)?;
    let request = UpdateRequest {
        url: args.url,
        title: args.title,
        tags: args.tag.as_deref().map(TagEdit::parse).transpose()?,
        description: args.comment,
        immutable: args.immutable,
        threads: args
            .threads
            .unwrap_or_else(|| store.config().worker_threads()),
        url_redirect: args.network.url_redirect,
        tag_redirect: args.network.tag_redirect(),
        tag_error: args.network.tag_error(),
        del_error: args.network.del_error()?,
        export_on: args.capture.export_on()?,
    };

    if selection == Selection::All && !request.fetch_title() && !yes && output.should_prompt() {
        if !confirm("Update ALL bookmarks?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let outcome = store.update(&selection, &request)?;

    if let Some(report) = &outcome.refresh {
        output.print_refresh_report(report);
    }
    if !outcome.deleted.is_empty() {
        output.message(&format!("Deleted {} bookmark(s) on error", outcome.deleted.len()));
    }
    if outcome.updated > 0 || outcome.tags_modified {
        output.success("Bookmarks updated");
        if selection != Selection::All {
            output.print_bookmarks(&store.get_selection(&selection)?);
        }
    }

    if let Some(file) = &args.capture.export {
        transfer::export_capture(store, file, &outcome.capture, yes, output)?;
    }
    Ok(())
}

/// Refresh titles, descriptions and status tags from the network
pub fn refresh(store: &Store, args: RefreshArgs, yes: bool, output: &Output) -> Result<()> {
    let selection = Selection::parse(&args.indices)?;
    let options = RefreshOptions {
        threads: args
            .threads
            .unwrap_or_else(|| store.config().worker_threads()),
        url_redirect: args.network.url_redirect,
        tag_redirect: args.network.tag_redirect(),
        tag_error: args.network.tag_error(),
        del_error: args.network.del_error()?,
        export_on: args.capture.export_on()?,
        update_title: !args.no_title,
        ..Default::default()
    };

    let report = store.refresh(&selection, &options)?;
    output.print_refresh_report(&report);

    if let Some(file) = &args.capture.export {
        transfer::export_capture(store, file, &report.capture, yes, output)?;
    }
    Ok(())
}

/// Delete bookmarks; ids above the deleted ones move down to close gaps
pub fn delete(store: &Store, indices: &[String], yes: bool, output: &Output) -> Result<()> {
    let selection = Selection::parse(indices)?;

    // Confirm deletion
    if !yes && output.should_prompt() {
        let prompt = match &selection {
            Selection::All => "Delete ALL bookmarks?".to_string(),
            Selection::One(id) => match store.get(*id)? {
                Some(bm) => {
                    output.print_bookmark(&bm);
                    "Delete this bookmark?".to_string()
                }
                None => anyhow::bail!("No bookmark at index {}", id),
            },
            Selection::Range { low, high } => format!("Delete bookmarks {}-{}?", low, high),
            Selection::Set(_) => format!("Delete bookmarks {}?", indices.join(",")),
        };
        if !confirm(&prompt)? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let count = store.delete(&selection)?;
    output.success(&format!("Deleted {} bookmark(s)", count));
    Ok(())
}

/// Print bookmarks by index
pub fn print(store: &Store, indices: &[String], output: &Output) -> Result<()> {
    let selection = Selection::parse(indices)?;
    let bookmarks = store.get_selection(&selection)?;

    match (&selection, bookmarks.as_slice()) {
        (Selection::One(id), []) => anyhow::bail!("No bookmark at index {}", id),
        (Selection::One(_), [bm]) => output.print_bookmark(bm),
        _ => output.print_bookmarks(&bookmarks),
    }
    Ok(())
}
