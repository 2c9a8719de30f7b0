//! markstore CLI
//!
//! Command-line interface for markstore - a tagged bookmark store.

use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use markstore_core::{CancellationToken, Config, Store, StoreError};

mod commands;
mod output;
mod prompt;

use commands::bookmark::{AddArgs, RefreshArgs, UpdateArgs};
use commands::search::SearchArgs;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "markstore")]
#[command(about = "markstore - Tagged bookmarks in a local SQLite database")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use this database file instead of the configured one
    #[arg(long, value_name = "PATH", global = true)]
    db: Option<PathBuf>,

    /// Answer yes to every confirmation
    #[arg(short, long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a bookmark
    Add(AddArgs),
    /// Update bookmarks or refresh them from the network
    Update(UpdateArgs),
    /// Delete bookmarks
    #[command(alias = "rm")]
    Delete {
        /// Indices to delete, e.g. "3", "1-5" or "2,4"; all when omitted
        indices: Vec<String>,
    },
    /// Print bookmarks
    #[command(alias = "ls")]
    Print {
        /// Indices to print; all when omitted
        indices: Vec<String>,
    },
    /// Search by keyword
    Search(SearchArgs),
    /// Search by tag: "a, b" matches any, "a + b" matches all, "- c" excludes
    Stag {
        /// Tag expression; lists tags when omitted
        #[arg(allow_hyphen_values = true)]
        expr: Vec<String>,
    },
    /// List all tags
    Tags,
    /// Rename a tag everywhere, or remove it when no replacement is given
    ReplaceTag {
        /// Tag to replace
        old: String,
        /// Replacement tags
        new: Vec<String>,
    },
    /// Refresh titles and check links
    Refresh(RefreshArgs),
    /// Import bookmarks from a JSON file or another database
    Import {
        /// File to import (.json or .db)
        file: PathBuf,
        /// Tag imported bookmarks with the import date
        #[arg(long)]
        auto_tag: bool,
        /// Add tags to bookmarks that already exist
        #[arg(long)]
        append_tags: bool,
    },
    /// Export bookmarks to a JSON file or a new database
    Export {
        /// Destination file (.json or .db)
        file: PathBuf,
        /// Indices to export; all when omitted
        indices: Vec<String>,
    },
    /// Show database status
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, db_file, threads, log_file, user_agent, timeout_secs, proxy, max_redirects)
        key: String,
        /// Configuration value; "none" clears optional keys
        value: String,
    },
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    if let Err(e) = run(cli, &output) {
        eprintln!("Error: {:#}", e);
        if let Some(hint) = e
            .downcast_ref::<StoreError>()
            .and_then(StoreError::recovery_suggestion)
        {
            eprintln!("Hint: {}", hint);
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli, output: &Output) -> Result<()> {
    // Config commands don't need the store
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), output);
    }

    let mut config = Config::load()?;
    if let Some(db) = cli.db {
        config.db_file = Some(db);
    }
    init_logging(cli.verbose, &config);

    let store = Store::open_with_config(config)?;
    install_interrupt_handler(store.cancel_token());

    let yes = cli.yes;
    match cli.command {
        Commands::Add(args) => commands::bookmark::add(&store, args, output),
        Commands::Update(args) => commands::bookmark::update(&store, args, yes, output),
        Commands::Delete { indices } => commands::bookmark::delete(&store, &indices, yes, output),
        Commands::Print { indices } => commands::bookmark::print(&store, &indices, output),
        Commands::Search(args) => commands::search::search(&store, args, output),
        Commands::Stag { expr } => commands::search::stag(&store, &expr, output),
        Commands::Tags => commands::tag::list(&store, output),
        Commands::ReplaceTag { old, new } => commands::tag::replace(&store, &old, &new, output),
        Commands::Refresh(args) => commands::bookmark::refresh(&store, args, yes, output),
        Commands::Import {
            file,
            auto_tag,
            append_tags,
        } => commands::transfer::import(&store, &file, auto_tag, append_tags, output),
        Commands::Export { file, indices } => {
            commands::transfer::export(&store, &file, &indices, yes, output)
        }
        Commands::Status => commands::status::show(&store, output),
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

fn handle_config_command(command: Option<ConfigCommands>, output: &Output) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(output),
        Some(ConfigCommands::Set { key, value }) => commands::config::set(key, value, output),
    }
}

/// Set up tracing; RUST_LOG overrides the verbosity flags
fn init_logging(verbose: u8, config: &Config) {
    let log_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("markstore={},markstore_core={}", log_level, log_level))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    // Initialize logging (ignore error if already initialized)
    match &config.log_file {
        Some(path) => match File::create(path) {
            Ok(file) => {
                let _ = builder
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .try_init();
                info!("Logging to {:?}", path);
            }
            Err(e) => {
                eprintln!("Warning: Could not create log file {:?}: {}", path, e);
                let _ = builder.with_writer(std::io::stderr).try_init();
            }
        },
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }
}

/// First Ctrl-C stops a running refresh; a second one exits immediately
fn install_interrupt_handler(cancel: CancellationToken) {
    let interrupted = AtomicBool::new(false);
    let result = ctrlc::set_handler(move || {
        if interrupted.swap(true, Ordering::SeqCst) {
            eprintln!("Interrupted twice, exiting.");
            std::process::exit(130);
        }
        warn!("Interrupt received, finishing in-flight work");
        eprintln!("Interrupted. Press Ctrl-C again to exit immediately.");
        cancel.cancel();
    });

    if let Err(e) = result {
        warn!("Could not install interrupt handler: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::try_parse_from(["markstore", "print", "-y", "--json", "--db", "/tmp/x.db", "-vv"])
            .unwrap();
        assert!(cli.yes);
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
        assert!(matches!(cli.command, Commands::Print { ref indices } if indices.is_empty()));
    }

    #[test]
    fn test_parse_update_with_tag_edits() {
        let cli = Cli::try_parse_from(["markstore", "update", "2", "--tag", "-old,stale"]).unwrap();
        match cli.command {
            Commands::Update(args) => {
                assert_eq!(args.indices, vec!["2"]);
                assert_eq!(args.tag.as_deref(), Some("-old,stale"));
            }
            _ => panic!("expected update"),
        }
    }

    #[test]
    fn test_parse_network_flag_defaults() {
        let cli = Cli::try_parse_from([
            "markstore",
            "refresh",
            "--tag-error",
            "--del-error",
            "--export-on",
            "--export",
            "dead.json",
        ])
        .unwrap();
        match cli.command {
            Commands::Refresh(args) => {
                assert_eq!(args.network.tag_error.as_deref(), Some(""));
                assert_eq!(args.network.del_error.as_deref(), Some("400-599"));
                assert_eq!(args.capture.export_on.as_deref(), Some("400-599"));
                assert!(args.network.tag_redirect.is_none());
            }
            _ => panic!("expected refresh"),
        }
    }

    #[test]
    fn test_export_on_requires_export() {
        assert!(Cli::try_parse_from(["markstore", "refresh", "--export-on", "404"]).is_err());
    }

    #[test]
    fn test_stag_accepts_exclusions() {
        let cli = Cli::try_parse_from(["markstore", "stag", "rust", "-", "old"]).unwrap();
        assert!(matches!(cli.command, Commands::Stag { ref expr } if expr.len() == 3));
    }
}
