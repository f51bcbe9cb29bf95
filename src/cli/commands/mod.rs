mod completions_cmd;
mod config_cmd;
mod list_cmd;
mod read_cmd;
mod rebuild_cmd;
mod search_cmd;
mod status_cmd;
mod sync_cmd;
mod watch_cmd;

pub mod completions {
    pub use super::completions_cmd::run;
}
pub mod config {
    pub use super::config_cmd::run;
}
pub mod list {
    pub use super::list_cmd::run;
}
pub mod read {
    pub use super::read_cmd::run;
}
pub mod rebuild {
    pub use super::rebuild_cmd::run;
}
pub mod search {
    pub use super::search_cmd::run;
}
pub mod status {
    pub use super::status_cmd::run;
}
pub mod sync {
    pub use super::sync_cmd::run;
}
pub mod watch {
    pub use super::watch_cmd::run;
}

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::io::{self, IsTerminal, Write};
use std::sync::Arc;

use crate::cli::args::Args;
use crate::config::Config;
use crate::core::{providers, DriveClient, Embedder, SyncEngine, SyncReport, SyncSettings};
use crate::db::IndexStore;
use crate::error::{AppError, Result};
use crate::service::IndexService;

/// Check if colors should be used
pub fn use_colors(no_color: bool) -> bool {
    if no_color {
        return false;
    }
    // Respect NO_COLOR environment variable
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    std::io::stdout().is_terminal()
}

/// Print success message
pub fn print_success(msg: &str, use_colors: bool) {
    if use_colors {
        println!("{} {}", "✓".green(), msg);
    } else {
        println!("✓ {msg}");
    }
}

/// Print warning message
pub fn print_warning(msg: &str, use_colors: bool) {
    if use_colors {
        eprintln!("{} {}", "!".yellow(), msg);
    } else {
        eprintln!("! {msg}");
    }
}

/// Prompt for confirmation
pub fn confirm(prompt: &str) -> bool {
    print!("{prompt} [y/N] ");
    io::stdout().flush().ok();

    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }

    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Load config and apply command-line overrides
fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::load()?;
    if let Some(folder) = &args.folder {
        config.root_folder_id.clone_from(folder);
    }
    Ok(config)
}

fn require_folder(config: &Config) -> Result<()> {
    if config.root_folder_id.is_empty() {
        return Err(AppError::Config(
            "No folder configured. Run `docsync config root_folder_id <id>` or pass --folder"
                .into(),
        ));
    }
    Ok(())
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| AppError::Other(format!("Failed to create runtime: {e}")))
}

fn build_embedder(config: &Config) -> Result<Arc<Embedder>> {
    let provider = providers::from_config(config)?;
    Ok(Arc::new(Embedder::new(provider, config.retry_policy())))
}

fn build_engine(config: &Config) -> Result<SyncEngine> {
    require_folder(config)?;
    let remote = Arc::new(DriveClient::from_config(config)?);
    Ok(SyncEngine::new(
        remote,
        build_embedder(config)?,
        SyncSettings::from_config(config),
    ))
}

/// Wire the remote store, embedder and index store into a service
fn open_service(config: &Config) -> Result<Arc<IndexService>> {
    let engine = build_engine(config)?;
    let store = IndexStore::open(config)?;
    IndexService::open(engine, store)
}

fn progress_bar(args: &Args) -> Option<ProgressBar> {
    if args.quiet || args.json {
        return None;
    }
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
    {
        pb.set_style(style.progress_chars("█▓░"));
    }
    Some(pb)
}

/// Human-readable outcome of a sync or rebuild
fn print_report(verb: &str, report: &SyncReport, args: &Args) {
    let colors = use_colors(args.no_color);
    if args.json {
        println!("{}", serde_json::json!({ "report": report }));
        return;
    }
    if args.quiet {
        return;
    }

    if !report.changed {
        print_success(
            &format!("Index up to date ({} files)", report.files_unchanged),
            colors,
        );
        return;
    }

    print_success(
        &format!(
            "{verb}: {} new, {} updated, {} deleted, {} unchanged in {:.1}s",
            report.files_new,
            report.files_updated,
            report.files_deleted,
            report.files_unchanged,
            report.elapsed_secs
        ),
        colors,
    );
    println!(
        "  {} chunks embedded, {} omitted, {} without text",
        report.chunks_embedded, report.files_omitted, report.files_no_text
    );
    if report.chunks_dropped > 0 {
        print_warning(
            &format!(
                "{} chunks could not be embedded and were dropped (see `docsync status`)",
                report.chunks_dropped
            ),
            colors,
        );
    }
    if report.files_failed > 0 {
        print_warning(
            &format!(
                "{} files could not be downloaded; they will be retried next sync",
                report.files_failed
            ),
            colors,
        );
    }
    if !report.listing_complete {
        print_warning(
            "Some folders could not be listed; deletions were skipped",
            colors,
        );
    }
}
