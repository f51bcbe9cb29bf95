use chrono::Utc;
use owo_colors::OwoColorize;
use std::collections::BTreeMap;

use crate::cli::args::Args;
use crate::core::{list_all, DriveClient, FileRecord, FileStatus, RemoteFile};
use crate::db::IndexStore;
use crate::error::Result;

use super::{load_config, print_warning, require_folder, runtime, use_colors};

#[allow(clippy::too_many_lines)]
pub fn run(remote: bool, args: &Args) -> Result<()> {
    let colors = use_colors(args.no_color);
    let config = load_config(args)?;
    let store = IndexStore::open(&config)?;
    let state = store.load()?;

    let remote_listing = if remote {
        require_folder(&config)?;
        let client = DriveClient::from_config(&config)?;
        let listing = runtime()?.block_on(list_all(
            &client,
            &config.root_folder_id,
            &config.retry_policy(),
        ))?;
        Some(listing)
    } else {
        None
    };

    if args.json {
        let files: Vec<_> = state.files.values().collect();
        let mut output = serde_json::json!({ "files": files });
        if let Some(listing) = &remote_listing {
            output["remote"] = serde_json::json!({
                "files": listing.files,
                "complete": listing.is_complete(),
                "failed_folders": listing.failed_folders,
            });
        }
        println!("{output}");
        return Ok(());
    }
    if args.quiet {
        return Ok(());
    }

    if state.files.is_empty() && remote_listing.is_none() {
        println!("No files indexed yet.");
        println!();
        println!("Get started by syncing a folder:");
        if colors {
            println!("  {}", "docsync config root_folder_id <folder-id>".cyan());
            println!("  {}", "docsync sync".cyan());
        } else {
            println!("  docsync config root_folder_id <folder-id>");
            println!("  docsync sync");
        }
        return Ok(());
    }

    let now = Utc::now();
    for record in state.files.values() {
        println!(
            "{} {:<40} │ {:>5} chunks │ {}",
            status_icon(record, colors),
            truncate_name(&record.name),
            record.chunk_count,
            format_time_ago(now.signed_duration_since(record.modified_at))
        );
    }
    if !state.files.is_empty() {
        println!();
        println!(
            "Status: {} processed  {} degraded  {} no text  {} omitted",
            paint("●", colors, Paint::Green),
            paint("◐", colors, Paint::Yellow),
            paint("○", colors, Paint::Dim),
            paint("–", colors, Paint::Dim),
        );
    }

    if let Some(listing) = remote_listing {
        println!();
        if colors {
            println!("{}", "Remote folder".blue().bold());
        } else {
            println!("Remote folder");
        }
        let mut by_id: BTreeMap<&str, &RemoteFile> = BTreeMap::new();
        for file in &listing.files {
            by_id.insert(file.id.as_str(), file);
        }
        for file in by_id.values() {
            let marker = match state.files.get(&file.id) {
                Some(record) if record.modified_at == file.modified_at => "  ",
                Some(_) => "~ ",
                None => "+ ",
            };
            println!(
                "{marker}{:<40} │ {:<10} │ {}",
                truncate_name(&file.name),
                file.format.as_str(),
                file.id
            );
        }
        let gone = state
            .files
            .keys()
            .filter(|id| !by_id.contains_key(id.as_str()))
            .count();
        println!();
        println!(
            "{} remote files ({} new or changed, {} gone from remote)",
            listing.files.len(),
            by_id
                .values()
                .filter(|f| state
                    .files
                    .get(&f.id)
                    .is_none_or(|r| r.modified_at != f.modified_at))
                .count(),
            gone
        );
        if !listing.is_complete() {
            print_warning(
                &format!(
                    "{} folders could not be listed",
                    listing.failed_folders.len()
                ),
                colors,
            );
        }
    }

    Ok(())
}

enum Paint {
    Green,
    Yellow,
    Dim,
}

fn paint(symbol: &str, colors: bool, paint: Paint) -> String {
    if !colors {
        return symbol.to_string();
    }
    match paint {
        Paint::Green => symbol.green().to_string(),
        Paint::Yellow => symbol.yellow().to_string(),
        Paint::Dim => symbol.dimmed().to_string(),
    }
}

fn status_icon(record: &FileRecord, colors: bool) -> String {
    match record.status {
        FileStatus::Processed if record.is_degraded() => paint("◐", colors, Paint::Yellow),
        FileStatus::Processed => paint("●", colors, Paint::Green),
        FileStatus::NoText => paint("○", colors, Paint::Dim),
        FileStatus::Omitted => paint("–", colors, Paint::Dim),
    }
}

fn truncate_name(name: &str) -> String {
    if name.chars().count() > 40 {
        let tail: String = name.chars().rev().take(37).collect::<Vec<_>>().into_iter().rev().collect();
        format!("...{tail}")
    } else {
        name.to_string()
    }
}

fn format_time_ago(duration: chrono::Duration) -> String {
    let seconds = duration.num_seconds();

    if seconds < 60 {
        "just now".to_string()
    } else if seconds < 3600 {
        let mins = seconds / 60;
        format!("{mins} min{} ago", if mins == 1 { "" } else { "s" })
    } else if seconds < 86400 {
        let hours = seconds / 3600;
        format!("{hours} hour{} ago", if hours == 1 { "" } else { "s" })
    } else {
        let days = seconds / 86400;
        format!("{days} day{} ago", if days == 1 { "" } else { "s" })
    }
}
