use owo_colors::OwoColorize;

use crate::cli::args::Args;
use crate::config::Config;
use crate::db::IndexStore;
use crate::error::Result;
use crate::service::Status;

use super::{load_config, print_warning, use_colors};

pub fn run(args: &Args) -> Result<()> {
    let colors = use_colors(args.no_color);
    let config = load_config(args)?;
    let store = IndexStore::open(&config)?;
    let state = store.load()?;
    let status = Status::from_state(&state, state.chunk_count() > 0);

    if args.json {
        println!(
            "{}",
            serde_json::json!({
                "folder": config.root_folder_id,
                "database": Config::database_path()?.to_string_lossy(),
                "status": status,
            })
        );
        return Ok(());
    }
    if args.quiet {
        return Ok(());
    }

    if colors {
        println!("{}", "Index status".blue().bold());
        println!("{}", "─".repeat(40).dimmed());
    } else {
        println!("Index status");
        println!("{}", "─".repeat(40));
    }

    let folder = if config.root_folder_id.is_empty() {
        "(not configured)"
    } else {
        config.root_folder_id.as_str()
    };
    println!("Folder:     {folder}");
    let ready = if status.index_ready { "ready" } else { "not ready" };
    if colors {
        let ready = if status.index_ready {
            ready.green().to_string()
        } else {
            ready.yellow().to_string()
        };
        println!("Index:      {ready}");
    } else {
        println!("Index:      {ready}");
    }
    println!(
        "Files:      {} ({} processed, {} no text, {} omitted)",
        status.file_count, status.processed, status.no_text, status.omitted
    );
    println!("Chunks:     {}", status.chunk_count);
    if let (Some(model), Some(dimension)) = (&status.embedding_model, status.dimension) {
        println!("Embeddings: {model} ({dimension} dims)");
    }

    if !status.degraded.is_empty() {
        println!();
        print_warning(
            &format!(
                "{} files are missing chunks that could not be embedded:",
                status.degraded.len()
            ),
            colors,
        );
        for file in &status.degraded {
            println!(
                "  {} ({}): {} of {} chunks dropped",
                file.name,
                file.id,
                file.dropped_chunks,
                file.chunk_count + file.dropped_chunks
            );
        }
        println!("  Run `docsync rebuild` to re-embed them.");
    }

    Ok(())
}
