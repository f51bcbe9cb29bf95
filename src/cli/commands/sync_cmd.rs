//! Sync command - bring the index up to date with the remote folder

use owo_colors::OwoColorize;

use crate::cli::args::Args;
use crate::error::Result;

use super::{load_config, open_service, print_report, progress_bar, runtime, use_colors};

/// Run the sync command
pub fn run(args: &Args) -> Result<()> {
    let colors = use_colors(args.no_color);
    let config = load_config(args)?;
    let service = open_service(&config)?;

    if !args.quiet && !args.json {
        if colors {
            println!("Syncing folder {}...", config.root_folder_id.cyan());
        } else {
            println!("Syncing folder {}...", config.root_folder_id);
        }
    }

    let progress_bar = progress_bar(args);
    let report = runtime()?.block_on(service.sync_now(|progress| {
        if let Some(pb) = &progress_bar {
            pb.set_length(progress.total as u64);
            pb.set_position(progress.processed as u64);
            pb.set_message(progress.current_file.clone());
        }
    }));

    if let Some(pb) = progress_bar {
        pb.finish_and_clear();
    }

    print_report("Synced", &report?, args);
    Ok(())
}
