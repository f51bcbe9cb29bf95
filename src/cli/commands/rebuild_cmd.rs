//! Rebuild command - discard the index and re-process every remote file

use crate::cli::args::Args;
use crate::error::Result;

use super::{confirm, load_config, open_service, print_report, progress_bar, runtime};

pub fn run(force: bool, args: &Args) -> Result<()> {
    let config = load_config(args)?;
    let service = open_service(&config)?;

    if !force && !args.json && !args.quiet {
        let status = service.get_status()?;
        if status.file_count > 0
            && !confirm(&format!(
                "Discard {} files and {} chunks and re-embed everything?",
                status.file_count, status.chunk_count
            ))
        {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let progress_bar = progress_bar(args);
    let report = runtime()?.block_on(service.rebuild_now(|progress| {
        if let Some(pb) = &progress_bar {
            pb.set_length(progress.total as u64);
            pb.set_position(progress.processed as u64);
            pb.set_message(progress.current_file.clone());
        }
    }));

    if let Some(pb) = progress_bar {
        pb.finish_and_clear();
    }

    print_report("Rebuilt", &report?, args);
    Ok(())
}
