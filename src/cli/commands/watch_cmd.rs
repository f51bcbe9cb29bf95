//! Watch command - periodic background sync until Ctrl-C

use owo_colors::OwoColorize;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::cli::args::Args;
use crate::error::Result;
use crate::service::{IndexService, RunOutcome, TriggerAck};

use super::{load_config, open_service, print_warning, runtime, use_colors};

pub fn run(interval: Option<u64>, args: &Args) -> Result<()> {
    let colors = use_colors(args.no_color);
    let config = load_config(args)?;
    let interval = Duration::from_secs(interval.unwrap_or(config.sync_interval_secs).max(1));
    let service = open_service(&config)?;

    if !args.quiet && !args.json {
        if colors {
            println!(
                "{} Syncing {} every {}s",
                "Watching".green().bold(),
                config.root_folder_id.cyan(),
                interval.as_secs()
            );
            println!("{}", "Press Ctrl+C to stop".dimmed());
        } else {
            println!(
                "Watching: syncing {} every {}s",
                config.root_folder_id,
                interval.as_secs()
            );
            println!("Press Ctrl+C to stop");
        }
    }

    runtime()?.block_on(async {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                _ = ticker.tick() => {}
            }

            if service.trigger_sync() == TriggerAck::AlreadyRunning {
                if !args.quiet && !args.json {
                    print_warning("Previous sync still running; skipping this tick", colors);
                }
                continue;
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                () = service.wait_idle() => report(&service, args, colors)?,
            }
        }
        Ok::<(), crate::error::AppError>(())
    })?;

    if !args.quiet && !args.json {
        println!();
        println!("Stopped watching.");
    }
    Ok(())
}

fn report(service: &IndexService, args: &Args, colors: bool) -> Result<()> {
    let status = service.get_status()?;
    if args.json {
        println!("{}", serde_json::json!({ "status": status }));
        return Ok(());
    }
    if args.quiet {
        return Ok(());
    }

    let Some(last_run) = status.last_run else {
        return Ok(());
    };
    let time = last_run.finished_at.format("%H:%M:%S");
    match last_run.outcome {
        RunOutcome::Completed(report) if report.changed => {
            let line = format!(
                "[{time}] {} new, {} updated, {} deleted; {} files, {} chunks",
                report.files_new,
                report.files_updated,
                report.files_deleted,
                status.file_count,
                status.chunk_count
            );
            if colors {
                println!("{} {line}", "✓".green());
            } else {
                println!("✓ {line}");
            }
        }
        RunOutcome::Completed(_) => {
            if colors {
                println!("{}", format!("[{time}] up to date").dimmed());
            } else {
                println!("[{time}] up to date");
            }
        }
        RunOutcome::Failed { error } => {
            print_warning(&format!("[{time}] sync failed: {error}"), colors);
        }
    }
    Ok(())
}
