use clap::Parser;
use tracing_subscriber::EnvFilter;

use docsync::cli::args::{Args, Commands};
use docsync::cli::commands;
use docsync::error::Result;

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run_command(&args) {
        eprintln!("Error: {e}");
        if !args.verbose {
            eprintln!("Run with --verbose for more details.");
        }
        std::process::exit(1);
    }
}

/// Logs go to stderr so stdout stays clean for `--json`.
/// `RUST_LOG` takes precedence over `--verbose`.
fn init_logging(verbose: bool) {
    let default = if verbose { "warn,docsync=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .init();
}

fn run_command(args: &Args) -> Result<()> {
    match &args.command {
        Commands::Sync => commands::sync::run(args),
        Commands::Rebuild { force } => commands::rebuild::run(*force, args),
        Commands::Search { query, limit } => commands::search::run(query.clone(), *limit, args),
        Commands::Status => commands::status::run(args),
        Commands::List { remote } => commands::list::run(*remote, args),
        Commands::Read { id, pages } => commands::read::run(id, pages.as_deref(), args),
        Commands::Watch { interval } => commands::watch::run(*interval, args),
        Commands::Config { key, value, reset } => {
            commands::config::run(key.clone(), value.clone(), *reset, args)
        }
        Commands::Completions { shell } => {
            commands::completions::run(*shell);
            Ok(())
        }
    }
}
