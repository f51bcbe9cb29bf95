use owo_colors::OwoColorize;

use crate::cli::args::Args;
use crate::config::{Config, CONFIG_KEYS};
use crate::error::Result;

use super::use_colors;

pub fn run(key: Option<String>, value: Option<String>, reset: bool, args: &Args) -> Result<()> {
    let colors = use_colors(args.no_color);
    let config_path = Config::config_file_path()?;

    if reset {
        Config::default().save()?;
        if !args.quiet {
            println!("Configuration reset to defaults.");
        }
        return Ok(());
    }

    if let Some(key) = key {
        let mut config = Config::load()?;
        if let Some(value) = value {
            config.set(&key, &value)?;
            config.save()?;
            if !args.quiet {
                println!("Set {key} = {value}");
            }
        } else {
            println!("{}", config.get(&key)?);
        }
        return Ok(());
    }

    let config = Config::load()?;

    if args.json {
        println!(
            "{}",
            serde_json::json!({
                "config_path": config_path.to_string_lossy(),
                "config": config,
            })
        );
        return Ok(());
    }

    if colors {
        println!("{}", "Configuration".blue().bold());
        println!("{}", "─".repeat(40).dimmed());
    } else {
        println!("Configuration");
        println!("{}", "─".repeat(40));
    }

    println!("Config file: {}", config_path.display());
    println!();
    for key in CONFIG_KEYS {
        let value = config.get(key)?;
        if colors {
            println!("{key}: {}", value.cyan());
        } else {
            println!("{key}: {value}");
        }
    }

    println!();
    if colors {
        println!(
            "{} Set value: {}",
            "Tip:".dimmed(),
            "docsync config root_folder_id <folder-id>".cyan()
        );
        println!(
            "{} Secrets are read from the environment variables named by {} and {}",
            "Tip:".dimmed(),
            "drive_token_env".cyan(),
            "embedding_api_key_env".cyan()
        );
    } else {
        println!("Tip: Set value: docsync config root_folder_id <folder-id>");
        println!(
            "Tip: Secrets are read from the environment variables named by drive_token_env and embedding_api_key_env"
        );
    }

    Ok(())
}
