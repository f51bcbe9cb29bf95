//! Read command - print the extracted text of one remote document

use owo_colors::OwoColorize;

use crate::cli::args::Args;
use crate::core::extractor::parse_page_range;
use crate::core::{read_document, DriveClient};
use crate::error::Result;

use super::{load_config, runtime, use_colors};

pub fn run(id: &str, pages: Option<&str>, args: &Args) -> Result<()> {
    let colors = use_colors(args.no_color);
    let config = load_config(args)?;
    let pages = pages.map(parse_page_range).transpose()?;

    let client = DriveClient::from_config(&config)?;
    let document =
        runtime()?.block_on(read_document(&client, id, pages, &config.retry_policy()))?;

    if args.json {
        println!("{}", serde_json::json!({ "document": document }));
        return Ok(());
    }

    if !args.quiet {
        if colors {
            println!(
                "{} {}",
                document.file.name.blue().bold(),
                format!("({})", document.file.mime_type).dimmed()
            );
        } else {
            println!("{} ({})", document.file.name, document.file.mime_type);
        }
        println!();
    }
    if document.text.trim().is_empty() {
        if !args.quiet {
            println!("(no text could be extracted)");
        }
    } else {
        println!("{}", document.text);
    }

    Ok(())
}
