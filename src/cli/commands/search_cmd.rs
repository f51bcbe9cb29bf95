use owo_colors::OwoColorize;
use std::sync::Arc;

use crate::cli::args::Args;
use crate::core::Searcher;
use crate::db::IndexStore;
use crate::error::{AppError, Result};

use super::{build_embedder, load_config, runtime, use_colors};

/// Longest snippet printed per hit in human output
const SNIPPET_CHARS: usize = 300;

#[allow(clippy::needless_pass_by_value)]
pub fn run(query: String, limit: Option<usize>, args: &Args) -> Result<()> {
    let colors = use_colors(args.no_color);
    let config = load_config(args)?;
    let limit = limit.unwrap_or(config.search_limit);

    // Only chunk rows are needed to answer a query
    let store = IndexStore::open(&config)?;
    let index = store
        .load_search_index()?
        .map(Arc::new)
        .ok_or(AppError::IndexNotReady)?;

    let searcher = Searcher::new(build_embedder(&config)?);
    let hits = runtime()?.block_on(searcher.search(Some(index), &query, limit))?;

    if args.json {
        let results: Vec<_> = hits
            .iter()
            .enumerate()
            .map(|(rank, hit)| {
                serde_json::json!({
                    "rank": rank + 1,
                    "file_id": hit.file_id,
                    "distance": hit.distance,
                    "text": hit.text,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::json!({ "query": query, "results": results })
        );
        return Ok(());
    }
    if args.quiet {
        return Ok(());
    }

    if hits.is_empty() {
        println!("No matches for \"{query}\"");
        return Ok(());
    }

    for (rank, hit) in hits.iter().enumerate() {
        let snippet: String = hit
            .text
            .chars()
            .take(SNIPPET_CHARS)
            .collect::<String>()
            .replace('\n', " ");
        if colors {
            println!(
                "{} {} {}",
                format!("{}.", rank + 1).bold(),
                hit.file_id.blue(),
                format!("(distance {:.4})", hit.distance).dimmed()
            );
        } else {
            println!(
                "{}. {} (distance {:.4})",
                rank + 1,
                hit.file_id,
                hit.distance
            );
        }
        println!("   {snippet}");
        println!();
    }

    Ok(())
}
