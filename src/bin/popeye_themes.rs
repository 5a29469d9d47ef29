//! Index the themes of a batch of chess problems.
//!
//! Reads problem entries from a JSON array or a JSON-lines file and prints
//! one JSON record per entry: the fact counts, or the error that stopped it.
//!
//! Usage:
//!   popeye-themes problems.json --threads 4 > facts.jsonl

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tracing::info;

use popeye_themes::{analyze_entries, AnalysisConfig, ProblemEntry, ValidationPolicy};

#[derive(Parser, Debug)]
#[command(name = "popeye-themes", about = "Detect compositional themes in Popeye solutions")]
struct Args {
    /// JSON array or JSON lines of problem entries
    input: PathBuf,

    /// Worker threads (default: one per CPU)
    #[arg(long)]
    threads: Option<usize>,

    /// Reject solutions with more nodes than this
    #[arg(long)]
    max_plies: Option<usize>,

    /// Leave set play out of the trajectory analysis
    #[arg(long)]
    exclude_set_play: bool,

    /// Leave refutations of tries out of the trajectory analysis
    #[arg(long)]
    exclude_tries: bool,

    /// Fail an entry on the first fact that does not match the catalog
    #[arg(long)]
    strict: bool,
}

impl Args {
    fn config(&self) -> AnalysisConfig {
        let mut config = AnalysisConfig::from_env();
        if let Some(threads) = self.threads {
            config.num_threads = Some(threads);
        }
        if let Some(max_plies) = self.max_plies {
            config.max_plies = max_plies;
        }
        if self.exclude_set_play {
            config.include_set_play = false;
        }
        if self.exclude_tries {
            config.include_tries = false;
        }
        config.validation = if self.strict {
            ValidationPolicy::Strict
        } else {
            ValidationPolicy::LogAndSkip
        };
        config
    }
}

fn read_entries(text: &str) -> anyhow::Result<Vec<ProblemEntry>> {
    if text.trim_start().starts_with('[') {
        return serde_json::from_str(text).context("reading JSON array of entries");
    }
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("reading entry on line {}", i + 1))
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let config = args.config();

    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let entries = read_entries(&text)?;
    info!(entries = entries.len(), path = %args.input.display(), "entries loaded");

    let results = analyze_entries(&entries, &config);
    let mut failed = 0;
    for (entry, result) in entries.iter().zip(&results) {
        let record = match result {
            Ok(facts) => json!({ "id": entry.id, "facts": facts }),
            Err(e) => {
                failed += 1;
                json!({ "id": entry.id, "error": e.to_string() })
            }
        };
        println!("{}", record);
    }
    info!(analyzed = results.len() - failed, failed, "done");
    Ok(())
}
