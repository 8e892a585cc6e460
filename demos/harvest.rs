//! Command-line harvest with a progress bar
//!
//! ```bash
//! cargo run --example harvest -- "reddit.com/r/space/*,reddit.com/r/AMA*" commoncrawl
//! ```
//!
//! Environment:
//!
//! - `WARC_HARVEST_CONFIG` - JSON config file; arguments override its patterns and output dir
//! - `CC_CORPUS_PREFIX` - when set, compact the output into `{prefix}-{n}.txt` shards afterwards
//! - `RUST_LOG` - log filter (default: `warc_harvest=info`)

use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::prelude::*;
use warc_harvest::{Config, CorpusCompactor, Event, Harvester, Stage, run_with_shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warc_harvest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match std::env::var("WARC_HARVEST_CONFIG") {
        Ok(path) => serde_json::from_str::<Config>(&std::fs::read_to_string(path)?)?,
        Err(_) => Config::default(),
    };

    let mut args = std::env::args().skip(1);
    if let Some(patterns) = args.next() {
        config.patterns = Config::parse_patterns(&patterns);
    }
    if let Some(output_dir) = args.next() {
        config.output_dir = output_dir.into();
    }
    if config.patterns.is_empty() {
        eprintln!("usage: harvest <pattern[,pattern...]> [output_dir]");
        std::process::exit(2);
    }

    let output_dir = config.output_dir.clone();
    let compactor = CorpusCompactor::from_config(&config);
    let harvester = Harvester::new(config)?;
    let store = harvester.output_store().clone();

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{prefix:>8} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let mut events = harvester.subscribe();
    let display = bar.clone();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::StageStarted { stage, total } => {
                    display.reset();
                    display.set_length(total as u64);
                    display.set_prefix(match stage {
                        Stage::Resolve => "index",
                        Stage::Fetch => "segments",
                    });
                }
                Event::Progress {
                    completed, failed, ..
                } => {
                    display.set_position(completed);
                    display.set_message(format!("{} failed", failed));
                }
                Event::ItemFailed { item, error, .. } => {
                    display.println(format!("failed: {} ({})", item, error));
                }
                Event::RunComplete { .. } => break,
                _ => {}
            }
        }
    });

    let report = run_with_shutdown(harvester).await?;
    bar.finish_and_clear();

    println!(
        "{} written, {} already present, {} placeholders, {} skipped, {} failed, {} cancelled",
        report.written,
        report.already_present,
        report.placeholders,
        report.skipped,
        report.failed,
        report.cancelled
    );
    println!(
        "{} documents in {}",
        store.count_documents().await?,
        output_dir.display()
    );

    if let Ok(prefix) = std::env::var("CC_CORPUS_PREFIX") {
        let compacted = compactor.compact(&output_dir, std::path::Path::new(&prefix)).await?;
        println!(
            "{} of {} documents compacted into {} shards",
            compacted.documents_kept,
            compacted.documents_read,
            compacted.shards.len()
        );
    }

    Ok(())
}
