mod cli;
mod telemetry;

use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use colored::Colorize;
use embedding_service::EmbeddingService;
use embedding_service::config::default_config::config_from_env;
use index_backfill::{BackfillConfig, BackfillJob, CollectionOutcome, OpenSearchFacade, SearchConfig, ServiceEmbedder};
use tracing::{debug, info};

use crate::cli::Cli;

/// Skipped ids listed per collection in the summary.
const SKIPPED_PREVIEW: usize = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `.env` is optional: scheduled runs get a real environment.
    let dotenv = dotenvy::dotenv().ok();
    let cli = Cli::parse();
    telemetry::init(cli.verbose)?;
    if let Some(path) = dotenv {
        debug!(path = %path.display(), "loaded .env");
    }

    let search_cfg = SearchConfig::from_env().context("search engine config")?;
    let embed_cfg = config_from_env().context("embedding config")?;
    let mut job_cfg = BackfillConfig::from_env().context("backfill config")?;
    apply_overrides(&mut job_cfg, &cli);
    debug!(?search_cfg, ?embed_cfg, ?job_cfg, "configuration");

    let service = EmbeddingService::new(embed_cfg).context("embedding service")?;
    let embedder = Arc::new(ServiceEmbedder::new(Arc::new(service)));
    let index = Arc::new(OpenSearchFacade::new(&search_cfg).context("search engine client")?);
    let job = BackfillJob::new(job_cfg, index, embedder)?;

    let selected = cli.selected_collections();
    let results = if selected.is_empty() {
        info!("backfilling every eligible collection");
        job.backfill_all().await?
    } else {
        info!(collections = ?selected, "backfilling selected collections");
        job.backfill_collections(selected).await
    };

    let failed = print_summary(&results);
    if failed > 0 {
        bail!("{failed} of {} collection run(s) failed", results.len());
    }
    Ok(())
}

fn apply_overrides(cfg: &mut BackfillConfig, cli: &Cli) {
    if cli.ensure_mapping {
        cfg.ensure_mapping = true;
    }
    if let Some(n) = cli.concurrency {
        cfg.concurrency = n;
    }
    if let Some(n) = cli.collection_concurrency {
        cfg.collection_concurrency = n;
    }
}

/// Prints one line per collection and returns the number of failed runs.
fn print_summary(results: &[CollectionOutcome]) -> usize {
    let mut failed = 0;
    for (name, result) in results {
        match result {
            Ok(report) => {
                let line = format!(
                    "{name}: scanned={} embedded={} skipped={} in {:.1}s",
                    report.scanned,
                    report.embedded,
                    report.skipped.len(),
                    report.elapsed.as_secs_f64()
                );
                if report.is_complete() {
                    println!("{} {}", "ok".green().bold(), line);
                } else {
                    println!("{} {}", "partial".yellow().bold(), line);
                    let ids = report.skipped_ids();
                    let more = ids.len().saturating_sub(SKIPPED_PREVIEW);
                    let preview = ids.into_iter().take(SKIPPED_PREVIEW).collect::<Vec<_>>().join(", ");
                    if more > 0 {
                        println!("        skipped: {preview} (+{more} more)");
                    } else {
                        println!("        skipped: {preview}");
                    }
                }
            }
            Err(e) => {
                failed += 1;
                println!("{} {name}: {e}", "failed".red().bold());
            }
        }
    }
    if results.is_empty() {
        println!("{}", "no eligible collections".dimmed());
    }
    failed
}
