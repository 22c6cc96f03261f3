use clap::Parser;
use clap::builder::BoolishValueParser;

/// Fills missing vector embeddings in search engine collections.
///
/// Without `--collection`, every non-reserved collection is processed.
#[derive(Debug, Parser)]
#[command(name = "embedding-backfill", version, about)]
pub struct Cli {
    /// Collection to backfill; repeat the flag (or comma-separate) for several.
    #[arg(short, long = "collection", value_name = "NAME", env = "BACKFILL_COLLECTIONS", value_delimiter = ',')]
    pub collections: Vec<String>,

    /// Declare the vector field mapping before scanning each collection.
    #[arg(long, env = "BACKFILL_ENSURE_MAPPING", value_parser = BoolishValueParser::new())]
    pub ensure_mapping: bool,

    /// Records embedded and updated at the same time within a collection.
    #[arg(long, value_name = "N", env = "BACKFILL_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Collections processed at the same time.
    #[arg(long, value_name = "N", env = "BACKFILL_COLLECTION_CONCURRENCY")]
    pub collection_concurrency: Option<usize>,

    /// Debug logs for the backfill crates.
    #[arg(short, long, env = "BACKFILL_VERBOSE", value_parser = BoolishValueParser::new())]
    pub verbose: bool,
}

impl Cli {
    /// Selected collection names, trimmed, without empty entries.
    pub fn selected_collections(&self) -> Vec<String> {
        self.collections
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    }
}
