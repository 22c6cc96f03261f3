use std::io::{self, IsTerminal};

use anyhow::Context;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Targets raised to `debug` by `--verbose`.
const WORKSPACE_TARGETS: [&str; 3] = ["embedding_backfill", "index_backfill", "embedding_service"];

/// RFC3339 UTC timer, e.g. `2025-09-12T10:20:30Z`.
#[derive(Clone, Debug, Default)]
struct ChronoRfc3339Utc;

impl FormatTime for ChronoRfc3339Utc {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Utc::now();
        w.write_str(&now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
    }
}

/// `RUST_LOG` if set, `info` otherwise; `verbose` adds `debug` for the workspace crates.
pub fn env_filter(verbose: bool) -> anyhow::Result<EnvFilter> {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if verbose {
        for target in WORKSPACE_TARGETS {
            let directive: Directive = format!("{target}=debug")
                .parse()
                .with_context(|| format!("invalid log directive for {target}"))?;
            filter = filter.add_directive(directive);
        }
    }
    Ok(filter)
}

/// Installs the global subscriber: compact single-line events with timestamps,
/// level, target and source location. ANSI colors only on a terminal.
pub fn init(verbose: bool) -> anyhow::Result<()> {
    let format = fmt::format()
        .compact()
        .with_timer(ChronoRfc3339Utc)
        .with_level(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_source_location(true);
    let layer = fmt::layer()
        .event_format(format)
        .with_ansi(io::stderr().is_terminal())
        .with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(env_filter(verbose)?)
        .with(layer)
        .try_init()
        .context("setting default subscriber failed")
}
