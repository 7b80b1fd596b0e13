use anyhow::Result;
use clap::Parser;
use smartmeter_sim::{
    app::{self, RunMode},
    clock::LocalClock,
    config::{AppConfig, Cli},
    observability,
};

/// Recreate the tables, register devices and insert `--preload-days` of
/// history, then exit without streaming.
///
/// Usage:
///   backfill_usage --db-type sqlite --db-config '{"database":"demo.db"}' --preload-days 30
fn main() -> Result<()> {
    observability::init_tracing();

    let cli = Cli::parse();
    let cfg = AppConfig::load(&cli)?;
    let clock = LocalClock::detect();

    let runtime = app::build_runtime()?;
    runtime.block_on(app::run(cfg, clock, RunMode::BackfillOnly))
}
