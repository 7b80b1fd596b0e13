use anyhow::Result;
use clap::Parser;
use smartmeter_sim::{
    app::{self, RunMode},
    clock::LocalClock,
    config::{AppConfig, Cli},
    observability,
};

fn main() -> Result<()> {
    observability::init_tracing();

    let cli = Cli::parse();
    let cfg = AppConfig::load(&cli)?;

    // The local offset can only be read while the process is single-threaded.
    let clock = LocalClock::detect();

    let runtime = app::build_runtime()?;
    runtime.block_on(app::run(cfg, clock, RunMode::Stream))
}
