use std::future::Future;

use rand::{rngs::StdRng, Rng, SeedableRng};
use smartmeter_client::{
    db::{self, Repository, RepositoryError},
    domain::RegisteredDevice,
};

use crate::{
    backfill::run_backfill,
    clock::{Clock, LocalClock},
    config::AppConfig,
    metrics_server,
    sampler::{populate_devices, register_devices},
    sink::RepositorySink,
    streaming::StreamingLoop,
    usage_model::UsageModel,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Backfill, then stream until interrupted.
    Stream,
    /// Backfill and exit.
    BackfillOnly,
}

pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Single-threaded runtime: every storage call and the inter-cycle sleep run
/// one after another on the calling thread.
pub fn build_runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread().enable_all().build()
}

/// Recreate the tables, generate `num_devices` devices, store their metadata
/// and return the registered list as read back from storage.
pub async fn prepare<R: Rng + ?Sized>(
    repo: &dyn Repository,
    rng: &mut R,
    num_devices: usize,
) -> Result<Vec<RegisteredDevice>, RepositoryError> {
    repo.reset_schema().await?;

    let devices = populate_devices(rng, num_devices);
    register_devices(repo, &devices).await?;

    let registered = repo.list_devices().await?;
    tracing::info!(
        devices = registered.len(),
        ids = ?registered.iter().map(|d| d.device_id).collect::<Vec<_>>(),
        "registered devices"
    );
    Ok(registered)
}

/// Full run against the configured backend. Returns once the stream is
/// interrupted (or right after the backfill in [`RunMode::BackfillOnly`]);
/// the storage connection is closed on every path.
pub async fn run(cfg: AppConfig, clock: LocalClock, mode: RunMode) -> anyhow::Result<()> {
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    tracing::info!(utc_offset = %clock.offset(), "stamping readings in local time");
    let repo = db::connect(cfg.database.backend, &cfg.database.connection).await?;
    let result = drive(repo.as_ref(), &cfg, clock, mode).await;
    repo.close().await;
    tracing::info!(backend = %cfg.database.backend, "storage connection closed");

    result
}

async fn drive(
    repo: &dyn Repository,
    cfg: &AppConfig,
    clock: LocalClock,
    mode: RunMode,
) -> anyhow::Result<()> {
    let sim = &cfg.simulation;
    let mut rng = seeded_rng(sim.seed);
    let model = UsageModel::new(sim.base_usage);

    let devices = prepare(repo, &mut rng, sim.num_devices).await?;

    if sim.preload_days > 0 {
        let mut sink = RepositorySink::new(repo);
        run_backfill(&mut sink, &model, &mut rng, &devices, sim.preload_days, clock.now()).await?;
    }

    match mode {
        RunMode::BackfillOnly => {
            let total = repo.count_readings().await?;
            tracing::info!(readings = total, "backfill finished");
        }
        RunMode::Stream => {
            let shutdown = shutdown_signal();
            tracing::info!("press Ctrl+C to stop");
            let stream = StreamingLoop::new(repo, model, rng, clock, devices, cfg.stream_settings());
            stream.run(shutdown).await?;
        }
    }

    Ok(())
}

/// Install the Ctrl+C and SIGTERM listeners right away and return a future
/// that resolves on the first of them.
///
/// Must be called from inside the runtime.
#[cfg(unix)]
pub fn shutdown_signal() -> impl Future<Output = ()> {
    use tokio::signal::unix::{signal, SignalKind};

    let interrupt = listen(signal(SignalKind::interrupt()), "SIGINT");
    let terminate = listen(signal(SignalKind::terminate()), "SIGTERM");
    async move {
        tokio::select! {
            _ = interrupt => {},
            _ = terminate => {},
        }
    }
}

#[cfg(not(unix))]
pub fn shutdown_signal() -> impl Future<Output = ()> {
    let interrupt = tokio::signal::windows::ctrl_c();
    async move {
        match interrupt {
            Ok(mut interrupt) => {
                interrupt.recv().await;
            }
            Err(err) => {
                tracing::warn!(?err, "failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(unix)]
fn listen(
    installed: std::io::Result<tokio::signal::unix::Signal>,
    name: &'static str,
) -> impl Future<Output = ()> {
    let installed = installed
        .map_err(|err| tracing::warn!(?err, signal = name, "failed to install signal handler"))
        .ok();
    async move {
        match installed {
            Some(mut sig) => {
                sig.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryRepository;
    use std::collections::HashSet;

    #[tokio::test]
    async fn prepare_registers_every_generated_device() {
        let repo = MemoryRepository::default();
        let mut rng = seeded_rng(Some(9));

        let registered = prepare(&repo, &mut rng, 12).await.unwrap();

        let ids: Vec<u32> = registered.iter().map(|d| d.device_id).collect();
        assert_eq!(ids, (1..=12).collect::<Vec<_>>());
        assert!(registered.iter().all(|d| d.region.is_some()));
    }

    #[tokio::test]
    async fn prepare_starts_from_empty_tables() {
        let repo = MemoryRepository::default();
        let mut rng = seeded_rng(Some(1));
        prepare(&repo, &mut rng, 5).await.unwrap();

        let registered = prepare(&repo, &mut rng, 3).await.unwrap();
        let ids: HashSet<u32> = registered.iter().map(|d| d.device_id).collect();
        assert_eq!(ids, HashSet::from([1, 2, 3]));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn terminate_is_caught_once_the_listener_is_installed() {
        use tokio::signal::unix::{signal, SignalKind};

        let shutdown = shutdown_signal();
        // Keeps SIGTERM handled even if the listener above failed to install.
        let _guard = signal(SignalKind::terminate()).unwrap();

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(std::time::Duration::from_secs(5), shutdown)
            .await
            .expect("shutdown resolves on SIGTERM");
    }

    #[test]
    fn same_seed_gives_same_fleet() {
        let a = populate_devices(&mut seeded_rng(Some(77)), 20);
        let b = populate_devices(&mut seeded_rng(Some(77)), 20);
        assert_eq!(a, b);
    }
}
