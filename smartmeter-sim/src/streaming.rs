use std::{future::Future, time::Duration as StdDuration};

use rand::{seq::SliceRandom, Rng};
use smartmeter_client::{
    db::{Repository, RepositoryError},
    domain::RegisteredDevice,
};
use time::Duration;

use crate::{clock::Clock, sink::RepositorySink, usage_model::UsageModel};

pub const DEFAULT_CLEANUP_EVERY: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub interval: StdDuration,
    pub retention_days: u32,
    /// The retention sweep runs on every `cleanup_every`-th cycle.
    pub cleanup_every: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            interval: StdDuration::from_secs(3600),
            retention_days: 100,
            cleanup_every: DEFAULT_CLEANUP_EVERY,
        }
    }
}

/// How many devices report in one cycle: uniform in `[ceil(n/2), n]`.
pub fn sample_size<R: Rng + ?Sized>(rng: &mut R, n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    rng.gen_range(n.div_ceil(2)..=n)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    pub readings: usize,
    /// Rows removed, when this cycle ran the retention sweep.
    pub swept: Option<u64>,
}

/// Live generation loop: every cycle a random subset of devices reports one
/// reading stamped "now", then the loop sleeps for the configured interval.
///
/// The cleanup counter lives only as long as this value; a restarted process
/// starts counting from zero again.
pub struct StreamingLoop<'a, R, C> {
    sink: RepositorySink<'a>,
    model: UsageModel,
    rng: R,
    clock: C,
    devices: Vec<RegisteredDevice>,
    settings: StreamSettings,
    cleanup_counter: u32,
    cycles: u64,
}

impl<'a, R, C> StreamingLoop<'a, R, C>
where
    R: Rng,
    C: Clock,
{
    pub fn new(
        repo: &'a dyn Repository,
        model: UsageModel,
        rng: R,
        clock: C,
        devices: Vec<RegisteredDevice>,
        settings: StreamSettings,
    ) -> Self {
        Self {
            sink: RepositorySink::new(repo),
            model,
            rng,
            clock,
            devices,
            settings,
            cleanup_counter: 0,
            cycles: 0,
        }
    }

    pub fn cleanup_counter(&self) -> u32 {
        self.cleanup_counter
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Delete readings older than the retention horizon.
    ///
    /// A horizon earlier than the calendar can express keeps everything.
    pub async fn sweep(&mut self) -> Result<u64, RepositoryError> {
        let retention_days = self.settings.retention_days;
        let Some(cutoff) = self.clock.now().checked_sub(Duration::days(i64::from(retention_days))) else {
            tracing::warn!(retention_days, "retention horizon out of range, nothing to clean up");
            return Ok(0);
        };
        let removed = self.sink.repository().delete_readings_older_than(cutoff).await?;
        metrics::counter!("retention_deleted_rows_total").increment(removed);
        tracing::info!(removed, retention_days = self.settings.retention_days, "old readings cleaned up");
        Ok(removed)
    }

    pub async fn run_cycle(&mut self) -> Result<CycleReport, RepositoryError> {
        self.cycles += 1;
        self.cleanup_counter += 1;

        let swept = if self.cleanup_counter >= self.settings.cleanup_every {
            self.cleanup_counter = 0;
            Some(self.sweep().await?)
        } else {
            None
        };

        let k = sample_size(&mut self.rng, self.devices.len());
        let sampled: Vec<RegisteredDevice> = self
            .devices
            .choose_multiple(&mut self.rng, k)
            .cloned()
            .collect();

        let now = self.clock.now();
        let mut readings = 0;
        for device in &sampled {
            let reading = self.model.usage_at(&mut self.rng, device, now);
            if self.sink.write(&reading).await? {
                readings += 1;
                tracing::debug!(
                    device_id = reading.device_id,
                    kwh = reading.power_usage_kwh,
                    timestamp = %reading.timestamp,
                    "reading stored"
                );
            }
        }

        metrics::counter!("stream_cycles_total").increment(1);
        tracing::info!(cycle = self.cycles, readings, "stream cycle complete");

        Ok(CycleReport {
            cycle: self.cycles,
            readings,
            swept,
        })
    }

    /// Run cycles until `shutdown` resolves. Shutdown is checked before each
    /// cycle and while sleeping, never during one, so an in-flight insert
    /// always completes.
    ///
    /// Returns the number of cycles run.
    pub async fn run<F>(mut self, shutdown: F) -> Result<u64, RepositoryError>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            devices = self.devices.len(),
            backend = %self.sink.repository().backend(),
            interval_secs = self.settings.interval.as_secs(),
            "starting power usage stream"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = std::future::ready(()) => {}
            }

            self.run_cycle().await?;

            tokio::select! {
                _ = tokio::time::sleep(self.settings.interval) => {}
                _ = &mut shutdown => break,
            }
        }

        tracing::info!(cycles = self.cycles, "data stream stopped by user");
        Ok(self.cycles)
    }
}
