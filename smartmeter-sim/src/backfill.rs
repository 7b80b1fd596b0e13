use rand::Rng;
use smartmeter_client::{db::RepositoryError, domain::RegisteredDevice};
use time::{Duration, PrimitiveDateTime};

use crate::{sink::RepositorySink, usage_model::UsageModel};

const MINUTES_PER_DAY: i64 = 24 * 60;

#[derive(thiserror::Error, Debug)]
pub enum BackfillError {
    #[error("cannot backfill {days} days before {now}: date out of range")]
    OutOfRange { days: u32, now: PrimitiveDateTime },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Start of a backfill covering `days` days up to `now`.
pub fn backfill_start(now: PrimitiveDateTime, days: u32) -> Result<PrimitiveDateTime, BackfillError> {
    now.checked_sub(Duration::days(i64::from(days)))
        .ok_or(BackfillError::OutOfRange { days, now })
}

/// Timestamp for one historical reading on day `day_offset` after `start`.
///
/// Day windows are 24 hours long, so with `start` from [`backfill_start`]
/// every timestamp lands in `[now - days, now)`.
pub fn backfill_timestamp<R: Rng + ?Sized>(
    rng: &mut R,
    start: PrimitiveDateTime,
    day_offset: u32,
) -> PrimitiveDateTime {
    start + Duration::days(i64::from(day_offset)) + Duration::minutes(rng.gen_range(0..MINUTES_PER_DAY))
}

/// Insert `days` days of history: one reading per device per day, oldest
/// day first, each written as soon as it is generated.
///
/// Returns the number of readings stored.
pub async fn run_backfill<R: Rng + ?Sized>(
    sink: &mut RepositorySink<'_>,
    model: &UsageModel,
    rng: &mut R,
    devices: &[RegisteredDevice],
    days: u32,
    now: PrimitiveDateTime,
) -> Result<u64, BackfillError> {
    let start = backfill_start(now, days)?;
    tracing::info!(days, devices = devices.len(), "inserting historical data");

    let before = sink.inserted();
    let rejected_before = sink.rejected();
    for day_offset in 0..days {
        for device in devices {
            let at = backfill_timestamp(rng, start, day_offset);
            let reading = model.usage_at(rng, device, at);
            sink.write(&reading).await?;
        }
        tracing::debug!(day = day_offset + 1, of = days, "backfill day complete");
    }

    let written = sink.inserted() - before;
    tracing::info!(
        readings = written,
        rejected = sink.rejected() - rejected_before,
        "historical data insertion complete"
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryRepository;
    use rand::{rngs::StdRng, SeedableRng};
    use smartmeter_client::domain::BuildingType;
    use std::collections::HashSet;
    use time::macros::datetime;

    fn devices(n: u32) -> Vec<RegisteredDevice> {
        (1..=n)
            .map(|device_id| RegisteredDevice {
                device_id,
                building_type: BuildingType::ALL[device_id as usize % BuildingType::ALL.len()],
                region: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn writes_one_reading_per_device_per_day_inside_the_window() {
        let repo = MemoryRepository::default();
        let mut sink = RepositorySink::new(&repo);
        let mut rng = StdRng::seed_from_u64(3);
        let now = datetime!(2024-03-01 15:42:17);
        let devs = devices(6);

        let written = run_backfill(&mut sink, &UsageModel::default(), &mut rng, &devs, 10, now)
            .await
            .unwrap();

        assert_eq!(written, 60);
        let readings = repo.readings();
        assert_eq!(readings.len(), 60);

        let earliest = now - Duration::days(10);
        assert!(readings.iter().all(|r| r.timestamp >= earliest && r.timestamp < now));

        let ids: HashSet<u32> = devs.iter().map(|d| d.device_id).collect();
        assert!(readings.iter().all(|r| ids.contains(&r.device_id)));
    }

    #[tokio::test]
    async fn days_are_written_oldest_first() {
        let repo = MemoryRepository::default();
        let mut sink = RepositorySink::new(&repo);
        let mut rng = StdRng::seed_from_u64(8);
        let now = datetime!(2024-03-01 00:00:00);

        run_backfill(&mut sink, &UsageModel::default(), &mut rng, &devices(3), 5, now)
            .await
            .unwrap();

        let readings = repo.readings();
        for (day, chunk) in readings.chunks(3).enumerate() {
            let window_start = now - Duration::days(5) + Duration::days(day as i64);
            assert!(chunk
                .iter()
                .all(|r| r.timestamp >= window_start && r.timestamp < window_start + Duration::days(1)));
        }
    }

    #[tokio::test]
    async fn zero_days_writes_nothing() {
        let repo = MemoryRepository::default();
        let mut sink = RepositorySink::new(&repo);
        let mut rng = StdRng::seed_from_u64(1);

        let written = run_backfill(
            &mut sink,
            &UsageModel::default(),
            &mut rng,
            &devices(4),
            0,
            datetime!(2024-03-01 00:00:00),
        )
        .await
        .unwrap();

        assert_eq!(written, 0);
        assert!(repo.readings().is_empty());
    }

    #[test]
    fn timestamps_have_whole_minutes_past_the_window_start() {
        let mut rng = StdRng::seed_from_u64(21);
        let now = datetime!(2024-01-10 06:30:00);
        for _ in 0..200 {
            let ts = backfill_timestamp(&mut rng, backfill_start(now, 1).unwrap(), 0);
            assert_eq!(ts.second(), 0);
            assert!(ts >= datetime!(2024-01-09 06:30:00) && ts < now);
        }
    }

    #[tokio::test]
    async fn history_before_the_calendar_range_is_rejected() {
        let repo = MemoryRepository::default();
        let mut sink = RepositorySink::new(&repo);
        let mut rng = StdRng::seed_from_u64(2);

        let res = run_backfill(
            &mut sink,
            &UsageModel::default(),
            &mut rng,
            &devices(2),
            u32::MAX,
            datetime!(2024-03-01 00:00:00),
        )
        .await;

        assert!(matches!(res, Err(BackfillError::OutOfRange { days: u32::MAX, .. })));
        assert!(repo.readings().is_empty());
    }
}
