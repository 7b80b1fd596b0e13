#![cfg(feature = "sqlite")]

use std::collections::HashSet;

use smartmeter_client::db::{self, BackendKind, ConnectionConfig, Repository};
use smartmeter_sim::{
    app::{prepare, seeded_rng},
    backfill::run_backfill,
    clock::FixedClock,
    sink::RepositorySink,
    StreamSettings, StreamingLoop, UsageModel,
};
use time::{macros::datetime, Duration};

async fn memory_repo() -> Box<dyn Repository> {
    let cfg = ConnectionConfig {
        database: Some(":memory:".to_string()),
        ..Default::default()
    };
    db::connect(BackendKind::Sqlite, &cfg).await.expect("in-memory sqlite")
}

#[tokio::test]
async fn backfill_then_stream_then_sweep() {
    let repo = memory_repo().await;
    let mut rng = seeded_rng(Some(2024));
    let model = UsageModel::default();
    let now = datetime!(2024-06-01 12:00:00);

    let devices = prepare(repo.as_ref(), &mut rng, 8).await.unwrap();
    assert_eq!(devices.len(), 8);

    let mut sink = RepositorySink::new(repo.as_ref());
    let written = run_backfill(&mut sink, &model, &mut rng, &devices, 30, now).await.unwrap();
    assert_eq!(written, 240);
    assert_eq!(repo.count_readings().await.unwrap(), 240);

    let settings = StreamSettings {
        retention_days: 10,
        cleanup_every: 3,
        ..StreamSettings::default()
    };
    let mut stream = StreamingLoop::new(repo.as_ref(), model, rng, FixedClock(now), devices.clone(), settings);

    let first = stream.run_cycle().await.unwrap();
    let second = stream.run_cycle().await.unwrap();
    assert!((4..=8).contains(&first.readings));
    assert!((4..=8).contains(&second.readings));
    assert_eq!(
        repo.count_readings().await.unwrap(),
        240 + (first.readings + second.readings) as u64
    );

    // Third cycle sweeps everything older than ten days before running.
    let third = stream.run_cycle().await.unwrap();
    let swept = third.swept.expect("sweep on third cycle");
    assert!(swept > 0);

    let cutoff = now - Duration::days(10);
    let remaining = repo.count_readings().await.unwrap();
    assert_eq!(remaining, 240 + (first.readings + second.readings + third.readings) as u64 - swept);

    // Nothing new is old enough, so a second sweep is a no-op.
    assert_eq!(repo.delete_readings_older_than(cutoff).await.unwrap(), 0);

    repo.close().await;
}

#[tokio::test]
async fn streamed_readings_are_stamped_now() {
    let repo = memory_repo().await;
    let mut rng = seeded_rng(Some(5));
    let model = UsageModel::default();
    let now = datetime!(2024-01-08 10:00:00);

    let devices = prepare(repo.as_ref(), &mut rng, 4).await.unwrap();
    let ids: HashSet<u32> = devices.iter().map(|d| d.device_id).collect();
    assert_eq!(ids, HashSet::from([1, 2, 3, 4]));

    let mut stream = StreamingLoop::new(
        repo.as_ref(),
        model,
        rng,
        FixedClock(now),
        devices,
        StreamSettings::default(),
    );
    for _ in 0..5 {
        let report = stream.run_cycle().await.unwrap();
        assert!((2..=4).contains(&report.readings));
    }

    let stored = repo.count_readings().await.unwrap();
    assert!((10..=20).contains(&stored));
    assert_eq!(repo.delete_readings_older_than(now).await.unwrap(), 0);

    let deleted = repo.delete_readings_older_than(now + Duration::seconds(1)).await.unwrap();
    assert_eq!(deleted, stored);
    assert_eq!(repo.count_readings().await.unwrap(), 0);
}
