//! Replay of the bundled demo fixture.

use std::sync::Arc;

use replicore::config::Config;
use replicore::interfaces::{MetricCounter, MetricScope};
use replicore::metrics::InMemoryMetrics;
use replicore::replay::{replay, ReplayFixture};
use replicore::replication::SkipReason;
use replicore::{ErrorKind, SyncOutcome};

fn demo_fixture() -> ReplayFixture {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/replay.yaml");
    let raw = std::fs::read_to_string(path).unwrap();
    serde_yaml::from_str(&raw).unwrap()
}

#[tokio::test]
async fn test_demo_fixture_replays() {
    let fixture = demo_fixture();
    assert_eq!(fixture.executions.len(), 1);
    assert_eq!(fixture.tasks.len(), 4);

    let metrics = Arc::new(InMemoryMetrics::new());
    let records = replay(fixture, &Config::for_test(), metrics.clone())
        .await
        .unwrap();
    assert_eq!(records.len(), 4);

    assert_eq!(records[0].outcome, Some(SyncOutcome::Applied));
    assert_eq!(
        records[1].outcome,
        Some(SyncOutcome::Skipped(SkipReason::Stale))
    );

    let resend = records[2].error.as_ref().unwrap();
    assert_eq!(resend.kind, ErrorKind::ResendRequired);
    let hint = resend.hint.as_ref().unwrap();
    assert_eq!(hint.start_event_id, 10);
    assert_eq!(hint.start_version, 1);

    assert_eq!(records[3].workflow_id, "order-missing");
    assert_eq!(records[3].outcome, Some(SyncOutcome::Dropped));

    assert_eq!(
        metrics.counter(MetricScope::SyncActivity, MetricCounter::Applied),
        1
    );
    assert_eq!(
        metrics.counter(MetricScope::SyncActivity, MetricCounter::ResendRequested),
        1
    );
}

#[tokio::test]
async fn test_replay_records_serialize_as_json_lines() {
    let metrics = Arc::new(InMemoryMetrics::new());
    let records = replay(demo_fixture(), &Config::for_test(), metrics)
        .await
        .unwrap();

    let first: serde_json::Value = serde_json::to_value(&records[0]).unwrap();
    assert_eq!(first["outcome"], "applied");
    assert_eq!(first["workflow_id"], "order-42");

    let stale: serde_json::Value = serde_json::to_value(&records[1]).unwrap();
    assert_eq!(stale["outcome"], "skipped");
    assert_eq!(stale["reason"], "stale");

    let resend: serde_json::Value = serde_json::to_value(&records[2]).unwrap();
    assert_eq!(resend["error"]["kind"], "resend_required");
    assert!(resend.get("outcome").is_none());
}
