// Integration tests for the ledger and snapshot stores, against both
// the in-memory and filesystem backends.

use chrono::{Duration, TimeZone, Utc};
use opendal::Operator;

use tally_config::{FsConfig, StorageBackend, StorageConfig};
use tally_core::{AggregateState, BucketKind, Event, EventLog, SnapshotStore};
use tally_storage::{build_operator, JsonEventLedger, JsonSnapshotStore};

fn memory_operator() -> Operator {
    build_operator(&StorageConfig {
        backend: StorageBackend::Memory,
        fs: None,
    })
    .unwrap()
}

fn event(n: i64) -> Event {
    Event::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::seconds(n),
        format!("user-{n}"),
        "group-1",
        "tally",
    )
}

#[tokio::test]
async fn ledger_round_trips_rows_in_order() {
    let ledger = JsonEventLedger::new(memory_operator(), "ledger");

    for n in 0..5 {
        ledger.append(&event(n)).await.unwrap();
    }

    let rows = ledger.read_all().await.unwrap();
    assert_eq!(rows.len(), 5);
    for (n, row) in rows.iter().enumerate() {
        assert_eq!(row.actor.as_deref(), Some(format!("user-{n}").as_str()));
        assert!(row.timestamp.is_some());
        assert!(row.id.is_some());
    }
}

#[tokio::test]
async fn ledger_read_of_empty_prefix_is_empty() {
    let ledger = JsonEventLedger::new(memory_operator(), "ledger");
    assert!(ledger.read_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn retried_append_of_same_event_stays_one_row() {
    let ledger = JsonEventLedger::new(memory_operator(), "ledger");
    let ev = event(1);

    ledger.append(&ev).await.unwrap();
    ledger.append(&ev).await.unwrap();

    let rows = ledger.read_all().await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn corrupt_row_is_skipped_not_fatal() {
    let operator = memory_operator();
    let ledger = JsonEventLedger::new(operator.clone(), "ledger");

    ledger.append(&event(1)).await.unwrap();
    operator
        .write("ledger/000000000000000-garbage.json", b"not json".to_vec())
        .await
        .unwrap();

    let rows = ledger.read_all().await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn ledger_works_on_filesystem_backend() {
    let dir = tempfile::tempdir().unwrap();
    let operator = build_operator(&StorageConfig {
        backend: StorageBackend::Fs,
        fs: Some(FsConfig {
            path: dir.path().to_string_lossy().to_string(),
        }),
    })
    .unwrap();
    let ledger = JsonEventLedger::new(operator, "ledger");

    for n in 0..3 {
        ledger.append(&event(n)).await.unwrap();
    }

    let rows = ledger.read_all().await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].actor.as_deref(), Some("user-0"));
}

#[tokio::test]
async fn snapshot_round_trips_state() {
    let store = JsonSnapshotStore::new(memory_operator(), "state.json");

    let mut state = AggregateState::default();
    let keys = tally_core::bucket_keys(Utc::now(), chrono_tz::UTC);
    state.record("alice", keys, keys);
    state.record("alice", keys, keys);
    state.record("bob", keys, keys);

    store.save(&state).await.unwrap();
    let loaded = store.load().await.unwrap().expect("snapshot present");

    assert_eq!(
        loaded.ranking(BucketKind::AllTime),
        vec![("alice".to_string(), 2), ("bob".to_string(), 1)]
    );
}

#[tokio::test]
async fn missing_snapshot_loads_as_none() {
    let store = JsonSnapshotStore::new(memory_operator(), "state.json");
    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn corrupt_snapshot_loads_as_none() {
    let operator = memory_operator();
    operator
        .write("state.json", b"{not valid".to_vec())
        .await
        .unwrap();

    let store = JsonSnapshotStore::new(operator, "state.json");
    assert!(store.load().await.unwrap().is_none());
}
