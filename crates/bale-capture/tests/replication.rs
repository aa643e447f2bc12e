//! Replication and export through the client, including lookups racing a
//! background replicator.

use std::sync::Arc;

use bale_capture::store::{MemoryStore, SqliteStore, Store};
use bale_capture::sync::{LinkStatus, MemorySink, MemorySource, Replicator, SyncConfig};
use bale_capture::{
    BaleCode, CaptureClient, CaptureError, Config, MatchOutcome, Matcher, OperationContext,
    RetryPolicy, ScanOutcome, StoreConfig, UnitReference,
};
use bale_capture_testkit::fixtures::{code, code39, unit};
use bale_capture_testkit::TestFixture;

/// Publish filler units around two revisions of `target`.
fn publish_around(source: &MemorySource, target: &BaleCode) -> (UnitReference, UnitReference) {
    let first = unit(target, 500);
    let second = unit(target, 500)
        .with_revision(2)
        .with_attribute("grade", "C")
        .with_location("yard-4");

    for i in 0..150 {
        source.upsert(unit(&code(&format!("FILL{:05}", i)), i));
    }
    source.upsert(first.clone());
    for i in 150..300 {
        source.upsert(unit(&code(&format!("FILL{:05}", i)), i));
    }
    source.upsert(second.clone());
    for i in 300..400 {
        source.upsert(unit(&code(&format!("FILL{:05}", i)), i));
    }
    (first, second)
}

/// Look `target` up until replication finishes. Every observation must be a
/// whole published revision, and observations never go backwards.
async fn lookups_race_replication<S: Store + 'static>(store: Arc<S>) {
    let source = Arc::new(MemorySource::new());
    let target = code("RACE00001");
    let (first, second) = publish_around(&source, &target);

    let config = SyncConfig {
        import_batch_size: 7,
        max_batches_per_pass: 4,
        ..Default::default()
    };
    let replicator = Replicator::new(Arc::clone(&store), Arc::clone(&source), config);
    let replication = tokio::spawn(async move { replicator.drain().await });

    let matcher = Matcher::new(Arc::clone(&store));
    let mut rank = 0;
    let mut observed = [0usize; 3];
    loop {
        let done = replication.is_finished();

        let outcome = matcher
            .lookup_with_retry(&target, &RetryPolicy::default())
            .await
            .unwrap();
        let seen = match outcome {
            MatchOutcome::NotFound => 0,
            MatchOutcome::Found(ref unit) if *unit == first => 1,
            MatchOutcome::Found(ref unit) if *unit == second => 2,
            MatchOutcome::Found(unit) => panic!("partially applied unit: {:?}", unit),
        };
        assert!(seen >= rank, "lookup went from revision {} back to {}", rank, seen);
        rank = seen;
        observed[seen] += 1;

        if done {
            break;
        }
        tokio::task::yield_now().await;
    }

    let report = replication.await.unwrap().unwrap();
    assert!(report.drained);
    assert_eq!(report.cursor, source.head());
    assert_eq!(rank, 2);
    assert!(observed[2] >= 1);
    assert_eq!(store.counts().await.unwrap().units, 401);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lookup_races_replication_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("capture.db")).unwrap());
    lookups_race_replication(store).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lookup_races_replication_in_memory() {
    lookups_race_replication(Arc::new(MemoryStore::new())).await;
}

#[tokio::test]
async fn test_unit_replicated_after_capture_matches_late() {
    let fixture = TestFixture::new();
    let client = CaptureClient::with_shared_store(Arc::clone(&fixture.store), Config::default());
    let session = client.open_session(OperationContext::Receiving);

    let record = match session.scan(code39("BALE00001E")).await.unwrap() {
        ScanOutcome::Accepted(record) => record,
        other => panic!("expected Accepted, got {:?}", other),
    };
    assert!(!record.is_matched());

    let published = unit(&record.code, 42);
    fixture.publish(published.clone());
    let report = client.replicate(Arc::clone(&fixture.source)).await.unwrap();
    assert_eq!(report.upserted, 1);
    assert_eq!(client.link().status(), LinkStatus::Online);

    let resolved = client.captures(Some(OperationContext::Receiving)).await.unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].record, record);
    assert_eq!(resolved[0].unit, Some(published.clone()));
    assert!(resolved[0].matched_late());

    assert_eq!(
        client.lookup(&record.code).await.unwrap(),
        MatchOutcome::Found(published)
    );
}

#[tokio::test]
async fn test_removed_unit_no_longer_matches() {
    let fixture = TestFixture::new();
    let client = CaptureClient::with_shared_store(Arc::clone(&fixture.store), Config::default());
    let target = code("BALE00002");

    fixture.publish(unit(&target, 2));
    client.replicate(Arc::clone(&fixture.source)).await.unwrap();
    assert!(client.lookup(&target).await.unwrap().is_found());

    fixture.source.remove(target.as_str());
    let report = client.replicate(Arc::clone(&fixture.source)).await.unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(client.lookup(&target).await.unwrap(), MatchOutcome::NotFound);
}

#[tokio::test]
async fn test_offline_source_marks_link_and_keeps_cursor() {
    let fixture = TestFixture::new();
    let client = CaptureClient::with_shared_store(Arc::clone(&fixture.store), Config::default());

    fixture.publish(unit(&code("BALE00003"), 3));
    fixture.source.set_offline(true);

    let err = client
        .replicate(Arc::clone(&fixture.source))
        .await
        .unwrap_err();
    assert!(matches!(err, CaptureError::Sync(_)));
    assert_eq!(client.link().status(), LinkStatus::Offline);
    assert_eq!(fixture.store.sync_cursor().await.unwrap(), 0);

    // Capture keeps working with the link down.
    let session = client.open_session(OperationContext::Stocktake);
    assert!(matches!(
        session.scan(code39("1234567892")).await.unwrap(),
        ScanOutcome::Accepted(_)
    ));

    fixture.source.set_offline(false);
    client.replicate(Arc::clone(&fixture.source)).await.unwrap();
    assert_eq!(client.link().status(), LinkStatus::Online);
    assert_eq!(fixture.store.sync_cursor().await.unwrap(), 1);
}

#[tokio::test]
async fn test_export_delivers_each_capture_once() {
    let fixture = TestFixture::new();
    let client = CaptureClient::with_shared_store(Arc::clone(&fixture.store), Config::default());
    let session = client.open_session(OperationContext::Dispatch);

    for payload in ["1234567892", "2234567893"] {
        session.scan(code39(payload)).await.unwrap();
    }

    let sink = Arc::new(MemorySink::new());
    let report = client.export(Arc::clone(&sink)).await.unwrap();
    assert_eq!(report.acknowledged, 2);

    let again = client.export(Arc::clone(&sink)).await.unwrap();
    assert_eq!(again.delivered, 0);

    let mut codes: Vec<String> = sink
        .received()
        .iter()
        .map(|r| r.code.as_str().to_string())
        .collect();
    codes.sort();
    assert_eq!(codes, vec!["1234567892", "2234567893"]);
    assert_eq!(client.counts().await.unwrap().pending, 0);
}

#[tokio::test]
async fn test_client_opens_configured_sqlite_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.db");
    let config = Config {
        store: StoreConfig {
            path: Some(path.clone()),
        },
        ..Default::default()
    };

    {
        let client = CaptureClient::open(config.clone()).unwrap();
        let session = client.open_session(OperationContext::Receiving);
        session.scan(code39("1234567892")).await.unwrap();
    }

    let reopened = CaptureClient::open(config).unwrap();
    let captures = reopened.captures(None).await.unwrap();
    assert_eq!(captures.len(), 1);
    assert_eq!(captures[0].record.code.as_str(), "1234567892");
}
