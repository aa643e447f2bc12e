//! End-to-end capture scenarios driven through a session handle.

use std::sync::Arc;
use std::time::Duration;

use bale_capture::{
    CaptureConfig, CaptureError, CaptureSession, Feedback, IgnoreReason, InvalidReason,
    OperationContext, PersistenceCause, Platform, ScanOutcome, SessionHandle, SessionPhase,
    Symbology,
};
use bale_capture::store::{MemoryStore, SqliteStore, Store};
use bale_capture_testkit::fixtures::{code, code39, raw_scan, unit};
use bale_capture_testkit::{Fault, FlakyStore, GatedStore, Stage, TestFixture};

fn spawn<S: Store + 'static>(store: Arc<S>, config: CaptureConfig) -> SessionHandle {
    bale_capture::telemetry::init_test_tracing();
    CaptureSession::spawn(store, OperationContext::Receiving, Platform::Android, &config)
}

fn accepted(outcome: ScanOutcome) -> bale_capture::CaptureRecord {
    match outcome {
        ScanOutcome::Accepted(record) => record,
        other => panic!("expected Accepted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_sentinel_wrapped_scan_is_captured() {
    let fixture = TestFixture::new();
    let session = spawn(Arc::clone(&fixture.store), CaptureConfig::default());

    let record = accepted(session.scan(code39("1234567892")).await.unwrap());

    assert_eq!(record.code.as_str(), "1234567892");
    assert_eq!(record.context, OperationContext::Receiving);
    assert!(record.export.is_pending());

    let stored = fixture.store.get_capture(&record.id).await.unwrap();
    assert_eq!(stored, Some(record));
}

#[tokio::test]
async fn test_wrong_check_character_is_rejected() {
    let fixture = TestFixture::new();
    let session = spawn(Arc::clone(&fixture.store), CaptureConfig::default());
    let mut feedback = session.subscribe();

    let outcome = session.scan(code39("123456789X")).await.unwrap();
    let reason = InvalidReason::ChecksumMismatch {
        expected: '2',
        found: 'X',
    };

    assert_eq!(outcome, ScanOutcome::Rejected(reason));
    assert_eq!(feedback.recv().await.unwrap(), Feedback::Rejected(reason));
    assert_eq!(session.phase(), SessionPhase::Rejected(reason));
    assert_eq!(fixture.store.counts().await.unwrap().captures, 0);
}

#[tokio::test]
async fn test_unknown_unit_is_captured_unmatched() {
    let fixture = TestFixture::new();
    let known = code("BALE00001");
    fixture.seed_units(vec![unit(&known, 11)]).await.unwrap();
    let session = spawn(Arc::clone(&fixture.store), CaptureConfig::default());

    let record = accepted(session.scan(code39("1234567892")).await.unwrap());
    assert_eq!(record.matched_unit, None);

    let record = accepted(session.scan(code39(known.as_str())).await.unwrap());
    let matched = record.matched_unit.expect("known unit should match");
    assert_eq!(matched.remote_id, 11);

    assert_eq!(fixture.store.counts().await.unwrap().captures, 2);
}

#[tokio::test]
async fn test_ios_ean13_quirk_is_undone_before_validation() {
    let store = Arc::new(MemoryStore::new());
    let session = CaptureSession::spawn(
        Arc::clone(&store),
        OperationContext::Dispatch,
        Platform::Ios,
        &CaptureConfig::default(),
    );

    // 12-digit UPC-A reported as EAN-13 with a leading zero: not a bale code
    // either way, but the rejection must describe the stripped payload.
    let outcome = session
        .scan(raw_scan(Symbology::Ean13, "0123456789012"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ScanOutcome::Rejected(InvalidReason::WrongLength { length: 12 })
    );
}

#[tokio::test]
async fn test_rescan_while_persisting_yields_one_record() {
    let store = Arc::new(GatedStore::new(MemoryStore::new()));
    let session = spawn(Arc::clone(&store), CaptureConfig::default());

    let first = {
        let session = session.clone();
        tokio::spawn(async move { session.scan(code39("1234567892")).await })
    };
    store.wait_until_parked().await;
    assert_eq!(
        session.phase(),
        SessionPhase::Accepted(code("123456789"))
    );

    let second = session.scan(code39("1234567892")).await.unwrap();
    assert_eq!(second, ScanOutcome::Ignored(IgnoreReason::Busy));

    store.open();
    let record = accepted(first.await.unwrap().unwrap());

    assert_eq!(store.insert_count(), 1);
    let captures = store.list_captures(None).await.unwrap();
    assert_eq!(captures, vec![record]);
}

#[tokio::test]
async fn test_sequential_duplicate_is_a_persistence_failure() {
    let fixture = TestFixture::new();
    let session = spawn(Arc::clone(&fixture.store), CaptureConfig::default());
    let mut feedback = session.subscribe();

    let first = accepted(session.scan(code39("1234567892")).await.unwrap());
    // Capture ids include the millisecond timestamp.
    tokio::time::sleep(Duration::from_millis(5)).await;

    match session.scan(code39("1234567892")).await {
        Err(CaptureError::PersistenceFailure {
            cause: PersistenceCause::Duplicate { existing },
            ..
        }) => assert_eq!(existing, first.id),
        other => panic!("expected duplicate failure, got {:?}", other),
    }

    assert!(matches!(feedback.recv().await.unwrap(), Feedback::Accepted { .. }));
    assert_eq!(
        feedback.recv().await.unwrap(),
        Feedback::PersistenceFailure {
            code: first.code.clone()
        }
    );
    assert_eq!(fixture.store.counts().await.unwrap().captures, 1);
}

#[tokio::test]
async fn test_same_code_in_another_context_is_captured() {
    let store = Arc::new(MemoryStore::new());
    let receiving = spawn(Arc::clone(&store), CaptureConfig::default());
    let dispatch = CaptureSession::spawn(
        Arc::clone(&store),
        OperationContext::Dispatch,
        Platform::Android,
        &CaptureConfig::default(),
    );

    accepted(receiving.scan(code39("1234567892")).await.unwrap());
    accepted(dispatch.scan(code39("1234567892")).await.unwrap());

    assert_eq!(store.counts().await.unwrap().captures, 2);
}

#[tokio::test]
async fn test_transient_lookup_failures_are_retried() {
    let store = Arc::new(FlakyStore::new(MemoryStore::new(), 2, Fault::Transient));
    let config = CaptureConfig {
        retry_backoff_ms: 1,
        ..Default::default()
    };
    let session = spawn(Arc::clone(&store), config);

    accepted(session.scan(code39("1234567892")).await.unwrap());

    assert_eq!(store.lookup_count(), 3);
    assert_eq!(store.counts().await.unwrap().captures, 1);
}

#[tokio::test]
async fn test_exhausted_retries_surface_transient_error() {
    let store = Arc::new(FlakyStore::new(MemoryStore::new(), 10, Fault::Transient));
    let config = CaptureConfig {
        lookup_attempts: 3,
        retry_backoff_ms: 1,
        ..Default::default()
    };
    let session = spawn(Arc::clone(&store), config);
    let mut feedback = session.subscribe();

    let err = session.scan(code39("1234567892")).await.unwrap_err();
    match &err {
        CaptureError::TransientStoreUnavailable { code, attempts, .. } => {
            assert_eq!(code.as_str(), "1234567892");
            assert_eq!(*attempts, 3);
        }
        other => panic!("expected TransientStoreUnavailable, got {:?}", other),
    }
    assert!(err.is_retryable());
    assert_eq!(
        feedback.recv().await.unwrap(),
        Feedback::TransientError {
            code: code("123456789")
        }
    );
    assert_eq!(store.counts().await.unwrap().captures, 0);
}

#[tokio::test]
async fn test_permanent_lookup_failure_is_not_retried() {
    let store = Arc::new(FlakyStore::new(MemoryStore::new(), 1, Fault::Permanent));
    let session = spawn(Arc::clone(&store), CaptureConfig::default());

    let err = session.scan(code39("1234567892")).await.unwrap_err();
    assert!(matches!(
        err,
        CaptureError::TransientStoreUnavailable { attempts: 1, .. }
    ));
    assert!(!err.is_retryable());
    assert_eq!(store.lookup_count(), 1);
}

#[tokio::test]
async fn test_insert_failure_is_reported_and_session_recovers() {
    let store = Arc::new(FlakyStore::new(MemoryStore::new(), 0, Fault::Transient));
    store.fail_inserts(true);
    let session = spawn(Arc::clone(&store), CaptureConfig::default());
    let mut feedback = session.subscribe();

    let err = session.scan(code39("1234567892")).await.unwrap_err();
    assert!(matches!(
        err,
        CaptureError::PersistenceFailure {
            cause: PersistenceCause::Store(_),
            ..
        }
    ));
    assert_eq!(err.code().map(|c| c.as_str()), Some("1234567892"));
    assert_eq!(
        feedback.recv().await.unwrap(),
        Feedback::PersistenceFailure {
            code: code("123456789")
        }
    );

    store.fail_inserts(false);
    accepted(session.scan(code39("1234567892")).await.unwrap());
    assert_eq!(store.counts().await.unwrap().captures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_scans_ignored_during_reject_cooldown() {
    let store = Arc::new(MemoryStore::new());
    let config = CaptureConfig {
        reject_cooldown_ms: 1000,
        ..Default::default()
    };
    let session = spawn(Arc::clone(&store), config);

    let outcome = session.scan(code39("12345")).await.unwrap();
    assert_eq!(
        outcome,
        ScanOutcome::Rejected(InvalidReason::WrongLength { length: 5 })
    );

    let ignored = session.scan(code39("1234567892")).await.unwrap();
    assert_eq!(ignored, ScanOutcome::Ignored(IgnoreReason::CoolingDown));
    assert!(!session.abandon().await.unwrap());

    tokio::time::sleep(Duration::from_millis(1100)).await;

    accepted(session.scan(code39("1234567892")).await.unwrap());
    assert_eq!(store.counts().await.unwrap().captures, 1);
}

#[tokio::test]
async fn test_abandon_scan_while_matching() {
    let store = Arc::new(GatedStore::at(MemoryStore::new(), Stage::Lookup));
    let session = spawn(Arc::clone(&store), CaptureConfig::default());
    let mut feedback = session.subscribe();

    let scan = {
        let session = session.clone();
        tokio::spawn(async move { session.scan(code39("1234567892")).await })
    };
    store.wait_until_parked().await;

    assert!(session.abandon().await.unwrap());
    assert_eq!(scan.await.unwrap().unwrap(), ScanOutcome::Abandoned);
    session
        .watch_phase()
        .wait_for(|phase| *phase == SessionPhase::Idle)
        .await
        .unwrap();

    // Nothing was written and the abandoned scan produced no feedback.
    store.open();
    assert_eq!(store.insert_count(), 0);
    assert_eq!(store.counts().await.unwrap().captures, 0);
    assert!(feedback.try_recv().is_err());

    // The session takes new scans right away.
    accepted(session.scan(code39("1234567892")).await.unwrap());
    assert_eq!(store.counts().await.unwrap().captures, 1);
}

#[tokio::test]
async fn test_abandon_after_insert_started_keeps_the_capture() {
    let dir = tempfile::tempdir().unwrap();
    let sqlite = SqliteStore::open(dir.path().join("capture.db")).unwrap();
    let store = Arc::new(GatedStore::new(sqlite));
    let session = spawn(Arc::clone(&store), CaptureConfig::default());
    let mut feedback = session.subscribe();

    let scan = {
        let session = session.clone();
        tokio::spawn(async move { session.scan(code39("1234567892")).await })
    };
    store.wait_until_parked().await;

    // Too late to cancel: the scan finishes and reports what it wrote.
    assert!(!session.abandon().await.unwrap());
    store.open();
    let record = accepted(scan.await.unwrap().unwrap());

    assert_eq!(
        feedback.recv().await.unwrap(),
        Feedback::Accepted {
            code: record.code.clone(),
            matched: false
        }
    );
    assert_eq!(store.list_captures(None).await.unwrap(), vec![record.clone()]);

    tokio::time::sleep(Duration::from_millis(5)).await;
    match session.scan(code39("1234567892")).await {
        Err(CaptureError::PersistenceFailure {
            cause: PersistenceCause::Duplicate { existing },
            ..
        }) => assert_eq!(existing, record.id),
        other => panic!("expected duplicate failure, got {:?}", other),
    }
    assert_eq!(store.counts().await.unwrap().captures, 1);
}

#[tokio::test]
async fn test_scan_after_session_stopped() {
    let (session, handle) = CaptureSession::new(
        Arc::new(MemoryStore::new()),
        OperationContext::Receiving,
        Platform::Other,
        &CaptureConfig::default(),
    );
    drop(session);

    assert!(handle.is_closed());
    assert!(matches!(
        handle.scan(code39("1234567892")).await,
        Err(CaptureError::SessionClosed)
    ));
    assert!(matches!(handle.abandon().await, Err(CaptureError::SessionClosed)));
}
