//! Capture session: the per-operator scan loop.
//!
//! A session is an actor. [`SessionHandle`] sends commands into a bounded
//! mailbox; [`CaptureSession::run`] takes them one at a time. While a scan is
//! being matched and persisted, the actor keeps draining the mailbox and
//! answers every other scan with `Ignored(Busy)`, so one accepted scan yields
//! at most one record no matter how fast the scanner fires.
//!
//! [`SessionHandle::abandon`] cancels a scan while it is being matched. Once
//! the insert has been handed to the store the scan runs to completion, so
//! an abandoned scan never leaves a record behind.
//!
//! ```text
//! Idle ──scan──> Scanning ──valid──> Accepted(code) ──persisted──> Idle
//!                    └────invalid──> Rejected(reason) ──cooldown──> Idle
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use bale_capture_core::{
    normalize, validate, BaleCode, CaptureRecord, InvalidReason, OperationContext, Platform,
    ScanEvent, ScanSource, UnitMatch, ValidationResult,
};
use bale_capture_store::{now_millis, InsertResult, Store};

use crate::error::{CaptureError, PersistenceCause, Result};
use crate::matcher::{Matcher, RetryPolicy};

/// Tuning for capture sessions.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// How long a rejected scan blocks further scans.
    pub reject_cooldown_ms: u64,
    /// Lookup attempts before a store failure is surfaced.
    pub lookup_attempts: u32,
    /// Pause between lookup attempts.
    pub retry_backoff_ms: u64,
    /// Commands buffered in the session mailbox.
    pub mailbox_capacity: usize,
    /// Feedback events buffered per subscriber.
    pub feedback_capacity: usize,
}

impl CaptureConfig {
    pub fn reject_cooldown(&self) -> Duration {
        Duration::from_millis(self.reject_cooldown_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.lookup_attempts,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            reject_cooldown_ms: 1500,
            lookup_attempts: 3,
            retry_backoff_ms: 50,
            mailbox_capacity: 32,
            feedback_capacity: 64,
        }
    }
}

/// Observable state of a session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    /// Normalizing and validating a scan.
    Scanning,
    /// A valid code is being matched and persisted.
    Accepted(BaleCode),
    /// The last scan was invalid; further scans are ignored until the
    /// cooldown ends.
    Rejected(InvalidReason),
}

/// What the UI should render for a processed scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feedback {
    Accepted { code: BaleCode, matched: bool },
    Rejected(InvalidReason),
    /// The store could not be read; the code is fine, scan again later.
    TransientError { code: BaleCode },
    PersistenceFailure { code: BaleCode },
}

/// Why a scan was dropped without being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Another scan was in flight.
    Busy,
    /// A rejection cooldown was running.
    CoolingDown,
}

/// Result of a scan as seen by its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Accepted(CaptureRecord),
    Rejected(InvalidReason),
    Ignored(IgnoreReason),
    /// The caller abandoned the scan before it finished.
    Abandoned,
}

enum Command {
    Scan {
        event: ScanEvent,
        reply: oneshot::Sender<Result<ScanOutcome>>,
    },
    Abandon {
        reply: oneshot::Sender<bool>,
    },
}

/// Cloneable front end of a capture session.
///
/// The actor stops once every handle is dropped.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Command>,
    phase: watch::Receiver<SessionPhase>,
    feedback: broadcast::Sender<Feedback>,
    context: OperationContext,
}

impl SessionHandle {
    /// Submit a scan and wait for its outcome.
    pub async fn scan(&self, event: ScanEvent) -> Result<ScanOutcome> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Scan { event, reply })
            .await
            .map_err(|_| CaptureError::SessionClosed)?;
        rx.await.map_err(|_| CaptureError::SessionClosed)?
    }

    /// Cancel the scan in flight, if any. Returns whether it was cancelled.
    ///
    /// Only a scan still being matched can be cancelled; one whose record is
    /// already being written runs to completion and this returns false.
    pub async fn abandon(&self) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Abandon { reply })
            .await
            .map_err(|_| CaptureError::SessionClosed)?;
        rx.await.map_err(|_| CaptureError::SessionClosed)
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase.borrow().clone()
    }

    pub fn watch_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase.clone()
    }

    /// Subscribe to feedback events. Only events sent after this call are seen.
    pub fn subscribe(&self) -> broadcast::Receiver<Feedback> {
        self.feedback.subscribe()
    }

    pub fn context(&self) -> OperationContext {
        self.context
    }

    /// Whether the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Match-then-persist work for one accepted code.
struct Pipeline<S: Store> {
    store: Arc<S>,
    context: OperationContext,
    retry: RetryPolicy,
}

impl<S: Store> Clone for Pipeline<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            context: self.context,
            retry: self.retry,
        }
    }
}

impl<S: Store> Pipeline<S> {
    /// Match the code and build its record. Nothing is written.
    async fn prepare(&self, code: BaleCode) -> Result<CaptureRecord> {
        let matcher = Matcher::new(Arc::clone(&self.store));
        let outcome = matcher.lookup_with_retry(&code, &self.retry).await?;

        Ok(CaptureRecord::new(code, self.context, now_millis())
            .with_match(outcome.unit().map(UnitMatch::from)))
    }

    async fn persist(&self, record: CaptureRecord) -> Result<CaptureRecord> {
        match self.store.insert_capture(&record).await {
            Ok(InsertResult::Inserted) | Ok(InsertResult::AlreadyExists) => {
                info!(
                    code = %record.code,
                    context = %record.context,
                    matched = record.is_matched(),
                    id = %record.id,
                    "capture_persisted"
                );
                Ok(record)
            }
            Ok(InsertResult::Conflict { existing }) => Err(CaptureError::PersistenceFailure {
                code: record.code,
                context: record.context,
                cause: PersistenceCause::Duplicate { existing },
            }),
            Err(e) => Err(CaptureError::PersistenceFailure {
                code: record.code,
                context: record.context,
                cause: PersistenceCause::Store(e),
            }),
        }
    }
}

/// The session actor.
pub struct CaptureSession<S: Store> {
    pipeline: Pipeline<S>,
    platform: Platform,
    cooldown: Duration,
    rx: mpsc::Receiver<Command>,
    phase: watch::Sender<SessionPhase>,
    feedback: broadcast::Sender<Feedback>,
}

impl<S: Store + 'static> CaptureSession<S> {
    /// Create the actor and its handle without starting it.
    pub fn new(
        store: Arc<S>,
        context: OperationContext,
        platform: Platform,
        config: &CaptureConfig,
    ) -> (Self, SessionHandle) {
        let (tx, rx) = mpsc::channel(config.mailbox_capacity.max(1));
        let (phase_tx, phase_rx) = watch::channel(SessionPhase::Idle);
        let (feedback, _) = broadcast::channel(config.feedback_capacity.max(1));

        let session = Self {
            pipeline: Pipeline {
                store,
                context,
                retry: config.retry_policy(),
            },
            platform,
            cooldown: config.reject_cooldown(),
            rx,
            phase: phase_tx,
            feedback: feedback.clone(),
        };
        let handle = SessionHandle {
            tx,
            phase: phase_rx,
            feedback,
            context,
        };
        (session, handle)
    }

    /// Create the actor and run it on the current tokio runtime.
    pub fn spawn(
        store: Arc<S>,
        context: OperationContext,
        platform: Platform,
        config: &CaptureConfig,
    ) -> SessionHandle {
        let (session, handle) = Self::new(store, context, platform, config);
        tokio::spawn(session.run());
        handle
    }

    /// Process commands until every handle is gone.
    pub async fn run(mut self) {
        let context = self.pipeline.context;
        info!(context = %context, platform = ?self.platform, "capture_session_started");

        while let Some(command) = self.rx.recv().await {
            let closed = match command {
                Command::Abandon { reply } => {
                    let _ = reply.send(false);
                    false
                }
                Command::Scan { event, reply } => self.process(event, reply).await,
            };
            if closed {
                break;
            }
        }

        info!(context = %context, "capture_session_stopped");
    }

    /// Handle one scan. Returns true if the mailbox closed meanwhile.
    async fn process(
        &mut self,
        event: ScanEvent,
        reply: oneshot::Sender<Result<ScanOutcome>>,
    ) -> bool {
        self.set_phase(SessionPhase::Scanning);

        let source = ScanSource::new(event.symbology, self.platform);
        let normalized = normalize(&event.payload, source);
        debug!(
            symbology = ?event.symbology,
            raw = %event.payload,
            normalized = %normalized,
            "scan_normalized"
        );

        let closed = match validate(&normalized) {
            ValidationResult::Invalid(reason) => {
                warn!(normalized = %normalized, reason = reason.tag(), "scan_rejected");
                self.set_phase(SessionPhase::Rejected(reason));
                self.emit(Feedback::Rejected(reason));
                let _ = reply.send(Ok(ScanOutcome::Rejected(reason)));
                self.cool_down().await
            }
            ValidationResult::Valid(code) => {
                self.set_phase(SessionPhase::Accepted(code.clone()));
                self.capture(code, reply).await
            }
        };

        self.set_phase(SessionPhase::Idle);
        closed
    }

    /// Ignore scans until the cooldown deadline passes.
    async fn cool_down(&mut self) -> bool {
        let deadline = tokio::time::sleep_until(Instant::now() + self.cooldown);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => return false,
                command = self.rx.recv() => match command {
                    Some(Command::Scan { reply, .. }) => {
                        debug!("scan_ignored_cooling_down");
                        let _ = reply.send(Ok(ScanOutcome::Ignored(IgnoreReason::CoolingDown)));
                    }
                    Some(Command::Abandon { reply }) => {
                        let _ = reply.send(false);
                    }
                    None => return true,
                },
            }
        }
    }

    /// Match and persist a valid code, ignoring scans until it is done.
    ///
    /// Abandon only cancels the match. Once the insert is dispatched it may
    /// already be running on a blocking thread, so it is seen through and
    /// its real outcome reported.
    async fn capture(
        &mut self,
        code: BaleCode,
        reply: oneshot::Sender<Result<ScanOutcome>>,
    ) -> bool {
        let pipeline = self.pipeline.clone();
        let mut closed = false;

        let prepared = self
            .drive(&code, pipeline.prepare(code.clone()), true, &mut closed)
            .await;
        let finished = match prepared {
            Some(Ok(record)) => {
                self.drive(&code, pipeline.persist(record), false, &mut closed)
                    .await
            }
            other => other,
        };

        let outcome = match finished {
            None => {
                warn!(code = %code, "capture_abandoned");
                Ok(ScanOutcome::Abandoned)
            }
            Some(Ok(record)) => {
                self.emit(Feedback::Accepted {
                    code,
                    matched: record.is_matched(),
                });
                Ok(ScanOutcome::Accepted(record))
            }
            Some(Err(e)) => {
                let feedback = match &e {
                    CaptureError::TransientStoreUnavailable { .. } => {
                        warn!(
                            code = %code,
                            error = %e,
                            retryable = e.is_retryable(),
                            "capture_store_unavailable"
                        );
                        Feedback::TransientError { code }
                    }
                    _ => {
                        error!(code = %code, error = %e, "capture_persistence_failed");
                        Feedback::PersistenceFailure { code }
                    }
                };
                self.emit(feedback);
                Err(e)
            }
        };

        let _ = reply.send(outcome);
        closed
    }

    /// Run `work` while answering the mailbox. Scans get `Busy`; an abandon
    /// drops `work` and yields `None` only when `abandonable`.
    async fn drive<F: Future>(
        &mut self,
        code: &BaleCode,
        work: F,
        abandonable: bool,
        closed: &mut bool,
    ) -> Option<F::Output> {
        tokio::pin!(work);

        loop {
            tokio::select! {
                result = &mut work => return Some(result),
                command = self.rx.recv(), if !*closed => match command {
                    Some(Command::Scan { reply, .. }) => {
                        debug!(in_flight = %code, "scan_ignored_busy");
                        let _ = reply.send(Ok(ScanOutcome::Ignored(IgnoreReason::Busy)));
                    }
                    Some(Command::Abandon { reply }) => {
                        let _ = reply.send(abandonable);
                        if abandonable {
                            return None;
                        }
                        debug!(code = %code, "abandon_refused_insert_started");
                    }
                    // Handles are gone; finish the work, then stop.
                    None => *closed = true,
                },
            }
        }
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.phase.send_replace(phase);
    }

    fn emit(&self, feedback: Feedback) {
        // No subscribers is fine.
        let _ = self.feedback.send(feedback);
    }
}
