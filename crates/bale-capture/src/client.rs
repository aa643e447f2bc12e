//! The capture client: one entry point over store, sessions and sync.

use std::sync::Arc;

use bale_capture_core::{BaleCode, OperationContext, ResolvedCapture};
use bale_capture_store::{SqliteStore, Store, StoreCounts};
use bale_capture_sync::{
    ExportReport, ExportSink, Exporter, LinkMonitor, ReplicationReport, Replicator, UnitSource,
};

use crate::config::Config;
use crate::error::Result;
use crate::matcher::{MatchOutcome, Matcher};
use crate::session::{CaptureSession, SessionHandle};

/// The main client struct.
///
/// Provides a unified API for:
/// - Opening capture sessions
/// - Looking up units
/// - Reading captures with their current units
/// - Replicating units in and exporting captures out
pub struct CaptureClient<S: Store + 'static> {
    /// The storage backend, shared with every session.
    store: Arc<S>,
    /// Configuration.
    config: Config,
    /// Remote link status, fed by replication and export.
    link: LinkMonitor,
}

impl CaptureClient<SqliteStore> {
    /// Open the store named by the configuration and build a client on it.
    pub fn open(config: Config) -> anyhow::Result<Self> {
        let store = config.open_store()?;
        Ok(Self::new(store, config))
    }
}

impl<S: Store + 'static> CaptureClient<S> {
    /// Create a new client instance.
    pub fn new(store: S, config: Config) -> Self {
        Self::with_shared_store(Arc::new(store), config)
    }

    /// Create a client over a store that is also used elsewhere.
    pub fn with_shared_store(store: Arc<S>, config: Config) -> Self {
        Self {
            store,
            config,
            link: LinkMonitor::new(),
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Capture
    // ─────────────────────────────────────────────────────────────────────────

    /// Start a capture session for one operation context.
    ///
    /// Must be called within a tokio runtime.
    pub fn open_session(&self, context: OperationContext) -> SessionHandle {
        CaptureSession::spawn(
            Arc::clone(&self.store),
            context,
            self.config.device.platform,
            &self.config.session,
        )
    }

    /// Look up the unit for a validated code, with the session retry policy.
    pub async fn lookup(&self, code: &BaleCode) -> Result<MatchOutcome> {
        Matcher::new(Arc::clone(&self.store))
            .lookup_with_retry(code, &self.config.session.retry_policy())
            .await
    }

    /// Captures joined with the units known now, oldest first.
    pub async fn captures(&self, context: Option<OperationContext>) -> Result<Vec<ResolvedCapture>> {
        Ok(self.store.resolve_captures(context).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync
    // ─────────────────────────────────────────────────────────────────────────

    /// Pull unit changes from `source` until it has nothing newer.
    pub async fn replicate<U: UnitSource>(&self, source: U) -> Result<ReplicationReport> {
        Ok(self.replicator(source).drain().await?)
    }

    /// A replicator bound to this client's store, for running in the background.
    pub fn replicator<U: UnitSource>(&self, source: U) -> Replicator<Arc<S>, U> {
        Replicator::new(Arc::clone(&self.store), source, self.config.sync.clone())
            .with_link(self.link.clone())
    }

    /// Export pending captures to `sink`.
    pub async fn export<K: ExportSink>(&self, sink: K) -> Result<ExportReport> {
        let exporter = Exporter::new(
            Arc::clone(&self.store),
            sink,
            self.config.sync.clone(),
            self.link.clone(),
        );
        Ok(exporter.pass().await?)
    }

    /// Remote link status.
    pub fn link(&self) -> &LinkMonitor {
        &self.link
    }

    /// Row counts, for diagnostics.
    pub async fn counts(&self) -> Result<StoreCounts> {
        Ok(self.store.counts().await?)
    }
}
