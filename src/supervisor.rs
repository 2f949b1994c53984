//! Listener lifecycle: subscription, ingest, and worker supervision.
//!
//! The listener holds one WebSocket subscription to the protocol contract
//! and splits the pipeline in two. An ingest task reads raw logs from the
//! stream, normalizes them, and pushes them onto a bounded queue; a worker
//! task pulls from the queue and spawns one dispatch per event, so a
//! read-through blocked on network I/O never stalls ingestion of unrelated
//! events. Overlapping dispatches are capped; sustained slowness fills the
//! queue and blocks ingestion instead of growing the task set.
//!
//! Disconnects are terminal: when the stream ends the ingest task logs the
//! loss and exits without reconnecting. Authentication failures at startup
//! are likewise never retried. `close` is idempotent and drains in a fixed
//! order: ingest first (releasing the stream handle), then the workers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use alloy::providers::Provider as _;
use futures_util::stream::StreamExt;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use crate::config::ListenerConfig;
use crate::error::{IndexerError, IndexerResult};
use crate::events::protocol_event_filter;
use crate::normalize::{self, NormalizedEvent};
use crate::router::EventRouter;
use crate::rpc;

/// How long `close` waits for in-flight reconciliation before abandoning it.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// A running event listener.
///
/// Owns the ingest and worker tasks; dropping without calling
/// [`EventListener::close`] aborts both.
pub struct EventListener {
    ws_connected: Arc<AtomicBool>,
    ingest: JoinHandle<()>,
    worker: JoinHandle<()>,
    closed: bool,
}

impl EventListener {
    /// Connect, subscribe to the protocol contract, and start the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::ConfigError`] for an unparseable protocol
    /// address, [`IndexerError::TransportError`] when the connection fails,
    /// and [`IndexerError::SubscriptionError`] when the subscription is
    /// rejected. Authentication failures are reported and never retried.
    #[instrument(skip_all, fields(protocol = %config.protocol_address))]
    pub async fn open(
        config: &ListenerConfig,
        router: Arc<EventRouter>,
        queue_capacity: usize,
    ) -> IndexerResult<Self> {
        let protocol_address: Address = config.protocol_address.parse().map_err(|e| {
            IndexerError::config(
                format!("Invalid protocol address: {}", config.protocol_address),
                Some(Box::new(e)),
            )
        })?;

        let provider = rpc::connect(&config.ws_url).await.map_err(|e| {
            if e.is_auth_failure() {
                error!("Node rejected credentials, not retrying");
            }
            e
        })?;

        let filter = protocol_event_filter(protocol_address);
        let subscription = provider.subscribe_logs(&filter).await.map_err(|e| {
            let err = IndexerError::subscription(
                format!("Log subscription failed: {e}"),
                Some(Box::new(e)),
            );
            if err.is_auth_failure() {
                error!("Node rejected credentials during subscription, not retrying");
            }
            err
        })?;

        info!(queue_capacity, "Event subscription active");

        let ws_connected = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::channel::<NormalizedEvent>(queue_capacity);

        let ingest = tokio::spawn(ingest_loop(
            subscription.into_stream(),
            tx,
            Arc::clone(&ws_connected),
        ));
        let worker = tokio::spawn(worker_loop(rx, router));

        Ok(Self {
            ws_connected,
            ingest,
            worker,
            closed: false,
        })
    }

    /// Shared connection flag, surfaced by the health endpoint.
    #[must_use]
    pub fn connection_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.ws_connected)
    }

    /// Stop the pipeline.
    ///
    /// Aborts ingest first so the stream handle is released exactly once,
    /// then waits up to [`DRAIN_TIMEOUT`] for queued and in-flight
    /// reconciliation to finish. Calling `close` again is a no-op.
    pub async fn close(&mut self) {
        if self.closed {
            debug!("Listener already closed");
            return;
        }
        self.closed = true;
        self.ws_connected.store(false, Ordering::SeqCst);

        info!("Closing event listener");
        self.ingest.abort();
        let _ = (&mut self.ingest).await;

        // The queue sender died with the ingest task; the worker exits once
        // the backlog is drained.
        match tokio::time::timeout(DRAIN_TIMEOUT, &mut self.worker).await {
            Ok(_) => info!("Event listener closed"),
            Err(_) => {
                warn!("Timed out draining reconciliation, abandoning in-flight handlers");
                self.worker.abort();
            }
        }
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        if !self.closed {
            self.ingest.abort();
            self.worker.abort();
        }
    }
}

/// Read raw logs, normalize, and queue. Exits when the stream ends or the
/// queue is closed; the stream ending is a terminal disconnect.
async fn ingest_loop<S>(
    mut stream: S,
    tx: mpsc::Sender<NormalizedEvent>,
    ws_connected: Arc<AtomicBool>,
) where
    S: futures_util::Stream<Item = alloy::rpc::types::Log> + Unpin,
{
    while let Some(log) = stream.next().await {
        match normalize::normalize(&log) {
            Ok(event) => {
                debug!(event = event.name(), "Queued event");
                if tx.send(event).await.is_err() {
                    debug!("Event queue closed, stopping ingest");
                    break;
                }
            }
            Err(IndexerError::MalformedEvent { ref event, ref message, .. })
                if event == "unknown" =>
            {
                warn!(message, "Dropping unrecognized event");
            }
            Err(e) => {
                error!(error = %e, "Dropping malformed event");
            }
        }
    }

    ws_connected.store(false, Ordering::SeqCst);
    error!("Event stream ended, listener is offline until restart");
}

/// Ceiling on overlapping dispatches. Once reached the worker stops
/// receiving, the queue fills, and `ingest_loop` blocks on `send`.
const MAX_IN_FLIGHT: usize = 32;

/// Pull queued events and spawn one dispatch per event.
///
/// Dispatches overlap up to [`MAX_IN_FLIGHT`]; per-entity serialization
/// happens inside the reconciler's locks, not here.
async fn worker_loop(mut rx: mpsc::Receiver<NormalizedEvent>, router: Arc<EventRouter>) {
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            maybe_event = rx.recv(), if in_flight.len() < MAX_IN_FLIGHT => match maybe_event {
                Some(event) => {
                    let router = Arc::clone(&router);
                    in_flight.spawn(async move {
                        router.dispatch(event).await;
                    });
                }
                None => break,
            },
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
        }
    }

    // Queue closed; drain what is still running.
    while in_flight.join_next().await.is_some() {}
    debug!("Reconciliation worker stopped");
}
