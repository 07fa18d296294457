//! The coalescing batch writer: one lazily-created background worker per
//! `(database, retention_policy)` key, flushing on size or a ticker, fanning
//! a single shared error out to every captured callback.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result, SharedError};
use crate::line_protocol::{encode, encode_batch};
use crate::metrics_sink::MetricsSink;
use crate::point::Point;
use crate::transport::{CompressMethod, WriteRequest};

/// Knobs controlling whether, and how, writes are coalesced.
///
/// Batching only activates when both fields are positive; a zero
/// `batch_size` or zero `batch_interval` means every `write_point` call goes
/// straight to the wire.
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    /// Points accumulated per key before a synchronous flush is forced.
    pub batch_size: usize,
    /// Maximum time a point waits in an under-full batch before flushing.
    pub batch_interval: Duration,
    /// Compression applied to the flushed body.
    pub compress: CompressMethod,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 0,
            batch_interval: Duration::ZERO,
            compress: CompressMethod::None,
        }
    }
}

impl BatchConfig {
    /// Whether batching is active for this configuration.
    pub fn enabled(&self) -> bool {
        self.batch_size > 0 && !self.batch_interval.is_zero()
    }
}

type BatchKey = (String, Option<String>);

struct QueuedRecord {
    point: Point,
    ack: oneshot::Sender<std::result::Result<(), SharedError>>,
}

/// The coalescing writer: owns the lazy per-key channel registry and spawns
/// one worker task per key on first use.
pub struct BatchWriter {
    dispatcher: Arc<Dispatcher>,
    config: BatchConfig,
    metrics: Arc<dyn MetricsSink>,
    cancel: CancellationToken,
    channels: Mutex<HashMap<BatchKey, mpsc::Sender<QueuedRecord>>>,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BatchWriter {
    /// Build a batch writer over an already-constructed dispatcher.
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        config: BatchConfig,
        metrics: Arc<dyn MetricsSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            dispatcher,
            config,
            metrics,
            cancel,
            channels: Mutex::new(HashMap::new()),
            worker_handles: Mutex::new(Vec::new()),
        }
    }

    /// Join every spawned per-key worker task. Intended to be called after
    /// the writer's cancellation token has fired, as part of client
    /// shutdown, so no worker task outlives `Client::close`.
    pub async fn join_workers(&self) {
        let mut handles = self.worker_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
    }

    /// Enqueue (or, if batching is disabled, immediately send) a single
    /// point for `(database, retention_policy)`.
    ///
    /// The returned error is an [`SharedError`] because a batched write may
    /// share its outcome with every other point flushed in the same batch.
    pub async fn write_point(
        &self,
        database: &str,
        retention_policy: Option<&str>,
        point: Point,
    ) -> std::result::Result<(), SharedError> {
        if !self.config.enabled() {
            return self
                .direct_write(database, retention_policy, std::slice::from_ref(&point))
                .await
                .map_err(Arc::new);
        }

        if self.cancel.is_cancelled() {
            return Err(Arc::new(Error::Cancelled));
        }

        let sender = self
            .channel_for(database.to_string(), retention_policy.map(str::to_string))
            .await;

        let (ack_tx, ack_rx) = oneshot::channel();
        if sender
            .send(QueuedRecord { point, ack: ack_tx })
            .await
            .is_err()
        {
            return Err(Arc::new(Error::Cancelled));
        }

        ack_rx.await.unwrap_or(Err(Arc::new(Error::Cancelled)))
    }

    /// Write a whole batch of points synchronously, bypassing the
    /// coalescing machinery entirely, regardless of whether batching is
    /// configured.
    pub async fn write_batch_points(
        &self,
        database: &str,
        retention_policy: Option<&str>,
        points: &[Point],
    ) -> std::result::Result<(), SharedError> {
        self.direct_write(database, retention_policy, points)
            .await
            .map_err(Arc::new)
    }

    async fn direct_write(
        &self,
        database: &str,
        retention_policy: Option<&str>,
        points: &[Point],
    ) -> Result<()> {
        let rp = retention_policy.map(str::to_string);
        self.metrics
            .write_attempted(database, rp.as_deref().unwrap_or(""));
        let start = Instant::now();

        let body = if points.len() == 1 {
            encode(&points[0])
        } else {
            encode_batch(points)
        };
        let request = WriteRequest {
            database: database.to_string(),
            retention_policy: rp.clone(),
            body,
            compress: self.config.compress,
        };

        let result = self.dispatcher.dispatch_write(request).await;
        match &result {
            Ok(()) => self.metrics.write_succeeded(
                database,
                rp.as_deref().unwrap_or(""),
                points.len(),
                start.elapsed(),
            ),
            Err(_) => self
                .metrics
                .write_failed(database, rp.as_deref().unwrap_or("")),
        }
        result
    }

    async fn channel_for(
        &self,
        database: String,
        retention_policy: Option<String>,
    ) -> mpsc::Sender<QueuedRecord> {
        let key = (database.clone(), retention_policy.clone());
        let mut channels = self.channels.lock().await;
        if let Some(sender) = channels.get(&key) {
            return sender.clone();
        }

        let capacity = (self.config.batch_size * 2).max(1);
        let (tx, rx) = mpsc::channel(capacity);
        channels.insert(key, tx.clone());
        drop(channels);

        let worker = Worker {
            database,
            retention_policy,
            dispatcher: Arc::clone(&self.dispatcher),
            config: self.config,
            metrics: Arc::clone(&self.metrics),
            cancel: self.cancel.clone(),
        };
        let handle = tokio::spawn(worker.run(rx));
        self.worker_handles.lock().await.push(handle);

        tx
    }
}

struct Worker {
    database: String,
    retention_policy: Option<String>,
    dispatcher: Arc<Dispatcher>,
    config: BatchConfig,
    metrics: Arc<dyn MetricsSink>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self, mut rx: mpsc::Receiver<QueuedRecord>) {
        let mut points: Vec<Point> = Vec::new();
        let mut acks: Vec<oneshot::Sender<std::result::Result<(), SharedError>>> = Vec::new();
        let mut ticker = tokio::time::interval(self.config.batch_interval);
        ticker.tick().await; // first tick fires immediately; consume it.

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(db = %self.database, "batch worker cancelled, draining");
                    Self::fail_all(&mut acks, Error::Cancelled);
                    while let Ok(record) = rx.try_recv() {
                        let _ = record.ack.send(Err(Arc::new(Error::Cancelled)));
                    }
                    break;
                }
                maybe = rx.recv() => {
                    match maybe {
                        Some(record) => {
                            points.push(record.point);
                            acks.push(record.ack);
                            if points.len() >= self.config.batch_size {
                                self.flush(&mut points, &mut acks).await;
                                ticker.reset();
                            }
                        }
                        None => {
                            if !points.is_empty() {
                                self.flush(&mut points, &mut acks).await;
                            }
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    if !points.is_empty() {
                        self.flush(&mut points, &mut acks).await;
                    }
                }
            }
        }
    }

    fn fail_all(
        acks: &mut Vec<oneshot::Sender<std::result::Result<(), SharedError>>>,
        error: Error,
    ) {
        let shared = Arc::new(error);
        for ack in acks.drain(..) {
            let _ = ack.send(Err(shared.clone()));
        }
    }

    async fn flush(
        &self,
        points: &mut Vec<Point>,
        acks: &mut Vec<oneshot::Sender<std::result::Result<(), SharedError>>>,
    ) {
        let rp = self.retention_policy.clone();
        self.metrics
            .write_attempted(&self.database, rp.as_deref().unwrap_or(""));
        let start = Instant::now();

        let body = encode_batch(points.iter());
        let request = WriteRequest {
            database: self.database.clone(),
            retention_policy: rp.clone(),
            body,
            compress: self.config.compress,
        };

        let result = self.dispatcher.dispatch_write(request).await;
        match &result {
            Ok(()) => self.metrics.write_succeeded(
                &self.database,
                rp.as_deref().unwrap_or(""),
                points.len(),
                start.elapsed(),
            ),
            Err(e) => {
                warn!(db = %self.database, error = %e, "batch flush failed");
                self.metrics
                    .write_failed(&self.database, rp.as_deref().unwrap_or(""));
            }
        }

        let shared_err = result.err().map(Arc::new);
        for ack in acks.drain(..) {
            let outcome = match &shared_err {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            };
            let _ = ack.send(outcome);
        }
        points.clear();
    }
}
