//! Offloads parsing, filtering, and conversion to a dedicated thread.
//!
//! [`BackgroundProcessor`] owns one OS thread fed through a channel.
//! Requests carry an id; the thread answers through a per-request oneshot
//! registered in a pending map. Every round-trip is bounded by a timeout and
//! any worker failure reruns the same transform inline, so callers always
//! receive the same output regardless of which path produced it.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
        mpsc,
    },
    thread,
    time::{Duration, Instant},
};

use firewatch_core::{EventDelta, EventRecord, QueryParams};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;

mod protocol;
mod transforms;

pub use protocol::{WorkerKind, WorkerOutput, WorkerPayload};
pub use transforms::{
    DisplayFeature, DisplayGeometry, DisplayProperties, TransformError, convert_to_display,
    deduplicate_events, filter_events, merge_event_sets, parse_and_filter, parse_deltas,
    parse_events,
};

use protocol::{WorkerRequest, WorkerResponse};

/// Default record count below which work runs inline.
pub const DEFAULT_THRESHOLD: usize = 250;

/// Default bound on a single worker round-trip.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for [`BackgroundProcessor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Whether to start the worker thread at all.
    pub enabled: bool,
    /// Inputs with fewer records than this run inline.
    pub threshold: usize,
    /// Bound on a single round-trip.
    pub timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: DEFAULT_THRESHOLD,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl WorkerConfig {
    /// Set the inline threshold.
    #[must_use]
    pub const fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the round-trip timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Disable the worker thread; everything runs inline.
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Which path produced an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingPath {
    /// The background thread.
    Worker,
    /// Inline on the caller's task.
    Synchronous,
}

/// Timing and volume of one processed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessMetrics {
    /// Records in the input.
    pub input_count: usize,
    /// Items in the output.
    pub output_count: usize,
    /// Wall-clock processing time, including any failed worker attempt.
    pub duration: Duration,
    /// Path that produced the output.
    pub path: ProcessingPath,
}

/// Output of a processed request plus its metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutput<T> {
    /// Transform output.
    pub data: T,
    /// How it was produced.
    pub metrics: ProcessMetrics,
}

/// Reasons a worker round-trip fell back to the inline path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
enum WorkerError {
    #[error("worker is not running")]
    Unavailable,
    #[error("worker did not answer within {0:?}")]
    Timeout(Duration),
    #[error("worker dropped the request")]
    Disconnected,
    #[error("worker reported: {0}")]
    Failed(String),
    #[error("worker answered {0:?} with an unexpected output")]
    UnexpectedOutput(WorkerKind),
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<WorkerResponse>>>>;

#[derive(Debug)]
struct WorkerHandle {
    sender: mpsc::Sender<WorkerRequest>,
}

/// Runs transforms on one background thread with an inline fallback.
///
/// # Examples
///
/// ```
/// use firewatch_core::QueryParams;
/// use firewatch_data::{BackgroundProcessor, ProcessingPath, WorkerConfig};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let processor = BackgroundProcessor::new(WorkerConfig::default());
/// let output = processor.process("[]", &QueryParams::default()).await?;
/// assert!(output.data.is_empty());
/// assert_eq!(output.metrics.path, ProcessingPath::Synchronous);
/// # Ok::<(), firewatch_data::TransformError>(())
/// # }).unwrap();
/// ```
#[derive(Debug)]
pub struct BackgroundProcessor {
    config: WorkerConfig,
    worker: Mutex<Option<WorkerHandle>>,
    pending: Pending,
    next_id: AtomicU64,
    last_metrics: Mutex<Option<ProcessMetrics>>,
}

impl BackgroundProcessor {
    /// Create a processor and start its thread when enabled.
    #[must_use]
    pub fn new(config: WorkerConfig) -> Self {
        let processor = Self {
            config,
            worker: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            last_metrics: Mutex::new(None),
        };
        if processor.config.enabled {
            processor.start();
        }
        processor
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Whether the worker thread is accepting requests.
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.worker).is_some()
    }

    /// Metrics of the most recent request.
    #[must_use]
    pub fn last_metrics(&self) -> Option<ProcessMetrics> {
        *lock(&self.last_metrics)
    }

    /// Verify the worker answers; restarts it once if it does not.
    ///
    /// Returns whether the worker is usable afterwards. Inline processing
    /// keeps working either way.
    pub async fn init(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        if !self.is_running() {
            self.start();
        }
        let payload = Arc::new(WorkerPayload::Empty);
        let params = QueryParams::default();
        if self
            .round_trip(WorkerKind::Init, Arc::clone(&payload), params)
            .await
            .is_ok()
        {
            return true;
        }
        warn!("background worker did not answer init; restarting");
        self.restart();
        self.round_trip(WorkerKind::Init, payload, params).await.is_ok()
    }

    /// Reject every in-flight request, then replace the worker thread.
    pub fn restart(&self) {
        self.shutdown();
        if self.config.enabled {
            self.start();
        }
    }

    /// Stop the worker thread. Later requests run inline.
    pub fn destroy(&self) {
        self.shutdown();
    }

    /// Decode and filter raw JSON, reporting metrics.
    pub async fn process(
        &self,
        raw: &str,
        params: &QueryParams,
    ) -> Result<ProcessOutput<Vec<EventRecord>>, TransformError> {
        let payload = WorkerPayload::Raw(raw.to_owned());
        let output = self
            .execute(WorkerKind::ParseAndFilter, payload, params)
            .await?;
        map_output(output, WorkerKind::ParseAndFilter, |out| match out {
            WorkerOutput::Events(events) => Some(events),
            _ => None,
        })
    }

    /// Decode and filter raw JSON.
    pub async fn parse_and_filter(
        &self,
        raw: &str,
        params: &QueryParams,
    ) -> Result<Vec<EventRecord>, TransformError> {
        self.process(raw, params).await.map(|output| output.data)
    }

    /// Decode a JSON array of deltas.
    pub async fn parse_deltas(&self, raw: &str) -> Result<Vec<EventDelta>, TransformError> {
        let payload = WorkerPayload::Raw(raw.to_owned());
        let output = self
            .execute(WorkerKind::DeltaParse, payload, &QueryParams::default())
            .await?;
        map_output(output, WorkerKind::DeltaParse, |out| match out {
            WorkerOutput::Deltas(deltas) => Some(deltas),
            _ => None,
        })
        .map(|output| output.data)
    }

    /// Keep records satisfying `params`.
    pub async fn filter_by_bounds(
        &self,
        events: Vec<EventRecord>,
        params: &QueryParams,
    ) -> Vec<EventRecord> {
        if params.is_unfiltered() {
            return events;
        }
        let fallback = events.clone();
        self.events_op(WorkerKind::Filter, WorkerPayload::Events(events), params)
            .await
            .unwrap_or_else(|_| filter_events(fallback, params))
    }

    /// Convert records to display features.
    pub async fn convert_to_display_form(&self, events: Vec<EventRecord>) -> Vec<DisplayFeature> {
        let fallback = convert_to_display(&events);
        let output = self
            .execute(
                WorkerKind::ConvertToDisplay,
                WorkerPayload::Events(events),
                &QueryParams::default(),
            )
            .await;
        match output {
            Ok(ProcessOutput {
                data: WorkerOutput::Display(features),
                ..
            }) => features,
            _ => fallback,
        }
    }

    /// Union record sets; later sets win per id.
    pub async fn merge(&self, sets: Vec<Vec<EventRecord>>) -> Vec<EventRecord> {
        let fallback = merge_event_sets(&sets);
        self.events_op(
            WorkerKind::Merge,
            WorkerPayload::EventSets(sets),
            &QueryParams::default(),
        )
        .await
        .unwrap_or(fallback)
    }

    /// Collapse duplicate ids, keeping the newest record.
    pub async fn deduplicate(&self, events: Vec<EventRecord>) -> Vec<EventRecord> {
        let fallback = events.clone();
        self.events_op(
            WorkerKind::Deduplicate,
            WorkerPayload::Events(events),
            &QueryParams::default(),
        )
        .await
        .unwrap_or_else(|_| deduplicate_events(fallback))
    }

    async fn events_op(
        &self,
        kind: WorkerKind,
        payload: WorkerPayload,
        params: &QueryParams,
    ) -> Result<Vec<EventRecord>, TransformError> {
        let output = self.execute(kind, payload, params).await?;
        map_output(output, kind, |out| match out {
            WorkerOutput::Events(events) => Some(events),
            _ => None,
        })
        .map(|output| output.data)
    }

    /// Run `kind` on the worker when worthwhile, inline otherwise or on any
    /// worker failure.
    async fn execute(
        &self,
        kind: WorkerKind,
        payload: WorkerPayload,
        params: &QueryParams,
    ) -> Result<ProcessOutput<WorkerOutput>, TransformError> {
        let started = Instant::now();
        let input_count = payload.record_count();
        let shared = Arc::new(payload);

        if self.config.enabled && input_count >= self.config.threshold && self.is_running() {
            match self.round_trip(kind, Arc::clone(&shared), *params).await {
                Ok(data) => {
                    return Ok(self.finish(data, input_count, started, ProcessingPath::Worker));
                }
                Err(WorkerError::Timeout(after)) => {
                    warn!("worker timed out after {after:?} on {kind:?}; restarting and running inline");
                    self.restart();
                }
                Err(err) => debug!("falling back to inline {kind:?}: {err}"),
            }
        }

        let data = transforms::run(kind, &shared, params)?;
        Ok(self.finish(data, input_count, started, ProcessingPath::Synchronous))
    }

    fn finish(
        &self,
        data: WorkerOutput,
        input_count: usize,
        started: Instant,
        path: ProcessingPath,
    ) -> ProcessOutput<WorkerOutput> {
        let metrics = ProcessMetrics {
            input_count,
            output_count: data.len(),
            duration: started.elapsed(),
            path,
        };
        *lock(&self.last_metrics) = Some(metrics);
        ProcessOutput { data, metrics }
    }

    async fn round_trip(
        &self,
        kind: WorkerKind,
        payload: Arc<WorkerPayload>,
        params: QueryParams,
    ) -> Result<WorkerOutput, WorkerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);

        let sent = match lock(&self.worker).as_ref() {
            Some(handle) => handle
                .sender
                .send(WorkerRequest {
                    id,
                    kind,
                    payload,
                    params,
                })
                .map_err(|_| WorkerError::Disconnected),
            None => Err(WorkerError::Unavailable),
        };
        if let Err(err) = sent {
            lock(&self.pending).remove(&id);
            return Err(err);
        }

        match tokio::time::timeout(self.config.timeout, rx).await {
            Ok(Ok(response)) => {
                debug_assert_eq!(response.id, id);
                let output = response.result.map_err(WorkerError::Failed)?;
                if response.kind == kind {
                    Ok(output)
                } else {
                    Err(WorkerError::UnexpectedOutput(kind))
                }
            }
            Ok(Err(_)) => Err(WorkerError::Disconnected),
            Err(_) => {
                lock(&self.pending).remove(&id);
                Err(WorkerError::Timeout(self.config.timeout))
            }
        }
    }

    fn start(&self) {
        let (sender, receiver) = mpsc::channel::<WorkerRequest>();
        let pending = Arc::clone(&self.pending);
        let spawned = thread::Builder::new()
            .name("firewatch-worker".to_owned())
            .spawn(move || worker_loop(&receiver, &pending));
        match spawned {
            Ok(_) => {
                debug!("background worker started");
                *lock(&self.worker) = Some(WorkerHandle { sender });
            }
            Err(err) => warn!("failed to start background worker: {err}; processing inline"),
        }
    }

    fn shutdown(&self) {
        let previous = lock(&self.worker).take();
        let rejected: Vec<_> = lock(&self.pending).drain().collect();
        if !rejected.is_empty() {
            debug!("rejecting {} in-flight worker requests", rejected.len());
        }
        for (id, tx) in rejected {
            let response = WorkerResponse {
                id,
                kind: WorkerKind::Init,
                result: Err("worker restarted".to_owned()),
            };
            if tx.send(response).is_err() {
                debug!("worker request {id} was already abandoned");
            }
        }
        if previous.is_some() {
            debug!("background worker stopped");
        }
    }
}

impl Drop for BackgroundProcessor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(receiver: &mpsc::Receiver<WorkerRequest>, pending: &Pending) {
    for request in receiver {
        let result = transforms::run(request.kind, &request.payload, &request.params)
            .map_err(|err| err.to_string());
        let response = WorkerResponse {
            id: request.id,
            kind: request.kind,
            result,
        };
        let waiter = lock(pending).remove(&request.id);
        match waiter {
            Some(tx) => {
                if tx.send(response).is_err() {
                    debug!("worker response {} arrived after the caller gave up", request.id);
                }
            }
            None => debug!("dropping response for rejected request {}", request.id),
        }
    }
}

fn map_output<T>(
    output: ProcessOutput<WorkerOutput>,
    kind: WorkerKind,
    extract: impl FnOnce(WorkerOutput) -> Option<T>,
) -> Result<ProcessOutput<T>, TransformError> {
    let ProcessOutput { data, metrics } = output;
    extract(data)
        .map(|data| ProcessOutput { data, metrics })
        .ok_or(TransformError::UnsupportedPayload { kind })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
