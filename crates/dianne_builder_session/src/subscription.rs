// SPDX-License-Identifier: MIT OR Apache-2.0
//! Live telemetry streams with reconnect and backoff.
//!
//! Each [`Subscription`] owns a tokio task reading one stream from an
//! [`EventSource`]. Parsed events are delivered through an mpsc channel;
//! the connection status is shared behind a mutex. Closing or dropping the
//! handle aborts the task.

use crate::canvas::Sample;
use crate::error::ServiceResult;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Capacity of a subscription's event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Raw text messages of one stream
pub type EventStream = BoxStream<'static, ServiceResult<String>>;

/// What a telemetry stream reports on. At most one stream per concern is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Concern {
    /// Training error curve and evaluation progress
    Learner,
    /// Output probabilities of a running network
    RunOutput,
    /// Camera frames fed into a running network
    Camera,
}

impl Concern {
    /// Stream name on the server
    pub fn stream_name(&self) -> &'static str {
        match self {
            Self::Learner => "learner",
            Self::RunOutput => "run",
            Self::Camera => "input",
        }
    }
}

impl fmt::Display for Concern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stream_name())
    }
}

/// Opens telemetry streams
pub trait EventSource: Send + Sync {
    /// Connect to the stream of a concern
    fn open(&self, concern: Concern) -> BoxFuture<'_, ServiceResult<EventStream>>;
}

/// Reconnect policy of a telemetry stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay before the first reconnect, in milliseconds
    pub initial_ms: u64,
    /// Growth factor per failed attempt
    pub multiplier: f64,
    /// Upper bound on the delay, in milliseconds
    pub max_delay_ms: u64,
    /// Give up after this many consecutive failures; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_ms: 500,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            max_attempts: Some(8),
        }
    }
}

impl BackoffPolicy {
    /// Delay before reconnect attempt `attempt` (zero based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let ms = self.initial_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        let capped = ms.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// Whether another attempt is allowed after `failures` consecutive failures
    pub fn allows(&self, failures: u32) -> bool {
        self.max_attempts.map_or(true, |max| failures < max)
    }
}

/// Connection state of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    /// First connection attempt in progress
    Connecting,
    /// Receiving events
    Open,
    /// Waiting to reconnect after a failure
    Reconnecting {
        /// Consecutive failures so far
        attempt: u32,
    },
    /// Closed by the owner or given up
    Closed,
}

/// Training progress point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnProgress {
    /// Samples processed
    pub sample: u64,
    /// Current error
    pub error: f64,
}

/// Output of a running network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    /// Module that produced the output
    pub id: String,
    /// Class probabilities
    #[serde(default)]
    pub output: Vec<f64>,
    /// Class labels
    #[serde(default)]
    pub labels: Vec<String>,
    /// Tags attached to the input
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A parsed telemetry event
#[derive(Debug, Clone, PartialEq)]
pub enum Telemetry {
    /// Training error point
    Progress(LearnProgress),
    /// Confusion matrix update during evaluation
    Confusion(Vec<Vec<f64>>),
    /// Run output probabilities
    Output(RunOutput),
    /// Camera frame
    Frame(Sample),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LearnerMessage {
    Progress(LearnProgress),
    Confusion(Vec<Vec<f64>>),
}

impl Telemetry {
    /// Parse a raw stream message of a concern
    pub fn parse(concern: Concern, text: &str) -> serde_json::Result<Self> {
        Ok(match concern {
            Concern::Learner => match serde_json::from_str(text)? {
                LearnerMessage::Progress(p) => Self::Progress(p),
                LearnerMessage::Confusion(m) => Self::Confusion(m),
            },
            Concern::RunOutput => Self::Output(serde_json::from_str(text)?),
            Concern::Camera => Self::Frame(serde_json::from_str(text)?),
        })
    }
}

/// Cloneable view of a subscription's status
#[derive(Debug, Clone)]
pub struct StatusWatch(Arc<Mutex<SubscriptionStatus>>);

impl StatusWatch {
    /// Current status
    pub fn get(&self) -> SubscriptionStatus {
        *self.0.lock()
    }

    /// `Closed` is final: later updates from a worker that has not yet
    /// observed its abort are dropped.
    fn set(&self, status: SubscriptionStatus) {
        let mut current = self.0.lock();
        if *current != SubscriptionStatus::Closed {
            *current = status;
        }
    }
}

/// Owned handle to one open telemetry stream
pub struct Subscription {
    concern: Concern,
    status: StatusWatch,
    events: mpsc::Receiver<Telemetry>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Start streaming. Must be called from within a tokio runtime.
    pub fn open(source: Arc<dyn EventSource>, concern: Concern, policy: BackoffPolicy) -> Self {
        let (tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let status = StatusWatch(Arc::new(Mutex::new(SubscriptionStatus::Connecting)));
        let task = tokio::spawn(stream_worker(source, concern, policy, tx, status.clone()));
        tracing::debug!("Opened {concern} stream");
        Self {
            concern,
            status,
            events,
            task,
        }
    }

    /// Concern this stream serves
    pub fn concern(&self) -> Concern {
        self.concern
    }

    /// Current status
    pub fn status(&self) -> SubscriptionStatus {
        self.status.get()
    }

    /// Status view that outlives the handle
    pub fn watch(&self) -> StatusWatch {
        self.status.clone()
    }

    /// Wait for the next event. `None` once the stream is closed and drained.
    pub async fn next_event(&mut self) -> Option<Telemetry> {
        self.events.recv().await
    }

    /// Take an event if one is buffered
    pub fn try_next_event(&mut self) -> Option<Telemetry> {
        self.events.try_recv().ok()
    }

    /// Stop the stream
    pub fn close(&mut self) {
        if self.status.get() != SubscriptionStatus::Closed {
            tracing::debug!("Closing {} stream", self.concern);
        }
        self.task.abort();
        self.events.close();
        self.status.set(SubscriptionStatus::Closed);
    }

    /// Whether the stream is closed
    pub fn is_closed(&self) -> bool {
        self.status.get() == SubscriptionStatus::Closed
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("concern", &self.concern)
            .field("status", &self.status.get())
            .finish()
    }
}

async fn stream_worker(
    source: Arc<dyn EventSource>,
    concern: Concern,
    policy: BackoffPolicy,
    tx: mpsc::Sender<Telemetry>,
    status: StatusWatch,
) {
    let mut failures = 0u32;
    loop {
        match source.open(concern).await {
            Ok(mut stream) => {
                status.set(SubscriptionStatus::Open);
                while let Some(message) = stream.next().await {
                    let text = match message {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!("{concern} stream failed: {e}");
                            break;
                        }
                    };
                    failures = 0;
                    match Telemetry::parse(concern, &text) {
                        Ok(event) => {
                            if tx.send(event).await.is_err() {
                                status.set(SubscriptionStatus::Closed);
                                return;
                            }
                        }
                        Err(e) => tracing::warn!("Ignoring malformed {concern} event: {e}"),
                    }
                }
            }
            Err(e) => tracing::warn!("Could not open {concern} stream: {e}"),
        }

        if !policy.allows(failures) {
            tracing::warn!("Giving up on {concern} stream after {failures} attempts");
            status.set(SubscriptionStatus::Closed);
            return;
        }
        let delay = policy.delay(failures);
        failures += 1;
        status.set(SubscriptionStatus::Reconnecting { attempt: failures });
        tracing::debug!("Reconnecting {concern} stream in {delay:?}");
        tokio::time::sleep(delay).await;
    }
}

/// The open subscriptions of a session, one per concern
pub struct Subscriptions {
    source: Arc<dyn EventSource>,
    policy: BackoffPolicy,
    open: IndexMap<Concern, Subscription>,
}

impl Subscriptions {
    /// Create with no open streams
    pub fn new(source: Arc<dyn EventSource>, policy: BackoffPolicy) -> Self {
        Self {
            source,
            policy,
            open: IndexMap::new(),
        }
    }

    /// Open the stream of a concern, closing the one it replaces
    pub fn open(&mut self, concern: Concern) -> &mut Subscription {
        self.close(concern);
        let subscription = Subscription::open(self.source.clone(), concern, self.policy.clone());
        self.open.entry(concern).or_insert(subscription)
    }

    /// The open stream of a concern
    pub fn get_mut(&mut self, concern: Concern) -> Option<&mut Subscription> {
        self.open.get_mut(&concern)
    }

    /// Whether a concern has a live stream
    pub fn is_open(&self, concern: Concern) -> bool {
        self.open.get(&concern).is_some_and(|s| !s.is_closed())
    }

    /// Close the stream of a concern. Returns whether one was open.
    pub fn close(&mut self, concern: Concern) -> bool {
        match self.open.shift_remove(&concern) {
            Some(mut subscription) => {
                subscription.close();
                true
            }
            None => false,
        }
    }

    /// Close every stream
    pub fn close_all(&mut self) {
        for (_, mut subscription) in self.open.drain(..) {
            subscription.close();
        }
    }

    /// Number of open streams
    pub fn len(&self) -> usize {
        self.open.len()
    }

    /// Whether no streams are open
    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        self.close_all();
    }
}

impl fmt::Debug for Subscriptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriptions")
            .field("open", &self.open.keys().collect::<Vec<_>>())
            .finish()
    }
}
