//! Event stream publisher.
//!
//! Delivery never blocks: an [`EventSink`] reports whether an event reached
//! the subscriber, and [`RunPublisher`] logs failed deliveries instead of
//! surfacing them to the orchestrator. A run keeps going after its subscriber
//! disappears so the final result is still computed.
//!
//! Only `log` lines are subject to backpressure. Lifecycle events (`step`,
//! `iteration`, `fix`) and the terminal event always reach a connected
//! subscriber, however far behind it is.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::info;

use crate::domain::{PipelineEvent, PipelineResult};
use crate::obs::emit_event_dropped;

/// Why an event did not reach the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("subscriber buffer is full")]
    Full,

    #[error("subscriber disconnected")]
    Disconnected,
}

/// Destination for one run's events. `publish` must not block.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: PipelineEvent) -> Result<(), DeliveryError>;
}

/// A queued event; a `log` line holds its buffer slot until received.
type Envelope = (PipelineEvent, Option<OwnedSemaphorePermit>);

/// Sending half of an event channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Envelope>,
    log_slots: Arc<Semaphore>,
}

impl EventSink for ChannelSink {
    fn publish(&self, event: PipelineEvent) -> Result<(), DeliveryError> {
        if self.tx.is_closed() {
            return Err(DeliveryError::Disconnected);
        }
        let permit = match event {
            PipelineEvent::Log { .. } => Some(
                self.log_slots
                    .clone()
                    .try_acquire_owned()
                    .map_err(|_| DeliveryError::Full)?,
            ),
            _ => None,
        };
        self.tx
            .send((event, permit))
            .map_err(|_| DeliveryError::Disconnected)
    }
}

/// Receiving half of an event channel.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl EventStream {
    /// Next event, or `None` once the publisher is gone and the buffer is drained.
    pub async fn recv(&mut self) -> Option<PipelineEvent> {
        // Dropping the permit frees the log slot.
        self.rx.recv().await.map(|(event, _slot)| event)
    }

    /// Receive until the terminal event (inclusive) or until the channel closes.
    pub async fn collect_until_terminal(mut self) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.recv().await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }
}

/// Create an event channel with room for `log_capacity` unread log lines.
///
/// Lifecycle and terminal events are never refused for lack of room.
pub fn event_channel(log_capacity: usize) -> (ChannelSink, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let log_slots = Arc::new(Semaphore::new(log_capacity.max(1)));
    (ChannelSink { tx, log_slots }, EventStream { rx })
}

/// Delivery counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub delivered: u64,
    pub dropped: u64,
}

/// Per-run publisher enforcing the stream contract.
///
/// Events go out in the order they are emitted. The terminal methods consume
/// the publisher, so a run ends with exactly one `complete` or `error` and
/// nothing can follow it.
pub struct RunPublisher {
    sink: Arc<dyn EventSink>,
    run_label: String,
    stats: DeliveryStats,
    disconnected: bool,
}

impl RunPublisher {
    pub fn new(sink: Arc<dyn EventSink>, run_label: impl Into<String>) -> Self {
        Self {
            sink,
            run_label: run_label.into(),
            stats: DeliveryStats::default(),
            disconnected: false,
        }
    }

    /// Label used in delivery logs; updated once the session id is known.
    pub fn set_run_label(&mut self, run_label: impl Into<String>) {
        self.run_label = run_label.into();
    }

    /// Publish a non-terminal event.
    pub fn emit(&mut self, event: PipelineEvent) {
        if event.is_terminal() {
            tracing::warn!(run = %self.run_label, kind = event.kind(), "terminal event passed to emit; ignored");
            return;
        }
        self.deliver(event);
    }

    /// Publish `complete` and close the stream.
    pub fn complete(mut self, result: PipelineResult) -> DeliveryStats {
        self.deliver(PipelineEvent::Complete {
            result: Box::new(result),
        });
        self.stats
    }

    /// Publish `error` and close the stream.
    pub fn fail(mut self, message: impl Into<String>) -> DeliveryStats {
        self.deliver(PipelineEvent::Error {
            message: message.into(),
        });
        self.stats
    }

    pub fn stats(&self) -> DeliveryStats {
        self.stats
    }

    fn deliver(&mut self, event: PipelineEvent) {
        if self.disconnected {
            self.stats.dropped += 1;
            return;
        }
        let kind = event.kind();
        match self.sink.publish(event) {
            Ok(()) => self.stats.delivered += 1,
            Err(DeliveryError::Full) => {
                self.stats.dropped += 1;
                emit_event_dropped(&self.run_label, kind, &DeliveryError::Full);
            }
            Err(DeliveryError::Disconnected) => {
                self.stats.dropped += 1;
                self.disconnected = true;
                info!(run = %self.run_label, "subscriber gone; pipeline continues without it");
            }
        }
    }
}
