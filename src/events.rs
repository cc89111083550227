//! Session events and the sinks that deliver them.

use crate::clock::Millis;
use crate::session::{GameSession, PlayerId, SessionId, Transition};
use crate::snapshot::SessionSnapshot;
use anyhow::Result;
use futures::Stream;
use go_engine::CellChange;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// A change to one session, addressed to its participants and spectators.
#[derive(Debug, Clone, PartialEq, Serialize, derive_new::new)]
pub struct SessionEvent {
    /// Session ID.
    pub session_id: SessionId,
    /// State after the change, without the grid.
    pub snapshot: SessionSnapshot,
    /// Cells that changed, public view.
    pub delta: Vec<CellChange>,
    /// Time-driven steps folded into this change.
    pub transitions: Vec<Transition>,
    /// Recipients.
    pub audience: Vec<PlayerId>,
}

impl SessionEvent {
    /// Captures the event for `session` after a change.
    pub fn capture(
        session: &GameSession,
        now: Millis,
        delta: Vec<CellChange>,
        transitions: Vec<Transition>,
    ) -> Self {
        Self::new(
            session.id().clone(),
            SessionSnapshot::capture(session, now, false, None),
            delta,
            transitions,
            session.audience(),
        )
    }
}

/// Destination for session events.
#[async_trait::async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Delivers one event.
    async fn publish(&self, event: &SessionEvent) -> Result<()>;

    /// Sink name for logs.
    fn name(&self) -> &str;
}

/// Writes every event to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait::async_trait]
impl SnapshotSink for TracingSink {
    async fn publish(&self, event: &SessionEvent) -> Result<()> {
        info!(
            session_id = %event.session_id,
            version = event.snapshot.version,
            changed_cells = event.delta.len(),
            transitions = event.transitions.len(),
            audience = event.audience.len(),
            "Session event"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "tracing"
    }
}

/// Fans events out to in-process subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<SessionEvent>,
}

impl BroadcastSink {
    /// Creates a sink buffering up to `capacity` events per slow subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Opens a new subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Events of one session from now on. A lagging subscriber skips what
    /// it missed; the stream ends once the sink and its clones are dropped.
    pub fn session_stream(
        &self,
        session_id: SessionId,
    ) -> impl Stream<Item = SessionEvent> + Send + 'static + use<> {
        futures::stream::unfold(self.subscribe(), move |mut rx| {
            let session_id = session_id.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(event) if event.session_id == session_id => return Some((event, rx)),
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(%session_id, skipped, "Event subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        })
    }
}

#[async_trait::async_trait]
impl SnapshotSink for BroadcastSink {
    async fn publish(&self, event: &SessionEvent) -> Result<()> {
        if self.tx.send(event.clone()).is_err() {
            debug!(session_id = %event.session_id, "No subscribers for event");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "broadcast"
    }
}

/// Queues events for asynchronous delivery.
///
/// Publishing never blocks the session lock holder; sinks run on their own
/// task in publish order.
#[derive(Debug, Clone)]
pub struct Publisher {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl Publisher {
    /// Creates a publisher and the receiving end of its queue.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Creates a publisher draining into `sinks` on a spawned task.
    #[instrument(skip(sinks), fields(sinks = sinks.len()))]
    pub fn spawn(sinks: Vec<Arc<dyn SnapshotSink>>) -> (Self, JoinHandle<()>) {
        let (publisher, mut rx) = Self::channel();
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                for sink in &sinks {
                    if let Err(e) = sink.publish(&event).await {
                        warn!(sink = sink.name(), error = %e, "Sink failed to publish event");
                    }
                }
            }
            debug!("Publisher queue closed");
        });
        (publisher, handle)
    }

    /// Queues `event`.
    pub fn publish(&self, event: SessionEvent) {
        if let Err(e) = self.tx.send(event) {
            warn!(session_id = %e.0.session_id, "Publisher queue closed, event dropped");
        }
    }
}
