//! Bounded, single-producer event queue between a turn and its consumer.
//!
//! When the queue is full, the oldest queued `message` frame is dropped to make
//! room. Every other frame waits for space; if the turn is cancelled while
//! waiting, the frame is pushed past the bound instead of being lost.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use appforge_core::event::{AgentEvent, EventPayload};
use appforge_core::{ForgeError, Result};
use futures::Stream;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::trace;

struct Shared {
    queue: Mutex<VecDeque<AgentEvent>>,
    capacity: usize,
    /// Signalled when a frame is queued or the sink closes
    readable: Notify,
    /// Signalled when the consumer takes a frame
    writable: Notify,
    sink_closed: AtomicBool,
    stream_closed: AtomicBool,
    dropped: AtomicUsize,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, VecDeque<AgentEvent>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Creates a connected sink/stream pair holding at most `capacity` frames.
pub fn channel(capacity: usize, cancel: CancellationToken) -> (EventSink, EventStream) {
    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        capacity: capacity.max(1),
        readable: Notify::new(),
        writable: Notify::new(),
        sink_closed: AtomicBool::new(false),
        stream_closed: AtomicBool::new(false),
        dropped: AtomicUsize::new(0),
    });
    (
        EventSink {
            shared: Some(Arc::clone(&shared)),
            session_id: String::new(),
            cancel,
        },
        EventStream { shared },
    )
}

/// Producer half, owned by the engine.
pub struct EventSink {
    /// `None` for a sink that discards everything (sub-agent runs)
    shared: Option<Arc<Shared>>,
    session_id: String,
    cancel: CancellationToken,
}

impl EventSink {
    /// A sink whose frames go nowhere.
    pub fn discard() -> Self {
        Self {
            shared: None,
            session_id: String::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Stamps subsequent frames with `session_id`.
    pub fn set_session_id(&mut self, session_id: impl Into<String>) {
        self.session_id = session_id.into();
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Message frames dropped so far under backpressure.
    pub fn dropped(&self) -> usize {
        self.shared
            .as_ref()
            .map_or(0, |s| s.dropped.load(Ordering::Relaxed))
    }

    /// Queues a payload for the current session.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` when the consumer has gone away.
    pub async fn emit(&self, payload: EventPayload) -> Result<()> {
        self.send(AgentEvent::new(self.session_id.clone(), payload))
            .await
    }

    pub async fn send(&self, event: AgentEvent) -> Result<()> {
        let Some(shared) = &self.shared else {
            return Ok(());
        };
        loop {
            if shared.stream_closed.load(Ordering::Acquire) {
                return Err(ForgeError::Cancelled);
            }
            {
                let mut queue = shared.queue();
                if queue.len() < shared.capacity {
                    queue.push_back(event);
                    drop(queue);
                    shared.readable.notify_one();
                    return Ok(());
                }
                if let Some(oldest) = queue.iter().position(AgentEvent::is_droppable) {
                    queue.remove(oldest);
                    queue.push_back(event);
                    drop(queue);
                    shared.dropped.fetch_add(1, Ordering::Relaxed);
                    trace!(session_id = %self.session_id, "[EventStream] Dropped oldest message frame");
                    shared.readable.notify_one();
                    return Ok(());
                }
            }
            tokio::select! {
                _ = shared.writable.notified() => {}
                _ = self.cancel.cancelled() => {
                    shared.queue().push_back(event);
                    shared.readable.notify_one();
                    return Ok(());
                }
            }
        }
    }
}

impl Drop for EventSink {
    fn drop(&mut self) {
        if let Some(shared) = &self.shared {
            shared.sink_closed.store(true, Ordering::Release);
            shared.readable.notify_one();
        }
    }
}

/// Consumer half. Yields frames in order and ends after the sink is dropped.
pub struct EventStream {
    shared: Arc<Shared>,
}

impl EventStream {
    pub async fn recv(&mut self) -> Option<AgentEvent> {
        loop {
            if let Some(event) = self.shared.queue().pop_front() {
                self.shared.writable.notify_one();
                return Some(event);
            }
            if self.shared.sink_closed.load(Ordering::Acquire) {
                // The sink may have queued a last frame right before closing.
                return self.shared.queue().pop_front();
            }
            self.shared.readable.notified().await;
        }
    }

    /// Drains every frame until the turn ends.
    pub async fn collect(mut self) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.recv().await {
            events.push(event);
        }
        events
    }

    pub fn into_stream(self) -> Pin<Box<dyn Stream<Item = AgentEvent> + Send>> {
        Box::pin(futures::stream::unfold(self, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        }))
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.shared.stream_closed.store(true, Ordering::Release);
        self.shared.writable.notify_one();
    }
}
