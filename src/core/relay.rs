//! Hand-off between a completion producer task and the UI loop.
//!
//! Each request gets its own bounded conduit. The producer never blocks: when
//! the conduit is full a new update evicts the oldest pending update, which is
//! safe because updates are cumulative snapshots. Terminal events are never
//! evicted. The producer owns the only sender, so the conduit is closed exactly
//! once, when that sender is dropped.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

use crate::core::gateway::CompletionGateway;
use crate::core::message::Message;

pub const DEFAULT_CAPACITY: usize = 16;
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// Producer-to-consumer event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// Cumulative reply text so far.
    Update(String),
    /// The provider finished; carries the complete reply.
    Done(String),
    /// The provider failed; carries a human-readable description.
    Failed(String),
}

impl RelayEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RelayEvent::Update(_))
    }
}

/// Result of one bounded-timeout poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayPoll {
    Event(RelayEvent),
    /// Nothing arrived within the timeout; poll again.
    Waiting,
}

#[derive(Debug)]
struct ConduitState {
    queue: VecDeque<RelayEvent>,
    capacity: usize,
    closed: bool,
    receiver_alive: bool,
    dropped_updates: usize,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<ConduitState>,
    notify: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ConduitState> {
        // Queue edits never leave the state half-written.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Create a conduit holding at most `capacity` pending events (minimum 1).
pub fn conduit(capacity: usize) -> (ConduitSender, ConduitReceiver) {
    let shared = Arc::new(Shared {
        state: Mutex::new(ConduitState {
            queue: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            closed: false,
            receiver_alive: true,
            dropped_updates: 0,
        }),
        notify: Notify::new(),
    });
    (
        ConduitSender {
            shared: shared.clone(),
        },
        ConduitReceiver { shared },
    )
}

/// Producer half. Dropping it closes the conduit.
#[derive(Debug)]
pub struct ConduitSender {
    shared: Arc<Shared>,
}

impl ConduitSender {
    /// Queue an event without blocking. Returns `false` once the receiver is
    /// gone, in which case the event is discarded.
    pub fn push(&self, event: RelayEvent) -> bool {
        {
            let mut state = self.shared.lock();
            if !state.receiver_alive {
                return false;
            }

            if state.queue.len() >= state.capacity {
                match state.queue.iter().position(|queued| !queued.is_terminal()) {
                    Some(oldest_update) => {
                        state.queue.remove(oldest_update);
                        state.dropped_updates += 1;
                    }
                    None if event.is_terminal() => {}
                    None => {
                        // Only a terminal event is queued; nothing may follow it.
                        warn!("update pushed after terminal event; discarding");
                        return true;
                    }
                }
            }

            state.queue.push_back(event);
        }
        self.shared.notify.notify_one();
        true
    }

    /// Queue the terminal event and close the conduit.
    pub fn finish(self, event: RelayEvent) {
        debug_assert!(event.is_terminal());
        self.push(event);
    }

    pub fn is_abandoned(&self) -> bool {
        !self.shared.lock().receiver_alive
    }
}

impl Drop for ConduitSender {
    fn drop(&mut self) {
        let dropped_updates = {
            let mut state = self.shared.lock();
            state.closed = true;
            state.dropped_updates
        };
        if dropped_updates > 0 {
            trace!(dropped_updates, "conduit closed after coalescing updates");
        }
        self.shared.notify.notify_one();
    }
}

enum Take {
    Event(RelayEvent),
    Empty,
    Closed,
}

/// Consumer half, owned by the UI loop for the lifetime of one request.
#[derive(Debug)]
pub struct ConduitReceiver {
    shared: Arc<Shared>,
}

impl ConduitReceiver {
    fn try_take(&self) -> Take {
        let mut state = self.shared.lock();
        match state.queue.pop_front() {
            Some(event) => Take::Event(event),
            None if state.closed => Take::Closed,
            None => Take::Empty,
        }
    }

    /// Wait up to `timeout` for the next event.
    ///
    /// A conduit found closed with nothing left to read yields a synthetic
    /// `Done("")`.
    pub async fn poll(&mut self, timeout: Duration) -> RelayPoll {
        let next = async {
            loop {
                match self.try_take() {
                    Take::Event(event) => return event,
                    Take::Closed => return RelayEvent::Done(String::new()),
                    Take::Empty => self.shared.notify.notified().await,
                }
            }
        };

        match tokio::time::timeout(timeout, next).await {
            Ok(event) => RelayPoll::Event(event),
            Err(_) => RelayPoll::Waiting,
        }
    }
}

impl Drop for ConduitReceiver {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.receiver_alive = false;
        state.queue.clear();
    }
}

/// Consumer handle for one in-flight request.
#[derive(Debug)]
pub struct StreamHandle {
    receiver: ConduitReceiver,
    poll_timeout: Duration,
}

impl StreamHandle {
    /// Bounded-timeout poll; see [`ConduitReceiver::poll`].
    pub async fn poll(&mut self) -> RelayPoll {
        self.receiver.poll(self.poll_timeout).await
    }
}

/// Starts completion requests on background tasks.
#[derive(Clone)]
pub struct StreamRelay {
    gateway: Arc<dyn CompletionGateway>,
    capacity: usize,
    poll_timeout: Duration,
}

impl StreamRelay {
    pub fn new(gateway: Arc<dyn CompletionGateway>) -> Self {
        Self {
            gateway,
            capacity: DEFAULT_CAPACITY,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Spawn the producer for `history` and return the consumer handle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, history: Vec<Message>) -> StreamHandle {
        let (sender, receiver) = conduit(self.capacity);
        let gateway = self.gateway.clone();
        tokio::spawn(produce(gateway, history, sender));
        StreamHandle {
            receiver,
            poll_timeout: self.poll_timeout,
        }
    }
}

async fn produce(gateway: Arc<dyn CompletionGateway>, history: Vec<Message>, sender: ConduitSender) {
    let mut deltas = gateway.submit(&history);
    let mut latest = String::new();

    while let Some(item) = deltas.next().await {
        match item {
            Ok(snapshot) => {
                latest.clone_from(&snapshot);
                if !sender.push(RelayEvent::Update(snapshot)) {
                    debug!("stream consumer went away; abandoning request");
                    return;
                }
            }
            Err(err) => {
                warn!(error = %err, "completion failed");
                sender.finish(RelayEvent::Failed(err.to_string()));
                return;
            }
        }
    }

    debug!(chars = latest.chars().count(), "completion finished");
    sender.finish(RelayEvent::Done(latest));
}
