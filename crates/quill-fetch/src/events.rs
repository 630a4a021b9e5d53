use tokio::sync::broadcast;

/// Lifecycle notifications published by the scheduler and its jobs.
///
/// The download UI subscribes to these; formatting is its problem, not ours.
#[derive(Clone, Debug)]
pub enum FetchEvent {
    Started { url: String },
    Progress { url: String, loaded: u64, total: u64 },
    /// Quota handling switched the download to in-memory buffering.
    MemoryFallback { url: String },
    Completed { url: String, total_bytes: u64 },
    Failed { url: String, error: String },
}

/// Broadcast bus for [`FetchEvent`].
///
/// `publish()` is a sync call; with no subscribers events are silently
/// dropped. Slow subscribers observe `RecvError::Lagged` instead of blocking
/// producers.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<FetchEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: FetchEvent) {
        let _ = self.tx.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<FetchEvent> {
        self.tx.subscribe()
    }
}
