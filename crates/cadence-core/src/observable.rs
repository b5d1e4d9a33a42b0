use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tokio::sync::broadcast;

/// Topic names fanned out over the realtime bus. Fixed set; unknown topics
/// are rejected at subscribe time.
pub mod topics {
    pub const SESSION_STATUS: &str = "session.status";
    pub const CONTEXT_STATUS: &str = "context.status";
    pub const REALITY_CHECKS: &str = "reality.checks";
    pub const PROJECT_STATUS: &str = "project.status";
    pub const PROJECT_VELOCITY: &str = "project.velocity";
    pub const DOCUMENTATION_STATUS: &str = "documentation.status";
    pub const AGENT_SUGGESTIONS: &str = "agent:suggestions";
    pub const TOOL_EXECUTION: &str = "tool:execution";

    pub const ALL: [&str; 8] = [
        SESSION_STATUS,
        CONTEXT_STATUS,
        REALITY_CHECKS,
        PROJECT_STATUS,
        PROJECT_VELOCITY,
        DOCUMENTATION_STATUS,
        AGENT_SUGGESTIONS,
        TOOL_EXECUTION,
    ];
}

const TOPIC_CAPACITY: usize = 256;

struct Topic {
    last: RwLock<Option<Value>>,
    version: AtomicU64,
    tx: broadcast::Sender<Value>,
}

impl Topic {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(TOPIC_CAPACITY);
        Self {
            last: RwLock::new(None),
            version: AtomicU64::new(0),
            tx,
        }
    }
}

/// What a new subscriber gets: the replayed last value (if any) and a live
/// receiver that observes every publish after it, in publish order.
pub struct Subscription {
    pub topic: String,
    pub last_value: Option<Value>,
    pub receiver: broadcast::Receiver<Value>,
}

/// Last-value-wins topic map. One publisher per topic (the owning
/// component), many subscribers (bus connections). Publishers never block:
/// a send with no receivers is fine, and slow receivers lag and get
/// disconnected at the bus layer.
#[derive(Clone)]
pub struct ObservableRegistry {
    inner: Arc<HashMap<&'static str, Topic>>,
}

impl ObservableRegistry {
    pub fn new() -> Self {
        let mut map = HashMap::new();
        for name in topics::ALL {
            map.insert(name, Topic::new());
        }
        Self {
            inner: Arc::new(map),
        }
    }

    pub fn is_known(&self, topic: &str) -> bool {
        self.inner.contains_key(topic)
    }

    pub fn topic_names(&self) -> Vec<&'static str> {
        topics::ALL.to_vec()
    }

    /// Record the last value and notify live subscribers. Must only be
    /// called after the underlying store transaction has committed.
    pub fn publish(&self, topic: &str, value: Value) {
        let Some(entry) = self.inner.get(topic) else {
            return;
        };

        {
            let mut last = entry.last.write().expect("topic lock poisoned");
            *last = Some(value.clone());
        }
        entry.version.fetch_add(1, Ordering::Relaxed);
        let _ = entry.tx.send(value);
    }

    /// Snapshot without subscribing
    pub fn current(&self, topic: &str) -> Option<Value> {
        let entry = self.inner.get(topic)?;
        entry.last.read().expect("topic lock poisoned").clone()
    }

    pub fn version(&self, topic: &str) -> Option<u64> {
        self.inner
            .get(topic)
            .map(|t| t.version.load(Ordering::Relaxed))
    }

    /// None for unknown topics. The replayed last value is captured before
    /// the receiver is handed out, so a subscriber never misses a publish
    /// that happens in between.
    pub fn subscribe(&self, topic: &str) -> Option<Subscription> {
        let entry = self.inner.get(topic)?;
        // Order matters: take the receiver first, then read the last value.
        // A publish racing in between is then observed on the receiver
        // rather than lost.
        let receiver = entry.tx.subscribe();
        let last_value = entry.last.read().expect("topic lock poisoned").clone();

        Some(Subscription {
            topic: topic.to_string(),
            last_value,
            receiver,
        })
    }
}

impl Default for ObservableRegistry {
    fn default() -> Self {
        Self::new()
    }
}
