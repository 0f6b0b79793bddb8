//! Bounded event log with ordered subscriber fan-out.

use std::{
    collections::{BTreeMap, VecDeque},
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::{ReentrantMutex, RwLock};

use crate::{LogCategory, LogRecord, Severity, sanitize::sanitize_message};

/// Default number of retained records.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Handle returned by [`EventLog::subscribe`], used to detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Receiver of log notifications.
///
/// Callbacks run synchronously on the appending thread. Deliveries are
/// serialized across threads, but the appending thread may re-enter the log
/// from a callback. A callback must not block on another thread's append.
pub trait LogSubscriber: Send + Sync {
    /// A record was appended.
    fn on_record(&self, record: &LogRecord);

    /// The log was cleared.
    fn on_clear(&self);
}

struct FnSubscriber<R, C> {
    on_record: R,
    on_clear: C,
}

impl<R, C> LogSubscriber for FnSubscriber<R, C>
where
    R: Fn(&LogRecord) + Send + Sync,
    C: Fn() + Send + Sync,
{
    fn on_record(&self, record: &LogRecord) {
        (self.on_record)(record);
    }

    fn on_clear(&self) {
        (self.on_clear)();
    }
}

enum Notice<'a> {
    Record(&'a LogRecord),
    Clear,
}

/// Append-only, size-bounded log of [`LogRecord`]s.
///
/// New observers read the backlog first and then receive live
/// notifications, so nothing is lost across reconnects.
pub struct EventLog {
    history: RwLock<VecDeque<LogRecord>>,
    capacity: usize,
    subscribers: RwLock<BTreeMap<SubscriptionId, Arc<dyn LogSubscriber>>>,
    next_id: AtomicU64,
    /// Held from append through fan-out so delivery order matches history.
    delivery: ReentrantMutex<()>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventLog {
    /// Create a log retaining [`DEFAULT_CAPACITY`] records.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a log retaining at most `capacity` records (minimum 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            subscribers: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            delivery: ReentrantMutex::new(()),
        }
    }

    /// Sanitize, store and broadcast a record. Never fails.
    pub fn log(&self, category: LogCategory, message: impl AsRef<str>, severity: Severity) {
        let record = LogRecord::now(category, sanitize_message(message.as_ref()), severity);

        match severity {
            Severity::Info | Severity::Success => {
                tracing::info!(target: "event_log", %category, "{}", record.message);
            }
            Severity::Warning => {
                tracing::warn!(target: "event_log", %category, "{}", record.message);
            }
            Severity::Error => {
                tracing::error!(target: "event_log", %category, "{}", record.message);
            }
        }

        let _delivery = self.delivery.lock();
        {
            let mut history = self.history.write();
            history.push_back(record.clone());
            if history.len() > self.capacity {
                history.pop_front();
            }
        }

        self.notify(&Notice::Record(&record));
    }

    /// Log at [`Severity::Info`].
    pub fn info(&self, category: LogCategory, message: impl AsRef<str>) {
        self.log(category, message, Severity::Info);
    }

    /// Snapshot of retained records, oldest first.
    #[must_use]
    pub fn get_backlog(&self) -> Vec<LogRecord> {
        self.history.read().iter().cloned().collect()
    }

    /// Drop all records and notify every subscriber once.
    pub fn clear(&self) {
        let _delivery = self.delivery.lock();
        self.history.write().clear();
        tracing::debug!("event log cleared");
        self.notify(&Notice::Clear);
    }

    /// Register a pair of callbacks.
    pub fn subscribe<R, C>(&self, on_record: R, on_clear: C) -> SubscriptionId
    where
        R: Fn(&LogRecord) + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        self.subscribe_with(Arc::new(FnSubscriber {
            on_record,
            on_clear,
        }))
    }

    /// Register a subscriber object.
    pub fn subscribe_with(&self, subscriber: Arc<dyn LogSubscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().insert(id, subscriber);
        tracing::debug!(subscription = %id, "log subscriber attached");
        id
    }

    /// Register callbacks and read the backlog in one step.
    ///
    /// Every record lands in exactly one of the returned backlog or the live
    /// deliveries.
    pub fn subscribe_with_backlog<R, C>(
        &self,
        on_record: R,
        on_clear: C,
    ) -> (SubscriptionId, Vec<LogRecord>)
    where
        R: Fn(&LogRecord) + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        let _delivery = self.delivery.lock();
        let history = self.history.read();
        let id = self.subscribe(on_record, on_clear);
        (id, history.iter().cloned().collect())
    }

    /// Detach a subscriber. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.subscribers.write().remove(&id).is_some();
        if removed {
            tracing::debug!(subscription = %id, "log subscriber detached");
        }
        removed
    }

    /// Number of retained records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.history.read().len()
    }

    /// Whether no records are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.history.read().is_empty()
    }

    /// Maximum number of retained records.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of attached subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    fn notify(&self, notice: &Notice<'_>) {
        let targets: Vec<(SubscriptionId, Arc<dyn LogSubscriber>)> = self
            .subscribers
            .read()
            .iter()
            .map(|(id, sub)| (*id, Arc::clone(sub)))
            .collect();

        for (id, subscriber) in targets {
            // May have been detached by an earlier callback.
            if !self.subscribers.read().contains_key(&id) {
                continue;
            }

            let delivered = catch_unwind(AssertUnwindSafe(|| match notice {
                Notice::Record(record) => subscriber.on_record(record),
                Notice::Clear => subscriber.on_clear(),
            }));

            if delivered.is_err() {
                tracing::warn!(subscription = %id, "log subscriber panicked during delivery");
            }
        }
    }
}
