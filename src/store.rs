//! Bounded in-memory event buffer with a two-phase snapshot/commit protocol.
//!
//! `snapshot` hands out a copy of the head of the buffer and remembers how far it reached (the
//! high-water mark). `commit` removes exactly that prefix. A failed delivery therefore never
//! loses events, and events appended while a delivery is in flight sit past the mark and
//! survive the commit.
use crate::context::EnvironmentContext;
use crate::event::{Entry, LogEvent, LogResult};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default number of events held before the oldest is evicted.
pub const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Default)]
struct Buffer {
    events: VecDeque<LogEvent>,
    mark: Option<usize>,
}

/// Read-only copy of the head of the buffer taken by [`EventStore::snapshot`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    events: Vec<LogEvent>,
}

impl Snapshot {
    pub fn events(&self) -> &[LogEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LogEvent> {
        self.events.iter()
    }

    pub fn into_events(self) -> Vec<LogEvent> {
        self.events
    }
}

/// Append-only event buffer shared by everything that records telemetry.
///
/// All operations take one mutex scoped to the instance, so `append` is safe while a snapshot
/// is outstanding. No operation fails observably.
pub struct EventStore {
    buffer: Mutex<Buffer>,
    context: EnvironmentContext,
    capacity: usize,
    evicted: AtomicU64,
}

impl fmt::Debug for EventStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStore")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("evicted", &self.evicted())
            .finish()
    }
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new(EnvironmentContext::with_defaults())
    }
}

impl EventStore {
    pub fn new(context: EnvironmentContext) -> Self {
        Self::with_capacity(context, DEFAULT_CAPACITY)
    }

    /// Store holding at most `capacity` events (minimum 1).
    pub fn with_capacity(context: EnvironmentContext, capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(Buffer::default()),
            context,
            capacity: capacity.max(1),
            evicted: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Buffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enrichment applied to every appended event.
    pub fn context(&self) -> &EnvironmentContext {
        &self.context
    }

    /// Build an event from `entry` and push it to the tail.
    pub fn append(&self, entry: Entry) {
        // Evaluate providers outside the lock; they are arbitrary user code.
        let context = self.context.evaluate();
        let (event, dropped) = LogEvent::build(entry, context);
        if dropped > 0 {
            tracing::warn!(dropped, action = ?event.action(), "event info exceeds field cap");
        }

        let mut buffer = self.lock();
        if buffer.events.len() >= self.capacity {
            buffer.events.pop_front();
            if let Some(mark) = buffer.mark.as_mut() {
                *mark = mark.saturating_sub(1);
            }
            self.evicted.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(capacity = self.capacity, "event buffer full; evicted oldest event");
        }
        buffer.events.push_back(event);
    }

    /// Record an `OK` event for `action`.
    pub fn info<I, K, V>(&self, action: &str, info: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: fmt::Display,
    {
        self.append(Entry::new(LogResult::Ok).action(action).info_fields(info));
    }

    /// Record a `WARN` event for `action`.
    pub fn warn<I, K, V>(&self, action: &str, info: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: fmt::Display,
    {
        self.append(Entry::new(LogResult::Warn).action(action).info_fields(info));
    }

    /// Record an `ERROR` event for `action` with a code and message.
    pub fn error<I, K, V>(&self, action: &str, code: &str, message: &str, info: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: fmt::Display,
    {
        self.append(
            Entry::new(LogResult::Error).action(action).failure(code, message).info_fields(info),
        );
    }

    /// Copy up to `max_size` events from the head (`0` means all) and record the mark.
    pub fn snapshot(&self, max_size: usize) -> Snapshot {
        let mut buffer = self.lock();
        let len = buffer.events.len();
        let take = if max_size > 0 { len.min(max_size) } else { len };
        buffer.mark = Some(take);
        Snapshot { events: buffer.events.iter().take(take).cloned().collect() }
    }

    /// Remove everything up to the last recorded mark. Returns how many events were removed.
    ///
    /// Without a prior snapshot this does nothing.
    pub fn commit(&self) -> usize {
        let mut buffer = self.lock();
        match buffer.mark.take() {
            Some(mark) => {
                let removed = mark.min(buffer.events.len());
                buffer.events.drain(..removed);
                removed
            }
            None => 0,
        }
    }

    /// Discard the whole buffer and any outstanding mark. Returns how many events were dropped.
    pub fn discard_all(&self) -> usize {
        let mut buffer = self.lock();
        buffer.mark = None;
        let dropped = buffer.events.len();
        buffer.events.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of events evicted because the buffer was full.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}
