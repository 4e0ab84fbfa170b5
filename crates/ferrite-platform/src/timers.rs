//! One-shot deadline queue over virtual time.
//!
//! The queue delivers events rather than storing callbacks: callers keep their
//! own `TimerId -> handler` mapping and drain due entries with
//! [`TimerQueue::pop_due`]. This keeps device state serializable — after a
//! restore, devices re-arm from their own snapshotted state and the id mapping
//! is re-established.

/// Handle for a scheduled deadline. Ids are never reused within a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

#[derive(Debug)]
struct Entry<T> {
    id: TimerId,
    deadline_ns: u64,
    payload: T,
}

/// One-shot timers keyed by absolute virtual-time deadline.
///
/// Events fire in non-decreasing deadline order; entries with equal deadlines
/// fire in schedule order.
#[derive(Debug, Default)]
pub struct TimerQueue<T> {
    next_id: u64,
    /// Sorted by `(deadline_ns, id)`; ids grow monotonically, so equal
    /// deadlines keep schedule order.
    entries: Vec<Entry<T>>,
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }

    pub fn schedule(&mut self, deadline_ns: u64, payload: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;

        let idx = self
            .entries
            .partition_point(|e| (e.deadline_ns, e.id.0) <= (deadline_ns, id.0));
        self.entries.insert(
            idx,
            Entry {
                id,
                deadline_ns,
                payload,
            },
        );
        id
    }

    /// Removes a pending entry. Cancelling an id that already fired (or was
    /// already cancelled) is a no-op.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.entries.iter().position(|e| e.id == id) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Pops the earliest entry with `deadline_ns <= now_ns`, if any.
    pub fn pop_due(&mut self, now_ns: u64) -> Option<(TimerId, u64, T)> {
        if self.entries.first()?.deadline_ns > now_ns {
            return None;
        }
        let entry = self.entries.remove(0);
        Some((entry.id, entry.deadline_ns, entry.payload))
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.entries.first().map(|e| e.deadline_ns)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
