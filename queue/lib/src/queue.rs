//! The base queue contract and the non-timed [`InstantQueue`].

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::directory::QueueDirectory;
use crate::entry::ScriptEntry;
use crate::error::QueueError;
use crate::timed::TimedControl;

/// Process-unique identity of a queue instance.
///
/// Names are reused once a queue finishes, ids never are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueId(pub(crate) u64);

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A named FIFO sequence of script entries.
///
/// Queues live in a [`QueueDirectory`] while they have work. Draining a queue
/// with [`pop_next`](Self::pop_next) or calling [`clear`](Self::clear)
/// removes it from that directory.
pub trait ScriptQueue: Send + Sync + fmt::Debug {
    fn id(&self) -> QueueId;

    fn name(&self) -> &str;

    /// Appends an entry to the tail and binds it to this queue.
    ///
    /// ## Errors
    ///
    /// Returns [`QueueError::ForeignEntry`] if the entry is still bound to a
    /// different live queue.
    fn enqueue(&self, entry: ScriptEntry) -> Result<(), QueueError>;

    /// Removes and returns the head entry.
    ///
    /// Returns `None` once the queue is drained, and the queue leaves its
    /// directory at that point.
    fn pop_next(&self) -> Option<ScriptEntry>;

    /// Discards every pending entry and removes the queue from its directory.
    ///
    /// Calling this on an empty or already cleared queue does nothing.
    fn clear(&self);

    /// Retires the queue if it has no entries left.
    ///
    /// Returns `true` if the queue is finished afterwards. An entry enqueued
    /// concurrently is either seen here, keeping the queue alive, or lands
    /// after the queue finished.
    fn finish_if_empty(&self) -> bool;

    /// Number of entries still waiting to run.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once the queue has been drained or cleared.
    fn is_finished(&self) -> bool;

    /// The pause/delay capability, for queues that have a clock.
    fn as_timed(&self) -> Option<&dyn TimedControl> {
        None
    }
}

/// State shared by every queue kind: identity, entries, and the link back to
/// the directory the queue is registered in.
#[derive(Debug)]
pub(crate) struct QueueCore {
    id: QueueId,
    name: String,
    entries: Mutex<VecDeque<ScriptEntry>>,
    finished: AtomicBool,
    directory: Weak<QueueDirectory>,
    this: Weak<dyn ScriptQueue>,
}

impl QueueCore {
    pub(crate) fn new(
        directory: &Arc<QueueDirectory>,
        name: String,
        this: Weak<dyn ScriptQueue>,
    ) -> Self {
        Self {
            id: directory.next_id(),
            name,
            entries: Mutex::new(VecDeque::new()),
            finished: AtomicBool::new(false),
            directory: Arc::downgrade(directory),
            this,
        }
    }

    pub(crate) fn id(&self) -> QueueId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<ScriptEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn enqueue(&self, mut entry: ScriptEntry) -> Result<(), QueueError> {
        if let Some(owner) = entry.bound_queue()
            && !Weak::ptr_eq(owner, &self.this)
            && let Some(owner) = owner.upgrade()
        {
            return Err(QueueError::ForeignEntry {
                command: entry.command().to_string(),
                owner: owner.name().to_string(),
                target: self.name.clone(),
            });
        }

        entry.bind(self.this.clone());
        self.entries().push_back(entry);
        Ok(())
    }

    pub(crate) fn pop_next(&self) -> Option<ScriptEntry> {
        let next = self.entries().pop_front();
        if next.is_none() {
            self.finish();
        }
        next
    }

    pub(crate) fn clear(&self) {
        let discarded = std::mem::take(&mut *self.entries());
        if !discarded.is_empty() {
            tracing::debug!(queue = %self.name, discarded = discarded.len(), "cleared queue");
        }
        self.finish();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries().len()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub(crate) fn finish_if_empty(&self) -> bool {
        {
            let entries = self.entries();
            if !entries.is_empty() {
                return false;
            }
            self.mark_finished();
        }
        self.leave_directory();
        true
    }

    /// Marks the queue finished and drops it from the directory.
    fn finish(&self) {
        self.mark_finished();
        self.leave_directory();
    }

    fn mark_finished(&self) {
        if !self.finished.swap(true, Ordering::AcqRel) {
            tracing::debug!(queue = %self.name, id = %self.id, "queue finished");
        }
    }

    fn leave_directory(&self) {
        if let Some(directory) = self.directory.upgrade() {
            directory.remove(self.id, &self.name);
        }
    }
}

/// A queue without a clock: each tick runs all of its entries to completion.
///
/// ## Examples
///
/// ```
/// use std::sync::Arc;
/// use script_queue::{InstantQueue, QueueDirectory, ScriptEntry, ScriptQueue};
///
/// let directory = Arc::new(QueueDirectory::new());
/// let queue = InstantQueue::create(&directory, "setup").unwrap();
/// queue.enqueue(ScriptEntry::new("echo", ["ready"])).unwrap();
///
/// assert_eq!(queue.len(), 1);
/// assert!(queue.as_timed().is_none());
/// assert!(directory.lookup("setup").is_some());
/// ```
#[derive(Debug)]
pub struct InstantQueue {
    core: QueueCore,
}

impl InstantQueue {
    /// Creates an instant queue and registers it under `name`.
    ///
    /// ## Errors
    ///
    /// Returns [`QueueError::DuplicateQueueName`] if the name is taken.
    pub fn create(
        directory: &Arc<QueueDirectory>,
        name: impl Into<String>,
    ) -> Result<Arc<Self>, QueueError> {
        let name = name.into();
        let queue = Arc::new_cyclic(|this: &Weak<InstantQueue>| {
            let this: Weak<dyn ScriptQueue> = this.clone();
            InstantQueue {
                core: QueueCore::new(directory, name, this),
            }
        });
        directory.register(queue.clone())?;
        Ok(queue)
    }
}

impl ScriptQueue for InstantQueue {
    fn id(&self) -> QueueId {
        self.core.id()
    }

    fn name(&self) -> &str {
        self.core.name()
    }

    fn enqueue(&self, entry: ScriptEntry) -> Result<(), QueueError> {
        self.core.enqueue(entry)
    }

    fn pop_next(&self) -> Option<ScriptEntry> {
        self.core.pop_next()
    }

    fn clear(&self) {
        self.core.clear();
    }

    fn finish_if_empty(&self) -> bool {
        self.core.finish_if_empty()
    }

    fn len(&self) -> usize {
        self.core.len()
    }

    fn is_finished(&self) -> bool {
        self.core.is_finished()
    }
}
