//! Name → queue directory shared by the engine and by queue control commands.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::QueueError;
use crate::queue::{QueueId, ScriptQueue};

/// Registry of live queues keyed by name.
///
/// One directory is owned by each engine instance and handed to everything
/// that creates or looks up queues. Lookups only ever hand out existing
/// queues; they never create one and never fail.
///
/// Inserts, removals and lookups are safe from any thread and from inside a
/// running step. Callers that iterate should take a [`snapshot`](Self::snapshot)
/// so no map lock is held while a queue runs.
///
/// ## Examples
///
/// ```
/// use std::sync::Arc;
/// use script_queue::{Duration, QueueDirectory, TimedQueue};
///
/// let directory = Arc::new(QueueDirectory::new());
/// let queue = TimedQueue::create(&directory, "main", Duration::ZERO).unwrap();
///
/// assert!(directory.lookup("main").is_some());
/// assert!(directory.lookup("missing").is_none());
/// assert!(TimedQueue::create(&directory, "main", Duration::ZERO).is_err());
/// # drop(queue);
/// ```
#[derive(Debug, Default)]
pub struct QueueDirectory {
    queues: DashMap<String, Arc<dyn ScriptQueue>>,
    next_id: AtomicU64,
}

impl QueueDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh queue id.
    pub fn next_id(&self) -> QueueId {
        QueueId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Adds a queue under its name.
    ///
    /// ## Errors
    ///
    /// Returns [`QueueError::DuplicateQueueName`] if a live queue already
    /// uses that name.
    pub fn register(&self, queue: Arc<dyn ScriptQueue>) -> Result<(), QueueError> {
        match self.queues.entry(queue.name().to_string()) {
            Entry::Occupied(occupied) => {
                Err(QueueError::DuplicateQueueName(occupied.key().clone()))
            }
            Entry::Vacant(vacant) => {
                tracing::debug!(queue = %queue.name(), id = %queue.id(), "registered queue");
                vacant.insert(queue);
                Ok(())
            }
        }
    }

    /// Returns the live queue registered under `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn ScriptQueue>> {
        self.queues.get(name).map(|queue| Arc::clone(queue.value()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.queues.contains_key(name)
    }

    /// Removes the queue with `id` if it is still the one registered under
    /// `name`. Returns whether anything was removed.
    pub fn remove(&self, id: QueueId, name: &str) -> bool {
        self.queues
            .remove_if(name, |_, queue| queue.id() == id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Owned handles to every registered queue, oldest first.
    pub fn snapshot(&self) -> Vec<Arc<dyn ScriptQueue>> {
        let mut queues: Vec<Arc<dyn ScriptQueue>> = self
            .queues
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        queues.sort_by_key(|queue| queue.id());
        queues
    }

    /// Clears every registered queue. Used when the owning engine shuts down.
    pub fn clear_all(&self) {
        for queue in self.snapshot() {
            queue.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duration::Duration;
    use crate::queue::InstantQueue;
    use crate::timed::TimedQueue;

    #[test]
    fn lookup_returns_the_registered_queue() {
        let directory = Arc::new(QueueDirectory::new());
        let queue = TimedQueue::create(&directory, "main", Duration::ZERO).unwrap();

        let found = directory.lookup("main").expect("registered");
        assert_eq!(found.id(), queue.id());
        assert_eq!(found.name(), "main");
    }

    #[test]
    fn lookup_of_unknown_name_is_none() {
        let directory = QueueDirectory::new();
        assert!(directory.lookup("never-registered").is_none());
        assert!(!directory.contains("never-registered"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let directory = Arc::new(QueueDirectory::new());
        let _first = InstantQueue::create(&directory, "main").unwrap();

        let err = TimedQueue::create(&directory, "main", Duration::ZERO).unwrap_err();
        assert_eq!(err, QueueError::DuplicateQueueName("main".to_string()));
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn names_become_reusable_after_clear() {
        let directory = Arc::new(QueueDirectory::new());
        let first = InstantQueue::create(&directory, "main").unwrap();
        first.clear();

        assert!(directory.lookup("main").is_none());
        assert!(InstantQueue::create(&directory, "main").is_ok());
    }

    #[test]
    fn snapshot_is_in_creation_order() {
        let directory = Arc::new(QueueDirectory::new());
        let _b = InstantQueue::create(&directory, "b").unwrap();
        let _a = InstantQueue::create(&directory, "a").unwrap();
        let _c = InstantQueue::create(&directory, "c").unwrap();

        let order: Vec<String> = directory
            .snapshot()
            .iter()
            .map(|queue| queue.name().to_string())
            .collect();
        assert_eq!(order, ["b", "a", "c"]);
        assert_eq!(directory.names(), ["a", "b", "c"]);
    }

    #[test]
    fn clear_all_empties_the_directory() {
        let directory = Arc::new(QueueDirectory::new());
        let one = InstantQueue::create(&directory, "one").unwrap();
        let two = TimedQueue::create(&directory, "two", Duration::ZERO).unwrap();

        directory.clear_all();

        assert!(directory.is_empty());
        assert!(one.is_finished());
        assert!(two.is_finished());
    }

    #[test]
    fn concurrent_registration_keeps_names_unique() {
        let directory = Arc::new(QueueDirectory::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let directory = Arc::clone(&directory);
                std::thread::spawn(move || InstantQueue::create(&directory, "shared").is_ok())
            })
            .collect();

        let created = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(created, 1);
        assert_eq!(directory.len(), 1);
    }
}
