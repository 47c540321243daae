//! Clock-driven queues that can be paused and delayed.
//!
//! A [`TimedQueue`] pops at most one entry per engine tick. Between steps it
//! can sit in one of two suspended states:
//!
//! - **paused**: nothing happens until it is resumed, and any pending delay
//!   stops counting down;
//! - **waiting**: nothing happens until `delay_until` has passed.
//!
//! Both states are cooperative. The engine simply skips the queue on that
//! tick and checks again on the next one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::directory::QueueDirectory;
use crate::duration::Duration;
use crate::entry::ScriptEntry;
use crate::error::QueueError;
use crate::queue::{QueueCore, QueueId, ScriptQueue};

/// Fallback deadline for delays too large to add to an `Instant`.
const FAR_FUTURE: std::time::Duration = std::time::Duration::from_secs(86_400 * 365 * 30);

/// Observable scheduling state of a timed queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimedState {
    /// The next tick may pop an entry.
    Running,
    /// Suspended until resumed.
    Paused,
    /// Suspended until a delay elapses.
    Waiting,
    /// Drained or cleared; no longer scheduled.
    Finished,
}

/// Marker returned by [`TimedControl::begin_step`].
///
/// Lets the queue tell whether the step it brackets set its own delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepMark(u64);

/// The pause/delay capability of clock-driven queues.
///
/// Obtained through [`ScriptQueue::as_timed`]; queues without a clock return
/// `None` there, and control commands skip them.
pub trait TimedControl: Send + Sync {
    /// Pauses or resumes the queue. Setting the current value again is a no-op.
    fn set_paused(&self, paused: bool);

    fn is_paused(&self) -> bool;

    /// Holds the queue for `delay`, replacing any delay already pending.
    ///
    /// If the queue is paused the delay starts counting once it is resumed.
    fn delay_for(&self, delay: Duration);

    /// Time left on the pending delay, frozen or running.
    fn delay_remaining(&self) -> Option<std::time::Duration>;

    /// Per-step delay applied after each executed entry.
    fn speed(&self) -> Duration;

    fn state(&self) -> TimedState;

    /// Whether an entry may be popped at `now`. An elapsed delay is cleared.
    fn poll_ready(&self, now: Instant) -> bool;

    /// Called by the engine right before a step executes.
    fn begin_step(&self) -> StepMark;

    /// Called by the engine after a step; applies the queue speed unless the
    /// step changed the delay itself.
    fn complete_step(&self, mark: StepMark, now: Instant);
}

#[derive(Debug, Default)]
struct Clock {
    paused: bool,
    delay_until: Option<Instant>,
    /// Remaining delay captured while paused.
    frozen: Option<std::time::Duration>,
    /// Bumped on every explicit delay.
    generation: u64,
}

impl Clock {
    fn hold(&mut self, wait: std::time::Duration, now: Instant) {
        if self.paused {
            self.frozen = Some(wait);
            self.delay_until = None;
        } else {
            self.frozen = None;
            self.delay_until = Some(now.checked_add(wait).unwrap_or(now + FAR_FUTURE));
        }
    }

    fn remaining(&self, now: Instant) -> Option<std::time::Duration> {
        self.frozen.or_else(|| {
            self.delay_until
                .map(|until| until.saturating_duration_since(now))
        })
    }
}

/// A queue that advances one entry per tick, subject to pause and delay.
///
/// ## Examples
///
/// ```
/// use std::sync::Arc;
/// use script_queue::{parse_duration, QueueDirectory, ScriptQueue, TimedQueue, TimedState};
///
/// let directory = Arc::new(QueueDirectory::new());
/// let queue = TimedQueue::create(&directory, "main", parse_duration("1s").unwrap()).unwrap();
///
/// let timed = queue.as_timed().unwrap();
/// timed.set_paused(true);
/// assert_eq!(timed.state(), TimedState::Paused);
/// timed.set_paused(false);
/// assert_eq!(timed.state(), TimedState::Running);
/// ```
#[derive(Debug)]
pub struct TimedQueue {
    core: QueueCore,
    speed: Duration,
    clock: Mutex<Clock>,
}

impl TimedQueue {
    /// Creates a timed queue and registers it under `name`.
    ///
    /// `speed` is the wait inserted after every executed entry.
    ///
    /// ## Errors
    ///
    /// Returns [`QueueError::DuplicateQueueName`] if the name is taken.
    pub fn create(
        directory: &Arc<QueueDirectory>,
        name: impl Into<String>,
        speed: Duration,
    ) -> Result<Arc<Self>, QueueError> {
        let name = name.into();
        let queue = Arc::new_cyclic(|this: &Weak<TimedQueue>| {
            let this: Weak<dyn ScriptQueue> = this.clone();
            TimedQueue {
                core: QueueCore::new(directory, name, this),
                speed,
                clock: Mutex::new(Clock::default()),
            }
        });
        directory.register(queue.clone())?;
        Ok(queue)
    }

    fn clock(&self) -> MutexGuard<'_, Clock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ScriptQueue for TimedQueue {
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
        *self.clock() = Clock::default();
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

    fn as_timed(&self) -> Option<&dyn TimedControl> {
        Some(self)
    }
}

impl TimedControl for TimedQueue {
    fn set_paused(&self, paused: bool) {
        let now = Instant::now();
        let mut clock = self.clock();
        if clock.paused == paused {
            return;
        }

        clock.paused = paused;
        if paused {
            if let Some(until) = clock.delay_until.take() {
                clock.frozen = Some(until.saturating_duration_since(now));
            }
        } else if let Some(remaining) = clock.frozen.take() {
            clock.hold(remaining, now);
        }
        tracing::debug!(queue = %self.core.name(), paused, "queue pause state changed");
    }

    fn is_paused(&self) -> bool {
        self.clock().paused
    }

    fn delay_for(&self, delay: Duration) {
        let now = Instant::now();
        let mut clock = self.clock();
        clock.generation += 1;
        clock.hold(delay.to_std(), now);
        tracing::debug!(queue = %self.core.name(), %delay, "queue delayed");
    }

    fn delay_remaining(&self) -> Option<std::time::Duration> {
        self.clock().remaining(Instant::now())
    }

    fn speed(&self) -> Duration {
        self.speed
    }

    fn state(&self) -> TimedState {
        if self.core.is_finished() {
            return TimedState::Finished;
        }

        let clock = self.clock();
        if clock.paused {
            TimedState::Paused
        } else if clock
            .delay_until
            .is_some_and(|until| Instant::now() < until)
        {
            TimedState::Waiting
        } else {
            TimedState::Running
        }
    }

    fn poll_ready(&self, now: Instant) -> bool {
        let mut clock = self.clock();
        if clock.paused {
            return false;
        }
        match clock.delay_until {
            Some(until) if now < until => false,
            Some(_) => {
                clock.delay_until = None;
                true
            }
            None => true,
        }
    }

    fn begin_step(&self) -> StepMark {
        StepMark(self.clock().generation)
    }

    fn complete_step(&self, mark: StepMark, now: Instant) {
        if self.speed.is_zero() {
            return;
        }
        let mut clock = self.clock();
        if clock.generation == mark.0 {
            clock.hold(self.speed.to_std(), now);
        }
    }
}
