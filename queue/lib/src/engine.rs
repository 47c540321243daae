//! Tick-driven scheduler for script queues.
//!
//! The [`Engine`] owns a [`QueueDirectory`] and advances every registered
//! queue once per tick:
//!
//! - timed queues pop at most one entry, unless they are paused or waiting;
//! - instant queues run every entry they have;
//! - queues with nothing left are finished and leave the directory.
//!
//! Steps may create, clear, pause or delay any queue, including the one
//! running them. The engine works from a snapshot of the directory, so those
//! changes are picked up on the next tick.
//!
//! ## Examples
//!
//! ```
//! use std::sync::Arc;
//! use script_queue::{
//!     CommandRegistry, ContextResolver, Engine, EngineConfig, EngineEvent, QueueDirectory,
//!     ScriptEntry, ScriptQueue, TimedQueue,
//! };
//! use tokio::sync::mpsc;
//!
//! let directory = Arc::new(QueueDirectory::new());
//! let (tx, mut rx) = mpsc::unbounded_channel();
//! let engine = Engine::new(
//!     Arc::clone(&directory),
//!     CommandRegistry::with_builtins(),
//!     Arc::new(ContextResolver::new()),
//!     EngineConfig::default(),
//! )
//! .with_events(tx);
//!
//! let queue = TimedQueue::create(&directory, "main", Default::default()).unwrap();
//! queue.enqueue(ScriptEntry::new("echo", ["hello from <queue.name>"])).unwrap();
//!
//! engine.tick();
//!
//! match rx.try_recv().unwrap() {
//!     EngineEvent::Echo { message, .. } => assert_eq!(message, "hello from main"),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::command::{CommandRegistry, ExecutionContext};
use crate::config::EngineConfig;
use crate::directory::QueueDirectory;
use crate::entry::ScriptEntry;
use crate::error::CommandError;
use crate::queue::ScriptQueue;
use crate::tags::TagResolver;

/// Shortest tick period the driver loop accepts.
const MIN_TICK: std::time::Duration = std::time::Duration::from_millis(1);

/// Event emitted while the engine runs.
///
/// These events are sent through the channel provided to
/// [`Engine::with_events`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum EngineEvent {
    /// A step ran to completion.
    StepExecuted {
        /// Queue that ran the step.
        queue: String,
        /// Command name of the step.
        command: String,
    },
    /// A step failed. The queue carries on with its next entry.
    StepFailed {
        /// Queue that ran the step.
        queue: String,
        /// Command name of the step.
        command: String,
        /// Why it failed.
        error: String,
    },
    /// Output of an `ECHO` step.
    Echo {
        /// Queue that ran the step.
        queue: String,
        /// The resolved text.
        message: String,
    },
    /// A queue ran out of entries or was cleared, and left the directory.
    QueueFinished {
        /// Name of the finished queue.
        queue: String,
    },
}

/// What a single tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Steps that completed.
    pub executed: usize,
    /// Steps that returned an error.
    pub failed: usize,
    /// Timed queues left alone because they were paused or waiting.
    pub skipped: usize,
    /// Queues finished during this tick.
    pub finished: Vec<String>,
}

/// Why [`Engine::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every queue finished.
    Idle,
    /// The shutdown future resolved.
    Shutdown,
    /// `max_ticks` from the configuration was reached.
    TickLimit,
}

/// Advances all queues in a directory, one tick at a time.
pub struct Engine {
    directory: Arc<QueueDirectory>,
    commands: CommandRegistry,
    resolver: Arc<dyn TagResolver>,
    config: EngineConfig,
    events: Option<mpsc::UnboundedSender<EngineEvent>>,
    ticks: AtomicU64,
}

impl Engine {
    /// Creates an engine over `directory`.
    #[must_use]
    pub fn new(
        directory: Arc<QueueDirectory>,
        commands: CommandRegistry,
        resolver: Arc<dyn TagResolver>,
        config: EngineConfig,
    ) -> Self {
        Self {
            directory,
            commands,
            resolver,
            config,
            events: None,
            ticks: AtomicU64::new(0),
        }
    }

    /// Sends [`EngineEvent`]s to `events`.
    #[must_use]
    pub fn with_events(mut self, events: mpsc::UnboundedSender<EngineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn directory(&self) -> &Arc<QueueDirectory> {
        &self.directory
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Runs one scheduling pass over every registered queue.
    pub fn tick(&self) -> TickReport {
        let now = Instant::now();
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        let mut report = TickReport::default();

        for queue in self.directory.snapshot() {
            if queue.is_finished() {
                continue;
            }

            if queue.is_empty() {
                self.finish(&queue, &mut report);
                continue;
            }

            match queue.as_timed() {
                Some(timed) => {
                    if !timed.poll_ready(now) {
                        report.skipped += 1;
                        continue;
                    }
                    let Some(entry) = queue.pop_next() else {
                        self.finish(&queue, &mut report);
                        continue;
                    };
                    let mark = timed.begin_step();
                    self.execute(&queue, entry, &mut report);
                    timed.complete_step(mark, Instant::now());
                }
                None => {
                    while let Some(entry) = queue.pop_next() {
                        self.execute(&queue, entry, &mut report);
                    }
                    self.finish(&queue, &mut report);
                }
            }
        }

        if report.executed + report.failed > 0 || !report.finished.is_empty() {
            tracing::trace!(
                tick,
                executed = report.executed,
                failed = report.failed,
                skipped = report.skipped,
                finished = report.finished.len(),
                "tick"
            );
        }
        report
    }

    /// Drives [`tick`](Self::tick) on the configured interval.
    ///
    /// Returns once no queue is left, once `shutdown` resolves, or once the
    /// configured tick limit is reached. Every remaining queue is cleared
    /// before returning.
    pub async fn run<F>(&self, shutdown: F) -> RunOutcome
    where
        F: Future<Output = ()>,
    {
        let mut shutdown = std::pin::pin!(shutdown);
        let period = self.config.tick.to_std().max(MIN_TICK);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            queues = self.directory.len(),
            tick = %self.config.tick,
            "engine started"
        );

        let outcome = loop {
            tokio::select! {
                () = &mut shutdown => break RunOutcome::Shutdown,
                _ = interval.tick() => {}
            }

            self.tick();

            if self.directory.is_empty() {
                break RunOutcome::Idle;
            }
            if let Some(limit) = self.config.max_ticks
                && self.ticks() >= limit
            {
                break RunOutcome::TickLimit;
            }
        };

        self.shutdown();
        tracing::info!(?outcome, ticks = self.ticks(), "engine stopped");
        outcome
    }

    /// Clears every queue still registered.
    pub fn shutdown(&self) {
        for queue in self.directory.snapshot() {
            queue.clear();
            self.emit(EngineEvent::QueueFinished {
                queue: queue.name().to_string(),
            });
        }
    }

    fn execute(&self, queue: &Arc<dyn ScriptQueue>, entry: ScriptEntry, report: &mut TickReport) {
        let command = entry.command().to_string();
        tracing::debug!(queue = %queue.name(), command = %command, args = ?entry.arguments(), "step");

        let mut ctx = ExecutionContext::new(&self.directory, Arc::clone(queue));
        if let Some(events) = &self.events {
            ctx = ctx.with_events(events);
        }

        match self.commands.dispatch(entry, self.resolver.as_ref(), &ctx) {
            Ok(()) => {
                report.executed += 1;
                self.emit(EngineEvent::StepExecuted {
                    queue: queue.name().to_string(),
                    command,
                });
            }
            Err(err) => {
                report.failed += 1;
                self.report_failure(queue, command, &err);
            }
        }
    }

    fn report_failure(&self, queue: &Arc<dyn ScriptQueue>, command: String, err: &CommandError) {
        tracing::warn!(queue = %queue.name(), command = %command, error = %err, "step failed");
        self.emit(EngineEvent::StepFailed {
            queue: queue.name().to_string(),
            command,
            error: err.to_string(),
        });
    }

    fn finish(&self, queue: &Arc<dyn ScriptQueue>, report: &mut TickReport) {
        if queue.finish_if_empty() {
            tracing::debug!(queue = %queue.name(), "queue drained");
            report.finished.push(queue.name().to_string());
            self.emit(EngineEvent::QueueFinished {
                queue: queue.name().to_string(),
            });
        }
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("queues", &self.directory.names())
            .field("commands", &self.commands)
            .field("config", &self.config)
            .field("ticks", &self.ticks())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duration::Duration;
    use crate::queue::InstantQueue;
    use crate::tags::ContextResolver;
    use crate::timed::{TimedControl, TimedQueue};

    fn engine() -> (Arc<QueueDirectory>, Engine, mpsc::UnboundedReceiver<EngineEvent>) {
        let directory = Arc::new(QueueDirectory::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Engine::new(
            Arc::clone(&directory),
            CommandRegistry::with_builtins(),
            Arc::new(ContextResolver::new()),
            EngineConfig::default(),
        )
        .with_events(tx);
        (directory, engine, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<EngineEvent>) -> Vec<EngineEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    fn echoes(events: &[EngineEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|event| match event {
                EngineEvent::Echo { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn timed_queue_runs_one_entry_per_tick() {
        let (directory, engine, mut rx) = engine();
        let queue = TimedQueue::create(&directory, "main", Duration::ZERO).unwrap();
        for word in ["one", "two"] {
            queue.enqueue(ScriptEntry::new("echo", [word])).unwrap();
        }

        let report = engine.tick();
        assert_eq!(report.executed, 1);
        assert_eq!(echoes(&drain(&mut rx)), ["one"]);

        engine.tick();
        assert_eq!(echoes(&drain(&mut rx)), ["two"]);
        assert!(directory.lookup("main").is_some());

        let report = engine.tick();
        assert_eq!(report.finished, ["main"]);
        assert!(directory.is_empty());
    }

    #[test]
    fn instant_queue_drains_in_one_tick() {
        let (directory, engine, mut rx) = engine();
        let queue = InstantQueue::create(&directory, "setup").unwrap();
        for word in ["a", "b", "c"] {
            queue.enqueue(ScriptEntry::new("echo", [word])).unwrap();
        }

        let report = engine.tick();

        assert_eq!(report.executed, 3);
        assert_eq!(report.finished, ["setup"]);
        assert_eq!(echoes(&drain(&mut rx)), ["a", "b", "c"]);
        assert!(directory.is_empty());
    }

    #[test]
    fn failing_step_does_not_stop_the_queue() {
        let (directory, engine, mut rx) = engine();
        let queue = TimedQueue::create(&directory, "main", Duration::ZERO).unwrap();
        queue.enqueue(ScriptEntry::new("queue", ["main"])).unwrap();
        queue.enqueue(ScriptEntry::new("echo", ["after"])).unwrap();

        let report = engine.tick();
        assert_eq!(report.failed, 1);
        let events = drain(&mut rx);
        assert!(events.iter().any(|event| matches!(
            event,
            EngineEvent::StepFailed { error, .. } if error.contains("must specify an action")
        )));

        engine.tick();
        assert_eq!(echoes(&drain(&mut rx)), ["after"]);
    }

    #[test]
    fn unknown_command_is_reported() {
        let (directory, engine, mut rx) = engine();
        let queue = TimedQueue::create(&directory, "main", Duration::ZERO).unwrap();
        queue.enqueue(ScriptEntry::new("teleport", ["home"])).unwrap();

        engine.tick();

        assert_eq!(
            drain(&mut rx)[0],
            EngineEvent::StepFailed {
                queue: "main".to_string(),
                command: "teleport".to_string(),
                error: "unknown command 'teleport'".to_string(),
            }
        );
    }

    #[test]
    fn paused_queue_is_skipped() {
        let (directory, engine, _rx) = engine();
        let queue = TimedQueue::create(&directory, "main", Duration::ZERO).unwrap();
        queue.enqueue(ScriptEntry::new("echo", ["x"])).unwrap();
        queue.set_paused(true);

        let report = engine.tick();
        assert_eq!(report.skipped, 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn step_can_clear_its_own_queue() {
        let (directory, engine, mut rx) = engine();
        let queue = TimedQueue::create(&directory, "main", Duration::ZERO).unwrap();
        queue.enqueue(ScriptEntry::new("queue", ["clear"])).unwrap();
        queue.enqueue(ScriptEntry::new("echo", ["never"])).unwrap();

        engine.tick();
        engine.tick();

        assert!(directory.is_empty());
        assert!(echoes(&drain(&mut rx)).is_empty());
    }

    #[test]
    fn step_can_create_queues() {
        let (directory, engine, mut rx) = engine();
        let main = InstantQueue::create(&directory, "main").unwrap();
        main.enqueue(ScriptEntry::new("echo", ["first"])).unwrap();

        engine.tick();
        let late = TimedQueue::create(&directory, "main", Duration::ZERO).unwrap();
        late.enqueue(ScriptEntry::new("echo", ["second"])).unwrap();
        engine.tick();

        assert_eq!(echoes(&drain(&mut rx)), ["first", "second"]);
    }

    #[tokio::test(start_paused = true)]
    async fn speed_spaces_out_steps() {
        let (directory, engine, mut rx) = engine();
        let speed = Duration::from_secs_f64(1.0).unwrap();
        let queue = TimedQueue::create(&directory, "main", speed).unwrap();
        for word in ["one", "two"] {
            queue.enqueue(ScriptEntry::new("echo", [word])).unwrap();
        }

        engine.tick();
        tokio::time::advance(std::time::Duration::from_millis(500)).await;
        engine.tick();
        assert_eq!(echoes(&drain(&mut rx)), ["one"]);

        tokio::time::advance(std::time::Duration::from_millis(500)).await;
        engine.tick();
        assert_eq!(echoes(&drain(&mut rx)), ["two"]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_when_idle() {
        let (directory, engine, mut rx) = engine();
        let queue = TimedQueue::create(&directory, "main", Duration::ZERO).unwrap();
        queue.enqueue(ScriptEntry::new("echo", ["done"])).unwrap();

        let outcome = engine.run(std::future::pending()).await;

        assert_eq!(outcome, RunOutcome::Idle);
        assert_eq!(echoes(&drain(&mut rx)), ["done"]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_honours_shutdown_and_clears_queues() {
        let (directory, engine, _rx) = engine();
        let queue = TimedQueue::create(&directory, "main", Duration::ZERO).unwrap();
        queue.enqueue(ScriptEntry::new("echo", ["x"])).unwrap();
        queue.set_paused(true);

        let outcome = engine
            .run(tokio::time::sleep(std::time::Duration::from_secs(1)))
            .await;

        assert_eq!(outcome, RunOutcome::Shutdown);
        assert!(directory.is_empty());
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_respects_tick_limit() {
        let directory = Arc::new(QueueDirectory::new());
        let engine = Engine::new(
            Arc::clone(&directory),
            CommandRegistry::with_builtins(),
            Arc::new(ContextResolver::new()),
            EngineConfig::default().max_ticks(3),
        );
        let queue = TimedQueue::create(&directory, "main", Duration::ZERO).unwrap();
        queue.enqueue(ScriptEntry::new("echo", ["x"])).unwrap();
        queue.set_paused(true);

        let outcome = engine.run(std::future::pending()).await;

        assert_eq!(outcome, RunOutcome::TickLimit);
        assert_eq!(engine.ticks(), 3);
    }

    #[test]
    fn events_serialize_with_tag() {
        let event = EngineEvent::QueueFinished {
            queue: "main".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"event":"queue_finished","queue":"main"}"#);
    }
}
