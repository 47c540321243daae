//! Tick-driven script queues with pause, delay and cross-queue control.
//!
//! Scripts are lists of entries held in named queues. An [`Engine`] advances
//! every queue once per tick; entries may pause, resume, delay or clear any
//! queue by name through the `QUEUE` command.
//!
//! ## Core Types
//!
//! - [`Duration`] - Non-negative span of seconds, parsed from `5s`, `2m`, `20t`
//! - [`ScriptEntry`] - One step: a command name plus its arguments
//! - [`ParsedArgs`] / [`ArgValue`] - Typed arguments produced by a command's parse phase
//!
//! ## Queues
//!
//! - [`ScriptQueue`] - Behaviour shared by every queue
//! - [`TimedQueue`] - One entry per tick, subject to speed, pause and delay
//! - [`InstantQueue`] - Runs all of its entries in a single tick
//! - [`TimedControl`] - The pause/delay capability, via [`ScriptQueue::as_timed`]
//! - [`QueueDirectory`] - Name lookup for every live queue
//!
//! ## Commands
//!
//! - [`Command`] / [`CommandRegistry`] - Two-phase commands and their lookup table
//! - [`QueueCommand`] - `QUEUE [<names>] CLEAR|SET|DELAY:<d>|PAUSE|RESUME`
//! - [`WaitCommand`] - `WAIT [<d>]`, delays the running queue
//! - [`EchoCommand`] - `ECHO <text>`, reports text through the engine's events
//!
//! ## Running Scripts
//!
//! - [`Engine`] - Ticks every queue and reports [`EngineEvent`]s
//! - [`EngineConfig`] - Tick spacing, default speed and tick limit, from TOML
//! - [`ScriptFile`] - Queues loaded from a YAML file
//! - [`TagResolver`] / [`ContextResolver`] - `<...>` references in arguments

pub mod command;
mod config;
mod directory;
mod duration;
mod engine;
mod entry;
mod error;
mod queue;
mod script;
mod tags;
mod timed;

pub use command::queue::{QueueAction, QueueDirective, Targets};
pub use command::{
    Command, CommandRegistry, EchoCommand, ExecutionContext, QueueCommand, WaitCommand,
};
pub use config::EngineConfig;
pub use directory::QueueDirectory;
pub use duration::{Duration, parse_duration};
pub use engine::{Engine, EngineEvent, RunOutcome, TickReport};
pub use entry::{ArgValue, ParsedArgs, ScriptEntry};
pub use error::{
    ArgumentError, CommandError, ConfigError, DirectiveError, DurationError, QueueError,
    ScriptError,
};
pub use queue::{InstantQueue, QueueId, ScriptQueue};
pub use script::{QueueKind, QueueScript, ScriptFile, ScriptStep, tokenize};
pub use tags::{ContextResolver, TagResolver, substitute};
pub use timed::{StepMark, TimedControl, TimedQueue, TimedState};
