//! `QUEUE` - controls one or more queues by name.
//!
//! ```text
//! QUEUE CLEAR|SET|PAUSE|RESUME [<name>[,<name>...]]
//! QUEUE DELAY:<duration> [<name>[,<name>...]]
//! ```
//!
//! Without names the command acts on the queue running it. Names that do
//! not match a live queue are skipped. PAUSE, RESUME and DELAY only affect
//! queues with a clock; other queues are skipped as well.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::command::{Command, ExecutionContext};
use crate::directory::QueueDirectory;
use crate::duration::{Duration, parse_duration};
use crate::entry::{ArgValue, ParsedArgs, ScriptEntry};
use crate::error::{ArgumentError, CommandError, DirectiveError};
use crate::queue::ScriptQueue;
use crate::timed::TimedControl;

/// What a directive does to its targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueAction {
    Clear,
    /// Accepted for script compatibility; does nothing.
    Set,
    Delay,
    Pause,
    Resume,
}

impl QueueAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueAction::Clear => "CLEAR",
            QueueAction::Set => "SET",
            QueueAction::Delay => "DELAY",
            QueueAction::Pause => "PAUSE",
            QueueAction::Resume => "RESUME",
        }
    }
}

impl fmt::Display for QueueAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CLEAR" => Ok(QueueAction::Clear),
            "SET" => Ok(QueueAction::Set),
            "DELAY" => Ok(QueueAction::Delay),
            "PAUSE" => Ok(QueueAction::Pause),
            "RESUME" => Ok(QueueAction::Resume),
            _ => Err(()),
        }
    }
}

/// Which queues a directive acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Targets {
    /// The queue running the directive.
    Residing,
    /// Queues looked up by name when the directive is applied.
    Named(Vec<String>),
}

/// A validated queue control directive.
///
/// ## Examples
///
/// ```
/// use script_queue::{QueueAction, QueueDirective, Targets};
///
/// let directive = QueueDirective::parse(["pause", "main,helper"]).unwrap();
/// assert_eq!(directive.action, QueueAction::Pause);
/// assert_eq!(directive.targets, Targets::Named(vec!["main".into(), "helper".into()]));
///
/// assert!(QueueDirective::parse(["main"]).is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct QueueDirective {
    pub action: QueueAction,
    pub delay: Option<Duration>,
    pub targets: Targets,
}

impl QueueDirective {
    /// Parses directive tokens. Token order does not matter.
    ///
    /// - `CLEAR`, `SET`, `PAUSE`, `RESUME` (any case) select the action;
    /// - `DELAY:<duration>` or `DELAY=<duration>` selects DELAY with a value;
    /// - anything else is a comma-separated list of queue names.
    ///
    /// No queue is looked up here.
    ///
    /// ## Errors
    ///
    /// - [`DirectiveError::MissingAction`] if no action token is present
    /// - [`DirectiveError::MissingDuration`] if DELAY has no value
    /// - [`DirectiveError::InvalidDuration`] if the DELAY value is malformed
    pub fn parse<I, S>(tokens: I) -> Result<Self, DirectiveError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut action = None;
        let mut delay = None;
        let mut names: Option<Vec<String>> = None;

        for token in tokens {
            let token = token.as_ref().trim();
            if token.is_empty() {
                continue;
            }

            if let Some(value) = delay_value(token) {
                action = Some(QueueAction::Delay);
                delay = if value.trim().is_empty() {
                    None
                } else {
                    Some(parse_duration(value)?)
                };
            } else if let Ok(parsed) = token.parse::<QueueAction>() {
                action = Some(parsed);
            } else {
                names.get_or_insert_with(Vec::new).extend(
                    token
                        .split(',')
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                        .map(str::to_string),
                );
            }
        }

        let action = action.ok_or(DirectiveError::MissingAction)?;
        if action == QueueAction::Delay && delay.is_none() {
            return Err(DirectiveError::MissingDuration);
        }

        Ok(Self {
            action,
            delay,
            targets: names.map_or(Targets::Residing, Targets::Named),
        })
    }

    /// Looks up the target queues. Unknown names are dropped.
    pub fn resolve(
        &self,
        directory: &QueueDirectory,
        residing: Option<Arc<dyn ScriptQueue>>,
    ) -> Vec<Arc<dyn ScriptQueue>> {
        let mut queues: Vec<Arc<dyn ScriptQueue>> = match &self.targets {
            Targets::Residing => residing.into_iter().collect(),
            Targets::Named(names) => names
                .iter()
                .filter_map(|name| directory.lookup(name))
                .collect(),
        };
        let mut seen = HashSet::new();
        queues.retain(|queue| seen.insert(queue.id()));
        queues
    }

    /// Resolves the targets and applies the action to each of them.
    ///
    /// Returns the number of queues the action was applied to.
    pub fn apply(
        &self,
        directory: &QueueDirectory,
        residing: Option<Arc<dyn ScriptQueue>>,
    ) -> usize {
        let queues = self.resolve(directory, residing);

        let names: Vec<&str> = queues.iter().map(|queue| queue.name()).collect();
        tracing::info!(
            target: "script_queue::command",
            queues = ?names,
            action = %self.action,
            delay = self.delay.map(tracing::field::display),
            "QUEUE"
        );

        match self.action {
            QueueAction::Clear => {
                for queue in &queues {
                    queue.clear();
                }
                queues.len()
            }
            QueueAction::Pause => for_each_timed(&queues, |timed| timed.set_paused(true)),
            QueueAction::Resume => for_each_timed(&queues, |timed| timed.set_paused(false)),
            QueueAction::Delay => match self.delay {
                Some(delay) => for_each_timed(&queues, |timed| timed.delay_for(delay)),
                None => 0,
            },
            QueueAction::Set => 0,
        }
    }

    fn to_args(&self) -> ParsedArgs {
        let mut args = ParsedArgs::new().with("action", ArgValue::Text(self.action.to_string()));
        if let Some(delay) = self.delay {
            args.insert("delay", ArgValue::Duration(delay));
        }
        if let Targets::Named(names) = &self.targets {
            args.insert("queues", ArgValue::List(names.clone()));
        }
        args
    }

    fn from_entry(entry: &ScriptEntry) -> Result<Self, ArgumentError> {
        let action = entry
            .get_text("action")?
            .parse::<QueueAction>()
            .map_err(|()| ArgumentError::WrongArgumentType {
                name: "action".to_string(),
                expected: "queue action",
            })?;

        let delay = match action {
            QueueAction::Delay => Some(entry.get_duration("delay")?),
            _ => None,
        };

        let targets = match entry.get_list("queues") {
            Ok(names) => Targets::Named(names.to_vec()),
            Err(ArgumentError::MissingArgument(_)) => Targets::Residing,
            Err(err) => return Err(err),
        };

        Ok(Self {
            action,
            delay,
            targets,
        })
    }
}

fn delay_value(token: &str) -> Option<&str> {
    if token.eq_ignore_ascii_case("delay") {
        return Some("");
    }
    let prefix = token.get(..6)?;
    if prefix.eq_ignore_ascii_case("delay:") || prefix.eq_ignore_ascii_case("delay=") {
        Some(&token[6..])
    } else {
        None
    }
}

fn for_each_timed(queues: &[Arc<dyn ScriptQueue>], action: impl Fn(&dyn TimedControl)) -> usize {
    let mut applied = 0;
    for timed in queues.iter().filter_map(|queue| queue.as_timed()) {
        action(timed);
        applied += 1;
    }
    applied
}

/// The `QUEUE` script command.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueCommand;

impl Command for QueueCommand {
    fn name(&self) -> &'static str {
        "QUEUE"
    }

    fn parse_args(
        &self,
        arguments: &[String],
        _ctx: &ExecutionContext<'_>,
    ) -> Result<ParsedArgs, CommandError> {
        Ok(QueueDirective::parse(arguments)?.to_args())
    }

    fn execute(&self, entry: &ScriptEntry, ctx: &ExecutionContext<'_>) -> Result<(), CommandError> {
        let directive = QueueDirective::from_entry(entry)?;
        directive.apply(ctx.directory(), entry.residing_queue());
        Ok(())
    }
}
