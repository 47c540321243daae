//! Script commands and the registry the engine dispatches through.
//!
//! Every command runs in two phases. [`Command::parse_args`] turns the
//! resolved argument tokens into a [`ParsedArgs`] value, which is stored on
//! the entry; [`Command::execute`] then reads it back through
//! [`ScriptEntry::get`]. Validation errors surface in the first phase, before
//! anything is touched.

mod echo;
pub mod queue;
mod wait;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::directory::QueueDirectory;
use crate::engine::EngineEvent;
use crate::entry::{ParsedArgs, ScriptEntry};
use crate::error::CommandError;
use crate::queue::ScriptQueue;
use crate::tags::{TagResolver, substitute};

pub use echo::EchoCommand;
pub use queue::QueueCommand;
pub use wait::WaitCommand;

/// Everything a step can see while it runs.
#[derive(Clone)]
pub struct ExecutionContext<'a> {
    directory: &'a Arc<QueueDirectory>,
    queue: Arc<dyn ScriptQueue>,
    events: Option<&'a UnboundedSender<EngineEvent>>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(directory: &'a Arc<QueueDirectory>, queue: Arc<dyn ScriptQueue>) -> Self {
        Self {
            directory,
            queue,
            events: None,
        }
    }

    #[must_use]
    pub fn with_events(mut self, events: &'a UnboundedSender<EngineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn directory(&self) -> &Arc<QueueDirectory> {
        self.directory
    }

    /// The queue running the current step.
    pub fn queue(&self) -> &Arc<dyn ScriptQueue> {
        &self.queue
    }

    /// Sends an event to the engine's listener, if there is one.
    pub fn emit(&self, event: EngineEvent) {
        if let Some(events) = self.events {
            // A closed receiver only means nobody is listening any more.
            let _ = events.send(event);
        }
    }
}

impl fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("queue", &self.queue.name())
            .field("queues", &self.directory.len())
            .finish_non_exhaustive()
    }
}

/// A named script command.
pub trait Command: Send + Sync {
    /// Upper-case name scripts use to invoke the command.
    fn name(&self) -> &'static str;

    /// Validates resolved argument tokens and produces typed arguments.
    ///
    /// ## Errors
    ///
    /// Returns a [`CommandError`] describing the first invalid argument.
    fn parse_args(
        &self,
        arguments: &[String],
        ctx: &ExecutionContext<'_>,
    ) -> Result<ParsedArgs, CommandError>;

    /// Runs the command using the objects stored by the parse phase.
    ///
    /// ## Errors
    ///
    /// Returns a [`CommandError`] if the stored objects are incomplete.
    fn execute(&self, entry: &ScriptEntry, ctx: &ExecutionContext<'_>) -> Result<(), CommandError>;
}

/// Case-insensitive lookup table of commands.
#[derive(Default, Clone)]
pub struct CommandRegistry {
    commands: HashMap<String, Arc<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `QUEUE`, `WAIT` and `ECHO`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(QueueCommand);
        registry.register(WaitCommand);
        registry.register(EchoCommand);
        registry
    }

    /// Adds a command, replacing any command with the same name.
    pub fn register(&mut self, command: impl Command + 'static) {
        self.commands
            .insert(command.name().to_uppercase(), Arc::new(command));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(&name.to_uppercase()).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Runs one entry through both phases.
    ///
    /// References in the arguments are resolved first, against the live
    /// state in `ctx`.
    ///
    /// ## Errors
    ///
    /// Returns [`CommandError::UnknownCommand`] for unregistered names, or
    /// whatever the command's parse or execute phase reports.
    pub fn dispatch(
        &self,
        mut entry: ScriptEntry,
        resolver: &dyn TagResolver,
        ctx: &ExecutionContext<'_>,
    ) -> Result<(), CommandError> {
        let command = self
            .get(entry.command())
            .ok_or_else(|| CommandError::UnknownCommand(entry.command().to_string()))?;

        let arguments: Vec<String> = entry
            .arguments()
            .iter()
            .map(|raw| substitute(raw, resolver, ctx))
            .collect();

        let objects = command.parse_args(&arguments, ctx)?;
        entry.set_objects(objects);
        command.execute(&entry, ctx)
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::duration::Duration;
    use crate::entry::ArgValue;
    use crate::error::ArgumentError;
    use crate::tags::ContextResolver;
    use crate::timed::TimedQueue;

    /// Records the message it was given, after resolution.
    #[derive(Default)]
    struct Record {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl Command for Record {
        fn name(&self) -> &'static str {
            "record"
        }

        fn parse_args(
            &self,
            arguments: &[String],
            _ctx: &ExecutionContext<'_>,
        ) -> Result<ParsedArgs, CommandError> {
            Ok(ParsedArgs::new().with("message", ArgValue::Text(arguments.join(" "))))
        }

        fn execute(
            &self,
            entry: &ScriptEntry,
            _ctx: &ExecutionContext<'_>,
        ) -> Result<(), CommandError> {
            let message = entry.get_text("message")?.to_string();
            self.seen.lock().unwrap().push(message);
            Ok(())
        }
    }

    /// Reads a key its parse phase never stores.
    struct Forgetful;

    impl Command for Forgetful {
        fn name(&self) -> &'static str {
            "FORGETFUL"
        }

        fn parse_args(
            &self,
            _arguments: &[String],
            _ctx: &ExecutionContext<'_>,
        ) -> Result<ParsedArgs, CommandError> {
            Ok(ParsedArgs::new())
        }

        fn execute(
            &self,
            entry: &ScriptEntry,
            _ctx: &ExecutionContext<'_>,
        ) -> Result<(), CommandError> {
            entry.get("target")?;
            Ok(())
        }
    }

    #[test]
    fn builtins_are_registered() {
        let registry = CommandRegistry::with_builtins();
        assert_eq!(registry.names(), ["ECHO", "QUEUE", "WAIT"]);
    }

    #[test]
    fn lookup_ignores_case() {
        let registry = CommandRegistry::with_builtins();
        assert!(registry.get("queue").is_some());
        assert!(registry.get("Queue").is_some());
        assert!(registry.get("teleport").is_none());
    }

    #[test]
    fn dispatch_resolves_references_before_parsing() {
        let directory = Arc::new(QueueDirectory::new());
        let queue = TimedQueue::create(&directory, "main", Duration::ZERO).unwrap();
        let ctx = ExecutionContext::new(&directory, queue);

        let record = Record::default();
        let seen = Arc::clone(&record.seen);
        let mut registry = CommandRegistry::new();
        registry.register(record);

        let entry = ScriptEntry::new("record", ["hello", "<queue.name>"]);
        registry
            .dispatch(entry, &ContextResolver::new(), &ctx)
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), ["hello main"]);
    }

    #[test]
    fn dispatch_rejects_unknown_commands() {
        let directory = Arc::new(QueueDirectory::new());
        let queue = TimedQueue::create(&directory, "main", Duration::ZERO).unwrap();
        let ctx = ExecutionContext::new(&directory, queue);

        let err = CommandRegistry::new()
            .dispatch(ScriptEntry::new("teleport", ["home"]), &ContextResolver::new(), &ctx)
            .unwrap_err();
        assert_eq!(err, CommandError::UnknownCommand("teleport".to_string()));
    }

    #[test]
    fn reading_an_unparsed_key_is_missing_argument() {
        let directory = Arc::new(QueueDirectory::new());
        let queue = TimedQueue::create(&directory, "main", Duration::ZERO).unwrap();
        let ctx = ExecutionContext::new(&directory, queue);

        let mut registry = CommandRegistry::new();
        registry.register(Forgetful);

        let err = registry
            .dispatch(ScriptEntry::new("forgetful", Vec::<String>::new()), &ContextResolver::new(), &ctx)
            .unwrap_err();
        assert_eq!(
            err,
            CommandError::Argument(ArgumentError::MissingArgument("target".to_string()))
        );
    }
}
