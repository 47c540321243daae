//! Script entries and the typed arguments produced by parsing them.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::duration::Duration;
use crate::error::ArgumentError;
use crate::queue::ScriptQueue;

/// A single typed value produced by a command's parse phase.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Text(String),
    Duration(Duration),
    List(Vec<String>),
}

impl ArgValue {
    fn kind(&self) -> &'static str {
        match self {
            ArgValue::Text(_) => "text",
            ArgValue::Duration(_) => "duration",
            ArgValue::List(_) => "list",
        }
    }
}

/// The typed result of parsing a script entry's arguments.
///
/// Built once by [`Command::parse_args`](crate::Command::parse_args), stored
/// on the entry with [`ScriptEntry::set_objects`] and read back during
/// execution.
///
/// ## Examples
///
/// ```
/// use script_queue::{ArgValue, ParsedArgs};
///
/// let args = ParsedArgs::new().with("action", ArgValue::Text("PAUSE".into()));
/// assert!(args.contains("action"));
/// assert!(!args.contains("delay"));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedArgs {
    values: HashMap<String, ArgValue>,
}

impl ParsedArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value, replacing any previous value under the same name.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: ArgValue) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ArgValue) {
        self.values.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the value stored under `name`.
    ///
    /// ## Errors
    ///
    /// Returns [`ArgumentError::MissingArgument`] if parsing never stored it.
    pub fn get(&self, name: &str) -> Result<&ArgValue, ArgumentError> {
        self.values
            .get(name)
            .ok_or_else(|| ArgumentError::MissingArgument(name.to_string()))
    }
}

/// One executable step of a queue.
///
/// An entry starts unbound. [`ScriptQueue::enqueue`] binds it to the queue
/// that will run it; from then on [`residing_queue`](Self::residing_queue)
/// points back at that queue without keeping it alive.
#[derive(Debug)]
pub struct ScriptEntry {
    command: String,
    arguments: Vec<String>,
    objects: Option<ParsedArgs>,
    residing_queue: Option<Weak<dyn ScriptQueue>>,
}

impl ScriptEntry {
    /// Creates an unbound entry.
    ///
    /// ## Examples
    ///
    /// ```
    /// use script_queue::ScriptEntry;
    ///
    /// let entry = ScriptEntry::new("queue", ["pause", "main"]);
    /// assert_eq!(entry.command(), "queue");
    /// assert_eq!(entry.arguments(), ["pause", "main"]);
    /// assert!(entry.residing_queue().is_none());
    /// ```
    pub fn new<I, S>(command: impl Into<String>, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into(),
            arguments: arguments.into_iter().map(Into::into).collect(),
            objects: None,
            residing_queue: None,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// The original, unresolved argument tokens.
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// The queue this entry was enqueued on, if it is still alive.
    pub fn residing_queue(&self) -> Option<Arc<dyn ScriptQueue>> {
        self.residing_queue.as_ref().and_then(Weak::upgrade)
    }

    /// Stores the result of the parse phase.
    pub fn set_objects(&mut self, objects: ParsedArgs) {
        self.objects = Some(objects);
    }

    pub fn has_objects(&self) -> bool {
        self.objects.is_some()
    }

    /// Returns a parsed object by name.
    ///
    /// ## Errors
    ///
    /// Returns [`ArgumentError::MissingArgument`] if the entry was never
    /// parsed or the parse phase did not store `name`.
    pub fn get(&self, name: &str) -> Result<&ArgValue, ArgumentError> {
        match &self.objects {
            Some(objects) => objects.get(name),
            None => Err(ArgumentError::MissingArgument(name.to_string())),
        }
    }

    /// Returns a parsed text object.
    ///
    /// ## Errors
    ///
    /// Fails if the object is missing or is not [`ArgValue::Text`].
    pub fn get_text(&self, name: &str) -> Result<&str, ArgumentError> {
        match self.get(name)? {
            ArgValue::Text(text) => Ok(text),
            other => Err(wrong_type(name, "text", other)),
        }
    }

    /// Returns a parsed duration object.
    ///
    /// ## Errors
    ///
    /// Fails if the object is missing or is not [`ArgValue::Duration`].
    pub fn get_duration(&self, name: &str) -> Result<Duration, ArgumentError> {
        match self.get(name)? {
            ArgValue::Duration(duration) => Ok(*duration),
            other => Err(wrong_type(name, "duration", other)),
        }
    }

    /// Returns a parsed list object.
    ///
    /// ## Errors
    ///
    /// Fails if the object is missing or is not [`ArgValue::List`].
    pub fn get_list(&self, name: &str) -> Result<&[String], ArgumentError> {
        match self.get(name)? {
            ArgValue::List(items) => Ok(items),
            other => Err(wrong_type(name, "list", other)),
        }
    }

    pub(crate) fn bound_queue(&self) -> Option<&Weak<dyn ScriptQueue>> {
        self.residing_queue.as_ref()
    }

    pub(crate) fn bind(&mut self, queue: Weak<dyn ScriptQueue>) {
        self.residing_queue = Some(queue);
    }
}

fn wrong_type(name: &str, expected: &'static str, found: &ArgValue) -> ArgumentError {
    tracing::trace!(name, expected, found = found.kind(), "argument type mismatch");
    ArgumentError::WrongArgumentType {
        name: name.to_string(),
        expected,
    }
}
