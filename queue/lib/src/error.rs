//! Error types for the script queue library.
//!
//! A queue name that cannot be found is deliberately absent from this module:
//! lookups return `Option` and callers skip unknown names.

use thiserror::Error;

/// Errors produced while parsing a duration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    /// The text is not a non-negative number with an optional unit.
    #[error("invalid duration '{text}': {reason}")]
    Invalid {
        /// The offending input.
        text: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl DurationError {
    pub(crate) fn invalid(text: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            text: text.into(),
            reason: reason.into(),
        }
    }
}

/// Errors produced by queue registration and enqueueing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Another live queue is already registered under this name.
    #[error("a queue named '{0}' is already registered")]
    DuplicateQueueName(String),

    /// The entry still belongs to a different queue.
    #[error("entry '{command}' belongs to queue '{owner}' and cannot join '{target}'")]
    ForeignEntry {
        /// Command name of the rejected entry.
        command: String,
        /// Queue currently owning the entry.
        owner: String,
        /// Queue the entry was offered to.
        target: String,
    },
}

/// Errors produced when reading the parsed objects of a script entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    /// The parse phase never stored this key.
    #[error("missing argument '{0}'")]
    MissingArgument(String),

    /// The key exists but holds a different kind of value.
    #[error("argument '{name}' is not a {expected}")]
    WrongArgumentType {
        /// Argument key.
        name: String,
        /// Kind the caller asked for.
        expected: &'static str,
    },
}

/// Validation errors for a queue control directive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectiveError {
    /// No action token was given.
    #[error("must specify an action. Valid: CLEAR, SET, DELAY, PAUSE, RESUME")]
    MissingAction,

    /// DELAY was requested without a duration.
    #[error("must specify a delay")]
    MissingDuration,

    /// The DELAY value could not be parsed.
    #[error(transparent)]
    InvalidDuration(#[from] DurationError),
}

/// Errors raised while running a single script step.
///
/// None of these stop the owning queue; the engine reports them and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// No command is registered under this name.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error(transparent)]
    Directive(#[from] DirectiveError),

    #[error(transparent)]
    Argument(#[from] ArgumentError),

    #[error(transparent)]
    Duration(#[from] DurationError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Errors loading an engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors loading a script file.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Failed to read the script file.
    #[error("failed to read script: {0}")]
    Read(#[from] std::io::Error),

    /// Failed to parse the YAML document.
    #[error("failed to parse script: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A script line could not be split into tokens.
    #[error("queue '{queue}' line {line}: {reason}")]
    Line {
        /// Queue the line belongs to.
        queue: String,
        /// 1-based line index within the queue script.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// Registering one of the script's queues failed.
    #[error(transparent)]
    Queue(#[from] QueueError),
}
