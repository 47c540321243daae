//! Loading queues from YAML script files.
//!
//! A script file maps queue names to their definitions:
//!
//! ```yaml
//! main:
//!   type: timed
//!   speed: 1s
//!   script:
//!     - echo "starting up"
//!     - queue pause helper
//!     - wait 5s
//!     - queue resume helper
//!
//! helper:
//!   type: instant
//!   script:
//!     - echo "helper ran"
//! ```
//!
//! Each line becomes one [`ScriptEntry`]: the first token is the command and
//! the rest are its arguments. Blank lines and lines starting with `#` are
//! ignored.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::directory::QueueDirectory;
use crate::duration::Duration;
use crate::entry::ScriptEntry;
use crate::error::ScriptError;
use crate::queue::{InstantQueue, ScriptQueue};
use crate::timed::TimedQueue;

/// Which kind of queue a script creates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    #[default]
    Timed,
    Instant,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawQueue {
    #[serde(rename = "type", default)]
    kind: QueueKind,
    #[serde(default)]
    speed: Option<Duration>,
    #[serde(default)]
    script: Vec<String>,
}

/// One tokenized script line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptStep {
    pub command: String,
    pub arguments: Vec<String>,
}

/// A queue definition read from a script file.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueScript {
    pub name: String,
    pub kind: QueueKind,
    /// Per-step wait; `None` means the engine default.
    pub speed: Option<Duration>,
    pub steps: Vec<ScriptStep>,
}

/// A parsed script file, with queues in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptFile {
    queues: Vec<QueueScript>,
}

impl ScriptFile {
    /// Parses a script document.
    ///
    /// ## Errors
    ///
    /// Returns [`ScriptError::Parse`] if the YAML is malformed and
    /// [`ScriptError::Line`] if a line cannot be tokenized.
    pub fn from_yaml_str(text: &str) -> Result<Self, ScriptError> {
        let document: serde_yaml::Mapping = serde_yaml::from_str(text)?;
        let mut queues = Vec::with_capacity(document.len());

        for (key, value) in document {
            let name = match key {
                serde_yaml::Value::String(name) => name,
                other => serde_yaml::from_value::<String>(other)?,
            };
            let raw: RawQueue = serde_yaml::from_value(value)?;

            let mut steps = Vec::with_capacity(raw.script.len());
            for (index, line) in raw.script.iter().enumerate() {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    continue;
                }
                let mut tokens = tokenize(trimmed)
                    .map_err(|reason| ScriptError::Line {
                        queue: name.clone(),
                        line: index + 1,
                        reason: reason.to_string(),
                    })?
                    .into_iter();
                let Some(command) = tokens.next() else {
                    continue;
                };
                steps.push(ScriptStep {
                    command,
                    arguments: tokens.collect(),
                });
            }

            queues.push(QueueScript {
                name,
                kind: raw.kind,
                speed: raw.speed,
                steps,
            });
        }

        Ok(Self { queues })
    }

    /// Reads and parses a script file.
    ///
    /// ## Errors
    ///
    /// Returns [`ScriptError::Read`] if the file cannot be read, otherwise
    /// the same errors as [`from_yaml_str`](Self::from_yaml_str).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    pub fn queues(&self) -> &[QueueScript] {
        &self.queues
    }

    /// Creates and fills every queue in the file, in file order.
    ///
    /// ## Errors
    ///
    /// Returns [`ScriptError::Queue`] if a queue name is already taken.
    /// Queues created before the failure stay registered.
    pub fn spawn(
        &self,
        directory: &Arc<QueueDirectory>,
        default_speed: Duration,
    ) -> Result<Vec<Arc<dyn ScriptQueue>>, ScriptError> {
        let mut spawned = Vec::with_capacity(self.queues.len());

        for script in &self.queues {
            let queue: Arc<dyn ScriptQueue> = match script.kind {
                QueueKind::Timed => TimedQueue::create(
                    directory,
                    script.name.clone(),
                    script.speed.unwrap_or(default_speed),
                )?,
                QueueKind::Instant => InstantQueue::create(directory, script.name.clone())?,
            };
            for step in &script.steps {
                queue.enqueue(ScriptEntry::new(
                    step.command.clone(),
                    step.arguments.iter().cloned(),
                ))?;
            }
            tracing::info!(
                queue = %script.name,
                kind = ?script.kind,
                steps = script.steps.len(),
                "queue loaded"
            );
            spawned.push(queue);
        }

        Ok(spawned)
    }
}

/// Splits a script line on whitespace, keeping double-quoted runs together.
///
/// Quotes are removed from the result and may appear mid-token, so
/// `delay:"5s"` becomes `delay:5s`. A pair of quotes with nothing between
/// them yields an empty token.
///
/// ## Errors
///
/// Returns a description of the problem if a quote is left open.
///
/// ## Examples
///
/// ```
/// use script_queue::tokenize;
///
/// assert_eq!(
///     tokenize(r#"echo "hello world" now"#).unwrap(),
///     ["echo", "hello world", "now"]
/// );
/// assert!(tokenize(r#"echo "oops"#).is_err());
/// ```
pub fn tokenize(line: &str) -> Result<Vec<String>, &'static str> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                in_token = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if quoted {
        return Err("unterminated quote");
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timed::TimedControl;

    const SCRIPT: &str = r##"
main:
  type: timed
  speed: 1s
  script:
    - echo "hello world"
    - ""
    - "# a comment"
    - queue pause helper,other
helper:
  type: instant
  script:
    - echo helper
"##;

    #[test]
    fn tokenize_splits_on_whitespace() {
        assert_eq!(tokenize("  queue   pause  main ").unwrap(), ["queue", "pause", "main"]);
    }

    #[test]
    fn tokenize_handles_quotes() {
        assert_eq!(tokenize(r#"queue delay:"5s""#).unwrap(), ["queue", "delay:5s"]);
        assert_eq!(tokenize(r#"echo """#).unwrap(), ["echo", ""]);
        assert_eq!(tokenize("").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn tokenize_rejects_open_quote() {
        assert_eq!(tokenize(r#"echo "hi"#), Err("unterminated quote"));
    }

    #[test]
    fn parses_queues_in_file_order() {
        let file = ScriptFile::from_yaml_str(SCRIPT).unwrap();
        let queues = file.queues();

        assert_eq!(queues.len(), 2);
        assert_eq!(queues[0].name, "main");
        assert_eq!(queues[0].kind, QueueKind::Timed);
        assert_eq!(queues[0].speed.map(|speed| speed.seconds()), Some(1.0));
        assert_eq!(
            queues[0].steps,
            [
                ScriptStep {
                    command: "echo".to_string(),
                    arguments: vec!["hello world".to_string()],
                },
                ScriptStep {
                    command: "queue".to_string(),
                    arguments: vec!["pause".to_string(), "helper,other".to_string()],
                },
            ]
        );
        assert_eq!(queues[1].name, "helper");
        assert_eq!(queues[1].kind, QueueKind::Instant);
    }

    #[test]
    fn numeric_speed_is_seconds() {
        let file =
            ScriptFile::from_yaml_str("main:\n  speed: 2\n  script:\n    - echo hi\nfast:\n  speed: 0.25\n")
                .unwrap();
        assert_eq!(file.queues()[0].speed.map(|speed| speed.seconds()), Some(2.0));
        assert_eq!(file.queues()[1].speed.map(|speed| speed.seconds()), Some(0.25));
    }

    #[test]
    fn kind_defaults_to_timed() {
        let file = ScriptFile::from_yaml_str("main:\n  script:\n    - echo hi\n").unwrap();
        assert_eq!(file.queues()[0].kind, QueueKind::Timed);
        assert_eq!(file.queues()[0].speed, None);
    }

    #[test]
    fn bad_line_reports_queue_and_line() {
        let err = ScriptFile::from_yaml_str("main:\n  script:\n    - echo ok\n    - 'echo \"open'\n")
            .unwrap_err();
        assert!(matches!(
            err,
            ScriptError::Line { ref queue, line: 2, .. } if queue == "main"
        ));
    }

    #[test]
    fn rejects_unknown_fields_and_bad_speed() {
        assert!(matches!(
            ScriptFile::from_yaml_str("main:\n  colour: red\n"),
            Err(ScriptError::Parse(_))
        ));
        assert!(matches!(
            ScriptFile::from_yaml_str("main:\n  speed: fast\n"),
            Err(ScriptError::Parse(_))
        ));
    }

    #[test]
    fn spawn_registers_and_fills_queues() {
        let directory = Arc::new(QueueDirectory::new());
        let file = ScriptFile::from_yaml_str(SCRIPT).unwrap();
        let default_speed = Duration::from_secs_f64(3.0).unwrap();

        let queues = file.spawn(&directory, default_speed).unwrap();

        assert_eq!(queues.len(), 2);
        assert_eq!(directory.names(), ["helper", "main"]);
        let main = directory.lookup("main").unwrap();
        assert_eq!(main.len(), 2);
        assert_eq!(main.as_timed().map(|timed| timed.speed().seconds()), Some(1.0));
        assert!(directory.lookup("helper").unwrap().as_timed().is_none());
    }

    #[test]
    fn spawn_uses_default_speed() {
        let directory = Arc::new(QueueDirectory::new());
        let file = ScriptFile::from_yaml_str("main:\n  script:\n    - echo hi\n").unwrap();
        let default_speed = Duration::from_secs_f64(2.0).unwrap();

        file.spawn(&directory, default_speed).unwrap();

        let main = directory.lookup("main").unwrap();
        assert_eq!(main.as_timed().unwrap().speed(), default_speed);
    }

    #[test]
    fn spawn_fails_on_taken_name() {
        let directory = Arc::new(QueueDirectory::new());
        let _existing = InstantQueue::create(&directory, "main").unwrap();
        let file = ScriptFile::from_yaml_str("main:\n  script: []\n").unwrap();

        let err = file.spawn(&directory, Duration::ZERO).unwrap_err();
        assert!(matches!(err, ScriptError::Queue(_)));
    }
}
