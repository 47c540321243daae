//! Resolution of `<...>` references inside script arguments.
//!
//! References are resolved right before the step that carries them runs, so
//! they always see the current state of the engine, even after a queue has
//! spent a long time waiting.

use dashmap::DashMap;

use crate::command::ExecutionContext;

/// Turns the text between `<` and `>` into a literal value.
///
/// Returning `None` leaves the reference untouched in the argument.
pub trait TagResolver: Send + Sync {
    fn resolve(&self, tag: &str, ctx: &ExecutionContext<'_>) -> Option<String>;
}

/// Replaces every reference in `raw` that `resolver` knows about.
///
/// References do not nest; an unresolved reference is copied through
/// verbatim, brackets included.
///
/// ## Examples
///
/// ```
/// use std::sync::Arc;
/// use script_queue::{substitute, ContextResolver, ExecutionContext, QueueDirectory, TimedQueue, Duration};
///
/// let directory = Arc::new(QueueDirectory::new());
/// let queue = TimedQueue::create(&directory, "main", Duration::ZERO).unwrap();
/// let ctx = ExecutionContext::new(&directory, queue);
///
/// let resolver = ContextResolver::new();
/// assert_eq!(substitute("in <queue.name>", &resolver, &ctx), "in main");
/// assert_eq!(substitute("<unknown>", &resolver, &ctx), "<unknown>");
/// ```
pub fn substitute(raw: &str, resolver: &dyn TagResolver, ctx: &ExecutionContext<'_>) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find('<') {
        let after = &rest[start + 1..];
        let Some(len) = after.find('>') else {
            break;
        };
        let tag = &after[..len];

        out.push_str(&rest[..start]);
        let resolved = if tag.is_empty() || tag.contains('<') {
            None
        } else {
            resolver.resolve(tag, ctx)
        };
        match resolved {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[start..start + len + 2]),
        }
        rest = &after[len + 1..];
    }

    out.push_str(rest);
    out
}

/// The default resolver.
///
/// Knows about the running queue and a set of user definitions:
///
/// - `<queue.name>` - name of the queue running the step
/// - `<queue.size>` - entries still waiting in that queue
/// - `<queue.state>` - `running`, `paused`, `waiting`, or `instant`
/// - `<def[key]>` - value registered with [`define`](Self::define)
#[derive(Debug, Default)]
pub struct ContextResolver {
    definitions: DashMap<String, String>,
}

impl ContextResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a definition readable as `<def[key]>`.
    pub fn define(&self, key: impl Into<String>, value: impl Into<String>) {
        self.definitions.insert(key.into(), value.into());
    }

    pub fn definition(&self, key: &str) -> Option<String> {
        self.definitions.get(key).map(|value| value.value().clone())
    }
}

impl TagResolver for ContextResolver {
    fn resolve(&self, tag: &str, ctx: &ExecutionContext<'_>) -> Option<String> {
        let queue = ctx.queue();
        match tag.trim().to_lowercase().as_str() {
            "queue.name" => Some(queue.name().to_string()),
            "queue.size" => Some(queue.len().to_string()),
            "queue.state" => Some(match queue.as_timed() {
                Some(timed) => format!("{:?}", timed.state()).to_lowercase(),
                None => "instant".to_string(),
            }),
            _ => {
                let tag = tag.trim();
                let body = tag.strip_suffix(']')?;
                let prefix = body.get(..4)?;
                prefix
                    .eq_ignore_ascii_case("def[")
                    .then(|| self.definition(&body[4..]))
                    .flatten()
            }
        }
    }
}
