//! `ECHO <text...>` - reports a line of text.

use crate::command::{Command, ExecutionContext};
use crate::engine::EngineEvent;
use crate::entry::{ArgValue, ParsedArgs, ScriptEntry};
use crate::error::CommandError;

/// Joins its resolved arguments with spaces and emits them as an
/// [`EngineEvent::Echo`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoCommand;

impl Command for EchoCommand {
    fn name(&self) -> &'static str {
        "ECHO"
    }

    fn parse_args(
        &self,
        arguments: &[String],
        _ctx: &ExecutionContext<'_>,
    ) -> Result<ParsedArgs, CommandError> {
        Ok(ParsedArgs::new().with("message", ArgValue::Text(arguments.join(" "))))
    }

    fn execute(&self, entry: &ScriptEntry, ctx: &ExecutionContext<'_>) -> Result<(), CommandError> {
        let message = entry.get_text("message")?;
        let queue = ctx.queue().name();
        tracing::info!(queue, message, "ECHO");
        ctx.emit(EngineEvent::Echo {
            queue: queue.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }
}
