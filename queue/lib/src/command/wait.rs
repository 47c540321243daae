//! `WAIT [duration]` - holds the running queue for a while.

use crate::command::{Command, ExecutionContext};
use crate::duration::{Duration, parse_duration};
use crate::entry::{ArgValue, ParsedArgs, ScriptEntry};
use crate::error::CommandError;

/// Wait used when no duration is given.
const DEFAULT_WAIT_SECONDS: f64 = 3.0;

/// Delays the queue running the command.
///
/// Instant queues have no clock, so WAIT does nothing there.
#[derive(Debug, Clone, Copy, Default)]
pub struct WaitCommand;

impl Command for WaitCommand {
    fn name(&self) -> &'static str {
        "WAIT"
    }

    fn parse_args(
        &self,
        arguments: &[String],
        _ctx: &ExecutionContext<'_>,
    ) -> Result<ParsedArgs, CommandError> {
        let delay = match arguments.first() {
            Some(text) => parse_duration(text)?,
            None => Duration::from_secs_f64(DEFAULT_WAIT_SECONDS)?,
        };
        Ok(ParsedArgs::new().with("delay", ArgValue::Duration(delay)))
    }

    fn execute(&self, entry: &ScriptEntry, _ctx: &ExecutionContext<'_>) -> Result<(), CommandError> {
        let delay = entry.get_duration("delay")?;
        if let Some(queue) = entry.residing_queue()
            && let Some(timed) = queue.as_timed()
        {
            timed.delay_for(delay);
        }
        Ok(())
    }
}
