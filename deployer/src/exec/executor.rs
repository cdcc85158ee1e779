//! Command executor capability

use async_trait::async_trait;

use crate::exec::command::{CommandError, CommandOptions, CommandResult, OutputLine};

/// Callback receiving output lines while a process runs
pub type LineSink<'a> = dyn Fn(&OutputLine) + Send + Sync + 'a;

/// Runs external commands on behalf of the reconciler
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run a command to completion, buffering its output
    async fn execute(&self, command: &str, options: &CommandOptions) -> Result<CommandResult, CommandError>;

    /// Run a command, forwarding each output line to `on_line` as it arrives
    async fn execute_interactive(
        &self,
        command: &str,
        options: &CommandOptions,
        on_line: &LineSink<'_>,
    ) -> Result<CommandResult, CommandError>;
}
