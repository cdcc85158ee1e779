//! In-memory executor that answers from a script instead of spawning
//! processes. Backs `--dry-run` and the test suites.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use crate::exec::command::{CommandError, CommandOptions, CommandResult, OutputLine, OutputStream};
use crate::exec::executor::{CommandExecutor, LineSink};

/// Canned answer for a matching command
#[derive(Debug, Clone)]
pub enum Reply {
    Success { stdout: String },
    Failure { exit_code: i32, stderr: String },
}

impl Reply {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Reply::Success { stdout: stdout.into() }
    }

    pub fn fail(exit_code: i32, stderr: impl Into<String>) -> Self {
        Reply::Failure {
            exit_code,
            stderr: stderr.into(),
        }
    }
}

/// One observed invocation
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub command: String,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,

    /// Files named in the command that existed while it ran, with contents
    pub files: Vec<(PathBuf, String)>,
}

struct Rule {
    pattern: String,
    replies: VecDeque<Reply>,
}

/// Executor answering from substring rules.
///
/// The most recently added rule whose pattern occurs in the command wins.
/// A rule with several replies hands them out in order and then repeats
/// the last one. Unmatched commands succeed with empty output.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<RecordedCall>>,
    echo: bool,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log every command at info level as it is "run"
    pub fn echoing() -> Self {
        Self {
            echo: true,
            ..Self::default()
        }
    }

    pub fn on(&self, pattern: &str, reply: Reply) {
        self.on_sequence(pattern, vec![reply]);
    }

    pub fn on_sequence(&self, pattern: &str, replies: Vec<Reply>) {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                pattern: pattern.to_string(),
                replies: replies.into(),
            });
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.to_vec()).unwrap_or_default()
    }

    /// Number of invocations containing `pattern`
    pub fn count(&self, pattern: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.command.contains(pattern))
            .count()
    }

    fn next_reply(&self, command: &str) -> Reply {
        let Ok(mut rules) = self.rules.lock() else {
            return Reply::ok("");
        };
        match rules.iter_mut().rev().find(|r| command.contains(&r.pattern)) {
            Some(rule) if rule.replies.len() > 1 => rule.replies.pop_front().unwrap_or(Reply::ok("")),
            Some(rule) => rule.replies.front().cloned().unwrap_or(Reply::ok("")),
            None => Reply::ok(""),
        }
    }

    async fn record(&self, command: &str, options: &CommandOptions) {
        let mut files = Vec::new();
        for token in command.split_whitespace() {
            let token = token.trim_matches('\'');
            let path = Path::new(token);
            if path.is_absolute() {
                if let Ok(contents) = tokio::fs::read_to_string(path).await {
                    files.push((path.to_path_buf(), contents));
                }
            }
        }

        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                command: command.to_string(),
                cwd: options.cwd.clone(),
                env: options.env.clone(),
                files,
            });
        }
    }

    async fn answer(
        &self,
        command: &str,
        options: &CommandOptions,
        on_line: Option<&LineSink<'_>>,
    ) -> Result<CommandResult, CommandError> {
        if self.echo {
            info!("[dry-run] {}", command);
        }
        self.record(command, options).await;

        match self.next_reply(command) {
            Reply::Success { stdout } => {
                if let Some(sink) = on_line {
                    for line in stdout.lines() {
                        sink(&OutputLine {
                            stream: OutputStream::Stdout,
                            text: line.to_string(),
                        });
                    }
                }
                Ok(CommandResult::succeeded(stdout, String::new(), options.silent_output, 1))
            }
            Reply::Failure { exit_code, stderr } => {
                if let Some(sink) = on_line {
                    for line in stderr.lines() {
                        sink(&OutputLine {
                            stream: OutputStream::Stderr,
                            text: line.to_string(),
                        });
                    }
                }
                let err = CommandError::exited(command, Some(exit_code), String::new(), stderr, 1);
                if options.throw_on_error {
                    Err(err)
                } else {
                    Ok(CommandResult::failed(err))
                }
            }
        }
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(&self, command: &str, options: &CommandOptions) -> Result<CommandResult, CommandError> {
        self.answer(command, options, None).await
    }

    async fn execute_interactive(
        &self,
        command: &str,
        options: &CommandOptions,
        on_line: &LineSink<'_>,
    ) -> Result<CommandResult, CommandError> {
        self.answer(command, options, Some(on_line)).await
    }
}
