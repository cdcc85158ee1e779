//! Shell-backed command executor

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use sysinfo::{Pid, ProcessesToUpdate, Signal, System};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::exec::command::{
    CommandError, CommandOptions, CommandResult, OutputLine, OutputStream,
};
use crate::exec::executor::{CommandExecutor, LineSink};
use crate::exec::retry::retry_with_backoff;

/// How long to keep reading output once the process has exited
const OUTPUT_DRAIN: Duration = Duration::from_millis(500);

/// Runs commands through `sh -c`
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,

    /// Time between the terminate signal and the hard kill
    grace_period: Duration,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            grace_period: Duration::from_secs(5),
        }
    }
}

impl ShellExecutor {
    pub fn new(shell: impl Into<String>, grace_period: Duration) -> Self {
        Self {
            shell: shell.into(),
            grace_period,
        }
    }

    async fn run_with_retries(
        &self,
        command: &str,
        options: &CommandOptions,
        on_line: Option<&LineSink<'_>>,
    ) -> Result<CommandResult, CommandError> {
        let outcome = retry_with_backoff(
            options.max_retries,
            options.base_retry_delay,
            move |attempt| self.run_once(command, options, on_line, attempt),
            tokio::time::sleep,
        )
        .await;

        match outcome {
            Ok(result) => Ok(result),
            Err(err) if options.throw_on_error => Err(err),
            Err(err) => Ok(CommandResult::failed(err)),
        }
    }

    async fn run_once(
        &self,
        command: &str,
        options: &CommandOptions,
        on_line: Option<&LineSink<'_>>,
        attempt: u32,
    ) -> Result<CommandResult, CommandError> {
        debug!("Running (attempt {}): {}", attempt, command);

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .envs(&options.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &options.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| CommandError::spawn_failed(command, &e, attempt))?;

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                let err = std::io::Error::other("child output pipes unavailable");
                return Err(CommandError::spawn_failed(command, &err, attempt));
            }
        };

        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();
        let mut stdout_buf = String::new();
        let mut stderr_buf = String::new();
        let mut stdout_open = true;
        let mut stderr_open = true;

        let deadline = tokio::time::sleep(options.timeout);
        tokio::pin!(deadline);
        let drain = tokio::time::sleep(OUTPUT_DRAIN);
        tokio::pin!(drain);
        let mut exited: Option<ExitStatus> = None;

        // A background descendant may keep the pipes open after the shell exits
        let status = loop {
            if let (Some(status), false, false) = (exited, stdout_open, stderr_open) {
                break status;
            }
            tokio::select! {
                line = stdout_lines.next_line(), if stdout_open => match line {
                    Ok(Some(text)) => {
                        emit(OutputStream::Stdout, text, &mut stdout_buf, options.silent_output, on_line);
                    }
                    _ => stdout_open = false,
                },
                line = stderr_lines.next_line(), if stderr_open => match line {
                    Ok(Some(text)) => {
                        emit(OutputStream::Stderr, text, &mut stderr_buf, options.silent_output, on_line);
                    }
                    _ => stderr_open = false,
                },
                status = child.wait(), if exited.is_none() => {
                    exited = Some(status.map_err(|e| CommandError::spawn_failed(command, &e, attempt))?);
                    drain.as_mut().reset(tokio::time::Instant::now() + OUTPUT_DRAIN);
                }
                _ = &mut drain, if exited.is_some() => {
                    debug!("Output still held open after exit, not waiting for it: {}", command);
                    stdout_open = false;
                    stderr_open = false;
                }
                _ = &mut deadline, if exited.is_none() => {
                    warn!("Command timed out after {:?}: {}", options.timeout, command);
                    self.terminate(&mut child).await;
                    return Err(CommandError::timed_out(command, options.timeout, stdout_buf, stderr_buf, attempt));
                }
            }
        };

        if status.success() {
            Ok(CommandResult::succeeded(stdout_buf, stderr_buf, options.silent_output, attempt))
        } else {
            Err(CommandError::exited(command, status.code(), stdout_buf, stderr_buf, attempt))
        }
    }

    /// Ask the child and its descendants to exit, then kill whatever outlives the grace period
    async fn terminate(&self, child: &mut Child) {
        let tree = child.id().map(process_tree).unwrap_or_default();
        let signalled = signal_all(&tree, Signal::Term);
        debug!("Sent terminate signal to {} of {} processes", signalled, tree.len());

        match tokio::time::timeout(self.grace_period, child.wait()).await {
            Ok(_) => debug!("Process exited after terminate signal"),
            Err(_) => {
                warn!("Process ignored terminate signal, killing it");
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill process: {}", e);
                }
            }
        }

        // Descendants re-parented away from the shell are still in the snapshot
        let killed = signal_all(&tree, Signal::Kill);
        if killed > 0 {
            warn!("Killed {} leftover processes", killed);
        }
    }
}

fn emit(
    stream: OutputStream,
    text: String,
    buf: &mut String,
    silent: bool,
    on_line: Option<&LineSink<'_>>,
) {
    if !silent {
        debug!(target: "dualdeploy::exec::output", "{}", text);
    }
    if let Some(sink) = on_line {
        sink(&OutputLine {
            stream,
            text: text.clone(),
        });
    }
    buf.push_str(&text);
    buf.push('\n');
}

/// `root` followed by every process descended from it
fn process_tree(root: u32) -> Vec<Pid> {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let mut tree = vec![Pid::from_u32(root)];
    let mut next = 0;
    while next < tree.len() {
        let parent = tree[next];
        tree.extend(
            system
                .processes()
                .iter()
                .filter(|(_, process)| process.parent() == Some(parent))
                .map(|(pid, _)| *pid),
        );
        next += 1;
    }
    tree
}

fn signal_all(pids: &[Pid], signal: Signal) -> usize {
    if pids.is_empty() {
        return 0;
    }
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(pids), true);
    pids.iter()
        .filter_map(|pid| system.process(*pid))
        .filter(|process| process.kill_with(signal).unwrap_or(false))
        .count()
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(&self, command: &str, options: &CommandOptions) -> Result<CommandResult, CommandError> {
        self.run_with_retries(command, options, None).await
    }

    async fn execute_interactive(
        &self,
        command: &str,
        options: &CommandOptions,
        on_line: &LineSink<'_>,
    ) -> Result<CommandResult, CommandError> {
        self.run_with_retries(command, options, Some(on_line)).await
    }
}
