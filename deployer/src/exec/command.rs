//! Command options, results and failure classification

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Substrings marking a transient network failure
const NETWORK_SIGNATURES: &[&str] = &[
    "econnreset",
    "etimedout",
    "econnrefused",
    "enotfound",
    "eai_again",
    "socket hang up",
    "connection reset",
    "connection refused",
    "network is unreachable",
    "could not resolve host",
    "temporary failure in name resolution",
    "operation timed out",
    "connection timed out",
    "request timed out",
    "read timed out",
    "i/o timeout",
    "handshake timeout",
    "deadline exceeded",
];

const ALREADY_EXISTS_SIGNATURES: &[&str] = &[
    "already exists",
    "already_exists",
    "alreadyexists",
    "already in use",
    "already own it",
];

const NOT_FOUND_SIGNATURES: &[&str] = &[
    "not found",
    "not_found",
    "notfound",
    "does not exist",
    "no such",
];

/// Shell exit codes for "not executable" and "command not found"
const MISSING_BINARY_EXIT_CODES: &[i32] = &[126, 127];

/// Closed set of failure categories, decided once when output is parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transient transport failure; safe to retry
    Network,
    /// The resource being created is already there
    AlreadyExists,
    /// The resource being read does not exist (yet)
    NotFound,
    /// Anything else: bad arguments, missing binary, business-logic exit
    Terminal,
}

impl FailureKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::Network)
    }
}

/// Classify a failed invocation from its exit code and output text
pub fn classify(exit_code: Option<i32>, text: &str) -> FailureKind {
    if let Some(code) = exit_code {
        if MISSING_BINARY_EXIT_CODES.contains(&code) {
            return FailureKind::Terminal;
        }
    }

    let text = text.to_lowercase();
    let matches_any = |signatures: &[&str]| signatures.iter().any(|s| text.contains(s));

    if matches_any(NETWORK_SIGNATURES) {
        FailureKind::Network
    } else if matches_any(ALREADY_EXISTS_SIGNATURES) {
        FailureKind::AlreadyExists
    } else if matches_any(NOT_FOUND_SIGNATURES) {
        FailureKind::NotFound
    } else {
        FailureKind::Terminal
    }
}

/// Per-invocation options
#[derive(Debug, Clone)]
pub struct CommandOptions {
    /// Working directory, inherited when absent
    pub cwd: Option<PathBuf>,

    /// Hard limit for a single attempt
    pub timeout: Duration,

    /// Extra environment variables
    pub env: BTreeMap<String, String>,

    /// Keep output out of the tool log and return stdout alone as `output`
    pub silent_output: bool,

    /// Return failures as `Err` instead of a `success: false` result
    pub throw_on_error: bool,

    /// Retries after the first attempt, for retryable failures only
    pub max_retries: u32,

    /// Delay before the first retry; doubles on each subsequent one
    pub base_retry_delay: Duration,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            cwd: None,
            timeout: Duration::from_secs(60),
            env: BTreeMap::new(),
            silent_output: false,
            throw_on_error: true,
            max_retries: 3,
            base_retry_delay: Duration::from_secs(1),
        }
    }
}

impl CommandOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_retries(mut self, max_retries: u32, base_retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_retry_delay = base_retry_delay;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent_output = true;
        self
    }

    pub fn no_throw(mut self) -> Self {
        self.throw_on_error = false;
        self
    }
}

/// Which stream a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// A single line of process output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

/// Outcome of one executor invocation
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub success: bool,

    /// Combined output, or stdout alone for silent invocations
    pub output: String,

    pub stdout: String,

    pub stderr: String,

    /// 1-based attempt that produced this result
    pub attempt: u32,

    /// Set when `success` is false
    pub error: Option<CommandError>,
}

impl CommandResult {
    /// Build a successful result from captured streams
    pub fn succeeded(stdout: String, stderr: String, silent: bool, attempt: u32) -> Self {
        let output = if silent || stderr.is_empty() {
            stdout.clone()
        } else if stdout.is_empty() {
            stderr.clone()
        } else {
            format!("{stdout}\n{stderr}")
        };

        Self {
            success: true,
            output,
            stdout,
            stderr,
            attempt,
            error: None,
        }
    }

    /// Wrap a failure for callers that asked not to receive errors
    pub fn failed(error: CommandError) -> Self {
        Self {
            success: false,
            output: error.stdout.clone(),
            stdout: error.stdout.clone(),
            stderr: error.stderr.clone(),
            attempt: error.attempt,
            error: Some(error),
        }
    }

    /// Stdout split into trimmed, non-empty lines
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines().map(str::trim).filter(|l| !l.is_empty())
    }
}

/// A failed invocation with its raw output preserved
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct CommandError {
    pub kind: FailureKind,

    pub command: String,

    pub message: String,

    pub exit_code: Option<i32>,

    pub stdout: String,

    pub stderr: String,

    pub attempt: u32,
}

impl CommandError {
    /// The process ran and exited non-zero
    pub fn exited(command: &str, exit_code: Option<i32>, stdout: String, stderr: String, attempt: u32) -> Self {
        let combined = format!("{stderr}\n{stdout}");
        let kind = classify(exit_code, &combined);
        let summary = last_meaningful_line(&stderr)
            .or_else(|| last_meaningful_line(&stdout))
            .unwrap_or("no output");
        let code = exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string());

        Self {
            kind,
            command: command.to_string(),
            message: format!("`{}` exited with {}: {}", program_name(command), code, summary),
            exit_code,
            stdout,
            stderr,
            attempt,
        }
    }

    /// The process could not be started at all
    pub fn spawn_failed(command: &str, err: &std::io::Error, attempt: u32) -> Self {
        let kind = if err.kind() == std::io::ErrorKind::NotFound {
            FailureKind::Terminal
        } else {
            classify(None, &err.to_string())
        };

        Self {
            kind,
            command: command.to_string(),
            message: format!("failed to start `{}`: {}", program_name(command), err),
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            attempt,
        }
    }

    /// The attempt hit its deadline and was terminated
    pub fn timed_out(command: &str, timeout: std::time::Duration, stdout: String, stderr: String, attempt: u32) -> Self {
        let message = format!(
            "`{}` timed out after {}s",
            program_name(command),
            timeout.as_secs_f64()
        );

        Self {
            kind: FailureKind::Network,
            command: command.to_string(),
            message,
            exit_code: None,
            stdout,
            stderr,
            attempt,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Raw output lines, stderr first
    pub fn output_lines(&self) -> impl Iterator<Item = &str> {
        self.stderr
            .lines()
            .chain(self.stdout.lines())
            .map(str::trim)
            .filter(|l| !l.is_empty())
    }
}

fn last_meaningful_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).rev().find(|l| !l.is_empty())
}

/// First word of a command, for messages
fn program_name(command: &str) -> &str {
    command.split_whitespace().next().unwrap_or(command)
}
