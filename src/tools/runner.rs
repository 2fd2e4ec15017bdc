//! Child-process execution for downloader tools

use crate::error::MultidlError;
use crate::tools::Tool;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Number of trailing output lines kept for error reporting
const TAIL_LINES: usize = 20;

/// Callback receiving each output line as it is produced
pub type LineSink = Arc<dyn Fn(&str) + Send + Sync>;

/// A fully resolved tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub tool: Tool,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Inherit the terminal so the tool can prompt the user
    pub interactive: bool,
    pub timeout: Duration,
}

impl ToolInvocation {
    pub fn new(tool: Tool, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            tool,
            program: program.into(),
            args,
            interactive: false,
            timeout: Duration::from_secs(30 * 60),
        }
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Exit status and the tail of a tool's output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout_tail: Vec<String>,
    pub stderr_tail: Vec<String>,
}

impl ToolOutput {
    /// Best description of why the tool failed
    pub fn failure_message(&self) -> String {
        let error_lines: Vec<&String> = self
            .stderr_tail
            .iter()
            .filter(|line| line.contains("ERROR") || line.contains("rror:"))
            .collect();

        let lines: Vec<&String> = if !error_lines.is_empty() {
            error_lines
        } else if !self.stderr_tail.is_empty() {
            self.stderr_tail.iter().rev().take(3).rev().collect()
        } else {
            self.stdout_tail.iter().rev().take(3).rev().collect()
        };

        if lines.is_empty() {
            match self.exit_code {
                Some(code) => format!("exited with status {}", code),
                None => "terminated by signal".to_string(),
            }
        } else {
            lines
                .iter()
                .map(|line| line.trim())
                .collect::<Vec<_>>()
                .join("; ")
        }
    }
}

/// Runs tool invocations; swapped out in tests
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(
        &self,
        invocation: ToolInvocation,
        on_line: LineSink,
    ) -> Result<ToolOutput, MultidlError>;
}

/// Runs tools as real child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

fn spawn_line_reader<R>(pipe: R, on_line: LineSink) -> JoinHandle<Vec<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut tail = VecDeque::with_capacity(TAIL_LINES);
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("Tool output read failed: {}", e);
                    break;
                }
            }

            let line = String::from_utf8_lossy(&buf)
                .trim_end_matches(['\n', '\r'])
                .to_string();
            on_line(&line);
            if tail.len() == TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        tail.into_iter().collect()
    })
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(
        &self,
        invocation: ToolInvocation,
        on_line: LineSink,
    ) -> Result<ToolOutput, MultidlError> {
        // Interactive calls may carry credentials
        if invocation.interactive {
            debug!("Running {} (interactive)", invocation.program.display());
        } else {
            debug!(
                "Running {} {}",
                invocation.program.display(),
                invocation.args.join(" ")
            );
        }

        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args).kill_on_drop(true);
        if invocation.interactive {
            command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        } else {
            command
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
        }

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MultidlError::ToolNotFound(invocation.tool.to_string())
            } else {
                MultidlError::Io(e)
            }
        })?;

        let stdout_task = child
            .stdout
            .take()
            .map(|pipe| spawn_line_reader(pipe, on_line.clone()));
        let stderr_task = child
            .stderr
            .take()
            .map(|pipe| spawn_line_reader(pipe, on_line.clone()));

        let status = match tokio::time::timeout(invocation.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                error!(
                    "{} timed out after {}s, killing",
                    invocation.tool,
                    invocation.timeout.as_secs()
                );
                let _ = child.kill().await;
                if let Some(task) = stdout_task {
                    task.abort();
                }
                if let Some(task) = stderr_task {
                    task.abort();
                }
                return Err(MultidlError::Timeout(format!(
                    "{} did not finish within {}",
                    invocation.tool,
                    humantime::format_duration(invocation.timeout)
                )));
            }
        };

        let stdout_tail = match stdout_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };
        let stderr_tail = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };

        Ok(ToolOutput {
            success: status.success(),
            exit_code: status.code(),
            stdout_tail,
            stderr_tail,
        })
    }
}
