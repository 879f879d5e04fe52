// External process helpers
//
// Bounded one-shot commands (`run_with_timeout`) and long-running children
// that are polled and can be stopped gracefully (`ChildProcess`).

use async_trait::async_trait;
use log::{debug, info, warn};
use std::ffi::OsStr;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::gateway::{GatewayError, ProcessExit, TranscriptionProcess};

/// How long to wait for the stderr reader after the child exits
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

fn render_command<S: AsRef<OsStr>>(program: &str, args: &[S]) -> String {
    let mut rendered = program.to_string();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(&arg.as_ref().to_string_lossy());
    }
    rendered
}

/// Run a command to completion, killing it if it exceeds `timeout`
///
/// A non-zero exit status is turned into `GatewayError::ProcessFailed` with the
/// captured stderr.
pub async fn run_with_timeout<S: AsRef<OsStr>>(
    operation: &str,
    program: &str,
    args: &[S],
    timeout: Duration,
) -> Result<Output, GatewayError> {
    debug!("Running {}: {}", operation, render_command(program, args));

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Dropping the output future on timeout drops the child, which kills it.
    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(result) => result?,
        Err(_) => {
            warn!("{} exceeded its {}s budget, killed", operation, timeout.as_secs());
            return Err(GatewayError::Timeout {
                operation: operation.to_string(),
                timeout,
            });
        }
    };

    if !output.status.success() {
        return Err(GatewayError::ProcessFailed {
            operation: operation.to_string(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output)
}

/// A spawned child process supervised by polling
pub struct ChildProcess {
    operation: String,
    child: Child,
    stderr_reader: Option<JoinHandle<String>>,
    exit: Option<ProcessExit>,
}

impl ChildProcess {
    /// Spawn `program` with stdout discarded and stderr captured in the background
    pub fn spawn<S: AsRef<OsStr>>(
        operation: &str,
        program: &str,
        args: &[S],
    ) -> Result<Self, GatewayError> {
        info!("Starting {}: {}", operation, render_command(program, args));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Drain stderr continuously so a chatty child never blocks on a full pipe.
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                String::from_utf8_lossy(&buf).trim().to_string()
            })
        });

        Ok(Self {
            operation: operation.to_string(),
            child,
            stderr_reader,
            exit: None,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn collect_stderr(&mut self) -> String {
        match self.stderr_reader.take() {
            Some(reader) => match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, reader).await {
                Ok(Ok(text)) => text,
                _ => String::new(),
            },
            None => String::new(),
        }
    }

    fn send_terminate_signal(&mut self) -> Result<(), GatewayError> {
        #[cfg(unix)]
        {
            if let Some(pid) = self.child.id() {
                let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
                if result == 0 {
                    return Ok(());
                }
                debug!(
                    "SIGTERM to {} (pid {}) failed: {}",
                    self.operation,
                    pid,
                    std::io::Error::last_os_error()
                );
            }
        }
        self.child.start_kill()?;
        Ok(())
    }
}

#[async_trait]
impl TranscriptionProcess for ChildProcess {
    async fn poll(&mut self) -> Result<Option<ProcessExit>, GatewayError> {
        if let Some(exit) = &self.exit {
            return Ok(Some(exit.clone()));
        }
        match self.child.try_wait()? {
            Some(status) => {
                let stderr = self.collect_stderr().await;
                let exit = ProcessExit {
                    success: status.success(),
                    code: status.code(),
                    stderr,
                };
                debug!("{} exited: {:?}", self.operation, exit.code);
                self.exit = Some(exit.clone());
                Ok(Some(exit))
            }
            None => Ok(None),
        }
    }

    async fn terminate(&mut self, grace: Duration) -> Result<(), GatewayError> {
        if self.exit.is_some() || self.child.try_wait()?.is_some() {
            return Ok(());
        }

        info!("Stopping {}", self.operation);
        self.send_terminate_signal()?;

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                debug!("{} stopped: {:?}", self.operation, status?);
            }
            Err(_) => {
                warn!(
                    "{} still running after {}s grace period, killing",
                    self.operation,
                    grace.as_secs()
                );
                self.child.kill().await?;
            }
        }

        let stderr = self.collect_stderr().await;
        self.exit = Some(ProcessExit {
            success: false,
            code: None,
            stderr,
        });
        Ok(())
    }
}
