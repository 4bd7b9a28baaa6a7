//! Bounded execution of external commands (docker, ssh).
//!
//! Every command runs with a closed stdin, captured output, and a hard
//! deadline. A command that outlives its deadline is killed.

use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code (None if killed by a signal)
    pub code: Option<i32>,
    /// Trimmed stdout
    pub stdout: String,
    /// Trimmed stderr
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Best human-readable failure description
    pub fn failure_message(&self) -> String {
        if !self.stderr.is_empty() {
            self.stderr.clone()
        } else if !self.stdout.is_empty() {
            self.stdout.clone()
        } else {
            match self.code {
                Some(code) => format!("exited with status {}", code),
                None => "terminated by signal".to_string(),
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to run {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },
}

/// Run `program` with `args`, waiting at most `timeout`
pub async fn run(program: &str, args: &[String], timeout: Duration) -> Result<CommandOutput, ExecError> {
    tracing::debug!(program = %program, argc = args.len(), "Executing command");

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ExecError::Io {
            program: program.to_string(),
            source,
        })?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }),
        Ok(Err(source)) => Err(ExecError::Io {
            program: program.to_string(),
            source,
        }),
        Err(_) => Err(ExecError::TimedOut {
            program: program.to_string(),
            timeout,
        }),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_captures_trimmed_stdout() {
        let output = assert_ok!(
            run("sh", &args(&["-c", "echo '  SWMTKN-1-abc  '"]), Duration::from_secs(5)).await
        );

        assert!(output.success());
        assert_eq!(output.stdout, "SWMTKN-1-abc");
    }

    #[tokio::test]
    async fn test_failure_message_prefers_stderr() {
        let output = assert_ok!(
            run("sh", &args(&["-c", "echo boom >&2; exit 3"]), Duration::from_secs(5)).await
        );

        assert!(!output.success());
        assert_eq!(output.code, Some(3));
        assert_eq!(output.failure_message(), "boom");
    }

    #[tokio::test]
    async fn test_missing_program_is_io_error() {
        let err = assert_err!(run("muster-no-such-binary", &[], Duration::from_secs(5)).await);
        assert!(matches!(err, ExecError::Io { .. }));
    }

    #[tokio::test]
    async fn test_deadline_kills_command() {
        let err = assert_err!(run("sh", &args(&["-c", "sleep 5"]), Duration::from_millis(100)).await);
        assert!(matches!(err, ExecError::TimedOut { .. }));
    }
}
