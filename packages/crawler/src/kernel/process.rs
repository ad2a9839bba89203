//! External converter processes (soffice, pdftoppm, tesseract, hwp5html).

use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Run `command` to completion and return its stdout.
///
/// The child is killed if `timeout` elapses or the returned future is dropped.
pub async fn run_command(mut command: Command, timeout: Duration) -> Result<String, ProcessError> {
    let program = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();

    command.kill_on_drop(true);
    debug!(program = %program, "spawning converter process");

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(result) => result.map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?,
        Err(_) => return Err(ProcessError::Timeout { program, timeout }),
    };

    if !output.status.success() {
        return Err(ProcessError::Failed {
            program,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "printf hello"]);
        let out = run_command(cmd, Duration::from_secs(5)).await.unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn non_zero_exit_is_failure() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo nope >&2; exit 3"]);
        let err = run_command(cmd, Duration::from_secs(5)).await.unwrap_err();
        match err {
            ProcessError::Failed { stderr, .. } => assert_eq!(stderr, "nope"),
            other => panic!("unexpected: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_error() {
        let cmd = Command::new("definitely-not-a-real-binary-7f3a");
        let err = run_command(cmd, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[tokio::test]
    async fn slow_process_times_out() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 5"]);
        let err = run_command(cmd, Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, ProcessError::Timeout { .. }));
    }
}
