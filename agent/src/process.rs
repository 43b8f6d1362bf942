use std::fs::OpenOptions;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::util::Error;

/// Result of an external command invocation.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub exit_code: Option<i32>,
    pub stdout: String,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs `argv[0]` with the remaining entries as arguments, merging stdout and
/// stderr and appending the combined stream to `log_sink`. Never errors on a
/// nonzero exit — the caller classifies the result. `argv` must be non-empty.
pub async fn run(argv: &[&str], log_sink: &Path) -> Result<RunResult, Error> {
    run_with_env(argv, &[], log_sink).await
}

/// Like [`run`], additionally applying `envs` on top of the inherited
/// environment (used by the snapshot step to pin `ETCDCTL_API=3`).
///
/// Both the child's stdout and stderr are handed file descriptors that are
/// clones of the very same open `log_sink` handle, so the two streams land
/// on disk in the order the child actually wrote them — not batched
/// separately and reordered, which would misrepresent interleaved
/// progress/error output in the step log.
pub async fn run_with_env(argv: &[&str], envs: &[(&str, &str)], log_sink: &Path) -> Result<RunResult, Error> {
    let (program, args) = argv.split_first().expect("argv must be non-empty");

    tracing::debug!(command = %argv.join(" "), log = %log_sink.display(), "running command");

    let log_file = OpenOptions::new().create(true).append(true).open(log_sink)?;
    let offset_before = log_file.metadata()?.len();
    let stdout_sink = log_file.try_clone()?;
    let stderr_sink = log_file.try_clone()?;

    let status = Command::new(program)
        .args(args)
        .envs(envs.iter().copied())
        .stdout(Stdio::from(stdout_sink))
        .stderr(Stdio::from(stderr_sink))
        .status()
        .await?;

    let written = tokio::fs::read(log_sink).await?;
    let captured = written.get(offset_before as usize..).unwrap_or_default();

    Ok(RunResult {
        exit_code: status.code(),
        stdout: String::from_utf8_lossy(captured).trim().to_string(),
    })
}

/// Like [`run`], but turns a nonzero exit into a `SubprocessFailed` error once
/// the log has been flushed, naming `step` for diagnosis.
pub async fn must_run(step: &str, argv: &[&str], log_sink: &Path) -> Result<RunResult, Error> {
    must_run_with_env(step, argv, &[], log_sink).await
}

/// [`must_run`] with additional environment variables, see [`run_with_env`].
pub async fn must_run_with_env(
    step: &str,
    argv: &[&str],
    envs: &[(&str, &str)],
    log_sink: &Path,
) -> Result<RunResult, Error> {
    let result = run_with_env(argv, envs, log_sink).await?;
    if !result.success() {
        return Err(Error::SubprocessFailed {
            step: step.to_string(),
            command: argv.join(" "),
            exit_code: result.exit_code,
        });
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_captures_exit_code_and_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("step.log");
        let result = run(&["sh", "-c", "echo hello; echo world >&2"], &log)
            .await
            .unwrap();
        assert!(result.success());
        let contents = tokio::fs::read_to_string(&log).await.unwrap();
        assert!(contents.contains("hello"));
        assert!(contents.contains("world"));
    }

    #[tokio::test]
    async fn stdout_and_stderr_interleave_in_write_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("step.log");
        run(&["sh", "-c", "echo one; echo two >&2; echo three"], &log)
            .await
            .unwrap();
        let contents = tokio::fs::read_to_string(&log).await.unwrap();
        let one = contents.find("one").unwrap();
        let two = contents.find("two").unwrap();
        let three = contents.find("three").unwrap();
        assert!(one < two && two < three, "expected chronological order, got: {contents:?}");
    }

    #[tokio::test]
    async fn must_run_fails_on_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("step.log");
        let err = must_run("fake-step", &["sh", "-c", "exit 3"], &log)
            .await
            .unwrap_err();
        match err {
            Error::SubprocessFailed {
                step, exit_code, ..
            } => {
                assert_eq!(step, "fake-step");
                assert_eq!(exit_code, Some(3));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
