//! Dry-run validation of candidate scripts.
//!
//! A candidate runs as a subprocess with `--dry-run`, the full dataset
//! piped to stdin, and a wall-clock timeout that kills the child. Exit
//! status is the only signal of correctness; stdout is never inspected.

use std::fmt;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Why a candidate was rejected. Each kind carries its own diagnostic so
/// the repair loop can tell the model what actually happened.
#[derive(Debug)]
pub enum ValidationFailure {
    /// The script ran to completion but exited non-zero.
    NonZeroExit {
        code: Option<i32>,
        stderr: String,
    },
    /// The script exceeded the wall-clock budget and was killed.
    TimedOut,
    /// The script could not be launched at all.
    Spawn(String),
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationFailure::NonZeroExit { stderr, .. } => write!(f, "{}", stderr),
            ValidationFailure::TimedOut => write!(f, "Script execution timed out"),
            ValidationFailure::Spawn(err) => write!(f, "{}", err),
        }
    }
}

/// Execute `script --dry-run` with `input` on stdin.
///
/// Success is exit status 0 within `timeout`; anything else is reported
/// as a distinct [`ValidationFailure`] kind.
pub fn validate_script(
    script: &Path,
    input: &str,
    timeout: Duration,
) -> Result<(), ValidationFailure> {
    let mut child = Command::new(script)
        .arg("--dry-run")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ValidationFailure::Spawn(format!("Failed to start script: {}", e)))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| ValidationFailure::Spawn("Failed to open script stdin".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ValidationFailure::Spawn("Failed to capture stdout".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ValidationFailure::Spawn("Failed to capture stderr".to_string()))?;

    // Feed stdin from its own thread; a script that never reads would
    // otherwise deadlock the pipe before the timeout could fire.
    let input_bytes = input.as_bytes().to_vec();
    let stdin_handle = thread::spawn(move || {
        let mut stdin = stdin;
        let _ = stdin.write_all(&input_bytes);
    });
    let stdout_handle = thread::spawn(move || drain(stdout));
    let stderr_handle = thread::spawn(move || drain(stderr));

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = stdin_handle.join();
                    let _ = stdout_handle.join();
                    let _ = stderr_handle.join();
                    return Err(ValidationFailure::TimedOut);
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                let _ = child.kill();
                return Err(ValidationFailure::Spawn(format!(
                    "Failed to wait for script: {}",
                    e
                )));
            }
        }
    };

    let _ = stdin_handle.join();
    let _ = stdout_handle.join();
    let stderr_text = stderr_handle.join().unwrap_or_default();

    if status.success() {
        Ok(())
    } else {
        Err(ValidationFailure::NonZeroExit {
            code: status.code(),
            stderr: stderr_text,
        })
    }
}

fn drain<R: Read>(reader: R) -> String {
    let mut buf = Vec::new();
    let mut reader = BufReader::new(reader);
    let _ = reader.read_to_end(&mut buf);
    String::from_utf8_lossy(&buf).to_string()
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn clean_exit_validates() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "ok.sh", "#!/bin/sh\ncat > /dev/null\nexit 0\n");
        let result = validate_script(&script, "1,2\n3,4", Duration::from_secs(5));
        assert!(result.is_ok());
    }

    #[test]
    fn nonzero_exit_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "fail.sh",
            "#!/bin/sh\necho 'boom: bad column' >&2\nexit 3\n",
        );
        let err = validate_script(&script, "", Duration::from_secs(5)).unwrap_err();
        match err {
            ValidationFailure::NonZeroExit { code, stderr } => {
                assert_eq!(code, Some(3));
                assert!(stderr.contains("boom: bad column"));
            }
            other => panic!("expected NonZeroExit, got {:?}", other),
        }
    }

    #[test]
    fn timeout_is_distinct_from_failure() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "hang.sh", "#!/bin/sh\nsleep 30\n");
        let err = validate_script(&script, "", Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, ValidationFailure::TimedOut));
    }

    #[test]
    fn missing_script_is_a_spawn_failure() {
        let err = validate_script(
            Path::new("/nonexistent/script.py"),
            "",
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationFailure::Spawn(_)));
    }

    #[test]
    fn script_reads_stdin_contents() {
        let dir = tempfile::tempdir().unwrap();
        // Exits 0 only when stdin carries the expected first line.
        let script = write_script(
            dir.path(),
            "check.sh",
            "#!/bin/sh\nread line\n[ \"$line\" = \"1,2\" ] || exit 1\ncat > /dev/null\nexit 0\n",
        );
        assert!(validate_script(&script, "1,2\n3,4\n", Duration::from_secs(5)).is_ok());
        assert!(validate_script(&script, "x,y\n", Duration::from_secs(5)).is_err());
    }
}
