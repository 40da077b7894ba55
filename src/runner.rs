//! Final execution of an accepted script.
//!
//! The script's stdout is the primary output of the whole tool and is
//! passed through untouched; its stderr is forwarded to our stderr. A
//! non-zero exit is reported and the code handed back for the process to
//! propagate.

use anyhow::Context;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

/// Run the script with the dataset on stdin and return its exit code.
pub fn run_script(script: &Path, input: &str) -> anyhow::Result<i32> {
    eprintln!("  Executing: {}", script.display());

    let mut child = Command::new(script)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to execute {}", script.display()))?;

    // Feed stdin from its own thread while the output pipes drain; a
    // script that streams output before reading its input would wedge
    // both pipes if we wrote stdin to completion first. A broken pipe
    // just means the script stopped reading early.
    let stdin_handle = child.stdin.take().map(|mut stdin| {
        let input_bytes = input.as_bytes().to_vec();
        thread::spawn(move || {
            let _ = stdin.write_all(&input_bytes);
        })
    });

    let output = child
        .wait_with_output()
        .context("Failed to wait for script")?;

    if let Some(handle) = stdin_handle {
        let _ = handle.join();
    }

    if !output.stdout.is_empty() {
        print!("{}", String::from_utf8_lossy(&output.stdout));
    }
    if !output.stderr.is_empty() {
        eprint!("{}", String::from_utf8_lossy(&output.stderr));
    }

    if output.status.success() {
        Ok(0)
    } else {
        let code = output.status.code().unwrap_or(1);
        eprintln!("\n  Script failed with exit code {}", code);
        eprintln!("  Script path: {}", script.display());
        Ok(code)
    }
}
