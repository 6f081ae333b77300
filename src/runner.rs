use anyhow::{Context, Result};
use std::io::Write;
use std::process::{Command, Output, Stdio};

/// Run a command and capture output
pub fn run_capture(cmd: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(cmd)
        .args(args)
        .output()
        .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("Command failed: {}", stderr.trim())
    }
}

/// Run a command with `input` on stdin and return its raw output
///
/// A non-zero exit is not an error here; tools like conftest report rule
/// failures that way while still printing a result.
pub fn run_with_input(cmd: &str, args: &[&str], input: &str) -> Result<Output> {
    let mut child = Command::new(cmd)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(input.as_bytes())
            .with_context(|| format!("Failed to write input to {cmd}"))?;
    }

    child
        .wait_with_output()
        .with_context(|| format!("Failed to wait for {cmd}"))
}

/// Check if a command exists
pub fn command_exists(cmd: &str) -> bool {
    Command::new("which")
        .arg(cmd)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_capture_trims() {
        assert_eq!(run_capture("echo", &["  hi  "]).unwrap(), "hi");
    }

    #[test]
    fn test_run_capture_failure() {
        let err = run_capture("sh", &["-c", "echo boom >&2; exit 3"]).unwrap_err();
        assert_eq!(err.to_string(), "Command failed: boom");
    }

    #[test]
    fn test_run_with_input_pipes_stdin() {
        let output = run_with_input("cat", &[], "{\"key\":\"search\"}").unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout), "{\"key\":\"search\"}");
    }

    #[test]
    fn test_missing_command() {
        assert!(!command_exists("flagops-definitely-not-installed"));
        assert!(run_with_input("flagops-definitely-not-installed", &[], "").is_err());
    }
}
