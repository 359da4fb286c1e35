// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Sandboxed bash execution for the tool runtime and the `!cmd` passthrough.
//!
//! Commands run as `bash -lc <command>` inside a project-root jail with a
//! wall-clock timeout and independent per-stream output caps.  Validation is
//! deliberately blunt: a substring denylist, a token scan that refuses
//! absolute and parent paths, and a `.git` veto.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

/// Substrings that reject a command outright (checked lowercased).
const DISALLOWED_SUBSTRINGS: &[&str] = &[
    "sudo", "chmod", "chown", "chgrp", "mkfs", "|&", ";&", "shutdown", "reboot",
    "systemctl", "kill", ":>",
];

/// Exit code reported for a command that hit the wall-clock timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// A command was refused before (or instead of) execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CommandRejected(pub String);

/// Outcome of a sandboxed command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub truncated: bool,
}

fn looks_like_path(token: &str) -> bool {
    token.starts_with('/') || token.starts_with("..")
}

fn references_git(token: &str) -> bool {
    token.contains(".git")
}

/// POSIX shell-split, degrading to whitespace splitting when the command
/// has unbalanced quoting.
fn tokenize(command: &str) -> Vec<String> {
    shlex::split(command)
        .unwrap_or_else(|| command.split_whitespace().map(str::to_string).collect())
}

fn validate_command(command: &str) -> Result<(), CommandRejected> {
    let lowered = command.to_lowercase();
    if DISALLOWED_SUBSTRINGS.iter().any(|m| lowered.contains(m)) {
        return Err(CommandRejected(
            "Command rejected: contains disallowed operation".into(),
        ));
    }
    let tokens = tokenize(command);
    if tokens.iter().any(|t| looks_like_path(t)) {
        return Err(CommandRejected(
            "Command rejected: absolute or parent paths are not allowed".into(),
        ));
    }
    if tokens.iter().any(|t| references_git(t)) {
        return Err(CommandRejected(
            "Command rejected: .git modifications are not permitted".into(),
        ));
    }
    Ok(())
}

/// Cut `s` to at most `max_bytes` without splitting a UTF-8 sequence.
/// Returns the (possibly shortened) string and whether a cut happened.
fn truncate_utf8(s: &str, max_bytes: usize) -> (String, bool) {
    if s.len() <= max_bytes {
        return (s.to_string(), false);
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    (s[..end].to_string(), true)
}

/// Run `command` under the sandbox policy.
///
/// `cwd` must be `scope_root` or a descendant of it; the command itself must
/// pass [`validate_command`].  On timeout the child is killed, whatever
/// output it produced is kept, the exit code is forced to
/// [`TIMEOUT_EXIT_CODE`] and `"Command timed out"` is appended to stderr.
pub async fn run_sandboxed_bash(
    command: &str,
    cwd: &Path,
    scope_root: &Path,
    timeout: Duration,
    max_output_bytes: usize,
) -> Result<CommandResult, CommandRejected> {
    let command = command.trim().to_string();
    if command.is_empty() {
        return Err(CommandRejected("Empty command".into()));
    }

    let cwd = cwd
        .canonicalize()
        .map_err(|_| CommandRejected(format!("Working directory {} does not exist", cwd.display())))?;
    if !cwd.is_dir() {
        return Err(CommandRejected(format!(
            "Working directory {} does not exist",
            cwd.display()
        )));
    }
    let scope_root = scope_root
        .canonicalize()
        .map_err(|_| CommandRejected("Command scope violation".into()))?;
    if !cwd.starts_with(&scope_root) {
        return Err(CommandRejected("Command scope violation".into()));
    }

    validate_command(&command)?;

    debug!(cmd = %command, cwd = %cwd.display(), "running sandboxed bash");

    let mut cmd = Command::new("bash");
    cmd.arg("-lc")
        .arg(&command)
        .current_dir(&cwd)
        .env("LC_ALL", "C")
        .env("LANG", "C")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Detach from the controlling terminal so subprocesses cannot reach the
    // renderer's tty via /dev/tty.
    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| CommandRejected(format!("failed to spawn bash: {e}")))?;

    // Drain the pipes concurrently with the wait so a timed-out command
    // still yields its partial output after the kill.
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(pipe) = stdout_pipe.as_mut() {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(pipe) = stderr_pipe.as_mut() {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    });

    let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => (status.code().unwrap_or(-1), false),
        Ok(Err(e)) => {
            return Err(CommandRejected(format!("failed to wait for bash: {e}")));
        }
        Err(_) => {
            // The child leads its own session (setsid), so killing the whole
            // group also takes down descendants still holding the pipes.
            #[cfg(unix)]
            if let Some(pid) = child.id() {
                unsafe {
                    libc::kill(-(pid as i32), libc::SIGKILL);
                }
            }
            let _ = child.start_kill();
            let _ = child.wait().await;
            (TIMEOUT_EXIT_CODE, true)
        }
    };

    let stdout_bytes = stdout_task.await.unwrap_or_default();
    let stderr_bytes = stderr_task.await.unwrap_or_default();
    let stdout_text = String::from_utf8_lossy(&stdout_bytes).into_owned();
    let stderr_text = String::from_utf8_lossy(&stderr_bytes).into_owned();

    let (stdout_text, stdout_cut) = truncate_utf8(&stdout_text, max_output_bytes);
    let (mut stderr_text, stderr_cut) = truncate_utf8(&stderr_text, max_output_bytes);
    if timed_out {
        stderr_text = format!("{stderr_text}\nCommand timed out");
    }

    Ok(CommandResult {
        command,
        exit_code,
        stdout: stdout_text,
        stderr: stderr_text,
        truncated: stdout_cut || stderr_cut,
    })
}

/// Render a [`CommandResult`] as the text handed back to the model and the
/// terminal: `stdout:` / `stderr:` blocks plus a truncation marker.
pub fn format_command_result(result: &CommandResult) -> String {
    let mut sections: Vec<String> = Vec::new();
    if !result.stdout.is_empty() {
        sections.push(format!("stdout:\n{}", result.stdout.trim_end()));
    }
    if !result.stderr.is_empty() {
        sections.push(format!("stderr:\n{}", result.stderr.trim_end()));
    }
    if result.truncated {
        sections.push("[output truncated]".into());
    }
    sections.join("\n\n").trim().to_string()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
