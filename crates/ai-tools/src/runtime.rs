// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use ai_render::{Renderer, ReviewOutcome};
use ai_sandbox::{format_command_result, run_sandboxed_bash};

use crate::plan::PlanState;

/// The exact sentinel returned for a gated tool while mutation is locked.
/// The loop compares against this string to inject its unlock reminder.
pub const JFDI_REQUIRED_MESSAGE: &str =
    "blocked: mutating tools are disabled until the user speaks the unlock phrase";

/// Shared state handed to every tool execution.
pub struct ToolRuntime {
    pub renderer: Arc<dyn Renderer>,
    /// Absolute project root; the jail boundary for every path argument.
    pub base_root: PathBuf,
    /// The scope the user selected; relative paths resolve against it.
    pub default_root: PathBuf,
    pub plan: Arc<Mutex<PlanState>>,
    /// The most recent natural-language instruction, used to derive
    /// `auto_apply` for writes.
    pub latest_instruction: String,
    /// Flipped by the dog-whistle; false at process start and after resets.
    pub jfdi_enabled: bool,
    /// Paths the user already approved this session; subsequent writes to
    /// them skip the confirmation prompt (the diff is still shown).
    pub seen_writes: Arc<Mutex<HashSet<PathBuf>>>,
}

impl ToolRuntime {
    pub fn new(renderer: Arc<dyn Renderer>, base_root: PathBuf, default_root: PathBuf) -> Self {
        Self {
            renderer,
            base_root,
            default_root,
            plan: Arc::new(Mutex::new(PlanState::default())),
            latest_instruction: String::new(),
            jfdi_enabled: false,
            seen_writes: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Resolve a path argument: `~` expansion, `default_root` for relative
    /// paths, then normalisation (symlink-resolving when the file exists).
    /// The result is NOT jail-checked; pair with [`ToolRuntime::jail`].
    pub fn resolve(&self, raw: &str) -> PathBuf {
        let expanded = shellexpand::tilde(raw).into_owned();
        let candidate = PathBuf::from(expanded);
        let absolute = if candidate.is_absolute() {
            candidate
        } else {
            self.default_root.join(candidate)
        };
        match absolute.canonicalize() {
            Ok(resolved) => resolved,
            Err(_) => normalize_lexically(&absolute),
        }
    }

    /// Return the path's jail-relative form, or `Err(())` when it escapes
    /// `base_root`.
    pub fn jail<'a>(&self, path: &'a Path) -> Result<&'a Path, ()> {
        path.strip_prefix(&self.base_root).map_err(|_| ())
    }

    /// Shell execution limits: `AI_BASH_MAX_SECONDS` (default 15) and
    /// `AI_BASH_MAX_OUTPUT` (default 20000), both clamped to at least 1.
    pub fn shell_limits(&self) -> (Duration, usize) {
        let seconds = std::env::var("AI_BASH_MAX_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(15)
            .max(1);
        let max_output = std::env::var("AI_BASH_MAX_OUTPUT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(20_000)
            .max(1);
        (Duration::from_secs(seconds), max_output)
    }
}

/// Collapse `.` and `..` components without touching the filesystem, so
/// not-yet-existing write targets still get a canonical-looking form.
pub(crate) fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// True when the instruction's own wording already asks for a write, which
/// lets the renderer skip the per-file confirmation prompt.
pub fn instruction_implies_write(text: &str) -> bool {
    let normalized = text.to_lowercase();
    const VERBS: &[&str] = &[
        "write", "create", "add", "generate", "produce", "save", "append", "commit", "apply",
        "patch", "update", "make", "build", "draft", "addit", "writeit",
    ];
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| VERBS.contains(&word))
}

/// Resolve, jail-check, and review a proposed file update.  Returns the
/// status string recorded as the tool result.
pub async fn apply_file_update(
    filename: &str,
    content: &str,
    rt: &ToolRuntime,
    auto_apply: bool,
) -> String {
    let path = rt.resolve(filename);
    let relative = match rt.jail(&path) {
        Ok(rel) => rel.to_path_buf(),
        Err(()) => {
            rt.renderer.display_info(&format!(
                "[skip] refusing to modify outside project root: {}",
                path.display()
            ));
            return ReviewOutcome::SkippedOutOfScope.as_result_text();
        }
    };

    let old_text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            let message = format!("error: failed to read {}: {e}", relative.display());
            rt.renderer.display_error(&message);
            return message;
        }
    };

    let already_approved = rt.seen_writes.lock().unwrap().contains(&path);
    debug!(path = %relative.display(), auto_apply, already_approved, "reviewing file update");
    let outcome = rt.renderer.review_file_update(
        &path,
        &relative,
        &old_text,
        content,
        auto_apply || already_approved,
    );

    if outcome == ReviewOutcome::Applied {
        rt.seen_writes.lock().unwrap().insert(path.clone());
    }
    if outcome == ReviewOutcome::DeleteRequested {
        return delete_path_via_shell(&path, rt).await;
    }
    outcome.as_result_text()
}

/// Delete a file by issuing `rm <relative>` through the sandbox, so deletes
/// obey the same jail and policy as every other shell action.
pub async fn delete_path_via_shell(path: &Path, rt: &ToolRuntime) -> String {
    let relative = match rt.jail(path) {
        Ok(rel) => rel.to_path_buf(),
        Err(()) => return "error: delete outside project root".into(),
    };

    let rel_str = relative.to_string_lossy();
    let quoted = shlex::try_quote(&rel_str)
        .map(|q| q.into_owned())
        .unwrap_or_else(|_| rel_str.into_owned());
    let rm_cmd = format!("rm {quoted}");

    let result = match run_sandboxed_bash(
        &rm_cmd,
        &rt.base_root,
        &rt.base_root,
        Duration::from_secs(30),
        20_000,
    )
    .await
    {
        Ok(result) => result,
        Err(e) => return format!("error: {e}"),
    };

    rt.renderer.display_info(&format!("$ {rm_cmd}"));
    let formatted = format_command_result(&result);
    if !formatted.trim().is_empty() {
        rt.renderer.display_shell_output(&formatted);
    }

    if result.exit_code != 0 {
        return format!("error: rm exited with {}", result.exit_code);
    }
    "applied".into()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use ai_render::RecordingRenderer;

    fn runtime(root: &Path) -> ToolRuntime {
        let root = root.canonicalize().unwrap();
        ToolRuntime::new(Arc::new(RecordingRenderer::new()), root.clone(), root)
    }

    // ── Path resolution ───────────────────────────────────────────────────────

    #[test]
    fn relative_paths_resolve_under_default_root() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime(dir.path());
        let resolved = rt.resolve("sub/file.txt");
        assert!(resolved.starts_with(&rt.base_root));
        assert!(resolved.ends_with("sub/file.txt"));
    }

    #[test]
    fn parent_traversal_is_normalized_before_jailing() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime(dir.path());
        let resolved = rt.resolve("../escape.txt");
        assert!(rt.jail(&resolved).is_err(), "{resolved:?} must escape the jail");
    }

    #[test]
    fn inner_dotdot_stays_inside() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime(dir.path());
        let resolved = rt.resolve("a/../b.txt");
        assert!(rt.jail(&resolved).is_ok());
        assert!(resolved.ends_with("b.txt"));
    }

    #[test]
    fn normalize_collapses_dot_components() {
        assert_eq!(
            normalize_lexically(Path::new("/a/./b/../c")),
            PathBuf::from("/a/c")
        );
    }

    // ── instruction_implies_write ─────────────────────────────────────────────

    #[test]
    fn write_instructions_imply_write() {
        assert!(instruction_implies_write("please write foo.py"));
        assert!(instruction_implies_write("Create a new module"));
        assert!(instruction_implies_write("APPLY the patch"));
        assert!(instruction_implies_write("addit"));
    }

    #[test]
    fn questions_do_not_imply_write() {
        assert!(!instruction_implies_write("what does foo.py do?"));
        assert!(!instruction_implies_write("explain the loop"));
        assert!(!instruction_implies_write(""));
    }

    // ── apply_file_update ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn out_of_scope_write_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime(dir.path());
        let status = apply_file_update("/etc/hosts", "evil", &rt, true).await;
        assert_eq!(status, "skipped_out_of_scope");
    }

    #[tokio::test]
    async fn new_file_applies_through_review() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime(dir.path());
        let status = apply_file_update("fresh.txt", "content\n", &rt, true).await;
        assert_eq!(status, "applied");
        assert_eq!(
            std::fs::read_to_string(rt.base_root.join("fresh.txt")).unwrap(),
            "content\n"
        );
    }

    #[tokio::test]
    async fn empty_content_on_existing_file_deletes_it() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let target = root.join("doomed.txt");
        std::fs::write(&target, "old\n").unwrap();

        // The renderer signals the delete; the runtime carries it out via rm.
        let renderer = Arc::new(RecordingRenderer::new());
        renderer.push_review_outcome(ai_render::ReviewOutcome::DeleteRequested);
        let rt = ToolRuntime::new(renderer.clone(), root.clone(), root);
        let status = apply_file_update("doomed.txt", "", &rt, true).await;
        assert_eq!(status, "applied");
        assert!(!target.exists(), "file should have been removed via rm");
    }

    #[tokio::test]
    async fn approved_path_skips_reconfirmation() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let renderer = Arc::new(RecordingRenderer::new());
        let rt = ToolRuntime::new(renderer.clone(), root.clone(), root);

        // Non-write instruction → auto_apply starts false.
        let first = apply_file_update("twice.txt", "v1\n", &rt, false).await;
        assert_eq!(first, "applied");
        let second = apply_file_update("twice.txt", "v2\n", &rt, false).await;
        assert_eq!(second, "applied");

        let reviews = renderer.events_matching("review: twice.txt");
        assert_eq!(reviews.len(), 2);
        assert!(reviews[0].contains("auto_apply=false"), "{}", reviews[0]);
        assert!(
            reviews[1].contains("auto_apply=true"),
            "second write to an approved path skips the prompt: {}",
            reviews[1]
        );
    }

    // ── delete_path_via_shell ─────────────────────────────────────────────────

    #[tokio::test]
    async fn delete_outside_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime(dir.path());
        let status = delete_path_via_shell(Path::new("/etc/passwd"), &rt).await;
        assert_eq!(status, "error: delete outside project root");
    }

    #[tokio::test]
    async fn delete_of_missing_file_reports_rm_exit() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime(dir.path());
        let status = delete_path_via_shell(&rt.base_root.join("nope.txt"), &rt).await;
        assert!(status.starts_with("error: rm exited with"), "{status}");
    }
}
