// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The reference terminal renderer: ANSI colour, spinner loader, cbreak
//! hotkey watcher, diff review, editor-based multiline prompt.

use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use similar::{ChangeTag, TextDiff};
use tracing::debug;

use crate::{HotkeyEvent, Renderer, ReviewOutcome};

const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const DEFAULT_PREFIX_COLOR: &str = "\x1b[1;36m";

/// Hotkey queue capacity; producers drop events past this bound.
const HOTKEY_QUEUE_CAP: usize = 8;

const LOADER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

pub struct TerminalRenderer {
    color_prefix: String,
    use_color: bool,
    loader: Mutex<Option<Loader>>,
    hotkeys: Arc<Mutex<VecDeque<HotkeyEvent>>>,
    listener: Mutex<Option<HotkeyListener>>,
    completion_messages: Mutex<Vec<String>>,
}

impl TerminalRenderer {
    pub fn new() -> Self {
        let env_color = std::env::var("AI_COLOR").ok().filter(|c| !c.is_empty());
        let use_color = std::env::var_os("NO_COLOR").is_none();
        Self {
            color_prefix: env_color.unwrap_or_else(|| DEFAULT_PREFIX_COLOR.to_string()),
            use_color,
            loader: Mutex::new(None),
            hotkeys: Arc::new(Mutex::new(VecDeque::new())),
            listener: Mutex::new(None),
            completion_messages: Mutex::new(Vec::new()),
        }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.use_color {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn prefix(&self) -> String {
        if self.use_color {
            format!("{}ai>{RESET}", self.color_prefix)
        } else {
            "ai>".to_string()
        }
    }

    fn print_flush(text: &str) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    fn read_line() -> Option<String> {
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim_end_matches(['\n', '\r']).to_string()),
            Err(_) => None,
        }
    }

    fn push_hotkey(queue: &Mutex<VecDeque<HotkeyEvent>>, event: HotkeyEvent) {
        let mut q = queue.lock().unwrap();
        if q.len() < HOTKEY_QUEUE_CAP {
            q.push_back(event);
        }
    }

    /// Stage a message to be injected as a user message on the next turn.
    pub fn queue_completion_message(&self, text: impl Into<String>) {
        self.completion_messages.lock().unwrap().push(text.into());
    }
}

impl Default for TerminalRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TerminalRenderer {
    fn drop(&mut self) {
        // Terminal attributes must be restored on every exit path.
        self.stop_loader();
        self.stop_hotkey_listener();
    }
}

impl Renderer for TerminalRenderer {
    fn display_info(&self, text: &str) {
        println!("{text}");
    }

    fn display_error(&self, text: &str) {
        eprintln!("{}", self.paint(RED, text));
    }

    fn display_user_prompt(&self, text: &str) {
        println!("{} {}", self.paint(YELLOW, ">>>"), text);
    }

    fn display_assistant_message(&self, text: &str) {
        println!("{} {}", self.prefix(), text);
    }

    fn display_shell_output(&self, text: &str) {
        println!("{}", self.paint(DIM, text));
    }

    fn display_plan_update(&self, plan: &str, explanation: Option<&str>) {
        println!("{} plan updated:", self.prefix());
        println!("{plan}");
        if let Some(notes) = explanation {
            println!("{}", self.paint(DIM, &format!("notes: {notes}")));
        }
    }

    fn display_reasoning(&self, text: &str) {
        println!("{}", self.paint(DIM, text));
    }

    fn start_reasoning(&self, id: &str) {
        debug!(id, "reasoning stream opened");
        if self.use_color {
            Self::print_flush(DIM);
        }
    }

    fn update_reasoning(&self, _id: &str, delta: &str) {
        Self::print_flush(delta);
    }

    fn finish_reasoning(&self, id: &str, _final_text: Option<&str>) {
        debug!(id, "reasoning stream closed");
        if self.use_color {
            Self::print_flush(RESET);
        }
        Self::print_flush("\n");
    }

    fn start_assistant_stream(&self, id: &str) {
        debug!(id, "assistant stream opened");
        Self::print_flush(&format!("{} ", self.prefix()));
    }

    fn update_assistant_stream(&self, _id: &str, delta: &str) {
        Self::print_flush(delta);
    }

    fn finish_assistant_stream(&self, id: &str, _final_text: Option<&str>) {
        debug!(id, "assistant stream closed");
        Self::print_flush("\n");
    }

    fn review_file_update(
        &self,
        target_path: &Path,
        display_path: &Path,
        old_text: &str,
        new_text: &str,
        auto_apply: bool,
    ) -> ReviewOutcome {
        if old_text == new_text {
            self.display_info(&format!("No changes for {}", display_path.display()));
            return ReviewOutcome::NoChange;
        }
        if new_text.trim().is_empty() && !old_text.is_empty() {
            self.display_info(&format!(
                "Proposed content for {} is empty; treating as a delete request.",
                display_path.display()
            ));
            return ReviewOutcome::DeleteRequested;
        }

        println!("{}", self.paint(YELLOW, &format!("── {} ──", display_path.display())));
        for line in render_diff_lines(old_text, new_text) {
            let painted = match line.kind {
                DiffLineKind::Add => self.paint(GREEN, &line.text),
                DiffLineKind::Remove => self.paint(RED, &line.text),
                DiffLineKind::Context => line.text.clone(),
                DiffLineKind::Gap => self.paint(DIM, &line.text),
            };
            println!("{painted}");
        }

        if !auto_apply
            && !self.prompt_confirm(
                &format!("Apply changes to {}? [y/N]: ", display_path.display()),
                true,
            )
        {
            return ReviewOutcome::UserRejected;
        }

        if let Some(parent) = target_path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    return ReviewOutcome::error(format!(
                        "failed to write {}: {e}",
                        display_path.display()
                    ));
                }
            }
        }
        match std::fs::write(target_path, new_text) {
            Ok(()) => {
                self.display_info(&format!("[applied] {}", display_path.display()));
                ReviewOutcome::Applied
            }
            Err(e) => ReviewOutcome::error(format!("failed to write {}: {e}", display_path.display())),
        }
    }

    fn prompt_text(&self, prompt: &str) -> Option<String> {
        Self::print_flush(prompt);
        Self::read_line()
    }

    fn prompt_follow_up(&self) -> Option<String> {
        Self::print_flush(&format!("{} ", self.paint(YELLOW, ">>>")));
        let line = Self::read_line()?;
        // `v` / `v <seed>` switches to an editor-based multiline prompt.
        if line == "v" || line.starts_with("v ") {
            let seed = line.strip_prefix("v").unwrap_or("").trim_start();
            return compose_in_editor(seed);
        }
        Some(line)
    }

    fn prompt_confirm(&self, prompt: &str, default_no: bool) -> bool {
        Self::print_flush(prompt);
        match Self::read_line() {
            Some(answer) => parse_confirm(&answer, default_no),
            None => !default_no,
        }
    }

    fn start_loader(&self) {
        let mut slot = self.loader.lock().unwrap();
        if slot.is_some() {
            return;
        }
        *slot = Some(Loader::start());
    }

    fn stop_loader(&self) {
        if let Some(loader) = self.loader.lock().unwrap().take() {
            loader.stop();
        }
    }

    fn start_hotkey_listener(&self) {
        let mut slot = self.listener.lock().unwrap();
        if slot.is_some() {
            return;
        }
        *slot = HotkeyListener::start(Arc::clone(&self.hotkeys));
    }

    fn stop_hotkey_listener(&self) {
        if let Some(listener) = self.listener.lock().unwrap().take() {
            listener.stop();
        }
    }

    fn poll_hotkey_event(&self) -> Option<HotkeyEvent> {
        self.hotkeys.lock().unwrap().pop_front()
    }

    fn consume_completion_messages(&self) -> Vec<String> {
        std::mem::take(&mut *self.completion_messages.lock().unwrap())
    }
}

// ─── Diff rendering ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiffLineKind {
    Add,
    Remove,
    Context,
    Gap,
}

#[derive(Debug, Clone)]
struct DiffLine {
    kind: DiffLineKind,
    text: String,
}

/// Hunked diff with old/new line numbers in the margin; pure so it can be
/// tested without a terminal.
fn render_diff_lines(old_text: &str, new_text: &str) -> Vec<DiffLine> {
    let diff = TextDiff::from_lines(old_text, new_text);
    let mut lines: Vec<DiffLine> = Vec::new();
    for (group_idx, group) in diff.grouped_ops(3).iter().enumerate() {
        if group_idx > 0 {
            lines.push(DiffLine {
                kind: DiffLineKind::Gap,
                text: "   ···".into(),
            });
        }
        for op in group {
            for change in diff.iter_changes(op) {
                let old_no = change
                    .old_index()
                    .map(|i| format!("{:4}", i + 1))
                    .unwrap_or_else(|| "    ".into());
                let new_no = change
                    .new_index()
                    .map(|i| format!("{:4}", i + 1))
                    .unwrap_or_else(|| "    ".into());
                let (kind, sign) = match change.tag() {
                    ChangeTag::Insert => (DiffLineKind::Add, "+"),
                    ChangeTag::Delete => (DiffLineKind::Remove, "-"),
                    ChangeTag::Equal => (DiffLineKind::Context, " "),
                };
                let body = change.value().trim_end_matches('\n');
                lines.push(DiffLine {
                    kind,
                    text: format!("{old_no} {new_no} {sign} {body}"),
                });
            }
        }
    }
    lines
}

fn parse_confirm(answer: &str, default_no: bool) -> bool {
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" => true,
        "n" | "no" => false,
        "" => !default_no,
        _ => false,
    }
}

// ─── Editor prompt ────────────────────────────────────────────────────────────

fn editor_command() -> Vec<String> {
    let raw = std::env::var("AI_PROMPT_EDITOR")
        .or_else(|_| std::env::var("EDITOR"))
        .or_else(|_| std::env::var("VISUAL"))
        .unwrap_or_else(|_| "vi".to_string());
    let expanded = shellexpand::tilde(&raw).into_owned();
    expanded.split_whitespace().map(str::to_string).collect()
}

fn compose_in_editor(seed: &str) -> Option<String> {
    let parts = editor_command();
    let (program, args) = parts.split_first()?;

    let file = tempfile::Builder::new()
        .prefix("ai-prompt-")
        .suffix(".md")
        .tempfile()
        .ok()?;
    if !seed.is_empty() {
        std::fs::write(file.path(), seed).ok()?;
    }

    let status = std::process::Command::new(program)
        .args(args)
        .arg(file.path())
        .status()
        .ok()?;
    if !status.success() {
        return None;
    }

    let text = std::fs::read_to_string(file.path()).ok()?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ─── Loader ───────────────────────────────────────────────────────────────────

struct Loader {
    running: Arc<AtomicBool>,
    handle: std::thread::JoinHandle<()>,
}

impl Loader {
    fn start() -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = std::thread::spawn(move || {
            let mut frame = 0usize;
            while flag.load(Ordering::Relaxed) {
                let glyph = LOADER_FRAMES[frame % LOADER_FRAMES.len()];
                TerminalRenderer::print_flush(&format!("\r{DIM}{glyph} thinking…{RESET}"));
                frame += 1;
                std::thread::sleep(Duration::from_millis(80));
            }
            TerminalRenderer::print_flush("\r\x1b[2K");
        });
        Self { running, handle }
    }

    fn stop(self) {
        self.running.store(false, Ordering::Relaxed);
        let _ = self.handle.join();
    }
}

// ─── Hotkey watcher ───────────────────────────────────────────────────────────

/// Single-keystroke watcher over the controlling terminal.
///
/// Runs stdin in cbreak (non-canonical, no echo, no signal keys) so `q`,
/// `r`, and Ctrl-C arrive as bytes; the watcher translates them into
/// [`HotkeyEvent`]s on the shared queue.  Output processing is untouched, so
/// streamed text keeps rendering normally.
struct HotkeyListener {
    running: Arc<AtomicBool>,
    handle: std::thread::JoinHandle<()>,
    #[cfg(unix)]
    saved: libc::termios,
}

impl HotkeyListener {
    #[cfg(unix)]
    fn start(queue: Arc<Mutex<VecDeque<HotkeyEvent>>>) -> Option<Self> {
        let saved = unsafe {
            if libc::isatty(libc::STDIN_FILENO) == 0 {
                return None;
            }
            let mut saved: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(libc::STDIN_FILENO, &mut saved) != 0 {
                return None;
            }
            let mut cbreak = saved;
            cbreak.c_lflag &= !(libc::ICANON | libc::ECHO | libc::ISIG);
            cbreak.c_cc[libc::VMIN] = 0;
            cbreak.c_cc[libc::VTIME] = 1; // 100 ms read timeout paces the loop
            if libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &cbreak) != 0 {
                return None;
            }
            saved
        };

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = std::thread::spawn(move || {
            while flag.load(Ordering::Relaxed) {
                let mut byte = 0u8;
                let n = unsafe {
                    libc::read(
                        libc::STDIN_FILENO,
                        &mut byte as *mut u8 as *mut libc::c_void,
                        1,
                    )
                };
                if n != 1 {
                    continue;
                }
                let event = match byte {
                    b'q' => Some(HotkeyEvent::Quit),
                    b'r' => Some(HotkeyEvent::Retry),
                    0x03 => Some(HotkeyEvent::Interrupt),
                    _ => None,
                };
                if let Some(event) = event {
                    TerminalRenderer::push_hotkey(&queue, event);
                }
            }
        });
        Some(Self {
            running,
            handle,
            saved,
        })
    }

    #[cfg(not(unix))]
    fn start(_queue: Arc<Mutex<VecDeque<HotkeyEvent>>>) -> Option<Self> {
        None
    }

    fn stop(self) {
        self.running.store(false, Ordering::Relaxed);
        let _ = self.handle.join();
        #[cfg(unix)]
        unsafe {
            libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &self.saved);
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
