// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Workspace context collection: bounded, line-numbered snapshots of files
//! and directories that seed the model's view of the repository.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Default number of lines per file slice.
pub const DEFAULT_READ_LIMIT: usize = 2000;
/// Lines longer than this are clipped with an ellipsis marker.
pub const MAX_LINE_LENGTH: usize = 2000;
/// Byte budget per slice, newline separators included.
pub const MAX_READ_BYTES: usize = 50 * 1024;
/// Snapshots stop after this many file slices.
pub const MAX_FILES: usize = 8;

const INTERESTING_PREFIXES: &[&str] = &["readme", "docs", "architecture", "overview"];
const INTERESTING_SUFFIXES: &[&str] = &[
    "README.md",
    "README.txt",
    "README",
    "main.py",
    "requirements.txt",
    "pyproject.toml",
    "package.json",
    "setup.py",
];

/// A bounded window into a text file.
#[derive(Debug, Clone)]
pub struct FileSlice {
    pub path: PathBuf,
    pub offset: usize,
    pub limit: usize,
    pub total_lines: usize,
    /// Line fragments without numbering, already clipped to
    /// [`MAX_LINE_LENGTH`].
    pub lines: Vec<String>,
    pub truncated: bool,
    pub truncated_by_bytes: bool,
}

impl FileSlice {
    /// 0-based index one past the last line included in this slice; feeding
    /// this back as `offset` continues the read without gap or overlap.
    pub fn last_line_read(&self) -> usize {
        self.offset + self.lines.len()
    }

    /// Lines rendered as `00042| text`, numbering starting at `offset + 1`.
    pub fn numbered_lines(&self) -> Vec<String> {
        let start = self.offset + 1;
        self.lines
            .iter()
            .enumerate()
            .map(|(idx, line)| format!("{:05}| {}", start + idx, line))
            .collect()
    }

    fn placeholder(path: &Path, offset: usize, limit: usize, text: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            offset,
            limit,
            total_lines: 0,
            lines: vec![text.to_string()],
            truncated: false,
            truncated_by_bytes: false,
        }
    }
}

/// A snapshot of the scope directory: optional listing plus file slices.
#[derive(Debug, Clone)]
pub struct CollectedContext {
    pub scope_root: PathBuf,
    pub listing: Vec<String>,
    pub files: Vec<FileSlice>,
}

// ─── Binary detection ─────────────────────────────────────────────────────────

fn is_binary_extension(ext: &str) -> bool {
    matches!(
        ext.to_ascii_lowercase().as_str(),
        "zip" | "tar" | "gz" | "exe" | "dll" | "so" | "class" | "jar" | "war" | "7z"
            | "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" | "odt" | "ods" | "odp"
            | "bin" | "dat" | "obj" | "o" | "a" | "lib" | "wasm" | "pyc" | "pyo"
    )
}

/// Sample up to 4096 bytes: any NUL byte, or more than 30% non-printable
/// bytes, marks the file binary.
fn has_binary_content(sample: &[u8]) -> bool {
    if sample.is_empty() {
        return false;
    }
    if sample.contains(&0u8) {
        return true;
    }
    let non_printable = sample
        .iter()
        .filter(|&&b| b < 9 || (b > 13 && b < 32))
        .count();
    non_printable * 100 / sample.len() > 30
}

fn is_binary(path: &Path) -> bool {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        if is_binary_extension(ext) {
            return true;
        }
    }
    let mut head = [0u8; 4096];
    let n = match std::fs::File::open(path) {
        Ok(mut f) => {
            use std::io::Read;
            f.read(&mut head).unwrap_or(0)
        }
        Err(_) => return false,
    };
    has_binary_content(&head[..n])
}

// ─── Slicing ──────────────────────────────────────────────────────────────────

/// Read a window of `path` starting at line `offset`, at most `limit` lines
/// and `max_bytes` bytes of content.  Binary and unreadable files produce a
/// single placeholder line.
pub fn read_file_slice(path: &Path, offset: usize, limit: usize, max_bytes: usize) -> FileSlice {
    if is_binary(path) {
        return FileSlice::placeholder(path, offset, limit, "<binary file>");
    }

    let text = match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            return FileSlice::placeholder(path, offset, limit, &format!("<failed to read: {e}>"));
        }
    };

    let all_lines: Vec<&str> = text.split('\n').collect();
    let total_lines = all_lines.len();
    let safe_offset = offset.min(total_lines);

    let mut lines: Vec<String> = Vec::new();
    let mut bytes_used = 0usize;
    let mut truncated_by_bytes = false;
    for line in all_lines.iter().skip(safe_offset).take(limit) {
        let clipped = if line.chars().count() <= MAX_LINE_LENGTH {
            (*line).to_string()
        } else {
            let cut: String = line.chars().take(MAX_LINE_LENGTH).collect();
            format!("{cut}...")
        };
        let size = clipped.len() + usize::from(!lines.is_empty());
        if bytes_used + size > max_bytes {
            truncated_by_bytes = true;
            break;
        }
        bytes_used += size;
        lines.push(clipped);
    }

    let truncated = truncated_by_bytes || safe_offset + lines.len() < total_lines;
    FileSlice {
        path: path.to_path_buf(),
        offset: safe_offset,
        limit,
        total_lines,
        lines,
        truncated,
        truncated_by_bytes,
    }
}

// ─── Candidate discovery ──────────────────────────────────────────────────────

/// Snapshot candidate order: the fixed interesting names first, then entries
/// whose lowercased name starts with an interesting prefix, then the rest of
/// the sorted listing.  Dot entries other than `.env`/`.gitignore` are
/// skipped.
fn discover_candidates(scope_root: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = Vec::new();
    if let Ok(dir) = std::fs::read_dir(scope_root) {
        for entry in dir.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') && name != ".env" && name != ".gitignore" {
                continue;
            }
            entries.push(entry.path());
        }
    }
    entries.sort();

    let mut candidates: Vec<PathBuf> = Vec::new();
    for preferred in INTERESTING_SUFFIXES {
        let path = scope_root.join(preferred);
        if path.exists() {
            candidates.push(path);
        }
    }
    for entry in &entries {
        if candidates.contains(entry) {
            continue;
        }
        let lower = entry
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if INTERESTING_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            candidates.push(entry.clone());
        }
    }
    for entry in &entries {
        if !candidates.contains(entry) {
            candidates.push(entry.clone());
        }
    }
    candidates
}

/// Collect a bounded snapshot of `scope`.
///
/// `file_windows` overrides the `(offset, limit)` window for specific files,
/// letting a caller continue reading where a previous snapshot stopped.
pub fn collect_context(
    scope: &Path,
    limit_bytes: usize,
    default_limit: usize,
    include_listing: bool,
    file_windows: Option<&HashMap<PathBuf, (usize, usize)>>,
) -> CollectedContext {
    let scope_root = scope.canonicalize().unwrap_or_else(|_| scope.to_path_buf());

    let mut listing: Vec<String> = Vec::new();
    if include_listing {
        match std::fs::read_dir(&scope_root) {
            Ok(dir) => {
                let mut names: Vec<String> = dir
                    .flatten()
                    .map(|e| {
                        let mark = if e.path().is_dir() { "/" } else { "" };
                        format!("{}{}", e.file_name().to_string_lossy(), mark)
                    })
                    .collect();
                names.sort();
                listing = names;
            }
            Err(_) => listing.push("<scope directory missing>".into()),
        }
    }

    let mut files: Vec<FileSlice> = Vec::new();
    for candidate in discover_candidates(&scope_root) {
        if files.len() >= MAX_FILES {
            break;
        }
        if candidate.is_dir() {
            continue;
        }
        let (offset, limit) = file_windows
            .and_then(|w| w.get(&candidate).copied())
            .unwrap_or((0, default_limit));
        let max_bytes = limit_bytes.min(MAX_READ_BYTES).max(1);
        files.push(read_file_slice(&candidate, offset, limit.max(1), max_bytes));
    }

    debug!(
        scope = %scope_root.display(),
        files = files.len(),
        listing = listing.len(),
        "collected context"
    );
    CollectedContext {
        scope_root,
        listing,
        files,
    }
}

// ─── Formatting ───────────────────────────────────────────────────────────────

fn slice_hint(file_slice: &FileSlice) -> String {
    if file_slice.truncated_by_bytes {
        format!(
            "(Output truncated at {} bytes. Use 'offset' parameter to read beyond line {})",
            MAX_READ_BYTES,
            file_slice.last_line_read()
        )
    } else if file_slice.truncated {
        format!(
            "(File has more lines. Use 'offset' parameter to read beyond line {})",
            file_slice.last_line_read()
        )
    } else {
        format!("(End of file - total {} lines)", file_slice.total_lines)
    }
}

/// Render one slice as a prompt block with a `### File:` header, numbered
/// body and continuation hint.
pub fn format_file_slice_for_prompt(file_slice: &FileSlice, rel_root: Option<&Path>) -> String {
    let rel_path = rel_root
        .and_then(|root| file_slice.path.strip_prefix(root).ok())
        .unwrap_or(&file_slice.path);

    let mut header = format!("### File: {}", rel_path.display());
    if !file_slice.lines.is_empty() {
        header.push_str(&format!(
            " (lines {}-{})",
            file_slice.offset + 1,
            file_slice.last_line_read()
        ));
    }
    if file_slice.truncated {
        header.push_str(" (truncated)");
    }

    let numbered = file_slice.numbered_lines();
    let body = if numbered.is_empty() {
        "<empty file>".to_string()
    } else {
        numbered.join("\n")
    };

    [
        header,
        "<file>".into(),
        body,
        String::new(),
        slice_hint(file_slice),
        "</file>".into(),
    ]
    .join("\n")
}

/// Render a full snapshot for prompt injection.
pub fn format_context_for_prompt(collected: &CollectedContext) -> String {
    let mut blocks: Vec<String> = Vec::new();
    if !collected.listing.is_empty() {
        blocks.push("## Directory Listing".into());
        for line in &collected.listing {
            blocks.push(format!("- {line}"));
        }
    }
    for file_slice in &collected.files {
        if !blocks.is_empty() {
            blocks.push(String::new());
        }
        blocks.push(format_file_slice_for_prompt(
            file_slice,
            Some(&collected.scope_root),
        ));
    }
    blocks.join("\n")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    // ── read_file_slice ───────────────────────────────────────────────────────

    #[test]
    fn slice_reads_whole_small_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "a.txt", "one\ntwo\nthree");
        let s = read_file_slice(&path, 0, 100, MAX_READ_BYTES);
        assert_eq!(s.lines, vec!["one", "two", "three"]);
        assert_eq!(s.total_lines, 3);
        assert!(!s.truncated);
        assert!(!s.truncated_by_bytes);
    }

    #[test]
    fn offset_is_clamped_to_total_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "a.txt", "one\ntwo");
        let s = read_file_slice(&path, 99, 10, MAX_READ_BYTES);
        assert_eq!(s.offset, 2);
        assert!(s.lines.is_empty());
        assert!(!s.truncated);
    }

    #[test]
    fn line_limit_marks_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "a.txt", "a\nb\nc\nd");
        let s = read_file_slice(&path, 0, 2, MAX_READ_BYTES);
        assert_eq!(s.lines, vec!["a", "b"]);
        assert!(s.truncated);
        assert!(!s.truncated_by_bytes);
        assert_eq!(s.last_line_read(), 2);
    }

    #[test]
    fn byte_budget_marks_truncated_by_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "a.txt", "aaaa\nbbbb\ncccc\n");
        let s = read_file_slice(&path, 0, 100, 6);
        assert_eq!(s.lines, vec!["aaaa"]);
        assert!(s.truncated_by_bytes);
        assert!(s.truncated);
    }

    #[test]
    fn long_lines_are_clipped_with_ellipsis() {
        let dir = tempfile::tempdir().unwrap();
        let long = "x".repeat(MAX_LINE_LENGTH + 10);
        let path = write(&dir, "a.txt", &long);
        let s = read_file_slice(&path, 0, 10, MAX_READ_BYTES);
        assert!(s.lines[0].ends_with("..."));
        assert_eq!(s.lines[0].chars().count(), MAX_LINE_LENGTH + 3);
    }

    #[test]
    fn iterating_slices_reassembles_the_file_exactly_once() {
        // Round-trip invariant: offset = last_line_read until !truncated
        // yields every line exactly once, in order.
        let dir = tempfile::tempdir().unwrap();
        let content: Vec<String> = (0..57).map(|i| format!("line {i}")).collect();
        let path = write(&dir, "a.txt", &content.join("\n"));

        let mut collected: Vec<String> = Vec::new();
        let mut offset = 0;
        loop {
            let s = read_file_slice(&path, offset, 10, MAX_READ_BYTES);
            collected.extend(s.lines.iter().cloned());
            if !s.truncated {
                break;
            }
            offset = s.last_line_read();
        }
        assert_eq!(collected, content);
    }

    #[test]
    fn numbered_lines_use_five_digit_padding() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "a.txt", "first\nsecond");
        let s = read_file_slice(&path, 0, 10, MAX_READ_BYTES);
        assert_eq!(s.numbered_lines()[0], "00001| first");
        assert_eq!(s.numbered_lines()[1], "00002| second");
    }

    #[test]
    fn numbered_lines_respect_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "a.txt", "a\nb\nc");
        let s = read_file_slice(&path, 1, 10, MAX_READ_BYTES);
        assert_eq!(s.numbered_lines()[0], "00002| b");
    }

    #[test]
    fn missing_file_yields_placeholder() {
        let s = read_file_slice(Path::new("/tmp/ai_ctx_missing.txt"), 0, 10, 100);
        assert_eq!(s.lines.len(), 1);
        assert!(s.lines[0].starts_with("<failed to read:"));
    }

    // ── Binary detection ──────────────────────────────────────────────────────

    #[test]
    fn binary_extension_is_detected_without_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "blob.bin", "actually text");
        let s = read_file_slice(&path, 0, 10, 100);
        assert_eq!(s.lines, vec!["<binary file>"]);
    }

    #[test]
    fn nul_byte_marks_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, b"abc\x00def").unwrap();
        let s = read_file_slice(&path, 0, 10, 100);
        assert_eq!(s.lines, vec!["<binary file>"]);
    }

    #[test]
    fn plain_text_is_not_binary() {
        assert!(!has_binary_content(b"fn main() {}\n"));
        assert!(!has_binary_content(b""));
    }

    #[test]
    fn control_byte_heavy_sample_is_binary() {
        let mut data = vec![0x01u8; 40];
        data.extend(std::iter::repeat(b'a').take(60));
        assert!(has_binary_content(&data));
    }

    // ── collect_context ───────────────────────────────────────────────────────

    #[test]
    fn readme_is_ordered_first() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir, "zzz.txt", "z");
        write(&dir, "README.md", "readme");
        write(&dir, "aaa.txt", "a");
        let ctx = collect_context(dir.path(), MAX_READ_BYTES, 100, false, None);
        assert!(ctx.files[0].path.ends_with("README.md"));
    }

    #[test]
    fn dot_entries_are_skipped_except_env_and_gitignore() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir, ".hidden", "no");
        write(&dir, ".env", "KEY=1");
        write(&dir, ".gitignore", "target/");
        let ctx = collect_context(dir.path(), MAX_READ_BYTES, 100, false, None);
        let names: Vec<String> = ctx
            .files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(!names.contains(&".hidden".to_string()));
        assert!(names.contains(&".env".to_string()));
        assert!(names.contains(&".gitignore".to_string()));
    }

    #[test]
    fn snapshot_stops_after_max_files() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..(MAX_FILES + 4) {
            write(&dir, &format!("f{i:02}.txt"), "x");
        }
        let ctx = collect_context(dir.path(), MAX_READ_BYTES, 100, false, None);
        assert_eq!(ctx.files.len(), MAX_FILES);
    }

    #[test]
    fn listing_marks_directories_with_slash() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        write(&dir, "f.txt", "x");
        let ctx = collect_context(dir.path(), MAX_READ_BYTES, 100, true, None);
        assert!(ctx.listing.contains(&"sub/".to_string()));
        assert!(ctx.listing.contains(&"f.txt".to_string()));
    }

    #[test]
    fn file_windows_override_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "only.txt", "a\nb\nc\nd");
        let canonical = path.canonicalize().unwrap();
        let mut windows = HashMap::new();
        windows.insert(canonical, (2usize, 1usize));
        let ctx = collect_context(dir.path(), MAX_READ_BYTES, 100, false, Some(&windows));
        assert_eq!(ctx.files[0].offset, 2);
        assert_eq!(ctx.files[0].lines, vec!["c"]);
    }

    // ── Formatting ────────────────────────────────────────────────────────────

    #[test]
    fn prompt_block_has_header_body_and_hint() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "a.txt", "hello");
        let s = read_file_slice(&path, 0, 10, MAX_READ_BYTES);
        let block = format_file_slice_for_prompt(&s, Some(dir.path()));
        assert!(block.starts_with("### File: a.txt (lines 1-1)"));
        assert!(block.contains("<file>"));
        assert!(block.contains("00001| hello"));
        assert!(block.contains("(End of file - total 1 lines)"));
        assert!(block.trim_end().ends_with("</file>"));
    }

    #[test]
    fn truncated_block_advertises_next_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "a.txt", "a\nb\nc\nd");
        let s = read_file_slice(&path, 0, 2, MAX_READ_BYTES);
        let block = format_file_slice_for_prompt(&s, None);
        assert!(block.contains("(truncated)"));
        assert!(block.contains("read beyond line 2"));
    }

    #[test]
    fn full_snapshot_concatenates_listing_and_files() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir, "a.txt", "content");
        let ctx = collect_context(dir.path(), MAX_READ_BYTES, 100, true, None);
        let text = format_context_for_prompt(&ctx);
        assert!(text.starts_with("## Directory Listing"));
        assert!(text.contains("### File: a.txt"));
    }
}
