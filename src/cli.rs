// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::Parser;

/// Flag surface parsed by clap.  The primary flags (`-h`/`-v`/`-u`) and the
/// `!cmd` shell form are detected on the raw argv before this parser runs,
/// because they predate flag parsing and must not be mixed with it.
#[derive(Parser, Debug, Default)]
#[command(
    name = "ai",
    disable_help_flag = true,
    disable_version_flag = true,
    about = "Codex-style terminal assistant"
)]
pub struct Cli {
    /// Preview a file slice and exit.
    #[arg(long, value_name = "PATH")]
    pub read: Option<String>,

    /// 0-based line offset for --read.
    #[arg(long)]
    pub offset: Option<usize>,

    /// Number of lines to read for --read.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Maximum bytes to load for --read.
    #[arg(long = "max-bytes")]
    pub max_bytes: Option<usize>,

    /// Enable debug logging, optionally into FILE (default debug.log).
    #[arg(
        short = 'd',
        long = "debug",
        value_name = "FILE",
        num_args = 0..=1,
        default_missing_value = "debug.log"
    )]
    pub debug: Option<String>,

    /// Scope path and/or prompt words.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<String>,
}

/// The mutually-exclusive primary flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryFlag {
    Help,
    Version,
    Upgrade,
}

const PRIMARY_FLAGS: &[&str] = &["-h", "--help", "-v", "--version", "-V", "-u", "--upgrade"];

/// When every argument is a primary flag, decide which action runs.
/// `Err` carries a user-facing message for invalid combinations.
pub fn parse_primary_flags(args: &[String]) -> Result<Option<PrimaryFlag>, String> {
    if args.is_empty() || !args.iter().all(|a| PRIMARY_FLAGS.contains(&a.as_str())) {
        return Ok(None);
    }

    let mut selected: Vec<PrimaryFlag> = Vec::new();
    for arg in args {
        let flag = match arg.as_str() {
            "-h" | "--help" => PrimaryFlag::Help,
            "-v" | "--version" | "-V" => PrimaryFlag::Version,
            "-u" | "--upgrade" => PrimaryFlag::Upgrade,
            other => return Err(format!("Unknown flag '{other}'")),
        };
        if !selected.contains(&flag) {
            selected.push(flag);
        }
    }
    if selected.len() > 1 {
        return Err("Flags -h, -v, and -u cannot be combined".into());
    }
    Ok(selected.pop())
}

/// Detect the immediate-shell form: `!cmd …` or `PATH !cmd …` where PATH
/// exists on disk.  Returns `(command, optional scope)`.
pub fn detect_shell_invocation(args: &[String]) -> Option<(String, Option<String>)> {
    let compose = |head: &str, tail: &[String]| -> String {
        let mut parts: Vec<&str> = Vec::new();
        let head = head.trim();
        if !head.is_empty() {
            parts.push(head);
        }
        parts.extend(tail.iter().map(String::as_str).filter(|s| !s.is_empty()));
        parts.join(" ")
    };

    let first = args.first()?;
    if let Some(head) = first.strip_prefix('!') {
        return Some((compose(head, &args[1..]), None));
    }
    if args.len() >= 2 {
        if let Some(head) = args[1].strip_prefix('!') {
            let scope = shellexpand::tilde(&args[0]).into_owned();
            if std::path::Path::new(&scope).exists() {
                return Some((compose(head, &args[2..]), Some(scope)));
            }
        }
    }
    None
}

pub fn print_help() {
    println!(
        "ai - Codex-style terminal assistant\n\n\
         Usage:\n\
         \x20 ai              Start an interactive session\n\
         \x20 ai 'question'   Run a one-shot prompt against the repository\n\
         \x20 ai PATH 'q'     Run a prompt scoped to PATH (file → edit mode)\n\
         \x20 ai '!command'   Run a sandboxed shell command immediately\n\
         \x20 ai --read PATH  Preview a file slice\n\
         \x20 ai -d [FILE]    Enable debug logging (default debug.log)\n\
         \x20 ai -h           Show this help\n\
         \x20 ai -v           Show installed version\n\
         \x20 ai -u           Reinstall the latest release if a newer version exists"
    );
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
