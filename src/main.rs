// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::path::{Path, PathBuf};
use std::process::{ExitCode, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::filter::EnvFilter;

use ai_config::{load_config, save_config, Config, DEFAULT_DOG_WHISTLE, DEFAULT_MODEL};
use ai_context::{
    format_file_slice_for_prompt, read_file_slice, DEFAULT_READ_LIMIT, MAX_READ_BYTES,
};
use ai_core::{build_engine_settings, parse_inline_prompt, Engine, NEW_CONVERSATION_TOKEN};
use ai_model::ResponsesClient;
use ai_render::{Renderer, TerminalRenderer};
use ai_sandbox::{format_command_result, run_sandboxed_bash, CommandRejected};
use ai_store::ConversationStore;

use cli::{detect_shell_invocation, parse_primary_flags, print_help, Cli, PrimaryFlag};

const INSTALL_SH_URL: &str = "https://raw.githubusercontent.com/ai-cli/ai/main/install.sh";

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let code = match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            1
        }
    };
    // Exit via ExitCode so destructors (terminal attribute restore) run.
    ExitCode::from(code.clamp(0, 255) as u8)
}

async fn run(args: Vec<String>) -> anyhow::Result<i32> {
    let renderer = Arc::new(TerminalRenderer::new());

    // Primary flags short-circuit everything else.
    match parse_primary_flags(&args) {
        Err(message) => {
            renderer.display_error(&message);
            return Ok(1);
        }
        Ok(Some(PrimaryFlag::Help)) => {
            print_help();
            return Ok(0);
        }
        Ok(Some(PrimaryFlag::Version)) => {
            renderer.display_info(env!("CARGO_PKG_VERSION"));
            return Ok(0);
        }
        Ok(Some(PrimaryFlag::Upgrade)) => {
            return run_upgrade(renderer.as_ref()).await;
        }
        Ok(None) => {}
    }

    // Immediate sandboxed shell: `ai '!cmd …'` / `ai PATH '!cmd …'`.
    if let Some((command, scope)) = detect_shell_invocation(&args) {
        let command = command.trim().to_string();
        if command.is_empty() {
            renderer.display_error("Shell command cannot be empty.");
            return Ok(1);
        }
        renderer.display_user_prompt(&format!("!{command}"));
        return run_shell_command(renderer.as_ref(), &command, scope.as_deref()).await;
    }

    let parsed = Cli::try_parse_from(std::iter::once("ai".to_string()).chain(args.clone()));
    let parsed = match parsed {
        Ok(parsed) => parsed,
        Err(e) => {
            renderer.display_error(&e.to_string());
            return Ok(1);
        }
    };

    init_logging(parsed.debug.as_deref(), renderer.as_ref());

    let mut config = load_config();

    if let Some(read_path) = &parsed.read {
        return show_file_slice(
            renderer.as_ref(),
            &config,
            read_path,
            parsed.offset,
            parsed.limit,
            parsed.max_bytes,
        );
    }

    bootstrap_config(renderer.as_ref(), &mut config)?;

    let settings = build_engine_settings(&config)?;
    let client = Arc::new(ResponsesClient::new(settings.api_key.clone()));
    let workspace_root = std::env::current_dir()
        .context("resolving working directory")?
        .canonicalize()
        .context("resolving working directory")?;
    let store = ConversationStore::open(&workspace_root);
    let mut engine = Engine::new(renderer.clone(), client, config, settings)
        .with_workspace_root(workspace_root.clone())
        .with_store(store);

    if parsed.rest.is_empty() {
        return interactive_session(renderer.as_ref(), &mut engine).await;
    }

    // Several scope paths before the prompt select inline one-shot mode; a
    // missing prompt after paths is reported here too.
    match parse_inline_prompt(&parsed.rest, &workspace_root) {
        Some(Err(message)) => {
            renderer.display_error(&message);
            return Ok(1);
        }
        Some(Ok(request)) if request.scopes.len() >= 2 => {
            return engine.run_inline(&request.prompt, &request.scopes).await;
        }
        _ => {}
    }

    // `ai PATH "prompt…"` — an existing path selects edit mode (file) or a
    // scoped conversation (directory); otherwise the whole argv is the prompt.
    let first = shellexpand::tilde(&parsed.rest[0]).into_owned();
    let first_path = Path::new(&first);
    if first_path.exists() && parsed.rest.len() > 1 {
        let prompt = parsed.rest[1..].join(" ");
        if first_path.is_file() {
            return run_edit_with_unlock(renderer.as_ref(), &mut engine, &first, &prompt).await;
        }
        return engine.run_conversation(&prompt, Some(&first), true).await;
    }

    let prompt = parsed.rest.join(" ");
    engine.run_conversation(&prompt, None, true).await
}

/// Route tracing output away from the interactive terminal: into the `-d`
/// file when given, to stderr only when `AI_LOG`/`RUST_LOG` asks for it.
fn init_logging(debug_file: Option<&str>, renderer: &dyn Renderer) {
    if let Some(path) = debug_file {
        let path = PathBuf::from(shellexpand::tilde(path).into_owned());
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
        match std::fs::File::create(&path) {
            Ok(file) => {
                let filter = EnvFilter::try_from_env("AI_LOG")
                    .unwrap_or_else(|_| EnvFilter::new("debug"));
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .init();
                renderer.display_info(&format!("Debug logging -> {}", path.display()));
            }
            Err(e) => {
                renderer.display_error(&format!("Failed to enable debug logging: {e}"));
            }
        }
        return;
    }

    let api_debug = std::env::var("AI_DEBUG_API")
        .or_else(|_| std::env::var("AI_DEBUG_REASONING"))
        .map(|v| !matches!(v.to_lowercase().as_str(), "" | "0" | "false" | "no"))
        .unwrap_or(false);
    let env_filter = EnvFilter::try_from_env("AI_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .ok()
        .or_else(|| api_debug.then(|| EnvFilter::new("debug")));
    if let Some(filter) = env_filter {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn run_shell_command(
    renderer: &dyn Renderer,
    command: &str,
    scope: Option<&str>,
) -> anyhow::Result<i32> {
    let repo_root = std::env::current_dir()?.canonicalize()?;
    let cwd = match scope {
        Some(scope) => {
            let path = PathBuf::from(shellexpand::tilde(scope).into_owned());
            if !path.exists() {
                renderer.display_error(&format!("Scope path not found: {}", path.display()));
                return Ok(1);
            }
            let dir = if path.is_file() {
                path.parent().map(Path::to_path_buf).unwrap_or(repo_root.clone())
            } else {
                path
            };
            dir.canonicalize().unwrap_or(dir)
        }
        None => repo_root.clone(),
    };

    match run_sandboxed_bash(command, &cwd, &repo_root, Duration::from_secs(30), 20_000).await {
        Ok(result) => {
            let formatted = format_command_result(&result);
            if !formatted.is_empty() {
                renderer.display_shell_output(&formatted);
            }
            Ok(result.exit_code)
        }
        Err(CommandRejected(reason)) => {
            renderer.display_error(&format!("command rejected: {reason}"));
            Ok(1)
        }
    }
}

fn show_file_slice(
    renderer: &dyn Renderer,
    config: &Config,
    path_str: &str,
    offset: Option<usize>,
    limit: Option<usize>,
    max_bytes: Option<usize>,
) -> anyhow::Result<i32> {
    let cwd = std::env::current_dir()?.canonicalize()?;
    let expanded = shellexpand::tilde(path_str).into_owned();
    let candidate = PathBuf::from(&expanded);
    let target = if candidate.is_absolute() {
        candidate
    } else {
        cwd.join(candidate)
    };
    let target = target.canonicalize().unwrap_or(target);

    if !target.exists() {
        renderer.display_error(&format!("File not found: {}", target.display()));
        return Ok(1);
    }
    if target.is_dir() {
        renderer.display_error(&format!(
            "{} is a directory. Use --read with files only.",
            target.display()
        ));
        return Ok(1);
    }

    let default_limit = config.context_settings.read_limit.unwrap_or(DEFAULT_READ_LIMIT);
    let default_bytes = config.context_settings.max_bytes.unwrap_or(MAX_READ_BYTES);
    let safe_offset = offset.unwrap_or(0);
    let safe_limit = limit.unwrap_or(default_limit).max(1);
    let safe_bytes = max_bytes.unwrap_or(default_bytes).max(1);

    let slice = read_file_slice(&target, safe_offset, safe_limit, safe_bytes);
    renderer.display_info(&format_file_slice_for_prompt(&slice, Some(&cwd)));

    if slice.truncated {
        let rel = target.strip_prefix(&cwd).unwrap_or(&target);
        renderer.display_info(&format!(
            "\nTo continue reading: ai --read {} --offset {} --limit {}",
            rel.display(),
            slice.last_line_read(),
            safe_limit
        ));
    }
    Ok(0)
}

/// First-run (or incomplete-config) interview: API key, default model, and
/// the dog-whistle phrase, persisted back to the JSON config.
fn bootstrap_config(renderer: &dyn Renderer, config: &mut Config) -> anyhow::Result<()> {
    let config_missing = !ai_config::config_path().exists();
    let initial_key = config.openai_api_key.trim().to_string();
    let initial_model = config.model.trim().to_string();
    let initial_dog = config.dog_whistle.trim().to_string();
    let mut key_value = initial_key.clone();
    let mut model_value = initial_model.clone();
    let mut dog_value = initial_dog.clone();

    if config_missing {
        renderer.display_info("Configuration file not found. Enter your OpenAI API key to set it up.");
    } else if key_value.is_empty() {
        renderer.display_info("OpenAI API key not found. Enter it to continue.");
    }

    if config_missing || key_value.is_empty() {
        let label = if key_value.is_empty() {
            "OpenAI API key: ".to_string()
        } else {
            "OpenAI API key (press Enter to keep detected value): ".to_string()
        };
        loop {
            let Some(entered) = renderer.prompt_text(&label) else {
                anyhow::bail!("API key input cancelled");
            };
            let entered = entered.trim().to_string();
            if !entered.is_empty() {
                key_value = entered;
                break;
            }
            if !key_value.is_empty() {
                break;
            }
            renderer.display_error("API key cannot be empty. Try again.");
        }
    }

    if config_missing || model_value.is_empty() {
        renderer.display_info("Default model controls which model is used for new sessions.");
        let label = if model_value.is_empty() {
            format!("Default model (Enter to use {DEFAULT_MODEL}): ")
        } else {
            format!("Default model (Enter to keep '{model_value}'): ")
        };
        if let Some(entered) = renderer.prompt_text(&label) {
            let chosen = entered.trim();
            if !chosen.is_empty() {
                model_value = chosen.to_string();
            }
        }
        if model_value.is_empty() {
            model_value = DEFAULT_MODEL.to_string();
        }
    }

    if config_missing || dog_value.is_empty() {
        renderer.display_info(
            "Choose your approval phrase (dog whistle). When you type it, mutating tools unlock \
             for the session. Until then the assistant can read files, glob directories, and \
             search the repo—just not change it.",
        );
        let label = if dog_value.is_empty() {
            format!("Dog whistle phrase (default '{DEFAULT_DOG_WHISTLE}'): ")
        } else {
            format!("Dog whistle phrase (Enter to keep '{dog_value}'): ")
        };
        let Some(entered) = renderer.prompt_text(&label) else {
            anyhow::bail!("Dog whistle input cancelled");
        };
        let entered = entered.trim();
        if !entered.is_empty() {
            dog_value = entered.to_string();
        } else if dog_value.is_empty() {
            dog_value = DEFAULT_DOG_WHISTLE.to_string();
        }
    }

    let changed = key_value != initial_key || model_value != initial_model || dog_value != initial_dog;
    config.openai_api_key = key_value;
    config.model = model_value;
    config.dog_whistle = dog_value;

    if config_missing || changed {
        match save_config(config) {
            Ok(path) => {
                if config_missing {
                    renderer.display_info(&format!("Configuration saved to {}.", path.display()));
                }
            }
            Err(e) => {
                renderer.display_error(&format!("Failed to update config: {e}"));
            }
        }
    }
    Ok(())
}

async fn interactive_session(
    renderer: &dyn Renderer,
    engine: &mut Engine,
) -> anyhow::Result<i32> {
    renderer.display_info(
        "Interactive session started. Type your instruction at the prompt (Ctrl+D to exit).",
    );

    loop {
        let Some(instruction) = renderer.prompt_follow_up() else {
            return Ok(0);
        };
        let instruction = instruction.trim().to_string();
        if instruction.is_empty() {
            renderer.display_info("Please provide an instruction or press Ctrl+D to exit.");
            continue;
        }
        if instruction == NEW_CONVERSATION_TOKEN {
            renderer.display_info("Starting fresh. Provide your instruction.");
            continue;
        }
        if let Some(command) = instruction.strip_prefix('!') {
            renderer.display_user_prompt(&instruction);
            let command = command.trim();
            if command.is_empty() {
                renderer.display_error("Shell command cannot be empty.");
                continue;
            }
            let _ = run_shell_command(renderer, command, None).await?;
            continue;
        }
        renderer.display_user_prompt(&instruction);
        return engine.run_conversation(&instruction, None, false).await;
    }
}

/// Edit mode mutates by definition, so it asks for the unlock phrase up
/// front instead of mid-conversation.
async fn run_edit_with_unlock(
    renderer: &dyn Renderer,
    engine: &mut Engine,
    path: &str,
    instruction: &str,
) -> anyhow::Result<i32> {
    let instruction = instruction.trim();
    if instruction.is_empty() {
        renderer.display_error("Provide an instruction for the edit.");
        return Ok(1);
    }

    let phrase = engine.dog_whistle().to_string();
    renderer.display_info(&format!(
        "Editing {path} will modify the file. Type `{phrase}` to approve."
    ));
    let approved = renderer
        .prompt_text("unlock> ")
        .is_some_and(|answer| answer.trim().eq_ignore_ascii_case(&phrase));
    if approved {
        engine.jfdi_enabled = true;
    }
    engine.run_edit(path, instruction, None).await
}

async fn run_upgrade(renderer: &dyn Renderer) -> anyhow::Result<i32> {
    let mut curl = match tokio::process::Command::new("curl")
        .args(["-fsSL", INSTALL_SH_URL])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            renderer.display_error("Upgrade requires curl");
            return Ok(1);
        }
        Err(e) => return Err(e).context("spawning curl"),
    };

    let curl_stdout: Stdio = curl
        .stdout
        .take()
        .context("curl stdout unavailable")?
        .try_into()
        .context("wiring curl stdout")?;
    let mut bash = match tokio::process::Command::new("bash")
        .args(["-s", "--", "-u"])
        .stdin(curl_stdout)
        .spawn()
    {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            renderer.display_error("Upgrade requires bash");
            let _ = curl.kill().await;
            return Ok(1);
        }
        Err(e) => return Err(e).context("spawning bash"),
    };

    let bash_status = bash.wait().await.context("waiting for bash")?;
    let curl_output = curl.wait_with_output().await.context("waiting for curl")?;
    if !curl_output.status.success() {
        let stderr = String::from_utf8_lossy(&curl_output.stderr);
        if !stderr.is_empty() {
            renderer.display_error(&stderr);
        }
        return Ok(curl_output.status.code().unwrap_or(1));
    }
    Ok(bash_status.code().unwrap_or(1))
}
