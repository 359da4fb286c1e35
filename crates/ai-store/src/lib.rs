// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Optional per-workspace transcript cache.
//!
//! One JSON file per workspace, keyed by the SHA-1 of the absolute workspace
//! path.  Loads are forgiving: any I/O or decode problem, and any payload
//! recorded for a different workspace path, yields an empty conversation.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::debug;

use ai_model::Item;
use ai_tools::PlanState;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Payload {
    path: String,
    items: Vec<Item>,
    #[serde(default)]
    plan: Option<PlanState>,
}

pub struct ConversationStore {
    workspace: PathBuf,
    file_path: Option<PathBuf>,
}

fn persistence_disabled() -> bool {
    std::env::var("AI_DISABLE_PERSISTENCE")
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn resolve_base_dir() -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(xdg) = std::env::var_os("XDG_STATE_HOME").filter(|v| !v.is_empty()) {
        candidates.push(PathBuf::from(xdg).join("ai").join("conversations"));
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".local/state/ai/conversations"));
        candidates.push(home.join(".ai/conversations"));
    }
    candidates
        .into_iter()
        .find(|dir| std::fs::create_dir_all(dir).is_ok())
}

impl ConversationStore {
    /// Open the store for `workspace` using the default base directory.
    /// Persistence silently disables itself when no base directory is
    /// writable or `AI_DISABLE_PERSISTENCE` is truthy.
    pub fn open(workspace: &Path) -> Self {
        let base = if persistence_disabled() {
            None
        } else {
            resolve_base_dir()
        };
        Self::build(workspace, base)
    }

    /// Open against an explicit base directory (tests).
    pub fn with_base_dir(workspace: &Path, base_dir: &Path) -> Self {
        let base = std::fs::create_dir_all(base_dir)
            .ok()
            .map(|_| base_dir.to_path_buf());
        Self::build(workspace, base)
    }

    fn build(workspace: &Path, base_dir: Option<PathBuf>) -> Self {
        let workspace = workspace
            .canonicalize()
            .unwrap_or_else(|_| workspace.to_path_buf());
        let file_path = base_dir.map(|base| {
            let digest = Sha1::digest(workspace.to_string_lossy().as_bytes());
            base.join(format!("{}.json", hex::encode(digest)))
        });
        Self {
            workspace,
            file_path,
        }
    }

    pub fn enabled(&self) -> bool {
        self.file_path.is_some()
    }

    /// Load the cached conversation.  Empty on any failure or mismatch.
    pub fn load(&self) -> (Vec<Item>, Option<PlanState>) {
        let Some(path) = &self.file_path else {
            return (Vec::new(), None);
        };
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(_) => return (Vec::new(), None),
        };
        let payload: Payload = match serde_json::from_str(&text) {
            Ok(p) => p,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "discarding unreadable conversation cache");
                return (Vec::new(), None);
            }
        };
        let recorded = PathBuf::from(&payload.path);
        let recorded = recorded.canonicalize().unwrap_or(recorded);
        if recorded != self.workspace {
            return (Vec::new(), None);
        }
        (payload.items, payload.plan)
    }

    /// Atomically persist the conversation (write-to-temp, rename).
    pub fn save(&self, items: &[Item], plan: Option<&PlanState>) -> anyhow::Result<()> {
        let Some(path) = &self.file_path else {
            return Ok(());
        };
        let payload = Payload {
            path: self.workspace.to_string_lossy().into_owned(),
            items: items.to_vec(),
            plan: plan.cloned(),
        };
        let text = serde_json::to_string(&payload).context("serializing conversation")?;
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, text)
            .with_context(|| format!("writing {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("renaming into {}", path.display()))?;
        Ok(())
    }

    /// Drop the cached conversation, if any.
    pub fn clear(&self) {
        if let Some(path) = &self.file_path {
            let _ = std::fs::remove_file(path);
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, tempfile::TempDir) {
        (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap())
    }

    #[test]
    fn save_then_load_round_trips() {
        let (workspace, base) = fixture();
        let store = ConversationStore::with_base_dir(workspace.path(), base.path());
        assert!(store.enabled());

        let items = vec![Item::user("hello"), Item::assistant("hi")];
        store.save(&items, None).unwrap();

        let (loaded, plan) = store.load();
        assert_eq!(loaded, items);
        assert!(plan.is_none());
    }

    #[test]
    fn plan_round_trips() {
        let (workspace, base) = fixture();
        let store = ConversationStore::with_base_dir(workspace.path(), base.path());
        let mut plan = PlanState::default();
        plan.summary = Some("outline".into());
        store.save(&[], Some(&plan)).unwrap();
        let (_, loaded) = store.load();
        assert_eq!(loaded.unwrap().summary.as_deref(), Some("outline"));
    }

    #[test]
    fn load_from_empty_store_is_empty() {
        let (workspace, base) = fixture();
        let store = ConversationStore::with_base_dir(workspace.path(), base.path());
        let (items, plan) = store.load();
        assert!(items.is_empty());
        assert!(plan.is_none());
    }

    #[test]
    fn corrupt_cache_loads_as_empty() {
        let (workspace, base) = fixture();
        let store = ConversationStore::with_base_dir(workspace.path(), base.path());
        store.save(&[Item::user("x")], None).unwrap();

        // Corrupt the file behind the store's back.
        let digest = Sha1::digest(
            workspace
                .path()
                .canonicalize()
                .unwrap()
                .to_string_lossy()
                .as_bytes(),
        );
        let file = base.path().join(format!("{}.json", hex::encode(digest)));
        std::fs::write(&file, "{broken").unwrap();

        let (items, _) = store.load();
        assert!(items.is_empty());
    }

    #[test]
    fn path_mismatch_loads_as_empty() {
        let (workspace_a, base) = fixture();
        let workspace_b = tempfile::tempdir().unwrap();

        let store_a = ConversationStore::with_base_dir(workspace_a.path(), base.path());
        store_a.save(&[Item::user("secret")], None).unwrap();

        // Copy A's cache file onto B's key to simulate a stale/foreign entry.
        let key = |ws: &Path| {
            let canonical = ws.canonicalize().unwrap();
            hex::encode(Sha1::digest(canonical.to_string_lossy().as_bytes()))
        };
        let from = base.path().join(format!("{}.json", key(workspace_a.path())));
        let to = base.path().join(format!("{}.json", key(workspace_b.path())));
        std::fs::copy(&from, &to).unwrap();

        let store_b = ConversationStore::with_base_dir(workspace_b.path(), base.path());
        let (items, _) = store_b.load();
        assert!(items.is_empty(), "foreign payload must not load");
    }

    #[test]
    fn clear_removes_the_cache() {
        let (workspace, base) = fixture();
        let store = ConversationStore::with_base_dir(workspace.path(), base.path());
        store.save(&[Item::user("x")], None).unwrap();
        store.clear();
        let (items, _) = store.load();
        assert!(items.is_empty());
    }

    #[test]
    fn distinct_workspaces_use_distinct_files() {
        let (workspace_a, base) = fixture();
        let workspace_b = tempfile::tempdir().unwrap();
        let store_a = ConversationStore::with_base_dir(workspace_a.path(), base.path());
        let store_b = ConversationStore::with_base_dir(workspace_b.path(), base.path());
        store_a.save(&[Item::user("a")], None).unwrap();
        store_b.save(&[Item::user("b")], None).unwrap();
        assert_eq!(store_a.load().0[0].as_user_text().as_deref(), Some("a"));
        assert_eq!(store_b.load().0[0].as_user_text().as_deref(), Some("b"));
    }
}
