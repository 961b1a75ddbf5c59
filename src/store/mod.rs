//! Local durable store: keyed JSON collections with an in-memory fallback.
//!
//! The single source of truth for anything created on-device. Notes,
//! templates, and action items are each persisted as one JSON file in the
//! store directory and loaded whole at open; every mutation is written
//! through.
//!
//! If the directory cannot be created or read at open, the store logs one
//! warning and adopts a plain in-memory map with identical semantics but no
//! durability. After initialization no operation fails for "storage
//! unavailable": write-through errors are logged and swallowed, and the
//! in-memory state stays authoritative for the session.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::warn;

use crate::domain::{ActionItem, Note, Template};

const NOTES_FILE: &str = "notes.json";
const TEMPLATES_FILE: &str = "templates.json";
const ACTIONS_FILE: &str = "actions.json";

/// Domain-level store refusals. Storage failures are never surfaced here.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("template '{0}' is built-in and cannot be deleted")]
    ReservedTemplate(String),
}

#[derive(Debug)]
enum Backing {
    /// JSON files under this directory
    Dir(PathBuf),

    /// No durability; adopted when the directory is unusable
    Memory,
}

#[derive(Debug, Default)]
struct State {
    notes: HashMap<String, Note>,
    templates: HashMap<String, Template>,
    actions: HashMap<String, ActionItem>,
}

/// Keyed persistent store for notes, templates, and action items
pub struct LocalStore {
    backing: Backing,
    state: Mutex<State>,
}

impl LocalStore {
    /// Open the store at `dir`, falling back to in-memory if the directory
    /// is unusable. Built-in templates are seeded either way. Never fails.
    pub async fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();

        let store = match Self::load_dir(&dir).await {
            Ok(state) => Self {
                backing: Backing::Dir(dir),
                state: Mutex::new(state),
            },
            Err(e) => {
                warn!(
                    path = %dir.display(),
                    error = %e,
                    "local storage unavailable, falling back to in-memory store"
                );
                Self {
                    backing: Backing::Memory,
                    state: Mutex::new(State::default()),
                }
            }
        };

        store.seed_builtin_templates().await;
        store
    }

    /// A store with no durability across restarts
    pub async fn open_in_memory() -> Self {
        let store = Self {
            backing: Backing::Memory,
            state: Mutex::new(State::default()),
        };
        store.seed_builtin_templates().await;
        store
    }

    /// Whether the in-memory fallback is active
    pub fn is_memory(&self) -> bool {
        matches!(self.backing, Backing::Memory)
    }

    async fn load_dir(dir: &Path) -> Result<State> {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create store directory: {}", dir.display()))?;

        // Reject a path that exists but is not a directory
        let meta = fs::metadata(dir)
            .await
            .with_context(|| format!("Failed to stat store directory: {}", dir.display()))?;
        if !meta.is_dir() {
            anyhow::bail!("store path is not a directory: {}", dir.display());
        }

        Ok(State {
            notes: load_collection(&dir.join(NOTES_FILE), |n: &Note| n.id.clone()).await?,
            templates: load_collection(&dir.join(TEMPLATES_FILE), |t: &Template| t.id.clone())
                .await?,
            actions: load_collection(&dir.join(ACTIONS_FILE), |a: &ActionItem| a.id.clone())
                .await?,
        })
    }

    async fn seed_builtin_templates(&self) {
        let mut state = self.state.lock().await;
        let mut changed = false;

        for template in Template::builtins() {
            if !state.templates.contains_key(&template.id) {
                state.templates.insert(template.id.clone(), template);
                changed = true;
            }
        }

        if changed {
            self.persist_templates(&state).await;
        }
    }

    // ------------------------------------------------------------------
    // Notes
    // ------------------------------------------------------------------

    /// Upsert a note by id
    pub async fn save_note(&self, note: &Note) {
        let mut state = self.state.lock().await;
        state.notes.insert(note.id.clone(), note.clone());
        self.persist_notes(&state).await;
    }

    pub async fn get_note(&self, id: &str) -> Option<Note> {
        self.state.lock().await.notes.get(id).cloned()
    }

    /// All notes sorted by created_at descending
    pub async fn all_notes(&self) -> Vec<Note> {
        let state = self.state.lock().await;
        let mut notes: Vec<Note> = state.notes.values().cloned().collect();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        notes
    }

    /// Find a note by audio fingerprint (duplicate-capture check)
    pub async fn find_note_by_fingerprint(&self, fingerprint: &str) -> Option<Note> {
        let state = self.state.lock().await;
        state
            .notes
            .values()
            .find(|n| n.fingerprint.as_deref() == Some(fingerprint))
            .cloned()
    }

    /// Returns true if the note existed
    pub async fn delete_note(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        let removed = state.notes.remove(id).is_some();
        if removed {
            self.persist_notes(&state).await;
        }
        removed
    }

    // ------------------------------------------------------------------
    // Templates
    // ------------------------------------------------------------------

    pub async fn save_template(&self, template: &Template) {
        let mut state = self.state.lock().await;
        state.templates.insert(template.id.clone(), template.clone());
        self.persist_templates(&state).await;
    }

    pub async fn get_template(&self, id: &str) -> Option<Template> {
        self.state.lock().await.templates.get(id).cloned()
    }

    /// All templates, built-ins first, then alphabetical by name
    pub async fn all_templates(&self) -> Vec<Template> {
        let state = self.state.lock().await;
        let mut templates: Vec<Template> = state.templates.values().cloned().collect();
        templates.sort_by(|a, b| {
            let a_builtin = Template::builtins().iter().any(|t| t.id == a.id);
            let b_builtin = Template::builtins().iter().any(|t| t.id == b.id);
            b_builtin.cmp(&a_builtin).then_with(|| a.name.cmp(&b.name))
        });
        templates
    }

    /// Delete a template. Refuses the reserved "raw" template.
    pub async fn delete_template(&self, id: &str) -> Result<bool, StoreError> {
        if Template::is_reserved(id) {
            return Err(StoreError::ReservedTemplate(id.to_string()));
        }

        let mut state = self.state.lock().await;
        let removed = state.templates.remove(id).is_some();
        if removed {
            self.persist_templates(&state).await;
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Action items
    // ------------------------------------------------------------------

    pub async fn add_action(&self, action: &ActionItem) {
        let mut state = self.state.lock().await;
        state.actions.insert(action.id.clone(), action.clone());
        self.persist_actions(&state).await;
    }

    /// All action items, newest first
    pub async fn all_actions(&self) -> Vec<ActionItem> {
        let state = self.state.lock().await;
        let mut actions: Vec<ActionItem> = state.actions.values().cloned().collect();
        actions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        actions
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    async fn persist_notes(&self, state: &State) {
        let mut notes: Vec<&Note> = state.notes.values().collect();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.write_collection(NOTES_FILE, &notes).await;
    }

    async fn persist_templates(&self, state: &State) {
        let mut templates: Vec<&Template> = state.templates.values().collect();
        templates.sort_by(|a, b| a.id.cmp(&b.id));
        self.write_collection(TEMPLATES_FILE, &templates).await;
    }

    async fn persist_actions(&self, state: &State) {
        let mut actions: Vec<&ActionItem> = state.actions.values().collect();
        actions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.write_collection(ACTIONS_FILE, &actions).await;
    }

    /// Write one collection file. Errors are logged, never propagated: the
    /// in-memory state remains authoritative for this session.
    async fn write_collection<T: Serialize>(&self, file_name: &str, items: &[T]) {
        let Backing::Dir(dir) = &self.backing else {
            return;
        };

        let path = dir.join(file_name);
        let json = match serde_json::to_string_pretty(items) {
            Ok(json) => json,
            Err(e) => {
                warn!(file = file_name, error = %e, "failed to serialize collection");
                return;
            }
        };

        if let Err(e) = fs::write(&path, json).await {
            warn!(path = %path.display(), error = %e, "failed to write collection");
        }
    }
}

/// Load a collection file into a keyed map; a missing file is an empty
/// collection, a corrupt file is an open error (triggers the fallback).
async fn load_collection<T, F>(path: &Path, key: F) -> Result<HashMap<String, T>>
where
    T: DeserializeOwned,
    F: Fn(&T) -> String,
{
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read collection: {}", path.display()))?;

    let items: Vec<T> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse collection: {}", path.display()))?;

    Ok(items.into_iter().map(|item| (key(&item), item)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AudioBlob, NoteStatus, RAW_TEMPLATE_ID};
    use tempfile::TempDir;

    fn test_note() -> Note {
        Note::new(
            AudioBlob {
                mime_type: "audio/mp4".to_string(),
                data: b"fake audio content".to_vec(),
            },
            3.0,
            RAW_TEMPLATE_ID,
        )
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let temp = TempDir::new().unwrap();
        let note = test_note();

        {
            let store = LocalStore::open(temp.path()).await;
            store.save_note(&note).await;
        }

        // A fresh store over the same directory sees the note
        let store = LocalStore::open(temp.path()).await;
        let loaded = store.get_note(&note.id).await.unwrap();
        assert_eq!(loaded.id, note.id);
        assert_eq!(loaded.status, NoteStatus::Pending);
        assert_eq!(loaded.audio.unwrap().data, b"fake audio content");
    }

    #[tokio::test]
    async fn test_save_is_upsert() {
        let store = LocalStore::open_in_memory().await;
        let mut note = test_note();

        store.save_note(&note).await;
        note.status = NoteStatus::Processing;
        store.save_note(&note).await;

        assert_eq!(store.all_notes().await.len(), 1);
        assert_eq!(
            store.get_note(&note.id).await.unwrap().status,
            NoteStatus::Processing
        );
    }

    #[tokio::test]
    async fn test_all_notes_sorted_descending() {
        let store = LocalStore::open_in_memory().await;

        let mut older = test_note();
        older.created_at = "2026-08-01T00:00:00Z".parse().unwrap();
        let mut newer = test_note();
        newer.created_at = "2026-08-20T00:00:00Z".parse().unwrap();

        store.save_note(&older).await;
        store.save_note(&newer).await;

        let notes = store.all_notes().await;
        assert_eq!(notes[0].id, newer.id);
        assert_eq!(notes[1].id, older.id);
    }

    #[tokio::test]
    async fn test_fallback_when_path_is_a_file() {
        let temp = TempDir::new().unwrap();
        let bogus = temp.path().join("not-a-dir");
        tokio::fs::write(&bogus, b"occupied").await.unwrap();

        let store = LocalStore::open(&bogus).await;
        assert!(store.is_memory());

        // Identical semantics after the fallback
        let note = test_note();
        store.save_note(&note).await;
        assert!(store.get_note(&note.id).await.is_some());
        assert!(store.delete_note(&note.id).await);
    }

    #[tokio::test]
    async fn test_builtin_templates_seeded() {
        let store = LocalStore::open_in_memory().await;
        assert!(store.get_template(RAW_TEMPLATE_ID).await.is_some());
        assert!(store.get_template("summary").await.is_some());
        assert!(store.get_template("actions").await.is_some());
    }

    #[tokio::test]
    async fn test_raw_template_is_undeletable() {
        let store = LocalStore::open_in_memory().await;

        let err = store.delete_template(RAW_TEMPLATE_ID).await.unwrap_err();
        assert!(matches!(err, StoreError::ReservedTemplate(_)));
        assert!(store.get_template(RAW_TEMPLATE_ID).await.is_some());

        // Other built-ins can go
        assert!(store.delete_template("summary").await.unwrap());
    }

    #[tokio::test]
    async fn test_find_by_fingerprint() {
        let store = LocalStore::open_in_memory().await;
        let mut note = test_note();
        note.fingerprint = Some("abc123".to_string());
        store.save_note(&note).await;

        assert!(store.find_note_by_fingerprint("abc123").await.is_some());
        assert!(store.find_note_by_fingerprint("zzz").await.is_none());
    }
}
