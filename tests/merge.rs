//! Tests for local/remote reconciliation of the note list.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use voxsync::adapters::{RemoteError, RemoteStore};
use voxsync::core::Reconciler;
use voxsync::domain::{AudioBlob, Note, NoteStatus, Template};
use voxsync::store::LocalStore;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Remote with a scripted note/template list, or a scripted listing failure
struct ScriptedRemote {
    notes: Vec<Note>,
    templates: Vec<Template>,
    fail_listing: bool,
}

impl ScriptedRemote {
    fn with_notes(notes: Vec<Note>) -> Arc<Self> {
        Arc::new(Self {
            notes,
            templates: Vec::new(),
            fail_listing: false,
        })
    }

    fn broken() -> Arc<Self> {
        Arc::new(Self {
            notes: Vec::new(),
            templates: Vec::new(),
            fail_listing: true,
        })
    }
}

#[async_trait]
impl RemoteStore for ScriptedRemote {
    fn enabled(&self) -> bool {
        true
    }

    async fn list_notes(&self) -> Result<Vec<Note>, RemoteError> {
        if self.fail_listing {
            return Err(RemoteError::Offline("no route to host".to_string()));
        }
        Ok(self.notes.clone())
    }

    async fn list_templates(&self) -> Result<Vec<Template>, RemoteError> {
        if self.fail_listing {
            return Err(RemoteError::Offline("no route to host".to_string()));
        }
        Ok(self.templates.clone())
    }

    async fn upload_and_process(&self, _note: &Note) -> Result<Note, RemoteError> {
        Err(RemoteError::Api {
            status: 501,
            message: "not scripted".to_string(),
        })
    }

    async fn retry(&self, _note_id: &str, _template_id: &str) -> Result<Note, RemoteError> {
        Err(RemoteError::Api {
            status: 501,
            message: "not scripted".to_string(),
        })
    }

    async fn delete_note(&self, _note_id: &str) -> Result<(), RemoteError> {
        Ok(())
    }
}

fn audio(bytes: &[u8]) -> AudioBlob {
    AudioBlob {
        mime_type: "audio/webm".to_string(),
        data: bytes.to_vec(),
    }
}

/// A remote-side record: no audio bytes, server-computed text
fn remote_counterpart(local: &Note) -> Note {
    let mut remote = local.clone();
    remote.audio = None;
    remote
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_local_only_note_survives_merge_intact() {
    let store = Arc::new(LocalStore::open_in_memory().await);
    let note = Note::new(audio(b"m1"), 2.0, "raw");
    store.save_note(&note).await;

    let reconciler = Reconciler::new(store.clone(), ScriptedRemote::with_notes(Vec::new()));
    let merged = reconciler.merge().await;

    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].id, note.id);
    assert!(merged[0].audio.is_some());
    assert!(!merged[0].synced_to_remote);
}

#[tokio::test]
async fn test_local_text_wins_but_remote_fills_gaps() {
    let store = Arc::new(LocalStore::open_in_memory().await);

    let mut local = Note::new(audio(b"m2"), 2.0, "summary");
    local.status = NoteStatus::Completed;
    local.transcript = Some("local transcript".to_string());
    local.synced_to_remote = true;
    store.save_note(&local).await;

    let mut remote = remote_counterpart(&local);
    remote.transcript = Some("remote transcript".to_string());
    remote.summary = Some("remote summary".to_string());
    remote.audio_url = Some("https://cdn.example.com/m2.webm".to_string());

    let reconciler = Reconciler::new(store.clone(), ScriptedRemote::with_notes(vec![remote]));
    let merged = reconciler.merge().await;

    assert_eq!(merged.len(), 1);
    // Local transcript takes precedence; the summary only exists remotely
    assert_eq!(merged[0].transcript.as_deref(), Some("local transcript"));
    assert_eq!(merged[0].summary.as_deref(), Some("remote summary"));
    // The serving URL is remote-owned
    assert_eq!(
        merged[0].audio_url.as_deref(),
        Some("https://cdn.example.com/m2.webm")
    );
    // Audio bytes never come from the remote
    assert!(merged[0].audio.is_some());
}

#[tokio::test]
async fn test_remote_only_note_appears_in_the_list() {
    let store = Arc::new(LocalStore::open_in_memory().await);

    let mut remote = Note::new(audio(b"m3"), 3.0, "raw");
    remote.audio = None;
    remote.transcript = Some("captured on another device".to_string());

    let reconciler =
        Reconciler::new(store.clone(), ScriptedRemote::with_notes(vec![remote.clone()]));
    let merged = reconciler.merge().await;

    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].id, remote.id);
}

#[tokio::test]
async fn test_remote_ids_pass_through_verbatim() {
    let store = Arc::new(LocalStore::open_in_memory().await);

    // Backend-assigned ids are opaque; nothing may assume UUID shape
    let mut remote = Note::new(audio(b"m3b"), 1.0, "raw");
    remote.id = "n7".to_string();
    remote.audio = None;

    let reconciler = Reconciler::new(store.clone(), ScriptedRemote::with_notes(vec![remote]));
    let merged = reconciler.merge().await;

    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].id, "n7");
}

#[tokio::test]
async fn test_listing_failure_degrades_to_local_view() {
    let store = Arc::new(LocalStore::open_in_memory().await);
    let note = Note::new(audio(b"m4"), 1.0, "raw");
    store.save_note(&note).await;

    let reconciler = Reconciler::new(store.clone(), ScriptedRemote::broken());
    let merged = reconciler.merge().await;

    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].id, note.id);
}

#[tokio::test]
async fn test_merged_list_is_newest_first() {
    let store = Arc::new(LocalStore::open_in_memory().await);

    let mut older = Note::new(audio(b"m5"), 1.0, "raw");
    older.created_at = Utc::now() - Duration::hours(2);
    let mut newer = Note::new(audio(b"m6"), 1.0, "raw");
    newer.created_at = Utc::now() - Duration::minutes(5);
    store.save_note(&older).await;
    store.save_note(&newer).await;

    let mut remote_only = Note::new(audio(b"m7"), 1.0, "raw");
    remote_only.audio = None;
    remote_only.created_at = Utc::now() - Duration::hours(1);

    let reconciler = Reconciler::new(store.clone(), ScriptedRemote::with_notes(vec![remote_only]));
    let merged = reconciler.merge().await;

    let times: Vec<_> = merged.iter().map(|n| n.created_at).collect();
    let mut sorted = times.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(times, sorted);
    assert_eq!(merged.len(), 3);
}

#[tokio::test]
async fn test_template_sync_skips_the_builtin_raw() {
    let store = Arc::new(LocalStore::open_in_memory().await);

    let remote = Arc::new(ScriptedRemote {
        notes: Vec::new(),
        templates: vec![
            Template {
                id: "raw".to_string(),
                name: "Hijacked".to_string(),
                instructions: "evil".to_string(),
            },
            Template {
                id: "meeting".to_string(),
                name: "Meeting notes".to_string(),
                instructions: "Summarize the meeting".to_string(),
            },
        ],
        fail_listing: false,
    });

    let reconciler = Reconciler::new(store.clone(), remote);
    let count = reconciler.sync_templates().await;

    assert_eq!(count, 1);
    let raw = store.get_template("raw").await.unwrap();
    assert_ne!(raw.name, "Hijacked");
    assert!(store.get_template("meeting").await.is_some());
}
