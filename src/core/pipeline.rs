//! Processing pipeline: the per-note state machine.
//!
//! `pending -> processing -> {completed | error}`, plus `error ->
//! processing` on explicit retry. The `processing` status is persisted to
//! the local store *before* any network call, so the persisted status is
//! the at-most-one-in-flight guard: the scheduler only selects notes whose
//! stored status is pending, and that flips before the first await on the
//! network yields control.
//!
//! Pipeline failures are always caught, recorded on the note, and
//! persisted. `process` never returns with the note still in `processing`.

use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use crate::adapters::{FileStorage, RemoteStore, Transcriber, TranscriptionRequest};
use crate::domain::{
    ActionItem, AudioBlob, Note, NoteStatus, ACTIONS_TEMPLATE_ID, NO_SPEECH_SENTINEL,
};
use crate::store::LocalStore;

use super::actions::extract_actions;

/// How one attempt failed
enum AttemptError {
    /// The backend was unreachable; the note goes back to pending so the
    /// network-restored drain retries it
    Offline(String),

    /// Terminal for this attempt; the note becomes error with this message
    Failed(String),
}

/// Drives one note through transcription/summarization and writes the
/// result back to the local store.
pub struct Processor {
    store: Arc<LocalStore>,
    remote: Arc<dyn RemoteStore>,
    transcriber: Arc<dyn Transcriber>,
    backup_storage: Option<Arc<dyn FileStorage>>,
}

impl Processor {
    pub fn new(
        store: Arc<LocalStore>,
        remote: Arc<dyn RemoteStore>,
        transcriber: Arc<dyn Transcriber>,
        backup_storage: Option<Arc<dyn FileStorage>>,
    ) -> Self {
        Self {
            store,
            remote,
            transcriber,
            backup_storage,
        }
    }

    /// Create and persist a new pending note. If a note with the same
    /// audio fingerprint already exists, it is returned instead of
    /// creating a duplicate.
    #[instrument(skip(self, audio), fields(template = template_id))]
    pub async fn capture(
        &self,
        audio: AudioBlob,
        duration_seconds: f64,
        template_id: &str,
    ) -> Result<Note> {
        let fingerprint = audio_fingerprint(&audio.data);

        if let Some(existing) = self.store.find_note_by_fingerprint(&fingerprint).await {
            info!(note_id = %existing.id, "audio already captured, skipping duplicate");
            return Ok(existing);
        }

        let mut note = Note::new(audio, duration_seconds, template_id);
        note.fingerprint = Some(fingerprint);
        self.store.save_note(&note).await;

        info!(note_id = %note.id, "captured note");
        Ok(note)
    }

    /// Process one note to a terminal state for this attempt.
    ///
    /// A note already `processing` or `completed` is returned untouched;
    /// only the persisted status decides, so overlapping calls cannot
    /// double-submit.
    #[instrument(skip(self))]
    pub async fn process(&self, note_id: &str) -> Result<Note> {
        let mut note = self
            .store
            .get_note(note_id)
            .await
            .with_context(|| format!("note not found: {}", note_id))?;

        // Rejects notes already in flight (at-most-one guard) and
        // completed notes
        if !note.status.can_transition_to(NoteStatus::Processing) {
            info!(status = %note.status, "note not eligible for processing, skipping");
            return Ok(note);
        }

        // Persisted before any network call: this write is the in-flight
        // guard.
        note.status = NoteStatus::Processing;
        note.error_message = None;
        self.store.save_note(&note).await;

        match self.attempt(&mut note).await {
            Ok(()) => {
                // A completed note always has a transcript
                if note
                    .transcript
                    .as_deref()
                    .map(|t| t.trim().is_empty())
                    .unwrap_or(true)
                {
                    note.transcript = Some(NO_SPEECH_SENTINEL.to_string());
                }
                if note.word_count.is_none() {
                    note.word_count = note
                        .transcript
                        .as_deref()
                        .map(|t| t.split_whitespace().count() as u32);
                }
                note.status = NoteStatus::Completed;
                info!(note_id = %note.id, "note completed");
            }
            Err(AttemptError::Offline(cause)) => {
                note.status = NoteStatus::Pending;
                warn!(note_id = %note.id, %cause, "backend unreachable, note stays queued");
            }
            Err(AttemptError::Failed(cause)) => {
                note.status = NoteStatus::Error;
                note.error_message = Some(cause.clone());
                warn!(note_id = %note.id, %cause, "processing failed");
            }
        }

        self.store.save_note(&note).await;

        if note.status == NoteStatus::Completed {
            self.extract_note_actions(&note).await;
        }

        Ok(note)
    }

    /// Explicit user-triggered retry; legal only from error (or pending)
    pub async fn retry(&self, note_id: &str) -> Result<Note> {
        let note = self
            .store
            .get_note(note_id)
            .await
            .with_context(|| format!("note not found: {}", note_id))?;

        anyhow::ensure!(
            matches!(note.status, NoteStatus::Error | NoteStatus::Pending),
            "note {} is {} and cannot be retried",
            note_id,
            note.status
        );

        self.process(note_id).await
    }

    /// Delete a note everywhere: local store, remote (if synced), and any
    /// external-backup artifacts. The remote and backup halves are
    /// best-effort; the local removal always happens.
    #[instrument(skip(self))]
    pub async fn delete(&self, note_id: &str) -> Result<()> {
        let note = self
            .store
            .get_note(note_id)
            .await
            .with_context(|| format!("note not found: {}", note_id))?;

        if note.synced_to_remote && self.remote.enabled() {
            if let Err(e) = self.remote.delete_note(note_id).await {
                warn!(note_id, error = %e, "remote delete failed, removing locally anyway");
            }
        }

        if let Some(storage) = &self.backup_storage {
            for file_ref in [&note.backup_audio_ref, &note.backup_transcript_ref]
                .into_iter()
                .flatten()
            {
                if let Err(e) = storage.delete_file(file_ref).await {
                    warn!(note_id, file_ref, error = %e, "backup artifact delete failed");
                }
            }
        }

        self.store.delete_note(note_id).await;
        info!(note_id, "note deleted");
        Ok(())
    }

    /// One transcription attempt, remote or local depending on
    /// configuration. Mutates `note`'s text fields on success only.
    async fn attempt(&self, note: &mut Note) -> Result<(), AttemptError> {
        if self.remote.enabled() {
            // First submission uploads; a note the server already holds goes
            // through the server-side retry endpoint instead
            let submission = if note.synced_to_remote {
                self.remote.retry(&note.id, &note.template_id).await
            } else {
                self.remote.upload_and_process(note).await
            };

            match submission {
                Ok(enriched) => {
                    note.transcript = enriched.transcript;
                    note.summary = enriched.summary;
                    note.title = enriched.title;
                    note.word_count = enriched.word_count;
                    note.audio_url = enriched.audio_url;
                    note.synced_to_remote = true;
                    Ok(())
                }
                Err(e) if e.is_offline() => Err(AttemptError::Offline(e.to_string())),
                Err(e) => Err(AttemptError::Failed(e.to_string())),
            }
        } else {
            let audio = note
                .audio
                .as_ref()
                .ok_or_else(|| AttemptError::Failed("note has no local audio".to_string()))?;

            let instructions = self
                .store
                .get_template(&note.template_id)
                .await
                .map(|t| t.instructions)
                .filter(|i| !i.trim().is_empty());

            let outcome = self
                .transcriber
                .transcribe(TranscriptionRequest {
                    audio: audio.data.clone(),
                    mime_type: audio.mime_type.clone(),
                    instructions,
                })
                .await
                .map_err(|e| AttemptError::Failed(e.to_string()))?;

            note.transcript = Some(outcome.transcript);
            note.summary = outcome.summary;
            note.title = outcome.title;
            Ok(())
        }
    }

    /// Side effect on completion with the action-items template: scan the
    /// summary and append extracted actions. Best-effort, never fails.
    async fn extract_note_actions(&self, note: &Note) {
        if note.template_id != ACTIONS_TEMPLATE_ID {
            return;
        }
        let Some(summary) = note.summary.as_deref() else {
            return;
        };

        let actions = extract_actions(summary);
        if actions.is_empty() {
            return;
        }

        info!(note_id = %note.id, count = actions.len(), "extracted action items");
        for text in actions {
            self.store.add_action(&ActionItem::new(&note.id, text)).await;
        }
    }
}

/// SHA256 of the audio content, first 12 hex chars. Used to skip
/// re-capturing the same recording.
pub fn audio_fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    format!("{:x}", digest)[..12].to_string()
}
