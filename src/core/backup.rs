//! External-backup reconciler: mirrors completed notes into a user-owned
//! file store (Google Drive in production).
//!
//! Idempotency comes from persisted file references, not from listing the
//! remote side: a half (audio or transcript) is uploaded only while its
//! ref on the note is still empty, and each ref is written back to the
//! store immediately after its upload succeeds. A crash between the two
//! halves leaves one ref set, and the next pass uploads only the missing
//! half. Backup never touches the processing status.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::adapters::FileStorage;
use crate::domain::{Note, NoteStatus};
use crate::store::LocalStore;

/// What one backup pass actually uploaded. Both false means the note was
/// already fully mirrored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackupReport {
    pub audio_uploaded: bool,
    pub transcript_uploaded: bool,
}

/// Mirrors completed notes into external file storage, bucketed into one
/// folder per capture month.
pub struct BackupReconciler {
    store: Arc<LocalStore>,
    storage: Arc<dyn FileStorage>,
}

impl BackupReconciler {
    pub fn new(store: Arc<LocalStore>, storage: Arc<dyn FileStorage>) -> Self {
        Self { store, storage }
    }

    /// Back up one note's audio and transcript. Safe to call repeatedly;
    /// already-mirrored halves are skipped.
    #[instrument(skip(self))]
    pub async fn backup(&self, note_id: &str) -> Result<BackupReport> {
        let mut note = self
            .store
            .get_note(note_id)
            .await
            .with_context(|| format!("note not found: {}", note_id))?;

        anyhow::ensure!(
            note.status == NoteStatus::Completed,
            "note {} is {} and only completed notes are backed up",
            note_id,
            note.status
        );

        let mut report = BackupReport::default();
        if note.backup_audio_ref.is_some() && note.backup_transcript_ref.is_some() {
            return Ok(report);
        }

        let folder_id = self
            .storage
            .ensure_folder(&note.month_bucket())
            .await
            .context("ensuring backup folder")?;

        if note.backup_audio_ref.is_none() {
            if let Some(audio) = &note.audio {
                let file_name = format!("{}.{}", note.id, ext_for(&audio.mime_type));
                let file_id = self
                    .storage
                    .upload(&folder_id, &file_name, &audio.mime_type, audio.data.clone())
                    .await
                    .context("uploading audio")?;

                // Persist the ref before attempting the other half so a
                // failure there doesn't cause a re-upload later
                note.backup_audio_ref = Some(file_id);
                self.store.save_note(&note).await;
                report.audio_uploaded = true;
                info!(note_id = %note.id, "audio backed up");
            } else {
                warn!(note_id = %note.id, "no local audio bytes, skipping audio backup");
            }
        }

        if note.backup_transcript_ref.is_none() {
            let file_name = format!("{}.txt", note.id);
            let body = render_transcript(&note);
            let file_id = self
                .storage
                .upload(&folder_id, &file_name, "text/plain", body.into_bytes())
                .await
                .context("uploading transcript")?;

            note.backup_transcript_ref = Some(file_id);
            self.store.save_note(&note).await;
            report.transcript_uploaded = true;
            info!(note_id = %note.id, "transcript backed up");
        }

        Ok(report)
    }
}

/// Plain-text rendering of a note for the backup file: a small header
/// block, the transcript, and the summary when there is one.
fn render_transcript(note: &Note) -> String {
    let mut out = String::new();

    if let Some(title) = note.title.as_deref() {
        out.push_str(title);
        out.push('\n');
    }
    out.push_str(&format!(
        "Captured: {}\n",
        note.created_at.format("%Y-%m-%d %H:%M UTC")
    ));
    out.push_str(&format!("Duration: {:.0}s\n", note.duration_seconds));
    out.push_str(&format!("Template: {}\n\n", note.template_id));

    if let Some(transcript) = note.transcript.as_deref() {
        out.push_str(transcript);
        out.push('\n');
    }

    if let Some(summary) = note.summary.as_deref() {
        out.push_str("\n## Summary\n\n");
        out.push_str(summary);
        out.push('\n');
    }

    out
}

fn ext_for(mime_type: &str) -> &'static str {
    match mime_type {
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
        "audio/webm" => "webm",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/ogg" => "ogg",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AudioBlob;

    fn completed_note() -> Note {
        let mut note = Note::new(
            AudioBlob {
                mime_type: "audio/webm".to_string(),
                data: vec![1, 2, 3],
            },
            4.2,
            "raw",
        );
        note.status = NoteStatus::Completed;
        note.title = Some("Standup notes".to_string());
        note.transcript = Some("we shipped the thing".to_string());
        note
    }

    #[test]
    fn test_render_has_header_and_transcript() {
        let body = render_transcript(&completed_note());
        assert!(body.starts_with("Standup notes\n"));
        assert!(body.contains("Duration: 4s"));
        assert!(body.contains("we shipped the thing"));
        assert!(!body.contains("## Summary"));
    }

    #[test]
    fn test_render_includes_summary_when_present() {
        let mut note = completed_note();
        note.summary = Some("shipped it".to_string());
        let body = render_transcript(&note);
        assert!(body.contains("## Summary\n\nshipped it"));
    }

    #[test]
    fn test_extension_mapping() {
        assert_eq!(ext_for("audio/mp4"), "m4a");
        assert_eq!(ext_for("audio/webm"), "webm");
        assert_eq!(ext_for("audio/mpeg"), "mp3");
        assert_eq!(ext_for("application/octet-stream"), "bin");
    }
}
