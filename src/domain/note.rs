//! The central Note entity and its lifecycle status.
//!
//! A note is created at capture time and transitions through the
//! processing state machine. The local store is the only place the raw
//! audio bytes live; the remote representation carries a URL instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transcript written when the AI service hears nothing. A completed note
/// always has a non-null transcript, this sentinel included.
pub const NO_SPEECH_SENTINEL: &str = "no speech detected";

/// Lifecycle status of a note.
///
/// Legal transitions: `Pending -> Processing`, `Processing -> Completed`,
/// `Processing -> Error`, and `Error -> Processing` (explicit retry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStatus {
    /// Captured but not yet submitted (offline queue)
    Pending,

    /// Submission persisted; a transcription attempt is in flight
    Processing,

    /// Transcription (and summarization, if requested) succeeded
    Completed,

    /// The attempt failed; `error_message` carries the cause
    Error,
}

impl NoteStatus {
    /// Whether `next` is a legal transition from this status.
    ///
    /// `Processing -> Pending` is the requeue edge: an offline-shaped
    /// failure mid-attempt, or startup recovery of a note a crashed
    /// session left in flight. `Completed` is terminal.
    pub fn can_transition_to(self, next: NoteStatus) -> bool {
        matches!(
            (self, next),
            (NoteStatus::Pending, NoteStatus::Processing)
                | (NoteStatus::Processing, NoteStatus::Completed)
                | (NoteStatus::Processing, NoteStatus::Error)
                | (NoteStatus::Processing, NoteStatus::Pending)
                | (NoteStatus::Error, NoteStatus::Processing)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NoteStatus::Pending => "pending",
            NoteStatus::Processing => "processing",
            NoteStatus::Completed => "completed",
            NoteStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for NoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw captured audio. Owned exclusively by the local store; never part of
/// the remote representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioBlob {
    /// MIME type of the recording (e.g. "audio/mp4")
    pub mime_type: String,

    /// Raw bytes, base64 in the persisted JSON
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// One captured recording plus its derived text artifacts and status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    /// Opaque unique id, assigned at capture, stable for the note's
    /// lifetime. Merge key between local and remote stores.
    pub id: String,

    /// Capture timestamp. Default ordering is descending; also used for
    /// month bucketing in backup.
    pub created_at: DateTime<Utc>,

    /// Recording length in seconds
    pub duration_seconds: f64,

    /// Raw audio, local-only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioBlob>,

    /// SHA256 of the audio bytes, used to skip duplicate captures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,

    /// Set once the remote upload succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,

    /// Which AI instruction set to apply ("raw" = transcribe only)
    pub template_id: String,

    pub status: NoteStatus,

    /// Set only when status is Error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<u32>,

    /// True once the remote store has accepted this note
    #[serde(default)]
    pub synced_to_remote: bool,

    /// External-backup reference for the audio artifact. Presence is the
    /// idempotency guard: if set, the upload is not re-attempted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_audio_ref: Option<String>,

    /// External-backup reference for the rendered transcript file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_transcript_ref: Option<String>,
}

impl Note {
    /// Create a new pending note at capture time
    pub fn new(audio: AudioBlob, duration_seconds: f64, template_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            duration_seconds,
            audio: Some(audio),
            fingerprint: None,
            audio_url: None,
            template_id: template_id.into(),
            status: NoteStatus::Pending,
            error_message: None,
            transcript: None,
            summary: None,
            title: None,
            word_count: None,
            synced_to_remote: false,
            backup_audio_ref: None,
            backup_transcript_ref: None,
        }
    }

    /// Terminal for the current attempt (completed or error)
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, NoteStatus::Completed | NoteStatus::Error)
    }

    /// Calendar-month bucket used by the backup reconciler ("2026-08")
    pub fn month_bucket(&self) -> String {
        self.created_at.format("%Y-%m").to_string()
    }
}

/// Serde helper: raw bytes as base64 in JSON
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64_STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_audio() -> AudioBlob {
        AudioBlob {
            mime_type: "audio/mp4".to_string(),
            data: b"fake audio content".to_vec(),
        }
    }

    #[test]
    fn test_new_note_is_pending() {
        let note = Note::new(test_audio(), 4.2, "raw");
        assert_eq!(note.status, NoteStatus::Pending);
        assert!(note.audio.is_some());
        assert!(!note.synced_to_remote);
        assert!(note.transcript.is_none());
    }

    #[test]
    fn test_status_transitions() {
        use NoteStatus::*;

        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Error));
        assert!(Error.can_transition_to(Processing));
        // The requeue edge: offline failure or crash recovery
        assert!(Processing.can_transition_to(Pending));

        // Nothing else is legal
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Error.can_transition_to(Completed));
        assert!(!Error.can_transition_to(Pending));
    }

    #[test]
    fn test_audio_round_trips_through_json() {
        let note = Note::new(test_audio(), 1.0, "raw");
        let json = serde_json::to_string(&note).unwrap();
        let parsed: Note = serde_json::from_str(&json).unwrap();

        let audio = parsed.audio.unwrap();
        assert_eq!(audio.data, b"fake audio content");
        assert_eq!(audio.mime_type, "audio/mp4");
    }

    #[test]
    fn test_remote_shape_without_audio_parses() {
        // Remote records never carry the raw bytes, only a URL
        let json = r#"{
            "id": "abc",
            "created_at": "2026-08-01T12:00:00Z",
            "duration_seconds": 3.5,
            "template_id": "raw",
            "status": "completed",
            "transcript": "hello",
            "audio_url": "https://example.com/audio/abc"
        }"#;

        let note: Note = serde_json::from_str(json).unwrap();
        assert!(note.audio.is_none());
        assert_eq!(note.status, NoteStatus::Completed);
        assert_eq!(note.audio_url.as_deref(), Some("https://example.com/audio/abc"));
    }

    #[test]
    fn test_month_bucket() {
        let mut note = Note::new(test_audio(), 1.0, "raw");
        note.created_at = "2026-08-23T10:30:00Z".parse().unwrap();
        assert_eq!(note.month_bucket(), "2026-08");
    }
}
