//! Remote store client: thin request layer over the cloud backend.
//!
//! Remote sync may be entirely disabled (no backend configured), in which
//! case `RemoteDisabled` stands in and the whole remote path becomes a
//! no-op. All methods return typed results; the pipeline and reconciler
//! interpret failures explicitly, nothing is thrown past them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::domain::{Note, Template};

/// Errors from the remote backend
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote sync is not configured")]
    Disabled,

    /// Connection-level failure: the backend is unreachable, not broken.
    /// The pipeline keeps the note pending so the network-restored drain
    /// retries it.
    #[error("remote unreachable: {0}")]
    Offline(String),

    #[error("remote API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid response from remote: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Offline-shaped failures keep a note queued instead of erroring it
    pub fn is_offline(&self) -> bool {
        matches!(self, RemoteError::Offline(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            RemoteError::Offline(e.to_string())
        } else if e.is_decode() {
            RemoteError::Decode(e.to_string())
        } else {
            RemoteError::Api {
                status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                message: e.to_string(),
            }
        }
    }
}

/// Trait seam for the remote note backend
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// False when no backend is configured; callers skip the remote path
    fn enabled(&self) -> bool;

    async fn list_notes(&self) -> Result<Vec<Note>, RemoteError>;

    async fn list_templates(&self) -> Result<Vec<Template>, RemoteError>;

    /// Upload the note's audio and run server-side transcription. Returns
    /// the enriched record (transcript/summary/title/audio_url, no raw
    /// bytes).
    async fn upload_and_process(&self, note: &Note) -> Result<Note, RemoteError>;

    /// Re-run server-side transcription for an already-uploaded note
    async fn retry(&self, note_id: &str, template_id: &str) -> Result<Note, RemoteError>;

    async fn delete_note(&self, note_id: &str) -> Result<(), RemoteError>;
}

/// The no-backend mode: `enabled()` is false, listings are empty, and
/// mutations refuse with `RemoteError::Disabled`.
pub struct RemoteDisabled;

#[async_trait]
impl RemoteStore for RemoteDisabled {
    fn enabled(&self) -> bool {
        false
    }

    async fn list_notes(&self) -> Result<Vec<Note>, RemoteError> {
        Ok(Vec::new())
    }

    async fn list_templates(&self) -> Result<Vec<Template>, RemoteError> {
        Ok(Vec::new())
    }

    async fn upload_and_process(&self, _note: &Note) -> Result<Note, RemoteError> {
        Err(RemoteError::Disabled)
    }

    async fn retry(&self, _note_id: &str, _template_id: &str) -> Result<Note, RemoteError> {
        Err(RemoteError::Disabled)
    }

    async fn delete_note(&self, _note_id: &str) -> Result<(), RemoteError> {
        Err(RemoteError::Disabled)
    }
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct NotesEnvelope {
    notes: Vec<Note>,
}

#[derive(Deserialize)]
struct NoteEnvelope {
    note: Note,
}

#[derive(Deserialize)]
struct TemplatesEnvelope {
    templates: Vec<Template>,
}

/// Metadata sent alongside the audio on upload. The raw bytes travel as a
/// separate multipart part, never inside the JSON.
#[derive(Serialize)]
struct UploadMetadata<'a> {
    id: &'a str,
    created_at: chrono::DateTime<chrono::Utc>,
    duration_seconds: f64,
    template_id: &'a str,
}

/// REST client for the note backend
pub struct HttpRemote {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Base URL for connectivity probing
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        Err(RemoteError::Api { status, message })
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    fn enabled(&self) -> bool {
        true
    }

    async fn list_notes(&self) -> Result<Vec<Note>, RemoteError> {
        let response = self
            .client
            .get(self.url("/api/notes"))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let envelope: NotesEnvelope = Self::check(response).await?.json().await?;
        Ok(envelope.notes)
    }

    async fn list_templates(&self) -> Result<Vec<Template>, RemoteError> {
        let response = self
            .client
            .get(self.url("/api/templates"))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let envelope: TemplatesEnvelope = Self::check(response).await?.json().await?;
        Ok(envelope.templates)
    }

    async fn upload_and_process(&self, note: &Note) -> Result<Note, RemoteError> {
        let audio = note
            .audio
            .as_ref()
            .ok_or_else(|| RemoteError::Decode("note has no local audio to upload".to_string()))?;

        let metadata = UploadMetadata {
            id: &note.id,
            created_at: note.created_at,
            duration_seconds: note.duration_seconds,
            template_id: &note.template_id,
        };
        let metadata_json =
            serde_json::to_string(&metadata).map_err(|e| RemoteError::Decode(e.to_string()))?;

        let audio_part = reqwest::multipart::Part::bytes(audio.data.clone())
            .file_name(format!("{}.audio", note.id))
            .mime_str(&audio.mime_type)
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        let form = reqwest::multipart::Form::new()
            .text("metadata", metadata_json)
            .part("audio", audio_part);

        let response = self
            .client
            .post(self.url("/api/notes"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let envelope: NoteEnvelope = Self::check(response).await?.json().await?;
        Ok(envelope.note)
    }

    async fn retry(&self, note_id: &str, template_id: &str) -> Result<Note, RemoteError> {
        let response = self
            .client
            .post(self.url(&format!("/api/notes/{}/retry", note_id)))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "template_id": template_id }))
            .send()
            .await?;

        let envelope: NoteEnvelope = Self::check(response).await?.json().await?;
        Ok(envelope.note)
    }

    async fn delete_note(&self, note_id: &str) -> Result<(), RemoteError> {
        let response = self
            .client
            .delete(self.url(&format!("/api/notes/{}", note_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}
