//! AI transcription/summarization service client.
//!
//! The service is treated as an opaque async function: audio bytes plus
//! optional template instructions in, transcript plus optional structured
//! fields out. Failures map to the note's error status upstream; nothing
//! here retries.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// One transcription request
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub audio: Vec<u8>,
    pub mime_type: String,

    /// Template instructions; None or empty means transcribe only
    pub instructions: Option<String>,
}

/// Result of a transcription call
#[derive(Debug, Clone, Default)]
pub struct TranscriptionOutcome {
    pub transcript: String,

    /// Structured fields, present only when instructions asked for them
    pub summary: Option<String>,
    pub title: Option<String>,
}

/// Errors from the AI service
#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("AI service request failed: {0}")]
    Network(String),

    #[error("AI service error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("AI service returned no candidates")]
    EmptyResponse,
}

/// Trait seam for the transcription service
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        request: TranscriptionRequest,
    ) -> Result<TranscriptionOutcome, TranscribeError>;
}

// ---------------------------------------------------------------------------
// Gemini implementation
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "inlineData", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Structured response shape requested when a template asks for
/// summarization
#[derive(Deserialize)]
struct StructuredFields {
    transcript: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

/// Gemini generateContent client
pub struct GeminiTranscriber {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiTranscriber {
    /// `model` comes from configuration; the default lives there
    pub fn new(api_key: String, model: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key,
            model,
        }
    }

    fn prompt_for(instructions: Option<&str>) -> String {
        match instructions {
            Some(text) if !text.trim().is_empty() => format!(
                "Transcribe this audio recording, then apply these instructions: {}\n\
                 Respond with a JSON object: {{\"transcript\": \"...\", \
                 \"summary\": \"...\", \"title\": \"...\"}}. \
                 If the recording contains no speech, use an empty transcript.",
                text
            ),
            _ => "Transcribe this audio recording verbatim. \
                  Respond with the transcript text only, nothing else. \
                  If the recording contains no speech, respond with an empty string."
                .to_string(),
        }
    }
}

#[async_trait]
impl Transcriber for GeminiTranscriber {
    async fn transcribe(
        &self,
        request: TranscriptionRequest,
    ) -> Result<TranscriptionOutcome, TranscribeError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let structured = matches!(&request.instructions, Some(t) if !t.trim().is_empty());
        let body = GeminiRequest {
            contents: vec![Content {
                parts: vec![
                    Part {
                        text: Some(Self::prompt_for(request.instructions.as_deref())),
                        inline_data: None,
                    },
                    Part {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: request.mime_type.clone(),
                            data: BASE64_STANDARD.encode(&request.audio),
                        }),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                max_output_tokens: 8192,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| TranscribeError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(TranscribeError::Api { status, message });
        }

        let gemini: GeminiResponse = response
            .json()
            .await
            .map_err(|e| TranscribeError::Network(format!("response parse: {}", e)))?;

        let text = gemini
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.trim().to_string())
            .ok_or(TranscribeError::EmptyResponse)?;

        debug!(chars = text.len(), structured, "AI service responded");

        if structured {
            Ok(parse_structured(&text))
        } else {
            Ok(TranscriptionOutcome {
                transcript: text,
                summary: None,
                title: None,
            })
        }
    }
}

/// Parse the structured JSON the model was asked for. Models wrap JSON in
/// code fences or drift from the schema often enough that this has to be
/// lenient: anything unparseable is kept as a plain transcript.
fn parse_structured(text: &str) -> TranscriptionOutcome {
    let stripped = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    match serde_json::from_str::<StructuredFields>(stripped) {
        Ok(fields) => TranscriptionOutcome {
            transcript: fields.transcript,
            summary: fields.summary.filter(|s| !s.trim().is_empty()),
            title: fields.title.filter(|t| !t.trim().is_empty()),
        },
        Err(_) => TranscriptionOutcome {
            transcript: text.to_string(),
            summary: None,
            title: None,
        },
    }
}
