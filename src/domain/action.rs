//! Action items extracted from action-items summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPriority {
    Low,
    Medium,
    High,
}

/// A task extracted from a completed note's summary.
///
/// Extraction is a best-effort heuristic; items are always created pending
/// at medium priority and curated by the user afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionItem {
    pub id: String,

    /// The note whose summary produced this item
    pub note_id: String,

    pub text: String,

    pub status: ActionStatus,

    pub priority: ActionPriority,

    pub created_at: DateTime<Utc>,
}

impl ActionItem {
    pub fn new(note_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            note_id: note_id.into(),
            text: text.into(),
            status: ActionStatus::Pending,
            priority: ActionPriority::Medium,
            created_at: Utc::now(),
        }
    }
}
