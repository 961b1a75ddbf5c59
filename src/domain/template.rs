//! Processing templates: named instruction sets for the AI step.

use serde::{Deserialize, Serialize};

/// Reserved id for the built-in transcribe-only template. Always exists,
/// never deletable.
pub const RAW_TEMPLATE_ID: &str = "raw";

/// Built-in summarize-with-title template
pub const SUMMARY_TEMPLATE_ID: &str = "summary";

/// Built-in action-items template; completed notes processed with it feed
/// the action extraction side effect.
pub const ACTIONS_TEMPLATE_ID: &str = "actions";

/// A named instruction set steering the AI summarization step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: String,

    /// Display name
    pub name: String,

    /// Instruction text passed to the AI service. Empty for "raw"
    /// (transcribe only, no summarization).
    pub instructions: String,
}

impl Template {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            instructions: instructions.into(),
        }
    }

    /// Whether this id is reserved (cannot be deleted)
    pub fn is_reserved(id: &str) -> bool {
        id == RAW_TEMPLATE_ID
    }

    /// Templates seeded into every fresh store
    pub fn builtins() -> Vec<Template> {
        vec![
            Template::new(RAW_TEMPLATE_ID, "Raw Transcript", ""),
            Template::new(
                SUMMARY_TEMPLATE_ID,
                "Summary",
                "Summarize the recording in a short paragraph and suggest a concise title.",
            ),
            Template::new(
                ACTIONS_TEMPLATE_ID,
                "Action Items",
                "Extract every task or commitment mentioned in the recording as a bulleted list, one action per line.",
            ),
        ]
    }
}
