//! Domain types for the voxsync engine.
//!
//! This module contains the core data structures:
//! - Note: one captured recording plus its derived text and lifecycle status
//! - Template: a named instruction set steering the AI summarization step
//! - ActionItem: a task extracted from an action-items summary

pub mod action;
pub mod note;
pub mod template;

// Re-export commonly used types
pub use action::{ActionItem, ActionPriority, ActionStatus};
pub use note::{AudioBlob, Note, NoteStatus, NO_SPEECH_SENTINEL};
pub use template::{Template, ACTIONS_TEMPLATE_ID, RAW_TEMPLATE_ID, SUMMARY_TEMPLATE_ID};
