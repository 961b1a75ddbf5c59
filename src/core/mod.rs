//! Core engine logic.
//!
//! This module contains:
//! - Processor: the per-note processing state machine
//! - Reconciler: read-only local/remote merge
//! - Scheduler: trigger-driven drain of the pending queue
//! - BackupReconciler: idempotent external-backup mirror
//! - actions: action-item extraction heuristic

pub mod actions;
pub mod backup;
pub mod merge;
pub mod pipeline;
pub mod scheduler;

// Re-export commonly used types
pub use actions::extract_actions;
pub use backup::{BackupReconciler, BackupReport};
pub use merge::{merge_note, MergePolicy, MergeRule, Reconciler};
pub use pipeline::{audio_fingerprint, Processor};
pub use scheduler::{
    AssumeOnline, Connectivity, DrainReport, IntervalTriggers, Scheduler, Trigger, TriggerSource,
};
