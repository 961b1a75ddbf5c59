//! voxsync - Offline-first sync engine for voice notes
//!
//! Keeps a locally authoritative store of captured voice notes consistent
//! with an eventually-reachable remote backend, drives each note through an
//! AI transcription/summarization pipeline, and mirrors completed notes into
//! an external file-storage account.
//!
//! # Architecture
//!
//! The system is built around a per-note state machine persisted in the
//! local store:
//! - `pending -> processing -> {completed | error}`, plus `error -> processing`
//!   on explicit retry
//! - `processing` is written to disk *before* any network call, so the
//!   persisted status is the guard against double submission
//! - A trigger-driven scheduler drains pending notes strictly sequentially
//! - Reconciliation merges the local and remote note sets read-only
//!
//! # Modules
//!
//! - `adapters`: External system integrations (AI service, remote backend,
//!   file storage)
//! - `core`: Engine logic (Processor, Reconciler, Scheduler, BackupReconciler)
//! - `domain`: Data structures (Note, Template, ActionItem)
//! - `store`: Local durable store with in-memory fallback
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Capture a recording and process it (queued as pending if offline)
//! voxsync capture memo.m4a --template summary
//!
//! # Drain the pending queue once
//! voxsync drain
//!
//! # Retry a failed note
//! voxsync retry <note-id>
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod store;

// Re-export main types at crate root for convenience
pub use crate::core::{BackupReconciler, DrainReport, Processor, Reconciler, Scheduler};
pub use domain::{ActionItem, AudioBlob, Note, NoteStatus, Template};
pub use store::LocalStore;

// Adapter seams (HTTP clients in production, fakes in tests)
pub use adapters::{FileStorage, RemoteStore, Transcriber};
pub use crate::core::scheduler::{Connectivity, Trigger, TriggerSource};
