//! Adapter interfaces for external systems.
//!
//! Adapters provide trait seams for the three external collaborators:
//! the AI transcription service, the remote note backend, and the
//! external file-storage account. Production implementations are thin
//! reqwest clients; tests substitute fakes.

pub mod drive;
pub mod remote;
pub mod transcriber;

pub use drive::{DriveClient, DriveError, FileStorage};
pub use remote::{HttpRemote, RemoteDisabled, RemoteError, RemoteStore};
pub use transcriber::{
    GeminiTranscriber, TranscribeError, Transcriber, TranscriptionOutcome, TranscriptionRequest,
};
