//! Tests for trigger-driven draining of the pending queue.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use voxsync::adapters::{
    RemoteDisabled, TranscribeError, Transcriber, TranscriptionOutcome, TranscriptionRequest,
};
use voxsync::core::scheduler::{Connectivity, Scheduler, Trigger, TriggerSource};
use voxsync::core::Processor;
use voxsync::domain::{AudioBlob, Note, NoteStatus};
use voxsync::store::LocalStore;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Transcriber that can be scripted to fail the first N calls
struct FlakyTranscriber {
    fail_first: usize,
    calls: AtomicUsize,
}

impl FlakyTranscriber {
    fn reliable() -> Arc<Self> {
        Arc::new(Self {
            fail_first: 0,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing_first(n: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_first: n,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for FlakyTranscriber {
    async fn transcribe(
        &self,
        _request: TranscriptionRequest,
    ) -> Result<TranscriptionOutcome, TranscribeError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(TranscribeError::Api {
                status: 500,
                message: "scripted failure".to_string(),
            });
        }
        Ok(TranscriptionOutcome {
            transcript: "ok".to_string(),
            summary: None,
            title: None,
        })
    }
}

/// Connectivity flag a test can flip mid-run
struct SwitchableNetwork {
    online: AtomicBool,
}

impl SwitchableNetwork {
    fn starting(online: bool) -> Arc<Self> {
        Arc::new(Self {
            online: AtomicBool::new(online),
        })
    }

    fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connectivity for SwitchableNetwork {
    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Feeds triggers from an mpsc channel; the loop ends when the sender drops
struct ChannelTriggers {
    rx: mpsc::Receiver<Trigger>,
}

#[async_trait]
impl TriggerSource for ChannelTriggers {
    async fn next(&mut self) -> Option<Trigger> {
        self.rx.recv().await
    }
}

fn audio(bytes: &[u8]) -> AudioBlob {
    AudioBlob {
        mime_type: "audio/webm".to_string(),
        data: bytes.to_vec(),
    }
}

async fn setup(
    transcriber: Arc<FlakyTranscriber>,
    network: Arc<SwitchableNetwork>,
) -> (Arc<LocalStore>, Scheduler) {
    let store = Arc::new(LocalStore::open_in_memory().await);
    let processor = Arc::new(Processor::new(
        store.clone(),
        Arc::new(RemoteDisabled),
        transcriber,
        None,
    ));
    let scheduler = Scheduler::new(store.clone(), processor, network);
    (store, scheduler)
}

async fn seed_note(store: &LocalStore, bytes: &[u8], status: NoteStatus) -> Note {
    let mut note = Note::new(audio(bytes), 1.0, "raw");
    note.status = status;
    store.save_note(&note).await;
    note
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_offline_drain_is_a_noop() {
    let transcriber = FlakyTranscriber::reliable();
    let (store, scheduler) = setup(
        transcriber.clone(),
        SwitchableNetwork::starting(false),
    )
    .await;

    seed_note(&store, b"n1", NoteStatus::Pending).await;

    let report = scheduler.drain().await;
    assert!(report.skipped_offline);
    assert_eq!(report.selected, 0);
    assert_eq!(transcriber.calls(), 0);

    // The note is still waiting, untouched
    let notes = store.all_notes().await;
    assert_eq!(notes[0].status, NoteStatus::Pending);
}

#[tokio::test]
async fn test_drain_processes_all_pending_notes() {
    let transcriber = FlakyTranscriber::reliable();
    let (store, scheduler) = setup(transcriber.clone(), SwitchableNetwork::starting(true)).await;

    seed_note(&store, b"n1", NoteStatus::Pending).await;
    seed_note(&store, b"n2", NoteStatus::Pending).await;
    seed_note(&store, b"n3", NoteStatus::Pending).await;

    let report = scheduler.drain().await;
    assert_eq!(report.selected, 3);
    assert_eq!(report.completed, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(transcriber.calls(), 3);

    assert!(store
        .all_notes()
        .await
        .iter()
        .all(|n| n.status == NoteStatus::Completed));
}

#[tokio::test]
async fn test_error_notes_are_not_drained() {
    let transcriber = FlakyTranscriber::reliable();
    let (store, scheduler) = setup(transcriber.clone(), SwitchableNetwork::starting(true)).await;

    seed_note(&store, b"n1", NoteStatus::Error).await;
    seed_note(&store, b"n2", NoteStatus::Completed).await;

    let report = scheduler.drain().await;
    assert_eq!(report.selected, 0);
    assert_eq!(transcriber.calls(), 0);
}

#[tokio::test]
async fn test_one_failure_does_not_stop_the_pass() {
    let transcriber = FlakyTranscriber::failing_first(1);
    let (store, scheduler) = setup(transcriber.clone(), SwitchableNetwork::starting(true)).await;

    seed_note(&store, b"n1", NoteStatus::Pending).await;
    seed_note(&store, b"n2", NoteStatus::Pending).await;

    let report = scheduler.drain().await;
    assert_eq!(report.selected, 2);
    assert_eq!(report.completed, 1);
    assert_eq!(report.failed, 1);

    let statuses: Vec<NoteStatus> = store.all_notes().await.iter().map(|n| n.status).collect();
    assert!(statuses.contains(&NoteStatus::Completed));
    assert!(statuses.contains(&NoteStatus::Error));
}

#[tokio::test]
async fn test_startup_recovers_stale_processing_notes() {
    let transcriber = FlakyTranscriber::reliable();
    let (store, scheduler) = setup(transcriber.clone(), SwitchableNetwork::starting(true)).await;

    // Left behind by a crashed session
    let stale = seed_note(&store, b"n1", NoteStatus::Processing).await;

    // A periodic tick must not touch it
    let report = scheduler.drain_with(false).await;
    assert_eq!(report.selected, 0);
    assert_eq!(
        store.get_note(&stale.id).await.unwrap().status,
        NoteStatus::Processing
    );

    // Startup recovery picks it up and finishes it
    let report = scheduler.drain_with(true).await;
    assert_eq!(report.selected, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(
        store.get_note(&stale.id).await.unwrap().status,
        NoteStatus::Completed
    );
}

#[tokio::test]
async fn test_capture_offline_then_network_restored_trigger() {
    let transcriber = FlakyTranscriber::reliable();
    let network = SwitchableNetwork::starting(false);
    let (store, scheduler) = setup(transcriber.clone(), network.clone()).await;

    let note = seed_note(&store, b"n1", NoteStatus::Pending).await;

    // Offline: the trigger fires but nothing is drained
    assert!(scheduler.drain().await.skipped_offline);
    assert_eq!(
        store.get_note(&note.id).await.unwrap().status,
        NoteStatus::Pending
    );

    // The network comes back and the restore trigger drains the queue
    network.set_online(true);

    let (tx, rx) = mpsc::channel(4);
    tx.send(Trigger::NetworkRestored).await.unwrap();
    drop(tx);
    scheduler.run(ChannelTriggers { rx }).await;

    assert_eq!(
        store.get_note(&note.id).await.unwrap().status,
        NoteStatus::Completed
    );
}

#[tokio::test]
async fn test_startup_trigger_through_run_loop_recovers_stale() {
    let transcriber = FlakyTranscriber::reliable();
    let (store, scheduler) = setup(transcriber.clone(), SwitchableNetwork::starting(true)).await;

    let stale = seed_note(&store, b"n1", NoteStatus::Processing).await;

    let (tx, rx) = mpsc::channel(4);
    tx.send(Trigger::Startup).await.unwrap();
    drop(tx);
    scheduler.run(ChannelTriggers { rx }).await;

    assert_eq!(
        store.get_note(&stale.id).await.unwrap().status,
        NoteStatus::Completed
    );
}
