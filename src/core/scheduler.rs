//! Background scheduler: decides when pending notes get (re)submitted.
//!
//! Four triggers feed the same drain routine: startup, network restored,
//! app foregrounded, and a fixed repeating tick. Notes are processed
//! strictly sequentially; one note's failure never aborts the rest.
//!
//! Concurrency model: cooperative single-writer. There is no lock
//! primitive; the guard against double submission is the *persisted*
//! status the pipeline flips before its first network await. A second
//! trigger firing mid-drain re-reads the store and finds those notes
//! already `processing`. This holds on a single-threaded event loop and
//! within one process; it is not mutual exclusion across processes
//! sharing a store directory.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::domain::NoteStatus;
use crate::store::LocalStore;

use super::pipeline::Processor;

/// Why a drain is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    NetworkRestored,
    Foregrounded,
    Tick,
}

/// Source of drain triggers. Production wires platform events and a
/// timer; tests drive the scheduler synchronously through a channel.
#[async_trait]
pub trait TriggerSource: Send {
    /// Next trigger, or None when the source is exhausted (shuts the
    /// scheduler loop down)
    async fn next(&mut self) -> Option<Trigger>;
}

/// Connectivity probe consulted before each drain
#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// No probing; always online. Used when no remote backend is configured
/// (the AI service is the only network dependency and its failures are
/// handled per-note).
pub struct AssumeOnline;

#[async_trait]
impl Connectivity for AssumeOnline {
    async fn is_online(&self) -> bool {
        true
    }
}

/// Probes the remote backend's base URL
pub struct RemoteProbe {
    client: reqwest::Client,
    url: String,
}

impl RemoteProbe {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();

        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Connectivity for RemoteProbe {
    async fn is_online(&self) -> bool {
        // Any HTTP response counts as reachable; only connection-level
        // failures mean offline
        self.client.head(&self.url).send().await.is_ok()
    }
}

/// Emits Startup once, then Tick on a fixed period
pub struct IntervalTriggers {
    interval: tokio::time::Interval,
    started: bool,
}

impl IntervalTriggers {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        Self {
            interval,
            started: false,
        }
    }
}

#[async_trait]
impl TriggerSource for IntervalTriggers {
    async fn next(&mut self) -> Option<Trigger> {
        if !self.started {
            self.started = true;
            return Some(Trigger::Startup);
        }
        self.interval.tick().await;
        Some(Trigger::Tick)
    }
}

/// Outcome of one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Notes selected for processing this pass
    pub selected: usize,

    pub completed: usize,
    pub failed: usize,

    /// Went back to pending (backend unreachable mid-attempt)
    pub still_pending: usize,

    /// The whole pass was skipped because the device is offline
    pub skipped_offline: bool,
}

/// Drains the pending queue on each trigger
pub struct Scheduler {
    store: Arc<LocalStore>,
    processor: Arc<Processor>,
    connectivity: Arc<dyn Connectivity>,
}

impl Scheduler {
    pub fn new(
        store: Arc<LocalStore>,
        processor: Arc<Processor>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        Self {
            store,
            processor,
            connectivity,
        }
    }

    /// One drain pass over the pending queue
    pub async fn drain(&self) -> DrainReport {
        self.drain_with(false).await
    }

    /// One drain pass. With `recover_stale`, notes left in `processing`
    /// by a previous crashed session are also selected; only the startup
    /// trigger does this, so the in-flight guard stays meaningful within
    /// a session.
    #[instrument(skip(self))]
    pub async fn drain_with(&self, recover_stale: bool) -> DrainReport {
        let mut report = DrainReport::default();

        if !self.connectivity.is_online().await {
            debug!("device offline, skipping drain");
            report.skipped_offline = true;
            return report;
        }

        // Fresh read from the store, never an in-memory cache: another
        // trigger or a previous session may have left state the cache
        // doesn't know about.
        let notes = self.store.all_notes().await;

        for note in notes {
            let eligible = match note.status {
                NoteStatus::Pending => true,
                NoteStatus::Processing => recover_stale,
                // Error requires an explicit user retry; the drain never
                // picks it up (no retry storms against a failing
                // dependency)
                NoteStatus::Error | NoteStatus::Completed => false,
            };
            if !eligible {
                continue;
            }

            report.selected += 1;

            if note.status == NoteStatus::Processing {
                info!(note_id = %note.id, "recovering note stuck in processing");
                let mut recovered = note.clone();
                recovered.status = NoteStatus::Pending;
                self.store.save_note(&recovered).await;
            }

            // Strictly sequential: each note is fully awaited before the
            // next starts. A failure is isolated to its note.
            match self.processor.process(&note.id).await {
                Ok(processed) => match processed.status {
                    NoteStatus::Completed => report.completed += 1,
                    NoteStatus::Error => report.failed += 1,
                    NoteStatus::Pending => report.still_pending += 1,
                    NoteStatus::Processing => {
                        // The pipeline finalizes before returning; this
                        // would be a bug there
                        warn!(note_id = %note.id, "note returned still processing");
                        report.failed += 1;
                    }
                },
                Err(e) => {
                    warn!(note_id = %note.id, error = %e, "drain: processing failed");
                    report.failed += 1;
                }
            }
        }

        if report.selected > 0 {
            info!(
                selected = report.selected,
                completed = report.completed,
                failed = report.failed,
                still_pending = report.still_pending,
                "drain finished"
            );
        }
        report
    }

    /// Drive drains from a trigger source until it is exhausted
    pub async fn run<S: TriggerSource>(&self, mut triggers: S) {
        while let Some(trigger) = triggers.next().await {
            debug!(?trigger, "drain trigger");
            let recover_stale = trigger == Trigger::Startup;
            self.drain_with(recover_stale).await;
        }
        info!("trigger source exhausted, scheduler stopping");
    }
}
