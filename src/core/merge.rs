//! Reconciliation engine: read-only merge of the local and remote note
//! sets into one canonical list.
//!
//! The local store is the only place the raw audio bytes live; the remote
//! store is the durability/sharing tier and the only place server-computed
//! text can arrive out-of-band. The merge must never lose a local edit
//! that hasn't synced, and must never fabricate an audio reference the
//! device doesn't hold. It never writes the remote store.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::adapters::RemoteStore;
use crate::domain::Note;
use crate::store::LocalStore;

/// How one field resolves when both sides have a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeRule {
    /// Local value, even if absent (audio: the remote never holds bytes)
    PreferLocal,

    /// Local when present, else the remote's
    LocalThenRemote,

    /// Remote when present, else the local's
    RemoteThenLocal,
}

/// Field-level merge policy, one rule per merged field.
///
/// Declarative so the merge is a single data-driven function rather than
/// scattered conditionals.
#[derive(Debug, Clone, Copy)]
pub struct MergePolicy {
    pub audio: MergeRule,
    pub transcript: MergeRule,
    pub summary: MergeRule,
    pub title: MergeRule,
    pub word_count: MergeRule,
    pub audio_url: MergeRule,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            audio: MergeRule::PreferLocal,
            transcript: MergeRule::LocalThenRemote,
            summary: MergeRule::LocalThenRemote,
            title: MergeRule::LocalThenRemote,
            word_count: MergeRule::LocalThenRemote,
            audio_url: MergeRule::RemoteThenLocal,
        }
    }
}

fn pick<T: Clone>(rule: MergeRule, local: &Option<T>, remote: &Option<T>) -> Option<T> {
    match rule {
        MergeRule::PreferLocal => local.clone(),
        MergeRule::LocalThenRemote => local.clone().or_else(|| remote.clone()),
        MergeRule::RemoteThenLocal => remote.clone().or_else(|| local.clone()),
    }
}

/// Merge one local note with its remote counterpart under `policy`.
///
/// Identity, lifecycle status, and backup refs stay local: the local store
/// is authoritative for everything this device did. The `synced_to_remote`
/// flag keeps the local value; a counterpart that appeared out-of-band
/// does not claim this client's upload happened.
pub fn merge_note(local: &Note, remote: &Note, policy: &MergePolicy) -> Note {
    Note {
        id: local.id.clone(),
        created_at: local.created_at,
        duration_seconds: if local.duration_seconds > 0.0 {
            local.duration_seconds
        } else {
            remote.duration_seconds
        },
        audio: pick(policy.audio, &local.audio, &remote.audio),
        fingerprint: local.fingerprint.clone(),
        audio_url: pick(policy.audio_url, &local.audio_url, &remote.audio_url),
        template_id: local.template_id.clone(),
        status: local.status,
        error_message: local.error_message.clone(),
        transcript: pick(policy.transcript, &local.transcript, &remote.transcript),
        summary: pick(policy.summary, &local.summary, &remote.summary),
        title: pick(policy.title, &local.title, &remote.title),
        word_count: pick(policy.word_count, &local.word_count, &remote.word_count),
        synced_to_remote: local.synced_to_remote,
        backup_audio_ref: local.backup_audio_ref.clone(),
        backup_transcript_ref: local.backup_transcript_ref.clone(),
    }
}

/// Produces the canonical merged note list
pub struct Reconciler {
    store: Arc<LocalStore>,
    remote: Arc<dyn RemoteStore>,
    policy: MergePolicy,
}

impl Reconciler {
    pub fn new(store: Arc<LocalStore>, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            remote,
            policy: MergePolicy::default(),
        }
    }

    /// Merge both stores into one list, sorted created_at descending.
    ///
    /// A remote listing failure degrades to the local-only view: the local
    /// list must always be available.
    #[instrument(skip(self))]
    pub async fn merge(&self) -> Vec<Note> {
        let remote_notes = if self.remote.enabled() {
            match self.remote.list_notes().await {
                Ok(notes) => notes,
                Err(e) => {
                    warn!(error = %e, "remote listing failed, using local view only");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let local_notes = self.store.all_notes().await;
        debug!(
            local = local_notes.len(),
            remote = remote_notes.len(),
            "reconciling note sets"
        );

        // Seed from the remote list, then fold every local note in. A
        // local note without a counterpart wins outright: it hasn't synced
        // yet, or sync is disabled.
        let mut by_id: HashMap<String, Note> = remote_notes
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect();

        for local in local_notes {
            let merged = match by_id.get(&local.id) {
                Some(remote) => merge_note(&local, remote, &self.policy),
                None => local,
            };
            by_id.insert(merged.id.clone(), merged);
        }

        let mut merged: Vec<Note> = by_id.into_values().collect();
        merged.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        merged
    }

    /// Pull remote templates into the local store (upsert by id). The
    /// built-in "raw" template is never overwritten.
    #[instrument(skip(self))]
    pub async fn sync_templates(&self) -> usize {
        if !self.remote.enabled() {
            return 0;
        }

        let templates = match self.remote.list_templates().await {
            Ok(templates) => templates,
            Err(e) => {
                warn!(error = %e, "remote template listing failed");
                return 0;
            }
        };

        let mut count = 0;
        for template in templates {
            if crate::domain::Template::is_reserved(&template.id) {
                continue;
            }
            self.store.save_template(&template).await;
            count += 1;
        }
        count
    }
}
