//! Command-line interface for voxsync.
//!
//! Provides commands for capturing recordings, draining the pending
//! queue, inspecting notes, retrying failures, and mirroring completed
//! notes to Google Drive.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::adapters::{
    DriveClient, FileStorage, GeminiTranscriber, HttpRemote, RemoteDisabled, RemoteStore,
    Transcriber,
};
use crate::config::Config;
use crate::core::scheduler::{AssumeOnline, Connectivity, IntervalTriggers, RemoteProbe};
use crate::core::{BackupReconciler, Processor, Reconciler, Scheduler};
use crate::domain::{AudioBlob, Note, NoteStatus};
use crate::store::LocalStore;

/// voxsync - offline-first voice note engine
#[derive(Parser, Debug)]
#[command(name = "voxsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture an audio file as a new pending note
    Capture {
        /// Path to the audio file
        file: PathBuf,

        /// Template to process with
        #[arg(short, long, default_value = "raw")]
        template: String,

        /// Recording length in seconds (0 if unknown)
        #[arg(short, long, default_value = "0")]
        duration: f64,

        /// Queue only; don't process immediately
        #[arg(long)]
        defer: bool,
    },

    /// List notes (merged local/remote view)
    List {
        /// Filter by status (pending, processing, completed, error)
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum number of notes to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show details of a note
    Show {
        /// Note ID (prefix match)
        id: String,
    },

    /// Process the pending queue
    Drain {
        /// Keep running and drain on an interval
        #[arg(long)]
        watch: bool,

        /// Also recover notes stuck in processing from a previous session
        #[arg(long)]
        stale: bool,
    },

    /// Retry a failed note
    Retry {
        /// Note ID (prefix match)
        id: String,
    },

    /// Delete a note locally, remotely, and from backup
    Delete {
        /// Note ID (prefix match)
        id: String,
    },

    /// Back up completed notes to Google Drive
    Backup {
        /// Note ID (prefix match); all completed notes if omitted
        id: Option<String>,
    },

    /// Reconcile notes and templates with the remote backend
    Sync,

    /// List available templates
    Templates,

    /// Google Drive authorization
    Drive {
        #[command(subcommand)]
        command: DriveCommands,
    },

    /// Show resolved configuration
    Config,
}

#[derive(Subcommand, Debug)]
pub enum DriveCommands {
    /// Print the URL to authorize this device
    Auth {
        /// OAuth redirect URI registered for the client
        #[arg(long, default_value = "urn:ietf:wg:oauth:2.0:oob")]
        redirect_uri: String,
    },

    /// Finish authorization with the code from the consent screen
    Connect {
        code: String,

        #[arg(long, default_value = "urn:ietf:wg:oauth:2.0:oob")]
        redirect_uri: String,
    },
}

/// Everything a command needs, built once from config
struct Engine {
    store: Arc<LocalStore>,
    remote: Arc<dyn RemoteStore>,
    processor: Arc<Processor>,
    connectivity: Arc<dyn Connectivity>,
    config: Config,
}

impl Engine {
    async fn build() -> Result<Engine> {
        let config = Config::load()?;
        let store = Arc::new(LocalStore::open(config.data_dir()).await);

        let remote: Arc<dyn RemoteStore> = match &config.remote {
            Some(rc) => Arc::new(HttpRemote::new(
                &rc.base_url,
                rc.api_key.clone().unwrap_or_default(),
            )),
            None => Arc::new(RemoteDisabled),
        };

        let transcriber: Arc<dyn Transcriber> = {
            let api_key = config.ai.api_key.clone().unwrap_or_default();
            if api_key.is_empty() && !remote.enabled() {
                anyhow::bail!(
                    "no AI key configured. Set GEMINI_API_KEY or configure a remote backend"
                );
            }
            Arc::new(GeminiTranscriber::new(api_key, config.ai_model()))
        };

        let backup_storage = drive_client(&config).map(|c| Arc::new(c) as Arc<dyn FileStorage>);

        let connectivity: Arc<dyn Connectivity> = match &config.remote {
            Some(rc) => Arc::new(RemoteProbe::new(&rc.base_url)),
            None => Arc::new(AssumeOnline),
        };

        let processor = Arc::new(Processor::new(
            store.clone(),
            remote.clone(),
            transcriber,
            backup_storage,
        ));

        Ok(Engine {
            store,
            remote,
            processor,
            connectivity,
            config,
        })
    }

    fn scheduler(&self) -> Scheduler {
        Scheduler::new(
            self.store.clone(),
            self.processor.clone(),
            self.connectivity.clone(),
        )
    }

    /// Resolve a note by ID prefix
    async fn find_note(&self, prefix: &str) -> Result<Note> {
        let mut matches: Vec<Note> = self
            .store
            .all_notes()
            .await
            .into_iter()
            .filter(|n| n.id.starts_with(prefix))
            .collect();

        if matches.len() > 1 {
            anyhow::bail!(
                "Ambiguous ID prefix '{}' matches {} notes",
                prefix,
                matches.len()
            );
        }
        matches
            .pop()
            .ok_or_else(|| anyhow::anyhow!("No note matching: {}", prefix))
    }
}

fn drive_client(config: &Config) -> Option<DriveClient> {
    config.drive.as_ref().map(|d| {
        DriveClient::new(
            d.client_id.clone(),
            d.client_secret.clone(),
            config.drive_token_path(),
            config.backup_root_folder(),
        )
    })
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Capture {
                file,
                template,
                duration,
                defer,
            } => capture(&file, &template, duration, defer).await,
            Commands::List { status, limit } => list_notes(status, limit).await,
            Commands::Show { id } => show_note(&id).await,
            Commands::Drain { watch, stale } => drain(watch, stale).await,
            Commands::Retry { id } => retry(&id).await,
            Commands::Delete { id } => delete(&id).await,
            Commands::Backup { id } => backup(id.as_deref()).await,
            Commands::Sync => sync_with_remote().await,
            Commands::Templates => list_templates().await,
            Commands::Drive { command } => execute_drive(command).await,
            Commands::Config => show_config().await,
        }
    }
}

/// Capture an audio file into the queue
async fn capture(file: &Path, template: &str, duration: f64, defer: bool) -> Result<()> {
    let engine = Engine::build().await?;

    let data = std::fs::read(file)
        .with_context(|| format!("Failed to read audio file: {}", file.display()))?;
    if data.is_empty() {
        anyhow::bail!("Audio file is empty: {}", file.display());
    }

    let audio = AudioBlob {
        mime_type: mime_for(file).to_string(),
        data,
    };

    let note = engine.processor.capture(audio, duration, template).await?;
    println!("Captured note {} ({})", short_id(&note.id), note.status);

    if !defer {
        let processed = engine.processor.process(&note.id).await?;
        print_outcome(&processed);
    }

    Ok(())
}

/// List notes in the merged view
async fn list_notes(status_filter: Option<String>, limit: usize) -> Result<()> {
    let engine = Engine::build().await?;
    let reconciler = Reconciler::new(engine.store.clone(), engine.remote.clone());

    let notes: Vec<Note> = reconciler
        .merge()
        .await
        .into_iter()
        .filter(|n| {
            status_filter
                .as_deref()
                .map(|f| n.status.as_str() == f)
                .unwrap_or(true)
        })
        .collect();

    if notes.is_empty() {
        println!("No notes found");
        return Ok(());
    }

    println!(
        "{:<10} {:<11} {:<17} {:<6} {:<30}",
        "ID", "STATUS", "CAPTURED", "SYNC", "TITLE"
    );
    println!("{}", "-".repeat(76));

    for note in notes.iter().take(limit) {
        let title = note.title.as_deref().unwrap_or("-");
        let title = if title.chars().count() > 28 {
            let cut: String = title.chars().take(25).collect();
            format!("{}...", cut)
        } else {
            title.to_string()
        };

        println!(
            "{:<10} {:<11} {:<17} {:<6} {:<30}",
            short_id(&note.id),
            note.status.as_str(),
            note.created_at.format("%Y-%m-%d %H:%M"),
            if note.synced_to_remote { "yes" } else { "no" },
            title
        );
    }

    if notes.len() > limit {
        println!("\n  (showing {} of {} notes)", limit, notes.len());
    }

    Ok(())
}

/// Show one note in full
async fn show_note(id: &str) -> Result<()> {
    let engine = Engine::build().await?;
    let note = engine.find_note(id).await?;

    println!("ID:        {}", note.id);
    println!("Status:    {}", note.status);
    println!("Captured:  {}", note.created_at);
    println!("Duration:  {:.1}s", note.duration_seconds);
    println!("Template:  {}", note.template_id);
    println!("Synced:    {}", note.synced_to_remote);
    if let Some(title) = &note.title {
        println!("Title:     {}", title);
    }
    if let Some(wc) = note.word_count {
        println!("Words:     {}", wc);
    }
    if let Some(err) = &note.error_message {
        println!("Error:     {}", err);
    }
    if let Some(audio_ref) = &note.backup_audio_ref {
        println!("Backup:    audio {}", audio_ref);
    }
    if let Some(txt_ref) = &note.backup_transcript_ref {
        println!("Backup:    transcript {}", txt_ref);
    }
    if let Some(transcript) = &note.transcript {
        println!("\n{}", transcript);
    }
    if let Some(summary) = &note.summary {
        println!("\n── Summary ──\n{}", summary);
    }

    Ok(())
}

/// Drain the pending queue, once or continuously
async fn drain(watch: bool, stale: bool) -> Result<()> {
    let engine = Engine::build().await?;
    let scheduler = engine.scheduler();

    if watch {
        println!(
            "Draining every {}s (Ctrl+C to stop)",
            engine.config.drain_interval.as_secs()
        );
        scheduler
            .run(IntervalTriggers::new(engine.config.drain_interval))
            .await;
        return Ok(());
    }

    let report = scheduler.drain_with(stale).await;
    if report.skipped_offline {
        println!("Offline; nothing drained");
    } else if report.selected == 0 {
        println!("Queue is empty");
    } else {
        println!(
            "Drained {} note(s): {} completed, {} failed, {} still pending",
            report.selected, report.completed, report.failed, report.still_pending
        );
    }

    Ok(())
}

/// Retry a failed note
async fn retry(id: &str) -> Result<()> {
    let engine = Engine::build().await?;
    let note = engine.find_note(id).await?;
    let processed = engine.processor.retry(&note.id).await?;
    print_outcome(&processed);
    Ok(())
}

/// Delete a note everywhere
async fn delete(id: &str) -> Result<()> {
    let engine = Engine::build().await?;
    let note = engine.find_note(id).await?;
    engine.processor.delete(&note.id).await?;
    println!("Deleted note {}", short_id(&note.id));
    Ok(())
}

/// Back up one or all completed notes
async fn backup(id: Option<&str>) -> Result<()> {
    let engine = Engine::build().await?;

    let storage = drive_client(&engine.config)
        .map(|c| Arc::new(c) as Arc<dyn FileStorage>)
        .context("Google Drive is not configured. Add a [drive] section to config.yaml")?;

    let reconciler = BackupReconciler::new(engine.store.clone(), storage);

    let targets: Vec<Note> = match id {
        Some(prefix) => vec![engine.find_note(prefix).await?],
        None => engine
            .store
            .all_notes()
            .await
            .into_iter()
            .filter(|n| n.status == NoteStatus::Completed)
            .collect(),
    };

    if targets.is_empty() {
        println!("No completed notes to back up");
        return Ok(());
    }

    let mut uploaded = 0usize;
    for note in &targets {
        match reconciler.backup(&note.id).await {
            Ok(report) => {
                if report.audio_uploaded || report.transcript_uploaded {
                    uploaded += 1;
                    println!("Backed up {}", short_id(&note.id));
                }
            }
            Err(e) => eprintln!("Backup failed for {}: {}", short_id(&note.id), e),
        }
    }

    println!(
        "{} of {} note(s) needed uploading; the rest were already mirrored",
        uploaded,
        targets.len()
    );
    Ok(())
}

/// Reconcile with the remote backend and report the merged view
async fn sync_with_remote() -> Result<()> {
    let engine = Engine::build().await?;
    if !engine.remote.enabled() {
        println!("No remote backend configured");
        return Ok(());
    }

    let reconciler = Reconciler::new(engine.store.clone(), engine.remote.clone());

    let templates = reconciler.sync_templates().await;
    let merged = reconciler.merge().await;
    let synced = merged.iter().filter(|n| n.synced_to_remote).count();

    println!("Synced {} template(s)", templates);
    println!(
        "{} note(s) in the merged view, {} synced to the remote",
        merged.len(),
        synced
    );
    Ok(())
}

/// List templates
async fn list_templates() -> Result<()> {
    let engine = Engine::build().await?;
    let templates = engine.store.all_templates().await;

    println!("{:<16} {:<24}", "ID", "NAME");
    println!("{}", "-".repeat(40));
    for template in templates {
        println!("{:<16} {:<24}", template.id, template.name);
    }
    Ok(())
}

/// Drive authorization subcommands
async fn execute_drive(command: DriveCommands) -> Result<()> {
    let config = Config::load()?;
    let client =
        drive_client(&config).context("Google Drive is not configured. Add a [drive] section")?;

    match command {
        DriveCommands::Auth { redirect_uri } => {
            println!("Open this URL and authorize access:\n");
            println!("{}", client.authorize_url(&redirect_uri));
            println!("\nThen run: voxsync drive connect <code>");
            Ok(())
        }
        DriveCommands::Connect { code, redirect_uri } => {
            client.exchange_code(&code, &redirect_uri).await?;
            println!("Drive connected; token saved");
            Ok(())
        }
    }
}

/// Show resolved configuration
async fn show_config() -> Result<()> {
    let config = Config::load()?;

    println!("voxsync configuration");
    println!("{}", "=".repeat(50));
    println!("Home:           {}", config.home.display());
    println!("Data dir:       {}", config.data_dir().display());
    println!("Drain interval: {}s", config.drain_interval.as_secs());
    println!("AI model:       {}", config.ai_model());
    println!(
        "AI key:         {}",
        if config.ai.api_key.is_some() { "set" } else { "(not set)" }
    );
    match &config.remote {
        Some(remote) => println!("Remote:         {}", remote.base_url),
        None => println!("Remote:         (disabled)"),
    }
    match &config.drive {
        Some(_) => {
            println!("Drive backup:   enabled");
            println!("  Token:        {}", config.drive_token_path().display());
            println!("  Root folder:  {}", config.backup_root_folder());
        }
        None => println!("Drive backup:   (disabled)"),
    }

    Ok(())
}

fn print_outcome(note: &Note) {
    match note.status {
        NoteStatus::Completed => {
            println!("Note {} completed", short_id(&note.id));
            if let Some(transcript) = &note.transcript {
                println!("\n{}", transcript);
            }
            if let Some(summary) = &note.summary {
                println!("\n── Summary ──\n{}", summary);
            }
        }
        NoteStatus::Pending => {
            println!(
                "Note {} is queued; backend unreachable. Run 'voxsync drain' when online",
                short_id(&note.id)
            );
        }
        NoteStatus::Error => {
            println!(
                "Note {} failed: {}",
                short_id(&note.id),
                note.error_message.as_deref().unwrap_or("unknown error")
            );
        }
        NoteStatus::Processing => {
            println!("Note {} is already being processed", short_id(&note.id));
        }
    }
}

/// Display prefix of a note id. Local ids are UUIDs, but remote-only notes
/// carry whatever opaque id the backend assigned, so the cut must survive
/// short ids and non-ASCII without panicking.
fn short_id(id: &str) -> &str {
    let end = id
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(id.len());
    &id[..end]
}

/// Audio MIME type from file extension
fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("webm") => "audio/webm",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("ogg") => "audio/ogg",
        _ => "application/octet-stream",
    }
}
