//! The `download` command: record every reservation whose replay is open.

use std::io;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use thiserror::Error;
use timeshift_core::{
    DownloadFailure, JsonLedger, Ledger, LivedlRecorder, MetadataStore, NicoClient,
    NotificationEvent, Notifier, ProgramSummary, Reservation, SessionCredential, Supervisor,
    TimeshiftApi,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use super::context::RunContext;
use crate::ProcessExit;

/// Extension of the database file livedl produces.
const ARTIFACT_EXTENSION: &str = "sqlite3";

#[derive(Debug, Error)]
enum RunError {
    #[error("recorder reported success for {program_id} but {} is missing", path.display())]
    MissingArtifact { program_id: String, path: PathBuf },
}

/// How one program ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProgramResult {
    Recorded,
    /// Left for the next run.
    Failed,
    Cancelled,
}

/// Collaborators shared by every program of one run.
struct Recording<'a> {
    supervisor: &'a Supervisor,
    snapshots: &'a MetadataStore,
    notifier: &'a Notifier,
    cancel: &'a CancellationToken,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct DownloadTally {
    completed: usize,
    failed: usize,
}

impl DownloadTally {
    /// Counts `result`; a cancellation ends the run.
    fn add(&mut self, result: ProgramResult) -> ControlFlow<()> {
        match result {
            ProgramResult::Recorded => self.completed += 1,
            ProgramResult::Failed => self.failed += 1,
            ProgramResult::Cancelled => {
                self.failed += 1;
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn exit(self) -> ProcessExit {
        match (self.completed, self.failed) {
            (_, 0) => ProcessExit::Success,
            (0, _) => ProcessExit::Failure,
            _ => ProcessExit::Partial,
        }
    }
}

#[instrument(skip_all)]
pub(super) async fn run(ctx: &RunContext) -> Result<ProcessExit> {
    let mut client = ctx.authenticated_client().await?;

    let ledger_path = ctx.config.ledger_file();
    let mut ledger = JsonLedger::open(&ledger_path)
        .with_context(|| format!("Failed to open ledger '{}'", ledger_path.display()))?;
    let snapshots = MetadataStore::new(&ctx.config.data_dir);
    let supervisor = Supervisor::new(Arc::new(LivedlRecorder::new(&ctx.config.recorder_path)));
    let recording = Recording {
        supervisor: &supervisor,
        snapshots: &snapshots,
        notifier: &ctx.notifier,
        cancel: &ctx.cancel,
    };

    let pending = pending_downloads(client.list_reservations().await?, &ledger, Utc::now());
    info!(pending = pending.len(), "Replays ready to record");

    let mut tally = DownloadTally::default();
    for reservation in pending {
        if ctx.cancel.is_cancelled() {
            warn!("Cancellation requested; leaving remaining replays for the next run");
            break;
        }
        client = refresh_session(ctx, client).await?;
        let Some(session) = client.session().cloned() else {
            anyhow::bail!("no session bound after login");
        };
        let result = record_program(&client, &reservation, &session, &recording, &mut ledger).await?;
        if tally.add(result).is_break() {
            break;
        }
    }

    info!(
        completed = tally.completed,
        failed = tally.failed,
        "Download run finished"
    );
    Ok(tally.exit())
}

/// Accepts the viewing right, records the replay and, once the artifact is on
/// disk, notifies and adds the program to the ledger.
///
/// Recorder failures and a missing artifact are `Ok(Failed)`: the program
/// stays out of the ledger and is retried next run.
#[instrument(skip_all, fields(program_id = %reservation.program_id))]
async fn record_program(
    api: &dyn TimeshiftApi,
    reservation: &Reservation,
    session: &SessionCredential,
    recording: &Recording<'_>,
    ledger: &mut dyn Ledger,
) -> Result<ProgramResult> {
    let program_id = reservation.program_id.as_str();
    api.accept_watch(program_id).await?;

    let output_dir = recording.snapshots.program_dir(program_id);
    info!(title = %reservation.title, "Recording replay");
    let outcome = recording
        .supervisor
        .supervise(&output_dir, program_id, session, recording.cancel)
        .await;

    match outcome.failure {
        None => {}
        Some(DownloadFailure::Cancelled) => {
            warn!("Recording cancelled");
            return Ok(ProgramResult::Cancelled);
        }
        Some(failure) => {
            warn!(error = %failure, "Replay not recorded; will retry next run");
            return Ok(ProgramResult::Failed);
        }
    }

    let artifact = artifact_path(&output_dir, program_id);
    let size_bytes = match artifact_size(&artifact)
        .with_context(|| format!("Failed to inspect recording '{}'", artifact.display()))?
    {
        Some(size_bytes) => size_bytes,
        None => {
            let err = RunError::MissingArtifact {
                program_id: program_id.to_string(),
                path: artifact,
            };
            error!(error = %err, "Recording produced no output");
            recording
                .notifier
                .send(&NotificationEvent::UnhandledError {
                    message: err.to_string(),
                })
                .await;
            return Ok(ProgramResult::Failed);
        }
    };

    let program = match recording.snapshots.read(program_id) {
        Ok(Some(candidate)) => ProgramSummary::from_candidate(&candidate),
        Ok(None) => ProgramSummary {
            title: reservation.title.clone(),
            ..ProgramSummary::default()
        },
        Err(err) => {
            warn!(error = %err, "Program details unreadable");
            ProgramSummary {
                title: reservation.title.clone(),
                ..ProgramSummary::default()
            }
        }
    };
    recording
        .notifier
        .send(&NotificationEvent::DownloadCompleted {
            program,
            retry_count: outcome.retry_count,
            size_bytes,
        })
        .await;

    ledger.record(program_id)?;
    Ok(ProgramResult::Recorded)
}

/// Reservations with an open, unexpired replay that are not yet in the ledger,
/// in platform order.
fn pending_downloads(
    reservations: Vec<Reservation>,
    ledger: &dyn Ledger,
    now: DateTime<Utc>,
) -> Vec<Reservation> {
    reservations
        .into_iter()
        .filter(|reservation| reservation.is_downloadable(now))
        .filter(|reservation| !ledger.contains(&reservation.program_id))
        .collect()
}

/// Re-logs in when the bound session has expired, e.g. during a long recording.
async fn refresh_session(ctx: &RunContext, client: NicoClient) -> Result<NicoClient> {
    if let Some(session) = client.session()
        && client.is_session_valid(session).await?
    {
        return Ok(client);
    }
    info!("Session expired between recordings; logging in again");
    ctx.authenticated_client().await
}

fn artifact_path(output_dir: &Path, program_id: &str) -> PathBuf {
    output_dir.join(format!("{program_id}.{ARTIFACT_EXTENSION}"))
}

/// Size of the recording, or `None` when it does not exist.
fn artifact_size(path: &Path) -> io::Result<Option<u64>> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.len())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}
