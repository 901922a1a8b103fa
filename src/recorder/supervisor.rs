//! Supervised retry loop around the recorder.

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::markers::{AttemptVerdict, MarkerTracker, classify_exit};
use super::process::{OutputLine, Recorder, RecorderInvocation, RecorderRun};
use crate::platform::SessionCredential;

/// Recorder working-state file removed around every attempt.
pub const WORKING_STATE_FILE: &str = "conf.db";

/// Why a supervised download did not complete.
#[derive(Debug, Error)]
pub enum DownloadFailure {
    /// The recorder exited with a nonzero status.
    #[error("recorder exited with status {code}")]
    AbnormalExit {
        /// Exit status.
        code: i32,
    },
    /// The recorder was killed by a signal.
    #[error("recorder was terminated by a signal")]
    Terminated,
    /// The recorder could not be launched.
    #[error("failed to launch recorder: {source}")]
    Spawn {
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Waiting for the recorder failed.
    #[error("failed waiting for recorder: {source}")]
    Wait {
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The output directory could not be prepared.
    #[error("output directory error at {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Cancellation was requested.
    #[error("recording cancelled")]
    Cancelled,
}

/// Result of one supervised download.
#[derive(Debug)]
pub struct DownloadOutcome {
    /// Relaunches after clean but incomplete exits.
    pub retry_count: u32,
    /// Failure cause; `None` on success.
    pub failure: Option<DownloadFailure>,
}

impl DownloadOutcome {
    /// Whether the recorder completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Exit code of an abnormal exit, if that was the failure.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self.failure {
            Some(DownloadFailure::AbnormalExit { code }) => Some(code),
            _ => None,
        }
    }
}

/// Drives a recorder until it completes, fails or is cancelled.
///
/// Clean exits without both completion markers are retried immediately and
/// without limit; the recorder is trusted to give up on its own.
#[derive(Clone)]
pub struct Supervisor {
    recorder: Arc<dyn Recorder>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor").finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Creates a supervisor around `recorder`.
    #[must_use]
    pub fn new(recorder: Arc<dyn Recorder>) -> Self {
        Self { recorder }
    }

    /// Records `program_id` into `output_dir`.
    ///
    /// The working-state file is removed before and after every attempt and
    /// once more when the sequence ends, whatever the outcome.
    #[instrument(skip(self, session, cancel), fields(output_dir = %output_dir.display()))]
    pub async fn supervise(
        &self,
        output_dir: &Path,
        program_id: &str,
        session: &SessionCredential,
        cancel: &CancellationToken,
    ) -> DownloadOutcome {
        let invocation = RecorderInvocation {
            output_dir: output_dir.to_path_buf(),
            program_id: program_id.to_string(),
            session: session.clone(),
        };
        let outcome = self.run_attempts(&invocation, cancel).await;
        remove_working_state_logged(output_dir);

        match &outcome.failure {
            None => info!(retry_count = outcome.retry_count, "Recording complete"),
            Some(failure) => {
                error!(retry_count = outcome.retry_count, error = %failure, "Recording failed");
            }
        }
        outcome
    }

    async fn run_attempts(
        &self,
        invocation: &RecorderInvocation,
        cancel: &CancellationToken,
    ) -> DownloadOutcome {
        let mut retry_count = 0u32;
        let failed = |retry_count, failure| DownloadOutcome {
            retry_count,
            failure: Some(failure),
        };

        if let Err(source) = tokio::fs::create_dir_all(&invocation.output_dir).await {
            return failed(
                retry_count,
                DownloadFailure::Io {
                    path: invocation.output_dir.clone(),
                    source,
                },
            );
        }

        loop {
            if let Err(failure) = remove_working_state(&invocation.output_dir) {
                return failed(retry_count, failure);
            }
            if cancel.is_cancelled() {
                return failed(retry_count, DownloadFailure::Cancelled);
            }

            let run = match self.recorder.spawn(invocation) {
                Ok(run) => run,
                Err(source) => return failed(retry_count, DownloadFailure::Spawn { source }),
            };
            let verdict = run_attempt(run, cancel, retry_count).await;
            remove_working_state_logged(&invocation.output_dir);

            match verdict {
                Ok(AttemptVerdict::Complete) => {
                    return DownloadOutcome {
                        retry_count,
                        failure: None,
                    };
                }
                Ok(AttemptVerdict::Incomplete) => {
                    retry_count += 1;
                    info!(retry_count, "Recorder exited before completion; relaunching");
                }
                Ok(AttemptVerdict::Abnormal(Some(code))) => {
                    return failed(retry_count, DownloadFailure::AbnormalExit { code });
                }
                Ok(AttemptVerdict::Abnormal(None)) => {
                    return failed(retry_count, DownloadFailure::Terminated);
                }
                Err(failure) => return failed(retry_count, failure),
            }
        }
    }
}

/// Drains one attempt's output and classifies its exit.
async fn run_attempt(
    mut run: Box<dyn RecorderRun>,
    cancel: &CancellationToken,
    attempt: u32,
) -> Result<AttemptVerdict, DownloadFailure> {
    let mut markers = MarkerTracker::default();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(stop(run).await),
            line = run.next_line() => match line {
                Some(OutputLine::Stdout(line)) => {
                    info!(attempt, "{line}");
                    markers.observe(&line);
                }
                Some(OutputLine::Stderr(line)) => warn!(attempt, "{line}"),
                None => break,
            },
        }
    }

    let exit_code = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(stop(run).await),
        status = run.wait() => status.map_err(|source| DownloadFailure::Wait { source })?,
    };
    debug!(
        attempt,
        ?exit_code,
        playlist_end = markers.saw_playlist_end(),
        comment_done = markers.saw_comment_done(),
        "Recorder exited"
    );
    Ok(classify_exit(&markers, exit_code))
}

async fn stop(mut run: Box<dyn RecorderRun>) -> DownloadFailure {
    info!("Cancellation requested; stopping recorder");
    if let Err(error) = run.kill().await {
        warn!(error = %error, "Failed to kill recorder");
    }
    let _ = run.wait().await;
    DownloadFailure::Cancelled
}

fn remove_working_state(output_dir: &Path) -> Result<(), DownloadFailure> {
    let path = output_dir.join(WORKING_STATE_FILE);
    match std::fs::remove_file(&path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed recorder working state");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(DownloadFailure::Io { path, source }),
    }
}

fn remove_working_state_logged(output_dir: &Path) {
    if let Err(error) = remove_working_state(output_dir) {
        warn!(error = %error, "Failed to remove recorder working state");
    }
}
