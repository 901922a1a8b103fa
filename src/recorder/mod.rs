//! Recorder supervision.
//!
//! The [`Supervisor`] launches the external recorder for one program, watches
//! its standard output for the two completion markers and relaunches it after
//! clean but incomplete exits. The process itself sits behind the
//! [`Recorder`] / [`RecorderRun`] capability so the retry state machine can be
//! driven by scripted fakes.

mod markers;
mod process;
mod supervisor;

pub use markers::{
    AttemptVerdict, COMMENT_DONE_MARKER, MarkerTracker, PLAYLIST_END_MARKER, classify_exit,
};
pub use process::{
    LivedlRecorder, OutputLine, Recorder, RecorderInvocation, RecorderRun, livedl_args,
};
pub use supervisor::{DownloadFailure, DownloadOutcome, Supervisor, WORKING_STATE_FILE};
