//! Error types for scheduler passes.

use thiserror::Error;

use crate::metadata::MetadataError;
use crate::platform::PlatformError;

/// Errors that abort a scheduler pass.
///
/// A platform rejection of a single reservation is not an error; it ends the
/// pass through [`super::PassStop::Rejected`].
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A platform call failed.
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// The snapshot of a newly reserved program could not be written.
    #[error("failed to persist program snapshot: {0}")]
    Metadata(#[from] MetadataError),
}

impl SchedulerError {
    /// Returns true when the failure was an authentication problem.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Platform(error) if error.is_auth())
    }
}
