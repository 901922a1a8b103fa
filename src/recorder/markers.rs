//! Completion markers in recorder output and the per-attempt exit verdict.

/// Printed when the replay playlist was fully fetched.
pub const PLAYLIST_END_MARKER: &str = "playlist end.";
/// Printed when the comment stream was fully fetched.
pub const COMMENT_DONE_MARKER: &str = "Comment done.";

/// Tracks which completion markers one recorder attempt has printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkerTracker {
    saw_playlist_end: bool,
    saw_comment_done: bool,
}

impl MarkerTracker {
    /// Scans one stdout line.
    pub fn observe(&mut self, line: &str) {
        if line.contains(PLAYLIST_END_MARKER) {
            self.saw_playlist_end = true;
        }
        if line.contains(COMMENT_DONE_MARKER) {
            self.saw_comment_done = true;
        }
    }

    /// Whether the playlist marker was seen.
    #[must_use]
    pub fn saw_playlist_end(&self) -> bool {
        self.saw_playlist_end
    }

    /// Whether the comment marker was seen.
    #[must_use]
    pub fn saw_comment_done(&self) -> bool {
        self.saw_comment_done
    }

    /// Whether both markers were seen.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.saw_playlist_end && self.saw_comment_done
    }
}

/// What to do after one recorder attempt exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptVerdict {
    /// Both markers seen and a clean exit.
    Complete,
    /// Clean exit without both markers; relaunch.
    Incomplete,
    /// Nonzero exit, or killed by a signal (`None`).
    Abnormal(Option<i32>),
}

/// Classifies an attempt from its markers and exit code.
///
/// Only a clean exit can succeed or be retried; any nonzero or missing exit
/// code is abnormal even when both markers were printed.
#[must_use]
pub fn classify_exit(markers: &MarkerTracker, exit_code: Option<i32>) -> AttemptVerdict {
    match exit_code {
        Some(0) if markers.is_complete() => AttemptVerdict::Complete,
        Some(0) => AttemptVerdict::Incomplete,
        other => AttemptVerdict::Abnormal(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(lines: &[&str]) -> MarkerTracker {
        let mut markers = MarkerTracker::default();
        for line in lines {
            markers.observe(line);
        }
        markers
    }

    #[test]
    fn test_markers_match_substrings() {
        let markers = tracker(&["[info] playlist end.", "x Comment done. y"]);
        assert!(markers.saw_playlist_end());
        assert!(markers.saw_comment_done());
        assert!(markers.is_complete());
    }

    #[test]
    fn test_markers_are_case_sensitive() {
        let markers = tracker(&["Playlist End.", "comment done."]);
        assert!(!markers.saw_playlist_end());
        assert!(!markers.saw_comment_done());
    }

    #[test]
    fn test_classify_complete_requires_clean_exit() {
        let both = tracker(&["playlist end.", "Comment done."]);
        assert_eq!(classify_exit(&both, Some(0)), AttemptVerdict::Complete);
        assert_eq!(classify_exit(&both, Some(1)), AttemptVerdict::Abnormal(Some(1)));
        assert_eq!(classify_exit(&both, None), AttemptVerdict::Abnormal(None));
    }

    #[test]
    fn test_classify_incomplete_clean_exit_retries() {
        let one = tracker(&["playlist end."]);
        assert_eq!(classify_exit(&one, Some(0)), AttemptVerdict::Incomplete);
        assert_eq!(
            classify_exit(&MarkerTracker::default(), Some(0)),
            AttemptVerdict::Incomplete
        );
    }

    #[test]
    fn test_classify_nonzero_without_markers_is_abnormal() {
        assert_eq!(
            classify_exit(&MarkerTracker::default(), Some(2)),
            AttemptVerdict::Abnormal(Some(2))
        );
    }
}
