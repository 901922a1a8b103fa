//! Shared User-Agent strings for platform HTTP clients.
//!
//! Single source for the project URL and UA format so API and search traffic
//! stay consistent and easy to update.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/timeshift";

/// Browser User-Agent sent to the search page.
///
/// The search listing serves a reduced card layout to unknown agents, so the
/// catalog client presents itself as a desktop browser there.
pub(crate) const SEARCH_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Default User-Agent for platform API requests (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("timeshift/{version} (+{PROJECT_UA_URL})")
}
