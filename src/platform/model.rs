//! Structured records produced by the catalog client.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Replay availability of an existing reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplayStatus {
    /// The replay window has not opened yet.
    BeforeOpen,
    /// The replay can be watched (and recorded) now.
    Opened,
    /// The replay window is over.
    Closed,
    /// No timeshift setting, or a status string this client does not know.
    Unknown,
}

impl ReplayStatus {
    /// Maps the platform's status string.
    #[must_use]
    pub fn from_platform(value: &str) -> Self {
        match value {
            "BEFORE_OPEN" => Self::BeforeOpen,
            "OPENED" => Self::Opened,
            "CLOSED" => Self::Closed,
            _ => Self::Unknown,
        }
    }

    /// Returns the platform's status string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BeforeOpen => "BEFORE_OPEN",
            Self::Opened => "OPENED",
            Self::Closed => "CLOSED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ReplayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One existing platform-side timeshift reservation.
///
/// Owned by the platform: the system only reads these and requests deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    /// Program identifier (e.g. `lv123456789`).
    pub program_id: String,
    /// Program title, used for logging only.
    pub title: String,
    /// Scheduled open time of the program.
    pub open_time: DateTime<Utc>,
    /// Replay availability status.
    pub status: ReplayStatus,
    /// Viewing ticket expiry; `None` means the ticket does not expire.
    pub ticket_expiry: Option<DateTime<Utc>>,
}

impl Reservation {
    /// Returns true when the viewing ticket expired before `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.ticket_expiry.is_some_and(|expiry| expiry < now)
    }

    /// Returns true when the reservation can no longer be used and only
    /// occupies a slot.
    #[must_use]
    pub fn is_reapable(&self, now: DateTime<Utc>) -> bool {
        self.is_expired(now) || self.status == ReplayStatus::Closed
    }

    /// Returns true when the replay is open and the ticket is still valid.
    #[must_use]
    pub fn is_downloadable(&self, now: DateTime<Utc>) -> bool {
        self.status == ReplayStatus::Opened && !self.is_expired(now)
    }
}

/// Listing state shown on a search card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgramKind {
    /// Currently on air.
    Live,
    /// Scheduled for the future.
    Future,
    /// Replay available.
    Timeshift,
    /// No longer published.
    Closed,
    /// Label not recognized.
    Unknown,
}

impl ProgramKind {
    /// Maps the card's status label text.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "LIVE" => Self::Live,
            "放送予定" => Self::Future,
            "タイムシフト" => Self::Timeshift,
            "公開終了" => Self::Closed,
            _ => Self::Unknown,
        }
    }
}

/// Start time and duration shown on a search card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramTime {
    /// Scheduled (or actual) start time, when the listing shows one.
    pub started_at: Option<DateTime<Utc>>,
    /// Duration in minutes for on-air and past listings; 0 otherwise.
    pub minutes: u32,
}

/// Counters shown on a search card; each may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    /// Visitor count.
    pub visitors: Option<u64>,
    /// Comment count.
    pub comments: Option<u64>,
    /// Timeshift reservation count.
    pub timeshifts: Option<u64>,
}

/// Broadcaster shown on a search card.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    /// Display name.
    pub username: String,
    /// Identifier taken from the provider link.
    pub user_id: String,
    /// Icon image URL.
    pub icon_url: String,
}

/// A discoverable, not-yet-reserved broadcast taken from a search listing.
///
/// This is also the record persisted as `details.json` when a reservation
/// succeeds, so later stages can recover title and provider metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Program identifier.
    pub program_id: String,
    /// Program title.
    pub title: String,
    /// Card description text.
    #[serde(default)]
    pub description: String,
    /// Listing state.
    pub kind: ProgramKind,
    /// Thumbnail image URL (empty when the card had none).
    #[serde(default)]
    pub thumbnail_url: String,
    /// Start time and duration, when the card showed them.
    #[serde(default)]
    pub time: Option<ProgramTime>,
    /// Card counters.
    #[serde(default)]
    pub statistics: Statistics,
    /// Broadcaster.
    #[serde(default)]
    pub provider: Provider,
}

impl Candidate {
    /// Scheduled start time used for ordering and displacement.
    #[must_use]
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.time.and_then(|time| time.started_at)
    }
}

/// Which listing the search page shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    /// Programs on air now.
    OnAir,
    /// Scheduled programs.
    Reserved,
    /// Finished programs.
    Past,
}

impl SearchStatus {
    /// Query parameter value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OnAir => "onair",
            Self::Reserved => "reserved",
            Self::Past => "past",
        }
    }
}

/// Search result ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    RecentDesc,
    RecentAsc,
    TimeshiftCountDesc,
    TimeshiftCountAsc,
    ViewCountDesc,
    ViewCountAsc,
    CommentCountDesc,
    CommentCountAsc,
    UserLevelDesc,
    UserLevelAsc,
}

impl SortOrder {
    /// Query parameter value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RecentDesc => "recentDesc",
            Self::RecentAsc => "recentAsc",
            Self::TimeshiftCountDesc => "timeshiftCountDesc",
            Self::TimeshiftCountAsc => "timeshiftCountAsc",
            Self::ViewCountDesc => "viewCountDesc",
            Self::ViewCountAsc => "viewCountAsc",
            Self::CommentCountDesc => "commentCountDesc",
            Self::CommentCountAsc => "commentCountAsc",
            Self::UserLevelDesc => "userLevelDesc",
            Self::UserLevelAsc => "userLevelAsc",
        }
    }
}

/// Broadcaster category filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    Official,
    Channel,
    Community,
}

impl ProviderType {
    /// Query parameter value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Official => "official",
            Self::Channel => "channel",
            Self::Community => "community",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of one search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Keyword.
    pub word: String,
    /// 1-based page number.
    pub page: u32,
    pub status: SearchStatus,
    pub sort_order: SortOrder,
    pub provider_type: ProviderType,
    pub is_tag_search: bool,
    pub timeshift_is_available: bool,
    pub hide_member_only: bool,
}

impl SearchQuery {
    /// Query for upcoming programs with timeshift enabled, newest first.
    #[must_use]
    pub fn upcoming(word: impl Into<String>, provider_type: ProviderType) -> Self {
        Self {
            word: word.into(),
            page: 1,
            status: SearchStatus::Reserved,
            sort_order: SortOrder::RecentDesc,
            provider_type,
            is_tag_search: false,
            timeshift_is_available: true,
            hide_member_only: false,
        }
    }
}

/// One parsed search results page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchPage {
    /// Cards in page order.
    pub items: Vec<Candidate>,
    /// Whether a previous page exists.
    pub has_prev: bool,
    /// Whether a next page exists.
    pub has_next: bool,
}

/// Platform answer to a reservation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReserveResponse {
    /// Whether the platform accepted the reservation.
    pub accepted: bool,
    /// Platform error code when rejected (e.g. quota reached).
    pub error_code: Option<String>,
    /// Reservation expiry reported on acceptance.
    pub expiry_time: Option<DateTime<Utc>>,
}
