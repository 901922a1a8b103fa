//! Catalog parsing: platform pages into structured records.
//!
//! The [`CatalogParser`] capability isolates the fragile part of the platform
//! surface (embedded JSON blobs and versioned CSS class names) from the
//! scheduler and supervisor. [`NicoHtmlParser`] is the implementation for the
//! current page layout; a future layout gets a new implementation rather than
//! edits to the callers.

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::error::PlatformError;
use super::html::{self, Element, compile_static_regex};
use super::model::{
    Candidate, ProgramKind, ProgramTime, Provider, ReplayStatus, Reservation, SearchPage,
    SearchStatus, Statistics,
};

const OP_LIST: &str = "list reservations";
const OP_SEARCH: &str = "search";

/// Offset of the wall-clock times printed on search cards (JST).
const LISTING_UTC_OFFSET_SECS: i32 = 9 * 3600;

static ACCEPT_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r"Nicolive\.TimeshiftActions\.confirmToWatch\('.+', '(.+)'\);")
});
static STATISTICS_ICON_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"^___program-card-statistics-icon-(.+?)___"));
static HOURS_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"(\d+)時間"));
static MINUTES_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"(\d+)分"));
static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(\d+)/(\d+)/(\d+) (\d+):(\d+)"));

/// Turns raw platform pages into structured records.
pub trait CatalogParser: Send + Sync {
    /// Parses the reservation list page.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Parse`] when the embedded data is missing or malformed.
    fn parse_reservations(&self, html: &str) -> Result<Vec<Reservation>, PlatformError>;

    /// Parses one search results page for a query of the given status.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Parse`] when the card list or a required card
    /// element is missing.
    fn parse_search(&self, html: &str, status: SearchStatus) -> Result<SearchPage, PlatformError>;

    /// Extracts the accept-watch token from the confirmation page.
    ///
    /// `None` means the viewing right was already consumed.
    fn parse_accept_token(&self, html: &str) -> Option<String>;
}

/// Parser for the current platform page layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct NicoHtmlParser;

impl NicoHtmlParser {
    /// Creates a new parser.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddedProps {
    reservations: ReservationList,
}

#[derive(Debug, Deserialize)]
struct ReservationList {
    reservations: Vec<RawReservation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReservation {
    program_id: String,
    program: RawProgram,
    timeshift_setting: Option<RawTimeshiftSetting>,
    #[serde(default)]
    timeshift_ticket: Option<RawTimeshiftTicket>,
}

#[derive(Debug, Deserialize)]
struct RawProgram {
    #[serde(default)]
    title: String,
    schedule: RawSchedule,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSchedule {
    open_time: Value,
}

#[derive(Debug, Deserialize)]
struct RawTimeshiftSetting {
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTimeshiftTicket {
    #[serde(default)]
    expire_time: Option<Value>,
}

impl RawReservation {
    fn into_reservation(self) -> Result<Reservation, PlatformError> {
        let open_time = parse_platform_time(&self.program.schedule.open_time).ok_or_else(|| {
            PlatformError::parse(
                OP_LIST,
                format!("invalid open time for {}", self.program_id),
            )
        })?;
        let status = self
            .timeshift_setting
            .map_or(ReplayStatus::Unknown, |setting| {
                ReplayStatus::from_platform(&setting.status)
            });
        let ticket_expiry = match self.timeshift_ticket.and_then(|ticket| ticket.expire_time) {
            None | Some(Value::Null) => None,
            Some(value) => Some(parse_platform_time(&value).ok_or_else(|| {
                PlatformError::parse(
                    OP_LIST,
                    format!("invalid ticket expiry for {}", self.program_id),
                )
            })?),
        };
        Ok(Reservation {
            program_id: self.program_id,
            title: self.program.title,
            open_time,
            status,
            ticket_expiry,
        })
    }
}

/// Parses a platform timestamp: RFC 3339 text or Unix seconds.
pub(crate) fn parse_platform_time(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|time| time.with_timezone(&Utc)),
        Value::Number(number) => number
            .as_i64()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
        _ => None,
    }
}

impl CatalogParser for NicoHtmlParser {
    fn parse_reservations(&self, html: &str) -> Result<Vec<Reservation>, PlatformError> {
        let script = html::find_by_id(html, "script", "embedded-data")
            .ok_or_else(|| PlatformError::parse(OP_LIST, "embedded-data script not found"))?;
        let props_json = script
            .attr("data-props")
            .ok_or_else(|| PlatformError::parse(OP_LIST, "data-props attribute not found"))?;
        let props: EmbeddedProps = serde_json::from_str(&props_json)
            .map_err(|e| PlatformError::parse(OP_LIST, format!("invalid data-props JSON: {e}")))?;

        props
            .reservations
            .reservations
            .into_iter()
            .map(RawReservation::into_reservation)
            .collect()
    }

    fn parse_search(&self, html: &str, status: SearchStatus) -> Result<SearchPage, PlatformError> {
        let list = html::find_first(html, "ul", "___program-card-list___")
            .ok_or_else(|| PlatformError::parse(OP_SEARCH, "program card list not found"))?;

        let items = list
            .find_all("li", "___program-card___")
            .iter()
            .map(|card| parse_card(card, status))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(items = items.len(), "Parsed search page");

        let mut page = SearchPage {
            items,
            has_prev: false,
            has_next: false,
        };
        for button in html::find_all(html, "button", "___page-selector___") {
            match button.attr("data-name").as_deref() {
                Some("prev") => page.has_prev = true,
                Some("next") => page.has_next = true,
                _ => {}
            }
        }
        Ok(page)
    }

    fn parse_accept_token(&self, html: &str) -> Option<String> {
        ACCEPT_TOKEN_RE
            .captures(html)
            .and_then(|caps| caps.get(1).map(|m| m.as_str().to_string()))
    }
}

fn parse_card(card: &Element<'_>, status: SearchStatus) -> Result<Candidate, PlatformError> {
    let kind = card
        .find("div", "___status-label")
        .map_or(ProgramKind::Unknown, |label| ProgramKind::from_label(&label.text()));
    let thumbnail_url = card
        .find("img", "___program-card-thumbnail-image___")
        .and_then(|img| img.attr("src"))
        .unwrap_or_default();

    let anchor = card
        .find("a", "___program-card-title-anchor___")
        .ok_or_else(|| PlatformError::parse(OP_SEARCH, "program card without title anchor"))?;
    let href = anchor.attr("href").unwrap_or_default();
    let program_id = last_path_segment(&href);
    if program_id.is_empty() {
        return Err(PlatformError::parse(
            OP_SEARCH,
            format!("program card link without program id: '{href}'"),
        ));
    }
    let description = card
        .find("p", "___program-card-description___")
        .map(|p| p.text())
        .unwrap_or_default();

    let (time, statistics) = parse_statistics(card, status);
    let provider = parse_provider(card)?;

    Ok(Candidate {
        program_id,
        title: anchor.text(),
        description,
        kind,
        thumbnail_url,
        time,
        statistics,
        provider,
    })
}

fn parse_statistics(card: &Element<'_>, status: SearchStatus) -> (Option<ProgramTime>, Statistics) {
    let mut time = None;
    let mut statistics = Statistics::default();
    let Some(list) = card.find("ul", "___program-card-statistics___") else {
        return (time, statistics);
    };

    for item in list.find_all("li", "___program-card-statistics-item___") {
        let Some(icon) = item.find("span", "___program-card-statistics-icon-") else {
            time = Some(parse_program_time(status, &item.text()));
            continue;
        };
        let Some(icon_class) = icon.class_with_prefix("___program-card-statistics-icon-") else {
            continue;
        };
        let Some(name) = STATISTICS_ICON_RE
            .captures(&icon_class)
            .and_then(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        else {
            continue;
        };
        let value = parse_count(&item.text());
        match name.as_str() {
            "visitors" => statistics.visitors = value,
            "comment" => statistics.comments = value,
            "timeshift" => statistics.timeshifts = value,
            other => debug!(icon = other, "Ignoring unknown statistics icon"),
        }
    }
    (time, statistics)
}

fn parse_provider(card: &Element<'_>) -> Result<Provider, PlatformError> {
    let block = card
        .find("div", "___program-card-provider___")
        .ok_or_else(|| PlatformError::parse(OP_SEARCH, "program card without provider"))?;
    let username = block
        .find("p", "___program-card-provider-name___")
        .map(|p| p.text())
        .unwrap_or_default();
    let user_url = block
        .find("a", "___program-card-provider-name-link___")
        .and_then(|a| a.attr("href"))
        .ok_or_else(|| PlatformError::parse(OP_SEARCH, "provider link not found"))?;
    let icon_url = block
        .find("img", "___program-card-provider-icon-image___")
        .and_then(|img| img.attr("src"))
        .ok_or_else(|| PlatformError::parse(OP_SEARCH, "provider icon not found"))?;

    Ok(Provider {
        username,
        user_id: last_path_segment(&user_url),
        icon_url,
    })
}

/// Returns the last path segment of a URL or path, without query or fragment.
fn last_path_segment(href: &str) -> String {
    let path = href.split(['?', '#']).next().unwrap_or_default();
    path.rsplit('/').next().unwrap_or_default().to_string()
}

/// Parses a card counter such as `1,234`.
fn parse_count(text: &str) -> Option<u64> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Parses the time line of a card.
///
/// On-air and past listings print a duration (`1時間30分`); upcoming and past
/// listings print a start date (`2024/01/02 20:00`) in JST.
pub(crate) fn parse_program_time(status: SearchStatus, text: &str) -> ProgramTime {
    let mut minutes = 0u32;
    if matches!(status, SearchStatus::OnAir | SearchStatus::Past) {
        let capture_u32 = |re: &Regex| {
            re.captures(text)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<u32>().ok())
        };
        if let Some(hours) = capture_u32(&HOURS_RE) {
            minutes = minutes.saturating_add(hours.saturating_mul(60));
        }
        if let Some(mins) = capture_u32(&MINUTES_RE) {
            minutes = minutes.saturating_add(mins);
        }
    }

    let mut started_at = None;
    if matches!(status, SearchStatus::Reserved | SearchStatus::Past) {
        started_at = DATE_RE.captures(text).and_then(|caps| {
            let field = |index: usize| caps.get(index).and_then(|m| m.as_str().parse::<u32>().ok());
            let year = i32::try_from(field(1)?).ok()?;
            let listing_offset = FixedOffset::east_opt(LISTING_UTC_OFFSET_SECS)?;
            let local = listing_offset
                .with_ymd_and_hms(year, field(2)?, field(3)?, field(4)?, field(5)?, 0)
                .single();
            if local.is_none() {
                warn!(text, "Ignoring out-of-range listing date");
            }
            local.map(|time| time.with_timezone(&Utc))
        });
    }

    ProgramTime { started_at, minutes }
}
