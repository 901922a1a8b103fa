//! Timeshift Recorder Core Library
//!
//! This library reserves time-limited live-stream replays ("timeshifts") on
//! the platform under its fixed reservation quota, and drives an external
//! recorder process to capture each opened replay to disk.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`platform`] - Session login, reservation/search HTTP calls and HTML parsing
//! - [`scheduler`] - Quota-constrained slot scheduler (plan, then apply)
//! - [`recorder`] - Recorder process capability and the download supervisor
//! - [`ledger`] - Append-only record of fully downloaded programs
//! - [`metadata`] - Per-program `details.json` snapshots
//! - [`notify`] - Best-effort webhook notifications

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod ledger;
pub mod metadata;
pub mod notify;
pub mod platform;
pub mod recorder;
pub mod scheduler;
mod user_agent;

// Re-export commonly used types
pub use ledger::{InMemoryLedger, JsonLedger, Ledger, LedgerError};
pub use metadata::{MetadataError, MetadataStore};
pub use notify::{NotificationEvent, Notifier, ProgramSummary};
pub use platform::{
    Candidate, CatalogParser, Credentials, Endpoints, FileSessionStore, HttpTimeouts,
    NicoClient, NicoHtmlParser, PlatformError, ProgramKind, ProgramTime, Provider, ProviderType,
    ReplayStatus, Reservation, ReserveResponse, SearchPage, SearchQuery, SearchStatus,
    SessionCredential, SessionStore, SortOrder, Statistics, TimeshiftApi, build_http_client,
};
pub use recorder::{
    DownloadFailure, DownloadOutcome, LivedlRecorder, MarkerTracker, OutputLine, Recorder,
    RecorderInvocation, RecorderRun, Supervisor,
};
pub use scheduler::{
    PassPlan, PassReport, PassStop, PlannedAction, RESERVATION_CAPACITY, ReapReason,
    SchedulerError, apply_plan, plan_pass, prepare_candidates, run_pass,
};
