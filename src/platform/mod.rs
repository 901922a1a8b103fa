//! Platform access: session handling, page parsing and the timeshift API.
//!
//! The scheduler and download driver only see the [`TimeshiftApi`] trait, so
//! they can be exercised against in-memory fakes. [`NicoClient`] is the HTTP
//! implementation.

mod catalog;
mod client;
mod error;
pub(crate) mod html;
mod model;
mod session;

use async_trait::async_trait;

pub use catalog::{CatalogParser, NicoHtmlParser};
pub use client::{Endpoints, HttpTimeouts, NicoClient, build_http_client};
pub use error::PlatformError;
pub use model::{
    Candidate, ProgramKind, ProgramTime, Provider, ProviderType, ReplayStatus, Reservation,
    ReserveResponse, SearchPage, SearchQuery, SearchStatus, SortOrder, Statistics,
};
pub use session::{Credentials, FileSessionStore, SessionCredential, SessionStore};

/// Reservation operations the scheduler and download driver depend on.
#[async_trait]
pub trait TimeshiftApi: Send + Sync {
    /// Lists the account's current timeshift reservations, in platform order.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] on transport, status or parse failures.
    async fn list_reservations(&self) -> Result<Vec<Reservation>, PlatformError>;

    /// Requests a reservation for `program_id`.
    ///
    /// A quota or eligibility rejection is `Ok` with `accepted == false`.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] when the platform answers outside 200/403 or
    /// the body cannot be read.
    async fn reserve(&self, program_id: &str) -> Result<ReserveResponse, PlatformError>;

    /// Deletes the reservation for `program_id`.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::HttpStatus`] for any status other than 200.
    async fn delete_reservation(&self, program_id: &str) -> Result<(), PlatformError>;

    /// Consumes the one-time viewing right; already consumed is success.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] on transport or status failures.
    async fn accept_watch(&self, program_id: &str) -> Result<(), PlatformError>;

    /// Runs one search query and returns the parsed page.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] on transport, status or parse failures.
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, PlatformError>;
}
