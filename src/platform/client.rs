//! HTTP client for the platform: login, session checks and the timeshift API.
//!
//! All requests go through one shared [`reqwest::Client`] built by
//! [`build_http_client`]. Redirects are never followed: login success and
//! session validity are both read from the raw status code.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{CONTENT_TYPE, COOKIE, REFERER, SET_COOKIE, USER_AGENT};
use reqwest::{Client, ClientBuilder, RequestBuilder, Response, redirect};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::TimeshiftApi;
use super::catalog::{CatalogParser, NicoHtmlParser, parse_platform_time};
use super::error::PlatformError;
use super::html::compile_static_regex;
use super::model::{Reservation, ReserveResponse, SearchPage, SearchQuery};
use super::session::{Credentials, SessionCredential, SessionStore};
use crate::user_agent;

const OP_LOGIN: &str = "login";
const OP_SESSION_CHECK: &str = "session check";
const OP_LIST: &str = "list reservations";
const OP_RESERVE: &str = "reserve";
const OP_DELETE: &str = "delete reservation";
const OP_ACCEPT: &str = "accept watch";
const OP_SEARCH: &str = "search";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

static SESSION_COOKIE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"^user_session=([a-z0-9_]+)"));

/// Base URLs of the platform hosts, without trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Login host.
    pub secure: String,
    /// Account host (session check, search referer).
    pub www: String,
    /// Live host (reservation list, search, accept-watch).
    pub live: String,
    /// Live API host (reserve, delete).
    pub live2: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            secure: "https://secure.nicovideo.jp".to_string(),
            www: "https://www.nicovideo.jp".to_string(),
            live: "https://live.nicovideo.jp".to_string(),
            live2: "https://live2.nicovideo.jp".to_string(),
        }
    }
}

impl Endpoints {
    /// Points every host at one base URL (used by tests against a mock server).
    #[must_use]
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            secure: base.clone(),
            www: base.clone(),
            live: base.clone(),
            live2: base,
        }
    }

    fn login(&self) -> String {
        format!("{}/secure/login", self.secure)
    }

    fn my_page(&self) -> String {
        format!("{}/my/", self.www)
    }

    fn reservations_page(&self) -> String {
        format!("{}/embed/timeshift-reservations", self.live)
    }

    fn reserve(&self, program_id: &str) -> String {
        format!(
            "{}/api/v2/programs/{program_id}/timeshift/reservation",
            self.live2
        )
    }

    fn delete_reservations(&self) -> String {
        format!("{}/api/v2/timeshift/reservations", self.live2)
    }

    fn watching_reservation(&self) -> String {
        format!("{}/api/watchingreservation", self.live)
    }

    fn search(&self) -> String {
        format!("{}/search", self.live)
    }
}

/// Network timeouts applied to every platform request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    /// TCP/TLS connect timeout.
    pub connect: Duration,
    /// Whole-request timeout.
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS)
    }
}

impl HttpTimeouts {
    /// Creates timeouts from whole seconds.
    #[must_use]
    pub fn from_secs(connect_secs: u64, request_secs: u64) -> Self {
        Self {
            connect: Duration::from_secs(connect_secs),
            request: Duration::from_secs(request_secs),
        }
    }
}

/// Builds the shared platform HTTP client.
///
/// # Errors
///
/// Returns [`PlatformError::ClientBuild`] when reqwest rejects the configuration.
pub fn build_http_client(timeouts: HttpTimeouts) -> Result<Client, PlatformError> {
    let build = |no_system_proxy: bool| {
        catch_unwind(AssertUnwindSafe(|| {
            let mut builder = base_builder(timeouts);
            if no_system_proxy {
                builder = builder.no_proxy();
            }
            builder.build()
        }))
    };

    match build(false) {
        Ok(result) => result.map_err(|source| PlatformError::ClientBuild { source }),
        Err(_) => {
            // Some sandboxed hosts panic while reading system proxy settings.
            warn!("HTTP client hit system proxy panic; building without proxy lookup");
            match build(true) {
                Ok(result) => result.map_err(|source| PlatformError::ClientBuild { source }),
                Err(_) => Err(PlatformError::ClientBuildPanicked),
            }
        }
    }
}

fn base_builder(timeouts: HttpTimeouts) -> ClientBuilder {
    Client::builder()
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.request)
        .user_agent(user_agent::default_user_agent())
        .redirect(redirect::Policy::none())
        .gzip(true)
}

/// Platform client, optionally bound to an authenticated session.
#[derive(Clone)]
pub struct NicoClient {
    http: Client,
    endpoints: Endpoints,
    parser: Arc<dyn CatalogParser>,
    session: Option<SessionCredential>,
}

impl fmt::Debug for NicoClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NicoClient")
            .field("endpoints", &self.endpoints)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl NicoClient {
    /// Creates an unauthenticated client using the default page parser.
    #[must_use]
    pub fn new(http: Client, endpoints: Endpoints) -> Self {
        Self {
            http,
            endpoints,
            parser: Arc::new(NicoHtmlParser::new()),
            session: None,
        }
    }

    /// Replaces the page parser.
    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn CatalogParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Binds the client to an authenticated session.
    #[must_use]
    pub fn with_session(mut self, session: SessionCredential) -> Self {
        self.session = Some(session);
        self
    }

    /// Returns the bound session, if any.
    #[must_use]
    pub fn session(&self) -> Option<&SessionCredential> {
        self.session.as_ref()
    }

    /// Logs in with account credentials and returns the verified session.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Auth`] when the platform does not answer with a
    /// redirect carrying a session cookie, or the new session fails the check.
    #[instrument(skip(self, credentials), fields(username = %credentials.username))]
    pub async fn login(&self, credentials: &Credentials) -> Result<SessionCredential, PlatformError> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("next_url", "")
            .append_pair("mail", &credentials.username)
            .append_pair("password", &credentials.password)
            .append_pair("submit", "")
            .finish();
        let response = self
            .http
            .post(self.endpoints.login())
            .query(&[("site", "niconico")])
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| PlatformError::from_reqwest(OP_LOGIN, e))?;

        let status = response.status().as_u16();
        if status != 302 {
            return Err(PlatformError::auth(format!("login returned HTTP {status}")));
        }
        let session = session_from_set_cookie(&response)
            .ok_or_else(|| PlatformError::auth("login response carried no session cookie"))?;

        if !self.is_session_valid(&session).await? {
            return Err(PlatformError::auth("new session failed the session check"));
        }
        info!("Logged in");
        Ok(session)
    }

    /// Checks whether `session` is still accepted by the platform.
    ///
    /// # Errors
    ///
    /// Returns a network error when the check cannot be performed; a rejected
    /// session is `Ok(false)`.
    #[instrument(skip(self, session))]
    pub async fn is_session_valid(&self, session: &SessionCredential) -> Result<bool, PlatformError> {
        let response = self
            .http
            .get(self.endpoints.my_page())
            .header(COOKIE, session.cookie_header())
            .send()
            .await
            .map_err(|e| PlatformError::from_reqwest(OP_SESSION_CHECK, e))?;
        let valid = response.status().as_u16() == 200;
        debug!(valid, status = response.status().as_u16(), "Session checked");
        Ok(valid)
    }

    /// Returns a valid session, reusing the cached one when it still works and
    /// logging in (then caching) otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Auth`] when login fails and
    /// [`PlatformError::SessionStore`] when the cache cannot be used.
    #[instrument(skip_all)]
    pub async fn open_session(
        &self,
        store: &dyn SessionStore,
        credentials: &Credentials,
    ) -> Result<SessionCredential, PlatformError> {
        if let Some(cached) = store.load()? {
            if self.is_session_valid(&cached).await? {
                debug!("Reusing cached session");
                return Ok(cached);
            }
            info!("Cached session expired; logging in again");
        }
        let session = self.login(credentials).await?;
        store.save(&session)?;
        Ok(session)
    }

    fn authed(&self, builder: RequestBuilder) -> Result<RequestBuilder, PlatformError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| PlatformError::auth("no active session"))?;
        Ok(builder.header(COOKIE, session.cookie_header()))
    }
}

/// Picks the session token from the last matching `Set-Cookie` header.
fn session_from_set_cookie(response: &Response) -> Option<SessionCredential> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|cookie| {
            SESSION_COOKIE_RE
                .captures(cookie)
                .and_then(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        })
        .last()
        .map(SessionCredential::new)
}

async fn send(operation: &'static str, request: RequestBuilder) -> Result<Response, PlatformError> {
    request
        .send()
        .await
        .map_err(|e| PlatformError::from_reqwest(operation, e))
}

async fn body_text(operation: &'static str, response: Response) -> Result<String, PlatformError> {
    response
        .text()
        .await
        .map_err(|e| PlatformError::from_reqwest(operation, e))
}

fn expect_ok(operation: &'static str, response: &Response) -> Result<(), PlatformError> {
    let status = response.status().as_u16();
    if status == 200 {
        Ok(())
    } else {
        Err(PlatformError::http_status(operation, status))
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    meta: Option<ApiMeta>,
    #[serde(default)]
    data: Option<ReserveData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiMeta {
    status: Option<u16>,
    error_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReserveData {
    expiry_time: Option<Value>,
}

/// Interprets a reserve API answer that already passed the 200/403 status gate.
///
/// `meta.status` decides acceptance; the HTTP status is the fallback when the
/// body carries none.
fn parse_reserve_body(http_status: u16, body: &str) -> Result<ReserveResponse, PlatformError> {
    let envelope: ApiEnvelope = serde_json::from_str(body)
        .map_err(|e| PlatformError::parse(OP_RESERVE, format!("invalid JSON body: {e}")))?;
    let (meta_status, error_code) = envelope
        .meta
        .map_or((None, None), |meta| (meta.status, meta.error_code));
    let accepted = meta_status.unwrap_or(http_status) == 200;
    let expiry_time = envelope
        .data
        .and_then(|data| data.expiry_time)
        .as_ref()
        .and_then(parse_platform_time);
    Ok(ReserveResponse {
        accepted,
        error_code,
        expiry_time,
    })
}

#[async_trait]
impl TimeshiftApi for NicoClient {
    #[instrument(skip(self))]
    async fn list_reservations(&self) -> Result<Vec<Reservation>, PlatformError> {
        let request = self.authed(self.http.get(self.endpoints.reservations_page()))?;
        let response = send(OP_LIST, request).await?;
        expect_ok(OP_LIST, &response)?;
        let html = body_text(OP_LIST, response).await?;
        let reservations = self.parser.parse_reservations(&html)?;
        debug!(count = reservations.len(), "Listed reservations");
        Ok(reservations)
    }

    #[instrument(skip(self))]
    async fn reserve(&self, program_id: &str) -> Result<ReserveResponse, PlatformError> {
        let request = self.authed(self.http.post(self.endpoints.reserve(program_id)))?;
        let response = send(OP_RESERVE, request).await?;
        let status = response.status().as_u16();
        if status != 200 && status != 403 {
            return Err(PlatformError::http_status(OP_RESERVE, status));
        }
        let body = body_text(OP_RESERVE, response).await?;
        let answer = parse_reserve_body(status, &body)?;
        debug!(
            accepted = answer.accepted,
            error_code = answer.error_code.as_deref().unwrap_or(""),
            "Reserve answered"
        );
        Ok(answer)
    }

    #[instrument(skip(self))]
    async fn delete_reservation(&self, program_id: &str) -> Result<(), PlatformError> {
        let request = self.authed(
            self.http
                .delete(self.endpoints.delete_reservations())
                .query(&[("programIds", program_id)]),
        )?;
        let response = send(OP_DELETE, request).await?;
        expect_ok(OP_DELETE, &response)
    }

    #[instrument(skip(self))]
    async fn accept_watch(&self, program_id: &str) -> Result<(), PlatformError> {
        let confirm = self.authed(
            self.http
                .get(self.endpoints.watching_reservation())
                .query(&[("mode", "confirm_watch_my"), ("vid", program_id)]),
        )?;
        let response = send(OP_ACCEPT, confirm).await?;
        expect_ok(OP_ACCEPT, &response)?;
        let html = body_text(OP_ACCEPT, response).await?;

        let Some(token) = self.parser.parse_accept_token(&html) else {
            debug!("No accept token; viewing right already consumed");
            return Ok(());
        };

        let accept = self.authed(self.http.post(self.endpoints.watching_reservation()).query(&[
            ("accept", "true"),
            ("mode", "use"),
            ("vid", program_id),
            ("token", token.as_str()),
        ]))?;
        let response = send(OP_ACCEPT, accept).await?;
        expect_ok(OP_ACCEPT, &response)?;
        info!("Viewing right accepted");
        Ok(())
    }

    #[instrument(skip(self), fields(word = %query.word, page = query.page))]
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, PlatformError> {
        let page = query.page.to_string();
        let request = self
            .http
            .get(self.endpoints.search())
            .header(USER_AGENT, user_agent::SEARCH_USER_AGENT)
            .header(REFERER, format!("{}/", self.endpoints.www))
            .query(&[
                ("q", query.word.as_str()),
                ("page", page.as_str()),
                ("disableGrouping", "true"),
                ("status", query.status.as_str()),
                ("sortOrder", query.sort_order.as_str()),
                ("providerTypes", query.provider_type.as_str()),
                ("isTagSearch", bool_param(query.is_tag_search)),
                ("timeshiftIsAvailable", bool_param(query.timeshift_is_available)),
                ("hideMemberOnly", bool_param(query.hide_member_only)),
            ]);
        let response = send(OP_SEARCH, request).await?;
        expect_ok(OP_SEARCH, &response)?;
        let html = body_text(OP_SEARCH, response).await?;
        self.parser.parse_search(&html, query.status)
    }
}

fn bool_param(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}
