//! The `reserve` command: search by keyword and fill the reservation list.

use anyhow::{Context, Result};
use chrono::Utc;
use timeshift_core::{
    Candidate, JsonLedger, MetadataStore, NotificationEvent, PassReport, PassStop,
    ProgramSummary, SearchQuery, TimeshiftApi, run_pass,
};
use tracing::{debug, info, instrument};

use super::context::RunContext;
use crate::ProcessExit;
use crate::app_config::SearchWords;

#[instrument(skip_all)]
pub(super) async fn run(ctx: &RunContext) -> Result<ProcessExit> {
    let words = SearchWords::load(&ctx.config.search_words_file)?;
    let client = ctx.authenticated_client().await?;

    let found = gather_candidates(&client, &words, ctx.config.search_pages).await?;
    info!(found = found.len(), "Search finished");

    let ledger_path = ctx.config.ledger_file();
    let ledger = JsonLedger::open(&ledger_path)
        .with_context(|| format!("Failed to open ledger '{}'", ledger_path.display()))?;
    let snapshots = MetadataStore::new(&ctx.config.data_dir);

    let report = run_pass(&client, found, &ledger, &snapshots, Utc::now()).await?;

    for candidate in &report.reserved {
        ctx.notifier
            .send(&NotificationEvent::ReservationCreated(
                ProgramSummary::from_candidate(candidate),
            ))
            .await;
    }

    match &report.stop {
        Some(PassStop::Rejected {
            candidate,
            error_code,
        }) => {
            ctx.notifier
                .send(&NotificationEvent::ReservationFailed {
                    program: ProgramSummary::from_candidate(candidate),
                    error_code: error_code.clone(),
                })
                .await;
        }
        Some(PassStop::QuotaExhausted { program_id }) => {
            debug!(program_id = %program_id, "No slot left for remaining candidates");
        }
        None => {}
    }

    info!(
        reaped = report.reaped.len(),
        evicted = report.evicted.len(),
        reserved = report.reserved.len(),
        "Reserve pass complete"
    );
    Ok(exit_for(&report))
}

/// A rejection fails the run, partially when earlier candidates were
/// reserved. Running out of slots is not a failure.
fn exit_for(report: &PassReport) -> ProcessExit {
    match (&report.stop, report.reserved.is_empty()) {
        (Some(PassStop::Rejected { .. }), true) => ProcessExit::Failure,
        (Some(PassStop::Rejected { .. }), false) => ProcessExit::Partial,
        (Some(PassStop::QuotaExhausted { .. }) | None, _) => ProcessExit::Success,
    }
}

/// Runs every keyword query and concatenates the result cards.
///
/// Paging stops early once the platform reports no next page.
pub(super) async fn gather_candidates(
    api: &dyn TimeshiftApi,
    words: &SearchWords,
    pages: u32,
) -> Result<Vec<Candidate>> {
    let mut found = Vec::new();
    for (provider_type, word) in words.queries() {
        let mut query = SearchQuery::upcoming(word, provider_type);
        for page in 1..=pages {
            query.page = page;
            let result = api
                .search(&query)
                .await
                .with_context(|| format!("Search for '{word}' ({provider_type}) failed"))?;
            debug!(
                word,
                provider = %provider_type,
                page,
                items = result.items.len(),
                "Search page fetched"
            );
            found.extend(result.items);
            if !result.has_next {
                break;
            }
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use timeshift_core::{
        PlatformError, ProgramKind, ProgramTime, Provider, ProviderType, Reservation,
        ReserveResponse, SearchPage, Statistics,
    };

    use super::*;

    fn candidate(id: &str) -> Candidate {
        Candidate {
            program_id: id.to_string(),
            title: format!("title {id}"),
            description: String::new(),
            kind: ProgramKind::Future,
            thumbnail_url: String::new(),
            time: Some(ProgramTime::default()),
            statistics: Statistics::default(),
            provider: Provider::default(),
        }
    }

    /// Answers searches with `pages` pages of one card each, per word.
    struct PagedSearch {
        pages: u32,
        seen: Mutex<Vec<(String, ProviderType, u32)>>,
    }

    #[async_trait]
    impl TimeshiftApi for PagedSearch {
        async fn list_reservations(&self) -> Result<Vec<Reservation>, PlatformError> {
            Ok(Vec::new())
        }
        async fn reserve(&self, _program_id: &str) -> Result<ReserveResponse, PlatformError> {
            unreachable!("search-only fake")
        }
        async fn delete_reservation(&self, _program_id: &str) -> Result<(), PlatformError> {
            unreachable!("search-only fake")
        }
        async fn accept_watch(&self, _program_id: &str) -> Result<(), PlatformError> {
            unreachable!("search-only fake")
        }
        async fn search(&self, query: &SearchQuery) -> Result<SearchPage, PlatformError> {
            self.seen
                .lock()
                .unwrap()
                .push((query.word.clone(), query.provider_type, query.page));
            if query.word == "broken" {
                return Err(PlatformError::http_status("search", 503));
            }
            Ok(SearchPage {
                items: vec![candidate(&format!("lv-{}-{}", query.word, query.page))],
                has_prev: query.page > 1,
                has_next: query.page < self.pages,
            })
        }
    }

    fn words(official: &[&str], channel: &[&str]) -> SearchWords {
        SearchWords {
            official: official.iter().map(ToString::to_string).collect(),
            channel: channel.iter().map(ToString::to_string).collect(),
            community: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_gather_uses_first_page_per_word_by_default() {
        let api = PagedSearch {
            pages: 5,
            seen: Mutex::new(Vec::new()),
        };
        let found = gather_candidates(&api, &words(&["a"], &["b"]), 1)
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|c| c.program_id.as_str()).collect();
        assert_eq!(ids, ["lv-a-1", "lv-b-1"]);
        assert_eq!(
            *api.seen.lock().unwrap(),
            [
                ("a".to_string(), ProviderType::Official, 1),
                ("b".to_string(), ProviderType::Channel, 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_gather_stops_paging_without_next_page() {
        let api = PagedSearch {
            pages: 2,
            seen: Mutex::new(Vec::new()),
        };
        let found = gather_candidates(&api, &words(&["a"], &[]), 4).await.unwrap();
        let ids: Vec<_> = found.iter().map(|c| c.program_id.as_str()).collect();
        assert_eq!(ids, ["lv-a-1", "lv-a-2"]);
    }

    #[tokio::test]
    async fn test_gather_propagates_search_failure_with_word() {
        let api = PagedSearch {
            pages: 1,
            seen: Mutex::new(Vec::new()),
        };
        let err = gather_candidates(&api, &words(&["ok", "broken"], &[]), 1)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("broken"));
    }

    fn report(reserved: &[&str], stop: Option<PassStop>) -> PassReport {
        PassReport {
            reserved: reserved.iter().map(|id| candidate(id)).collect(),
            stop,
            ..PassReport::default()
        }
    }

    fn rejected(id: &str) -> Option<PassStop> {
        Some(PassStop::Rejected {
            candidate: candidate(id),
            error_code: "USER_TIMESHIFT_RESERVATION_LIMIT".to_string(),
        })
    }

    #[test]
    fn test_rejection_after_reservations_is_partial() {
        let exit = exit_for(&report(&["lv1", "lv2"], rejected("lv3")));
        assert_eq!(exit, ProcessExit::Partial);
        assert_eq!(exit.code(), 2);
    }

    #[test]
    fn test_rejection_of_first_candidate_is_failure() {
        let exit = exit_for(&report(&[], rejected("lv1")));
        assert_eq!(exit, ProcessExit::Failure);
        assert_eq!(exit.code(), 1);
    }

    #[test]
    fn test_quota_exhaustion_is_success() {
        let stop = Some(PassStop::QuotaExhausted {
            program_id: "lv9".to_string(),
        });
        assert_eq!(exit_for(&report(&[], stop.clone())), ProcessExit::Success);
        assert_eq!(exit_for(&report(&["lv1"], stop)).code(), 0);
    }

    #[test]
    fn test_quiet_pass_is_success() {
        assert_eq!(exit_for(&report(&[], None)), ProcessExit::Success);
        assert_eq!(exit_for(&report(&["lv1"], None)), ProcessExit::Success);
    }
}
