pub mod normalize;

pub use normalize::{parse_listing_collection, parse_listing_page, parse_suggestions};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;

use crate::geo;
use crate::models::{CoreError, CoreErrorKind, Listing, ListingPage, Operation, SearchQuery};
use crate::sources::{ListingSource, call_source_with_retry};

pub type FetchResult<T> = Result<T, CoreError>;

const CACHE_CAPACITY: usize = 64;

/// How old a cached page may be before it is fetched again.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FetchPolicy {
    pub stale_after: Duration,
}

impl FetchPolicy {
    /// Always hits the network.
    pub const fn eager() -> Self {
        Self {
            stale_after: Duration::ZERO,
        }
    }

    pub const fn tolerant(stale_after: Duration) -> Self {
        Self { stale_after }
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::eager()
    }
}

#[derive(Clone, Debug)]
pub enum FetchOutcome {
    Ready(Arc<ListingPage>),
    Failed(CoreError),
    /// A newer query was issued before this one resolved.
    Superseded,
}

impl FetchOutcome {
    pub fn page(&self) -> Option<&Arc<ListingPage>> {
        match self {
            Self::Ready(page) => Some(page),
            _ => None,
        }
    }
}

/// Serializable summary of a resolved fetch, for hosts that poll.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchReport {
    Ready { fingerprint: String, total: u64 },
    Failed { fingerprint: String, error: CoreError },
    Superseded { fingerprint: String },
}

type SharedFetch = Shared<BoxFuture<'static, FetchResult<Arc<ListingPage>>>>;

/// A caller's stake in an in-flight request. Dropping it before the request
/// resolves (timeout, task abort) unregisters the request so later callers
/// issue a fresh one.
struct PendingFetch<'a> {
    state: &'a Mutex<FetcherState>,
    fingerprint: String,
    request: SharedFetch,
}

impl Drop for PendingFetch<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock()
            && state
                .in_flight
                .get(&self.fingerprint)
                .is_some_and(|pending| pending.ptr_eq(&self.request))
        {
            state.in_flight.remove(&self.fingerprint);
        }
    }
}

struct CachedPage {
    page: Arc<ListingPage>,
    fetched_at: Instant,
}

#[derive(Default)]
struct FetcherState {
    next_seq: u64,
    latest: Option<(u64, String)>,
    in_flight: HashMap<String, SharedFetch>,
    cache: HashMap<String, CachedPage>,
    current: Option<(String, Arc<ListingPage>)>,
    last_report: Option<(u64, FetchReport)>,
}

impl FetcherState {
    /// Re-issuing the latest fingerprint keeps its sequence number so that
    /// identical concurrent callers all observe the result.
    fn sequence_for(&mut self, fingerprint: &str) -> u64 {
        if let Some((seq, latest)) = &self.latest
            && latest == fingerprint
        {
            return *seq;
        }
        self.next_seq = self.next_seq.saturating_add(1);
        self.latest = Some((self.next_seq, fingerprint.to_string()));
        self.next_seq
    }

    fn is_latest(&self, seq: u64) -> bool {
        self.latest.as_ref().is_some_and(|(latest, _)| *latest == seq)
    }

    /// Applies a ready page and records the report unless a newer sequence
    /// has already reported.
    fn apply_outcome(&mut self, seq: u64, fingerprint: &str, outcome: &FetchOutcome) {
        if self
            .last_report
            .as_ref()
            .is_some_and(|(reported, _)| *reported > seq)
        {
            return;
        }
        let fingerprint = fingerprint.to_string();
        let report = match outcome {
            FetchOutcome::Ready(page) => {
                self.current = Some((fingerprint.clone(), Arc::clone(page)));
                FetchReport::Ready {
                    fingerprint,
                    total: page.total,
                }
            }
            FetchOutcome::Failed(error) => FetchReport::Failed {
                fingerprint,
                error: error.clone(),
            },
            FetchOutcome::Superseded => FetchReport::Superseded { fingerprint },
        };
        self.last_report = Some((seq, report));
    }

    fn remember(&mut self, fingerprint: &str, page: &Arc<ListingPage>) {
        if self.cache.len() >= CACHE_CAPACITY && !self.cache.contains_key(fingerprint) {
            let oldest = self
                .cache
                .iter()
                .min_by_key(|(_, cached)| cached.fetched_at)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                self.cache.remove(&oldest);
            }
        }
        self.cache.insert(
            fingerprint.to_string(),
            CachedPage {
                page: Arc::clone(page),
                fetched_at: Instant::now(),
            },
        );
    }
}

/// Executes listing queries with fingerprint de-duplication, a policy-driven
/// cache, and latest-wins sequencing.
pub struct ResultFetcher {
    source: Arc<dyn ListingSource>,
    state: Mutex<FetcherState>,
}

impl ResultFetcher {
    pub fn new(source: Arc<dyn ListingSource>) -> Self {
        Self {
            source,
            state: Mutex::new(FetcherState::default()),
        }
    }

    pub async fn fetch(&self, query: &SearchQuery, policy: FetchPolicy) -> FetchOutcome {
        let fingerprint = query.fingerprint();

        let (seq, pending) = {
            let mut state = match self.lock_state() {
                Ok(state) => state,
                Err(error) => return FetchOutcome::Failed(error),
            };
            let seq = state.sequence_for(&fingerprint);

            let fresh = state
                .cache
                .get(&fingerprint)
                .filter(|cached| cached.fetched_at.elapsed() < policy.stale_after)
                .map(|cached| Arc::clone(&cached.page));
            if let Some(page) = fresh {
                tracing::debug!(fingerprint = %fingerprint, seq, "serving cached listings");
                let outcome = FetchOutcome::Ready(page);
                state.apply_outcome(seq, &fingerprint, &outcome);
                return outcome;
            }

            let request = state
                .in_flight
                .entry(fingerprint.clone())
                .or_insert_with(|| {
                    tracing::debug!(fingerprint = %fingerprint, seq, "issuing listings request");
                    self.start_request(query)
                })
                .clone();
            (
                seq,
                PendingFetch {
                    state: &self.state,
                    fingerprint: fingerprint.clone(),
                    request,
                },
            )
        };

        let result = pending.request.clone().await;
        drop(pending);

        let mut state = match self.lock_state() {
            Ok(state) => state,
            Err(error) => return FetchOutcome::Failed(error),
        };

        let outcome = match result {
            Ok(page) => {
                state.remember(&fingerprint, &page);
                if state.is_latest(seq) {
                    FetchOutcome::Ready(page)
                } else {
                    tracing::debug!(
                        fingerprint = %fingerprint,
                        seq,
                        "discarding superseded listings"
                    );
                    FetchOutcome::Superseded
                }
            }
            Err(_) if !state.is_latest(seq) => FetchOutcome::Superseded,
            Err(error) => {
                tracing::warn!(
                    fingerprint = %fingerprint,
                    kind = ?error.kind,
                    status = ?error.status,
                    message = %error.message,
                    "listings request failed"
                );
                FetchOutcome::Failed(error)
            }
        };
        state.apply_outcome(seq, &fingerprint, &outcome);
        outcome
    }

    /// Status of the newest fetch that has resolved, including failures that
    /// left `current()` on the previous page.
    pub fn last_report(&self) -> Option<FetchReport> {
        let state = self.lock_state().ok()?;
        state.last_report.as_ref().map(|(_, report)| report.clone())
    }

    /// The most recently applied page.
    pub fn current(&self) -> Option<Arc<ListingPage>> {
        let state = self.lock_state().ok()?;
        state.current.as_ref().map(|(_, page)| Arc::clone(page))
    }

    pub fn current_fingerprint(&self) -> Option<String> {
        let state = self.lock_state().ok()?;
        state.current.as_ref().map(|(fingerprint, _)| fingerprint.clone())
    }

    /// Drops every cached page; in-flight requests are left to finish.
    pub fn invalidate(&self) {
        if let Ok(mut state) = self.lock_state() {
            state.cache.clear();
        }
    }

    pub async fn favorites(&self) -> FetchResult<Vec<Listing>> {
        let raw = call_source_with_retry(
            Operation::Favorites,
            Arc::clone(&self.source),
            |source: &dyn ListingSource| source.favorites(),
        )
        .await?;
        parse_listing_collection(&raw).map_err(|error| error.during(Operation::Favorites))
    }

    fn start_request(&self, query: &SearchQuery) -> SharedFetch {
        let source = Arc::clone(&self.source);
        let query = query.clone();

        async move {
            let query_string = query.fingerprint();
            let raw = call_source_with_retry(
                Operation::SearchListings,
                source,
                move |source: &dyn ListingSource| source.search_listings(&query_string),
            )
            .await?;
            let mut page = parse_listing_page(&raw)
                .map_err(|error| error.during(Operation::SearchListings))?;
            fill_distances(&query, &mut page);
            Ok(Arc::new(page))
        }
        .boxed()
        .shared()
    }

    fn lock_state(&self) -> FetchResult<MutexGuard<'_, FetcherState>> {
        self.state.lock().map_err(|_| {
            CoreError::new(CoreErrorKind::Internal, "result fetcher mutex poisoned")
                .during(Operation::SearchListings)
        })
    }
}

fn fill_distances(query: &SearchQuery, page: &mut ListingPage) {
    let Some(filter) = query.geo else {
        return;
    };
    for listing in &mut page.listings {
        if listing.distance_miles.is_none()
            && let Some(point) = listing.coordinates()
        {
            listing.distance_miles = Some(geo::distance_miles(filter.center, point));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_fingerprint_keeps_sequence() {
        let mut state = FetcherState::default();
        let first = state.sequence_for("page=1");
        assert_eq!(state.sequence_for("page=1"), first);
        let second = state.sequence_for("city=Boston&page=1");
        assert!(second > first);
        assert!(!state.is_latest(first));
        assert!(state.is_latest(second));
    }

    #[test]
    fn cache_evicts_oldest_entry_at_capacity() {
        let mut state = FetcherState::default();
        let page = Arc::new(ListingPage::default());
        for index in 0..=CACHE_CAPACITY {
            state.remember(&format!("page={index}"), &page);
        }
        assert_eq!(state.cache.len(), CACHE_CAPACITY);
    }

    #[test]
    fn older_sequence_never_overwrites_newer_report() {
        let mut state = FetcherState::default();
        let older = state.sequence_for("city=Slowtown&page=1");
        let newer = state.sequence_for("city=Fastville&page=1");
        let page = Arc::new(ListingPage {
            total: 7,
            ..ListingPage::default()
        });

        state.apply_outcome(newer, "city=Fastville&page=1", &FetchOutcome::Ready(page));
        state.apply_outcome(older, "city=Slowtown&page=1", &FetchOutcome::Superseded);

        assert!(matches!(
            state.last_report,
            Some((seq, FetchReport::Ready { total: 7, .. })) if seq == newer
        ));
        assert_eq!(
            state.current.as_ref().map(|(fingerprint, _)| fingerprint.as_str()),
            Some("city=Fastville&page=1")
        );
    }

    #[test]
    fn failure_report_keeps_previous_page_current() {
        let mut state = FetcherState::default();
        let first = state.sequence_for("page=1");
        state.apply_outcome(
            first,
            "page=1",
            &FetchOutcome::Ready(Arc::new(ListingPage::default())),
        );
        let second = state.sequence_for("city=Boston&page=1");
        let error = CoreError::new(CoreErrorKind::HttpStatus, "unavailable").with_status(503);
        state.apply_outcome(second, "city=Boston&page=1", &FetchOutcome::Failed(error));

        assert!(matches!(
            &state.last_report,
            Some((_, FetchReport::Failed { error, .. })) if error.status == Some(503)
        ));
        assert_eq!(
            state.current.as_ref().map(|(fingerprint, _)| fingerprint.as_str()),
            Some("page=1")
        );
    }

    #[test]
    fn report_serializes_with_status_tag() {
        let report = FetchReport::Failed {
            fingerprint: "page=1".to_string(),
            error: CoreError::new(CoreErrorKind::Transport, "connection refused")
                .during(Operation::SearchListings),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"]["kind"], "transport");
        assert_eq!(json["error"]["operation"], "search_listings");
    }

    #[test]
    fn eager_policy_has_no_window() {
        assert_eq!(FetchPolicy::eager().stale_after, Duration::ZERO);
        assert_eq!(FetchPolicy::default(), FetchPolicy::eager());
    }
}
