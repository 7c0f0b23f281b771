//! Feed paginator
//!
//! Accumulates the pages of one user's post feed in the order their cursors
//! were issued. Only one page request is ever in flight, so a late response
//! cannot overtake an earlier one. Switching the bound user drops every page
//! and bumps a generation counter; responses carrying an older generation are
//! discarded instead of appended.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::api::ProfileApi;
use crate::error::{Resource, SyncError, SyncResult};
use crate::metrics::SyncMetrics;
use crate::models::{FeedCursor, FeedPage, PostSummary, UserId};

/// Where the next request starts
#[derive(Debug, Clone, PartialEq, Eq)]
enum NextPage {
    Initial,
    After(FeedCursor),
    Exhausted,
}

#[derive(Debug)]
struct FeedState {
    user_id: Option<UserId>,
    pages: Vec<FeedPage>,
    next: NextPage,
    /// Cursor of the pending request (`Some(None)` for the first page)
    in_flight: Option<Option<FeedCursor>>,
    error: Option<String>,
    generation: u64,
}

impl FeedState {
    fn new() -> Self {
        Self {
            user_id: None,
            pages: Vec::new(),
            next: NextPage::Initial,
            in_flight: None,
            error: None,
            generation: 0,
        }
    }

    fn status(&self) -> FeedStatus {
        if self.user_id.is_none() {
            FeedStatus::NoIdentifier
        } else if self.in_flight.is_some() {
            if self.pages.is_empty() {
                FeedStatus::Loading
            } else {
                FeedStatus::LoadingMore
            }
        } else if self.error.is_some() {
            FeedStatus::Error
        } else if self.pages.is_empty() {
            FeedStatus::Idle
        } else {
            FeedStatus::Ready
        }
    }

    fn has_more(&self) -> bool {
        matches!(self.next, NextPage::After(_))
    }
}

/// Presentation-facing lifecycle of the accumulated feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    /// No profile id could be resolved; nothing will be requested
    NoIdentifier,
    Idle,
    Loading,
    LoadingMore,
    Ready,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingIdentifier,
    InFlight,
    Exhausted,
    NotStarted,
    AlreadyLoaded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Appended { items: usize, has_more: bool },
    /// No request was issued
    Skipped(SkipReason),
    /// The bound user changed while the request was pending
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSnapshot {
    pub user_id: Option<UserId>,
    /// Concatenation of every loaded page, oldest fetch first
    pub items: Vec<PostSummary>,
    pub has_more: bool,
    pub status: FeedStatus,
    pub error: Option<String>,
}

struct Ticket {
    user_id: UserId,
    cursor: Option<FeedCursor>,
    generation: u64,
}

/// Clears the in-flight marker if the request future is dropped before completing
struct InFlightGuard<'a> {
    state: &'a Mutex<FeedState>,
    generation: u64,
    armed: bool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.state.lock();
            if state.generation == self.generation {
                state.in_flight = None;
            }
        }
    }
}

pub struct FeedPaginator {
    api: Arc<dyn ProfileApi>,
    state: Mutex<FeedState>,
    request_timeout: Duration,
    metrics: SyncMetrics,
}

impl FeedPaginator {
    pub fn new(api: Arc<dyn ProfileApi>, request_timeout: Duration) -> Self {
        Self {
            api,
            state: Mutex::new(FeedState::new()),
            request_timeout,
            metrics: SyncMetrics::new(),
        }
    }

    /// Bind the paginator to the profile being viewed.
    ///
    /// A different id resets pagination; pending responses for the old id
    /// will be discarded when they arrive.
    pub fn set_user(&self, user_id: Option<UserId>) {
        let mut state = self.state.lock();
        if state.user_id == user_id {
            return;
        }
        debug!(
            from = ?state.user_id,
            to = ?user_id,
            pages = state.pages.len(),
            "Resetting feed pagination"
        );
        let generation = state.generation + 1;
        *state = FeedState::new();
        state.user_id = user_id;
        state.generation = generation;
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.state.lock().user_id.clone()
    }

    /// Fetch the first page for the bound user
    pub async fn load_initial(&self) -> SyncResult<LoadOutcome> {
        let ticket = {
            let mut state = self.state.lock();
            let Some(user_id) = state.user_id.clone() else {
                return Ok(LoadOutcome::Skipped(SkipReason::MissingIdentifier));
            };
            if state.in_flight.is_some() {
                return Ok(LoadOutcome::Skipped(SkipReason::InFlight));
            }
            if state.next != NextPage::Initial {
                return Ok(LoadOutcome::Skipped(SkipReason::AlreadyLoaded));
            }
            state.in_flight = Some(None);
            state.error = None;
            Ticket {
                user_id,
                cursor: None,
                generation: state.generation,
            }
        };
        self.fetch(ticket).await
    }

    /// Fetch and append the page after the last loaded one
    pub async fn load_more(&self) -> SyncResult<LoadOutcome> {
        let ticket = {
            let mut state = self.state.lock();
            let Some(user_id) = state.user_id.clone() else {
                return Ok(LoadOutcome::Skipped(SkipReason::MissingIdentifier));
            };
            if state.in_flight.is_some() {
                return Ok(LoadOutcome::Skipped(SkipReason::InFlight));
            }
            let cursor = match &state.next {
                NextPage::Initial => return Ok(LoadOutcome::Skipped(SkipReason::NotStarted)),
                NextPage::Exhausted => return Ok(LoadOutcome::Skipped(SkipReason::Exhausted)),
                NextPage::After(cursor) => cursor.clone(),
            };
            state.in_flight = Some(Some(cursor.clone()));
            state.error = None;
            Ticket {
                user_id,
                cursor: Some(cursor),
                generation: state.generation,
            }
        };
        self.fetch(ticket).await
    }

    /// Re-issue whichever request is due, with the same cursor as before
    pub async fn retry(&self) -> SyncResult<LoadOutcome> {
        let not_started = self.state.lock().next == NextPage::Initial;
        if not_started {
            self.load_initial().await
        } else {
            self.load_more().await
        }
    }

    async fn fetch(&self, ticket: Ticket) -> SyncResult<LoadOutcome> {
        let mut guard = InFlightGuard {
            state: &self.state,
            generation: ticket.generation,
            armed: true,
        };

        debug!(
            user_id = %ticket.user_id,
            cursor = ?ticket.cursor,
            "Requesting feed page"
        );
        let response = tokio::time::timeout(
            self.request_timeout,
            self.api
                .get_feed_page(&ticket.user_id, ticket.cursor.as_ref()),
        )
        .await;

        guard.armed = false;
        let mut state = self.state.lock();
        if state.generation != ticket.generation {
            warn!(
                user_id = %ticket.user_id,
                cursor = ?ticket.cursor,
                "Discarding feed page for a profile no longer viewed"
            );
            self.metrics.record_page_fetch("discarded");
            return Ok(LoadOutcome::Discarded);
        }
        state.in_flight = None;

        let result = match response {
            Ok(Ok(page)) => Ok(page),
            Ok(Err(e)) => Err(SyncError::fetch(Resource::FeedPage, e)),
            Err(_) => Err(SyncError::Timeout {
                operation: "get_feed_page",
                after: self.request_timeout,
            }),
        };

        match result {
            Ok(page) => {
                let items = page.tweets.len();
                state.next = match &page.next_cursor {
                    Some(cursor) => NextPage::After(cursor.clone()),
                    None => NextPage::Exhausted,
                };
                state.pages.push(page);
                state.error = None;
                let has_more = state.has_more();
                debug!(
                    user_id = %ticket.user_id,
                    items,
                    pages = state.pages.len(),
                    has_more,
                    "Appended feed page"
                );
                self.metrics.record_page_fetch("appended");
                Ok(LoadOutcome::Appended { items, has_more })
            }
            Err(e) => {
                warn!(
                    user_id = %ticket.user_id,
                    cursor = ?ticket.cursor,
                    kind = e.kind(),
                    error = %e,
                    "Feed page fetch failed"
                );
                state.error = Some(e.to_string());
                self.metrics.record_page_fetch("failed");
                Err(e)
            }
        }
    }

    pub fn has_more(&self) -> bool {
        self.state.lock().has_more()
    }

    pub fn page_count(&self) -> usize {
        self.state.lock().pages.len()
    }

    pub fn items(&self) -> Vec<PostSummary> {
        self.state
            .lock()
            .pages
            .iter()
            .flat_map(|page| page.tweets.iter().cloned())
            .collect()
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        let state = self.state.lock();
        FeedSnapshot {
            user_id: state.user_id.clone(),
            items: state
                .pages
                .iter()
                .flat_map(|page| page.tweets.iter().cloned())
                .collect(),
            has_more: state.has_more(),
            status: state.status(),
            error: state.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiResult;
    use crate::error::ApiError;
    use crate::models::{PostAuthor, ProfileRecord, ToggleFollowResponse};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves `pages` in order, following their cursors "c1", "c2", ...
    struct PagedApi {
        pages: usize,
        fail_cursor: Option<&'static str>,
        calls: AtomicUsize,
    }

    fn post(id: &str) -> PostSummary {
        PostSummary {
            id: id.to_string(),
            content: format!("post {id}"),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            like_count: 0,
            liked_by_me: false,
            author: PostAuthor {
                id: UserId::parse(Some("u1")).unwrap(),
                name: Some("Ada".into()),
                image: None,
            },
        }
    }

    #[async_trait]
    impl ProfileApi for PagedApi {
        async fn get_profile(&self, _id: &UserId) -> ApiResult<ProfileRecord> {
            Err(ApiError::Unavailable("not used".into()))
        }

        async fn get_feed_page(
            &self,
            _user_id: &UserId,
            cursor: Option<&FeedCursor>,
        ) -> ApiResult<FeedPage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if cursor.map(|c| c.as_str()) == self.fail_cursor && cursor.is_some() {
                return Err(ApiError::Unavailable("flaky".into()));
            }
            let index: usize = cursor
                .map(|c| c.as_str().trim_start_matches('c').parse().unwrap())
                .unwrap_or(0);
            let next = index + 1;
            Ok(FeedPage {
                tweets: vec![post(&format!("p{index}a")), post(&format!("p{index}b"))],
                next_cursor: (next < self.pages).then(|| FeedCursor::new(format!("c{next}"))),
            })
        }

        async fn toggle_follow(&self, _user_id: &UserId) -> ApiResult<ToggleFollowResponse> {
            Err(ApiError::Unavailable("not used".into()))
        }
    }

    fn paginator(pages: usize, fail_cursor: Option<&'static str>) -> (Arc<PagedApi>, FeedPaginator) {
        let api = Arc::new(PagedApi {
            pages,
            fail_cursor,
            calls: AtomicUsize::new(0),
        });
        let paginator = FeedPaginator::new(api.clone(), Duration::from_secs(1));
        (api, paginator)
    }

    #[tokio::test]
    async fn test_missing_identifier_issues_no_request() {
        let (api, paginator) = paginator(3, None);
        assert_eq!(
            paginator.load_initial().await.unwrap(),
            LoadOutcome::Skipped(SkipReason::MissingIdentifier)
        );
        assert_eq!(
            paginator.load_more().await.unwrap(),
            LoadOutcome::Skipped(SkipReason::MissingIdentifier)
        );
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
        assert_eq!(paginator.snapshot().status, FeedStatus::NoIdentifier);
    }

    #[tokio::test]
    async fn test_pages_accumulate_until_exhausted() {
        let (api, paginator) = paginator(3, None);
        paginator.set_user(UserId::parse(Some("u1")));

        assert_eq!(
            paginator.load_initial().await.unwrap(),
            LoadOutcome::Appended { items: 2, has_more: true }
        );
        paginator.load_more().await.unwrap();
        assert_eq!(
            paginator.load_more().await.unwrap(),
            LoadOutcome::Appended { items: 2, has_more: false }
        );

        let ids: Vec<String> = paginator.items().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["p0a", "p0b", "p1a", "p1b", "p2a", "p2b"]);

        assert_eq!(
            paginator.load_more().await.unwrap(),
            LoadOutcome::Skipped(SkipReason::Exhausted)
        );
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);
        assert_eq!(paginator.snapshot().status, FeedStatus::Ready);
    }

    #[tokio::test]
    async fn test_load_more_before_first_page_is_skipped() {
        let (_api, paginator) = paginator(3, None);
        paginator.set_user(UserId::parse(Some("u1")));
        assert_eq!(
            paginator.load_more().await.unwrap(),
            LoadOutcome::Skipped(SkipReason::NotStarted)
        );
        paginator.load_initial().await.unwrap();
        assert_eq!(
            paginator.load_initial().await.unwrap(),
            LoadOutcome::Skipped(SkipReason::AlreadyLoaded)
        );
    }

    #[tokio::test]
    async fn test_failure_keeps_pages_and_retry_reuses_cursor() {
        let (api, paginator) = paginator(3, Some("c1"));
        paginator.set_user(UserId::parse(Some("u1")));
        paginator.load_initial().await.unwrap();

        let err = paginator.load_more().await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::FetchFailure {
                resource: Resource::FeedPage,
                ..
            }
        ));
        let snapshot = paginator.snapshot();
        assert_eq!(snapshot.items.len(), 2);
        assert_eq!(snapshot.status, FeedStatus::Error);
        assert!(snapshot.has_more);

        // still the same cursor, still failing, nothing lost
        assert!(paginator.retry().await.is_err());
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);
        assert_eq!(paginator.page_count(), 1);
    }

    #[tokio::test]
    async fn test_set_same_user_keeps_pages() {
        let (_api, paginator) = paginator(3, None);
        paginator.set_user(UserId::parse(Some("u1")));
        paginator.load_initial().await.unwrap();
        paginator.set_user(UserId::parse(Some("u1")));
        assert_eq!(paginator.page_count(), 1);

        paginator.set_user(UserId::parse(Some("u2")));
        assert_eq!(paginator.page_count(), 0);
        assert_eq!(paginator.snapshot().status, FeedStatus::Idle);
    }
}
