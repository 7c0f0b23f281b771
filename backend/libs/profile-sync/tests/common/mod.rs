#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use profile_sync::{
    ApiError, ApiResult, FeedCursor, FeedPage, PostAuthor, PostSummary, ProfileApi,
    ProfileRecord, ToggleFollowResponse, UserId,
};
use tokio::sync::oneshot;

pub fn id(raw: &str) -> UserId {
    UserId::parse(Some(raw)).unwrap()
}

pub fn post(author: &str, post_id: &str) -> PostSummary {
    PostSummary {
        id: post_id.to_string(),
        content: format!("content of {post_id}"),
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        like_count: 1,
        liked_by_me: false,
        author: PostAuthor {
            id: id(author),
            name: Some(author.to_uppercase()),
            image: None,
        },
    }
}

pub fn page(author: &str, post_ids: &[&str], next: Option<&str>) -> FeedPage {
    FeedPage {
        tweets: post_ids.iter().map(|p| post(author, p)).collect(),
        next_cursor: next.map(FeedCursor::new),
    }
}

pub fn profile(is_following: Option<bool>, followers_count: u64) -> ProfileRecord {
    ProfileRecord {
        name: Some("Ada".to_string()),
        image: None,
        tweets_count: 2,
        followers_count,
        follows_count: 5,
        is_following,
    }
}

fn feed_key(user_id: &UserId, cursor: Option<&FeedCursor>) -> String {
    format!(
        "feed:{}:{}",
        user_id,
        cursor.map(|c| c.as_str()).unwrap_or("-")
    )
}

/// Scripted in-memory API.
///
/// Responses are keyed by call label (`profile:{id}`, `feed:{id}:{cursor|-}`,
/// `toggle:{id}`). A held label waits until its gate is released, which lets
/// tests interleave navigation and late responses deterministically.
#[derive(Default)]
pub struct MockApi {
    profiles: Mutex<HashMap<String, VecDeque<ApiResult<ProfileRecord>>>>,
    pages: Mutex<HashMap<String, VecDeque<ApiResult<FeedPage>>>>,
    toggles: Mutex<HashMap<String, VecDeque<ApiResult<bool>>>>,
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    calls: Mutex<Vec<String>>,
}

fn next_response<T>(
    map: &Mutex<HashMap<String, VecDeque<ApiResult<T>>>>,
    label: &str,
    clone: impl Fn(&T) -> T,
) -> ApiResult<T> {
    let mut map = map.lock();
    let Some(queue) = map.get_mut(label) else {
        return Err(ApiError::Unavailable(format!("no response scripted for {label}")));
    };
    if queue.len() > 1 {
        return queue
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Unavailable(label.to_string())));
    }
    // the last scripted response repeats
    match queue.front() {
        Some(Ok(value)) => Ok(clone(value)),
        Some(Err(e)) => Err(ApiError::Unavailable(e.to_string())),
        None => Err(ApiError::Unavailable(label.to_string())),
    }
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(self, user: &str, result: ApiResult<ProfileRecord>) -> Self {
        self.profiles
            .lock()
            .entry(format!("profile:{user}"))
            .or_default()
            .push_back(result);
        self
    }

    pub fn with_page(self, user: &str, cursor: Option<&str>, result: ApiResult<FeedPage>) -> Self {
        let cursor = cursor.map(FeedCursor::new);
        self.pages
            .lock()
            .entry(feed_key(&id(user), cursor.as_ref()))
            .or_default()
            .push_back(result);
        self
    }

    pub fn with_toggle(self, user: &str, result: ApiResult<bool>) -> Self {
        self.toggles
            .lock()
            .entry(format!("toggle:{user}"))
            .or_default()
            .push_back(result);
        self
    }

    /// Hold the next call with `label` until the returned sender fires
    pub fn hold(&self, label: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().insert(label.to_string(), rx);
        tx
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    async fn enter(&self, label: &str) {
        self.calls.lock().push(label.to_string());
        let gate = self.gates.lock().remove(label);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
    }
}

pub fn unavailable(reason: &str) -> ApiError {
    ApiError::Unavailable(reason.to_string())
}

#[async_trait]
impl ProfileApi for MockApi {
    async fn get_profile(&self, user_id: &UserId) -> ApiResult<ProfileRecord> {
        let label = format!("profile:{user_id}");
        self.enter(&label).await;
        next_response(&self.profiles, &label, Clone::clone)
    }

    async fn get_feed_page(
        &self,
        user_id: &UserId,
        cursor: Option<&FeedCursor>,
    ) -> ApiResult<FeedPage> {
        let label = feed_key(user_id, cursor);
        self.enter(&label).await;
        next_response(&self.pages, &label, Clone::clone)
    }

    async fn toggle_follow(&self, user_id: &UserId) -> ApiResult<ToggleFollowResponse> {
        let label = format!("toggle:{user_id}");
        self.enter(&label).await;
        next_response(&self.toggles, &label, |b| *b)
            .map(|added_follow| ToggleFollowResponse { added_follow })
    }
}

/// Route crate logs to the test writer; `RUST_LOG=profile_sync=debug` to see them
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
