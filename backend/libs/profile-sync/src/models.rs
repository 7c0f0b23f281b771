//! Records exchanged with the profile and feed API

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque user identifier, never empty
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Resolve an identifier from navigation context.
    ///
    /// Absent or blank input yields `None`; callers must then suppress
    /// every query keyed by the id instead of issuing one with a bad key.
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        let raw = raw?.trim();
        if raw.is_empty() {
            None
        } else {
            Some(Self(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-issued pagination token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedCursor(String);

impl FeedCursor {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Cached profile as returned by `profile.getById`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    pub name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    pub tweets_count: u64,
    pub followers_count: u64,
    pub follows_count: u64,
    /// `None` when the viewer is not known to the server
    #[serde(default)]
    pub is_following: Option<bool>,
}

impl ProfileRecord {
    pub fn follow_state(&self) -> FollowState {
        match self.is_following {
            Some(true) => FollowState::Following,
            Some(false) => FollowState::NotFollowing,
            None => FollowState::Unknown,
        }
    }

    pub fn follow_snapshot(&self) -> FollowSnapshot {
        FollowSnapshot {
            is_following: self.is_following,
            followers_count: self.followers_count,
        }
    }

    /// Put back a pair captured with [`ProfileRecord::follow_snapshot`]
    pub fn restore(&mut self, snapshot: FollowSnapshot) {
        self.is_following = snapshot.is_following;
        self.followers_count = snapshot.followers_count;
    }
}

/// Viewer-relative follow state of a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowState {
    Following,
    NotFollowing,
    /// Viewer not authenticated or viewing their own profile
    Unknown,
}

/// The `{is_following, followers_count}` pair as it was before a speculative edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowSnapshot {
    pub is_following: Option<bool>,
    pub followers_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostAuthor {
    pub id: UserId,
    pub name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

/// A post as needed for list rendering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostSummary {
    pub id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub like_count: u64,
    pub liked_by_me: bool,
    #[serde(rename = "user")]
    pub author: PostAuthor,
}

/// One page of `tweet.infiniteProfileFeed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub tweets: Vec<PostSummary>,
    /// Present iff more pages exist
    #[serde(default)]
    pub next_cursor: Option<FeedCursor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleFollowResponse {
    pub added_follow: bool,
}

/// Who is looking at the profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionIdentity {
    Loading,
    Unauthenticated,
    Authenticated { viewer_id: UserId },
}

impl SessionIdentity {
    pub fn viewer_id(&self) -> Option<&UserId> {
        match self {
            SessionIdentity::Authenticated { viewer_id } => Some(viewer_id),
            _ => None,
        }
    }
}
