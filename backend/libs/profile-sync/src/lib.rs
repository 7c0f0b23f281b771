//! Client-side core of the profile page
//!
//! Keeps a profile view consistent without full refetches:
//! - Cursor-paginated post feed, appended strictly in cursor order
//! - Keyed profile cache with optimistic follow toggle, reconciliation and rollback
//! - Stale responses dropped after navigating to another profile
//! - Count labels and follow-control gating for the header
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use profile_sync::{ProfileView, SessionIdentity, StaticSession, SyncConfig, TrpcProfileApi};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig::from_env()?;
//! let api = Arc::new(TrpcProfileApi::from_config(&config)?);
//! let session = Arc::new(StaticSession(SessionIdentity::Unauthenticated));
//!
//! let view = ProfileView::new(api, session, &config);
//! view.open(Some("clx9a2")).await;
//! view.on_scroll_near_end().await?;
//! let frame = view.render().await;
//! println!("{} posts", frame.feed.items.len());
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod metrics;

pub mod api;
pub mod models;
pub mod paginator;
pub mod presentation;
pub mod reconciler;
pub mod view;

pub use api::{ApiResult, ProfileApi, SessionProvider, StaticSession, TrpcProfileApi};
pub use config::SyncConfig;
pub use error::{ApiError, Resource, SyncError, SyncResult};
pub use metrics::SyncMetrics;
pub use models::{
    FeedCursor, FeedPage, FollowSnapshot, FollowState, PostAuthor, PostSummary, ProfileRecord,
    SessionIdentity, ToggleFollowResponse, UserId,
};
pub use paginator::{FeedPaginator, FeedSnapshot, FeedStatus, LoadOutcome, SkipReason};
pub use presentation::{
    follow_control, plural_category, plural_label, FollowControl, PluralCategory, PluralRules,
    ProfileHeader,
};
pub use reconciler::{
    IgnoreReason, ProfileLoad, ProfileReconciler, ProfileStatus, ProfileStore, ToggleOutcome,
};
pub use view::{ProfileView, ProfileViewModel, ViewLoad};
