//! Profile view session
//!
//! Wires the paginator, the shared profile cache and the session lookup into
//! the page lifecycle: open → parallel profile + first page fetch → scroll
//! triggers `load_more` → toggle goes through the reconciler. Navigating to
//! another id resets pagination and releases the previous profile; once no
//! view shows it, the entry is invalidated and late responses are dropped.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, instrument};

use crate::api::{ProfileApi, SessionProvider};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::models::UserId;
use crate::paginator::{FeedPaginator, FeedSnapshot, LoadOutcome};
use crate::presentation::{follow_control, FollowControl, PluralRules, ProfileHeader};
use crate::reconciler::{
    IgnoreReason, ProfileLoad, ProfileReconciler, ProfileStatus, ToggleOutcome,
};

/// Result of opening or revisiting a profile
#[derive(Debug)]
pub struct ViewLoad {
    pub profile: SyncResult<ProfileLoad>,
    pub feed: SyncResult<LoadOutcome>,
}

/// Everything the presentation layer needs for one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileViewModel {
    pub user_id: Option<UserId>,
    pub header: ProfileHeader,
    pub follow: Option<FollowControl>,
    pub feed: FeedSnapshot,
    pub profile_status: Option<ProfileStatus>,
    pub profile_error: Option<String>,
    pub toggle_error: Option<String>,
}

pub struct ProfileView {
    session: Arc<dyn SessionProvider>,
    profiles: Arc<ProfileReconciler>,
    feed: FeedPaginator,
    current: Mutex<Option<UserId>>,
    toggle_error: Mutex<Option<String>>,
    rules: PluralRules,
}

impl ProfileView {
    pub fn new(
        api: Arc<dyn ProfileApi>,
        session: Arc<dyn SessionProvider>,
        config: &SyncConfig,
    ) -> Self {
        let profiles = Arc::new(ProfileReconciler::new(api.clone(), config.request_timeout));
        Self::with_profiles(api, session, profiles, config)
    }

    /// Share one profile cache between several views
    pub fn with_profiles(
        api: Arc<dyn ProfileApi>,
        session: Arc<dyn SessionProvider>,
        profiles: Arc<ProfileReconciler>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            session,
            profiles,
            feed: FeedPaginator::new(api, config.request_timeout),
            current: Mutex::new(None),
            toggle_error: Mutex::new(None),
            rules: PluralRules::default(),
        }
    }

    pub fn with_plural_rules(mut self, rules: PluralRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn profiles(&self) -> &Arc<ProfileReconciler> {
        &self.profiles
    }

    pub fn feed(&self) -> &FeedPaginator {
        &self.feed
    }

    pub fn current_id(&self) -> Option<UserId> {
        self.current.lock().clone()
    }

    /// Switch the viewed profile without fetching anything
    pub fn navigate(&self, id: Option<UserId>) {
        let previous = {
            let mut current = self.current.lock();
            if *current == id {
                return;
            }
            std::mem::replace(&mut *current, id.clone())
        };
        debug!(from = ?previous, to = ?id, "Navigating profile view");
        if let Some(id) = &id {
            self.profiles.acquire(id);
        }
        if let Some(previous) = previous {
            self.profiles.release(&previous);
        }
        *self.toggle_error.lock() = None;
        self.feed.set_user(id);
    }

    /// Resolve the id from navigation context and fetch profile and first page together
    #[instrument(skip(self))]
    pub async fn open(&self, raw_id: Option<&str>) -> ViewLoad {
        let id = UserId::parse(raw_id);
        self.navigate(id.clone());
        let (profile, feed) = tokio::join!(
            self.profiles.load(id.as_ref()),
            self.feed.load_initial()
        );
        ViewLoad { profile, feed }
    }

    /// End of the list is near
    pub async fn on_scroll_near_end(&self) -> SyncResult<LoadOutcome> {
        self.feed.load_more().await
    }

    pub async fn retry_feed(&self) -> SyncResult<LoadOutcome> {
        self.feed.retry().await
    }

    pub async fn retry_profile(&self) -> SyncResult<ProfileLoad> {
        let id = self.current_id();
        self.profiles.load(id.as_ref()).await
    }

    pub async fn toggle_follow(&self) -> SyncResult<ToggleOutcome> {
        let id = self.current_id().ok_or(SyncError::MissingIdentifier)?;

        let session = self.session.session_identity().await;
        match session.viewer_id() {
            Some(viewer_id) if *viewer_id != id => {}
            _ => {
                debug!(user_id = %id, "Ignoring follow toggle from a viewer without the control");
                return Ok(ToggleOutcome::Ignored(IgnoreReason::NotPermitted));
            }
        }

        let result = self.profiles.toggle_follow(&id).await;
        if self.current_id().as_ref() == Some(&id) {
            let mut toggle_error = self.toggle_error.lock();
            match &result {
                Ok(ToggleOutcome::Confirmed { .. } | ToggleOutcome::Corrected { .. }) => {
                    *toggle_error = None;
                }
                Err(e) => *toggle_error = Some(e.to_string()),
                Ok(_) => {}
            }
        }
        result
    }

    pub async fn render(&self) -> ProfileViewModel {
        let session = self.session.session_identity().await;
        let id = self.current_id();
        let record = id.as_ref().and_then(|id| self.profiles.get(id));

        let follow = id.as_ref().and_then(|id| {
            follow_control(
                &session,
                id,
                record.as_ref().and_then(|r| r.is_following),
                self.profiles.is_toggle_pending(id),
            )
        });

        ProfileViewModel {
            header: ProfileHeader::with_rules(record.as_ref(), self.rules),
            follow,
            feed: self.feed.snapshot(),
            profile_status: id.as_ref().and_then(|id| self.profiles.status(id)),
            profile_error: id.as_ref().and_then(|id| self.profiles.error(id)),
            toggle_error: self.toggle_error.lock().clone(),
            user_id: id,
        }
    }
}

impl Drop for ProfileView {
    fn drop(&mut self) {
        if let Some(id) = self.current.get_mut().take() {
            self.profiles.release(&id);
        }
    }
}
