//! Profile cache reconciler
//!
//! Keeps one cached [`ProfileRecord`] per profile id and applies the follow
//! toggle optimistically:
//!
//! 1. snapshot `{is_following, followers_count}` and apply the speculative
//!    edit under the store lock, before the request is dispatched
//! 2. on confirmation, set the pair to the server-confirmed direction,
//!    computed from the snapshot so a racing toggle elsewhere converges
//! 3. on failure, restore the snapshot
//! 4. if the entry was invalidated meanwhile, drop the response
//!
//! A pending toggle blocks further toggles for the same id. Views register
//! the id they show with [`ProfileReconciler::acquire`]; an entry is dropped
//! only when the last of them releases it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::api::ProfileApi;
use crate::error::{Resource, SyncError, SyncResult};
use crate::metrics::SyncMetrics;
use crate::models::{FollowSnapshot, FollowState, ProfileRecord, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileStatus {
    Loading,
    Ready,
    Error,
}

#[derive(Debug)]
struct ProfileEntry {
    record: Option<ProfileRecord>,
    status: ProfileStatus,
    error: Option<String>,
    /// Pre-edit pair of the outstanding toggle
    pending: Option<FollowSnapshot>,
    /// A toggle ended without a server answer; the next load refetches
    stale: bool,
    generation: u64,
}

/// Explicit keyed store of profile records
#[derive(Debug, Default)]
pub struct ProfileStore {
    entries: HashMap<UserId, ProfileEntry>,
    /// Number of views currently showing each id
    viewers: HashMap<UserId, usize>,
    generations: u64,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &UserId) -> Option<&ProfileRecord> {
        self.entries.get(id).and_then(|entry| entry.record.as_ref())
    }

    pub fn status(&self, id: &UserId) -> Option<ProfileStatus> {
        self.entries.get(id).map(|entry| entry.status)
    }

    pub fn error(&self, id: &UserId) -> Option<&str> {
        self.entries.get(id).and_then(|entry| entry.error.as_deref())
    }

    pub fn is_toggle_pending(&self, id: &UserId) -> bool {
        self.entries
            .get(id)
            .is_some_and(|entry| entry.pending.is_some())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop the entry; responses still in flight for it will be discarded
    pub fn invalidate(&mut self, id: &UserId) -> bool {
        self.entries.remove(id).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn acquire(&mut self, id: &UserId) -> usize {
        let count = self.viewers.entry(id.clone()).or_default();
        *count += 1;
        *count
    }

    /// Returns `true` once the last viewer of `id` is gone
    fn release(&mut self, id: &UserId) -> bool {
        match self.viewers.get_mut(id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            _ => {
                self.viewers.remove(id);
                true
            }
        }
    }

    fn live_entry_mut(&mut self, id: &UserId, generation: u64) -> Option<&mut ProfileEntry> {
        self.entries
            .get_mut(id)
            .filter(|entry| entry.generation == generation)
    }

    fn next_generation(&mut self) -> u64 {
        self.generations += 1;
        self.generations
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileLoad {
    Loaded,
    /// Already cached for this id; no request issued
    Cached,
    InFlight,
    MissingIdentifier,
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NotLoaded,
    /// Viewer-relative state unknown; the control is not offered
    Unknown,
    Pending,
    /// Viewer signed out or looking at their own profile
    NotPermitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Server agreed with the speculative edit
    Confirmed { is_following: bool, followers_count: u64 },
    /// Server reported the other direction; the record now follows the server
    Corrected { is_following: bool, followers_count: u64 },
    Ignored(IgnoreReason),
    /// The profile was invalidated while the request was pending
    Discarded,
}

/// Compute the speculative pair for a toggle from `snapshot`
fn speculative(snapshot: FollowSnapshot) -> Option<FollowSnapshot> {
    match snapshot.is_following {
        Some(true) => Some(FollowSnapshot {
            is_following: Some(false),
            followers_count: snapshot.followers_count.saturating_sub(1),
        }),
        Some(false) => Some(FollowSnapshot {
            is_following: Some(true),
            followers_count: snapshot.followers_count + 1,
        }),
        None => None,
    }
}

/// Pair implied by the server-confirmed direction, relative to the pre-edit snapshot
fn confirmed(snapshot: FollowSnapshot, added_follow: bool) -> FollowSnapshot {
    let was_following = snapshot.is_following == Some(true);
    let followers_count = match (was_following, added_follow) {
        (false, true) => snapshot.followers_count + 1,
        (true, false) => snapshot.followers_count.saturating_sub(1),
        _ => snapshot.followers_count,
    };
    FollowSnapshot {
        is_following: Some(added_follow),
        followers_count,
    }
}

/// Restores the snapshot if a toggle future is dropped mid-flight
struct PendingGuard<'a> {
    store: &'a Mutex<ProfileStore>,
    user_id: &'a UserId,
    generation: u64,
    snapshot: FollowSnapshot,
    armed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut store = self.store.lock();
        if let Some(entry) = store.live_entry_mut(self.user_id, self.generation) {
            entry.pending = None;
            entry.stale = true;
            if let Some(record) = entry.record.as_mut() {
                record.restore(self.snapshot);
            }
            warn!(user_id = %self.user_id, "Follow toggle cancelled; rolled back");
        }
    }
}

pub struct ProfileReconciler {
    api: Arc<dyn ProfileApi>,
    store: Mutex<ProfileStore>,
    request_timeout: Duration,
    metrics: SyncMetrics,
}

impl ProfileReconciler {
    pub fn new(api: Arc<dyn ProfileApi>, request_timeout: Duration) -> Self {
        Self {
            api,
            store: Mutex::new(ProfileStore::new()),
            request_timeout,
            metrics: SyncMetrics::new(),
        }
    }

    pub fn get(&self, id: &UserId) -> Option<ProfileRecord> {
        self.store.lock().get(id).cloned()
    }

    pub fn status(&self, id: &UserId) -> Option<ProfileStatus> {
        self.store.lock().status(id)
    }

    pub fn error(&self, id: &UserId) -> Option<String> {
        self.store.lock().error(id).map(str::to_string)
    }

    pub fn is_toggle_pending(&self, id: &UserId) -> bool {
        self.store.lock().is_toggle_pending(id)
    }

    pub fn invalidate(&self, id: &UserId) {
        if self.store.lock().invalidate(id) {
            debug!(user_id = %id, "Invalidated cached profile");
        }
    }

    pub fn clear(&self) {
        self.store.lock().clear();
    }

    /// Register a view showing `id`
    pub fn acquire(&self, id: &UserId) {
        let viewers = self.store.lock().acquire(id);
        debug!(user_id = %id, viewers, "Profile acquired by view");
    }

    /// A view stopped showing `id`; the entry is invalidated when no view is left
    pub fn release(&self, id: &UserId) {
        let mut store = self.store.lock();
        if store.release(id) && store.invalidate(id) {
            debug!(user_id = %id, "Invalidated cached profile after last view left");
        }
    }

    /// Populate the cache for `id`, once per id
    pub async fn load(&self, id: Option<&UserId>) -> SyncResult<ProfileLoad> {
        let Some(id) = id else {
            return Ok(ProfileLoad::MissingIdentifier);
        };

        let generation = {
            let mut store = self.store.lock();
            match store.entries.get(id).map(|entry| (entry.status, entry.stale)) {
                Some((ProfileStatus::Ready, false)) => return Ok(ProfileLoad::Cached),
                Some((ProfileStatus::Loading, _)) => return Ok(ProfileLoad::InFlight),
                _ => {}
            }
            let generation = store.next_generation();
            let entry = store
                .entries
                .entry(id.clone())
                .or_insert_with(|| ProfileEntry {
                    record: None,
                    status: ProfileStatus::Loading,
                    error: None,
                    pending: None,
                    stale: false,
                    generation,
                });
            entry.status = ProfileStatus::Loading;
            entry.error = None;
            entry.generation = generation;
            generation
        };

        debug!(user_id = %id, "Fetching profile");
        let response = tokio::time::timeout(self.request_timeout, self.api.get_profile(id)).await;

        let mut store = self.store.lock();
        let Some(entry) = store.live_entry_mut(id, generation) else {
            warn!(user_id = %id, "Discarding profile response for an invalidated entry");
            self.metrics.record_profile_fetch("discarded");
            return Ok(ProfileLoad::Discarded);
        };

        let result = match response {
            Ok(Ok(record)) => Ok(record),
            Ok(Err(e)) => Err(SyncError::fetch(Resource::Profile, e)),
            Err(_) => Err(SyncError::Timeout {
                operation: "get_profile",
                after: self.request_timeout,
            }),
        };

        match result {
            Ok(mut record) => {
                // keep the speculative pair of a toggle still in flight
                if entry.pending.is_some() {
                    if let Some(current) = entry.record.as_ref() {
                        record.restore(current.follow_snapshot());
                    }
                }
                entry.record = Some(record);
                entry.status = ProfileStatus::Ready;
                entry.stale = false;
                self.metrics.record_profile_fetch("loaded");
                debug!(user_id = %id, "Cached profile");
                Ok(ProfileLoad::Loaded)
            }
            Err(e) => {
                warn!(user_id = %id, kind = e.kind(), error = %e, "Profile fetch failed");
                entry.status = ProfileStatus::Error;
                entry.error = Some(e.to_string());
                self.metrics.record_profile_fetch("failed");
                Err(e)
            }
        }
    }

    /// Flip the viewer's follow of `id`, optimistically
    pub async fn toggle_follow(&self, id: &UserId) -> SyncResult<ToggleOutcome> {
        let (generation, snapshot) = {
            let mut store = self.store.lock();
            let Some(entry) = store.entries.get_mut(id) else {
                return Ok(ToggleOutcome::Ignored(IgnoreReason::NotLoaded));
            };
            if entry.pending.is_some() {
                return Ok(ToggleOutcome::Ignored(IgnoreReason::Pending));
            }
            let Some(record) = entry.record.as_mut() else {
                return Ok(ToggleOutcome::Ignored(IgnoreReason::NotLoaded));
            };
            let snapshot = record.follow_snapshot();
            let Some(guess) = speculative(snapshot) else {
                return Ok(ToggleOutcome::Ignored(IgnoreReason::Unknown));
            };
            record.restore(guess);
            entry.pending = Some(snapshot);
            info!(
                user_id = %id,
                following = ?guess.is_following,
                followers = guess.followers_count,
                "Applied speculative follow toggle"
            );
            (entry.generation, snapshot)
        };

        let mut guard = PendingGuard {
            store: &self.store,
            user_id: id,
            generation,
            snapshot,
            armed: true,
        };
        let response =
            tokio::time::timeout(self.request_timeout, self.api.toggle_follow(id)).await;
        guard.armed = false;

        let mut store = self.store.lock();
        let Some(entry) = store.live_entry_mut(id, generation) else {
            warn!(user_id = %id, "Discarding follow toggle response for an invalidated entry");
            self.metrics.record_toggle("discarded");
            return Ok(ToggleOutcome::Discarded);
        };
        entry.pending = None;

        let result = match response {
            Ok(Ok(confirmation)) => Ok(confirmation.added_follow),
            Ok(Err(e)) => Err(SyncError::MutationFailure {
                user_id: id.clone(),
                source: e,
            }),
            Err(_) => {
                // the server may have applied it anyway
                entry.stale = true;
                Err(SyncError::Timeout {
                    operation: "toggle_follow",
                    after: self.request_timeout,
                })
            }
        };

        let Some(record) = entry.record.as_mut() else {
            return Ok(ToggleOutcome::Discarded);
        };

        match result {
            Ok(added_follow) => {
                let guessed = speculative(snapshot).and_then(|g| g.is_following);
                let settled = confirmed(snapshot, added_follow);
                record.restore(settled);
                let outcome = if guessed == Some(added_follow) {
                    self.metrics.record_toggle("confirmed");
                    ToggleOutcome::Confirmed {
                        is_following: added_follow,
                        followers_count: settled.followers_count,
                    }
                } else {
                    warn!(
                        user_id = %id,
                        added_follow,
                        "Server confirmed the opposite follow direction"
                    );
                    self.metrics.record_toggle("corrected");
                    ToggleOutcome::Corrected {
                        is_following: added_follow,
                        followers_count: settled.followers_count,
                    }
                };
                debug!(user_id = %id, ?outcome, "Reconciled follow toggle");
                Ok(outcome)
            }
            Err(e) => {
                record.restore(snapshot);
                warn!(
                    user_id = %id,
                    kind = e.kind(),
                    error = %e,
                    "Follow toggle failed; rolled back"
                );
                self.metrics.record_toggle("rolled_back");
                Err(e)
            }
        }
    }

    /// Follow state of a cached profile, `Unknown` when not cached
    pub fn follow_state(&self, id: &UserId) -> FollowState {
        self.store
            .lock()
            .get(id)
            .map(ProfileRecord::follow_state)
            .unwrap_or(FollowState::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(is_following: Option<bool>, followers_count: u64) -> FollowSnapshot {
        FollowSnapshot {
            is_following,
            followers_count,
        }
    }

    #[test]
    fn test_speculative_flips_and_counts_by_one() {
        assert_eq!(speculative(snapshot(Some(false), 5)), Some(snapshot(Some(true), 6)));
        assert_eq!(speculative(snapshot(Some(true), 5)), Some(snapshot(Some(false), 4)));
        assert_eq!(speculative(snapshot(None, 5)), None);
    }

    #[test]
    fn test_speculative_never_goes_negative() {
        assert_eq!(speculative(snapshot(Some(true), 0)), Some(snapshot(Some(false), 0)));
    }

    #[test]
    fn test_confirmed_is_relative_to_snapshot() {
        // guess matched
        assert_eq!(confirmed(snapshot(Some(false), 5), true), snapshot(Some(true), 6));
        // race: server says the follow was removed
        assert_eq!(confirmed(snapshot(Some(false), 5), false), snapshot(Some(false), 5));
        assert_eq!(confirmed(snapshot(Some(true), 5), true), snapshot(Some(true), 5));
        assert_eq!(confirmed(snapshot(Some(true), 5), false), snapshot(Some(false), 4));
    }

    #[test]
    fn test_store_invalidate_and_generations() {
        let mut store = ProfileStore::new();
        let id = UserId::parse(Some("u1")).unwrap();
        let generation = store.next_generation();
        store.entries.insert(
            id.clone(),
            ProfileEntry {
                record: None,
                status: ProfileStatus::Loading,
                error: None,
                pending: None,
                stale: false,
                generation,
            },
        );
        assert!(store.live_entry_mut(&id, generation).is_some());
        assert!(store.live_entry_mut(&id, generation + 1).is_none());
        assert!(store.invalidate(&id));
        assert!(store.is_empty());
        assert!(!store.invalidate(&id));
    }

    #[test]
    fn test_store_release_waits_for_last_viewer() {
        let mut store = ProfileStore::new();
        let id = UserId::parse(Some("u1")).unwrap();
        assert_eq!(store.acquire(&id), 1);
        assert_eq!(store.acquire(&id), 2);
        assert!(!store.release(&id));
        assert!(store.release(&id));
        assert!(store.viewers.is_empty());
    }
}
