//! Permission reconciler.
//!
//! Holds the committed two-sided permission state of every peer plus the
//! user's uncommitted working copies, and commits pending edits as one
//! batch through the [`ApiClient`].
//!
//! # Architecture
//!
//! ```text
//! UI → working copies (DashMap) ──commit──→ ApiClient
//!                                   ↓ on success
//!         committed state (watch<Arc<BTreeMap>>) → renderer
//! ```
//!
//! Committed state is never mutated in place: every change installs a new
//! map, so a reader holding the previous `Arc` keeps a consistent view.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use syncview_core::{apply_defaults, has_pending_edit, select_bulk_targets, PeerPermissionState};
use syncview_types::{DefaultPermissions, Message, PeerUid, PermissionFlag, PermissionSet};
use thiserror::Error;
use tokio::sync::{watch, Mutex};

use crate::api::{ApiClient, ApiError, PermissionBatch, PermissionUpdate};
use crate::bus::EventBus;
use crate::directory::PeerDirectory;

/// Committed permission state of every known peer.
pub type CommittedPermissions = Arc<BTreeMap<PeerUid, PeerPermissionState>>;

/// Commit errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitError {
    /// The API rejected the batch or failed to deliver it. Nothing was
    /// applied locally.
    #[error("permission commit failed: {0}")]
    Api(#[from] ApiError),
}

/// Result of a successful commit call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// No peer had a pending edit; no request was sent.
    NothingToCommit,
    /// The batch was accepted and applied.
    Committed {
        /// Peers whose committed state was replaced.
        peers: Vec<PeerUid>,
    },
}

/// Per-peer permission state with local edit sessions.
pub struct PermissionReconciler<A, D> {
    api: A,
    directory: D,
    committed: watch::Sender<CommittedPermissions>,
    working: DashMap<PeerUid, PermissionSet>,
    commit_lock: Mutex<()>,
    bus: Option<Arc<EventBus>>,
}

impl<A: ApiClient, D: PeerDirectory> PermissionReconciler<A, D> {
    /// Create a reconciler with no committed state.
    pub fn new(api: A, directory: D) -> Self {
        let (committed, _) = watch::channel(Arc::new(BTreeMap::new()));
        Self {
            api,
            directory,
            committed,
            working: DashMap::new(),
            commit_lock: Mutex::new(()),
            bus: None,
        }
    }

    /// Announce remote refreshes on `bus` as
    /// [`Message::RemotePermissionsChanged`].
    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Replace all committed state, e.g. after the initial pair list sync.
    ///
    /// Working copies are dropped.
    pub fn load_committed<I>(&self, states: I)
    where
        I: IntoIterator<Item = (PeerUid, PeerPermissionState)>,
    {
        let map: BTreeMap<_, _> = states.into_iter().collect();
        tracing::debug!("loaded committed permissions for {} peers", map.len());
        self.working.clear();
        self.committed.send_replace(Arc::new(map));
    }

    /// Current committed state. Cheap; never blocks a commit.
    pub fn committed(&self) -> CommittedPermissions {
        Arc::clone(&self.committed.borrow())
    }

    /// Committed state of one peer.
    pub fn committed_state(&self, peer: &PeerUid) -> Option<PeerPermissionState> {
        self.committed.borrow().get(peer).copied()
    }

    /// Receiver notified whenever committed state is replaced.
    pub fn subscribe(&self) -> watch::Receiver<CommittedPermissions> {
        self.committed.subscribe()
    }

    fn committed_local(&self, peer: &PeerUid) -> PermissionSet {
        self.committed_state(peer)
            .map(|state| state.local)
            .unwrap_or_default()
    }

    /// Start an edit session: seed the working copy from committed `local`.
    pub fn begin_edit(&self, peer: &PeerUid) -> PermissionSet {
        let seeded = self.committed_local(peer);
        self.working.insert(peer.clone(), seeded);
        seeded
    }

    /// Current working copy, if an edit session is open.
    pub fn working(&self, peer: &PeerUid) -> Option<PermissionSet> {
        self.working.get(peer).map(|w| *w)
    }

    /// Replace the working copy.
    pub fn update_working(&self, peer: &PeerUid, working: PermissionSet) {
        self.working.insert(peer.clone(), working);
    }

    /// Change one flag of the working copy, opening a session if needed.
    pub fn set_flag(&self, peer: &PeerUid, flag: PermissionFlag, value: bool) -> PermissionSet {
        let seeded = self.committed_local(peer);
        let mut working = self.working.entry(peer.clone()).or_insert(seeded);
        working.set(flag, value);
        *working
    }

    /// Check if the working copy of `peer` differs from committed `local`.
    pub fn has_pending_edit(&self, peer: &PeerUid) -> bool {
        match self.working(peer) {
            Some(working) => has_pending_edit(&working, &self.committed_local(peer)),
            None => false,
        }
    }

    /// Every working copy that differs from committed state.
    pub fn pending_edits(&self) -> BTreeMap<PeerUid, PermissionSet> {
        let committed = self.committed();
        self.working
            .iter()
            .filter(|w| {
                let base = committed.get(w.key()).map(|s| s.local).unwrap_or_default();
                has_pending_edit(w.value(), &base)
            })
            .map(|w| (w.key().clone(), *w.value()))
            .collect()
    }

    /// Discard the working copy, re-seeding it from committed state.
    pub fn revert(&self, peer: &PeerUid) -> PermissionSet {
        self.begin_edit(peer)
    }

    /// Stage the default profile for `peer` as a pending edit.
    ///
    /// Does not commit.
    pub fn reset_to_default(
        &self,
        peer: &PeerUid,
        is_direct: bool,
        defaults: &DefaultPermissions,
    ) -> PermissionSet {
        let mut working = self.working(peer).unwrap_or_else(|| self.committed_local(peer));
        apply_defaults(&mut working, is_direct, defaults);
        self.working.insert(peer.clone(), working);
        working
    }

    /// [`Self::reset_to_default`] with the relationship taken from the
    /// peer directory.
    pub fn reset_to_default_for(
        &self,
        peer: &PeerUid,
        defaults: &DefaultPermissions,
    ) -> PermissionSet {
        let is_direct = self.directory.is_direct(peer);
        self.reset_to_default(peer, is_direct, defaults)
    }

    /// Stage defaults for every known peer that is not sticky.
    ///
    /// Stickiness is read from the working copy when a session is open.
    /// Returns the peers that were staged.
    pub fn stage_bulk_defaults(&self, defaults: &DefaultPermissions) -> Vec<PeerUid> {
        let committed = self.committed();
        let current: Vec<(PeerUid, PermissionSet)> = committed
            .iter()
            .map(|(uid, state)| (uid.clone(), self.working(uid).unwrap_or(state.local)))
            .collect();

        let targets = select_bulk_targets(current.iter().map(|(uid, local)| (uid, local)));
        for peer in &targets {
            self.reset_to_default_for(peer, defaults);
        }
        tracing::debug!(
            "staged defaults for {} of {} peers",
            targets.len(),
            current.len()
        );
        targets
    }

    /// Record the peer's own settings as observed through sync.
    ///
    /// Only the remote side changes; working copies are untouched. Renderers
    /// are told through the bus, if one is attached.
    pub fn apply_remote(&self, peer: &PeerUid, remote: PermissionSet) {
        self.committed.send_modify(|map| {
            Arc::make_mut(map).entry(peer.clone()).or_default().remote = remote;
        });

        if let Some(bus) = &self.bus {
            let message = Message::RemotePermissionsChanged {
                peers: vec![peer.clone()],
            };
            if let Err(e) = bus.publish(message) {
                tracing::warn!("remote permission change for {} not announced: {}", peer, e);
            }
        }
    }

    /// Commit every working copy that has a pending edit.
    pub async fn commit_pending(&self) -> Result<CommitOutcome, CommitError> {
        self.commit(self.pending_edits()).await
    }

    /// Commit `edits` as one batch.
    ///
    /// Peers whose edit equals committed state are left out. On success the
    /// committed `local` of each included peer becomes its edit. A working
    /// copy that changed while the request was in flight is kept and stays
    /// pending; on failure nothing changes and the working copies stay for a
    /// retry.
    ///
    /// # Errors
    ///
    /// Returns [`CommitError::Api`] if the request fails. The error is never
    /// retried here.
    pub async fn commit(
        &self,
        edits: BTreeMap<PeerUid, PermissionSet>,
    ) -> Result<CommitOutcome, CommitError> {
        let _guard = self.commit_lock.lock().await;

        let committed = self.committed();
        let updates: Vec<PermissionUpdate> = edits
            .into_iter()
            .filter(|(peer, working)| {
                let base = committed.get(peer).map(|s| s.local).unwrap_or_default();
                has_pending_edit(working, &base)
            })
            .map(|(peer, permissions)| PermissionUpdate { peer, permissions })
            .collect();

        if updates.is_empty() {
            return Ok(CommitOutcome::NothingToCommit);
        }

        let batch = PermissionBatch { updates };
        if let Err(e) = self.api.commit_permissions(&batch).await {
            tracing::warn!("permission commit of {} peers failed: {}", batch.len(), e);
            return Err(e.into());
        }

        self.committed.send_modify(|map| {
            let map = Arc::make_mut(map);
            for update in &batch.updates {
                map.entry(update.peer.clone()).or_default().local = update.permissions;
            }
        });
        for update in &batch.updates {
            // An edit made while the request was in flight stays pending
            // against the new committed state.
            let working = *self
                .working
                .entry(update.peer.clone())
                .or_insert(update.permissions);
            if working != update.permissions {
                tracing::debug!("{} edited during commit; edit kept pending", update.peer);
            }
        }

        let peers: Vec<PeerUid> = batch.peers().cloned().collect();
        tracing::info!("committed permissions for {} peers", peers.len());
        Ok(CommitOutcome::Committed { peers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockApiClient;
    use crate::directory::InMemoryPeerDirectory;
    use std::time::Duration;
    use syncview_types::{MessageKind, Relationship};

    type TestReconciler = PermissionReconciler<MockApiClient, Arc<InMemoryPeerDirectory>>;

    fn abc() -> PeerUid {
        PeerUid::new("abc")
    }

    fn setup() -> (TestReconciler, MockApiClient, Arc<InMemoryPeerDirectory>) {
        let api = MockApiClient::new();
        let directory = Arc::new(InMemoryPeerDirectory::new());
        directory.insert(abc(), "Alice", Relationship::Direct);
        directory.insert(PeerUid::new("grp"), "Grouped", Relationship::Group);

        let reconciler = PermissionReconciler::new(api.clone(), Arc::clone(&directory));
        reconciler.load_committed([
            (abc(), PeerPermissionState::default()),
            (PeerUid::new("grp"), PeerPermissionState::default()),
        ]);
        (reconciler, api, directory)
    }

    fn defaults() -> DefaultPermissions {
        DefaultPermissions {
            direct: PermissionSet::default().with(PermissionFlag::AnimationsDisabled, true),
            group: PermissionSet::default().with(PermissionFlag::SoundsDisabled, true),
        }
    }

    #[test]
    fn begin_edit_has_no_pending_edit() {
        let (reconciler, _, _) = setup();
        let working = reconciler.begin_edit(&abc());
        assert_eq!(working, PermissionSet::default());
        assert!(!reconciler.has_pending_edit(&abc()));
    }

    #[test]
    fn edit_then_revert_scenario() {
        let (reconciler, _, _) = setup();
        reconciler.begin_edit(&abc());

        reconciler.set_flag(&abc(), PermissionFlag::Paused, true);
        assert!(reconciler.has_pending_edit(&abc()));

        let reverted = reconciler.revert(&abc());
        assert_eq!(reverted, PermissionSet::default());
        assert_eq!(reconciler.working(&abc()), Some(PermissionSet::default()));
        assert!(!reconciler.has_pending_edit(&abc()));
    }

    #[test]
    fn revert_is_idempotent() {
        let (reconciler, _, _) = setup();
        reconciler.set_flag(&abc(), PermissionFlag::Sticky, true);
        let once = reconciler.revert(&abc());
        let twice = reconciler.revert(&abc());
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn commit_applies_batch_and_clears_pending() {
        let (reconciler, api, _) = setup();
        reconciler.set_flag(&abc(), PermissionFlag::Paused, true);

        let outcome = reconciler.commit_pending().await.unwrap();

        assert_eq!(outcome, CommitOutcome::Committed { peers: vec![abc()] });
        assert!(reconciler.committed_state(&abc()).unwrap().local.paused);
        assert!(!reconciler.has_pending_edit(&abc()));
        let batch = api.last_commit().unwrap();
        assert_eq!(batch.len(), 1);
        assert!(batch.updates[0].permissions.paused);
    }

    #[tokio::test]
    async fn commit_sends_one_batch_for_all_pending_peers() {
        let (reconciler, api, _) = setup();
        reconciler.set_flag(&abc(), PermissionFlag::Paused, true);
        reconciler.set_flag(&PeerUid::new("grp"), PermissionFlag::EffectsDisabled, true);
        // Edited back to committed: not pending, not sent.
        reconciler.set_flag(&PeerUid::new("other"), PermissionFlag::Paused, false);

        reconciler.commit_pending().await.unwrap();

        let batches = api.committed_batches();
        assert_eq!(batches.len(), 1);
        let peers: Vec<_> = batches[0].peers().cloned().collect();
        assert_eq!(peers, vec![abc(), PeerUid::new("grp")]);
    }

    #[tokio::test]
    async fn failed_commit_changes_nothing() {
        let (reconciler, api, _) = setup();
        reconciler.set_flag(&abc(), PermissionFlag::Paused, true);
        api.fail_next_commit(ApiError::Rejected("conflict".into()));

        let result = reconciler.commit_pending().await;

        assert_eq!(
            result,
            Err(CommitError::Api(ApiError::Rejected("conflict".into())))
        );
        assert!(!reconciler.committed_state(&abc()).unwrap().local.paused);
        // Working copy kept for retry.
        assert!(reconciler.has_pending_edit(&abc()));

        reconciler.commit_pending().await.unwrap();
        assert!(reconciler.committed_state(&abc()).unwrap().local.paused);
    }

    #[tokio::test]
    async fn nothing_pending_sends_nothing() {
        let (reconciler, api, _) = setup();
        reconciler.begin_edit(&abc());

        let outcome = reconciler.commit_pending().await.unwrap();

        assert_eq!(outcome, CommitOutcome::NothingToCommit);
        assert!(api.committed_batches().is_empty());
    }

    #[tokio::test]
    async fn reader_keeps_old_state_across_commit() {
        let (reconciler, _, _) = setup();
        let before = reconciler.committed();
        let mut rx = reconciler.subscribe();

        reconciler.set_flag(&abc(), PermissionFlag::Paused, true);
        reconciler.commit_pending().await.unwrap();

        assert!(!before[&abc()].local.paused);
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update()[&abc()].local.paused);
    }

    #[test]
    fn reset_to_default_stages_without_commit() {
        let (reconciler, api, _) = setup();

        let direct = reconciler.reset_to_default(&abc(), true, &defaults());
        assert!(direct.animations_disabled);
        assert!(reconciler.has_pending_edit(&abc()));

        let group = reconciler.reset_to_default(&abc(), false, &defaults());
        assert!(group.sounds_disabled);
        assert!(!group.animations_disabled);

        assert!(api.committed_batches().is_empty());
    }

    #[test]
    fn reset_for_uses_directory_relationship() {
        let (reconciler, _, _) = setup();
        assert!(
            reconciler
                .reset_to_default_for(&abc(), &defaults())
                .animations_disabled
        );
        assert!(
            reconciler
                .reset_to_default_for(&PeerUid::new("grp"), &defaults())
                .sounds_disabled
        );
    }

    #[test]
    fn bulk_defaults_skip_sticky_peers() {
        let (reconciler, _, _) = setup();
        reconciler.load_committed([
            (
                abc(),
                PeerPermissionState::new(
                    PermissionSet::default().with(PermissionFlag::Sticky, true),
                    PermissionSet::default(),
                ),
            ),
            (PeerUid::new("grp"), PeerPermissionState::default()),
        ]);

        let staged = reconciler.stage_bulk_defaults(&defaults());

        assert_eq!(staged, vec![PeerUid::new("grp")]);
        assert!(!reconciler.has_pending_edit(&abc()));
        assert!(reconciler.has_pending_edit(&PeerUid::new("grp")));
    }

    #[test]
    fn remote_refresh_leaves_local_and_edits_alone() {
        let (reconciler, _, _) = setup();
        reconciler.begin_edit(&abc());

        let paused = PermissionSet::default().with(PermissionFlag::Paused, true);
        reconciler.apply_remote(&abc(), paused);

        let state = reconciler.committed_state(&abc()).unwrap();
        assert!(state.remote.paused);
        assert!(!state.local.paused);
        assert!(!reconciler.has_pending_edit(&abc()));
    }

    #[test]
    fn remote_refresh_is_announced_on_bus() {
        let (reconciler, _, _) = setup();
        let bus = EventBus::init();
        let reconciler = reconciler.with_bus(Arc::clone(&bus));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let scope = bus.scope();
        {
            let seen = Arc::clone(&seen);
            scope.subscribe(MessageKind::RemotePermissionsChanged, move |message| {
                if let Message::RemotePermissionsChanged { peers } = message {
                    seen.lock().unwrap().extend(peers.iter().cloned());
                }
                Ok(())
            });
        }

        reconciler.apply_remote(&abc(), PermissionSet::default());

        assert_eq!(*seen.lock().unwrap(), vec![abc()]);
    }

    #[test]
    fn remote_refresh_survives_shut_down_bus() {
        let (reconciler, _, _) = setup();
        let bus = EventBus::init();
        let reconciler = reconciler.with_bus(Arc::clone(&bus));
        bus.shutdown();

        let paused = PermissionSet::default().with(PermissionFlag::Paused, true);
        reconciler.apply_remote(&abc(), paused);

        assert!(reconciler.committed_state(&abc()).unwrap().remote.paused);
    }

    #[tokio::test(start_paused = true)]
    async fn edit_during_commit_stays_pending() {
        let (reconciler, api, _) = setup();
        let reconciler = Arc::new(reconciler);
        api.set_commit_delay(Duration::from_millis(50));
        reconciler.set_flag(&abc(), PermissionFlag::Paused, true);

        let commit = {
            let reconciler = Arc::clone(&reconciler);
            tokio::spawn(async move { reconciler.commit_pending().await })
        };
        // Let the commit reach the API call.
        tokio::time::sleep(Duration::from_millis(10)).await;
        reconciler.set_flag(&abc(), PermissionFlag::SoundsDisabled, true);

        let outcome = commit.await.unwrap().unwrap();
        assert_eq!(outcome, CommitOutcome::Committed { peers: vec![abc()] });

        let committed = reconciler.committed_state(&abc()).unwrap().local;
        assert!(committed.paused);
        assert!(!committed.sounds_disabled);

        let working = reconciler.working(&abc()).unwrap();
        assert!(working.paused);
        assert!(working.sounds_disabled);
        assert!(reconciler.has_pending_edit(&abc()));
        assert_eq!(reconciler.pending_edits().len(), 1);
    }
}
