//! Filtered view materializer.
//!
//! Turns the shared-data source plus the active [`FilterCriteria`] into an
//! immutable [`FilteredSnapshot`] on a background task and installs it into
//! a single-slot `watch` cell.
//!
//! # Design
//!
//! - Every request takes a monotonic stamp. A finished snapshot is installed
//!   only if its stamp is newer than the installed one, so a slow, older
//!   recompute can never overwrite a newer result.
//! - Metadata comes from one shared fetch. Requests that arrive while a
//!   fetch is in flight await that fetch instead of starting another.
//! - A failed fetch is not fatal: the snapshot is built with metadata
//!   absent and the next request retries.
//! - Criteria without an attribute predicate skip the fetch entirely.
//!
//! ```text
//! SourceDataChanged ─→ request_recompute ─spawn─→ metadata (shared fetch)
//!                                                      ↓
//!              renderer ←─ watch<Arc<FilteredSnapshot>> ←─ build + install
//! ```

use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use syncview_core::{build_snapshot, FilterCriteria, FilteredSnapshot, ViewOptions};
use syncview_types::{EntryId, Message, MessageKind, SharedEntry, Version};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::{ApiClient, ApiError, MetadataMap};
use crate::bus::{EventBus, SubscriptionScope};

type MetadataFetch = Shared<BoxFuture<'static, Result<Arc<MetadataMap>, ApiError>>>;

/// The dataset snapshots are built from.
#[derive(Debug, Clone, Default)]
pub struct SourceData {
    /// Version of the dataset.
    pub version: Version,
    /// Entries in source order.
    pub entries: Vec<SharedEntry>,
}

struct InFlight {
    generation: u64,
    version: Version,
    fetch: MetadataFetch,
}

#[derive(Default)]
struct MetadataState {
    next_generation: u64,
    cached: Option<(Version, Arc<MetadataMap>)>,
    in_flight: Option<InFlight>,
}

/// Background builder of filtered, grouped snapshots.
pub struct FilteredViewMaterializer<A> {
    api: Arc<A>,
    runtime: Handle,
    source: RwLock<Arc<SourceData>>,
    criteria: RwLock<Arc<FilterCriteria>>,
    view: RwLock<ViewOptions>,
    metadata: Mutex<MetadataState>,
    stamps: AtomicU64,
    current: watch::Sender<Arc<FilteredSnapshot>>,
}

impl<A: ApiClient + 'static> FilteredViewMaterializer<A> {
    /// Create a materializer that spawns recomputes on `runtime`.
    pub fn new(api: A, runtime: Handle) -> Arc<Self> {
        let (current, _) = watch::channel(Arc::new(FilteredSnapshot::empty()));
        Arc::new(Self {
            api: Arc::new(api),
            runtime,
            source: RwLock::new(Arc::new(SourceData::default())),
            criteria: RwLock::new(Arc::new(FilterCriteria::new())),
            view: RwLock::new(ViewOptions::default()),
            metadata: Mutex::new(MetadataState::default()),
            stamps: AtomicU64::new(0),
            current,
        })
    }

    /// Replace the source dataset. Does not trigger a recompute.
    pub fn set_source(&self, version: Version, entries: Vec<SharedEntry>) {
        let data = Arc::new(SourceData { version, entries });
        *self.source.write().unwrap_or_else(PoisonError::into_inner) = data;
    }

    /// Replace the filter criteria. Does not trigger a recompute.
    pub fn set_criteria(&self, criteria: FilterCriteria) {
        *self.criteria.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(criteria);
    }

    /// Replace grouping and ordering. Does not trigger a recompute.
    pub fn set_view(&self, view: ViewOptions) {
        *self.view.write().unwrap_or_else(PoisonError::into_inner) = view;
    }

    /// The current source dataset.
    pub fn source(&self) -> Arc<SourceData> {
        Arc::clone(&self.source.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// The latest installed snapshot.
    pub fn current(&self) -> Arc<FilteredSnapshot> {
        Arc::clone(&self.current.borrow())
    }

    /// Receiver notified whenever a snapshot is installed.
    pub fn subscribe(&self) -> watch::Receiver<Arc<FilteredSnapshot>> {
        self.current.subscribe()
    }

    /// Schedule a rebuild on the background runtime.
    ///
    /// Fire-and-forget: the handle resolves to whether the result was
    /// installed, and may be dropped.
    pub fn request_recompute(self: &Arc<Self>, source_version: Version) -> JoinHandle<bool> {
        let stamp = self.next_stamp();
        tracing::debug!(
            "recompute {} requested for source version {}",
            stamp,
            source_version
        );
        let this = Arc::clone(self);
        self.runtime.spawn(async move { this.recompute(stamp).await })
    }

    /// Request a recompute on every [`Message::SourceDataChanged`].
    ///
    /// The subscription lives as long as the returned scope.
    pub fn attach(self: &Arc<Self>, bus: &Arc<EventBus>) -> SubscriptionScope {
        let scope = bus.scope();
        let weak = Arc::downgrade(self);
        scope.subscribe(MessageKind::SourceDataChanged, move |message| {
            let Some(this) = weak.upgrade() else {
                return Ok(());
            };
            if let Message::SourceDataChanged { version } = message {
                this.request_recompute(*version);
            }
            Ok(())
        });
        scope
    }

    pub(crate) fn next_stamp(&self) -> Version {
        Version::new(self.stamps.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Build a snapshot under `stamp` and try to install it.
    pub(crate) async fn recompute(&self, stamp: Version) -> bool {
        let source = self.source();
        let criteria = Arc::clone(&self.criteria.read().unwrap_or_else(PoisonError::into_inner));
        let view = *self.view.read().unwrap_or_else(PoisonError::into_inner);

        let metadata = if criteria.needs_metadata() {
            self.metadata_for(&source).await
        } else {
            Arc::new(HashMap::new())
        };

        let snapshot = build_snapshot(
            stamp,
            source.version,
            &source.entries,
            &metadata,
            &criteria,
            &view,
        );
        self.install(snapshot)
    }

    /// Install `snapshot` unless a newer one is already installed.
    pub(crate) fn install(&self, snapshot: FilteredSnapshot) -> bool {
        let next = Arc::new(snapshot);
        let installed = self.current.send_if_modified(|current| {
            if next.stamp() > current.stamp() {
                *current = Arc::clone(&next);
                true
            } else {
                false
            }
        });
        if installed {
            tracing::debug!(
                "installed snapshot {} ({} groups, {} entries)",
                next.stamp(),
                next.group_count(),
                next.entry_count()
            );
        } else {
            tracing::debug!("discarded stale snapshot {}", next.stamp());
        }
        installed
    }

    fn lock_metadata(&self) -> MutexGuard<'_, MetadataState> {
        self.metadata.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Metadata for `source`, sharing any fetch already in flight.
    ///
    /// At most one fetch is outstanding at a time. If the in-flight fetch was
    /// started for an older source version, wait for it and then fetch again.
    async fn metadata_for(&self, source: &SourceData) -> Arc<MetadataMap> {
        loop {
            let (generation, version, fetch) = {
                let mut state = self.lock_metadata();
                if let Some((version, map)) = &state.cached {
                    if *version >= source.version {
                        return Arc::clone(map);
                    }
                }
                let in_flight = match state.in_flight.take() {
                    Some(in_flight) => in_flight,
                    None => self.start_fetch(&mut state, source),
                };
                let handle = (in_flight.generation, in_flight.version, in_flight.fetch.clone());
                state.in_flight = Some(in_flight);
                handle
            };

            let result = fetch.await;

            {
                let mut state = self.lock_metadata();
                if state
                    .in_flight
                    .as_ref()
                    .is_some_and(|f| f.generation == generation)
                {
                    state.in_flight = None;
                    if let Ok(map) = &result {
                        let newer = state.cached.as_ref().map_or(true, |(v, _)| *v < version);
                        if newer {
                            state.cached = Some((version, Arc::clone(map)));
                        }
                    }
                }
            }

            match result {
                Ok(map) if version >= source.version => return map,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(
                        "metadata fetch for source version {} failed: {}; \
                         building without metadata",
                        version,
                        e
                    );
                    return Arc::new(HashMap::new());
                }
            }
        }
    }

    fn start_fetch(&self, state: &mut MetadataState, source: &SourceData) -> InFlight {
        state.next_generation += 1;
        let api = Arc::clone(&self.api);
        let ids: Vec<EntryId> = source.entries.iter().map(|e| e.id).collect();
        tracing::debug!(
            "fetching metadata for {} entries (source version {})",
            ids.len(),
            source.version
        );
        let fetch = async move { api.fetch_metadata(&ids).await.map(Arc::new) }
            .boxed()
            .shared();
        InFlight {
            generation: state.next_generation,
            version: source.version,
            fetch,
        }
    }
}
