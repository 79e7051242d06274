//! # sync-client
//!
//! Runtime layer of syncview: the pieces that own threads, tasks and I/O
//! around the pure logic in `sync-core`.
//!
//! ## Features
//!
//! - **Event bus**: typed publish/subscribe with RAII subscription scopes,
//!   handler fault isolation and a bounded dispatch depth
//! - **Permission reconciler**: per-peer working copies against an atomically
//!   swapped committed map, committed in one batch
//! - **Filtered view materializer**: background recompute into a
//!   version-stamped snapshot cell with a coalesced metadata fetch
//! - **Window controller**: runs the window state machine from bus messages
//! - **Pluggable collaborators**: [`ApiClient`], [`PeerDirectory`] and
//!   [`ConfigStore`] traits with in-memory and mock implementations
//!
//! ## Example
//!
//! ```ignore
//! use syncview_client::{EventBus, FilteredViewMaterializer, MockApiClient};
//!
//! let bus = EventBus::init();
//! let view = FilteredViewMaterializer::new(MockApiClient::new(), Handle::current());
//! let _scope = view.attach(&bus);
//!
//! view.set_source(Version::new(1), entries);
//! bus.publish(Message::SourceDataChanged { version: Version::new(1) })?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bus;
pub mod config;
pub mod directory;
pub mod materializer;
pub mod reconciler;
pub mod window;

pub use api::{
    ApiClient, ApiError, CommitAck, MetadataMap, MockApiClient, PermissionBatch, PermissionUpdate,
};
pub use bus::{
    DispatchError, DispatchReport, EventBus, Handler, HandlerError, SubscriptionRegistry,
    SubscriptionScope, MAX_DISPATCH_DEPTH,
};
pub use config::{ClientConfig, ConfigError, ConfigStore, FilterConfig, TomlConfigStore};
pub use directory::{InMemoryPeerDirectory, PeerDirectory, PeerInfo};
pub use materializer::{FilteredViewMaterializer, SourceData};
pub use reconciler::{CommitError, CommitOutcome, CommittedPermissions, PermissionReconciler};
pub use window::{ResourceError, TargetResources, WindowController};
