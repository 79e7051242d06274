//! Domain messages distributed over the in-process event bus.
//!
//! Messages are process-local values. They are never serialized; every
//! variant maps to exactly one [`MessageKind`] discriminant, which is what
//! subscriptions are keyed on.

use crate::{PeerUid, Version};

/// A special client mode during which some windows must hide and others
/// must show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialMode {
    /// Group posing mode.
    GroupPose,
    /// An in-game cutscene is playing.
    Cutscene,
}

/// Logical windows of the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowKind {
    /// Main pair list.
    PairList,
    /// Profile of a single peer.
    Profile,
    /// Permission editor for a single peer.
    Permissions,
    /// Shared data hub (favorites, shared-with-you).
    DataHub,
    /// Tools shown only during group posing.
    PoseTools,
    /// Transfer status overlay.
    Transfers,
}

/// All domain occurrences published on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Connection to the sync service was established.
    Connected,
    /// Connection to the sync service was lost.
    Disconnected,
    /// A special mode started.
    SpecialModeEntered(SpecialMode),
    /// A special mode ended.
    SpecialModeExited(SpecialMode),
    /// Show a targeted window for `target`, or close it when `target` is None.
    ToggleTarget {
        /// Which window the request is for.
        window: WindowKind,
        /// Peer to show, or None to close.
        target: Option<PeerUid>,
    },
    /// Flip visibility of an untargeted window.
    ToggleWindow(WindowKind),
    /// The shared data source changed.
    SourceDataChanged {
        /// New version of the source dataset.
        version: Version,
    },
    /// Remote permission state was refreshed by inbound sync.
    RemotePermissionsChanged {
        /// Peers whose remote side changed.
        peers: Vec<PeerUid>,
    },
}

/// Discriminant of a [`Message`], used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// [`Message::Connected`]
    Connected,
    /// [`Message::Disconnected`]
    Disconnected,
    /// [`Message::SpecialModeEntered`]
    SpecialModeEntered,
    /// [`Message::SpecialModeExited`]
    SpecialModeExited,
    /// [`Message::ToggleTarget`]
    ToggleTarget,
    /// [`Message::ToggleWindow`]
    ToggleWindow,
    /// [`Message::SourceDataChanged`]
    SourceDataChanged,
    /// [`Message::RemotePermissionsChanged`]
    RemotePermissionsChanged,
}

impl Message {
    /// The discriminant this message is dispatched under.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Connected => MessageKind::Connected,
            Message::Disconnected => MessageKind::Disconnected,
            Message::SpecialModeEntered(_) => MessageKind::SpecialModeEntered,
            Message::SpecialModeExited(_) => MessageKind::SpecialModeExited,
            Message::ToggleTarget { .. } => MessageKind::ToggleTarget,
            Message::ToggleWindow(_) => MessageKind::ToggleWindow,
            Message::SourceDataChanged { .. } => MessageKind::SourceDataChanged,
            Message::RemotePermissionsChanged { .. } => MessageKind::RemotePermissionsChanged,
        }
    }
}
