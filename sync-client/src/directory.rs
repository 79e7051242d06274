//! Peer directory: read-only lookup of aliases and relationships.

use dashmap::DashMap;
use std::sync::Arc;
use syncview_types::{PeerUid, Relationship};

/// What the directory knows about one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// Display alias.
    pub alias: String,
    /// Direct pair or group-derived.
    pub relationship: Relationship,
}

/// Lookup from peer UID to display alias and relationship.
pub trait PeerDirectory: Send + Sync {
    /// Look up a peer.
    fn peer(&self, uid: &PeerUid) -> Option<PeerInfo>;

    /// All known peers.
    fn peers(&self) -> Vec<PeerUid>;

    /// Check if the peer is paired directly. Unknown peers are not.
    fn is_direct(&self, uid: &PeerUid) -> bool {
        self.peer(uid)
            .is_some_and(|info| info.relationship == Relationship::Direct)
    }

    /// Display alias, falling back to the UID.
    fn display_name(&self, uid: &PeerUid) -> String {
        self.peer(uid)
            .map(|info| info.alias)
            .unwrap_or_else(|| uid.to_string())
    }
}

impl<T: PeerDirectory + ?Sized> PeerDirectory for Arc<T> {
    fn peer(&self, uid: &PeerUid) -> Option<PeerInfo> {
        (**self).peer(uid)
    }

    fn peers(&self) -> Vec<PeerUid> {
        (**self).peers()
    }
}

/// Directory kept in memory, updated by whoever observes pairing changes.
#[derive(Debug, Default)]
pub struct InMemoryPeerDirectory {
    peers: DashMap<PeerUid, PeerInfo>,
}

impl InMemoryPeerDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a peer.
    pub fn insert(&self, uid: PeerUid, alias: impl Into<String>, relationship: Relationship) {
        self.peers.insert(
            uid,
            PeerInfo {
                alias: alias.into(),
                relationship,
            },
        );
    }

    /// Forget a peer.
    pub fn remove(&self, uid: &PeerUid) -> Option<PeerInfo> {
        self.peers.remove(uid).map(|(_, info)| info)
    }
}

impl PeerDirectory for InMemoryPeerDirectory {
    fn peer(&self, uid: &PeerUid) -> Option<PeerInfo> {
        self.peers.get(uid).map(|entry| entry.value().clone())
    }

    fn peers(&self) -> Vec<PeerUid> {
        let mut uids: Vec<_> = self.peers.iter().map(|entry| entry.key().clone()).collect();
        uids.sort();
        uids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_and_relationship() {
        let dir = InMemoryPeerDirectory::new();
        dir.insert(PeerUid::new("abc"), "Alice", Relationship::Direct);
        dir.insert(PeerUid::new("def"), "Bob", Relationship::Group);

        assert!(dir.is_direct(&PeerUid::new("abc")));
        assert!(!dir.is_direct(&PeerUid::new("def")));
        assert!(!dir.is_direct(&PeerUid::new("zzz")));
        assert_eq!(dir.display_name(&PeerUid::new("def")), "Bob");
        assert_eq!(dir.display_name(&PeerUid::new("zzz")), "zzz");
    }

    #[test]
    fn peers_are_sorted() {
        let dir = InMemoryPeerDirectory::new();
        dir.insert(PeerUid::new("b"), "B", Relationship::Group);
        dir.insert(PeerUid::new("a"), "A", Relationship::Group);
        assert_eq!(dir.peers(), vec![PeerUid::new("a"), PeerUid::new("b")]);
    }

    #[test]
    fn remove_forgets_peer() {
        let dir = InMemoryPeerDirectory::new();
        dir.insert(PeerUid::new("a"), "A", Relationship::Direct);
        assert!(dir.remove(&PeerUid::new("a")).is_some());
        assert!(dir.peer(&PeerUid::new("a")).is_none());
    }
}
