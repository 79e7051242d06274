//! # sync-types
//!
//! Shared value types for the syncview client core.
//!
//! This crate provides the foundational types used across all syncview crates:
//! - [`PeerUid`], [`OwnerId`], [`EntryId`], [`Version`] - Identity and ordering types
//! - [`Message`], [`MessageKind`] - Domain messages and their discriminants
//! - [`PermissionSet`], [`PermissionFlag`] - Two-sided relationship flags
//! - [`SharedEntry`], [`EntryMetadata`] - Shared data and its metadata
//! - [`TypesError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod entries;
mod error;
mod ids;
mod messages;
mod permissions;

pub use entries::{EntryMetadata, MetadataAttribute, SharedEntry};
pub use error::TypesError;
pub use ids::{EntryId, OwnerId, PeerUid, Version};
pub use messages::{Message, MessageKind, SpecialMode, WindowKind};
pub use permissions::{DefaultPermissions, PermissionFlag, PermissionSet, Relationship};
