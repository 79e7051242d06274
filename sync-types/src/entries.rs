//! Shared data entries and their lazily fetched metadata.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{EntryId, PeerUid, TypesError};

/// An entry shared with the local user (or favorited by them).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedEntry {
    /// Entry identifier.
    pub id: EntryId,
    /// Peer that owns the entry.
    pub owner: PeerUid,
    /// Display alias of the owner at the time the entry was listed.
    #[serde(default)]
    pub owner_alias: String,
    /// Short share code.
    pub code: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Whether the local user marked this entry as a favorite.
    #[serde(default)]
    pub favorite: bool,
}

/// Metadata attributes an entry may advertise once its metadata is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataAttribute {
    /// Entry carries pose data.
    Pose,
    /// Entry carries world placement data.
    WorldData,
}

impl MetadataAttribute {
    /// Stable snake_case name of the attribute.
    pub fn name(&self) -> &'static str {
        match self {
            MetadataAttribute::Pose => "pose",
            MetadataAttribute::WorldData => "world_data",
        }
    }
}

impl fmt::Display for MetadataAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MetadataAttribute {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pose" => Ok(MetadataAttribute::Pose),
            "world_data" => Ok(MetadataAttribute::WorldData),
            other => Err(TypesError::UnknownAttribute(other.to_string())),
        }
    }
}

/// Metadata for one entry, as returned by the metadata service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryMetadata {
    /// Whether the entry carries pose data.
    pub has_pose: bool,
    /// Whether the entry carries world placement data.
    pub has_world_data: bool,
    /// Number of files referenced by the entry.
    pub file_count: u32,
}

impl EntryMetadata {
    /// Read an attribute.
    pub fn has(&self, attribute: MetadataAttribute) -> bool {
        match attribute {
            MetadataAttribute::Pose => self.has_pose,
            MetadataAttribute::WorldData => self.has_world_data,
        }
    }
}
