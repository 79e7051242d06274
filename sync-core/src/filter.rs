//! Filter predicates and the snapshot builder.
//!
//! [`build_snapshot`] is the whole recompute algorithm: conjunctive
//! filtering, grouping in encounter order, optional case-insensitive
//! ordering. It never touches an existing snapshot; the caller installs the
//! returned value.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use syncview_types::{EntryId, EntryMetadata, MetadataAttribute, SharedEntry, Version};

/// String fields of an entry that text predicates can search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextField {
    /// [`SharedEntry::description`]
    Description,
    /// [`SharedEntry::code`]
    Code,
    /// [`SharedEntry::owner_alias`]
    OwnerAlias,
    /// [`SharedEntry::owner`]
    OwnerUid,
}

impl TextField {
    /// Every searchable field.
    pub const ALL: [TextField; 4] = [
        TextField::Description,
        TextField::Code,
        TextField::OwnerAlias,
        TextField::OwnerUid,
    ];

    fn value<'a>(&self, entry: &'a SharedEntry) -> &'a str {
        match self {
            TextField::Description => &entry.description,
            TextField::Code => &entry.code,
            TextField::OwnerAlias => &entry.owner_alias,
            TextField::OwnerUid => entry.owner.as_str(),
        }
    }
}

/// A single filter predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Any of `fields` contains `needle`, ignoring case.
    TextContains {
        /// Lowercased search text.
        needle: String,
        /// Fields to search.
        fields: Vec<TextField>,
    },
    /// Entry metadata is known and has the attribute set.
    RequiresAttribute(MetadataAttribute),
    /// Entry is a favorite.
    FavoritesOnly,
}

impl Predicate {
    /// Build a text predicate. The needle is trimmed and lowercased.
    pub fn text_contains(needle: &str, fields: &[TextField]) -> Self {
        Predicate::TextContains {
            needle: needle.trim().to_lowercase(),
            fields: fields.to_vec(),
        }
    }

    /// An empty predicate passes everything.
    pub fn is_empty(&self) -> bool {
        match self {
            Predicate::TextContains { needle, fields } => needle.is_empty() || fields.is_empty(),
            Predicate::RequiresAttribute(_) | Predicate::FavoritesOnly => false,
        }
    }

    /// Evaluate against an entry and its metadata, if known.
    pub fn matches(&self, entry: &SharedEntry, metadata: Option<&EntryMetadata>) -> bool {
        match self {
            Predicate::TextContains { needle, fields } => {
                if self.is_empty() {
                    return true;
                }
                fields
                    .iter()
                    .any(|field| field.value(entry).to_lowercase().contains(needle.as_str()))
            }
            Predicate::RequiresAttribute(attribute) => {
                metadata.is_some_and(|meta| meta.has(*attribute))
            }
            Predicate::FavoritesOnly => entry.favorite,
        }
    }
}

/// Ordered set of predicates, combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    predicates: Vec<Predicate>,
}

impl FilterCriteria {
    /// Criteria that pass everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a predicate.
    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Append a predicate in place.
    pub fn push(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    /// The predicates, in evaluation order.
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// True if no predicate constrains anything.
    pub fn is_pass_through(&self) -> bool {
        self.predicates.iter().all(Predicate::is_empty)
    }

    /// True if some predicate reads entry metadata.
    pub fn needs_metadata(&self) -> bool {
        self.predicates
            .iter()
            .any(|p| matches!(p, Predicate::RequiresAttribute(_)))
    }

    /// True if every non-empty predicate matches.
    pub fn matches(&self, entry: &SharedEntry, metadata: Option<&EntryMetadata>) -> bool {
        self.predicates
            .iter()
            .filter(|p| !p.is_empty())
            .all(|p| p.matches(entry, metadata))
    }
}

/// Key that entries are grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
    /// Group by owning peer.
    #[default]
    Owner,
    /// Group by share code.
    Code,
}

impl Grouping {
    fn key(&self, entry: &SharedEntry) -> String {
        match self {
            Grouping::Owner => entry.owner.to_string(),
            Grouping::Code => entry.code.clone(),
        }
    }
}

/// Explicit ordering inside a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKey {
    /// Order by description.
    Description,
    /// Order by share code.
    Code,
    /// Order by owner alias.
    OwnerAlias,
}

impl OrderKey {
    fn sort_key(&self, entry: &SharedEntry) -> String {
        match self {
            OrderKey::Description => entry.description.to_lowercase(),
            OrderKey::Code => entry.code.to_lowercase(),
            OrderKey::OwnerAlias => entry.owner_alias.to_lowercase(),
        }
    }
}

/// Shape of the materialized view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewOptions {
    /// Grouping key.
    pub grouping: Grouping,
    /// Ordering inside each group; None keeps encounter order.
    pub order: Option<OrderKey>,
}

/// One group of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotGroup {
    /// Grouping key value.
    pub key: String,
    /// Matching entries in view order.
    pub entries: Vec<SharedEntry>,
}

/// Immutable, fully built result of one recompute.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilteredSnapshot {
    stamp: Version,
    source_version: Version,
    groups: Vec<SnapshotGroup>,
    index: HashMap<String, usize>,
}

impl FilteredSnapshot {
    /// The snapshot installed before any recompute ran.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Recompute stamp this snapshot was built under.
    pub fn stamp(&self) -> Version {
        self.stamp
    }

    /// Source dataset version this snapshot was built from.
    pub fn source_version(&self) -> Version {
        self.source_version
    }

    /// Groups in first-encounter order.
    pub fn groups(&self) -> &[SnapshotGroup] {
        &self.groups
    }

    /// Entries of one group.
    pub fn group(&self, key: &str) -> Option<&[SharedEntry]> {
        self.index
            .get(key)
            .map(|&i| self.groups[i].entries.as_slice())
    }

    /// Number of groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Number of entries across all groups.
    pub fn entry_count(&self) -> usize {
        self.groups.iter().map(|g| g.entries.len()).sum()
    }

    /// True if no entry matched.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Build a fresh snapshot from `entries`.
///
/// Entries whose id is missing from `metadata` are treated as having no
/// metadata and fail any attribute predicate.
pub fn build_snapshot(
    stamp: Version,
    source_version: Version,
    entries: &[SharedEntry],
    metadata: &HashMap<EntryId, EntryMetadata>,
    criteria: &FilterCriteria,
    view: &ViewOptions,
) -> FilteredSnapshot {
    let mut groups: Vec<SnapshotGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        if !criteria.matches(entry, metadata.get(&entry.id)) {
            continue;
        }
        let key = view.grouping.key(entry);
        let slot = match index.get(&key) {
            Some(&slot) => slot,
            None => {
                groups.push(SnapshotGroup {
                    key: key.clone(),
                    entries: Vec::new(),
                });
                index.insert(key, groups.len() - 1);
                groups.len() - 1
            }
        };
        groups[slot].entries.push(entry.clone());
    }

    if let Some(order) = view.order {
        for group in &mut groups {
            // Stable: equal keys keep encounter order.
            group.entries.sort_by_cached_key(|e| order.sort_key(e));
        }
    }

    FilteredSnapshot {
        stamp,
        source_version,
        groups,
        index,
    }
}
