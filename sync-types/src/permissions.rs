//! Permission flags exchanged between paired peers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// A single named permission flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionFlag {
    /// Synchronization with the peer is paused.
    Paused,
    /// Exclude the peer from group-level default overwrites.
    Sticky,
    /// Sounds from the peer are not applied.
    SoundsDisabled,
    /// Animations from the peer are not applied.
    AnimationsDisabled,
    /// Visual effects from the peer are not applied.
    EffectsDisabled,
}

impl PermissionFlag {
    /// Every flag, in display order.
    pub const ALL: [PermissionFlag; 5] = [
        PermissionFlag::Paused,
        PermissionFlag::Sticky,
        PermissionFlag::SoundsDisabled,
        PermissionFlag::AnimationsDisabled,
        PermissionFlag::EffectsDisabled,
    ];

    /// Stable snake_case name of the flag.
    pub fn name(&self) -> &'static str {
        match self {
            PermissionFlag::Paused => "paused",
            PermissionFlag::Sticky => "sticky",
            PermissionFlag::SoundsDisabled => "sounds_disabled",
            PermissionFlag::AnimationsDisabled => "animations_disabled",
            PermissionFlag::EffectsDisabled => "effects_disabled",
        }
    }
}

impl fmt::Display for PermissionFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PermissionFlag {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PermissionFlag::ALL
            .into_iter()
            .find(|flag| flag.name() == s)
            .ok_or_else(|| TypesError::UnknownFlag(s.to_string()))
    }
}

/// One side of a peer relationship: the full set of named flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionSet {
    /// See [`PermissionFlag::Paused`].
    pub paused: bool,
    /// See [`PermissionFlag::Sticky`].
    pub sticky: bool,
    /// See [`PermissionFlag::SoundsDisabled`].
    pub sounds_disabled: bool,
    /// See [`PermissionFlag::AnimationsDisabled`].
    pub animations_disabled: bool,
    /// See [`PermissionFlag::EffectsDisabled`].
    pub effects_disabled: bool,
}

impl PermissionSet {
    /// Read a single flag.
    pub fn get(&self, flag: PermissionFlag) -> bool {
        match flag {
            PermissionFlag::Paused => self.paused,
            PermissionFlag::Sticky => self.sticky,
            PermissionFlag::SoundsDisabled => self.sounds_disabled,
            PermissionFlag::AnimationsDisabled => self.animations_disabled,
            PermissionFlag::EffectsDisabled => self.effects_disabled,
        }
    }

    /// Write a single flag.
    pub fn set(&mut self, flag: PermissionFlag, value: bool) {
        match flag {
            PermissionFlag::Paused => self.paused = value,
            PermissionFlag::Sticky => self.sticky = value,
            PermissionFlag::SoundsDisabled => self.sounds_disabled = value,
            PermissionFlag::AnimationsDisabled => self.animations_disabled = value,
            PermissionFlag::EffectsDisabled => self.effects_disabled = value,
        }
    }

    /// Builder-style variant of [`PermissionSet::set`].
    pub fn with(mut self, flag: PermissionFlag, value: bool) -> Self {
        self.set(flag, value);
        self
    }
}

/// How a peer is related to the local user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    /// Paired one-to-one.
    Direct,
    /// Known only through a shared group.
    Group,
}

/// Default permission profiles applied by "reset to default".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultPermissions {
    /// Defaults for direct pairs.
    pub direct: PermissionSet,
    /// Defaults for group-derived pairs.
    pub group: PermissionSet,
}

impl DefaultPermissions {
    /// Pick the profile for a relationship.
    pub fn for_relationship(&self, is_direct: bool) -> PermissionSet {
        if is_direct {
            self.direct
        } else {
            self.group
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_and_set_cover_every_flag() {
        let mut set = PermissionSet::default();
        for flag in PermissionFlag::ALL {
            assert!(!set.get(flag));
            set.set(flag, true);
            assert!(set.get(flag));
        }
    }

    #[test]
    fn flag_names_parse_back() {
        for flag in PermissionFlag::ALL {
            assert_eq!(flag.name().parse::<PermissionFlag>().unwrap(), flag);
        }
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let err = "loud".parse::<PermissionFlag>().unwrap_err();
        assert_eq!(err.to_string(), "unknown permission flag: loud");
    }

    #[test]
    fn missing_fields_default_to_false() {
        let set: PermissionSet = serde_json::from_str(r#"{"paused":true}"#).unwrap();
        assert!(set.paused);
        assert!(!set.sticky);
        assert!(!set.effects_disabled);
    }

    #[test]
    fn defaults_pick_profile_by_relationship() {
        let defaults = DefaultPermissions {
            direct: PermissionSet::default(),
            group: PermissionSet::default().with(PermissionFlag::SoundsDisabled, true),
        };
        assert!(!defaults.for_relationship(true).sounds_disabled);
        assert!(defaults.for_relationship(false).sounds_disabled);
    }
}
