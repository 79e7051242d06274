//! Two-sided permission state and pending-edit diffing.
//!
//! Everything here is pure. The runtime reconciler in sync-client owns the
//! committed state and working copies; this module only compares, seeds and
//! derives.

use syncview_types::{DefaultPermissions, PeerUid, PermissionFlag, PermissionSet};

/// Permission state of one peer.
///
/// `local` is what the local user grants; `remote` is what the peer
/// grants, as last observed through sync. The two sides are stored
/// independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeerPermissionState {
    /// Flags set by the local user. Editable.
    pub local: PermissionSet,
    /// Flags set by the peer. Read-only from this side.
    pub remote: PermissionSet,
}

impl PeerPermissionState {
    /// Create a state from both sides.
    pub fn new(local: PermissionSet, remote: PermissionSet) -> Self {
        Self { local, remote }
    }
}

/// A single flag that differs between a working copy and committed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagChange {
    /// The flag that changed.
    pub flag: PermissionFlag,
    /// Committed value.
    pub from: bool,
    /// Working value.
    pub to: bool,
}

/// True if any flag in `working` differs from `committed`.
pub fn has_pending_edit(working: &PermissionSet, committed: &PermissionSet) -> bool {
    PermissionFlag::ALL
        .into_iter()
        .any(|flag| working.get(flag) != committed.get(flag))
}

/// List the flags that differ, in [`PermissionFlag::ALL`] order.
pub fn changed_flags(working: &PermissionSet, committed: &PermissionSet) -> Vec<FlagChange> {
    PermissionFlag::ALL
        .into_iter()
        .filter(|&flag| working.get(flag) != committed.get(flag))
        .map(|flag| FlagChange {
            flag,
            from: committed.get(flag),
            to: working.get(flag),
        })
        .collect()
}

/// Overwrite `working` with the direct or group default profile.
pub fn apply_defaults(working: &mut PermissionSet, is_direct: bool, defaults: &DefaultPermissions) {
    *working = defaults.for_relationship(is_direct);
}

/// Flags as the user should see them.
///
/// Pausing and the disable flags stop the effect for both sides when either
/// side sets them. Sticky only has meaning locally.
pub fn effective_permissions(state: &PeerPermissionState) -> PermissionSet {
    let PeerPermissionState { local, remote } = state;
    PermissionSet {
        paused: local.paused || remote.paused,
        sticky: local.sticky,
        sounds_disabled: local.sounds_disabled || remote.sounds_disabled,
        animations_disabled: local.animations_disabled || remote.animations_disabled,
        effects_disabled: local.effects_disabled || remote.effects_disabled,
    }
}

/// Pick the peers a bulk default overwrite may touch.
///
/// Sticky peers keep their individual settings and are skipped.
pub fn select_bulk_targets<'a, I>(peers: I) -> Vec<PeerUid>
where
    I: IntoIterator<Item = (&'a PeerUid, &'a PermissionSet)>,
{
    peers
        .into_iter()
        .filter(|(_, local)| !local.sticky)
        .map(|(uid, _)| uid.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paused() -> PermissionSet {
        PermissionSet::default().with(PermissionFlag::Paused, true)
    }

    #[test]
    fn identical_sets_have_no_pending_edit() {
        let committed = PermissionSet::default();
        let working = committed;
        assert!(!has_pending_edit(&working, &committed));
    }

    #[test]
    fn any_single_flag_difference_is_pending() {
        let committed = PermissionSet::default();
        for flag in PermissionFlag::ALL {
            let working = committed.with(flag, true);
            assert!(has_pending_edit(&working, &committed), "{flag}");
        }
    }

    #[test]
    fn changed_flags_reports_direction() {
        let committed = paused();
        let working = PermissionSet::default().with(PermissionFlag::EffectsDisabled, true);
        let changes = changed_flags(&working, &committed);
        assert_eq!(
            changes,
            vec![
                FlagChange {
                    flag: PermissionFlag::Paused,
                    from: true,
                    to: false,
                },
                FlagChange {
                    flag: PermissionFlag::EffectsDisabled,
                    from: false,
                    to: true,
                },
            ]
        );
    }

    #[test]
    fn apply_defaults_uses_direct_or_group_profile() {
        let defaults = DefaultPermissions {
            direct: PermissionSet::default().with(PermissionFlag::AnimationsDisabled, true),
            group: PermissionSet::default().with(PermissionFlag::SoundsDisabled, true),
        };

        let mut working = paused();
        apply_defaults(&mut working, true, &defaults);
        assert_eq!(working, defaults.direct);

        apply_defaults(&mut working, false, &defaults);
        assert_eq!(working, defaults.group);
    }

    #[test]
    fn effective_permissions_combine_both_sides() {
        let state = PeerPermissionState::new(
            PermissionSet::default().with(PermissionFlag::Sticky, true),
            paused().with(PermissionFlag::Sticky, false),
        );
        let effective = effective_permissions(&state);
        assert!(effective.paused);
        assert!(effective.sticky);
        assert!(!effective.sounds_disabled);
    }

    #[test]
    fn remote_sticky_does_not_show_locally() {
        let state = PeerPermissionState::new(
            PermissionSet::default(),
            PermissionSet::default().with(PermissionFlag::Sticky, true),
        );
        assert!(!effective_permissions(&state).sticky);
    }

    #[test]
    fn bulk_targets_skip_sticky_peers() {
        let a = PeerUid::new("a");
        let b = PeerUid::new("b");
        let sticky = PermissionSet::default().with(PermissionFlag::Sticky, true);
        let plain = PermissionSet::default();

        let targets = select_bulk_targets([(&a, &sticky), (&b, &plain)]);
        assert_eq!(targets, vec![b]);
    }
}
