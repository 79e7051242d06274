//! Window lifecycle state machine for syncview.
//!
//! Pure and side-effect-free: [`WindowState::on_message`] takes a bus
//! message and returns the new state plus the actions the controller must
//! run. Resource release is always emitted before any adoption so a window
//! never holds resources for two targets at once.

use syncview_types::{Message, PeerUid, SpecialMode, WindowKind};

/// Sub-state of an open window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenPhase {
    /// Rendering normally.
    #[default]
    Ready,
    /// Waiting on data for the current target.
    Loading,
    /// Applying a user change.
    Applying,
    /// The last load or apply failed.
    Faulted,
}

/// Visibility of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    /// Not rendered.
    #[default]
    Closed,
    /// Rendered, in the given phase.
    Open(OpenPhase),
}

impl Visibility {
    /// Check if open in any phase.
    pub fn is_open(&self) -> bool {
        matches!(self, Visibility::Open(_))
    }
}

/// What a window does when a special mode starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeBehavior {
    /// Unaffected by the mode.
    Ignore,
    /// Hidden for the duration of the mode.
    ForceClosed,
    /// Shown for the duration of the mode.
    ForceOpen,
}

/// Static description of how a window reacts to messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowPolicy {
    /// Which window this policy is for.
    pub kind: WindowKind,
    /// Window shows a specific peer and reacts to [`Message::ToggleTarget`].
    pub targeted: bool,
    /// Window is closed when the connection drops.
    pub session_scoped: bool,
    modes: Vec<(SpecialMode, ModeBehavior)>,
}

impl WindowPolicy {
    /// Untargeted, not session-scoped, ignoring every mode.
    pub fn new(kind: WindowKind) -> Self {
        Self {
            kind,
            targeted: false,
            session_scoped: false,
            modes: Vec::new(),
        }
    }

    /// Mark the window as showing a target peer.
    pub fn targeted(mut self) -> Self {
        self.targeted = true;
        self
    }

    /// Mark the window as closing on disconnect.
    pub fn session_scoped(mut self) -> Self {
        self.session_scoped = true;
        self
    }

    /// Set the behavior for a special mode.
    pub fn on_mode(mut self, mode: SpecialMode, behavior: ModeBehavior) -> Self {
        self.modes.retain(|(m, _)| *m != mode);
        self.modes.push((mode, behavior));
        self
    }

    /// Behavior configured for `mode`.
    pub fn behavior(&self, mode: SpecialMode) -> ModeBehavior {
        self.modes
            .iter()
            .find(|(m, _)| *m == mode)
            .map(|(_, b)| *b)
            .unwrap_or(ModeBehavior::Ignore)
    }
}

/// Instructions for the window controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowAction {
    /// Drop every resource loaded for this peer.
    ReleaseTarget(PeerUid),
    /// Start loading resources for this peer.
    AdoptTarget(PeerUid),
    /// Window became visible.
    Opened,
    /// Window became hidden.
    Closed,
}

/// State saved when a special mode overrides a window.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Remembered {
    mode: SpecialMode,
    visibility: Visibility,
    target: Option<PeerUid>,
}

/// Window state machine - NO I/O, just state transitions.
///
/// Invariant: `target` is only set while the window is open.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WindowState {
    visibility: Visibility,
    target: Option<PeerUid>,
    remembered: Option<Remembered>,
}

impl WindowState {
    /// Create a closed window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current visibility.
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Check if currently open.
    pub fn is_open(&self) -> bool {
        self.visibility.is_open()
    }

    /// Peer the window currently shows.
    pub fn target(&self) -> Option<&PeerUid> {
        self.target.as_ref()
    }

    /// Check if a special mode is currently overriding this window.
    pub fn is_overridden(&self) -> bool {
        self.remembered.is_some()
    }

    /// Move an open window to another phase. Closed windows stay closed.
    pub fn with_phase(mut self, phase: OpenPhase) -> Self {
        if self.is_open() {
            self.visibility = Visibility::Open(phase);
        }
        self
    }

    /// Process a bus message and return the new state plus actions to execute.
    ///
    /// This is a pure function. The caller must run the returned actions in
    /// order before handling the next message.
    pub fn on_message(
        mut self,
        policy: &WindowPolicy,
        message: &Message,
    ) -> (Self, Vec<WindowAction>) {
        let actions = match message {
            Message::SpecialModeEntered(mode) => self.enter_mode(policy, *mode),
            Message::SpecialModeExited(mode) => self.exit_mode(*mode),
            Message::Disconnected if policy.session_scoped => {
                if let Some(remembered) = self.remembered.as_mut() {
                    remembered.visibility = Visibility::Closed;
                    remembered.target = None;
                }
                self.transition(Visibility::Closed, None)
            }
            Message::ToggleTarget { window, target }
                if *window == policy.kind && policy.targeted =>
            {
                let visibility = match target {
                    Some(_) => Visibility::Open(OpenPhase::Ready),
                    None => Visibility::Closed,
                };
                self.request(policy, visibility, target.clone())
            }
            Message::ToggleWindow(window) if *window == policy.kind && !policy.targeted => {
                let deferred = self.deferring(policy).map(|r| r.visibility.is_open());
                let currently_open = deferred.unwrap_or_else(|| self.is_open());
                let visibility = if currently_open {
                    Visibility::Closed
                } else {
                    Visibility::Open(OpenPhase::Ready)
                };
                self.request(policy, visibility, None)
            }
            _ => Vec::new(),
        };
        (self, actions)
    }

    fn enter_mode(&mut self, policy: &WindowPolicy, mode: SpecialMode) -> Vec<WindowAction> {
        let behavior = policy.behavior(mode);
        if behavior == ModeBehavior::Ignore || self.remembered.is_some() {
            return Vec::new();
        }
        self.remembered = Some(Remembered {
            mode,
            visibility: self.visibility,
            target: self.target.clone(),
        });
        match behavior {
            ModeBehavior::ForceClosed => self.transition(Visibility::Closed, None),
            ModeBehavior::ForceOpen if !self.is_open() => {
                self.transition(Visibility::Open(OpenPhase::Ready), None)
            }
            _ => Vec::new(),
        }
    }

    fn exit_mode(&mut self, mode: SpecialMode) -> Vec<WindowAction> {
        match self.remembered.take() {
            Some(remembered) if remembered.mode == mode => {
                self.transition(remembered.visibility, remembered.target)
            }
            other => {
                self.remembered = other;
                Vec::new()
            }
        }
    }

    /// While a mode holds the window closed, user requests update the state
    /// to restore instead of opening the window.
    fn deferring(&mut self, policy: &WindowPolicy) -> Option<&mut Remembered> {
        match self.remembered.as_mut() {
            Some(r) if policy.behavior(r.mode) == ModeBehavior::ForceClosed => Some(r),
            _ => None,
        }
    }

    fn request(
        &mut self,
        policy: &WindowPolicy,
        visibility: Visibility,
        target: Option<PeerUid>,
    ) -> Vec<WindowAction> {
        if let Some(remembered) = self.deferring(policy) {
            remembered.visibility = visibility;
            remembered.target = target;
            return Vec::new();
        }
        self.transition(visibility, target)
    }

    fn transition(&mut self, visibility: Visibility, target: Option<PeerUid>) -> Vec<WindowAction> {
        let target = if visibility.is_open() { target } else { None };
        let mut actions = Vec::new();

        if self.target != target {
            if let Some(old) = self.target.take() {
                actions.push(WindowAction::ReleaseTarget(old));
            }
            if let Some(new) = &target {
                actions.push(WindowAction::AdoptTarget(new.clone()));
            }
        }

        match (self.visibility.is_open(), visibility.is_open()) {
            (false, true) => actions.push(WindowAction::Opened),
            (true, false) => actions.push(WindowAction::Closed),
            _ => {}
        }

        self.visibility = visibility;
        self.target = target;
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile_policy() -> WindowPolicy {
        WindowPolicy::new(WindowKind::Profile)
            .targeted()
            .session_scoped()
            .on_mode(SpecialMode::GroupPose, ModeBehavior::ForceClosed)
    }

    fn pose_entered() -> Message {
        Message::SpecialModeEntered(SpecialMode::GroupPose)
    }

    fn pose_exited() -> Message {
        Message::SpecialModeExited(SpecialMode::GroupPose)
    }

    fn toggle(target: Option<&str>) -> Message {
        Message::ToggleTarget {
            window: WindowKind::Profile,
            target: target.map(PeerUid::new),
        }
    }

    #[test]
    fn starts_closed() {
        let state = WindowState::new();
        assert_eq!(state.visibility(), Visibility::Closed);
        assert!(state.target().is_none());
    }

    #[test]
    fn toggle_with_target_opens_and_adopts() {
        let (state, actions) =
            WindowState::new().on_message(&profile_policy(), &toggle(Some("abc")));
        assert!(state.is_open());
        assert_eq!(state.target(), Some(&PeerUid::new("abc")));
        assert_eq!(
            actions,
            vec![
                WindowAction::AdoptTarget(PeerUid::new("abc")),
                WindowAction::Opened
            ]
        );
    }

    #[test]
    fn retarget_releases_previous_before_adopting() {
        let policy = profile_policy();
        let (state, _) = WindowState::new().on_message(&policy, &toggle(Some("abc")));
        let (state, actions) = state.on_message(&policy, &toggle(Some("def")));
        assert_eq!(state.target(), Some(&PeerUid::new("def")));
        assert_eq!(
            actions,
            vec![
                WindowAction::ReleaseTarget(PeerUid::new("abc")),
                WindowAction::AdoptTarget(PeerUid::new("def")),
            ]
        );
    }

    #[test]
    fn toggle_without_target_closes_and_releases() {
        let policy = profile_policy();
        let (state, _) = WindowState::new().on_message(&policy, &toggle(Some("abc")));
        let (state, actions) = state.on_message(&policy, &toggle(None));
        assert!(!state.is_open());
        assert!(state.target().is_none());
        assert_eq!(
            actions,
            vec![
                WindowAction::ReleaseTarget(PeerUid::new("abc")),
                WindowAction::Closed
            ]
        );
    }

    #[test]
    fn toggle_for_other_window_is_ignored() {
        let message = Message::ToggleTarget {
            window: WindowKind::Permissions,
            target: Some(PeerUid::new("abc")),
        };
        let (state, actions) = WindowState::new().on_message(&profile_policy(), &message);
        assert!(!state.is_open());
        assert!(actions.is_empty());
    }

    #[test]
    fn mode_force_close_then_restore() {
        let policy = profile_policy();
        let (state, _) = WindowState::new().on_message(&policy, &toggle(Some("abc")));

        let (state, actions) = state.on_message(&policy, &pose_entered());
        assert!(!state.is_open());
        assert!(state.is_overridden());
        assert_eq!(
            actions,
            vec![
                WindowAction::ReleaseTarget(PeerUid::new("abc")),
                WindowAction::Closed
            ]
        );

        let (state, actions) = state.on_message(&policy, &pose_exited());
        assert!(state.is_open());
        assert!(!state.is_overridden());
        assert_eq!(state.target(), Some(&PeerUid::new("abc")));
        assert_eq!(
            actions,
            vec![
                WindowAction::AdoptTarget(PeerUid::new("abc")),
                WindowAction::Opened
            ]
        );
    }

    #[test]
    fn closed_window_stays_closed_after_mode() {
        let policy = profile_policy();
        let (state, _) = WindowState::new().on_message(&policy, &pose_entered());
        let (state, actions) = state.on_message(&policy, &pose_exited());
        assert!(!state.is_open());
        assert!(actions.is_empty());
    }

    #[test]
    fn exit_of_other_mode_does_not_restore() {
        let policy = profile_policy().on_mode(SpecialMode::Cutscene, ModeBehavior::ForceClosed);
        let (state, _) = WindowState::new().on_message(&policy, &toggle(Some("abc")));
        let (state, _) = state.on_message(&policy, &pose_entered());
        let (state, actions) =
            state.on_message(&policy, &Message::SpecialModeExited(SpecialMode::Cutscene));
        assert!(!state.is_open());
        assert!(state.is_overridden());
        assert!(actions.is_empty());
    }

    #[test]
    fn toggle_during_forced_close_is_deferred() {
        let policy = profile_policy();
        let (state, _) = WindowState::new().on_message(&policy, &pose_entered());
        let (state, actions) = state.on_message(&policy, &toggle(Some("abc")));
        assert!(!state.is_open());
        assert!(actions.is_empty());

        let (state, _) = state.on_message(&policy, &pose_exited());
        assert!(state.is_open());
        assert_eq!(state.target(), Some(&PeerUid::new("abc")));
    }

    #[test]
    fn force_open_window_returns_to_closed() {
        let policy = WindowPolicy::new(WindowKind::PoseTools)
            .on_mode(SpecialMode::GroupPose, ModeBehavior::ForceOpen);
        let (state, actions) = WindowState::new().on_message(&policy, &pose_entered());
        assert!(state.is_open());
        assert_eq!(actions, vec![WindowAction::Opened]);

        let (state, actions) = state.on_message(&policy, &pose_exited());
        assert!(!state.is_open());
        assert_eq!(actions, vec![WindowAction::Closed]);
    }

    #[test]
    fn disconnect_closes_session_windows_and_forgets_restore() {
        let policy = profile_policy();
        let (state, _) = WindowState::new().on_message(&policy, &toggle(Some("abc")));
        let (state, _) = state.on_message(&policy, &pose_entered());
        let (state, _) = state.on_message(&policy, &Message::Disconnected);
        let (state, actions) = state.on_message(&policy, &pose_exited());
        assert!(!state.is_open());
        assert!(actions.is_empty());
    }

    #[test]
    fn disconnect_ignored_by_non_session_windows() {
        let policy = WindowPolicy::new(WindowKind::PairList);
        let (state, _) =
            WindowState::new().on_message(&policy, &Message::ToggleWindow(WindowKind::PairList));
        let (state, actions) = state.on_message(&policy, &Message::Disconnected);
        assert!(state.is_open());
        assert!(actions.is_empty());
    }

    #[test]
    fn plain_toggle_flips_untargeted_window() {
        let policy = WindowPolicy::new(WindowKind::Transfers);
        let (state, actions) =
            WindowState::new().on_message(&policy, &Message::ToggleWindow(WindowKind::Transfers));
        assert!(state.is_open());
        assert_eq!(actions, vec![WindowAction::Opened]);
        let (state, actions) =
            state.on_message(&policy, &Message::ToggleWindow(WindowKind::Transfers));
        assert!(!state.is_open());
        assert_eq!(actions, vec![WindowAction::Closed]);
    }

    #[test]
    fn phase_only_applies_when_open() {
        let state = WindowState::new().with_phase(OpenPhase::Loading);
        assert_eq!(state.visibility(), Visibility::Closed);

        let (state, _) = WindowState::new().on_message(&profile_policy(), &toggle(Some("abc")));
        let state = state.with_phase(OpenPhase::Faulted);
        assert_eq!(state.visibility(), Visibility::Open(OpenPhase::Faulted));
    }
}
