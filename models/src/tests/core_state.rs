use crate::CoreState;

/// **VALUE**: The normal lifecycle path is accepted step by step.
///
/// **BUG THIS CATCHES**: The status store rejecting a legitimate transition and leaving the
/// UI stuck on "Starting".
#[test]
fn given_normal_lifecycle_when_walked_then_every_step_is_legal() {
    // GIVEN
    let path = [
        CoreState::Stopped,
        CoreState::Starting,
        CoreState::Running,
        CoreState::Stopping,
        CoreState::Stopped,
    ];

    // WHEN / THEN
    for pair in path.windows(2) {
        assert!(
            pair[0].can_transition_to(pair[1]),
            "{:?} -> {:?} should be legal",
            pair[0],
            pair[1]
        );
    }
}

/// **VALUE**: A crashed core can be restarted and an orphan can be adopted directly.
#[test]
fn given_recovery_paths_when_checked_then_allowed() {
    assert!(CoreState::Crashed.can_transition_to(CoreState::Starting));
    assert!(CoreState::Stopped.can_transition_to(CoreState::Running));
    assert!(CoreState::Running.can_transition_to(CoreState::Crashed));
}

/// **VALUE**: Skipping straight from Running to Starting is rejected.
///
/// **WHY THIS MATTERS**: A restart must pass through Stopping so network settings get reverted.
///
/// **BUG THIS CATCHES**: A restart that spawns a second core while the first still owns the port.
#[test]
fn given_running_when_transition_to_starting_then_rejected() {
    assert!(!CoreState::Running.can_transition_to(CoreState::Starting));
    assert!(!CoreState::Stopping.can_transition_to(CoreState::Starting));
    assert!(!CoreState::Stopped.can_transition_to(CoreState::Crashed));
}

#[test]
fn given_states_when_can_start_checked_then_only_idle_states_can_start() {
    assert!(CoreState::Stopped.can_start());
    assert!(CoreState::Crashed.can_start());
    assert!(!CoreState::Running.can_start());
    assert!(!CoreState::Starting.can_start());
    assert!(!CoreState::Stopping.can_start());
}
