//! Migration run state machine.

use std::fmt;

use serde::Serialize;

/// Lifecycle of a single migration run.
///
/// ```text
/// Idle -> Authenticated -> ParentsMigrated -> ChildrenMigrated -> Done
///   \__________\______________> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    Idle,
    Authenticated,
    ParentsMigrated,
    ChildrenMigrated,
    Done,
    Failed,
}

impl MigrationState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: MigrationState) -> bool {
        use MigrationState::*;
        matches!(
            (self, next),
            (Idle, Authenticated)
                | (Authenticated, ParentsMigrated)
                | (ParentsMigrated, ChildrenMigrated)
                | (ChildrenMigrated, Done)
                | (Idle, Failed)
                | (Authenticated, Failed)
        )
    }

    /// No further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, MigrationState::Done | MigrationState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MigrationState::Idle => "idle",
            MigrationState::Authenticated => "authenticated",
            MigrationState::ParentsMigrated => "parents_migrated",
            MigrationState::ChildrenMigrated => "children_migrated",
            MigrationState::Done => "done",
            MigrationState::Failed => "failed",
        }
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::MigrationState::*;

    #[test]
    fn happy_path_transitions_are_legal() {
        let path = [Idle, Authenticated, ParentsMigrated, ChildrenMigrated, Done];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn failed_only_reachable_before_parent_phase_completes() {
        assert!(Idle.can_transition_to(Failed));
        assert!(Authenticated.can_transition_to(Failed));
        assert!(!ParentsMigrated.can_transition_to(Failed));
        assert!(!Done.can_transition_to(Failed));
    }

    #[test]
    fn phases_cannot_be_skipped() {
        assert!(!Idle.can_transition_to(ParentsMigrated));
        assert!(!Authenticated.can_transition_to(ChildrenMigrated));
        assert!(!ParentsMigrated.can_transition_to(Done));
    }

    #[test]
    fn terminal_states() {
        assert!(Done.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!Idle.is_terminal());
        assert_eq!(ParentsMigrated.to_string(), "parents_migrated");
    }
}
