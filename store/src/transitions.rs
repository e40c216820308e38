//! Status-transition adjacency tables. Writers validate against these
//! before mutating state; an attempted illegal transition is refused and
//! leaves state unchanged, per the single invariant that matters most to
//! callers: a rejected transition never has partial effect.

use crate::entities::{ObjectiveStatus, QuestStatus, Role};

/// `pending -> ready <-> planning -> running <-> paused -> {completed, failed, cancelled}`
pub fn objective_transition_allowed(from: ObjectiveStatus, to: ObjectiveStatus) -> bool {
    use ObjectiveStatus::*;
    if from == to {
        return true;
    }
    matches!(
        (from, to),
        (Pending, Ready)
            | (Ready, Planning)
            | (Planning, Ready)
            | (Planning, Running)
            | (Ready, Cancelled)
            | (Planning, Cancelled)
            | (Running, Paused)
            | (Paused, Running)
            | (Running, Completed)
            | (Running, Failed)
            | (Running, Cancelled)
            | (Paused, Cancelled)
            | (Paused, Failed)
    )
}

/// `active -> completed` fires once `complete_quest` runs; `active -> abandoned`
/// is a user-initiated terminal transition not named by the turn loop itself.
pub fn quest_transition_allowed(from: QuestStatus, to: QuestStatus) -> bool {
    use QuestStatus::*;
    if from == to {
        return true;
    }
    matches!((from, to), (Active, Completed) | (Active, Abandoned))
}

/// Fixed adjacency table of legal next roles, keyed by the current role.
/// Starting roles (no incoming edges) and terminal roles (no outgoing
/// edges) are `Role::STARTING`/`Role::TERMINAL`; a transition request
/// naming the current role is a no-op, not a conflict.
pub fn role_transition_allowed(from: Role, to: Role) -> bool {
    use Role::*;
    if from == to {
        return true;
    }
    if from.is_terminal() {
        return false;
    }
    matches!(
        (from, to),
        (Explorer, Planner)
            | (Explorer, Designer)
            | (Explorer, Creator)
            | (Explorer, Critic)
            | (Planner, Designer)
            | (Planner, Creator)
            | (Planner, Critic)
            | (Designer, Creator)
            | (Designer, Critic)
            | (Designer, Editor)
            | (Creator, Critic)
            | (Creator, Editor)
            | (Creator, Documenter)
            | (Creator, Devops)
            | (Critic, Editor)
            | (Critic, Creator)
            | (Critic, Documenter)
            | (Critic, Devops)
            | (Critic, Resolver)
            | (Editor, Documenter)
            | (Editor, Devops)
            | (Editor, Resolver)
            | (Editor, Critic)
    )
}
