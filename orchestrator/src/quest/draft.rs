//! `DraftRegistry`: the gap between a quest turn proposing an
//! `ObjectiveDraft` and the operator's accept/reject decision. Drafts
//! are transient and in-memory; only an accept materializes a
//! persisted Objective.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use thiserror::Error;

use store::{ObjectiveId, ProjectId, QuestId};

/// How long a rejected draft stays acceptable by a late "undo", mirroring
/// the client-side undo window.
const REJECTION_GRACE: Duration = Duration::from_secs(15);

enum DraftState {
    Pending,
    Rejected(Instant),
}

struct TrackedDraft {
    project_id: ProjectId,
    quest_id: QuestId,
    draft: serde_json::Value,
    /// Draft ids (not objective ids) this draft depends on, resolved at
    /// accept time against whichever siblings have already materialized.
    blocked_by: Vec<String>,
    state: DraftState,
}

#[derive(Debug, Error)]
pub enum DraftError {
    #[error("no resolvable draft with that id")]
    NotFound,
    #[error("draft belongs to a different quest")]
    WrongQuest,
}

#[derive(Default)]
pub struct DraftRegistry {
    pending: std::sync::Mutex<HashMap<String, TrackedDraft>>,
    /// Draft id -> materialized objective, kept after acceptance so a
    /// sibling draft accepted later can still wire its dependency.
    resolved: std::sync::Mutex<HashMap<String, ObjectiveId>>,
}

pub struct AcceptedDraft {
    pub project_id: ProjectId,
    pub draft: serde_json::Value,
    pub blocked_by: Vec<ObjectiveId>,
}

impl DraftRegistry {
    pub fn track(&self, id: String, project_id: ProjectId, quest_id: QuestId, draft: serde_json::Value, blocked_by: Vec<String>) {
        let mut pending = self.pending.lock().unwrap();
        sweep_expired(&mut pending);
        pending.insert(id, TrackedDraft { project_id, quest_id, draft, blocked_by, state: DraftState::Pending });
    }

    /// Removes `id` for acceptance if it is still pending or within its
    /// rejection grace window. `blocked_by` draft ids already accepted are
    /// resolved to objective ids; still-pending or expired ones are
    /// dropped (best-effort, matching the batch's non-transactional stance).
    pub fn take_for_accept(&self, id: &str, quest_id: &QuestId) -> Result<AcceptedDraft, DraftError> {
        let tracked = {
            let mut pending = self.pending.lock().unwrap();
            sweep_expired(&mut pending);
            let belongs_to_quest = matches!(pending.get(id), Some(t) if &t.quest_id == quest_id);
            if !belongs_to_quest {
                return Err(if pending.contains_key(id) { DraftError::WrongQuest } else { DraftError::NotFound });
            }
            pending.remove(id).unwrap()
        };

        let resolved = self.resolved.lock().unwrap();
        let blocked_by = tracked.blocked_by.iter().filter_map(|ref_id| resolved.get(ref_id).cloned()).collect();

        Ok(AcceptedDraft { project_id: tracked.project_id, draft: tracked.draft, blocked_by })
    }

    pub fn record_resolved(&self, id: String, objective_id: ObjectiveId) {
        self.resolved.lock().unwrap().insert(id, objective_id);
    }

    /// Marks a still-pending draft rejected. Kept around for
    /// [`REJECTION_GRACE`] in case the operator undoes the rejection with
    /// a late accept; a second reject, or one past the grace window, is
    /// reported as not found.
    pub fn reject(&self, id: &str, quest_id: &QuestId) -> Result<(), DraftError> {
        let mut pending = self.pending.lock().unwrap();
        sweep_expired(&mut pending);
        let wrong_quest = matches!(pending.get(id), Some(t) if &t.quest_id != quest_id);
        if wrong_quest {
            return Err(DraftError::WrongQuest);
        }
        match pending.get_mut(id) {
            Some(t) if matches!(t.state, DraftState::Pending) => {
                t.state = DraftState::Rejected(Instant::now());
                Ok(())
            }
            _ => Err(DraftError::NotFound),
        }
    }
}

fn sweep_expired(pending: &mut HashMap<String, TrackedDraft>) {
    let now = Instant::now();
    pending.retain(|_, t| !matches!(t.state, DraftState::Rejected(at) if now.duration_since(at) > REJECTION_GRACE));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (ProjectId, QuestId) {
        (ProjectId::new(), QuestId::new())
    }

    #[test]
    fn a_pending_draft_can_be_accepted() {
        let registry = DraftRegistry::default();
        let (project_id, quest_id) = ids();
        registry.track("d1".to_string(), project_id.clone(), quest_id.clone(), serde_json::json!({"title": "x"}), vec![]);

        let accepted = registry.take_for_accept("d1", &quest_id).ok().expect("should accept");
        assert_eq!(accepted.project_id, project_id);
        assert!(accepted.blocked_by.is_empty());
    }

    #[test]
    fn accepting_twice_returns_not_found_the_second_time() {
        let registry = DraftRegistry::default();
        let (project_id, quest_id) = ids();
        registry.track("d1".to_string(), project_id, quest_id.clone(), serde_json::json!({}), vec![]);

        assert!(registry.take_for_accept("d1", &quest_id).is_ok());
        assert!(matches!(registry.take_for_accept("d1", &quest_id), Err(DraftError::NotFound)));
    }

    #[test]
    fn rejecting_then_accepting_within_the_grace_window_still_succeeds() {
        let registry = DraftRegistry::default();
        let (project_id, quest_id) = ids();
        registry.track("d1".to_string(), project_id, quest_id.clone(), serde_json::json!({}), vec![]);

        registry.reject("d1", &quest_id).unwrap();
        assert!(registry.take_for_accept("d1", &quest_id).is_ok());
    }

    #[test]
    fn rejecting_twice_returns_not_found_the_second_time() {
        let registry = DraftRegistry::default();
        let (project_id, quest_id) = ids();
        registry.track("d1".to_string(), project_id, quest_id.clone(), serde_json::json!({}), vec![]);

        registry.reject("d1", &quest_id).unwrap();
        assert!(matches!(registry.reject("d1", &quest_id), Err(DraftError::NotFound)));
    }

    #[test]
    fn a_dependency_on_an_already_accepted_sibling_resolves() {
        let registry = DraftRegistry::default();
        let (project_id, quest_id) = ids();
        registry.track("a".to_string(), project_id.clone(), quest_id.clone(), serde_json::json!({}), vec![]);
        registry.track("b".to_string(), project_id, quest_id.clone(), serde_json::json!({}), vec!["a".to_string()]);

        let accepted_a = registry.take_for_accept("a", &quest_id).ok().unwrap();
        assert!(accepted_a.blocked_by.is_empty());
        let objective_id = ObjectiveId::new();
        registry.record_resolved("a".to_string(), objective_id.clone());

        let accepted_b = registry.take_for_accept("b", &quest_id).ok().unwrap();
        assert_eq!(accepted_b.blocked_by, vec![objective_id]);
    }

    #[test]
    fn a_dependency_on_a_still_pending_sibling_is_dropped_best_effort() {
        let registry = DraftRegistry::default();
        let (project_id, quest_id) = ids();
        registry.track("a".to_string(), project_id.clone(), quest_id.clone(), serde_json::json!({}), vec![]);
        registry.track("b".to_string(), project_id, quest_id.clone(), serde_json::json!({}), vec!["a".to_string()]);

        let accepted_b = registry.take_for_accept("b", &quest_id).ok().unwrap();
        assert!(accepted_b.blocked_by.is_empty());
    }

    #[test]
    fn accepting_from_the_wrong_quest_is_rejected() {
        let registry = DraftRegistry::default();
        let (project_id, quest_id) = ids();
        registry.track("d1".to_string(), project_id, quest_id, serde_json::json!({}), vec![]);

        let other_quest = QuestId::new();
        assert!(matches!(registry.take_for_accept("d1", &other_quest), Err(DraftError::WrongQuest)));
    }
}
