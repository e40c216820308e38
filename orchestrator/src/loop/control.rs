//! Control markers a session's final assistant message may carry:
//! `TASK_COMPLETE`, `HAT_COMPLETE`, `HAT_TRANSITION:<role>`,
//! `CHECKLIST:<item>:<status>`. Markers are whitespace-delimited tokens,
//! found anywhere in the text rather than required on their own line.

use store::{ChecklistStatus, Role};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMarker {
    TaskComplete,
    HatComplete,
    HatTransition(Role),
    ChecklistUpdate { item: String, status: ChecklistStatus },
}

pub fn parse_markers(text: &str) -> Vec<ControlMarker> {
    text.split_whitespace().filter_map(parse_token).collect()
}

fn parse_token(token: &str) -> Option<ControlMarker> {
    let token = token.trim_matches(|c: char| !c.is_alphanumeric() && c != ':' && c != '_');
    match token {
        "TASK_COMPLETE" => return Some(ControlMarker::TaskComplete),
        "HAT_COMPLETE" => return Some(ControlMarker::HatComplete),
        _ => {}
    }
    if let Some(role_str) = token.strip_prefix("HAT_TRANSITION:") {
        return role_str.parse::<Role>().ok().map(ControlMarker::HatTransition);
    }
    if let Some(rest) = token.strip_prefix("CHECKLIST:") {
        let (item, status_str) = rest.split_once(':')?;
        let status = match status_str {
            "done" => ChecklistStatus::Done,
            "failed" => ChecklistStatus::Failed,
            "skipped" => ChecklistStatus::Skipped,
            "pending" => ChecklistStatus::Pending,
            _ => return None,
        };
        return Some(ControlMarker::ChecklistUpdate { item: item.to_string(), status });
    }
    None
}
