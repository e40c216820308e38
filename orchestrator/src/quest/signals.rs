//! Inline JSON signals a quest turn's assistant text may carry:
//! `OBJECTIVE_DRAFT:{...}`, `QUESTION:{...}`, `QUEST_READY:{...}`. Each
//! signal is a marker word followed by a balanced-brace JSON object
//! somewhere in the text, not necessarily at the start or end of it.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    ObjectiveDraft(Value),
    Question { question: String, options: Option<Vec<String>> },
    QuestReady { drafts: Vec<Value>, summary: String },
}

const MARKERS: &[(&str, fn(Value) -> Option<Signal>)] =
    &[("OBJECTIVE_DRAFT:", parse_objective_draft), ("QUESTION:", parse_question), ("QUEST_READY:", parse_quest_ready)];

/// Scans `text` for every recognized marker and returns the signals found,
/// in the order their marker appears.
pub fn parse_signals(text: &str) -> Vec<Signal> {
    let mut signals = Vec::new();
    for (marker, parse) in MARKERS {
        let mut search_from = 0;
        while let Some(rel) = text[search_from..].find(marker) {
            let start = search_from + rel + marker.len();
            if let Some((json_text, end)) = extract_balanced_object(&text[start..]) {
                if let Some(value) = parse_json_tolerant(&json_text) {
                    if let Some(signal) = parse(value) {
                        signals.push(signal);
                    }
                }
                search_from = start + end;
            } else {
                break;
            }
        }
    }
    signals
}

fn parse_objective_draft(value: Value) -> Option<Signal> {
    Some(Signal::ObjectiveDraft(value))
}

fn parse_question(value: Value) -> Option<Signal> {
    let question = value.get("question")?.as_str()?.to_string();
    let options = value
        .get("options")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect());
    Some(Signal::Question { question, options })
}

fn parse_quest_ready(value: Value) -> Option<Signal> {
    let drafts = value.get("drafts")?.as_array()?.clone();
    let summary = value.get("summary").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    Some(Signal::QuestReady { drafts, summary })
}

/// Finds the first `{`, then scans forward tracking brace depth (ignoring
/// braces inside string literals) until it returns to zero. Returns the
/// slice between the braces and the byte offset just past the closing one.
fn extract_balanced_object(text: &str) -> Option<(String, usize)> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut i = start;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else {
            match c {
                '"' => in_string = true,
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some((text[start..=i].to_string(), i + 1));
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Parses `text` as JSON, retrying once after stripping a common model
/// mistake (a trailing comma before `}`/`]`) if the first attempt fails.
fn parse_json_tolerant(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }
    let cleaned = strip_trailing_commas(text);
    serde_json::from_str(&cleaned).ok()
}

fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == '}' || chars[j] == ']') {
                i += 1;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_objective_draft_embedded_in_prose() {
        let text = r#"Here's a plan. OBJECTIVE_DRAFT:{"title": "Add login", "role": "creator"} Let me know."#;
        let signals = parse_signals(text);
        assert_eq!(signals.len(), 1);
        assert!(matches!(&signals[0], Signal::ObjectiveDraft(v) if v["title"] == "Add login"));
    }

    #[test]
    fn parses_question_with_options() {
        let text = r#"QUESTION:{"question": "which db?", "options": ["sqlite", "postgres"]}"#;
        let signals = parse_signals(text);
        match &signals[0] {
            Signal::Question { question, options } => {
                assert_eq!(question, "which db?");
                assert_eq!(options.as_ref().unwrap(), &vec!["sqlite".to_string(), "postgres".to_string()]);
            }
            _ => panic!("expected a question signal"),
        }
    }

    #[test]
    fn parses_quest_ready_with_multiple_drafts() {
        let text = r#"QUEST_READY:{"drafts": [{"title": "a"}, {"title": "b"}], "summary": "done"}"#;
        let signals = parse_signals(text);
        match &signals[0] {
            Signal::QuestReady { drafts, summary } => {
                assert_eq!(drafts.len(), 2);
                assert_eq!(summary, "done");
            }
            _ => panic!("expected a quest-ready signal"),
        }
    }

    #[test]
    fn tolerates_a_trailing_comma() {
        let text = r#"OBJECTIVE_DRAFT:{"title": "x", "role": "creator",}"#;
        let signals = parse_signals(text);
        assert_eq!(signals.len(), 1);
    }

    #[test]
    fn braces_nested_inside_string_values_do_not_confuse_the_scanner() {
        let text = r#"OBJECTIVE_DRAFT:{"title": "use {curly} in the name"}"#;
        let signals = parse_signals(text);
        assert_eq!(signals.len(), 1);
        assert!(matches!(&signals[0], Signal::ObjectiveDraft(v) if v["title"] == "use {curly} in the name"));
    }

    #[test]
    fn plain_text_with_no_marker_yields_no_signals() {
        assert!(parse_signals("just a normal reply").is_empty());
    }
}
