//! Lazy quest title generation: a pure text heuristic run once, against
//! the first user message, the first time a quest needs a title.

const FALLBACK_TITLE: &str = "Untitled Quest";
const MAX_TITLE_LEN: usize = 100;

/// First sentence, else first line, else first 100 chars at a word
/// boundary, else the fallback. Never calls the model.
pub fn derive_title(first_user_message: &str) -> String {
    let text = first_user_message.trim();
    if text.is_empty() {
        return FALLBACK_TITLE.to_string();
    }

    if let Some(sentence) = first_sentence(text) {
        return sentence;
    }

    if let Some((line, _)) = text.split_once('\n') {
        let line = line.trim();
        if !line.is_empty() {
            return truncate_at_word_boundary(line);
        }
    }

    truncate_at_word_boundary(text)
}

/// Finds the first `.`/`!`/`?` that ends a sentence rather than an
/// abbreviation (`Mr.`, `e.g.`) or a decimal (`3.14`).
fn first_sentence(text: &str) -> Option<String> {
    let chars: Vec<char> = text.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c != '.' && c != '!' && c != '?' {
            continue;
        }
        if c == '.' && is_decimal_point(&chars, i) {
            continue;
        }
        if c == '.' && is_abbreviation(&chars, i) {
            continue;
        }
        let candidate: String = chars[..=i].iter().collect();
        let trimmed = candidate.trim();
        if !trimmed.is_empty() {
            return Some(truncate_at_word_boundary(trimmed));
        }
    }
    None
}

fn is_decimal_point(chars: &[char], i: usize) -> bool {
    let before_digit = i > 0 && chars[i - 1].is_ascii_digit();
    let after_digit = i + 1 < chars.len() && chars[i + 1].is_ascii_digit();
    before_digit && after_digit
}

/// A short (<=3 letters) all-consonant-or-mixed token right before the dot
/// with no preceding whitespace is treated as an abbreviation, e.g. `Mr.`,
/// `e.g.`, `vs.`.
fn is_abbreviation(chars: &[char], dot_index: usize) -> bool {
    let mut start = dot_index;
    while start > 0 && (chars[start - 1].is_alphabetic() || chars[start - 1] == '.') {
        start -= 1;
    }
    let token: String = chars[start..dot_index].iter().collect();
    let word_len = token.split('.').next_back().unwrap_or("").len();
    !token.is_empty() && word_len <= 3 && token.chars().next().map(|c| c.is_uppercase()).unwrap_or(false)
}

fn truncate_at_word_boundary(text: &str) -> String {
    if text.chars().count() <= MAX_TITLE_LEN {
        return text.to_string();
    }
    let truncated: String = text.chars().take(MAX_TITLE_LEN).collect();
    match truncated.rfind(' ') {
        Some(idx) if idx > 0 => truncated[..idx].to_string(),
        _ => truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_the_first_sentence() {
        assert_eq!(derive_title("Add a login page. It should support OAuth."), "Add a login page.");
    }

    #[test]
    fn does_not_split_on_an_abbreviation() {
        let title = derive_title("Ask Dr. Smith about the schema before we start.");
        assert_eq!(title, "Ask Dr. Smith about the schema before we start.");
    }

    #[test]
    fn does_not_split_on_a_decimal() {
        let title = derive_title("Bump the dependency to version 3.14 and verify the build passes");
        assert_eq!(title, "Bump the dependency to version 3.14 and verify the build passes");
    }

    #[test]
    fn falls_back_to_first_line_when_there_is_no_terminator() {
        let title = derive_title("fix the thing\nit's been broken for a while");
        assert_eq!(title, "fix the thing");
    }

    #[test]
    fn falls_back_to_a_word_boundary_truncation() {
        let long = "word ".repeat(40);
        let title = derive_title(long.trim());
        assert!(title.chars().count() <= MAX_TITLE_LEN);
        assert!(!title.ends_with("wor"));
    }

    #[test]
    fn empty_input_falls_back_to_the_default_title() {
        assert_eq!(derive_title("   "), FALLBACK_TITLE);
    }
}
