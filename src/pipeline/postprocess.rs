//! Post-processing: deterministic cleanup of model replies before JSON parsing.
//!
//! Even when told to "output only JSON", chat models regularly wrap the object
//! in ` ```json ` fences, prepend a sentence ("Here is your quiz:"), or leak a
//! byte-order mark. None of that changes the data, so it is stripped here
//! rather than counted as a schema violation. Content inside the object is
//! never touched.
//!
//! Rules (applied in order):
//! 1. Strip invisible Unicode (BOM, zero-width spaces, word joiner)
//! 2. Strip an outer Markdown code fence
//! 3. Cut away prose before the first `{` and after its matching `}`

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to a raw reply.
pub fn clean_json_payload(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = strip_code_fences(&s);
    extract_object(&s).unwrap_or(s).trim().to_string()
}

// ── Rule 1: Strip invisible Unicode ──────────────────────────────────────────

const INVISIBLE: [char; 5] = ['\u{FEFF}', '\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}'];

fn remove_invisible_chars(input: &str) -> String {
    input.chars().filter(|c| !INVISIBLE.contains(c)).collect()
}

// ── Rule 2: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    if let Some(caps) = RE_OUTER_FENCES.captures(trimmed) {
        caps[1].to_string()
    } else {
        trimmed.to_string()
    }
}

// ── Rule 3: Isolate the outermost JSON object ───────────────────────────────

/// Return the first balanced `{…}` span, honouring string literals.
/// `None` when there is no opening brace or it never closes.
fn extract_object(input: &str) -> Option<String> {
    let start = input.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in input[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + c.len_utf8();
                    return Some(input[start..end].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_object_is_unchanged() {
        let s = r#"{"items": []}"#;
        assert_eq!(clean_json_payload(s), s);
    }

    #[test]
    fn strips_json_fence() {
        let s = "```json\n{\"items\": []}\n```";
        assert_eq!(clean_json_payload(s), r#"{"items": []}"#);
    }

    #[test]
    fn strips_bare_fence_with_crlf() {
        let s = "```\r\n{\"a\": 1}\r\n```\r\n";
        assert_eq!(clean_json_payload(s), r#"{"a": 1}"#);
    }

    #[test]
    fn drops_surrounding_prose() {
        let s = "Here is your quiz:\n{\"items\": [{\"q\": \"x\"}]}\nGood luck!";
        assert_eq!(clean_json_payload(s), r#"{"items": [{"q": "x"}]}"#);
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_matching() {
        let s = r#"{"question": "What does } mean in \"{x}\"?"} trailing"#;
        assert_eq!(
            clean_json_payload(s),
            r#"{"question": "What does } mean in \"{x}\"?"}"#
        );
    }

    #[test]
    fn removes_bom_and_zero_width() {
        let s = "\u{FEFF}{\"a\":\u{200B} 1}";
        assert_eq!(clean_json_payload(s), r#"{"a": 1}"#);
    }

    #[test]
    fn unbalanced_input_is_returned_trimmed() {
        assert_eq!(clean_json_payload("  {\"a\": 1 "), "{\"a\": 1");
        assert_eq!(clean_json_payload(" no json here "), "no json here");
    }

    #[test]
    fn non_ascii_content_survives() {
        let s = "{\"question\": \"Qu'est-ce que le cœur ?\"}";
        assert_eq!(clean_json_payload(s), s);
    }
}
