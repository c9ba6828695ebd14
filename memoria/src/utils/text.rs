//! Text cleanup for oracle output.

use regex::Regex;
use std::sync::OnceLock;

static WHITESPACE_RUNS: OnceLock<Regex> = OnceLock::new();

/// Collapse whitespace runs (spaces, tabs, newlines) to single spaces and trim.
///
/// Entity names and fact strings pass through here before use, so exact-name
/// matching and one-line fact rendering never trip over stray formatting.
/// Whitespace-only input comes back empty.
pub fn normalize_whitespace(s: &str) -> String {
    let re = WHITESPACE_RUNS.get_or_init(|| Regex::new(r"\s+").expect("static regex is valid"));
    re.replace_all(s.trim(), " ").into_owned()
}

/// Normalize a relation label to SCREAMING_SNAKE_CASE.
///
/// Handles the forms extraction responses actually produce: `"works at"`,
/// `"works-at"`, `"WorksAt"` and `"WORKS_AT"` all become `"WORKS_AT"`.
/// Returns an empty string when the input has no alphanumeric content,
/// which callers treat as a malformed label.
pub fn normalize_label(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    let mut prev: Option<char> = None;

    for c in s.trim().chars() {
        if c.is_ascii_alphanumeric() {
            if c.is_ascii_uppercase() {
                if let Some(p) = prev {
                    if p.is_ascii_lowercase() || p.is_ascii_digit() {
                        out.push('_');
                    }
                }
            }
            out.push(c.to_ascii_uppercase());
            prev = Some(c);
        } else {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            prev = None;
        }
    }

    out.trim_end_matches('_').to_string()
}

/// Best-effort recovery of a JSON payload from prose-wrapped oracle text.
///
/// Checks a ` ```json ` fence first, then a bare ` ``` ` fence, then the
/// outermost `{…}` or `[…]` span. Returns `None` when nothing JSON-shaped
/// is present.
pub fn extract_json_from_response(s: &str) -> Option<&str> {
    fenced_payload(s, "```json")
        .or_else(|| fenced_payload(s, "```"))
        .or_else(|| outermost_span(s, '{', '}'))
        .or_else(|| outermost_span(s, '[', ']'))
}

/// Content of the first code block opened by `fence`, trimmed.
///
/// The remainder of the opening fence line is ignored; an unclosed or empty
/// block yields `None`.
fn fenced_payload<'a>(s: &'a str, fence: &str) -> Option<&'a str> {
    let after_open = s.split_once(fence)?.1;
    let body = after_open.split_once('\n')?.1;
    let inner = body.split_once("```")?.0.trim();
    (!inner.is_empty()).then_some(inner)
}

/// Slice from the first `open` to the last `close`, when they nest sensibly.
fn outermost_span(s: &str, open: char, close: char) -> Option<&str> {
    let start = s.find(open)?;
    let end = s.rfind(close)?;
    (end > start).then(|| &s[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- normalize_whitespace ---

    #[test]
    fn test_collapses_runs_and_trims() {
        assert_eq!(normalize_whitespace("  Acme   Corp  "), "Acme Corp");
        assert_eq!(normalize_whitespace("line\none\n\nline two"), "line one line two");
        assert_eq!(normalize_whitespace("tab\there"), "tab here");
    }

    #[test]
    fn test_whitespace_only_becomes_empty() {
        assert_eq!(normalize_whitespace(""), "");
        assert_eq!(normalize_whitespace(" \t\n "), "");
    }

    #[test]
    fn test_unicode_whitespace_collapses() {
        // U+00A0 no-break space counts as whitespace for \s.
        assert_eq!(normalize_whitespace("Acme\u{00A0}Corp"), "Acme Corp");
    }

    // --- normalize_label ---

    #[test]
    fn test_normalize_label_spaces() {
        assert_eq!(normalize_label("works at"), "WORKS_AT");
    }

    #[test]
    fn test_normalize_label_hyphen() {
        assert_eq!(normalize_label("works-at"), "WORKS_AT");
    }

    #[test]
    fn test_normalize_label_camel_case() {
        assert_eq!(normalize_label("worksAt"), "WORKS_AT");
        assert_eq!(normalize_label("WorksAt"), "WORKS_AT");
    }

    #[test]
    fn test_normalize_label_already_normalized() {
        assert_eq!(normalize_label("WORKS_AT"), "WORKS_AT");
        assert_eq!(normalize_label("HAS_ROLE"), "HAS_ROLE");
    }

    #[test]
    fn test_normalize_label_surrounding_noise() {
        assert_eq!(normalize_label("  works at  "), "WORKS_AT");
        assert_eq!(normalize_label("works at!"), "WORKS_AT");
    }

    #[test]
    fn test_normalize_label_digits() {
        assert_eq!(normalize_label("version 2 of"), "VERSION_2_OF");
    }

    #[test]
    fn test_normalize_label_no_content() {
        assert_eq!(normalize_label(""), "");
        assert_eq!(normalize_label("!!!"), "");
        assert_eq!(normalize_label("   "), "");
    }

    // --- extract_json_from_response ---

    #[test]
    fn test_json_inside_json_fence() {
        let text = "Sure!\n```json\n{\"edges\": []}\n```\nLet me know.";
        assert_eq!(extract_json_from_response(text), Some("{\"edges\": []}"));
    }

    #[test]
    fn test_json_inside_plain_fence() {
        let text = "```\n[\"Fernando\", \"Acme\"]\n```";
        assert_eq!(
            extract_json_from_response(text),
            Some("[\"Fernando\", \"Acme\"]")
        );
    }

    #[test]
    fn test_bare_object_span() {
        let text = "Extraction result: {\"missedEntities\": []} — nothing else.";
        assert_eq!(
            extract_json_from_response(text),
            Some("{\"missedEntities\": []}")
        );
    }

    #[test]
    fn test_bare_array_span() {
        assert_eq!(
            extract_json_from_response("facts: [\"a\", \"b\"]"),
            Some("[\"a\", \"b\"]")
        );
    }

    #[test]
    fn test_nested_object_keeps_both_braces() {
        let text = r#"{"summary": {"text": "ok"}}"#;
        assert_eq!(extract_json_from_response(text), Some(text));
    }

    #[test]
    fn test_prose_only_is_none() {
        assert_eq!(extract_json_from_response("No structured output here."), None);
        assert_eq!(extract_json_from_response(""), None);
    }

    #[test]
    fn test_empty_fence_is_none() {
        assert_eq!(extract_json_from_response("```json\n\n```"), None);
    }

    #[test]
    fn test_unclosed_fence_falls_back_to_bare_span() {
        let text = "```json\n{\"ok\": true}";
        assert_eq!(extract_json_from_response(text), Some("{\"ok\": true}"));
    }
}
