//! Field lookup in markdown coordination documents.
//!
//! Documents are written by agents from a template, so fields look like:
//!
//! ```text
//! ## Status
//! <!-- One of: AVAILABLE, ASSIGNED, WORKING -->
//! WORKING
//! ```
//!
//! A field's value is the first non-empty line after its heading, skipping
//! HTML comments. Unfilled template values such as `{status}` count as absent.

/// Values that mean "nothing assigned" in assignment fields.
const NULL_WORDS: [&str; 4] = ["none", "unassigned", "n/a", "-"];

/// Find the value of `field` in `document`.
///
/// Only the first heading whose text matches `field` (case-insensitive) is
/// considered. Returns `None` when the heading is missing, when the next
/// content line is another heading, or when the value is a placeholder.
pub fn lookup_field(document: &str, field: &str) -> Option<String> {
    let mut lines = document.lines();
    lines.find(|line| heading_text(line).is_some_and(|text| text.eq_ignore_ascii_case(field)))?;

    let mut in_comment = false;
    for line in lines {
        let mut rest = line.trim();
        if in_comment {
            match rest.find("-->") {
                Some(end) => {
                    in_comment = false;
                    rest = rest[end + 3..].trim();
                }
                None => continue,
            }
        }
        while let Some(after_open) = rest.strip_prefix("<!--") {
            match after_open.find("-->") {
                Some(end) => rest = after_open[end + 3..].trim(),
                None => {
                    in_comment = true;
                    rest = "";
                }
            }
        }
        if rest.is_empty() {
            continue;
        }
        if heading_text(rest).is_some() {
            return None;
        }
        if is_placeholder(rest) {
            return None;
        }
        return Some(rest.to_string());
    }
    None
}

/// Look up an assignment-style field, mapping null words (`none`, `-`, ...) to `None`.
pub fn lookup_assignment(document: &str, field: &str) -> Option<String> {
    lookup_field(document, field).filter(|value| {
        !NULL_WORDS
            .iter()
            .any(|word| value.eq_ignore_ascii_case(word))
    })
}

/// True when `value` is an unfilled template placeholder like `{status}`.
pub fn is_placeholder(value: &str) -> bool {
    let value = value.trim();
    value.len() >= 2 && value.starts_with('{') && value.ends_with('}')
}

fn heading_text(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if !trimmed.starts_with('#') {
        return None;
    }
    Some(trimmed.trim_matches('#').trim())
}
