//! Filename-safe slugs for agent names and project prefixes.

use std::sync::LazyLock;

use regex::Regex;

static NON_SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("slug regex should compile"));

/// Convert a display name into a lowercase, hyphen-separated slug.
///
/// Runs of anything outside `[a-z0-9]` collapse into a single `-`, and
/// leading/trailing hyphens are removed (`"Alice Chen"` becomes `"alice-chen"`).
pub fn sanitize_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    NON_SLUG_RE
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}
