use std::sync::LazyLock;

use regex::Regex;

/// Five or six ASCII digits standing alone as a word.
static CODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([0-9]{5,6})\b").expect("code pattern is valid"));

/// Every candidate code in `text`, in order of appearance.
pub fn extract_codes(text: &str) -> Vec<&str> {
    CODE_PATTERN
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect()
}
