//! Keyword matching over message text.

/// Split a comma-separated keyword list; entries are trimmed and empties dropped.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Keywords (original spelling, configuration order) contained in `text`, ignoring case.
pub fn matching_keywords(keywords: &[String], text: &str) -> Vec<String> {
    let haystack = text.to_lowercase();
    keywords
        .iter()
        .filter(|kw| !kw.is_empty() && haystack.contains(&kw.to_lowercase()))
        .cloned()
        .collect()
}
