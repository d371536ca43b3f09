use lazy_regex::{regex_find, regex_replace_all};

/// Cleans leading, trailing, and redundant whitespace from a string, in-place.
///
/// Any run of whitespace (newlines included) becomes a single space.
pub fn clean_text(s: &mut String) {
    let trimmed = s.trim();
    // Skip the copy/realloc if nothing to do.
    if trimmed.len() != s.len() || regex_find!(r"\s{2,}|[\t\n\r]", trimmed).is_some() {
        let new = regex_replace_all!(r"\s+", trimmed, " ");
        *s = new.to_string();
    }
}

/// Truncates `s` to at most `max_chars` characters, replacing the tail with `...` when anything
/// was cut.
pub fn truncate_with_ellipsis(s: &mut String, max_chars: usize) {
    if s.chars().count() <= max_chars {
        return;
    }
    let keep = max_chars.saturating_sub(3);
    let cut = s.char_indices().nth(keep).map_or(s.len(), |(idx, _)| idx);
    s.truncate(cut);
    s.push_str("...");
}
