//! Small helpers shared across the storage layer.

/// Truncates a string to at most `max_chars` characters.
///
/// UTF-8 safe: counts characters rather than bytes, so multi-byte input never
/// panics on a boundary.
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.len() <= max_chars {
        // Byte length already within budget implies char count is too.
        return s.to_string();
    }
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_strings_pass_through() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("", 4), "");
    }

    #[test]
    fn long_strings_are_cut_on_char_boundaries() {
        assert_eq!(truncate_str("hello world", 5), "hello");
        assert_eq!(truncate_str("日記日記日記", 2), "日記");
    }
}
