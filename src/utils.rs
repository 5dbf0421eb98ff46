//! Shared string utilities (UTF-8 safe truncation, size estimation).

/// Find the largest valid UTF-8 boundary at or before the given byte index.
#[inline]
fn safe_byte_boundary(s: &str, max_bytes: usize) -> usize {
    if max_bytes >= s.len() {
        return s.len();
    }
    s.char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= max_bytes)
        .last()
        .unwrap_or(0)
}

/// Truncate a string with a marker if it exceeds the maximum byte length.
/// Truncation respects UTF-8 character boundaries.
#[inline]
pub fn truncate_with_marker(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let boundary = safe_byte_boundary(s, max_len);
        format!("{}...[truncated]", &s[..boundary])
    }
}

/// Truncate a string to maximum byte length, returning a borrowed slice.
#[inline]
pub fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        s
    } else {
        &s[..safe_byte_boundary(s, max_len)]
    }
}

/// First line of a message, truncated. Used when embedding error output
/// into prompts and audit records.
pub fn head_line(s: &str, max_len: usize) -> String {
    truncate_with_marker(s.lines().next().unwrap_or(s), max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_ascii() {
        assert_eq!(truncate_with_marker("hello", 10), "hello");
        assert_eq!(truncate_with_marker("hello world", 5), "hello...[truncated]");
    }

    #[test]
    fn truncate_multibyte_boundary() {
        let s = "héllo wörld";
        let t = truncate_with_marker(s, 2);
        assert!(t.starts_with('h'));
        // Must not panic on a non-boundary index.
        let _ = truncate_str(s, 2);
    }

    #[test]
    fn head_line_takes_first() {
        assert_eq!(head_line("first\nsecond", 32), "first");
    }
}
