//! Shared utility functions used across the codebase.

/// Parse an environment variable, returning `default` if unset.
///
/// Set-but-invalid values are reported as `Err` with the offending text so the
/// caller can wrap it in its own error type.
pub fn env_var_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T, String> {
    match std::env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| value),
        Err(_) => Ok(default),
    }
}

/// Sanitize command output to be safe for LLM consumption.
/// Removes binary garbage while preserving valid text.
pub fn sanitize_output(bytes: &[u8]) -> String {
    let non_printable_count = bytes
        .iter()
        .filter(|&&b| b < 0x20 && b != b'\n' && b != b'\r' && b != b'\t')
        .count();

    // More than 10% control bytes is almost certainly binary
    if bytes.len() > 100 && non_printable_count > bytes.len() / 10 {
        return format!(
            "[Binary output detected - {} bytes, {}% non-printable]",
            bytes.len(),
            non_printable_count * 100 / bytes.len()
        );
    }

    let text = String::from_utf8_lossy(bytes);

    text.chars()
        .filter(|&c| c == '\n' || c == '\r' || c == '\t' || (c >= ' ' && c != '\u{FFFD}'))
        .collect()
}

/// Truncate `text` to at most `max_chars` bytes on a char boundary, appending a marker.
pub fn truncate_output(mut text: String, max_chars: usize) -> String {
    if text.len() <= max_chars {
        return text;
    }
    let mut cut = max_chars;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str("\n... [output truncated]");
    text
}

/// Build a truncated context string from turn history.
///
/// Walks `history` from most-recent to oldest, accumulating entries until
/// `max_chars` is reached. The most-recent entry is always included.
pub fn build_history_context(history: &[(String, String)], max_chars: usize) -> String {
    let mut entries: Vec<String> = Vec::new();
    let mut total_chars = 0;
    for (prompt, response) in history.iter().rev() {
        let entry = format!("PROMPT: {}\nRESPONSE: {}\n\n", prompt, response);
        if total_chars + entry.len() > max_chars && !entries.is_empty() {
            break;
        }
        total_chars += entry.len();
        entries.push(entry);
    }
    entries.reverse();
    entries.concat()
}
