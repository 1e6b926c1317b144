//! Archive entry-name sanitization.
//!
//! Queue messages carry user-supplied filenames. Before a name is used as a
//! zip entry it is reduced to its base name (stripping `../` style path
//! components) and restricted to a safe character set.

use std::path::Path;

/// Sanitize a filename for use as an archive entry name.
///
/// Strips path components, then replaces every character outside
/// `[A-Za-z0-9._-]` with `_`. Empty or degenerate names fall back to
/// `fallback`.
pub fn sanitize_entry_name(file_name: &str, fallback: &str) -> String {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .unwrap_or(fallback);

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    // A name that sanitized down to nothing but separators is useless.
    if cleaned.chars().all(|c| c == '.' || c == '_') {
        fallback.to_string()
    } else {
        cleaned
    }
}
