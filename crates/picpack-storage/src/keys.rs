//! Shared key generation for storage backends.
//!
//! Key format: `downloads/event_{event_id}_photos_{unix_millis}.zip`. Key
//! generation is centralized here so all backends stay consistent.

use chrono::Utc;

/// Generate the storage key for an event's photo archive.
///
/// The event id is folded into the key, so characters that are unsafe in
/// object keys are replaced first.
pub fn archive_key(event_id: &str) -> String {
    let safe_id: String = event_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "downloads/event_{}_photos_{}.zip",
        safe_id,
        Utc::now().timestamp_millis()
    )
}
