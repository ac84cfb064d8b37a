//! Utility functions for the pairing chat service

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Longest topic key, in bytes, before clipping
pub const TOPIC_MAX_BYTES: usize = 60;

/// Rendered length of a daily pseudonym
const PSEUDONYM_LEN: usize = 8;

/// Generate a new unique batch correlation id
pub fn generate_batch_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Clip a topic to at most [`TOPIC_MAX_BYTES`] on a character boundary,
/// appending an ellipsis when anything was cut. The clipped form is the
/// invitation lookup key.
pub fn clip_topic(topic: &str) -> String {
    let topic = topic.trim();
    if topic.len() <= TOPIC_MAX_BYTES {
        return topic.to_string();
    }
    let mut end = TOPIC_MAX_BYTES;
    while !topic.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &topic[..end])
}

/// Day index used to rotate pseudonyms. The offset shifts the rollover
/// away from UTC midnight to the service's local small hours.
pub fn day_seed(now: DateTime<Utc>, tz_offset_secs: i64) -> i64 {
    (now.timestamp() + tz_offset_secs) / 86_400
}

/// Short, stable-within-a-day pseudonym for lobby broadcasts.
///
/// A pure function of (secret, identity, day); it carries no information
/// about the user beyond what the secret protects.
pub fn daily_pseudonym(secret: &str, user: i64, seed: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(user.to_le_bytes());
    hasher.update(seed.to_le_bytes());
    let digest = hasher.finalize();
    let mut encoded = URL_SAFE_NO_PAD.encode(&digest[..6]);
    encoded.truncate(PSEUDONYM_LEN);
    encoded
}
