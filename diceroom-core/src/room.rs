//! Room identifiers

use crate::error::RoomNameError;

/// Room joined when none is given
pub const DEFAULT_ROOM: &str = "main";

/// Room id from a URL-style fragment (`#tavern` or `tavern`)
pub fn room_from_fragment(fragment: &str) -> String {
    let room = fragment.trim().trim_start_matches('#');
    if room.is_empty() {
        DEFAULT_ROOM.to_string()
    } else {
        room.to_string()
    }
}

/// Lowercase, with everything outside `[a-z0-9-]` turned into `-`
pub fn slugify(name: &str) -> Result<String, RoomNameError> {
    let slug: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '-' => c,
            _ => '-',
        })
        .collect();

    if slug.is_empty() {
        return Err(RoomNameError::Empty);
    }
    Ok(slug)
}

/// 32-bit string hash (`h * 31 + unit` over UTF-16), absolute value in hex,
/// at most 8 digits
pub fn short_hash(input: &str) -> String {
    let hash = input
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_shl(5).wrapping_sub(h).wrapping_add(i32::from(unit)));
    let hex = format!("{:x}", hash.unsigned_abs());
    hex.chars().take(8).collect()
}

/// Fresh room id for a user-supplied name, e.g. `friday-game-1a2b3c4d`
pub fn create_room_id(name: &str, timestamp_millis: i64) -> Result<String, RoomNameError> {
    let slug = slugify(name)?;
    let hash = short_hash(&format!("{}{}", slug, timestamp_millis));
    Ok(format!("{}-{}", slug, hash))
}
