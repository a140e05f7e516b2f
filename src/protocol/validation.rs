use super::ids::{ROOM_CODE_ALPHABET, ROOM_CODE_LEN};

pub const MAX_NICKNAME_LEN: usize = 24;

/// Validate a nickname: trimmed, non-empty, bounded, alphanumeric plus
/// space, dash, and underscore.
pub fn validate_nickname(nickname: &str) -> Result<(), String> {
    if nickname.is_empty() {
        return Err("Nickname is required".to_string());
    }
    if nickname.trim() != nickname {
        return Err("Nickname must not start or end with whitespace".to_string());
    }
    if nickname.chars().count() > MAX_NICKNAME_LEN {
        return Err(format!(
            "Nickname must be at most {MAX_NICKNAME_LEN} characters"
        ));
    }
    if !nickname
        .chars()
        .all(|c| c.is_alphanumeric() || c == ' ' || c == '-' || c == '_')
    {
        return Err("Nickname contains invalid characters".to_string());
    }
    Ok(())
}

/// Validate a room code shape before lookup: exactly six characters from
/// the room-code alphabet.
pub fn validate_room_code(code: &str) -> Result<(), String> {
    if code.len() != ROOM_CODE_LEN || !code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b)) {
        return Err("Room code must be 6 characters".to_string());
    }
    Ok(())
}
