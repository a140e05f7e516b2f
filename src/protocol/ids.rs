use rand::Rng;

/// Room code alphabet: uppercase letters and digits excluding the
/// confusable set {0, O, I, 1, L}.
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Length of generated room codes.
pub const ROOM_CODE_LEN: usize = 6;

/// Length of generated player id tokens.
pub const PLAYER_ID_LEN: usize = 12;

/// Generate a player id: 12 lowercase base32 characters drawn from
/// 8 random bytes. Issued once per connection at upgrade time.
pub fn generate_player_id() -> String {
    let bytes: [u8; 8] = rand::rng().random();
    let mut token = base32::encode(base32::Alphabet::Rfc4648 { padding: false }, &bytes)
        .to_ascii_lowercase();
    token.truncate(PLAYER_ID_LEN);
    token
}

/// Generate a 6-character room code over the confusable-free alphabet.
pub fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LEN)
        .map(|_| {
            let idx = rng.random_range(0..ROOM_CODE_ALPHABET.len());
            ROOM_CODE_ALPHABET[idx] as char
        })
        .collect()
}
