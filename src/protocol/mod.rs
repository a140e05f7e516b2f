// Protocol module: wire envelope, message payloads, error codes, and
// identifier generation.

pub mod error_codes;
pub mod ids;
pub mod messages;
pub mod validation;

pub use error_codes::ErrorCode;
pub use messages::{ClientMessage, DecodeError, Envelope, ServerMessage};

/// Player identifier: a 12-character lowercase base32 token issued at
/// connection upgrade. See [`ids::generate_player_id`].
pub type PlayerId = String;

#[cfg(test)]
mod tests {
    use super::messages::*;
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn envelope_round_trips() {
        let envelope = Envelope {
            kind: "ready".to_string(),
            payload: json!({ "ready": true }),
        };
        let encoded = envelope.encode().unwrap();
        let decoded = Envelope::parse(&encoded).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn envelope_without_payload_omits_field() {
        let envelope = Envelope {
            kind: "start_game".to_string(),
            payload: serde_json::Value::Null,
        };
        assert_eq!(envelope.encode().unwrap(), r#"{"type":"start_game"}"#);
    }

    #[test]
    fn malformed_frame_is_invalid_message() {
        let err = Envelope::parse("{not json").unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::InvalidMessage);
    }

    #[test]
    fn unknown_type_is_surfaced() {
        let envelope = Envelope::parse(r#"{"type":"warp_drive"}"#).unwrap();
        let err = ClientMessage::decode(envelope).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::UnknownMessage);
    }

    #[test]
    fn bad_payload_is_invalid_payload() {
        let envelope = Envelope::parse(r#"{"type":"ready","payload":{"ready":"yes"}}"#).unwrap();
        let err = ClientMessage::decode(envelope).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::InvalidPayload);
    }

    #[test]
    fn client_messages_decode() {
        let envelope = Envelope::parse(
            r#"{"type":"join_room","payload":{"room_code":"ABCDEF","nickname":"Ana"}}"#,
        )
        .unwrap();
        match ClientMessage::decode(envelope).unwrap() {
            ClientMessage::JoinRoom(p) => {
                assert_eq!(p.room_code, "ABCDEF");
                assert_eq!(p.nickname, "Ana");
                assert!(p.password.is_empty());
            }
            other => panic!("unexpected decode: {other:?}"),
        }

        let envelope = Envelope::parse(r#"{"type":"night_action","payload":{}}"#).unwrap();
        match ClientMessage::decode(envelope).unwrap() {
            ClientMessage::NightAction(p) => assert!(p.target_id.is_empty()),
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn server_message_envelope_shape() {
        let msg = ServerMessage::Connected(ConnectedPayload {
            player_id: "abcdefgh2345".to_string(),
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "connected");
        assert_eq!(json["payload"]["player_id"], "abcdefgh2345");

        let msg = ServerMessage::GameStarting;
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, json!({ "type": "game_starting" }));

        let msg = ServerMessage::error(ErrorCode::NotHost, "Only host can start the game");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["payload"]["code"], "not_host");
    }

    #[test]
    fn server_messages_round_trip_through_json() {
        let messages = vec![
            ServerMessage::TimerTick(TimerTickPayload { remaining: 42 }),
            ServerMessage::PlayerLeft(PlayerLeftPayload {
                player_id: "p1".to_string(),
                new_host: Some("p2".to_string()),
            }),
            ServerMessage::NightResult(Box::new(NightResultPayload {
                killed: None,
                killed_nickname: None,
                was_saved: true,
                investigation: None,
            })),
        ];
        for msg in messages {
            let encoded = serde_json::to_string(&msg).unwrap();
            let decoded: ServerMessage = serde_json::from_str(&encoded).unwrap();
            assert_eq!(decoded, msg);
        }
    }

    proptest! {
        #[test]
        fn envelope_round_trip_law(
            kind in "[a-z_]{1,24}",
            key in "[a-z]{1,8}",
            value in any::<i64>(),
        ) {
            let envelope = Envelope { kind, payload: json!({ key: value }) };
            let encoded = envelope.encode().unwrap();
            let decoded = Envelope::parse(&encoded).unwrap();
            prop_assert_eq!(decoded, envelope);
        }
    }
}
