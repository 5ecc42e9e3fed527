//! JSON messages exchanged with game clients.
//!
//! Every frame is an object tagged by `type`. Requests may carry a `requestId` which is echoed
//! on the matching response; broadcasts never carry one.

use serde::{Deserialize, Serialize};

use crate::entities::{
    Bullet, BulletId, Cannon, Fish, FishId, HitResult, Player, PlayerId, Position, RoomId,
    RoomSnapshot, RoomSummary, SessionRecord,
};
use crate::tier::Tier;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Join a specific room, or the first open room of a tier.
    JoinRoom {
        request_id: Option<String>,
        room_id: Option<RoomId>,
        tier: Option<Tier>,
    },
    LeaveRoom {
        request_id: Option<String>,
    },
    FireBullet {
        request_id: Option<String>,
        angle: f64,
        power: u32,
        origin: Option<Position>,
    },
    HitFish {
        request_id: Option<String>,
        bullet_id: BulletId,
        fish_id: FishId,
    },
    SwitchCannon {
        request_id: Option<String>,
        cannon_type: Option<u32>,
        level: u32,
    },
    Heartbeat {
        request_id: Option<String>,
    },
    GetRoomList {
        request_id: Option<String>,
        tier: Option<Tier>,
    },
    GetPlayerInfo {
        request_id: Option<String>,
    },
}

impl ClientMessage {
    pub fn request_id(&self) -> Option<&str> {
        match self {
            ClientMessage::JoinRoom { request_id, .. }
            | ClientMessage::LeaveRoom { request_id }
            | ClientMessage::FireBullet { request_id, .. }
            | ClientMessage::HitFish { request_id, .. }
            | ClientMessage::SwitchCannon { request_id, .. }
            | ClientMessage::Heartbeat { request_id }
            | ClientMessage::GetRoomList { request_id, .. }
            | ClientMessage::GetPlayerInfo { request_id } => request_id.as_deref(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::JoinRoom { .. } => "join_room",
            ClientMessage::LeaveRoom { .. } => "leave_room",
            ClientMessage::FireBullet { .. } => "fire_bullet",
            ClientMessage::HitFish { .. } => "hit_fish",
            ClientMessage::SwitchCannon { .. } => "switch_cannon",
            ClientMessage::Heartbeat { .. } => "heartbeat",
            ClientMessage::GetRoomList { .. } => "get_room_list",
            ClientMessage::GetPlayerInfo { .. } => "get_player_info",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Welcome {
        client_id: String,
        player_id: PlayerId,
        server_time: u64,
    },
    RoomJoined {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        room_id: RoomId,
        tier: Tier,
        seat: usize,
        balance: i64,
        player_count: usize,
        snapshot: RoomSnapshot,
    },
    RoomLeft {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        room_id: RoomId,
        session: SessionRecord,
    },
    BulletAccepted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        bullet: Bullet,
        balance: i64,
    },
    HitResolved {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        result: HitResult,
    },
    CannonSwitched {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        player_id: PlayerId,
        cannon: Cannon,
    },
    Heartbeat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        server_time: u64,
    },
    RoomList {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        rooms: Vec<RoomSummary>,
    },
    PlayerInfo {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        player_id: PlayerId,
        room_id: Option<RoomId>,
        player: Option<Player>,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        code: String,
        message: String,
    },
    PlayerJoined {
        room_id: RoomId,
        player: Player,
        player_count: usize,
    },
    PlayerLeft {
        room_id: RoomId,
        player_id: PlayerId,
        player_count: usize,
    },
    BulletFired {
        room_id: RoomId,
        bullet: Bullet,
    },
    FishSpawned {
        room_id: RoomId,
        fish: Vec<Fish>,
    },
    FishHit {
        room_id: RoomId,
        result: HitResult,
    },
    FishKilled {
        room_id: RoomId,
        result: HitResult,
    },
    RoomState {
        room_id: RoomId,
        snapshot: RoomSnapshot,
    },
    RoomClosed {
        room_id: RoomId,
        reason: String,
    },
}

impl ServerMessage {
    pub fn error(request_id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            request_id,
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_fire_bullet() {
        let message: ClientMessage = serde_json::from_value(json!({
            "type": "fire_bullet",
            "requestId": "r1",
            "angle": 1.25,
            "power": 30,
            "origin": {"x": 600.0, "y": 780.0}
        }))
        .unwrap();
        assert_eq!(message.request_id(), Some("r1"));
        assert_eq!(message.kind(), "fire_bullet");
        match message {
            ClientMessage::FireBullet { power, origin, .. } => {
                assert_eq!(power, 30);
                assert_eq!(origin, Some(Position::new(600.0, 780.0)));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_optional_fields_default_to_none() {
        let message: ClientMessage =
            serde_json::from_str(r#"{"type":"join_room","tier":"vip"}"#).unwrap();
        assert_eq!(
            message,
            ClientMessage::JoinRoom {
                request_id: None,
                room_id: None,
                tier: Some(Tier::Vip),
            }
        );
        let message: ClientMessage =
            serde_json::from_str(r#"{"type":"hit_fish","bulletId":4,"fishId":9}"#).unwrap();
        assert!(matches!(
            message,
            ClientMessage::HitFish { bullet_id: 4, fish_id: 9, request_id: None }
        ));
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"teleport"}"#).is_err());
    }

    #[test]
    fn test_error_response_shape() {
        let value = serde_json::to_value(ServerMessage::error(
            Some("r9".into()),
            "ROOM_FULL",
            "room is full (4 players)",
        ))
        .unwrap();
        assert_eq!(
            value,
            json!({"type": "error", "requestId": "r9", "code": "ROOM_FULL", "message": "room is full (4 players)"})
        );
    }

    #[test]
    fn test_broadcast_omits_request_id() {
        let value = serde_json::to_value(ServerMessage::PlayerLeft {
            room_id: "room_novice_1_1".into(),
            player_id: 3,
            player_count: 0,
        })
        .unwrap();
        assert_eq!(value["type"], "player_left");
        assert_eq!(value["playerCount"], 0);
        assert!(value.get("requestId").is_none());
    }
}
