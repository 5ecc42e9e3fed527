use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::tier::Tier;

pub type PlayerId = u64;
pub type WalletId = u64;
pub type FishId = u64;
pub type BulletId = u64;
pub type RoomId = String;

/// Highest bullet power a cannon can fire.
pub const MAX_BULLET_POWER: u32 = 100;
/// Highest cannon level; power is `level * 10`.
pub const MAX_CANNON_LEVEL: u32 = 10;
/// Bullet travel speed in pixels per second.
pub const BULLET_SPEED: f64 = 500.0;

/// Milliseconds since the unix epoch (0 if the clock is before the epoch).
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Moves `speed * dt` along `heading` (radians, y grows downward).
    pub fn advance(&mut self, heading: f64, speed: f64, dt: f64) {
        self.x += speed * dt * heading.cos();
        self.y += speed * dt * heading.sin();
    }

    pub fn distance_squared(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// True when the point lies further than `margin` outside a `width x height` field.
    pub fn outside(&self, width: f64, height: f64, margin: f64) -> bool {
        self.x < -margin || self.y < -margin || self.x > width + margin || self.y > height + margin
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeClass {
    Small,
    Medium,
    Large,
    Boss,
}

/// Static description of a fish species.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FishSpecies {
    pub id: u32,
    pub name: String,
    pub size: SizeClass,
    pub base_health: u32,
    pub base_value: i64,
    pub base_speed: f64,
    /// 0.0 (common) to 1.0 (never spawns).
    pub rarity: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FishStatus {
    Alive,
    Fleeing,
    Dead,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fish {
    pub id: FishId,
    pub species_id: u32,
    pub position: Position,
    pub heading: f64,
    pub speed: f64,
    pub health: u32,
    pub max_health: u32,
    pub value: i64,
    pub status: FishStatus,
    pub spawned_at: u64,
}

impl Fish {
    pub fn is_active(&self) -> bool {
        matches!(self.status, FishStatus::Alive | FishStatus::Fleeing)
    }

    /// Applies damage without letting health underflow. Returns true once health is exhausted.
    pub fn apply_damage(&mut self, damage: u32) -> bool {
        self.health = self.health.saturating_sub(damage);
        self.health == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulletStatus {
    Flying,
    Hit,
    Expired,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bullet {
    pub id: BulletId,
    pub player_id: PlayerId,
    pub power: u32,
    pub cost: i64,
    pub position: Position,
    pub heading: f64,
    pub speed: f64,
    pub status: BulletStatus,
    /// Seconds in flight.
    pub age: f64,
}

impl Bullet {
    pub fn is_flying(&self) -> bool {
        self.status == BulletStatus::Flying
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cannon {
    #[serde(rename = "type")]
    pub kind: u32,
    pub level: u32,
    pub power: u32,
}

impl Cannon {
    pub fn new(kind: u32, level: u32) -> Self {
        Self {
            kind,
            level,
            power: level * 10,
        }
    }
}

impl Default for Cannon {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

/// A seated player. `balance` is an optimistic cache of the wallet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub wallet_id: WalletId,
    pub name: String,
    pub balance: i64,
    pub status: ConnectionStatus,
    pub seat: usize,
    pub cannon: Cannon,
}

/// Per-visit wager and payout totals for one player.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub player_id: PlayerId,
    pub room_id: RoomId,
    pub bullets_fired: u64,
    pub total_wagered: i64,
    pub fish_caught: u64,
    pub critical_kills: u64,
    pub total_won: i64,
    pub net_profit: i64,
    pub joined_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_at: Option<u64>,
}

impl SessionRecord {
    pub fn new(player_id: PlayerId, room_id: RoomId, joined_at: u64) -> Self {
        Self {
            player_id,
            room_id,
            joined_at,
            ..Self::default()
        }
    }

    pub fn record_bullet(&mut self, cost: i64) {
        self.bullets_fired += 1;
        self.total_wagered = self.total_wagered.saturating_add(cost);
        self.net_profit = self.total_won - self.total_wagered;
    }

    pub fn record_catch(&mut self, reward: i64, critical: bool) {
        self.fish_caught += 1;
        if critical {
            self.critical_kills += 1;
        }
        self.total_won = self.total_won.saturating_add(reward);
        self.net_profit = self.total_won - self.total_wagered;
    }

    pub fn finish(&mut self, left_at: u64) {
        self.left_at = Some(left_at);
        self.net_profit = self.total_won - self.total_wagered;
    }
}

/// Outcome of a resolved bullet/fish collision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HitResult {
    pub bullet_id: BulletId,
    pub fish_id: FishId,
    pub player_id: PlayerId,
    pub damage: u32,
    pub critical: bool,
    pub killed: bool,
    /// True only when a reward was approved and credited.
    pub success: bool,
    pub reward: i64,
    pub multiplier: f64,
    pub remaining_health: u32,
    pub balance: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    Active,
    Closing,
    Destroyed,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Waiting => "waiting",
            RoomStatus::Active => "active",
            RoomStatus::Closing => "closing",
            RoomStatus::Destroyed => "destroyed",
        }
    }

    pub fn accepts_players(&self) -> bool {
        matches!(self, RoomStatus::Waiting | RoomStatus::Active)
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full room view sent on join and periodically while active.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub tier: Tier,
    pub status: RoomStatus,
    pub width: f64,
    pub height: f64,
    pub players: Vec<Player>,
    pub fish: Vec<Fish>,
    pub bullets: Vec<Bullet>,
    pub server_time: u64,
}

/// Room list entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub tier: Tier,
    pub status: RoomStatus,
    pub player_count: usize,
    pub max_players: usize,
    pub min_bet: i64,
    pub max_bet: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fish_damage_saturates_at_zero() {
        let mut fish = Fish {
            id: 1,
            species_id: 1,
            position: Position::default(),
            heading: 0.0,
            speed: 100.0,
            health: 3,
            max_health: 3,
            value: 5,
            status: FishStatus::Alive,
            spawned_at: 0,
        };
        assert!(!fish.apply_damage(2));
        assert_eq!(fish.health, 1);
        assert!(fish.apply_damage(40));
        assert_eq!(fish.health, 0);
    }

    #[test]
    fn test_position_advance_and_bounds() {
        let mut position = Position::new(0.0, 100.0);
        position.advance(0.0, 100.0, 0.5);
        assert!((position.x - 50.0).abs() < 1e-9);
        assert!((position.y - 100.0).abs() < 1e-9);

        assert!(!Position::new(-50.0, 10.0).outside(1200.0, 800.0, 50.0));
        assert!(Position::new(-50.5, 10.0).outside(1200.0, 800.0, 50.0));
        assert!(Position::new(10.0, 901.0).outside(1200.0, 800.0, 100.0));
    }

    #[test]
    fn test_session_net_profit() {
        let mut session = SessionRecord::new(7, "room".to_string(), 1);
        session.record_bullet(10);
        session.record_bullet(10);
        session.record_catch(35, true);
        session.finish(2);
        assert_eq!(session.bullets_fired, 2);
        assert_eq!(session.critical_kills, 1);
        assert_eq!(session.net_profit, 15);
        assert_eq!(session.left_at, Some(2));
    }

    #[test]
    fn test_cannon_power_follows_level() {
        assert_eq!(Cannon::new(2, 7).power, 70);
        assert_eq!(Cannon::default().power, 10);
    }
}
