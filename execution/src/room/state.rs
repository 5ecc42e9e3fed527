//! Synchronous room state. The actor performs wallet and ledger I/O around these transitions.

use fishhunt_types::{
    now_millis, Bullet, BulletId, BulletStatus, Cannon, ConnectionStatus, Fish, FishId,
    FishStatus, GameError, Player, PlayerId, Position, RoomId, RoomSnapshot, RoomStatus,
    RoomSummary, SessionRecord, Tier, TierConfig, WalletId, BULLET_SPEED, MAX_BULLET_POWER,
    MAX_CANNON_LEVEL,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use tokio::time::Instant;

use super::{Config, FireRequest, PlayerSeed, RoomStats};
use crate::spawner::{Spawner, SPAWN_MARGIN};

/// Bullets older than this expire.
pub const BULLET_LIFETIME_SECS: f64 = 5.0;
/// Bullets further than this outside the field expire.
pub const BULLET_MARGIN: f64 = 100.0;
/// Distance at which a flying bullet strikes a fish.
pub const COLLISION_RADIUS: f64 = 50.0;
/// Share of `max_fish_count` refilled at once when the room runs low.
const REFILL_SHARE: f64 = 0.75;

pub struct Seat {
    pub player: Player,
    pub session: SessionRecord,
}

/// A debit-ready shot. Nothing in the room changes until it is committed.
pub struct Shot {
    pub bullet_id: BulletId,
    pub wallet_id: WalletId,
    pub cost: i64,
    pub power: u32,
    pub origin: Position,
    pub angle: f64,
}

/// A validated bullet/fish pair.
pub struct Target {
    pub shooter: PlayerId,
    pub power: u32,
    pub fish_health: u32,
    pub fish_value: i64,
}

pub struct RoomState {
    pub room_id: RoomId,
    pub tier: Tier,
    pub tier_config: TierConfig,
    pub status: RoomStatus,
    pub players: BTreeMap<PlayerId, Seat>,
    seats: Vec<Option<PlayerId>>,
    pub fish: BTreeMap<FishId, Fish>,
    pub bullets: BTreeMap<BulletId, Bullet>,
    next_bullet_id: BulletId,
    pub spawner: Spawner,
    pub rng: ChaCha8Rng,
    pub stats: RoomStats,
    /// When the room last became empty.
    pub empty_since: Option<Instant>,
    pub last_snapshot: Instant,
}

impl RoomState {
    pub fn new(config: &Config, spawner: Spawner) -> Self {
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let now = Instant::now();
        Self {
            room_id: config.room_id.clone(),
            tier: config.tier,
            tier_config: config.tier_config.clone(),
            status: RoomStatus::Waiting,
            players: BTreeMap::new(),
            seats: vec![None; config.tier_config.max_players],
            fish: BTreeMap::new(),
            bullets: BTreeMap::new(),
            next_bullet_id: 0,
            spawner,
            rng,
            stats: RoomStats::default(),
            empty_since: Some(now),
            last_snapshot: now,
        }
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn player(&self, player_id: PlayerId) -> Result<&Player, GameError> {
        self.players
            .get(&player_id)
            .map(|seat| &seat.player)
            .ok_or(GameError::PlayerNotInRoom(player_id))
    }

    pub fn check_join(&self, player_id: PlayerId) -> Result<(), GameError> {
        if !self.status.accepts_players() {
            return Err(GameError::RoomNotActive(self.status));
        }
        if self.players.contains_key(&player_id) {
            return Err(GameError::AlreadyInRoom(player_id));
        }
        if self.players.len() >= self.tier_config.max_players {
            return Err(GameError::RoomFull(self.tier_config.max_players));
        }
        Ok(())
    }

    /// Seat a player in the first free seat, activating the room once enough are present.
    pub fn seat(
        &mut self,
        seed: PlayerSeed,
        balance: i64,
        min_players_to_start: usize,
    ) -> Result<Player, GameError> {
        self.check_join(seed.player_id)?;
        let seat = self
            .seats
            .iter()
            .position(Option::is_none)
            .ok_or(GameError::RoomFull(self.tier_config.max_players))?;
        self.seats[seat] = Some(seed.player_id);
        let player = Player {
            id: seed.player_id,
            wallet_id: seed.wallet_id,
            name: seed.name,
            balance,
            status: ConnectionStatus::Connected,
            seat,
            cannon: Cannon::default(),
        };
        let session = SessionRecord::new(player.id, self.room_id.clone(), now_millis());
        self.players.insert(
            player.id,
            Seat {
                player: player.clone(),
                session,
            },
        );
        self.empty_since = None;
        if self.status == RoomStatus::Waiting && self.players.len() >= min_players_to_start {
            self.status = RoomStatus::Active;
        }
        Ok(player)
    }

    /// Remove a player and their flying bullets, returning the finished session.
    pub fn unseat(&mut self, player_id: PlayerId) -> Result<SessionRecord, GameError> {
        let Seat { player, mut session } = self
            .players
            .remove(&player_id)
            .ok_or(GameError::PlayerNotInRoom(player_id))?;
        if let Some(slot) = self.seats.get_mut(player.seat) {
            *slot = None;
        }
        self.bullets.retain(|_, bullet| bullet.player_id != player_id);
        session.finish(now_millis());
        if self.players.is_empty() {
            self.empty_since = Some(Instant::now());
            if self.status == RoomStatus::Active {
                self.status = RoomStatus::Waiting;
            }
        }
        Ok(session)
    }

    pub fn switch_cannon(
        &mut self,
        player_id: PlayerId,
        kind: Option<u32>,
        level: u32,
    ) -> Result<Cannon, GameError> {
        if !(1..=MAX_CANNON_LEVEL).contains(&level) {
            return Err(GameError::InvalidCannonLevel(level));
        }
        let seat = self
            .players
            .get_mut(&player_id)
            .ok_or(GameError::PlayerNotInRoom(player_id))?;
        let kind = kind.unwrap_or(seat.player.cannon.kind);
        seat.player.cannon = Cannon::new(kind, level);
        Ok(seat.player.cannon)
    }

    /// Validate a shot and reserve its bullet id.
    ///
    /// The id is consumed even if the debit later fails so wallet references stay unique.
    pub fn prepare_shot(
        &mut self,
        player_id: PlayerId,
        request: &FireRequest,
    ) -> Result<Shot, GameError> {
        let player = self.player(player_id)?;
        if self.status != RoomStatus::Active {
            return Err(GameError::RoomNotActive(self.status));
        }
        if !(1..=MAX_BULLET_POWER).contains(&request.power) {
            return Err(GameError::InvalidPower(request.power));
        }
        let cost = self.tier_config.bullet_cost(request.power);
        if cost > self.tier_config.max_bet {
            return Err(GameError::BetTooLarge {
                cost,
                max_bet: self.tier_config.max_bet,
            });
        }
        if player.balance < cost {
            return Err(GameError::InsufficientBalance {
                required: cost,
                available: player.balance,
            });
        }
        let wallet_id = player.wallet_id;
        let origin = request
            .origin
            .unwrap_or_else(|| self.seat_origin(player.seat));
        self.next_bullet_id += 1;
        Ok(Shot {
            bullet_id: self.next_bullet_id,
            wallet_id,
            cost,
            power: request.power,
            origin,
            angle: request.angle,
        })
    }

    /// Create the bullet for a debited shot. Returns the bullet and the new cached balance.
    pub fn commit_shot(
        &mut self,
        player_id: PlayerId,
        shot: Shot,
    ) -> Result<(Bullet, i64), GameError> {
        let seat = self
            .players
            .get_mut(&player_id)
            .ok_or(GameError::PlayerNotInRoom(player_id))?;
        seat.player.balance -= shot.cost;
        seat.session.record_bullet(shot.cost);
        let balance = seat.player.balance;
        let bullet = Bullet {
            id: shot.bullet_id,
            player_id,
            power: shot.power,
            cost: shot.cost,
            position: shot.origin,
            heading: shot.angle,
            speed: BULLET_SPEED,
            status: BulletStatus::Flying,
            age: 0.0,
        };
        self.bullets.insert(bullet.id, bullet.clone());
        self.stats.bullets_fired += 1;
        self.stats.total_wagered = self.stats.total_wagered.saturating_add(shot.cost);
        Ok((bullet, balance))
    }

    /// Check that a bullet can strike a fish. `reporter` must own the bullet when present.
    pub fn target(
        &self,
        reporter: Option<PlayerId>,
        bullet_id: BulletId,
        fish_id: FishId,
    ) -> Result<Target, GameError> {
        if let Some(player_id) = reporter {
            self.player(player_id)?;
        }
        let bullet = self
            .bullets
            .get(&bullet_id)
            .filter(|bullet| bullet.is_flying())
            .ok_or(GameError::BulletNotFound(bullet_id))?;
        if let Some(player_id) = reporter {
            if bullet.player_id != player_id {
                return Err(GameError::BulletNotOwned {
                    bullet: bullet_id,
                    player: player_id,
                });
            }
        }
        let fish = self
            .fish
            .get(&fish_id)
            .filter(|fish| fish.is_active())
            .ok_or(GameError::FishNotFound(fish_id))?;
        Ok(Target {
            shooter: bullet.player_id,
            power: bullet.power,
            fish_health: fish.health,
            fish_value: fish.value,
        })
    }

    /// A bullet that struck a fish is spent and leaves the room.
    pub fn consume_bullet(&mut self, bullet_id: BulletId) {
        self.bullets.remove(&bullet_id);
    }

    /// Apply damage to a fish. Returns whether it died and its remaining health.
    pub fn damage_fish(&mut self, fish_id: FishId, damage: u32) -> Result<(bool, u32), GameError> {
        let fish = self
            .fish
            .get_mut(&fish_id)
            .ok_or(GameError::FishNotFound(fish_id))?;
        let killed = fish.apply_damage(damage);
        if killed {
            fish.status = FishStatus::Dead;
        }
        Ok((killed, fish.health))
    }

    pub fn remove_dead(&mut self, fish_id: FishId) {
        if self
            .fish
            .get(&fish_id)
            .is_some_and(|fish| fish.status == FishStatus::Dead)
        {
            self.fish.remove(&fish_id);
        }
    }

    pub fn balance_of(&self, player_id: PlayerId) -> i64 {
        self.players
            .get(&player_id)
            .map(|seat| seat.player.balance)
            .unwrap_or_default()
    }

    /// Credit a paid reward to the shooter's cached balance and session.
    pub fn pay(&mut self, player_id: PlayerId, reward: i64, critical: bool) -> i64 {
        self.stats.total_paid = self.stats.total_paid.saturating_add(reward);
        match self.players.get_mut(&player_id) {
            Some(seat) => {
                seat.player.balance = seat.player.balance.saturating_add(reward);
                seat.session.record_catch(reward, critical);
                seat.player.balance
            }
            None => 0,
        }
    }

    /// Move everything by one time step and drop what left the field or expired.
    pub fn advance(&mut self, dt: f64) {
        let (width, height) = (self.tier_config.room_width, self.tier_config.room_height);
        for fish in self.fish.values_mut() {
            fish.position.advance(fish.heading, fish.speed, dt);
        }
        self.fish
            .retain(|_, fish| !fish.position.outside(width, height, SPAWN_MARGIN));

        for bullet in self.bullets.values_mut() {
            bullet.position.advance(bullet.heading, bullet.speed, dt);
            bullet.age += dt;
            if bullet.age >= BULLET_LIFETIME_SECS
                || bullet.position.outside(width, height, BULLET_MARGIN)
            {
                bullet.status = BulletStatus::Expired;
            }
        }
        self.bullets.retain(|_, bullet| bullet.is_flying());
    }

    /// Pairs of flying bullets and the first live fish each one is touching.
    pub fn collisions(&self) -> Vec<(BulletId, FishId)> {
        let radius = COLLISION_RADIUS * COLLISION_RADIUS;
        self.bullets
            .values()
            .filter(|bullet| bullet.is_flying())
            .filter_map(|bullet| {
                self.fish
                    .values()
                    .find(|fish| {
                        fish.is_active() && fish.position.distance_squared(&bullet.position) <= radius
                    })
                    .map(|fish| (bullet.id, fish.id))
            })
            .collect()
    }

    /// Top the field up toward the tier's fish count.
    pub fn replenish(&mut self, dt: f64) -> Vec<Fish> {
        let (width, height) = (self.tier_config.room_width, self.tier_config.room_height);
        let alive = self.fish.len();
        let spawned = if alive < self.tier_config.min_fish_count {
            let target = (self.tier_config.max_fish_count as f64 * REFILL_SHARE) as usize;
            let count = target.saturating_sub(alive);
            self.spawner.spawn_batch(&mut self.rng, count, width, height)
        } else if alive < self.tier_config.max_fish_count
            && self
                .spawner
                .should_spawn(&mut self.rng, self.tier_config.fish_spawn_rate, dt)
        {
            self.spawner
                .spawn(&mut self.rng, width, height)
                .into_iter()
                .collect()
        } else {
            Vec::new()
        };
        self.insert_fish(&spawned);
        spawned
    }

    pub fn spawn_initial(&mut self, count: usize) -> Vec<Fish> {
        let (width, height) = (self.tier_config.room_width, self.tier_config.room_height);
        let spawned = self.spawner.spawn_batch(&mut self.rng, count, width, height);
        self.insert_fish(&spawned);
        spawned
    }

    fn insert_fish(&mut self, spawned: &[Fish]) {
        for fish in spawned {
            self.fish.insert(fish.id, fish.clone());
        }
    }

    fn seat_origin(&self, seat: usize) -> Position {
        let slots = self.seats.len().max(1) as f64;
        let x = self.tier_config.room_width * (seat as f64 + 0.5) / slots;
        Position::new(x, self.tier_config.room_height)
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.room_id.clone(),
            tier: self.tier,
            status: self.status,
            width: self.tier_config.room_width,
            height: self.tier_config.room_height,
            players: self.players.values().map(|seat| seat.player.clone()).collect(),
            fish: self.fish.values().cloned().collect(),
            bullets: self.bullets.values().cloned().collect(),
            server_time: now_millis(),
        }
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            room_id: self.room_id.clone(),
            tier: self.tier,
            status: self.status,
            player_count: self.players.len(),
            max_players: self.tier_config.max_players,
            min_bet: self.tier_config.min_bet,
            max_bet: self.tier_config.max_bet,
        }
    }
}
