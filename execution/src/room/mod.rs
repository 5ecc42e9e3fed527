//! Per-room actor.
//!
//! A room owns its players, fish and bullets outright. Every operation arrives as a mailbox
//! message and is handled to completion, wallet round trip included, before the next message
//! or tick is read. Broadcasts leave the room as [`RoomEvent`]s on a bounded channel that the
//! connection layer fans out.

use fishhunt_types::{
    Bullet, FishSpecies, Player, PlayerId, Position, RoomId, RoomSnapshot, ServerMessage,
    SessionRecord, Tier, TierConfig, WalletId,
};
use std::sync::Arc;
use std::time::Duration;

use crate::inventory::{InventoryLedger, InventoryRepository};
use crate::math::{MathModel, ModelConfig};
use crate::rtp::{RtpConfig, RtpController};
use crate::session::SessionLog;
use crate::spawner::default_species;
use crate::wallet::{Wallet, WalletShim};

mod actor;
pub use actor::Actor;
mod ingress;
pub use ingress::{Mailbox, Message, Pending};
mod state;

#[cfg(test)]
mod tests;

/// Services shared by every room of a process.
pub struct Engine<W: Wallet, R: InventoryRepository> {
    pub wallet: WalletShim<W>,
    pub ledger: Arc<InventoryLedger<R>>,
    pub rtp: RtpController<R>,
    pub model: MathModel,
    pub species: Arc<Vec<FishSpecies>>,
    /// Receives every session that ends in a room.
    pub sessions: SessionLog,
}

impl<W: Wallet, R: InventoryRepository> Clone for Engine<W, R> {
    fn clone(&self) -> Self {
        Self {
            wallet: self.wallet.clone(),
            ledger: self.ledger.clone(),
            rtp: self.rtp.clone(),
            model: self.model,
            species: self.species.clone(),
            sessions: self.sessions.clone(),
        }
    }
}

impl<W: Wallet, R: InventoryRepository> Engine<W, R> {
    pub fn new(
        wallet: WalletShim<W>,
        ledger: Arc<InventoryLedger<R>>,
        rtp: RtpConfig,
        model: ModelConfig,
    ) -> Self {
        Self {
            wallet,
            rtp: RtpController::new(ledger.clone(), rtp),
            ledger,
            model: MathModel::new(model),
            species: Arc::new(default_species()),
            sessions: SessionLog::disabled(),
        }
    }

    pub fn with_species(mut self, species: Vec<FishSpecies>) -> Self {
        self.species = Arc::new(species);
        self
    }

    pub fn with_sessions(mut self, sessions: SessionLog) -> Self {
        self.sessions = sessions;
        self
    }
}

/// Configuration for a room.
#[derive(Clone, Debug)]
pub struct Config {
    pub room_id: RoomId,

    pub tier: Tier,

    /// Bet limits, capacity, spawn bounds and target RTP.
    pub tier_config: TierConfig,

    /// Number of requests to hold before new ones are rejected with a capacity error.
    pub mailbox_size: usize,

    /// Period of the game loop. Movement uses this period as a fixed time step.
    pub tick_interval: Duration,

    /// How often a full `room_state` snapshot is broadcast while players are seated.
    pub snapshot_interval: Duration,

    /// Ephemeral rooms close after sitting empty this long. Bootstrap rooms use `None`.
    pub idle_timeout: Option<Duration>,

    /// Players required before a waiting room becomes active.
    pub min_players_to_start: usize,

    /// Lowest wallet balance accepted at join (the tier's `min_bet` applies if higher).
    pub min_join_balance: i64,

    /// Fish spawned when the room starts.
    pub initial_fish: usize,

    /// Resolve bullets that reach a fish during the tick, without waiting for a client report.
    pub server_collisions: bool,

    /// Seed for the room's random source. `None` seeds from the operating system.
    pub seed: Option<u64>,
}

impl Config {
    pub fn new(room_id: impl Into<RoomId>, tier: Tier, tier_config: TierConfig) -> Self {
        Self {
            room_id: room_id.into(),
            tier,
            tier_config,
            mailbox_size: 256,
            tick_interval: Duration::from_millis(100),
            snapshot_interval: Duration::from_secs(1),
            idle_timeout: None,
            min_players_to_start: 1,
            min_join_balance: 100,
            initial_fish: 5,
            server_collisions: true,
            seed: None,
        }
    }
}

/// Identity of a player asking for a seat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerSeed {
    pub player_id: PlayerId,
    pub wallet_id: WalletId,
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FireRequest {
    /// Heading in radians.
    pub angle: f64,
    pub power: u32,
    /// Muzzle position; defaults to the player's seat on the bottom edge.
    pub origin: Option<Position>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct JoinOutcome {
    pub player: Player,
    pub player_count: usize,
    pub snapshot: RoomSnapshot,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Fired {
    pub bullet: Bullet,
    /// Cached balance after the debit.
    pub balance: i64,
}

/// Who a broadcast is addressed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Audience {
    All,
    AllExcept(PlayerId),
    Only(PlayerId),
}

impl Audience {
    pub fn includes(&self, player_id: PlayerId) -> bool {
        match self {
            Audience::All => true,
            Audience::AllExcept(excluded) => *excluded != player_id,
            Audience::Only(target) => *target == player_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RoomEvent {
    pub room_id: RoomId,
    pub audience: Audience,
    pub message: ServerMessage,
}

/// Running totals for one room.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoomStats {
    pub ticks: u64,
    pub bullets_fired: u64,
    pub total_wagered: i64,
    pub hits: u64,
    pub critical_hits: u64,
    pub fish_killed: u64,
    pub kills_denied: u64,
    pub total_paid: i64,
}

/// Final account of a room, returned when it closes.
#[derive(Clone, Debug, PartialEq)]
pub struct RoomReport {
    pub room_id: RoomId,
    pub tier: Tier,
    pub reason: String,
    pub stats: RoomStats,
    /// Sessions of players still seated at close.
    pub sessions: Vec<SessionRecord>,
}
