//! Shared types for the fishhunt room engine: entities, tiers, the per-tier
//! inventory record, the client protocol and the error taxonomy.

pub mod entities;
pub mod error;
pub mod inventory;
pub mod protocol;
pub mod tier;

pub use entities::{
    now_millis, Bullet, BulletId, BulletStatus, Cannon, ConnectionStatus, Fish, FishId,
    FishSpecies, FishStatus, HitResult, Player, PlayerId, Position, RoomId, RoomSnapshot,
    RoomStatus, RoomSummary, SessionRecord, SizeClass, WalletId, BULLET_SPEED,
    MAX_BULLET_POWER, MAX_CANNON_LEVEL,
};
pub use error::{ErrorKind, GameError, WalletOperation};
pub use inventory::Inventory;
pub use protocol::{ClientMessage, ServerMessage};
pub use tier::{Tier, TierCatalog, TierConfig, TierConfigError};
