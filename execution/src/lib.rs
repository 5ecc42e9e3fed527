//! Fishhunt room engine.
//!
//! This crate holds the per-room actor and the economic machinery it drives: the combat
//! [`math`] model, the per-tier [`inventory`] ledger, the [`rtp`] controller that steers
//! payouts toward a target ratio, the [`wallet`] shim that keeps room balances and the
//! durable ledger in agreement, and the [`session`] log that keeps finished game records.
//!
//! ## Consistency rules
//! - A bullet exists only after its cost was debited. A failed or timed-out debit leaves the
//!   room and the inventory untouched.
//! - A fish dies at most once, and its reward is credited at most once.
//! - Inventory totals never decrease.
//! - Operations on one room never interleave; the room awaits its wallet call before reading
//!   the next message.
//!
//! ## Driving a room (example)
//! ```rust,ignore
//! use fishhunt_execution::room::{Actor, Config, FireRequest, PlayerSeed};
//!
//! let (actor, mailbox) = Actor::new(engine, Config::new("room_novice_1", tier, tier_config), events);
//! actor.start();
//! let joined = mailbox.join(PlayerSeed { player_id: 1, wallet_id: 1, name: "ada".into() })?.await?;
//! let fired = mailbox
//!     .fire_bullet(1, FireRequest { angle: -1.57, power: 10, origin: None })?
//!     .await?;
//! let hit = mailbox.hit_fish(1, fired.bullet.id, joined.snapshot.fish[0].id)?.await?;
//! ```

pub mod inventory;
pub mod math;
pub mod room;
pub mod rtp;
pub mod session;
pub mod spawner;
pub mod wallet;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

pub use inventory::{InventoryLedger, InventoryRepository, MemoryInventoryRepository};
pub use math::{HitOutcome, MathModel, ModelConfig};
pub use room::{Engine, Mailbox, RoomEvent};
pub use rtp::{RtpConfig, RtpController};
pub use session::{MemorySessionRepository, SessionLog, SessionRepository};
pub use wallet::{MemoryWallet, Transfer, Wallet, WalletShim};
