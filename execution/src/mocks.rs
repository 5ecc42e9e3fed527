//! Fixtures for driving rooms in tests without a server.

use fishhunt_types::{FishSpecies, PlayerId, ServerMessage, SizeClass, Tier, TierConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::inventory::{InventoryLedger, MemoryInventoryRepository};
use crate::math::ModelConfig;
use crate::room::{Actor, Config, Engine, Mailbox, PlayerSeed, RoomEvent, RoomReport};
use crate::rtp::RtpConfig;
use crate::session::{MemorySessionRepository, SessionLog};
use crate::wallet::{MemoryWallet, WalletShim};

pub type MemoryEngine = Engine<MemoryWallet, MemoryInventoryRepository>;

/// Wallet timeout used by [`Harness`].
pub const WALLET_TIMEOUT: Duration = Duration::from_secs(2);

/// An engine over memory backends, with handles to inspect them.
///
/// Must be built inside a tokio runtime: the session writer is spawned on creation.
pub struct Harness {
    pub wallet: MemoryWallet,
    pub repository: MemoryInventoryRepository,
    pub ledger: Arc<InventoryLedger<MemoryInventoryRepository>>,
    pub sessions: MemorySessionRepository,
    pub session_log: SessionLog,
    pub engine: MemoryEngine,
}

impl Harness {
    pub fn new(wallet: MemoryWallet) -> Self {
        Self::with_configs(wallet, RtpConfig::default(), ModelConfig::default())
    }

    pub fn with_configs(wallet: MemoryWallet, rtp: RtpConfig, model: ModelConfig) -> Self {
        let repository = MemoryInventoryRepository::default();
        let ledger = Arc::new(InventoryLedger::new(repository.clone()));
        let sessions = MemorySessionRepository::default();
        let (session_log, _writer) = SessionLog::start(sessions.clone(), 256);
        let engine = Engine::new(
            WalletShim::new(wallet.clone(), WALLET_TIMEOUT),
            ledger.clone(),
            rtp,
            model,
        )
        .with_sessions(session_log.clone());
        Self {
            wallet,
            repository,
            ledger,
            sessions,
            session_log,
            engine,
        }
    }

    pub fn with_species(mut self, species: Vec<FishSpecies>) -> Self {
        self.engine = self.engine.with_species(species);
        self
    }

    /// Start a room and return its mailbox, its event stream and its task.
    pub fn room(&self, config: Config) -> (Mailbox, Events, JoinHandle<RoomReport>) {
        let (sender, receiver) = mpsc::channel(1_024);
        let (actor, mailbox) = Actor::new(self.engine.clone(), config, sender);
        (mailbox, Events { receiver }, actor.start())
    }
}

/// Deterministic room config with server-side collisions off, so only reported hits resolve.
pub fn room_config(tier: Tier) -> Config {
    let mut config = Config::new(format!("room_{tier}_test"), tier, TierConfig::for_tier(tier));
    config.seed = Some(7);
    config.server_collisions = false;
    config
}

pub fn player(player_id: PlayerId) -> PlayerSeed {
    PlayerSeed {
        player_id,
        wallet_id: player_id,
        name: format!("player-{player_id}"),
    }
}

/// A single species that every hit kills.
pub fn fragile_species() -> Vec<FishSpecies> {
    vec![FishSpecies {
        id: 1,
        name: "paper fish".to_string(),
        size: SizeClass::Small,
        base_health: 1,
        base_value: 10,
        base_speed: 20.0,
        rarity: 0.0,
    }]
}

/// A single species no bullet can kill.
pub fn armored_species() -> Vec<FishSpecies> {
    vec![FishSpecies {
        id: 2,
        name: "iron fish".to_string(),
        size: SizeClass::Boss,
        base_health: 1_000_000,
        base_value: 10,
        base_speed: 20.0,
        rarity: 0.0,
    }]
}

/// Events broadcast by a room.
pub struct Events {
    receiver: mpsc::Receiver<RoomEvent>,
}

impl Events {
    pub fn drain(&mut self) -> Vec<RoomEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait for the first event matching `predicate`, skipping the rest.
    pub async fn wait_for(
        &mut self,
        predicate: impl Fn(&ServerMessage) -> bool,
    ) -> Option<RoomEvent> {
        while let Some(event) = self.receiver.recv().await {
            if predicate(&event.message) {
                return Some(event);
            }
        }
        None
    }
}
