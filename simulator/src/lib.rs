//! Offline simulations of the fishhunt economy.
//!
//! [`run_room`] seats bots in a real room actor backed by the in-memory wallet and inventory
//! store, fires a fixed number of shots at live fish and reports how the payout ratio settled
//! against the tier target. [`run_math`] skips the room entirely and resolves repeated hits of
//! one bullet against one fish, which is useful when tuning the math model.

use fishhunt_execution::room::{Actor, Config as RoomConfig, FireRequest, PlayerSeed};
use fishhunt_execution::{
    Engine, InventoryLedger, MathModel, MemoryInventoryRepository, MemoryWallet, ModelConfig,
    RtpConfig, WalletShim,
};
use fishhunt_types::{FishId, GameError, Tier, TierConfig, MAX_BULLET_POWER};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::f64::consts::FRAC_PI_2;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Opening balance of every simulated wallet. Large enough that no run goes broke.
const SIM_BALANCE: i64 = 1_000_000_000_000;

const WALLET_TIMEOUT: Duration = Duration::from_secs(2);

const EVENT_BUFFER: usize = 1_024;

/// Consecutive empty snapshots tolerated before the run gives up.
const MAX_IDLE_TICKS: u32 = 10_000;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("shots must be > 0")]
    NoShots,
    #[error("players must be between 1 and {max} (got {got})")]
    Players { got: usize, max: usize },
    #[error("power must be between 1 and 100 (got {0})")]
    Power(u32),
    #[error("a power {power} bullet costs {cost}, above the {tier} max bet of {max_bet}")]
    BetTooLarge {
        tier: Tier,
        power: u32,
        cost: i64,
        max_bet: i64,
    },
    #[error("fish health must be > 0")]
    NoHealth,
    #[error("no fish appeared for {0} ticks")]
    Starved(u32),
    #[error(transparent)]
    Game(#[from] GameError),
}

#[derive(Clone, Debug)]
pub struct RoomSimConfig {
    pub tier: Tier,
    pub tier_config: TierConfig,
    pub shots: u64,
    pub power: u32,
    pub players: usize,
    pub seed: u64,
    /// When false every kill pays, which shows the raw return of the math model.
    pub controller: bool,
    pub rtp: RtpConfig,
    pub model: ModelConfig,
    pub tick_interval: Duration,
}

impl RoomSimConfig {
    pub fn new(tier: Tier) -> Self {
        Self {
            tier,
            tier_config: TierConfig::for_tier(tier),
            shots: 10_000,
            power: 10,
            players: 1,
            seed: 1,
            controller: true,
            rtp: RtpConfig::default(),
            model: ModelConfig::default(),
            tick_interval: Duration::from_millis(5),
        }
    }

    fn check(&self) -> Result<(), SimError> {
        if self.shots == 0 {
            return Err(SimError::NoShots);
        }
        let max = self.tier_config.max_players;
        if self.players == 0 || self.players > max {
            return Err(SimError::Players {
                got: self.players,
                max,
            });
        }
        if !(1..=MAX_BULLET_POWER).contains(&self.power) {
            return Err(SimError::Power(self.power));
        }
        let cost = self.tier_config.bullet_cost(self.power);
        if cost > self.tier_config.max_bet {
            return Err(SimError::BetTooLarge {
                tier: self.tier,
                power: self.power,
                cost,
                max_bet: self.tier_config.max_bet,
            });
        }
        Ok(())
    }

    /// Controller settings for the run. Disabling the controller pins it in cold start.
    pub fn effective_rtp(&self) -> RtpConfig {
        let mut rtp = self.rtp;
        if !self.controller {
            rtp.cold_start_threshold = i64::MAX;
        }
        rtp
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RoomSimReport {
    pub tier: Tier,
    pub players: usize,
    pub power: u32,
    pub controller: bool,
    pub shots: u64,
    pub hits: u64,
    pub misses: u64,
    pub critical_hits: u64,
    pub kills: u64,
    pub kills_denied: u64,
    pub total_wagered: i64,
    pub total_paid: i64,
    pub rtp: f64,
    pub target_rtp: f64,
    /// RTP recorded by the inventory ledger, which should agree with `rtp`.
    pub ledger_rtp: f64,
    pub kill_rate: f64,
    pub critical_rate: f64,
    pub average_reward_per_kill: f64,
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Fire `config.shots` bullets through a live room, each reported as a hit on a random fish.
pub async fn run_room(config: RoomSimConfig) -> Result<RoomSimReport, SimError> {
    config.check()?;
    let ledger = Arc::new(InventoryLedger::new(MemoryInventoryRepository::default()));
    let engine = Engine::new(
        WalletShim::new(MemoryWallet::new(SIM_BALANCE), WALLET_TIMEOUT),
        ledger.clone(),
        config.effective_rtp(),
        config.model,
    );

    let mut room = RoomConfig::new(
        format!("sim_{}", config.tier),
        config.tier,
        config.tier_config.clone(),
    );
    room.tick_interval = config.tick_interval;
    room.seed = Some(config.seed);
    room.server_collisions = false;
    room.initial_fish = config.tier_config.min_fish_count;
    let (events, mut broadcasts) = mpsc::channel(EVENT_BUFFER);
    let (actor, mailbox) = Actor::new(engine, room, events);
    let room_task = actor.start();
    let drain = tokio::spawn(async move { while broadcasts.recv().await.is_some() {} });

    for player_id in 1..=config.players as u64 {
        mailbox
            .join(PlayerSeed {
                player_id,
                wallet_id: player_id,
                name: format!("bot-{player_id}"),
            })?
            .await?;
    }
    info!(
        tier = %config.tier,
        shots = config.shots,
        power = config.power,
        players = config.players,
        controller = config.controller,
        "simulation started"
    );

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut shooter = 1;
    let mut fired = 0;
    let mut misses = 0;
    let mut idle = 0;
    while fired < config.shots {
        let snapshot = mailbox.snapshot()?.await?;
        let targets: Vec<FishId> = snapshot
            .fish
            .iter()
            .filter(|fish| fish.is_active())
            .map(|fish| fish.id)
            .collect();
        let Some(&fish_id) = targets.choose(&mut rng) else {
            idle += 1;
            if idle >= MAX_IDLE_TICKS {
                return Err(SimError::Starved(idle));
            }
            tokio::time::sleep(config.tick_interval).await;
            continue;
        };
        idle = 0;

        let shot = mailbox
            .fire_bullet(
                shooter,
                FireRequest {
                    angle: -FRAC_PI_2,
                    power: config.power,
                    origin: None,
                },
            )?
            .await?;
        fired += 1;
        match mailbox.hit_fish(shooter, shot.bullet.id, fish_id)?.await {
            Ok(_) => {}
            // The fish swam off between the snapshot and the hit.
            Err(GameError::FishNotFound(_)) => misses += 1,
            Err(err) => return Err(err.into()),
        }
        shooter = shooter % config.players as u64 + 1;
        if fired % 1_000 == 0 {
            debug!(fired, "simulation progress");
        }
    }

    let report = mailbox.close("simulation finished").await?;
    let _ = room_task.await;
    let _ = drain.await;
    let inventory = ledger.get_inventory(config.tier).await;

    let stats = report.stats;
    let result = RoomSimReport {
        tier: config.tier,
        players: config.players,
        power: config.power,
        controller: config.controller,
        shots: stats.bullets_fired,
        hits: stats.hits,
        misses,
        critical_hits: stats.critical_hits,
        kills: stats.fish_killed,
        kills_denied: stats.kills_denied,
        total_wagered: stats.total_wagered,
        total_paid: stats.total_paid,
        rtp: ratio(stats.total_paid as f64, stats.total_wagered as f64),
        target_rtp: config.tier_config.target_rtp,
        ledger_rtp: inventory.current_rtp,
        kill_rate: ratio(stats.fish_killed as f64, stats.hits as f64),
        critical_rate: ratio(stats.critical_hits as f64, stats.hits as f64),
        average_reward_per_kill: ratio(
            stats.total_paid as f64,
            (stats.fish_killed - stats.kills_denied) as f64,
        ),
    };
    info!(
        tier = %result.tier,
        rtp = result.rtp,
        target_rtp = result.target_rtp,
        kills = result.kills,
        "simulation finished"
    );
    Ok(result)
}

impl fmt::Display for RoomSimReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Room Simulation ({}) ---", self.tier)?;
        writeln!(
            f,
            "Players: {}  Power: {}  Controller: {}",
            self.players,
            self.power,
            if self.controller { "on" } else { "off" }
        )?;
        writeln!(f, "Shots:             {}", self.shots)?;
        writeln!(f, "Hits:              {} ({} missed)", self.hits, self.misses)?;
        writeln!(
            f,
            "Kill Rate:         {:.2}% ({} / {})",
            self.kill_rate * 100.0,
            self.kills,
            self.hits
        )?;
        writeln!(f, "Kills Denied:      {}", self.kills_denied)?;
        writeln!(
            f,
            "Critical Hit Rate: {:.2}% ({} / {})",
            self.critical_rate * 100.0,
            self.critical_hits,
            self.hits
        )?;
        writeln!(f, "Total Wagered:     {}", self.total_wagered)?;
        writeln!(f, "Total Paid:        {}", self.total_paid)?;
        writeln!(f, "Average Reward (per paid kill): {:.2}", self.average_reward_per_kill)?;
        writeln!(
            f,
            "RTP:               {:.2}% (target {:.2}%, ledger {:.2}%)",
            self.rtp * 100.0,
            self.target_rtp * 100.0,
            self.ledger_rtp * 100.0
        )
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MathSimConfig {
    pub power: u32,
    pub health: u32,
    pub value: i64,
    pub simulations: u64,
    pub seed: u64,
    pub model: ModelConfig,
}

impl Default for MathSimConfig {
    fn default() -> Self {
        Self {
            power: 10,
            health: 100,
            value: 50,
            simulations: 1_000,
            seed: 1,
            model: ModelConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MathSimReport {
    pub simulations: u64,
    pub power: u32,
    pub health: u32,
    pub value: i64,
    pub model: ModelConfig,
    pub kills: u64,
    pub critical_hits: u64,
    pub total_damage: u64,
    pub total_reward: i64,
    pub kill_rate: f64,
    pub critical_rate: f64,
    pub average_damage: f64,
    pub average_reward_per_kill: f64,
}

/// Resolve one bullet against a fresh fish `simulations` times. No controller is involved, so
/// every lethal hit counts its full potential reward.
pub fn run_math(config: MathSimConfig) -> Result<MathSimReport, SimError> {
    if config.simulations == 0 {
        return Err(SimError::NoShots);
    }
    if !(1..=MAX_BULLET_POWER).contains(&config.power) {
        return Err(SimError::Power(config.power));
    }
    if config.health == 0 {
        return Err(SimError::NoHealth);
    }

    let model = MathModel::new(config.model);
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut kills = 0u64;
    let mut critical_hits = 0u64;
    let mut total_damage = 0u64;
    let mut total_reward = 0i64;
    for _ in 0..config.simulations {
        let outcome = model.resolve(&mut rng, config.power, config.health, config.value);
        total_damage += u64::from(outcome.damage);
        if outcome.critical {
            critical_hits += 1;
        }
        if outcome.lethal {
            kills += 1;
            total_reward = total_reward.saturating_add(outcome.potential_reward);
        }
    }

    let simulations = config.simulations as f64;
    Ok(MathSimReport {
        simulations: config.simulations,
        power: config.power,
        health: config.health,
        value: config.value,
        model: config.model,
        kills,
        critical_hits,
        total_damage,
        total_reward,
        kill_rate: kills as f64 / simulations,
        critical_rate: critical_hits as f64 / simulations,
        average_damage: total_damage as f64 / simulations,
        average_reward_per_kill: ratio(total_reward as f64, kills as f64),
    })
}

impl fmt::Display for MathSimReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Math Model Simulation ---")?;
        writeln!(f, "Simulations: {}", self.simulations)?;
        writeln!(f, "Bullet Power: {}", self.power)?;
        writeln!(f, "Fish (Health: {}, Value: {})", self.health, self.value)?;
        writeln!(
            f,
            "Model (CritRate: {:.2}%, CritMultiplier: {:.2}x, MaxPayout: {:.0}x)",
            self.model.critical_rate * 100.0,
            self.model.critical_multiplier,
            self.model.max_payout_multiplier
        )?;
        writeln!(
            f,
            "Kill Rate:         {:.2}% ({} / {})",
            self.kill_rate * 100.0,
            self.kills,
            self.simulations
        )?;
        writeln!(
            f,
            "Critical Hit Rate: {:.2}% ({} / {})",
            self.critical_rate * 100.0,
            self.critical_hits,
            self.simulations
        )?;
        writeln!(f, "Average Damage:    {:.2}", self.average_damage)?;
        writeln!(f, "Total Reward:      {}", self.total_reward)?;
        writeln!(f, "Average Reward (per kill): {:.2}", self.average_reward_per_kill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn math(power: u32, health: u32) -> MathSimConfig {
        MathSimConfig {
            power,
            health,
            value: 50,
            simulations: 2_000,
            seed: 42,
            model: ModelConfig::default(),
        }
    }

    #[test]
    fn test_math_run_is_reproducible() {
        let first = run_math(math(10, 10)).unwrap();
        let second = run_math(math(10, 10)).unwrap();
        assert_eq!(first, second);
        assert!(first.kills > 0 && first.kills < first.simulations);
    }

    #[test]
    fn test_math_overwhelming_power_always_kills() {
        let report = run_math(math(100, 1)).unwrap();
        assert_eq!(report.kills, report.simulations);
        assert_eq!(report.kill_rate, 1.0);
        // Rewards never fall below the fish's value.
        assert!(report.average_reward_per_kill >= 50.0);
    }

    #[test]
    fn test_math_armored_fish_never_dies() {
        // Power 10 peaks at 12 * 2.5 = 30 damage.
        let report = run_math(math(10, 1_000)).unwrap();
        assert_eq!(report.kills, 0);
        assert_eq!(report.total_reward, 0);
        assert_eq!(report.average_reward_per_kill, 0.0);
        assert!(report.average_damage >= 8.0 && report.average_damage <= 30.0);
    }

    #[test]
    fn test_math_critical_rate_tracks_model() {
        let mut config = math(10, 100);
        config.simulations = 20_000;
        let report = run_math(config).unwrap();
        assert!((report.critical_rate - 0.05).abs() < 0.01);
    }

    #[test]
    fn test_math_rejects_bad_inputs() {
        assert!(matches!(run_math(math(0, 10)), Err(SimError::Power(0))));
        assert!(matches!(run_math(math(10, 0)), Err(SimError::NoHealth)));
        let mut config = math(10, 10);
        config.simulations = 0;
        assert!(matches!(run_math(config), Err(SimError::NoShots)));
    }

    #[test]
    fn test_disabled_controller_stays_in_cold_start() {
        let mut config = RoomSimConfig::new(Tier::Novice);
        assert_eq!(config.effective_rtp(), RtpConfig::default());
        config.controller = false;
        assert_eq!(config.effective_rtp().cold_start_threshold, i64::MAX);
    }

    #[tokio::test]
    async fn test_room_run_rejects_bad_configs() {
        let mut config = RoomSimConfig::new(Tier::Novice);
        config.players = 5;
        assert!(matches!(
            run_room(config).await,
            Err(SimError::Players { got: 5, max: 4 })
        ));

        // Novice caps bets at 100; each power unit costs 1.
        let mut config = RoomSimConfig::new(Tier::Novice);
        config.tier_config.max_bet = 50;
        config.power = 60;
        assert!(matches!(
            run_room(config).await,
            Err(SimError::BetTooLarge { cost: 60, .. })
        ));
    }

    #[tokio::test]
    async fn test_room_run_accounts_every_shot() {
        let mut config = RoomSimConfig::new(Tier::Novice);
        config.shots = 200;
        config.players = 2;
        config.controller = false;
        let report = run_room(config).await.unwrap();

        assert_eq!(report.shots, 200);
        assert_eq!(report.hits + report.misses, 200);
        assert_eq!(report.total_wagered, 200 * 10);
        assert_eq!(report.kills_denied, 0);
        assert!(report.kills <= report.hits);
        assert!((report.rtp - report.ledger_rtp).abs() < 1e-9);
    }
}
