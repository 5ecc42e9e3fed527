use anyhow::{Context, Result};
use clap::Parser;
use fishhunt_simulator::{run_math, run_room, MathSimConfig, RoomSimConfig};
use fishhunt_types::Tier;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Simulate fishhunt payouts offline")]
struct Args {
    /// Tier whose bet limits and target RTP the room uses.
    #[arg(long, default_value = "novice")]
    tier: Tier,

    /// Bullets to fire (or hits to resolve in math mode).
    #[arg(long, default_value_t = 10_000)]
    shots: u64,

    /// Bullet power, 1 to 100.
    #[arg(long, default_value_t = 10)]
    power: u32,

    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Bots seated in the room, taking turns to shoot.
    #[arg(long, default_value_t = 1)]
    players: usize,

    /// Pay every kill, ignoring the tier's target RTP.
    #[arg(long)]
    no_controller: bool,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,

    /// Room game-loop period in milliseconds.
    #[arg(long, default_value_t = 5)]
    tick_ms: u64,

    /// Fish health for math mode. Setting it skips the room and resolves hits directly.
    #[arg(long, requires = "value")]
    health: Option<u32>,

    /// Fish value for math mode.
    #[arg(long, requires = "health")]
    value: Option<i64>,
}

impl Args {
    fn math_config(&self) -> Option<MathSimConfig> {
        let (health, value) = self.health.zip(self.value)?;
        Some(MathSimConfig {
            power: self.power,
            health,
            value,
            simulations: self.shots,
            seed: self.seed,
            ..MathSimConfig::default()
        })
    }

    fn room_config(&self) -> RoomSimConfig {
        let mut config = RoomSimConfig::new(self.tier);
        config.shots = self.shots;
        config.power = self.power;
        config.players = self.players;
        config.seed = self.seed;
        config.controller = !self.no_controller;
        config.tick_interval = Duration::from_millis(self.tick_ms.max(1));
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    if let Some(config) = args.math_config() {
        let report = run_math(config).context("math simulation failed")?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print!("{report}");
        }
        return Ok(());
    }

    let report = run_room(args.room_config())
        .await
        .context("room simulation failed")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_run_a_novice_room() {
        let args = Args::parse_from(["simulator"]);
        assert!(args.math_config().is_none());
        let config = args.room_config();
        assert_eq!(config.tier, Tier::Novice);
        assert_eq!(config.shots, 10_000);
        assert_eq!(config.power, 10);
        assert!(config.controller);
    }

    #[test]
    fn test_room_flags() {
        let args = Args::parse_from([
            "simulator",
            "--tier",
            "VIP",
            "--shots",
            "500",
            "--players",
            "3",
            "--no-controller",
            "--tick-ms",
            "0",
        ]);
        let config = args.room_config();
        assert_eq!(config.tier, Tier::Vip);
        assert_eq!(config.shots, 500);
        assert_eq!(config.players, 3);
        assert!(!config.controller);
        assert_eq!(config.tick_interval, Duration::from_millis(1));
    }

    #[test]
    fn test_health_and_value_select_math_mode() {
        let args = Args::parse_from([
            "simulator",
            "--power",
            "50",
            "--health",
            "500",
            "--value",
            "250",
            "--shots",
            "100",
        ]);
        let config = args.math_config().unwrap();
        assert_eq!(config.power, 50);
        assert_eq!(config.health, 500);
        assert_eq!(config.value, 250);
        assert_eq!(config.simulations, 100);
    }

    #[test]
    fn test_math_mode_needs_both_fish_fields() {
        assert!(Args::try_parse_from(["simulator", "--health", "100"]).is_err());
        assert!(Args::try_parse_from(["simulator", "--tier", "whale"]).is_err());
    }
}
