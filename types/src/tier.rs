use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Room class sharing bet limits and a target RTP.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Novice,
    Intermediate,
    Advanced,
    Vip,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Novice, Tier::Intermediate, Tier::Advanced, Tier::Vip];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Novice => "novice",
            Tier::Intermediate => "intermediate",
            Tier::Advanced => "advanced",
            Tier::Vip => "vip",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown tier {0:?}")]
pub struct UnknownTier(pub String);

impl FromStr for Tier {
    type Err = UnknownTier;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Tier::ALL
            .into_iter()
            .find(|tier| tier.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| UnknownTier(value.to_string()))
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TierConfigError {
    #[error("{tier}: {field} must be > 0 (got {value})")]
    NonPositive {
        tier: Tier,
        field: &'static str,
        value: f64,
    },
    #[error("{tier}: min_bet {min_bet} exceeds max_bet {max_bet}")]
    BetRange { tier: Tier, min_bet: i64, max_bet: i64 },
    #[error("{tier}: min_fish_count {min} exceeds max_fish_count {max}")]
    FishRange { tier: Tier, min: usize, max: usize },
    #[error("{tier}: target_rtp must be in (0, 1] (got {value})")]
    TargetRtp { tier: Tier, value: f64 },
}

/// Per-tier room parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    pub min_bet: i64,
    pub max_bet: i64,
    pub max_players: usize,
    pub bullet_cost_multiplier: f64,
    /// Expected spawns per second while below `max_fish_count`.
    pub fish_spawn_rate: f64,
    pub min_fish_count: usize,
    pub max_fish_count: usize,
    pub room_width: f64,
    pub room_height: f64,
    pub target_rtp: f64,
}

impl TierConfig {
    pub fn for_tier(tier: Tier) -> Self {
        let (min_bet, max_bet, multiplier, spawn_rate, min_fish, max_fish, target_rtp) = match tier {
            Tier::Novice => (10, 100, 1.0, 0.3, 10, 20, 0.97),
            Tier::Intermediate => (100, 1_000, 2.0, 0.4, 12, 25, 0.96),
            Tier::Advanced => (1_000, 10_000, 5.0, 0.5, 15, 30, 0.95),
            Tier::Vip => (10_000, 100_000, 10.0, 0.6, 18, 35, 0.94),
        };
        Self {
            min_bet,
            max_bet,
            max_players: 4,
            bullet_cost_multiplier: multiplier,
            fish_spawn_rate: spawn_rate,
            min_fish_count: min_fish,
            max_fish_count: max_fish,
            room_width: 1200.0,
            room_height: 800.0,
            target_rtp,
        }
    }

    /// Wager for one bullet of the given power, never below 1.
    pub fn bullet_cost(&self, power: u32) -> i64 {
        ((power as f64 * self.bullet_cost_multiplier).floor() as i64).max(1)
    }

    pub fn validate(&self, tier: Tier) -> Result<(), TierConfigError> {
        let positive = [
            ("min_bet", self.min_bet as f64),
            ("max_bet", self.max_bet as f64),
            ("max_players", self.max_players as f64),
            ("bullet_cost_multiplier", self.bullet_cost_multiplier),
            ("fish_spawn_rate", self.fish_spawn_rate),
            ("max_fish_count", self.max_fish_count as f64),
            ("room_width", self.room_width),
            ("room_height", self.room_height),
        ];
        for (field, value) in positive {
            if !(value > 0.0) {
                return Err(TierConfigError::NonPositive { tier, field, value });
            }
        }
        if self.min_bet > self.max_bet {
            return Err(TierConfigError::BetRange {
                tier,
                min_bet: self.min_bet,
                max_bet: self.max_bet,
            });
        }
        if self.min_fish_count > self.max_fish_count {
            return Err(TierConfigError::FishRange {
                tier,
                min: self.min_fish_count,
                max: self.max_fish_count,
            });
        }
        if !(self.target_rtp > 0.0 && self.target_rtp <= 1.0) {
            return Err(TierConfigError::TargetRtp {
                tier,
                value: self.target_rtp,
            });
        }
        Ok(())
    }
}

/// Room configuration provider: the built-in tier table plus any overrides.
#[derive(Clone, Debug, PartialEq)]
pub struct TierCatalog {
    configs: BTreeMap<Tier, TierConfig>,
}

impl Default for TierCatalog {
    fn default() -> Self {
        Self {
            configs: Tier::ALL
                .into_iter()
                .map(|tier| (tier, TierConfig::for_tier(tier)))
                .collect(),
        }
    }
}

impl TierCatalog {
    pub fn with_overrides(overrides: BTreeMap<Tier, TierConfig>) -> Self {
        let mut catalog = Self::default();
        catalog.configs.extend(overrides);
        catalog
    }

    pub fn get(&self, tier: Tier) -> Option<&TierConfig> {
        self.configs.get(&tier)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tier, &TierConfig)> {
        self.configs.iter().map(|(tier, config)| (*tier, config))
    }

    pub fn validate(&self) -> Result<(), TierConfigError> {
        self.iter().try_for_each(|(tier, config)| config.validate(tier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_valid() {
        let catalog = TierCatalog::default();
        assert!(catalog.validate().is_ok());
        assert_eq!(catalog.iter().count(), 4);
        let vip = catalog.get(Tier::Vip).unwrap();
        assert_eq!(vip.min_bet, 10_000);
        assert!((vip.target_rtp - 0.94).abs() < f64::EPSILON);
    }

    #[test]
    fn test_bullet_cost_scales_with_multiplier() {
        assert_eq!(TierConfig::for_tier(Tier::Novice).bullet_cost(10), 10);
        assert_eq!(TierConfig::for_tier(Tier::Advanced).bullet_cost(10), 50);
        let mut cheap = TierConfig::for_tier(Tier::Novice);
        cheap.bullet_cost_multiplier = 0.01;
        assert_eq!(cheap.bullet_cost(1), 1);
    }

    #[test]
    fn test_tier_parse_and_display() {
        assert_eq!("VIP".parse::<Tier>(), Ok(Tier::Vip));
        assert_eq!(Tier::Intermediate.to_string(), "intermediate");
        assert!("legend".parse::<Tier>().is_err());
    }

    #[test]
    fn test_override_replaces_one_tier() {
        let mut novice = TierConfig::for_tier(Tier::Novice);
        novice.target_rtp = 0.9;
        let catalog = TierCatalog::with_overrides(BTreeMap::from([(Tier::Novice, novice)]));
        assert!((catalog.get(Tier::Novice).unwrap().target_rtp - 0.9).abs() < f64::EPSILON);
        assert_eq!(catalog.get(Tier::Vip), Some(&TierConfig::for_tier(Tier::Vip)));
    }

    #[test]
    fn test_invalid_target_rtp_rejected() {
        let mut config = TierConfig::for_tier(Tier::Advanced);
        config.target_rtp = 1.5;
        assert!(matches!(
            config.validate(Tier::Advanced),
            Err(TierConfigError::TargetRtp { .. })
        ));
    }

    #[test]
    fn test_tier_config_from_yaml() {
        let yaml = "min_bet: 5\nmax_bet: 50\nmax_players: 2\nbullet_cost_multiplier: 0.5\n\
                    fish_spawn_rate: 1.0\nmin_fish_count: 1\nmax_fish_count: 3\n\
                    room_width: 600.0\nroom_height: 400.0\ntarget_rtp: 0.9\n";
        let config: TierConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.max_players, 2);
        assert!(config.validate(Tier::Novice).is_ok());
    }
}
