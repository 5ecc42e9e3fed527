//! Combat resolution.
//!
//! For a bullet of power `p` hitting a fish with health `h` and value `v`:
//! - damage = floor(p * U(0.8, 1.2)), at least 1, times `critical_multiplier` on a critical
//! - critical is a Bernoulli draw at `critical_rate`
//! - lethal when damage >= h
//! - potential reward (lethal only) = v * min(power_mult * crit_mult * rand_mult, max_payout_multiplier),
//!   never below v, where power_mult = 1 + ln(1 + p / 10) * 0.1 and rand_mult = 1 + (U(0, 1) - 0.5) * 0.2
//!
//! The model holds no state. Every draw comes from the caller's random source, so a seeded
//! source reproduces outcomes exactly. Draws are made in a fixed order whether or not the hit
//! is lethal.

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub critical_rate: f64,
    pub critical_multiplier: f64,
    pub max_payout_multiplier: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            critical_rate: 0.05,
            critical_multiplier: 2.5,
            max_payout_multiplier: 50.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HitOutcome {
    pub damage: u32,
    pub critical: bool,
    pub lethal: bool,
    /// Reward offered to the RTP controller; 0 when not lethal.
    pub potential_reward: i64,
    pub multiplier: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MathModel {
    config: ModelConfig,
}

impl MathModel {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn resolve<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        power: u32,
        fish_health: u32,
        fish_value: i64,
    ) -> HitOutcome {
        let variance = rng.gen_range(0.8..1.2);
        let critical = rng.gen::<f64>() < self.config.critical_rate;
        let jitter = rng.gen::<f64>();

        let mut raw_damage = power as f64 * variance;
        let crit_mult = if critical {
            self.config.critical_multiplier
        } else {
            1.0
        };
        raw_damage *= crit_mult;
        let damage = (raw_damage.floor() as u32).max(1);
        let lethal = damage >= fish_health;

        let power_mult = 1.0 + (1.0 + power as f64 / 10.0).ln() * 0.1;
        let rand_mult = 1.0 + (jitter - 0.5) * 0.2;
        let multiplier = (power_mult * crit_mult * rand_mult).min(self.config.max_payout_multiplier);
        let potential_reward = if lethal {
            ((fish_value as f64 * multiplier).floor() as i64).max(fish_value)
        } else {
            0
        };

        HitOutcome {
            damage,
            critical,
            lethal,
            potential_reward,
            multiplier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_same_seed_same_outcomes() {
        let model = MathModel::default();
        let mut a = ChaCha8Rng::seed_from_u64(42);
        let mut b = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..100 {
            assert_eq!(
                model.resolve(&mut a, 30, 20, 50),
                model.resolve(&mut b, 30, 20, 50)
            );
        }
    }

    #[test]
    fn test_damage_within_band() {
        let model = MathModel::new(ModelConfig {
            critical_rate: 0.0,
            ..ModelConfig::default()
        });
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..1_000 {
            let outcome = model.resolve(&mut rng, 50, 1_000, 10);
            assert!((40..60).contains(&outcome.damage), "damage {}", outcome.damage);
            assert!(!outcome.critical);
            assert!(!outcome.lethal);
            assert_eq!(outcome.potential_reward, 0);
        }
    }

    #[test]
    fn test_critical_always_multiplies_damage() {
        let model = MathModel::new(ModelConfig {
            critical_rate: 1.0,
            ..ModelConfig::default()
        });
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        for _ in 0..200 {
            let outcome = model.resolve(&mut rng, 10, 1_000, 10);
            assert!(outcome.critical);
            assert!((20..=30).contains(&outcome.damage), "damage {}", outcome.damage);
        }
    }

    #[test]
    fn test_lethal_reward_never_below_value() {
        let model = MathModel::default();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..1_000 {
            let outcome = model.resolve(&mut rng, 1, 1, 40);
            assert!(outcome.lethal);
            assert!(outcome.potential_reward >= 40);
            assert!(outcome.multiplier <= model.config().max_payout_multiplier);
        }
    }

    #[test]
    fn test_payout_multiplier_is_capped() {
        let model = MathModel::new(ModelConfig {
            critical_rate: 1.0,
            critical_multiplier: 100.0,
            max_payout_multiplier: 3.0,
        });
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let outcome = model.resolve(&mut rng, 100, 1, 10);
        assert_eq!(outcome.multiplier, 3.0);
        assert_eq!(outcome.potential_reward, 30);
    }

    #[test]
    fn test_critical_rate_is_roughly_configured() {
        let model = MathModel::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1234);
        let trials = 20_000;
        let criticals = (0..trials)
            .filter(|_| model.resolve(&mut rng, 10, 100, 10).critical)
            .count();
        let rate = criticals as f64 / trials as f64;
        assert!((0.035..0.065).contains(&rate), "rate {rate}");
    }
}
