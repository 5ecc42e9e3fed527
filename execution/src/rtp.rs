//! Payout rate controller.
//!
//! The controller only decides whether a lethal hit converts into a payout. It never touches
//! damage. It steers the tier's long-run RTP toward its target by suppressing a fraction of
//! payouts while the tier pays out above `target * (1 + tolerance)`; the suppression
//! probability is the relative overshoot `(current - target) / current`.

use fishhunt_types::{Inventory, Tier};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::inventory::{InventoryLedger, InventoryRepository};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RtpConfig {
    /// Below this many units wagered the sample is too small to judge; every kill pays.
    pub cold_start_threshold: i64,
    /// Relative band above target inside which payouts are not suppressed.
    pub tolerance: f64,
}

impl Default for RtpConfig {
    fn default() -> Self {
        Self {
            cold_start_threshold: 100_000,
            tolerance: 0.05,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Decision {
    ColdStart,
    BelowTarget,
    WithinBand,
    /// Above the band; `denied` records the outcome of the draw against `probability`.
    Overshoot { probability: f64, denied: bool },
}

impl Decision {
    pub fn approved(&self) -> bool {
        !matches!(self, Decision::Overshoot { denied: true, .. })
    }
}

impl RtpConfig {
    pub fn decide<G: Rng + ?Sized>(&self, rng: &mut G, inventory: &Inventory, target_rtp: f64) -> Decision {
        if inventory.total_in < self.cold_start_threshold {
            return Decision::ColdStart;
        }
        let current = inventory.current_rtp;
        if current > target_rtp * (1.0 + self.tolerance) {
            let probability = ((current - target_rtp) / current).clamp(0.0, 1.0);
            let denied = rng.gen::<f64>() < probability;
            return Decision::Overshoot { probability, denied };
        }
        if current < target_rtp {
            return Decision::BelowTarget;
        }
        Decision::WithinBand
    }
}

pub struct RtpController<R: InventoryRepository> {
    ledger: Arc<InventoryLedger<R>>,
    config: RtpConfig,
}

impl<R: InventoryRepository> Clone for RtpController<R> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            config: self.config,
        }
    }
}

impl<R: InventoryRepository> RtpController<R> {
    pub fn new(ledger: Arc<InventoryLedger<R>>, config: RtpConfig) -> Self {
        Self { ledger, config }
    }

    pub fn config(&self) -> &RtpConfig {
        &self.config
    }

    /// Decide whether a lethal hit worth `potential_reward` pays out.
    pub async fn approve_kill<G: Rng + ?Sized + Send>(
        &self,
        rng: &mut G,
        tier: Tier,
        target_rtp: f64,
        potential_reward: i64,
    ) -> bool {
        let inventory = self.ledger.get_inventory(tier).await;
        let decision = self.config.decide(rng, &inventory, target_rtp);
        debug!(
            %tier,
            rtp = inventory.current_rtp,
            target_rtp,
            total_in = inventory.total_in,
            potential_reward,
            ?decision,
            "kill decision"
        );
        decision.approved()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::MemoryInventoryRepository;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn inventory(total_in: i64, total_out: i64) -> Inventory {
        let mut inventory = Inventory::new(Tier::Advanced);
        inventory.add_bet(total_in);
        inventory.add_win(total_out);
        inventory
    }

    #[test]
    fn test_cold_start_always_approves() {
        let config = RtpConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let hot = inventory(99_999, 500_000);
        for _ in 0..100 {
            assert_eq!(config.decide(&mut rng, &hot, 0.95), Decision::ColdStart);
        }
    }

    #[test]
    fn test_within_band_approves() {
        let config = RtpConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let near = inventory(100_000, 97_000);
        assert_eq!(config.decide(&mut rng, &near, 0.95), Decision::WithinBand);
    }

    #[test]
    fn test_overshoot_probability_is_relative() {
        let config = RtpConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let hot = inventory(100_000, 110_000);
        match config.decide(&mut rng, &hot, 0.95) {
            Decision::Overshoot { probability, .. } => {
                assert!((probability - (1.10 - 0.95) / 1.10).abs() < 1e-9);
            }
            other => panic!("unexpected decision {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_far_below_target_approves() {
        let ledger = Arc::new(InventoryLedger::new(MemoryInventoryRepository::default()));
        ledger.add_bet(Tier::Advanced, 10_000).await;
        let controller = RtpController::new(
            ledger,
            RtpConfig {
                cold_start_threshold: 1_000,
                ..RtpConfig::default()
            },
        );
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let mut approved = 0;
        for _ in 0..100 {
            if controller.approve_kill(&mut rng, Tier::Advanced, 0.95, 50).await {
                approved += 1;
            }
        }
        assert_eq!(approved, 100);
    }

    #[tokio::test]
    async fn test_far_above_target_suppresses_some_payouts() {
        let ledger = Arc::new(InventoryLedger::new(MemoryInventoryRepository::default()));
        ledger.add_bet(Tier::Advanced, 100_000).await;
        ledger.add_win(Tier::Advanced, 110_000).await;
        let controller = RtpController::new(ledger, RtpConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let mut denied = 0;
        for _ in 0..100 {
            if !controller.approve_kill(&mut rng, Tier::Advanced, 0.95, 50).await {
                denied += 1;
            }
        }
        assert!(denied > 0);
        assert!(denied < 100);
    }
}
