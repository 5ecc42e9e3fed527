use serde::{Deserialize, Serialize};

use crate::entities::now_millis;
use crate::tier::Tier;

/// Running wager/payout ledger for one tier.
///
/// Totals only grow. `current_rtp` is recomputed by every mutation and is
/// `total_out / total_in`, or 0 while nothing has been wagered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub tier: Tier,
    pub total_in: i64,
    pub total_out: i64,
    pub current_rtp: f64,
    pub updated_at: u64,
}

impl Inventory {
    pub fn new(tier: Tier) -> Self {
        Self {
            tier,
            total_in: 0,
            total_out: 0,
            current_rtp: 0.0,
            updated_at: 0,
        }
    }

    /// Records a wager. Non-positive amounts are ignored; returns whether anything changed.
    pub fn add_bet(&mut self, amount: i64) -> bool {
        if amount <= 0 {
            return false;
        }
        self.total_in = self.total_in.saturating_add(amount);
        self.touch();
        true
    }

    /// Records a payout. Non-positive amounts are ignored; returns whether anything changed.
    pub fn add_win(&mut self, amount: i64) -> bool {
        if amount <= 0 {
            return false;
        }
        self.total_out = self.total_out.saturating_add(amount);
        self.touch();
        true
    }

    pub fn rtp(&self) -> f64 {
        if self.total_in == 0 {
            0.0
        } else {
            self.total_out as f64 / self.total_in as f64
        }
    }

    fn touch(&mut self) {
        self.current_rtp = self.rtp();
        self.updated_at = now_millis();
    }
}
