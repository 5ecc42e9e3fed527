//! Fish spawning.
//!
//! Species are picked with weight `1 - rarity`. Fish enter from a random edge, 50px outside
//! the field, heading straight across it. Health, value and speed are jittered per fish.

use fishhunt_types::{now_millis, Fish, FishId, FishSpecies, FishStatus, Position, SizeClass};
use rand::Rng;
use std::f64::consts::{FRAC_PI_2, PI};

/// Distance outside the field at which fish enter.
pub const SPAWN_MARGIN: f64 = 50.0;

pub fn default_species() -> Vec<FishSpecies> {
    let table: [(u32, &str, SizeClass, u32, i64, f64, f64); 12] = [
        (1, "clownfish", SizeClass::Small, 1, 5, 100.0, 0.10),
        (2, "tetra", SizeClass::Small, 1, 8, 120.0, 0.15),
        (3, "angelfish", SizeClass::Small, 1, 10, 150.0, 0.20),
        (11, "pufferfish", SizeClass::Medium, 3, 25, 80.0, 0.40),
        (12, "lionfish", SizeClass::Medium, 4, 35, 90.0, 0.45),
        (13, "seahorse", SizeClass::Medium, 2, 40, 60.0, 0.50),
        (21, "sea turtle", SizeClass::Large, 10, 100, 70.0, 0.70),
        (22, "swordfish", SizeClass::Large, 8, 120, 110.0, 0.75),
        (23, "manta ray", SizeClass::Large, 12, 150, 50.0, 0.80),
        (31, "hammerhead", SizeClass::Boss, 50, 500, 40.0, 0.95),
        (32, "giant octopus", SizeClass::Boss, 30, 800, 30.0, 0.97),
        (33, "golden dragon", SizeClass::Boss, 80, 1_000, 25.0, 0.99),
    ];
    table
        .into_iter()
        .map(|(id, name, size, base_health, base_value, base_speed, rarity)| FishSpecies {
            id,
            name: name.to_string(),
            size,
            base_health,
            base_value,
            base_speed,
            rarity,
        })
        .collect()
}

#[derive(Clone, Debug)]
pub struct Spawner {
    species: Vec<FishSpecies>,
    next_id: FishId,
}

impl Spawner {
    pub fn new(species: Vec<FishSpecies>) -> Self {
        Self {
            species,
            next_id: 0,
        }
    }

    pub fn species(&self) -> &[FishSpecies] {
        &self.species
    }

    pub fn pick_species<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&FishSpecies> {
        let weight = |species: &FishSpecies| (1.0 - species.rarity).max(0.0);
        let total: f64 = self.species.iter().map(weight).sum();
        if total <= 0.0 {
            return self.species.first();
        }
        let mut roll = rng.gen::<f64>() * total;
        for species in &self.species {
            roll -= weight(species);
            if roll < 0.0 {
                return Some(species);
            }
        }
        self.species.last()
    }

    pub fn spawn<R: Rng + ?Sized>(&mut self, rng: &mut R, width: f64, height: f64) -> Option<Fish> {
        let species = self.pick_species(rng)?.clone();
        let (position, heading) = match rng.gen_range(0..4) {
            0 => (Position::new(-SPAWN_MARGIN, rng.gen_range(0.0..=height)), 0.0),
            1 => (Position::new(width + SPAWN_MARGIN, rng.gen_range(0.0..=height)), PI),
            2 => (Position::new(rng.gen_range(0.0..=width), -SPAWN_MARGIN), FRAC_PI_2),
            _ => (Position::new(rng.gen_range(0.0..=width), height + SPAWN_MARGIN), -FRAC_PI_2),
        };
        let health = ((species.base_health as f64 * rng.gen_range(0.8..=1.2)).round() as u32).max(1);
        let value = ((species.base_value as f64 * rng.gen_range(0.9..=1.1)).round() as i64).max(1);
        let speed = species.base_speed * rng.gen_range(0.8..=1.2);

        self.next_id += 1;
        Some(Fish {
            id: self.next_id,
            species_id: species.id,
            position,
            heading,
            speed,
            health,
            max_health: health,
            value,
            status: FishStatus::Alive,
            spawned_at: now_millis(),
        })
    }

    pub fn spawn_batch<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        count: usize,
        width: f64,
        height: f64,
    ) -> Vec<Fish> {
        (0..count).filter_map(|_| self.spawn(rng, width, height)).collect()
    }

    /// Per-tick spawn draw for a rate expressed in spawns per second.
    pub fn should_spawn<R: Rng + ?Sized>(&self, rng: &mut R, spawn_rate: f64, dt: f64) -> bool {
        rng.gen::<f64>() < (spawn_rate * dt).clamp(0.0, 1.0)
    }
}

impl Default for Spawner {
    fn default() -> Self {
        Self::new(default_species())
    }
}
