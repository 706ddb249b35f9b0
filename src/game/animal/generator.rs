//! Weighted entity generation for a room.
//!
//! Sampling is driven by the fixed weight column of the kind table. The
//! generator also picks a path for each spawn (special kinds are confined to
//! the special paths), jitters the kind's base speed, and decides the red-bag
//! flag behind the config gate.

use rand::Rng;

use crate::game::animal::paths::{allowed_paths, Path};
use crate::game::animal::types::{AnimalKind, KIND_TABLE};

/// A freshly sampled spawn, before the room assigns an id.
#[derive(Debug, Clone)]
pub struct SpawnPlan {
    pub kind: AnimalKind,
    pub path_id: u32,
    /// Scene units traversed per second after jitter.
    pub speed: f64,
    pub hp: i32,
    pub has_red_bag: bool,
}

/// Per-room generator over the fixed kind table.
#[derive(Debug, Clone)]
pub struct Generator {
    red_bag_enabled: bool,
}

impl Generator {
    pub fn new(red_bag_enabled: bool) -> Self {
        Self { red_bag_enabled }
    }

    /// Weighted pick over all kinds.
    pub fn select<R: Rng + ?Sized>(&self, rng: &mut R) -> AnimalKind {
        Self::weighted_pick(rng, |_| true).expect("kind table is never empty")
    }

    /// Weighted pick omitting the given kinds, to diversify the population.
    /// Falls back to an unrestricted pick when the exclusion covers the
    /// whole table.
    pub fn select_excluding<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        present: &[AnimalKind],
    ) -> AnimalKind {
        Self::weighted_pick(rng, |k| !present.contains(&k)).unwrap_or_else(|| self.select(rng))
    }

    fn weighted_pick<R: Rng + ?Sized>(
        rng: &mut R,
        keep: impl Fn(AnimalKind) -> bool,
    ) -> Option<AnimalKind> {
        let total: u32 = KIND_TABLE
            .iter()
            .filter(|s| keep(s.kind))
            .map(|s| s.weight)
            .sum();
        if total == 0 {
            return None;
        }
        let mut roll = rng.gen_range(0..total);
        for stats in KIND_TABLE.iter().filter(|s| keep(s.kind)) {
            if roll < stats.weight {
                return Some(stats.kind);
            }
            roll -= stats.weight;
        }
        None
    }

    /// Select a path id for the kind. Special kinds only travel the
    /// designated special paths.
    pub fn pick_path<R: Rng + ?Sized>(&self, rng: &mut R, kind: AnimalKind) -> u32 {
        let range = allowed_paths(kind.is_special());
        rng.gen_range(range)
    }

    /// Build a full spawn plan for a kind: path, jittered speed, red-bag flag.
    pub fn plan<R: Rng + ?Sized>(&self, rng: &mut R, kind: AnimalKind) -> SpawnPlan {
        let stats = kind.stats();
        // Concrete speed is jittered plus or minus 10 percent.
        let jitter = rng.gen_range(0.9..=1.1);
        SpawnPlan {
            kind,
            path_id: self.pick_path(rng, kind),
            speed: stats.speed * jitter,
            hp: stats.hp,
            has_red_bag: self.red_bag_enabled && kind.red_bag_eligible(),
        }
    }

    /// Seconds until an entity leaves, sized from its path length and speed.
    pub fn crossing_secs(plan: &SpawnPlan, path: &Path) -> f64 {
        if plan.speed <= 0.0 {
            return f64::INFINITY;
        }
        path.length() / plan.speed
    }
}
