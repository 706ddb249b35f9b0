//! Animal kinds and their balance constants.
//!
//! Weights, odds ranges, speeds, hit points and bomber damage ratios are fixed
//! tuning data. Sampling happens in the generator; this module only owns the
//! tables.

use serde::{Deserialize, Serialize};

/// Everything a player can shoot at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum AnimalKind {
    Turtle = 1,
    Cock = 2,
    Dog = 3,
    Monkey = 4,
    Horse = 5,
    Ox = 6,
    Baozi = 7,
    Panda = 8,
    Hippo = 9,
    Lion = 10,
    Elephant = 11,
    Pikachu = 12,
    Bomber = 13,
}

/// Skills a player can own and use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SkillKind {
    /// Freezes every animal in the room for a fixed window.
    Ice = 1,
    /// Locks the aim onto one animal until it leaves or dies.
    Lock = 2,
    /// Forces the next bet to hit.
    OneBlow = 3,
}

impl SkillKind {
    pub fn from_wire(value: i32) -> Option<Self> {
        match value {
            1 => Some(SkillKind::Ice),
            2 => Some(SkillKind::Lock),
            3 => Some(SkillKind::OneBlow),
            _ => None,
        }
    }

    pub const ALL: [SkillKind; 3] = [SkillKind::Ice, SkillKind::Lock, SkillKind::OneBlow];

    /// Shop price per charge, in coins.
    pub fn price(self) -> i64 {
        match self {
            SkillKind::Ice => 10_000,
            SkillKind::Lock => 5_000,
            SkillKind::OneBlow => 50_000,
        }
    }
}

/// Seconds an ice skill keeps the room frozen.
pub const FREEZE_SECS: u64 = 10;

/// Gold beans per coin when converting red-bag winnings.
pub const GOLD_PER_COIN: i64 = 1200;

/// Balance constants for one kind.
#[derive(Debug, Clone, Copy)]
pub struct KindStats {
    pub kind: AnimalKind,
    /// Weighted sampling weight.
    pub weight: u32,
    /// Scene units traversed per second before jitter.
    pub speed: f64,
    pub hp: i32,
    pub min_odds: f64,
    pub max_odds: f64,
    /// Collision radius in scene units.
    pub size: f64,
    /// Share of the direct pay a bomber blast yields against this kind.
    pub damage_ratio: f64,
}

/// Full tuning table, one row per kind.
pub const KIND_TABLE: [KindStats; 13] = [
    KindStats { kind: AnimalKind::Turtle, weight: 12, speed: 20.0, hp: 1, min_odds: 1.2, max_odds: 2.0, size: 30.0, damage_ratio: 1.0 },
    KindStats { kind: AnimalKind::Cock, weight: 18, speed: 30.0, hp: 1, min_odds: 1.5, max_odds: 2.5, size: 28.0, damage_ratio: 0.95 },
    KindStats { kind: AnimalKind::Dog, weight: 15, speed: 32.0, hp: 1, min_odds: 2.0, max_odds: 3.0, size: 34.0, damage_ratio: 0.9 },
    KindStats { kind: AnimalKind::Monkey, weight: 12, speed: 36.0, hp: 1, min_odds: 2.5, max_odds: 4.0, size: 32.0, damage_ratio: 0.85 },
    KindStats { kind: AnimalKind::Horse, weight: 10, speed: 40.0, hp: 1, min_odds: 3.0, max_odds: 5.0, size: 44.0, damage_ratio: 0.8 },
    KindStats { kind: AnimalKind::Ox, weight: 8, speed: 28.0, hp: 1, min_odds: 4.0, max_odds: 6.0, size: 48.0, damage_ratio: 0.75 },
    KindStats { kind: AnimalKind::Baozi, weight: 6, speed: 24.0, hp: 1, min_odds: 5.0, max_odds: 8.0, size: 26.0, damage_ratio: 0.7 },
    KindStats { kind: AnimalKind::Panda, weight: 6, speed: 22.0, hp: 1, min_odds: 8.0, max_odds: 12.0, size: 50.0, damage_ratio: 0.65 },
    KindStats { kind: AnimalKind::Hippo, weight: 5, speed: 20.0, hp: 1, min_odds: 10.0, max_odds: 15.0, size: 56.0, damage_ratio: 0.6 },
    KindStats { kind: AnimalKind::Lion, weight: 4, speed: 26.0, hp: 1, min_odds: 15.0, max_odds: 25.0, size: 52.0, damage_ratio: 0.5 },
    KindStats { kind: AnimalKind::Elephant, weight: 3, speed: 16.0, hp: 1, min_odds: 30.0, max_odds: 100.0, size: 70.0, damage_ratio: 0.4 },
    KindStats { kind: AnimalKind::Pikachu, weight: 2, speed: 34.0, hp: 1, min_odds: 8.0, max_odds: 12.0, size: 36.0, damage_ratio: 0.6 },
    KindStats { kind: AnimalKind::Bomber, weight: 1, speed: 30.0, hp: 1, min_odds: 0.0, max_odds: 0.0, size: 36.0, damage_ratio: 0.0 },
];

impl AnimalKind {
    pub fn stats(self) -> &'static KindStats {
        // Table rows are ordered by discriminant.
        &KIND_TABLE[(self as i32 - 1) as usize]
    }

    pub fn from_wire(value: i32) -> Option<Self> {
        KIND_TABLE
            .iter()
            .map(|s| s.kind)
            .find(|k| *k as i32 == value)
    }

    /// Kinds restricted to the designated special paths and announced ahead
    /// of their visible spawn when oversized.
    pub fn is_special(self) -> bool {
        matches!(
            self,
            AnimalKind::Panda
                | AnimalKind::Hippo
                | AnimalKind::Lion
                | AnimalKind::Elephant
                | AnimalKind::Pikachu
                | AnimalKind::Bomber
        )
    }

    /// Kinds that may carry a red bag when the feature gate is on.
    pub fn red_bag_eligible(self) -> bool {
        matches!(
            self,
            AnimalKind::Baozi
                | AnimalKind::Pikachu
                | AnimalKind::Hippo
                | AnimalKind::Lion
                | AnimalKind::Elephant
        )
    }

    /// Per-kind red-bag trigger probability and payout ratio range over the
    /// win amount.
    pub fn red_bag_profile(self) -> Option<RedBagProfile> {
        match self {
            AnimalKind::Baozi => Some(RedBagProfile { prob: 0.5, min_ratio: 0.05, max_ratio: 0.20 }),
            AnimalKind::Pikachu => Some(RedBagProfile { prob: 0.3, min_ratio: 0.05, max_ratio: 0.15 }),
            AnimalKind::Hippo => Some(RedBagProfile { prob: 0.25, min_ratio: 0.10, max_ratio: 0.20 }),
            AnimalKind::Lion => Some(RedBagProfile { prob: 0.2, min_ratio: 0.10, max_ratio: 0.25 }),
            AnimalKind::Elephant => Some(RedBagProfile { prob: 0.15, min_ratio: 0.15, max_ratio: 0.30 }),
            _ => None,
        }
    }

    /// Only elephant kills may attempt the shared jackpot.
    pub fn jackpot_eligible(self) -> bool {
        matches!(self, AnimalKind::Elephant)
    }

    /// Immune to a bomber blast.
    pub fn bomb_immune(self) -> bool {
        matches!(self, AnimalKind::Pikachu | AnimalKind::Bomber)
    }

    /// Oversized kinds are pre-announced this many seconds before the
    /// visible spawn. Zero means an immediate spawn.
    pub fn spawn_delay_secs(self) -> u64 {
        match self {
            AnimalKind::Elephant => 5,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RedBagProfile {
    pub prob: f64,
    pub min_ratio: f64,
    pub max_ratio: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_rows_match_discriminants() {
        for (i, row) in KIND_TABLE.iter().enumerate() {
            assert_eq!(row.kind as i32 - 1, i as i32);
            assert_eq!(row.kind.stats().kind, row.kind);
        }
    }

    #[test]
    fn wire_round_trip() {
        for row in KIND_TABLE.iter() {
            assert_eq!(AnimalKind::from_wire(row.kind as i32), Some(row.kind));
        }
        assert_eq!(AnimalKind::from_wire(0), None);
        assert_eq!(AnimalKind::from_wire(99), None);
    }

    #[test]
    fn red_bag_eligibility_matches_profiles() {
        for row in KIND_TABLE.iter() {
            assert_eq!(
                row.kind.red_bag_eligible(),
                row.kind.red_bag_profile().is_some()
            );
        }
    }

    #[test]
    fn bomber_has_no_direct_odds() {
        let stats = AnimalKind::Bomber.stats();
        assert_eq!(stats.min_odds, 0.0);
        assert_eq!(stats.max_odds, 0.0);
        assert!(AnimalKind::Bomber.bomb_immune());
        assert!(AnimalKind::Pikachu.bomb_immune());
        assert!(!AnimalKind::Elephant.bomb_immune());
    }

    #[test]
    fn damage_ratio_decreases_with_value() {
        assert_eq!(AnimalKind::Turtle.stats().damage_ratio, 1.0);
        assert_eq!(AnimalKind::Elephant.stats().damage_ratio, 0.4);
        assert!(
            AnimalKind::Lion.stats().damage_ratio > AnimalKind::Elephant.stats().damage_ratio
        );
    }
}
