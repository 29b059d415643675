//! Rank tables for the commander's five rating hierarchies.

use serde::{Deserialize, Serialize};

const COMBAT: [&str; 9] = [
    "Harmless",
    "Mostly Harmless",
    "Novice",
    "Competent",
    "Expert",
    "Master",
    "Dangerous",
    "Deadly",
    "Elite",
];

const TRADE: [&str; 9] = [
    "Penniless",
    "Mostly Penniless",
    "Peddler",
    "Dealer",
    "Merchant",
    "Broker",
    "Entrepreneur",
    "Tycoon",
    "Elite",
];

const EXPLORATION: [&str; 9] = [
    "Aimless",
    "Mostly Aimless",
    "Scout",
    "Surveyor",
    "Trailblazer",
    "Pathfinder",
    "Ranger",
    "Pioneer",
    "Elite",
];

const EMPIRE: [&str; 15] = [
    "None", "Outsider", "Serf", "Master", "Squire", "Knight", "Lord", "Baron", "Viscount",
    "Count", "Earl", "Marquis", "Duke", "Prince", "King",
];

const FEDERATION: [&str; 15] = [
    "None",
    "Recruit",
    "Cadet",
    "Midshipman",
    "Petty Officer",
    "Chief Petty Officer",
    "Warrant Officer",
    "Ensign",
    "Lieutenant",
    "Lieutenant Commander",
    "Post Commander",
    "Post Captain",
    "Rear Admiral",
    "Vice Admiral",
    "Admiral",
];

/// A rank within one hierarchy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub rank: u8,
    pub name: String,
}

impl Rating {
    pub fn combat(rank: u8) -> Self {
        Self::from_table(&COMBAT, rank)
    }

    pub fn trade(rank: u8) -> Self {
        Self::from_table(&TRADE, rank)
    }

    pub fn exploration(rank: u8) -> Self {
        Self::from_table(&EXPLORATION, rank)
    }

    pub fn empire(rank: u8) -> Self {
        Self::from_table(&EMPIRE, rank)
    }

    pub fn federation(rank: u8) -> Self {
        Self::from_table(&FEDERATION, rank)
    }

    fn from_table(table: &[&str], rank: u8) -> Self {
        let name = table
            .get(rank as usize)
            .copied()
            .unwrap_or("Unknown")
            .to_string();
        Self { rank, name }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_names() {
        assert_eq!(Rating::federation(2).name, "Cadet");
        assert_eq!(Rating::empire(4).name, "Squire");
        assert_eq!(Rating::combat(8).name, "Elite");
        assert_eq!(Rating::exploration(0).name, "Aimless");
    }

    #[test]
    fn test_out_of_range_rank() {
        let rating = Rating::trade(42);
        assert_eq!(rating.rank, 42);
        assert_eq!(rating.name, "Unknown");
    }
}
