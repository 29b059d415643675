//! Profile Module
//!
//! Typed records for a profile snapshot: commander, ships and their outfit,
//! and the last docked station with its market and outfitting.

pub mod decoder;
pub mod raw;
pub mod ratings;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use decoder::{DecodeError, DecodedProfile, Diagnostic, DiagnosticKind, ProfileDecoder};
pub use ratings::Rating;

/// Title used when no faction rank applies
pub const DEFAULT_TITLE: &str = "Commander";

/// A point-in-time snapshot of the commander's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub created_at: DateTime<Utc>,
    pub commander: Commander,
    pub ship: Option<Ship>,
    /// Ships stored at other stations
    pub shipyard: Vec<Ship>,
    /// Name of the system the backend last saw the commander in
    pub current_system: Option<String>,
    pub last_station: Option<Station>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commander {
    pub name: Option<String>,
    pub combat_rating: Rating,
    pub trade_rating: Rating,
    pub exploration_rating: Rating,
    pub empire_rating: Rating,
    pub federation_rating: Rating,
    pub credits: i64,
    pub debt: i64,
    /// Derived from ranks and the current system's allegiance
    pub title: String,
}

impl Default for Commander {
    fn default() -> Self {
        Self {
            name: None,
            combat_rating: Rating::default(),
            trade_rating: Rating::default(),
            exploration_rating: Rating::default(),
            empire_rating: Rating::default(),
            federation_rating: Rating::default(),
            credits: 0,
            debt: 0,
            title: DEFAULT_TITLE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ship {
    /// The backend's identifier for this ship; unique per commander
    pub local_id: i64,
    /// Internal model name, e.g. `CobraMkIII`
    pub ed_model: String,
    /// Human-readable model name; unset when the model is unknown
    pub model: Option<String>,
    pub name: Option<String>,
    pub value: i64,
    pub cargo_capacity: i32,
    pub cargo_carried: i32,
    pub health: f64,
    pub bulkheads: Option<Module>,
    pub power_plant: Option<Module>,
    pub thrusters: Option<Module>,
    pub frame_shift_drive: Option<Module>,
    pub life_support: Option<Module>,
    pub power_distributor: Option<Module>,
    pub sensors: Option<Module>,
    pub fuel_tank: Option<Module>,
    pub fuel_tank_capacity: f64,
    pub hardpoints: Vec<Hardpoint>,
    pub compartments: Vec<Compartment>,
    pub cargo: Vec<Cargo>,
    /// Where a stored ship is docked
    pub star_system: Option<String>,
    pub station: Option<String>,
}

impl Ship {
    pub fn is_known(&self) -> bool {
        !self.ed_model.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub id: i64,
    pub ed_name: String,
    /// Unset when the id is missing from the definition tables
    pub name: Option<String>,
    pub class: Option<u8>,
    pub grade: Option<String>,
    pub price: i64,
    pub enabled: bool,
    pub priority: i32,
    pub health: f64,
    /// Carries engineering modifications
    pub modified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hardpoint {
    pub slot: String,
    /// 4 = huge down to 0 = tiny (utility)
    pub size: u8,
    pub module: Option<Module>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compartment {
    pub slot: String,
    pub size: u8,
    pub module: Option<Module>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cargo {
    pub commodity: Commodity,
    pub amount: i32,
    /// Unit value
    pub price: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Commodity {
    pub id: Option<i64>,
    pub ed_name: String,
    /// Unset when the commodity is missing from the definition tables
    pub name: Option<String>,
    pub category: Option<String>,
    pub avg_price: i64,
    pub buy_price: i64,
    pub sell_price: i64,
    pub stock: i64,
    pub stock_bracket: Option<i64>,
    pub demand: i64,
    pub demand_bracket: Option<i64>,
    pub status_flags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    pub system_name: Option<String>,
    pub faction: Option<String>,
    pub government: Option<String>,
    pub allegiance: Option<String>,
    /// Faction state, e.g. `Boom`
    pub state: Option<String>,
    pub outfitting: Vec<Module>,
    pub commodities: Vec<Commodity>,
    /// Ships for sale
    pub shipyard: Vec<Ship>,
}

impl Station {
    pub fn named(name: impl Into<String>, system_name: Option<String>) -> Self {
        Self {
            name: name.into(),
            system_name,
            ..Default::default()
        }
    }

    /// Same station name in the same system
    pub fn is_same_place(&self, other: &Station) -> bool {
        self.name == other.name && self.system_name == other.system_name
    }
}
