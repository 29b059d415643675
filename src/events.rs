//! Events Module
//!
//! Real-time events as delivered by the log monitors, already parsed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The commander's macro-location mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    NormalSpace,
    Supercruise,
    WitchSpace,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::NormalSpace => write!(f, "normal space"),
            Environment::Supercruise => write!(f, "supercruise"),
            Environment::WitchSpace => write!(f, "witch space"),
        }
    }
}

/// A ship as events name it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipRef {
    pub local_id: i64,
    /// Internal model name
    pub model: String,
}

/// Galactic coordinates carried by jump and location events
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Political and economic state of a system as last reported
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemDetails {
    pub allegiance: Option<String>,
    pub faction: Option<String>,
    pub government: Option<String>,
    pub economy: Option<String>,
    pub security: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum Event {
    JumpStarted {
        timestamp: DateTime<Utc>,
        system: String,
        coordinates: Option<Coordinates>,
    },
    JumpCompleted {
        timestamp: DateTime<Utc>,
        system: String,
        coordinates: Option<Coordinates>,
        #[serde(flatten)]
        details: SystemDetails,
    },
    EnteredSupercruise {
        timestamp: DateTime<Utc>,
        system: Option<String>,
    },
    EnteredNormalSpace {
        timestamp: DateTime<Utc>,
        system: Option<String>,
        body: Option<String>,
    },
    Docked {
        timestamp: DateTime<Utc>,
        system: String,
        station: String,
        allegiance: Option<String>,
        faction: Option<String>,
        government: Option<String>,
        faction_state: Option<String>,
    },
    Undocked {
        timestamp: DateTime<Utc>,
        station: String,
    },
    ShipDelivered {
        timestamp: DateTime<Utc>,
        ship: ShipRef,
    },
    ShipSold {
        timestamp: DateTime<Utc>,
        ship: ShipRef,
    },
    ShipSwapped {
        timestamp: DateTime<Utc>,
        ship: ShipRef,
    },
    CommanderContinued {
        timestamp: DateTime<Utc>,
        commander: String,
        ship: ShipRef,
    },
    Location {
        timestamp: DateTime<Utc>,
        system: String,
        coordinates: Option<Coordinates>,
        station: Option<String>,
    },
}

impl Event {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::JumpStarted { timestamp, .. }
            | Event::JumpCompleted { timestamp, .. }
            | Event::EnteredSupercruise { timestamp, .. }
            | Event::EnteredNormalSpace { timestamp, .. }
            | Event::Docked { timestamp, .. }
            | Event::Undocked { timestamp, .. }
            | Event::ShipDelivered { timestamp, .. }
            | Event::ShipSold { timestamp, .. }
            | Event::ShipSwapped { timestamp, .. }
            | Event::CommanderContinued { timestamp, .. }
            | Event::Location { timestamp, .. } => *timestamp,
        }
    }

    /// Event kind, as it appears in the `event` tag
    pub fn name(&self) -> &'static str {
        match self {
            Event::JumpStarted { .. } => "JumpStarted",
            Event::JumpCompleted { .. } => "JumpCompleted",
            Event::EnteredSupercruise { .. } => "EnteredSupercruise",
            Event::EnteredNormalSpace { .. } => "EnteredNormalSpace",
            Event::Docked { .. } => "Docked",
            Event::Undocked { .. } => "Undocked",
            Event::ShipDelivered { .. } => "ShipDelivered",
            Event::ShipSold { .. } => "ShipSold",
            Event::ShipSwapped { .. } => "ShipSwapped",
            Event::CommanderContinued { .. } => "CommanderContinued",
            Event::Location { .. } => "Location",
        }
    }
}
