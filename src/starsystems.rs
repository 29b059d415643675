//! Star Systems Module
//!
//! Lookup-or-create store for star systems the commander has been in.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::profile::Station;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StarSystem {
    pub name: String,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub allegiance: Option<String>,
    pub faction: Option<String>,
    pub government: Option<String>,
    pub economy: Option<String>,
    pub security: Option<String>,
    pub visits: u32,
    pub last_visit: Option<DateTime<Utc>>,
    /// Light years to the home system
    pub distance_from_home: Option<f64>,
    pub stations: Vec<Station>,
}

impl StarSystem {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn coordinates(&self) -> Option<(f64, f64, f64)> {
        Some((self.x?, self.y?, self.z?))
    }

    /// Euclidean distance rounded to two decimals; unset without coordinates
    pub fn distance_to(&self, other: &StarSystem) -> Option<f64> {
        let (x1, y1, z1) = self.coordinates()?;
        let (x2, y2, z2) = other.coordinates()?;
        let distance = ((x1 - x2).powi(2) + (y1 - y2).powi(2) + (z1 - z2).powi(2)).sqrt();
        Some((distance * 100.0).round() / 100.0)
    }

    pub fn station(&self, name: &str) -> Option<&Station> {
        self.stations.iter().find(|s| s.name == name)
    }

    /// Insert or replace a station by name
    pub fn upsert_station(&mut self, station: Station) {
        match self.stations.iter_mut().find(|s| s.name == station.name) {
            Some(existing) => *existing = station,
            None => self.stations.push(station),
        }
    }
}

/// Star system persistence, as far as the synchronizer needs it
pub trait StarSystemRepository: Send + Sync {
    /// The stored system, or a fresh record carrying only the name
    fn get_or_create(&self, name: &str) -> StarSystem;

    fn save(&self, system: &StarSystem);
}

/// Repository that keeps systems for the life of the process
#[derive(Debug, Default)]
pub struct InMemoryStarSystems {
    systems: Mutex<HashMap<String, StarSystem>>,
}

impl InMemoryStarSystems {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, StarSystem>> {
        self.systems.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StarSystemRepository for InMemoryStarSystems {
    fn get_or_create(&self, name: &str) -> StarSystem {
        self.lock()
            .get(name)
            .cloned()
            .unwrap_or_else(|| StarSystem::named(name))
    }

    fn save(&self, system: &StarSystem) {
        self.lock().insert(system.name.clone(), system.clone());
    }
}
