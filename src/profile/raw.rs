//! Schema of the `/profile` document as the companion API sends it.
//!
//! Field names follow the wire format exactly. Everything optional defaults
//! so that missing sections parse; turning this tree into domain records is
//! the decoder's job.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct RawProfile {
    pub commander: Option<RawCommander>,
    #[serde(rename = "lastSystem")]
    pub last_system: Option<RawNamed>,
    #[serde(rename = "lastStarport")]
    pub last_starport: Option<RawStarport>,
    pub ship: Option<RawShip>,
    #[serde(default)]
    pub ships: RawCollection,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawNamed {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawCommander {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rank: RawRanks,
    #[serde(default)]
    pub credits: i64,
    #[serde(default)]
    pub debt: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawRanks {
    #[serde(default)]
    pub combat: u8,
    #[serde(default)]
    pub trade: u8,
    #[serde(default)]
    pub explore: u8,
    #[serde(default)]
    pub empire: u8,
    #[serde(default)]
    pub federation: u8,
}

#[derive(Debug, Deserialize)]
pub struct RawShip {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub value: RawShipValue,
    #[serde(default)]
    pub health: RawShipHealth,
    #[serde(default)]
    pub cargo: RawShipCargo,
    #[serde(default)]
    pub fuel: RawFuel,
    /// Slot name to slot contents, in document order
    #[serde(default)]
    pub modules: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawShipValue {
    #[serde(default)]
    pub hull: i64,
    #[serde(default)]
    pub modules: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawShipHealth {
    #[serde(default)]
    pub hull: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawShipCargo {
    #[serde(default)]
    pub capacity: i32,
    #[serde(default)]
    pub qty: i32,
    #[serde(default)]
    pub items: RawCollection,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawFuel {
    #[serde(default)]
    pub main: RawFuelTank,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawFuelTank {
    #[serde(default)]
    pub capacity: f64,
}

#[derive(Debug, Deserialize)]
pub struct RawCargoItem {
    pub commodity: Option<String>,
    #[serde(default)]
    pub qty: i32,
    #[serde(default)]
    pub value: i64,
}

/// Contents of a ship slot; empty slots have no `module`
#[derive(Debug, Default, Deserialize)]
pub struct RawSlot {
    #[serde(default)]
    pub module: Option<RawModule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawModule {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: i64,
    #[serde(default)]
    pub on: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub health: f64,
    #[serde(default)]
    pub modifiers: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RawStarport {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub modules: RawCollection,
    #[serde(default)]
    pub commodities: RawCollection,
}

#[derive(Debug, Deserialize)]
pub struct RawOutfittingModule {
    pub id: i64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cost: i64,
}

#[derive(Debug, Deserialize)]
pub struct RawCommodity {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "categoryname", alias = "categoryName")]
    pub category: Option<String>,
    #[serde(default, rename = "meanPrice")]
    pub mean_price: f64,
    #[serde(default, rename = "buyPrice")]
    pub buy_price: f64,
    #[serde(default, rename = "sellPrice")]
    pub sell_price: f64,
    #[serde(default)]
    pub stock: f64,
    #[serde(default, rename = "stockBracket")]
    pub stock_bracket: Value,
    #[serde(default)]
    pub demand: f64,
    #[serde(default, rename = "demandBracket")]
    pub demand_bracket: Value,
    #[serde(default, rename = "statusFlags")]
    pub status_flags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawStoredShip {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub starsystem: Option<RawNamed>,
    #[serde(default)]
    pub station: Option<RawNamed>,
}

/// A collection the API sends either as an array or as an object keyed by
/// index or id
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawCollection {
    List(Vec<Value>),
    Keyed(Map<String, Value>),
    Absent(()),
}

impl Default for RawCollection {
    fn default() -> Self {
        RawCollection::List(Vec::new())
    }
}

impl RawCollection {
    /// Entries that parse as `T`, in document order; nulls and entries of
    /// another shape are skipped
    pub fn items<T: DeserializeOwned>(&self) -> Vec<T> {
        let values: Box<dyn Iterator<Item = &Value>> = match self {
            RawCollection::List(values) => Box::new(values.iter()),
            RawCollection::Keyed(map) => Box::new(map.values()),
            RawCollection::Absent(()) => Box::new(std::iter::empty()),
        };

        values
            .filter(|v| !v.is_null())
            .filter_map(|v| T::deserialize(v).ok())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RawCollection::List(values) => values.is_empty(),
            RawCollection::Keyed(map) => map.is_empty(),
            RawCollection::Absent(()) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Entry {
        id: i64,
    }

    #[test]
    fn test_collection_accepts_list_and_map() {
        let list: RawCollection = serde_json::from_value(json!([{ "id": 1 }, null, { "id": 2 }])).unwrap();
        assert_eq!(list.items::<Entry>(), vec![Entry { id: 1 }, Entry { id: 2 }]);

        let keyed: RawCollection =
            serde_json::from_value(json!({ "0": { "id": 7 }, "1": { "nope": true } })).unwrap();
        assert_eq!(keyed.items::<Entry>(), vec![Entry { id: 7 }]);

        let null: RawCollection = serde_json::from_value(json!(null)).unwrap();
        assert!(null.is_empty());
    }

    #[test]
    fn test_missing_sections_parse() {
        let raw: RawProfile = serde_json::from_value(json!({
            "commander": { "name": "Jameson" }
        }))
        .unwrap();

        assert!(raw.ship.is_none());
        assert!(raw.last_starport.is_none());
        assert!(raw.ships.is_empty());
        assert_eq!(raw.commander.unwrap().rank.federation, 0);
    }
}
