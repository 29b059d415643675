//! Profile decoding: raw `/profile` document to typed [`Profile`].
//!
//! Parsing is tolerant (see [`super::raw`]); this stage applies ordering and
//! fallback rules and collects diagnostics for anything the definition
//! tables do not know.

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::raw::{
    RawCargoItem, RawCommander, RawCommodity, RawModule, RawOutfittingModule, RawProfile,
    RawShip, RawSlot, RawStarport, RawStoredShip,
};
use super::{
    Cargo, Commander, Commodity, Compartment, Hardpoint, Module, Profile, Rating, Ship, Station,
    DEFAULT_TITLE,
};
use crate::definitions::Definitions;

/// Hardpoint size prefixes, largest first
const HARDPOINT_SIZES: [&str; 5] = ["Huge", "Large", "Medium", "Small", "Tiny"];
const MAX_HARDPOINT_INDEX: u32 = 11;

/// Core internal slots, keyed as the API names them
const ARMOUR: &str = "Armour";
const POWER_PLANT: &str = "PowerPlant";
const MAIN_ENGINES: &str = "MainEngines";
const FRAME_SHIFT_DRIVE: &str = "FrameShiftDrive";
const LIFE_SUPPORT: &str = "LifeSupport";
const POWER_DISTRIBUTOR: &str = "PowerDistributor";
const RADAR: &str = "Radar";
const FUEL_TANK: &str = "FuelTank";

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed profile document: {0}")]
    Malformed(String),

    #[error("profile document has no {0} section")]
    MissingSection(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    UnknownShip,
    UnknownModule,
    UnknownOutfitting,
    UnknownCommodity,
    ModifiedModule,
}

/// Something worth reporting so the definition tables can be corrected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// The raw JSON fragment concerned
    pub detail: String,
}

#[derive(Debug, Clone)]
pub struct DecodedProfile {
    pub profile: Profile,
    pub diagnostics: Vec<Diagnostic>,
}

/// Decodes profile documents.
///
/// Modified modules are only reported by the first successful decode; the
/// flag is carried here rather than process-wide so each decoder reports once.
pub struct ProfileDecoder {
    definitions: Arc<dyn Definitions>,
    report_modifications: bool,
}

impl ProfileDecoder {
    pub fn new(definitions: Arc<dyn Definitions>) -> Self {
        Self {
            definitions,
            report_modifications: true,
        }
    }

    /// Whether the next successful decode will report modified modules
    pub fn reports_modifications(&self) -> bool {
        self.report_modifications
    }

    pub fn decode(&mut self, body: &str) -> Result<DecodedProfile, DecodeError> {
        let raw: RawProfile =
            serde_json::from_str(body).map_err(|e| DecodeError::Malformed(e.to_string()))?;

        let mut pass = DecodePass {
            definitions: self.definitions.as_ref(),
            report_modifications: self.report_modifications,
            diagnostics: Vec::new(),
        };
        let profile = pass.profile(raw)?;

        self.report_modifications = false;

        Ok(DecodedProfile {
            profile,
            diagnostics: pass.diagnostics,
        })
    }
}

/// Convert a raw health value to a percentage.
///
/// Rounded to whole numbers, except below 5% where one decimal is kept.
/// Ties round to even.
pub fn health_percent(raw: f64) -> f64 {
    let raw = raw.round() as i64;
    if raw < 50_000 {
        round_half_even(raw, 1_000) as f64 / 10.0
    } else {
        round_half_even(raw, 10_000) as f64
    }
}

fn round_half_even(value: i64, divisor: i64) -> i64 {
    let quotient = value.div_euclid(divisor);
    let twice_remainder = value.rem_euclid(divisor) * 2;
    if twice_remainder > divisor || (twice_remainder == divisor && quotient % 2 != 0) {
        quotient + 1
    } else {
        quotient
    }
}

/// Slot size from a compartment key such as `Slot03_Size4`
pub fn compartment_size(slot: &str) -> Option<u8> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"Size([0-9]+)").expect("valid slot pattern"));

    pattern
        .captures(slot)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

struct DecodePass<'a> {
    definitions: &'a dyn Definitions,
    report_modifications: bool,
    diagnostics: Vec<Diagnostic>,
}

impl DecodePass<'_> {
    fn report(&mut self, kind: DiagnosticKind, detail: String) {
        self.diagnostics.push(Diagnostic { kind, detail });
    }

    fn profile(&mut self, raw: RawProfile) -> Result<Profile, DecodeError> {
        let commander = raw
            .commander
            .map(commander)
            .ok_or(DecodeError::MissingSection("commander"))?;

        let current_system = raw.last_system.and_then(|s| s.name);
        let ship = raw.ship.map(|s| self.ship(s));

        let current_id = ship.as_ref().map(|s| s.local_id);
        let shipyard = raw
            .ships
            .items::<RawStoredShip>()
            .into_iter()
            .filter(|stored| Some(stored.id) != current_id)
            .filter_map(|stored| self.stored_ship(stored))
            .collect();

        let last_station = raw
            .last_starport
            .map(|port| self.station(port, current_system.clone()));

        Ok(Profile {
            created_at: Utc::now(),
            commander,
            ship,
            shipyard,
            current_system,
            last_station,
        })
    }

    fn ship(&mut self, raw: RawShip) -> Ship {
        let model = self.ship_model(&raw.name);

        let mut ship = Ship {
            local_id: raw.id,
            model,
            ed_model: raw.name,
            value: raw.value.hull + raw.value.modules,
            cargo_capacity: raw.cargo.capacity,
            cargo_carried: raw.cargo.qty,
            health: health_percent(raw.health.hull),
            fuel_tank_capacity: raw.fuel.main.capacity,
            ..Default::default()
        };

        let modules = &raw.modules;
        ship.bulkheads = self.slot_module(modules, ARMOUR);
        ship.power_plant = self.slot_module(modules, POWER_PLANT);
        ship.thrusters = self.slot_module(modules, MAIN_ENGINES);
        ship.frame_shift_drive = self.slot_module(modules, FRAME_SHIFT_DRIVE);
        ship.life_support = self.slot_module(modules, LIFE_SUPPORT);
        ship.power_distributor = self.slot_module(modules, POWER_DISTRIBUTOR);
        ship.sensors = self.slot_module(modules, RADAR);
        ship.fuel_tank = self.slot_module(modules, FUEL_TANK);

        // Size class first, then slot index
        for (i, size) in HARDPOINT_SIZES.iter().enumerate() {
            for index in 1..=MAX_HARDPOINT_INDEX {
                let slot = format!("{}Hardpoint{}", size, index);
                if modules.contains_key(&slot) {
                    let module = self.slot_module(modules, &slot);
                    ship.hardpoints.push(Hardpoint {
                        size: (HARDPOINT_SIZES.len() - 1 - i) as u8,
                        slot,
                        module,
                    });
                }
            }
        }

        for slot in modules.keys().filter(|k| k.contains("Slot")) {
            if let Some(size) = compartment_size(slot) {
                let module = self.slot_module(modules, slot);
                ship.compartments.push(Compartment {
                    slot: slot.clone(),
                    size,
                    module,
                });
            }
        }

        ship.cargo = raw
            .cargo
            .items
            .items::<RawCargoItem>()
            .into_iter()
            .filter_map(|item| self.cargo(item))
            .collect();

        ship
    }

    fn ship_model(&mut self, ed_name: &str) -> Option<String> {
        let model = self.definitions.ship_model(ed_name);
        if model.is_none() {
            self.report(DiagnosticKind::UnknownShip, ed_name.to_string());
        }
        model
    }

    fn slot_module(&mut self, modules: &Map<String, Value>, slot: &str) -> Option<Module> {
        let value = modules.get(slot)?;
        let raw_slot = RawSlot::deserialize(value).unwrap_or_default();
        raw_slot.module.map(|m| self.module(slot, m))
    }

    fn module(&mut self, slot: &str, raw: RawModule) -> Module {
        let definition = self.definitions.module(raw.id);
        if definition.is_none() {
            self.report(
                DiagnosticKind::UnknownModule,
                format!("{}: {}", slot, module_json(&raw)),
            );
        }

        let modified = raw.modifiers.is_some();
        if modified && self.report_modifications {
            self.report(
                DiagnosticKind::ModifiedModule,
                format!("{}: {}", slot, module_json(&raw)),
            );
        }

        let (name, class, grade) = match definition {
            Some(d) => (Some(d.name), d.class, d.grade),
            None => (None, None, None),
        };

        Module {
            id: raw.id,
            ed_name: raw.name,
            name,
            class,
            grade,
            price: raw.value,
            enabled: raw.on,
            priority: raw.priority,
            health: health_percent(raw.health),
            modified,
        }
    }

    fn cargo(&mut self, raw: RawCargoItem) -> Option<Cargo> {
        let ed_name = raw.commodity?;

        let commodity = match self.definitions.commodity_by_name(&ed_name) {
            Some(definition) => Commodity {
                id: definition.id,
                ed_name: definition.ed_name,
                name: Some(definition.name),
                category: definition.category,
                ..Default::default()
            },
            None => {
                self.report(
                    DiagnosticKind::UnknownCommodity,
                    format!("cargo {} x{} worth {}", ed_name, raw.qty, raw.value),
                );
                Commodity {
                    ed_name,
                    ..Default::default()
                }
            }
        };

        let price = if raw.qty > 0 {
            raw.value / i64::from(raw.qty)
        } else {
            0
        };

        Some(Cargo {
            commodity,
            amount: raw.qty,
            price,
        })
    }

    fn stored_ship(&mut self, raw: RawStoredShip) -> Option<Ship> {
        // Only ships docked somewhere are stored; the rest are in transit
        let star_system = raw.starsystem.and_then(|s| s.name)?;
        let model = self.ship_model(&raw.name);

        Some(Ship {
            local_id: raw.id,
            ed_model: raw.name,
            model,
            star_system: Some(star_system),
            station: raw.station.and_then(|s| s.name),
            ..Default::default()
        })
    }

    fn station(&mut self, raw: RawStarport, system_name: Option<String>) -> Station {
        let outfitting = raw
            .modules
            .items::<RawOutfittingModule>()
            .into_iter()
            .filter(|m| m.category == "weapon" || m.category == "module")
            .map(|m| self.outfitting_module(m))
            .collect();

        let commodities = raw
            .commodities
            .items::<RawCommodity>()
            .into_iter()
            .map(|c| self.commodity(c))
            .collect();

        Station {
            outfitting,
            commodities,
            // Ships for sale are not part of the profile document
            shipyard: Vec::new(),
            ..Station::named(raw.name, system_name)
        }
    }

    fn outfitting_module(&mut self, raw: RawOutfittingModule) -> Module {
        let definition = self.definitions.module(raw.id);
        if definition.is_none() {
            self.report(
                DiagnosticKind::UnknownOutfitting,
                format!("{} ({}) {}", raw.id, raw.category, raw.name),
            );
        }

        let (name, class, grade) = match definition {
            Some(d) => (Some(d.name), d.class, d.grade),
            None => (None, None, None),
        };

        Module {
            id: raw.id,
            ed_name: raw.name,
            name,
            class,
            grade,
            price: raw.cost,
            enabled: true,
            health: 100.0,
            ..Default::default()
        }
    }

    fn commodity(&mut self, raw: RawCommodity) -> Commodity {
        let (name, ed_name, category) = match self.definitions.commodity_by_id(raw.id) {
            Some(d) => (Some(d.name), d.ed_name, d.category.or(raw.category)),
            None => {
                self.report(
                    DiagnosticKind::UnknownCommodity,
                    format!("{} {}", raw.id, raw.name),
                );
                (None, raw.name, raw.category)
            }
        };

        Commodity {
            id: Some(raw.id),
            ed_name,
            name,
            category,
            avg_price: raw.mean_price.round() as i64,
            buy_price: raw.buy_price.round() as i64,
            sell_price: raw.sell_price.round() as i64,
            stock: raw.stock.round() as i64,
            stock_bracket: bracket(&raw.stock_bracket),
            demand: raw.demand.round() as i64,
            demand_bracket: bracket(&raw.demand_bracket),
            status_flags: raw.status_flags,
        }
    }
}

fn commander(raw: RawCommander) -> Commander {
    Commander {
        name: raw.name,
        combat_rating: Rating::combat(raw.rank.combat),
        trade_rating: Rating::trade(raw.rank.trade),
        exploration_rating: Rating::exploration(raw.rank.explore),
        empire_rating: Rating::empire(raw.rank.empire),
        federation_rating: Rating::federation(raw.rank.federation),
        credits: raw.credits,
        debt: raw.debt,
        title: DEFAULT_TITLE.to_string(),
    }
}

/// Brackets arrive as a number, a numeric string, or `""` when unknown
fn bracket(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn module_json(raw: &RawModule) -> String {
    serde_json::json!({
        "id": raw.id,
        "name": raw.name,
        "modifiers": raw.modifiers,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::{CommodityDefinition, ModuleDefinition, StaticDefinitions};
    use serde_json::json;

    fn decoder() -> ProfileDecoder {
        let definitions = StaticDefinitions::builtin()
            .with_module(
                128049250,
                ModuleDefinition {
                    name: "Sidewinder Armour".into(),
                    class: Some(1),
                    grade: Some("I".into()),
                },
            )
            .with_commodity(CommodityDefinition {
                id: Some(128049202),
                ed_name: "HydrogenFuel".into(),
                name: "Hydrogen Fuel".into(),
                category: Some("Chemicals".into()),
            });
        ProfileDecoder::new(Arc::new(definitions))
    }

    fn module(id: i64) -> Value {
        json!({ "module": { "id": id, "name": "m", "value": 100, "on": true, "priority": 1, "health": 1000000 } })
    }

    fn document(modules: Value) -> String {
        json!({
            "commander": { "name": "Jameson", "rank": { "federation": 2 }, "credits": 1000, "debt": 0 },
            "lastSystem": { "name": "Lave" },
            "ship": { "name": "SideWinder", "id": 7, "health": { "hull": 820000 }, "modules": modules },
            "ships": []
        })
        .to_string()
    }

    #[test]
    fn test_health_rounding() {
        assert_eq!(health_percent(45000.0), 4.5);
        assert_eq!(health_percent(820000.0), 82.0);
        assert_eq!(health_percent(44400.0), 4.4);
        assert_eq!(health_percent(1000000.0), 100.0);
        assert_eq!(health_percent(0.0), 0.0);
    }

    #[test]
    fn test_health_ties_round_to_even() {
        assert_eq!(health_percent(825000.0), 82.0);
        assert_eq!(health_percent(835000.0), 84.0);
        assert_eq!(health_percent(500.0), 0.0);
        assert_eq!(health_percent(2500.0), 0.2);
        assert_eq!(health_percent(4500.0), 0.4);
        assert_eq!(health_percent(49999.0), 5.0);
    }

    #[test]
    fn test_hardpoint_ordering() {
        let mut decoder = decoder();
        let body = document(json!({
            "SmallHardpoint2": module(1),
            "HugeHardpoint1": module(2),
            "MediumHardpoint1": module(3),
            "TinyHardpoint1": [],
        }));

        let ship = decoder.decode(&body).unwrap().profile.ship.unwrap();
        let slots: Vec<&str> = ship.hardpoints.iter().map(|h| h.slot.as_str()).collect();
        assert_eq!(
            slots,
            vec!["HugeHardpoint1", "MediumHardpoint1", "SmallHardpoint2", "TinyHardpoint1"]
        );
        assert_eq!(ship.hardpoints[0].size, 4);
        assert_eq!(ship.hardpoints[2].size, 1);
        assert!(ship.hardpoints[3].module.is_none());
    }

    #[test]
    fn test_compartments_in_document_order() {
        let mut decoder = decoder();
        let body = document(json!({
            "Slot01_Size4": module(10),
            "Slot02_Size2": module(11),
            "Slot03_Size2": {},
        }));

        let ship = decoder.decode(&body).unwrap().profile.ship.unwrap();
        let sizes: Vec<u8> = ship.compartments.iter().map(|c| c.size).collect();
        assert_eq!(sizes, vec![4, 2, 2]);
        assert!(ship.compartments[2].module.is_none());
    }

    #[test]
    fn test_unknown_module_kept_without_name() {
        let mut decoder = decoder();
        let body = document(json!({
            "Armour": module(128049250),
            "PowerPlant": module(999),
        }));

        let decoded = decoder.decode(&body).unwrap();
        let ship = decoded.profile.ship.unwrap();
        assert_eq!(ship.bulkheads.unwrap().name.as_deref(), Some("Sidewinder Armour"));

        let plant = ship.power_plant.unwrap();
        assert_eq!(plant.id, 999);
        assert!(plant.name.is_none());
        assert_eq!(plant.health, 100.0);
        assert!(decoded
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::UnknownModule && d.detail.contains("PowerPlant")));
    }

    #[test]
    fn test_modified_modules_reported_once() {
        let mut decoder = decoder();
        let body = document(json!({
            "Armour": { "module": { "id": 128049250, "name": "a", "health": 1000000, "modifiers": { "id": 1 } } }
        }));

        assert!(decoder.reports_modifications());
        let first = decoder.decode(&body).unwrap();
        assert!(first.diagnostics.iter().any(|d| d.kind == DiagnosticKind::ModifiedModule));
        assert!(!decoder.reports_modifications());

        let second = decoder.decode(&body).unwrap();
        assert!(second.diagnostics.iter().all(|d| d.kind != DiagnosticKind::ModifiedModule));
        assert!(second.profile.ship.unwrap().bulkheads.unwrap().modified);
    }

    #[test]
    fn test_failed_decode_keeps_modification_flag() {
        let mut decoder = decoder();
        assert!(decoder.decode("{ not json").is_err());
        assert!(matches!(
            decoder.decode("{}"),
            Err(DecodeError::MissingSection("commander"))
        ));
        assert!(decoder.reports_modifications());
    }

    #[test]
    fn test_missing_sections_decode_to_empty() {
        let mut decoder = decoder();
        let body = json!({
            "commander": { "name": "Jameson" },
            "lastStarport": { "name": "Lave Station" }
        })
        .to_string();

        let profile = decoder.decode(&body).unwrap().profile;
        assert!(profile.ship.is_none());
        assert!(profile.shipyard.is_empty());
        assert!(profile.current_system.is_none());

        let station = profile.last_station.unwrap();
        assert_eq!(station.name, "Lave Station");
        assert!(station.outfitting.is_empty());
        assert!(station.commodities.is_empty());
    }

    #[test]
    fn test_cargo_and_unknown_commodity() {
        let mut decoder = decoder();
        let body = json!({
            "commander": { "name": "Jameson" },
            "ship": {
                "name": "SideWinder", "id": 1,
                "cargo": { "capacity": 4, "qty": 3, "items": [
                    { "commodity": "HydrogenFuel", "qty": 2, "value": 200 },
                    { "commodity": "Unobtainium", "qty": 1, "value": 50 },
                    { "commodity": "Nothing", "qty": 0, "value": 0 },
                    null
                ] }
            }
        })
        .to_string();

        let decoded = decoder.decode(&body).unwrap();
        let cargo = decoded.profile.ship.unwrap().cargo;
        assert_eq!(cargo.len(), 3);
        assert_eq!(cargo[0].commodity.name.as_deref(), Some("Hydrogen Fuel"));
        assert_eq!(cargo[0].price, 100);
        assert!(cargo[1].commodity.name.is_none());
        assert_eq!(cargo[1].commodity.ed_name, "Unobtainium");
        assert_eq!(cargo[2].price, 0);
        assert!(decoded
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::UnknownCommodity && d.detail.contains("Unobtainium")));
    }

    #[test]
    fn test_shipyard_excludes_current_and_in_transit() {
        let mut decoder = decoder();
        let body = json!({
            "commander": { "name": "Jameson" },
            "ship": { "name": "SideWinder", "id": 7 },
            "ships": {
                "0": { "id": 7, "name": "SideWinder", "starsystem": { "name": "Lave" }, "station": { "name": "Lave Station" } },
                "1": { "id": 8, "name": "Anaconda", "starsystem": { "name": "Diso" }, "station": { "name": "Shifnalport" } },
                "2": { "id": 9, "name": "Python" }
            }
        })
        .to_string();

        let shipyard = decoder.decode(&body).unwrap().profile.shipyard;
        assert_eq!(shipyard.len(), 1);
        assert_eq!(shipyard[0].local_id, 8);
        assert_eq!(shipyard[0].model.as_deref(), Some("Anaconda"));
        assert_eq!(shipyard[0].star_system.as_deref(), Some("Diso"));
        assert_eq!(shipyard[0].station.as_deref(), Some("Shifnalport"));
    }

    #[test]
    fn test_station_market_and_outfitting() {
        let mut decoder = decoder();
        let body = json!({
            "commander": { "name": "Jameson" },
            "lastSystem": { "name": "Lave" },
            "lastStarport": {
                "name": "Lave Station",
                "modules": {
                    "128049250": { "id": 128049250, "category": "module", "name": "SideWinder_Armour_Grade1", "cost": 0 },
                    "128066428": { "id": 128066428, "category": "paintjob", "name": "paintjob_x", "cost": 10 },
                    "128049500": { "id": 128049500, "category": "weapon", "name": "Hpt_Pulse", "cost": 2200 }
                },
                "commodities": [
                    { "id": 128049202, "name": "HydrogenFuel", "categoryname": "Chemicals", "meanPrice": 110,
                      "buyPrice": 105, "sellPrice": 100, "stock": 5000.0, "stockBracket": 2, "demand": 1,
                      "demandBracket": "", "statusFlags": ["rare"] }
                ]
            }
        })
        .to_string();

        let decoded = decoder.decode(&body).unwrap();
        let station = decoded.profile.last_station.unwrap();
        assert_eq!(station.system_name.as_deref(), Some("Lave"));
        assert_eq!(station.outfitting.len(), 2);
        assert_eq!(station.outfitting[0].price, 0);
        assert!(station.outfitting[1].name.is_none());
        assert!(decoded.diagnostics.iter().any(|d| d.kind == DiagnosticKind::UnknownOutfitting));

        let fuel = &station.commodities[0];
        assert_eq!(fuel.name.as_deref(), Some("Hydrogen Fuel"));
        assert_eq!(fuel.stock, 5000);
        assert_eq!(fuel.stock_bracket, Some(2));
        assert_eq!(fuel.demand_bracket, None);
        assert_eq!(fuel.status_flags, vec!["rare".to_string()]);
    }

    #[test]
    fn test_commander_ranks() {
        let mut decoder = decoder();
        let profile = decoder.decode(&document(json!({}))).unwrap().profile;
        assert_eq!(profile.commander.name.as_deref(), Some("Jameson"));
        assert_eq!(profile.commander.federation_rating.name, "Cadet");
        assert_eq!(profile.commander.credits, 1000);
        assert_eq!(profile.commander.title, DEFAULT_TITLE);
        assert_eq!(profile.current_system.as_deref(), Some("Lave"));

        let ship = profile.ship.unwrap();
        assert_eq!(ship.health, 82.0);
        assert_eq!(ship.model.as_deref(), Some("Sidewinder"));
    }
}
