//! Definitions Module
//!
//! Lookups from the game's internal identifiers to human-readable names.
//! The full tables are maintained elsewhere; misses are reported, not fatal.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDefinition {
    pub name: String,
    pub class: Option<u8>,
    pub grade: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommodityDefinition {
    pub id: Option<i64>,
    pub ed_name: String,
    pub name: String,
    pub category: Option<String>,
}

/// Definition lookups used while decoding a profile
pub trait Definitions: Send + Sync {
    /// Human-readable model for an internal ship name
    fn ship_model(&self, ed_name: &str) -> Option<String>;

    fn module(&self, id: i64) -> Option<ModuleDefinition>;

    fn commodity_by_id(&self, id: i64) -> Option<CommodityDefinition>;

    fn commodity_by_name(&self, ed_name: &str) -> Option<CommodityDefinition>;
}

const SHIP_MODELS: &[(&str, &str)] = &[
    ("Adder", "Adder"),
    ("Anaconda", "Anaconda"),
    ("Asp", "Asp Explorer"),
    ("Asp_Scout", "Asp Scout"),
    ("CobraMkIII", "Cobra Mk. III"),
    ("CobraMkIV", "Cobra Mk. IV"),
    ("Cutter", "Imperial Cutter"),
    ("DiamondBack", "Diamondback Scout"),
    ("DiamondBackXL", "Diamondback Explorer"),
    ("Eagle", "Eagle"),
    ("Empire_Courier", "Imperial Courier"),
    ("Empire_Eagle", "Imperial Eagle"),
    ("Empire_Fighter", "Imperial Fighter"),
    ("Empire_Trader", "Imperial Clipper"),
    ("Federation_Corvette", "Federal Corvette"),
    ("Federation_Dropship", "Federal Dropship"),
    ("Federation_Dropship_MkII", "Federal Assault Ship"),
    ("Federation_Gunship", "Federal Gunship"),
    ("Federation_Fighter", "F63 Condor"),
    ("FerDeLance", "Fer-de-Lance"),
    ("Hauler", "Hauler"),
    ("Independant_Trader", "Keelback"),
    ("Orca", "Orca"),
    ("Python", "Python"),
    ("SideWinder", "Sidewinder"),
    ("Type6", "Type-6 Transporter"),
    ("Type7", "Type-7 Transporter"),
    ("Type9", "Type-9 Heavy"),
    ("Viper", "Viper Mk. III"),
    ("Viper_MkIV", "Viper Mk. IV"),
    ("Vulture", "Vulture"),
];

/// In-memory definition tables
#[derive(Debug, Clone, Default)]
pub struct StaticDefinitions {
    /// Keyed by lowercased internal name; the API is inconsistent about case
    ships: HashMap<String, String>,
    modules: HashMap<i64, ModuleDefinition>,
    commodities: Vec<CommodityDefinition>,
}

impl StaticDefinitions {
    /// Tables with the known ship models and nothing else
    pub fn builtin() -> Self {
        let mut definitions = Self::default();
        for (ed_name, model) in SHIP_MODELS {
            definitions = definitions.with_ship(ed_name, model);
        }
        definitions
    }

    pub fn with_ship(mut self, ed_name: &str, model: &str) -> Self {
        self.ships.insert(ed_name.to_lowercase(), model.to_string());
        self
    }

    pub fn with_module(mut self, id: i64, definition: ModuleDefinition) -> Self {
        self.modules.insert(id, definition);
        self
    }

    pub fn with_commodity(mut self, definition: CommodityDefinition) -> Self {
        self.commodities.push(definition);
        self
    }
}

impl Definitions for StaticDefinitions {
    fn ship_model(&self, ed_name: &str) -> Option<String> {
        self.ships.get(&ed_name.to_lowercase()).cloned()
    }

    fn module(&self, id: i64) -> Option<ModuleDefinition> {
        self.modules.get(&id).cloned()
    }

    fn commodity_by_id(&self, id: i64) -> Option<CommodityDefinition> {
        self.commodities.iter().find(|c| c.id == Some(id)).cloned()
    }

    fn commodity_by_name(&self, ed_name: &str) -> Option<CommodityDefinition> {
        self.commodities
            .iter()
            .find(|c| c.ed_name.eq_ignore_ascii_case(ed_name))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ship_lookup_ignores_case() {
        let definitions = StaticDefinitions::builtin();
        assert_eq!(definitions.ship_model("CobraMkIII").as_deref(), Some("Cobra Mk. III"));
        assert_eq!(definitions.ship_model("federation_dropship").as_deref(), Some("Federal Dropship"));
        assert!(definitions.ship_model("Krait").is_none());
    }

    #[test]
    fn test_commodity_lookup() {
        let definitions = StaticDefinitions::default().with_commodity(CommodityDefinition {
            id: Some(128049202),
            ed_name: "HydrogenFuel".into(),
            name: "Hydrogen Fuel".into(),
            category: Some("Chemicals".into()),
        });

        assert_eq!(definitions.commodity_by_id(128049202).unwrap().name, "Hydrogen Fuel");
        assert!(definitions.commodity_by_name("hydrogenfuel").is_some());
        assert!(definitions.commodity_by_id(1).is_none());
    }
}
