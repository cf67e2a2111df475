//! Cellar inventory: wines, the bottle lots that hold them, and the
//! read-only views the menu pipeline takes over them.

pub mod data_loader;
pub mod snapshot;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub use data_loader::load_cellar_csv;
pub use snapshot::{build_inventory_snapshot, InventorySnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WineId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WineType {
    Red,
    White,
    Rose,
    Sparkling,
    Dessert,
    Fortified,
}

impl WineType {
    pub const ALL: [WineType; 6] = [
        WineType::Red,
        WineType::White,
        WineType::Rose,
        WineType::Sparkling,
        WineType::Dessert,
        WineType::Fortified,
    ];

    /// Accepts English and Italian labels as they appear in cellar exports.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "red" | "rosso" | "rossi" => Some(WineType::Red),
            "white" | "bianco" | "bianchi" => Some(WineType::White),
            "rose" | "rosé" | "rosato" | "rosati" => Some(WineType::Rose),
            "sparkling" | "spumante" | "spumanti" | "bollicine" => Some(WineType::Sparkling),
            "dessert" | "sweet" | "dolce" | "passito" => Some(WineType::Dessert),
            "fortified" | "fortificato" | "liquoroso" => Some(WineType::Fortified),
            _ => None,
        }
    }

    /// Best guess from free text such as a generated pairing. Checked in an
    /// order where more specific styles win over plain colours.
    pub fn infer_from_text(text: &str) -> Option<Self> {
        let lowered = text.to_lowercase();
        const KEYWORDS: &[(WineType, &[&str])] = &[
            (
                WineType::Sparkling,
                &["spumante", "sparkling", "champagne", "prosecco", "franciacorta", "cava", "crémant", "cremant", "metodo classico", "brut"],
            ),
            (WineType::Fortified, &["port", "porto", "sherry", "marsala", "madeira", "fortified"]),
            (WineType::Dessert, &["passito", "moscato", "sauternes", "dessert", "vin santo", "recioto", "icewine"]),
            (WineType::Rose, &["rosé", "rose", "rosato", "cerasuolo"]),
            (
                WineType::White,
                &["bianco", "white", "chardonnay", "sauvignon", "vermentino", "verdicchio", "riesling", "soave", "fiano", "greco", "falanghina", "pinot grigio", "gewürztraminer"],
            ),
            (
                WineType::Red,
                &["rosso", "red", "barolo", "barbaresco", "chianti", "brunello", "nebbiolo", "sangiovese", "primitivo", "aglianico", "amarone", "merlot", "cabernet", "pinot nero", "pinot noir", "syrah", "montepulciano", "nero d'avola"],
            ),
        ];
        KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| contains_word(&lowered, w)))
            .map(|(wine_type, _)| *wine_type)
    }

    pub fn label(&self) -> &'static str {
        match self {
            WineType::Red => "red",
            WineType::White => "white",
            WineType::Rose => "rosé",
            WineType::Sparkling => "sparkling",
            WineType::Dessert => "dessert",
            WineType::Fortified => "fortified",
        }
    }

    /// Serving range in degrees Celsius, inclusive.
    pub fn serving_temperature_c(&self) -> (u8, u8) {
        match self {
            WineType::Sparkling => (6, 8),
            WineType::White => (8, 12),
            WineType::Rose => (10, 12),
            WineType::Dessert => (10, 14),
            WineType::Fortified => (14, 16),
            WineType::Red => (16, 18),
        }
    }
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[start + needle.len()..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

impl fmt::Display for WineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wine {
    pub id: WineId,
    pub producer: String,
    pub name: String,
    pub vintage: Option<u16>,
    pub wine_type: WineType,
    pub region: Option<String>,
    pub grape: Option<String>,
}

impl Wine {
    /// `"{producer} {name}"`, the string pairings are matched against.
    pub fn display_name(&self) -> String {
        match (self.producer.trim(), self.name.trim()) {
            ("", name) => name.to_string(),
            (producer, "") => producer.to_string(),
            (producer, name) => format!("{} {}", producer, name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottle {
    pub wine_id: WineId,
    pub quantity: u32,
    pub location: Option<String>,
}

/// Owns the inventory. The menu pipeline only ever borrows it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cellar {
    pub wines: Vec<Wine>,
    pub bottles: Vec<Bottle>,
}

/// A wine together with its summed bottle quantity.
#[derive(Debug, Clone, Copy)]
pub struct StockedWine<'a> {
    pub wine: &'a Wine,
    pub quantity: u32,
}

impl Cellar {
    pub fn new(wines: Vec<Wine>, bottles: Vec<Bottle>) -> Self {
        Self { wines, bottles }
    }

    pub fn is_empty(&self) -> bool {
        self.wines.is_empty()
    }

    pub fn wine(&self, id: WineId) -> Option<&Wine> {
        self.wines.iter().find(|w| w.id == id)
    }

    pub fn quantity_of(&self, id: WineId) -> u32 {
        self.bottles
            .iter()
            .filter(|b| b.wine_id == id)
            .map(|b| b.quantity)
            .sum()
    }

    /// Human-readable locations, e.g. `"Rack A (3), Fridge (1)"`. Lots
    /// without a location are grouped under "unassigned".
    pub fn location_summary(&self, id: WineId) -> String {
        let mut per_location: Vec<(String, u32)> = Vec::new();
        for bottle in self.bottles.iter().filter(|b| b.wine_id == id && b.quantity > 0) {
            let location = bottle
                .location
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .unwrap_or("unassigned")
                .to_string();
            match per_location.iter_mut().find(|(l, _)| *l == location) {
                Some((_, qty)) => *qty += bottle.quantity,
                None => per_location.push((location, bottle.quantity)),
            }
        }
        per_location
            .iter()
            .map(|(location, qty)| format!("{} ({})", location, qty))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Wines with at least one bottle on hand, in inventory order.
    pub fn in_stock(&self) -> Vec<StockedWine<'_>> {
        let mut totals: HashMap<WineId, u32> = HashMap::new();
        for bottle in &self.bottles {
            *totals.entry(bottle.wine_id).or_insert(0) += bottle.quantity;
        }
        self.wines
            .iter()
            .filter_map(|wine| {
                let quantity = totals.get(&wine.id).copied().unwrap_or(0);
                (quantity > 0).then_some(StockedWine { wine, quantity })
            })
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_in_stock_skips_empty_lots() {
        let cellar = sample_cellar();
        let stocked: Vec<(u32, u32)> = cellar.in_stock().iter().map(|s| (s.wine.id.0, s.quantity)).collect();
        assert_eq!(stocked, vec![(1, 3), (2, 3), (3, 1)]);
    }

    #[test]
    fn test_location_summary_groups_lots() {
        let cellar = sample_cellar();
        assert_eq!(cellar.location_summary(WineId(1)), "Rack A (2), Fridge (1)");
        assert_eq!(cellar.location_summary(WineId(3)), "unassigned (1)");
        assert_eq!(cellar.location_summary(WineId(4)), "");
    }

    #[test]
    fn test_infer_type_prefers_specific_styles() {
        assert_eq!(WineType::infer_from_text("Franciacorta Brut"), Some(WineType::Sparkling));
        assert_eq!(WineType::infer_from_text("Moscato d'Asti"), Some(WineType::Dessert));
        assert_eq!(WineType::infer_from_text("Barolo Riserva"), Some(WineType::Red));
        assert_eq!(WineType::infer_from_text("Soave Classico"), Some(WineType::White));
        // "port" must not fire inside "important"
        assert_eq!(WineType::infer_from_text("an important bottle"), None);
    }

    #[test]
    fn test_display_name_joins_producer_and_name() {
        let w = wine(9, "Vietti", "Barolo", None, WineType::Red);
        assert_eq!(w.display_name(), "Vietti Barolo");
        let w = wine(9, "", "Barolo", None, WineType::Red);
        assert_eq!(w.display_name(), "Barolo");
    }

    #[test]
    fn test_parse_italian_labels() {
        assert_eq!(WineType::parse("Rosso"), Some(WineType::Red));
        assert_eq!(WineType::parse("spumante"), Some(WineType::Sparkling));
        assert_eq!(WineType::parse("orange"), None);
    }
}
