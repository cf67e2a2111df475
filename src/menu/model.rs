use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::cellar::WineType;

/// Opaque identity for a dish or a wine pairing, assigned at decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(pub Uuid);

impl ItemId {
    pub fn new() -> Self {
        ItemId(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(ItemId)
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DietType {
    #[default]
    Omnivore,
    Vegetarian,
    Vegan,
    Pescatarian,
    GlutenFree,
}

impl DietType {
    pub fn parse(label: &str) -> Option<Self> {
        let normalized: String = label
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();
        match normalized.as_str() {
            "omnivore" | "any" | "onnivoro" => Some(DietType::Omnivore),
            "vegetarian" | "vegetariano" => Some(DietType::Vegetarian),
            "vegan" | "vegano" => Some(DietType::Vegan),
            "pescatarian" | "pescetariano" | "fish" => Some(DietType::Pescatarian),
            "glutenfree" | "senzaglutine" => Some(DietType::GlutenFree),
            _ => None,
        }
    }

    pub fn prompt_phrase(&self) -> &'static str {
        match self {
            DietType::Omnivore => "no dietary restriction",
            DietType::Vegetarian => "vegetarian (no meat or fish)",
            DietType::Vegan => "vegan (no animal products at all)",
            DietType::Pescatarian => "pescatarian (fish and seafood allowed, no meat)",
            DietType::GlutenFree => "gluten-free",
        }
    }
}

/// The user's wine taste profile at the time of the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TastePreferences {
    pub preferred_types: Vec<WineType>,
    pub preferred_regions: Vec<String>,
    pub disliked: Vec<String>,
    pub notes: Option<String>,
}

impl TastePreferences {
    pub fn is_empty(&self) -> bool {
        self.preferred_types.is_empty()
            && self.preferred_regions.is_empty()
            && self.disliked.is_empty()
            && self.notes.as_deref().map_or(true, |n| n.trim().is_empty())
    }
}

/// Input to one generation call. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct MenuRequest {
    pub title: String,
    pub date: NaiveDate,
    pub person_count: u32,
    pub occasion: Option<String>,
    pub diet: DietType,
    pub cuisine: String,
    pub notes: Option<String>,
    pub taste: Option<TastePreferences>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CourseKind {
    Starter,
    First,
    Main,
    Side,
    Dessert,
}

impl CourseKind {
    pub const ALL: [CourseKind; 5] = [
        CourseKind::Starter,
        CourseKind::First,
        CourseKind::Main,
        CourseKind::Side,
        CourseKind::Dessert,
    ];

    /// Accepts the English and Italian names a completion may use.
    pub fn parse(label: &str) -> Option<Self> {
        let normalized: String = label
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();
        match normalized.as_str() {
            "starter" | "starters" | "appetizer" | "appetizers" | "antipasto" | "antipasti" => Some(CourseKind::Starter),
            "first" | "firstcourse" | "firstcourses" | "primo" | "primi" | "primipiatti" => Some(CourseKind::First),
            "main" | "maincourse" | "maincourses" | "secondo" | "secondi" | "secondipiatti" => Some(CourseKind::Main),
            "side" | "sides" | "sidedish" | "sidedishes" | "contorno" | "contorni" => Some(CourseKind::Side),
            "dessert" | "desserts" | "dolce" | "dolci" => Some(CourseKind::Dessert),
            _ => None,
        }
    }

    /// Key used in the completion JSON.
    pub fn json_key(&self) -> &'static str {
        match self {
            CourseKind::Starter => "starters",
            CourseKind::First => "firstCourses",
            CourseKind::Main => "mainCourses",
            CourseKind::Side => "sides",
            CourseKind::Dessert => "desserts",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CourseKind::Starter => "starter",
            CourseKind::First => "first course",
            CourseKind::Main => "main course",
            CourseKind::Side => "side dish",
            CourseKind::Dessert => "dessert",
        }
    }
}

impl fmt::Display for CourseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "easy" | "facile" | "low" => Some(Difficulty::Easy),
            "medium" | "media" | "medio" | "intermediate" => Some(Difficulty::Medium),
            "hard" | "difficile" | "high" | "advanced" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    pub quantity: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub ingredients: Vec<Ingredient>,
    pub prep_minutes: u32,
    pub cook_minutes: u32,
    pub difficulty: Difficulty,
    /// Ordered procedure.
    pub steps: Vec<String>,
    pub tips: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dish {
    pub id: ItemId,
    pub name: String,
    pub description: String,
    pub servings: u32,
    pub recipe: Recipe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WineSource {
    FromCellar,
    ToPurchase,
}

impl WineSource {
    pub fn parse(label: &str) -> Option<Self> {
        let normalized: String = label
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();
        match normalized.as_str() {
            "fromcellar" | "cellar" | "cantina" | "owned" => Some(WineSource::FromCellar),
            "topurchase" | "purchase" | "buy" | "acquisto" | "shop" => Some(WineSource::ToPurchase),
            _ => None,
        }
    }

    pub fn json_name(&self) -> &'static str {
        match self {
            WineSource::FromCellar => "fromCellar",
            WineSource::ToPurchase => "toPurchase",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compatibility {
    /// 0–100.
    pub score: u8,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinePairing {
    pub id: ItemId,
    pub producer: String,
    pub wine_name: String,
    pub vintage: Option<u16>,
    pub source: WineSource,
    /// Bottles needed for the dinner.
    pub quantity: u32,
    pub reasoning: String,
    pub compatibility: Option<Compatibility>,
}

impl WinePairing {
    pub fn display_name(&self) -> String {
        match (self.producer.trim(), self.wine_name.trim()) {
            ("", name) => name.to_string(),
            (producer, "") => producer.to_string(),
            (producer, name) => format!("{} {}", producer, name),
        }
    }
}

/// A wine assigned to a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoursePairing {
    pub course: CourseKind,
    pub wine: WinePairing,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Etiquette {
    pub invitation: String,
    pub reception: String,
    pub table: String,
}

/// Course buckets in serving order. Each keeps insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Courses {
    pub starters: Vec<Dish>,
    pub firsts: Vec<Dish>,
    pub mains: Vec<Dish>,
    pub sides: Vec<Dish>,
    pub desserts: Vec<Dish>,
}

impl Courses {
    pub fn bucket(&self, kind: CourseKind) -> &Vec<Dish> {
        match kind {
            CourseKind::Starter => &self.starters,
            CourseKind::First => &self.firsts,
            CourseKind::Main => &self.mains,
            CourseKind::Side => &self.sides,
            CourseKind::Dessert => &self.desserts,
        }
    }

    pub fn bucket_mut(&mut self, kind: CourseKind) -> &mut Vec<Dish> {
        match kind {
            CourseKind::Starter => &mut self.starters,
            CourseKind::First => &mut self.firsts,
            CourseKind::Main => &mut self.mains,
            CourseKind::Side => &mut self.sides,
            CourseKind::Dessert => &mut self.desserts,
        }
    }

    /// Non-empty buckets, in serving order.
    pub fn populated(&self) -> impl Iterator<Item = (CourseKind, &Vec<Dish>)> + '_ {
        CourseKind::ALL
            .into_iter()
            .map(|kind| (kind, self.bucket(kind)))
            .filter(|(_, dishes)| !dishes.is_empty())
    }

    pub fn dish_count(&self) -> usize {
        CourseKind::ALL.iter().map(|k| self.bucket(*k).len()).sum()
    }
}

/// Which wine list a positional or id-based wine edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WineList {
    /// Course pairings.
    Pairings,
    /// Standalone purchase suggestions.
    Suggestions,
}

impl WineList {
    /// Compatibility mapping for callers that address wines by source:
    /// `FromCellar` edits the pairing list, `ToPurchase` the suggestion list.
    pub fn from_source(source: WineSource) -> Self {
        match source {
            WineSource::FromCellar => WineList::Pairings,
            WineSource::ToPurchase => WineList::Suggestions,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WineList::Pairings => "wine pairings",
            WineList::Suggestions => "purchase suggestions",
        }
    }
}

/// The generated menu artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuResponse {
    pub courses: Courses,
    pub wine_pairings: Vec<CoursePairing>,
    pub purchase_suggestions: Vec<WinePairing>,
    pub service_notes: String,
    pub etiquette: Etiquette,
    pub reasoning: Option<String>,
    pub wine_strategy: Option<String>,
    pub season_context: Option<String>,
    pub guest_considerations: Option<String>,
}

impl MenuResponse {
    pub fn find_dish(&self, id: ItemId) -> Option<(CourseKind, usize)> {
        CourseKind::ALL.into_iter().find_map(|kind| {
            self.courses
                .bucket(kind)
                .iter()
                .position(|d| d.id == id)
                .map(|index| (kind, index))
        })
    }

    pub fn dish(&self, id: ItemId) -> Option<&Dish> {
        self.find_dish(id).map(|(kind, index)| &self.courses.bucket(kind)[index])
    }

    pub fn find_wine(&self, id: ItemId) -> Option<(WineList, usize)> {
        if let Some(index) = self.wine_pairings.iter().position(|p| p.wine.id == id) {
            return Some((WineList::Pairings, index));
        }
        self.purchase_suggestions
            .iter()
            .position(|w| w.id == id)
            .map(|index| (WineList::Suggestions, index))
    }

    pub fn wine(&self, id: ItemId) -> Option<&WinePairing> {
        match self.find_wine(id)? {
            (WineList::Pairings, index) => Some(&self.wine_pairings[index].wine),
            (WineList::Suggestions, index) => Some(&self.purchase_suggestions[index]),
        }
    }

    pub fn wine_list_len(&self, list: WineList) -> usize {
        match list {
            WineList::Pairings => self.wine_pairings.len(),
            WineList::Suggestions => self.purchase_suggestions.len(),
        }
    }

    pub fn wine_at(&self, list: WineList, index: usize) -> Option<&WinePairing> {
        match list {
            WineList::Pairings => self.wine_pairings.get(index).map(|p| &p.wine),
            WineList::Suggestions => self.purchase_suggestions.get(index),
        }
    }

    pub fn pairings_for(&self, course: CourseKind) -> impl Iterator<Item = &WinePairing> + '_ {
        self.wine_pairings
            .iter()
            .filter(move |p| p.course == course)
            .map(|p| &p.wine)
    }

    /// Every wine in the menu, pairings first.
    pub fn all_wines(&self) -> impl Iterator<Item = &WinePairing> + '_ {
        self.wine_pairings
            .iter()
            .map(|p| &p.wine)
            .chain(self.purchase_suggestions.iter())
    }

    /// Pairings whose course bucket is currently empty. Deleting the last
    /// dish of a course leaves its pairings in place; this is how callers
    /// find them.
    pub fn orphaned_pairings(&self) -> Vec<&CoursePairing> {
        self.wine_pairings
            .iter()
            .filter(|p| self.courses.bucket(p.course).is_empty())
            .collect()
    }

    pub fn total_prep_minutes(&self) -> u32 {
        CourseKind::ALL
            .iter()
            .flat_map(|kind| self.courses.bucket(*kind))
            .map(|dish| dish.recipe.prep_minutes + dish.recipe.cook_minutes)
            .sum()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_course_aliases() {
        assert_eq!(CourseKind::parse("Antipasti"), Some(CourseKind::Starter));
        assert_eq!(CourseKind::parse("mainCourses"), Some(CourseKind::Main));
        assert_eq!(CourseKind::parse("first_course"), Some(CourseKind::First));
        assert_eq!(CourseKind::parse("Dolci"), Some(CourseKind::Dessert));
        assert_eq!(CourseKind::parse("cheese"), None);
    }

    #[test]
    fn test_find_dish_and_wine_by_id() {
        let menu = sample_menu();
        let carpaccio = menu.courses.starters[1].id;
        assert_eq!(menu.find_dish(carpaccio), Some((CourseKind::Starter, 1)));

        let suggestion = menu.purchase_suggestions[0].id;
        assert_eq!(menu.find_wine(suggestion), Some((WineList::Suggestions, 0)));
        assert!(menu.find_dish(suggestion).is_none());
    }

    #[test]
    fn test_orphaned_pairings_after_emptying_course() {
        let mut menu = sample_menu();
        assert!(menu.orphaned_pairings().is_empty());
        menu.courses.mains.clear();
        let orphans = menu.orphaned_pairings();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].course, CourseKind::Main);
    }

    #[test]
    fn test_total_prep_minutes_sums_recipes() {
        assert_eq!(sample_menu().total_prep_minutes(), 4 * 30);
    }

    #[test]
    fn test_source_shim_maps_lists() {
        assert_eq!(WineList::from_source(WineSource::FromCellar), WineList::Pairings);
        assert_eq!(WineList::from_source(WineSource::ToPurchase), WineList::Suggestions);
    }
}
