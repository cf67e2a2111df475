//! Prompt templates for full menus and single-item regeneration.
//!
//! Callers must check the completion client's credential before building
//! any of these; assembly itself never fails.

use chrono::Datelike;
use std::fmt::Write as _;

use serde_json::json;

use super::model::{CourseKind, Dish, MenuRequest, MenuResponse, TastePreferences, WineList, WinePairing};
use crate::api_connection::endpoints::{JsonSchemaDefinition, Prompt};
use crate::cellar::InventorySnapshot;

pub const NOTES_PRIORITY_MARKER: &str =
    "### HOST NOTES (HIGHEST PRIORITY: these override season, diet and every default below) ###";

const MENU_SYSTEM_PROMPT: &str = r#"You are an expert chef and sommelier planning a dinner party.
You design a coherent multi-course menu with full recipes and pair it with wines.

Return ONLY one JSON object, no prose and no markdown fences. Shape:
{
  "menu": {
    "starters": [Dish], "firstCourses": [Dish], "mainCourses": [Dish], "sides": [Dish], "desserts": [Dish]
  },
  "winePairings": [
    {"course": "starters|firstCourses|mainCourses|sides|desserts", "producer": string, "wineName": string,
     "vintage": number or null, "source": "fromCellar" or "toPurchase", "quantity": number,
     "reasoning": string,
     "compatibility": {"score": 0-100, "strengths": [string], "weaknesses": [string]}}
  ],
  "purchaseSuggestions": [same shape as a pairing, without "course"],
  "serviceNotes": string,
  "etiquette": {"invitation": string, "reception": string, "table": string},
  "reasoning": string, "wineStrategy": string, "seasonContext": string, "guestConsiderations": string
}
Dish = {"name": string, "description": string, "servings": number,
        "recipe": {"ingredients": [{"name": string, "quantity": string}], "prepMinutes": number,
                   "cookMinutes": number, "difficulty": "easy"|"medium"|"hard",
                   "steps": [string], "tips": string}}

Rules:
- Leave a course array empty when the dinner does not need it. Never invent extra keys under "menu".
- Every pairing's "course" must name a course that has at least one dish.
- Use "fromCellar" only for wines listed in the cellar inventory, copying producer and name exactly as listed,
  and never ask for more bottles than are in stock. Everything else is "toPurchase".
- If the cellar inventory is empty, every wine is "toPurchase".
- Respect the diet strictly in every recipe."#;

const DISH_SYSTEM_PROMPT: &str = r#"You are an expert chef revising one dish of an existing dinner menu.
Propose a single different dish for the same course that still suits the dinner and the wines already chosen for it.

Return ONLY one JSON object, no prose and no markdown fences:
{"dish": {"name": string, "description": string, "servings": number,
          "recipe": {"ingredients": [{"name": string, "quantity": string}], "prepMinutes": number,
                     "cookMinutes": number, "difficulty": "easy"|"medium"|"hard",
                     "steps": [string], "tips": string}}}"#;

const WINE_SYSTEM_PROMPT: &str = r#"You are an expert sommelier replacing one wine in an existing dinner plan.
Propose a single different wine that fits the same role.

Return ONLY one JSON object, no prose and no markdown fences:
{"wine": {"producer": string, "wineName": string, "vintage": number or null,
          "source": "fromCellar" or "toPurchase", "quantity": number, "reasoning": string,
          "compatibility": {"score": 0-100, "strengths": [string], "weaknesses": [string]}}}
Use "fromCellar" only for a wine listed in the cellar inventory, copying producer and name exactly."#;

fn compatibility_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "score": {"type": "integer", "minimum": 0, "maximum": 100},
            "strengths": {"type": "array", "items": {"type": "string"}},
            "weaknesses": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["score"]
    })
}

/// Response schema for a replacement dish, for providers that accept
/// `json_schema` response formats.
pub fn dish_json_schema() -> JsonSchemaDefinition {
    JsonSchemaDefinition {
        name: "replacement_dish".to_string(),
        strict: None,
        schema: json!({
            "type": "object",
            "properties": {
                "dish": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "description": {"type": "string"},
                        "servings": {"type": "integer"},
                        "recipe": {
                            "type": "object",
                            "properties": {
                                "ingredients": {
                                    "type": "array",
                                    "items": {
                                        "type": "object",
                                        "properties": {
                                            "name": {"type": "string"},
                                            "quantity": {"type": "string"}
                                        },
                                        "required": ["name"]
                                    }
                                },
                                "prepMinutes": {"type": "integer"},
                                "cookMinutes": {"type": "integer"},
                                "difficulty": {"type": "string", "enum": ["easy", "medium", "hard"]},
                                "steps": {"type": "array", "items": {"type": "string"}},
                                "tips": {"type": "string"}
                            },
                            "required": ["ingredients", "steps"]
                        }
                    },
                    "required": ["name", "recipe"]
                }
            },
            "required": ["dish"]
        }),
    }
}

pub fn wine_json_schema() -> JsonSchemaDefinition {
    JsonSchemaDefinition {
        name: "replacement_wine".to_string(),
        strict: None,
        schema: json!({
            "type": "object",
            "properties": {
                "wine": {
                    "type": "object",
                    "properties": {
                        "producer": {"type": "string"},
                        "wineName": {"type": "string"},
                        "vintage": {"type": ["integer", "null"]},
                        "source": {"type": "string", "enum": ["fromCellar", "toPurchase"]},
                        "quantity": {"type": "integer", "minimum": 1},
                        "reasoning": {"type": "string"},
                        "compatibility": compatibility_schema()
                    },
                    "required": ["producer", "wineName", "source"]
                }
            },
            "required": ["wine"]
        }),
    }
}

fn season_for_month(month: u32) -> &'static str {
    match month {
        3..=5 => "spring",
        6..=8 => "summer",
        9..=11 => "autumn",
        _ => "winter",
    }
}

fn with_language(system: &str, language: &str) -> String {
    format!("{}\n- Write every human-readable text value in {}.", system, language)
}

fn write_dinner_context(out: &mut String, request: &MenuRequest) {
    let _ = writeln!(out, "Dinner: {}", request.title);
    let _ = writeln!(
        out,
        "Date: {} (season: {})",
        request.date.format("%Y-%m-%d"),
        season_for_month(request.date.month())
    );
    let _ = writeln!(out, "Guests: {}", request.person_count);
    if let Some(occasion) = request.occasion.as_deref().filter(|o| !o.trim().is_empty()) {
        let _ = writeln!(out, "Occasion: {}", occasion.trim());
    }
    let _ = writeln!(out, "Diet: {}", request.diet.prompt_phrase());
    if !request.cuisine.trim().is_empty() {
        let _ = writeln!(out, "Cuisine: {}", request.cuisine.trim());
    }
}

fn write_notes(out: &mut String, request: &MenuRequest) {
    if let Some(notes) = request.notes.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        let _ = writeln!(out, "\n{}\n{}", NOTES_PRIORITY_MARKER, notes);
    }
}

fn write_taste(out: &mut String, taste: Option<&TastePreferences>) {
    let Some(taste) = taste.filter(|t| !t.is_empty()) else {
        return;
    };
    let _ = writeln!(out, "\nHost wine preferences:");
    if !taste.preferred_types.is_empty() {
        let types: Vec<&str> = taste.preferred_types.iter().map(|t| t.label()).collect();
        let _ = writeln!(out, "- prefers: {}", types.join(", "));
    }
    if !taste.preferred_regions.is_empty() {
        let _ = writeln!(out, "- favourite regions: {}", taste.preferred_regions.join(", "));
    }
    if !taste.disliked.is_empty() {
        let _ = writeln!(out, "- avoid: {}", taste.disliked.join(", "));
    }
    if let Some(notes) = taste.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        let _ = writeln!(out, "- notes: {}", notes.trim());
    }
}

fn write_inventory(out: &mut String, snapshot: &InventorySnapshot) {
    let _ = writeln!(
        out,
        "\nCellar inventory ({} of {} wines listed):\n{}",
        snapshot.listed, snapshot.total, snapshot.text
    );
}

fn describe_wine(wine: &WinePairing) -> String {
    let mut text = wine.display_name();
    if let Some(vintage) = wine.vintage {
        let _ = write!(text, " {}", vintage);
    }
    let _ = write!(text, " ({}, {} bottle(s))", wine.source.json_name(), wine.quantity);
    text
}

/// Full-menu prompt. Host notes always come last with the priority marker
/// so they are read as overriding everything before them.
pub fn build_menu_prompt(
    request: &MenuRequest,
    snapshot: &InventorySnapshot,
    language: &str,
) -> Prompt {
    let mut user = String::new();
    write_dinner_context(&mut user, request);
    write_taste(&mut user, request.taste.as_ref());
    write_inventory(&mut user, snapshot);
    write_notes(&mut user, request);
    let _ = write!(user, "\nPlan the menu and wines now.");

    Prompt {
        system: with_language(MENU_SYSTEM_PROMPT, language),
        user,
    }
}

/// Narrowed prompt for replacing one dish. Only the target dish, its
/// course, the dinner constraints, the host's preferences and that
/// course's wines are included.
pub fn build_dish_prompt(
    request: &MenuRequest,
    menu: &MenuResponse,
    course: CourseKind,
    dish: &Dish,
    language: &str,
) -> Prompt {
    let mut user = String::new();
    write_dinner_context(&mut user, request);
    write_taste(&mut user, request.taste.as_ref());
    let _ = writeln!(user, "\nCourse: {}", course);
    let _ = writeln!(user, "Dish to replace: {}", dish.name);
    if !dish.description.is_empty() {
        let _ = writeln!(user, "Its description: {}", dish.description);
    }
    let wines: Vec<String> = menu.pairings_for(course).map(describe_wine).collect();
    if wines.is_empty() {
        let _ = writeln!(user, "No wine is assigned to this course yet.");
    } else {
        let _ = writeln!(user, "Wines already assigned to this course:");
        for wine in wines {
            let _ = writeln!(user, "- {}", wine);
        }
    }
    write_notes(&mut user, request);
    let _ = write!(user, "\nPropose one replacement dish, different from \"{}\".", dish.name);

    Prompt {
        system: with_language(DISH_SYSTEM_PROMPT, language),
        user,
    }
}

/// Narrowed prompt for replacing one wine. Pairings carry the dishes of
/// their course; suggestions carry the menu's dish names.
pub fn build_wine_prompt(
    request: &MenuRequest,
    menu: &MenuResponse,
    list: WineList,
    index: usize,
    snapshot: &InventorySnapshot,
    language: &str,
) -> Prompt {
    let mut user = String::new();
    write_dinner_context(&mut user, request);
    write_taste(&mut user, request.taste.as_ref());

    match list {
        WineList::Pairings => {
            if let Some(pairing) = menu.wine_pairings.get(index) {
                let _ = writeln!(user, "\nCourse: {}", pairing.course);
                let dishes: Vec<&str> = menu
                    .courses
                    .bucket(pairing.course)
                    .iter()
                    .map(|d| d.name.as_str())
                    .collect();
                if !dishes.is_empty() {
                    let _ = writeln!(user, "Dishes in this course: {}", dishes.join(", "));
                }
                let _ = writeln!(user, "Wine to replace: {}", describe_wine(&pairing.wine));
            }
        }
        WineList::Suggestions => {
            let dishes: Vec<&str> = CourseKind::ALL
                .iter()
                .flat_map(|kind| menu.courses.bucket(*kind))
                .map(|d| d.name.as_str())
                .collect();
            let _ = writeln!(user, "\nMenu: {}", dishes.join(", "));
            if let Some(wine) = menu.purchase_suggestions.get(index) {
                let _ = writeln!(user, "Purchase suggestion to replace: {}", describe_wine(wine));
            }
            let _ = writeln!(user, "The replacement must be a wine to purchase.");
        }
    }

    let others: Vec<String> = menu
        .all_wines()
        .filter(|w| Some(w.id) != menu.wine_at(list, index).map(|t| t.id))
        .map(|w| w.display_name())
        .collect();
    if !others.is_empty() {
        let _ = writeln!(user, "Other wines already in the plan (do not repeat): {}", others.join("; "));
    }
    write_inventory(&mut user, snapshot);
    write_notes(&mut user, request);
    let _ = write!(user, "\nPropose one replacement wine.");

    Prompt {
        system: with_language(WINE_SYSTEM_PROMPT, language),
        user,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cellar::test_support::sample_cellar;
    use crate::cellar::{build_inventory_snapshot, WineType};
    use crate::config::SnapshotLimits;
    use crate::menu::model::test_support::sample_menu;
    use crate::menu::model::DietType;
    use chrono::NaiveDate;

    fn request(notes: Option<&str>) -> MenuRequest {
        MenuRequest {
            title: "Cena estiva".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 7, 18).unwrap(),
            person_count: 4,
            occasion: None,
            diet: DietType::Pescatarian,
            cuisine: "Italian".to_string(),
            notes: notes.map(str::to_string),
            taste: None,
        }
    }

    #[test]
    fn test_edit_schemas_wrap_the_item() {
        let dish = dish_json_schema();
        assert_eq!(dish.schema["required"][0], "dish");
        let wine = wine_json_schema();
        assert_eq!(wine.schema["properties"]["wine"]["properties"]["source"]["enum"][1], "toPurchase");
    }

    #[test]
    fn test_menu_prompt_marks_notes_as_priority_and_last() {
        let cellar = sample_cellar();
        let snapshot = build_inventory_snapshot(&cellar.in_stock(), SnapshotLimits::default());
        let prompt = build_menu_prompt(&request(Some("solo pesce")), &snapshot, "Italian");

        let marker_at = prompt.user.find(NOTES_PRIORITY_MARKER).expect("marker present");
        let inventory_at = prompt.user.find("Cellar inventory").unwrap();
        assert!(marker_at > inventory_at);
        assert!(prompt.user[marker_at..].contains("solo pesce"));
        assert!(prompt.user.contains("season: summer"));
        assert!(prompt.user.contains("Vietti Barolo Castiglione 2018"));
        assert!(prompt.system.ends_with("in Italian."));
    }

    #[test]
    fn test_blank_notes_have_no_marker() {
        let snapshot = build_inventory_snapshot(&[], SnapshotLimits::default());
        let prompt = build_menu_prompt(&request(Some("   ")), &snapshot, "English");
        assert!(!prompt.user.contains(NOTES_PRIORITY_MARKER));
        assert!(prompt.user.contains("(the cellar is empty)"));
    }

    #[test]
    fn test_taste_preferences_rendered() {
        let mut req = request(None);
        req.taste = Some(TastePreferences {
            preferred_types: vec![WineType::White, WineType::Sparkling],
            disliked: vec!["oaky chardonnay".to_string()],
            ..TastePreferences::default()
        });
        let snapshot = build_inventory_snapshot(&[], SnapshotLimits::default());
        let prompt = build_menu_prompt(&req, &snapshot, "English");
        assert!(prompt.user.contains("- prefers: white, sparkling"));
        assert!(prompt.user.contains("- avoid: oaky chardonnay"));
    }

    #[test]
    fn test_dish_prompt_is_narrowed_to_target() {
        let menu = sample_menu();
        let target = &menu.courses.mains[0];
        let prompt = build_dish_prompt(&request(None), &menu, CourseKind::Main, target, "English");
        assert!(prompt.user.contains("Dish to replace: Branzino al sale"));
        assert!(prompt.user.contains("Jermann Vintage Tunina"));
        // other courses stay out of the narrowed prompt
        assert!(!prompt.user.contains("Bruschetta"));
        assert!(!prompt.user.contains("Soave"));
    }

    #[test]
    fn test_dish_prompt_carries_taste_preferences() {
        let menu = sample_menu();
        let mut req = request(None);
        req.taste = Some(TastePreferences {
            disliked: vec!["truffle".to_string()],
            notes: Some("light dishes".to_string()),
            ..TastePreferences::default()
        });
        let prompt = build_dish_prompt(&req, &menu, CourseKind::Main, &menu.courses.mains[0], "English");
        assert!(prompt.user.contains("- avoid: truffle"));
        assert!(prompt.user.contains("- notes: light dishes"));

        let plain = build_dish_prompt(&request(None), &menu, CourseKind::Main, &menu.courses.mains[0], "English");
        assert!(!plain.user.contains("Host wine preferences"));
    }

    #[test]
    fn test_wine_prompt_for_suggestion_lists_menu_and_excludes_target() {
        let menu = sample_menu();
        let snapshot = build_inventory_snapshot(&[], SnapshotLimits::default());
        let prompt = build_wine_prompt(&request(None), &menu, WineList::Suggestions, 0, &snapshot, "English");
        assert!(prompt.user.contains("Menu: Bruschetta, Carpaccio di polpo, Branzino al sale, Panna cotta"));
        assert!(prompt.user.contains("Purchase suggestion to replace: Ceretto Moscato d'Asti"));
        assert!(prompt.user.contains("do not repeat): Pieropan Soave Classico; Jermann Vintage Tunina"));
    }
}
