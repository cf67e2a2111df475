//! Turns raw completion text into typed menu structures.
//!
//! Decoding is all-or-nothing: either every part of the response decodes and
//! validates, or the first mismatch comes back as `PipelineError::Decode`
//! with a JSON path such as `$.menu.starters[1].recipe.steps`.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::model::{
    Compatibility, CourseKind, CoursePairing, Courses, Difficulty, Dish, Etiquette, Ingredient,
    ItemId, MenuResponse, Recipe, WinePairing, WineSource,
};
use crate::error::{PipelineError, PipelineResult};

/// Context the decoder needs that is not in the completion itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Used when a dish omits its serving count.
    pub default_servings: u32,
    /// Forces every pairing to `ToPurchase`; set when the cellar snapshot
    /// was empty.
    pub cellar_is_empty: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            default_servings: 4,
            cellar_is_empty: false,
        }
    }
}

/// Finds the first balanced `{...}` span in `raw` that parses as a JSON
/// object, skipping prose and code fences around it. Braces inside JSON
/// strings are ignored; a span that is not valid JSON (such as a brace in
/// the prose) is passed over and the scan resumes at the next `{`.
pub fn extract_json_span(raw: &str) -> PipelineResult<&str> {
    let mut first_error: Option<PipelineError> = None;
    let mut from = 0;
    while let Some(found) = raw[from..].find('{') {
        let start = from + found;
        match balanced_len(&raw[start..]) {
            Some(len) => {
                let span = &raw[start..start + len];
                match serde_json::from_str::<Value>(span) {
                    Ok(Value::Object(_)) => return Ok(span),
                    Ok(_) => {}
                    Err(e) => {
                        first_error.get_or_insert_with(|| PipelineError::decode("$", format!("invalid JSON: {}", e)));
                    }
                }
            }
            None => {
                first_error.get_or_insert_with(|| PipelineError::decode("$", "unterminated JSON object"));
            }
        }
        from = start + 1;
    }
    Err(first_error.unwrap_or_else(|| PipelineError::decode("$", "no JSON object in completion")))
}

/// Byte length of the brace-balanced span at the start of `text`, which
/// must begin with `{`.
fn balanced_len(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_root(raw: &str) -> PipelineResult<Map<String, Value>> {
    let span = extract_json_span(raw)?;
    match serde_json::from_str::<Value>(span) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(PipelineError::decode("$", "expected a JSON object")),
        Err(e) => Err(PipelineError::decode("$", format!("invalid JSON: {}", e))),
    }
}

// --- Wire shapes as the completion writes them ---

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireText {
    One(String),
    Many(Vec<String>),
}

impl WireText {
    fn into_string(self) -> String {
        match self {
            WireText::One(s) => s.trim().to_string(),
            WireText::Many(lines) => lines
                .iter()
                .map(|l| l.trim())
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireIngredient {
    Plain(String),
    Detailed {
        name: String,
        #[serde(default, alias = "amount")]
        quantity: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRecipe {
    ingredients: Vec<WireIngredient>,
    #[serde(default, alias = "prepTime", alias = "prepTimeMinutes")]
    prep_minutes: Option<u32>,
    #[serde(default, alias = "cookTime", alias = "cookTimeMinutes")]
    cook_minutes: Option<u32>,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(alias = "procedure", alias = "instructions")]
    steps: Vec<String>,
    #[serde(default)]
    tips: Option<WireText>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDish {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default, alias = "servingCount", alias = "serves")]
    servings: Option<u32>,
    recipe: WireRecipe,
}

#[derive(Debug, Deserialize)]
struct WireCompatibility {
    score: f64,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    weaknesses: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireWine {
    #[serde(default)]
    course: Option<String>,
    #[serde(default)]
    producer: String,
    #[serde(alias = "name")]
    wine_name: String,
    #[serde(default)]
    vintage: Option<Value>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default, alias = "bottles", alias = "quantityNeeded")]
    quantity: Option<u32>,
    #[serde(default, alias = "reason", alias = "motivation")]
    reasoning: String,
    #[serde(default)]
    compatibility: Option<WireCompatibility>,
}

#[derive(Debug, Default, Deserialize)]
struct WireEtiquette {
    #[serde(default)]
    invitation: Option<WireText>,
    #[serde(default)]
    reception: Option<WireText>,
    #[serde(default)]
    table: Option<WireText>,
}

fn from_value<T: for<'de> Deserialize<'de>>(value: Value, path: &str) -> PipelineResult<T> {
    serde_json::from_value(value).map_err(|e| PipelineError::decode(path, e.to_string()))
}

fn required<'a>(map: &'a Map<String, Value>, key: &str, path: &str) -> PipelineResult<&'a Value> {
    map.get(key)
        .filter(|v| !v.is_null())
        .ok_or_else(|| PipelineError::decode(format!("{}.{}", path, key), "missing required key"))
}

fn as_array<'a>(value: &'a Value, path: &str) -> PipelineResult<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| PipelineError::decode(path, format!("expected an array, got {}", type_name(value))))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// --- Dishes ---

fn dish_from_value(value: &Value, path: &str, options: &DecodeOptions) -> PipelineResult<Dish> {
    if !value.is_object() {
        return Err(PipelineError::decode(path, format!("expected an object, got {}", type_name(value))));
    }
    let wire: WireDish = from_value(value.clone(), path)?;

    let name = wire.name.trim().to_string();
    if name.is_empty() {
        return Err(PipelineError::decode(format!("{}.name", path), "empty dish name"));
    }
    if wire.recipe.ingredients.is_empty() {
        return Err(PipelineError::decode(format!("{}.recipe.ingredients", path), "empty required array"));
    }
    let steps: Vec<String> = wire
        .recipe
        .steps
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if steps.is_empty() {
        return Err(PipelineError::decode(format!("{}.recipe.steps", path), "empty required array"));
    }

    let ingredients = wire
        .recipe
        .ingredients
        .into_iter()
        .map(|ingredient| match ingredient {
            WireIngredient::Plain(text) => Ingredient {
                name: text.trim().to_string(),
                quantity: String::new(),
            },
            WireIngredient::Detailed { name, quantity } => Ingredient {
                name: name.trim().to_string(),
                quantity: quantity.unwrap_or_default().trim().to_string(),
            },
        })
        .collect();

    let difficulty = match wire.recipe.difficulty.as_deref() {
        None => Difficulty::default(),
        Some(label) => Difficulty::parse(label).unwrap_or_else(|| {
            warn!(path, difficulty = label, "unknown difficulty, using medium");
            Difficulty::Medium
        }),
    };

    Ok(Dish {
        id: ItemId::new(),
        name,
        description: wire.description.trim().to_string(),
        servings: wire
            .servings
            .filter(|s| *s > 0)
            .unwrap_or(options.default_servings),
        recipe: Recipe {
            ingredients,
            prep_minutes: wire.recipe.prep_minutes.unwrap_or(0),
            cook_minutes: wire.recipe.cook_minutes.unwrap_or(0),
            difficulty,
            steps,
            tips: wire.recipe.tips.map(WireText::into_string).filter(|t| !t.is_empty()),
        },
    })
}

fn decode_courses(menu: &Value, options: &DecodeOptions) -> PipelineResult<Courses> {
    let menu = menu
        .as_object()
        .ok_or_else(|| PipelineError::decode("$.menu", format!("expected an object, got {}", type_name(menu))))?;

    let mut courses = Courses::default();
    let mut seen: Vec<CourseKind> = Vec::new();
    for (key, value) in menu {
        let path = format!("$.menu.{}", key);
        let Some(kind) = CourseKind::parse(key) else {
            debug!(key = %key, "ignoring unknown key in menu");
            continue;
        };
        if seen.contains(&kind) {
            return Err(PipelineError::decode(path, format!("{} given more than once", kind)));
        }
        seen.push(kind);

        let bucket = courses.bucket_mut(kind);
        for (index, item) in as_array(value, &path)?.iter().enumerate() {
            bucket.push(dish_from_value(item, &format!("{}[{}]", path, index), options)?);
        }
    }

    if courses.dish_count() == 0 {
        return Err(PipelineError::decode("$.menu", "no dishes in any course"));
    }
    Ok(courses)
}

// --- Wines ---

const PLAUSIBLE_VINTAGES: std::ops::RangeInclusive<u16> = 1800..=2200;

fn parse_vintage(value: Option<Value>, path: &str) -> PipelineResult<Option<u16>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|v| u16::try_from(v).ok())
            .filter(|v| PLAUSIBLE_VINTAGES.contains(v))
            .map(Some)
            .ok_or_else(|| PipelineError::decode(format!("{}.vintage", path), format!("implausible vintage {}", n))),
        // "NV" and other non-numeric labels mean no vintage
        Some(Value::String(s)) => match s.trim().parse::<u64>() {
            Err(_) => Ok(None),
            Ok(v) => u16::try_from(v)
                .ok()
                .filter(|v| PLAUSIBLE_VINTAGES.contains(v))
                .map(Some)
                .ok_or_else(|| PipelineError::decode(format!("{}.vintage", path), format!("implausible vintage {}", s.trim()))),
        },
        Some(other) => Err(PipelineError::decode(
            format!("{}.vintage", path),
            format!("expected a number or string, got {}", type_name(&other)),
        )),
    }
}

/// Accepts both flat pairings and `{"course": .., "wine": {..}}`.
fn flatten_pairing(value: &Value) -> Value {
    if let Some(obj) = value.as_object() {
        if let Some(Value::Object(inner)) = obj.get("wine") {
            let mut merged = inner.clone();
            if let Some(course) = obj.get("course") {
                merged.entry("course").or_insert_with(|| course.clone());
            }
            return Value::Object(merged);
        }
    }
    value.clone()
}

struct DecodedWine {
    course: Option<String>,
    wine: WinePairing,
}

fn wine_from_value(value: &Value, path: &str, source_required: bool) -> PipelineResult<DecodedWine> {
    let flattened = flatten_pairing(value);
    if !flattened.is_object() {
        return Err(PipelineError::decode(path, format!("expected an object, got {}", type_name(value))));
    }
    let wire: WireWine = from_value(flattened, path)?;

    let wine_name = wire.wine_name.trim().to_string();
    if wine_name.is_empty() {
        return Err(PipelineError::decode(format!("{}.wineName", path), "empty wine name"));
    }

    let source = match wire.source.as_deref() {
        Some(label) => WineSource::parse(label).ok_or_else(|| {
            PipelineError::decode(format!("{}.source", path), format!("unknown source '{}'", label))
        })?,
        None if source_required => {
            return Err(PipelineError::decode(format!("{}.source", path), "missing required key"));
        }
        None => WineSource::ToPurchase,
    };

    let quantity = wire.quantity.unwrap_or(1);
    if quantity == 0 {
        return Err(PipelineError::decode(format!("{}.quantity", path), "quantity must be at least 1"));
    }

    let compatibility = match wire.compatibility {
        None => None,
        Some(c) => {
            if !(0.0..=100.0).contains(&c.score) {
                return Err(PipelineError::decode(
                    format!("{}.compatibility.score", path),
                    format!("score {} outside 0-100", c.score),
                ));
            }
            Some(Compatibility {
                score: c.score.round() as u8,
                strengths: c.strengths,
                weaknesses: c.weaknesses,
            })
        }
    };

    Ok(DecodedWine {
        course: wire.course,
        wine: WinePairing {
            id: ItemId::new(),
            producer: wire.producer.trim().to_string(),
            wine_name,
            vintage: parse_vintage(wire.vintage, path)?,
            source,
            quantity,
            reasoning: wire.reasoning.trim().to_string(),
            compatibility,
        },
    })
}

fn decode_etiquette(value: Option<&Value>) -> PipelineResult<Etiquette> {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return Ok(Etiquette::default());
    };
    let wire: WireEtiquette = from_value(value.clone(), "$.etiquette")?;
    let text = |t: Option<WireText>| t.map(WireText::into_string).unwrap_or_default();
    Ok(Etiquette {
        invitation: text(wire.invitation),
        reception: text(wire.reception),
        table: text(wire.table),
    })
}

fn optional_text(root: &Map<String, Value>, key: &str) -> PipelineResult<Option<String>> {
    match root.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => {
            let text: WireText = from_value(value.clone(), &format!("$.{}", key))?;
            Ok(Some(text.into_string()).filter(|t| !t.is_empty()))
        }
    }
}

/// Decodes a full menu completion.
///
/// Required: `menu` with at least one dish, and a non-empty `winePairings`
/// whose every `course` names a populated course. Everything else has a
/// default.
pub fn decode_menu(raw: &str, options: &DecodeOptions) -> PipelineResult<MenuResponse> {
    let root = parse_root(raw)?;

    let courses = decode_courses(required(&root, "menu", "$")?, options)?;

    let pairings_value = required(&root, "winePairings", "$")?;
    let pairings_raw = as_array(pairings_value, "$.winePairings")?;
    if pairings_raw.is_empty() {
        return Err(PipelineError::decode("$.winePairings", "empty required array"));
    }
    let mut wine_pairings = Vec::with_capacity(pairings_raw.len());
    for (index, item) in pairings_raw.iter().enumerate() {
        let path = format!("$.winePairings[{}]", index);
        let decoded = wine_from_value(item, &path, true)?;
        let label = decoded
            .course
            .ok_or_else(|| PipelineError::decode(format!("{}.course", path), "missing required key"))?;
        let course = CourseKind::parse(&label).ok_or_else(|| {
            PipelineError::decode(format!("{}.course", path), format!("unknown course '{}'", label))
        })?;
        if courses.bucket(course).is_empty() {
            return Err(PipelineError::decode(
                format!("{}.course", path),
                format!("references {} but that course has no dishes", course),
            ));
        }
        wine_pairings.push(CoursePairing {
            course,
            wine: decoded.wine,
        });
    }

    let mut purchase_suggestions = Vec::new();
    if let Some(value) = root
        .get("purchaseSuggestions")
        .or_else(|| root.get("wineSuggestions"))
        .filter(|v| !v.is_null())
    {
        for (index, item) in as_array(value, "$.purchaseSuggestions")?.iter().enumerate() {
            let mut decoded = wine_from_value(item, &format!("$.purchaseSuggestions[{}]", index), false)?;
            decoded.wine.source = WineSource::ToPurchase;
            purchase_suggestions.push(decoded.wine);
        }
    }

    if options.cellar_is_empty {
        let mut forced = 0;
        for pairing in &mut wine_pairings {
            if pairing.wine.source == WineSource::FromCellar {
                pairing.wine.source = WineSource::ToPurchase;
                forced += 1;
            }
        }
        if forced > 0 {
            warn!(forced, "cellar is empty, cellar pairings switched to purchase");
        }
    }

    let menu = MenuResponse {
        courses,
        wine_pairings,
        purchase_suggestions,
        service_notes: optional_text(&root, "serviceNotes")?.unwrap_or_default(),
        etiquette: decode_etiquette(root.get("etiquette"))?,
        reasoning: optional_text(&root, "reasoning")?,
        wine_strategy: optional_text(&root, "wineStrategy")?,
        season_context: optional_text(&root, "seasonContext")?,
        guest_considerations: optional_text(&root, "guestConsiderations")?,
    };
    debug!(
        dishes = menu.courses.dish_count(),
        pairings = menu.wine_pairings.len(),
        suggestions = menu.purchase_suggestions.len(),
        "menu decoded"
    );
    Ok(menu)
}

/// Decodes a single replacement dish: `{"dish": {..}}` or a bare dish.
pub fn decode_dish(raw: &str, options: &DecodeOptions) -> PipelineResult<Dish> {
    let root = parse_root(raw)?;
    match root.get("dish") {
        Some(inner) => dish_from_value(inner, "$.dish", options),
        None => dish_from_value(&Value::Object(root), "$", options),
    }
}

/// Decodes a single replacement wine: `{"wine": {..}}` or a bare wine.
/// A missing source defaults to `ToPurchase`.
pub fn decode_wine(raw: &str, options: &DecodeOptions) -> PipelineResult<WinePairing> {
    let root = parse_root(raw)?;
    let value = Value::Object(root);
    let path = if value.get("wine").map_or(false, Value::is_object) {
        "$.wine"
    } else {
        "$"
    };
    let mut wine = wine_from_value(&value, path, false)?.wine;
    if options.cellar_is_empty {
        wine.source = WineSource::ToPurchase;
    }
    Ok(wine)
}
