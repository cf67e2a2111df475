//! Dinner events and the menu they own.
//!
//! The menu is kept as an opaque versioned blob so a stored dinner always
//! says which layout it was written with.

pub mod store;

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::availability::AvailabilityMatcher;
use crate::cellar::{Cellar, WineType};
use crate::error::{PipelineError, PipelineResult};
use crate::menu::model::{CourseKind, DietType, ItemId, MenuRequest, MenuResponse, TastePreferences, WineList};

pub use store::DinnerStore;

/// Layout version written in front of every menu blob.
pub const MENU_BLOB_VERSION: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DinnerId(pub Uuid);

impl DinnerId {
    pub fn new() -> Self {
        DinnerId(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(DinnerId)
    }
}

impl Default for DinnerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DinnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DinnerStatus {
    #[default]
    Planning,
    Confirmed,
    Completed,
    Cancelled,
}

impl DinnerStatus {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "planning" => Some(DinnerStatus::Planning),
            "confirmed" => Some(DinnerStatus::Confirmed),
            "completed" => Some(DinnerStatus::Completed),
            "cancelled" | "canceled" => Some(DinnerStatus::Cancelled),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DinnerStatus::Planning => "planning",
            DinnerStatus::Confirmed => "confirmed",
            DinnerStatus::Completed => "completed",
            DinnerStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(&self, next: DinnerStatus) -> bool {
        use DinnerStatus::*;
        matches!(
            (self, next),
            (Planning, Confirmed)
                | (Confirmed, Completed)
                | (Planning, Cancelled)
                | (Confirmed, Cancelled)
                | (Confirmed, Planning)
        )
    }
}

impl fmt::Display for DinnerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A pairing frozen at confirmation time for serving and fridge planning.
/// Later menu edits do not reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedWine {
    pub pairing_id: ItemId,
    pub producer: String,
    pub wine_name: String,
    pub vintage: Option<u16>,
    pub course: Option<CourseKind>,
    pub quantity: u32,
    pub wine_type: Option<WineType>,
    /// Inclusive, degrees Celsius.
    pub serving_temperature_c: Option<(u8, u8)>,
    pub cellar_location: Option<String>,
    pub confirmed_at: DateTime<Utc>,
}

impl ConfirmedWine {
    pub fn display_name(&self) -> String {
        match (self.producer.trim(), self.wine_name.trim()) {
            ("", name) => name.to_string(),
            (producer, "") => producer.to_string(),
            (producer, name) => format!("{} {}", producer, name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DinnerEvent {
    pub id: DinnerId,
    pub owner: String,
    pub title: String,
    pub date: NaiveDate,
    pub guest_count: u32,
    pub occasion: Option<String>,
    pub diet: DietType,
    pub cuisine: String,
    /// Highest-priority input to generation.
    pub notes: Option<String>,
    pub status: DinnerStatus,
    #[serde(default, with = "store::base64_blob")]
    pub menu_blob: Option<Vec<u8>>,
    #[serde(default)]
    pub confirmed_wines: Vec<ConfirmedWine>,
    pub updated_at: DateTime<Utc>,
}

impl DinnerEvent {
    pub fn new(owner: &str, title: &str, date: NaiveDate, guest_count: u32) -> Self {
        Self {
            id: DinnerId::new(),
            owner: owner.to_string(),
            title: title.to_string(),
            date,
            guest_count,
            occasion: None,
            diet: DietType::default(),
            cuisine: String::new(),
            notes: None,
            status: DinnerStatus::Planning,
            menu_blob: None,
            confirmed_wines: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn menu_request(&self, taste: Option<TastePreferences>) -> MenuRequest {
        MenuRequest {
            title: self.title.clone(),
            date: self.date,
            person_count: self.guest_count,
            occasion: self.occasion.clone(),
            diet: self.diet,
            cuisine: self.cuisine.clone(),
            notes: self.notes.clone(),
            taste,
        }
    }

    pub fn has_menu(&self) -> bool {
        self.menu_blob.is_some()
    }

    /// Decodes the stored menu. `NotFound` when none has been generated.
    pub fn menu(&self) -> PipelineResult<MenuResponse> {
        match &self.menu_blob {
            Some(blob) => decode_menu_blob(blob),
            None => Err(PipelineError::NotFound(format!("menu of dinner {}", self.id))),
        }
    }

    /// Replaces the stored menu wholesale.
    pub fn set_menu(&mut self, menu: &MenuResponse) -> PipelineResult<()> {
        self.menu_blob = Some(encode_menu_blob(menu)?);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn transition(&mut self, next: DinnerStatus) -> PipelineResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        info!(dinner = %self.id, from = %self.status, to = %next, "dinner status changed");
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Freezes the chosen wines and moves the dinner to `confirmed`. A
    /// dinner that is already confirmed gets its selection replaced.
    /// Nothing changes when any id is unknown.
    pub fn confirm_wines(&mut self, ids: &[ItemId], cellar: &Cellar) -> PipelineResult<&[ConfirmedWine]> {
        if self.status != DinnerStatus::Confirmed && !self.status.can_transition_to(DinnerStatus::Confirmed) {
            return Err(PipelineError::InvalidTransition {
                from: self.status.to_string(),
                to: DinnerStatus::Confirmed.to_string(),
            });
        }
        let menu = self.menu()?;
        let matcher = AvailabilityMatcher::new(cellar);
        let now = Utc::now();

        let mut confirmed = Vec::with_capacity(ids.len());
        for id in ids {
            let (list, index) = menu
                .find_wine(*id)
                .ok_or_else(|| PipelineError::NotFound(format!("wine {}", id)))?;
            let (course, wine) = match list {
                WineList::Pairings => {
                    let pairing = &menu.wine_pairings[index];
                    (Some(pairing.course), &pairing.wine)
                }
                WineList::Suggestions => (None, &menu.purchase_suggestions[index]),
            };

            let found = matcher.check_pairing(wine);
            let found = found.in_cellar();
            let wine_type = found
                .map(|m| m.wine_type)
                .or_else(|| WineType::infer_from_text(&wine.display_name()));
            if wine_type.is_none() {
                warn!(wine = %wine.display_name(), "could not tell the wine type, no serving temperature");
            }
            confirmed.push(ConfirmedWine {
                pairing_id: wine.id,
                producer: wine.producer.clone(),
                wine_name: wine.wine_name.clone(),
                vintage: wine.vintage,
                course,
                quantity: wine.quantity,
                wine_type,
                serving_temperature_c: wine_type.map(|t| t.serving_temperature_c()),
                cellar_location: found.map(|m| m.location.clone()).filter(|l| !l.is_empty()),
                confirmed_at: now,
            });
        }

        if self.status != DinnerStatus::Confirmed {
            self.transition(DinnerStatus::Confirmed)?;
        }
        self.confirmed_wines = confirmed;
        self.updated_at = now;
        Ok(&self.confirmed_wines)
    }
}

/// `[version: u16 BE][bincode payload]`.
pub fn encode_menu_blob(menu: &MenuResponse) -> PipelineResult<Vec<u8>> {
    let payload = bincode::serialize(menu).map_err(|e| PipelineError::Storage(format!("menu encode failed: {}", e)))?;
    let mut blob = Vec::with_capacity(payload.len() + 2);
    blob.extend_from_slice(&MENU_BLOB_VERSION.to_be_bytes());
    blob.extend_from_slice(&payload);
    Ok(blob)
}

pub fn decode_menu_blob(blob: &[u8]) -> PipelineResult<MenuResponse> {
    if blob.len() < 2 {
        return Err(PipelineError::decode("menu_blob", "blob shorter than its version header"));
    }
    let version = u16::from_be_bytes([blob[0], blob[1]]);
    if version != MENU_BLOB_VERSION {
        return Err(PipelineError::decode(
            "menu_blob",
            format!("unsupported menu blob version {} (expected {})", version, MENU_BLOB_VERSION),
        ));
    }
    bincode::deserialize(&blob[2..]).map_err(|e| PipelineError::decode("menu_blob", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cellar::test_support::sample_cellar;
    use crate::menu::model::test_support::sample_menu;

    fn dinner_with_menu() -> (DinnerEvent, MenuResponse) {
        let mut dinner = DinnerEvent::new(
            "user-1",
            "Cena estiva",
            NaiveDate::from_ymd_opt(2026, 7, 18).unwrap(),
            4,
        );
        let menu = sample_menu();
        dinner.set_menu(&menu).unwrap();
        (dinner, menu)
    }

    #[test]
    fn test_menu_blob_keeps_every_field() {
        let menu = sample_menu();
        let blob = encode_menu_blob(&menu).unwrap();
        assert_eq!(&blob[..2], &MENU_BLOB_VERSION.to_be_bytes());
        assert_eq!(decode_menu_blob(&blob).unwrap(), menu);
    }

    #[test]
    fn test_unknown_blob_version_is_decode_error() {
        let mut blob = encode_menu_blob(&sample_menu()).unwrap();
        blob[0] = 0xFF;
        let err = decode_menu_blob(&blob).unwrap_err();
        assert!(matches!(err, PipelineError::Decode { .. }));
        assert!(err.to_string().contains("version"));

        assert!(decode_menu_blob(&[0x00]).is_err());
    }

    #[test]
    fn test_status_transitions() {
        use DinnerStatus::*;
        assert!(Planning.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Planning));
        assert!(Confirmed.can_transition_to(Completed));
        assert!(!Planning.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Planning));

        let (mut dinner, _) = dinner_with_menu();
        dinner.transition(Cancelled).unwrap();
        let err = dinner.transition(Confirmed).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTransition { .. }));
        assert_eq!(dinner.status, Cancelled);
    }

    #[test]
    fn test_confirm_wines_snapshots_pairings() {
        let (mut dinner, menu) = dinner_with_menu();
        let soave = menu.wine_pairings[0].wine.id;
        let moscato = menu.purchase_suggestions[0].id;

        let confirmed = dinner.confirm_wines(&[soave, moscato], &sample_cellar()).unwrap().to_vec();
        assert_eq!(confirmed.len(), 2);
        assert_eq!(confirmed[0].course, Some(CourseKind::Starter));
        assert_eq!(confirmed[0].wine_type, Some(WineType::White));
        assert_eq!(confirmed[0].serving_temperature_c, Some((8, 12)));
        assert_eq!(confirmed[0].cellar_location.as_deref(), Some("Fridge (3)"));
        assert_eq!(confirmed[1].course, None);
        assert_eq!(confirmed[1].wine_type, Some(WineType::Dessert));
        assert_eq!(dinner.status, DinnerStatus::Confirmed);

        // later menu edits do not reach the snapshot
        let mut edited = dinner.menu().unwrap();
        edited.wine_pairings.clear();
        dinner.set_menu(&edited).unwrap();
        assert_eq!(dinner.confirmed_wines, confirmed);
    }

    #[test]
    fn test_confirm_unknown_wine_changes_nothing() {
        let (mut dinner, _) = dinner_with_menu();
        let err = dinner.confirm_wines(&[ItemId::new()], &sample_cellar()).unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
        assert_eq!(dinner.status, DinnerStatus::Planning);
        assert!(dinner.confirmed_wines.is_empty());
    }

    #[test]
    fn test_menu_request_carries_dinner_fields() {
        let (mut dinner, _) = dinner_with_menu();
        dinner.notes = Some("solo pesce".to_string());
        let request = dinner.menu_request(None);
        assert_eq!(request.person_count, 4);
        assert_eq!(request.notes.as_deref(), Some("solo pesce"));
    }
}
