//! Looks up generated wine names in the live cellar.
//!
//! Pairings come from free-text completion and rarely echo the stored
//! strings exactly, so matching is a scored text comparison on producer and
//! name. False negatives are acceptable; a wrong positive is not, so a
//! candidate needs a name hit before the producer is even considered.

use serde::Serialize;
use tracing::debug;

use crate::cellar::{Cellar, Wine, WineId, WineType};
use crate::menu::model::{ItemId, MenuResponse, WinePairing, WineSource};

pub const DEFAULT_MAX_ALTERNATIVES: usize = 3;

const EXACT_SCORE: u32 = 100;
const MATCH_THRESHOLD: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellarMatch {
    pub wine_id: WineId,
    pub display_name: String,
    pub vintage: Option<u16>,
    pub wine_type: WineType,
    /// Sum over every bottle lot of the wine.
    pub quantity: u32,
    pub location: String,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alternative {
    pub wine_id: WineId,
    pub display_name: String,
    pub vintage: Option<u16>,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Availability {
    InCellar(CellarMatch),
    #[serde(rename_all = "camelCase")]
    NotInCellar {
        inferred_type: Option<WineType>,
        alternatives: Vec<Alternative>,
    },
}

impl Availability {
    pub fn is_match(&self) -> bool {
        matches!(self, Availability::InCellar(_))
    }

    pub fn in_cellar(&self) -> Option<&CellarMatch> {
        match self {
            Availability::InCellar(found) => Some(found),
            Availability::NotInCellar { .. } => None,
        }
    }
}

/// Availability of one wine of a menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WineAvailability {
    pub item_id: ItemId,
    pub display_name: String,
    pub source: WineSource,
    pub bottles_needed: u32,
    pub availability: Availability,
}

impl WineAvailability {
    /// True when the cellar holds at least as many bottles as the pairing asks for.
    pub fn is_covered(&self) -> bool {
        self.availability
            .in_cellar()
            .map_or(false, |found| found.quantity >= self.bottles_needed)
    }
}

pub struct AvailabilityMatcher<'a> {
    cellar: &'a Cellar,
    max_alternatives: usize,
}

impl<'a> AvailabilityMatcher<'a> {
    pub fn new(cellar: &'a Cellar) -> Self {
        Self {
            cellar,
            max_alternatives: DEFAULT_MAX_ALTERNATIVES,
        }
    }

    pub fn with_max_alternatives(mut self, max_alternatives: usize) -> Self {
        self.max_alternatives = max_alternatives;
        self
    }

    pub fn check_pairing(&self, pairing: &WinePairing) -> Availability {
        self.check(&pairing.producer, &pairing.wine_name, pairing.vintage)
    }

    /// Best in-stock match for a producer/name pair, or ranked same-type
    /// alternatives when nothing scores high enough. Wines with no bottles
    /// left never match.
    pub fn check(&self, producer: &str, name: &str, vintage: Option<u16>) -> Availability {
        let query = Query::new(producer, name, vintage);

        let best = self
            .cellar
            .in_stock()
            .into_iter()
            .filter_map(|stocked| {
                let score = query.score(stocked.wine);
                (score >= MATCH_THRESHOLD).then_some((stocked, score))
            })
            .max_by(|(a, a_score), (b, b_score)| {
                a_score
                    .cmp(b_score)
                    .then_with(|| a.quantity.cmp(&b.quantity))
                    // lower id wins a full tie
                    .then_with(|| b.wine.id.cmp(&a.wine.id))
            });

        if let Some((stocked, score)) = best {
            let wine = stocked.wine;
            debug!(query = %query.full, wine = %wine.display_name(), score, "cellar match");
            return Availability::InCellar(CellarMatch {
                wine_id: wine.id,
                display_name: wine.display_name(),
                vintage: wine.vintage,
                wine_type: wine.wine_type,
                quantity: stocked.quantity,
                location: self.cellar.location_summary(wine.id),
                score,
            });
        }

        let inferred_type = WineType::infer_from_text(&format!("{} {}", producer, name));
        let alternatives = inferred_type
            .map(|wine_type| self.alternatives(wine_type, &query))
            .unwrap_or_default();
        debug!(query = %query.full, ?inferred_type, alternatives = alternatives.len(), "no cellar match");
        Availability::NotInCellar {
            inferred_type,
            alternatives,
        }
    }

    /// Every wine of a menu, pairings first.
    pub fn check_menu(&self, menu: &MenuResponse) -> Vec<WineAvailability> {
        menu.all_wines()
            .map(|wine| WineAvailability {
                item_id: wine.id,
                display_name: wine.display_name(),
                source: wine.source,
                bottles_needed: wine.quantity,
                availability: self.check_pairing(wine),
            })
            .collect()
    }

    /// In-stock wines of `wine_type`, ranked by shared region/words with the
    /// query, then by bottles on hand.
    fn alternatives(&self, wine_type: WineType, query: &Query) -> Vec<Alternative> {
        let mut ranked: Vec<(u32, u32, &Wine)> = self
            .cellar
            .in_stock()
            .into_iter()
            .filter(|stocked| stocked.wine.wine_type == wine_type)
            .map(|stocked| (query.affinity(stocked.wine), stocked.quantity, stocked.wine))
            .collect();
        ranked.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| b.1.cmp(&a.1))
                .then_with(|| a.2.display_name().cmp(&b.2.display_name()))
        });
        ranked
            .into_iter()
            .take(self.max_alternatives)
            .map(|(_, quantity, wine)| Alternative {
                wine_id: wine.id,
                display_name: wine.display_name(),
                vintage: wine.vintage,
                quantity,
            })
            .collect()
    }
}

struct Query {
    producer: String,
    name: String,
    full: String,
    vintage: Option<u16>,
}

impl Query {
    fn new(producer: &str, name: &str, vintage: Option<u16>) -> Self {
        let producer = normalize(producer);
        let name = normalize(name);
        let full = normalize(&format!("{} {}", producer, name));
        Self {
            producer,
            name,
            full,
            vintage,
        }
    }

    fn score(&self, wine: &Wine) -> u32 {
        if self.full.is_empty() {
            return 0;
        }
        let wine_full = normalize(&wine.display_name());
        let mut score = if wine_full == self.full {
            EXACT_SCORE
        } else {
            let name = text_score(&self.name, &normalize(&wine.name));
            if name == 0 {
                // the producer may have been folded into the name field
                if contains_phrase(&wine_full, &self.full) || contains_phrase(&self.full, &wine_full) {
                    60
                } else {
                    0
                }
            } else {
                let producer = text_score(&self.producer, &normalize(&wine.producer));
                if !self.producer.is_empty() && producer == 0 {
                    0
                } else {
                    name + producer
                }
            }
        };
        if score > 0 {
            if let (Some(wanted), Some(have)) = (self.vintage, wine.vintage) {
                if wanted == have {
                    score += 5;
                }
            }
        }
        score
    }

    /// Loose similarity used only to order alternatives.
    fn affinity(&self, wine: &Wine) -> u32 {
        let haystack = normalize(&format!(
            "{} {} {}",
            wine.display_name(),
            wine.region.as_deref().unwrap_or(""),
            wine.grape.as_deref().unwrap_or("")
        ));
        self.full
            .split(' ')
            .filter(|token| token.len() > 2 && contains_phrase(&haystack, token))
            .count() as u32
    }
}

/// 45 for equal strings, 30 when one contains the other on word
/// boundaries, 0 otherwise.
fn text_score(query: &str, stored: &str) -> u32 {
    if query.is_empty() || stored.is_empty() {
        return 0;
    }
    if query == stored {
        45
    } else if contains_phrase(stored, query) || contains_phrase(query, stored) {
        30
    } else {
        0
    }
}

fn contains_phrase(haystack: &str, needle: &str) -> bool {
    !needle.is_empty() && format!(" {} ", haystack).contains(&format!(" {} ", needle))
}

/// Lowercase, strip common accents, punctuation to spaces, collapse runs.
fn normalize(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'à' | 'á' | 'â' | 'ä' | 'ã' => 'a',
            'è' | 'é' | 'ê' | 'ë' => 'e',
            'ì' | 'í' | 'î' | 'ï' => 'i',
            'ò' | 'ó' | 'ô' | 'ö' | 'õ' => 'o',
            'ù' | 'ú' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            'ñ' => 'n',
            c if c.is_alphanumeric() => c,
            _ => ' ',
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cellar::test_support::{bottle, sample_cellar, wine};
    use crate::menu::model::test_support::sample_menu;

    #[test]
    fn test_normalize_folds_case_accents_and_punctuation() {
        assert_eq!(normalize("  Ca' del Bosco  "), "ca del bosco");
        assert_eq!(normalize("Cuvée PRESTIGE"), "cuvee prestige");
    }

    #[test]
    fn test_exact_display_name_sums_all_lots() {
        let cellar = sample_cellar();
        let matcher = AvailabilityMatcher::new(&cellar);

        let result = matcher.check("Vietti", "Barolo Castiglione", None);
        let found = result.in_cellar().expect("should match");
        assert_eq!(found.display_name, "Vietti Barolo Castiglione");
        assert_eq!(found.quantity, 3);
        assert_eq!(found.score, EXACT_SCORE);
        assert!(found.location.contains("(2)"));
    }

    #[test]
    fn test_loose_spelling_still_matches() {
        let cellar = sample_cellar();
        let matcher = AvailabilityMatcher::new(&cellar);

        let result = matcher.check("CA DEL BOSCO", "Franciacorta", Some(2019));
        let found = result.in_cellar().expect("should match");
        assert_eq!(found.display_name, "Ca' del Bosco Franciacorta Cuvée Prestige");
        assert_eq!(found.quantity, 1);
    }

    #[test]
    fn test_same_name_other_producer_is_not_a_match() {
        let cellar = sample_cellar();
        let matcher = AvailabilityMatcher::new(&cellar);
        let result = matcher.check("Inama", "Soave Classico", None);
        assert!(!result.is_match());
    }

    #[test]
    fn test_no_match_offers_same_type_alternatives() {
        let mut cellar = sample_cellar();
        cellar.wines.push(wine(10, "Giacomo Conterno", "Barbera d'Alba", Some(2020), WineType::Red));
        cellar.bottles.push(bottle(10, 6, Some("Rack B")));
        let matcher = AvailabilityMatcher::new(&cellar).with_max_alternatives(1);

        match matcher.check("Bruno Giacosa", "Barbaresco Asili", None) {
            Availability::NotInCellar {
                inferred_type,
                alternatives,
            } => {
                assert_eq!(inferred_type, Some(WineType::Red));
                assert_eq!(alternatives.len(), 1);
                // more bottles wins when nothing else distinguishes them
                assert_eq!(alternatives[0].display_name, "Giacomo Conterno Barbera d'Alba");
            }
            other => panic!("expected no match, got {:?}", other),
        }
    }

    #[test]
    fn test_out_of_stock_wine_is_not_a_match() {
        let cellar = sample_cellar();
        let matcher = AvailabilityMatcher::new(&cellar);
        assert!(!matcher.check("Empty Estate", "Nothing Left", Some(2015)).is_match());

        // an emptied red falls back to the reds still on hand
        let mut cellar = sample_cellar();
        cellar.wines[3].name = "Barolo Cannubi".to_string();
        match AvailabilityMatcher::new(&cellar).check("Empty Estate", "Barolo Cannubi", Some(2015)) {
            Availability::NotInCellar { alternatives, .. } => {
                assert_eq!(alternatives.len(), 1);
                assert_eq!(alternatives[0].display_name, "Vietti Barolo Castiglione");
            }
            other => panic!("expected no match, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_gives_no_alternatives() {
        let cellar = sample_cellar();
        let matcher = AvailabilityMatcher::new(&cellar);
        match matcher.check("Someone", "Something", None) {
            Availability::NotInCellar {
                inferred_type,
                alternatives,
            } => {
                assert!(inferred_type.is_none());
                assert!(alternatives.is_empty());
            }
            other => panic!("expected no match, got {:?}", other),
        }
    }

    #[test]
    fn test_check_menu_covers_pairings_then_suggestions() {
        let cellar = sample_cellar();
        let menu = sample_menu();
        let report = AvailabilityMatcher::new(&cellar).check_menu(&menu);

        assert_eq!(report.len(), 3);
        assert_eq!(report[0].display_name, "Pieropan Soave Classico");
        assert!(report[0].is_covered());
        assert!(!report[1].availability.is_match());
        assert_eq!(report[2].source, WineSource::ToPurchase);
    }
}
