//! Single-item edits on an existing menu.
//!
//! Edits are addressed by `ItemId`. The positional `*_at` variants resolve
//! an index to an id first and fail with `IndexOutOfRange` when the index
//! no longer fits. A replacement is decoded completely before it is
//! spliced in, so a failed edit leaves the menu untouched. Nothing here
//! serializes concurrent edits: the last write wins.

use tracing::{debug, info};

use super::decoder::{decode_dish, decode_wine, DecodeOptions};
use super::generator::MenuGenerator;
use super::model::{CourseKind, Dish, ItemId, MenuRequest, MenuResponse, WineList, WinePairing, WineSource};
use super::prompt::{build_dish_prompt, build_wine_prompt, dish_json_schema, wine_json_schema};
use crate::cellar::Cellar;
use crate::error::{PipelineError, PipelineResult};

fn dish_not_found(id: ItemId) -> PipelineError {
    PipelineError::NotFound(format!("dish {}", id))
}

fn wine_not_found(id: ItemId) -> PipelineError {
    PipelineError::NotFound(format!("wine {}", id))
}

/// Resolves `course[index]` to the dish id at that position.
pub fn dish_id_at(menu: &MenuResponse, course: CourseKind, index: usize) -> PipelineResult<ItemId> {
    let dishes = menu.courses.bucket(course);
    dishes
        .get(index)
        .map(|d| d.id)
        .ok_or_else(|| PipelineError::IndexOutOfRange {
            list: course.json_key().to_string(),
            index,
            len: dishes.len(),
        })
}

/// Resolves `list[index]` to the wine id at that position.
pub fn wine_id_at(menu: &MenuResponse, list: WineList, index: usize) -> PipelineResult<ItemId> {
    menu.wine_at(list, index)
        .map(|w| w.id)
        .ok_or_else(|| PipelineError::IndexOutOfRange {
            list: list.label().to_string(),
            index,
            len: menu.wine_list_len(list),
        })
}

/// Removes one dish. Pairings for its course are left as they are, even
/// when this empties the course; see `MenuResponse::orphaned_pairings`.
pub fn delete_dish(menu: &mut MenuResponse, id: ItemId) -> PipelineResult<Dish> {
    let (course, index) = menu.find_dish(id).ok_or_else(|| dish_not_found(id))?;
    let removed = menu.courses.bucket_mut(course).remove(index);
    debug!(%id, course = %course, index, "dish deleted");
    Ok(removed)
}

pub fn delete_dish_at(menu: &mut MenuResponse, course: CourseKind, index: usize) -> PipelineResult<Dish> {
    let id = dish_id_at(menu, course, index)?;
    delete_dish(menu, id)
}

pub fn delete_wine(menu: &mut MenuResponse, id: ItemId) -> PipelineResult<WinePairing> {
    let removed = match menu.find_wine(id).ok_or_else(|| wine_not_found(id))? {
        (WineList::Pairings, index) => menu.wine_pairings.remove(index).wine,
        (WineList::Suggestions, index) => menu.purchase_suggestions.remove(index),
    };
    debug!(%id, "wine deleted");
    Ok(removed)
}

pub fn delete_wine_at(menu: &mut MenuResponse, list: WineList, index: usize) -> PipelineResult<WinePairing> {
    let id = wine_id_at(menu, list, index)?;
    delete_wine(menu, id)
}

/// Source-addressed form: `FromCellar` targets the pairing list and
/// `ToPurchase` the suggestion list.
pub fn delete_wine_by_source(menu: &mut MenuResponse, source: WineSource, index: usize) -> PipelineResult<WinePairing> {
    delete_wine_at(menu, WineList::from_source(source), index)
}

impl MenuGenerator {
    /// Replaces one dish with a freshly generated one for the same course.
    /// Returns the id of the new dish.
    pub async fn regenerate_dish(
        &self,
        menu: &mut MenuResponse,
        request: &MenuRequest,
        id: ItemId,
    ) -> PipelineResult<ItemId> {
        self.client().ensure_configured()?;
        let (course, _) = menu.find_dish(id).ok_or_else(|| dish_not_found(id))?;
        let current = menu.dish(id).ok_or_else(|| dish_not_found(id))?;

        let prompt = build_dish_prompt(request, menu, course, current, &self.settings().language);
        let raw = self.complete_edit("dish", prompt, dish_json_schema()).await?;
        let replacement = decode_dish(
            &raw,
            &DecodeOptions {
                default_servings: request.person_count.max(1),
                ..DecodeOptions::default()
            },
        )?;

        let (course, index) = menu.find_dish(id).ok_or_else(|| dish_not_found(id))?;
        let new_id = replacement.id;
        info!(old = %id, new = %new_id, course = %course, index, name = %replacement.name, "dish regenerated");
        menu.courses.bucket_mut(course)[index] = replacement;
        Ok(new_id)
    }

    pub async fn regenerate_dish_at(
        &self,
        menu: &mut MenuResponse,
        request: &MenuRequest,
        course: CourseKind,
        index: usize,
    ) -> PipelineResult<ItemId> {
        let id = dish_id_at(menu, course, index)?;
        self.regenerate_dish(menu, request, id).await
    }

    /// Replaces one wine. A course pairing keeps its course; a purchase
    /// suggestion stays `ToPurchase`. Returns the id of the new wine.
    pub async fn regenerate_wine(
        &self,
        menu: &mut MenuResponse,
        request: &MenuRequest,
        cellar: &Cellar,
        id: ItemId,
    ) -> PipelineResult<ItemId> {
        self.client().ensure_configured()?;
        let (list, index) = menu.find_wine(id).ok_or_else(|| wine_not_found(id))?;

        let snapshot = self.snapshot(cellar);
        let prompt = build_wine_prompt(request, menu, list, index, &snapshot, &self.settings().language);
        let raw = self.complete_edit("wine", prompt, wine_json_schema()).await?;
        let mut replacement = decode_wine(&raw, &Self::decode_options(request, &snapshot))?;

        let (list, index) = menu.find_wine(id).ok_or_else(|| wine_not_found(id))?;
        let new_id = replacement.id;
        info!(old = %id, new = %new_id, list = list.label(), index, wine = %replacement.display_name(), "wine regenerated");
        match list {
            WineList::Pairings => menu.wine_pairings[index].wine = replacement,
            WineList::Suggestions => {
                replacement.source = WineSource::ToPurchase;
                menu.purchase_suggestions[index] = replacement;
            }
        }
        Ok(new_id)
    }

    pub async fn regenerate_wine_at(
        &self,
        menu: &mut MenuResponse,
        request: &MenuRequest,
        cellar: &Cellar,
        list: WineList,
        index: usize,
    ) -> PipelineResult<ItemId> {
        let id = wine_id_at(menu, list, index)?;
        self.regenerate_wine(menu, request, cellar, id).await
    }

    pub async fn regenerate_wine_by_source(
        &self,
        menu: &mut MenuResponse,
        request: &MenuRequest,
        cellar: &Cellar,
        source: WineSource,
        index: usize,
    ) -> PipelineResult<ItemId> {
        self.regenerate_wine_at(menu, request, cellar, WineList::from_source(source), index)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_connection::{ScriptedClient, ScriptedReply};
    use crate::cellar::test_support::sample_cellar;
    use crate::menu::generator::test_support::{generator, request};
    use crate::menu::model::test_support::sample_menu;
    use std::sync::Arc;

    const RISOTTO: &str = r#"{"dish": {"name": "Risotto al nero di seppia", "description": "Squid ink risotto",
        "recipe": {"ingredients": ["rice", "squid ink"], "steps": ["Toast rice", "Add ink"]}}}"#;
    const GAVI: &str = r#"{"wine": {"producer": "La Scolca", "wineName": "Gavi dei Gavi", "source": "fromCellar", "quantity": 2}}"#;

    #[tokio::test]
    async fn test_regenerate_dish_touches_only_target() {
        let client = Arc::new(ScriptedClient::with_replies([RISOTTO]));
        let gen = generator(client.clone());
        let before = sample_menu();
        let mut menu = before.clone();

        let new_id = gen
            .regenerate_dish_at(&mut menu, &request(), CourseKind::Starter, 1)
            .await
            .unwrap();

        assert_eq!(menu.courses.starters.len(), 2);
        assert_eq!(menu.courses.starters[1].id, new_id);
        assert_eq!(menu.courses.starters[1].name, "Risotto al nero di seppia");
        assert_eq!(menu.courses.starters[0], before.courses.starters[0]);

        // restore the slot and everything must be identical to the original
        let mut restored = menu.clone();
        restored.courses.starters[1] = before.courses.starters[1].clone();
        assert_eq!(restored, before);

        let sent = client.requests();
        assert_eq!(sent[0].label, "dish");
        assert_eq!(sent[0].tier, crate::api_connection::ModelTier::Fast);
        let format = sent[0].response_format.as_ref().unwrap();
        assert_eq!(format.format_type, "json_schema");
    }

    #[tokio::test]
    async fn test_regenerate_dish_out_of_range_leaves_menu_unchanged() {
        let client = Arc::new(ScriptedClient::with_replies([RISOTTO]));
        let gen = generator(client.clone());
        let before = sample_menu();
        let mut menu = before.clone();

        let err = gen
            .regenerate_dish_at(&mut menu, &request(), CourseKind::Starter, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::IndexOutOfRange { index: 5, len: 2, .. }));
        assert_eq!(menu, before);
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_decode_is_not_applied() {
        let client = Arc::new(ScriptedClient::with_replies([r#"{"dish": {"name": ""}}"#]));
        let gen = generator(client);
        let before = sample_menu();
        let mut menu = before.clone();
        let id = menu.courses.mains[0].id;

        assert!(gen.regenerate_dish(&mut menu, &request(), id).await.is_err());
        assert_eq!(menu, before);
    }

    #[tokio::test]
    async fn test_network_failure_is_not_applied() {
        let client = Arc::new(ScriptedClient::new());
        client.push(ScriptedReply::NetworkDown);
        let gen = generator(client);
        let before = sample_menu();
        let mut menu = before.clone();
        let id = menu.wine_pairings[0].wine.id;

        let err = gen
            .regenerate_wine(&mut menu, &request(), &sample_cellar(), id)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Network(_)));
        assert_eq!(menu, before);
    }

    #[tokio::test]
    async fn test_regenerate_pairing_keeps_course() {
        let client = Arc::new(ScriptedClient::with_replies([GAVI]));
        let gen = generator(client);
        let before = sample_menu();
        let mut menu = before.clone();

        gen.regenerate_wine_by_source(&mut menu, &request(), &sample_cellar(), WineSource::FromCellar, 1)
            .await
            .unwrap();

        assert_eq!(menu.wine_pairings[1].course, CourseKind::Main);
        assert_eq!(menu.wine_pairings[1].wine.wine_name, "Gavi dei Gavi");
        assert_eq!(menu.wine_pairings[0], before.wine_pairings[0]);
        assert_eq!(menu.purchase_suggestions, before.purchase_suggestions);
        assert_eq!(menu.courses, before.courses);
    }

    #[tokio::test]
    async fn test_regenerated_suggestion_stays_purchase() {
        let client = Arc::new(ScriptedClient::with_replies([GAVI]));
        let gen = generator(client);
        let mut menu = sample_menu();

        gen.regenerate_wine_at(&mut menu, &request(), &sample_cellar(), WineList::Suggestions, 0)
            .await
            .unwrap();
        assert_eq!(menu.purchase_suggestions[0].source, WineSource::ToPurchase);
    }

    #[tokio::test]
    async fn test_regenerate_unknown_id_is_not_found() {
        let gen = generator(Arc::new(ScriptedClient::new()));
        let mut menu = sample_menu();
        let err = gen.regenerate_dish(&mut menu, &request(), ItemId::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[test]
    fn test_delete_dish_removes_exactly_one() {
        let before = sample_menu();
        let mut menu = before.clone();
        let removed = delete_dish_at(&mut menu, CourseKind::Starter, 0).unwrap();
        assert_eq!(removed.name, "Bruschetta");
        assert_eq!(menu.courses.starters.len(), 1);
        assert_eq!(menu.courses.starters[0], before.courses.starters[1]);
        assert_eq!(menu.courses.mains, before.courses.mains);
        assert_eq!(menu.wine_pairings, before.wine_pairings);
    }

    #[test]
    fn test_random_deletes_only_remove_the_addressed_dish() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..200 {
            let before = sample_menu();
            let mut menu = before.clone();
            let course = CourseKind::ALL[rng.gen_range(0..CourseKind::ALL.len())];
            let len = menu.courses.bucket(course).len();
            let index = rng.gen_range(0..len + 2);

            match delete_dish_at(&mut menu, course, index) {
                Ok(removed) => {
                    let mut expected = before.courses.bucket(course).clone();
                    assert_eq!(expected.remove(index), removed);
                    assert_eq!(menu.courses.bucket(course), &expected);
                    *menu.courses.bucket_mut(course) = before.courses.bucket(course).clone();
                    assert_eq!(menu, before);
                }
                Err(err) => {
                    assert!(index >= len);
                    assert!(matches!(err, PipelineError::IndexOutOfRange { .. }));
                    assert_eq!(menu, before);
                }
            }
        }
    }

    #[test]
    fn test_delete_last_dish_leaves_pairing_dangling() {
        let mut menu = sample_menu();
        delete_dish_at(&mut menu, CourseKind::Main, 0).unwrap();
        assert!(menu.courses.mains.is_empty());
        assert_eq!(menu.wine_pairings.len(), 2);
        assert_eq!(menu.orphaned_pairings().len(), 1);
    }

    #[test]
    fn test_delete_wine_by_source_and_stale_index() {
        let mut menu = sample_menu();
        let removed = delete_wine_by_source(&mut menu, WineSource::ToPurchase, 0).unwrap();
        assert_eq!(removed.wine_name, "Moscato d'Asti");
        assert!(menu.purchase_suggestions.is_empty());

        let err = delete_wine_at(&mut menu, WineList::Suggestions, 0).unwrap_err();
        assert!(matches!(err, PipelineError::IndexOutOfRange { index: 0, len: 0, .. }));
    }
}
