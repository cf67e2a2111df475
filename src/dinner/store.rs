use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{DinnerEvent, DinnerId};
use crate::cellar::Cellar;
use crate::error::{PipelineError, PipelineResult};
use crate::menu::model::{Dish, ItemId, MenuResponse, TastePreferences, WinePairing};
use crate::menu::regenerate::{delete_dish, delete_wine};
use crate::menu::MenuGenerator;

const STORE_FORMAT_VERSION: u32 = 1;

/// Menu blobs are stored as base64 strings inside the JSON store file.
pub(crate) mod base64_blob {
    use base64::{engine::general_purpose, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(blob: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match blob {
            Some(bytes) => serializer.serialize_some(&general_purpose::STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| general_purpose::STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    dinners: Vec<DinnerEvent>,
}

/// All dinners, keyed by id and persisted to one JSON file.
///
/// Menu edits are read-modify-write on a single dinner with no version
/// check: the last `save` wins.
#[derive(Debug)]
pub struct DinnerStore {
    path: PathBuf,
    dinners: BTreeMap<DinnerId, DinnerEvent>,
}

impl DinnerStore {
    /// Opens the store at `path`; a missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> PipelineResult<Self> {
        let path = path.into();
        if !path.exists() {
            debug!(path = %path.display(), "no store file yet, starting empty");
            return Ok(Self {
                path,
                dinners: BTreeMap::new(),
            });
        }
        let content = fs::read_to_string(&path)?;
        let file: StoreFile = serde_json::from_str(&content)
            .map_err(|e| PipelineError::Storage(format!("{}: {}", path.display(), e)))?;
        if file.version != STORE_FORMAT_VERSION {
            return Err(PipelineError::Storage(format!(
                "{}: unsupported store version {}",
                path.display(),
                file.version
            )));
        }
        let dinners = file.dinners.into_iter().map(|d| (d.id, d)).collect();
        Ok(Self { path, dinners })
    }

    pub fn save(&self) -> PipelineResult<()> {
        let file = StoreFile {
            version: STORE_FORMAT_VERSION,
            dinners: self.dinners.values().cloned().collect(),
        };
        let serialized =
            serde_json::to_string_pretty(&file).map_err(|e| PipelineError::Storage(e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serialized)?;
        debug!(path = %self.path.display(), dinners = self.dinners.len(), "store saved");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.dinners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dinners.is_empty()
    }

    pub fn insert(&mut self, dinner: DinnerEvent) -> DinnerId {
        let id = dinner.id;
        self.dinners.insert(id, dinner);
        id
    }

    pub fn get(&self, id: DinnerId) -> Option<&DinnerEvent> {
        self.dinners.get(&id)
    }

    pub fn get_mut(&mut self, id: DinnerId) -> Option<&mut DinnerEvent> {
        self.dinners.get_mut(&id)
    }

    /// Dropping a dinner drops its menu and confirmed wines with it.
    pub fn remove(&mut self, id: DinnerId) -> Option<DinnerEvent> {
        self.dinners.remove(&id)
    }

    pub fn require(&self, id: DinnerId) -> PipelineResult<&DinnerEvent> {
        self.get(id)
            .ok_or_else(|| PipelineError::NotFound(format!("dinner {}", id)))
    }

    pub fn require_mut(&mut self, id: DinnerId) -> PipelineResult<&mut DinnerEvent> {
        self.dinners
            .get_mut(&id)
            .ok_or_else(|| PipelineError::NotFound(format!("dinner {}", id)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &DinnerEvent> + '_ {
        self.dinners.values()
    }

    pub fn for_owner<'a>(&'a self, owner: &'a str) -> impl Iterator<Item = &'a DinnerEvent> + 'a {
        self.dinners.values().filter(move |d| d.owner == owner)
    }

    /// Generates a fresh menu and overwrites the stored one.
    pub async fn generate_menu(
        &mut self,
        id: DinnerId,
        generator: &MenuGenerator,
        cellar: &Cellar,
        taste: Option<TastePreferences>,
    ) -> PipelineResult<MenuResponse> {
        let request = self.require(id)?.menu_request(taste);
        let menu = generator.generate(&request, cellar).await?;
        self.require_mut(id)?.set_menu(&menu)?;
        info!(dinner = %id, dishes = menu.courses.dish_count(), "menu stored");
        Ok(menu)
    }

    pub async fn regenerate_dish(
        &mut self,
        id: DinnerId,
        generator: &MenuGenerator,
        dish_id: ItemId,
        taste: Option<TastePreferences>,
    ) -> PipelineResult<ItemId> {
        let dinner = self.require(id)?;
        let request = dinner.menu_request(taste);
        let mut menu = dinner.menu()?;
        let new_id = generator.regenerate_dish(&mut menu, &request, dish_id).await?;
        self.require_mut(id)?.set_menu(&menu)?;
        Ok(new_id)
    }

    pub async fn regenerate_wine(
        &mut self,
        id: DinnerId,
        generator: &MenuGenerator,
        cellar: &Cellar,
        wine_id: ItemId,
        taste: Option<TastePreferences>,
    ) -> PipelineResult<ItemId> {
        let dinner = self.require(id)?;
        let request = dinner.menu_request(taste);
        let mut menu = dinner.menu()?;
        let new_id = generator
            .regenerate_wine(&mut menu, &request, cellar, wine_id)
            .await?;
        self.require_mut(id)?.set_menu(&menu)?;
        Ok(new_id)
    }

    pub fn delete_dish(&mut self, id: DinnerId, dish_id: ItemId) -> PipelineResult<Dish> {
        self.edit_menu(id, |menu| delete_dish(menu, dish_id))
    }

    pub fn delete_wine(&mut self, id: DinnerId, wine_id: ItemId) -> PipelineResult<WinePairing> {
        self.edit_menu(id, |menu| delete_wine(menu, wine_id))
    }

    fn edit_menu<T>(
        &mut self,
        id: DinnerId,
        edit: impl FnOnce(&mut MenuResponse) -> PipelineResult<T>,
    ) -> PipelineResult<T> {
        let dinner = self.require_mut(id)?;
        let mut menu = dinner.menu()?;
        let out = edit(&mut menu)?;
        dinner.set_menu(&menu)?;
        Ok(out)
    }
}
