pub mod decoder;
pub mod generator;
pub mod model;
pub mod prompt;
pub mod regenerate;

pub use decoder::{decode_dish, decode_menu, decode_wine, extract_json_span, DecodeOptions};
pub use generator::MenuGenerator;
pub use model::{
    Compatibility, CourseKind, CoursePairing, Courses, DietType, Difficulty, Dish, Etiquette,
    Ingredient, ItemId, MenuRequest, MenuResponse, Recipe, TastePreferences, WineList, WinePairing,
    WineSource,
};
pub use regenerate::{
    delete_dish, delete_dish_at, delete_wine, delete_wine_at, delete_wine_by_source, dish_id_at,
    wine_id_at,
};
