//! Server-side entry point: `{dinnerId, userId}` in, menu plus wine
//! proposals out, in the camelCase shape web and mobile clients consume.

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::availability::{AvailabilityMatcher, WineAvailability};
use crate::cellar::Cellar;
use crate::dinner::{DinnerId, DinnerStore};
use crate::error::{PipelineError, PipelineResult};
use crate::menu::model::{CourseKind, Dish, MenuResponse, WineSource};
use crate::menu::MenuGenerator;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub dinner_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub menu: Option<MenuView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wine_proposals: Option<WineProposals>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerateResponse {
    fn failure(err: &PipelineError) -> Self {
        Self {
            success: false,
            menu: None,
            wine_proposals: None,
            error: Some(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuView {
    pub courses: CoursesView,
    pub reasoning: Option<String>,
    pub wine_strategy: Option<String>,
    pub season_context: Option<String>,
    pub guest_considerations: Option<String>,
    /// Minutes, prep plus cook over every dish.
    pub total_prep_time: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoursesView {
    pub starters: Vec<DishView>,
    pub first_courses: Vec<DishView>,
    pub main_courses: Vec<DishView>,
    pub sides: Vec<DishView>,
    pub desserts: Vec<DishView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DishView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub servings: u32,
    pub ingredients: Vec<String>,
    pub prep_time: u32,
    pub cook_time: u32,
    pub difficulty: String,
    pub instructions: Vec<String>,
    pub tips: Option<String>,
}

impl From<&Dish> for DishView {
    fn from(dish: &Dish) -> Self {
        Self {
            id: dish.id.to_string(),
            name: dish.name.clone(),
            description: dish.description.clone(),
            servings: dish.servings,
            ingredients: dish
                .recipe
                .ingredients
                .iter()
                .map(|i| {
                    if i.quantity.is_empty() {
                        i.name.clone()
                    } else {
                        format!("{} {}", i.quantity, i.name)
                    }
                })
                .collect(),
            prep_time: dish.recipe.prep_minutes,
            cook_time: dish.recipe.cook_minutes,
            difficulty: format!("{:?}", dish.recipe.difficulty).to_lowercase(),
            instructions: dish.recipe.steps.clone(),
            tips: dish.recipe.tips.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WineProposals {
    /// Cellar pairings the matcher found in stock.
    pub available: Vec<WineProposal>,
    /// Everything that has to be bought.
    pub suggested: Vec<WineProposal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WineProposal {
    pub id: String,
    pub name: String,
    pub vintage: Option<u16>,
    pub course: Option<String>,
    pub quantity: u32,
    pub reasoning: String,
    pub in_cellar: Option<u32>,
    pub location: Option<String>,
}

impl MenuView {
    pub fn from_menu(menu: &MenuResponse) -> Self {
        let dishes = |kind: CourseKind| menu.courses.bucket(kind).iter().map(DishView::from).collect();
        Self {
            courses: CoursesView {
                starters: dishes(CourseKind::Starter),
                first_courses: dishes(CourseKind::First),
                main_courses: dishes(CourseKind::Main),
                sides: dishes(CourseKind::Side),
                desserts: dishes(CourseKind::Dessert),
            },
            reasoning: menu.reasoning.clone(),
            wine_strategy: menu.wine_strategy.clone(),
            season_context: menu.season_context.clone(),
            guest_considerations: menu.guest_considerations.clone(),
            total_prep_time: menu.total_prep_minutes(),
        }
    }
}

impl WineProposals {
    /// A `FromCellar` pairing the cellar actually holds is available; every
    /// other wine, including unmatched cellar picks, is a suggestion.
    pub fn from_menu(menu: &MenuResponse, cellar: &Cellar) -> Self {
        let report = AvailabilityMatcher::new(cellar).check_menu(menu);
        let mut proposals = WineProposals {
            available: Vec::new(),
            suggested: Vec::new(),
        };
        for (entry, course) in report.iter().zip(course_of_each_wine(menu)) {
            let Some(wine) = menu.wine(entry.item_id) else {
                continue;
            };
            let found = entry.availability.in_cellar();
            let proposal = WineProposal {
                id: entry.item_id.to_string(),
                name: entry.display_name.clone(),
                vintage: wine.vintage,
                course: course.map(|c| c.json_key().to_string()),
                quantity: wine.quantity,
                reasoning: wine.reasoning.clone(),
                in_cellar: found.map(|m| m.quantity),
                location: found.map(|m| m.location.clone()),
            };
            if is_available(entry) {
                proposals.available.push(proposal);
            } else {
                proposals.suggested.push(proposal);
            }
        }
        proposals
    }
}

fn is_available(entry: &WineAvailability) -> bool {
    entry.source == WineSource::FromCellar
        && entry.availability.in_cellar().map_or(false, |found| found.quantity > 0)
}

/// Same order as `MenuResponse::all_wines`.
fn course_of_each_wine(menu: &MenuResponse) -> impl Iterator<Item = Option<CourseKind>> + '_ {
    menu.wine_pairings
        .iter()
        .map(|p| Some(p.course))
        .chain(menu.purchase_suggestions.iter().map(|_| None))
}

/// Loads the dinner, generates, stores and saves. Failures come back as
/// `{success: false, error}` and leave the stored dinner untouched.
pub async fn handle_generate(
    store: &mut DinnerStore,
    cellar: &Cellar,
    generator: &MenuGenerator,
    request: &GenerateRequest,
) -> GenerateResponse {
    match generate_for(store, cellar, generator, request).await {
        Ok((menu, proposals)) => GenerateResponse {
            success: true,
            menu: Some(menu),
            wine_proposals: Some(proposals),
            error: None,
        },
        Err(err) => {
            error!(dinner = %request.dinner_id, error = %err, "backend generation failed");
            GenerateResponse::failure(&err)
        }
    }
}

async fn generate_for(
    store: &mut DinnerStore,
    cellar: &Cellar,
    generator: &MenuGenerator,
    request: &GenerateRequest,
) -> PipelineResult<(MenuView, WineProposals)> {
    let id = DinnerId::parse(&request.dinner_id)
        .ok_or_else(|| PipelineError::NotFound(format!("dinner {}", request.dinner_id)))?;
    // other users' dinners look exactly like missing ones
    if store.require(id)?.owner != request.user_id {
        return Err(PipelineError::NotFound(format!("dinner {}", id)));
    }

    let menu = store.generate_menu(id, generator, cellar, None).await?;
    store.save()?;
    info!(dinner = %id, user = %request.user_id, "backend generation stored");
    Ok((MenuView::from_menu(&menu), WineProposals::from_menu(&menu, cellar)))
}
