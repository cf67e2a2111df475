use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use cellar_menu::api_connection::{DebugLog, DebugOutcome, HttpCompletionClient};
use cellar_menu::availability::{Availability, AvailabilityMatcher};
use cellar_menu::backend::{handle_generate, GenerateRequest};
use cellar_menu::cellar::{load_cellar_csv, Cellar};
use cellar_menu::cli::{parse_args, Cli, Command, DishTarget, GenerateArgs, MatchArgs, StatusArg, WineTarget};
use cellar_menu::config::Settings;
use cellar_menu::dinner::{DinnerEvent, DinnerId, DinnerStatus, DinnerStore};
use cellar_menu::menu::{dish_id_at, wine_id_at, CourseKind, DietType, ItemId, MenuGenerator, MenuResponse};
use tracing::level_filters::LevelFilter;
use tracing::warn;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = parse_args();

    let default_level = if cli.verbose { LevelFilter::INFO } else { LevelFilter::WARN };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::from_env();
    let debug_log_path = cli.store.with_extension("debug.json");
    let debug_log = Arc::new(
        DebugLog::load_json(&debug_log_path, settings.debug_log_cap)
            .with_context(|| format!("Failed to read debug log '{}'", debug_log_path.display()))?,
    );
    let client = HttpCompletionClient::from_settings(&settings).with_debug_log(Arc::clone(&debug_log));
    let generator = MenuGenerator::new(Arc::new(client), settings);

    let calls_model = matches!(
        cli.command,
        Command::Generate(_) | Command::RegenerateDish(_) | Command::RegenerateWine(_)
    );
    let outcome = run(&cli, &generator, &debug_log).await;

    // keep what was sent even when the call failed
    if calls_model {
        debug_log
            .save_json(&debug_log_path)
            .with_context(|| format!("Failed to write debug log '{}'", debug_log_path.display()))?;
    }
    outcome
}

async fn run(cli: &Cli, generator: &MenuGenerator, debug_log: &DebugLog) -> Result<()> {
    match &cli.command {
        Command::Generate(args) => generate(cli, generator, args).await,
        Command::Show { dinner, json } => {
            let store = open_store(&cli.store)?;
            let dinner = store.require(parse_dinner_id(dinner)?)?;
            if *json {
                let menu = dinner.menu()?;
                println!("{}", serde_json::to_string_pretty(&menu)?);
            } else {
                print_dinner(dinner)?;
            }
            Ok(())
        }
        Command::RegenerateDish(target) => {
            let mut store = open_store(&cli.store)?;
            let (dinner_id, dish_id) = resolve_dish(&store, target)?;
            let new_id = store.regenerate_dish(dinner_id, generator, dish_id, None).await?;
            store.save().context("Failed to save dinner store")?;
            let menu = store.require(dinner_id)?.menu()?;
            if let Some(dish) = menu.dish(new_id) {
                println!("Replaced with {} [{}]: {}", dish.name, dish.id, dish.description);
            }
            Ok(())
        }
        Command::DeleteDish(target) => {
            let mut store = open_store(&cli.store)?;
            let (dinner_id, dish_id) = resolve_dish(&store, target)?;
            let removed = store.delete_dish(dinner_id, dish_id)?;
            store.save().context("Failed to save dinner store")?;
            println!("Deleted {}", removed.name);
            warn_orphans(&store.require(dinner_id)?.menu()?);
            Ok(())
        }
        Command::RegenerateWine(target) => {
            let mut store = open_store(&cli.store)?;
            let cellar = load_cellar(&cli.cellar)?;
            let (dinner_id, wine_id) = resolve_wine(&store, target)?;
            let new_id = store
                .regenerate_wine(dinner_id, generator, &cellar, wine_id, None)
                .await?;
            store.save().context("Failed to save dinner store")?;
            let menu = store.require(dinner_id)?.menu()?;
            if let Some(wine) = menu.wine(new_id) {
                println!("Replaced with {} [{}] ({})", wine.display_name(), wine.id, wine.source.json_name());
            }
            Ok(())
        }
        Command::DeleteWine(target) => {
            let mut store = open_store(&cli.store)?;
            let (dinner_id, wine_id) = resolve_wine(&store, target)?;
            let removed = store.delete_wine(dinner_id, wine_id)?;
            store.save().context("Failed to save dinner store")?;
            println!("Deleted {}", removed.display_name());
            Ok(())
        }
        Command::Match(args) => match_wines(cli, args),
        Command::Confirm { dinner, wines } => {
            let mut store = open_store(&cli.store)?;
            let cellar = load_cellar(&cli.cellar)?;
            let dinner_id = parse_dinner_id(dinner)?;
            let ids: Vec<ItemId> = if wines.is_empty() {
                let menu = store.require(dinner_id)?.menu()?;
                menu.wine_pairings.iter().map(|p| p.wine.id).collect()
            } else {
                wines.iter().map(|raw| parse_item_id(raw)).collect::<Result<Vec<_>>>()?
            };
            let confirmed = store.require_mut(dinner_id)?.confirm_wines(&ids, &cellar)?.to_vec();
            store.save().context("Failed to save dinner store")?;
            println!("Confirmed {} wine(s):", confirmed.len());
            for wine in confirmed {
                let temperature = wine
                    .serving_temperature_c
                    .map(|(low, high)| format!("{}-{} °C", low, high))
                    .unwrap_or_else(|| "temperature unknown".to_string());
                let location = wine.cellar_location.as_deref().unwrap_or("to buy");
                println!("  {} x{} | {} | {}", wine.display_name(), wine.quantity, temperature, location);
            }
            Ok(())
        }
        Command::Status { dinner, status } => {
            let mut store = open_store(&cli.store)?;
            let dinner_id = parse_dinner_id(dinner)?;
            let next = match status {
                StatusArg::Planning => DinnerStatus::Planning,
                StatusArg::Confirmed => DinnerStatus::Confirmed,
                StatusArg::Completed => DinnerStatus::Completed,
                StatusArg::Cancelled => DinnerStatus::Cancelled,
            };
            store.require_mut(dinner_id)?.transition(next)?;
            store.save().context("Failed to save dinner store")?;
            println!("Dinner {} is now {}", dinner_id, next);
            Ok(())
        }
        Command::DebugLog { last, full, clear } => {
            if *clear {
                debug_log.clear();
                let path = cli.store.with_extension("debug.json");
                debug_log.save_json(&path)?;
                println!("Debug log cleared");
                return Ok(());
            }
            let entries = debug_log.entries();
            let skip = last.map_or(0, |n| entries.len().saturating_sub(n));
            if entries.is_empty() {
                println!("Debug log is empty");
            }
            for entry in entries.into_iter().skip(skip) {
                println!(
                    "[{}] {} via {}/{} in {} ms",
                    entry.at.format("%Y-%m-%d %H:%M:%S"),
                    entry.label,
                    entry.provider,
                    entry.model,
                    entry.elapsed_ms
                );
                if *full {
                    println!("--- system ---\n{}\n--- user ---\n{}", entry.system_prompt, entry.user_prompt);
                }
                match entry.outcome {
                    DebugOutcome::Response(text) => println!("--- response ---\n{}\n", text),
                    DebugOutcome::Error(error) => println!("--- error ---\n{}\n", error),
                }
            }
            Ok(())
        }
    }
}

async fn generate(cli: &Cli, generator: &MenuGenerator, args: &GenerateArgs) -> Result<()> {
    let mut store = open_store(&cli.store)?;
    let cellar = load_cellar(&cli.cellar)?;

    let dinner_id = match &args.dinner {
        Some(raw) => {
            let id = parse_dinner_id(raw)?;
            store.require(id)?;
            id
        }
        None => {
            let title = args.title.as_deref().ok_or_else(|| anyhow!("--title is required for a new dinner"))?;
            let date = args.date.ok_or_else(|| anyhow!("--date is required for a new dinner"))?;
            let mut dinner = DinnerEvent::new(&cli.user, title, date, args.guests);
            dinner.notes = args.notes.clone();
            dinner.occasion = args.occasion.clone();
            dinner.cuisine = args.cuisine.clone().unwrap_or_default();
            if let Some(diet) = &args.diet {
                dinner.diet = DietType::parse(diet).ok_or_else(|| anyhow!("Unknown diet '{}'", diet))?;
            }
            let id = store.insert(dinner);
            store.save().context("Failed to save dinner store")?;
            println!("Created dinner {}", id);
            id
        }
    };

    if args.json {
        let request = GenerateRequest {
            dinner_id: dinner_id.to_string(),
            user_id: store.require(dinner_id)?.owner.clone(),
        };
        let response = handle_generate(&mut store, &cellar, generator, &request).await;
        println!("{}", serde_json::to_string_pretty(&response)?);
        if !response.success {
            bail!("Menu generation failed");
        }
        return Ok(());
    }

    store
        .generate_menu(dinner_id, generator, &cellar, None)
        .await
        .context("Menu generation failed")?;
    store.save().context("Failed to save dinner store")?;
    print_dinner(store.require(dinner_id)?)
}

fn match_wines(cli: &Cli, args: &MatchArgs) -> Result<()> {
    let cellar = load_cellar(&cli.cellar)?;
    let matcher = AvailabilityMatcher::new(&cellar).with_max_alternatives(args.alternatives);

    if let Some(raw) = &args.dinner {
        let store = open_store(&cli.store)?;
        let menu = store.require(parse_dinner_id(raw)?)?.menu()?;
        for entry in matcher.check_menu(&menu) {
            print!("{} (needs {}): ", entry.display_name, entry.bottles_needed);
            print_availability(&entry.availability);
        }
        return Ok(());
    }

    let name = args.name.as_deref().unwrap_or_default();
    let producer = args.producer.as_deref().unwrap_or_default();
    print_availability(&matcher.check(producer, name, args.vintage));
    Ok(())
}

fn print_availability(availability: &Availability) {
    match availability {
        Availability::InCellar(found) => println!(
            "in cellar as {} - {} bottle(s) at {}",
            found.display_name, found.quantity, found.location
        ),
        Availability::NotInCellar {
            inferred_type,
            alternatives,
        } => {
            println!("not in cellar");
            if let Some(wine_type) = inferred_type {
                for alt in alternatives {
                    println!("    {} alternative: {} ({} bottles)", wine_type, alt.display_name, alt.quantity);
                }
            }
        }
    }
}

fn print_dinner(dinner: &DinnerEvent) -> Result<()> {
    println!(
        "{} [{}] - {} - {} guests - {}",
        dinner.title, dinner.id, dinner.date, dinner.guest_count, dinner.status
    );
    if let Some(notes) = &dinner.notes {
        println!("Notes: {}", notes);
    }
    if !dinner.has_menu() {
        println!("No menu yet.");
        return Ok(());
    }
    let menu = dinner.menu()?;
    print_menu(&menu);
    if !dinner.confirmed_wines.is_empty() {
        println!("\nConfirmed wines:");
        for wine in &dinner.confirmed_wines {
            println!("  {} x{}", wine.display_name(), wine.quantity);
        }
    }
    Ok(())
}

fn print_menu(menu: &MenuResponse) {
    for (course, dishes) in menu.courses.populated() {
        println!("\n{}", course.label());
        for dish in dishes {
            println!(
                "  {} [{}] - {} ({} + {} min)",
                dish.name, dish.id, dish.description, dish.recipe.prep_minutes, dish.recipe.cook_minutes
            );
        }
    }
    if !menu.wine_pairings.is_empty() {
        println!("\nWine pairings:");
        for pairing in &menu.wine_pairings {
            println!(
                "  {}: {} [{}] x{} ({})",
                pairing.course.label(),
                pairing.wine.display_name(),
                pairing.wine.id,
                pairing.wine.quantity,
                pairing.wine.source.json_name()
            );
        }
    }
    if !menu.purchase_suggestions.is_empty() {
        println!("\nTo purchase:");
        for wine in &menu.purchase_suggestions {
            println!("  {} [{}] - {}", wine.display_name(), wine.id, wine.reasoning);
        }
    }
    if !menu.service_notes.is_empty() {
        println!("\nService: {}", menu.service_notes);
    }
    println!("\nTotal preparation: {} min", menu.total_prep_minutes());
    warn_orphans(menu);
}

fn warn_orphans(menu: &MenuResponse) {
    for orphan in menu.orphaned_pairings() {
        warn!(course = %orphan.course, wine = %orphan.wine.display_name(), "pairing has no dish left in its course");
        println!(
            "Note: {} is paired with {}, which has no dishes left",
            orphan.wine.display_name(),
            orphan.course.label()
        );
    }
}

fn resolve_dish(store: &DinnerStore, target: &DishTarget) -> Result<(DinnerId, ItemId)> {
    let dinner_id = parse_dinner_id(&target.dinner)?;
    if let Some(raw) = &target.id {
        return Ok((dinner_id, parse_item_id(raw)?));
    }
    let (course, index) = target
        .positional()
        .ok_or_else(|| anyhow!("Give either --id or --course with --index"))?;
    let course: CourseKind = course.ok_or_else(|| {
        anyhow!(
            "Unknown course '{}'",
            target.course.as_deref().unwrap_or_default()
        )
    })?;
    let menu = store.require(dinner_id)?.menu()?;
    Ok((dinner_id, dish_id_at(&menu, course, index)?))
}

fn resolve_wine(store: &DinnerStore, target: &WineTarget) -> Result<(DinnerId, ItemId)> {
    let dinner_id = parse_dinner_id(&target.dinner)?;
    if let Some(raw) = &target.id {
        return Ok((dinner_id, parse_item_id(raw)?));
    }
    let (list, index) = target
        .positional()
        .ok_or_else(|| anyhow!("Give either --id or --list/--source with --index"))?;
    let menu = store.require(dinner_id)?.menu()?;
    Ok((dinner_id, wine_id_at(&menu, list, index)?))
}

fn parse_dinner_id(raw: &str) -> Result<DinnerId> {
    DinnerId::parse(raw).ok_or_else(|| anyhow!("'{}' is not a dinner id", raw))
}

fn parse_item_id(raw: &str) -> Result<ItemId> {
    ItemId::parse(raw).ok_or_else(|| anyhow!("'{}' is not an item id", raw))
}

fn open_store(path: &Path) -> Result<DinnerStore> {
    DinnerStore::open(path).with_context(|| format!("Failed to open dinner store '{}'", path.display()))
}

/// A missing cellar file plans against an empty cellar.
fn load_cellar(path: &Path) -> Result<Cellar> {
    if !path.exists() {
        warn!(path = %path.display(), "cellar file not found, planning with an empty cellar");
        return Ok(Cellar::default());
    }
    load_cellar_csv(path).with_context(|| format!("Failed to load cellar from '{}'", path.display()))
}
