use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::menu::model::{CourseKind, WineList, WineSource};

#[derive(Parser, Debug)]
#[command(name = "cellar-menu", author, version, about = "Plan dinner menus and wine pairings from your cellar", long_about = None)]
pub struct Cli {
    /// Cellar inventory CSV (producer,name,vintage,type,region,quantity,location)
    #[arg(short, long, global = true, default_value = "cellar.csv")]
    pub cellar: PathBuf,

    /// Dinner store file
    #[arg(short, long, global = true, default_value = "dinners.json")]
    pub store: PathBuf,

    /// Owner recorded on new dinners
    #[arg(short, long, global = true, default_value = "local")]
    pub user: String,

    /// Log pipeline stages at info level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a full menu, for an existing dinner or a new one
    Generate(GenerateArgs),
    /// Print a dinner and its menu
    Show {
        dinner: String,
        /// Emit the stored menu as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace one dish
    RegenerateDish(DishTarget),
    /// Remove one dish
    DeleteDish(DishTarget),
    /// Replace one wine
    RegenerateWine(WineTarget),
    /// Remove one wine
    DeleteWine(WineTarget),
    /// Look a wine up in the cellar, or every wine of a dinner
    Match(MatchArgs),
    /// Freeze chosen wines for serving and confirm the dinner
    Confirm {
        dinner: String,
        /// Wine ids to confirm; all pairings when empty
        wines: Vec<String>,
    },
    /// Move a dinner to another status
    Status {
        dinner: String,
        #[arg(value_enum)]
        status: StatusArg,
    },
    /// Show the recent prompts and raw completions
    DebugLog {
        /// Only the last N entries
        #[arg(short = 'n', long)]
        last: Option<usize>,
        /// Print prompts in full
        #[arg(long)]
        full: bool,
        #[arg(long)]
        clear: bool,
    },
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Existing dinner id; a new dinner is created when omitted
    #[arg(long)]
    pub dinner: Option<String>,
    #[arg(long, required_unless_present = "dinner")]
    pub title: Option<String>,
    /// YYYY-MM-DD
    #[arg(long, required_unless_present = "dinner")]
    pub date: Option<NaiveDate>,
    #[arg(long, default_value_t = 4)]
    pub guests: u32,
    /// Free text that overrides everything else in the request
    #[arg(long)]
    pub notes: Option<String>,
    /// omnivore, vegetarian, vegan, pescatarian, gluten-free, ...
    #[arg(long)]
    pub diet: Option<String>,
    #[arg(long)]
    pub cuisine: Option<String>,
    #[arg(long)]
    pub occasion: Option<String>,
    /// Print the server response shape instead of a summary
    #[arg(long)]
    pub json: bool,
}

/// A dish by id, or by course and position.
#[derive(Args, Debug)]
pub struct DishTarget {
    pub dinner: String,
    #[arg(long, conflicts_with_all = ["course", "index"], required_unless_present_all = ["course", "index"])]
    pub id: Option<String>,
    /// starters, firstCourses, mainCourses, sides, desserts (aliases accepted)
    #[arg(long, requires = "index")]
    pub course: Option<String>,
    #[arg(long, requires = "course")]
    pub index: Option<usize>,
}

/// A wine by id, or by list (or source) and position.
#[derive(Args, Debug)]
pub struct WineTarget {
    pub dinner: String,
    #[arg(long, conflicts_with_all = ["list", "source", "index"])]
    pub id: Option<String>,
    #[arg(long, value_enum, conflicts_with = "source", requires = "index")]
    pub list: Option<ListArg>,
    /// fromCellar targets pairings, toPurchase targets purchase suggestions
    #[arg(long, value_enum, requires = "index")]
    pub source: Option<SourceArg>,
    #[arg(long)]
    pub index: Option<usize>,
}

#[derive(Args, Debug)]
pub struct MatchArgs {
    /// Check every wine of this dinner's menu
    #[arg(long, conflicts_with_all = ["producer", "name"])]
    pub dinner: Option<String>,
    #[arg(long)]
    pub producer: Option<String>,
    #[arg(long, required_unless_present = "dinner")]
    pub name: Option<String>,
    #[arg(long)]
    pub vintage: Option<u16>,
    /// Alternatives listed when nothing matches
    #[arg(long, default_value_t = crate::availability::DEFAULT_MAX_ALTERNATIVES)]
    pub alternatives: usize,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusArg {
    Planning,
    Confirmed,
    Completed,
    Cancelled,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListArg {
    Pairings,
    Suggestions,
}

impl From<ListArg> for WineList {
    fn from(arg: ListArg) -> Self {
        match arg {
            ListArg::Pairings => WineList::Pairings,
            ListArg::Suggestions => WineList::Suggestions,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceArg {
    #[value(name = "fromCellar", alias = "from-cellar")]
    FromCellar,
    #[value(name = "toPurchase", alias = "to-purchase")]
    ToPurchase,
}

impl From<SourceArg> for WineSource {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::FromCellar => WineSource::FromCellar,
            SourceArg::ToPurchase => WineSource::ToPurchase,
        }
    }
}

impl WineTarget {
    /// The list a positional target points into, if any.
    pub fn positional(&self) -> Option<(WineList, usize)> {
        let list = match (self.list, self.source) {
            (Some(list), _) => list.into(),
            (None, Some(source)) => WineList::from_source(source.into()),
            (None, None) => return None,
        };
        self.index.map(|index| (list, index))
    }
}

impl DishTarget {
    pub fn positional(&self) -> Option<(Option<CourseKind>, usize)> {
        match (&self.course, self.index) {
            (Some(course), Some(index)) => Some((CourseKind::parse(course), index)),
            _ => None,
        }
    }
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
