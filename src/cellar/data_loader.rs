use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

use super::{Bottle, Cellar, Wine, WineId, WineType};

// Expected column headers
const PRODUCER_COL: &str = "producer";
const NAME_COL: &str = "name";
const VINTAGE_COL: &str = "vintage";
const TYPE_COL: &str = "type";
const QUANTITY_COL: &str = "quantity";
// Optional columns
const REGION_COL: &str = "region";
const GRAPE_COL: &str = "grape";
const LOCATION_COL: &str = "location";

fn parse_optional_u16(s: &str) -> Option<u16> {
    s.trim().parse::<u16>().ok()
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Loads a cellar export where every row is one bottle lot.
///
/// Rows sharing (producer, name, vintage) fold into a single `Wine` with
/// several `Bottle` lots. Rows with no name or an unknown type are skipped
/// with a warning; a missing required column is an error.
pub fn load_cellar_csv(csv_path: &Path) -> Result<Cellar> {
    if !csv_path.exists() {
        return Err(anyhow::anyhow!("Cellar CSV file not found at: {:?}", csv_path));
    }

    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open cellar CSV file at {:?}", csv_path))?;
    let mut rdr = ReaderBuilder::new().has_headers(true).trim(csv::Trim::All).from_reader(file);

    let headers = rdr.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let required = |name: &str| column(name).ok_or_else(|| anyhow::anyhow!("Column '{}' not found", name));

    let producer_idx = required(PRODUCER_COL)?;
    let name_idx = required(NAME_COL)?;
    let vintage_idx = required(VINTAGE_COL)?;
    let type_idx = required(TYPE_COL)?;
    let quantity_idx = required(QUANTITY_COL)?;
    let region_idx = column(REGION_COL);
    let grape_idx = column(GRAPE_COL);
    let location_idx = column(LOCATION_COL);

    let mut wines: Vec<Wine> = Vec::new();
    let mut bottles: Vec<Bottle> = Vec::new();
    let mut seen: HashMap<(String, String, Option<u16>), WineId> = HashMap::new();

    for (row_index, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read record at row index {}", row_index))?;

        let name = record.get(name_idx).unwrap_or_default().to_string();
        if name.is_empty() {
            warn!(row = row_index + 1, "skipping cellar row with empty name");
            continue;
        }
        let type_label = record.get(type_idx).unwrap_or_default();
        let Some(wine_type) = WineType::parse(type_label) else {
            warn!(row = row_index + 1, wine_type = type_label, "skipping cellar row with unknown wine type");
            continue;
        };
        let producer = record.get(producer_idx).unwrap_or_default().to_string();
        let vintage = record.get(vintage_idx).and_then(parse_optional_u16);
        let quantity = record
            .get(quantity_idx)
            .and_then(|q| q.parse::<u32>().ok())
            .with_context(|| format!("Invalid quantity at row {}", row_index + 1))?;

        let key = (producer.to_lowercase(), name.to_lowercase(), vintage);
        let wine_id = match seen.get(&key) {
            Some(id) => *id,
            None => {
                let id = WineId(wines.len() as u32 + 1);
                wines.push(Wine {
                    id,
                    producer,
                    name,
                    vintage,
                    wine_type,
                    region: region_idx.and_then(|i| non_empty(record.get(i))),
                    grape: grape_idx.and_then(|i| non_empty(record.get(i))),
                });
                seen.insert(key, id);
                id
            }
        };

        bottles.push(Bottle {
            wine_id,
            quantity,
            location: location_idx.and_then(|i| non_empty(record.get(i))),
        });
    }

    debug!(wines = wines.len(), lots = bottles.len(), path = ?csv_path, "cellar loaded");
    Ok(Cellar::new(wines, bottles))
}
