use std::collections::BTreeMap;

use super::StockedWine;
use crate::config::SnapshotLimits;

/// Compact text listing of the cellar for prompt inclusion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventorySnapshot {
    pub text: String,
    /// Wines listed line by line.
    pub listed: usize,
    /// Wines handed to the builder.
    pub total: usize,
}

impl InventorySnapshot {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn is_truncated(&self) -> bool {
        self.listed < self.total
    }
}

fn snapshot_line(stocked: &StockedWine<'_>) -> String {
    let wine = stocked.wine;
    let mut line = format!("- {}", wine.display_name());
    if let Some(vintage) = wine.vintage {
        line.push_str(&format!(" {}", vintage));
    }
    line.push_str(&format!(" | {}", wine.wine_type.label()));
    if let Some(region) = &wine.region {
        line.push_str(&format!(" | {}", region));
    }
    if let Some(grape) = &wine.grape {
        line.push_str(&format!(" | {}", grape));
    }
    line.push_str(&format!(" | qty {}", stocked.quantity));
    line
}

/// Lists wines in inventory order until either limit is hit, then
/// summarizes the remainder by type. `max_chars` bounds the listed lines,
/// the first one included; the one-line summary comes on top of it. The
/// caller decides which wines are passed in (normally `Cellar::in_stock`).
pub fn build_inventory_snapshot(wines: &[StockedWine<'_>], limits: SnapshotLimits) -> InventorySnapshot {
    if wines.is_empty() {
        return InventorySnapshot {
            text: "(the cellar is empty)".to_string(),
            listed: 0,
            total: 0,
        };
    }

    let mut text = String::new();
    let mut listed = 0;
    for stocked in wines {
        if listed >= limits.max_wines {
            break;
        }
        let line = snapshot_line(stocked);
        let separator = usize::from(!text.is_empty());
        if text.len() + separator + line.len() > limits.max_chars {
            break;
        }
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&line);
        listed += 1;
    }

    if listed < wines.len() {
        let mut remaining_by_type: BTreeMap<&'static str, (usize, u32)> = BTreeMap::new();
        for stocked in &wines[listed..] {
            let entry = remaining_by_type.entry(stocked.wine.wine_type.label()).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += stocked.quantity;
        }
        let breakdown = remaining_by_type
            .iter()
            .map(|(label, (count, bottles))| format!("{} {} ({} bottles)", count, label, bottles))
            .collect::<Vec<_>>()
            .join(", ");
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&format!(
            "... plus {} more wines not listed: {}",
            wines.len() - listed,
            breakdown
        ));
    }

    InventorySnapshot {
        text,
        listed,
        total: wines.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cellar::test_support::sample_cellar;

    #[test]
    fn test_snapshot_lists_in_stock_wines_in_order() {
        let cellar = sample_cellar();
        let snapshot = build_inventory_snapshot(&cellar.in_stock(), SnapshotLimits::default());
        let lines: Vec<&str> = snapshot.text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "- Vietti Barolo Castiglione 2018 | red | qty 3");
        assert!(lines[2].starts_with("- Ca' del Bosco Franciacorta"));
        assert!(!snapshot.is_truncated());
    }

    #[test]
    fn test_snapshot_truncates_by_count_with_summary() {
        let cellar = sample_cellar();
        let limits = SnapshotLimits {
            max_wines: 1,
            max_chars: 10_000,
        };
        let snapshot = build_inventory_snapshot(&cellar.in_stock(), limits);
        assert_eq!(snapshot.listed, 1);
        assert_eq!(snapshot.total, 3);
        assert!(snapshot
            .text
            .ends_with("... plus 2 more wines not listed: 1 sparkling (1 bottles), 1 white (3 bottles)"));
    }

    #[test]
    fn test_snapshot_char_budget_covers_the_first_line() {
        let cellar = sample_cellar();
        let first = "- Vietti Barolo Castiglione 2018 | red | qty 3";
        let limits = SnapshotLimits {
            max_wines: 100,
            max_chars: first.len(),
        };
        let snapshot = build_inventory_snapshot(&cellar.in_stock(), limits);
        assert_eq!(snapshot.listed, 1);
        assert!(snapshot.text.starts_with(first));

        let limits = SnapshotLimits {
            max_wines: 100,
            max_chars: 5,
        };
        let snapshot = build_inventory_snapshot(&cellar.in_stock(), limits);
        assert_eq!(snapshot.listed, 0);
        assert!(snapshot.is_truncated());
        assert!(snapshot.text.starts_with("... plus 3 more wines not listed"));
    }

    #[test]
    fn test_zero_wine_budget_has_no_leading_newline() {
        let cellar = sample_cellar();
        let limits = SnapshotLimits {
            max_wines: 0,
            max_chars: 10_000,
        };
        let snapshot = build_inventory_snapshot(&cellar.in_stock(), limits);
        assert_eq!(snapshot.listed, 0);
        assert_eq!(snapshot.text.lines().count(), 1);
        assert!(snapshot.text.starts_with("... plus 3 more wines"));
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = build_inventory_snapshot(&[], SnapshotLimits::default());
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.text, "(the cellar is empty)");
    }
}
