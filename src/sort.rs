// ↕️ Sort Engine - ordered read-only views of a pivot table
// The table itself is never reordered; each call returns a fresh view

use crate::pivot::{PivotRow, PivotTable, COMPANY_NAME, TOTAL_HOLDINGS};
use icu_collator::{Collator, CollatorOptions};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortColumn {
    CompanyName,
    TotalHoldings,
    Owner(String),
}

impl SortColumn {
    /// Column header as shown in the grid and in exports
    pub fn label(&self) -> &str {
        match self {
            SortColumn::CompanyName => COMPANY_NAME,
            SortColumn::TotalHoldings => TOTAL_HOLDINGS,
            SortColumn::Owner(name) => name,
        }
    }

    /// Parse a column header back into a column
    pub fn from_label(label: &str) -> Self {
        match label {
            COMPANY_NAME => SortColumn::CompanyName,
            TOTAL_HOLDINGS => SortColumn::TotalHoldings,
            other => SortColumn::Owner(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn toggle(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text.to_lowercase().as_str() {
            "asc" | "ascending" => Some(SortDirection::Asc),
            "desc" | "descending" => Some(SortDirection::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub column: SortColumn,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(column: SortColumn, direction: SortDirection) -> Self {
        SortSpec { column, direction }
    }
}

/// Largest holdings first
impl Default for SortSpec {
    fn default() -> Self {
        SortSpec::new(SortColumn::TotalHoldings, SortDirection::Desc)
    }
}

/// Rows of `table` ordered by `spec`
///
/// Stable: rows that compare equal keep the table's insertion order in both
/// directions.
pub fn sorted<'a>(table: &'a PivotTable, spec: &SortSpec) -> Vec<&'a PivotRow> {
    let mut rows: Vec<&PivotRow> = table.rows().iter().collect();

    rows.sort_by(|a, b| {
        let ord = compare(a, b, &spec.column);
        match spec.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    });

    rows
}

fn compare(a: &PivotRow, b: &PivotRow, column: &SortColumn) -> Ordering {
    match column {
        SortColumn::CompanyName => locale_compare(a.company(), b.company()),
        other => {
            let label = other.label();
            a.value(label).total_cmp(&b.value(label))
        }
    }
}

thread_local! {
    /// Root-locale collator from the compiled CLDR data
    static COLLATOR: Option<Collator> =
        match Collator::try_new(&Default::default(), CollatorOptions::new()) {
            Ok(collator) => Some(collator),
            Err(e) => {
                log::warn!("collation data unavailable, sorting names by folded case: {}", e);
                None
            }
        };
}

/// Dictionary order: accents sort with their base letter, lowercase before
/// uppercase on ties
pub fn locale_compare(a: &str, b: &str) -> Ordering {
    let ord = COLLATOR.with(|collator| match collator {
        Some(collator) => collator.compare(a, b),
        None => a
            .chars()
            .flat_map(char::to_lowercase)
            .cmp(b.chars().flat_map(char::to_lowercase)),
    });

    ord.then_with(|| b.cmp(a))
}
