// 📊 Pivot Aggregation - company × owner cross-tabulation
// Records are folded in, never removed. Every row keeps a running grand total.

use crate::extractor::HoldingRecord;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

/// Reserved column holding a company's total across owners
pub const TOTAL_HOLDINGS: &str = "Total Holdings";

/// Display/export name of the company column
pub const COMPANY_NAME: &str = "Company Name";

/// Appended to an owner whose name collides with a fixed column header
pub const RESERVED_OWNER_SUFFIX: &str = " (owner)";

/// Owner name as it appears in the table. `Total Holdings` and `Company Name`
/// are column headers, so an owner with either name gets a suffix.
pub fn owner_column(owner: &str) -> Cow<'_, str> {
    if owner == TOTAL_HOLDINGS || owner == COMPANY_NAME {
        Cow::Owned(format!("{}{}", owner, RESERVED_OWNER_SUFFIX))
    } else {
        Cow::Borrowed(owner)
    }
}

// ============================================================================
// PIVOT ROW
// ============================================================================

/// One company: quantity per owner (first-seen order) plus the grand total
#[derive(Debug, Clone, PartialEq)]
pub struct PivotRow {
    company: String,
    holdings: Vec<(String, f64)>,
    total: f64,
}

impl PivotRow {
    fn new(company: &str) -> Self {
        PivotRow {
            company: company.to_string(),
            holdings: Vec::new(),
            total: 0.0,
        }
    }

    pub fn company(&self) -> &str {
        &self.company
    }

    /// Owner quantities in the order owners first appeared for this company
    pub fn holdings(&self) -> &[(String, f64)] {
        &self.holdings
    }

    pub fn get(&self, owner: &str) -> Option<f64> {
        self.holdings
            .iter()
            .find(|(name, _)| name == owner)
            .map(|(_, qty)| *qty)
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    /// Value of a numeric column; `Total Holdings` is the synthetic total, absent owners are 0
    pub fn value(&self, column: &str) -> f64 {
        if column == TOTAL_HOLDINGS {
            self.total
        } else {
            self.get(column).unwrap_or(0.0)
        }
    }

    fn add(&mut self, owner: &str, quantity: f64) {
        match self.holdings.iter_mut().find(|(name, _)| name == owner) {
            Some((_, qty)) => *qty += quantity,
            None => self.holdings.push((owner.to_string(), quantity)),
        }
        self.total += quantity;
    }

    /// Same owner→quantity pairs, regardless of order
    fn same_values(&self, other: &PivotRow) -> bool {
        self.total == other.total
            && self.holdings.len() == other.holdings.len()
            && self
                .holdings
                .iter()
                .all(|(owner, qty)| other.get(owner) == Some(*qty))
    }
}

// ============================================================================
// PIVOT TABLE
// ============================================================================

/// PivotTable - running aggregate for one upload session
///
/// Lifecycle: `new` (empty) → `fold`* → optional `reset`. Companies keep insertion
/// order (the stable tie-break for sorting); owners are tracked in first-seen order
/// for export columns.
#[derive(Debug, Clone, Default)]
pub struct PivotTable {
    rows: Vec<PivotRow>,
    index: HashMap<String, usize>,
    owners: Vec<String>,
}

impl PivotTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record in
    pub fn fold_record(&mut self, record: &HoldingRecord) {
        let idx = match self.index.get(&record.company_name) {
            Some(&idx) => idx,
            None => {
                self.rows.push(PivotRow::new(&record.company_name));
                let idx = self.rows.len() - 1;
                self.index.insert(record.company_name.clone(), idx);
                idx
            }
        };

        let owner = owner_column(&record.owner_name);
        self.rows[idx].add(&owner, record.quantity);

        if !self.owners.iter().any(|o| *o == owner) {
            self.owners.push(owner.into_owned());
        }
    }

    /// Fold records in order (left fold); returns how many were folded
    pub fn fold<I>(&mut self, records: I) -> usize
    where
        I: IntoIterator<Item = HoldingRecord>,
    {
        let mut folded = 0;
        for record in records {
            self.fold_record(&record);
            folded += 1;
        }
        folded
    }

    pub fn reset(&mut self) {
        self.rows.clear();
        self.index.clear();
        self.owners.clear();
    }

    /// Rows in insertion order
    pub fn rows(&self) -> &[PivotRow] {
        &self.rows
    }

    pub fn get(&self, company: &str) -> Option<&PivotRow> {
        self.index.get(company).map(|&idx| &self.rows[idx])
    }

    /// Owners in the order they first appeared anywhere in the table
    pub fn owners(&self) -> &[String] {
        &self.owners
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sum of every company's total
    pub fn grand_total(&self) -> f64 {
        self.rows.iter().map(|r| r.total).sum()
    }

    fn push_row(&mut self, row: PivotRow) {
        for (owner, _) in &row.holdings {
            if !self.owners.iter().any(|o| o == owner) {
                self.owners.push(owner.clone());
            }
        }
        match self.index.get(&row.company) {
            Some(&idx) => self.rows[idx] = row,
            None => {
                self.index.insert(row.company.clone(), self.rows.len());
                self.rows.push(row);
            }
        }
    }
}

/// Tables are equal when they hold the same companies with the same values,
/// whatever order things were folded in
impl PartialEq for PivotTable {
    fn eq(&self, other: &Self) -> bool {
        self.rows.len() == other.rows.len()
            && self.rows.iter().all(|row| {
                other
                    .get(&row.company)
                    .is_some_and(|theirs| row.same_values(theirs))
            })
    }
}

// ============================================================================
// SERIALIZATION
// {"<company>": {"<owner>": qty, ..., "Total Holdings": total}, ...}
// ============================================================================

struct RowEntries<'a>(&'a PivotRow);

impl Serialize for RowEntries<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.holdings.len() + 1))?;
        for (owner, qty) in &self.0.holdings {
            map.serialize_entry(owner, qty)?;
        }
        map.serialize_entry(TOTAL_HOLDINGS, &self.0.total)?;
        map.end()
    }
}

impl Serialize for PivotTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.rows.len()))?;
        for row in &self.rows {
            map.serialize_entry(&row.company, &RowEntries(row))?;
        }
        map.end()
    }
}

/// Owner entries of one stored row, in document order
struct StoredRow {
    holdings: Vec<(String, f64)>,
    total: Option<f64>,
}

impl<'de> Deserialize<'de> for StoredRow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = StoredRow;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of owner name to quantity")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<StoredRow, A::Error> {
                let mut row = StoredRow {
                    holdings: Vec::new(),
                    total: None,
                };
                while let Some((key, value)) = access.next_entry::<String, f64>()? {
                    if key == TOTAL_HOLDINGS {
                        row.total = Some(value);
                    } else {
                        let owner = owner_column(&key).into_owned();
                        row.holdings.push((owner, value));
                    }
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

impl<'de> Deserialize<'de> for PivotTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = PivotTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of company name to owner quantities")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<PivotTable, A::Error> {
                let mut table = PivotTable::new();
                while let Some((company, stored)) = access.next_entry::<String, StoredRow>()? {
                    if company.is_empty() {
                        return Err(de::Error::custom("empty company name"));
                    }
                    // Stored totals are trusted as-is
                    let total = stored
                        .total
                        .unwrap_or_else(|| stored.holdings.iter().map(|(_, q)| q).sum());
                    table.push_row(PivotRow {
                        company,
                        holdings: stored.holdings,
                        total,
                    });
                }
                Ok(table)
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

// ============================================================================
// TESTS
// ============================================================================
