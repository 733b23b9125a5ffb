// 🔎 Format Detection - where do the holdings start, and which columns matter
//
// Broker exports disagree on layout: some open with an ISIN column and no header,
// some carry a title block and a header row, some neither. The scan looks at a
// bounded window at the top of the sheet and falls back to the most common layout.

use crate::cell::{CellValue, RawSheet};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Rows inspected from the top of the sheet
pub const SCAN_WINDOW: usize = 15;

/// Most common layout: company in column B, quantity in column J, data from row 6
pub const DEFAULT_DATA_START_ROW: usize = 5;
pub const DEFAULT_COMPANY_COL: usize = 1;
pub const DEFAULT_TOTAL_COL: usize = 9;

const COMPANY_KEYWORDS: [&str; 4] = ["company", "scrip", "name of security", "security name"];
const TOTAL_EXACT: [&str; 2] = ["total", "free"];
const TOTAL_KEYWORDS: [&str; 3] = ["total qty", "quantity", "holding"];

/// Where one file's data lives. Indices only mean something for the sheet they came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub data_start_row: usize,
    pub company_col: usize,
    pub total_col: usize,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        ColumnMapping {
            data_start_row: DEFAULT_DATA_START_ROW,
            company_col: DEFAULT_COMPANY_COL,
            total_col: DEFAULT_TOTAL_COL,
        }
    }
}

/// Locate the data region of a sheet. Never fails.
///
/// Two things are tracked while scanning:
/// - the first *data row* (ISIN in the first cell, or a wide row with numbers in
///   columns 3 and 10). Finding one ends the scan.
/// - the last *header row* seen before that point. Header cells set the company or
///   quantity column; a company header also moves the data start below itself.
///
/// Company and quantity columns may come from different header rows.
pub fn detect(sheet: &RawSheet) -> ColumnMapping {
    let mut company_col = DEFAULT_COMPANY_COL;
    let mut total_col = DEFAULT_TOTAL_COL;
    let mut data_row: Option<usize> = None;
    let mut header_start: Option<usize> = None;

    for (row_idx, row) in sheet.iter().take(SCAN_WINDOW).enumerate() {
        if is_data_row(row) {
            data_row = Some(row_idx);
            break;
        }

        for (col_idx, cell) in row.iter().enumerate() {
            let text = cell.as_text().to_lowercase();
            let text = text.trim();
            if text.is_empty() {
                continue;
            }

            if COMPANY_KEYWORDS.iter().any(|k| text.contains(k)) {
                company_col = col_idx;
                header_start = Some(row_idx + 1);
            }

            if TOTAL_EXACT.contains(&text) || TOTAL_KEYWORDS.iter().any(|k| text.contains(k)) {
                total_col = col_idx;
            }
        }
    }

    let mapping = ColumnMapping {
        data_start_row: data_row
            .or(header_start)
            .unwrap_or(DEFAULT_DATA_START_ROW),
        company_col,
        total_col,
    };

    log::debug!(
        "detected layout: data row {}, company col {}, total col {} ({})",
        mapping.data_start_row,
        mapping.company_col,
        mapping.total_col,
        match (data_row, header_start) {
            (Some(_), _) => "data row",
            (None, Some(_)) => "header row",
            (None, None) => "fallback",
        }
    );

    mapping
}

fn isin_patterns() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"^INE[A-Z0-9]+").expect("indian isin pattern is valid"),
            Regex::new(r"^[A-Z]{2}[A-Z0-9]{9}[0-9]$").expect("isin pattern is valid"),
        ]
    })
}

/// ISIN in the first cell, or a full-width row with numbers where quantities sit
pub fn is_data_row(row: &[CellValue]) -> bool {
    if let Some(first) = row.first() {
        let text = first.as_text();
        let text = text.trim();
        if !text.is_empty() && isin_patterns().iter().any(|p| p.is_match(text)) {
            return true;
        }
    }

    row.len() >= 10 && row[2].is_number() && row[9].is_number()
}
