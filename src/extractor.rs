// 📋 Record Extraction - data rows → holding records
// Walks the sheet from the detected start row, skipping summary and empty lines

use crate::cell::RawSheet;
use crate::detector::ColumnMapping;
use serde::{Deserialize, Serialize};

/// Spreadsheet summary lines, matched on the lower-cased company name
const NOISE_MARKERS: [&str; 3] = ["total", "grand", "summary"];

/// HoldingRecord - one company's quantity for one owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingRecord {
    pub company_name: String,
    pub owner_name: String,
    pub quantity: f64,
}

/// Lazily extract holding records from `sheet`
///
/// Rows too short to reach both mapped columns, summary rows, single-character
/// names and zero quantities are dropped silently. The iterator borrows its inputs,
/// so calling this again restarts from the top.
pub fn extract<'a>(
    sheet: &'a RawSheet,
    mapping: &'a ColumnMapping,
    owner: &'a str,
) -> impl Iterator<Item = HoldingRecord> + 'a {
    let min_len = mapping.company_col.max(mapping.total_col) + 1;

    sheet
        .iter()
        .skip(mapping.data_start_row)
        .filter(move |row| row.len() >= min_len)
        .filter_map(move |row| {
            let company_name = row[mapping.company_col].as_text().trim().to_string();
            let quantity = row[mapping.total_col].quantity();

            if is_noise(&company_name) {
                return None;
            }

            if company_name.chars().count() <= 1 || quantity == 0.0 {
                return None;
            }

            Some(HoldingRecord {
                company_name,
                owner_name: owner.to_string(),
                quantity,
            })
        })
}

fn is_noise(company_name: &str) -> bool {
    let lower = company_name.to_lowercase();
    NOISE_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellValue;

    fn row(company: &str, qty: CellValue) -> Vec<CellValue> {
        vec![CellValue::from("INE000000000"), CellValue::from(company), qty]
    }

    fn mapping() -> ColumnMapping {
        ColumnMapping {
            data_start_row: 1,
            company_col: 1,
            total_col: 2,
        }
    }

    #[test]
    fn test_extract_basic_rows() {
        let sheet = vec![
            vec![CellValue::from("ISIN"), CellValue::from("Company"), CellValue::from("Qty")],
            row("  Infosys Ltd ", CellValue::Number(100.0)),
            row("TCS", CellValue::from("1,250")),
        ];
        let m = mapping();
        let records: Vec<_> = extract(&sheet, &m, "Alice").collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].company_name, "Infosys Ltd");
        assert_eq!(records[0].owner_name, "Alice");
        assert_eq!(records[0].quantity, 100.0);
        assert_eq!(records[1].quantity, 1250.0);
    }

    #[test]
    fn test_extract_skips_rows_before_start() {
        let sheet = vec![row("Header Co", CellValue::Number(5.0)), row("Wipro", CellValue::Number(7.0))];
        let m = mapping();
        let names: Vec<_> = extract(&sheet, &m, "A").map(|r| r.company_name).collect();

        assert_eq!(names, vec!["Wipro"]);
    }

    #[test]
    fn test_grand_total_never_emitted() {
        let sheet = vec![
            vec![],
            row("Grand Total", CellValue::Number(100.0)),
            row("Sub-total", CellValue::Number(40.0)),
            row("Portfolio Summary", CellValue::Number(60.0)),
            row("HDFC Bank", CellValue::Number(60.0)),
        ];
        let m = mapping();
        let names: Vec<_> = extract(&sheet, &m, "A").map(|r| r.company_name).collect();

        assert_eq!(names, vec!["HDFC Bank"]);
    }

    #[test]
    fn test_grand_total_dropped_under_any_mapping() {
        let sheet = vec![vec![
            CellValue::from("Grand Total"),
            CellValue::Number(100.0),
            CellValue::from("Grand Total"),
        ]];
        for (company_col, total_col) in [(0, 1), (2, 1)] {
            let m = ColumnMapping {
                data_start_row: 0,
                company_col,
                total_col,
            };
            assert_eq!(extract(&sheet, &m, "A").count(), 0);
        }
    }

    #[test]
    fn test_zero_quantity_and_short_names_dropped() {
        let sheet = vec![
            vec![],
            row("Infosys", CellValue::Number(0.0)),
            row("Infosys", CellValue::from("-")),
            row("Infosys", CellValue::Empty),
            row("X", CellValue::Number(10.0)),
            row("", CellValue::Number(10.0)),
            row("ITC", CellValue::Number(3.0)),
        ];
        let m = mapping();
        let records: Vec<_> = extract(&sheet, &m, "A").collect();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].company_name, "ITC");
    }

    #[test]
    fn test_short_rows_skipped() {
        let sheet = vec![vec![], vec![CellValue::from("x"), CellValue::from("Infosys")]];
        let m = mapping();
        assert_eq!(extract(&sheet, &m, "A").count(), 0);
    }

    #[test]
    fn test_numeric_company_name_rendered_as_text() {
        let mut sheet = vec![vec![], row("", CellValue::Number(1.0))];
        sheet[1][1] = CellValue::Number(500325.0);
        let m = mapping();
        let records: Vec<_> = extract(&sheet, &m, "A").collect();

        assert_eq!(records[0].company_name, "500325");
    }

    #[test]
    fn test_extract_is_restartable() {
        let sheet = vec![vec![], row("Infosys", CellValue::Number(1.0))];
        let m = mapping();

        let first: Vec<_> = extract(&sheet, &m, "A").collect();
        let second: Vec<_> = extract(&sheet, &m, "A").collect();
        assert_eq!(first, second);
    }
}
